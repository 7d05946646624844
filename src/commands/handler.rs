//! Command Handler Module
//!
//! This module implements the commands relaykv understands. It takes the
//! argument list of one decoded command and dispatches it by name.
//!
//! ## Supported Commands
//!
//! - `PING` - Test connection (arguments ignored)
//! - `ECHO message` - Echo message
//! - `SET key value [PX milliseconds]` - Set a key, propagated on a primary
//! - `GET key` - Get a key's value
//! - `INFO [replication]` - Replication role, id and offset
//! - `REPLCONF ...` - Accepted and acknowledged
//! - `PSYNC ...` - Full resynchronization; registers the caller as a replica
//!
//! Anything else gets a null bulk reply.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │  execute()  │───>│  dispatch() │───>│  cmd_*()    │      │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘      │
//! │                                               │             │
//! │                 ┌─────────────────────────────┼─────────┐   │
//! │                 ▼                             ▼         ▼   │
//! │           StorageEngine          ReplicationState  Session  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::connection::Session;
use crate::protocol::RespValue;
use crate::replication::ReplicationState;
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Dispatches commands against the shared store and replication state.
#[derive(Clone)]
pub struct CommandHandler {
    /// The storage engine
    storage: Arc<StorageEngine>,
    /// Role, replication id and the replica registry
    replication: Arc<ReplicationState>,
}

impl CommandHandler {
    /// Creates a new command handler.
    pub fn new(storage: Arc<StorageEngine>, replication: Arc<ReplicationState>) -> Self {
        Self {
            storage,
            replication,
        }
    }

    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    pub fn replication(&self) -> &Arc<ReplicationState> {
        &self.replication
    }

    /// Executes one command and sends its reply through `session`.
    ///
    /// # Arguments
    ///
    /// * `command` - The decoded argument list, command name first
    /// * `session` - The connection the command arrived on
    pub fn execute(&self, command: Vec<Bytes>, session: &Session) {
        let name = match command.first() {
            Some(name) => String::from_utf8_lossy(name).to_ascii_uppercase(),
            None => {
                session.reply(&RespValue::null());
                return;
            }
        };

        trace!(peer = %session.peer(), command = %name, args = command.len() - 1, "Executing command");
        self.dispatch(&name, &command, session);
    }

    /// Dispatches a command to its handler.
    fn dispatch(&self, name: &str, command: &[Bytes], session: &Session) {
        let args = &command[1..];
        match name {
            "PING" => session.reply(&RespValue::pong()),
            "ECHO" => session.reply(&self.cmd_echo(args)),
            "SET" => session.reply(&self.cmd_set(command, session)),
            "GET" => session.reply(&self.cmd_get(args)),
            "INFO" => session.reply(&self.cmd_info(args)),
            "REPLCONF" => session.reply(&RespValue::ok()),
            "PSYNC" => self.cmd_psync(session),
            _ => {
                debug!(peer = %session.peer(), command = %name, "Unknown command");
                session.reply(&RespValue::null());
            }
        }
    }

    /// ECHO message
    fn cmd_echo(&self, args: &[Bytes]) -> RespValue {
        match args {
            [message] => RespValue::bulk_string(message.clone()),
            _ => RespValue::error("ERR wrong number of arguments for 'ECHO' command"),
        }
    }

    /// SET key value [PX milliseconds]
    ///
    /// A client SET on a primary is applied and forwarded to the replicas
    /// in one step. Writes arriving from our own primary, and client writes
    /// on a replica, only touch the local store.
    fn cmd_set(&self, command: &[Bytes], session: &Session) -> RespValue {
        let (key, value, ttl) = match parse_set(&command[1..]) {
            Ok(parsed) => parsed,
            Err(reply) => return reply,
        };
        if ttl.is_some_and(|ttl| self.storage.deadline(ttl).is_none()) {
            return RespValue::error("ERR invalid expire time in 'set' command");
        }

        if self.replication.is_primary() && !session.is_from_primary() {
            self.replication
                .propagate_write(command, || self.storage.set(key, value, ttl));
        } else {
            self.storage.set(key, value, ttl);
        }

        RespValue::ok()
    }

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> RespValue {
        match args {
            [key] => match self.storage.get(key) {
                Some(value) => RespValue::bulk_string(value),
                None => RespValue::null(),
            },
            _ => RespValue::error("ERR wrong number of arguments for 'GET' command"),
        }
    }

    /// INFO [section]
    ///
    /// Only the replication section exists. Any other section, or a bare
    /// INFO, gets a null bulk.
    fn cmd_info(&self, args: &[Bytes]) -> RespValue {
        let wants_replication = match args.first() {
            None => false,
            Some(section) => section.eq_ignore_ascii_case(b"replication"),
        };

        if wants_replication {
            RespValue::bulk_string(self.replication.info())
        } else {
            RespValue::null()
        }
    }

    /// PSYNC replicationid offset
    fn cmd_psync(&self, session: &Session) {
        if self.replication.is_primary() && !session.is_from_primary() {
            self.replication
                .register_replica(session.peer(), session.outbound());
            return;
        }

        // A replica answers but keeps no registry of its own
        for frame in self.replication.full_resync() {
            session.reply(&frame);
        }
    }
}

/// Splits SET arguments into key, value and optional TTL.
fn parse_set(args: &[Bytes]) -> Result<(Bytes, Bytes, Option<Duration>), RespValue> {
    let (key, value, options) = match args {
        [key, value, options @ ..] => (key.clone(), value.clone(), options),
        _ => {
            return Err(RespValue::error(
                "ERR wrong number of arguments for 'SET' command",
            ))
        }
    };

    let ttl = match options {
        [] => None,
        [option, millis] if option.eq_ignore_ascii_case(b"PX") => {
            let millis = std::str::from_utf8(millis)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|&ms| ms > 0)
                .ok_or_else(|| RespValue::error("ERR invalid expire time in 'set' command"))?;
            Some(Duration::from_millis(millis))
        }
        _ => return Err(RespValue::error("ERR syntax error")),
    };

    Ok((key, value, ttl))
}
