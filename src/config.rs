//! Instance Configuration
//!
//! Everything an instance decides at boot: the port it serves, whether it is
//! a primary or a replica, the primary it follows, and its replication id.
//! None of it changes at runtime.

use rand::Rng;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of a replication id
pub const REPLICATION_ID_LEN: usize = 40;

/// Replication role of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Primary,
    Replica,
}

impl Role {
    /// The literal reported by `INFO replication`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Primary => "primary",
            Role::Replica => "replica",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of the primary a replica follows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryAddress {
    pub host: String,
    pub port: u16,
}

impl PrimaryAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for PrimaryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Errors produced while reading configuration values.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("expected \"<host> <port>\", got {0:?}")]
    MalformedAddress(String),

    #[error("invalid port: {0:?}")]
    InvalidPort(String),
}

impl FromStr for PrimaryAddress {
    type Err = ConfigError;

    /// Parses `"<host> <port>"`. `"<host>:<port>"` is accepted too.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (host, port) = trimmed
            .split_once(char::is_whitespace)
            .or_else(|| trimmed.rsplit_once(':'))
            .ok_or_else(|| ConfigError::MalformedAddress(s.to_string()))?;

        let host = host.trim();
        let port = port.trim();
        if host.is_empty() {
            return Err(ConfigError::MalformedAddress(s.to_string()));
        }

        let port = port
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort(port.to_string()))?;

        Ok(Self::new(host, port))
    }
}

/// Boot-time configuration of one instance.
///
/// The constructors keep the role and the primary address consistent: a
/// primary never has a primary address, a replica always does.
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    port: u16,
    role: Role,
    primary_address: Option<PrimaryAddress>,
    replication_id: String,
    replication_offset: u64,
}

impl InstanceConfig {
    /// Configuration for a primary serving on `port`.
    pub fn primary(port: u16) -> Self {
        Self {
            port,
            role: Role::Primary,
            primary_address: None,
            replication_id: generate_replication_id(),
            replication_offset: 0,
        }
    }

    /// Configuration for a replica serving on `port` and following `primary`.
    pub fn replica_of(port: u16, primary: PrimaryAddress) -> Self {
        Self {
            port,
            role: Role::Replica,
            primary_address: Some(primary),
            replication_id: generate_replication_id(),
            replication_offset: 0,
        }
    }

    /// Same configuration, serving on a different port.
    ///
    /// Used when the listener was bound to port 0 and the OS picked one.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn primary_address(&self) -> Option<&PrimaryAddress> {
        self.primary_address.as_ref()
    }

    pub fn replication_id(&self) -> &str {
        &self.replication_id
    }

    /// The instance-wide replication offset.
    ///
    /// Propagation does not advance it; only per-replica offsets move.
    pub fn replication_offset(&self) -> u64 {
        self.replication_offset
    }
}

/// Generates a replication id: 40 random lowercase hex characters.
pub fn generate_replication_id() -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..REPLICATION_ID_LEN)
        .map(|_| HEX[rng.gen_range(0..HEX.len())] as char)
        .collect()
}
