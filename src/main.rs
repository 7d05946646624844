//! relaykv - An In-Memory Key-Value Store with Replication
//!
//! This is the main entry point for the relaykv server.
//! It parses the command line, sets up logging and runs the server until
//! Ctrl+C.

use clap::Parser;
use relaykv::config::{InstanceConfig, PrimaryAddress};
use relaykv::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command-line flags
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value_t = relaykv::DEFAULT_PORT)]
    port: u16,

    /// Follow a primary, given as "<host> <port>"
    #[arg(long, value_name = "HOST PORT")]
    replicaof: Option<PrimaryAddress>,
}

impl Cli {
    fn instance_config(&self) -> InstanceConfig {
        match &self.replicaof {
            Some(primary) => InstanceConfig::replica_of(self.port, primary.clone()),
            None => InstanceConfig::primary(self.port),
        }
    }
}

fn print_banner(config: &InstanceConfig) {
    println!(
        r#"
relaykv v{} - In-Memory Key-Value Store
──────────────────────────────────────────────────────────────
Role:      {}
Listening: {}:{}
Replid:    {}

Use Ctrl+C to shutdown gracefully.
"#,
        relaykv::VERSION,
        config.role(),
        relaykv::DEFAULT_HOST,
        config.port(),
        config.replication_id()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = cli.instance_config();
    print_banner(&config);

    if let Some(primary) = config.primary_address() {
        info!(primary = %primary, "Starting as replica");
    }

    let server = Server::bind(config).await?;
    info!(addr = %server.local_addr()?, role = %server.replication().role(), "Listening");

    server.run_until_ctrl_c().await;
    Ok(())
}
