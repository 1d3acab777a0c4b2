use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::{debug, info};

use atoll_server::sn::{SnConfig, SnServer};

/// Rendezvous supernode for the atoll overlay network.
///
/// Edges register over UDP, grouped into communities; the supernode
/// forwards unicast frames and floods community broadcasts. Configure
/// an SNM port to federate communities with peer supernodes.
#[derive(Parser)]
#[command(name = "atoll", version)]
struct Cli {
    /// UDP port for edge traffic.
    #[arg(short = 'l', long = "local-port", default_value_t = 7654)]
    local_port: u16,

    /// Run in the foreground. atoll never daemonizes itself; the flag
    /// is accepted for compatibility with supervisor scripts.
    #[arg(short = 'f', long = "foreground")]
    foreground: bool,

    /// Increase verbosity. Can be used multiple times.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// UDP port for peer supernode coordination; enables the
    /// coordinator.
    #[arg(short = 's', long = "sn-port")]
    sn_port: Option<u16>,

    /// Seed peer supernode as ip:port. Can be used multiple times.
    #[arg(short = 'i', long = "supernode", value_name = "IP:PORT")]
    supernodes: Vec<SocketAddr>,

    /// Directory for the coordinator state files.
    #[arg(long = "data-dir", default_value = ".")]
    data_dir: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    info!("atoll — supernode for the atoll overlay");
    if cli.foreground {
        debug!("foreground requested; atoll always runs attached");
    }

    let config = SnConfig {
        edge_port: cli.local_port,
        snm_port: cli.sn_port,
        seed_peers: cli.supernodes,
        data_dir: cli.data_dir,
        ..SnConfig::default()
    };

    let server = SnServer::bind(&config).await?;
    server.run().await?;
    Ok(())
}
