//! Board server: hosts the `/board` namespace for tabletop clients.
//!
//! Dirty boards and tokens are flushed to RocksDB periodically and once
//! more on Ctrl-C.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};
use tabletop_sync::{ServerConfig, SyncServer};

#[derive(Parser, Debug)]
#[command(name = "tabletop-server", about = "Virtual tabletop board server", version)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "TABLETOP_BIND", default_value = "127.0.0.1:9090")]
    bind: String,

    /// Request path clients connect on
    #[arg(long, env = "TABLETOP_NAMESPACE", default_value = "/board")]
    namespace: String,

    /// RocksDB directory; omit to keep everything in memory
    #[arg(long, env = "TABLETOP_DATA")]
    data_dir: Option<PathBuf>,

    /// Maximum clients per namespace
    #[arg(long, default_value_t = 100)]
    max_peers: usize,

    /// Frames buffered per client before it starts losing updates
    #[arg(long, default_value_t = 256)]
    broadcast_capacity: usize,

    /// Seconds between flushes of changed records
    #[arg(long, env = "TABLETOP_FLUSH_SECS", default_value_t = 60)]
    flush_interval: u64,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            bind_addr: args.bind,
            namespace: args.namespace,
            max_peers_per_room: args.max_peers,
            broadcast_capacity: args.broadcast_capacity,
            storage_path: args.data_dir,
            flush_interval_secs: args.flush_interval,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from(Args::parse());
    match &config.storage_path {
        Some(path) => info!("Storing boards in {}", path.display()),
        None => info!("No data directory given, boards are kept in memory"),
    }

    let server = match SyncServer::new(config) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start: {e}");
            return ExitCode::FAILURE;
        }
    };

    let code = tokio::select! {
        result = server.run() => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("Server stopped: {e}");
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            ExitCode::SUCCESS
        }
    };

    match server.flush().await {
        Ok(count) => info!("Flushed {count} records"),
        Err(e) => error!("Final flush failed: {e}"),
    }
    code
}
