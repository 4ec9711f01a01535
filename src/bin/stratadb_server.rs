//! StrataDB server binary.

use clap::Parser;
use log::{error, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stratadb::identity::LogDelivery;
use stratadb::node::{StrataNode, TcpServer};
use stratadb::NodeConfig;

#[derive(Parser, Debug)]
#[command(name = "stratadb_server", about = "StrataDB node", version)]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<String>,

    /// Listen address, overrides the config file
    #[arg(short, long)]
    listen: Option<String>,

    /// Storage directory, overrides the config file
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Verbose logging (debug level)
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args).await {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> stratadb::StrataDbResult<()> {
    let mut config = match &args.config {
        Some(path) => NodeConfig::from_toml_file(Path::new(path))?,
        None => NodeConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen_address = listen;
    }
    if let Some(data_dir) = args.data_dir {
        config.storage_path = data_dir;
    }

    info!(
        "starting stratadb {} (storage: {})",
        stratadb::constants::SERVER_VERSION,
        config.storage_path.display()
    );

    let node = Arc::new(StrataNode::open(config, Arc::new(LogDelivery))?);
    let server = TcpServer::bind(node).await?;
    let shutdown = server.shutdown_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received ctrl-c, shutting down");
            let _ = shutdown.send(true);
        }
    });

    server.run().await
}
