//! raze daemon — entry point for running a raze node.

use clap::Parser;
use raze_node::{logging, Node, NodeConfig, NullBootstrap};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "raze-daemon", about = "raze protocol node daemon")]
struct Cli {
    /// Network to join: "live", "beta", or "test". Defaults to the config
    /// file's value.
    #[arg(long, env = "RAZE_NETWORK")]
    network: Option<String>,

    /// Data directory holding the config file.
    #[arg(long, default_value = "./raze_data", env = "RAZE_DATA_DIR")]
    data_path: PathBuf,

    /// UDP peering port (defaults to the network's port).
    #[arg(long, env = "RAZE_PEERING_PORT")]
    port: Option<u16>,

    /// Extra peers to contact at startup ("host:port", comma-separated).
    #[arg(long, value_delimiter = ',')]
    peer: Vec<String>,
}

fn load_config(cli: &Cli) -> Result<NodeConfig, raze_node::NodeError> {
    let path = cli.data_path.join("config.toml");
    let mut config = if path.exists() {
        NodeConfig::from_toml_file(&path)?
    } else {
        let config = NodeConfig::default();
        std::fs::create_dir_all(&cli.data_path)
            .and_then(|_| std::fs::write(&path, config.to_toml_string()))
            .map_err(|e| raze_node::NodeError::Config(e.to_string()))?;
        config
    };
    if let Some(network) = &cli.network {
        config.network = network
            .parse()
            .map_err(|_| raze_node::NodeError::Config(format!("unknown network {network}")))?;
        config.peering_port = config.network.default_port();
    }
    if let Some(port) = cli.port {
        config.peering_port = port;
    }
    config.preconfigured_peers.extend(cli.peer.iter().cloned());
    Ok(config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("unable to load configuration: {error}");
            return ExitCode::FAILURE;
        }
    };
    logging::init_logging(&config.log_level);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.io_threads)
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            error!(%error, "unable to start the runtime");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async {
        let node = match Node::new(config, Arc::new(NullBootstrap::new())).await {
            Ok(node) => node,
            Err(error) => {
                error!(%error, "node startup failed");
                return ExitCode::FAILURE;
            }
        };
        node.start();
        info!("node running; ctrl-c to stop");
        let _ = tokio::signal::ctrl_c().await;
        node.stop();
        ExitCode::SUCCESS
    })
}
