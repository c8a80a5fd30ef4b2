//! fcp-cs (Classification) - labels prepared sessions with the deployed classifier

use anyhow::{Context, Result};
use clap::Parser;
use fcp_common::config::{resolve_config_path, resolve_root_folder, PipelineConfig, RootFolderInitializer};
use fcp_common::logging::init_tracing;
use fcp_common::transport::{inbox, serve, PeerClient};
use fcp_cs::controller::CLASSIFIER_LABEL_ROUTE;
use fcp_cs::{build_router, AppState, ClassificationController, ClassificationPeers, MODULE_NAME};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "fcp-cs", version, about = "Classification system")]
struct Args {
    /// Pipeline configuration file
    #[arg(long, env = "FCP_CONFIG")]
    config: Option<PathBuf>,

    /// Data root folder
    #[arg(long, env = "FCP_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Listen address
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Listen port (defaults to the classification peer port)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref())?;
    let config = PipelineConfig::load(&config_path)
        .with_context(|| format!("Cannot start without configuration {}", config_path.display()))?;

    init_tracing(&config.logging.level);
    info!(
        "Starting FCP Classification (fcp-cs) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Configuration: {}", config_path.display());

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &config);
    let initializer = RootFolderInitializer::new(root_folder, MODULE_NAME);
    initializer.ensure_directory_exists()?;

    let transport = PeerClient::new()?.with_instrumented_routes([CLASSIFIER_LABEL_ROUTE]);
    let (sender, receiver) = inbox();
    let peers = ClassificationPeers {
        evaluation: config.peers.evaluation.clone(),
        client: config.peers.client.clone(),
    };
    let controller = ClassificationController::new(
        &config.classification,
        initializer.module_dir(),
        peers,
        receiver,
        transport,
    )?;

    let port = args.port.unwrap_or(config.peers.classification.port());
    let addr = SocketAddr::new(args.bind, port);
    let app = build_router(AppState::new(sender));

    let server = tokio::spawn(serve(addr, app));
    tokio::select! {
        joined = server => joined??,
        result = controller.run() => result.inspect_err(|e| error!("Classification loop failed: {}", e))?,
    }

    info!("fcp-cs stopped");
    Ok(())
}
