//! fcp-ds (Development) - trains, ranks and deploys fault classifiers
//!
//! Exit status: 0 on shutdown, 2 when the test gate rejects the winner,
//! 3 when the winner cannot be delivered.

use anyhow::{Context, Result};
use clap::Parser;
use fcp_common::classifier::MlpFactory;
use fcp_common::config::{resolve_config_path, resolve_root_folder, PipelineConfig, RootFolderInitializer};
use fcp_common::decision::provider_for;
use fcp_common::logging::init_tracing;
use fcp_common::transport::{inbox, serve, PeerClient};
use fcp_ds::{build_router, AppState, DevelopmentOrchestrator, DevelopmentPaths, MODULE_NAME};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "fcp-ds", version, about = "Development system")]
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

    /// Listen port (defaults to the development peer port)
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
        "Starting FCP Development (fcp-ds) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Configuration: {}", config_path.display());

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &config);
    let initializer = RootFolderInitializer::new(root_folder, MODULE_NAME);
    initializer.ensure_directory_exists()?;

    let settings = config.development.clone();
    let factory = MlpFactory {
        learning_rate: settings.learning_rate,
        seed: settings.seed,
    };
    let (sender, receiver) = inbox();
    let orchestrator = DevelopmentOrchestrator::new(
        settings,
        DevelopmentPaths::new(initializer.module_dir(), &initializer.reports_dir()),
        config.peers.classification.clone(),
        receiver,
        PeerClient::new()?,
        provider_for(config.decision_mode),
        factory,
    )?;

    let port = args.port.unwrap_or(config.peers.development.port());
    let addr = SocketAddr::new(args.bind, port);
    let app = build_router(AppState::new(sender));

    // Training blocks its thread; the listener gets its own task
    let server = tokio::spawn(serve(addr, app));
    let code = tokio::select! {
        joined = server => {
            joined??;
            0
        }
        result = orchestrator.run() => result.inspect_err(|e| error!("Development loop failed: {}", e))?,
    };

    info!(code, "fcp-ds stopped");
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
