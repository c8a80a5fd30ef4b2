//! fcp-es (Evaluation) - compares classifier labels against expert labels

use anyhow::{Context, Result};
use clap::Parser;
use fcp_common::config::{resolve_config_path, resolve_root_folder, PipelineConfig, RootFolderInitializer};
use fcp_common::db::open_pool;
use fcp_common::decision::provider_for;
use fcp_common::logging::init_tracing;
use fcp_common::transport::{inbox, serve};
use fcp_es::store::LabelStore;
use fcp_es::{build_router, AppState, Evaluator, MODULE_NAME};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "fcp-es", version, about = "Evaluation system")]
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

    /// Listen port (defaults to the evaluation peer port)
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
        "Starting FCP Evaluation (fcp-es) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Configuration: {}", config_path.display());

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &config);
    let initializer = RootFolderInitializer::new(root_folder, MODULE_NAME);
    initializer.ensure_directory_exists()?;

    let pool = open_pool(&initializer.database_path()).await?;
    let store = LabelStore::new(pool).await?;

    let (sender, receiver) = inbox();
    let evaluator = Evaluator::new(
        config.evaluation.clone(),
        initializer.reports_dir(),
        store,
        receiver,
        provider_for(config.decision_mode),
    );

    let port = args.port.unwrap_or(config.peers.evaluation.port());
    let addr = SocketAddr::new(args.bind, port);
    let app = build_router(AppState::new(sender));

    let server = tokio::spawn(serve(addr, app));
    tokio::select! {
        joined = server => joined??,
        result = evaluator.run() => result.inspect_err(|e| error!("Evaluation loop failed: {}", e))?,
    }

    info!("fcp-es stopped");
    Ok(())
}
