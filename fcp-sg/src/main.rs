//! fcp-sg (Segregation) - buffers prepared sessions into learning sets

use anyhow::{Context, Result};
use clap::Parser;
use fcp_common::config::{resolve_config_path, resolve_root_folder, PipelineConfig, RootFolderInitializer};
use fcp_common::db::open_pool;
use fcp_common::decision::provider_for;
use fcp_common::logging::init_tracing;
use fcp_common::transport::{inbox, serve, PeerClient};
use fcp_sg::machine::LEARNING_SETS_ROUTE;
use fcp_sg::store::SessionStore;
use fcp_sg::{build_router, AppState, MachineContext, SegregationMachine, MODULE_NAME};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "fcp-sg", version, about = "Segregation system")]
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

    /// Listen port (defaults to the segregation peer port)
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
        "Starting FCP Segregation (fcp-sg) v{} [{}] built {} ({})",
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
    let store = SessionStore::new(pool).await?;

    let transport = PeerClient::new()?.with_instrumented_routes([LEARNING_SETS_ROUTE]);
    let (sender, receiver) = inbox();
    let context = MachineContext {
        state_path: initializer.state_path(),
        reports_dir: initializer.reports_dir(),
        development: config.peers.development.clone(),
    };
    let machine = SegregationMachine::new(
        config.segregation.clone(),
        context,
        store,
        receiver,
        transport,
        provider_for(config.decision_mode),
    )
    .await?;

    let port = args.port.unwrap_or(config.peers.segregation.port());
    let addr = SocketAddr::new(args.bind, port);
    let app = build_router(AppState::new(sender));

    let server = tokio::spawn(serve(addr, app));
    tokio::select! {
        joined = server => joined??,
        result = machine.run() => result.inspect_err(|e| error!("Segregation loop failed: {}", e))?,
    }

    info!("fcp-sg stopped");
    Ok(())
}
