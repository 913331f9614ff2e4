use std::sync::Arc;

use fetch_server::api::{ApiServer, AppState};
use fetch_server::config::AppConfig;
use fetch_server::logging;
use fetch_server::pipeline::JobPipeline;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env_or_default();
    let _guard = logging::init_logging(&config.logging.log_dir)?;

    let pipeline = Arc::new(JobPipeline::new(config.pipeline.clone()));
    pipeline.prepare().await?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        work_dir = %config.pipeline.work_dir.display(),
        workspace_mode = %config.pipeline.workspace_mode,
        fetch_tool = %config.pipeline.fetch_tool.program,
        mux_tool = %config.pipeline.mux_tool.program,
        "fetch-server starting"
    );

    let server = ApiServer::new(config.server.clone(), AppState::new(pipeline));
    let cancel_token = server.cancel_token();

    logging::start_retention_cleanup(
        config.logging.log_dir.clone(),
        config.logging.retention_days,
        cancel_token.clone(),
    );

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C, shutting down");
                shutdown_token.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    server.run().await?;
    info!("fetch-server stopped");
    Ok(())
}
