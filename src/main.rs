use std::sync::Arc;

use tracing::{info, warn};
use webhook_balancer::{
    alert_log::AlertLog, balancer::RoundRobinBalancer, build_app, config::Config, logging,
    providers::HttpTransport, signals::shutdown_signal, AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging("info");

    let config = Config::from_env()?;

    let alert_log = match AlertLog::open(&config.log_dir).await {
        Ok(log) => Some(Arc::new(log)),
        Err(err) => {
            warn!(error = %err, "alert log unavailable, webhooks will not be recorded");
            None
        }
    };
    let balancer = Arc::new(RoundRobinBalancer::new(
        config.providers.clone(),
        Arc::new(HttpTransport::new()),
    ));

    let state = AppState::new(alert_log, balancer);
    if let Some(alert_log) = state.alert_log.as_ref() {
        if let Err(err) = alert_log.record_startup(state.mode()).await {
            warn!(error = %err, "failed to write startup entry to alert log");
        }
    }
    let bind_socket = config.bind_socket()?;
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        host = %config.host,
        port = config.port,
        log_dir = %config.log_dir.display(),
        mode = state.mode(),
        providers = config.providers.len(),
        "server starting"
    );

    axum::serve(listener, build_app(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}
