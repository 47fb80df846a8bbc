use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub mod alert_log;
pub mod balancer;
pub mod config;
pub mod errors;
pub mod http;
pub mod launcher;
pub mod logging;
pub mod providers;
pub mod signals;

use alert_log::AlertLog;
use balancer::RoundRobinBalancer;

#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[derive(Clone)]
pub struct AppState {
    pub alert_log: Option<Arc<AlertLog>>,
    pub balancer: Arc<RoundRobinBalancer>,
}

impl AppState {
    pub fn new(alert_log: Option<Arc<AlertLog>>, balancer: Arc<RoundRobinBalancer>) -> Self {
        Self {
            alert_log,
            balancer,
        }
    }

    pub fn mode(&self) -> &'static str {
        if self.balancer.is_empty() {
            "local-only"
        } else {
            "load-balanced"
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(http::handlers::health))
        .route("/status", get(http::handlers::status))
        .route("/webhook", post(http::handlers::webhook))
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}
