use axum::{body::Bytes, extract::State, Json};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

use crate::{
    balancer::{BalancerStatus, ForwardOutcome},
    errors::AppError,
    AppState,
};

pub const SERVICE_NAME: &str = "webhook-alert-receiver";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub mode: &'static str,
    pub status: &'static str,
    pub log_enabled: bool,
    pub providers: BalancerStatus,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forward: Option<ForwardOutcome>,
}

impl WebhookResponse {
    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: message.into(),
            forward: None,
        }
    }
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        mode: state.mode(),
        status: "running",
        log_enabled: state.alert_log.is_some(),
        providers: state.balancer.status(),
    })
}

/// Records the alert locally, then forwards it when providers are configured.
///
/// Recording failures still answer 200 so the sender does not retry an alert
/// that was delivered to us; the body carries `"status": "error"` instead.
pub async fn webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<WebhookResponse>, AppError> {
    let payload: Value = serde_json::from_slice(&body)
        .map_err(|err| AppError::bad_request("invalid_json", format!("invalid JSON body: {err}")))?;
    if !payload.is_object() {
        return Err(AppError::bad_request(
            "invalid_payload",
            "webhook body must be a JSON object",
        ));
    }

    let Some(alert_log) = state.alert_log.as_ref() else {
        return Ok(Json(WebhookResponse::error(
            "Local alert logger not initialized",
        )));
    };

    if let Err(err) = alert_log.record(&payload).await {
        error!(error = %err, "failed to record alert");
        return Ok(Json(WebhookResponse::error(format!(
            "Failed to record alert: {err}"
        ))));
    }

    let forward = if state.balancer.is_empty() {
        None
    } else {
        let outcome = state.balancer.send(&payload).await;
        info!(
            provider = outcome.provider.as_deref().unwrap_or("none"),
            success = outcome.success,
            "alert forwarded"
        );
        Some(outcome)
    };

    Ok(Json(WebhookResponse {
        status: "success",
        message: "Alert received and recorded".to_string(),
        forward,
    }))
}
