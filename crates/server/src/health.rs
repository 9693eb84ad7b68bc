use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use crmquery_core::config::AppConfig;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    llm_model: String,
    crm_region: &'static str,
}

impl HealthState {
    pub fn from_config(config: &AppConfig) -> Self {
        Self { llm_model: config.llm.model.clone(), crm_region: config.crm.region.as_str() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UpstreamInfo {
    pub llm_model: String,
    pub crm_region: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub upstream: UpstreamInfo,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

/// Liveness only; upstream services are reported, not probed.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let payload = HealthResponse {
        status: "ready",
        service: HealthCheck {
            status: "ready",
            detail: "crmquery-server runtime initialized".to_string(),
        },
        upstream: UpstreamInfo { llm_model: state.llm_model, crm_region: state.crm_region },
        checked_at: Utc::now().to_rfc3339(),
    };
    (StatusCode::OK, Json(payload))
}
