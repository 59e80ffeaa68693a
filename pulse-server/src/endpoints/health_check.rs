//! A simple health check endpoint.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use crate::service::ServiceState;
use crate::services::health_check::HealthStatus;

#[derive(Serialize)]
struct Status {
    status: HealthStatus,
}

pub async fn handle(state: State<ServiceState>) -> impl IntoResponse {
    let status = state.health_check().check().await;

    let code = match status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (code, Json(Status { status }))
}
