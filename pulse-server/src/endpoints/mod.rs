//! Web server endpoints.
//!
//! Every route is also reachable with a trailing slash.

use axum::Router;
use axum::routing::{get, post};

use crate::service::ServiceState;

mod health_check;
mod process;

/// Returns all routes of the HTTP server.
pub fn routes() -> Router<ServiceState> {
    Router::new()
        .route("/process", post(process::handle))
        .route("/process/", post(process::handle))
        .route("/health", get(health_check::handle))
        .route("/health/", get(health_check::handle))
}
