//! The Pulse event processing server.
//!
//! Pulse accepts telemetry events over HTTP, retains each event in a replay cache for one hour,
//! derives aggregate metrics and forwards them to an external analytics sink.
//!
//! # Endpoints
//!
//!  - `POST /process`: Validates and processes one event. Responds with `200` and the event id
//!    once the event is persisted, with `422` for invalid events and with `500` if the replay
//!    cache is unavailable. Forwarding failures never fail the request.
//!  - `GET /health`: Responds with `200` while the replay cache is reachable, and `503`
//!    otherwise.
//!
//! # Pipeline
//!
//! ```text
//!   event ──▶ validate ──▶ replay cache ──▶ derive metrics ──▶ sink ──▶ acknowledge
//!                │               │
//!                ▼               ▼
//!              422             500
//! ```
//!
//! All processing happens on a multi-threaded tokio runtime. The replay cache and the sink client
//! are asynchronous, so a slow dependency only delays the requests waiting on it.
#![warn(missing_docs)]

mod constants;
mod endpoints;
mod event;
mod middlewares;
mod service;
mod services;
mod statsd;
mod utils;

#[cfg(test)]
mod testutils;

use std::sync::Arc;

use anyhow::{Context, Result};
use pulse_config::Config;

pub use self::event::{Event, EventPayload, EventSource, ValidationError};
pub use self::service::{ServiceError, ServiceState};
pub use self::services::health_check::{HealthCheck, HealthStatus};
pub use self::services::processor::{
    EventProcessor, ProcessingError, ProcessingOutcome, ProcessingResult, ProcessorMetrics,
};
pub use self::services::replay_cache::{CacheError, MemoryCache, RedisCache, ReplayCache};
pub use self::services::server::{HttpServer, ServerError, make_app};
pub use self::services::sink::{ForwardError, MetricsRecord, MetricsSinkClient, SinkSetupError};
pub use self::utils::ApiErrorResponse;

/// Runs the server until it receives SIGINT or SIGTERM.
///
/// This creates a multi-threaded tokio runtime and blocks the calling thread until the server
/// shut down.
pub fn run(config: Config) -> Result<()> {
    let config = Arc::new(config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("pulse-worker")
        .enable_all()
        .build()
        .context("failed to start the tokio runtime")?;

    runtime.block_on(async {
        let state = ServiceState::start(&config).context("failed to create services")?;
        let server = HttpServer::new(config, state).context("failed to start the http server")?;
        server
            .run(shutdown_signal())
            .await
            .context("http server failed")
    })?;

    pulse_log::info!("pulse shutdown complete");
    Ok(())
}

/// Resolves on the first SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            pulse_log::error!(
                error = &error as &dyn std::error::Error,
                "failed to listen for SIGINT"
            );
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                pulse_log::error!(
                    error = &error as &dyn std::error::Error,
                    "failed to listen for SIGTERM"
                );
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => pulse_log::info!("received SIGINT"),
        _ = terminate => pulse_log::info!("received SIGTERM"),
    }
}
