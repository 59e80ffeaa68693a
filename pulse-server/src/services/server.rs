use std::future::Future;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::{HeaderValue, header};
use axum_server::Handle;
use pulse_config::Config;
use pulse_statsd::metric;
use tower::ServiceBuilder;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::constants;
use crate::middlewares::{self, CatchPanicLayer};
use crate::service::ServiceState;
use crate::statsd::{PulseCounters, PulseGauges};

/// Indicates the type of failure of the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding failed.
    #[error("bind to interface failed")]
    BindFailed(#[from] io::Error),
}

/// Build the axum application with all routes and middleware.
pub fn make_app(service: ServiceState) -> Router {
    // Service builder order defines layers added first will be called first. This means:
    //  - Requests go from top to bottom
    //  - Responses go from bottom to top
    let middleware = ServiceBuilder::new()
        .layer(CatchPanicLayer::custom(middlewares::handle_panic))
        .layer(SetResponseHeaderLayer::overriding(
            header::SERVER,
            HeaderValue::from_static(constants::SERVER),
        ))
        .layer(middlewares::trace_http_layer());

    crate::endpoints::routes()
        .layer(middleware)
        .with_state(service)
}

fn listen(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    let listener = TcpListener::bind(addr)?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// HTTP server hosting the event processing endpoints.
///
/// The server binds on creation and stops gracefully once the shutdown future passed to
/// [`run`](Self::run) resolves.
pub struct HttpServer {
    config: Arc<Config>,
    service: ServiceState,
    listener: TcpListener,
}

impl HttpServer {
    /// Binds to the configured listen address.
    pub fn new(config: Arc<Config>, service: ServiceState) -> Result<Self, ServerError> {
        let listener = listen(config.listen_addr())?;

        Ok(Self {
            config,
            service,
            listener,
        })
    }

    /// Returns the bound address, which differs from the configured one for port `0`.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves requests until `shutdown` resolves.
    ///
    /// After shutdown is signaled, in-flight requests are given the configured shutdown timeout
    /// to complete.
    pub async fn run<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Self {
            config,
            service,
            listener,
        } = self;

        pulse_log::info!("spawning http server");
        pulse_log::info!("  listening on http://{}/", listener.local_addr()?);
        metric!(counter(PulseCounters::ServerStarting) += 1);

        let handle = Handle::new();
        let server = axum_server::from_tcp(listener).handle(handle.clone());

        let periodic = config.metrics_periodic_interval().map(|interval| {
            tokio::spawn(emit_periodic_metrics(
                interval,
                handle.clone(),
                service.clone(),
            ))
        });

        let shutdown_timeout = config.shutdown_timeout();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            shutdown.await;
            pulse_log::info!("shutting down HTTP server");
            shutdown_handle.graceful_shutdown(Some(shutdown_timeout));
        });

        let app = make_app(service);
        let result = server.serve(app.into_make_service()).await;

        if let Some(periodic) = periodic {
            periodic.abort();
        }

        result
    }
}

async fn emit_periodic_metrics(interval: Duration, handle: Handle, service: ServiceState) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;
        metric!(gauge(PulseGauges::ServerActiveConnections) = handle.connection_count() as u64);

        if let Some(stats) = service.cache().stats() {
            metric!(gauge(PulseGauges::RedisPoolConnections) = u64::from(stats.connections));
            metric!(
                gauge(PulseGauges::RedisPoolIdleConnections) = u64::from(stats.idle_connections)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use pulse_test::MiniSink;
    use serde_json::json;
    use tokio::sync::oneshot;

    use super::*;
    use crate::services::replay_cache::ReplayCache;
    use crate::services::sink::MetricsSinkClient;
    use crate::testutils::test_event_json;

    #[tokio::test]
    async fn test_serve_and_shutdown() {
        let sink = MiniSink::start().await;
        let config = Arc::new(
            Config::from_json_value(json!({
                "http": {"host": "127.0.0.1", "port": 0, "shutdown_timeout": 1},
                "sink": {"url": sink.url(), "username": "u", "password": "p", "token": "t"},
            }))
            .unwrap(),
        );
        let sink_client = MetricsSinkClient::new(&config).unwrap();
        let state = ServiceState::new(&config, ReplayCache::memory(), sink_client);

        let server = HttpServer::new(config, state).unwrap();
        let addr = server.local_addr().unwrap();

        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server.run(async move {
            rx.await.ok();
        }));

        let client = reqwest::Client::new();
        let response = client
            .post(format!("http://{addr}/process"))
            .json(&test_event_json("evt-1"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        let response = client
            .get(format!("http://{addr}/health"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        tx.send(()).unwrap();
        task.await.unwrap().unwrap();
        assert_eq!(sink.captured().len(), 1);
    }
}
