use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use pulse_config::Config;
use serde_json::{Value, json};

use crate::event::Event;
use crate::service::ServiceState;
use crate::services::replay_cache::ReplayCache;
use crate::services::sink::MetricsSinkClient;

pub fn test_event_json(id: &str) -> Value {
    json!({
        "id": id,
        "timestamp": "2024-05-01T12:00:00Z",
        "type": "user_action",
        "source": {"region": "us-east", "instance": "i-1"},
        "payload": {"type": "click", "properties": {"button": "buy"}},
        "metadata": {"version": "1.0"}
    })
}

pub fn test_event(id: &str) -> Event {
    serde_json::from_value(test_event_json(id)).unwrap()
}

/// A config with complete sink credentials.
pub fn sink_config(url: &str) -> Config {
    Config::from_json_value(json!({
        "sink": {"url": url, "username": "user", "password": "pass", "token": "token"},
        "environment": "test",
    }))
    .unwrap()
}

pub fn sink_client(url: &str) -> MetricsSinkClient {
    MetricsSinkClient::new(&sink_config(url)).unwrap()
}

/// A Redis backed cache pointing to a port nobody listens on.
pub fn unreachable_cache() -> ReplayCache {
    let config = Config::from_json_value(json!({
        "cache": {"host": "127.0.0.1", "port": 1, "connection_timeout": 1}
    }))
    .unwrap();

    ReplayCache::from_config(&config).unwrap()
}

pub fn test_state(cache: ReplayCache, sink_url: &str) -> ServiceState {
    let config = sink_config(sink_url);
    let sink = MetricsSinkClient::new(&config).unwrap();
    ServiceState::new(&config, cache, sink)
}

pub async fn response_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// In-memory log output shared with the subscriber installed by [`capture_logs`].
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs `future` with all log output of the current thread captured as plain text.
pub async fn capture_logs<F: Future>(future: F) -> (F::Output, String) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    let output = {
        let _guard = tracing::subscriber::set_default(subscriber);
        future.await
    };

    let logs = String::from_utf8_lossy(&buffer.0.lock()).into_owned();
    (output, logs)
}
