use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// A request received by the [`MiniSink`].
#[derive(Clone, Debug)]
pub struct CapturedRequest {
    /// The request method.
    pub method: Method,
    /// The request path.
    pub path: String,
    /// All request headers.
    pub headers: HeaderMap,
    /// The body parsed as JSON, or `Value::Null` if it is not JSON.
    pub body: Value,
}

impl CapturedRequest {
    /// Returns the value of header `name` if it is valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[derive(Debug)]
struct SinkState {
    captured: Mutex<Vec<CapturedRequest>>,
    status: Mutex<StatusCode>,
    delay: Mutex<Option<Duration>>,
    notify: Notify,
}

/// An in-process analytics sink.
///
/// The sink accepts requests on any path, records them and responds with a configurable status
/// code, `200` by default. The server stops when the sink is dropped.
#[derive(Debug)]
pub struct MiniSink {
    addr: SocketAddr,
    state: Arc<SinkState>,
    server_handle: JoinHandle<()>,
}

impl MiniSink {
    /// Starts a sink on a random local port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let state = Arc::new(SinkState {
            captured: Mutex::new(Vec::new()),
            status: Mutex::new(StatusCode::OK),
            delay: Mutex::new(None),
            notify: Notify::new(),
        });

        let router = Router::new().fallback(capture).with_state(state.clone());

        let server_handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            addr,
            state,
            server_handle,
        }
    }

    /// Returns the address the sink listens on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the ingestion url of the sink.
    pub fn url(&self) -> String {
        format!("http://{}/ingest", self.addr)
    }

    /// Sets the status code of all following responses.
    pub fn set_status(&self, status: StatusCode) -> &Self {
        *self.state.status.lock() = status;
        self
    }

    /// Delays all following responses.
    pub fn set_delay(&self, delay: Duration) -> &Self {
        *self.state.delay.lock() = Some(delay);
        self
    }

    /// Returns all requests received so far.
    pub fn captured(&self) -> Vec<CapturedRequest> {
        self.state.captured.lock().clone()
    }

    /// Waits until at least `count` requests were received and returns them.
    ///
    /// Panics if the requests do not arrive within `timeout`.
    pub async fn wait_for_requests(&self, count: usize, timeout: Duration) -> Vec<CapturedRequest> {
        let wait = async {
            loop {
                let notified = self.state.notify.notified();
                let captured = self.captured();
                if captured.len() >= count {
                    return captured;
                }
                notified.await;
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(captured) => captured,
            Err(_) => panic!("timed out while waiting for {count} sink requests"),
        }
    }
}

impl Drop for MiniSink {
    fn drop(&mut self) {
        self.server_handle.abort();
    }
}

async fn capture(
    State(state): State<Arc<SinkState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let body = serde_json::from_slice(&body).unwrap_or(Value::Null);

    state.captured.lock().push(CapturedRequest {
        method,
        path: uri.path().to_owned(),
        headers,
        body,
    });
    state.notify.notify_waiters();

    let delay = *state.delay.lock();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    *state.status.lock()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_captures_requests() {
        crate::setup();
        let sink = MiniSink::start().await;

        let response = reqwest::Client::new()
            .post(sink.url())
            .header("x-auth-token", "abc")
            .json(&json!({"region": "us-east"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        let captured = sink.wait_for_requests(1, Duration::from_secs(5)).await;
        assert_eq!(captured[0].method, Method::POST);
        assert_eq!(captured[0].path, "/ingest");
        assert_eq!(captured[0].header("x-auth-token"), Some("abc"));
        assert_eq!(captured[0].body, json!({"region": "us-east"}));
    }

    #[tokio::test]
    async fn test_configured_status() {
        let sink = MiniSink::start().await;
        sink.set_status(StatusCode::BAD_GATEWAY);

        let response = reqwest::Client::new()
            .post(sink.url())
            .body("not json")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
        assert_eq!(sink.captured()[0].body, Value::Null);
    }
}
