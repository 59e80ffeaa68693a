use std::any::Any;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
pub use tower_http::catch_panic::CatchPanicLayer;

use crate::utils::ApiErrorResponse;

/// Converts a panic in a request handler into a `500` API error.
///
/// Panic payloads are usually a `String` or a `&'static str`. Other payloads are reported without
/// detail.
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("request handler panicked");

    pulse_log::error!(detail = detail, "request handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        ApiErrorResponse::with_detail(detail),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::response_json;

    #[tokio::test]
    async fn test_string_payload() {
        let response = handle_panic(Box::new("cache poisoned".to_owned()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response_json(response).await;
        assert_eq!(body["detail"], "cache poisoned");
    }

    #[tokio::test]
    async fn test_opaque_payload() {
        let response = handle_panic(Box::new(42u32));

        let body = response_json(response).await;
        assert_eq!(body["detail"], "request handler panicked");
    }
}
