//! Event intake endpoint.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::service::ServiceState;
use crate::services::processor::{ProcessingError, ProcessingOutcome};
use crate::utils::ApiErrorResponse;

impl IntoResponse for ProcessingError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, ApiErrorResponse::from_error(&self)).into_response()
    }
}

pub async fn handle(
    state: State<ServiceState>,
    body: Bytes,
) -> Result<Json<ProcessingOutcome>, ProcessingError> {
    let outcome = state.processor().process_json(&body).await?;
    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use pulse_test::MiniSink;
    use serde_json::Value;
    use similar_asserts::assert_eq;
    use tower::ServiceExt;

    use crate::constants;
    use crate::services::replay_cache::ReplayCache;
    use crate::services::server::make_app;
    use crate::testutils::{response_json, test_event_json, test_state, unreachable_cache};

    fn process_request(uri: &str, body: &Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_process_success() {
        let sink = MiniSink::start().await;
        let state = test_state(ReplayCache::memory(), &sink.url());
        let app = make_app(state.clone());

        let response = app
            .oneshot(process_request("/process", &test_event_json("evt-1")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::SERVER).unwrap(),
            constants::SERVER
        );

        let body = response_json(response).await;
        insta::assert_json_snapshot!(body, {".processed_timestamp" => "[timestamp]"}, @r###"
        {
          "event_id": "evt-1",
          "processed_timestamp": "[timestamp]",
          "processing_result": "success"
        }
        "###);

        assert!(state.cache().get("event:evt-1").await.unwrap().is_some());
        assert_eq!(sink.captured().len(), 1);
    }

    #[tokio::test]
    async fn test_trailing_slash() {
        let sink = MiniSink::start().await;
        let app = make_app(test_state(ReplayCache::memory(), &sink.url()));

        let response = app
            .oneshot(process_request("/process/", &test_event_json("evt-1")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_validation_error() {
        let state = test_state(ReplayCache::memory(), "http://127.0.0.1:1/");
        let app = make_app(state.clone());

        let mut event = test_event_json("evt-1");
        event["payload"] = Value::String("not a mapping".to_owned());

        let response = app
            .oneshot(process_request("/process", &event))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = response_json(response).await;
        assert_eq!(body["detail"], "event rejected");
        assert!(body["causes"][0].as_str().unwrap().starts_with("invalid event: payload"));
        assert_eq!(state.cache().get("event:evt-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let app = make_app(test_state(ReplayCache::memory(), "http://127.0.0.1:1/"));

        let request = Request::post("/process")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_cache_down() {
        let sink = MiniSink::start().await;
        let state = test_state(unreachable_cache(), &sink.url());
        let app = make_app(state.clone());

        let response = app
            .oneshot(process_request("/process", &test_event_json("evt-1")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response_json(response).await;
        assert_eq!(body["detail"], "failed to persist event");
        assert_eq!(body["causes"][0], "replay cache unavailable");
        // Each cause is listed once, without repeating the message of its source.
        assert_eq!(body["causes"][1], "failed to interact with the redis pool");
        assert_eq!(state.processor().metrics().processed(), 0);
        assert_eq!(sink.captured().len(), 0);
    }

    #[tokio::test]
    async fn test_wrong_method() {
        let app = make_app(test_state(ReplayCache::memory(), "http://127.0.0.1:1/"));

        let request = Request::get("/process").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
