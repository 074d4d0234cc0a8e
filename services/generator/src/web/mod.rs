pub mod rest;
pub mod state;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use rest::{
    active_handler, auto_retry_handler, clear_session_handler, connectivity_handler, continue_handler,
    generate_handler, get_series_handler, get_session_handler, mark_read_handler, retry_handler,
};
use state::AppState;

/// Builds the HTTP router over the shared state.
pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/series", post(generate_handler))
        .route("/series/{id}", get(get_series_handler))
        .route("/series/{id}/continue", post(continue_handler))
        .route("/series/{id}/days/{day}/read", post(mark_read_handler))
        .route(
            "/series/{id}/session",
            get(get_session_handler).delete(clear_session_handler),
        )
        .route("/series/{id}/active", get(active_handler))
        .route("/series/{id}/auto-retry", get(auto_retry_handler))
        .route("/series/{id}/retry", post(retry_handler))
        .route("/connectivity", put(connectivity_handler))
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use crate::config::GenerationSettings;
    use crate::orchestrator::{
        AutoRetryPolicy, AutoRetryScheduler, BackendGateway, BatchExecutor, GenerationService, RetryPolicy,
    };
    use crate::web::rest::{ActiveResponse, ContinueResponse, ErrorBody};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use devotional_core::ports::{PromptBuilder, Transport, TransportResponse};
    use devotional_core::profiles::RequestProfile;
    use devotional_core::{BatchPrompt, GeneratedSeries, GenerationError, GenerationRequest, Series};
    use serde::de::DeserializeOwned;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::watch;
    use tower::ServiceExt;

    struct RangePrompts;

    impl PromptBuilder for RangePrompts {
        fn build(&self, _profile: &RequestProfile, prompt: &BatchPrompt<'_>) -> GenerationRequest {
            GenerationRequest::new("m", 100, "s", format!("{}-{}", prompt.range.start, prompt.range.end))
        }
    }

    /// Answers any range, or fails with a network error while `down` is set.
    struct EchoBackend {
        down: AtomicBool,
    }

    #[async_trait]
    impl Transport for EchoBackend {
        async fn post_json(&self, _url: &str, body: &serde_json::Value) -> Result<TransportResponse, GenerationError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(GenerationError::Network("connection refused".to_string()));
            }
            let range = body["messages"][0]["content"].as_str().unwrap_or_default();
            let (start, end) = range.split_once('-').unwrap();
            let (start, end): (u32, u32) = (start.parse().unwrap(), end.parse().unwrap());
            let days: Vec<serde_json::Value> = (start..=end)
                .map(|n| serde_json::json!({"title": format!("Day {}", n), "reference": "Ps 1", "body": "..."}))
                .collect();
            let text = serde_json::json!({"title": "Held", "days": days}).to_string();
            Ok(TransportResponse {
                status: 200,
                body: serde_json::json!({"content": [{"type": "text", "text": text}]}).to_string(),
            })
        }
    }

    fn app() -> (Router, Arc<EchoBackend>) {
        let backend = Arc::new(EchoBackend {
            down: AtomicBool::new(false),
        });
        let settings = GenerationSettings {
            max_retries: 0,
            batch_pause: Duration::ZERO,
            ..GenerationSettings::default()
        };
        let executor = BatchExecutor::new(
            BackendGateway::new(backend.clone(), "https://backend.example", None),
            Arc::new(RangePrompts),
            "/generate",
            Duration::from_secs(30),
            RetryPolicy::from(&settings),
        );
        let store = Arc::new(MemoryStore::new());
        let service = GenerationService::new(executor, store.clone(), store, &settings);

        let (online, connectivity) = watch::channel(false);
        let scheduler = AutoRetryScheduler::new(
            Arc::new(service.clone()),
            connectivity,
            AutoRetryPolicy::new(Duration::from_secs(10), settings.job_timeout),
        );
        let state = Arc::new(AppState::new(service, scheduler, online));
        (router(state), backend)
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(json) => Body::from(json.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn json<T: DeserializeOwned>(bytes: &[u8]) -> T {
        serde_json::from_slice(bytes).unwrap()
    }

    fn context_body(length: u32) -> serde_json::Value {
        serde_json::json!({
            "requester": {"name": "Ada", "story": "Starting over in a new city"},
            "seriesLength": length,
            "dayDuration": 5,
            "translation": "ESV"
        })
    }

    #[tokio::test]
    async fn test_generate_then_read_and_inspect() {
        let (app, _backend) = app();

        let (status, body) = call(&app, Method::POST, "/series", Some(context_body(3))).await;
        assert_eq!(status, StatusCode::CREATED);
        let generated: GeneratedSeries = json(&body);
        assert_eq!(generated.days.len(), 3);
        let id = generated.series_id;

        let (status, body) = call(&app, Method::POST, &format!("/series/{}/days/2/read", id), None).await;
        assert_eq!(status, StatusCode::OK);
        let day: devotional_core::Day = json(&body);
        assert!(day.is_read);

        let (status, body) = call(&app, Method::GET, &format!("/series/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        let series: Series = json(&body);
        assert_eq!(series.title, "Held");
        assert_eq!(series.current_day, 3);

        let (_, body) = call(&app, Method::GET, &format!("/series/{}/active", id), None).await;
        assert!(!json::<ActiveResponse>(&body).active);

        let (status, body) = call(&app, Method::GET, &format!("/series/{}/session", id), None).await;
        assert_eq!(status, StatusCode::OK);
        let session: serde_json::Value = json(&body);
        assert_eq!(session["status"], "complete");

        let (status, _) = call(&app, Method::DELETE, &format!("/series/{}/session", id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, Method::GET, &format!("/series/{}/session", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_series_renders_error_body() {
        let (app, _backend) = app();
        let (status, body) = call(&app, Method::GET, &format!("/series/{}", uuid::Uuid::new_v4()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let error: ErrorBody = json(&body);
        assert_eq!(error.kind, "not_found");
        assert!(!error.retriable);
    }

    #[tokio::test]
    async fn test_failed_continuation_hands_series_to_auto_retry() {
        let (app, backend) = app();
        let (_, body) = call(&app, Method::POST, "/series", Some(context_body(3))).await;
        let id = json::<GeneratedSeries>(&body).series_id;

        backend.down.store(true, Ordering::SeqCst);
        let (status, body) = call(
            &app,
            Method::POST,
            &format!("/series/{}/continue", id),
            Some(serde_json::json!({"requested_total": 5})),
        )
        .await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        let error: ErrorBody = json(&body);
        assert_eq!(error.kind, "connectivity");
        assert!(error.retriable);

        let (status, _) = call(&app, Method::GET, &format!("/series/{}/auto-retry", id), None).await;
        assert_eq!(status, StatusCode::OK);

        // The backend recovers and the client comes online.
        backend.down.store(false, Ordering::SeqCst);
        let (status, _) = call(
            &app,
            Method::PUT,
            "/connectivity",
            Some(serde_json::json!({"online": true})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let mut generated = 0;
        for _ in 0..100 {
            let (_, body) = call(&app, Method::GET, &format!("/series/{}", id), None).await;
            generated = json::<Series>(&body).days.len();
            if generated == 5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(generated, 5);

        let (status, body) = call(
            &app,
            Method::POST,
            &format!("/series/{}/continue", id),
            Some(serde_json::json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json::<ContinueResponse>(&body).days.len(), 5);
    }
}
