use std::sync::Arc;

use autoquest_core::{AnswerSource, AutoQuestError, Resolver};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::error;

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub source: AnswerSource,
    pub low_confidence: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

pub fn router(resolver: Arc<Resolver>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/ask", post(ask))
        .layer(TraceLayer::new_for_http())
        .with_state(resolver)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "AutoQuest is running" }))
}

async fn ask(State(resolver): State<Arc<Resolver>>, Json(req): Json<AskRequest>) -> Response {
    let question = req.question.trim();
    if question.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "question must not be empty");
    }

    match resolver.resolve(question).await {
        Ok(res) => Json(AskResponse {
            answer: res.answer,
            source: res.source,
            low_confidence: res.low_confidence,
            score: res.score,
        })
        .into_response(),
        Err(AutoQuestError::InvalidArg(msg)) => error_response(StatusCode::BAD_REQUEST, &msg),
        Err(err) => {
            error!(error = %err, "could not resolve question");
            error_response(StatusCode::SERVICE_UNAVAILABLE, &err.to_string())
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use autoquest_core::{AnswerStore, GenerativeFallback, SimilarMatch, SimilarityIndex};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    struct NoIndex;

    #[async_trait]
    impl SimilarityIndex for NoIndex {
        async fn query(&self, _: &str, _: usize) -> autoquest_core::Result<Vec<SimilarMatch>> {
            Ok(Vec::new())
        }

        async fn add(&self, _: &str, _: &str) -> autoquest_core::Result<bool> {
            Ok(true)
        }
    }

    struct Canned(Option<&'static str>);

    #[async_trait]
    impl GenerativeFallback for Canned {
        async fn complete(&self, _: &str, _: &str) -> autoquest_core::Result<String> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| AutoQuestError::Model("connection refused".into()))
        }
    }

    fn app(dir: &tempfile::TempDir, reply: Option<&'static str>) -> Router {
        let store = AnswerStore::open(dir.path().join("qa.csv")).unwrap();
        router(Arc::new(Resolver::new(
            Arc::new(store),
            Arc::new(NoIndex),
            Arc::new(Canned(reply)),
        )))
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn ask_request(body: &str) -> Request<Body> {
        Request::post("/ask")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn root_reports_running() {
        let dir = tempfile::tempdir().unwrap();
        let req = Request::get("/").body(Body::empty()).unwrap();
        let (status, body) = send(app(&dir, None), req).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "AutoQuest is running");
    }

    #[tokio::test]
    async fn ask_returns_normalized_answer() {
        let dir = tempfile::tempdir().unwrap();
        let body = json!({ "question": "Are you comfortable with W2?\nYes\nNo" }).to_string();
        let (status, json) = send(app(&dir, Some("Yes, I am comfortable.")), ask_request(&body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["answer"], "Yes");
        assert_eq!(json["source"], "generated");
        assert_eq!(json["low_confidence"], false);
        assert!(json.get("score").is_none());
    }

    #[tokio::test]
    async fn blank_or_missing_question_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        for body in [r#"{"question":"   "}"#, "{}"] {
            let (status, json) = send(app(&dir, Some("Yes")), ask_request(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(json["error"].as_str().unwrap().contains("empty"));
        }
    }

    #[tokio::test]
    async fn generator_failure_maps_to_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let (status, json) = send(app(&dir, None), ask_request(r#"{"question":"Why us?"}"#)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(json["error"].as_str().unwrap().contains("connection refused"));
    }
}
