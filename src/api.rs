//! REST API server for the orchestrator
//!
//! Exposes chat, streaming chat and the comprehensive analysis over HTTP

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::stream::unfold;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::Orchestrator;
use crate::models::{ChatRequest, ProgressEvent};

/// Buffered progress events per streaming request
const STREAM_BUFFER: usize = 16;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct AnalysisRequest {
    pub user_id: String,
    pub query: Option<String>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

fn validate_chat(req: &ChatRequest) -> Result<(), (StatusCode, Json<ApiResponse>)> {
    if req.user_id.trim().is_empty() || req.query.trim().is_empty() {
        warn!("Rejecting chat request without user_id or query");
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Both user_id and query are required")),
        ));
    }
    Ok(())
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Chat Endpoints
/// =============================

async fn chat_handler(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    if let Err(rejection) = validate_chat(&req) {
        return rejection;
    }

    info!(user_id = %req.user_id, "Received chat request");
    let response = state.orchestrator.handle_query(req).await;
    (StatusCode::OK, Json(ApiResponse::success(response)))
}

async fn chat_stream_handler(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> Response {
    if let Err(rejection) = validate_chat(&req) {
        return rejection.into_response();
    }

    info!(user_id = %req.user_id, "Received streaming chat request");
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        orchestrator.handle_query_stream(req, tx).await;
    });

    // Ends once the orchestrator drops its sender after the response event.
    let stream = unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        let data = serde_json::to_string(&event).unwrap_or_default();
        let sse = Event::default().event(event.kind()).data(data);
        Some((Ok::<_, Infallible>(sse), rx))
    });

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// =============================
/// Analysis Endpoint
/// =============================

async fn analysis_handler(
    State(state): State<ApiState>,
    Json(req): Json<AnalysisRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    if req.user_id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("user_id is required")),
        );
    }

    info!(user_id = %req.user_id, "Received comprehensive analysis request");
    let results = state
        .orchestrator
        .run_comprehensive_analysis(&req.user_id, req.query.as_deref())
        .await;
    (StatusCode::OK, Json(ApiResponse::success(results)))
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = ApiState { orchestrator };

    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/stream", post(chat_stream_handler))
        .route("/api/analysis", post(analysis_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ExecutionEngine;
    use crate::models::ExecutionPlan;
    use crate::planner::StaticPlanner;
    use crate::specialists::{CapabilitySlot, Specialist, SpecialistRegistry};
    use crate::testing::ScriptedGenerator;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn router(plan: ExecutionPlan) -> Router {
        let mut registry = SpecialistRegistry::new();
        registry
            .register(
                Specialist::builder("alert", "Financial alerts")
                    .sync_capability(CapabilitySlot::Alerts, |_| Ok(json!({"alerts": []})))
                    .dispatch(CapabilitySlot::Alerts)
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let orchestrator = Orchestrator::new(
            Box::new(StaticPlanner::new(plan)),
            ExecutionEngine::new(Arc::new(registry)),
            Arc::new(ScriptedGenerator::new("Hello from the advisor.")),
        );
        create_router(Arc::new(orchestrator))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = router(ExecutionPlan::NoneNeeded)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_chat_requires_user_and_query() {
        let response = router(ExecutionPlan::NoneNeeded)
            .oneshot(post_json("/api/chat", json!({"user_id": "", "query": "Hi"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Both user_id and query are required");
    }

    #[tokio::test]
    async fn test_chat_returns_answer_and_context() {
        let response = router(ExecutionPlan::NoneNeeded)
            .oneshot(post_json("/api/chat", json!({"user_id": "u1", "query": "Hi there"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["answer"], "Hello from the advisor.");
        assert_eq!(body["data"]["context"], json!({"intent": "GENERAL"}));
    }

    #[tokio::test]
    async fn test_chat_stream_emits_events() {
        let response = router(ExecutionPlan::from_names(["alert"]))
            .oneshot(post_json(
                "/api/chat/stream",
                json!({"user_id": "u1", "query": "alerts?"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("event: thinking"));
        assert!(text.contains("event: delegating"));
        assert!(text.contains("event: response"));
        assert!(text.contains("\"alert_report\""));
    }

    #[tokio::test]
    async fn test_analysis_returns_result_map() {
        let response = router(ExecutionPlan::NoneNeeded)
            .oneshot(post_json("/api/analysis", json!({"user_id": "u1"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let data = body["data"].as_object().unwrap();
        assert_eq!(data.len(), 5);
        assert_eq!(data["alerts"], json!({"alerts": []}));
        assert!(data["portfolio_summary"]["error"].is_string());
    }
}
