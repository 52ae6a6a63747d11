//! HTTP surface for the AI and video glue.
//!
//! Every answer is JSON with a `success` flag; video failures also carry a
//! machine-readable `error` code.

pub mod ai;
pub mod stream;

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequestParts, State},
    http::{self, request::Parts, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::server::assist::{AssistError, Assistant};
use crate::server::config::ServerConfig;
use crate::server::hub::SignalingHub;
use crate::server::video::{CallInfrastructure, VideoError};

#[derive(Clone)]
pub struct AppState {
    pub assistant: Assistant,
    pub video: Option<Arc<dyn CallInfrastructure>>,
    pub hub: SignalingHub,
}

pub fn router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/api/ai/translate", post(ai::translate))
        .route("/api/ai/suggestions", post(ai::suggestions))
        .route("/api/ai/typing-assist", post(ai::typing_assist))
        .route("/api/ai/voice-command", post(ai::voice_command))
        .route("/api/stream/token", get(stream::token))
        .route("/api/stream/create-call", post(stream::create_call))
        .route("/health", get(health))
        .layer(cors_layer(config))
        .with_state(state)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins = if config.allows_any_origin() {
        AllowOrigin::any()
    } else {
        let list: Vec<HeaderValue> = config
            .client_origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect();
        AllowOrigin::list(list)
    };
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::OPTIONS])
        .allow_headers(Any)
}

pub async fn serve(listener: TcpListener, router: Router) -> anyhow::Result<()> {
    log::info!("[API] HTTP server listening on {}", listener.local_addr()?);
    axum::serve(listener, router).await?;
    Ok(())
}

/// GET /health
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.hub.stats().await;
    Json(json!({
        "status": "ok",
        "onlineUsers": stats.online_users,
        "connections": stats.connections,
        "activeCalls": stats.active_calls,
    }))
}

/// Identity of the caller, taken from the `x-user-id` header.
pub struct CallerId(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CallerId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| CallerId(v.to_string()))
            .ok_or_else(|| ApiError::BadRequest("x-user-id header is required".to_string()))
    }
}

/// Turns axum's body rejection into our 400 shape.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    /// Generative service failure plus the message used for generic failures.
    Assist(AssistError, &'static str),
    Video(VideoError),
}

impl From<VideoError> for ApiError {
    fn from(err: VideoError) -> Self {
        ApiError::Video(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({"success": false, "message": message}))).into_response()
            }
            ApiError::Assist(err, failure) => {
                log::error!("[AI] {}", err);
                let (status, message) = match err {
                    AssistError::NotConfigured => (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "AI service not available. Please check server configuration.",
                    ),
                    AssistError::InvalidCredentials => (StatusCode::SERVICE_UNAVAILABLE, "Invalid API key configuration"),
                    AssistError::QuotaExceeded => {
                        (StatusCode::TOO_MANY_REQUESTS, "AI quota exceeded. Please try again later.")
                    }
                    AssistError::Upstream(_) => (StatusCode::INTERNAL_SERVER_ERROR, failure),
                };
                (status, Json(json!({"success": false, "message": message}))).into_response()
            }
            ApiError::Video(err) => {
                log::error!("[VIDEO] {}", err);
                let status = match err {
                    VideoError::NotConfigured | VideoError::Auth(_) | VideoError::Client(_) => {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                    VideoError::Token(_) | VideoError::Call(_) | VideoError::Internal(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                let message = match err {
                    VideoError::NotConfigured => "Video service is not configured".to_string(),
                    VideoError::Auth(_) => "Video service authentication failed".to_string(),
                    VideoError::Client(_) => "Video service is temporarily unavailable".to_string(),
                    ref other => other.to_string(),
                };
                let body = json!({"success": false, "message": message, "error": err.code()});
                (status, Json(body)).into_response()
            }
        }
    }
}
