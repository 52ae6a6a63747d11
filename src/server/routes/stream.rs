use axum::{extract::rejection::JsonRejection, extract::State, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use super::{json_body, ApiError, AppState, CallerId};
use crate::server::video::{is_valid_call_id, CallInfrastructure, VideoError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCallRequest {
    pub call_id: Option<String>,
    #[serde(default)]
    pub members: Vec<String>,
}

fn video(state: &AppState) -> Result<&dyn CallInfrastructure, ApiError> {
    state.video.as_deref().ok_or(ApiError::Video(VideoError::NotConfigured))
}

/// GET /api/stream/token
pub async fn token(State(state): State<AppState>, CallerId(user_id): CallerId) -> Result<impl IntoResponse, ApiError> {
    let video = video(&state)?;
    let token = video.issue_token(&user_id)?;
    log::info!("[VIDEO] Issued token for {} (expires {})", user_id, token.expires_at);

    Ok(Json(json!({
        "success": true,
        "token": token.token,
        "apiKey": video.api_key(),
        "userId": token.user_id,
        "expiresAt": token.expires_at,
    })))
}

/// POST /api/stream/create-call
pub async fn create_call(
    State(state): State<AppState>,
    CallerId(creator_id): CallerId,
    payload: Result<Json<CreateCallRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = json_body(payload)?;
    let Some(call_id) = req.call_id.filter(|id| !id.trim().is_empty()) else {
        return Err(ApiError::BadRequest("callId is required".to_string()));
    };
    if !is_valid_call_id(&call_id) {
        return Err(ApiError::BadRequest(
            "callId may only contain letters, digits, '-' and '_'".to_string(),
        ));
    }

    let room = video(&state)?.create_call(&call_id, &creator_id, &req.members).await?;
    Ok(Json(json!({
        "success": true,
        "callId": room.call_id,
        "message": "Call created successfully",
        "call": room,
    })))
}
