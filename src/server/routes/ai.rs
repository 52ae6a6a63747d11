use axum::{extract::rejection::JsonRejection, extract::State, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use super::{json_body, ApiError, AppState};
use crate::server::assist::{null_as_default, ChatLine};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateRequest {
    pub text: Option<String>,
    pub target_language: Option<String>,
    pub source_language: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionsRequest {
    #[serde(default, deserialize_with = "null_as_default")]
    pub conversation_history: Vec<ChatLine>,
    pub current_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingAssistRequest {
    pub partial_text: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub conversation_history: Vec<ChatLine>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceCommandRequest {
    pub command: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub conversation_history: Vec<ChatLine>,
    pub last_message: Option<ChatLine>,
}

fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// POST /api/ai/translate
pub async fn translate(
    State(state): State<AppState>,
    payload: Result<Json<TranslateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = json_body(payload)?;
    let (Some(text), Some(target)) = (required(req.text), required(req.target_language)) else {
        return Err(ApiError::BadRequest("Text and target language are required".to_string()));
    };
    let source = required(req.source_language);

    let translation = state
        .assistant
        .translate(&text, &target, source.as_deref())
        .await
        .map_err(|e| ApiError::Assist(e, "Translation failed. Please try again."))?;

    let mut body = json!({
        "success": true,
        "originalText": translation.original_text,
        "translatedText": translation.translated_text,
        "sourceLanguage": translation.source_language,
        "targetLanguage": translation.target_language,
    });
    if translation.skipped {
        body["skipped"] = json!(true);
    }
    Ok(Json(body))
}

/// POST /api/ai/suggestions
pub async fn suggestions(
    State(state): State<AppState>,
    payload: Result<Json<SuggestionsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = json_body(payload)?;
    if req.conversation_history.is_empty() {
        return Err(ApiError::BadRequest("Conversation history is required".to_string()));
    }

    let suggestions = state
        .assistant
        .suggest_replies(&req.conversation_history, req.current_message.as_deref())
        .await
        .map_err(|e| ApiError::Assist(e, "Failed to generate suggestions"))?;
    Ok(Json(json!({"success": true, "suggestions": suggestions})))
}

/// POST /api/ai/typing-assist
pub async fn typing_assist(
    State(state): State<AppState>,
    payload: Result<Json<TypingAssistRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = json_body(payload)?;
    let partial = req.partial_text.unwrap_or_default();

    let suggestions = state
        .assistant
        .complete_typing(&partial, &req.conversation_history)
        .await
        .map_err(|e| ApiError::Assist(e, "Failed to generate typing assistance"))?;
    Ok(Json(json!({"success": true, "suggestions": suggestions})))
}

/// POST /api/ai/voice-command
pub async fn voice_command(
    State(state): State<AppState>,
    payload: Result<Json<VoiceCommandRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = json_body(payload)?;
    let Some(command) = required(req.command) else {
        return Err(ApiError::BadRequest("Voice command is required".to_string()));
    };

    let reply = state
        .assistant
        .voice_command(&command, &req.conversation_history, req.last_message.as_ref())
        .await
        .map_err(|e| ApiError::Assist(e, "Failed to process voice command"))?;
    Ok(Json(json!({"success": true, "action": reply.action, "text": reply.text})))
}
