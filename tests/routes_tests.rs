use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::{TimeZone, Utc};
use parla::server::assist::{AssistError, Assistant, TextGenerator};
use parla::server::config::ServerConfig;
use parla::server::hub::SignalingHub;
use parla::server::routes::{router, AppState};
use parla::server::video::{AccessToken, CallInfrastructure, CallRoom, VideoError};
use serde_json::{json, Value};
use tower::ServiceExt;

/// Answers every prompt with the same text and remembers the prompts.
struct Canned {
    answer: Result<String, AssistError>,
    prompts: Mutex<Vec<String>>,
}

impl Canned {
    fn ok(answer: &str) -> Arc<Self> {
        Arc::new(Self { answer: Ok(answer.to_string()), prompts: Mutex::new(Vec::new()) })
    }

    fn failing(err: AssistError) -> Arc<Self> {
        Arc::new(Self { answer: Err(err), prompts: Mutex::new(Vec::new()) })
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for Canned {
    async fn generate(&self, prompt: &str) -> Result<String, AssistError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.answer {
            Ok(text) => Ok(text.clone()),
            Err(AssistError::QuotaExceeded) => Err(AssistError::QuotaExceeded),
            Err(AssistError::InvalidCredentials) => Err(AssistError::InvalidCredentials),
            Err(AssistError::NotConfigured) => Err(AssistError::NotConfigured),
            Err(AssistError::Upstream(m)) => Err(AssistError::Upstream(m.clone())),
        }
    }
}

struct FakeVideo;

#[async_trait]
impl CallInfrastructure for FakeVideo {
    fn api_key(&self) -> &str {
        "public-key"
    }

    fn issue_token(&self, user_id: &str) -> Result<AccessToken, VideoError> {
        Ok(AccessToken {
            token: format!("token-for-{}", user_id),
            user_id: user_id.to_string(),
            expires_at: Utc.timestamp_opt(1_900_000_000, 0).unwrap(),
        })
    }

    async fn create_call(&self, call_id: &str, creator_id: &str, members: &[String]) -> Result<CallRoom, VideoError> {
        if call_id == "broken" {
            return Err(VideoError::Call("service said no".into()));
        }
        let mut all = vec![creator_id.to_string()];
        all.extend(members.iter().cloned());
        Ok(CallRoom {
            call_id: call_id.to_string(),
            call_type: "default".to_string(),
            created_by: creator_id.to_string(),
            members: all,
            details: None,
        })
    }
}

fn app(generator: Option<Arc<Canned>>, video: bool) -> axum::Router {
    let state = AppState {
        assistant: Assistant::new(generator.map(|g| g as Arc<dyn TextGenerator>)),
        video: video.then(|| Arc::new(FakeVideo) as Arc<dyn CallInfrastructure>),
        hub: SignalingHub::new(),
    };
    router(state, &ServerConfig::default())
}

async fn call(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_hub_stats() {
    let (status, body) = call(app(None, false), Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["onlineUsers"], 0);
    assert_eq!(body["activeCalls"], 0);
}

#[tokio::test]
async fn translate_returns_cleaned_text() {
    let generator = Canned::ok("  \"Ciao, come stai?\"  ");
    let (status, body) = call(
        app(Some(generator.clone()), false),
        post("/api/ai/translate", json!({"text": "Hi, how are you?", "targetLanguage": "Italian"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["translatedText"], "Ciao, come stai?");
    assert_eq!(body["sourceLanguage"], "auto-detected");
    assert!(body.get("skipped").is_none());
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn translate_same_language_is_skipped() {
    let generator = Canned::ok("unused");
    let (status, body) = call(
        app(Some(generator.clone()), false),
        post(
            "/api/ai/translate",
            json!({"text": "Hello", "targetLanguage": "English", "sourceLanguage": "english"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["translatedText"], "Hello");
    assert_eq!(body["skipped"], true);
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn translate_requires_text_and_target() {
    let (status, body) =
        call(app(Some(Canned::ok("x")), false), post("/api/ai/translate", json!({"text": "Hello"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Text and target language are required");
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let request = Request::post("/api/ai/translate")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = call(app(Some(Canned::ok("x")), false), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn ai_without_key_is_unavailable() {
    let (status, body) =
        call(app(None, false), post("/api/ai/translate", json!({"text": "Hi", "targetLanguage": "French"}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn quota_errors_map_to_429() {
    let generator = Canned::failing(AssistError::QuotaExceeded);
    let (status, _) = call(
        app(Some(generator), false),
        post("/api/ai/suggestions", json!({"conversationHistory": [{"text": "hey", "isSent": false}]})),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn suggestions_are_parsed_from_numbered_lines() {
    let generator = Canned::ok("1. Sure!\n2. Sounds good\n3. Maybe later\n4. Extra");
    let (status, body) = call(
        app(Some(generator), false),
        post(
            "/api/ai/suggestions",
            json!({"conversationHistory": [{"text": "Pizza tonight?", "isSent": false}]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["suggestions"], json!(["Sure!", "Sounds good", "Maybe later"]));
}

#[tokio::test]
async fn suggestions_need_history() {
    let (status, _) =
        call(app(Some(Canned::ok("1. a")), false), post("/api/ai/suggestions", json!({"conversationHistory": []})))
            .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn typing_assist_short_input_yields_nothing() {
    let generator = Canned::ok("1. should not be used");
    let (status, body) =
        call(app(Some(generator.clone()), false), post("/api/ai/typing-assist", json!({"partialText": "h"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["suggestions"], json!([]));
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn voice_reply_command_sends_text() {
    let (status, body) = call(
        app(Some(Canned::ok("unused")), false),
        post("/api/ai/voice-command", json!({"command": "reply see you at eight"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["action"], "send");
    assert_eq!(body["text"], "see you at eight");
}

#[tokio::test]
async fn stream_token_for_caller() {
    let request = Request::get("/api/stream/token").header("x-user-id", "alice").body(Body::empty()).unwrap();
    let (status, body) = call(app(None, true), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token"], "token-for-alice");
    assert_eq!(body["apiKey"], "public-key");
    assert_eq!(body["userId"], "alice");
}

#[tokio::test]
async fn stream_token_requires_identity() {
    let (status, body) = call(app(None, true), Request::get("/api/stream/token").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn stream_not_configured_is_503_with_code() {
    let request = Request::get("/api/stream/token").header("x-user-id", "alice").body(Body::empty()).unwrap();
    let (status, body) = call(app(None, false), request).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "STREAM_NOT_CONFIGURED");
}

#[tokio::test]
async fn create_call_returns_room() {
    let mut request = post("/api/stream/create-call", json!({"callId": "room_1", "members": ["bob"]}));
    request.headers_mut().insert("x-user-id", "alice".parse().unwrap());
    let (status, body) = call(app(None, true), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["callId"], "room_1");
    assert_eq!(body["call"]["createdBy"], "alice");
    assert_eq!(body["call"]["members"], json!(["alice", "bob"]));
}

#[tokio::test]
async fn create_call_validates_call_id() {
    let mut request = post("/api/stream/create-call", json!({"callId": "no spaces!"}));
    request.headers_mut().insert("x-user-id", "alice".parse().unwrap());
    let (status, _) = call(app(None, true), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut request = post("/api/stream/create-call", json!({}));
    request.headers_mut().insert("x-user-id", "alice".parse().unwrap());
    let (status, _) = call(app(None, true), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_call_failure_carries_code() {
    let mut request = post("/api/stream/create-call", json!({"callId": "broken"}));
    request.headers_mut().insert("x-user-id", "alice".parse().unwrap());
    let (status, body) = call(app(None, true), request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "STREAM_CALL_ERROR");
}

#[tokio::test]
async fn null_history_fields_are_tolerated() {
    let generator = Canned::ok("1. Nice photo!\n2. Love it");
    let (status, body) = call(
        app(Some(generator.clone()), false),
        post(
            "/api/ai/suggestions",
            json!({"conversationHistory": [{"text": null, "isSent": false}, {"text": "look at this", "isSent": true}]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["suggestions"], json!(["Nice photo!", "Love it"]));

    let (status, body) = call(
        app(Some(generator.clone()), false),
        post("/api/ai/typing-assist", json!({"partialText": "see you", "conversationHistory": null})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["suggestions"], json!(["Nice photo!", "Love it"]));

    let (status, body) = call(
        app(Some(generator), false),
        post(
            "/api/ai/voice-command",
            json!({
                "command": "read the last message",
                "conversationHistory": null,
                "lastMessage": {"text": "dinner at 8?", "isSent": false}
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["action"], "speak");
    assert_eq!(body["text"], "Message from your friend: dinner at 8?");
}
