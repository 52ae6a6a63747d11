use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::common::token::TokenSigner;
use crate::server::config::ServerConfig;

const CALL_TYPE: &str = "default";

#[derive(Debug, thiserror::Error)]
pub enum VideoError {
    #[error("video service is not configured")]
    NotConfigured,
    #[error("video service rejected the credentials: {0}")]
    Auth(String),
    #[error("video service is unreachable: {0}")]
    Client(String),
    #[error("failed to issue access token: {0}")]
    Token(String),
    #[error("failed to create call: {0}")]
    Call(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl VideoError {
    /// Machine-readable code returned to HTTP clients.
    pub fn code(&self) -> &'static str {
        match self {
            VideoError::NotConfigured => "STREAM_NOT_CONFIGURED",
            VideoError::Auth(_) => "STREAM_AUTH_ERROR",
            VideoError::Client(_) => "STREAM_CLIENT_ERROR",
            VideoError::Token(_) => "STREAM_TOKEN_ERROR",
            VideoError::Call(_) => "STREAM_CALL_ERROR",
            VideoError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub token: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRoom {
    pub call_id: String,
    pub call_type: String,
    pub created_by: String,
    pub members: Vec<String>,
    /// Raw call object as returned by the service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Opaque token-issuance and room-management service.
#[async_trait]
pub trait CallInfrastructure: Send + Sync {
    /// Public key clients need next to the token.
    fn api_key(&self) -> &str;

    fn issue_token(&self, user_id: &str) -> Result<AccessToken, VideoError>;

    async fn create_call(&self, call_id: &str, creator_id: &str, members: &[String]) -> Result<CallRoom, VideoError>;
}

/// Call ids accepted by the service: ASCII letters, digits, `-` and `_`.
pub fn is_valid_call_id(call_id: &str) -> bool {
    !call_id.is_empty()
        && call_id.len() <= 64
        && call_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Creator first, then the other members without duplicates or blanks.
pub fn call_members(creator_id: &str, members: &[String]) -> Vec<String> {
    let mut all = vec![creator_id.to_string()];
    for member in members.iter().map(|m| m.trim()).filter(|m| !m.is_empty()) {
        if !all.iter().any(|m| m == member) {
            all.push(member.to_string());
        }
    }
    all
}

#[derive(Debug, Serialize)]
struct GetOrCreateCall<'a> {
    data: CallData<'a>,
}

#[derive(Debug, Serialize)]
struct CallData<'a> {
    created_by_id: &'a str,
    members: Vec<MemberRequest<'a>>,
}

#[derive(Debug, Serialize)]
struct MemberRequest<'a> {
    user_id: &'a str,
}

pub struct StreamVideo {
    http: reqwest::Client,
    api_key: String,
    signer: TokenSigner,
    base_url: String,
    token_ttl_secs: u64,
}

impl StreamVideo {
    pub fn new(api_key: &str, api_secret: &str, base_url: &str, token_ttl_secs: u64) -> Result<Self, VideoError> {
        if api_key.is_empty() {
            return Err(VideoError::NotConfigured);
        }
        let signer = TokenSigner::new(api_secret).map_err(|_| VideoError::NotConfigured)?;
        Ok(Self {
            http: reqwest::Client::new(),
            api_key: api_key.to_string(),
            signer,
            base_url: base_url.trim_end_matches('/').to_string(),
            token_ttl_secs,
        })
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, VideoError> {
        match (&config.stream_api_key, &config.stream_api_secret) {
            (Some(key), Some(secret)) => Self::new(key, secret, &config.stream_base_url, config.stream_token_ttl_secs),
            _ => Err(VideoError::NotConfigured),
        }
    }

    fn issue_token_at(&self, user_id: &str, now: i64) -> Result<AccessToken, VideoError> {
        let token = self
            .signer
            .sign_user(user_id, now, self.token_ttl_secs)
            .map_err(|e| VideoError::Token(e.to_string()))?;
        let expires_at = Utc
            .timestamp_opt(now.saturating_add(self.token_ttl_secs as i64), 0)
            .single()
            .ok_or_else(|| VideoError::Token("expiry out of range".to_string()))?;
        Ok(AccessToken { token, user_id: user_id.to_string(), expires_at })
    }
}

fn transport_error(e: reqwest::Error) -> VideoError {
    if e.is_connect() || e.is_timeout() || e.is_request() {
        VideoError::Client(e.to_string())
    } else {
        VideoError::Internal(e.to_string())
    }
}

#[async_trait]
impl CallInfrastructure for StreamVideo {
    fn api_key(&self) -> &str {
        &self.api_key
    }

    fn issue_token(&self, user_id: &str) -> Result<AccessToken, VideoError> {
        self.issue_token_at(user_id, Utc::now().timestamp())
    }

    async fn create_call(&self, call_id: &str, creator_id: &str, members: &[String]) -> Result<CallRoom, VideoError> {
        if !is_valid_call_id(call_id) {
            return Err(VideoError::Call(format!("invalid call id {:?}", call_id)));
        }
        let members = call_members(creator_id, members);
        let server_token = self.signer.sign_server().map_err(|e| VideoError::Token(e.to_string()))?;

        let endpoint = format!("{}/video/call/{}/{}", self.base_url, CALL_TYPE, call_id);
        let url = reqwest::Url::parse_with_params(&endpoint, &[("api_key", self.api_key.as_str())])
            .map_err(|e| VideoError::Internal(format!("bad endpoint {}: {}", endpoint, e)))?;
        let body = GetOrCreateCall {
            data: CallData {
                created_by_id: creator_id,
                members: members.iter().map(|m| MemberRequest { user_id: m }).collect(),
            },
        };

        let response = self
            .http
            .post(url)
            .header("Authorization", server_token)
            .header("stream-auth-type", "jwt")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            let text = response.text().await.unwrap_or_default();
            return Err(VideoError::Auth(format!("HTTP {}: {}", status.as_u16(), text)));
        }
        if status.is_server_error() && status.as_u16() != 500 {
            return Err(VideoError::Client(format!("HTTP {}", status.as_u16())));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(VideoError::Call(format!("HTTP {}: {}", status.as_u16(), text)));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| VideoError::Call(format!("unreadable response: {}", e)))?;
        log::info!("[VIDEO] Call {} ready for {} member(s)", call_id, members.len());

        Ok(CallRoom {
            call_id: call_id.to_string(),
            call_type: CALL_TYPE.to_string(),
            created_by: creator_id.to_string(),
            members,
            details: payload.get("call").cloned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, Query},
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use std::collections::HashMap;

    fn service(base_url: &str) -> StreamVideo {
        StreamVideo::new("key", "secret", base_url, 600).unwrap()
    }

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn error_codes() {
        assert_eq!(VideoError::NotConfigured.code(), "STREAM_NOT_CONFIGURED");
        assert_eq!(VideoError::Auth(String::new()).code(), "STREAM_AUTH_ERROR");
        assert_eq!(VideoError::Client(String::new()).code(), "STREAM_CLIENT_ERROR");
        assert_eq!(VideoError::Token(String::new()).code(), "STREAM_TOKEN_ERROR");
        assert_eq!(VideoError::Call(String::new()).code(), "STREAM_CALL_ERROR");
        assert_eq!(VideoError::Internal(String::new()).code(), "INTERNAL_ERROR");
    }

    #[test]
    fn missing_credentials_are_not_configured() {
        assert!(matches!(StreamVideo::from_config(&ServerConfig::default()), Err(VideoError::NotConfigured)));
        let half = ServerConfig { stream_api_key: Some("key".into()), ..ServerConfig::default() };
        assert!(matches!(StreamVideo::from_config(&half), Err(VideoError::NotConfigured)));
        assert!(matches!(StreamVideo::new("key", "", "http://x", 60), Err(VideoError::NotConfigured)));
    }

    #[test]
    fn token_is_scoped_and_short_lived() {
        let video = service("http://unused");
        let token = video.issue_token_at("alice", 1_000).unwrap();
        assert_eq!(token.user_id, "alice");
        assert_eq!(token.expires_at.timestamp(), 1_600);

        let claims = TokenSigner::new("secret").unwrap().verify(&token.token).unwrap();
        assert_eq!(claims["user_id"], "alice");
        assert_eq!(claims["exp"], 1_600);
    }

    #[test]
    fn token_for_blank_user_is_a_token_error() {
        let video = service("http://unused");
        assert!(matches!(video.issue_token(""), Err(VideoError::Token(_))));
    }

    #[test]
    fn call_id_validation() {
        assert!(is_valid_call_id("call_64f0c1-1700000000"));
        assert!(!is_valid_call_id(""));
        assert!(!is_valid_call_id("../admin"));
        assert!(!is_valid_call_id(&"x".repeat(65)));
    }

    #[test]
    fn members_start_with_creator_and_are_unique() {
        let members = call_members("alice", &["bob".into(), "alice".into(), " ".into(), "bob".into()]);
        assert_eq!(members, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn create_call_sends_server_token_and_members() {
        let router = Router::new().route(
            "/video/call/:kind/:id",
            post(
                |Path((kind, id)): Path<(String, String)>,
                 Query(q): Query<HashMap<String, String>>,
                 headers: HeaderMap,
                 Json(body): Json<serde_json::Value>| async move {
                    assert_eq!(kind, "default");
                    assert_eq!(q.get("api_key").map(String::as_str), Some("key"));
                    assert_eq!(headers.get("stream-auth-type").unwrap(), "jwt");
                    let token = headers.get("authorization").unwrap().to_str().unwrap();
                    let claims = TokenSigner::new("secret").unwrap().verify(token).unwrap();
                    assert_eq!(claims["server"], true);
                    assert_eq!(body["data"]["created_by_id"], "alice");
                    assert_eq!(body["data"]["members"][1]["user_id"], "bob");
                    Json(serde_json::json!({"call": {"id": id, "type": kind}}))
                },
            ),
        );
        let base = spawn(router).await;

        let room = service(&base).create_call("x1", "alice", &["bob".into()]).await.unwrap();
        assert_eq!(room.call_id, "x1");
        assert_eq!(room.members, vec!["alice", "bob"]);
        assert_eq!(room.details.unwrap()["id"], "x1");
    }

    #[tokio::test]
    async fn rejected_credentials_are_auth_errors() {
        let router = Router::new().route(
            "/video/call/:kind/:id",
            post(|| async { (StatusCode::UNAUTHORIZED, "bad signature") }),
        );
        let base = spawn(router).await;
        let err = service(&base).create_call("x1", "alice", &[]).await.unwrap_err();
        assert_eq!(err.code(), "STREAM_AUTH_ERROR");
    }

    #[tokio::test]
    async fn other_failures_are_call_errors() {
        let router = Router::new().route(
            "/video/call/:kind/:id",
            post(|| async { (StatusCode::BAD_REQUEST, "members missing") }),
        );
        let base = spawn(router).await;
        let err = service(&base).create_call("x1", "alice", &[]).await.unwrap_err();
        assert_eq!(err.code(), "STREAM_CALL_ERROR");
    }

    #[tokio::test]
    async fn unreachable_service_is_a_client_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = service(&format!("http://{}", addr)).create_call("x1", "alice", &[]).await.unwrap_err();
        assert_eq!(err.code(), "STREAM_CLIENT_ERROR");
    }

    #[tokio::test]
    async fn invalid_call_id_never_reaches_the_service() {
        let err = service("http://unused.invalid").create_call("a/b", "alice", &[]).await.unwrap_err();
        assert_eq!(err.code(), "STREAM_CALL_ERROR");
    }
}
