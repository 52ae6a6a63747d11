// HS256 JSON Web Tokens for the call infrastructure service
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ring::hmac;
use serde::{Deserialize, Serialize};

const JWT_HEADER: &[u8] = br#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("signing secret is empty")]
    EmptySecret,
    #[error("cannot sign a token for an empty user id")]
    EmptySubject,
    #[error("failed to encode token claims: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Claims of a token scoped to one user identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserClaims {
    pub user_id: String,
    pub iat: i64,
    pub exp: i64,
}

/// Claims of the server-side token used for REST calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerClaims {
    pub server: bool,
}

pub struct TokenSigner {
    key: hmac::Key,
}

impl TokenSigner {
    pub fn new(secret: &str) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::EmptySecret);
        }
        Ok(Self { key: hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes()) })
    }

    pub fn sign<C: Serialize>(&self, claims: &C) -> Result<String, TokenError> {
        let header = URL_SAFE_NO_PAD.encode(JWT_HEADER);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
        let signing_input = format!("{}.{}", header, payload);
        let tag = hmac::sign(&self.key, signing_input.as_bytes());
        Ok(format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(tag.as_ref())))
    }

    /// Signs a user token valid from `issued_at` for `ttl_secs` seconds.
    pub fn sign_user(&self, user_id: &str, issued_at: i64, ttl_secs: u64) -> Result<String, TokenError> {
        if user_id.is_empty() {
            return Err(TokenError::EmptySubject);
        }
        let claims = UserClaims {
            user_id: user_id.to_string(),
            iat: issued_at,
            exp: issued_at.saturating_add(ttl_secs as i64),
        };
        self.sign(&claims)
    }

    pub fn sign_server(&self) -> Result<String, TokenError> {
        self.sign(&ServerClaims { server: true })
    }

    /// Checks the signature and returns the decoded payload.
    pub fn verify(&self, token: &str) -> Option<serde_json::Value> {
        let (signing_input, signature) = token.rsplit_once('.')?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
        hmac::verify(&self.key, signing_input.as_bytes(), &signature).ok()?;
        let (_, payload) = signing_input.split_once('.')?;
        let payload = URL_SAFE_NO_PAD.decode(payload).ok()?;
        serde_json::from_slice(&payload).ok()
    }
}
