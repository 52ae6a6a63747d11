use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::server::config::ServerConfig;

#[derive(Debug, thiserror::Error)]
pub enum AssistError {
    #[error("AI service not available")]
    NotConfigured,
    #[error("invalid API key configuration")]
    InvalidCredentials,
    #[error("quota exceeded, try again later")]
    QuotaExceeded,
    #[error("generative service failed: {0}")]
    Upstream(String),
}

/// Opaque text-in/text-out generative service.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, AssistError>;
}

// -- Gemini REST client ------------------------------------------------------

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// `None` when no API key is configured.
    pub fn from_config(config: &ServerConfig) -> Option<Self> {
        let key = config.gemini_api_key.as_ref()?;
        Some(Self::new(key.clone(), config.gemini_model.clone(), config.gemini_base_url.clone()))
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, AssistError> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);
        let body = GenerateRequest {
            contents: vec![RequestContent { parts: vec![RequestPart { text: prompt }] }],
        };

        let url = reqwest::Url::parse_with_params(&url, &[("key", self.api_key.as_str())])
            .map_err(|e| AssistError::Upstream(format!("bad endpoint {}: {}", url, e)))?;

        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistError::Upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_failure(status.as_u16(), &text));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AssistError::Upstream(format!("unreadable response: {}", e)))?;
        let text: String = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect();
        if text.is_empty() {
            return Err(AssistError::Upstream("empty completion".to_string()));
        }
        Ok(text)
    }
}

/// Maps a failed HTTP answer from the generative API onto the error taxonomy.
pub fn classify_failure(status: u16, body: &str) -> AssistError {
    let lowered = body.to_ascii_lowercase();
    if status == 429 || body.contains("RESOURCE_EXHAUSTED") || lowered.contains("quota") {
        AssistError::QuotaExceeded
    } else if status == 401 || status == 403 || body.contains("API_KEY") {
        AssistError::InvalidCredentials
    } else {
        let snippet: String = body.chars().take(200).collect();
        AssistError::Upstream(format!("HTTP {}: {}", status, snippet))
    }
}

// -- Chat features -----------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatLine {
    /// Image-only messages arrive with `null` text.
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_sent: bool,
}

/// Treats an explicit JSON `null` like a missing field.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub original_text: String,
    pub translated_text: String,
    pub source_language: String,
    pub target_language: String,
    /// Source and target matched, so the text was returned untouched.
    pub skipped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceAction {
    Speak,
    Send,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceReply {
    pub action: VoiceAction,
    pub text: String,
}

impl VoiceReply {
    fn speak(text: impl Into<String>) -> Self {
        Self { action: VoiceAction::Speak, text: text.into() }
    }
}

const SUGGESTION_LIMIT: usize = 3;

/// Translation, reply suggestions, typing completion and voice commands on top of a `TextGenerator`.
#[derive(Clone)]
pub struct Assistant {
    generator: Option<Arc<dyn TextGenerator>>,
}

impl Assistant {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>) -> Self {
        Self { generator }
    }

    pub fn is_configured(&self) -> bool {
        self.generator.is_some()
    }

    fn generator(&self) -> Result<&dyn TextGenerator, AssistError> {
        self.generator.as_deref().ok_or(AssistError::NotConfigured)
    }

    pub async fn translate(
        &self,
        text: &str,
        target_language: &str,
        source_language: Option<&str>,
    ) -> Result<Translation, AssistError> {
        let generator = self.generator()?;

        if let Some(source) = source_language {
            if source.eq_ignore_ascii_case(target_language) {
                return Ok(Translation {
                    original_text: text.to_string(),
                    translated_text: text.to_string(),
                    source_language: source.to_string(),
                    target_language: target_language.to_string(),
                    skipped: true,
                });
            }
        }

        let from = source_language.unwrap_or("auto-detect the language");
        let prompt = format!(
            "You are a professional translator. Translate the following text from {from} to {to}.\n\n\
             Rules:\n\
             1. Return only the translated text\n\
             2. Keep the meaning and the tone; casual stays casual\n\
             3. If the text is already in {to}, return it unchanged\n\
             4. Leave emojis and special characters as they are\n\n\
             Text to translate: \"{text}\"\n\nTranslation:",
            from = from,
            to = target_language,
            text = text,
        );
        let answer = generator.generate(&prompt).await?;

        Ok(Translation {
            original_text: text.to_string(),
            translated_text: strip_quotes(answer.trim()).to_string(),
            source_language: source_language.unwrap_or("auto-detected").to_string(),
            target_language: target_language.to_string(),
            skipped: false,
        })
    }

    pub async fn suggest_replies(
        &self,
        history: &[ChatLine],
        current_message: Option<&str>,
    ) -> Result<Vec<String>, AssistError> {
        let generator = self.generator()?;
        let mut prompt = format!(
            "Based on this conversation, suggest 3 short, natural reply options (max 10 words each):\n\n{}\n\n",
            render_context(history, 5)
        );
        if let Some(draft) = current_message.map(str::trim).filter(|d| !d.is_empty()) {
            prompt.push_str(&format!("The user has started writing: \"{}\"\n\n", draft));
        }
        prompt.push_str(
            "Answer with exactly 3 numbered lines:\n1. [suggestion]\n2. [suggestion]\n3. [suggestion]\n\n\
             Keep them conversational and fitting the context. Emojis are welcome.",
        );

        let answer = generator.generate(&prompt).await?;
        Ok(parse_numbered(&answer, SUGGESTION_LIMIT))
    }

    /// Completions for a partially typed message. Fewer than 2 characters yields nothing.
    pub async fn complete_typing(&self, partial_text: &str, history: &[ChatLine]) -> Result<Vec<String>, AssistError> {
        if partial_text.chars().count() < 2 {
            return Ok(Vec::new());
        }
        let generator = self.generator()?;
        let prompt = format!(
            "Given this conversation:\n{}\n\nThe user is typing: \"{}\"\n\n\
             Suggest 2-3 short, conversational ways to complete the message.\n\
             Format:\n1. [completion]\n2. [completion]\n3. [completion]",
            render_context(history, 3),
            partial_text
        );

        let answer = generator.generate(&prompt).await?;
        Ok(parse_numbered(&answer, SUGGESTION_LIMIT))
    }

    pub async fn voice_command(
        &self,
        command: &str,
        history: &[ChatLine],
        last_message: Option<&ChatLine>,
    ) -> Result<VoiceReply, AssistError> {
        let generator = self.generator()?;
        let lowered = command.to_ascii_lowercase();

        if lowered.contains("read") || lowered.contains("message") {
            let Some(message) = last_message.or_else(|| history.last()) else {
                return Ok(VoiceReply::speak("No messages to read."));
            };
            let who = if message.is_sent { "you" } else { "your friend" };
            return Ok(VoiceReply::speak(format!("Message from {}: {}", who, message.text)));
        }

        if let Some(at) = lowered.find("reply") {
            let reply = format!("{}{}", &command[..at], &command[at + "reply".len()..]);
            let reply = reply.trim();
            if reply.is_empty() {
                return Ok(VoiceReply::speak("What would you like to reply?"));
            }
            return Ok(VoiceReply { action: VoiceAction::Send, text: reply.to_string() });
        }

        let prompt = format!(
            "You are the voice assistant of a chat app. The user said: \"{}\"\n\n\
             Answer naturally and helpfully, in a short conversational way.",
            command
        );
        let answer = generator.generate(&prompt).await?;
        Ok(VoiceReply::speak(answer.trim()))
    }
}

/// Last `limit` messages as `You: ...` / `Friend: ...` lines.
pub fn render_context(history: &[ChatLine], limit: usize) -> String {
    let start = history.len().saturating_sub(limit);
    history[start..]
        .iter()
        .map(|m| format!("{}: {}", if m.is_sent { "You" } else { "Friend" }, m.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Items of `N.`-numbered lines, at most `limit`.
pub fn parse_numbered(answer: &str, limit: usize) -> Vec<String> {
    answer
        .lines()
        .filter_map(|line| {
            let line = line.trim_start();
            let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
            if digits == 0 {
                return None;
            }
            line[digits..].strip_prefix('.').map(|rest| rest.trim().to_string())
        })
        .filter(|s| !s.is_empty())
        .take(limit)
        .collect()
}

/// Drops one leading and one trailing quote character.
pub fn strip_quotes(text: &str) -> &str {
    let text = text.strip_prefix(&['"', '\''][..]).unwrap_or(text);
    text.strip_suffix(&['"', '\''][..]).unwrap_or(text)
}
