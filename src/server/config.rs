use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub client_origins: Vec<String>,
    pub max_message_length: usize,
    pub ping_interval_secs: u64,
    pub idle_timeout_secs: u64,
    pub ring_timeout_secs: u64,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub stream_api_key: Option<String>,
    pub stream_api_secret: Option<String>,
    pub stream_base_url: String,
    pub stream_token_ttl_secs: u64,
    pub performance_log_path: String,
    pub performance_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_vars(|_| None)
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Builds the configuration from any variable source; unparsable values fall back to defaults.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |key: &str, default: u64| var(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default);
        let secret = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Self {
            host: var("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: var("SERVER_PORT").and_then(|p| p.trim().parse().ok()).unwrap_or(5001),
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            client_origins: var("CLIENT_ORIGINS")
                .unwrap_or_else(|| "http://localhost:5173".to_string())
                .split(',')
                .map(|o| o.trim().trim_end_matches('/').to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            max_message_length: parsed("MAX_MESSAGE_LENGTH", 16 * 1024) as usize,
            ping_interval_secs: parsed("PING_INTERVAL_SECS", 25),
            idle_timeout_secs: parsed("IDLE_TIMEOUT_SECS", 60),
            ring_timeout_secs: parsed("CALL_RING_TIMEOUT_SECS", 45),
            gemini_api_key: secret("GEMINI_API_KEY"),
            gemini_model: var("GEMINI_MODEL").unwrap_or_else(|| "gemini-pro".to_string()),
            gemini_base_url: var("GEMINI_BASE_URL")
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
            stream_api_key: secret("STREAM_API_KEY"),
            stream_api_secret: secret("STREAM_API_SECRET"),
            stream_base_url: var("STREAM_BASE_URL").unwrap_or_else(|| "https://video.stream-io-api.com".to_string()),
            stream_token_ttl_secs: parsed("STREAM_TOKEN_TTL_SECS", 3600),
            performance_log_path: var("PERFORMANCE_LOG_PATH")
                .unwrap_or_else(|| "data/parla_performance.log".to_string()),
            performance_interval_secs: parsed("PERFORMANCE_INTERVAL_SECS", 120).max(1),
        }
    }

    /// Socket server port: one above the HTTP port. `None` when the HTTP port is 65535.
    pub fn websocket_port(&self) -> Option<u16> {
        self.port.checked_add(1)
    }

    pub fn ring_timeout(&self) -> Option<Duration> {
        (self.ring_timeout_secs > 0).then(|| Duration::from_secs(self.ring_timeout_secs))
    }

    pub fn allows_any_origin(&self) -> bool {
        self.client_origins.iter().any(|o| o == "*")
    }

    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.allows_any_origin() || self.client_origins.iter().any(|o| o == origin.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub socket_url: String,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self {
            socket_url: env::var("PROBE_SOCKET_URL").unwrap_or_else(|_| "ws://127.0.0.1:5002".to_string()),
        }
    }
}
