use serde::Deserialize;

use crate::chat::OverlapPolicy;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "ragchat.duckdb".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub upload_dir: String,
    pub max_upload_mb: u64,
}

impl StorageConfig {
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: "uploads".to_string(),
            max_upload_mb: 25,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpGatewayConfig {
    pub url: String,
    /// Send `{"body": "<json>"}` instead of a bare `{"question": ...}` object.
    #[serde(default = "default_wrap_body")]
    pub wrap_body: bool,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MockGatewayConfig {
    pub answer: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    pub provider: String,
    pub http: Option<HttpGatewayConfig>,
    pub mock: Option<MockGatewayConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            http: None,
            mock: Some(MockGatewayConfig {
                answer: "This is a mock response. The actual API integration is not implemented yet."
                    .to_string(),
            }),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChatConfig {
    /// Relay endpoint the terminal client posts transcripts to.
    pub endpoint: String,
    pub fallback_answer: String,
    pub overlap_policy: OverlapPolicy,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/api/route".to_string(),
            fallback_answer: crate::answer::NO_ANSWER.to_string(),
            overlap_policy: OverlapPolicy::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl AppConfig {
    pub fn load(path: &str) -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("RAGCHAT").separator("__"))
            .build()?;

        let mut app_config: AppConfig = settings.try_deserialize()?;

        // Expand environment variables if present like ${RAG_GATEWAY_URL}
        app_config.server.host = expand_env(&app_config.server.host);
        app_config.database.path = expand_env(&app_config.database.path);
        app_config.storage.upload_dir = expand_env(&app_config.storage.upload_dir);
        app_config.chat.endpoint = expand_env(&app_config.chat.endpoint);

        if let Some(ref mut http) = app_config.gateway.http {
            http.url = expand_env(&http.url);
        }

        Ok(app_config)
    }
}

fn default_wrap_body() -> bool {
    true
}

fn expand_env(val: &str) -> String {
    match val.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
        Some(var_name) => std::env::var(var_name).unwrap_or_default(),
        None => val.to_string(),
    }
}
