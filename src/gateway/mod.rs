pub mod http;
pub mod mock;
pub mod models;

use http::HttpGateway;
use mock::MockGateway;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::answer::ExtractError;
use crate::config::AppConfig;
use models::GatewayAnswer;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Network Error: {0}")]
    Network(String),
    #[error("Gateway Error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Malformed Gateway Response: {0}")]
    Malformed(String),
}

impl From<ExtractError> for GatewayError {
    fn from(err: ExtractError) -> Self {
        GatewayError::Malformed(err.to_string())
    }
}

/// The retrieval-augmented-generation backend that answers questions.
#[async_trait]
pub trait RagGateway: Send + Sync {
    fn name(&self) -> &str;

    async fn ask(&self, question: &str) -> Result<GatewayAnswer, GatewayError>;
}

/// Builds the configured gateway.
pub struct GatewayFactory;

impl GatewayFactory {
    pub fn create_default(config: &AppConfig) -> Option<Arc<dyn RagGateway>> {
        match config.gateway.provider.as_str() {
            "http" => {
                let cfg = config.gateway.http.as_ref()?;
                match HttpGateway::new(cfg) {
                    Ok(gateway) => Some(Arc::new(gateway)),
                    Err(e) => {
                        tracing::error!("Failed to build HTTP gateway client: {}", e);
                        None
                    }
                }
            }
            "mock" => {
                let cfg = config.gateway.mock.as_ref()?;
                Some(Arc::new(MockGateway::new(cfg.answer.clone())))
            }
            _ => None,
        }
    }
}
