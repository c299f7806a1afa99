use async_trait::async_trait;
use reqwest::Client;

use crate::chat::{
    models::{ChatRequest, ProviderReply},
    ChatError,
};

#[async_trait]
pub trait AnswerProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Sends one transcript. Only transport failures are errors here; status
    /// and body interpretation belong to the session.
    async fn send(&self, request: &ChatRequest) -> Result<ProviderReply, ChatError>;
}

/// Posts transcripts to the relay route over HTTP.
pub struct HttpAnswerProvider {
    client: Client,
    endpoint: String,
}

impl HttpAnswerProvider {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: Client::new(),
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AnswerProvider for HttpAnswerProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, request: &ChatRequest) -> Result<ProviderReply, ChatError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        Ok(ProviderReply { status, body })
    }
}
