use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use crate::answer;
use crate::config::HttpGatewayConfig;
use crate::gateway::{
    models::{GatewayAnswer, Question, WrappedQuestion},
    GatewayError, RagGateway,
};

pub struct HttpGateway {
    client: Client,
    url: String,
    wrap_body: bool,
}

impl HttpGateway {
    pub fn new(config: &HttpGatewayConfig) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            client: builder.build()?,
            url: config.url.clone(),
            wrap_body: config.wrap_body,
        })
    }

    fn payload(&self, question: &str) -> Result<serde_json::Value, GatewayError> {
        let question = Question {
            question: question.to_string(),
        };
        let value = if self.wrap_body {
            let body = serde_json::to_string(&question)
                .map_err(|e| GatewayError::Malformed(e.to_string()))?;
            serde_json::to_value(WrappedQuestion { body })
        } else {
            serde_json::to_value(question)
        };
        value.map_err(|e| GatewayError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl RagGateway for HttpGateway {
    fn name(&self) -> &str {
        "http"
    }

    async fn ask(&self, question: &str) -> Result<GatewayAnswer, GatewayError> {
        let body = self.payload(question)?;

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(GatewayError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        debug!("Raw gateway response: {}", text);

        let json: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
            warn!("Gateway returned non-JSON body: {}", text);
            GatewayError::Malformed(e.to_string())
        })?;

        let answer = answer::extract_answer(&json).map_err(|e| {
            warn!("Gateway body without a usable answer: {}", text);
            GatewayError::from(e)
        })?;

        Ok(GatewayAnswer { answer })
    }
}
