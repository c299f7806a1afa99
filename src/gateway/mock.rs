use async_trait::async_trait;

use crate::gateway::{models::GatewayAnswer, GatewayError, RagGateway};

/// Answers every question with the same text. Lets the UI run without a
/// deployed gateway.
pub struct MockGateway {
    answer: String,
}

impl MockGateway {
    pub fn new(answer: String) -> Self {
        Self { answer }
    }
}

#[async_trait]
impl RagGateway for MockGateway {
    fn name(&self) -> &str {
        "mock"
    }

    async fn ask(&self, _question: &str) -> Result<GatewayAnswer, GatewayError> {
        Ok(GatewayAnswer {
            answer: Some(self.answer.clone()),
        })
    }
}
