use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub question: String,
}

/// API-Gateway proxy envelope: the payload travels as a JSON string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrappedQuestion {
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayAnswer {
    /// `None` when the gateway replied without an answer field.
    pub answer: Option<String>,
}
