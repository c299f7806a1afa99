use serde::{Deserialize, Serialize};

/// One transcript entry as the browser sends it. Unknown roles pass through.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct RelayRequest {
    #[serde(default)]
    pub messages: Vec<RelayMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub answer: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RelayErrorResponse {
    pub error: String,
    pub details: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
}

#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_offset")]
    pub offset: usize,
}

fn default_limit() -> usize {
    100
}

fn default_offset() -> usize {
    0
}
