use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata for one uploaded file. `key` addresses the blob; `pathname` is
/// the name the uploader gave it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub key: String,
    pub pathname: String,
    pub content_type: String,
    pub size: i64,
    pub uploaded_at: DateTime<Utc>,
}
