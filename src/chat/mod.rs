//! Client-side chat session.
//!
//! [`ChatSession`] owns the ordered message log and the lifecycle of the one
//! outbound request that turns a user message into an assistant reply.
//! The answer provider is reached through the [`AnswerProvider`] trait so the
//! session can run against the HTTP relay or an in-process double.

pub mod models;
pub mod provider;
pub mod session;

use serde::Deserialize;
use thiserror::Error;

use crate::answer::ExtractError;

pub use models::{ChatRequest, Message, ProviderReply, Role};
pub use provider::{AnswerProvider, HttpAnswerProvider};
pub use session::{ChatSession, PendingReply, SessionObserver, SessionOptions};

#[derive(Debug, Error)]
pub enum ChatError {
    /// Network failure before a status line was received.
    #[error("Transport Error: {0}")]
    Transport(String),
    /// The provider answered with a non-2xx status.
    #[error("Provider Error {status}: {body}")]
    Provider { status: u16, body: String },
    #[error("Malformed Response: {0}")]
    MalformedResponse(String),
    /// The request was stopped or superseded before it settled.
    #[error("Request Cancelled")]
    Cancelled,
    #[error("Message content is empty")]
    EmptyContent,
    #[error("A request is already in flight")]
    RequestInFlight,
    /// A user message was appended outside a Tokio runtime.
    #[error("No async runtime available to send the request")]
    NoRuntime,
}

impl From<ExtractError> for ChatError {
    fn from(err: ExtractError) -> Self {
        ChatError::MalformedResponse(err.to_string())
    }
}

/// What a user append does while another request is still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Cancel the in-flight request and start the new one.
    #[default]
    Supersede,
    /// Refuse the new user message with [`ChatError::RequestInFlight`].
    Reject,
}
