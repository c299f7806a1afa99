use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::answer::{self, NO_ANSWER};
use crate::chat::{
    models::{ChatRequest, Message, ProviderReply, Role},
    provider::AnswerProvider,
    ChatError, OverlapPolicy,
};
use crate::config::ChatConfig;

/// Receives request lifecycle notifications. All methods default to no-ops.
///
/// Callbacks run on the request task after the session lock is released, so
/// they may call back into the session.
pub trait SessionObserver: Send + Sync {
    /// The provider answered; called before the body is interpreted.
    fn on_response(&self, _reply: &ProviderReply) {}

    /// An assistant message was appended.
    fn on_finish(&self, _message: &Message) {}

    /// The request failed, or was cancelled before it settled.
    fn on_error(&self, _error: &ChatError) {}
}

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub id: Option<String>,
    pub initial_messages: Vec<Message>,
    pub initial_draft: String,
    pub overlap_policy: OverlapPolicy,
    pub fallback_answer: Option<String>,
}

impl SessionOptions {
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.initial_messages = messages;
        self
    }

    pub fn with_draft(mut self, draft: impl Into<String>) -> Self {
        self.initial_draft = draft.into();
        self
    }

    pub fn with_overlap_policy(mut self, policy: OverlapPolicy) -> Self {
        self.overlap_policy = policy;
        self
    }

    pub fn with_fallback_answer(mut self, fallback: impl Into<String>) -> Self {
        self.fallback_answer = Some(fallback.into());
        self
    }
}

impl From<&ChatConfig> for SessionOptions {
    fn from(config: &ChatConfig) -> Self {
        SessionOptions::default()
            .with_overlap_policy(config.overlap_policy)
            .with_fallback_answer(config.fallback_answer.clone())
    }
}

struct ActiveRequest {
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct SessionState {
    messages: Vec<Message>,
    draft: String,
    active: Option<ActiveRequest>,
    generation: u64,
}

/// One conversation with the answer provider.
///
/// A user message spawns the task that waits for the provider, so user
/// appends outside a Tokio runtime fail with [`ChatError::NoRuntime`].
pub struct ChatSession {
    id: String,
    policy: OverlapPolicy,
    fallback_answer: String,
    provider: Arc<dyn AnswerProvider>,
    observer: Option<Arc<dyn SessionObserver>>,
    state: Arc<Mutex<SessionState>>,
}

impl ChatSession {
    pub fn new(provider: Arc<dyn AnswerProvider>, options: SessionOptions) -> Self {
        let id = options.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let state = SessionState {
            messages: options.initial_messages,
            draft: options.initial_draft,
            ..Default::default()
        };

        Self {
            id,
            policy: options.overlap_policy,
            fallback_answer: options
                .fallback_answer
                .unwrap_or_else(|| NO_ANSWER.to_string()),
            provider,
            observer: None,
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn messages(&self) -> Vec<Message> {
        lock(&self.state).messages.clone()
    }

    pub fn message_count(&self) -> usize {
        lock(&self.state).messages.len()
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.state).active.is_some()
    }

    pub fn draft(&self) -> String {
        lock(&self.state).draft.clone()
    }

    pub fn set_draft(&self, draft: impl Into<String>) {
        lock(&self.state).draft = draft.into();
    }

    /// Replaces the whole log. An in-flight request keeps running and its
    /// answer lands on the new log.
    pub fn set_messages(&self, messages: Vec<Message>) {
        lock(&self.state).messages = messages;
    }

    /// Stops any in-flight request and clears the log and draft.
    pub fn reset(&self) {
        self.stop();
        let mut state = lock(&self.state);
        state.messages.clear();
        state.draft.clear();
    }

    /// Appends a message. A user message also starts a request carrying the
    /// whole transcript; its handle is returned so callers can wait for it.
    pub fn append(
        &self,
        role: Role,
        content: impl Into<String>,
    ) -> Result<Option<PendingReply>, ChatError> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(ChatError::EmptyContent);
        }

        let runtime = match role {
            Role::User => Some(Handle::try_current().map_err(|_| ChatError::NoRuntime)?),
            Role::Assistant => None,
        };

        let mut state = lock(&self.state);

        if role == Role::User && self.policy == OverlapPolicy::Reject && state.active.is_some() {
            debug!("Rejecting user message for session {}: request in flight", self.id);
            return Err(ChatError::RequestInFlight);
        }

        state.messages.push(Message::new(role, content));
        let Some(runtime) = runtime else {
            return Ok(None);
        };

        if let Some(previous) = state.active.take() {
            info!(
                "Superseding request {} for session {}",
                previous.generation, self.id
            );
            previous.cancel.cancel();
        }

        state.generation += 1;
        let generation = state.generation;
        let cancel = CancellationToken::new();
        state.active = Some(ActiveRequest {
            generation,
            cancel: cancel.clone(),
        });
        let request = ChatRequest {
            messages: state.messages.clone(),
        };
        drop(state);

        debug!(
            "Starting request {} for session {} with {} messages",
            generation,
            self.id,
            request.messages.len()
        );

        let task = RequestTask {
            session_id: self.id.clone(),
            generation,
            cancel,
            fallback_answer: self.fallback_answer.clone(),
            provider: Arc::clone(&self.provider),
            observer: self.observer.clone(),
            state: Arc::clone(&self.state),
        };
        let handle = runtime.spawn(task.run(request));

        Ok(Some(PendingReply { generation, handle }))
    }

    /// Trims `draft` and sends it as a user message. Blank input is a no-op.
    pub fn submit(&self, draft: &str) -> Result<Option<PendingReply>, ChatError> {
        let trimmed = draft.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let pending = self.append(Role::User, trimmed)?;
        lock(&self.state).draft.clear();
        Ok(pending)
    }

    /// Submits the stored draft.
    pub fn handle_submit(&self) -> Result<Option<PendingReply>, ChatError> {
        let draft = self.draft();
        self.submit(&draft)
    }

    /// Cancels the in-flight request, if any. Calling it when idle does nothing.
    pub fn stop(&self) {
        let mut state = lock(&self.state);
        if let Some(active) = state.active.take() {
            active.cancel.cancel();
            info!("Stopped request {} for session {}", active.generation, self.id);
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Handle on a spawned request. Dropping it does not cancel the request.
pub struct PendingReply {
    generation: u64,
    handle: JoinHandle<()>,
}

impl PendingReply {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_settled(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits until the request has settled and the session state reflects it.
    pub async fn settled(self) {
        if let Err(e) = self.handle.await {
            error!("Chat request task {} failed: {}", self.generation, e);
        }
    }
}

struct RequestTask {
    session_id: String,
    generation: u64,
    cancel: CancellationToken,
    fallback_answer: String,
    provider: Arc<dyn AnswerProvider>,
    observer: Option<Arc<dyn SessionObserver>>,
    state: Arc<Mutex<SessionState>>,
}

impl RequestTask {
    async fn run(self, request: ChatRequest) {
        // Dropping the provider future on cancellation aborts the transport.
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ChatError::Cancelled),
            reply = self.provider.send(&request) => reply,
        };
        self.settle(outcome);
    }

    fn settle(self, outcome: Result<ProviderReply, ChatError>) {
        let current = self.is_current(&lock(&self.state));
        if !current {
            self.discard();
            return;
        }

        // The raw reply goes out before it is interpreted or appended.
        if let (Some(observer), Ok(reply)) = (&self.observer, &outcome) {
            observer.on_response(reply);
        }

        let mut state = lock(&self.state);
        if !self.is_current(&state) {
            drop(state);
            self.discard();
            return;
        }

        state.active = None;
        let result = outcome
            .and_then(|reply| self.interpret(&reply))
            .map(|content| {
                let message = Message::new(Role::Assistant, content);
                state.messages.push(message.clone());
                message
            });
        drop(state);

        match result {
            Ok(message) => {
                debug!(
                    "Request {} for session {} answered",
                    self.generation, self.session_id
                );
                if let Some(observer) = &self.observer {
                    observer.on_finish(&message);
                }
            }
            Err(e) => {
                error!(
                    "Request {} for session {} failed: {}",
                    self.generation, self.session_id, e
                );
                if let Some(observer) = &self.observer {
                    observer.on_error(&e);
                }
            }
        }
    }

    fn is_current(&self, state: &SessionState) -> bool {
        state
            .active
            .as_ref()
            .is_some_and(|active| active.generation == self.generation)
    }

    fn discard(&self) {
        debug!(
            "Discarding request {} for session {}: no longer current",
            self.generation, self.session_id
        );
        if let Some(observer) = &self.observer {
            observer.on_error(&ChatError::Cancelled);
        }
    }

    fn interpret(&self, reply: &ProviderReply) -> Result<String, ChatError> {
        if !reply.is_success() {
            return Err(ChatError::Provider {
                status: reply.status,
                body: reply.body.clone(),
            });
        }

        let value: serde_json::Value = serde_json::from_str(&reply.body).map_err(|e| {
            warn!("Unparseable provider body: {}", reply.body);
            ChatError::MalformedResponse(e.to_string())
        })?;

        let answer = answer::extract_answer(&value).map_err(|e| {
            warn!("Provider body without a usable answer: {}", reply.body);
            ChatError::from(e)
        })?;

        Ok(answer
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| self.fallback_answer.clone()))
    }
}

fn lock(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
