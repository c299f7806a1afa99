use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use async_trait::async_trait;
use ragchat::chat::{
    AnswerProvider, ChatError, ChatRequest, ChatSession, Message, OverlapPolicy, ProviderReply,
    Role, SessionObserver, SessionOptions,
};
use serde_json::json;
use tokio::sync::{oneshot, Notify};

enum Script {
    Reply(ProviderReply),
    Fail(&'static str),
    Gated(oneshot::Receiver<ProviderReply>),
}

#[derive(Default)]
struct ScriptedProvider {
    script: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ChatRequest>>,
    calls: AtomicUsize,
    started: Notify,
}

impl ScriptedProvider {
    fn new(script: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnswerProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send(&self, request: &ChatRequest) -> Result<ProviderReply, ChatError> {
        let next = self.script.lock().unwrap().pop_front();
        self.requests.lock().unwrap().push(request.clone());
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();

        match next {
            Some(Script::Reply(reply)) => Ok(reply),
            Some(Script::Fail(reason)) => Err(ChatError::Transport(reason.to_string())),
            Some(Script::Gated(rx)) => rx
                .await
                .map_err(|_| ChatError::Transport("gate dropped".to_string())),
            None => Err(ChatError::Transport("script exhausted".to_string())),
        }
    }
}

#[derive(Default)]
struct RecordingObserver {
    responses: Mutex<Vec<u16>>,
    finished: Mutex<Vec<Message>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingObserver {
    fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    fn finished(&self) -> Vec<Message> {
        self.finished.lock().unwrap().clone()
    }
}

impl SessionObserver for RecordingObserver {
    fn on_response(&self, reply: &ProviderReply) {
        self.responses.lock().unwrap().push(reply.status);
    }

    fn on_finish(&self, message: &Message) {
        self.finished.lock().unwrap().push(message.clone());
    }

    fn on_error(&self, error: &ChatError) {
        self.errors.lock().unwrap().push(format!("{:?}", error));
    }
}

/// Reads the session back from inside `on_response`.
#[derive(Default)]
struct SnapshotObserver {
    session: OnceLock<Weak<ChatSession>>,
    seen: Mutex<Vec<(u16, usize, bool)>>,
}

impl SessionObserver for SnapshotObserver {
    fn on_response(&self, reply: &ProviderReply) {
        if let Some(session) = self.session.get().and_then(Weak::upgrade) {
            self.seen.lock().unwrap().push((
                reply.status,
                session.message_count(),
                session.is_pending(),
            ));
        }
    }
}

fn answer(text: &str) -> Script {
    Script::Reply(ProviderReply::ok_json(&json!({ "answer": text })))
}

fn session_with(
    provider: Arc<ScriptedProvider>,
    options: SessionOptions,
) -> (ChatSession, Arc<RecordingObserver>) {
    let observer = Arc::new(RecordingObserver::default());
    let session = ChatSession::new(provider, options).with_observer(observer.clone());
    (session, observer)
}

#[tokio::test]
async fn appends_follow_call_order_with_unique_ids() {
    let provider = ScriptedProvider::new(vec![answer("c")]);
    let (session, _observer) = session_with(provider.clone(), SessionOptions::default());

    let pending = session.append(Role::User, "a").unwrap().unwrap();
    assert!(session.append(Role::Assistant, "b").unwrap().is_none());

    let contents: Vec<String> = session.messages().into_iter().map(|m| m.content).collect();
    assert_eq!(contents, vec!["a", "b"]);

    pending.settled().await;

    let messages = session.messages();
    let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["a", "b", "c"]);
    let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Assistant]);

    let mut ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 3);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn blank_submit_is_a_no_op() {
    let provider = ScriptedProvider::new(vec![]);
    let (session, observer) = session_with(provider.clone(), SessionOptions::default());

    assert!(session.submit("").unwrap().is_none());
    assert!(session.submit("   ").unwrap().is_none());
    assert!(session.submit("\t\n").unwrap().is_none());

    assert_eq!(session.message_count(), 0);
    assert!(!session.is_pending());
    tokio::task::yield_now().await;
    assert_eq!(provider.calls(), 0);
    assert!(observer.errors().is_empty());
}

#[tokio::test]
async fn pending_round_trip_on_success() {
    let provider = ScriptedProvider::new(vec![answer("hi")]);
    let (session, observer) = session_with(provider.clone(), SessionOptions::default());
    assert!(!session.is_pending());

    let pending = session.append(Role::User, "hello").unwrap().unwrap();
    assert!(session.is_pending());

    pending.settled().await;

    assert!(!session.is_pending());
    let messages = session.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "hello");
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, "hi");

    assert_eq!(observer.finished(), vec![messages[1].clone()]);
    assert_eq!(*observer.responses.lock().unwrap(), vec![200]);
    assert!(observer.errors().is_empty());

    let requests = provider.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].messages, vec![messages[0].clone()]);
}

#[tokio::test]
async fn transcript_carries_every_prior_message() {
    let provider = ScriptedProvider::new(vec![answer("one"), answer("two")]);
    let (session, _observer) = session_with(provider.clone(), SessionOptions::default());

    session.append(Role::User, "first").unwrap().unwrap().settled().await;
    session.append(Role::User, "second").unwrap().unwrap().settled().await;

    let requests = provider.requests.lock().unwrap();
    let sent: Vec<&str> = requests[1]
        .messages
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(sent, vec!["first", "one", "second"]);
}

#[tokio::test]
async fn submit_trims_and_clears_the_draft() {
    let provider = ScriptedProvider::new(vec![answer("ok")]);
    let (session, _observer) = session_with(
        provider,
        SessionOptions::default().with_draft("  what is in the manual?  "),
    );

    let pending = session.handle_submit().unwrap().unwrap();
    assert!(session.draft().is_empty());
    pending.settled().await;

    assert_eq!(session.messages()[0].content, "what is in the manual?");
}

#[tokio::test]
async fn transport_failure_leaves_log_untouched() {
    let provider = ScriptedProvider::new(vec![Script::Fail("connection reset")]);
    let (session, observer) = session_with(provider, SessionOptions::default());

    session.append(Role::User, "hello").unwrap().unwrap().settled().await;

    assert!(!session.is_pending());
    assert_eq!(session.message_count(), 1);
    assert_eq!(session.messages()[0].role, Role::User);
    let errors = observer.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Transport"));
    assert!(observer.finished().is_empty());
}

#[tokio::test]
async fn non_success_status_takes_the_failure_path() {
    let provider = ScriptedProvider::new(vec![Script::Reply(ProviderReply::new(
        502,
        "bad gateway",
    ))]);
    let (session, observer) = session_with(provider, SessionOptions::default());

    session.append(Role::User, "hello").unwrap().unwrap().settled().await;

    assert!(!session.is_pending());
    assert_eq!(session.message_count(), 1);
    assert_eq!(*observer.responses.lock().unwrap(), vec![502]);
    let errors = observer.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Provider { status: 502"));
}

#[tokio::test]
async fn malformed_bodies_take_the_failure_path() {
    let provider = ScriptedProvider::new(vec![
        Script::Reply(ProviderReply::new(200, "<html>oops</html>")),
        Script::Reply(ProviderReply::ok_json(&json!({ "body": "not json" }))),
        Script::Reply(ProviderReply::ok_json(&json!(["answer"]))),
    ]);
    let (session, observer) = session_with(provider, SessionOptions::default());

    for question in ["one", "two", "three"] {
        session.append(Role::User, question).unwrap().unwrap().settled().await;
    }

    assert_eq!(session.message_count(), 3);
    assert!(session.messages().iter().all(|m| m.role == Role::User));
    let errors = observer.errors();
    assert_eq!(errors.len(), 3);
    assert!(errors.iter().all(|e| e.starts_with("MalformedResponse")));
}

#[tokio::test]
async fn nested_string_body_matches_top_level_answer() {
    let provider = ScriptedProvider::new(vec![
        Script::Reply(ProviderReply::ok_json(&json!({ "body": "{\"answer\":\"x\"}" }))),
        answer("x"),
    ]);
    let (session, observer) = session_with(provider, SessionOptions::default());

    session.append(Role::User, "nested").unwrap().unwrap().settled().await;
    session.append(Role::User, "direct").unwrap().unwrap().settled().await;

    let messages = session.messages();
    assert_eq!(messages[1].content, "x");
    assert_eq!(messages[3].content, "x");
    assert!(observer.errors().is_empty());
}

#[tokio::test]
async fn missing_answer_uses_fallback_text() {
    let provider = ScriptedProvider::new(vec![
        Script::Reply(ProviderReply::ok_json(&json!({ "question": "q" }))),
        answer("   "),
    ]);
    let (session, _observer) = session_with(
        provider,
        SessionOptions::default().with_fallback_answer("Nothing found."),
    );

    session.append(Role::User, "q").unwrap().unwrap().settled().await;
    session.append(Role::User, "q again").unwrap().unwrap().settled().await;

    let messages = session.messages();
    assert_eq!(messages[1].content, "Nothing found.");
    assert_eq!(messages[3].content, "Nothing found.");
}

#[tokio::test]
async fn stop_without_active_request_does_nothing() {
    let provider = ScriptedProvider::new(vec![]);
    let (session, observer) = session_with(provider, SessionOptions::default());
    session.append(Role::Assistant, "welcome").unwrap();

    session.stop();
    session.stop();

    assert!(!session.is_pending());
    assert_eq!(session.message_count(), 1);
    assert!(observer.errors().is_empty());
}

#[tokio::test]
async fn stopped_request_never_resurrects() {
    let (tx, rx) = oneshot::channel();
    let provider = ScriptedProvider::new(vec![Script::Gated(rx)]);
    let (session, observer) = session_with(provider.clone(), SessionOptions::default());

    let pending = session.append(Role::User, "slow question").unwrap().unwrap();
    provider.started.notified().await;
    assert!(session.is_pending());

    session.stop();
    assert!(!session.is_pending());

    // The transport may still deliver; the session must ignore it.
    let _ = tx.send(ProviderReply::ok_json(&json!({ "answer": "late" })));
    pending.settled().await;

    assert!(!session.is_pending());
    assert_eq!(session.message_count(), 1);
    assert!(observer.finished().is_empty());
    assert_eq!(observer.errors(), vec!["Cancelled".to_string()]);
}

#[tokio::test]
async fn append_after_stop_proceeds() {
    let (_tx, rx) = oneshot::channel();
    let provider = ScriptedProvider::new(vec![Script::Gated(rx), answer("fresh")]);
    let (session, _observer) = session_with(
        provider.clone(),
        SessionOptions::default().with_overlap_policy(OverlapPolicy::Reject),
    );

    let stale = session.append(Role::User, "first").unwrap().unwrap();
    provider.started.notified().await;
    session.stop();

    let fresh = session.append(Role::User, "second").unwrap().unwrap();
    fresh.settled().await;
    stale.settled().await;

    let contents: Vec<String> = session.messages().into_iter().map(|m| m.content).collect();
    assert_eq!(contents, vec!["first", "second", "fresh"]);
    assert!(!session.is_pending());
}

#[tokio::test]
async fn reject_policy_refuses_overlapping_user_messages() {
    let (tx, rx) = oneshot::channel();
    let provider = ScriptedProvider::new(vec![Script::Gated(rx)]);
    let (session, _observer) = session_with(
        provider.clone(),
        SessionOptions::default().with_overlap_policy(OverlapPolicy::Reject),
    );

    let pending = session.append(Role::User, "first").unwrap().unwrap();
    session.set_draft("second");
    assert!(matches!(
        session.handle_submit(),
        Err(ChatError::RequestInFlight)
    ));
    assert_eq!(session.message_count(), 1);
    assert_eq!(session.draft(), "second");

    // Assistant messages are not requests and are still accepted.
    assert!(session.append(Role::Assistant, "note").unwrap().is_none());

    tx.send(ProviderReply::ok_json(&json!({ "answer": "done" })))
        .unwrap();
    pending.settled().await;

    assert_eq!(session.message_count(), 3);
    assert_eq!(provider.calls(), 1);
    assert!(!session.is_pending());
}

#[tokio::test]
async fn supersede_policy_cancels_the_older_request() {
    let (_tx, rx) = oneshot::channel();
    let provider = ScriptedProvider::new(vec![Script::Gated(rx), answer("second answer")]);
    let (session, observer) = session_with(provider.clone(), SessionOptions::default());

    let first = session.append(Role::User, "first").unwrap().unwrap();
    provider.started.notified().await;

    let second = session.append(Role::User, "second").unwrap().unwrap();
    assert!(session.is_pending());
    assert!(second.generation() > first.generation());

    first.settled().await;
    second.settled().await;

    let contents: Vec<String> = session.messages().into_iter().map(|m| m.content).collect();
    assert_eq!(contents, vec!["first", "second", "second answer"]);
    assert!(!session.is_pending());
    assert_eq!(observer.errors(), vec!["Cancelled".to_string()]);
    assert_eq!(observer.finished().len(), 1);

    let requests = provider.requests.lock().unwrap();
    assert_eq!(requests[1].messages.len(), 2);
}

#[tokio::test]
async fn sessions_do_not_share_state() {
    let provider = ScriptedProvider::new(vec![answer("for a")]);
    let (a, _) = session_with(provider.clone(), SessionOptions::default().with_id("a"));
    let (b, _) = session_with(provider, SessionOptions::default().with_id("b"));

    a.append(Role::User, "question").unwrap().unwrap().settled().await;

    assert_eq!(a.message_count(), 2);
    assert_eq!(b.message_count(), 0);
    assert!(!b.is_pending());
}

#[tokio::test]
async fn raw_reply_is_observed_before_the_answer_lands() {
    let provider = ScriptedProvider::new(vec![
        answer("hi"),
        Script::Reply(ProviderReply::new(503, "down")),
    ]);
    let observer = Arc::new(SnapshotObserver::default());
    let session = Arc::new(
        ChatSession::new(provider, SessionOptions::default()).with_observer(observer.clone()),
    );
    observer.session.set(Arc::downgrade(&session)).unwrap();

    session
        .append(Role::User, "hello")
        .unwrap()
        .unwrap()
        .settled()
        .await;
    assert_eq!(session.message_count(), 2);

    session
        .append(Role::User, "again")
        .unwrap()
        .unwrap()
        .settled()
        .await;
    assert_eq!(session.message_count(), 3);
    assert!(!session.is_pending());

    assert_eq!(
        *observer.seen.lock().unwrap(),
        vec![(200, 1, true), (503, 3, true)]
    );
}

#[tokio::test]
async fn replaced_log_receives_the_in_flight_answer() {
    let (tx, rx) = oneshot::channel();
    let provider = ScriptedProvider::new(vec![Script::Gated(rx)]);
    let (session, observer) = session_with(provider.clone(), SessionOptions::default());

    let pending = session
        .append(Role::User, "original question")
        .unwrap()
        .unwrap();
    provider.started.notified().await;
    assert!(!pending.is_settled());

    let seed = vec![
        Message::new(Role::User, "seeded question"),
        Message::new(Role::Assistant, "seeded answer"),
    ];
    session.set_messages(seed.clone());
    assert_eq!(session.messages(), seed);
    assert!(session.is_pending());

    tx.send(ProviderReply::ok_json(&json!({ "answer": "late answer" })))
        .unwrap();
    pending.settled().await;

    let messages = session.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(&messages[..2], seed.as_slice());
    assert_eq!(messages[2].role, Role::Assistant);
    assert_eq!(messages[2].content, "late answer");
    assert!(!session.is_pending());
    assert_eq!(observer.finished().len(), 1);
}
