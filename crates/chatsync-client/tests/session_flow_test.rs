//! Session controller flows driven event by event.
//!
//! Each test plays the role of the driver: it feeds completions and pushes
//! into the [`Session`] and inspects the actions it gets back.

use std::{
    ops::Add,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chatsync_client::{
    ConnectionHandle, ConnectionState, Credential, CredentialStore, Environment, FetchError,
    HistoryRequest, MemoryCredentialStore, Session, SessionAction, SessionConfig, SessionError,
    SessionEvent, SessionState, SubscriptionId,
    proto::{
        ConversationCreated, ConversationId, ConversationSummary, Identity, Message, Outbound,
        Topic,
    },
};
use chrono::{NaiveDate, NaiveDateTime};

/// Virtual instant in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Ms(u64);

impl Add<Duration> for Ms {
    type Output = Ms;

    fn add(self, rhs: Duration) -> Ms {
        Ms(self.0 + u64::try_from(rhs.as_millis()).unwrap())
    }
}

/// Manually advanced clock.
#[derive(Debug, Clone, Default)]
struct ManualEnv(Arc<AtomicU64>);

impl ManualEnv {
    fn advance(&self, by: Duration) -> Ms {
        let by = u64::try_from(by.as_millis()).unwrap();
        Ms(self.0.fetch_add(by, Ordering::SeqCst) + by)
    }
}

impl Environment for ManualEnv {
    type Instant = Ms;

    fn now(&self) -> Ms {
        Ms(self.0.load(Ordering::SeqCst))
    }
}

fn at(second: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 1).and_then(|d| d.and_hms_opt(9, 0, second)).unwrap()
}

fn message(conversation: u64, content: &str, second: u32) -> Message {
    Message {
        sender: Identity::new("alice"),
        content: content.to_owned(),
        timestamp: at(second),
        conversation_id: ConversationId(conversation),
        attachment_url: None,
    }
}

fn summary(id: u64, last: Option<&str>) -> ConversationSummary {
    ConversationSummary { id: ConversationId(id), last_message: last.map(|c| message(id, c, 0)) }
}

fn history_request(actions: &[SessionAction]) -> Option<HistoryRequest> {
    actions.iter().find_map(|a| match a {
        SessionAction::FetchHistory(request) => Some(*request),
        _ => None,
    })
}

fn opened_handle(actions: &[SessionAction]) -> Option<ConnectionHandle> {
    actions.iter().find_map(|a| match a {
        SessionAction::OpenTransport { handle, .. } => Some(*handle),
        _ => None,
    })
}

fn subscription_for(actions: &[SessionAction], wanted: &Topic) -> Option<SubscriptionId> {
    actions.iter().find_map(|a| match a {
        SessionAction::Subscribe { subscription, topic } if topic == wanted => Some(*subscription),
        _ => None,
    })
}

fn position_of(actions: &[SessionAction], pred: impl Fn(&SessionAction) -> bool) -> usize {
    actions.iter().position(|a| pred(a)).unwrap()
}

fn store(token: &str) -> Arc<MemoryCredentialStore> {
    Arc::new(MemoryCredentialStore::new(Credential::new(token)))
}

fn presented(actions: &[SessionAction]) -> Vec<&str> {
    actions
        .iter()
        .filter_map(|a| match a {
            SessionAction::OpenTransport { credential, .. } => Some(credential.expose()),
            _ => None,
        })
        .collect()
}

fn creation_feed() -> Topic {
    Topic::ConversationCreated { username: "alice".into() }
}

/// Session plus what the driver learned while bootstrapping it.
struct Harness {
    env: ManualEnv,
    store: Arc<MemoryCredentialStore>,
    session: Session<ManualEnv>,
    handle: ConnectionHandle,
    creation_sub: SubscriptionId,
    first_history: Option<HistoryRequest>,
}

/// Bootstrap a session with `snapshot`, connect it, and return it.
fn ready_session(snapshot: Vec<ConversationSummary>) -> Harness {
    let env = ManualEnv::default();
    let store = store("tok");
    let mut session = Session::new(env.clone(), SessionConfig::new("ws://broker"), store.clone());

    session.handle(SessionEvent::Start);
    let identity = session.handle(SessionEvent::IdentityResolved(Ok(Identity::new("alice"))));
    let handle = opened_handle(&identity).unwrap();
    let loaded = session.handle(SessionEvent::SnapshotLoaded(Ok(snapshot)));
    let first_history = history_request(&loaded);

    let opened = session.handle(SessionEvent::TransportOpened { handle });
    let creation_sub = subscription_for(&opened, &creation_feed()).unwrap();

    Harness { env, store, session, handle, creation_sub, first_history }
}

#[test]
fn start_requests_identity_and_snapshot() {
    let mut session =
        Session::new(ManualEnv::default(), SessionConfig::default(), store("tok"));

    let actions = session.handle(SessionEvent::Start);
    assert!(actions.contains(&SessionAction::ResolveIdentity));
    assert!(actions.contains(&SessionAction::FetchSnapshot));
    assert_eq!(session.state(), SessionState::Bootstrapping);
}

#[test]
fn ready_requires_identity_and_snapshot_in_any_order() {
    let mut session =
        Session::new(ManualEnv::default(), SessionConfig::default(), store("tok"));
    session.handle(SessionEvent::Start);

    let loaded = session.handle(SessionEvent::SnapshotLoaded(Ok(vec![summary(1, Some("hey"))])));
    assert_eq!(session.state(), SessionState::Bootstrapping);
    assert!(history_request(&loaded).is_none(), "no auto-select before ready");

    let resolved = session.handle(SessionEvent::IdentityResolved(Ok(Identity::new("alice"))));
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.selected(), Some(ConversationId(1)));
    assert_eq!(history_request(&resolved).map(|r| r.conversation_id), Some(ConversationId(1)));
}

#[test]
fn identity_failure_keeps_bootstrapping() {
    let mut session =
        Session::new(ManualEnv::default(), SessionConfig::default(), store("tok"));
    session.handle(SessionEvent::Start);
    session.handle(SessionEvent::SnapshotLoaded(Ok(vec![])));

    let actions = session.handle(SessionEvent::IdentityResolved(Err(FetchError::new("503"))));
    assert!(actions.iter().any(|a| matches!(a, SessionAction::Report(SessionError::TransientFetch { .. }))));
    assert!(opened_handle(&actions).is_none());
    assert_eq!(session.state(), SessionState::Bootstrapping);
}

#[test]
fn snapshot_failure_leaves_directory_empty_and_still_readies() {
    let mut session =
        Session::new(ManualEnv::default(), SessionConfig::default(), store("tok"));
    session.handle(SessionEvent::Start);
    session.handle(SessionEvent::IdentityResolved(Ok(Identity::new("alice"))));

    let actions = session.handle(SessionEvent::SnapshotLoaded(Err(FetchError::new("timeout"))));
    assert!(actions.iter().any(|a| matches!(a, SessionAction::Report(SessionError::TransientFetch { .. }))));
    assert!(session.directory().is_empty());
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.selected(), None);
}

#[test]
fn newest_conversation_is_auto_selected() {
    let h = ready_session(vec![summary(1, Some("old")), summary(2, Some("new"))]);

    assert_eq!(h.session.selected(), Some(ConversationId(2)));
    assert_eq!(h.first_history.map(|r| (r.conversation_id, r.page, r.size)), Some((ConversationId(2), 0, 50)));
}

#[test]
fn stale_history_does_not_overwrite_new_selection() {
    let mut h = ready_session(vec![summary(1, Some("a")), summary(2, Some("b"))]);
    let for_two = h.first_history.unwrap();

    let switched = h.session.handle(SessionEvent::Select { conversation_id: ConversationId(1) });
    let for_one = history_request(&switched).unwrap();

    h.session.handle(SessionEvent::HistoryLoaded {
        token: for_one.token,
        result: Ok(vec![message(1, "a", 3)]),
    });
    let late = h.session.handle(SessionEvent::HistoryLoaded {
        token: for_two.token,
        result: Ok(vec![message(2, "b", 4)]),
    });

    assert!(late.is_empty());
    let contents: Vec<_> = h.session.timeline().messages().map(|m| m.content.clone()).collect();
    assert_eq!(contents, vec!["a"]);
}

#[test]
fn reselecting_current_conversation_is_noop() {
    let mut h = ready_session(vec![summary(1, Some("a"))]);
    let actions = h.session.handle(SessionEvent::Select { conversation_id: ConversationId(1) });
    assert!(actions.is_empty());
}

#[test]
fn selecting_unknown_conversation_is_ignored() {
    let mut h = ready_session(vec![summary(1, Some("a"))]);
    let actions = h.session.handle(SessionEvent::Select { conversation_id: ConversationId(77) });
    assert!(actions.is_empty());
    assert_eq!(h.session.selected(), Some(ConversationId(1)));
}

#[test]
fn switching_conversation_swaps_topic_subscription() {
    let mut h = ready_session(vec![summary(1, Some("a")), summary(2, Some("b"))]);
    let before = h.session.subscriptions().conversation_subscription().unwrap();

    let actions = h.session.handle(SessionEvent::Select { conversation_id: ConversationId(1) });
    let unsubscribe = actions
        .iter()
        .position(|a| matches!(a, SessionAction::Unsubscribe { subscription } if *subscription == before));
    let subscribe = actions.iter().position(|a| {
        matches!(a, SessionAction::Subscribe { topic: Topic::Conversation(ConversationId(1)), .. })
    });

    assert!(unsubscribe.unwrap() < subscribe.unwrap());
    assert_eq!(h.session.subscriptions().creation_subscription(), Some(h.creation_sub));
}

#[test]
fn repeated_switches_leave_creation_feed_alone() {
    let mut h = ready_session(vec![summary(1, Some("a")), summary(2, Some("b")), summary(3, Some("c"))]);
    let switches = 7;

    let mut unsubscribes = 0;
    let mut subscribes = 0;
    for _ in 0..switches {
        let current = h.session.selected().unwrap();
        let next = ConversationId(current.0 % 3 + 1);
        let actions = h.session.handle(SessionEvent::Select { conversation_id: next });

        for action in &actions {
            match action {
                SessionAction::Unsubscribe { subscription } => {
                    assert_ne!(*subscription, h.creation_sub);
                    unsubscribes += 1;
                },
                SessionAction::Subscribe { topic, .. } => {
                    assert_eq!(topic, &Topic::Conversation(next));
                    subscribes += 1;
                },
                _ => {},
            }
        }
    }

    assert_eq!((unsubscribes, subscribes), (switches, switches));
    assert_eq!(h.session.subscriptions().creation_subscription(), Some(h.creation_sub));
}

#[test]
fn live_message_names_placeholder_and_prepends() {
    let mut h = ready_session(vec![summary(1, Some("a")), summary(5, None)]);
    let request = h.first_history.unwrap();
    h.session.handle(SessionEvent::HistoryLoaded { token: request.token, result: Ok(vec![]) });
    let subscription = h.session.subscriptions().conversation_subscription().unwrap();

    let body = serde_json::to_string(&message(5, "hi", 10)).unwrap();
    h.session.handle(SessionEvent::Delivery { subscription, body });

    let conversation = h.session.directory().get(ConversationId(5)).unwrap();
    assert_eq!(conversation.display_name, "hi");
    assert!(!conversation.is_placeholder);
    assert_eq!(h.session.timeline().newest().map(|m| m.content.as_str()), Some("hi"));
}

#[test]
fn history_names_placeholder_from_oldest_message() {
    let mut h = ready_session(vec![summary(5, None)]);
    let request = h.first_history.unwrap();

    h.session.handle(SessionEvent::HistoryLoaded {
        token: request.token,
        result: Ok(vec![message(5, "second message", 2), message(5, "Hello there, how are you?", 1)]),
    });

    assert_eq!(h.session.directory().get(ConversationId(5)).unwrap().display_name, "Hello there, ho…");
}

#[test]
fn malformed_push_is_reported() {
    let mut h = ready_session(vec![summary(1, Some("a"))]);
    let subscription = h.session.subscriptions().conversation_subscription().unwrap();

    let actions = h.session.handle(SessionEvent::Delivery { subscription, body: "{not json".into() });
    assert!(matches!(actions.as_slice(), [SessionAction::Report(SessionError::Protocol { .. })]));
}

#[test]
fn delivery_on_released_subscription_is_dropped() {
    let mut h = ready_session(vec![summary(1, Some("a")), summary(2, Some("b"))]);
    let old = h.session.subscriptions().conversation_subscription().unwrap();
    h.session.handle(SessionEvent::Select { conversation_id: ConversationId(1) });

    let body = serde_json::to_string(&message(2, "late", 9)).unwrap();
    assert!(h.session.handle(SessionEvent::Delivery { subscription: old, body }).is_empty());
}

#[test]
fn send_publishes_and_clears_input() {
    let mut h = ready_session(vec![summary(1, Some("a"))]);
    h.session.handle(SessionEvent::SetInput { text: "draft".into() });

    let actions = h.session.handle(SessionEvent::Send { content: "draft".into() });
    assert!(actions.iter().any(|a| matches!(
        a,
        SessionAction::Publish(Outbound::SendMessage(m))
            if m.content == "draft" && m.conversation_id == ConversationId(1)
    )));
    assert_eq!(h.session.timeline().input(), "");
}

#[test]
fn send_is_silently_rejected_when_invalid() {
    let mut h = ready_session(vec![summary(1, Some("a"))]);
    assert!(h.session.handle(SessionEvent::Send { content: "   ".into() }).is_empty());

    h.session.handle(SessionEvent::TransportClosed { handle: h.handle, detail: "reset".into() });
    assert!(h.session.handle(SessionEvent::Send { content: "hello".into() }).is_empty());

    let mut empty = ready_session(vec![]);
    assert!(empty.session.handle(SessionEvent::Send { content: "hello".into() }).is_empty());
}

#[test]
fn requested_creation_is_auto_selected() {
    let mut h = ready_session(vec![]);

    let requested = h.session.handle(SessionEvent::CreateConversation);
    assert!(requested.contains(&SessionAction::RequestCreation));
    assert!(!h.session.can_create());
    assert!(h.session.handle(SessionEvent::CreateConversation).is_empty());

    let body = serde_json::to_string(&ConversationCreated {
        conversation_id: ConversationId(12),
        seed_name: "New chat".into(),
    })
    .unwrap();
    let created = h.session.handle(SessionEvent::Delivery { subscription: h.creation_sub, body });
    h.session.handle(SessionEvent::CreationFinished(Ok(())));

    assert_eq!(h.session.directory().len(), 1);
    assert!(h.session.directory().placeholder().is_some());
    assert_eq!(h.session.selected(), Some(ConversationId(12)));
    assert!(history_request(&created).is_some());
}

#[test]
fn foreign_creation_is_not_auto_selected() {
    let mut h = ready_session(vec![summary(1, Some("a"))]);

    let body = r#"{"chatId": 30, "chatName": "New chat"}"#.to_owned();
    h.session.handle(SessionEvent::Delivery { subscription: h.creation_sub, body });

    assert_eq!(h.session.directory().first().map(|c| c.id), Some(ConversationId(30)));
    assert_eq!(h.session.selected(), Some(ConversationId(1)));
}

#[test]
fn create_with_existing_placeholder_selects_it() {
    let mut h = ready_session(vec![summary(1, None), summary(2, Some("b"))]);
    assert_eq!(h.session.selected(), Some(ConversationId(2)));

    let actions = h.session.handle(SessionEvent::CreateConversation);
    assert!(!actions.contains(&SessionAction::RequestCreation));
    assert_eq!(h.session.selected(), Some(ConversationId(1)));
}

#[test]
fn creation_failure_is_reported_and_reenables() {
    let mut h = ready_session(vec![]);
    h.session.handle(SessionEvent::CreateConversation);

    let actions = h.session.handle(SessionEvent::CreationFinished(Err(FetchError::new("500"))));
    assert!(actions.iter().any(|a| matches!(a, SessionAction::Report(SessionError::TransientFetch { .. }))));
    assert!(h.session.can_create());
    assert!(h.session.directory().is_empty());
}

#[test]
fn drop_reconnects_after_fixed_delay_and_resubscribes() {
    let mut h = ready_session(vec![summary(1, Some("a"))]);

    let dropped = h.session.handle(SessionEvent::TransportClosed { handle: h.handle, detail: "reset".into() });
    assert!(dropped.iter().any(|a| matches!(a, SessionAction::Report(SessionError::TransportDropped { .. }))));
    assert_eq!(h.session.connection_state(), ConnectionState::Reconnecting);

    let early = h.env.advance(Duration::from_millis(4999));
    assert!(opened_handle(&h.session.handle(SessionEvent::Tick { now: early })).is_none());

    let due = h.env.advance(Duration::from_millis(1));
    let retry = h.session.handle(SessionEvent::Tick { now: due });
    assert_eq!(opened_handle(&retry), Some(h.handle));

    let reopened = h.session.handle(SessionEvent::TransportOpened { handle: h.handle });
    assert!(subscription_for(&reopened, &creation_feed()).is_some());
    assert!(subscription_for(&reopened, &Topic::Conversation(ConversationId(1))).is_some());
}

#[test]
fn reconnect_presents_the_refreshed_credential() {
    let mut h = ready_session(vec![summary(1, Some("a"))]);

    h.store.store(Credential::new("new"));
    h.session.handle(SessionEvent::TransportClosed { handle: h.handle, detail: "reset".into() });
    let due = h.env.advance(Duration::from_secs(6));
    let retry = h.session.handle(SessionEvent::Tick { now: due });

    assert_eq!(opened_handle(&retry), Some(h.handle));
    assert_eq!(presented(&retry), vec!["new"]);
}

#[test]
fn cleared_store_on_reconnect_ends_the_session() {
    let mut h = ready_session(vec![summary(1, Some("a"))]);

    h.store.clear().unwrap();
    h.session.handle(SessionEvent::TransportClosed { handle: h.handle, detail: "reset".into() });
    let due = h.env.advance(Duration::from_secs(6));
    let retry = h.session.handle(SessionEvent::Tick { now: due });

    assert!(opened_handle(&retry).is_none());
    assert!(retry.iter().any(|a| matches!(a, SessionAction::Report(SessionError::AuthRejected { .. }))));
    assert!(retry.contains(&SessionAction::DiscardCredential));
    assert_eq!(h.session.state(), SessionState::LoggedOut);
    assert_eq!(h.session.connection_state(), ConnectionState::Disconnected);
}

#[test]
fn logout_tears_down_in_order() {
    let mut h = ready_session(vec![summary(1, Some("a"))]);

    let actions = h.session.handle(SessionEvent::Logout);

    let unsubscribe = position_of(&actions, |a| matches!(a, SessionAction::Unsubscribe { .. }));
    let close = position_of(&actions, |a| matches!(a, SessionAction::CloseTransport { .. }));
    let discard = position_of(&actions, |a| matches!(a, SessionAction::DiscardCredential));
    assert!(unsubscribe < close && close < discard);

    assert_eq!(h.session.state(), SessionState::LoggedOut);
    assert_eq!(h.session.connection_state(), ConnectionState::Disconnected);
    assert!(h.session.directory().is_empty());
    assert!(h.session.timeline().is_empty());

    let later = h.env.advance(Duration::from_secs(60));
    assert!(h.session.handle(SessionEvent::Tick { now: later }).is_empty());
    assert!(h.session.handle(SessionEvent::TransportClosed { handle: h.handle, detail: "bye".into() }).is_empty());
}

#[test]
fn rejected_credential_forces_teardown() {
    let env = ManualEnv::default();
    let mut session = Session::new(env, SessionConfig::default(), store("stale"));
    session.handle(SessionEvent::Start);
    let resolved = session.handle(SessionEvent::IdentityResolved(Ok(Identity::new("alice"))));
    let handle = opened_handle(&resolved).unwrap();

    let actions = session.handle(SessionEvent::TransportRejected { handle, detail: "invalid token".into() });
    assert!(actions.iter().any(|a| matches!(a, SessionAction::Report(SessionError::AuthRejected { .. }))));
    assert!(actions.contains(&SessionAction::DiscardCredential));
    assert_eq!(session.state(), SessionState::LoggedOut);
}
