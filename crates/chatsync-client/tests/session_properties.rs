//! Property-based tests for the session state machine.
//!
//! Arbitrary interleavings of pushes, completions and user intents must
//! never break the directory and subscription invariants.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use chatsync_client::{
    Credential, Directory, HistoryToken, MemoryCredentialStore, PLACEHOLDER_NAME, Session,
    SessionAction, SessionConfig, SessionEvent, SubscriptionId, SystemEnv, derive_name,
    proto::{ConversationCreated, ConversationId, ConversationSummary, Identity, Message, Topic},
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    /// Creation notice for `id` on the creation feed.
    Created(u64),
    /// Live message on the current conversation subscription.
    Live(String),
    /// User selects `id`.
    Select(u64),
    /// User asks for a new conversation.
    Create,
    /// Creation request completes.
    CreationDone,
    /// Oldest outstanding history fetch completes with `count` messages.
    History(usize),
    /// Link drops and comes back.
    Bounce,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1u64..12).prop_map(Op::Created),
        3 => "[a-z ]{1,24}".prop_map(Op::Live),
        3 => (1u64..12).prop_map(Op::Select),
        1 => Just(Op::Create),
        1 => Just(Op::CreationDone),
        2 => (0usize..4).prop_map(Op::History),
        1 => Just(Op::Bounce),
    ]
}

fn message(conversation: ConversationId, content: &str) -> Message {
    Message {
        sender: Identity::new("alice"),
        content: content.to_owned(),
        timestamp: chrono::NaiveDateTime::default(),
        conversation_id: conversation,
        attachment_url: None,
    }
}

/// Drives a session and mirrors the broker-side subscription set.
struct Driver {
    session: Session<SystemEnv>,
    live_conversation_subs: HashSet<SubscriptionId>,
    pending_history: Vec<(HistoryToken, ConversationId)>,
}

impl Driver {
    fn new(snapshot: Vec<ConversationSummary>) -> Self {
        let store = Arc::new(MemoryCredentialStore::new(Credential::new("tok")));
        let session = Session::new(SystemEnv::new(), SessionConfig::default(), store);
        let mut driver =
            Self { session, live_conversation_subs: HashSet::new(), pending_history: Vec::new() };

        driver.feed(SessionEvent::Start);
        driver.feed(SessionEvent::IdentityResolved(Ok(Identity::new("alice"))));
        driver.feed(SessionEvent::SnapshotLoaded(Ok(snapshot)));
        driver.open();
        driver
    }

    fn open(&mut self) {
        if let Some(handle) = self.session.connection_handle() {
            self.feed(SessionEvent::TransportOpened { handle });
        }
    }

    fn feed(&mut self, event: SessionEvent) {
        let actions = self.session.handle(event);
        self.observe(&actions);
    }

    fn observe(&mut self, actions: &[SessionAction]) {
        for action in actions {
            match action {
                SessionAction::Subscribe { subscription, topic: Topic::Conversation(_) } => {
                    self.live_conversation_subs.insert(*subscription);
                },
                SessionAction::Unsubscribe { subscription } => {
                    self.live_conversation_subs.remove(subscription);
                },
                SessionAction::FetchHistory(request) => {
                    self.pending_history.push((request.token, request.conversation_id));
                },
                _ => {},
            }
            assert!(
                self.live_conversation_subs.len() <= 1,
                "two conversation topics active at once"
            );
        }
    }

    fn apply(&mut self, op: Op) {
        match op {
            Op::Created(id) => {
                let Some(subscription) = self.session.subscriptions().creation_subscription() else {
                    return;
                };
                let body = serde_json::to_string(&ConversationCreated {
                    conversation_id: ConversationId(id),
                    seed_name: "New chat".into(),
                })
                .unwrap();
                self.feed(SessionEvent::Delivery { subscription, body });
            },
            Op::Live(content) => {
                let (Some(subscription), Some(selected)) =
                    (self.session.subscriptions().conversation_subscription(), self.session.selected())
                else {
                    return;
                };
                let body = serde_json::to_string(&message(selected, &content)).unwrap();
                self.feed(SessionEvent::Delivery { subscription, body });
            },
            Op::Select(id) => self.feed(SessionEvent::Select { conversation_id: ConversationId(id) }),
            Op::Create => self.feed(SessionEvent::CreateConversation),
            Op::CreationDone => self.feed(SessionEvent::CreationFinished(Ok(()))),
            Op::History(count) => {
                if self.pending_history.is_empty() {
                    return;
                }
                let (token, conversation) = self.pending_history.remove(0);
                let page = (0..count).map(|i| message(conversation, &format!("m{i}"))).collect();
                self.feed(SessionEvent::HistoryLoaded { token, result: Ok(page) });
            },
            Op::Bounce => {
                let Some(handle) = self.session.connection_handle() else {
                    return;
                };
                // Broker forgets every subscription with the link.
                self.live_conversation_subs.clear();
                self.feed(SessionEvent::TransportClosed { handle, detail: "reset".into() });
                let due = std::time::Instant::now() + std::time::Duration::from_secs(6);
                self.feed(SessionEvent::Tick { now: due });
                self.open();
            },
        }
    }
}

fn check_directory(directory: &Directory, named: &mut HashMap<ConversationId, String>) {
    let ids: HashSet<_> = directory.conversations().iter().map(|c| c.id).collect();
    assert_eq!(ids.len(), directory.len(), "duplicate conversation ids");

    let placeholders = directory.conversations().iter().filter(|c| c.is_placeholder).count();
    assert!(placeholders <= 1, "{placeholders} placeholders");

    for conversation in directory.conversations() {
        if conversation.is_placeholder {
            assert_eq!(conversation.display_name, PLACEHOLDER_NAME);
            assert!(!named.contains_key(&conversation.id), "name reverted for {}", conversation.id);
            continue;
        }
        let first = named.entry(conversation.id).or_insert_with(|| conversation.display_name.clone());
        assert_eq!(*first, conversation.display_name, "name changed for {}", conversation.id);
    }
}

proptest! {
    #[test]
    fn directory_and_subscription_invariants_hold(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let mut driver = Driver::new(vec![
            ConversationSummary { id: ConversationId(1), last_message: Some(message(ConversationId(1), "hello")) },
            ConversationSummary { id: ConversationId(2), last_message: None },
        ]);
        let mut named = HashMap::new();
        check_directory(driver.session.directory(), &mut named);

        for op in ops {
            driver.apply(op);
            check_directory(driver.session.directory(), &mut named);

            if let Some(selected) = driver.session.selected() {
                prop_assert!(driver.session.directory().contains(selected));
                prop_assert_eq!(driver.session.timeline().conversation(), Some(selected));
            }
        }
    }

    #[test]
    fn creation_events_never_duplicate(ids in prop::collection::vec(1u64..8, 1..40)) {
        let mut directory = Directory::new();
        for id in &ids {
            directory.apply_creation_event(&ConversationCreated {
                conversation_id: ConversationId(*id),
                seed_name: String::new(),
            });
        }

        let unique: HashSet<_> = directory.conversations().iter().map(|c| c.id).collect();
        prop_assert_eq!(unique.len(), directory.len());
        prop_assert!(directory.conversations().iter().filter(|c| c.is_placeholder).count() <= 1);
    }

    #[test]
    fn derived_names_are_bounded(content in ".{0,64}") {
        let name = derive_name(&content);
        let chars = content.chars().count();

        if chars > 15 {
            prop_assert_eq!(name.chars().count(), 16);
            prop_assert!(name.ends_with('…'));
            prop_assert!(content.starts_with(name.trim_end_matches('…')));
        } else {
            prop_assert_eq!(name, content);
        }
    }
}
