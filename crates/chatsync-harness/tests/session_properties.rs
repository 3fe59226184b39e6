//! Property-based simulation of whole sessions.
//!
//! Random interleavings of user intents, foreign activity on the server,
//! held-back fetches, link drops and clock advances are run through the
//! production runtime. The invariant registry is checked on every render;
//! the properties below are checked once everything has settled.

use std::{collections::HashSet, time::Duration};

use chatsync_app::Runtime;
use chatsync_client::{Credential, SessionConfig, SessionEvent, SessionState, proto::ConversationId};
use chatsync_harness::{FetchMode, InvariantRegistry, SimDriver, SimEnv, create_shared_server};
use proptest::prelude::*;

const TOKEN: &str = "tok";

#[derive(Debug, Clone)]
enum Op {
    Select(u64),
    Send(String),
    Create,
    /// Another user posts to a conversation.
    Foreign(u64, String),
    /// Another device creates a conversation.
    Announce,
    /// Hold fetch completions back from now on.
    Hold,
    /// Deliver held completions, optionally newest first.
    Release { reversed: bool },
    /// Server cuts the link.
    Drop,
    /// Advance the clock and tick.
    Wait(u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1u64..7).prop_map(Op::Select),
        3 => "[a-z ]{0,20}".prop_map(Op::Send),
        1 => Just(Op::Create),
        2 => ((1u64..7), "[a-z]{1,12}").prop_map(|(id, text)| Op::Foreign(id, text)),
        1 => Just(Op::Announce),
        1 => Just(Op::Hold),
        2 => any::<bool>().prop_map(|reversed| Op::Release { reversed }),
        1 => Just(Op::Drop),
        1 => (0u64..8000).prop_map(Op::Wait),
    ]
}

async fn settle(runtime: &mut Runtime<SimDriver, SimEnv>) {
    while runtime.step().await.unwrap() {}
}

async fn run(ops: Vec<Op>) -> Runtime<SimDriver, SimEnv> {
    let server = create_shared_server("alice", TOKEN);
    {
        let mut server = server.lock().unwrap();
        let first = server.add_conversation();
        server.post_message(first, "bob", "hello");
        server.add_conversation();
        server.add_conversation();
    }

    let driver = SimDriver::new(server, Credential::new(TOKEN))
        .with_invariants(InvariantRegistry::standard());
    let store = driver.credential_store();
    let mut runtime = Runtime::new(driver, SimEnv::new(), SessionConfig::new("ws://sim/ws"), store);
    runtime.start().await.unwrap();
    settle(&mut runtime).await;

    for op in ops {
        match op {
            Op::Select(id) => runtime
                .driver_mut()
                .push_event(SessionEvent::Select { conversation_id: ConversationId(id) }),
            Op::Send(content) => runtime.driver_mut().push_event(SessionEvent::Send { content }),
            Op::Create => runtime.driver_mut().push_event(SessionEvent::CreateConversation),
            Op::Foreign(id, text) => {
                runtime.driver().server().post_message(ConversationId(id), "bob", &text);
            },
            Op::Announce => {
                runtime.driver().server().announce_creation();
            },
            Op::Hold => runtime.driver_mut().set_fetch_mode(FetchMode::Deferred),
            Op::Release { reversed } => {
                let driver = runtime.driver_mut();
                driver.set_fetch_mode(FetchMode::Immediate);
                if reversed {
                    driver.release_held_reversed();
                } else {
                    driver.release_held();
                }
            },
            Op::Drop => {
                if let Some(handle) = runtime.session().connection_handle() {
                    runtime.driver().server().drop_link(handle);
                }
            },
            Op::Wait(ms) => {
                tokio::time::advance(Duration::from_millis(ms)).await;
                runtime.driver_mut().push_tick();
            },
        }
        settle(&mut runtime).await;
    }

    // Let everything land: held fetches, then any pending reconnect.
    runtime.driver_mut().set_fetch_mode(FetchMode::Immediate);
    runtime.driver_mut().release_held();
    settle(&mut runtime).await;
    tokio::time::advance(Duration::from_secs(5)).await;
    runtime.driver_mut().push_tick();
    settle(&mut runtime).await;
    runtime
}

fn is_subsequence<T: PartialEq>(needle: &[T], haystack: &[T]) -> bool {
    let mut rest = haystack.iter();
    needle.iter().all(|item| rest.any(|candidate| candidate == item))
}

fn block_on<T>(future: impl Future<Output = T>) -> T {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn settled_session_is_consistent(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let runtime = block_on(run(ops));
        let session = runtime.session();

        prop_assert_eq!(session.state(), SessionState::Ready);

        // Every conversation the client lists exists on the server.
        let known: HashSet<_> = runtime.driver().server().conversation_ids().into_iter().collect();
        for conversation in session.directory().conversations() {
            prop_assert!(known.contains(&conversation.id));
        }

        // Once settled, the timeline shows server messages of the selection,
        // newest first, each at most once. Posts made while the link was
        // down are missing until the next selection.
        if let Some(selected) = session.selected() {
            prop_assert!(!session.timeline().is_loading());
            let server = runtime.driver().server();
            let stored: Vec<_> = server.messages(selected).iter().rev().cloned().collect();
            let shown: Vec<_> = session.timeline().messages().cloned().collect();
            prop_assert!(is_subsequence(&shown, &stored), "shown {:?} stored {:?}", shown, stored);
        }
    }
}
