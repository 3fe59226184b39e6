//! Fuzz target for the STOMP bridge
//!
//! Drives a bridge through arbitrary link activity, including frames for
//! stale connections and garbage text.
//!
//! # Invariants
//!
//! - Outgoing frames only ever target the connection currently owned
//! - Nothing but `CONNECT` leaves before the handshake completes
//! - Events are only produced for the owned connection
//! - NEVER panic on malformed frames

#![no_main]

use arbitrary::Arbitrary;
use chatsync_app::{Bridge, LinkPhase};
use chatsync_client::{ConnectionHandle, Credential, SessionEvent, SubscriptionId};
use chatsync_proto::{Command, ConversationId, Outbound, OutgoingMessage, Topic};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    Open(u8),
    LinkUp(u8),
    LinkDown(u8),
    LinkRefused(u8),
    Connected(u8),
    ServerError(u8),
    Delivery { handle: u8, subscription: u8 },
    Garbage { handle: u8, text: String },
    Close(u8),
    Subscribe { subscription: u8, conversation: u8 },
    Unsubscribe(u8),
    Publish(String),
}

fn handle(n: u8) -> ConnectionHandle {
    ConnectionHandle(u64::from(n % 4))
}

fuzz_target!(|ops: Vec<Op>| {
    let mut bridge = Bridge::new();

    for op in ops {
        let before = bridge.phase().clone();
        let event: Option<SessionEvent<u64>> = match op {
            Op::Open(n) => {
                bridge.open(handle(n), "ws://fuzz.local:8080/ws", Credential::new("tok"));
                None
            },
            Op::LinkUp(n) => {
                bridge.link_up(handle(n));
                None
            },
            Op::LinkDown(n) => bridge.link_down(handle(n), "reset".into()),
            Op::LinkRefused(n) => bridge.link_refused(handle(n), "HTTP 401".into()),
            Op::Connected(n) => bridge.handle_frame(handle(n), "CONNECTED\nversion:1.2\n\n\0"),
            Op::ServerError(n) => bridge.handle_frame(handle(n), "ERROR\nmessage:bye\n\n\0"),
            Op::Delivery { handle: n, subscription } => bridge.handle_frame(
                handle(n),
                &format!("MESSAGE\nsubscription:sub-{subscription}\nmessage-id:1\n\n{{}}\0"),
            ),
            Op::Garbage { handle: n, text } => bridge.handle_frame(handle(n), &text),
            Op::Close(n) => {
                bridge.close(handle(n));
                None
            },
            Op::Subscribe { subscription, conversation } => {
                let topic = Topic::Conversation(ConversationId(u64::from(conversation)));
                bridge.subscribe(SubscriptionId(u64::from(subscription)), &topic);
                None
            },
            Op::Unsubscribe(subscription) => {
                bridge.unsubscribe(SubscriptionId(u64::from(subscription)));
                None
            },
            Op::Publish(content) => {
                bridge.publish(&Outbound::SendMessage(OutgoingMessage {
                    content,
                    conversation_id: ConversationId(1),
                    attachment_url: None,
                }));
                None
            },
        };

        if event.is_some() {
            assert!(before.handle().is_some(), "event without an owned link");
        }

        for (target, frame) in bridge.take_outgoing() {
            match frame.command {
                Command::Connect => {
                    assert_eq!(bridge.phase(), &LinkPhase::Handshaking { handle: target });
                },
                Command::Disconnect => {
                    assert_eq!(before, LinkPhase::Established { handle: target });
                },
                _ => assert_eq!(bridge.phase(), &LinkPhase::Established { handle: target }),
            }
        }
    }
});
