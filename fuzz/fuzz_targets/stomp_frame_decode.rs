//! Fuzz target for Frame::decode
//!
//! Feeds arbitrary text to the STOMP decoder.
//!
//! # Invariants
//!
//! - Decoding NEVER panics; malformed text returns an error
//! - A decoded frame re-encodes to text that decodes to the same command

#![no_main]

use chatsync_proto::Frame;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|text: &str| {
    let Ok(Some(frame)) = Frame::decode(text) else {
        return;
    };

    let encoded = frame.encode();
    let again = Frame::decode(&encoded).expect("re-encoded frame must decode");
    assert_eq!(again.map(|f| f.command), Some(frame.command), "re-encoding changed the command");
});
