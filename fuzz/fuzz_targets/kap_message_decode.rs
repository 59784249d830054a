//! Fuzz target for `KapMessage::from_json`
//!
//! Arbitrary text must either be rejected with an error or decode to a
//! message whose own encoding decodes back to the same message.

#![no_main]

use libfuzzer_sys::fuzz_target;
use waxwing_proto::{InviteMessage, KapMessage};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(msg) = KapMessage::from_json(text) {
        let _ = msg.canonical();
        assert_eq!(KapMessage::from_json(&msg.to_json()).ok(), Some(msg));
    }

    if let Ok(invite) = InviteMessage::from_json(text) {
        let _ = invite.canonical();
        let _ = invite.check_type();
    }
});
