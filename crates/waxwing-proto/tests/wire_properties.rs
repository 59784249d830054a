//! Property tests for wire format parsing.

use proptest::prelude::*;
use waxwing_proto::{BoardRecord, KapMessage, KapType, ProtocolError};

fn arbitrary_type() -> impl Strategy<Value = KapType> {
    prop_oneof![Just(KapType::Msg1), Just(KapType::Msg2), Just(KapType::Msg3), Just(KapType::Msg4)]
}

fn arbitrary_message() -> impl Strategy<Value = KapMessage> {
    (
        arbitrary_type(),
        "[a-z]{1,12}",
        "[a-z]{1,12}",
        "[0-9a-f]{32}",
        prop::option::of("[0-9a-f]{32}"),
        prop::option::of(".{0,80}"),
        prop::option::of("[0-9a-f]{0,128}"),
    )
        .prop_map(|(kind, to, from, afid, bfid, payload, signature)| {
            let mut msg = KapMessage::msg1(&to, &from, &afid, String::new());
            msg.kind = kind;
            msg.hdr.bfid = bfid;
            msg.payload = payload;
            msg.signature = signature;
            msg
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_json_preserves_canonical_form(msg in arbitrary_message()) {
        let parsed = KapMessage::from_json(&msg.to_json()).unwrap();
        prop_assert_eq!(parsed.canonical(), msg.canonical());
        prop_assert_eq!(parsed, msg);
    }

    #[test]
    fn prop_canonical_is_a_six_string_array(msg in arbitrary_message()) {
        let fields: Vec<String> = serde_json::from_str(&msg.canonical()).unwrap();
        prop_assert_eq!(fields.len(), 6);
        prop_assert_eq!(fields[0].as_str(), msg.kind.as_str());
        prop_assert_eq!(&fields[5], msg.payload.as_deref().unwrap_or(""));
    }

    #[test]
    fn prop_changing_any_field_changes_canonical(
        msg in arbitrary_message(),
        suffix in "[a-z]{1,4}",
    ) {
        let mut to = msg.clone();
        to.hdr.to.push_str(&suffix);
        prop_assert_ne!(to.canonical(), msg.canonical());

        let mut afid = msg.clone();
        afid.hdr.afid.push_str(&suffix);
        prop_assert_ne!(afid.canonical(), msg.canonical());
    }

    #[test]
    fn prop_board_parse_never_panics(text in ".{0,120}") {
        let _ = BoardRecord::parse(&text);
    }

    #[test]
    fn prop_kap_parse_never_panics(text in ".{0,200}") {
        if let Err(err) = KapMessage::from_json(&text) {
            prop_assert!(matches!(
                err,
                ProtocolError::Malformed(_)
                    | ProtocolError::MissingField(_)
                    | ProtocolError::UnknownType(_)
            ));
        }
    }
}
