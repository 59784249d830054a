//! Fuzz target for `BoardRecord::parse`
//!
//! Posts come from anyone on the board. Parsing must never panic, and a
//! parsed record must print back to text that parses to the same record.

#![no_main]

use libfuzzer_sys::fuzz_target;
use waxwing_proto::BoardRecord;

fuzz_target!(|text: &str| {
    if let Ok(record) = BoardRecord::parse(text) {
        assert!(text.trim_start().starts_with(record.marker()));
        assert_eq!(BoardRecord::parse(&record.to_string()).ok(), Some(record));
    }
});
