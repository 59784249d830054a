//! Fuzz target for stored key records
//!
//! Storage is shared with other code on the device, so a record may hold
//! any bytes. Decoding must return `Err` rather than panic, and every
//! accepted record must re-encode.

#![no_main]

use libfuzzer_sys::fuzz_target;
use waxwing_crypto::KeyRecord;

fuzz_target!(|data: &[u8]| {
    if let Ok(record) = KeyRecord::decode(data) {
        let _ = record.tag();
        assert!(record.encode().is_ok());
    }
});
