//! Fuzz target for the typed payload parsers
//!
//! DataPayload and V3InitPayload have fixed minimum layouts; arbitrary
//! bytes must either parse or return an error, never panic, and whatever
//! parses must re-encode to the bytes it was parsed from.

#![no_main]

use libfuzzer_sys::fuzz_target;
use wireline_proto::{DataPayload, V3InitPayload};

fuzz_target!(|data: &[u8]| {
    if let Ok(payload) = DataPayload::decode(data) {
        let mut wire = Vec::new();
        payload.encode(&mut wire);
        assert_eq!(wire, data);
    }

    if let Ok(payload) = V3InitPayload::decode(data) {
        let mut wire = Vec::new();
        payload.encode(&mut wire);
        // Trailing input bytes are ignored by decode.
        assert_eq!(wire, &data[..V3InitPayload::SIZE]);
    }
});
