//! Fuzz target for GlobalId string parsing
//!
//! Arbitrary strings must parse or error, never panic, and anything that
//! parses from the 2- or 3-part forms must round-trip through its own
//! string rendering.

#![no_main]

use libfuzzer_sys::fuzz_target;
use wireline_proto::GlobalId;

fuzz_target!(|input: &str| {
    if let Ok(gid) = input.parse::<GlobalId>() {
        let two: GlobalId = gid.str2().parse().unwrap();
        assert_eq!(two, gid);

        let three: GlobalId = gid.str3().parse().unwrap();
        assert_eq!(three, gid);
    }
});
