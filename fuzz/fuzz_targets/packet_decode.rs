//! Fuzz target for Packet::decode
//!
//! Decodes arbitrary byte sequences as both client and server frames to
//! find:
//! - Parser crashes or panics
//! - Integer overflows in length/payload calculations
//! - Buffer over-reads on truncated or lying length fields
//!
//! The decoder should NEVER panic: short input returns an error, and
//! everything else decodes into a packet whose validity checks merely
//! return false.

#![no_main]

use libfuzzer_sys::fuzz_target;
use wireline_proto::{Direction, Packet};

fuzz_target!(|data: &[u8]| {
    for direction in [Direction::Client, Direction::Server] {
        if let Ok(packet) = Packet::decode(data, direction) {
            // Exercising the validity paths must not panic either.
            let _ = packet.is_valid(true);
            let _ = packet.is_valid(false);
            let _ = packet.to_bytes();
        }
    }
});
