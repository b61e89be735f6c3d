//! P3 wire protocol codec.
//!
//! Implements the framing layer of the legacy P3 line protocol: CRC16-ARC
//! checksums, the 8-byte big-endian packet header, direction-tagged type
//! bytes (client frames set bit 0x80), and the typed payload bodies (DATA
//! token payloads, the fixed 49-byte V3 session-initialization record, NAK
//! error codes). Also provides [`GlobalId`], the 32-bit identifier used
//! throughout the historical service.
//!
//! The codec is deliberately forgiving on decode: anything with enough bytes
//! parses, and [`Packet::is_valid`] reports whether the framing bytes and
//! CRC actually check out, because the protocol-level answer to a corrupt
//! frame is a NAK, not an error path.

mod crc;
mod errors;
mod gid;
mod header;
mod packet;
pub mod payloads;

pub use crc::{crc16_arc, crc16_arc_update};
pub use errors::{ProtocolError, Result};
pub use gid::{GidError, GlobalId};
pub use header::PacketHeader;
pub use packet::{
    Direction, MAX_PAYLOAD_SIZE, MIN_PACKET_SIZE, MSG_END_BYTE, NakError, Packet, PacketType,
    SYNC_BYTE,
};
pub use payloads::{DataPayload, PacketPayload, V3InitPayload};
