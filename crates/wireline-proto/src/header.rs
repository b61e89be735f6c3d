//! P3 frame header with zero-copy parsing.
//!
//! The header is a fixed 8-byte structure in network byte order, followed on
//! the wire by the payload and the 1-byte end-of-message marker. Multi-byte
//! fields are stored as raw byte arrays so the struct can be cast directly
//! from untrusted input without alignment concerns.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::{ProtocolError, Result};

/// Fixed 8-byte P3 header (Big Endian network byte order).
///
/// Wire layout: `sync (1) | crc (2) | length (2) | tx_seq (1) | rx_seq (1) |
/// packet_type (1)`. Note that `length` counts `payload + 3` trailing bytes
/// and `crc` covers `length || tx_seq || rx_seq || packet_type || payload`
/// (the sync byte, the CRC itself, and the end marker are excluded).
///
/// Parsing performs no value validation: a header with a bad sync byte or an
/// unknown type parses fine and is flagged later by
/// [`crate::Packet::is_valid`]. The only hard requirement is enough bytes.
#[repr(C)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct PacketHeader {
    sync: u8,
    crc: [u8; 2],
    length: [u8; 2],
    tx_seq: u8,
    rx_seq: u8,
    packet_type: u8,
}

impl PacketHeader {
    /// Size of the serialized header (8 bytes).
    pub const SIZE: usize = 8;

    /// Create a header with already-resolved field values.
    ///
    /// `packet_type` is the byte as transmitted, i.e. with the client
    /// direction bit already applied if applicable.
    #[must_use]
    pub fn new(sync: u8, crc: u16, length: u16, tx_seq: u8, rx_seq: u8, packet_type: u8) -> Self {
        Self {
            sync,
            crc: crc.to_be_bytes(),
            length: length.to_be_bytes(),
            tx_seq,
            rx_seq,
            packet_type,
        }
    }

    /// Parse a header from the front of `bytes` (zero-copy).
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PacketTooShort` if fewer than 8 bytes are supplied
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::PacketTooShort { actual: bytes.len() })?
            .0;

        Ok(header)
    }

    /// Serialize the header to its 8-byte wire form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let bytes = IntoBytes::as_bytes(self);
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(bytes);
        arr
    }

    /// Sync byte (0x5A on valid frames).
    #[must_use]
    pub fn sync(&self) -> u8 {
        self.sync
    }

    /// CRC16-ARC as carried on the wire.
    #[must_use]
    pub fn crc(&self) -> u16 {
        u16::from_be_bytes(self.crc)
    }

    /// Length field (payload length + 3).
    #[must_use]
    pub fn length(&self) -> u16 {
        u16::from_be_bytes(self.length)
    }

    /// Sender's transmit sequence number.
    #[must_use]
    pub fn tx_seq(&self) -> u8 {
        self.tx_seq
    }

    /// Last received sequence number being acknowledged.
    #[must_use]
    pub fn rx_seq(&self) -> u8 {
        self.rx_seq
    }

    /// Type byte as transmitted (direction bit still present on
    /// client-to-server frames).
    #[must_use]
    pub fn packet_type(&self) -> u8 {
        self.packet_type
    }
}

impl std::fmt::Debug for PacketHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketHeader")
            .field("sync", &format!("{:#04x}", self.sync()))
            .field("crc", &format!("{:#06x}", self.crc()))
            .field("length", &self.length())
            .field("tx_seq", &format!("{:#04x}", self.tx_seq()))
            .field("rx_seq", &format!("{:#04x}", self.rx_seq()))
            .field("packet_type", &format!("{:#04x}", self.packet_type()))
            .finish()
    }
}

impl PartialEq for PacketHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for PacketHeader {}
