//! Typed P3 packet payload bodies.
//!
//! The wire carries payloads as opaque bytes; the packet type says how to
//! interpret them. Decoding therefore always yields [`PacketPayload::Raw`],
//! and the typed parses ([`DataPayload::decode`], [`V3InitPayload::decode`])
//! are explicit calls made once the caller has looked at the type.

mod data;
mod init;

use bytes::{BufMut, Bytes, BytesMut};

pub use self::{data::DataPayload, init::V3InitPayload};
use crate::packet::NakError;

/// Payload body of a P3 packet.
///
/// `Raw` holds undecoded bytes (including an empty payload); the remaining
/// variants are the typed bodies the packet factory produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketPayload {
    /// Undecoded payload bytes.
    Raw(Bytes),
    /// Token-tagged body of a DATA packet.
    Data(DataPayload),
    /// Session-initialization record of an INIT packet.
    V3Init(V3InitPayload),
    /// Single-byte error code of a NAK packet.
    Nak(NakError),
}

impl PacketPayload {
    /// The empty payload.
    #[must_use]
    pub const fn empty() -> Self {
        Self::Raw(Bytes::new())
    }

    /// Encoded length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Raw(bytes) => bytes.len(),
            Self::Data(data) => data.len(),
            Self::V3Init(_) => V3InitPayload::SIZE,
            Self::Nak(_) => 1,
        }
    }

    /// True when the payload encodes to zero bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the payload to `dst` in wire order.
    pub fn encode(&self, dst: &mut impl BufMut) {
        match self {
            Self::Raw(bytes) => dst.put_slice(bytes),
            Self::Data(data) => data.encode(dst),
            Self::V3Init(init) => init.encode(dst),
            Self::Nak(code) => dst.put_u8(code.to_u8()),
        }
    }

    /// Encoded payload bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Self::Raw(bytes) => bytes.clone(),
            _ => {
                let mut buf = BytesMut::with_capacity(self.len());
                self.encode(&mut buf);
                buf.freeze()
            },
        }
    }
}

impl Default for PacketPayload {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Bytes> for PacketPayload {
    fn from(bytes: Bytes) -> Self {
        Self::Raw(bytes)
    }
}

impl From<Vec<u8>> for PacketPayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Raw(Bytes::from(bytes))
    }
}

impl From<&[u8]> for PacketPayload {
    fn from(bytes: &[u8]) -> Self {
        Self::Raw(Bytes::copy_from_slice(bytes))
    }
}

impl From<DataPayload> for PacketPayload {
    fn from(data: DataPayload) -> Self {
        Self::Data(data)
    }
}

impl From<V3InitPayload> for PacketPayload {
    fn from(init: V3InitPayload) -> Self {
        Self::V3Init(init)
    }
}

impl From<NakError> for PacketPayload {
    fn from(code: NakError) -> Self {
        Self::Nak(code)
    }
}
