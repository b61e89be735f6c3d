//! Payload body of DATA (0x20) packets.

use bytes::{BufMut, Bytes};

use crate::errors::{ProtocolError, Result};

/// Payload of a DATA packet: a two-byte token followed by opaque data.
///
/// The token identifies the application-layer handler on the peer; its
/// semantics are outside the codec's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPayload {
    /// Two-byte token field.
    pub token: [u8; 2],
    /// Opaque data carried after the token.
    pub data: Bytes,
}

impl DataPayload {
    /// Create a payload from a token and data bytes.
    #[must_use]
    pub fn new(token: [u8; 2], data: impl Into<Bytes>) -> Self {
        Self { token, data: data.into() }
    }

    /// Encoded length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.token.len() + self.data.len()
    }

    /// True when the payload would encode to zero bytes. The token is always
    /// present, so this never holds; provided for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the payload to `dst` in wire order.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_slice(&self.token);
        dst.put_slice(&self.data);
    }

    /// Parse a payload from raw bytes.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooShort` if fewer than 2 bytes are supplied
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let Some((token, data)) = payload.split_first_chunk::<2>() else {
            return Err(ProtocolError::PayloadTooShort { expected: 2, actual: payload.len() });
        };

        Ok(Self { token: *token, data: Bytes::copy_from_slice(data) })
    }
}
