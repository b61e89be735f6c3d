//! P3 packet framing.
//!
//! A P3 frame is `sync | crc | length | tx_seq | rx_seq | packet_type |
//! payload | msg_end`, everything big-endian, 9 bytes minimum. Client and
//! server frames differ only in the transmitted type byte: the client sets
//! bit 0x80, the server does not. The CRC covers `length || tx_seq ||
//! rx_seq || type-byte-as-transmitted || payload`.
//!
//! The format has no self-framing beyond the fixed trailer; splitting a byte
//! stream into frames is the caller's job (read the 8-byte header, then
//! `length - 3 + 1` more bytes).

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    crc::crc16_arc_update,
    errors::{ProtocolError, Result},
    header::PacketHeader,
    payloads::{DataPayload, PacketPayload, V3InitPayload},
};

/// Sync byte opening every valid frame.
pub const SYNC_BYTE: u8 = 0x5A;

/// End-of-message marker closing every valid frame.
pub const MSG_END_BYTE: u8 = 0x0D;

/// Largest payload the 16-bit length field can describe.
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize - 3;

/// Minimum wire size of a frame (empty payload).
pub const MIN_PACKET_SIZE: usize = PacketHeader::SIZE + 1;

/// The closed set of known P3 packet types.
///
/// Values are the server-side byte; client frames transmit the same value
/// with bit 0x80 set. Types 0x28..=0x2B and SYNC are undocumented but occur
/// on real sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Application data, token-tagged.
    Data = 0x20,
    /// Start session.
    Ss = 0x21,
    /// Start-session response.
    Ssr = 0x22,
    /// Session initialization (carries a [`V3InitPayload`]).
    Init = 0x23,
    /// Positive acknowledgement.
    Ack = 0x24,
    /// Negative acknowledgement (carries a [`NakError`] byte).
    Nak = 0x25,
    /// Keepalive.
    Heartbeat = 0x26,
    /// Link reset.
    Reset = 0x28,
    /// Resume acknowledgement.
    Rak = 0x29,
    /// Link setup.
    Setup = 0x2A,
    /// Immediate acknowledgement request.
    Acknow = 0x2B,
    /// Resynchronization marker.
    Sync = 0x5A,
}

impl PacketType {
    /// Look up a type from its server-side byte value. `None` if unknown.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x20 => Some(Self::Data),
            0x21 => Some(Self::Ss),
            0x22 => Some(Self::Ssr),
            0x23 => Some(Self::Init),
            0x24 => Some(Self::Ack),
            0x25 => Some(Self::Nak),
            0x26 => Some(Self::Heartbeat),
            0x28 => Some(Self::Reset),
            0x29 => Some(Self::Rak),
            0x2A => Some(Self::Setup),
            0x2B => Some(Self::Acknow),
            0x5A => Some(Self::Sync),
            _ => None,
        }
    }

    /// Server-side byte value of this type.
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Error codes carried in the 1-byte payload of a NAK packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NakError {
    /// CRC mismatch on the rejected frame.
    Crc = 0x01,
    /// Unexpected sequence number.
    Seq = 0x02,
    /// Bad length field.
    Len = 0x03,
}

impl NakError {
    /// Look up an error code from its byte value. `None` if unknown.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Crc),
            0x02 => Some(Self::Seq),
            0x03 => Some(Self::Len),
            _ => None,
        }
    }

    /// Byte value of this error code.
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Which peer transmits a frame.
///
/// Direction is a parameter of encoding and decoding, not a separate packet
/// type: the only wire difference is the high bit of the type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Client to server; transmitted type byte has bit 0x80 set.
    Client,
    /// Server to client; transmitted type byte is the raw value.
    Server,
}

impl Direction {
    /// Bit set on the type byte of client-to-server frames.
    pub const CLIENT_BIT: u8 = 0x80;

    /// Resolve the type byte as transmitted for this direction.
    #[must_use]
    pub const fn apply(self, packet_type: u8) -> u8 {
        match self {
            Self::Client => packet_type | Self::CLIENT_BIT,
            Self::Server => packet_type,
        }
    }

    /// Undo [`Self::apply`] on a received type byte.
    #[must_use]
    pub const fn strip(self, packet_type: u8) -> u8 {
        match self {
            Self::Client => packet_type & !Self::CLIENT_BIT,
            Self::Server => packet_type,
        }
    }
}

/// A P3 frame.
///
/// Holds the decoded field values plus the wire-observed sync, CRC, and end
/// marker so that [`Self::is_valid`] can report on exactly what was
/// received. Constructed packets always carry valid framing bytes and a
/// freshly computed CRC.
///
/// # Invariants
///
/// - `packet_type` is stored with the direction bit stripped; the
///   transmitted byte is recovered via [`Self::type_byte`].
/// - `length` equals `payload length + 3`. Decoding recomputes it from the
///   actually-sliced payload, so a frame whose length field overruns the
///   supplied bytes ends up with a length that no longer matches its CRC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    direction: Direction,
    sync: u8,
    crc: u16,
    length: u16,
    tx_seq: u8,
    rx_seq: u8,
    packet_type: u8,
    payload: PacketPayload,
    msg_end: u8,
}

impl Packet {
    /// Build a packet with a computed CRC and valid framing bytes.
    #[must_use]
    pub fn new(
        direction: Direction,
        packet_type: PacketType,
        tx_seq: u8,
        rx_seq: u8,
        payload: impl Into<PacketPayload>,
    ) -> Self {
        let payload = payload.into();

        let mut packet = Self {
            direction,
            sync: SYNC_BYTE,
            crc: 0,
            length: (payload.len() + 3) as u16,
            tx_seq,
            rx_seq,
            packet_type: packet_type.to_u8(),
            payload,
            msg_end: MSG_END_BYTE,
        };
        packet.crc = packet.compute_crc();

        packet
    }

    /// Decode a single complete frame.
    ///
    /// The payload is sliced from offset 8 using `max(0, length - 3)` bytes
    /// (clamped to the input) and kept raw; `msg_end` is taken from the last
    /// byte of the input. No CRC or framing-byte checks happen here; use
    /// [`Self::is_valid`].
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PacketTooShort` if fewer than 9 bytes are supplied
    pub fn decode(data: &[u8], direction: Direction) -> Result<Self> {
        if data.len() < MIN_PACKET_SIZE {
            return Err(ProtocolError::PacketTooShort { actual: data.len() });
        }

        let header = PacketHeader::from_bytes(data)?;

        let payload_len = usize::from(header.length()).saturating_sub(3);
        let end = usize::min(PacketHeader::SIZE + payload_len, data.len());
        let payload = Bytes::copy_from_slice(&data[PacketHeader::SIZE..end]);

        Ok(Self {
            direction,
            sync: header.sync(),
            crc: header.crc(),
            length: (payload.len() + 3) as u16,
            tx_seq: header.tx_seq(),
            rx_seq: header.rx_seq(),
            packet_type: direction.strip(header.packet_type()),
            payload: PacketPayload::Raw(payload),
            msg_end: data[data.len() - 1],
        })
    }

    /// Encode the frame into `dst` in wire order.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` if the payload exceeds
    ///   [`MAX_PAYLOAD_SIZE`]
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let header = PacketHeader::new(
            self.sync,
            self.crc,
            self.length,
            self.tx_seq,
            self.rx_seq,
            self.type_byte(),
        );

        dst.put_slice(&header.to_bytes());
        self.payload.encode(dst);
        dst.put_u8(self.msg_end);

        Ok(())
    }

    /// Encode the frame to a fresh buffer.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` if the payload exceeds
    ///   [`MAX_PAYLOAD_SIZE`]
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(MIN_PACKET_SIZE + self.payload.len());
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Compute the CRC16-ARC over `length || tx_seq || rx_seq ||
    /// type-byte-as-transmitted || payload`.
    #[must_use]
    pub fn compute_crc(&self) -> u16 {
        let mut head = [0u8; 5];
        head[..2].copy_from_slice(&self.length.to_be_bytes());
        head[2] = self.tx_seq;
        head[3] = self.rx_seq;
        head[4] = self.type_byte();

        crc16_arc_update(crc16_arc_update(0, &head), &self.payload.to_bytes())
    }

    /// True when the stored CRC matches a recomputation.
    #[must_use]
    pub fn is_valid_crc(&self) -> bool {
        self.crc == self.compute_crc()
    }

    /// Check frame validity.
    ///
    /// Strict mode additionally requires the sync byte, a known packet type,
    /// and the end marker; both modes require a matching CRC. Consumers that
    /// must tolerate unknown types should pass `strict = false`.
    #[must_use]
    pub fn is_valid(&self, strict: bool) -> bool {
        let framing = !strict
            || (self.sync == SYNC_BYTE
                && PacketType::from_u8(self.packet_type).is_some()
                && self.msg_end == MSG_END_BYTE);

        framing && self.is_valid_crc()
    }

    /// Transmission direction of this packet.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Sync byte as constructed or received.
    #[must_use]
    pub fn sync(&self) -> u8 {
        self.sync
    }

    /// CRC as constructed or received (not necessarily valid; see
    /// [`Self::is_valid_crc`]).
    #[must_use]
    pub fn crc(&self) -> u16 {
        self.crc
    }

    /// Length field (payload length + 3).
    #[must_use]
    pub fn length(&self) -> u16 {
        self.length
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

    /// Packet type byte with the direction bit stripped.
    #[must_use]
    pub fn packet_type(&self) -> u8 {
        self.packet_type
    }

    /// Packet type as enum. `None` if the byte is not a known type.
    #[must_use]
    pub fn packet_type_enum(&self) -> Option<PacketType> {
        PacketType::from_u8(self.packet_type)
    }

    /// Type byte as transmitted for this packet's direction.
    #[must_use]
    pub fn type_byte(&self) -> u8 {
        self.direction.apply(self.packet_type)
    }

    /// Payload body.
    #[must_use]
    pub fn payload(&self) -> &PacketPayload {
        &self.payload
    }

    /// End-of-message byte as constructed or received.
    #[must_use]
    pub fn msg_end(&self) -> u8 {
        self.msg_end
    }
}

/// Factory surface: one constructor per direction and intent.
impl Packet {
    /// Build a client-to-server packet.
    #[must_use]
    pub fn client(
        packet_type: PacketType,
        tx_seq: u8,
        rx_seq: u8,
        payload: impl Into<PacketPayload>,
    ) -> Self {
        Self::new(Direction::Client, packet_type, tx_seq, rx_seq, payload)
    }

    /// Build a server-to-client packet.
    #[must_use]
    pub fn server(
        packet_type: PacketType,
        tx_seq: u8,
        rx_seq: u8,
        payload: impl Into<PacketPayload>,
    ) -> Self {
        Self::new(Direction::Server, packet_type, tx_seq, rx_seq, payload)
    }

    /// Decode a client-to-server frame (type byte is masked).
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PacketTooShort` if fewer than 9 bytes are supplied
    pub fn decode_client(data: &[u8]) -> Result<Self> {
        Self::decode(data, Direction::Client)
    }

    /// Decode a server-to-client frame (type byte is kept raw).
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PacketTooShort` if fewer than 9 bytes are supplied
    pub fn decode_server(data: &[u8]) -> Result<Self> {
        Self::decode(data, Direction::Server)
    }

    /// Client DATA packet carrying `token` and `data`.
    #[must_use]
    pub fn client_data(tx_seq: u8, rx_seq: u8, token: [u8; 2], data: impl Into<Bytes>) -> Self {
        Self::client(PacketType::Data, tx_seq, rx_seq, DataPayload::new(token, data))
    }

    /// Server DATA packet carrying `token` and `data`.
    #[must_use]
    pub fn server_data(tx_seq: u8, rx_seq: u8, token: [u8; 2], data: impl Into<Bytes>) -> Self {
        Self::server(PacketType::Data, tx_seq, rx_seq, DataPayload::new(token, data))
    }

    /// Client ACK packet (empty payload).
    #[must_use]
    pub fn client_ack(tx_seq: u8, rx_seq: u8) -> Self {
        Self::client(PacketType::Ack, tx_seq, rx_seq, PacketPayload::empty())
    }

    /// Server ACK packet (empty payload).
    #[must_use]
    pub fn server_ack(tx_seq: u8, rx_seq: u8) -> Self {
        Self::server(PacketType::Ack, tx_seq, rx_seq, PacketPayload::empty())
    }

    /// Client NAK packet carrying a 1-byte error code.
    #[must_use]
    pub fn client_nak(tx_seq: u8, rx_seq: u8, nak_err: NakError) -> Self {
        Self::client(PacketType::Nak, tx_seq, rx_seq, nak_err)
    }

    /// Server NAK packet carrying a 1-byte error code.
    #[must_use]
    pub fn server_nak(tx_seq: u8, rx_seq: u8, nak_err: NakError) -> Self {
        Self::server(PacketType::Nak, tx_seq, rx_seq, nak_err)
    }

    /// Client HEARTBEAT packet (empty payload).
    #[must_use]
    pub fn client_heartbeat(tx_seq: u8, rx_seq: u8) -> Self {
        Self::client(PacketType::Heartbeat, tx_seq, rx_seq, PacketPayload::empty())
    }

    /// Server HEARTBEAT packet (empty payload).
    #[must_use]
    pub fn server_heartbeat(tx_seq: u8, rx_seq: u8) -> Self {
        Self::server(PacketType::Heartbeat, tx_seq, rx_seq, PacketPayload::empty())
    }

    /// Client INIT packet carrying a session-initialization record.
    #[must_use]
    pub fn client_init(tx_seq: u8, rx_seq: u8, init: V3InitPayload) -> Self {
        Self::client(PacketType::Init, tx_seq, rx_seq, init)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Wire vectors lifted from captured sessions.
    const CLIENT_ACK: [u8; 9] = [0x5A, 0x35, 0x14, 0x00, 0x03, 0x20, 0x30, 0xA4, 0x0D];
    const SERVER_ACK: [u8; 9] = [0x5A, 0x95, 0x15, 0x00, 0x03, 0x20, 0x30, 0x24, 0x0D];
    const CLIENT_NAK_SEQ: [u8; 10] = [0x5A, 0xE2, 0x7E, 0x00, 0x04, 0x17, 0x1B, 0xA5, 0x02, 0x0D];
    const SERVER_NAK_SEQ: [u8; 10] = [0x5A, 0x22, 0x1F, 0x00, 0x04, 0x17, 0x1B, 0x25, 0x02, 0x0D];

    #[test]
    fn client_ack_encodes_to_vector() {
        let packet = Packet::client_ack(0x20, 0x30);
        assert_eq!(packet.to_bytes().unwrap().as_ref(), &CLIENT_ACK);
        assert_eq!(packet.type_byte(), 0xA4);
        assert_eq!(packet.crc(), 0x3514);
    }

    #[test]
    fn server_ack_encodes_to_vector() {
        let packet = Packet::server_ack(0x20, 0x30);
        assert_eq!(packet.to_bytes().unwrap().as_ref(), &SERVER_ACK);
        assert_eq!(packet.type_byte(), 0x24);
    }

    #[test]
    fn nak_packets_encode_to_vectors() {
        let client = Packet::client_nak(0x17, 0x1B, NakError::Seq);
        assert_eq!(client.to_bytes().unwrap().as_ref(), &CLIENT_NAK_SEQ);

        let server = Packet::server_nak(0x17, 0x1B, NakError::Seq);
        assert_eq!(server.to_bytes().unwrap().as_ref(), &SERVER_NAK_SEQ);
    }

    #[test]
    fn decode_client_strips_direction_bit() {
        let packet = Packet::decode_client(&CLIENT_ACK).unwrap();
        assert_eq!(packet.packet_type_enum(), Some(PacketType::Ack));
        assert_eq!(packet.tx_seq(), 0x20);
        assert_eq!(packet.rx_seq(), 0x30);
        assert!(packet.payload().is_empty());
        assert!(packet.is_valid(true));
    }

    #[test]
    fn decode_server_keeps_raw_type() {
        let wire = [0x5A, 0xB7, 0x11, 0x00, 0x03, 0x7F, 0x7F, 0x24, 0x0D];
        let packet = Packet::decode_server(&wire).unwrap();
        assert_eq!(packet.packet_type_enum(), Some(PacketType::Ack));
        assert_eq!(packet.tx_seq(), 0x7F);
        assert_eq!(packet.rx_seq(), 0x7F);
        assert_eq!(packet.compute_crc(), 0xB711);
        assert!(packet.is_valid(true));
    }

    #[test]
    fn decode_rejects_short_input() {
        assert_eq!(
            Packet::decode_client(&CLIENT_ACK[..8]),
            Err(ProtocolError::PacketTooShort { actual: 8 })
        );
    }

    #[test]
    fn corrupted_crc_is_soft_invalid() {
        let mut wire = CLIENT_ACK;
        wire[1] ^= 0xFF;
        let packet = Packet::decode_client(&wire).unwrap();
        assert!(!packet.is_valid(true));
        assert!(!packet.is_valid(false));
        assert!(!packet.is_valid_crc());
    }

    #[test]
    fn unknown_type_fails_strict_only() {
        // 0x3F is not a known type; rebuild the frame with a correct CRC so
        // only the strict framing check can fail.
        let mut packet = Packet::decode_server(&SERVER_ACK).unwrap();
        packet.packet_type = 0x3F;
        packet.crc = packet.compute_crc();

        assert_eq!(packet.packet_type_enum(), None);
        assert!(!packet.is_valid(true));
        assert!(packet.is_valid(false));
    }

    #[test]
    fn bad_sync_and_msg_end_fail_strict_only() {
        let mut wire = SERVER_NAK_SEQ;
        wire[0] = 0x00;
        wire[9] = 0x00;
        let packet = Packet::decode_server(&wire).unwrap();
        assert!(!packet.is_valid(true));
        assert!(packet.is_valid(false));
    }

    #[test]
    fn data_packet_round_trip() {
        let packet = Packet::client_data(0x01, 0x02, *b"AT", b"hello".as_slice());
        let wire = packet.to_bytes().unwrap();
        assert_eq!(wire.len(), 9 + 7);

        let decoded = Packet::decode_client(&wire).unwrap();
        assert!(decoded.is_valid(true));
        assert_eq!(decoded.packet_type_enum(), Some(PacketType::Data));

        let body = DataPayload::decode(&decoded.payload().to_bytes()).unwrap();
        assert_eq!(&body.token, b"AT");
        assert_eq!(body.data.as_ref(), b"hello");
    }

    #[test]
    fn init_packet_round_trip() {
        let packet = Packet::client_init(0x10, 0x20, V3InitPayload::default());
        let wire = packet.to_bytes().unwrap();
        assert_eq!(wire.len(), 9 + V3InitPayload::SIZE);

        let decoded = Packet::decode_client(&wire).unwrap();
        assert!(decoded.is_valid(true));
        assert_eq!(decoded.packet_type_enum(), Some(PacketType::Init));

        let body = V3InitPayload::decode(&decoded.payload().to_bytes()).unwrap();
        assert_eq!(body, V3InitPayload::default());
    }

    #[test]
    fn heartbeat_packets() {
        let client = Packet::client_heartbeat(0x05, 0x06);
        assert_eq!(client.type_byte(), 0xA6);
        let server = Packet::server_heartbeat(0x05, 0x06);
        assert_eq!(server.type_byte(), 0x26);
    }

    #[test]
    fn length_overrun_clamps_to_input() {
        // Length field claims 5 payload bytes but only 1 follows; the slice
        // clamps and the recomputed length no longer matches the CRC.
        let wire = [0x5A, 0x00, 0x00, 0x00, 0x08, 0x01, 0x02, 0x24, 0xFF, 0x0D];
        let packet = Packet::decode_server(&wire).unwrap();
        assert_eq!(packet.payload().len(), 2);
        assert!(!packet.is_valid(false));
    }

    #[test]
    fn oversized_payload_rejected_at_encode() {
        let big = vec![0u8; MAX_PAYLOAD_SIZE + 1];
        let packet = Packet::server(PacketType::Data, 0, 0, big);
        assert!(matches!(
            packet.to_bytes(),
            Err(ProtocolError::PayloadTooLarge { size, max })
                if size == MAX_PAYLOAD_SIZE + 1 && max == MAX_PAYLOAD_SIZE
        ));
    }
}
