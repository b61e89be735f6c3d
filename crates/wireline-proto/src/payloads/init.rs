//! Payload body of INIT (0x23) packets for V3-era clients.
//!
//! A fixed 49-byte big-endian record describing the client machine. Most
//! fields were only ever inspected by the historical host software; the
//! codec treats them as plain unsigned integers and preserves them exactly.

use bytes::{Buf, BufMut};

use crate::errors::{ProtocolError, Result};

/// Session-initialization payload sent by V3 clients.
///
/// Field order and widths match the wire layout exactly. The default value
/// is the record a stock client would send: platform 0x03, version 0x6E.0x5F,
/// 16 MB machine memory, May 15 release date, everything else zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V3InitPayload {
    /// Client platform identifier.
    pub platform: u8,
    /// Client major version.
    pub major_ver: u8,
    /// Client minor version.
    pub minor_ver: u8,
    /// Unused byte, transmitted as-is.
    pub unused: u8,
    /// Memory installed on the host machine.
    pub machine_memory: u8,
    /// Memory available to the client application.
    pub app_memory: u8,
    /// Machine type code.
    pub pc_type: u16,
    /// Client build month.
    pub release_month: u8,
    /// Client build day.
    pub release_day: u8,
    /// Customer classification code.
    pub customer_class: u16,
    /// UDO timestamp.
    pub udo_timestamp: u32,
    /// DOS version.
    pub dos_ver: u16,
    /// Session flag bits.
    pub session_flags: u16,
    /// Video adapter type.
    pub video_type: u8,
    /// CPU type.
    pub cpu_type: u8,
    /// Installation media type.
    pub media_type: u32,
    /// Windows version.
    pub win_ver: u32,
    /// Windows memory mode.
    pub win_memory_mode: u8,
    /// Horizontal display resolution.
    pub horizontal_res: u16,
    /// Vertical display resolution.
    pub vertical_res: u16,
    /// Number of display colors.
    pub num_colors: u16,
    /// Filler byte.
    pub filler: u8,
    /// Region code.
    pub region: u16,
    /// Language preference slots.
    pub languages: [u16; 4],
    /// Connection speed code.
    pub connect_speed: u8,
}

impl V3InitPayload {
    /// Size of the serialized record (49 bytes).
    pub const SIZE: usize = 49;

    /// Write the record to `dst` in wire order.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(self.platform);
        dst.put_u8(self.major_ver);
        dst.put_u8(self.minor_ver);
        dst.put_u8(self.unused);
        dst.put_u8(self.machine_memory);
        dst.put_u8(self.app_memory);
        dst.put_u16(self.pc_type);
        dst.put_u8(self.release_month);
        dst.put_u8(self.release_day);
        dst.put_u16(self.customer_class);
        dst.put_u32(self.udo_timestamp);
        dst.put_u16(self.dos_ver);
        dst.put_u16(self.session_flags);
        dst.put_u8(self.video_type);
        dst.put_u8(self.cpu_type);
        dst.put_u32(self.media_type);
        dst.put_u32(self.win_ver);
        dst.put_u8(self.win_memory_mode);
        dst.put_u16(self.horizontal_res);
        dst.put_u16(self.vertical_res);
        dst.put_u16(self.num_colors);
        dst.put_u8(self.filler);
        dst.put_u16(self.region);
        for language in self.languages {
            dst.put_u16(language);
        }
        dst.put_u8(self.connect_speed);
    }

    /// Parse a record from raw bytes. Trailing bytes beyond the fixed 49 are
    /// ignored.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooShort` if fewer than 49 bytes are supplied
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < Self::SIZE {
            return Err(ProtocolError::PayloadTooShort {
                expected: Self::SIZE,
                actual: payload.len(),
            });
        }

        let mut buf = &payload[..Self::SIZE];

        Ok(Self {
            platform: buf.get_u8(),
            major_ver: buf.get_u8(),
            minor_ver: buf.get_u8(),
            unused: buf.get_u8(),
            machine_memory: buf.get_u8(),
            app_memory: buf.get_u8(),
            pc_type: buf.get_u16(),
            release_month: buf.get_u8(),
            release_day: buf.get_u8(),
            customer_class: buf.get_u16(),
            udo_timestamp: buf.get_u32(),
            dos_ver: buf.get_u16(),
            session_flags: buf.get_u16(),
            video_type: buf.get_u8(),
            cpu_type: buf.get_u8(),
            media_type: buf.get_u32(),
            win_ver: buf.get_u32(),
            win_memory_mode: buf.get_u8(),
            horizontal_res: buf.get_u16(),
            vertical_res: buf.get_u16(),
            num_colors: buf.get_u16(),
            filler: buf.get_u8(),
            region: buf.get_u16(),
            languages: [buf.get_u16(), buf.get_u16(), buf.get_u16(), buf.get_u16()],
            connect_speed: buf.get_u8(),
        })
    }
}

impl Default for V3InitPayload {
    fn default() -> Self {
        Self {
            platform: 0x03,
            major_ver: 0x6E,
            minor_ver: 0x5F,
            unused: 0x00,
            machine_memory: 0x10,
            app_memory: 0x00,
            pc_type: 0x0000,
            release_month: 0x05,
            release_day: 0x0F,
            customer_class: 0x0000,
            udo_timestamp: 0x0000_0000,
            dos_ver: 0x0000,
            session_flags: 0x0000,
            video_type: 0x00,
            cpu_type: 0x00,
            media_type: 0x0000_0000,
            win_ver: 0x0000_0000,
            win_memory_mode: 0x00,
            horizontal_res: 0x0000,
            vertical_res: 0x0000,
            num_colors: 0x0000,
            filler: 0x00,
            region: 0x0000,
            languages: [0; 4],
            connect_speed: 0x00,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A capture-shaped record: stock defaults with a handful of fields the
    // client actually fills in.
    const RAW: [u8; V3InitPayload::SIZE] = [
        0x03, // platform
        0x6E, // major_ver
        0x5F, // minor_ver
        0x00, // unused
        0x10, // machine_memory
        0x00, // app_memory
        0x00, 0x00, // pc_type
        0x05, // release_month
        0x0F, // release_day
        0x00, 0x00, // customer_class
        0x1C, 0x98, 0x0B, 0x3A, // udo_timestamp
        0xC3, 0xB6, // dos_ver
        0x10, 0xC0, // session_flags
        0x03, // video_type
        0x03, // cpu_type
        0x00, 0x00, 0x00, 0x00, // media_type
        0x04, 0x00, 0x00, 0x00, // win_ver
        0x01, // win_memory_mode
        0xC0, 0x06, // horizontal_res
        0x5D, 0x04, // vertical_res
        0xFF, 0xFF, // num_colors
        0x00, // filler
        0x00, 0x00, // region
        0x00, 0x00, // languages[0]
        0x00, 0x00, // languages[1]
        0x00, 0x00, // languages[2]
        0x00, 0x00, // languages[3]
        0x02, // connect_speed
    ];

    #[test]
    fn defaults() {
        let payload = V3InitPayload::default();
        assert_eq!(payload.platform, 0x03);
        assert_eq!(payload.major_ver, 0x6E);
        assert_eq!(payload.minor_ver, 0x5F);
        assert_eq!(payload.machine_memory, 0x10);
        assert_eq!(payload.release_month, 0x05);
        assert_eq!(payload.release_day, 0x0F);
        assert_eq!(payload.languages, [0; 4]);
        assert_eq!(payload.udo_timestamp, 0);
        assert_eq!(payload.connect_speed, 0);
    }

    #[test]
    fn decode_fixed_record() {
        let payload = V3InitPayload::decode(&RAW).unwrap();
        assert_eq!(payload.udo_timestamp, 0x1C98_0B3A);
        assert_eq!(payload.dos_ver, 0xC3B6);
        assert_eq!(payload.session_flags, 0x10C0);
        assert_eq!(payload.video_type, 0x03);
        assert_eq!(payload.cpu_type, 0x03);
        assert_eq!(payload.win_ver, 0x0400_0000);
        assert_eq!(payload.win_memory_mode, 0x01);
        assert_eq!(payload.horizontal_res, 0xC006);
        assert_eq!(payload.vertical_res, 0x5D04);
        assert_eq!(payload.num_colors, 0xFFFF);
        assert_eq!(payload.connect_speed, 0x02);
    }

    #[test]
    fn round_trip() {
        let payload = V3InitPayload::decode(&RAW).unwrap();
        let mut wire = Vec::new();
        payload.encode(&mut wire);
        assert_eq!(wire.len(), V3InitPayload::SIZE);
        assert_eq!(wire, RAW);
    }

    #[test]
    fn decode_ignores_trailing_bytes() {
        let mut extended = RAW.to_vec();
        extended.extend_from_slice(&[0xAA, 0xBB]);
        assert_eq!(V3InitPayload::decode(&extended), V3InitPayload::decode(&RAW));
    }

    #[test]
    fn decode_rejects_short_input() {
        assert_eq!(
            V3InitPayload::decode(&RAW[..48]),
            Err(ProtocolError::PayloadTooShort { expected: 49, actual: 48 })
        );
    }
}
