//! Binary frame layout shared with the actuator firmware.
//!
//! ```text
//! AA 55 | ver:u8 | flags:u8 | dx:i16 | dy:i16 | bx:i16 | by:i16 | buttons:u16 | seq:u16 | crc:u16
//! ```
//!
//! Little-endian throughout, 18 bytes. The CRC covers `ver..=seq`.

use thiserror::Error;

use crate::crc::crc16_x25;

pub const HEADER: [u8; 2] = [0xAA, 0x55];
pub const PROTO_VERSION: u8 = 1;
pub const FRAME_LEN: usize = 18;

/// Firmware honours the frame (reserved on the host side, left to the caller).
pub const FLAG_ENABLE: u8 = 1 << 0;
/// Absolute coordinates are pixels; clear means HID units.
pub const FLAG_MODE_PIX: u8 = 1 << 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("short frame: {0} bytes")]
    Short(usize),
    #[error("bad header {0:02X} {1:02X}")]
    BadHeader(u8, u8),
    #[error("unsupported version {0}")]
    Version(u8),
    #[error("crc {calc:04X}!={rx:04X}")]
    Crc { calc: u16, rx: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub version: u8,
    pub flags: u8,
    pub dx: i16,
    pub dy: i16,
    pub bx: i16,
    pub by: i16,
    pub buttons: u16,
    pub seq: u16,
}

impl Frame {
    pub fn is_pixel_mode(&self) -> bool {
        self.flags & FLAG_MODE_PIX != 0
    }

    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut out = [0u8; FRAME_LEN];
        out[..2].copy_from_slice(&HEADER);
        out[2] = self.version;
        out[3] = self.flags;
        out[4..6].copy_from_slice(&self.dx.to_le_bytes());
        out[6..8].copy_from_slice(&self.dy.to_le_bytes());
        out[8..10].copy_from_slice(&self.bx.to_le_bytes());
        out[10..12].copy_from_slice(&self.by.to_le_bytes());
        out[12..14].copy_from_slice(&self.buttons.to_le_bytes());
        out[14..16].copy_from_slice(&self.seq.to_le_bytes());
        let crc = crc16_x25(&out[2..16]);
        out[16..18].copy_from_slice(&crc.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Frame, FrameError> {
        if bytes.len() < FRAME_LEN {
            return Err(FrameError::Short(bytes.len()));
        }
        if bytes[..2] != HEADER {
            return Err(FrameError::BadHeader(bytes[0], bytes[1]));
        }
        let calc = crc16_x25(&bytes[2..16]);
        let rx = u16::from_le_bytes([bytes[16], bytes[17]]);
        if calc != rx {
            return Err(FrameError::Crc { calc, rx });
        }
        if bytes[2] != PROTO_VERSION {
            return Err(FrameError::Version(bytes[2]));
        }
        let i16_at = |i: usize| i16::from_le_bytes([bytes[i], bytes[i + 1]]);
        let u16_at = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]);
        Ok(Frame {
            version: bytes[2],
            flags: bytes[3],
            dx: i16_at(4),
            dy: i16_at(6),
            bx: i16_at(8),
            by: i16_at(10),
            buttons: u16_at(12),
            seq: u16_at(14),
        })
    }
}

enum State {
    Sync0,
    Sync1,
    Body { buf: [u8; FRAME_LEN], n: usize },
}

/// Byte-at-a-time frame scanner. Resynchronises on the `AA 55` header after
/// garbage or a rejected frame, including a header found inside the
/// rejected bytes.
pub struct FrameDecoder {
    state: State,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self { state: State::Sync0 }
    }

    /// Feed one byte. Returns a result once 18 bytes following a header have
    /// been collected.
    pub fn push(&mut self, byte: u8) -> Option<Result<Frame, FrameError>> {
        match &mut self.state {
            State::Sync0 => {
                if byte == HEADER[0] {
                    self.state = State::Sync1;
                }
            }
            State::Sync1 => {
                if byte == HEADER[1] {
                    let mut buf = [0u8; FRAME_LEN];
                    buf[..2].copy_from_slice(&HEADER);
                    self.state = State::Body { buf, n: 2 };
                } else if byte != HEADER[0] {
                    self.state = State::Sync0;
                }
            }
            State::Body { buf, n } => {
                buf[*n] = byte;
                *n += 1;
                if *n == FRAME_LEN {
                    let bytes = *buf;
                    self.state = State::Sync0;
                    let res = Frame::decode(&bytes);
                    if res.is_err() {
                        // Rescan for a header inside the rejected bytes. Fewer than
                        // FRAME_LEN bytes are re-fed, so nothing completes here.
                        for &b in &bytes[1..] {
                            self.push(b);
                        }
                    }
                    return Some(res);
                }
            }
        }
        None
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABS_960_540: [u8; FRAME_LEN] = [
        0xAA, 0x55, 0x01, 0x09, 0xC0, 0x03, 0x1C, 0x02, 0x00, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00,
        0x00, 0x7A, 0xBD,
    ];

    fn abs_frame() -> Frame {
        Frame {
            version: PROTO_VERSION,
            flags: FLAG_ENABLE | FLAG_MODE_PIX,
            dx: 960,
            dy: 540,
            bx: 0,
            by: 0,
            buttons: 0b011,
            seq: 0,
        }
    }

    #[test]
    fn golden_absolute_frame() {
        let bytes = abs_frame().encode();
        assert_eq!(bytes.len(), 18);
        assert_eq!(bytes, ABS_960_540);
        let crc = u16::from_le_bytes([bytes[16], bytes[17]]);
        assert_eq!(crc, crc16_x25(&bytes[2..16]));
    }

    #[test]
    fn field_order_is_little_endian() {
        let f = Frame {
            version: PROTO_VERSION,
            flags: 0,
            dx: i16::MAX,
            dy: i16::MIN,
            bx: 5,
            by: -5,
            buttons: 0xFFFF,
            seq: 0xFFFF,
        };
        let b = f.encode();
        assert_eq!(&b[4..8], &[0xFF, 0x7F, 0x00, 0x80]);
        assert_eq!(&b[8..12], &[0x05, 0x00, 0xFB, 0xFF]);
        assert_eq!(&b[16..18], &[0x2A, 0xB9]);
    }

    #[test]
    fn decode_roundtrip_and_flags() {
        let f = Frame::decode(&ABS_960_540).unwrap();
        assert_eq!(f, abs_frame());
        assert!(f.is_pixel_mode());
    }

    #[test]
    fn decode_rejects_corruption() {
        let mut bad = ABS_960_540;
        bad[5] ^= 0x01;
        assert!(matches!(Frame::decode(&bad), Err(FrameError::Crc { .. })));
        assert_eq!(Frame::decode(&bad[..10]), Err(FrameError::Short(10)));
        let mut hdr = ABS_960_540;
        hdr[0] = 0x00;
        assert_eq!(Frame::decode(&hdr), Err(FrameError::BadHeader(0x00, 0x55)));
    }

    #[test]
    fn decoder_resyncs_after_garbage() {
        let mut d = FrameDecoder::new();
        let mut out = Vec::new();
        let mut stream = vec![0x00, 0xAA, 0x13, 0xAA];
        stream.extend_from_slice(&ABS_960_540);
        stream.extend_from_slice(&ABS_960_540);
        for b in stream {
            if let Some(r) = d.push(b) {
                out.push(r);
            }
        }
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| r.as_ref() == Ok(&abs_frame())));
    }

    #[test]
    fn decoder_recovers_frame_after_truncated_frame() {
        let mut d = FrameDecoder::new();
        let mut stream = vec![0xAA, 0x55, 0x01, 0x00, 0x05];
        stream.extend_from_slice(&ABS_960_540);
        let results: Vec<_> = stream.iter().filter_map(|b| d.push(*b)).collect();
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Err(FrameError::Crc { .. })));
        assert_eq!(results[1], Ok(abs_frame()));
    }

    #[test]
    fn decoder_keeps_trailing_sync_byte_of_rejected_frame() {
        let mut d = FrameDecoder::new();
        let mut stream = vec![0xAA, 0x55];
        stream.extend_from_slice(&[0x00; 15]);
        stream.push(0xAA);
        stream.extend_from_slice(&ABS_960_540[1..]);
        let results: Vec<_> = stream.iter().filter_map(|b| d.push(*b)).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_err());
        assert_eq!(results[1], Ok(abs_frame()));
    }

    #[test]
    fn decoder_reports_bad_crc_then_recovers() {
        let mut d = FrameDecoder::new();
        let mut bad = ABS_960_540;
        bad[16] ^= 0xFF;
        let mut results = Vec::new();
        for b in bad.iter().chain(ABS_960_540.iter()) {
            if let Some(r) = d.push(*b) {
                results.push(r);
            }
        }
        assert!(matches!(results[0], Err(FrameError::Crc { .. })));
        assert_eq!(results[1], Ok(abs_frame()));
    }
}
