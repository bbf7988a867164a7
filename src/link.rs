use serialport::SerialPort;
use std::io::{ErrorKind, Write};
use thiserror::Error;

use crate::clamp::{mask_buttons, sat_coord, sat_i16};
use crate::frame::{FLAG_MODE_PIX, FRAME_LEN, Frame, PROTO_VERSION};
use crate::port::{PortResolver, PortSpec, open_port, resolve_port};

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("serial write: {0}")]
    Write(#[from] std::io::Error),
}

/// Sequenced frame sender over an optional transport. Without a transport
/// the link is disabled and every send is discarded. No ack, no retransmit.
pub struct Link<W: Write = Box<dyn SerialPort>> {
    port: Option<W>,
    port_name: Option<String>,
    mode: String,
    seq: u16,
    sent: u64,
    discarded: u64,
    dropped: u64,
    debug: bool,
}

impl Link<Box<dyn SerialPort>> {
    /// Resolve and open the device. Never fails: an unresolved or
    /// unopenable port yields a disabled link.
    pub fn open(spec: &PortSpec, baud: u32, mode: &str, resolver: &dyn PortResolver) -> Self {
        let Some(dev) = resolve_port(spec, resolver) else {
            eprintln!("[link] no device found for {:?}; link disabled", spec);
            return Self::disabled(mode);
        };
        match open_port(&dev, baud) {
            Ok(port) => {
                eprintln!("[link] dev={} baud={} mode={}", dev, baud, mode);
                let mut link = Self::with_transport(port, mode);
                link.port_name = Some(dev);
                link
            }
            Err(e) => {
                eprintln!("[link] {}; link disabled", e);
                Self::disabled(mode)
            }
        }
    }
}

impl<W: Write> Link<W> {
    pub fn with_transport(port: W, mode: &str) -> Self {
        Self {
            port: Some(port),
            port_name: None,
            mode: mode.to_string(),
            seq: 0,
            sent: 0,
            discarded: 0,
            dropped: 0,
            debug: false,
        }
    }

    pub fn disabled(mode: &str) -> Self {
        Self {
            port: None,
            port_name: None,
            mode: mode.to_string(),
            seq: 0,
            sent: 0,
            discarded: 0,
            dropped: 0,
            debug: false,
        }
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn is_attached(&self) -> bool {
        self.port.is_some()
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    /// Informational label; not encoded on the wire.
    pub fn mode(&self) -> &str {
        &self.mode
    }

    /// Sequence number the next built frame will carry.
    pub fn next_seq(&self) -> u16 {
        self.seq
    }

    pub fn frames_sent(&self) -> u64 {
        self.sent
    }

    pub fn frames_discarded(&self) -> u64 {
        self.discarded
    }

    /// Frames lost to a full output buffer (write timed out).
    pub fn frames_dropped(&self) -> u64 {
        self.dropped
    }

    pub fn transport(&self) -> Option<&W> {
        self.port.as_ref()
    }

    /// Encode one frame with the current sequence number, then advance it.
    pub fn build_frame(
        &mut self,
        dx: i16,
        dy: i16,
        bx: i16,
        by: i16,
        buttons: u16,
        flags: u8,
    ) -> [u8; FRAME_LEN] {
        let frame = Frame {
            version: PROTO_VERSION,
            flags,
            dx,
            dy,
            bx,
            by,
            buttons,
            seq: self.seq,
        };
        self.seq = self.seq.wrapping_add(1);
        frame.encode()
    }

    /// Relative (HID) move. All values saturate to the i16 range.
    pub fn send_relative(
        &mut self,
        dx: i64,
        dy: i64,
        bias_x: i64,
        bias_y: i64,
        buttons: u32,
    ) -> Result<(), LinkError> {
        if self.port.is_none() {
            self.discarded += 1;
            return Ok(());
        }
        let bytes = self.build_frame(
            sat_i16(dx),
            sat_i16(dy),
            sat_i16(bias_x),
            sat_i16(bias_y),
            mask_buttons(buttons),
            0,
        );
        self.write(&bytes)
    }

    /// Absolute move in pixel coordinates.
    pub fn send_absolute(&mut self, x: i64, y: i64, buttons: u32) -> Result<(), LinkError> {
        self.send_absolute_with_flags(x, y, buttons, FLAG_MODE_PIX)
    }

    /// Absolute move; coordinates saturate to `[0, 32767]`, bias is zero.
    pub fn send_absolute_with_flags(
        &mut self,
        x: i64,
        y: i64,
        buttons: u32,
        flags: u8,
    ) -> Result<(), LinkError> {
        if self.port.is_none() {
            self.discarded += 1;
            return Ok(());
        }
        let bytes = self.build_frame(
            sat_coord(x),
            sat_coord(y),
            0,
            0,
            mask_buttons(buttons),
            flags,
        );
        self.write(&bytes)
    }

    /// Zero motion, no buttons held.
    pub fn send_neutral(&mut self) -> Result<(), LinkError> {
        self.send_relative(0, 0, 0, 0, 0)
    }

    fn write(&mut self, bytes: &[u8; FRAME_LEN]) -> Result<(), LinkError> {
        let Some(port) = self.port.as_mut() else {
            return Ok(());
        };
        if self.debug {
            eprintln!("[link] tx {}", hex(bytes));
        }
        match port.write_all(bytes) {
            Ok(()) => {
                self.sent += 1;
                Ok(())
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                self.dropped += 1;
                if self.debug {
                    eprintln!("[link] dropped seq={}: {}", self.seq.wrapping_sub(1), e);
                }
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

pub fn hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02X}", b);
    }
    s
}
