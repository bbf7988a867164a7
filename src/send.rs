use anyhow::{Context, Result};

use crate::cli::{FrameOpts, Motion, Pacing, SendOpts};
use crate::clamp::{mask_buttons, sat_coord, sat_i16};
use crate::frame::{FRAME_LEN, Frame, PROTO_VERSION};
use crate::link::{Link, hex};

pub fn run(opts: SendOpts) -> Result<()> {
    let pacing = Pacing::from_cli(&opts.gap, opts.util)?;
    let spec = opts.ser.spec()?;
    let resolver = opts.ser.usb.resolver();
    let mut link = Link::open(&spec, opts.ser.baud, &opts.mode, resolver.as_ref());
    link.set_debug(opts.debug);

    if !link.is_attached() {
        eprintln!(
            "[send] link disabled, {} frame(s) will be discarded",
            opts.repeat
        );
    }

    for i in 0..opts.repeat {
        let res = match opts.motion {
            Motion::Rel {
                dx,
                dy,
                bx,
                by,
                buttons,
            } => link.send_relative(dx, dy, bx, by, buttons),
            Motion::Abs {
                x,
                y,
                buttons,
                flags,
            } => link.send_absolute_with_flags(x, y, buttons, flags),
        };
        res.with_context(|| format!("frame {} of {}", i + 1, opts.repeat))?;

        if i + 1 < opts.repeat
            && let Some(sleep) = pacing.sleep_for(FRAME_LEN, 10, opts.ser.baud)
        {
            std::thread::sleep(sleep);
        }
    }

    eprintln!(
        "[send] sent={} dropped={} discarded={} next_seq={}",
        link.frames_sent(),
        link.frames_dropped(),
        link.frames_discarded(),
        link.next_seq()
    );
    Ok(())
}

/// Encode without a transport; values are saturated exactly as a send would.
pub fn print(opts: FrameOpts) -> Result<()> {
    let bytes = encode(&opts.motion, opts.seq);
    println!("{}", hex(&bytes));
    eprintln!(
        "[frame] len={} seq={} crc=0x{:04X}",
        bytes.len(),
        opts.seq,
        u16::from_le_bytes([bytes[16], bytes[17]])
    );
    Ok(())
}

fn encode(motion: &Motion, seq: u16) -> [u8; FRAME_LEN] {
    let frame = match *motion {
        Motion::Rel {
            dx,
            dy,
            bx,
            by,
            buttons,
        } => Frame {
            version: PROTO_VERSION,
            flags: 0,
            dx: sat_i16(dx),
            dy: sat_i16(dy),
            bx: sat_i16(bx),
            by: sat_i16(by),
            buttons: mask_buttons(buttons),
            seq,
        },
        Motion::Abs {
            x,
            y,
            buttons,
            flags,
        } => Frame {
            version: PROTO_VERSION,
            flags,
            dx: sat_coord(x),
            dy: sat_coord(y),
            bx: 0,
            by: 0,
            buttons: mask_buttons(buttons),
            seq,
        },
    };
    frame.encode()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abs_encoding_matches_reference() {
        let motion = Motion::Abs {
            x: 960,
            y: 540,
            buttons: 0b011,
            flags: 0x09,
        };
        assert_eq!(
            hex(&encode(&motion, 0)),
            "AA550109C0031C0200000000030000007ABD"
        );
    }

    #[test]
    fn print_agrees_with_link() {
        let motion = Motion::Rel {
            dx: 100_000,
            dy: -100_000,
            bx: 5,
            by: -5,
            buttons: 0x1_FFFF,
        };
        let mut link = Link::with_transport(Vec::new(), "test");
        link.send_relative(100_000, -100_000, 5, -5, 0x1_FFFF).unwrap();
        link.send_relative(100_000, -100_000, 5, -5, 0x1_FFFF).unwrap();
        let sent = link.transport().unwrap();
        assert_eq!(&sent[..FRAME_LEN], &encode(&motion, 0));
        assert_eq!(&sent[FRAME_LEN..], &encode(&motion, 1));
    }
}
