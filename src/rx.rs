use anyhow::{Result, bail};
use std::io::{ErrorKind, Read};

use crate::cli::RxOpts;
use crate::frame::FrameDecoder;
use crate::port::{PortSpec, open_port, resolve_port};
use crate::stats::Stats;

pub fn run(opts: RxOpts) -> Result<()> {
    eprintln!("rx: {:?}", opts);
    let spec = opts.ser.spec()?;
    let Some(dev) = resolve_port(&spec, opts.ser.usb.resolver().as_ref()) else {
        bail!("no device found for {:?}", spec);
    };
    if spec == PortSpec::Auto {
        eprintln!("[rx] auto-selected {}", dev);
    }
    let mut port = open_port(&dev, opts.ser.baud)?;

    let mut stats = Stats::new(opts.bpb);
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 256];

    eprintln!("Starting receive loop");

    loop {
        let n = match port.read(&mut buf) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::TimedOut => 0,
            Err(e) => return Err(e.into()),
        };
        stats.add_bytes(n);

        for &b in &buf[..n] {
            match decoder.push(b) {
                Some(Ok(f)) => {
                    stats.inc_ok();
                    let lost = stats.observe_seq(f.seq);
                    if opts.debug {
                        if lost > 0 {
                            eprintln!("[LOST] +{} before seq={}", lost, f.seq);
                        }
                        let mode = if f.is_pixel_mode() { "pix" } else { "hid" };
                        eprintln!("[rx] {} {:?}", mode, f);
                    }
                }
                Some(Err(err)) => {
                    stats.inc_bad();
                    if opts.debug {
                        eprintln!("[BAD ] {}", err);
                    }
                }
                None => {}
            }
        }

        stats.maybe_print(opts.stats);
    }
}
