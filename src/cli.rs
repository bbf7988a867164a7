use anyhow::anyhow;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::port::{NoDetect, PortResolver, PortSpec, UsbIdResolver};

#[derive(Parser, Debug, Clone)]
#[command(name = "hidlink", about = "Serial HID actuator link: frame sender, tracker loop, monitor")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// Send motion frames to the actuator
    Send(SendOpts),
    /// Print the encoded frame as hex (no port needed)
    Frame(FrameOpts),
    /// Run the control loop on target coordinates read from stdin
    Track(TrackOpts),
    /// Receive and verify frames (loopback / bench check)
    Rx(RxOpts),
    /// List serial devices visible to the port resolver
    Ports,
}

#[derive(Args, Debug, Clone)]
pub struct SerialOpts {
    /// Serial device path, or "auto"
    #[arg(long, default_value = "auto")]
    pub dev: String,
    /// Baud rate
    #[arg(long, default_value_t = 115_200)]
    pub baud: u32,
    #[command(flatten)]
    pub usb: UsbMatch,
}

/// USB ids used to pick a device when the port is "auto"
#[derive(Args, Debug, Clone, Default)]
pub struct UsbMatch {
    /// USB vendor id (e.g. 0x2341)
    #[arg(long, value_parser = parse_int::<u16>)]
    pub vid: Option<u16>,
    /// USB product id; any product when omitted
    #[arg(long, value_parser = parse_int::<u16>)]
    pub pid: Option<u16>,
}

impl UsbMatch {
    pub fn resolver(&self) -> Box<dyn PortResolver> {
        match self.vid {
            Some(vid) => Box::new(UsbIdResolver { vid, pid: self.pid }),
            None => Box::new(NoDetect),
        }
    }
}

impl SerialOpts {
    pub fn spec(&self) -> anyhow::Result<PortSpec> {
        self.dev
            .parse()
            .map_err(|e| anyhow!("--dev {:?}: {}", self.dev, e))
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Motion {
    /// Relative move in HID units
    Rel {
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        dx: i64,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        dy: i64,
        /// Bias channel x
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        bx: i64,
        /// Bias channel y
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        by: i64,
        /// Button bitmask (decimal, 0x.. or 0b..)
        #[arg(long, default_value = "0", value_parser = parse_int::<u32>)]
        buttons: u32,
    },
    /// Absolute move
    Abs {
        #[arg(long, allow_negative_numbers = true)]
        x: i64,
        #[arg(long, allow_negative_numbers = true)]
        y: i64,
        #[arg(long, default_value = "0", value_parser = parse_int::<u32>)]
        buttons: u32,
        /// Flag byte; bit 3 = pixel coordinates, bit 0 = enable
        #[arg(long, default_value = "0x08", value_parser = parse_int::<u8>)]
        flags: u8,
    },
}

#[derive(Args, Debug, Clone)]
pub struct SendOpts {
    #[command(flatten)]
    pub ser: SerialOpts,
    /// Informational mode label
    #[arg(long, default_value = "PreSolve")]
    pub mode: String,
    /// Number of frames to send
    #[arg(long, default_value_t = 1)]
    pub repeat: u64,
    /// "max" or milliseconds gap (e.g. 0, 5, 10) or "auto"
    #[arg(long, default_value = "max")]
    pub gap: String,
    /// Utilization (0.0..1.0) when gap="auto" (1.0 = line-rate)
    #[arg(long, default_value_t = 1.0)]
    pub util: f64,
    /// Print each sent frame
    #[arg(long, default_value_t = false)]
    pub debug: bool,
    #[command(subcommand)]
    pub motion: Motion,
}

#[derive(Args, Debug, Clone)]
pub struct FrameOpts {
    /// Sequence number to encode
    #[arg(long, default_value_t = 0)]
    pub seq: u16,
    #[command(subcommand)]
    pub motion: Motion,
}

#[derive(Args, Debug, Clone)]
pub struct TrackOpts {
    /// Settings JSON
    #[arg(long, default_value = "configs/settings.json")]
    pub config: PathBuf,
    /// Override SERIAL.port
    #[arg(long)]
    pub dev: Option<String>,
    /// Override SERIAL.baud
    #[arg(long)]
    pub baud: Option<u32>,
    #[command(flatten)]
    pub usb: UsbMatch,
    /// Override LOOP_PAUSE_MS: "max", milliseconds, or "auto"
    #[arg(long)]
    pub gap: Option<String>,
    /// Utilization when gap="auto"
    #[arg(long, default_value_t = 1.0)]
    pub util: f64,
    /// Constant bias x on every frame
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub bias_x: i64,
    /// Constant bias y on every frame
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub bias_y: i64,
    /// Button bitmask held on every frame
    #[arg(long, default_value = "0", value_parser = parse_int::<u32>)]
    pub buttons: u32,
    /// Print every step
    #[arg(long, default_value_t = false)]
    pub debug: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RxOpts {
    #[command(flatten)]
    pub ser: SerialOpts,
    /// Bits per byte for implied baud (~bps): 10 for 8N1, 11 if parity/2 stop bits
    #[arg(long, default_value_t = 10)]
    pub bpb: u32,
    /// Print each frame and each BAD/LOST event
    #[arg(long, default_value_t = false)]
    pub debug: bool,
    /// Stats print interval in seconds
    #[arg(long, default_value_t = 1.0)]
    pub stats: f64,
}

/// Accepts decimal, `0x` hex or `0b` binary.
pub fn parse_int<T: TryFrom<u64>>(s: &str) -> Result<T, String> {
    let s = s.trim();
    let v = (if let Some(h) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(h, 16)
    } else if let Some(b) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        u64::from_str_radix(b, 2)
    } else {
        s.parse::<u64>()
    })
    .map_err(|e| format!("{:?}: {}", s, e))?;
    T::try_from(v).map_err(|_| format!("{:?} out of range", s))
}

/// Typed pacing model to replace ad-hoc gap handling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pacing {
    Max,
    Fixed(Duration),
    Auto { util: f64 },
}

impl Pacing {
    pub fn from_cli(gap: &str, util: f64) -> anyhow::Result<Self> {
        if gap.eq_ignore_ascii_case("max") {
            Ok(Pacing::Max)
        } else if gap.eq_ignore_ascii_case("auto") {
            Ok(Pacing::Auto { util })
        } else {
            let ms: u64 = gap
                .parse()
                .map_err(|_| anyhow!("gap must be integer ms, 'auto', or 'max'"))?;
            Ok(Pacing::Fixed(Duration::from_millis(ms)))
        }
    }
    /// Compute sleep time to achieve desired pacing given a write of `bytes`.
    pub fn sleep_for(self, bytes: usize, bpb: u32, baud: u32) -> Option<Duration> {
        match self {
            Pacing::Max => None,
            Pacing::Fixed(d) => Some(d),
            Pacing::Auto { util } => {
                let util = util.max(1e-3); // avoid div by 0
                let bit_time_s = (bytes as f64) * (bpb as f64) / (baud as f64);
                let target_s = bit_time_s / util;
                Some(Duration::from_micros((target_s * 1_000_000.0) as u64))
            }
        }
    }
}
