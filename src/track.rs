use anyhow::{Context, Result};
use std::io;
use std::time::Duration;

use crate::cli::{Pacing, TrackOpts};
use crate::config::Settings;
use crate::link::Link;
use crate::port::PortSpec;
use crate::tracker::{FrameExtras, LineSource, Tracker, run_loop};

pub fn run(opts: TrackOpts) -> Result<()> {
    let settings = Settings::load(&opts.config)
        .with_context(|| format!("loading {}", opts.config.display()))?;

    let port = opts.dev.as_deref().unwrap_or(&settings.serial.port);
    let baud = opts.baud.unwrap_or(settings.serial.baud);
    let spec: PortSpec = port
        .parse()
        .with_context(|| format!("port {:?}", port))?;
    let pacing = match &opts.gap {
        Some(gap) => Pacing::from_cli(gap, opts.util)?,
        None => Pacing::Fixed(Duration::from_millis(settings.loop_pause_ms)),
    };

    let resolver = opts.usb.resolver();
    let mut link = Link::open(&spec, baud, &settings.serial.mode, resolver.as_ref());
    link.set_debug(opts.debug);
    match link.port_name() {
        Some(dev) => eprintln!("[track] attached dev={} mode={}", dev, link.mode()),
        None => eprintln!("[track] link disabled, commands discarded"),
    }

    eprintln!(
        "[track] profile={} kp={} ki={} kd={} hz={} deadzone={} smoothing={} lock={} frame={}x{}",
        settings.profile.as_deref().unwrap_or("-"),
        settings.pid_kp,
        settings.pid_ki,
        settings.pid_kd,
        settings.sample_hz,
        settings.deadzone_radius,
        settings.aim_smoothing,
        settings.target_lock_strength,
        settings.frame_width,
        settings.frame_height,
    );

    let mut tracker = Tracker::from_settings(&settings);
    let mut source = LineSource::new(io::stdin().lock());
    let extras = FrameExtras {
        bias_x: opts.bias_x,
        bias_y: opts.bias_y,
        buttons: opts.buttons,
    };

    let report = run_loop(
        &mut tracker,
        &mut source,
        &mut link,
        extras,
        pacing,
        baud,
        opts.debug,
    )?;

    eprintln!(
        "[track] stopped iterations={} targets={} sent={} dropped={} discarded={}",
        report.iterations,
        report.targets,
        link.frames_sent(),
        link.frames_dropped(),
        link.frames_discarded()
    );
    Ok(())
}
