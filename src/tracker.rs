use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};

use crate::cli::Pacing;
use crate::config::Settings;
use crate::frame::FRAME_LEN;
use crate::link::Link;
use crate::pid::Pid;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    /// Target centre in frame pixels
    Target { x: f64, y: f64 },
    NoTarget,
}

/// Upstream stage handing over one sample per loop iteration.
/// `Ok(None)` ends the loop.
pub trait TargetSource {
    fn next_sample(&mut self) -> io::Result<Option<Sample>>;
}

/// Reads `x y` (or `x,y`) per line; `none`, `-` or a blank line mean no target.
/// Unparseable lines are reported and treated as no target.
pub struct LineSource<R> {
    reader: R,
    line: String,
}

impl<R: BufRead> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
        }
    }
}

impl<R: BufRead> TargetSource for LineSource<R> {
    fn next_sample(&mut self) -> io::Result<Option<Sample>> {
        self.line.clear();
        if self.reader.read_line(&mut self.line)? == 0 {
            return Ok(None);
        }
        let sample = parse_sample(&self.line).unwrap_or_else(|| {
            eprintln!("[track] bad sample line=\"{}\"", self.line.trim_end());
            Sample::NoTarget
        });
        Ok(Some(sample))
    }
}

pub fn parse_sample(line: &str) -> Option<Sample> {
    let s = line.trim();
    if s.is_empty() || s == "-" || s.eq_ignore_ascii_case("none") {
        return Some(Sample::NoTarget);
    }
    let mut it = s
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty());
    let x = it.next()?.parse::<f64>().ok()?;
    let y = it.next()?.parse::<f64>().ok()?;
    if it.next().is_some() || !x.is_finite() || !y.is_finite() {
        return None;
    }
    Some(Sample::Target { x, y })
}

pub struct Tracker {
    pid_x: Pid,
    pid_y: Pid,
    deadzone: f64,
    smoothing: f64,
    lock_strength: f64,
    frame_w: f64,
    frame_h: f64,
    height_offset: f64,
}

impl Tracker {
    pub fn new(pid: Pid, deadzone: f64, smoothing: f64, lock_strength: f64) -> Self {
        Self {
            pid_x: pid.clone(),
            pid_y: pid,
            deadzone,
            smoothing,
            lock_strength,
            frame_w: 1920.0,
            frame_h: 1080.0,
            height_offset: 0.0,
        }
    }

    pub fn from_settings(s: &Settings) -> Self {
        let pid = Pid::new(s.pid_kp, s.pid_ki, s.pid_kd, s.dt())
            .with_max_output(s.max_output)
            .with_integral_limit(s.integral_limit);
        Self::new(
            pid,
            s.deadzone_radius,
            s.aim_smoothing,
            s.target_lock_strength,
        )
        .with_frame(s.frame_width, s.frame_height, s.shooting_height_offset)
    }

    pub fn with_frame(mut self, width: u32, height: u32, height_offset: f64) -> Self {
        self.frame_w = width as f64;
        self.frame_h = height as f64;
        self.height_offset = height_offset;
        self
    }

    pub fn axes(&self) -> (&Pid, &Pid) {
        (&self.pid_x, &self.pid_y)
    }

    /// Pixel error from the frame centre to the (offset) target.
    pub fn error_for(&self, x: f64, y: f64) -> (f64, f64) {
        let cx = self.frame_w / 2.0;
        let cy = self.frame_h / 2.0;
        (x - cx, (y + self.height_offset * self.frame_h) - cy)
    }

    pub fn step(&mut self, sample: Sample) -> (i64, i64) {
        match sample {
            Sample::Target { x, y } => {
                let (ex, ey) = self.error_for(x, y);
                self.step_error(ex, ey)
            }
            Sample::NoTarget => (0, 0),
        }
    }

    /// Run both axes on a measured error and return integer deltas,
    /// truncated toward zero.
    pub fn step_error(&mut self, ex: f64, ey: f64) -> (i64, i64) {
        let dx = axis(&mut self.pid_x, ex, self.deadzone);
        let dy = axis(&mut self.pid_y, ey, self.deadzone);
        let gain = (1.0 - self.smoothing) * self.lock_strength;
        ((dx * gain) as i64, (dy * gain) as i64)
    }
}

fn axis(pid: &mut Pid, error: f64, deadzone: f64) -> f64 {
    if error.abs() > deadzone {
        pid.update(error)
    } else {
        pid.reset();
        0.0
    }
}

/// Constant bias and buttons attached to every relative frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameExtras {
    pub bias_x: i64,
    pub bias_y: i64,
    pub buttons: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopReport {
    pub iterations: u64,
    pub targets: u64,
}

/// Drive the link until the source is exhausted, then send a neutral frame.
/// A transport write error ends the loop.
pub fn run_loop<W: Write, S: TargetSource>(
    tracker: &mut Tracker,
    source: &mut S,
    link: &mut Link<W>,
    extras: FrameExtras,
    pacing: Pacing,
    baud: u32,
    debug: bool,
) -> Result<LoopReport> {
    let mut report = LoopReport::default();

    while let Some(sample) = source.next_sample().context("target source")? {
        report.iterations += 1;
        if matches!(sample, Sample::Target { .. }) {
            report.targets += 1;
        }
        let (dx, dy) = tracker.step(sample);
        if debug {
            eprintln!("[track] {:?} -> dx={} dy={}", sample, dx, dy);
        }
        link.send_relative(dx, dy, extras.bias_x, extras.bias_y, extras.buttons)
            .with_context(|| format!("send seq={}", link.next_seq().wrapping_sub(1)))?;

        if let Some(sleep) = pacing.sleep_for(FRAME_LEN, 10, baud) {
            std::thread::sleep(sleep);
        }
    }

    link.send_neutral().context("send neutral frame")?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, FrameDecoder};
    use std::collections::VecDeque;
    use std::io::Cursor;

    const DT: f64 = 1.0 / 60.0;

    struct Scripted(VecDeque<Sample>);

    impl TargetSource for Scripted {
        fn next_sample(&mut self) -> io::Result<Option<Sample>> {
            Ok(self.0.pop_front())
        }
    }

    fn p_only(deadzone: f64) -> Tracker {
        Tracker::new(Pid::new(1.0, 0.0, 0.0, DT), deadzone, 0.0, 1.0)
    }

    fn decode_all(bytes: &[u8]) -> Vec<Frame> {
        let mut d = FrameDecoder::new();
        bytes
            .iter()
            .filter_map(|b| d.push(*b))
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn parse_lines() {
        assert_eq!(
            parse_sample("960 540\n"),
            Some(Sample::Target { x: 960.0, y: 540.0 })
        );
        assert_eq!(
            parse_sample("10.5,-3"),
            Some(Sample::Target { x: 10.5, y: -3.0 })
        );
        assert_eq!(parse_sample("none"), Some(Sample::NoTarget));
        assert_eq!(parse_sample("  \n"), Some(Sample::NoTarget));
        assert_eq!(parse_sample("1 2 3"), None);
        assert_eq!(parse_sample("x y"), None);
        assert_eq!(parse_sample("NaN 1"), None);
    }

    #[test]
    fn error_is_relative_to_centre_with_offset() {
        let t = p_only(0.0).with_frame(1920, 1080, 0.1);
        let (ex, ey) = t.error_for(1000.0, 500.0);
        assert_eq!(ex, 40.0);
        assert!((ey - 68.0).abs() < 1e-9);
    }

    #[test]
    fn deadzone_reset_makes_next_step_fresh() {
        let mut t = Tracker::new(Pid::new(1.0, 0.5, 0.01, DT), 5.0, 0.0, 1.0);
        let first = t.step_error(20.0, 0.0).0;
        let second = t.step_error(20.0, 0.0).0;
        assert_ne!(first, 0);
        assert_ne!(second, 0);
        assert_eq!(t.step_error(2.0, 0.0).0, 0);
        assert_eq!(t.axes().0.integral(), 0.0);

        let resumed = t.step_error(20.0, 0.0).0;
        let mut fresh = Tracker::new(Pid::new(1.0, 0.5, 0.01, DT), 5.0, 0.0, 1.0);
        assert_eq!(resumed, fresh.step_error(20.0, 0.0).0);
    }

    #[test]
    fn proportional_deadzone_sequence() {
        let mut t = p_only(5.0);
        assert_eq!(t.step_error(20.0, 20.0), (20, 20));
        assert_eq!(t.step_error(20.0, 20.0), (20, 20));
        assert_eq!(t.step_error(2.0, 2.0), (0, 0));
        assert_eq!(t.step_error(20.0, 20.0), (20, 20));
    }

    #[test]
    fn axes_are_independent() {
        let mut t = p_only(5.0);
        assert_eq!(t.step_error(30.0, 1.0), (30, 0));
        assert_eq!(t.axes().1.prev_error(), 0.0);
        assert_eq!(t.axes().0.prev_error(), 30.0);
    }

    #[test]
    fn smoothing_and_lock_strength_scale_and_truncate() {
        let mut t = Tracker::new(Pid::new(1.0, 0.0, 0.0, DT), 0.0, 0.25, 0.5);
        // 15 * 0.75 * 0.5 = 5.625 -> 5 ; -15 -> -5
        assert_eq!(t.step_error(15.0, -15.0), (5, -5));
    }

    #[test]
    fn no_target_sends_zero_without_touching_state() {
        let mut t = p_only(0.0);
        t.step_error(10.0, 10.0);
        assert_eq!(t.step(Sample::NoTarget), (0, 0));
        assert_eq!(t.axes().0.prev_error(), 10.0);
    }

    #[test]
    fn loop_sends_one_frame_per_sample_then_neutral() {
        let mut t = p_only(0.0).with_frame(100, 100, 0.0);
        let mut src = Scripted(VecDeque::from(vec![
            Sample::Target { x: 60.0, y: 40.0 },
            Sample::NoTarget,
            Sample::Target { x: 50.0, y: 55.0 },
        ]));
        let mut link = Link::with_transport(Vec::new(), "test");
        let extras = FrameExtras {
            bias_x: 2,
            bias_y: -1,
            buttons: 0,
        };
        let report = run_loop(
            &mut t,
            &mut src,
            &mut link,
            extras,
            Pacing::Max,
            115_200,
            false,
        )
        .unwrap();
        assert_eq!(
            report,
            LoopReport {
                iterations: 3,
                targets: 2
            }
        );

        let frames = decode_all(link.transport().unwrap());
        let moves: Vec<(i16, i16)> = frames.iter().map(|f| (f.dx, f.dy)).collect();
        assert_eq!(moves, vec![(10, -10), (0, 0), (0, 5), (0, 0)]);
        assert_eq!(frames[0].bx, 2);
        assert_eq!(frames[0].by, -1);
        let last = frames[3];
        assert_eq!((last.bx, last.by, last.buttons), (0, 0, 0));
        let seqs: Vec<u16> = frames.iter().map(|f| f.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3]);
    }

    struct Full;

    impl Write for Full {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::TimedOut, "full"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn loop_survives_full_output_buffer() {
        let mut t = p_only(0.0);
        let mut src = LineSource::new(Cursor::new("960 540
970 540
980 550
"));
        let mut link = Link::with_transport(Full, "test");
        let report = run_loop(
            &mut t,
            &mut src,
            &mut link,
            FrameExtras::default(),
            Pacing::Max,
            115_200,
            false,
        )
        .unwrap();
        assert_eq!(report.iterations, 3);
        assert_eq!(link.frames_dropped(), 4);
        assert_eq!(link.frames_sent(), 0);
    }

    #[test]
    fn loop_runs_against_disabled_link() {
        let mut t = p_only(0.0);
        let mut src = LineSource::new(Cursor::new("960 540\nnone\n1000 600\n"));
        let mut link = Link::<Vec<u8>>::disabled("PreSolve");
        let report = run_loop(
            &mut t,
            &mut src,
            &mut link,
            FrameExtras::default(),
            Pacing::Max,
            115_200,
            false,
        )
        .unwrap();
        assert_eq!(report.iterations, 3);
        assert_eq!(link.frames_discarded(), 4);
    }
}
