use std::time::Instant;

#[derive(Debug, Clone)]
pub struct Stats {
    pub ok: u64,
    pub bad: u64,
    pub lost: u64,
    pub bytes: u64,
    pub bpb: u32,
    expect: Option<u16>,
    t0: Instant,
    last: Instant,
}

impl Stats {
    pub fn new(bpb: u32) -> Self {
        Self {
            ok: 0,
            bad: 0,
            lost: 0,
            bytes: 0,
            bpb,
            expect: None,
            t0: Instant::now(),
            last: Instant::now(),
        }
    }
    pub fn add_bytes(&mut self, n: usize) {
        self.bytes += n as u64;
    }
    pub fn inc_ok(&mut self) {
        self.ok += 1;
    }
    pub fn inc_bad(&mut self) {
        self.bad += 1;
    }

    /// Track a received sequence number and return how many frames went
    /// missing just before it. A step backwards (duplicate or reorder)
    /// counts as one.
    pub fn observe_seq(&mut self, seq: u16) -> u64 {
        let gap = match self.expect {
            None => 0,
            Some(e) => {
                let d = seq.wrapping_sub(e);
                if d == 0 {
                    0
                } else if d < 0x8000 {
                    d as u64
                } else {
                    1
                }
            }
        };
        self.lost += gap;
        self.expect = Some(seq.wrapping_add(1));
        gap
    }

    pub fn maybe_print(&mut self, stats_int: f64) {
        if self.last.elapsed().as_secs_f64() >= stats_int {
            let dur = self.t0.elapsed().as_secs_f64().max(1e-3);
            let bps_bytes = (self.bytes as f64) / dur;
            let bps_bits = bps_bytes * (self.bpb as f64);
            eprintln!(
                "[rx] ok={} bad={} lost={} bytes={} over {:.1}s => {:.1}kB/s (~{:.0} bps, bpb={})",
                self.ok,
                self.bad,
                self.lost,
                self.bytes,
                dur,
                bps_bytes / 1000.0,
                bps_bits,
                self.bpb
            );
            self.last = Instant::now();
            self.t0 = Instant::now();
            self.bytes = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_seq_is_never_a_gap() {
        let mut s = Stats::new(10);
        assert_eq!(s.observe_seq(500), 0);
        assert_eq!(s.observe_seq(501), 0);
        assert_eq!(s.lost, 0);
    }

    #[test]
    fn gaps_across_wraparound() {
        let mut s = Stats::new(10);
        s.observe_seq(65_534);
        assert_eq!(s.observe_seq(65_535), 0);
        assert_eq!(s.observe_seq(0), 0);
        assert_eq!(s.observe_seq(3), 2);
        assert_eq!(s.lost, 2);
    }

    #[test]
    fn duplicate_counts_once() {
        let mut s = Stats::new(10);
        s.observe_seq(10);
        assert_eq!(s.observe_seq(10), 1);
        assert_eq!(s.observe_seq(11), 0);
        assert_eq!(s.lost, 1);
    }
}
