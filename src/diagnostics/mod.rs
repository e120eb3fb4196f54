//! Fault taxonomy and capture health counters.
//!
//! Nothing here is fatal. Presence faults recover by re-probing, pipeline
//! faults are only counted, and a failed mount is retried every slow-poll.

use crate::capture::AudioPipeline;
use ufmt::{uDisplay, uWrite, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Storage or capture source went missing
    PresenceLost,
    /// Mount attempt failed, retried next slow-poll
    MountFailed,
    /// A completed buffer found the pool full
    Overrun,
    /// A frame edge was raised before the previous one was consumed
    MissedFrame,
}

impl Fault {
    pub const ALL: [Fault; 4] = [
        Fault::PresenceLost,
        Fault::MountFailed,
        Fault::Overrun,
        Fault::MissedFrame,
    ];
}

/// Boundary-visible capture counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub overruns: u32,
    pub missed_frames: u32,
    pub ready: u8,
    pub peak: u8,
}

impl uDisplay for Stats {
    fn fmt<W>(&self, f: &mut Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: uWrite + ?Sized,
    {
        ufmt::uwrite!(
            f,
            "ready={} overruns={} missed={} peak={}",
            self.ready,
            self.overruns,
            self.missed_frames,
            self.peak
        )
    }
}

/// Anything that can report capture counters
pub trait CaptureStats {
    fn stats(&self) -> Stats;
}

impl<const N: usize> CaptureStats for AudioPipeline<N> {
    fn stats(&self) -> Stats {
        Stats {
            overruns: self.overruns(),
            missed_frames: self.pacer().missed_frames(),
            ready: self.ready(),
            peak: self.last_peak(),
        }
    }
}

/// Counter growth since the previous check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delta {
    pub overruns: u32,
    pub missed_frames: u32,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.overruns == 0 && self.missed_frames == 0
    }
}

/// Per-fault totals, plus the capture counters as of the last slow-poll
/// so each loss is reported once
#[derive(Default)]
pub struct Diagnostics {
    last: Stats,
    counts: [u32; Fault::ALL.len()],
}

impl Diagnostics {
    pub const fn new() -> Self {
        Self {
            last: Stats {
                overruns: 0,
                missed_frames: 0,
                ready: 0,
                peak: 0,
            },
            counts: [0; Fault::ALL.len()],
        }
    }

    pub fn record(&mut self, fault: Fault) {
        self.record_n(fault, 1);
    }

    fn record_n(&mut self, fault: Fault, n: u32) {
        let count = &mut self.counts[fault as usize];
        *count = count.wrapping_add(n);
    }

    /// Occurrences of `fault` since boot, across capture sessions
    pub fn count(&self, fault: Fault) -> u32 {
        self.counts[fault as usize]
    }

    /// Compare `now` against the last check and record the growth as
    /// `Overrun` and `MissedFrame` faults. Counters that went backwards
    /// (a new capture session) restart the baseline.
    pub fn update(&mut self, now: Stats) -> Delta {
        let delta = Delta {
            overruns: now.overruns.checked_sub(self.last.overruns).unwrap_or(now.overruns),
            missed_frames: now
                .missed_frames
                .checked_sub(self.last.missed_frames)
                .unwrap_or(now.missed_frames),
        };
        self.last = now;
        self.record_n(Fault::Overrun, delta.overruns);
        self.record_n(Fault::MissedFrame, delta.missed_frames);
        delta
    }

    pub fn last(&self) -> Stats {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::audio::tests::fill;
    use crate::logger::tests::StringSink;

    #[test]
    fn pipeline_reports_its_counters() {
        let pipeline = AudioPipeline::<2>::new();
        for value in [3, 9, 4] {
            fill(&pipeline, value);
        }

        let stats = pipeline.stats();
        assert_eq!(stats.ready, 1);
        assert_eq!(stats.overruns, 2);
        assert_eq!(stats.missed_frames, 2);
        assert_eq!(stats.peak, 4);
    }

    #[test]
    fn deltas_are_reported_once() {
        let mut diag = Diagnostics::new();
        let stats = Stats {
            overruns: 3,
            missed_frames: 1,
            ..Stats::default()
        };
        assert_eq!(diag.update(stats), Delta { overruns: 3, missed_frames: 1 });
        assert!(diag.update(stats).is_empty());

        // counters restarted with a new session
        let restarted = Stats {
            overruns: 1,
            ..Stats::default()
        };
        assert_eq!(diag.update(restarted), Delta { overruns: 1, missed_frames: 0 });
    }

    #[test]
    fn capture_losses_accumulate_across_sessions() {
        let mut diag = Diagnostics::new();
        diag.update(Stats {
            overruns: 3,
            missed_frames: 1,
            ..Stats::default()
        });
        diag.update(Stats {
            overruns: 2,
            ..Stats::default()
        });
        assert_eq!(diag.count(Fault::Overrun), 5);
        assert_eq!(diag.count(Fault::MissedFrame), 1);
        assert_eq!(diag.count(Fault::MountFailed), 0);
    }

    #[test]
    fn stats_render_as_text() {
        let stats = Stats {
            overruns: 2,
            missed_frames: 5,
            ready: 1,
            peak: 200,
        };
        let mut sink = StringSink::default();
        ufmt::uwrite!(sink, "{}", stats).unwrap();
        assert_eq!(sink.0, "ready=1 overruns=2 missed=5 peak=200");
    }

    #[test]
    fn every_fault_has_its_own_counter() {
        let mut diag = Diagnostics::new();
        for (n, fault) in Fault::ALL.into_iter().enumerate() {
            for _ in 0..=n {
                diag.record(fault);
            }
        }
        let counts = Fault::ALL.map(|fault| diag.count(fault));
        assert_eq!(counts, [1, 2, 3, 4]);
    }
}
