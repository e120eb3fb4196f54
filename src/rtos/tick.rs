//! 100Hz system tick, calibrated busy-waits and the slow-poll countdown

use crate::config::{TICK_CEILING, TICK_US};
use portable_atomic::{AtomicU16, AtomicU32, AtomicU8, Ordering};

/// System time tracking shared between the tick interrupt and the main loop.
///
/// The interrupt is the only writer that increments or decrements; the main
/// loop only ever stores fresh values (zero before a wait, the reload value
/// for the slow-poll countdown). Interrupt handlers do not nest, so the
/// load/store pairs inside [`TickService::on_tick`] cannot be torn by the
/// main loop.
pub struct TickService {
    ticks: AtomicU8,
    slow_poll: AtomicU8,
    elapsed: AtomicU32,
    overflow_us: AtomicU16,
}

impl TickService {
    /// Create new tick service. The slow-poll countdown starts expired so the
    /// first scheduler pass polls the hardware immediately.
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU8::new(0),
            slow_poll: AtomicU8::new(0),
            elapsed: AtomicU32::new(0),
            overflow_us: AtomicU16::new(0),
        }
    }

    /// Tick interrupt body.
    #[inline]
    pub fn on_tick(&self) {
        let ticks = self.ticks.load(Ordering::Relaxed);
        if ticks < TICK_CEILING {
            self.ticks.store(ticks + 1, Ordering::Relaxed);
        }

        let countdown = self.slow_poll.load(Ordering::Relaxed);
        if countdown > 0 {
            self.slow_poll.store(countdown - 1, Ordering::Relaxed);
        }

        let elapsed = self.elapsed.load(Ordering::Relaxed);
        self.elapsed.store(elapsed.wrapping_add(1), Ordering::Relaxed);
    }

    /// Delay-unit overflow interrupt body. Accumulates `period_us` and emits
    /// a tick every [`TICK_US`] microseconds, carrying the remainder so the
    /// tick does not drift. Returns `true` when a tick was emitted.
    #[inline]
    pub fn on_overflow(&self, period_us: u16) -> bool {
        let acc = self.overflow_us.load(Ordering::Relaxed) as u32 + period_us as u32;
        if acc >= TICK_US {
            self.overflow_us.store((acc - TICK_US) as u16, Ordering::Relaxed);
            self.on_tick();
            true
        } else {
            self.overflow_us.store(acc as u16, Ordering::Relaxed);
            false
        }
    }

    /// Current tick counter (saturates at [`TICK_CEILING`])
    #[inline]
    pub fn ticks(&self) -> u8 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Busy-wait for `duration` ticks.
    ///
    /// Do NOT call this from an interrupt handler: the counter only moves
    /// while the tick interrupt can run.
    pub fn wait(&self, duration: u8) {
        self.wait_with(duration, core::hint::spin_loop);
    }

    /// Busy-wait for `duration` ticks, calling `idle` on every poll.
    pub fn wait_with<F: FnMut()>(&self, duration: u8, mut idle: F) {
        self.ticks.store(0, Ordering::Relaxed);
        while self.ticks.load(Ordering::Relaxed) < duration {
            idle();
        }
    }

    /// True once the slow-poll countdown has run out
    #[inline]
    pub fn slow_poll_due(&self) -> bool {
        self.slow_poll.load(Ordering::Relaxed) == 0
    }

    /// Remaining ticks before the next slow-poll
    #[inline]
    pub fn slow_poll_remaining(&self) -> u8 {
        self.slow_poll.load(Ordering::Relaxed)
    }

    /// Reload the slow-poll countdown. Only the scheduler calls this.
    #[inline]
    pub fn reload_slow_poll(&self, period: u8) {
        self.slow_poll.store(period, Ordering::Relaxed);
    }

    /// Free-running tick count since boot or the last [`Self::restart_elapsed`]
    #[inline]
    pub fn elapsed(&self) -> u32 {
        self.elapsed.load(Ordering::Relaxed)
    }

    /// Zero the elapsed counter, e.g. at the start of a recording
    pub fn restart_elapsed(&self) {
        self.elapsed.store(0, Ordering::Relaxed);
    }
}

impl Default for TickService {
    fn default() -> Self {
        Self::new()
    }
}
