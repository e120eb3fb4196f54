//! Frame pacing edge shared by live capture and playback

use crate::config::AUDIO_BUFFER_LEN;
use portable_atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};

/// One-bit frame boundary flag.
///
/// Raised once per 512-sample period by either the ADC interrupt (capture)
/// or the playback timer interrupt, never both. Cleared by the main loop
/// after it has emitted a frame.
pub struct FramePacer {
    edge: AtomicBool,
    missed: AtomicU32,
    playback_offset: AtomicU16,
}

impl FramePacer {
    pub const fn new() -> Self {
        Self {
            edge: AtomicBool::new(false),
            missed: AtomicU32::new(0),
            playback_offset: AtomicU16::new(0),
        }
    }

    /// Producer side. Raising an edge the consumer has not cleared yet
    /// counts one missed frame.
    #[inline]
    pub fn raise(&self) {
        if self.edge.load(Ordering::Acquire) {
            let missed = self.missed.load(Ordering::Relaxed);
            self.missed.store(missed.wrapping_add(1), Ordering::Relaxed);
        }
        self.edge.store(true, Ordering::Release);
    }

    /// Playback timer interrupt body, called at the sample rate. Raises the
    /// edge every [`AUDIO_BUFFER_LEN`] calls and returns `true` when it did.
    #[inline]
    pub fn on_playback_tick(&self) -> bool {
        let offset = self.playback_offset.load(Ordering::Relaxed);
        if offset as usize == AUDIO_BUFFER_LEN - 1 {
            self.playback_offset.store(0, Ordering::Relaxed);
            self.raise();
            true
        } else {
            self.playback_offset.store(offset + 1, Ordering::Relaxed);
            false
        }
    }

    /// Restart the playback divider at a frame boundary
    pub fn restart_playback(&self) {
        self.playback_offset.store(0, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_raised(&self) -> bool {
        self.edge.load(Ordering::Acquire)
    }

    /// Consumer side
    #[inline]
    pub fn clear(&self) {
        self.edge.store(false, Ordering::Release);
    }

    /// Consume the edge if it is raised
    #[inline]
    pub fn take(&self) -> bool {
        self.edge.swap(false, Ordering::AcqRel)
    }

    /// Frames raised while the previous edge was still pending
    pub fn missed_frames(&self) -> u32 {
        self.missed.load(Ordering::Relaxed)
    }
}

impl Default for FramePacer {
    fn default() -> Self {
        Self::new()
    }
}
