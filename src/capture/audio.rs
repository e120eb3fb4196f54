//! Interrupt-driven audio capture into a fixed pool of sample buffers.
//!
//! The ADC interrupt is the only producer and never waits. When the main
//! loop falls behind, the ready count stops growing at N - 1 and every
//! further completed buffer is counted as an overrun while the producer
//! keeps cycling through the pool.
//!
//! Sample cells are atomics, so a storage write that outlasts a buffer
//! period reads whatever the producer has put there since. That data loss
//! is the overrun and is counted as one.

use super::pacing::FramePacer;
use crate::board::Storage;
use crate::config::AUDIO_BUFFER_LEN;
use portable_atomic::{AtomicU16, AtomicU32, AtomicU8, Ordering};

/// One buffer of samples
pub type SampleBuffer = [AtomicU8; AUDIO_BUFFER_LEN];

#[allow(clippy::declare_interior_mutable_const)]
const SILENT: AtomicU8 = AtomicU8::new(0);
#[allow(clippy::declare_interior_mutable_const)]
const EMPTY: SampleBuffer = [SILENT; AUDIO_BUFFER_LEN];

/// Read access to one completed buffer, handed to [`Storage::drain`]
#[derive(Clone, Copy)]
pub struct SampleView<'a> {
    cells: &'a [AtomicU8],
}

impl<'a> SampleView<'a> {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<u8> {
        self.cells.get(index).map(|cell| cell.load(Ordering::Relaxed))
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + 'a {
        self.cells.iter().map(|cell| cell.load(Ordering::Relaxed))
    }

    /// Copy into `out` (a sector buffer, usually). Returns the bytes copied.
    pub fn copy_to(&self, out: &mut [u8]) -> usize {
        let mut copied = 0;
        for (dst, sample) in out.iter_mut().zip(self.iter()) {
            *dst = sample;
            copied += 1;
        }
        copied
    }
}

pub struct AudioPipeline<const N: usize> {
    buffers: [SampleBuffer; N],
    // producer-owned
    put_index: AtomicU8,
    fill_offset: AtomicU16,
    peak: AtomicU8,
    last_peak: AtomicU8,
    overruns: AtomicU32,
    // incremented by the producer, decremented by the consumer
    ready: AtomicU8,
    pacer: FramePacer,
}

impl<const N: usize> AudioPipeline<N> {
    const POOL_SIZE_OK: () = assert!(N >= 2 && N <= u8::MAX as usize, "pool must hold 2..=255 buffers");

    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::POOL_SIZE_OK;
        Self {
            buffers: [EMPTY; N],
            put_index: AtomicU8::new(0),
            fill_offset: AtomicU16::new(0),
            peak: AtomicU8::new(0),
            last_peak: AtomicU8::new(0),
            overruns: AtomicU32::new(0),
            ready: AtomicU8::new(0),
            pacer: FramePacer::new(),
        }
    }

    /// ADC conversion-complete interrupt body. `raw` is the left-adjusted
    /// conversion word; its top 8 bits are the sample. Returns `true` when
    /// this sample completed a buffer.
    ///
    /// The caller acknowledges the interrupt sources afterwards.
    #[inline]
    pub fn on_conversion(&self, raw: u16) -> bool {
        let sample = (raw >> 8) as u8;
        let put = self.put_index.load(Ordering::Relaxed) as usize;
        let offset = self.fill_offset.load(Ordering::Relaxed) as usize;

        self.buffers[put][offset].store(sample, Ordering::Relaxed);

        let peak = self.peak.load(Ordering::Relaxed).max(sample);

        if offset < AUDIO_BUFFER_LEN - 1 {
            self.peak.store(peak, Ordering::Relaxed);
            self.fill_offset.store(offset as u16 + 1, Ordering::Relaxed);
            return false;
        }

        self.fill_offset.store(0, Ordering::Relaxed);
        self.last_peak.store(peak, Ordering::Relaxed);
        self.peak.store(0, Ordering::Relaxed);

        self.pacer.raise();

        if (self.ready.load(Ordering::Acquire) as usize) < N - 1 {
            self.ready.fetch_add(1, Ordering::AcqRel);
        } else {
            let overruns = self.overruns.load(Ordering::Relaxed);
            self.overruns.store(overruns.wrapping_add(1), Ordering::Relaxed);
        }

        let next = if put == N - 1 { 0 } else { put + 1 };
        self.put_index.store(next as u8, Ordering::Release);
        true
    }

    /// Completed buffers waiting for storage
    #[inline]
    pub fn ready(&self) -> u8 {
        self.ready.load(Ordering::Acquire)
    }

    /// Index of the buffer being filled
    pub fn put_index(&self) -> u8 {
        self.put_index.load(Ordering::Acquire)
    }

    /// Position within the buffer being filled
    pub fn fill_offset(&self) -> u16 {
        self.fill_offset.load(Ordering::Relaxed)
    }

    /// Highest sample of the cycle in progress
    pub fn peak(&self) -> u8 {
        self.peak.load(Ordering::Relaxed)
    }

    /// Highest sample of the last completed cycle
    pub fn last_peak(&self) -> u8 {
        self.last_peak.load(Ordering::Relaxed)
    }

    /// Completions that found the pool already full
    pub fn overruns(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }

    pub fn pacer(&self) -> &FramePacer {
        &self.pacer
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Index of the oldest completed buffer not yet drained
    pub fn oldest_ready(&self) -> Option<usize> {
        critical_section::with(|_| {
            let ready = self.ready.load(Ordering::Acquire) as usize;
            if ready == 0 {
                return None;
            }
            let put = self.put_index.load(Ordering::Acquire) as usize;
            Some((put + N - ready) % N)
        })
    }

    /// Hand the oldest ready buffer to `storage`.
    ///
    /// `WouldBlock` when nothing is ready or storage is busy; the buffer
    /// stays ready in both cases, as it does on a storage error. A write
    /// slower than `N - 1` buffer periods sees the producer's newer samples.
    pub fn drain_one<S: Storage>(&self, storage: &mut S) -> nb::Result<usize, S::Error> {
        let index = self.oldest_ready().ok_or(nb::Error::WouldBlock)?;
        storage.drain(self.buffer(index))?;
        self.ready.fetch_sub(1, Ordering::AcqRel);
        Ok(index)
    }

    /// Drain every buffer that was ready on entry. Returns how many went out
    /// before storage blocked.
    pub fn drain_pending<S: Storage>(&self, storage: &mut S) -> Result<usize, S::Error> {
        let pending = self.ready() as usize;
        let mut drained = 0;
        while drained < pending {
            match self.drain_one(storage) {
                Ok(_) => drained += 1,
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(err)) => return Err(err),
            }
        }
        Ok(drained)
    }

    /// Start a new capture session. Only call while the sample-period unit
    /// is stopped.
    pub fn restart(&self) {
        critical_section::with(|_| {
            self.put_index.store(0, Ordering::Relaxed);
            self.fill_offset.store(0, Ordering::Relaxed);
            self.peak.store(0, Ordering::Relaxed);
            self.last_peak.store(0, Ordering::Relaxed);
            self.overruns.store(0, Ordering::Relaxed);
            self.ready.store(0, Ordering::Release);
            self.pacer.clear();
        });
    }

    fn buffer(&self, index: usize) -> SampleView<'_> {
        SampleView {
            cells: &self.buffers[index],
        }
    }
}

impl<const N: usize> Default for AudioPipeline<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::vec::Vec;

    /// Storage double recording the first sample of every drained buffer
    #[derive(Default)]
    pub struct MockStorage {
        pub mounted: bool,
        pub mount_ok: bool,
        pub busy: bool,
        pub fail: bool,
        pub drained: Vec<u8>,
        pub mount_attempts: u32,
    }

    impl Storage for MockStorage {
        type Error = &'static str;

        fn try_mount(&mut self) -> Result<(), Self::Error> {
            self.mount_attempts += 1;
            if self.mount_ok {
                self.mounted = true;
                Ok(())
            } else {
                Err("no card")
            }
        }

        fn drain(&mut self, samples: SampleView<'_>) -> nb::Result<(), Self::Error> {
            if self.fail {
                return Err(nb::Error::Other("write failed"));
            }
            if self.busy {
                return Err(nb::Error::WouldBlock);
            }
            assert_eq!(samples.len(), AUDIO_BUFFER_LEN);
            self.drained.push(samples.get(0).unwrap());
            Ok(())
        }
    }

    /// Feed one full buffer of `value` (as a raw ADC word)
    pub fn fill<const N: usize>(pipeline: &AudioPipeline<N>, value: u8) -> bool {
        let mut completed = false;
        for _ in 0..AUDIO_BUFFER_LEN {
            completed = pipeline.on_conversion((value as u16) << 8);
        }
        completed
    }

    #[test]
    fn stores_top_byte_of_conversion() {
        let pipeline = AudioPipeline::<4>::new();
        assert!(!pipeline.on_conversion(0xABCD));
        assert_eq!(pipeline.fill_offset(), 1);
        assert_eq!(pipeline.buffer(0).get(0), Some(0xAB));
        assert_eq!(pipeline.peak(), 0xAB);
    }

    #[test]
    fn overruns_start_once_pool_is_full() {
        let pipeline = AudioPipeline::<4>::new();
        for _ in 0..3 {
            assert!(fill(&pipeline, 1));
            assert_eq!(pipeline.overruns(), 0);
        }
        assert_eq!(pipeline.ready(), 3);

        for expected in 1..=3 {
            fill(&pipeline, 1);
            assert_eq!(pipeline.overruns(), expected);
            assert_eq!(pipeline.ready(), 3);
        }

        let mut storage = MockStorage::default();
        assert!(pipeline.drain_one(&mut storage).is_ok());
        fill(&pipeline, 1);
        assert_eq!(pipeline.overruns(), 3);
    }

    #[test]
    fn put_index_cycles_in_order() {
        let pipeline = AudioPipeline::<5>::new();
        let mut seen = Vec::new();
        for _ in 0..12 {
            seen.push(pipeline.put_index());
            fill(&pipeline, 0);
        }
        assert_eq!(seen, [0, 1, 2, 3, 4, 0, 1, 2, 3, 4, 0, 1]);
    }

    #[test]
    fn peak_resets_each_buffer_and_latches() {
        let pipeline = AudioPipeline::<4>::new();
        pipeline.on_conversion(0x1000);
        pipeline.on_conversion(0x9000);
        pipeline.on_conversion(0x2000);
        assert_eq!(pipeline.peak(), 0x90);

        for _ in 3..AUDIO_BUFFER_LEN {
            pipeline.on_conversion(0x0100);
        }
        assert_eq!(pipeline.peak(), 0);
        assert_eq!(pipeline.last_peak(), 0x90);
        assert!(pipeline.pacer().is_raised());
    }

    #[test]
    fn drain_hands_out_oldest_first() {
        let pipeline = AudioPipeline::<4>::new();
        for value in [10, 20, 30] {
            fill(&pipeline, value);
        }

        let mut storage = MockStorage::default();
        assert_eq!(pipeline.drain_pending(&mut storage), Ok(3));
        assert_eq!(storage.drained, [10, 20, 30]);
        assert_eq!(pipeline.ready(), 0);
    }

    #[test]
    fn drain_follows_producer_after_overrun() {
        let pipeline = AudioPipeline::<3>::new();
        for value in [1, 2, 3, 4] {
            fill(&pipeline, value);
        }
        // pool capped at 2 ready, producer has lapped into slot 1
        assert_eq!(pipeline.overruns(), 2);
        assert_eq!(pipeline.put_index(), 1);

        let mut storage = MockStorage::default();
        assert_eq!(pipeline.drain_pending(&mut storage), Ok(2));
        assert_eq!(storage.drained, [3, 4]);
    }

    #[test]
    fn empty_drain_is_a_no_op() {
        let pipeline = AudioPipeline::<4>::new();
        let mut storage = MockStorage::default();

        assert_eq!(pipeline.drain_one(&mut storage), Err(nb::Error::WouldBlock));
        assert_eq!(pipeline.drain_pending(&mut storage), Ok(0));
        assert!(storage.drained.is_empty());
        assert_eq!(pipeline.ready(), 0);
        assert_eq!(pipeline.overruns(), 0);
        assert_eq!(pipeline.pacer().missed_frames(), 0);
    }

    #[test]
    fn busy_or_failing_storage_keeps_buffer_ready() {
        let pipeline = AudioPipeline::<4>::new();
        fill(&pipeline, 7);

        let mut storage = MockStorage {
            busy: true,
            ..Default::default()
        };
        assert_eq!(pipeline.drain_one(&mut storage), Err(nb::Error::WouldBlock));
        assert_eq!(pipeline.ready(), 1);

        storage.busy = false;
        storage.fail = true;
        assert_eq!(pipeline.drain_pending(&mut storage), Err("write failed"));
        assert_eq!(pipeline.ready(), 1);

        storage.fail = false;
        assert_eq!(pipeline.drain_one(&mut storage), Ok(0));
        assert_eq!(storage.drained, [7]);
    }

    #[test]
    fn restart_clears_session_counters() {
        let pipeline = AudioPipeline::<2>::new();
        for _ in 0..3 {
            fill(&pipeline, 5);
        }
        pipeline.on_conversion(0);
        assert_eq!(pipeline.overruns(), 2);

        pipeline.restart();
        assert_eq!(pipeline.overruns(), 0);
        assert_eq!(pipeline.ready(), 0);
        assert_eq!(pipeline.put_index(), 0);
        assert_eq!(pipeline.fill_offset(), 0);
        assert!(!pipeline.pacer().is_raised());
    }

    /// Storage so slow the producer laps the pool mid-write
    struct StallingStorage<'a> {
        pipeline: &'a AudioPipeline<3>,
        reads: Option<(u8, u8)>,
    }

    impl Storage for StallingStorage<'_> {
        type Error = ();

        fn try_mount(&mut self) -> Result<(), ()> {
            Ok(())
        }

        fn drain(&mut self, samples: SampleView<'_>) -> nb::Result<(), ()> {
            let before = samples.get(0).unwrap();
            for _ in 0..2 * AUDIO_BUFFER_LEN {
                self.pipeline.on_conversion(0xEE00);
            }
            let after = samples.get(0).unwrap();
            self.reads = Some((before, after));
            Ok(())
        }
    }

    #[test]
    fn slow_storage_reads_overwritten_samples() {
        let pipeline = AudioPipeline::<3>::new();
        fill(&pipeline, 1);
        fill(&pipeline, 2);

        let mut storage = StallingStorage {
            pipeline: &pipeline,
            reads: None,
        };
        assert_eq!(pipeline.drain_one(&mut storage), Ok(0));

        // slot 0 was refilled while storage held it; both laps were overruns
        assert_eq!(storage.reads, Some((1, 0xEE)));
        assert_eq!(pipeline.overruns(), 2);
        assert_eq!(pipeline.ready(), 1);
    }

    #[test]
    fn view_copies_into_a_sector() {
        let pipeline = AudioPipeline::<2>::new();
        fill(&pipeline, 0x42);

        let mut sector = [0u8; AUDIO_BUFFER_LEN];
        assert_eq!(pipeline.buffer(0).copy_to(&mut sector), AUDIO_BUFFER_LEN);
        assert!(sector.iter().all(|&s| s == 0x42));

        let mut short = [0u8; 4];
        assert_eq!(pipeline.buffer(0).copy_to(&mut short), 4);
    }
}
