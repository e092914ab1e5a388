//! Sample queue between the capture callback and the drain side.
//!
//! Appends happen on the audio thread; drains happen from whichever thread
//! stops the recording or runs the continuous monitor. A plain mutex around a
//! `Vec` keeps both linearizable, and neither operation holds the lock for
//! longer than a memmove.

use std::sync::Mutex;

/// Thread-safe append/drain queue of mono f32 samples at the hardware rate.
#[derive(Debug, Default)]
pub struct RingBuffer {
    samples: Mutex<Vec<f32>>,
}

impl RingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append samples atomically.
    pub fn append(&self, data: &[f32]) {
        let mut samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        samples.extend_from_slice(data);
    }

    /// Return and clear the contents atomically. The allocation's capacity is
    /// retained for the next recording burst.
    pub fn drain(&self) -> Vec<f32> {
        let mut samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        let capacity = samples.capacity();
        let out = std::mem::replace(&mut *samples, Vec::with_capacity(capacity));
        out
    }

    /// Number of buffered samples.
    pub fn count(&self) -> usize {
        let samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        samples.len()
    }

    /// Buffered duration in seconds, assuming 16 kHz.
    ///
    /// The buffer actually holds hardware-rate samples, so this over-reports
    /// for 44.1/48 kHz devices. Diagnostic only: nothing that needs real
    /// timing uses it — those paths work from `count()` against the hardware
    /// rate.
    pub fn duration_seconds(&self) -> f64 {
        self.count() as f64 / crate::defaults::SAMPLE_RATE as f64
    }
}
