//! Transcription performance bookkeeping.

use crate::stt::transcriber::TranscriptionResult;

/// Tracks how fast transcriptions are running.
#[derive(Debug, Default)]
pub struct PerformanceMonitor {
    last: TranscriptionResult,
    total: u32,
    rtf_sum: f64,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: &TranscriptionResult) {
        self.rtf_sum += result.real_time_factor();
        self.total += 1;
        self.last = result.clone();
    }

    /// Mean real-time factor across all recorded transcriptions.
    pub fn average_rtf(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.rtf_sum / self.total as f64
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn last(&self) -> &TranscriptionResult {
        &self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(audio_ms: f64, wall_ms: f64) -> TranscriptionResult {
        TranscriptionResult {
            audio_duration_ms: audio_ms,
            transcription_time_ms: wall_ms,
            ..Default::default()
        }
    }

    #[test]
    fn empty_monitor_reports_zero() {
        let perf = PerformanceMonitor::new();
        assert_eq!(perf.total(), 0);
        assert_eq!(perf.average_rtf(), 0.0);
    }

    #[test]
    fn average_rtf_over_records() {
        let mut perf = PerformanceMonitor::new();
        perf.record(&result(1000.0, 200.0)); // 0.2
        perf.record(&result(1000.0, 600.0)); // 0.6

        assert_eq!(perf.total(), 2);
        assert!((perf.average_rtf() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn last_keeps_most_recent() {
        let mut perf = PerformanceMonitor::new();
        perf.record(&result(1000.0, 100.0));
        perf.record(&result(2000.0, 100.0));
        assert!((perf.last().audio_duration_ms - 2000.0).abs() < 1e-9);
    }
}
