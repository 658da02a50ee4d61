//! Frame deduplication by presentation time.

/// Presentation time that no real frame carries.
pub const NEVER_SEEN: f64 = -1.0;

/// Remembers the presentation time of the last frame sent to inference.
///
/// The video source advances slower than the display refreshes, so most
/// ticks see the same frame again. Those ticks must not reach the model.
#[derive(Debug, Clone)]
pub struct FrameDeduplicator {
    last_processed: f64,
}

impl Default for FrameDeduplicator {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDeduplicator {
    pub fn new() -> Self {
        Self {
            last_processed: NEVER_SEEN,
        }
    }

    /// Returns true, and records the time, iff the frame has advanced.
    pub fn should_process(&mut self, presentation_time: f64) -> bool {
        if presentation_time == self.last_processed {
            return false;
        }
        self.last_processed = presentation_time;
        true
    }

    /// Forget the last frame, e.g. when a new stream starts.
    pub fn reset(&mut self) {
        self.last_processed = NEVER_SEEN;
    }

    pub fn last_processed(&self) -> Option<f64> {
        (self.last_processed != NEVER_SEEN).then_some(self.last_processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_time_is_skipped() {
        let mut dedup = FrameDeduplicator::new();
        assert!(dedup.should_process(0.5));
        assert!(!dedup.should_process(0.5));
        assert!(!dedup.should_process(0.5));
    }

    #[test]
    fn test_advancing_time_is_processed() {
        let mut dedup = FrameDeduplicator::new();
        for t in [0.0, 0.033, 0.066, 0.1] {
            assert!(dedup.should_process(t), "t={t}");
        }
        assert_eq!(dedup.last_processed(), Some(0.1));
    }

    #[test]
    fn test_first_frame_at_zero() {
        let mut dedup = FrameDeduplicator::new();
        assert_eq!(dedup.last_processed(), None);
        assert!(dedup.should_process(0.0));
        assert!(!dedup.should_process(0.0));
    }

    #[test]
    fn test_reset_restores_sentinel() {
        let mut dedup = FrameDeduplicator::new();
        assert!(dedup.should_process(2.0));
        dedup.reset();
        assert_eq!(dedup.last_processed(), None);
        assert!(dedup.should_process(2.0));
    }

    #[test]
    fn test_source_restart_goes_backwards() {
        // A restarted stream reports a smaller time; that is still a new frame.
        let mut dedup = FrameDeduplicator::new();
        assert!(dedup.should_process(10.0));
        assert!(dedup.should_process(0.0));
    }
}
