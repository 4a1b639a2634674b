//! Count and time flush triggers shared by the Batch and Statistical senders

use loadrelay_core::BatchSettings;
use tokio::time::{Duration, Instant};

/// Decides when buffered samples must be flushed.
///
/// Either trigger may be disabled. The first deadline is armed by the first
/// evaluation; every flush re-arms it at flush time + period.
#[derive(Debug, Clone)]
pub struct FlushTrigger {
    count: Option<usize>,
    period: Option<Duration>,
    deadline: Option<Instant>,
}

impl FlushTrigger {
    pub fn new(count: Option<usize>, period: Option<Duration>) -> Self {
        Self {
            count,
            period,
            deadline: None,
        }
    }

    pub fn from_settings(settings: &BatchSettings) -> Self {
        Self::new(settings.count_threshold(), settings.time_threshold())
    }

    pub fn count(&self) -> Option<usize> {
        self.count
    }

    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    /// Evaluates both triggers after an insert.
    ///
    /// `buffered` is the number of samples accepted since the last flush.
    pub fn should_flush(&mut self, buffered: usize, now: Instant) -> bool {
        let mut flush = matches!(self.count, Some(limit) if buffered >= limit);

        if let Some(period) = self.period {
            let deadline = *self.deadline.get_or_insert(now + period);
            if buffered > 0 && now >= deadline {
                flush = true;
            }
        }

        flush
    }

    /// Re-arms the time trigger after a flush.
    pub fn flushed(&mut self, now: Instant) {
        if let Some(period) = self.period {
            self.deadline = Some(now + period);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_trigger() {
        let mut trigger = FlushTrigger::new(Some(3), None);
        let now = Instant::now();
        assert!(!trigger.should_flush(1, now));
        assert!(!trigger.should_flush(2, now));
        assert!(trigger.should_flush(3, now));
    }

    #[test]
    fn test_time_trigger_rearms_after_flush() {
        let mut trigger = FlushTrigger::new(None, Some(Duration::from_millis(100)));
        let start = Instant::now();

        assert!(!trigger.should_flush(1, start));
        assert!(!trigger.should_flush(2, start + Duration::from_millis(99)));
        assert!(trigger.should_flush(3, start + Duration::from_millis(100)));

        let flushed_at = start + Duration::from_millis(150);
        trigger.flushed(flushed_at);
        assert!(!trigger.should_flush(1, flushed_at + Duration::from_millis(50)));
        assert!(trigger.should_flush(2, flushed_at + Duration::from_millis(100)));
    }

    #[test]
    fn test_disabled_triggers_never_fire() {
        let mut trigger = FlushTrigger::new(None, None);
        let now = Instant::now();
        assert!(!trigger.should_flush(1_000_000, now + Duration::from_secs(3600)));
    }
}
