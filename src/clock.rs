use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use tracing::info;

/// Brackets one batch. Start it immediately before the driver runs and stop it
/// once the join barrier has returned.
#[derive(Debug)]
pub struct ExperimentClock {
    batch_size: usize,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl ExperimentClock {
    pub fn start(batch_size: usize) -> Self {
        let started_at = Utc::now();
        info!(started_at = %started_at, batch_size, "starting experiment");
        Self {
            batch_size,
            started_at,
            started: Instant::now(),
        }
    }

    /// `outstanding` is the counter value read after every unit has terminated.
    pub fn stop(self, outstanding: i64) -> ExperimentRecord {
        let elapsed = self.started.elapsed();
        ExperimentRecord {
            started_at: self.started_at,
            stopped_at: Utc::now(),
            elapsed,
            batch_size: self.batch_size,
            outstanding,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentRecord {
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    /// Monotonic, unaffected by wall-clock adjustments.
    pub elapsed: Duration,
    pub batch_size: usize,
    pub outstanding: i64,
}

impl ExperimentRecord {
    pub fn confirmed(&self) -> i64 {
        self.batch_size as i64 - self.outstanding
    }

    pub fn log(&self) {
        info!(
            stopped_at = %self.stopped_at,
            confirmed = self.confirmed(),
            batch_size = self.batch_size,
            elapsed = ?self.elapsed,
            "stopping experiment: successfully read {} requests in {:?}",
            self.confirmed(),
            self.elapsed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmed_is_batch_minus_outstanding() {
        let clock = ExperimentClock::start(100);
        let record = clock.stop(7);
        assert_eq!(record.batch_size, 100);
        assert_eq!(record.confirmed(), 93);
        assert!(record.stopped_at >= record.started_at);
    }

    #[test]
    fn test_empty_batch() {
        let record = ExperimentClock::start(0).stop(0);
        assert_eq!(record.confirmed(), 0);
    }

    #[test]
    fn test_elapsed_covers_the_bracketed_work() {
        let clock = ExperimentClock::start(1);
        std::thread::sleep(Duration::from_millis(20));
        let record = clock.stop(0);
        assert!(record.elapsed >= Duration::from_millis(20));
    }
}
