//! Injectable wall clock.
//!
//! The job normalizer needs "now" to compute the estimated end time of a
//! print. Production code uses [`SystemClock`]; tests pin the time with
//! [`FixedClock`].

use crate::types::LocalTimestamp;

pub trait Clock: Send + Sync {
    /// Current local wall-clock time.
    fn now(&self) -> LocalTimestamp;
}

/// Reads the host's local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> LocalTimestamp {
        chrono::Local::now().naive_local()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub LocalTimestamp);

impl Clock for FixedClock {
    fn now(&self) -> LocalTimestamp {
        self.0
    }
}
