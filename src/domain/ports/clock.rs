//! Clock abstraction so timing-sensitive logic (pause timeout, stall sweep,
//! schedule firing) can be driven from tests without sleeping real time.

use chrono::{DateTime, Utc};

/// A source of wall-clock time. `SystemClock` is the only production
/// implementation; tests substitute a fixed or steppable clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Real wall-clock time via `Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_advances() {
        let clock = SystemClock;
        let t1 = clock.now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let t2 = clock.now();
        assert!(t2 >= t1);
    }
}
