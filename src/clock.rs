// Time sources for task timestamps

use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::cell::Cell;

/// Supplies the current time to the task store
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time truncated to milliseconds, the precision of the exported documents
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(3)
    }
}

/// Deterministic clock that advances by a fixed step on every reading
#[derive(Debug)]
pub struct StepClock {
    next: Cell<DateTime<Utc>>,
    step: Duration,
}

impl StepClock {
    pub fn new(start: DateTime<Utc>, step: Duration) -> Self {
        Self {
            next: Cell::new(start),
            step,
        }
    }
}

impl Clock for StepClock {
    fn now(&self) -> DateTime<Utc> {
        let now = self.next.get();
        self.next.set(now + self.step);
        now
    }
}
