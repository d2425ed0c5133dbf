//! Time injection (§9 design notes): the core never reads the wall clock
//! directly. Production wires `SystemClock`; tests wire `FixedClock` so
//! DST/Feb-29 fixtures and claim races are deterministic.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock whose reading can be set and advanced from test code.
pub struct FixedClock {
    micros_since_epoch: AtomicI64,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            micros_since_epoch: AtomicI64::new(at.timestamp_micros()),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.micros_since_epoch
            .store(at.timestamp_micros(), Ordering::SeqCst);
    }

    pub fn advance(&self, delta: chrono::Duration) {
        self.micros_since_epoch
            .fetch_add(delta.num_microseconds().unwrap_or(0), Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_micros(self.micros_since_epoch.load(Ordering::SeqCst))
            .expect("stored micros always represent a valid instant")
    }
}
