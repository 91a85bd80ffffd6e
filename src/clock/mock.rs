use crate::Clock;
use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

/// A clock the tests advance by hand.
#[derive(Clone)]
pub struct MockClock {
    now: Arc<Mutex<Instant>>,
}

impl MockClock {
    pub fn new(start: Instant) -> Self {
        MockClock {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Move time forward by `d`.
    pub fn advance(&self, d: Duration) {
        *self.now.lock().unwrap() += d;
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }
}
