//! Alert throttling
//!
//! An alert of a given kind is suppressed while the previous emission of that
//! kind is younger than the cool-down. Only actual emissions move the clock.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::alerts::AlertKind;

#[derive(Debug)]
pub struct AlertThrottle {
    cooldown: Duration,
    last_sent: Mutex<HashMap<AlertKind, DateTime<Utc>>>,
}

impl AlertThrottle {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Check whether an alert of `kind` may be emitted at `now` and, if so,
    /// record the emission in the same critical section.
    pub fn try_acquire(&self, kind: AlertKind, now: DateTime<Utc>) -> bool {
        let mut last_sent = self.last_sent.lock();

        if let Some(previous) = last_sent.get(&kind)
            && now - *previous < self.cooldown
        {
            return false;
        }

        last_sent.insert(kind, now);
        true
    }

    pub fn last_sent(&self, kind: AlertKind) -> Option<DateTime<Utc>> {
        self.last_sent.lock().get(&kind).copied()
    }
}
