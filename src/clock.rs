//! Monotonic clock for gesture and persistence timing.
//!
//! The clock is set by the host once per event-loop dispatch, so every check
//! within one dispatch sees the same timestamp. Tests drive it by hand.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct Clock {
    time: Rc<Cell<Duration>>,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.time.get()
    }

    pub fn set(&self, time: Duration) {
        self.time.set(time);
    }

    pub fn advance(&self, by: Duration) {
        self.time.set(self.time.get().saturating_add(by));
    }
}

impl PartialEq for Clock {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.time, &other.time)
    }
}

impl Eq for Clock {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_time() {
        let clock = Clock::new();
        let other = clock.clone();

        clock.advance(Duration::from_millis(100));
        assert_eq!(other.now(), Duration::from_millis(100));
        assert_eq!(clock, other);
    }
}
