//! Idle backoff for worker threads.

use std::hint::spin_loop;
use std::thread;
use std::time::Duration;

/// Spin, then yield, then park with a timeout.
///
/// Parking is woken early by `Thread::unpark`, which the thread manager
/// calls whenever it enqueues work.
#[derive(Debug, Default)]
pub struct Backoff {
    step: u32,
}

impl Backoff {
    const SPIN_LIMIT: u32 = 6;
    const YIELD_LIMIT: u32 = 10;
    const PARK_TIMEOUT: Duration = Duration::from_micros(100);

    pub fn new() -> Self {
        Self { step: 0 }
    }

    pub fn reset(&mut self) {
        self.step = 0;
    }

    /// Whether the next snooze parks the thread.
    pub fn is_parking(&self) -> bool {
        self.step > Self::YIELD_LIMIT
    }

    pub fn snooze(&mut self) {
        if self.step <= Self::SPIN_LIMIT {
            for _ in 0..(1u32 << self.step) {
                spin_loop();
            }
        } else if self.step <= Self::YIELD_LIMIT {
            thread::yield_now();
        } else {
            thread::park_timeout(Self::PARK_TIMEOUT);
        }

        if self.step <= Self::YIELD_LIMIT {
            self.step += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_progression() {
        let mut backoff = Backoff::new();
        assert!(!backoff.is_parking());

        for _ in 0..20 {
            backoff.snooze();
        }
        assert!(backoff.is_parking());

        backoff.reset();
        assert!(!backoff.is_parking());
    }
}
