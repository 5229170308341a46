//! Clock & ID generation
//!
//! A small injectable clock so decay math and storage timestamps are
//! testable without sleeping, plus the UUIDv4 id generator used for
//! memories and relations.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Unix-second clock, injectable for tests.
pub trait Clock: Send + Sync {
    /// Current time as Unix seconds.
    fn now_unix(&self) -> i64;
}

/// Wall-clock implementation backed by the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Fixed/advanceable clock for deterministic tests.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<AtomicI64>,
}

impl FixedClock {
    /// Create a clock starting at `now`.
    pub fn new(now: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(now)),
        }
    }

    /// Advance the clock by `seconds` (may be negative).
    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }

    /// Set the clock to an absolute Unix-second value.
    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_unix(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Generate a new memory id (UUIDv4).
pub fn new_memory_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Generate a new relation id (UUIDv4).
pub fn new_relation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances() {
        let clock = FixedClock::new(1_000);
        assert_eq!(clock.now_unix(), 1_000);
        clock.advance(86_400);
        assert_eq!(clock.now_unix(), 87_400);
    }

    #[test]
    fn ids_are_unique_and_well_formed() {
        let a = new_memory_id();
        let b = new_memory_id();
        assert_ne!(a, b);
        assert!(uuid::Uuid::parse_str(&a).is_ok());
    }
}
