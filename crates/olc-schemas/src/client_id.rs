//! Client-id (`cid`) generation.
//!
//! A `cid` is attached to every outbound request so the first acknowledgement
//! can be correlated before the venue has assigned an `order_id`. Ids are
//! wall-clock milliseconds, bumped past the last issued value so two requests
//! created in the same millisecond never share one.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Monotonic millisecond-based id source. Safe to share between threads.
#[derive(Debug, Default)]
pub struct ClientIdGenerator {
    last: AtomicI64,
}

impl ClientIdGenerator {
    pub const fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    /// Next id: `max(now_ms, last + 1)`.
    pub fn next_id(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(current + 1);
            match self.last.compare_exchange_weak(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(observed) => current = observed,
            }
        }
    }
}

static PROCESS_IDS: ClientIdGenerator = ClientIdGenerator::new();

/// Next id from the process-wide generator.
pub fn next_client_id() -> i64 {
    PROCESS_IDS.next_id()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn ids_strictly_increase() {
        let gen = ClientIdGenerator::new();
        let a = gen.next_id();
        let b = gen.next_id();
        let c = gen.next_id();
        assert!(a < b && b < c);
    }

    #[test]
    fn ids_track_wall_clock() {
        let before = Utc::now().timestamp_millis();
        let id = ClientIdGenerator::new().next_id();
        assert!(id >= before);
    }

    #[test]
    fn concurrent_callers_never_collide() {
        let gen = Arc::new(ClientIdGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gen = Arc::clone(&gen);
                std::thread::spawn(move || (0..250).map(|_| gen.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(seen.insert(id), "duplicate cid {id}");
            }
        }
        assert_eq!(seen.len(), 1000);
    }
}
