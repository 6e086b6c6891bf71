//! crates/unit_booking_core/src/expiry.rs
//!
//! Reservation countdowns, armed at most once per unit.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::domain::UnitId;

/// How long a reservation holds before the unit returns to Available.
pub const RESERVATION_TTL_MS: i64 = 600_000;

/// The instant a reservation made at `reserved_at` lapses.
pub fn reservation_deadline(reserved_at: DateTime<Utc>) -> DateTime<Utc> {
    reserved_at + chrono::Duration::milliseconds(RESERVATION_TTL_MS)
}

/// Milliseconds left on a reservation, clamped at zero.
pub fn remaining_ms(reserved_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (reservation_deadline(reserved_at) - now)
        .num_milliseconds()
        .max(0)
}

struct ArmedTimer {
    reserved_at: DateTime<Utc>,
    handle: JoinHandle<()>,
}

/// Tracks one expiry task per unit id.
///
/// Arming again for the same reservation is a no-op; a changed reservation
/// time aborts the old task and starts a new one.
#[derive(Default)]
pub struct ExpiryTimers {
    armed: Mutex<HashMap<UnitId, ArmedTimer>>,
}

impl ExpiryTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `on_expiry` to run after `delay`. Returns `false` when a live
    /// timer for the same reservation already exists.
    pub fn arm<F>(&self, unit_id: UnitId, reserved_at: DateTime<Utc>, delay: Duration, on_expiry: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Ok(mut armed) = self.armed.lock() else {
            return false;
        };
        if let Some(existing) = armed.get(&unit_id) {
            if existing.reserved_at == reserved_at && !existing.handle.is_finished() {
                return false;
            }
        }
        if let Some(old) = armed.remove(&unit_id) {
            old.handle.abort();
        }

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_expiry.await;
        });
        armed.insert(unit_id, ArmedTimer { reserved_at, handle });
        true
    }

    /// Forgets the timer for `unit_id` without aborting it, if it still belongs
    /// to `reserved_at`. Called by the expiring task itself.
    pub fn release(&self, unit_id: UnitId, reserved_at: DateTime<Utc>) -> bool {
        let Ok(mut armed) = self.armed.lock() else {
            return false;
        };
        match armed.get(&unit_id) {
            Some(timer) if timer.reserved_at == reserved_at => {
                armed.remove(&unit_id);
                true
            }
            _ => false,
        }
    }

    /// Cancels the countdown for `unit_id`, if any.
    pub fn disarm(&self, unit_id: UnitId) {
        if let Ok(mut armed) = self.armed.lock() {
            if let Some(timer) = armed.remove(&unit_id) {
                timer.handle.abort();
            }
        }
    }

    /// Cancels every countdown.
    pub fn clear(&self) {
        if let Ok(mut armed) = self.armed.lock() {
            for (_, timer) in armed.drain() {
                timer.handle.abort();
            }
        }
    }

    pub fn is_armed(&self, unit_id: UnitId) -> bool {
        self.armed
            .lock()
            .map(|armed| armed.contains_key(&unit_id))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.armed.lock().map(|armed| armed.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for ExpiryTimers {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    fn counting(counter: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn remaining_time_is_clamped() {
        let reserved_at = Utc::now();
        assert_eq!(remaining_ms(reserved_at, reserved_at), RESERVATION_TTL_MS);
        let late = reserved_at + chrono::Duration::milliseconds(601_000);
        assert_eq!(remaining_ms(reserved_at, late), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_same_reservation_fires_once() {
        let timers = ExpiryTimers::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let unit = Uuid::new_v4();
        let reserved_at = Utc::now();

        assert!(timers.arm(unit, reserved_at, Duration::from_secs(600), counting(&fired)));
        for _ in 0..5 {
            assert!(!timers.arm(unit, reserved_at, Duration::from_secs(600), counting(&fired)));
        }
        assert_eq!(timers.len(), 1);

        tokio::time::sleep(Duration::from_secs(601)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn changed_reservation_replaces_timer() {
        let timers = ExpiryTimers::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let unit = Uuid::new_v4();
        let first = Utc::now();
        let second = first + chrono::Duration::seconds(30);

        timers.arm(unit, first, Duration::from_secs(10), counting(&fired));
        assert!(timers.arm(unit, second, Duration::from_secs(20), counting(&fired)));

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disarm_and_clear_cancel_pending_timers() {
        let timers = ExpiryTimers::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();

        timers.arm(a, now, Duration::from_secs(5), counting(&fired));
        timers.arm(b, now, Duration::from_secs(5), counting(&fired));
        timers.disarm(a);
        assert!(!timers.is_armed(a));
        timers.clear();
        assert!(timers.is_empty());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
