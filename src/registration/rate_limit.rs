use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use crate::clock::Clock;

pub const MAX_ATTEMPTS: u32 = 5;
pub const LOCKOUT: Duration = Duration::minutes(15);

/// Throttling state for one email.
#[derive(Debug, Clone)]
pub struct RateLimitEntry {
    pub count: u32,
    pub first_attempt_at: OffsetDateTime,
    pub blocked_until: Option<OffsetDateTime>,
}

/// Per-email verification attempt counter with a hard lockout window.
///
/// A single instance is shared by every verification call; each email is an
/// independent entry behind one short-lived mutex.
pub struct RateLimiter {
    entries: Mutex<HashMap<String, RateLimitEntry>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Returns `false` when the email is (or just became) blocked.
    pub fn check_and_increment(&self, email: &str) -> bool {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        if let Some(until) = entries.get(email).and_then(|e| e.blocked_until) {
            if now < until {
                debug!(email = %email, "verification attempt while blocked");
                return false;
            }
            entries.remove(email);
        }

        let entry = entries
            .entry(email.to_string())
            .or_insert_with(|| RateLimitEntry {
                count: 0,
                first_attempt_at: now,
                blocked_until: None,
            });
        entry.count += 1;

        if entry.count > MAX_ATTEMPTS {
            entry.blocked_until = Some(now + LOCKOUT);
            warn!(email = %email, attempts = entry.count, "verification attempts exhausted, blocking");
            return false;
        }
        true
    }

    pub fn reset(&self, email: &str) {
        self.entries.lock().remove(email);
    }

    pub fn remaining_attempts(&self, email: &str) -> u32 {
        self.entries
            .lock()
            .get(email)
            .map(|e| MAX_ATTEMPTS.saturating_sub(e.count))
            .unwrap_or(MAX_ATTEMPTS)
    }

    /// Minutes until the block lifts, rounded up.
    pub fn block_minutes_remaining(&self, email: &str) -> Option<i64> {
        let now = self.clock.now();
        let until = self.entries.lock().get(email)?.blocked_until?;
        if now >= until {
            return None;
        }
        let secs = (until - now).whole_seconds();
        Some((secs + 59) / 60)
    }

    /// Drops entries whose block has lifted or that went quiet for a full
    /// lockout window. Returns how many were dropped.
    ///
    /// An unblocked entry outlives the pending registration it throttles: the
    /// record is written before the first attempt and expires after
    /// `REGISTRATION_TTL`, which equals `LOCKOUT`. Dropping it therefore never
    /// hands spent attempts back to a live code.
    pub fn purge_stale(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| match e.blocked_until {
            Some(until) => now < until,
            None => now - e.first_attempt_at <= LOCKOUT,
        });
        before - entries.len()
    }
}
