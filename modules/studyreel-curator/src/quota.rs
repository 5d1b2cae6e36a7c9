use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use studyreel_common::QuotaState;

use crate::traits::QuotaStore;

/// Tracks spend against the provider's daily unit budget. The counter
/// persists across process restarts through the backing store, so two runs
/// in one day share one budget. `reserve` is advisory — the provider may
/// charge a different true cost, and callers still handle provider-reported
/// quota errors independently.
pub struct QuotaTracker {
    store: Box<dyn QuotaStore>,
    state: Mutex<QuotaState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Allowed,
    Denied,
}

impl QuotaTracker {
    /// Load persisted state, or start fresh. A changed daily limit in config
    /// takes effect immediately without resetting the used counter.
    pub fn open(store: Box<dyn QuotaStore>, daily_limit: u32, now: DateTime<Utc>) -> Result<Self> {
        let mut state = match store.load().context("failed to load quota state")? {
            Some(s) => s,
            None => QuotaState::fresh(daily_limit, now),
        };
        state.daily_limit = daily_limit;

        let tracker = Self {
            store,
            state: Mutex::new(state),
        };
        tracker.reset_if_expired(now)?;
        Ok(tracker)
    }

    /// Check whether `units` fit in today's remaining budget. Does not spend.
    pub fn reserve(&self, units: u32, now: DateTime<Utc>) -> Result<Reservation> {
        self.reset_if_expired(now)?;
        let state = self.state.lock().expect("quota lock poisoned");
        if state.units_used_today.saturating_add(units) <= state.daily_limit {
            Ok(Reservation::Allowed)
        } else {
            Ok(Reservation::Denied)
        }
    }

    /// Record spend after a successful provider call. The stored counter is
    /// capped at the daily limit; overshoot (a provider charging more than
    /// reserved) is logged.
    pub fn consume(&self, units: u32, now: DateTime<Utc>) -> Result<()> {
        self.reset_if_expired(now)?;
        let mut state = self.state.lock().expect("quota lock poisoned");
        let requested = state.units_used_today.saturating_add(units);
        if requested > state.daily_limit {
            warn!(
                requested,
                limit = state.daily_limit,
                "Quota consume exceeds daily limit, capping counter"
            );
        }
        state.units_used_today = requested.min(state.daily_limit);
        self.store
            .save(&state)
            .context("failed to persist quota state")
    }

    pub fn remaining(&self) -> u32 {
        let state = self.state.lock().expect("quota lock poisoned");
        state.daily_limit.saturating_sub(state.units_used_today)
    }

    pub fn units_used(&self) -> u32 {
        self.state.lock().expect("quota lock poisoned").units_used_today
    }

    /// Zero the counter when 24h have passed since the last reset. The
    /// counter and the timestamp move together under one lock and one save.
    pub fn reset_if_expired(&self, now: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.lock().expect("quota lock poisoned");
        if now - state.last_reset_at < Duration::hours(24) {
            return Ok(false);
        }
        info!(
            previous_used = state.units_used_today,
            "Daily quota window expired, resetting counter"
        );
        state.units_used_today = 0;
        state.last_reset_at = now;
        self.store
            .save(&state)
            .context("failed to persist quota reset")?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryQuotaStore;

    fn tracker(limit: u32) -> QuotaTracker {
        QuotaTracker::open(Box::new(MemoryQuotaStore::default()), limit, Utc::now()).unwrap()
    }

    #[test]
    fn reserve_allows_within_budget() {
        let q = tracker(10_000);
        assert_eq!(q.reserve(100, Utc::now()).unwrap(), Reservation::Allowed);
        q.consume(100, Utc::now()).unwrap();
        assert_eq!(q.remaining(), 9_900);
    }

    #[test]
    fn reserve_denies_when_next_call_would_exceed() {
        let q = tracker(10_000);
        q.consume(9_950, Utc::now()).unwrap();
        assert_eq!(q.reserve(100, Utc::now()).unwrap(), Reservation::Denied);
        // The counter was never spent past the limit.
        assert_eq!(q.units_used(), 9_950);
    }

    #[test]
    fn reserve_denies_at_zero_remaining() {
        let q = tracker(100);
        q.consume(100, Utc::now()).unwrap();
        assert_eq!(q.remaining(), 0);
        assert_eq!(q.reserve(1, Utc::now()).unwrap(), Reservation::Denied);
    }

    #[test]
    fn consume_caps_at_daily_limit() {
        let q = tracker(100);
        q.consume(80, Utc::now()).unwrap();
        q.consume(50, Utc::now()).unwrap();
        assert_eq!(q.units_used(), 100);
        assert_eq!(q.remaining(), 0);
    }

    #[test]
    fn resets_after_24_hours() {
        let store = MemoryQuotaStore::default();
        let start = Utc::now();
        let q = QuotaTracker::open(Box::new(store), 1_000, start).unwrap();
        q.consume(900, start).unwrap();

        let later = start + Duration::hours(23);
        assert!(!q.reset_if_expired(later).unwrap());
        assert_eq!(q.remaining(), 100);

        let next_day = start + Duration::hours(24);
        assert!(q.reset_if_expired(next_day).unwrap());
        assert_eq!(q.remaining(), 1_000);
    }

    #[test]
    fn reserve_resets_expired_window_itself() {
        let start = Utc::now();
        let q = QuotaTracker::open(Box::new(MemoryQuotaStore::default()), 100, start).unwrap();
        q.consume(100, start).unwrap();
        assert_eq!(q.reserve(100, start).unwrap(), Reservation::Denied);
        assert_eq!(
            q.reserve(100, start + Duration::hours(25)).unwrap(),
            Reservation::Allowed
        );
    }

    #[test]
    fn persisted_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quota.json");
        let now = Utc::now();

        {
            let store = crate::store::JsonQuotaStore::new(path.clone());
            let q = QuotaTracker::open(Box::new(store), 10_000, now).unwrap();
            q.consume(4_200, now).unwrap();
        }

        let store = crate::store::JsonQuotaStore::new(path);
        let q = QuotaTracker::open(Box::new(store), 10_000, now).unwrap();
        assert_eq!(q.units_used(), 4_200);
    }
}
