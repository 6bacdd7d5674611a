//! ---
//! warden_section: "02-credential-auth"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Credential verification, tokens, sessions and role permissions."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

#[derive(Debug, Clone)]
struct FailureRecord {
    consecutive: u32,
    last_failure: DateTime<Utc>,
    locked_until: Option<DateTime<Utc>>,
}

/// Consecutive login failures per username.
///
/// Failures further apart than `lockout_duration` do not accumulate.
#[derive(Debug, Clone)]
pub struct LockoutTracker {
    records: Arc<Mutex<HashMap<String, FailureRecord>>>,
    max_failed_attempts: u32,
    lockout_duration: Duration,
}

impl LockoutTracker {
    pub fn new(max_failed_attempts: u32, lockout_duration: Duration) -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            max_failed_attempts,
            lockout_duration,
        }
    }

    /// `Some(until)` while the username is locked. An elapsed lock is cleared.
    pub fn locked_until(&self, username: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut records = self.records.lock();
        let until = records.get(username)?.locked_until?;
        if now < until {
            return Some(until);
        }
        records.remove(username);
        None
    }

    /// Count a failure; returns the lock expiry when this failure triggered a lock.
    pub fn record_failure(&self, username: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut records = self.records.lock();
        let record = records
            .entry(username.to_owned())
            .or_insert_with(|| FailureRecord {
                consecutive: 0,
                last_failure: now,
                locked_until: None,
            });
        if now - record.last_failure >= self.lockout_duration {
            record.consecutive = 0;
        }
        record.last_failure = now;
        record.consecutive += 1;
        if record.consecutive >= self.max_failed_attempts {
            let until = now + self.lockout_duration;
            record.consecutive = 0;
            record.locked_until = Some(until);
            return Some(until);
        }
        None
    }

    pub fn record_success(&self, username: &str) {
        self.records.lock().remove(username);
    }

    /// Failures that still count towards a lock as of `now`.
    pub fn failed_attempts(&self, username: &str, now: DateTime<Utc>) -> u32 {
        self.records
            .lock()
            .get(username)
            .filter(|record| now - record.last_failure < self.lockout_duration)
            .map_or(0, |record| record.consecutive)
    }

    /// Drop records that neither hold a lock nor count towards one. Returns how many.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, record| match record.locked_until {
            Some(until) => now < until,
            None => now - record.last_failure < self.lockout_duration,
        });
        before - records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locks_after_threshold_and_unlocks_after_duration() {
        let tracker = LockoutTracker::new(3, Duration::minutes(15));
        let now = Utc::now();
        assert!(tracker.record_failure("ops", now).is_none());
        assert!(tracker.record_failure("ops", now).is_none());
        assert_eq!(tracker.failed_attempts("ops", now), 2);
        let until = tracker.record_failure("ops", now).unwrap();
        assert_eq!(until, now + Duration::minutes(15));

        assert_eq!(tracker.locked_until("ops", now + Duration::minutes(14)), Some(until));
        assert_eq!(tracker.locked_until("ops", until), None);
        assert_eq!(tracker.failed_attempts("ops", until), 0);
    }

    #[test]
    fn stale_failures_age_out() {
        let tracker = LockoutTracker::new(3, Duration::minutes(15));
        let start = Utc::now();
        tracker.record_failure("ops", start);
        tracker.record_failure("ops", start + Duration::minutes(1));
        assert_eq!(tracker.failed_attempts("ops", start + Duration::minutes(16)), 0);

        // A third failure long after the first two starts a fresh count.
        let later = start + Duration::hours(2);
        assert!(tracker.record_failure("ops", later).is_none());
        assert_eq!(tracker.failed_attempts("ops", later), 1);
        assert!(tracker.record_failure("ops", later).is_none());
        assert!(tracker.record_failure("ops", later).is_some());
    }

    #[test]
    fn prune_keeps_only_live_state() {
        let tracker = LockoutTracker::new(2, Duration::minutes(5));
        let now = Utc::now();
        tracker.record_failure("stale", now - Duration::minutes(10));
        tracker.record_failure("recent", now);
        tracker.record_failure("locked", now);
        tracker.record_failure("locked", now);

        assert_eq!(tracker.prune(now), 1);
        assert_eq!(tracker.failed_attempts("recent", now), 1);
        assert!(tracker.locked_until("locked", now).is_some());

        assert_eq!(tracker.prune(now + Duration::minutes(5)), 2);
        assert!(tracker.locked_until("locked", now + Duration::minutes(5)).is_none());
    }

    #[test]
    fn success_resets_the_counter() {
        let tracker = LockoutTracker::new(2, Duration::minutes(1));
        let now = Utc::now();
        tracker.record_failure("ops", now);
        tracker.record_success("ops");
        assert!(tracker.record_failure("ops", now).is_none());
        assert!(tracker.locked_until("other", now).is_none());
    }
}
