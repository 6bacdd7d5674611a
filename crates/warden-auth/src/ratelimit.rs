//! ---
//! warden_section: "02-credential-auth"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Credential verification, tokens, sessions and role permissions."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Sliding-window request counter per identifier.
///
/// A request counts against its identifier while it is younger than `window`.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    requests: Arc<Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>>,
    max_requests: u32,
    window: Duration,
}

fn drop_before(times: &mut VecDeque<DateTime<Utc>>, window_start: DateTime<Utc>) {
    while times.front().is_some_and(|at| *at <= window_start) {
        times.pop_front();
    }
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            requests: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    /// Admit and count one request for `identifier`, unless the window ending at `now`
    /// already holds `max_requests` of them. Rejected requests are not counted.
    pub fn is_allowed(&self, identifier: &str, now: DateTime<Utc>) -> bool {
        let mut requests = self.requests.lock();
        let times = requests.entry(identifier.to_owned()).or_default();
        drop_before(times, now - self.window);
        if times.len() >= self.max_requests as usize {
            return false;
        }
        times.push_back(now);
        true
    }

    /// Requests `identifier` may still make in the window ending at `now`.
    pub fn remaining_requests(&self, identifier: &str, now: DateTime<Utc>) -> u32 {
        let window_start = now - self.window;
        let used = self.requests.lock().get(identifier).map_or(0, |times| {
            times.iter().filter(|at| **at > window_start).count()
        });
        self.max_requests
            .saturating_sub(u32::try_from(used).unwrap_or(u32::MAX))
    }

    /// Forget identifiers with no request inside the window. Returns how many were dropped.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let window_start = now - self.window;
        let mut requests = self.requests.lock();
        let before = requests.len();
        requests.retain(|_, times| {
            drop_before(times, window_start);
            !times.is_empty()
        });
        before - requests.len()
    }
}
