//! ---
//! warden_section: "04-policy-authorizer"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Attribute-based policies, cached decisions and audit hooks."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
//! Decision cache keyed by a digest of every request input. A request without an explicit
//! timestamp is evaluated at the current time and keyed without one, so a time-window
//! boundary can be outlived by at most the TTL.
//!
//! Entries carry the policy generation they were evaluated under. Invalidation bumps the
//! generation, so a decision computed against a superseded policy set is never stored.

use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use warden_common::{AttributeMap, Principal};

use crate::request::{AccessDecision, RequestContext, Resource};

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Serialize)]
struct KeyMaterial<'a> {
    principal_id: &'a str,
    roles: &'a BTreeSet<String>,
    principal_attributes: &'a AttributeMap,
    resource_id: &'a str,
    resource_type: &'a str,
    owner_id: Option<&'a str>,
    resource_attributes: &'a AttributeMap,
    action: &'a str,
    context: &'a AttributeMap,
    ip_address: Option<IpAddr>,
    session_id: Option<&'a str>,
    timestamp: Option<DateTime<Utc>>,
}

/// Hex SHA-256 over a canonical JSON encoding of the request inputs. `None` only when the
/// inputs cannot be encoded, in which case the request bypasses the cache.
pub fn cache_key(
    principal: &Principal,
    resource: &Resource,
    action: &str,
    context: &RequestContext,
) -> Option<String> {
    let material = KeyMaterial {
        principal_id: &principal.id,
        roles: &principal.roles,
        principal_attributes: &principal.attributes,
        resource_id: &resource.id,
        resource_type: &resource.resource_type,
        owner_id: resource.owner_id.as_deref(),
        resource_attributes: &resource.attributes,
        action,
        context: &context.attributes,
        ip_address: context.ip_address,
        session_id: context.session_id.as_deref(),
        timestamp: context.timestamp,
    };
    let encoded = serde_json::to_vec(&material).ok()?;
    Some(hex::encode(Sha256::digest(encoded)))
}

#[derive(Debug, Clone)]
struct CachedDecision {
    decision: AccessDecision,
    stored_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct CacheState {
    generation: u64,
    entries: HashMap<String, CachedDecision>,
}

/// TTL-bounded decision cache. Expired entries are evicted lazily on lookup.
#[derive(Debug)]
pub struct DecisionCache {
    state: RwLock<CacheState>,
    ttl: Duration,
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DecisionCache {
    pub fn new(ttl: Duration, enabled: bool) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            ttl,
            enabled,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Generation new decisions must be stored under.
    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<AccessDecision> {
        if !self.enabled {
            return None;
        }
        let expired = {
            let state = self.state.read();
            match state.entries.get(key) {
                Some(entry) if now - entry.stored_at < self.ttl => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.decision.clone());
                }
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            let mut state = self.state.write();
            if state
                .entries
                .get(key)
                .is_some_and(|entry| now - entry.stored_at >= self.ttl)
            {
                state.entries.remove(key);
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a decision evaluated under `generation`; dropped if the cache was invalidated
    /// since.
    pub fn insert(&self, key: String, decision: AccessDecision, generation: u64) -> bool {
        if !self.enabled {
            return false;
        }
        let mut state = self.state.write();
        if state.generation != generation {
            return false;
        }
        state.entries.insert(
            key,
            CachedDecision {
                stored_at: decision.evaluated_at,
                decision,
            },
        );
        true
    }

    /// Drop every entry and advance the generation. Returns how many entries were dropped.
    pub fn invalidate(&self) -> usize {
        let mut state = self.state.write();
        state.generation += 1;
        let dropped = state.entries.len();
        state.entries.clear();
        dropped
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.state.read().entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
