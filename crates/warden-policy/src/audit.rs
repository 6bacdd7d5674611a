//! ---
//! warden_section: "04-policy-authorizer"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Attribute-based policies, cached decisions and audit hooks."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::AuditError;
use crate::request::{AccessDecision, AccessRequest};

/// Administrative change to the policy set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PolicyEvent {
    Created,
    Updated,
    Removed,
    Enabled,
    Disabled,
}

/// Sink for policy changes and access decisions.
///
/// Called synchronously from the authorizer; errors are logged and discarded, so an
/// implementation must not rely on them to block a request.
pub trait AuditLogger: Send + Sync {
    fn log_policy_event(
        &self,
        event: PolicyEvent,
        policy_id: &str,
        details: &serde_json::Value,
    ) -> Result<(), AuditError>;

    fn log_access_request(
        &self,
        request: &AccessRequest,
        decision: &AccessDecision,
    ) -> Result<(), AuditError>;
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditLogger;

impl AuditLogger for NoopAuditLogger {
    fn log_policy_event(&self, _: PolicyEvent, _: &str, _: &serde_json::Value) -> Result<(), AuditError> {
        Ok(())
    }

    fn log_access_request(&self, _: &AccessRequest, _: &AccessDecision) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Emits audit records as `tracing` events on the `warden::audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditLogger;

impl AuditLogger for TracingAuditLogger {
    fn log_policy_event(
        &self,
        event: PolicyEvent,
        policy_id: &str,
        details: &serde_json::Value,
    ) -> Result<(), AuditError> {
        info!(
            target: "warden::audit",
            event = %event,
            policy_id,
            details = %details,
            "policy changed"
        );
        Ok(())
    }

    fn log_access_request(
        &self,
        request: &AccessRequest,
        decision: &AccessDecision,
    ) -> Result<(), AuditError> {
        info!(
            target: "warden::audit",
            request_id = %request.id,
            principal_id = %request.principal_id,
            resource_id = %request.resource_id,
            action = %request.action,
            ip_address = ?request.ip_address,
            granted = decision.granted,
            matched_policy_id = ?decision.matched_policy_id,
            reason = %decision.reason,
            "access decision"
        );
        Ok(())
    }
}

/// Entry recorded by [`MemoryAuditLogger`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    /// Principal for access records, `authorizer` for policy changes.
    pub actor: String,
    /// `policy.<event>` or `access.granted` / `access.denied`.
    pub action: String,
    pub metadata: serde_json::Value,
    /// SHA-256 of the entry contents and `previous_hash`, each field length-prefixed.
    pub hash: String,
    /// Hash of the previous entry, or 64 zeros for the first entry.
    pub previous_hash: String,
}

impl AuditEntry {
    fn compute_hash(
        timestamp: DateTime<Utc>,
        actor: &str,
        action: &str,
        metadata: &serde_json::Value,
        previous_hash: &str,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(
            timestamp
                .timestamp_nanos_opt()
                .unwrap_or_default()
                .to_be_bytes(),
        );
        for field in [actor, action, metadata.to_string().as_str(), previous_hash] {
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Filter for [`MemoryAuditLogger::query`]. Unset fields match everything; time bounds
/// are inclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditQuery {
    pub actor: Option<String>,
    pub action: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl AuditQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.actor.as_deref().map_or(true, |actor| entry.actor == actor)
            && self.action.as_deref().map_or(true, |action| entry.action == action)
            && self.start.map_or(true, |start| entry.timestamp >= start)
            && self.end.map_or(true, |end| entry.timestamp <= end)
    }
}

fn genesis_hash() -> String {
    "0".repeat(64)
}

/// In-memory, hash-chained audit trail. Each entry commits to its predecessor, so editing
/// or dropping an entry breaks [`MemoryAuditLogger::verify`].
#[derive(Debug, Default)]
pub struct MemoryAuditLogger {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    fn append(&self, actor: &str, action: &str, metadata: serde_json::Value) -> AuditEntry {
        let mut entries = self.entries.lock();
        let previous_hash = entries
            .last()
            .map(|entry| entry.hash.clone())
            .unwrap_or_else(genesis_hash);
        let timestamp = Utc::now();
        let entry = AuditEntry {
            hash: AuditEntry::compute_hash(timestamp, actor, action, &metadata, &previous_hash),
            timestamp,
            actor: actor.to_owned(),
            action: action.to_owned(),
            metadata,
            previous_hash,
        };
        entries.push(entry.clone());
        entry
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Entries matching `query`, oldest first.
    pub fn query(&self, query: &AuditQuery) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| query.matches(entry))
            .cloned()
            .collect()
    }

    /// The whole trail as a pretty-printed JSON array, hashes included.
    pub fn export_json(&self) -> Result<String, AuditError> {
        serde_json::to_string_pretty(&*self.entries.lock())
            .map_err(|err| AuditError::Encoding(err.to_string()))
    }

    /// Verify the chain held by this logger.
    pub fn verify(&self) -> bool {
        verify_chain(&self.entries.lock())
    }
}

/// Recompute every hash in `entries`; false on the first break.
pub fn verify_chain(entries: &[AuditEntry]) -> bool {
    let mut previous = genesis_hash();
    for entry in entries {
        if entry.previous_hash != previous {
            return false;
        }
        let expected = AuditEntry::compute_hash(
            entry.timestamp,
            &entry.actor,
            &entry.action,
            &entry.metadata,
            &previous,
        );
        if expected != entry.hash {
            return false;
        }
        previous = expected;
    }
    true
}

impl AuditLogger for MemoryAuditLogger {
    fn log_policy_event(
        &self,
        event: PolicyEvent,
        policy_id: &str,
        details: &serde_json::Value,
    ) -> Result<(), AuditError> {
        self.append(
            "authorizer",
            &format!("policy.{event}"),
            json!({ "policy_id": policy_id, "details": details }),
        );
        Ok(())
    }

    fn log_access_request(
        &self,
        request: &AccessRequest,
        decision: &AccessDecision,
    ) -> Result<(), AuditError> {
        let action = if decision.granted {
            "access.granted"
        } else {
            "access.denied"
        };
        let metadata = json!({
            "request": request,
            "decision": decision,
        });
        self.append(&request.principal_id, action, metadata);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AccessRequest {
        AccessRequest {
            id: "r-1".into(),
            principal_id: "alice".into(),
            resource_id: "invoice-3".into(),
            action: "approve".into(),
            context: Default::default(),
            timestamp: Utc::now(),
            ip_address: None,
            session_id: None,
            user_agent: None,
        }
    }

    fn decision(granted: bool) -> AccessDecision {
        AccessDecision {
            request_id: "r-1".into(),
            granted,
            reason: "test".into(),
            matched_policy_id: None,
            evaluated_at: Utc::now(),
        }
    }

    #[test]
    fn chain_detects_tampering() {
        let logger = MemoryAuditLogger::new();
        logger
            .log_policy_event(PolicyEvent::Created, "p-1", &json!({"name": "ops"}))
            .unwrap();
        logger.log_access_request(&request(), &decision(true)).unwrap();
        logger.log_access_request(&request(), &decision(false)).unwrap();
        assert_eq!(logger.len(), 3);
        assert!(logger.verify());

        let mut entries = logger.entries();
        assert_eq!(entries[0].action, "policy.created");
        assert_eq!(entries[1].action, "access.granted");
        assert_eq!(entries[2].actor, "alice");

        entries[1].metadata["decision"]["granted"] = json!(false);
        assert!(!verify_chain(&entries));

        let mut dropped = logger.entries();
        dropped.remove(1);
        assert!(!verify_chain(&dropped));
    }

    #[test]
    fn shifting_a_field_boundary_breaks_the_chain() {
        let logger = MemoryAuditLogger::new();
        logger
            .log_policy_event(PolicyEvent::Created, "p-1", &json!({}))
            .unwrap();
        let mut entries = logger.entries();
        assert_eq!(entries[0].actor, "authorizer");
        assert_eq!(entries[0].action, "policy.created");

        entries[0].actor = "authorizerp".into();
        entries[0].action = "olicy.created".into();
        assert!(!verify_chain(&entries));
    }

    #[test]
    fn query_filters_by_actor_action_and_time() {
        let logger = MemoryAuditLogger::new();
        logger
            .log_policy_event(PolicyEvent::Created, "p-1", &json!({}))
            .unwrap();
        logger.log_access_request(&request(), &decision(true)).unwrap();
        logger.log_access_request(&request(), &decision(false)).unwrap();
        let entries = logger.entries();

        assert_eq!(logger.query(&AuditQuery::new()), entries);
        assert_eq!(logger.query(&AuditQuery::new().by_actor("alice")).len(), 2);
        let denied = logger.query(&AuditQuery::new().with_action("access.denied"));
        assert_eq!(denied, vec![entries[2].clone()]);
        assert!(logger
            .query(&AuditQuery::new().by_actor("authorizer").with_action("access.granted"))
            .is_empty());

        let (first, last) = (entries[0].timestamp, entries[2].timestamp);
        assert_eq!(logger.query(&AuditQuery::new().between(first, last)).len(), 3);
        let later = last + chrono::Duration::seconds(1);
        assert!(logger
            .query(&AuditQuery::new().between(later, later + chrono::Duration::hours(1)))
            .is_empty());
    }

    #[test]
    fn export_round_trips_and_still_verifies() {
        let logger = MemoryAuditLogger::new();
        logger
            .log_policy_event(PolicyEvent::Disabled, "p-2", &json!({"name": "archive"}))
            .unwrap();
        logger.log_access_request(&request(), &decision(false)).unwrap();

        let exported = logger.export_json().unwrap();
        let restored: Vec<AuditEntry> = serde_json::from_str(&exported).unwrap();
        assert_eq!(restored, logger.entries());
        assert!(verify_chain(&restored));
        assert_eq!(MemoryAuditLogger::new().export_json().unwrap(), "[]");
    }

    #[test]
    fn trivial_loggers_accept_everything() {
        let details = json!({});
        assert!(NoopAuditLogger
            .log_policy_event(PolicyEvent::Removed, "p", &details)
            .is_ok());
        assert!(TracingAuditLogger
            .log_access_request(&request(), &decision(true))
            .is_ok());
    }
}
