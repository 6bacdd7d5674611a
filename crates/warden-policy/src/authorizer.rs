//! ---
//! warden_section: "04-policy-authorizer"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Attribute-based policies, cached decisions and audit hooks."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Duration, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::json;
use tracing::{debug, info, trace, warn};
use warden_common::{PolicyConfig, Principal, WardenMetrics};

use crate::audit::{AuditLogger, PolicyEvent};
use crate::cache::{cache_key, CacheStats, DecisionCache};
use crate::conditions::first_mismatch;
use crate::error::{PolicyError, PolicyResult};
use crate::policy::{Effect, Policy, PolicyId};
use crate::request::{AccessDecision, AccessRequest, RequestContext, Resource};

pub const REASON_NO_POLICY: &str = "no applicable policy";
pub const REASON_PRINCIPAL_INACTIVE: &str = "principal inactive";

/// Attribute-based access control over an insertion-ordered policy set.
///
/// Policies are evaluated by descending priority, ties in insertion order; the first policy
/// whose conditions all hold decides. With no match the request is denied. Any change to
/// the policy set flushes the decision cache.
#[derive(Clone)]
pub struct PolicyAuthorizer {
    policies: Arc<RwLock<IndexMap<PolicyId, Policy>>>,
    cache: Arc<DecisionCache>,
    audit: Arc<dyn AuditLogger>,
    evaluations: Arc<AtomicU64>,
    metrics: Option<WardenMetrics>,
}

impl std::fmt::Debug for PolicyAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyAuthorizer")
            .field("policies", &self.policies.read().len())
            .field("cache", &self.cache.stats())
            .finish_non_exhaustive()
    }
}

impl PolicyAuthorizer {
    pub fn new(config: &PolicyConfig, audit: Arc<dyn AuditLogger>) -> PolicyResult<Self> {
        config
            .validate()
            .map_err(|err| PolicyError::Configuration(format!("{err:#}")))?;
        let ttl = Duration::from_std(config.decision_cache_ttl)
            .map_err(|err| PolicyError::Configuration(format!("decision_cache_ttl: {err}")))?;
        Ok(Self {
            policies: Arc::new(RwLock::new(IndexMap::new())),
            cache: Arc::new(DecisionCache::new(ttl, config.decision_cache_enabled)),
            audit,
            evaluations: Arc::new(AtomicU64::new(0)),
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: WardenMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn audit_policy(&self, event: PolicyEvent, policy_id: &str, details: serde_json::Value) {
        if let Err(err) = self.audit.log_policy_event(event, policy_id, &details) {
            warn!(policy_id, error = %err, "audit logger rejected policy event");
        }
    }

    fn flush_cache(&self) {
        let dropped = self.cache.invalidate();
        debug!(dropped, "decision cache flushed");
    }

    // Administration

    pub fn add_policy(&self, policy: Policy) -> PolicyResult<()> {
        policy.validate()?;
        let details = json!({
            "name": policy.name,
            "effect": policy.effect,
            "priority": policy.priority,
        });
        let id = policy.id.clone();
        {
            let mut policies = self.policies.write();
            if policies.contains_key(&id) {
                return Err(PolicyError::DuplicatePolicy(id));
            }
            policies.insert(id.clone(), policy);
            self.flush_cache();
        }
        info!(policy_id = %id, "policy added");
        self.audit_policy(PolicyEvent::Created, &id, details);
        Ok(())
    }

    /// Replace an existing policy in place, keeping its position and `created_at`.
    pub fn update_policy(&self, mut policy: Policy) -> PolicyResult<()> {
        policy.validate()?;
        let details = json!({
            "name": policy.name,
            "effect": policy.effect,
            "priority": policy.priority,
            "enabled": policy.enabled,
        });
        let id = policy.id.clone();
        {
            let mut policies = self.policies.write();
            let Some(existing) = policies.get_mut(&id) else {
                return Err(PolicyError::PolicyNotFound(id));
            };
            policy.created_at = existing.created_at;
            policy.updated_at = Utc::now();
            *existing = policy;
            self.flush_cache();
        }
        info!(policy_id = %id, "policy updated");
        self.audit_policy(PolicyEvent::Updated, &id, details);
        Ok(())
    }

    pub fn remove_policy(&self, policy_id: &str) -> PolicyResult<Policy> {
        let removed = {
            let mut policies = self.policies.write();
            let removed = policies
                .shift_remove(policy_id)
                .ok_or_else(|| PolicyError::PolicyNotFound(policy_id.to_owned()))?;
            self.flush_cache();
            removed
        };
        info!(policy_id, "policy removed");
        self.audit_policy(PolicyEvent::Removed, policy_id, json!({ "name": removed.name }));
        Ok(removed)
    }

    pub fn set_policy_enabled(&self, policy_id: &str, enabled: bool) -> PolicyResult<()> {
        {
            let mut policies = self.policies.write();
            let policy = policies
                .get_mut(policy_id)
                .ok_or_else(|| PolicyError::PolicyNotFound(policy_id.to_owned()))?;
            policy.enabled = enabled;
            policy.updated_at = Utc::now();
            self.flush_cache();
        }
        info!(policy_id, enabled, "policy toggled");
        let event = if enabled {
            PolicyEvent::Enabled
        } else {
            PolicyEvent::Disabled
        };
        self.audit_policy(event, policy_id, json!({}));
        Ok(())
    }

    pub fn get_policy(&self, policy_id: &str) -> PolicyResult<Policy> {
        self.policies
            .read()
            .get(policy_id)
            .cloned()
            .ok_or_else(|| PolicyError::PolicyNotFound(policy_id.to_owned()))
    }

    /// Every policy in insertion order.
    pub fn list_policies(&self) -> Vec<Policy> {
        self.policies.read().values().cloned().collect()
    }

    // Evaluation

    /// Decide whether `principal` may perform `action` on `resource`.
    ///
    /// Never fails: anything short of a matching allow policy is a denial.
    pub fn check_access(
        &self,
        principal: &Principal,
        resource: &Resource,
        action: &str,
        context: &RequestContext,
    ) -> AccessDecision {
        let now = Utc::now();
        let request = AccessRequest {
            id: uuid::Uuid::new_v4().to_string(),
            principal_id: principal.id.clone(),
            resource_id: resource.id.clone(),
            action: action.to_owned(),
            context: context.attributes.clone(),
            timestamp: context.timestamp.unwrap_or(now),
            ip_address: context.ip_address,
            session_id: context.session_id.clone(),
            user_agent: context.user_agent.clone(),
        };

        if !principal.active {
            let decision = AccessDecision {
                request_id: request.id.clone(),
                granted: false,
                reason: REASON_PRINCIPAL_INACTIVE.to_owned(),
                matched_policy_id: None,
                evaluated_at: now,
            };
            return self.finish(&request, decision);
        }

        let key = if self.cache.is_enabled() {
            cache_key(principal, resource, action, context)
        } else {
            None
        };
        if let Some(key) = &key {
            let cached = self.cache.get(key, now);
            if let Some(metrics) = &self.metrics {
                metrics.record_cache_lookup(cached.is_some());
            }
            if let Some(decision) = cached {
                debug!(
                    principal_id = %principal.id,
                    resource_id = %resource.id,
                    action,
                    granted = decision.granted,
                    "decision cache hit"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_decision(decision.granted);
                }
                return decision;
            }
        }

        let (decision, generation) = {
            let policies = self.policies.read();
            let generation = self.cache.generation();
            (self.evaluate(&policies, principal, resource, &request, now), generation)
        };
        if let Some(key) = key {
            self.cache.insert(key, decision.clone(), generation);
        }
        self.finish(&request, decision)
    }

    fn evaluate(
        &self,
        policies: &IndexMap<PolicyId, Policy>,
        principal: &Principal,
        resource: &Resource,
        request: &AccessRequest,
        now: chrono::DateTime<Utc>,
    ) -> AccessDecision {
        self.evaluations.fetch_add(1, Ordering::Relaxed);

        let mut ordered: Vec<&Policy> = policies.values().filter(|policy| policy.enabled).collect();
        // Stable: equal priorities keep insertion order.
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority));

        for policy in ordered {
            match first_mismatch(&policy.conditions, policy.effect, principal, resource, request) {
                Some(mismatch) => {
                    trace!(policy_id = %policy.id, %mismatch, "policy skipped");
                }
                None => {
                    let granted = policy.effect == Effect::Allow;
                    let verb = if granted { "allowed" } else { "denied" };
                    return AccessDecision {
                        request_id: request.id.clone(),
                        granted,
                        reason: format!("{verb} by policy {}", policy.name),
                        matched_policy_id: Some(policy.id.clone()),
                        evaluated_at: now,
                    };
                }
            }
        }

        AccessDecision {
            request_id: request.id.clone(),
            granted: false,
            reason: REASON_NO_POLICY.to_owned(),
            matched_policy_id: None,
            evaluated_at: now,
        }
    }

    fn finish(&self, request: &AccessRequest, decision: AccessDecision) -> AccessDecision {
        if let Some(metrics) = &self.metrics {
            metrics.record_decision(decision.granted);
        }
        if decision.granted {
            debug!(
                request_id = %request.id,
                principal_id = %request.principal_id,
                resource_id = %request.resource_id,
                action = %request.action,
                "access granted"
            );
        } else {
            warn!(
                request_id = %request.id,
                principal_id = %request.principal_id,
                resource_id = %request.resource_id,
                action = %request.action,
                reason = %decision.reason,
                "access denied"
            );
        }
        if let Err(err) = self.audit.log_access_request(request, &decision) {
            warn!(request_id = %request.id, error = %err, "audit logger rejected access record");
        }
        decision
    }

    /// Number of full policy evaluations performed (cache hits excluded).
    pub fn evaluation_count(&self) -> u64 {
        self.evaluations.load(Ordering::Relaxed)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.flush_cache();
    }
}
