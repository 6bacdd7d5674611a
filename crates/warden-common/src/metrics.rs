//! ---
//! warden_section: "01-core-functionality"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Shared primitives for the identity and access components."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::Result;
use prometheus::{IntCounterVec, Opts, Registry};

/// Shared registry type handed to every component that publishes metrics.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Security metrics exported via Prometheus.
///
/// Registered against a caller-supplied registry so two component sets in one process
/// never collide on metric names.
#[derive(Clone)]
pub struct WardenMetrics {
    registry: SharedRegistry,
    auth_attempts_total: IntCounterVec,
    auth_failures_total: IntCounterVec,
    access_decisions_total: IntCounterVec,
    decision_cache_total: IntCounterVec,
    key_operations_total: IntCounterVec,
}

impl std::fmt::Debug for WardenMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WardenMetrics").finish_non_exhaustive()
    }
}

impl WardenMetrics {
    /// Register the metric families with the provided registry.
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let auth_attempts_total = IntCounterVec::new(
            Opts::new(
                "warden_auth_attempts_total",
                "Credential, token and session verification attempts",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(auth_attempts_total.clone()))?;

        let auth_failures_total = IntCounterVec::new(
            Opts::new(
                "warden_auth_failures_total",
                "Failed credential, token and session verifications",
            ),
            &["operation", "reason"],
        )?;
        registry.register(Box::new(auth_failures_total.clone()))?;

        let access_decisions_total = IntCounterVec::new(
            Opts::new(
                "warden_access_decisions_total",
                "Access decisions returned by the policy authorizer",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(access_decisions_total.clone()))?;

        let decision_cache_total = IntCounterVec::new(
            Opts::new(
                "warden_decision_cache_total",
                "Decision cache lookups by result",
            ),
            &["result"],
        )?;
        registry.register(Box::new(decision_cache_total.clone()))?;

        let key_operations_total = IntCounterVec::new(
            Opts::new(
                "warden_key_operations_total",
                "Key vault operations by type and outcome",
            ),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(key_operations_total.clone()))?;

        Ok(Self {
            registry,
            auth_attempts_total,
            auth_failures_total,
            access_decisions_total,
            decision_cache_total,
            key_operations_total,
        })
    }

    /// Access the underlying registry.
    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn inc_auth_attempt(&self, operation: &str) {
        self.auth_attempts_total
            .with_label_values(&[operation])
            .inc();
    }

    pub fn inc_auth_failure(&self, operation: &str, reason: &str) {
        self.auth_failures_total
            .with_label_values(&[operation, reason])
            .inc();
    }

    /// Count a decision; `granted` selects the `allow`/`deny` label.
    pub fn record_decision(&self, granted: bool) {
        let outcome = if granted { "allow" } else { "deny" };
        self.access_decisions_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.decision_cache_total.with_label_values(&[result]).inc();
    }

    pub fn record_key_operation(&self, operation: &str, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.key_operations_total
            .with_label_values(&[operation, outcome])
            .inc();
    }
}
