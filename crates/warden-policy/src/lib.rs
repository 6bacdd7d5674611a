//! ---
//! warden_section: "04-policy-authorizer"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Attribute-based policies, cached decisions and audit hooks."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
//! Attribute-based authorization for Warden.
//!
//! [`PolicyAuthorizer`] evaluates prioritised allow/deny policies against a principal,
//! resource, action and request context. Decisions are default-deny, cached for a bounded
//! time and reported to an injected [`AuditLogger`].

pub mod audit;
pub mod authorizer;
pub mod cache;
pub mod conditions;
pub mod error;
pub mod policy;
pub mod request;

pub use audit::{
    verify_chain, AuditEntry, AuditLogger, AuditQuery, MemoryAuditLogger, NoopAuditLogger,
    PolicyEvent, TracingAuditLogger,
};
pub use authorizer::{PolicyAuthorizer, REASON_NO_POLICY, REASON_PRINCIPAL_INACTIVE};
pub use cache::CacheStats;
pub use error::{AuditError, PolicyError, PolicyResult};
pub use policy::{Effect, IpConstraints, Policy, PolicyConditions, PolicyId, TimeWindow};
pub use request::{AccessDecision, AccessRequest, RequestContext, Resource};
