//! ---
//! warden_section: "01-core-functionality"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Shared primitives for the identity and access components."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
//! Shared vocabulary for the Warden workspace.
//! The key vault, credential authenticator and policy authorizer all build on the
//! attribute model, principal record, error classification, configuration, logging,
//! and metrics helpers exposed here.

pub mod attributes;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod principal;

pub use attributes::{AttributeMap, AttributeValue};
pub use config::{
    AuthConfig, HashingConfig, LockoutConfig, LoggingConfig, PolicyConfig, RateLimitConfig,
    VaultConfig, WardenConfig,
};
pub use error::ErrorKind;
pub use logging::{init_tracing, log_security_event, LogFormat, SecurityOutcome};
pub use metrics::{new_registry, SharedRegistry, WardenMetrics};
pub use principal::Principal;
