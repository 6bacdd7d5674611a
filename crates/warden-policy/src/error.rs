//! ---
//! warden_section: "04-policy-authorizer"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Attribute-based policies, cached decisions and audit hooks."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use thiserror::Error;
use warden_common::ErrorKind;

/// Errors from policy administration. Access checks never fail; they deny.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("policy not found: {0}")]
    PolicyNotFound(String),
    #[error("policy already exists: {0}")]
    DuplicatePolicy(String),
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),
    #[error("invalid authorizer configuration: {0}")]
    Configuration(String),
}

impl PolicyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PolicyError::PolicyNotFound(_) => ErrorKind::NotFound,
            PolicyError::DuplicatePolicy(_)
            | PolicyError::InvalidPolicy(_)
            | PolicyError::Configuration(_) => ErrorKind::InputFailure,
        }
    }
}

pub type PolicyResult<T> = Result<T, PolicyError>;

/// Failure reported by an [`crate::AuditLogger`]. The authorizer logs and discards these.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
    #[error("audit record could not be encoded: {0}")]
    Encoding(String),
}
