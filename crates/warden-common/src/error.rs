//! ---
//! warden_section: "01-core-functionality"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Shared primitives for the identity and access components."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse classification shared by every component error.
///
/// Hosts map these onto their own surface (HTTP status codes, exit codes) without
/// matching on component-specific variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A policy, key, session or role the caller named does not exist.
    NotFound,
    /// Bad signature, failed decryption, expired token/session, rejected credentials.
    /// Never retried automatically.
    SecurityFailure,
    /// Unsupported algorithm, malformed material, oversized payload, invalid arguments.
    InputFailure,
}

impl ErrorKind {
    /// Stable lowercase label, suitable for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::SecurityFailure => "security_failure",
            ErrorKind::InputFailure => "input_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
