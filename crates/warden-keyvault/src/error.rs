//! ---
//! warden_section: "03-key-vault"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Key generation, rotation, encryption and signing."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use thiserror::Error;
use warden_common::ErrorKind;

/// Errors returned by the key vault.
///
/// Messages carry identifiers and sizes only; never key bytes, plaintext or ciphertext.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VaultError {
    /// No key is stored under the identifier.
    #[error("key not found: {0}")]
    KeyNotFound(String),
    /// The key was retired by rotation (or has expired) and cannot encrypt or sign.
    #[error("key is inactive: {0}")]
    KeyInactive(String),
    /// Authentication tag, padding or key mismatch while decrypting.
    #[error("decryption failed")]
    DecryptionFailed,
    /// Unknown algorithm identifier, or one that does not fit the requested key kind.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    /// The operation is not defined for this kind of key (e.g. signing with AES).
    #[error("operation '{operation}' is not supported by key {key_id}")]
    UnsupportedOperation {
        /// Key the caller supplied.
        key_id: String,
        /// Operation name.
        operation: &'static str,
    },
    /// Imported material did not parse or has the wrong size.
    #[error("malformed key material: {0}")]
    MalformedKeyMaterial(String),
    /// Asymmetric plaintext exceeds what one OAEP block can carry.
    #[error("payload of {actual} bytes exceeds the {max} byte limit for this key")]
    PayloadTooLarge {
        /// Largest accepted plaintext.
        max: usize,
        /// Size the caller supplied.
        actual: usize,
    },
    /// A key with the same identifier is already stored.
    #[error("key already exists: {0}")]
    DuplicateKey(String),
    /// The underlying primitive failed (randomness, key generation, sealing).
    #[error("cryptographic operation failed: {0}")]
    Cryptographic(String),
}

impl VaultError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::KeyNotFound(_) => ErrorKind::NotFound,
            VaultError::KeyInactive(_)
            | VaultError::DecryptionFailed
            | VaultError::Cryptographic(_) => ErrorKind::SecurityFailure,
            VaultError::UnsupportedAlgorithm(_)
            | VaultError::UnsupportedOperation { .. }
            | VaultError::MalformedKeyMaterial(_)
            | VaultError::PayloadTooLarge { .. }
            | VaultError::DuplicateKey(_) => ErrorKind::InputFailure,
        }
    }

    /// Short label used for metrics and structured logs.
    pub fn label(&self) -> &'static str {
        match self {
            VaultError::KeyNotFound(_) => "key_not_found",
            VaultError::KeyInactive(_) => "key_inactive",
            VaultError::DecryptionFailed => "decryption_failed",
            VaultError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            VaultError::UnsupportedOperation { .. } => "unsupported_operation",
            VaultError::MalformedKeyMaterial(_) => "malformed_key_material",
            VaultError::PayloadTooLarge { .. } => "payload_too_large",
            VaultError::DuplicateKey(_) => "duplicate_key",
            VaultError::Cryptographic(_) => "cryptographic",
        }
    }
}

/// Result alias for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;
