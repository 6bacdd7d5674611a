//! ---
//! warden_section: "02-credential-auth"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Credential verification, tokens, sessions and role permissions."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
//! Argon2id credential hashing and strength assessment.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use warden_common::HashingConfig;

use crate::error::CredentialError;

const SPECIAL_CHARACTERS: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";

const COMMON_SECRETS: &[&str] = &[
    "password",
    "123456",
    "123456789",
    "qwerty",
    "abc123",
    "password123",
    "admin",
    "letmein",
    "welcome",
    "monkey",
];

/// Adaptive one-way hasher producing PHC strings (`$argon2id$v=19$m=..,t=..,p=..$salt$hash`).
///
/// Verification reads the cost factors from the stored hash, so raising the configured cost
/// does not invalidate existing hashes.
#[derive(Clone)]
pub struct CredentialHasher {
    argon2: Argon2<'static>,
}

impl std::fmt::Debug for CredentialHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHasher")
            .field("params", self.argon2.params())
            .finish()
    }
}

impl CredentialHasher {
    pub fn new(config: &HashingConfig) -> Result<Self, CredentialError> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|err| CredentialError::InvalidParameters(err.to_string()))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash `secret` under a fresh random salt.
    pub fn hash(&self, secret: &str) -> Result<String, CredentialError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| CredentialError::Hashing(err.to_string()))
    }

    /// `Ok(false)` on mismatch; `Err` only when `hash` is not a usable PHC string.
    /// The digest comparison is constant time.
    pub fn verify(&self, secret: &str, hash: &str) -> Result<bool, CredentialError> {
        let parsed = PasswordHash::new(hash).map_err(|_| CredentialError::MalformedHash)?;
        match self.argon2.verify_password(secret.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(_) => Err(CredentialError::MalformedHash),
        }
    }
}

/// Outcome of [`assess_strength`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrengthReport {
    /// True when no rule in `errors` was violated.
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// 0-100.
    pub score: u8,
}

/// Check a candidate secret against the complexity rules and score it.
pub fn assess_strength(secret: &str) -> StrengthReport {
    let length = secret.chars().count();
    let has_upper = secret.chars().any(char::is_uppercase);
    let has_lower = secret.chars().any(char::is_lowercase);
    let has_digit = secret.chars().any(|c| c.is_ascii_digit());
    let has_special = secret.chars().any(|c| SPECIAL_CHARACTERS.contains(c));

    let mut errors = Vec::new();
    if length < 8 {
        errors.push("must be at least 8 characters long".to_owned());
    }
    if !has_upper {
        errors.push("must contain at least one uppercase letter".to_owned());
    }
    if !has_lower {
        errors.push("must contain at least one lowercase letter".to_owned());
    }
    if !has_digit {
        errors.push("must contain at least one digit".to_owned());
    }
    if !has_special {
        errors.push("must contain at least one special character".to_owned());
    }

    let mut warnings = Vec::new();
    if length < 12 {
        warnings.push("consider using 12 or more characters".to_owned());
    }

    let mut score = (length * 4).min(25) as i32;
    for (present, bonus) in [
        (has_upper, 10),
        (has_lower, 10),
        (has_digit, 10),
        (has_special, 15),
    ] {
        if present {
            score += bonus;
        }
    }
    if COMMON_SECRETS.contains(&secret.to_lowercase().as_str()) {
        score -= 50;
    }

    StrengthReport {
        valid: errors.is_empty(),
        errors,
        warnings,
        score: score.clamp(0, 100) as u8,
    }
}
