//! ---
//! warden_section: "03-key-vault"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Key generation, rotation, encryption and signing."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;
use sha2::{Digest, Sha256};

use crate::error::VaultError;

/// Identifier for a stored key.
pub type KeyId = String;

/// Broad family of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    /// Shared secret for authenticated encryption.
    Symmetric,
    /// Public/private pair for encryption and signatures.
    Asymmetric,
}

/// Algorithms the vault can generate and use.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum KeyAlgorithm {
    /// AES with a 256-bit key in Galois/Counter Mode, 96-bit nonce.
    #[serde(rename = "AES-256-GCM")]
    #[strum(serialize = "AES-256-GCM")]
    Aes256Gcm,
    /// RSA with a 2048-bit modulus.
    #[serde(rename = "RSA-2048")]
    #[strum(serialize = "RSA-2048")]
    Rsa2048,
    /// RSA with a 4096-bit modulus.
    #[serde(rename = "RSA-4096")]
    #[strum(serialize = "RSA-4096")]
    Rsa4096,
}

impl KeyAlgorithm {
    /// Parse an algorithm identifier such as `AES-256-GCM` or `RSA-4096`.
    pub fn parse(identifier: &str) -> Result<Self, VaultError> {
        KeyAlgorithm::from_str(identifier.trim())
            .map_err(|_| VaultError::UnsupportedAlgorithm(identifier.to_owned()))
    }

    /// Key family this algorithm belongs to.
    pub fn kind(&self) -> KeyKind {
        match self {
            KeyAlgorithm::Aes256Gcm => KeyKind::Symmetric,
            KeyAlgorithm::Rsa2048 | KeyAlgorithm::Rsa4096 => KeyKind::Asymmetric,
        }
    }

    /// RSA modulus size in bits, `None` for symmetric algorithms.
    pub fn modulus_bits(&self) -> Option<usize> {
        match self {
            KeyAlgorithm::Aes256Gcm => None,
            KeyAlgorithm::Rsa2048 => Some(2048),
            KeyAlgorithm::Rsa4096 => Some(4096),
        }
    }
}

/// Raw key material. `Debug` never prints the bytes.
#[serde_as]
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum KeyMaterial {
    /// 256-bit AEAD secret.
    Symmetric {
        #[serde_as(as = "Base64")]
        secret: Vec<u8>,
    },
    /// DER-encoded SubjectPublicKeyInfo and PKCS#8 private key.
    Asymmetric {
        #[serde_as(as = "Base64")]
        public_der: Vec<u8>,
        #[serde_as(as = "Base64")]
        private_der: Vec<u8>,
    },
}

impl KeyMaterial {
    /// Family of the material.
    pub fn kind(&self) -> KeyKind {
        match self {
            KeyMaterial::Symmetric { .. } => KeyKind::Symmetric,
            KeyMaterial::Asymmetric { .. } => KeyKind::Asymmetric,
        }
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMaterial::Symmetric { secret } => f
                .debug_struct("Symmetric")
                .field("secret", &format_args!("<{} bytes redacted>", secret.len()))
                .finish(),
            KeyMaterial::Asymmetric {
                public_der,
                private_der,
            } => f
                .debug_struct("Asymmetric")
                .field("public_der", &format_args!("<{} bytes>", public_der.len()))
                .field(
                    "private_der",
                    &format_args!("<{} bytes redacted>", private_der.len()),
                )
                .finish(),
        }
    }
}

/// Key record held by the vault.
///
/// Keys are never deleted. Rotation flips `active` to false on the retired key, which keeps
/// decrypting and verifying but refuses new encryptions and signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionKey {
    pub id: KeyId,
    pub kind: KeyKind,
    pub algorithm: KeyAlgorithm,
    pub material: KeyMaterial,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: String,
    /// Key this one replaced, when produced by rotation.
    #[serde(default)]
    pub rotated_from: Option<KeyId>,
    /// Key that replaced this one, once retired by rotation.
    #[serde(default)]
    pub rotated_to: Option<KeyId>,
}

impl EncryptionKey {
    /// Whether the key may be used for new encryptions/signatures at `now`.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at.map_or(true, |expiry| now < expiry)
    }

    /// Whether the key has passed its expiry.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| now >= expiry)
    }

    /// SHA-256 fingerprint, hex encoded. For asymmetric keys it covers the public half only,
    /// so it can be published; for symmetric keys it is a one-way digest of the secret.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        match &self.material {
            KeyMaterial::Symmetric { secret } => hasher.update(secret),
            KeyMaterial::Asymmetric { public_der, .. } => hasher.update(public_der),
        }
        hex::encode(hasher.finalize())
    }
}

/// Ciphertext plus the metadata needed to decrypt it later.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub id: String,
    pub key_id: KeyId,
    pub algorithm: KeyAlgorithm,
    /// For AEAD: nonce followed by ciphertext and tag. For RSA: the OAEP block.
    #[serde_as(as = "Base64")]
    pub ciphertext: Vec<u8>,
    /// AEAD nonce (also the ciphertext prefix); absent for RSA.
    #[serde(default)]
    #[serde_as(as = "Option<Base64>")]
    pub nonce: Option<Vec<u8>>,
    /// Signature over `ciphertext`, when attached with [`crate::KeyVault::sign_payload`].
    #[serde(default)]
    #[serde_as(as = "Option<Base64>")]
    pub signature: Option<Vec<u8>>,
    /// Key that produced `signature`.
    #[serde(default)]
    pub signature_key_id: Option<KeyId>,
    pub created_at: DateTime<Utc>,
}
