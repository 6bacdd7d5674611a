//! ---
//! warden_section: "03-key-vault"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Key generation, rotation, encryption and signing."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
//! Key lifecycle for Warden: AES-256-GCM and RSA key generation, rotation with retained
//! history, authenticated encryption, OAEP encryption and PKCS#1 v1.5 signatures.

mod asymmetric;
pub mod error;
pub mod key;
mod symmetric;
pub mod vault;

pub use error::{VaultError, VaultResult};
pub use key::{EncryptedPayload, EncryptionKey, KeyAlgorithm, KeyId, KeyKind, KeyMaterial};
pub use symmetric::SECRET_LEN;
pub use vault::KeyVault;
