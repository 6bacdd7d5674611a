//! ---
//! warden_section: "03-key-vault"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Key generation, rotation, encryption and signing."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use warden_common::{VaultConfig, WardenMetrics};

use crate::asymmetric;
use crate::error::{VaultError, VaultResult};
use crate::key::{EncryptedPayload, EncryptionKey, KeyAlgorithm, KeyId, KeyKind, KeyMaterial};
use crate::symmetric;

/// In-memory key store with generation, rotation, encryption and signing.
///
/// Cloning is cheap and shares the store. Lookups hand out `Arc<EncryptionKey>` snapshots:
/// an operation that already resolved a key completes against that snapshot even if the key
/// is rotated concurrently.
#[derive(Debug, Clone)]
pub struct KeyVault {
    keys: Arc<RwLock<HashMap<KeyId, Arc<EncryptionKey>>>>,
    default_symmetric: KeyAlgorithm,
    default_asymmetric: KeyAlgorithm,
    key_ttl: Option<Duration>,
    metrics: Option<WardenMetrics>,
}

impl Default for KeyVault {
    fn default() -> Self {
        Self {
            keys: Arc::new(RwLock::new(HashMap::new())),
            default_symmetric: KeyAlgorithm::Aes256Gcm,
            default_asymmetric: KeyAlgorithm::Rsa2048,
            key_ttl: None,
            metrics: None,
        }
    }
}

impl KeyVault {
    /// Create an empty vault from configuration.
    pub fn new(config: &VaultConfig) -> VaultResult<Self> {
        let default_symmetric = KeyAlgorithm::parse(&config.default_symmetric_algorithm)?;
        if default_symmetric.kind() != KeyKind::Symmetric {
            return Err(VaultError::UnsupportedAlgorithm(
                config.default_symmetric_algorithm.clone(),
            ));
        }
        let default_asymmetric = KeyAlgorithm::parse(&config.default_asymmetric_algorithm)?;
        if default_asymmetric.kind() != KeyKind::Asymmetric {
            return Err(VaultError::UnsupportedAlgorithm(
                config.default_asymmetric_algorithm.clone(),
            ));
        }
        // A TTL beyond chrono's range never expires.
        let key_ttl = config.key_ttl.and_then(|ttl| Duration::from_std(ttl).ok());
        Ok(Self {
            default_symmetric,
            default_asymmetric,
            key_ttl,
            ..Self::default()
        })
    }

    /// Attach metrics.
    pub fn with_metrics(mut self, metrics: WardenMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn observe<T>(&self, operation: &str, result: VaultResult<T>) -> VaultResult<T> {
        if let Some(metrics) = &self.metrics {
            metrics.record_key_operation(operation, result.is_ok());
        }
        result
    }

    fn new_record(
        &self,
        algorithm: KeyAlgorithm,
        material: KeyMaterial,
        description: String,
        rotated_from: Option<KeyId>,
    ) -> EncryptionKey {
        let created_at = Utc::now();
        EncryptionKey {
            id: uuid::Uuid::new_v4().to_string(),
            kind: algorithm.kind(),
            algorithm,
            material,
            active: true,
            created_at,
            expires_at: self.key_ttl.map(|ttl| created_at + ttl),
            description,
            rotated_from,
            rotated_to: None,
        }
    }

    fn generate_material(algorithm: KeyAlgorithm) -> VaultResult<KeyMaterial> {
        match algorithm.modulus_bits() {
            None => Ok(KeyMaterial::Symmetric {
                secret: symmetric::generate_secret()?,
            }),
            Some(bits) => {
                let pair = asymmetric::generate(bits)?;
                Ok(KeyMaterial::Asymmetric {
                    public_der: pair.public_der,
                    private_der: pair.private_der,
                })
            }
        }
    }

    fn store(&self, key: EncryptionKey) -> Arc<EncryptionKey> {
        let key = Arc::new(key);
        self.keys.write().insert(key.id.clone(), key.clone());
        info!(
            key_id = %key.id,
            algorithm = %key.algorithm,
            fingerprint = %key.fingerprint(),
            "key generated"
        );
        key
    }

    /// Generate a 256-bit AEAD key.
    pub fn generate_symmetric_key(
        &self,
        algorithm: KeyAlgorithm,
        description: impl Into<String>,
    ) -> VaultResult<Arc<EncryptionKey>> {
        let result = (|| {
            if algorithm.kind() != KeyKind::Symmetric {
                return Err(VaultError::UnsupportedAlgorithm(algorithm.to_string()));
            }
            let material = Self::generate_material(algorithm)?;
            Ok(self.store(self.new_record(algorithm, material, description.into(), None)))
        })();
        self.observe("generate", result)
    }

    /// Generate an RSA key pair at the algorithm's modulus size.
    pub fn generate_asymmetric_key_pair(
        &self,
        algorithm: KeyAlgorithm,
        description: impl Into<String>,
    ) -> VaultResult<Arc<EncryptionKey>> {
        let result = (|| {
            if algorithm.kind() != KeyKind::Asymmetric {
                return Err(VaultError::UnsupportedAlgorithm(algorithm.to_string()));
            }
            let material = Self::generate_material(algorithm)?;
            Ok(self.store(self.new_record(algorithm, material, description.into(), None)))
        })();
        self.observe("generate", result)
    }

    /// Generate a symmetric key with the configured default algorithm.
    pub fn generate_default_symmetric_key(
        &self,
        description: impl Into<String>,
    ) -> VaultResult<Arc<EncryptionKey>> {
        self.generate_symmetric_key(self.default_symmetric, description)
    }

    /// Generate a key pair with the configured default algorithm.
    pub fn generate_default_key_pair(
        &self,
        description: impl Into<String>,
    ) -> VaultResult<Arc<EncryptionKey>> {
        self.generate_asymmetric_key_pair(self.default_asymmetric, description)
    }

    /// Re-admit a key record produced earlier, e.g. restored by the host after a restart.
    pub fn import_key(&self, key: EncryptionKey) -> VaultResult<Arc<EncryptionKey>> {
        let result = (|| {
            if key.id.trim().is_empty() {
                return Err(VaultError::MalformedKeyMaterial("key id must not be empty".into()));
            }
            if key.kind != key.algorithm.kind() || key.material.kind() != key.kind {
                return Err(VaultError::MalformedKeyMaterial(format!(
                    "material does not match algorithm {}",
                    key.algorithm
                )));
            }
            match (&key.material, key.algorithm.modulus_bits()) {
                (KeyMaterial::Symmetric { secret }, None) => symmetric::validate_secret(secret)?,
                (
                    KeyMaterial::Asymmetric {
                        public_der,
                        private_der,
                    },
                    Some(bits),
                ) => asymmetric::validate(public_der, private_der, bits)?,
                _ => {
                    return Err(VaultError::MalformedKeyMaterial(format!(
                        "material does not match algorithm {}",
                        key.algorithm
                    )))
                }
            }

            let mut keys = self.keys.write();
            if keys.contains_key(&key.id) {
                return Err(VaultError::DuplicateKey(key.id));
            }
            let key = Arc::new(key);
            keys.insert(key.id.clone(), key.clone());
            info!(
                key_id = %key.id,
                algorithm = %key.algorithm,
                active = key.active,
                fingerprint = %key.fingerprint(),
                "key imported"
            );
            Ok(key)
        })();
        self.observe("import", result)
    }

    /// Resolve a key snapshot.
    pub fn get_key(&self, key_id: &str) -> VaultResult<Arc<EncryptionKey>> {
        self.keys
            .read()
            .get(key_id)
            .cloned()
            .ok_or_else(|| VaultError::KeyNotFound(key_id.to_owned()))
    }

    /// Every stored key, oldest first. Retired keys are included.
    pub fn list_keys(&self) -> Vec<Arc<EncryptionKey>> {
        let mut keys: Vec<_> = self.keys.read().values().cloned().collect();
        keys.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        keys
    }

    /// Keys currently usable for new encryptions and signatures.
    pub fn active_keys(&self) -> Vec<Arc<EncryptionKey>> {
        let now = Utc::now();
        self.list_keys()
            .into_iter()
            .filter(|key| key.is_usable_at(now))
            .collect()
    }

    fn ensure_usable(key: &EncryptionKey, now: DateTime<Utc>) -> VaultResult<()> {
        if key.is_usable_at(now) {
            Ok(())
        } else {
            Err(VaultError::KeyInactive(key.id.clone()))
        }
    }

    /// Encrypt with the key stored under `key_id`.
    pub fn encrypt(&self, data: &[u8], key_id: &str) -> VaultResult<EncryptedPayload> {
        match self.get_key(key_id) {
            Ok(key) => self.encrypt_with_key(&key, data),
            Err(err) => self.observe("encrypt", Err(err)),
        }
    }

    /// Encrypt with an already-resolved key snapshot.
    ///
    /// AEAD keys accept any length; RSA keys accept at most one OAEP block and reject larger
    /// inputs with [`VaultError::PayloadTooLarge`].
    pub fn encrypt_with_key(
        &self,
        key: &EncryptionKey,
        data: &[u8],
    ) -> VaultResult<EncryptedPayload> {
        let result = (|| {
            let now = Utc::now();
            Self::ensure_usable(key, now)?;
            let (ciphertext, nonce) = match &key.material {
                KeyMaterial::Symmetric { secret } => {
                    let (sealed, nonce) = symmetric::seal(secret, key.id.as_bytes(), data)?;
                    (sealed, Some(nonce))
                }
                KeyMaterial::Asymmetric { public_der, .. } => {
                    (asymmetric::encrypt(public_der, data)?, None)
                }
            };
            debug!(key_id = %key.id, bytes = data.len(), "payload encrypted");
            Ok(EncryptedPayload {
                id: uuid::Uuid::new_v4().to_string(),
                key_id: key.id.clone(),
                algorithm: key.algorithm,
                ciphertext,
                nonce,
                signature: None,
                signature_key_id: None,
                created_at: now,
            })
        })();
        self.observe("encrypt", result)
    }

    /// Decrypt a payload. Retired and expired keys still decrypt.
    pub fn decrypt(&self, payload: &EncryptedPayload, key_id: &str) -> VaultResult<Vec<u8>> {
        let result = (|| {
            let key = self.get_key(key_id)?;
            if payload.algorithm != key.algorithm {
                return Err(VaultError::DecryptionFailed);
            }
            match &key.material {
                KeyMaterial::Symmetric { secret } => {
                    if let Some(nonce) = &payload.nonce {
                        if symmetric::nonce_prefix(&payload.ciphertext) != Some(nonce.as_slice()) {
                            return Err(VaultError::DecryptionFailed);
                        }
                    }
                    symmetric::open(secret, key.id.as_bytes(), &payload.ciphertext)
                }
                KeyMaterial::Asymmetric { private_der, .. } => {
                    asymmetric::decrypt(private_der, &payload.ciphertext)
                }
            }
        })();
        if let Err(err) = &result {
            warn!(key_id, payload_id = %payload.id, reason = err.label(), "decryption rejected");
        }
        self.observe("decrypt", result)
    }

    /// Sign `data` (SHA-256 digest, PKCS#1 v1.5 padding). Asymmetric keys only.
    pub fn sign(&self, data: &[u8], key_id: &str) -> VaultResult<Vec<u8>> {
        match self.get_key(key_id) {
            Ok(key) => self.sign_with_key(&key, data),
            Err(err) => self.observe("sign", Err(err)),
        }
    }

    /// Sign with an already-resolved key snapshot.
    pub fn sign_with_key(&self, key: &EncryptionKey, data: &[u8]) -> VaultResult<Vec<u8>> {
        let result = (|| match &key.material {
            KeyMaterial::Symmetric { .. } => Err(VaultError::UnsupportedOperation {
                key_id: key.id.clone(),
                operation: "sign",
            }),
            KeyMaterial::Asymmetric { private_der, .. } => {
                Self::ensure_usable(key, Utc::now())?;
                asymmetric::sign(private_der, data)
            }
        })();
        self.observe("sign", result)
    }

    /// Verify a signature. Any cryptographic mismatch is `Ok(false)`; only an unknown key
    /// or a symmetric key is an error. Retired keys still verify.
    pub fn verify_signature(
        &self,
        data: &[u8],
        signature: &[u8],
        key_id: &str,
    ) -> VaultResult<bool> {
        let result = (|| {
            let key = self.get_key(key_id)?;
            match &key.material {
                KeyMaterial::Symmetric { .. } => Err(VaultError::UnsupportedOperation {
                    key_id: key.id.clone(),
                    operation: "verify",
                }),
                KeyMaterial::Asymmetric { public_der, .. } => {
                    Ok(asymmetric::verify(public_der, data, signature))
                }
            }
        })();
        self.observe("verify", result)
    }

    /// Attach a signature over the payload ciphertext (encrypt-then-sign).
    pub fn sign_payload(&self, payload: &mut EncryptedPayload, key_id: &str) -> VaultResult<()> {
        let signature = self.sign(&payload.ciphertext, key_id)?;
        payload.signature = Some(signature);
        payload.signature_key_id = Some(key_id.to_owned());
        Ok(())
    }

    /// Verify the signature attached by [`KeyVault::sign_payload`]. Unsigned payloads and
    /// payloads signed by a different key verify as `false`.
    pub fn verify_payload(&self, payload: &EncryptedPayload, key_id: &str) -> VaultResult<bool> {
        let Some(signature) = &payload.signature else {
            return Ok(false);
        };
        if payload.signature_key_id.as_deref() != Some(key_id) {
            // Still surface an unknown key as NotFound.
            self.get_key(key_id)?;
            return Ok(false);
        }
        self.verify_signature(&payload.ciphertext, signature, key_id)
    }

    /// Largest plaintext `encrypt` accepts for the key, `None` when unbounded (AEAD).
    pub fn max_plaintext_len(&self, key_id: &str) -> VaultResult<Option<usize>> {
        let key = self.get_key(key_id)?;
        match &key.material {
            KeyMaterial::Symmetric { .. } => Ok(None),
            KeyMaterial::Asymmetric { public_der, .. } => {
                asymmetric::max_plaintext_len(public_der).map(Some)
            }
        }
    }

    /// Replace `key_id` with a fresh key of the same algorithm and description.
    ///
    /// The old key is marked inactive and kept forever for decryption and verification.
    /// Rotating an already-retired key fails with [`VaultError::KeyInactive`].
    pub fn rotate_key(&self, key_id: &str) -> VaultResult<Arc<EncryptionKey>> {
        let result = (|| {
            let current = self.get_key(key_id)?;
            if !current.active {
                return Err(VaultError::KeyInactive(current.id.clone()));
            }
            // Generate outside the lock; RSA generation is slow.
            let material = Self::generate_material(current.algorithm)?;
            let replacement = self.new_record(
                current.algorithm,
                material,
                current.description.clone(),
                Some(current.id.clone()),
            );

            let mut keys = self.keys.write();
            let latest = keys
                .get(key_id)
                .cloned()
                .ok_or_else(|| VaultError::KeyNotFound(key_id.to_owned()))?;
            if !latest.active {
                // Lost a race with a concurrent rotation.
                return Err(VaultError::KeyInactive(latest.id.clone()));
            }
            let mut retired = (*latest).clone();
            retired.active = false;
            retired.rotated_to = Some(replacement.id.clone());
            let replacement = Arc::new(replacement);
            keys.insert(retired.id.clone(), Arc::new(retired));
            keys.insert(replacement.id.clone(), replacement.clone());
            drop(keys);

            info!(
                retired_key_id = %key_id,
                key_id = %replacement.id,
                algorithm = %replacement.algorithm,
                fingerprint = %replacement.fingerprint(),
                "key rotated"
            );
            Ok(replacement)
        })();
        self.observe("rotate", result)
    }
}
