//! ---
//! warden_section: "03-key-vault"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Key generation, rotation, encryption and signing."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
//! AES-256-GCM sealing on top of `ring::aead`.
//!
//! Sealed output is `nonce || ciphertext || tag`. The key identifier is bound as associated
//! data, so a payload cannot be decrypted under a different key id even if the secret leaked
//! into two records.

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{VaultError, VaultResult};

/// Secret length for AES-256.
pub const SECRET_LEN: usize = 32;

pub(crate) fn generate_secret() -> VaultResult<Vec<u8>> {
    let mut secret = vec![0u8; SECRET_LEN];
    SystemRandom::new()
        .fill(&mut secret)
        .map_err(|_| VaultError::Cryptographic("random source unavailable".into()))?;
    Ok(secret)
}

pub(crate) fn validate_secret(secret: &[u8]) -> VaultResult<()> {
    if secret.len() != SECRET_LEN {
        return Err(VaultError::MalformedKeyMaterial(format!(
            "expected a {SECRET_LEN} byte secret, found {} bytes",
            secret.len()
        )));
    }
    Ok(())
}

fn sealing_key(secret: &[u8]) -> VaultResult<LessSafeKey> {
    let unbound = UnboundKey::new(&AES_256_GCM, secret)
        .map_err(|_| VaultError::MalformedKeyMaterial("invalid AES-256 secret".into()))?;
    Ok(LessSafeKey::new(unbound))
}

/// Seal `plaintext`, returning `nonce || ciphertext || tag` and the nonce on its own.
pub(crate) fn seal(secret: &[u8], aad: &[u8], plaintext: &[u8]) -> VaultResult<(Vec<u8>, Vec<u8>)> {
    let key = sealing_key(secret)?;
    let mut nonce_bytes = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce_bytes)
        .map_err(|_| VaultError::Cryptographic("random source unavailable".into()))?;

    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(
        Nonce::assume_unique_for_key(nonce_bytes),
        Aad::from(aad),
        &mut in_out,
    )
    .map_err(|_| VaultError::Cryptographic("aead seal failed".into()))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&in_out);
    Ok((sealed, nonce_bytes.to_vec()))
}

/// Open `nonce || ciphertext || tag`. Every failure collapses to `DecryptionFailed`.
pub(crate) fn open(secret: &[u8], aad: &[u8], sealed: &[u8]) -> VaultResult<Vec<u8>> {
    let key = sealing_key(secret).map_err(|_| VaultError::DecryptionFailed)?;
    if sealed.len() < NONCE_LEN + AES_256_GCM.tag_len() {
        return Err(VaultError::DecryptionFailed);
    }
    let (nonce_bytes, body) = sealed.split_at(NONCE_LEN);
    let nonce =
        Nonce::try_assume_unique_for_key(nonce_bytes).map_err(|_| VaultError::DecryptionFailed)?;
    let mut in_out = body.to_vec();
    let plaintext = key
        .open_in_place(nonce, Aad::from(aad), &mut in_out)
        .map_err(|_| VaultError::DecryptionFailed)?;
    Ok(plaintext.to_vec())
}

/// Nonce prefix of a sealed buffer.
pub(crate) fn nonce_prefix(sealed: &[u8]) -> Option<&[u8]> {
    sealed.get(..NONCE_LEN)
}
