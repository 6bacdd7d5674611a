//! ---
//! warden_section: "03-key-vault"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Key generation, rotation, encryption and signing."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
//! RSA primitives: OAEP(SHA-256) encryption and PKCS#1 v1.5 SHA-256 signatures.
//!
//! Plaintext is encrypted directly into a single OAEP block; there is no hybrid envelope,
//! so payloads are limited to `modulus_bytes - 2 * 32 - 2`.

use rand::rngs::OsRng;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::{VaultError, VaultResult};

/// OAEP overhead with SHA-256: two digests plus two framing bytes.
const OAEP_SHA256_OVERHEAD: usize = 2 * 32 + 2;

/// DER-encoded key pair as stored in [`crate::KeyMaterial::Asymmetric`].
pub(crate) struct EncodedKeyPair {
    pub public_der: Vec<u8>,
    pub private_der: Vec<u8>,
}

pub(crate) fn generate(bits: usize) -> VaultResult<EncodedKeyPair> {
    let private = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|err| VaultError::Cryptographic(format!("rsa key generation failed: {err}")))?;
    let public = RsaPublicKey::from(&private);
    let private_der = private
        .to_pkcs8_der()
        .map_err(|err| VaultError::Cryptographic(format!("pkcs8 encoding failed: {err}")))?
        .as_bytes()
        .to_vec();
    let public_der = public
        .to_public_key_der()
        .map_err(|err| VaultError::Cryptographic(format!("spki encoding failed: {err}")))?
        .as_bytes()
        .to_vec();
    Ok(EncodedKeyPair {
        public_der,
        private_der,
    })
}

fn public_key(public_der: &[u8]) -> VaultResult<RsaPublicKey> {
    RsaPublicKey::from_public_key_der(public_der)
        .map_err(|err| VaultError::MalformedKeyMaterial(format!("invalid public key: {err}")))
}

fn private_key(private_der: &[u8]) -> VaultResult<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_der(private_der)
        .map_err(|err| VaultError::MalformedKeyMaterial(format!("invalid private key: {err}")))
}

/// Check that both halves parse, belong together and have the expected modulus size.
pub(crate) fn validate(public_der: &[u8], private_der: &[u8], bits: usize) -> VaultResult<()> {
    let public = public_key(public_der)?;
    let private = private_key(private_der)?;
    if RsaPublicKey::from(&private) != public {
        return Err(VaultError::MalformedKeyMaterial(
            "public key does not match private key".into(),
        ));
    }
    if public.size() * 8 != bits {
        return Err(VaultError::MalformedKeyMaterial(format!(
            "expected a {bits}-bit modulus, found {} bits",
            public.size() * 8
        )));
    }
    Ok(())
}

/// Largest plaintext one OAEP block can carry for this public key.
pub(crate) fn max_plaintext_len(public_der: &[u8]) -> VaultResult<usize> {
    let public = public_key(public_der)?;
    Ok(public.size().saturating_sub(OAEP_SHA256_OVERHEAD))
}

pub(crate) fn encrypt(public_der: &[u8], plaintext: &[u8]) -> VaultResult<Vec<u8>> {
    let public = public_key(public_der)?;
    let max = public.size().saturating_sub(OAEP_SHA256_OVERHEAD);
    if plaintext.len() > max {
        return Err(VaultError::PayloadTooLarge {
            max,
            actual: plaintext.len(),
        });
    }
    public
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext)
        .map_err(|err| VaultError::Cryptographic(format!("oaep encryption failed: {err}")))
}

/// Every failure collapses to `DecryptionFailed` so padding errors are indistinguishable.
pub(crate) fn decrypt(private_der: &[u8], ciphertext: &[u8]) -> VaultResult<Vec<u8>> {
    let private = private_key(private_der).map_err(|_| VaultError::DecryptionFailed)?;
    private
        .decrypt(Oaep::new::<Sha256>(), ciphertext)
        .map_err(|_| VaultError::DecryptionFailed)
}

pub(crate) fn sign(private_der: &[u8], data: &[u8]) -> VaultResult<Vec<u8>> {
    let signing_key = SigningKey::<Sha256>::new(private_key(private_der)?);
    let signature = signing_key
        .try_sign(data)
        .map_err(|err| VaultError::Cryptographic(format!("signing failed: {err}")))?;
    Ok(signature.to_vec())
}

/// True only when the signature is valid; malformed input of any kind is `false`.
pub(crate) fn verify(public_der: &[u8], data: &[u8], signature: &[u8]) -> bool {
    let Ok(public) = public_key(public_der) else {
        return false;
    };
    let Ok(signature) = Signature::try_from(signature) else {
        return false;
    };
    VerifyingKey::<Sha256>::new(public)
        .verify(data, &signature)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oaep_and_signatures_work_end_to_end() {
        let pair = generate(2048).unwrap();
        validate(&pair.public_der, &pair.private_der, 2048).unwrap();
        assert_eq!(max_plaintext_len(&pair.public_der).unwrap(), 190);

        let ciphertext = encrypt(&pair.public_der, b"reset token 8812").unwrap();
        assert_eq!(ciphertext.len(), 256);
        assert_eq!(decrypt(&pair.private_der, &ciphertext).unwrap(), b"reset token 8812");

        let signature = sign(&pair.private_der, b"grant=read").unwrap();
        assert_eq!(signature, sign(&pair.private_der, b"grant=read").unwrap());
        assert!(verify(&pair.public_der, b"grant=read", &signature));
        assert!(!verify(&pair.public_der, b"grant=write", &signature));
        assert!(!verify(&pair.public_der, b"grant=read", &signature[1..]));

        assert_eq!(
            encrypt(&pair.public_der, &[0u8; 191]).unwrap_err(),
            VaultError::PayloadTooLarge {
                max: 190,
                actual: 191
            }
        );
        assert!(validate(&pair.public_der, &pair.private_der, 4096).is_err());
        assert!(validate(&pair.public_der[1..], &pair.private_der, 2048).is_err());
    }
}
