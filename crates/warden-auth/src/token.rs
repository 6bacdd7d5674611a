//! ---
//! warden_section: "02-credential-auth"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Credential verification, tokens, sessions and role permissions."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
//! Compact HMAC-SHA256 signed tokens.
//!
//! Wire form: `base64url(header) "." base64url(claims) "." base64url(mac)`, unpadded. The MAC
//! covers the raw `header.claims` text exactly as received, so it is checked before either
//! segment is decoded.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::warn;
use warden_common::{AuthConfig, Principal};

use crate::error::TokenError;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";

/// Access tokens authorise requests; refresh tokens only mint new access tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    typ: TokenKind,
    iss: String,
}

/// Signed claims. Immutable once issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Principal id.
    pub sub: String,
    pub username: String,
    pub roles: Vec<String>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub iat: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub exp: DateTime<Utc>,
    /// Unique token id.
    pub jti: String,
}

impl Claims {
    /// Claims for `principal` valid for `ttl` from `now`.
    pub fn for_principal(principal: &Principal, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            sub: principal.id.clone(),
            username: principal.username.clone(),
            roles: principal.roles.iter().cloned().collect(),
            iat: now,
            exp: now + ttl,
            jti: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Principal view derived from the claims; attributes are not carried by tokens.
    pub fn to_principal(&self) -> Principal {
        self.roles
            .iter()
            .fold(Principal::new(self.sub.clone(), self.username.clone()), |p, role| {
                p.with_role(role.clone())
            })
    }
}

/// A token that passed signature, algorithm and expiry checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub kind: TokenKind,
    pub claims: Claims,
}

/// Issues and verifies tokens under one HMAC secret.
#[derive(Clone)]
pub struct TokenIssuer {
    secret: Vec<u8>,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Build from configuration. Without a configured secret a random one is generated, so
    /// tokens do not survive a restart.
    pub fn from_config(config: &AuthConfig) -> Result<Self, TokenError> {
        let secret = match &config.token_secret {
            Some(secret) => secret.as_bytes().to_vec(),
            None => {
                warn!("no token secret configured; using an ephemeral per-process secret");
                let mut secret = vec![0u8; 32];
                OsRng.fill_bytes(&mut secret);
                secret
            }
        };
        let access_ttl = Duration::from_std(config.access_token_ttl)
            .map_err(|err| TokenError::Encoding(format!("access token ttl: {err}")))?;
        let refresh_ttl = Duration::from_std(config.refresh_token_ttl)
            .map_err(|err| TokenError::Encoding(format!("refresh token ttl: {err}")))?;
        Ok(Self {
            secret,
            issuer: config.token_issuer.clone(),
            access_ttl,
            refresh_ttl,
        })
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|err| TokenError::Encoding(format!("hmac key: {err}")))
    }

    /// Issue a token of `kind` for `principal` using the configured lifetime.
    pub fn issue(&self, principal: &Principal, kind: TokenKind) -> Result<String, TokenError> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        self.sign_claims(&Claims::for_principal(principal, Utc::now(), ttl), kind)
    }

    /// Sign arbitrary claims. Expiry is not checked here.
    pub fn sign_claims(&self, claims: &Claims, kind: TokenKind) -> Result<String, TokenError> {
        let header = TokenHeader {
            alg: ALGORITHM.to_owned(),
            typ: kind,
            iss: self.issuer.clone(),
        };
        let header = serde_json::to_vec(&header)
            .map_err(|err| TokenError::Encoding(err.to_string()))?;
        let payload =
            serde_json::to_vec(claims).map_err(|err| TokenError::Encoding(err.to_string()))?;
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(payload)
        );
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{signing_input}.{signature}"))
    }

    /// Verify a token of either kind at the current time.
    pub fn verify(&self, token: &str) -> Result<VerifiedToken, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a token as of `now`.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<VerifiedToken, TokenError> {
        let segments: Vec<&str> = token.split('.').collect();
        let [header_b64, payload_b64, signature_b64] = segments.as_slice() else {
            // A lost or extra separator means the signature no longer covers the input.
            return Err(match segments.len() {
                2 | 4 => TokenError::InvalidSignature,
                count => TokenError::Malformed(format!("expected 3 segments, found {count}")),
            });
        };

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenError::InvalidSignature)?;
        let mut mac = self.mac()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(payload_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let header: TokenHeader = decode_segment(header_b64, "header")?;
        if header.alg != ALGORITHM {
            return Err(TokenError::UnsupportedAlgorithm(header.alg));
        }
        if header.iss != self.issuer {
            return Err(TokenError::UnknownIssuer(header.iss));
        }
        let claims: Claims = decode_segment(payload_b64, "claims")?;
        if now >= claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(VerifiedToken {
            kind: header.typ,
            claims,
        })
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(
    segment: &str,
    name: &str,
) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::Malformed(format!("{name} is not base64url")))?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed(format!("{name} is not valid")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::from_config(&AuthConfig {
            token_secret: Some("0123456789abcdef0123456789abcdef".into()),
            ..AuthConfig::default()
        })
        .unwrap()
    }

    fn principal() -> Principal {
        Principal::new("p-7", "operator").with_role("viewer").with_role("editor")
    }

    #[test]
    fn issued_tokens_verify_with_exact_claims() {
        let issuer = issuer();
        let token = issuer.issue(&principal(), TokenKind::Access).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let verified = issuer.verify(&token).unwrap();
        assert_eq!(verified.kind, TokenKind::Access);
        assert_eq!(verified.claims.sub, "p-7");
        assert_eq!(verified.claims.username, "operator");
        assert_eq!(verified.claims.roles, vec!["editor".to_owned(), "viewer".to_owned()]);
        assert_eq!(
            verified.claims.exp - verified.claims.iat,
            Duration::hours(24)
        );

        let payload = token.split('.').nth(1).unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap();
        let mut fields: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        fields.sort();
        assert_eq!(fields, ["exp", "iat", "jti", "roles", "sub", "username"]);
    }

    #[test]
    fn refresh_tokens_live_longer() {
        let issuer = issuer();
        let verified = issuer
            .verify(&issuer.issue(&principal(), TokenKind::Refresh).unwrap())
            .unwrap();
        assert_eq!(verified.kind, TokenKind::Refresh);
        assert_eq!(verified.claims.exp - verified.claims.iat, Duration::days(7));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let issuer = issuer();
        let now = Utc::now();
        let mut claims = Claims::for_principal(&principal(), now, Duration::hours(1));
        claims.iat = now - Duration::hours(2);
        claims.exp = now - Duration::seconds(1);
        let token = issuer.sign_claims(&claims, TokenKind::Access).unwrap();
        assert_eq!(issuer.verify(&token).unwrap_err(), TokenError::Expired);

        let fresh = issuer.issue(&principal(), TokenKind::Access).unwrap();
        let exp = issuer.verify(&fresh).unwrap().claims.exp;
        assert_eq!(issuer.verify_at(&fresh, exp).unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn any_flipped_byte_fails_signature() {
        let issuer = issuer();
        let token = issuer.issue(&principal(), TokenKind::Access).unwrap();
        for index in 0..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[index] ^= 0x01;
            let tampered = String::from_utf8(bytes).unwrap();
            assert_eq!(
                issuer.verify(&tampered).unwrap_err(),
                TokenError::InvalidSignature,
                "index {index}"
            );
        }
    }

    #[test]
    fn structure_is_checked_first() {
        let issuer = issuer();
        assert!(matches!(issuer.verify("abc"), Err(TokenError::Malformed(_))));
        assert!(matches!(issuer.verify("a.b.c.d.e"), Err(TokenError::Malformed(_))));
        assert!(matches!(issuer.verify(""), Err(TokenError::Malformed(_))));
    }

    #[test]
    fn moved_separators_fail_signature() {
        let issuer = issuer();
        let token = issuer.issue(&principal(), TokenKind::Access).unwrap();
        let merged = token.replacen('.', "/", 1);
        let split = format!("{}.{}", &token[..10], &token[10..]);
        for tampered in [merged, split, "a.b".to_owned(), "a.b.c.d".to_owned()] {
            assert_eq!(
                issuer.verify(&tampered).unwrap_err(),
                TokenError::InvalidSignature,
                "{tampered}"
            );
        }
    }

    #[test]
    fn signed_garbage_is_malformed() {
        let issuer = issuer();
        let input = format!("{}.{}", URL_SAFE_NO_PAD.encode(b"{}"), URL_SAFE_NO_PAD.encode(b"x"));
        let mut mac = issuer.mac().unwrap();
        mac.update(input.as_bytes());
        let token = format!("{input}.{}", URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()));
        assert!(matches!(issuer.verify(&token), Err(TokenError::Malformed(_))));
    }

    #[test]
    fn other_secrets_and_issuers_are_rejected() {
        let token = issuer().issue(&principal(), TokenKind::Access).unwrap();
        let stranger = TokenIssuer::from_config(&AuthConfig::default()).unwrap();
        assert_eq!(stranger.verify(&token).unwrap_err(), TokenError::InvalidSignature);

        let renamed = TokenIssuer::from_config(&AuthConfig {
            token_secret: Some("0123456789abcdef0123456789abcdef".into()),
            token_issuer: "other".into(),
            ..AuthConfig::default()
        })
        .unwrap();
        assert_eq!(
            renamed.verify(&token).unwrap_err(),
            TokenError::UnknownIssuer("warden".into())
        );
    }

    #[test]
    fn claims_round_trip_to_principal() {
        let claims = Claims::for_principal(&principal(), Utc::now(), Duration::minutes(5));
        let view = claims.to_principal();
        assert_eq!(view.id, "p-7");
        assert!(view.has_role("editor"));
        assert!(view.active);
    }
}
