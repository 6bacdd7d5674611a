//! ---
//! warden_section: "02-credential-auth"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Credential verification, tokens, sessions and role permissions."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use thiserror::Error;
use warden_common::ErrorKind;

use crate::token::TokenKind;

/// Errors raised while hashing or checking credentials.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// Stored hash is not a PHC string this hasher understands.
    #[error("stored credential hash is malformed")]
    MalformedHash,
    /// Argon2 rejected the configured cost parameters.
    #[error("invalid hashing parameters: {0}")]
    InvalidParameters(String),
    /// Hashing itself failed.
    #[error("credential hashing failed: {0}")]
    Hashing(String),
}

impl CredentialError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CredentialError::MalformedHash | CredentialError::InvalidParameters(_) => {
                ErrorKind::InputFailure
            }
            CredentialError::Hashing(_) => ErrorKind::SecurityFailure,
        }
    }
}

/// Token verification failures. Each cause is distinguishable; none yields claims.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Not three dot-separated segments, or a segment does not decode.
    #[error("token is malformed: {0}")]
    Malformed(String),
    /// MAC mismatch.
    #[error("token signature is invalid")]
    InvalidSignature,
    /// `now >= exp`.
    #[error("token has expired")]
    Expired,
    /// Header names an algorithm other than HS256.
    #[error("unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),
    /// Header names a different issuer.
    #[error("token issued by unknown issuer: {0}")]
    UnknownIssuer(String),
    /// An access token was presented where a refresh token is required, or vice versa.
    #[error("expected a {expected} token, found a {found} token")]
    WrongTokenKind {
        expected: TokenKind,
        found: TokenKind,
    },
    /// Claims could not be encoded or the MAC could not be keyed.
    #[error("token could not be produced: {0}")]
    Encoding(String),
}

impl TokenError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TokenError::Malformed(_) | TokenError::Encoding(_) => ErrorKind::InputFailure,
            TokenError::InvalidSignature
            | TokenError::Expired
            | TokenError::UnsupportedAlgorithm(_)
            | TokenError::UnknownIssuer(_)
            | TokenError::WrongTokenKind { .. } => ErrorKind::SecurityFailure,
        }
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            TokenError::Malformed(_) => "malformed",
            TokenError::InvalidSignature => "invalid_signature",
            TokenError::Expired => "expired",
            TokenError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            TokenError::UnknownIssuer(_) => "unknown_issuer",
            TokenError::WrongTokenKind { .. } => "wrong_token_kind",
            TokenError::Encoding(_) => "encoding",
        }
    }
}

/// Session lookup failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Unknown, removed or expired session. Expired sessions are indistinguishable from
    /// sessions that never existed.
    #[error("session not found")]
    NotFound,
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::NotFound
    }
}

/// Errors returned by [`crate::CredentialAuthenticator`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Username or secret did not match.
    #[error("invalid credentials")]
    InvalidCredentials,
    /// The principal is deactivated.
    #[error("principal is inactive: {0}")]
    PrincipalInactive(String),
    /// Too many consecutive failures; retry after `until`.
    #[error("account {username} is locked until {until}")]
    LockedOut {
        username: String,
        until: DateTime<Utc>,
    },
    /// Too many login attempts from one client address within the rate-limit window.
    #[error("too many login attempts from {0}")]
    RateLimited(String),
    /// Configuration rejected at construction.
    #[error("invalid authenticator configuration: {0}")]
    Configuration(String),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::InvalidCredentials
            | AuthError::PrincipalInactive(_)
            | AuthError::LockedOut { .. }
            | AuthError::RateLimited(_) => ErrorKind::SecurityFailure,
            AuthError::Configuration(_) => ErrorKind::InputFailure,
            AuthError::Credential(err) => err.kind(),
            AuthError::Token(err) => err.kind(),
            AuthError::Session(err) => err.kind(),
        }
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::PrincipalInactive(_) => "principal_inactive",
            AuthError::LockedOut { .. } => "locked_out",
            AuthError::RateLimited(_) => "rate_limited",
            AuthError::Configuration(_) => "configuration",
            AuthError::Credential(_) => "credential",
            AuthError::Token(err) => err.label(),
            AuthError::Session(_) => "session_not_found",
        }
    }
}

/// Result alias for authenticator operations.
pub type AuthResult<T> = Result<T, AuthError>;
