//! ---
//! warden_section: "02-credential-auth"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Credential verification, tokens, sessions and role permissions."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
//! Credential authentication for Warden.
//! Argon2id credential hashing, HMAC-signed access/refresh tokens, server-side sessions with
//! sliding expiry, login lockout, per-address login rate limiting and the role to permission table.

pub mod authenticator;
pub mod credentials;
pub mod error;
pub mod lockout;
pub mod ratelimit;
pub mod rbac;
pub mod session;
pub mod token;

pub use authenticator::{CredentialAuthenticator, LoginOutcome};
pub use credentials::{assess_strength, CredentialHasher, StrengthReport};
pub use error::{AuthError, AuthResult, CredentialError, SessionError, TokenError};
pub use ratelimit::RateLimiter;
pub use rbac::{permissions, RolePermissionTable};
pub use session::{Session, SessionData, SessionStore};
pub use token::{Claims, TokenIssuer, TokenKind, VerifiedToken};
