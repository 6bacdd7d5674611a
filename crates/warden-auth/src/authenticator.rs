//! ---
//! warden_section: "02-credential-auth"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Credential verification, tokens, sessions and role permissions."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use std::collections::BTreeSet;
use std::net::IpAddr;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use warden_common::{log_security_event, AuthConfig, Principal, SecurityOutcome, WardenMetrics};

use crate::credentials::{assess_strength, CredentialHasher, StrengthReport};
use crate::error::{AuthError, AuthResult, TokenError};
use crate::lockout::LockoutTracker;
use crate::ratelimit::RateLimiter;
use crate::rbac::RolePermissionTable;
use crate::session::{id_prefix, Session, SessionData, SessionStore};
use crate::token::{Claims, TokenIssuer, TokenKind};

/// Result of a successful [`CredentialAuthenticator::login`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginOutcome {
    pub session: Session,
    pub access_token: String,
    pub refresh_token: String,
}

/// Credential verification, token issuance, sessions and role permissions.
///
/// Cloning shares the session store, role table, lockout and rate-limit state.
#[derive(Debug, Clone)]
pub struct CredentialAuthenticator {
    hasher: CredentialHasher,
    tokens: TokenIssuer,
    sessions: SessionStore,
    roles: RolePermissionTable,
    lockout: LockoutTracker,
    login_limiter: RateLimiter,
    metrics: Option<WardenMetrics>,
}

fn login_rate_key(client_address: IpAddr) -> String {
    format!("login:{client_address}")
}

fn to_chrono(value: std::time::Duration, field: &str) -> AuthResult<Duration> {
    Duration::from_std(value)
        .map_err(|err| AuthError::Configuration(format!("{field} out of range: {err}")))
}

impl CredentialAuthenticator {
    /// Build from validated configuration with the default role table.
    pub fn new(config: &AuthConfig) -> AuthResult<Self> {
        Self::with_roles(config, RolePermissionTable::default())
    }

    /// Build with a caller-supplied role table.
    pub fn with_roles(config: &AuthConfig, roles: RolePermissionTable) -> AuthResult<Self> {
        config
            .validate()
            .map_err(|err| AuthError::Configuration(format!("{err:#}")))?;
        Ok(Self {
            hasher: CredentialHasher::new(&config.hashing)?,
            tokens: TokenIssuer::from_config(config)?,
            sessions: SessionStore::new(to_chrono(config.session_timeout, "session_timeout")?),
            roles,
            lockout: LockoutTracker::new(
                config.lockout.max_failed_attempts,
                to_chrono(config.lockout.lockout_duration, "lockout_duration")?,
            ),
            login_limiter: RateLimiter::new(
                config.rate_limit.max_requests,
                to_chrono(config.rate_limit.window, "rate_limit.window")?,
            ),
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: WardenMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn observe<T>(&self, operation: &str, result: AuthResult<T>) -> AuthResult<T> {
        if let Some(metrics) = &self.metrics {
            metrics.inc_auth_attempt(operation);
            if let Err(err) = &result {
                metrics.inc_auth_failure(operation, err.label());
            }
        }
        result
    }

    // Credentials

    pub fn hash_credential(&self, secret: &str) -> AuthResult<String> {
        Ok(self.hasher.hash(secret)?)
    }

    /// `Ok(false)` on mismatch; errors only for an unusable stored hash.
    pub fn verify_credential(&self, secret: &str, hash: &str) -> AuthResult<bool> {
        let result = self.hasher.verify(secret, hash).map_err(AuthError::from);
        self.observe("verify_credential", result)
    }

    pub fn assess_credential_strength(&self, secret: &str) -> StrengthReport {
        assess_strength(secret)
    }

    /// Verify `secret` against `stored_hash` for `principal`, then open a session and issue an
    /// access/refresh token pair.
    pub fn login(
        &self,
        principal: &Principal,
        secret: &str,
        stored_hash: &str,
    ) -> AuthResult<LoginOutcome> {
        self.login_from(principal, secret, stored_hash, None)
    }

    /// [`Self::login`] on behalf of a client. Every attempt from `client_address` counts
    /// against the login rate limit, whatever its outcome; attempts over the limit are
    /// rejected before any credential check.
    pub fn login_from(
        &self,
        principal: &Principal,
        secret: &str,
        stored_hash: &str,
        client_address: Option<IpAddr>,
    ) -> AuthResult<LoginOutcome> {
        let result = self.login_inner(principal, secret, stored_hash, client_address);
        match &result {
            Ok(outcome) => log_security_event(
                "login",
                SecurityOutcome::Success,
                &principal.id,
                &format!("session {} opened", id_prefix(&outcome.session.id)),
            ),
            Err(err) => log_security_event(
                "login",
                SecurityOutcome::Denied,
                &principal.id,
                &err.to_string(),
            ),
        }
        self.observe("login", result)
    }

    fn login_inner(
        &self,
        principal: &Principal,
        secret: &str,
        stored_hash: &str,
        client_address: Option<IpAddr>,
    ) -> AuthResult<LoginOutcome> {
        let now = Utc::now();
        if let Some(address) = client_address {
            if !self.login_limiter.is_allowed(&login_rate_key(address), now) {
                warn!(
                    principal_id = %principal.id,
                    client = %address,
                    "login rate limit exceeded"
                );
                return Err(AuthError::RateLimited(address.to_string()));
            }
        }
        if !principal.active {
            return Err(AuthError::PrincipalInactive(principal.id.clone()));
        }
        if let Some(until) = self.lockout.locked_until(&principal.username, now) {
            return Err(AuthError::LockedOut {
                username: principal.username.clone(),
                until,
            });
        }
        if !self.hasher.verify(secret, stored_hash)? {
            if let Some(until) = self.lockout.record_failure(&principal.username, now) {
                warn!(
                    principal_id = %principal.id,
                    until = %until,
                    "too many failed logins; account locked"
                );
            }
            return Err(AuthError::InvalidCredentials);
        }
        self.lockout.record_success(&principal.username);

        let access_token = self.tokens.issue(principal, TokenKind::Access)?;
        let refresh_token = self.tokens.issue(principal, TokenKind::Refresh)?;
        let session = self.sessions.create(&principal.id, SessionData::new());
        Ok(LoginOutcome {
            session,
            access_token,
            refresh_token,
        })
    }

    /// Consecutive failed logins that still count towards a lock for `username`.
    pub fn failed_login_attempts(&self, username: &str) -> u32 {
        self.lockout.failed_attempts(username, Utc::now())
    }

    /// Login attempts `client_address` may still make in the current window.
    pub fn remaining_login_attempts(&self, client_address: IpAddr) -> u32 {
        self.login_limiter
            .remaining_requests(&login_rate_key(client_address), Utc::now())
    }

    /// Forget lockout and rate-limit state that no longer affects any login.
    pub fn cleanup_login_state(&self) -> usize {
        let now = Utc::now();
        self.lockout.prune(now) + self.login_limiter.prune(now)
    }

    // Tokens

    pub fn issue_token(&self, principal: &Principal) -> AuthResult<String> {
        self.issue(principal, TokenKind::Access)
    }

    pub fn issue_refresh_token(&self, principal: &Principal) -> AuthResult<String> {
        self.issue(principal, TokenKind::Refresh)
    }

    fn issue(&self, principal: &Principal, kind: TokenKind) -> AuthResult<String> {
        if !principal.active {
            return Err(AuthError::PrincipalInactive(principal.id.clone()));
        }
        let token = self.tokens.issue(principal, kind)?;
        debug!(principal_id = %principal.id, kind = %kind, "token issued");
        Ok(token)
    }

    /// Verify an access or refresh token and return its claims.
    pub fn verify_token(&self, token: &str) -> AuthResult<Claims> {
        let result = self
            .tokens
            .verify(token)
            .map(|verified| verified.claims)
            .map_err(AuthError::from);
        if let Err(err) = &result {
            warn!(reason = err.label(), "token rejected");
        }
        self.observe("verify_token", result)
    }

    /// Mint a new access token from a refresh token. The refresh token stays valid until
    /// its own expiry.
    pub fn refresh_token(&self, refresh_token: &str) -> AuthResult<String> {
        let result = (|| {
            let verified = self.tokens.verify(refresh_token)?;
            if verified.kind != TokenKind::Refresh {
                return Err(AuthError::from(TokenError::WrongTokenKind {
                    expected: TokenKind::Refresh,
                    found: verified.kind,
                }));
            }
            let principal = verified.claims.to_principal();
            let token = self.tokens.issue(&principal, TokenKind::Access)?;
            debug!(principal_id = %principal.id, "access token refreshed");
            Ok(token)
        })();
        if let Err(err) = &result {
            warn!(reason = err.label(), "refresh rejected");
        }
        self.observe("refresh_token", result)
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    // Sessions

    pub fn create_session(&self, principal: &Principal, data: SessionData) -> AuthResult<Session> {
        if !principal.active {
            return Err(AuthError::PrincipalInactive(principal.id.clone()));
        }
        Ok(self.sessions.create(&principal.id, data))
    }

    /// Live session lookup; extends the session's expiry.
    pub fn get_session(&self, session_id: &str) -> AuthResult<Session> {
        let result = self.sessions.get(session_id).map_err(AuthError::from);
        self.observe("get_session", result)
    }

    pub fn update_session_data(&self, session_id: &str, data: SessionData) -> AuthResult<Session> {
        Ok(self.sessions.update_data(session_id, data)?)
    }

    pub fn remove_session(&self, session_id: &str) -> AuthResult<Session> {
        Ok(self.sessions.remove(session_id)?)
    }

    pub fn logout(&self, session_id: &str) -> AuthResult<()> {
        let session = self.remove_session(session_id)?;
        log_security_event(
            "logout",
            SecurityOutcome::Success,
            &session.principal_id,
            "session closed",
        );
        Ok(())
    }

    pub fn remove_sessions_for_principal(&self, principal_id: &str) -> usize {
        self.sessions.remove_for_principal(principal_id)
    }

    pub fn cleanup_expired_sessions(&self) -> usize {
        self.sessions.cleanup_expired()
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.active_count()
    }

    // Permissions

    pub fn check_permission(&self, principal: &Principal, permission: &str) -> bool {
        self.roles.check_permission(principal, permission)
    }

    pub fn get_user_permissions(&self, principal: &Principal) -> BTreeSet<String> {
        self.roles.user_permissions(principal)
    }

    pub fn add_role_permission(&self, role: &str, permission: &str) -> bool {
        self.roles.add_role_permission(role, permission)
    }

    pub fn remove_role_permission(&self, role: &str, permission: &str) -> bool {
        self.roles.remove_role_permission(role, permission)
    }

    pub fn list_roles(&self) -> Vec<String> {
        self.roles.list_roles()
    }

    pub fn role_permissions(&self, role: &str) -> Option<BTreeSet<String>> {
        self.roles.role_permissions(role)
    }

    pub fn roles(&self) -> &RolePermissionTable {
        &self.roles
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use warden_common::{ErrorKind, HashingConfig, LockoutConfig, RateLimitConfig};

    use super::*;
    use crate::error::SessionError;

    fn config() -> AuthConfig {
        AuthConfig {
            token_secret: Some("test-secret-test-secret-test-secret".into()),
            hashing: HashingConfig::minimal(),
            lockout: LockoutConfig {
                max_failed_attempts: 3,
                lockout_duration: StdDuration::from_secs(60),
            },
            ..AuthConfig::default()
        }
    }

    fn authenticator() -> CredentialAuthenticator {
        CredentialAuthenticator::new(&config()).unwrap()
    }

    #[test]
    fn rejects_invalid_configuration() {
        let err = CredentialAuthenticator::new(&AuthConfig {
            token_secret: Some("short".into()),
            ..config()
        })
        .unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
        assert_eq!(err.kind(), ErrorKind::InputFailure);
    }

    #[test]
    fn login_issues_session_and_tokens() {
        let auth = authenticator();
        let principal = Principal::new("p-1", "reviewer").with_role("editor");
        let hash = auth.hash_credential("Ledger#42-Review").unwrap();

        let outcome = auth.login(&principal, "Ledger#42-Review", &hash).unwrap();
        assert_eq!(outcome.session.principal_id, "p-1");
        assert_eq!(auth.get_session(&outcome.session.id).unwrap().principal_id, "p-1");

        let claims = auth.verify_token(&outcome.access_token).unwrap();
        assert_eq!(claims.sub, "p-1");
        assert_eq!(claims.roles, vec!["editor".to_owned()]);

        let refreshed = auth.refresh_token(&outcome.refresh_token).unwrap();
        assert_eq!(auth.verify_token(&refreshed).unwrap().username, "reviewer");
        // Not rotated: the same refresh token keeps working.
        assert!(auth.refresh_token(&outcome.refresh_token).is_ok());

        auth.logout(&outcome.session.id).unwrap();
        assert_eq!(
            auth.get_session(&outcome.session.id).unwrap_err(),
            AuthError::Session(SessionError::NotFound)
        );
    }

    #[test]
    fn wrong_secret_and_lockout() {
        let auth = authenticator();
        let principal = Principal::new("p-2", "copy-editor");
        let hash = auth.hash_credential("Right#Secret9").unwrap();

        for _ in 0..2 {
            assert_eq!(
                auth.login(&principal, "wrong", &hash).unwrap_err(),
                AuthError::InvalidCredentials
            );
        }
        assert_eq!(auth.failed_login_attempts("copy-editor"), 2);
        auth.login(&principal, "wrong", &hash).unwrap_err();

        let err = auth.login(&principal, "Right#Secret9", &hash).unwrap_err();
        assert!(matches!(err, AuthError::LockedOut { .. }));
        assert_eq!(err.kind(), ErrorKind::SecurityFailure);
        assert_eq!(auth.active_session_count(), 0);
    }

    #[test]
    fn login_attempts_are_limited_per_client_address() {
        let auth = CredentialAuthenticator::new(&AuthConfig {
            rate_limit: RateLimitConfig {
                max_requests: 2,
                window: StdDuration::from_secs(60),
            },
            ..config()
        })
        .unwrap();
        let principal = Principal::new("p-9", "archivist");
        let hash = auth.hash_credential("Shelf#Index-12").unwrap();
        let kiosk: IpAddr = "10.20.0.7".parse().unwrap();
        let office: IpAddr = "10.20.0.8".parse().unwrap();

        assert_eq!(auth.remaining_login_attempts(kiosk), 2);
        auth.login_from(&principal, "wrong", &hash, Some(kiosk)).unwrap_err();
        auth.login_from(&principal, "Shelf#Index-12", &hash, Some(kiosk)).unwrap();
        assert_eq!(auth.remaining_login_attempts(kiosk), 0);

        let err = auth
            .login_from(&principal, "wrong", &hash, Some(kiosk))
            .unwrap_err();
        assert_eq!(err, AuthError::RateLimited("10.20.0.7".into()));
        assert_eq!(err.kind(), ErrorKind::SecurityFailure);
        assert_eq!(err.label(), "rate_limited");
        // The rejected attempt never reached the credential check.
        assert_eq!(auth.failed_login_attempts("archivist"), 0);

        assert!(auth.login_from(&principal, "Shelf#Index-12", &hash, Some(office)).is_ok());
        assert!(auth.login(&principal, "Shelf#Index-12", &hash).is_ok());
        assert_eq!(auth.active_session_count(), 3);
        assert_eq!(auth.cleanup_login_state(), 0);
    }

    #[test]
    fn success_clears_failure_count() {
        let auth = authenticator();
        let principal = Principal::new("p-3", "planner");
        let hash = auth.hash_credential("Plan#Ahead77").unwrap();
        auth.login(&principal, "nope", &hash).unwrap_err();
        auth.login(&principal, "Plan#Ahead77", &hash).unwrap();
        assert_eq!(auth.failed_login_attempts("planner"), 0);
    }

    #[test]
    fn inactive_principals_cannot_authenticate() {
        let auth = authenticator();
        let principal = Principal::new("p-4", "retired").deactivated();
        let hash = auth.hash_credential("Old#Secret1").unwrap();
        assert_eq!(
            auth.login(&principal, "Old#Secret1", &hash).unwrap_err(),
            AuthError::PrincipalInactive("p-4".into())
        );
        assert!(auth.issue_token(&principal).is_err());
        assert!(auth.create_session(&principal, SessionData::new()).is_err());
    }

    #[test]
    fn access_tokens_cannot_refresh() {
        let auth = authenticator();
        let principal = Principal::new("p-5", "analyst");
        let access = auth.issue_token(&principal).unwrap();
        let err = auth.refresh_token(&access).unwrap_err();
        assert_eq!(
            err,
            AuthError::Token(TokenError::WrongTokenKind {
                expected: TokenKind::Refresh,
                found: TokenKind::Access,
            })
        );
        assert_eq!(err.kind(), ErrorKind::SecurityFailure);
    }

    #[test]
    fn expired_and_tampered_tokens_are_distinguished() {
        let auth = authenticator();
        let principal = Principal::new("p-6", "auditor");
        let now = Utc::now();
        let mut claims = Claims::for_principal(&principal, now, Duration::hours(1));
        claims.exp = now - Duration::seconds(5);
        let expired = auth.tokens().sign_claims(&claims, TokenKind::Access).unwrap();
        assert_eq!(
            auth.verify_token(&expired).unwrap_err(),
            AuthError::Token(TokenError::Expired)
        );

        let token = auth.issue_token(&principal).unwrap();
        let mut bytes = token.into_bytes();
        let middle = bytes.len() / 2;
        bytes[middle] ^= 0x01;
        let tampered = String::from_utf8(bytes).unwrap();
        assert_eq!(
            auth.verify_token(&tampered).unwrap_err(),
            AuthError::Token(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn role_scenario() {
        let auth = authenticator();
        let mut principal = Principal::new("p-7", "newcomer").with_role("viewer");
        assert!(auth.check_permission(&principal, "read"));
        assert!(!auth.check_permission(&principal, "write"));
        principal.roles.insert("admin".into());
        assert!(auth.check_permission(&principal, "write"));
        assert!(auth.get_user_permissions(&principal).contains("manage_users"));

        assert!(auth.add_role_permission("viewer", "export"));
        assert!(auth.role_permissions("viewer").unwrap().contains("export"));
        assert!(auth.remove_role_permission("viewer", "export"));
        assert_eq!(auth.list_roles().len(), 3);
    }

    #[test]
    fn session_housekeeping() {
        let auth = CredentialAuthenticator::new(&AuthConfig {
            session_timeout: StdDuration::from_millis(200),
            ..config()
        })
        .unwrap();
        let principal = Principal::new("p-8", "desk-editor");
        let first = auth.create_session(&principal, SessionData::new()).unwrap();
        auth.create_session(&principal, SessionData::new()).unwrap();
        assert_eq!(auth.active_session_count(), 2);

        let mut data = SessionData::new();
        data.insert("console".into(), serde_json::json!(3));
        let updated = auth.update_session_data(&first.id, data).unwrap();
        assert_eq!(updated.data["console"], serde_json::json!(3));

        std::thread::sleep(StdDuration::from_millis(300));
        assert_eq!(auth.active_session_count(), 0);
        assert_eq!(auth.cleanup_expired_sessions(), 2);

        auth.create_session(&principal, SessionData::new()).unwrap();
        assert_eq!(auth.remove_sessions_for_principal("p-8"), 1);
    }

    #[test]
    fn metrics_count_failures() {
        let registry = warden_common::new_registry();
        let auth = authenticator().with_metrics(WardenMetrics::new(registry.clone()).unwrap());
        auth.verify_token("garbage").unwrap_err();
        let failures = registry
            .gather()
            .into_iter()
            .find(|family| family.get_name() == "warden_auth_failures_total")
            .unwrap();
        let metric = &failures.get_metric()[0];
        assert!(metric
            .get_label()
            .iter()
            .any(|label| label.get_value() == "malformed"));
    }
}
