//! ---
//! warden_section: "15-testing-qa-runbook"
//! warden_subsection: "integration-tests"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Integration and validation tests for the Warden components."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration as StdDuration;

use warden_auth::{AuthError, CredentialAuthenticator, SessionData, TokenError};
use warden_common::{new_registry, AuthConfig, HashingConfig, PolicyConfig, Principal, VaultConfig, WardenMetrics};
use warden_keyvault::{KeyAlgorithm, KeyVault, VaultError};
use warden_policy::{
    AuditQuery, Effect, IpConstraints, MemoryAuditLogger, Policy, PolicyAuthorizer,
    RequestContext, Resource,
};

fn auth_config() -> AuthConfig {
    AuthConfig {
        token_secret: Some("integration-secret-integration-secret".into()),
        hashing: HashingConfig::minimal(),
        ..AuthConfig::default()
    }
}

#[tokio::test]
async fn end_to_end_access_control_flow() {
    let registry = new_registry();
    let metrics = WardenMetrics::new(registry.clone()).unwrap();

    // Credentials, session and token
    let auth = CredentialAuthenticator::new(&auth_config())
        .unwrap()
        .with_metrics(metrics.clone());
    let alice = Principal::new("u-alice", "alice")
        .with_role("editor")
        .with_attribute("department", "operations");
    let stored_hash = auth.hash_credential("Quarterly#2024").unwrap();
    let login = auth.login(&alice, "Quarterly#2024", &stored_hash).unwrap();
    let claims = auth.verify_token(&login.access_token).unwrap();
    assert_eq!(claims.sub, alice.id);
    let session = auth.get_session(&login.session.id).unwrap();

    // Role permissions
    let caller = claims.to_principal();
    assert!(auth.check_permission(&caller, "write"));
    assert!(!auth.check_permission(&caller, "delete"));

    // Attribute policies, evaluated with the principal resolved by the host
    let audit = Arc::new(MemoryAuditLogger::new());
    let authz = PolicyAuthorizer::new(&PolicyConfig::default(), audit.clone())
        .unwrap()
        .with_metrics(metrics.clone());
    authz
        .add_policy(
            Policy::new("ops-write", "Operations may edit contracts", Effect::Allow, 10)
                .require_principal_attribute("department", "operations")
                .require_resource_attribute("kind", "contract")
                .for_actions(["read", "write"]),
        )
        .unwrap();
    let contract = Resource::new("contract-881", "document")
        .owned_by("u-bob")
        .with_attribute("kind", "contract");
    let context = RequestContext::new().with_session(session.id.clone());
    let decision = authz.check_access(&alice, &contract, "write", &context);
    assert!(decision.granted);
    assert_eq!(decision.matched_policy_id.as_deref(), Some("ops-write"));
    assert!(!authz.check_access(&alice, &contract, "delete", &context).granted);

    // Encrypt the document body and sign the ciphertext
    let vault = KeyVault::new(&VaultConfig::default())
        .unwrap()
        .with_metrics(metrics);
    let data_key = vault.generate_default_symmetric_key("contracts").unwrap();
    let signer = vault.generate_default_key_pair("document signing").unwrap();
    let mut payload = vault.encrypt(b"renewal terms v3", &data_key.id).unwrap();
    vault.sign_payload(&mut payload, &signer.id).unwrap();
    assert!(vault.verify_payload(&payload, &signer.id).unwrap());
    assert_eq!(
        vault.decrypt(&payload, &data_key.id).unwrap(),
        b"renewal terms v3"
    );

    // Audit trail and metrics
    assert!(audit.verify());
    assert_eq!(audit.len(), 3);
    let denied = audit.query(&AuditQuery::new().by_actor("u-alice").with_action("access.denied"));
    assert_eq!(denied.len(), 1);
    assert_eq!(denied[0].metadata["request"]["action"], "delete");
    let families: Vec<_> = registry
        .gather()
        .into_iter()
        .map(|family| family.get_name().to_owned())
        .collect();
    for name in [
        "warden_auth_attempts_total",
        "warden_access_decisions_total",
        "warden_decision_cache_total",
        "warden_key_operations_total",
    ] {
        assert!(families.iter().any(|family| family == name), "missing {name}");
    }

    auth.logout(&login.session.id).unwrap();
    assert!(matches!(auth.get_session(&login.session.id), Err(AuthError::Session(_))));
}

#[test]
fn viewer_gains_write_when_promoted_to_admin() {
    let auth = CredentialAuthenticator::new(&auth_config()).unwrap();
    let mut principal = Principal::new("u-1", "viewer").with_role("viewer");
    assert!(!auth.check_permission(&principal, "write"));
    principal.roles.insert("admin".into());
    assert!(auth.check_permission(&principal, "write"));

    // Permissions always equal the union over the principal's roles.
    let expected: std::collections::BTreeSet<String> = principal
        .roles
        .iter()
        .filter_map(|role| auth.role_permissions(role))
        .flatten()
        .collect();
    assert_eq!(auth.get_user_permissions(&principal), expected);
    for permission in ["read", "write", "delete", "manage_users", "export"] {
        assert_eq!(
            auth.check_permission(&principal, permission),
            expected.contains(permission)
        );
    }
}

#[test]
fn blocked_address_is_denied_by_higher_priority_policy() {
    let authz = PolicyAuthorizer::new(
        &PolicyConfig::default(),
        Arc::new(MemoryAuditLogger::new()),
    )
    .unwrap();
    authz
        .add_policy(
            Policy::new("A", "Quarantine", Effect::Deny, 100).with_ip_constraints(IpConstraints {
                allowed: Vec::new(),
                blocked: vec!["10.0.0.5".parse().unwrap()],
            }),
        )
        .unwrap();
    authz
        .add_policy(Policy::new("B", "Baseline", Effect::Allow, 10))
        .unwrap();

    let principal = Principal::new("u-2", "clerk");
    let resource = Resource::new("report-4", "document");
    let from = |ip: &str| RequestContext::from_ip(ip.parse().unwrap());

    let denied = authz.check_access(&principal, &resource, "read", &from("10.0.0.5"));
    assert!(!denied.granted);
    assert_eq!(denied.matched_policy_id.as_deref(), Some("A"));

    for ip in ["10.0.0.4", "192.168.10.20", "::1"] {
        let allowed = authz.check_access(&principal, &resource, "read", &from(ip));
        assert!(allowed.granted, "{ip}");
        assert_eq!(allowed.matched_policy_id.as_deref(), Some("B"));
    }
    // No address: a block list alone cannot match, so the baseline allows.
    assert!(authz
        .check_access(&principal, &resource, "read", &RequestContext::new())
        .granted);
}

#[test]
fn rotation_keeps_history_readable() {
    let vault = KeyVault::new(&VaultConfig::default()).unwrap();
    let old = vault
        .generate_symmetric_key(KeyAlgorithm::Aes256Gcm, "document archive")
        .unwrap();
    let archived = vault.encrypt(b"2024-03 board minutes", &old.id).unwrap();

    let new = vault.rotate_key(&old.id).unwrap();
    assert_eq!(vault.decrypt(&archived, &old.id).unwrap(), b"2024-03 board minutes");
    assert_eq!(
        vault.encrypt(b"fresh", &old.id).unwrap_err(),
        VaultError::KeyInactive(old.id.clone())
    );
    let fresh = vault.encrypt(b"fresh", &new.id).unwrap();
    assert_eq!(vault.decrypt(&fresh, &new.id).unwrap(), b"fresh");
}

#[test]
fn token_failures_are_distinguishable() {
    let auth = CredentialAuthenticator::new(&auth_config()).unwrap();
    let principal = Principal::new("u-3", "analyst");
    let token = auth.issue_token(&principal).unwrap();

    let mut bytes = token.clone().into_bytes();
    bytes[5] ^= 0x01;
    let tampered = String::from_utf8(bytes).unwrap();
    assert_eq!(
        auth.verify_token(&tampered).unwrap_err(),
        AuthError::Token(TokenError::InvalidSignature)
    );
    assert!(matches!(
        auth.verify_token("not-a-token"),
        Err(AuthError::Token(TokenError::Malformed(_)))
    ));

    let short_lived = CredentialAuthenticator::new(&AuthConfig {
        access_token_ttl: StdDuration::from_secs(1),
        ..auth_config()
    })
    .unwrap();
    let expiring = short_lived.issue_token(&principal).unwrap();
    std::thread::sleep(StdDuration::from_millis(2100));
    assert_eq!(
        short_lived.verify_token(&expiring).unwrap_err(),
        AuthError::Token(TokenError::Expired)
    );
}

#[test]
fn sliding_sessions_outlive_their_original_expiry() {
    let auth = CredentialAuthenticator::new(&AuthConfig {
        session_timeout: StdDuration::from_millis(400),
        ..auth_config()
    })
    .unwrap();
    let principal = Principal::new("u-4", "reviewer");
    let session = auth.create_session(&principal, SessionData::new()).unwrap();

    std::thread::sleep(StdDuration::from_millis(250));
    auth.get_session(&session.id).unwrap();
    std::thread::sleep(StdDuration::from_millis(250));
    let renewed = auth.get_session(&session.id).unwrap();
    assert!(renewed.expires_at > session.expires_at);
    assert!(chrono::Utc::now() > session.expires_at);

    std::thread::sleep(StdDuration::from_millis(500));
    assert!(matches!(
        auth.get_session(&session.id),
        Err(AuthError::Session(_))
    ));
}
