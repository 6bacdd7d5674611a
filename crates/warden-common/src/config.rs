//! ---
//! warden_section: "01-core-functionality"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Shared primitives for the identity and access components."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

const MIN_TOKEN_SECRET_LEN: usize = 32;

fn default_token_issuer() -> String {
    "warden".to_owned()
}

fn default_access_token_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_refresh_token_ttl() -> Duration {
    Duration::from_secs(7 * 24 * 60 * 60)
}

fn default_session_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_hash_memory_kib() -> u32 {
    19_456
}

fn default_hash_iterations() -> u32 {
    2
}

fn default_hash_parallelism() -> u32 {
    1
}

fn default_max_failed_attempts() -> u32 {
    5
}

fn default_lockout_duration() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_login_rate_limit() -> u32 {
    100
}

fn default_login_rate_window() -> Duration {
    Duration::from_secs(60)
}

fn default_decision_cache_ttl() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_true() -> bool {
    true
}

fn default_symmetric_algorithm() -> String {
    "AES-256-GCM".to_owned()
}

fn default_asymmetric_algorithm() -> String {
    "RSA-2048".to_owned()
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Top-level configuration handed to the host when it constructs the components.
///
/// Nothing here is read from process-wide state; each component receives its own section
/// at construction time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WardenConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub vault: VaultConfig,
}

impl WardenConfig {
    /// Environment variable carrying the token signing secret.
    pub const ENV_TOKEN_SECRET: &'static str = "WARDEN_TOKEN_SECRET";

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: WardenConfig =
            toml::from_str(content).with_context(|| "failed to parse warden configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Replace values that may be supplied through the environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(secret) = std::env::var(Self::ENV_TOKEN_SECRET) {
            if !secret.trim().is_empty() {
                debug!(
                    variable = Self::ENV_TOKEN_SECRET,
                    "token secret supplied via environment"
                );
                self.auth.token_secret = Some(secret);
            }
        }
        self.validate()
    }

    /// Validate structural invariants across every section.
    pub fn validate(&self) -> Result<()> {
        self.auth.validate()?;
        self.policy.validate()?;
        self.vault.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for WardenConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_toml(content)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    /// Filter directive used when neither `WARDEN_LOG` nor `RUST_LOG` is set.
    #[serde(default)]
    pub default_filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            default_filter: None,
        }
    }
}

/// Credential, token and session settings.
#[serde_as]
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for token signatures. A random per-process secret is generated when unset.
    #[serde(default, skip_serializing)]
    pub token_secret: Option<String>,
    #[serde(default = "default_token_issuer")]
    pub token_issuer: String,
    #[serde(default = "default_access_token_ttl")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub access_token_ttl: Duration,
    #[serde(default = "default_refresh_token_ttl")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub refresh_token_ttl: Duration,
    #[serde(default = "default_session_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub session_timeout: Duration,
    #[serde(default)]
    pub hashing: HashingConfig,
    #[serde(default)]
    pub lockout: LockoutConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token_secret", &self.token_secret.as_ref().map(|_| "<redacted>"))
            .field("token_issuer", &self.token_issuer)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("session_timeout", &self.session_timeout)
            .field("hashing", &self.hashing)
            .field("lockout", &self.lockout)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: None,
            token_issuer: default_token_issuer(),
            access_token_ttl: default_access_token_ttl(),
            refresh_token_ttl: default_refresh_token_ttl(),
            session_timeout: default_session_timeout(),
            hashing: HashingConfig::default(),
            lockout: LockoutConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl AuthConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(secret) = &self.token_secret {
            if secret.len() < MIN_TOKEN_SECRET_LEN {
                return Err(anyhow!(
                    "auth.token_secret must be at least {MIN_TOKEN_SECRET_LEN} bytes"
                ));
            }
        }
        if self.access_token_ttl.is_zero() {
            return Err(anyhow!("auth.access_token_ttl must be greater than zero"));
        }
        if self.refresh_token_ttl < self.access_token_ttl {
            return Err(anyhow!(
                "auth.refresh_token_ttl must not be shorter than auth.access_token_ttl"
            ));
        }
        if self.session_timeout.is_zero() {
            return Err(anyhow!("auth.session_timeout must be greater than zero"));
        }
        self.hashing.validate()?;
        self.lockout.validate()?;
        self.rate_limit.validate()?;
        Ok(())
    }
}

/// Argon2id cost factors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HashingConfig {
    #[serde(default = "default_hash_memory_kib")]
    pub memory_kib: u32,
    #[serde(default = "default_hash_iterations")]
    pub iterations: u32,
    #[serde(default = "default_hash_parallelism")]
    pub parallelism: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: default_hash_memory_kib(),
            iterations: default_hash_iterations(),
            parallelism: default_hash_parallelism(),
        }
    }
}

impl HashingConfig {
    /// Cheapest parameters Argon2 accepts. Only meant for tests.
    pub fn minimal() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(anyhow!("auth.hashing.iterations must be at least 1"));
        }
        if self.parallelism == 0 {
            return Err(anyhow!("auth.hashing.parallelism must be at least 1"));
        }
        if self.memory_kib < 8 * self.parallelism {
            return Err(anyhow!(
                "auth.hashing.memory_kib must be at least 8 * parallelism ({})",
                8 * self.parallelism
            ));
        }
        Ok(())
    }
}

/// Repeated-failure lockout applied by the login flow.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockoutConfig {
    #[serde(default = "default_max_failed_attempts")]
    pub max_failed_attempts: u32,
    #[serde(default = "default_lockout_duration")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub lockout_duration: Duration,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: default_max_failed_attempts(),
            lockout_duration: default_lockout_duration(),
        }
    }
}

impl LockoutConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_failed_attempts == 0 {
            return Err(anyhow!("auth.lockout.max_failed_attempts must be at least 1"));
        }
        Ok(())
    }
}

/// Login attempts admitted per client address within a sliding window.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_login_rate_limit")]
    pub max_requests: u32,
    #[serde(default = "default_login_rate_window")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_login_rate_limit(),
            window: default_login_rate_window(),
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_requests == 0 {
            return Err(anyhow!("auth.rate_limit.max_requests must be at least 1"));
        }
        if self.window.is_zero() {
            return Err(anyhow!("auth.rate_limit.window must be greater than zero"));
        }
        Ok(())
    }
}

/// Decision cache settings for the policy authorizer.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_decision_cache_ttl")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub decision_cache_ttl: Duration,
    #[serde(default = "default_true")]
    pub decision_cache_enabled: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            decision_cache_ttl: default_decision_cache_ttl(),
            decision_cache_enabled: true,
        }
    }
}

impl PolicyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.decision_cache_enabled && self.decision_cache_ttl.is_zero() {
            return Err(anyhow!(
                "policy.decision_cache_ttl must be greater than zero when caching is enabled"
            ));
        }
        Ok(())
    }
}

/// Key generation defaults.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default = "default_symmetric_algorithm")]
    pub default_symmetric_algorithm: String,
    #[serde(default = "default_asymmetric_algorithm")]
    pub default_asymmetric_algorithm: String,
    /// Lifetime applied to newly generated keys. Keys never expire when unset.
    #[serde(default)]
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    pub key_ttl: Option<Duration>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            default_symmetric_algorithm: default_symmetric_algorithm(),
            default_asymmetric_algorithm: default_asymmetric_algorithm(),
            key_ttl: None,
        }
    }
}

impl VaultConfig {
    pub fn validate(&self) -> Result<()> {
        if self.key_ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(anyhow!("vault.key_ttl must be greater than zero when set"));
        }
        Ok(())
    }
}
