//! ---
//! warden_section: "01-core-functionality"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Shared primitives for the identity and access components."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "WARDEN_LOG";
const DEFAULT_FILTER: &str = "info";

static STDOUT_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Available log formats.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// Install a tracing subscriber for hosts that do not bring their own.
///
/// * `WARDEN_LOG` overrides the filter (e.g. `info`, `warden_policy=debug`). When unset the
///   standard `RUST_LOG` variable is honoured, then `LoggingConfig::default_filter`,
///   finally `info`.
/// * Output goes to a non-blocking stdout writer; the core never writes log files.
///
/// Calling this more than once is harmless: only the first subscriber is installed.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) {
    if STDOUT_GUARD.get().is_some() {
        return;
    }
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    if STDOUT_GUARD.set(stdout_guard).is_err() {
        return;
    }

    let fallback = config
        .default_filter
        .clone()
        .unwrap_or_else(|| DEFAULT_FILTER.to_owned());
    let filter = match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(directive).unwrap_or_else(|err| {
            eprintln!("invalid {LOG_ENV} directive ({err}); defaulting to {fallback}");
            EnvFilter::new(&fallback)
        }),
        Err(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&fallback)),
    };

    let fmt_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .json()
            .with_writer(stdout_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(stdout_writer)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .ok();

    info!(service = %service_name, format = ?config.format, "tracing initialised");
}

/// Outcome attached to a security event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityOutcome {
    /// The operation completed and granted what was asked.
    Success,
    /// The operation completed but refused the caller.
    Denied,
    /// The operation could not complete.
    Fault,
}

impl SecurityOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityOutcome::Success => "success",
            SecurityOutcome::Denied => "denied",
            SecurityOutcome::Fault => "fault",
        }
    }
}

/// Emit a standardised security event. `subject` is an identifier, never secret material.
pub fn log_security_event(event: &str, outcome: SecurityOutcome, subject: &str, message: &str) {
    match outcome {
        SecurityOutcome::Success => tracing::info!(
            event,
            outcome = outcome.as_str(),
            subject,
            message = %message
        ),
        SecurityOutcome::Denied => tracing::warn!(
            event,
            outcome = outcome.as_str(),
            subject,
            message = %message
        ),
        SecurityOutcome::Fault => tracing::error!(
            event,
            outcome = outcome.as_str(),
            subject,
            message = %message
        ),
    }
}
