//! ---
//! warden_section: "04-policy-authorizer"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Attribute-based policies, cached decisions and audit hooks."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use std::net::IpAddr;

use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use warden_common::{AttributeMap, AttributeValue};

use crate::error::{PolicyError, PolicyResult};

/// Identifier for a policy.
pub type PolicyId = String;

/// Outcome a matching policy produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

/// Inclusive wall-clock window in UTC, optionally limited to certain weekdays.
///
/// A window whose `start` is after its `end` wraps midnight (`22:00-06:00`). The weekday
/// whitelist is checked against the request's own day; an empty list admits every day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
    #[serde(default)]
    pub days: Vec<Weekday>,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            start,
            end,
            days: Vec::new(),
        }
    }

    pub fn on_days(mut self, days: impl IntoIterator<Item = Weekday>) -> Self {
        self.days = days.into_iter().collect();
        self
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        if !self.days.is_empty() && !self.days.contains(&at.weekday()) {
            return false;
        }
        let time = at.time();
        if self.start <= self.end {
            self.start <= time && time <= self.end
        } else {
            time >= self.start || time <= self.end
        }
    }
}

/// Exact-address allow and block lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpConstraints {
    /// Empty admits any address that is not blocked.
    #[serde(default)]
    pub allowed: Vec<IpAddr>,
    /// Takes precedence over `allowed`.
    #[serde(default)]
    pub blocked: Vec<IpAddr>,
}

impl IpConstraints {
    /// A request without an address never matches a block list but fails a non-empty allow
    /// list.
    pub fn permits(&self, ip: Option<IpAddr>) -> bool {
        match ip {
            Some(ip) if self.blocked.contains(&ip) => false,
            Some(ip) => self.allowed.is_empty() || self.allowed.contains(&ip),
            None => self.allowed.is_empty(),
        }
    }

    /// Whether a policy with `effect` applies to `ip`. Allow policies apply to addresses the
    /// lists admit, deny policies to addresses they reject. Empty lists apply to everything.
    pub fn applies_to(&self, effect: Effect, ip: Option<IpAddr>) -> bool {
        if self.allowed.is_empty() && self.blocked.is_empty() {
            return true;
        }
        match effect {
            Effect::Allow => self.permits(ip),
            Effect::Deny => !self.permits(ip),
        }
    }
}

/// Conditions that must all hold for a policy to apply. Defaults match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyConditions {
    #[serde(default)]
    pub principal_attributes: AttributeMap,
    #[serde(default)]
    pub resource_attributes: AttributeMap,
    /// Empty means any action.
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub context: AttributeMap,
    #[serde(default)]
    pub time_window: Option<TimeWindow>,
    #[serde(default)]
    pub ip: Option<IpConstraints>,
}

/// Attribute-based access policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub effect: Effect,
    /// Higher values are evaluated first.
    pub priority: i32,
    #[serde(default)]
    pub conditions: PolicyConditions,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn enabled_by_default() -> bool {
    true
}

impl Policy {
    /// Enabled policy with no conditions.
    pub fn new(
        id: impl Into<PolicyId>,
        name: impl Into<String>,
        effect: Effect,
        priority: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            effect,
            priority,
            conditions: PolicyConditions::default(),
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn for_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conditions.actions = actions.into_iter().map(Into::into).collect();
        self
    }

    pub fn require_principal_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.conditions
            .principal_attributes
            .insert(key.into(), value.into());
        self
    }

    pub fn require_resource_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.conditions
            .resource_attributes
            .insert(key.into(), value.into());
        self
    }

    pub fn require_context(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.conditions.context.insert(key.into(), value.into());
        self
    }

    pub fn within(mut self, window: TimeWindow) -> Self {
        self.conditions.time_window = Some(window);
        self
    }

    pub fn with_ip_constraints(mut self, ip: IpConstraints) -> Self {
        self.conditions.ip = Some(ip);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn validate(&self) -> PolicyResult<()> {
        if self.id.trim().is_empty() {
            return Err(PolicyError::InvalidPolicy("policy id must not be empty".into()));
        }
        if self.conditions.actions.iter().any(|action| action.is_empty()) {
            return Err(PolicyError::InvalidPolicy(format!(
                "policy {} lists an empty action",
                self.id
            )));
        }
        Ok(())
    }
}
