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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_common::principal::PrincipalId;
use warden_common::{AttributeMap, AttributeValue};

use crate::policy::PolicyId;

/// Target of an access check. Opaque beyond its attributes and owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub resource_type: String,
    #[serde(default)]
    pub owner_id: Option<PrincipalId>,
    #[serde(default)]
    pub attributes: AttributeMap,
}

impl Resource {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            owner_id: None,
            attributes: AttributeMap::new(),
        }
    }

    pub fn owned_by(mut self, owner_id: impl Into<PrincipalId>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Caller-supplied context for a check: free-form attributes plus network/session metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(default)]
    pub attributes: AttributeMap,
    #[serde(default)]
    pub ip_address: Option<IpAddr>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Evaluation instant; `None` means now.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ip(ip: IpAddr) -> Self {
        Self {
            ip_address: Some(ip),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Access request as evaluated and audited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRequest {
    pub id: String,
    pub principal_id: PrincipalId,
    pub resource_id: String,
    pub action: String,
    #[serde(default)]
    pub context: AttributeMap,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub ip_address: Option<IpAddr>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Result of an access check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub request_id: String,
    pub granted: bool,
    pub reason: String,
    /// Policy that decided, `None` for default-deny and inactive principals.
    #[serde(default)]
    pub matched_policy_id: Option<PolicyId>,
    pub evaluated_at: DateTime<Utc>,
}
