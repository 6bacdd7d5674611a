//! ---
//! warden_section: "01-core-functionality"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Shared primitives for the identity and access components."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attributes::{AttributeMap, AttributeValue};

/// Identifier for a principal.
pub type PrincipalId = String;

/// Authenticated subject as seen by the access components.
///
/// Provisioning and storage belong to the host; the core only reads principals and
/// derives principal views from token claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    /// Stable identifier.
    pub id: PrincipalId,
    /// Human readable login name.
    pub username: String,
    /// Role names held by the principal.
    #[serde(default)]
    pub roles: BTreeSet<String>,
    /// Free-form attributes consulted by policy conditions.
    #[serde(default)]
    pub attributes: AttributeMap,
    /// Whether the principal may authenticate and be granted access.
    pub active: bool,
    /// Last time the principal was seen.
    pub last_activity: DateTime<Utc>,
}

impl Principal {
    /// Construct an active principal without roles or attributes.
    pub fn new(id: impl Into<PrincipalId>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            roles: BTreeSet::new(),
            attributes: AttributeMap::new(),
            active: true,
            last_activity: Utc::now(),
        }
    }

    /// Add a role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    /// Set an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Mark the principal as inactive.
    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }

    /// Whether the principal holds the named role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Record activity now.
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_roles_and_attributes() {
        let principal = Principal::new("p-1", "alice")
            .with_role("viewer")
            .with_role("viewer")
            .with_attribute("department", "facilities");
        assert_eq!(principal.roles.len(), 1);
        assert!(principal.has_role("viewer"));
        assert_eq!(
            principal.attributes.get("department"),
            Some(&AttributeValue::String("facilities".into()))
        );
        assert!(principal.active);
        assert!(!principal.deactivated().active);
    }
}
