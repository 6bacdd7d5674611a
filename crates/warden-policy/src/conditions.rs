//! ---
//! warden_section: "04-policy-authorizer"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Attribute-based policies, cached decisions and audit hooks."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
//! Exact-match condition evaluation.

use warden_common::attributes::contains_all;
use warden_common::Principal;

use crate::policy::{Effect, PolicyConditions};
use crate::request::{AccessRequest, Resource};

/// Condition that rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Mismatch {
    PrincipalAttributes,
    ResourceAttributes,
    Action,
    Context,
    TimeWindow,
    IpAddress,
}

/// First condition that does not hold, or `None` when every condition matches.
///
/// `effect` decides how IP lists are read; see [`IpConstraints::applies_to`].
///
/// [`IpConstraints::applies_to`]: crate::policy::IpConstraints::applies_to
pub fn first_mismatch(
    conditions: &PolicyConditions,
    effect: Effect,
    principal: &Principal,
    resource: &Resource,
    request: &AccessRequest,
) -> Option<Mismatch> {
    if !contains_all(&principal.attributes, &conditions.principal_attributes) {
        return Some(Mismatch::PrincipalAttributes);
    }
    if !contains_all(&resource.attributes, &conditions.resource_attributes) {
        return Some(Mismatch::ResourceAttributes);
    }
    if !conditions.actions.is_empty() && !conditions.actions.contains(&request.action) {
        return Some(Mismatch::Action);
    }
    if !contains_all(&request.context, &conditions.context) {
        return Some(Mismatch::Context);
    }
    if let Some(window) = &conditions.time_window {
        if !window.contains(request.timestamp) {
            return Some(Mismatch::TimeWindow);
        }
    }
    if let Some(ip) = &conditions.ip {
        if !ip.applies_to(effect, request.ip_address) {
            return Some(Mismatch::IpAddress);
        }
    }
    None
}

pub fn matches(
    conditions: &PolicyConditions,
    effect: Effect,
    principal: &Principal,
    resource: &Resource,
    request: &AccessRequest,
) -> bool {
    first_mismatch(conditions, effect, principal, resource, request).is_none()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::policy::IpConstraints;

    fn request(action: &str) -> AccessRequest {
        AccessRequest {
            id: "r-1".into(),
            principal_id: "p-1".into(),
            resource_id: "doc-7".into(),
            action: action.into(),
            context: Default::default(),
            timestamp: Utc::now(),
            ip_address: Some("10.1.2.3".parse().unwrap()),
            session_id: None,
            user_agent: None,
        }
    }

    #[test]
    fn empty_conditions_match_everything() {
        let principal = Principal::new("p-1", "ops");
        let resource = Resource::new("doc-7", "document");
        assert!(matches(
            &PolicyConditions::default(),
            Effect::Allow,
            &principal,
            &resource,
            &request("delete")
        ));
    }

    #[test]
    fn each_condition_is_checked() {
        let principal = Principal::new("p-1", "ops").with_attribute("department", "finance");
        let resource = Resource::new("doc-7", "document").with_attribute("classification", "internal");

        let mut conditions = PolicyConditions::default();
        conditions
            .principal_attributes
            .insert("department".into(), "finance".into());
        conditions.resource_attributes.insert("classification".into(), "internal".into());
        conditions.actions = vec!["read".into(), "write".into()];
        assert_eq!(
            first_mismatch(&conditions, Effect::Allow, &principal, &resource, &request("write")),
            None
        );
        assert_eq!(
            first_mismatch(&conditions, Effect::Allow, &principal, &resource, &request("delete")),
            Some(Mismatch::Action)
        );

        conditions.context.insert("mfa".into(), true.into());
        assert_eq!(
            first_mismatch(&conditions, Effect::Allow, &principal, &resource, &request("read")),
            Some(Mismatch::Context)
        );
        conditions.context.clear();

        conditions
            .resource_attributes
            .insert("classification".into(), "restricted".into());
        assert_eq!(
            first_mismatch(&conditions, Effect::Allow, &principal, &resource, &request("read")),
            Some(Mismatch::ResourceAttributes)
        );
        conditions.resource_attributes.clear();

        conditions.ip = Some(IpConstraints {
            allowed: vec!["10.9.9.9".parse().unwrap()],
            blocked: Vec::new(),
        });
        assert_eq!(
            first_mismatch(&conditions, Effect::Allow, &principal, &resource, &request("read")),
            Some(Mismatch::IpAddress)
        );
        assert_eq!(Mismatch::IpAddress.to_string(), "ip_address");
    }

    #[test]
    fn attribute_types_must_match_exactly() {
        let principal = Principal::new("p-1", "ops").with_attribute("clearance", 3_i64);
        let mut conditions = PolicyConditions::default();
        conditions
            .principal_attributes
            .insert("clearance".into(), 3.0_f64.into());
        assert_eq!(
            first_mismatch(
                &conditions,
                Effect::Allow,
                &principal,
                &Resource::new("r", "t"),
                &request("read")
            ),
            Some(Mismatch::PrincipalAttributes)
        );
    }
}
