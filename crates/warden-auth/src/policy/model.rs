//! Policy and access request types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::policy::matcher::{compile_template, has_pattern};
use crate::{AuthError, AuthResult};

/// Outcome a matching policy imposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    #[default]
    Deny,
}

impl Effect {
    /// Returns the wire name of the effect.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

impl std::str::FromStr for Effect {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            other => Err(AuthError::invalid_argument(format!(
                "unknown policy effect '{other}'"
            ))),
        }
    }
}

/// A condition attached to a policy, keyed by request context field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionSpec {
    /// Registered condition name, e.g. `CIDRCondition`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Condition-specific options, e.g. `{"cidr": "10.0.0.0/8"}`.
    #[serde(default)]
    pub options: Value,
}

impl ConditionSpec {
    /// Creates a condition spec.
    #[must_use]
    pub fn new(kind: impl Into<String>, options: Value) -> Self {
        Self {
            kind: kind.into(),
            options,
        }
    }
}

/// An access-control policy.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub subjects: Vec<String>,

    #[serde(default)]
    pub effect: Effect,

    #[serde(default)]
    pub resources: Vec<String>,

    #[serde(default)]
    pub actions: Vec<String>,

    /// Conditions by context key. All must pass for the policy to apply.
    #[serde(default)]
    pub conditions: BTreeMap<String, ConditionSpec>,
}

impl Policy {
    /// Checks the id and every subject, resource and action template.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidArgument` if the id is empty or a template
    /// has unbalanced delimiters or an invalid embedded expression.
    pub fn validate(&self) -> AuthResult<()> {
        if self.id.is_empty() {
            return Err(AuthError::invalid_argument("policy id must not be empty"));
        }

        for template in self
            .subjects
            .iter()
            .chain(&self.resources)
            .chain(&self.actions)
        {
            if has_pattern(template) {
                compile_template(template)?;
            }
        }

        Ok(())
    }

    /// Returns `true` if the effect is allow.
    #[must_use]
    pub fn allows(&self) -> bool {
        self.effect == Effect::Allow
    }
}

/// A question put to the policy engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AccessRequest {
    #[serde(default)]
    pub subject: String,

    #[serde(default)]
    pub resource: String,

    #[serde(default)]
    pub action: String,

    /// Values consulted by policy conditions.
    #[serde(default)]
    pub context: Map<String, Value>,
}

impl AccessRequest {
    /// Creates a request with an empty context.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            resource: resource.into(),
            action: action.into(),
            context: Map::new(),
        }
    }

    /// Returns a copy of this request asked on behalf of `subject`.
    #[must_use]
    pub fn for_subject(&self, subject: &str) -> Self {
        Self {
            subject: subject.to_string(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_policy_from_json() {
        let policy: Policy = serde_json::from_value(json!({
            "id": "1",
            "description": "",
            "subjects": ["alice", "group1"],
            "effect": "allow",
            "resources": ["matrix", "rn:hydra:token<.*>"],
            "actions": ["create", "decide"],
            "conditions": {
                "ip": {"type": "CIDRCondition", "options": {"cidr": "10.0.0.0/8"}}
            }
        }))
        .unwrap();

        assert!(policy.allows());
        assert_eq!(policy.conditions["ip"].kind, "CIDRCondition");
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_missing_effect_denies() {
        let policy: Policy = serde_json::from_value(json!({"id": "x"})).unwrap();
        assert_eq!(policy.effect, Effect::Deny);
    }

    #[test]
    fn test_validate_rejects_empty_id() {
        let err = Policy::default().validate().unwrap_err();
        assert!(matches!(err, AuthError::InvalidArgument { .. }));
    }

    #[test]
    fn test_validate_rejects_unbalanced_template() {
        let policy = Policy {
            id: "p".to_string(),
            resources: vec!["rn:<.*".to_string()],
            ..Default::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_effect_from_str() {
        assert_eq!("allow".parse::<Effect>().unwrap(), Effect::Allow);
        assert!("maybe".parse::<Effect>().is_err());
    }

    #[test]
    fn test_for_subject_keeps_context() {
        let mut req = AccessRequest::new("ken", "matrix", "create");
        req.context.insert("ip".to_string(), json!("10.0.0.1"));
        let group_req = req.for_subject("group1");
        assert_eq!(group_req.subject, "group1");
        assert_eq!(group_req.context["ip"], "10.0.0.1");
    }
}
