//! Policy evaluation.
//!
//! A policy applies to a request when its actions, subjects and resources
//! each match and every condition passes. Any applicable deny policy denies
//! the request outright; otherwise at least one applicable allow policy is
//! required.

use serde_json::Value;

use crate::AuthResult;
use crate::policy::condition::ConditionRegistry;
use crate::policy::matcher::PatternMatcher;
use crate::policy::model::{AccessRequest, Policy};

// =============================================================================
// Access Decision
// =============================================================================

/// Result of evaluating a request against a policy set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    /// Access is granted by the named policy.
    Allow {
        /// First allow policy that applied.
        policy_id: String,
    },
    /// Access is denied with a reason.
    Deny(DenyReason),
}

impl AccessDecision {
    /// Returns `true` if access was granted.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    /// Returns `true` if a deny policy applied.
    #[must_use]
    pub fn is_forcefully_denied(&self) -> bool {
        matches!(self, Self::Deny(DenyReason::ExplicitDeny { .. }))
    }

    /// Get the deny reason if access was denied.
    #[must_use]
    pub fn deny_reason(&self) -> Option<&DenyReason> {
        match self {
            Self::Deny(reason) => Some(reason),
            Self::Allow { .. } => None,
        }
    }
}

/// Why a request was denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// No allow policy applied.
    NoMatchingPolicy,
    /// A deny policy applied.
    ExplicitDeny {
        /// The deny policy.
        policy_id: String,
    },
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoMatchingPolicy => write!(f, "no policy allows the request"),
            Self::ExplicitDeny { policy_id } => {
                write!(f, "request forcefully denied by policy '{policy_id}'")
            }
        }
    }
}

// =============================================================================
// Policy Engine
// =============================================================================

/// Deny-over-allow policy evaluator.
#[derive(Debug, Default)]
pub struct PolicyEngine {
    matcher: PatternMatcher,
    conditions: ConditionRegistry,
}

impl PolicyEngine {
    /// Creates an engine with the built-in conditions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine with a custom condition registry.
    #[must_use]
    pub fn with_conditions(conditions: ConditionRegistry) -> Self {
        Self {
            matcher: PatternMatcher::new(),
            conditions,
        }
    }

    /// Evaluates `request` against `policies`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidArgument` if a policy template does not
    /// compile.
    pub fn evaluate(&self, policies: &[Policy], request: &AccessRequest) -> AuthResult<AccessDecision> {
        let mut allowed_by: Option<&str> = None;

        for policy in policies {
            if !self.applies(policy, request)? {
                continue;
            }

            if !policy.allows() {
                return Ok(AccessDecision::Deny(DenyReason::ExplicitDeny {
                    policy_id: policy.id.clone(),
                }));
            }

            if allowed_by.is_none() {
                allowed_by = Some(policy.id.as_str());
            }
        }

        Ok(match allowed_by {
            Some(id) => AccessDecision::Allow {
                policy_id: id.to_string(),
            },
            None => AccessDecision::Deny(DenyReason::NoMatchingPolicy),
        })
    }

    /// Returns `true` if `policy` applies to `request`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidArgument` if a template does not compile.
    pub fn applies(&self, policy: &Policy, request: &AccessRequest) -> AuthResult<bool> {
        if !self.matcher.matches(&policy.actions, &request.action)? {
            return Ok(false);
        }
        if !self.matcher.matches(&policy.subjects, &request.subject)? {
            return Ok(false);
        }
        if !self.matcher.matches(&policy.resources, &request.resource)? {
            return Ok(false);
        }

        Ok(policy.conditions.iter().all(|(key, spec)| {
            let value = request.context.get(key).unwrap_or(&Value::Null);
            self.conditions.evaluate(spec, value, request)
        }))
    }

    /// Returns `true` if `policy` names `subject` through any of its templates.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidArgument` if a template does not compile.
    pub fn matches_subject(&self, policy: &Policy, subject: &str) -> AuthResult<bool> {
        self.matcher.matches(&policy.subjects, subject)
    }

    /// Returns `true` if `policy` names `resource` through any of its templates.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidArgument` if a template does not compile.
    pub fn matches_resource(&self, policy: &Policy, resource: &str) -> AuthResult<bool> {
        self.matcher.matches(&policy.resources, resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::model::{ConditionSpec, Effect};
    use serde_json::json;

    fn policy(id: &str, subjects: &[&str], resources: &[&str], actions: &[&str], effect: Effect) -> Policy {
        Policy {
            id: id.to_string(),
            description: String::new(),
            subjects: subjects.iter().map(|s| s.to_string()).collect(),
            effect,
            resources: resources.iter().map(|s| s.to_string()).collect(),
            actions: actions.iter().map(|s| s.to_string()).collect(),
            conditions: Default::default(),
        }
    }

    fn fixtures() -> Vec<Policy> {
        vec![
            policy(
                "1",
                &["alice", "group1"],
                &["matrix", "forbidden_matrix", "rn:hydra:token<.*>"],
                &["create", "decide"],
                Effect::Allow,
            ),
            policy("2", &["siri"], &["<.*>"], &["decide"], Effect::Allow),
            policy(
                "3",
                &["group1"],
                &["forbidden_matrix", "rn:hydra:token<.*>"],
                &["create", "decide"],
                Effect::Deny,
            ),
        ]
    }

    #[test]
    fn test_allow_when_policy_matches() {
        let engine = PolicyEngine::new();
        let decision = engine
            .evaluate(&fixtures(), &AccessRequest::new("alice", "matrix", "create"))
            .unwrap();
        assert_eq!(decision, AccessDecision::Allow { policy_id: "1".to_string() });
    }

    #[test]
    fn test_deny_over_allow() {
        let engine = PolicyEngine::new();
        let decision = engine
            .evaluate(&fixtures(), &AccessRequest::new("group1", "forbidden_matrix", "create"))
            .unwrap();
        assert!(decision.is_forcefully_denied());
        assert_eq!(
            decision.deny_reason(),
            Some(&DenyReason::ExplicitDeny { policy_id: "3".to_string() })
        );

        // deny wins regardless of the order policies come back in
        let mut reversed = fixtures();
        reversed.reverse();
        let decision = engine
            .evaluate(&reversed, &AccessRequest::new("group1", "forbidden_matrix", "create"))
            .unwrap();
        assert!(decision.is_forcefully_denied());
    }

    #[test]
    fn test_no_match_denies() {
        let engine = PolicyEngine::new();
        let decision = engine
            .evaluate(&fixtures(), &AccessRequest::new("bob", "matrix", "create"))
            .unwrap();
        assert_eq!(decision, AccessDecision::Deny(DenyReason::NoMatchingPolicy));

        let decision = engine
            .evaluate(&[], &AccessRequest::new("alice", "matrix", "create"))
            .unwrap();
        assert!(!decision.is_allowed());
    }

    #[test]
    fn test_action_must_match() {
        let engine = PolicyEngine::new();
        let decision = engine
            .evaluate(&fixtures(), &AccessRequest::new("siri", "anything", "create"))
            .unwrap();
        assert!(!decision.is_allowed());

        let decision = engine
            .evaluate(&fixtures(), &AccessRequest::new("siri", "anything", "decide"))
            .unwrap();
        assert!(decision.is_allowed());
    }

    #[test]
    fn test_conditions_gate_policy() {
        let mut p = policy("c", &["ken"], &["matrix"], &["create"], Effect::Allow);
        p.conditions.insert(
            "ip".to_string(),
            ConditionSpec::new("CIDRCondition", json!({"cidr": "10.0.0.0/8"})),
        );
        let engine = PolicyEngine::new();

        let mut req = AccessRequest::new("ken", "matrix", "create");
        assert!(!engine.evaluate(std::slice::from_ref(&p), &req).unwrap().is_allowed());

        req.context.insert("ip".to_string(), json!("10.1.2.3"));
        assert!(engine.evaluate(std::slice::from_ref(&p), &req).unwrap().is_allowed());

        req.context.insert("ip".to_string(), json!("192.168.0.1"));
        assert!(!engine.evaluate(&[p], &req).unwrap().is_allowed());
    }

    #[test]
    fn test_deny_with_failing_condition_does_not_apply() {
        let allow = policy("a", &["ken"], &["matrix"], &["create"], Effect::Allow);
        let mut deny = policy("d", &["ken"], &["matrix"], &["create"], Effect::Deny);
        deny.conditions.insert(
            "owner".to_string(),
            ConditionSpec::new("EqualsSubjectCondition", json!({})),
        );
        let engine = PolicyEngine::new();

        let mut req = AccessRequest::new("ken", "matrix", "create");
        req.context.insert("owner".to_string(), json!("alice"));
        assert!(engine.evaluate(&[allow.clone(), deny.clone()], &req).unwrap().is_allowed());

        req.context.insert("owner".to_string(), json!("ken"));
        assert!(engine.evaluate(&[allow, deny], &req).unwrap().is_forcefully_denied());
    }

    #[test]
    fn test_broken_template_is_error() {
        let p = policy("x", &["<(>"], &["matrix"], &["create"], Effect::Allow);
        let engine = PolicyEngine::new();
        assert!(engine.evaluate(&[p], &AccessRequest::new("ken", "matrix", "create")).is_err());
    }
}
