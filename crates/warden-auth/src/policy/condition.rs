//! Named condition predicates.
//!
//! A policy condition is stored as `{"type": <name>, "options": {...}}`
//! under a request context key. At evaluation time the name is looked up in
//! a [`ConditionRegistry`] and the predicate is handed the options, the
//! context value under that key and the request itself.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use ipnetwork::IpNetwork;
use regex::Regex;
use serde_json::Value;

use crate::policy::model::{AccessRequest, ConditionSpec};

/// A predicate over one request context value.
pub trait Condition: Send + Sync {
    /// Returns `true` if `value` satisfies the condition configured by
    /// `options`. A missing context value is passed as `Value::Null`.
    fn fulfills(&self, options: &Value, value: &Value, request: &AccessRequest) -> bool;
}

impl<F> Condition for F
where
    F: Fn(&Value, &Value, &AccessRequest) -> bool + Send + Sync,
{
    fn fulfills(&self, options: &Value, value: &Value, request: &AccessRequest) -> bool {
        self(options, value, request)
    }
}

/// Registry of condition predicates by name.
#[derive(Clone)]
pub struct ConditionRegistry {
    conditions: HashMap<String, Arc<dyn Condition>>,
}

impl fmt::Debug for ConditionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.conditions.keys().collect();
        names.sort();
        f.debug_struct("ConditionRegistry")
            .field("conditions", &names)
            .finish()
    }
}

impl Default for ConditionRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ConditionRegistry {
    /// A registry with no conditions. Every condition fails.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            conditions: HashMap::new(),
        }
    }

    /// A registry holding the built-in conditions.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("CIDRCondition", CidrCondition);
        registry.register("StringEqualCondition", StringEqualCondition);
        registry.register("StringMatchCondition", StringMatchCondition);
        registry.register("EqualsSubjectCondition", EqualsSubjectCondition);
        registry.register("StringPairsEqualCondition", StringPairsEqualCondition);
        registry.register("BooleanCondition", BooleanCondition);
        registry
    }

    /// Registers `condition` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, condition: impl Condition + 'static) {
        self.conditions.insert(name.into(), Arc::new(condition));
    }

    /// Returns `true` if a condition is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.conditions.contains_key(name)
    }

    /// Evaluates `spec` against `value`. Unknown names fail.
    #[must_use]
    pub fn evaluate(&self, spec: &ConditionSpec, value: &Value, request: &AccessRequest) -> bool {
        match self.conditions.get(&spec.kind) {
            Some(condition) => condition.fulfills(&spec.options, value, request),
            None => {
                tracing::warn!(condition = %spec.kind, "Unknown policy condition");
                false
            }
        }
    }
}

fn option_str<'a>(options: &'a Value, key: &str) -> Option<&'a str> {
    options.get(key).and_then(Value::as_str)
}

/// Passes if the value is an IP address inside `options.cidr`.
#[derive(Debug, Clone, Copy)]
pub struct CidrCondition;

impl Condition for CidrCondition {
    fn fulfills(&self, options: &Value, value: &Value, _request: &AccessRequest) -> bool {
        let Some(cidr) = option_str(options, "cidr") else {
            return false;
        };
        let Some(ip) = value.as_str().and_then(|s| s.parse::<IpAddr>().ok()) else {
            return false;
        };
        cidr.parse::<IpNetwork>()
            .map(|network| network.contains(ip))
            .unwrap_or(false)
    }
}

/// Passes if the value is a string equal to `options.equals`.
#[derive(Debug, Clone, Copy)]
pub struct StringEqualCondition;

impl Condition for StringEqualCondition {
    fn fulfills(&self, options: &Value, value: &Value, _request: &AccessRequest) -> bool {
        match (option_str(options, "equals"), value.as_str()) {
            (Some(expected), Some(actual)) => expected == actual,
            _ => false,
        }
    }
}

/// Passes if the value is a string matching the expression `options.matches`.
#[derive(Debug, Clone, Copy)]
pub struct StringMatchCondition;

impl Condition for StringMatchCondition {
    fn fulfills(&self, options: &Value, value: &Value, _request: &AccessRequest) -> bool {
        let (Some(pattern), Some(actual)) = (option_str(options, "matches"), value.as_str()) else {
            return false;
        };
        Regex::new(pattern)
            .map(|re| re.is_match(actual))
            .unwrap_or(false)
    }
}

/// Passes if the value is a string equal to the request subject.
#[derive(Debug, Clone, Copy)]
pub struct EqualsSubjectCondition;

impl Condition for EqualsSubjectCondition {
    fn fulfills(&self, _options: &Value, value: &Value, request: &AccessRequest) -> bool {
        value.as_str() == Some(request.subject.as_str())
    }
}

/// Passes if the value is a list of string pairs whose elements are equal.
#[derive(Debug, Clone, Copy)]
pub struct StringPairsEqualCondition;

impl Condition for StringPairsEqualCondition {
    fn fulfills(&self, _options: &Value, value: &Value, _request: &AccessRequest) -> bool {
        let Some(pairs) = value.as_array() else {
            return false;
        };
        pairs.iter().all(|pair| match pair.as_array().map(Vec::as_slice) {
            Some([Value::String(a), Value::String(b)]) => a == b,
            _ => false,
        })
    }
}

/// Passes if the value is a boolean equal to `options.value`.
#[derive(Debug, Clone, Copy)]
pub struct BooleanCondition;

impl Condition for BooleanCondition {
    fn fulfills(&self, options: &Value, value: &Value, _request: &AccessRequest) -> bool {
        match (options.get("value").and_then(Value::as_bool), value.as_bool()) {
            (Some(expected), Some(actual)) => expected == actual,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn req() -> AccessRequest {
        AccessRequest::new("ken", "matrix", "create")
    }

    fn eval(kind: &str, options: Value, value: Value) -> bool {
        ConditionRegistry::with_defaults().evaluate(&ConditionSpec::new(kind, options), &value, &req())
    }

    #[test]
    fn test_cidr_condition() {
        let opts = json!({"cidr": "192.168.0.0/16"});
        assert!(eval("CIDRCondition", opts.clone(), json!("192.168.1.10")));
        assert!(!eval("CIDRCondition", opts.clone(), json!("10.0.0.1")));
        assert!(!eval("CIDRCondition", opts.clone(), json!("not-an-ip")));
        assert!(!eval("CIDRCondition", opts, Value::Null));
        assert!(eval("CIDRCondition", json!({"cidr": "::1/128"}), json!("::1")));
    }

    #[test]
    fn test_string_equal_condition() {
        assert!(eval("StringEqualCondition", json!({"equals": "blue"}), json!("blue")));
        assert!(!eval("StringEqualCondition", json!({"equals": "blue"}), json!("red")));
        assert!(!eval("StringEqualCondition", json!({}), json!("blue")));
    }

    #[test]
    fn test_string_match_condition() {
        let opts = json!({"matches": "^[a-z]+@example\\.com$"});
        assert!(eval("StringMatchCondition", opts.clone(), json!("ken@example.com")));
        assert!(!eval("StringMatchCondition", opts, json!("ken@example.org")));
        assert!(!eval("StringMatchCondition", json!({"matches": "("}), json!("x")));
    }

    #[test]
    fn test_equals_subject_condition() {
        assert!(eval("EqualsSubjectCondition", Value::Null, json!("ken")));
        assert!(!eval("EqualsSubjectCondition", Value::Null, json!("alice")));
    }

    #[test]
    fn test_string_pairs_equal_condition() {
        assert!(eval("StringPairsEqualCondition", Value::Null, json!([["a", "a"], ["b", "b"]])));
        assert!(!eval("StringPairsEqualCondition", Value::Null, json!([["a", "a"], ["b", "c"]])));
        assert!(!eval("StringPairsEqualCondition", Value::Null, json!([["a"]])));
        assert!(eval("StringPairsEqualCondition", Value::Null, json!([])));
    }

    #[test]
    fn test_boolean_condition() {
        assert!(eval("BooleanCondition", json!({"value": true}), json!(true)));
        assert!(!eval("BooleanCondition", json!({"value": true}), json!(false)));
        assert!(!eval("BooleanCondition", json!({"value": true}), json!("true")));
    }

    #[test]
    fn test_unknown_condition_fails() {
        assert!(!eval("NoSuchCondition", Value::Null, json!("x")));
    }

    #[test]
    fn test_register_custom_condition() {
        let mut registry = ConditionRegistry::empty();
        assert!(!registry.contains("AlwaysTrue"));
        registry.register("AlwaysTrue", |_: &Value, _: &Value, _: &AccessRequest| true);
        assert!(registry.contains("AlwaysTrue"));
        assert!(registry.evaluate(&ConditionSpec::new("AlwaysTrue", Value::Null), &Value::Null, &req()));
    }
}
