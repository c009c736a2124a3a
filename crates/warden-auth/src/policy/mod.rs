//! Access-control policies.
//!
//! A policy names subjects, resources and actions, an effect and optional
//! conditions. Subjects, resources and actions may embed regular
//! expressions between `<` and `>`, e.g. `rn:hydra:token<.*>`.
//!
//! - [`model`] - policy and access request types
//! - [`matcher`] - the `<...>` pattern dialect
//! - [`condition`] - named condition predicates
//! - [`engine`] - deny-over-allow evaluation

pub mod condition;
pub mod engine;
pub mod matcher;
pub mod model;

pub use condition::{Condition, ConditionRegistry};
pub use engine::{AccessDecision, DenyReason, PolicyEngine};
pub use matcher::{PatternMatcher, compile_template, has_pattern};
pub use model::{AccessRequest, ConditionSpec, Effect, Policy};
