//! Warden authorization core: PERM models, rules and enforcement.
//!
//! # Purpose
//! Loads a Policy-Effect-Request-Matcher model, validates permission rules
//! against it, and decides `(subject, object, action)` requests for a given
//! rule snapshot.
//!
//! # How it fits
//! The `warden` service owns storage and HTTP. It validates writes with
//! [`Model::validate_rule`] and feeds every stored rule to [`Enforcer::enforce`]
//! on each guarded request.
//!
//! # Key invariants
//! - Models are immutable once loaded.
//! - Role membership is reflexive, so an unused `g2` is an identity check.
//! - An empty rule set denies.
//!
//! # Examples
//! ```rust
//! use std::sync::Arc;
//! use warden_authz::{AccessRequest, Enforcer, PolicyRule, default_model};
//!
//! let enforcer = Enforcer::new(Arc::new(default_model()));
//! let rules = vec![
//!     PolicyRule::policy("p", ["editors", "/pets", "POST"]).unwrap(),
//!     PolicyRule::grouping("g", ["alice", "editors"]).unwrap(),
//! ];
//! let request = AccessRequest::new("alice", "/pets", "POST");
//! assert!(enforcer.enforce(&rules, &request).unwrap());
//! ```
//!
//! # Common pitfalls
//! - Rules are positional: `v0..v5` bind to the fields of their definition in order.
//! - `keyMatch2` treats `:name` as exactly one path segment.

mod default_model;
mod effect;
mod enforcer;
mod errors;
mod expr;
mod matcher;
mod model;
mod roles;
mod rule;

pub use default_model::{DEFAULT_MODEL, default_model};
pub use effect::{PolicyEffect, RuleEffect};
pub use enforcer::Enforcer;
pub use errors::{AuthzError, AuthzResult};
pub use expr::{Expr, Scope};
pub use matcher::{EvalContext, key_match, key_match2, regex_match};
pub use model::{Definition, Model, ModelSource};
pub use roles::RoleGraph;
pub use rule::{AccessRequest, MAX_RULE_PARAMS, PolicyRule, RuleParams, RuleSection};
