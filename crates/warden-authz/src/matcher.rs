//! Matcher evaluation and built-in matching functions.
use crate::expr::{Expr, Scope};
use crate::roles::RoleGraph;
use crate::{AuthzError, AuthzResult, Model};
use regex::Regex;
use std::collections::HashMap;

/// `keyMatch(key, pattern)`: `pattern` matches literally up to its first `*`,
/// after which anything is accepted.
pub fn key_match(key: &str, pattern: &str) -> bool {
    match pattern.find('*') {
        None => key == pattern,
        Some(star) => key.starts_with(&pattern[..star]),
    }
}

/// `keyMatch2(key, pattern)`: RESTful patterns where `:name` matches one
/// non-empty path segment and `*` matches any remainder.
///
/// ```rust
/// use warden_authz::key_match2;
///
/// assert!(key_match2("/pets/42", "/pets/:id"));
/// assert!(!key_match2("/pets/42/toys", "/pets/:id"));
/// assert!(key_match2("/pets/42/toys", "/pets/*"));
/// ```
pub fn key_match2(key: &str, pattern: &str) -> bool {
    let segments: Vec<String> = pattern
        .split('/')
        .map(|segment| {
            if segment.len() > 1 && segment.starts_with(':') {
                "[^/]+".to_string()
            } else {
                segment
                    .split('*')
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join(".*")
            }
        })
        .collect();
    let translated = format!("^{}$", segments.join("/"));
    Regex::new(&translated).is_ok_and(|re| re.is_match(key))
}

/// `regexMatch(key, pattern)`: unanchored regular expression search.
pub fn regex_match(key: &str, pattern: &str) -> AuthzResult<bool> {
    let re = Regex::new(pattern)
        .map_err(|err| AuthzError::eval(format!("invalid regex {pattern:?}: {err}")))?;
    Ok(re.is_match(key))
}

/// Argument count of a built-in function, `None` when `name` is not one.
pub(crate) fn builtin_arity(name: &str) -> Option<usize> {
    match name {
        "keyMatch" | "keyMatch2" | "regexMatch" => Some(2),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Value<'a> {
    Str(&'a str),
    Bool(bool),
}

impl<'a> Value<'a> {
    fn truthy(self) -> AuthzResult<bool> {
        match self {
            Value::Bool(value) => Ok(value),
            Value::Str(value) => Err(AuthzError::eval(format!(
                "expected a boolean, found string {value:?}"
            ))),
        }
    }

    /// Equality is only defined between values of the same type.
    fn equals(self, other: Value<'a>) -> AuthzResult<bool> {
        match (self, other) {
            (Value::Str(lhs), Value::Str(rhs)) => Ok(lhs == rhs),
            (Value::Bool(lhs), Value::Bool(rhs)) => Ok(lhs == rhs),
            (lhs, rhs) => Err(AuthzError::eval(format!(
                "cannot compare {lhs:?} with {rhs:?}"
            ))),
        }
    }

    fn text(self) -> AuthzResult<&'a str> {
        match self {
            Value::Str(value) => Ok(value),
            Value::Bool(value) => Err(AuthzError::eval(format!(
                "expected a string, found boolean {value}"
            ))),
        }
    }
}

/// Bindings for evaluating the matcher against one candidate rule.
pub struct EvalContext<'a> {
    pub model: &'a Model,
    pub request: &'a [String],
    pub policy: &'a [&'a str],
    pub roles: &'a HashMap<String, RoleGraph>,
}

impl<'a> EvalContext<'a> {
    /// Evaluate `expr` to a boolean.
    pub fn matches(&self, expr: &'a Expr) -> AuthzResult<bool> {
        self.eval(expr)?.truthy()
    }

    fn eval(&self, expr: &'a Expr) -> AuthzResult<Value<'a>> {
        match expr {
            Expr::Str(value) => Ok(Value::Str(value)),
            Expr::Bool(value) => Ok(Value::Bool(*value)),
            Expr::Var { scope, field } => self.lookup(*scope, field),
            Expr::Not(inner) => Ok(Value::Bool(!self.eval(inner)?.truthy()?)),
            Expr::And(lhs, rhs) => {
                Ok(Value::Bool(self.eval(lhs)?.truthy()? && self.eval(rhs)?.truthy()?))
            }
            Expr::Or(lhs, rhs) => {
                Ok(Value::Bool(self.eval(lhs)?.truthy()? || self.eval(rhs)?.truthy()?))
            }
            Expr::Eq(lhs, rhs) => Ok(Value::Bool(self.eval(lhs)?.equals(self.eval(rhs)?)?)),
            Expr::Ne(lhs, rhs) => Ok(Value::Bool(!self.eval(lhs)?.equals(self.eval(rhs)?)?)),
            Expr::Call { name, args } => self.call(name, args),
        }
    }

    fn lookup(&self, scope: Scope, field: &str) -> AuthzResult<Value<'a>> {
        let value = match scope {
            Scope::Request => self
                .model
                .request()
                .position(field)
                .and_then(|index| self.request.get(index))
                .map(String::as_str),
            Scope::Policy => self
                .model
                .primary_policy()
                .position(field)
                .and_then(|index| self.policy.get(index).copied()),
        };
        value
            .map(Value::Str)
            .ok_or_else(|| AuthzError::eval(format!("no value bound for {field}")))
    }

    fn call(&self, name: &str, args: &'a [Expr]) -> AuthzResult<Value<'a>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg)?.text()?);
        }
        if let Some(graph) = self.roles.get(name) {
            return match values.as_slice() {
                [member, group] => Ok(Value::Bool(graph.has_link(member, group, None))),
                [member, group, domain] => {
                    Ok(Value::Bool(graph.has_link(member, group, Some(*domain))))
                }
                _ => Err(AuthzError::eval(format!(
                    "{name} called with {} arguments",
                    values.len()
                ))),
            };
        }
        match (name, values.as_slice()) {
            ("keyMatch", [key, pattern]) => Ok(Value::Bool(key_match(key, pattern))),
            ("keyMatch2", [key, pattern]) => Ok(Value::Bool(key_match2(key, pattern))),
            ("regexMatch", [key, pattern]) => Ok(Value::Bool(regex_match(key, pattern)?)),
            _ => Err(AuthzError::eval(format!(
                "cannot call {name} with {} arguments",
                values.len()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::default_model;

    #[test]
    fn key_match_prefix_wildcard() {
        assert!(key_match("/pets/1", "/pets/*"));
        assert!(key_match("/pets/", "/pets/*"));
        assert!(key_match("/pets", "/pets"));
        assert!(!key_match("/pet", "/pets/*"));
        assert!(!key_match("/pets/1", "/pets"));
    }

    #[test]
    fn key_match2_named_segments() {
        assert!(key_match2("/pets/42", "/pets/:id"));
        assert!(key_match2("/pets/42/toys/7", "/pets/:id/toys/:toy"));
        assert!(!key_match2("/pets/", "/pets/:id"));
        assert!(!key_match2("/pets/42/toys", "/pets/:id"));
        assert!(key_match2("/pets/42/toys", "/pets/*"));
        assert!(!key_match2("/pets", "/pets/*"));
        assert!(key_match2("/pets.json", "/pets.json"));
        assert!(!key_match2("/petsxjson", "/pets.json"));
    }

    #[test]
    fn regex_match_is_unanchored_and_rejects_bad_patterns() {
        assert!(regex_match("GET", "GET|POST").expect("regex"));
        assert!(regex_match("/admin/users", "^/admin").expect("regex"));
        assert!(!regex_match("DELETE", "^(GET|POST)$").expect("regex"));
        assert!(matches!(regex_match("x", "(["), Err(AuthzError::Eval(_))));
    }

    #[test]
    fn evaluates_default_matcher_with_roles() {
        let model = default_model();
        let mut roles = HashMap::new();
        let mut g = RoleGraph::new();
        g.add_link("alice", "admins", None);
        roles.insert("g".to_string(), g);
        roles.insert("g2".to_string(), RoleGraph::new());

        let request = vec!["alice".to_string(), "/pets".to_string(), "GET".to_string()];
        let allowed = EvalContext {
            model: &model,
            request: &request,
            policy: &["admins", "/pets", "GET"],
            roles: &roles,
        };
        assert!(allowed.matches(model.matcher()).expect("eval"));

        let other_action = EvalContext {
            policy: &["admins", "/pets", "POST"],
            ..allowed
        };
        assert!(!other_action.matches(model.matcher()).expect("eval"));
    }

    #[test]
    fn boolean_operators_on_strings_fail() {
        let model = default_model();
        let roles = HashMap::new();
        let request = vec!["alice".to_string(), "/pets".to_string(), "GET".to_string()];
        let ctx = EvalContext {
            model: &model,
            request: &request,
            policy: &["alice", "/pets", "GET"],
            roles: &roles,
        };
        let expr = Expr::parse("r.sub && r.obj == p.obj").expect("parse");
        assert!(matches!(ctx.matches(&expr), Err(AuthzError::Eval(_))));
        let expr = Expr::parse("r.sub").expect("parse");
        assert!(ctx.matches(&expr).is_err());
        let expr = Expr::parse("r.sub != 'bob' || false").expect("parse");
        assert!(ctx.matches(&expr).expect("eval"));
    }

    #[test]
    fn comparing_strings_with_booleans_fails() {
        let model = default_model();
        let roles = HashMap::new();
        let request = vec!["alice".to_string(), "/pets".to_string(), "GET".to_string()];
        let ctx = EvalContext {
            model: &model,
            request: &request,
            policy: &["alice", "/pets", "GET"],
            roles: &roles,
        };
        for source in ["r.sub == true", "r.sub != false", "false == p.act"] {
            let expr = Expr::parse(source).expect("parse");
            assert!(
                matches!(ctx.matches(&expr), Err(AuthzError::Eval(_))),
                "{source} should fail"
            );
        }
        let expr = Expr::parse("(r.sub == p.sub) == true").expect("parse");
        assert!(ctx.matches(&expr).expect("eval"));
    }
}
