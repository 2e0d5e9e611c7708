//! Rule evaluation against a loaded model.
//!
//! # Purpose
//! [`Enforcer`] answers "may subject S perform action A on object O?" for a
//! snapshot of stored rules. It holds no rules itself, so callers decide
//! whether to evaluate against a fresh read or a cached copy.
//!
//! # Key invariants
//! - No policy rules means deny; the matcher is not evaluated.
//! - Grouping rules build one role graph per role definition.
//! - Rules whose parameter count disagrees with their definition are skipped.
use crate::effect::RuleEffect;
use crate::matcher::EvalContext;
use crate::roles::RoleGraph;
use crate::rule::{AccessRequest, PolicyRule, RuleSection};
use crate::{AuthzError, AuthzResult, Model};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Enforcer {
    model: Arc<Model>,
}

impl Enforcer {
    pub fn new(model: Arc<Model>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Build role graphs from the grouping rules in `rules`.
    pub fn role_graphs(&self, rules: &[PolicyRule]) -> HashMap<String, RoleGraph> {
        let mut graphs: HashMap<String, RoleGraph> = self
            .model
            .roles()
            .map(|(key, _)| (key.to_string(), RoleGraph::new()))
            .collect();
        for rule in rules
            .iter()
            .filter(|rule| rule.rule_section == RuleSection::Grouping)
        {
            let Some(graph) = graphs.get_mut(&rule.policy_type) else {
                tracing::warn!(policy_type = %rule.policy_type, "grouping rule without role definition skipped");
                continue;
            };
            let arity = self.model.rule_arity(&rule.policy_type);
            match rule.rule.values() {
                Ok(values) if Some(values.len()) == arity => match values.as_slice() {
                    [member, group] => graph.add_link(member, group, None),
                    [member, group, domain] => graph.add_link(member, group, Some(*domain)),
                    _ => {}
                },
                _ => {
                    tracing::warn!(id = ?rule.id, policy_type = %rule.policy_type, "malformed grouping rule skipped");
                }
            }
        }
        graphs
    }

    /// Evaluate `request` against `rules`.
    ///
    /// # Errors
    /// - [`AuthzError::RequestArity`] when the request does not fit `r`.
    /// - [`AuthzError::Eval`] when the matcher fails on a candidate rule.
    pub fn enforce(&self, rules: &[PolicyRule], request: &AccessRequest) -> AuthzResult<bool> {
        let expected = self.model.request().arity();
        if request.values().len() != expected {
            return Err(AuthzError::RequestArity {
                expected,
                actual: request.values().len(),
            });
        }

        let primary = self.model.primary_policy();
        let candidates: Vec<Vec<&str>> = rules
            .iter()
            .filter(|rule| {
                rule.rule_section == RuleSection::Policy && rule.policy_type == primary.key
            })
            .filter_map(|rule| match rule.rule.values() {
                Ok(values) if values.len() == primary.arity() => Some(values),
                _ => {
                    tracing::warn!(id = ?rule.id, "policy rule does not fit model, skipped");
                    None
                }
            })
            .collect();
        if candidates.is_empty() {
            tracing::debug!(%request, "no policy rules, denying");
            return Ok(false);
        }

        let roles = self.role_graphs(rules);
        let eft = primary.position("eft");
        let mut matched = Vec::new();
        for policy in &candidates {
            let ctx = EvalContext {
                model: self.model(),
                request: request.values(),
                policy: policy.as_slice(),
                roles: &roles,
            };
            if ctx.matches(self.model.matcher())? {
                let effect = match eft {
                    Some(index) => RuleEffect::from_eft(policy[index]),
                    None => RuleEffect::Allow,
                };
                matched.push(effect);
            }
        }
        let allowed = self.model.effect().resolve(matched);
        tracing::debug!(%request, allowed, "enforced");
        Ok(allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::default_model;

    fn enforcer() -> Enforcer {
        Enforcer::new(Arc::new(default_model()))
    }

    fn p(values: [&str; 3]) -> PolicyRule {
        PolicyRule::policy("p", values).expect("rule")
    }

    fn g(ptype: &str, member: &str, group: &str) -> PolicyRule {
        PolicyRule::grouping(ptype, [member, group]).expect("rule")
    }

    #[test]
    fn empty_rules_deny() {
        let request = AccessRequest::new("alice", "/pets", "GET");
        assert!(!enforcer().enforce(&[], &request).expect("enforce"));
        let only_groups = vec![g("g", "alice", "admins")];
        assert!(!enforcer().enforce(&only_groups, &request).expect("enforce"));
    }

    #[test]
    fn direct_rule_allows_exact_match_only() {
        let rules = vec![p(["alice", "/pets", "GET"])];
        let e = enforcer();
        assert!(e.enforce(&rules, &AccessRequest::new("alice", "/pets", "GET")).expect("enforce"));
        assert!(!e.enforce(&rules, &AccessRequest::new("alice", "/pets", "POST")).expect("enforce"));
        assert!(!e.enforce(&rules, &AccessRequest::new("bob", "/pets", "GET")).expect("enforce"));
    }

    #[test]
    fn subject_and_object_groups_apply() {
        let rules = vec![
            p(["admins", "pets", "DELETE"]),
            g("g", "alice", "staff"),
            g("g", "staff", "admins"),
            g("g2", "/pets/1", "pets"),
        ];
        let e = enforcer();
        assert!(e
            .enforce(&rules, &AccessRequest::new("alice", "/pets/1", "DELETE"))
            .expect("enforce"));
        assert!(!e
            .enforce(&rules, &AccessRequest::new("alice", "/pets/2", "DELETE"))
            .expect("enforce"));
        assert!(!e
            .enforce(&rules, &AccessRequest::new("bob", "/pets/1", "DELETE"))
            .expect("enforce"));
    }

    #[test]
    fn request_arity_is_checked() {
        let rules = vec![p(["alice", "/pets", "GET"])];
        let request = AccessRequest::from_values(["alice", "/pets"]);
        let err = enforcer().enforce(&rules, &request).unwrap_err();
        assert!(matches!(
            err,
            AuthzError::RequestArity {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn malformed_rules_are_skipped() {
        let short = PolicyRule::policy("p", ["alice", "/pets"]).expect("rule");
        let rules = vec![short, p(["bob", "/pets", "GET"])];
        let e = enforcer();
        assert!(!e.enforce(&rules, &AccessRequest::new("alice", "/pets", "GET")).expect("enforce"));
        assert!(e.enforce(&rules, &AccessRequest::new("bob", "/pets", "GET")).expect("enforce"));
    }

    #[test]
    fn deny_rules_override_with_eft() {
        let model = Model::parse(
            r#"
[request_definition]
r = sub, obj, act
[policy_definition]
p = sub, obj, act, eft
[role_definition]
g = _, _
[policy_effect]
e = some(where (p.eft == allow)) && !some(where (p.eft == deny))
[matchers]
m = g(r.sub, p.sub) && keyMatch2(r.obj, p.obj) && regexMatch(r.act, p.act)
"#,
        )
        .expect("model");
        let e = Enforcer::new(Arc::new(model));
        let rules = vec![
            PolicyRule::policy("p", ["staff", "/pets/*", "GET|POST", "allow"]).expect("rule"),
            PolicyRule::policy("p", ["interns", "/pets/:id", "POST", "deny"]).expect("rule"),
            g("g", "carol", "staff"),
            g("g", "carol", "interns"),
        ];
        assert!(e.enforce(&rules, &AccessRequest::new("carol", "/pets/7", "GET")).expect("enforce"));
        assert!(!e.enforce(&rules, &AccessRequest::new("carol", "/pets/7", "POST")).expect("enforce"));
        assert!(e
            .enforce(&rules, &AccessRequest::new("carol", "/pets/7/toys", "POST"))
            .expect("enforce"));
    }

    #[test]
    fn invalid_regex_surfaces_eval_error() {
        let model = Model::parse(
            "[request_definition]\nr = sub, obj, act\n[policy_definition]\np = sub, obj, act\n[matchers]\nm = r.sub == p.sub && regexMatch(r.obj, p.obj)",
        )
        .expect("model");
        let e = Enforcer::new(Arc::new(model));
        let rules = vec![p(["alice", "([", "GET"])];
        let err = e
            .enforce(&rules, &AccessRequest::new("alice", "/x", "GET"))
            .unwrap_err();
        assert!(matches!(err, AuthzError::Eval(_)));
    }

    #[test]
    fn domain_roles_are_scoped() {
        let model = Model::parse(
            "[request_definition]\nr = sub, dom, obj, act\n[policy_definition]\np = sub, dom, obj, act\n[role_definition]\ng = _, _, _\n[matchers]\nm = g(r.sub, p.sub, r.dom) && r.dom == p.dom && r.obj == p.obj && r.act == p.act",
        )
        .expect("model");
        let e = Enforcer::new(Arc::new(model));
        let rules = vec![
            PolicyRule::policy("p", ["admin", "t1", "/pets", "GET"]).expect("rule"),
            PolicyRule::grouping("g", ["alice", "admin", "t1"]).expect("rule"),
        ];
        let allowed = AccessRequest::from_values(["alice", "t1", "/pets", "GET"]);
        let other_tenant = AccessRequest::from_values(["alice", "t2", "/pets", "GET"]);
        assert!(e.enforce(&rules, &allowed).expect("enforce"));
        assert!(!e.enforce(&rules, &other_tenant).expect("enforce"));
    }
}
