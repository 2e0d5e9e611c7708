use crate::{AuthzError, AuthzResult};

/// Outcome contributed by a single matched rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleEffect {
    Allow,
    Deny,
    Indeterminate,
}

impl RuleEffect {
    /// Interpret a rule's `eft` field.
    pub fn from_eft(value: &str) -> Self {
        match value {
            "allow" => RuleEffect::Allow,
            "deny" => RuleEffect::Deny,
            _ => RuleEffect::Indeterminate,
        }
    }
}

/// Combinator declared in `[policy_effect]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyEffect {
    /// `some(where (p.eft == allow))`
    #[default]
    AllowOverride,
    /// `!some(where (p.eft == deny))`
    DenyOverride,
    /// `some(where (p.eft == allow)) && !some(where (p.eft == deny))`
    AllowAndDeny,
}

const ALLOW_OVERRIDE: &str = "some(where(p.eft==allow))";
const DENY_OVERRIDE: &str = "!some(where(p.eft==deny))";
const ALLOW_AND_DENY: &str = "some(where(p.eft==allow))&&!some(where(p.eft==deny))";

impl PolicyEffect {
    pub fn parse(expression: &str) -> AuthzResult<Self> {
        let compact: String = expression.chars().filter(|c| !c.is_whitespace()).collect();
        match compact.as_str() {
            ALLOW_OVERRIDE => Ok(PolicyEffect::AllowOverride),
            DENY_OVERRIDE => Ok(PolicyEffect::DenyOverride),
            ALLOW_AND_DENY => Ok(PolicyEffect::AllowAndDeny),
            _ => Err(AuthzError::parse(format!(
                "unsupported policy effect: {expression}"
            ))),
        }
    }

    /// Resolve the effects of all matched rules into a decision.
    ///
    /// Only evaluated once at least one rule exists; an empty store is a
    /// deny before this point.
    pub fn resolve<I>(&self, matched: I) -> bool
    where
        I: IntoIterator<Item = RuleEffect>,
    {
        let mut any_allow = false;
        let mut any_deny = false;
        for effect in matched {
            match effect {
                RuleEffect::Allow => any_allow = true,
                RuleEffect::Deny => any_deny = true,
                RuleEffect::Indeterminate => {}
            }
        }
        match self {
            PolicyEffect::AllowOverride => any_allow,
            PolicyEffect::DenyOverride => !any_deny,
            PolicyEffect::AllowAndDeny => any_allow && !any_deny,
        }
    }
}
