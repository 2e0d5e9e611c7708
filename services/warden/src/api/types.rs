//! HTTP API request/response types.
//!
//! # Purpose
//! Defines the JSON shapes of the permission API and their OpenAPI schemas.
//! `Permission` is also the seed-rule format in the configuration file.
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use warden_authz::{AuthzError, Model, PolicyRule, RuleParams, RuleSection};

/// Positional rule parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct PermissionRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v0: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v3: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v5: Option<String>,
}

impl From<PermissionRule> for RuleParams {
    fn from(rule: PermissionRule) -> Self {
        RuleParams {
            v0: rule.v0,
            v1: rule.v1,
            v2: rule.v2,
            v3: rule.v3,
            v4: rule.v4,
            v5: rule.v5,
        }
    }
}

impl From<RuleParams> for PermissionRule {
    fn from(params: RuleParams) -> Self {
        PermissionRule {
            v0: params.v0,
            v1: params.v1,
            v2: params.v2,
            v3: params.v3,
            v4: params.v4,
            v5: params.v5,
        }
    }
}

/// A permission rule as exchanged over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "rule_section": "p",
    "policy_type": "p",
    "rule": {"v0": "alice", "v1": "/pets", "v2": "POST"}
}))]
pub struct Permission {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// `p` or `g`; inferred from `policy_type` when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_section: Option<String>,
    pub policy_type: String,
    #[serde(default)]
    pub rule: PermissionRule,
}

impl Permission {
    /// Convert to a [`PolicyRule`], inferring the section from `model`.
    pub fn into_rule(self, model: &Model) -> Result<PolicyRule, AuthzError> {
        let rule_section = match self.rule_section.as_deref() {
            Some(section) => section.parse()?,
            None => model
                .section_of(&self.policy_type)
                .unwrap_or(RuleSection::Policy),
        };
        Ok(PolicyRule {
            id: self.id,
            rule_section,
            policy_type: self.policy_type,
            rule: self.rule.into(),
        })
    }
}

impl From<PolicyRule> for Permission {
    fn from(rule: PolicyRule) -> Self {
        Permission {
            id: rule.id,
            rule_section: Some(rule.rule_section.to_string()),
            policy_type: rule.policy_type,
            rule: rule.rule.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Maximum number of rules to return.
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct HealthStatus {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status code.
    pub code: u16,
    pub message: String,
}
