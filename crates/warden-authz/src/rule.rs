//! Policy rule and access request primitives.
//!
//! # Purpose
//! Defines the stored permission record (`PolicyRule`) and the transient
//! `(subject, object, action)` tuple evaluated against it.
//!
//! # Key invariants
//! - Rule parameters are positional (`v0`..`v5`) and contiguous from `v0`.
//! - The meaning of each parameter comes from the model definition named by
//!   `policy_type`; see [`crate::Model::validate_rule`].
use crate::{AuthzError, AuthzResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum number of positional parameters a rule can carry.
pub const MAX_RULE_PARAMS: usize = 6;

/// Model section a rule instantiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RuleSection {
    /// Policy rule (`[policy_definition]`).
    #[default]
    #[serde(rename = "p")]
    Policy,
    /// Role/group inheritance rule (`[role_definition]`).
    #[serde(rename = "g")]
    Grouping,
}

impl RuleSection {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleSection::Policy => "p",
            RuleSection::Grouping => "g",
        }
    }
}

impl fmt::Display for RuleSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleSection {
    type Err = AuthzError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "p" => Ok(RuleSection::Policy),
            "g" => Ok(RuleSection::Grouping),
            other => Err(AuthzError::InvalidRule(format!(
                "unknown rule section: {other}"
            ))),
        }
    }
}

/// Positional rule parameters, serialized as `{v0: .., v1: .., ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuleParams {
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

impl RuleParams {
    /// Build parameters from a positional list. Fails above six values.
    pub fn from_values<I, S>(values: I) -> AuthzResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut slots: [Option<String>; MAX_RULE_PARAMS] = Default::default();
        for (index, value) in values.into_iter().enumerate() {
            if index >= MAX_RULE_PARAMS {
                return Err(AuthzError::InvalidRule(format!(
                    "at most {MAX_RULE_PARAMS} rule parameters are supported"
                )));
            }
            slots[index] = Some(value.into());
        }
        let [v0, v1, v2, v3, v4, v5] = slots;
        Ok(Self {
            v0,
            v1,
            v2,
            v3,
            v4,
            v5,
        })
    }

    pub fn slots(&self) -> [Option<&str>; MAX_RULE_PARAMS] {
        [
            self.v0.as_deref(),
            self.v1.as_deref(),
            self.v2.as_deref(),
            self.v3.as_deref(),
            self.v4.as_deref(),
            self.v5.as_deref(),
        ]
    }

    /// Contiguous parameter values starting at `v0`.
    ///
    /// Fails when a later slot is set after an empty one (`v0, v2` without `v1`).
    pub fn values(&self) -> AuthzResult<Vec<&str>> {
        let slots = self.slots();
        let len = slots.iter().take_while(|slot| slot.is_some()).count();
        if let Some(gap) = slots[len..].iter().position(|slot| slot.is_some()) {
            return Err(AuthzError::InvalidRule(format!(
                "rule parameter v{} is set but v{} is missing",
                len + gap,
                len
            )));
        }
        Ok(slots[..len].iter().flatten().copied().collect())
    }
}

/// A stored permission record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub rule_section: RuleSection,
    pub policy_type: String,
    #[serde(default)]
    pub rule: RuleParams,
}

impl PolicyRule {
    /// Convenience constructor for a `p`-section rule.
    pub fn policy<I, S>(policy_type: &str, values: I) -> AuthzResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            id: None,
            rule_section: RuleSection::Policy,
            policy_type: policy_type.to_string(),
            rule: RuleParams::from_values(values)?,
        })
    }

    /// Convenience constructor for a `g`-section rule.
    pub fn grouping<I, S>(policy_type: &str, values: I) -> AuthzResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            id: None,
            rule_section: RuleSection::Grouping,
            policy_type: policy_type.to_string(),
            rule: RuleParams::from_values(values)?,
        })
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Transient access request; values bind positionally to the model's
/// request definition (`r = sub, obj, act` for the built-in model).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest {
    values: Vec<String>,
}

impl AccessRequest {
    pub fn new(
        subject: impl Into<String>,
        object: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            values: vec![subject.into(), object.into(), action.into()],
        }
    }

    /// Build a request for models whose request definition is not `sub, obj, act`.
    pub fn from_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }
}

impl fmt::Display for AccessRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.values.join(", "))
    }
}
