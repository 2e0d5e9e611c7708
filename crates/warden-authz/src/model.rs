//! PERM model loading.
//!
//! # Purpose
//! Parses a Policy-Effect-Request-Matcher definition into an immutable
//! [`Model`] that drives both write-time rule validation and enforcement.
//!
//! # Key invariants
//! - `[request_definition]`, `[policy_definition]` and `[matchers]` are required.
//! - `[policy_effect]` defaults to allow-override when omitted.
//! - The matcher only references declared `r.`/`p.` fields, declared role
//!   relations and the built-in functions in [`crate::matcher`].
//!
//! # Common pitfalls
//! - Role definitions are written as placeholders (`g = _, _`); field names
//!   are not allowed there.
//! - Only the primary matcher `m` and request definition `r` are supported.
use crate::effect::PolicyEffect;
use crate::expr::{Expr, Scope};
use crate::matcher::builtin_arity;
use crate::rule::{MAX_RULE_PARAMS, PolicyRule, RuleSection};
use crate::{AuthzError, AuthzResult, DEFAULT_MODEL};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Where to load a model from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ModelSource {
    /// The built-in role-based model.
    #[default]
    Default,
    File(PathBuf),
    Text(String),
}

/// Named, ordered field list such as `p = sub, obj, act`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub key: String,
    pub fields: Vec<String>,
}

impl Definition {
    pub fn arity(&self) -> usize {
        self.fields.len()
    }

    pub fn position(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|candidate| candidate == field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Request,
    Policy,
    Role,
    Effect,
    Matchers,
}

impl Section {
    fn from_header(header: &str) -> Option<Self> {
        match header {
            "request_definition" => Some(Section::Request),
            "policy_definition" => Some(Section::Policy),
            "role_definition" => Some(Section::Role),
            "policy_effect" => Some(Section::Effect),
            "matchers" => Some(Section::Matchers),
            _ => None,
        }
    }

    fn key_prefix(&self) -> char {
        match self {
            Section::Request => 'r',
            Section::Policy => 'p',
            Section::Role => 'g',
            Section::Effect => 'e',
            Section::Matchers => 'm',
        }
    }

    fn header(&self) -> &'static str {
        match self {
            Section::Request => "request_definition",
            Section::Policy => "policy_definition",
            Section::Role => "role_definition",
            Section::Effect => "policy_effect",
            Section::Matchers => "matchers",
        }
    }
}

/// Immutable PERM model.
#[derive(Debug, Clone)]
pub struct Model {
    request: Definition,
    policies: BTreeMap<String, Definition>,
    roles: BTreeMap<String, usize>,
    effect: PolicyEffect,
    matcher: Expr,
}

impl Model {
    /// Load a model from a file, inline text, or the built-in default.
    pub fn load(source: &ModelSource) -> AuthzResult<Self> {
        match source {
            ModelSource::Default => Self::parse(DEFAULT_MODEL),
            ModelSource::File(path) => Self::from_file(path),
            ModelSource::Text(text) => Self::parse(text),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> AuthzResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| AuthzError::ModelIo {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parse model text in PERM section syntax.
    pub fn parse(text: &str) -> AuthzResult<Self> {
        let mut entries: BTreeMap<String, (Section, String)> = BTreeMap::new();
        let mut section: Option<Section> = None;

        for (line_no, line) in logical_lines(text) {
            if let Some(header) = line.strip_prefix('[') {
                let header = header.strip_suffix(']').ok_or_else(|| {
                    AuthzError::parse(format!("line {line_no}: unterminated section header"))
                })?;
                section = Some(Section::from_header(header.trim()).ok_or_else(|| {
                    AuthzError::parse(format!("line {line_no}: unknown section [{header}]"))
                })?);
                continue;
            }
            let current = section.ok_or_else(|| {
                AuthzError::parse(format!("line {line_no}: entry outside of a section"))
            })?;
            let (key, value) = line.split_once('=').ok_or_else(|| {
                AuthzError::parse(format!("line {line_no}: expected 'key = value'"))
            })?;
            let key = key.trim();
            let value = value.trim();
            validate_key(current, key, line_no)?;
            if value.is_empty() {
                return Err(AuthzError::parse(format!(
                    "line {line_no}: '{key}' has an empty value"
                )));
            }
            if entries
                .insert(key.to_string(), (current, value.to_string()))
                .is_some()
            {
                return Err(AuthzError::parse(format!(
                    "line {line_no}: duplicate key '{key}'"
                )));
            }
        }

        let mut request = None;
        let mut policies = BTreeMap::new();
        let mut roles = BTreeMap::new();
        let mut effect = None;
        let mut matcher_source = None;

        for (key, (section, value)) in entries {
            match section {
                Section::Request => {
                    request = Some(Definition {
                        fields: parse_fields(&key, &value)?,
                        key,
                    });
                }
                Section::Policy => {
                    let fields = parse_fields(&key, &value)?;
                    policies.insert(key.clone(), Definition { key, fields });
                }
                Section::Role => {
                    let arity = parse_role_arity(&key, &value)?;
                    roles.insert(key, arity);
                }
                Section::Effect => effect = Some(PolicyEffect::parse(&value)?),
                Section::Matchers => matcher_source = Some(value),
            }
        }

        let request = request.ok_or_else(|| missing(Section::Request))?;
        if !policies.contains_key("p") {
            return Err(missing(Section::Policy));
        }
        let matcher_source = matcher_source.ok_or_else(|| missing(Section::Matchers))?;
        let matcher = Expr::parse(&matcher_source)?;

        let model = Self {
            request,
            policies,
            roles,
            effect: effect.unwrap_or_default(),
            matcher,
        };
        model.check_matcher()?;
        Ok(model)
    }

    fn check_matcher(&self) -> AuthzResult<()> {
        let primary = self.primary_policy();
        let mut problem: Option<String> = None;
        self.matcher.walk(&mut |node| {
            if problem.is_some() {
                return;
            }
            match node {
                Expr::Var {
                    scope: Scope::Request,
                    field,
                } if self.request.position(field).is_none() => {
                    problem = Some(format!("matcher references undefined field r.{field}"));
                }
                Expr::Var {
                    scope: Scope::Policy,
                    field,
                } if primary.position(field).is_none() => {
                    problem = Some(format!("matcher references undefined field p.{field}"));
                }
                Expr::Call { name, args } => {
                    let expected = self
                        .roles
                        .get(name)
                        .copied()
                        .or_else(|| builtin_arity(name));
                    match expected {
                        None => problem = Some(format!("matcher calls unknown function {name}")),
                        Some(arity) if arity != args.len() => {
                            problem = Some(format!(
                                "{name} expects {arity} arguments, matcher passes {}",
                                args.len()
                            ));
                        }
                        Some(_) => {}
                    }
                }
                _ => {}
            }
        });
        match problem {
            Some(message) => Err(AuthzError::ModelParse(message)),
            None => Ok(()),
        }
    }

    pub fn request(&self) -> &Definition {
        &self.request
    }

    /// The `p` definition the matcher binds `p.*` fields from.
    pub fn primary_policy(&self) -> &Definition {
        // Presence of `p` is checked in `parse`.
        &self.policies["p"]
    }

    pub fn policy(&self, policy_type: &str) -> Option<&Definition> {
        self.policies.get(policy_type)
    }

    /// Role definition names with their arity (2 or 3).
    pub fn roles(&self) -> impl Iterator<Item = (&str, usize)> {
        self.roles.iter().map(|(key, arity)| (key.as_str(), *arity))
    }

    pub fn effect(&self) -> PolicyEffect {
        self.effect
    }

    pub fn matcher(&self) -> &Expr {
        &self.matcher
    }

    /// Section in which `policy_type` is defined.
    pub fn section_of(&self, policy_type: &str) -> Option<RuleSection> {
        if self.policies.contains_key(policy_type) {
            Some(RuleSection::Policy)
        } else if self.roles.contains_key(policy_type) {
            Some(RuleSection::Grouping)
        } else {
            None
        }
    }

    /// Number of parameters a rule of `policy_type` must carry.
    pub fn rule_arity(&self, policy_type: &str) -> Option<usize> {
        self.policies
            .get(policy_type)
            .map(Definition::arity)
            .or_else(|| self.roles.get(policy_type).copied())
    }

    /// Write-time validation of a rule against this model.
    ///
    /// # Errors
    /// - [`AuthzError::InvalidPolicyType`] when `policy_type` is not defined.
    /// - [`AuthzError::InvalidRule`] when the section disagrees with the
    ///   definition, or parameters have gaps or the wrong count.
    pub fn validate_rule(&self, rule: &PolicyRule) -> AuthzResult<()> {
        let section = self
            .section_of(&rule.policy_type)
            .ok_or_else(|| AuthzError::InvalidPolicyType(rule.policy_type.clone()))?;
        if section != rule.rule_section {
            return Err(AuthzError::InvalidRule(format!(
                "policy type {} belongs to section {section}, not {}",
                rule.policy_type, rule.rule_section
            )));
        }
        let values = rule.rule.values()?;
        let expected = self.rule_arity(&rule.policy_type).unwrap_or_default();
        if values.len() != expected {
            return Err(AuthzError::InvalidRule(format!(
                "policy type {} takes {expected} parameters, got {}",
                rule.policy_type,
                values.len()
            )));
        }
        Ok(())
    }
}

impl FromStr for Model {
    type Err = AuthzError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::parse(text)
    }
}

fn missing(section: Section) -> AuthzError {
    AuthzError::parse(format!(
        "missing required [{}] entry '{}'",
        section.header(),
        section.key_prefix()
    ))
}

/// Join `\` continuations, drop blank and `#` comment lines.
fn logical_lines(text: &str) -> Vec<(usize, String)> {
    let mut lines = Vec::new();
    let mut pending: Option<(usize, String)> = None;
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if pending.is_none() && (line.is_empty() || line.starts_with('#')) {
            continue;
        }
        let (continues, body) = match line.strip_suffix('\\') {
            Some(body) => (true, body.trim_end()),
            None => (false, line),
        };
        let (start, mut joined) = pending.take().unwrap_or((index + 1, String::new()));
        if !joined.is_empty() && !body.is_empty() {
            joined.push(' ');
        }
        joined.push_str(body);
        if continues {
            pending = Some((start, joined));
        } else {
            lines.push((start, joined));
        }
    }
    if let Some(last) = pending {
        lines.push(last);
    }
    lines
}

fn validate_key(section: Section, key: &str, line_no: usize) -> AuthzResult<()> {
    let mut chars = key.chars();
    let prefix_ok = chars.next() == Some(section.key_prefix());
    let suffix_ok = chars.all(|c| c.is_ascii_digit());
    if !prefix_ok || !suffix_ok {
        return Err(AuthzError::parse(format!(
            "line {line_no}: key '{key}' is not valid in [{}]",
            section.header()
        )));
    }
    let multiple_allowed = matches!(section, Section::Policy | Section::Role);
    if !multiple_allowed && key.len() > 1 {
        return Err(AuthzError::parse(format!(
            "line {line_no}: only '{}' is supported in [{}]",
            section.key_prefix(),
            section.header()
        )));
    }
    Ok(())
}

fn parse_fields(key: &str, value: &str) -> AuthzResult<Vec<String>> {
    let fields: Vec<String> = value.split(',').map(|f| f.trim().to_string()).collect();
    for field in &fields {
        let valid = !field.is_empty()
            && field
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(AuthzError::parse(format!(
                "{key}: invalid field name '{field}'"
            )));
        }
    }
    for (index, field) in fields.iter().enumerate() {
        if fields[..index].contains(field) {
            return Err(AuthzError::parse(format!("{key}: duplicate field '{field}'")));
        }
    }
    if fields.len() > MAX_RULE_PARAMS && key.starts_with('p') {
        return Err(AuthzError::parse(format!(
            "{key}: at most {MAX_RULE_PARAMS} fields are supported"
        )));
    }
    Ok(fields)
}

fn parse_role_arity(key: &str, value: &str) -> AuthzResult<usize> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.iter().any(|part| *part != "_") {
        return Err(AuthzError::parse(format!(
            "{key}: role definitions use '_' placeholders"
        )));
    }
    match parts.len() {
        2 | 3 => Ok(parts.len()),
        other => Err(AuthzError::parse(format!(
            "{key}: role definitions take 2 or 3 placeholders, got {other}"
        ))),
    }
}
