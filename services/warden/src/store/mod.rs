//! Policy rule persistence.
//!
//! Backends validate every write against the loaded [`Model`] before
//! persisting it, so rules read back are always well-formed for the model
//! they were written under.
use async_trait::async_trait;
use rand::Rng;
use rand::distributions::Alphanumeric;
use thiserror::Error;
use warden_authz::{AuthzError, Model, PolicyRule};

pub mod memory;
pub mod postgres;

/// Length of generated rule ids.
pub const ID_LENGTH: usize = 6;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("unknown policy type: {0}")]
    InvalidPolicyType(String),
    #[error("invalid rule: {0}")]
    InvalidRule(String),
    #[error("store unavailable: {0}")]
    Unavailable(#[from] anyhow::Error),
}

impl From<AuthzError> for StoreError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::InvalidPolicyType(policy_type) => StoreError::InvalidPolicyType(policy_type),
            AuthzError::InvalidRule(message) => StoreError::InvalidRule(message),
            other => StoreError::InvalidRule(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Persist `rule`, generating an id when it has none. Returns the id.
    async fn create(&self, rule: PolicyRule) -> StoreResult<String>;
    /// Rules newest first, at most `limit` of them. `None` and `Some(0)`
    /// both list every rule.
    async fn list(&self, limit: Option<usize>) -> StoreResult<Vec<PolicyRule>>;
    async fn get(&self, id: &str) -> StoreResult<PolicyRule>;
    /// Replace the rule stored under `id`. Returns the id.
    async fn update(&self, id: &str, rule: PolicyRule) -> StoreResult<String>;
    /// Remove the rule stored under `id`. Returns the id.
    async fn delete(&self, id: &str) -> StoreResult<String>;

    async fn health_check(&self) -> StoreResult<()>;
    fn is_durable(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}

pub fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LENGTH)
        .map(char::from)
        .collect()
}

/// Validate `rule` for storage under `id`.
pub(crate) fn prepare(model: &Model, mut rule: PolicyRule, id: &str) -> StoreResult<PolicyRule> {
    model.validate_rule(&rule)?;
    rule.id = Some(id.to_string());
    Ok(rule)
}

/// Create each seed rule, skipping rules whose id or content already exists.
pub async fn seed(store: &dyn PolicyStore, rules: Vec<PolicyRule>) -> StoreResult<usize> {
    let existing = store.list(None).await?;
    let mut created = 0;
    for rule in rules {
        let duplicate = existing.iter().any(|current| {
            current.rule_section == rule.rule_section
                && current.policy_type == rule.policy_type
                && current.rule == rule.rule
        });
        if duplicate {
            tracing::debug!(policy_type = %rule.policy_type, "seed rule already present");
            continue;
        }
        match store.create(rule).await {
            Ok(id) => {
                tracing::debug!(%id, "seeded policy rule");
                created += 1;
            }
            Err(StoreError::Conflict(id)) => {
                tracing::info!(%id, "seed rule already present");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(created)
}
