//! In-memory implementation of the policy store.
//!
//! # Purpose
//! Keeps rules in a `HashMap` guarded by `tokio::sync::RwLock`. Used for local
//! development, tests and deployments that seed their rules from config.
//!
//! # Durability and consistency
//! - **Not durable**: all rules are lost on process restart.
//! - Writes take the write lock, so a decision that starts after a write
//!   returns observes it.
//! - Each rule remembers its creation sequence so `list` can return newest
//!   first; updates keep the original position.
use super::{PolicyStore, StoreError, StoreResult, generate_id, prepare};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use warden_authz::{Model, PolicyRule};

#[derive(Debug, Default)]
struct Rules {
    next_seq: u64,
    by_id: HashMap<String, (u64, PolicyRule)>,
}

pub struct InMemoryPolicyStore {
    model: Arc<Model>,
    rules: Arc<RwLock<Rules>>,
}

impl InMemoryPolicyStore {
    pub fn new(model: Arc<Model>) -> Self {
        Self {
            model,
            rules: Arc::new(RwLock::new(Rules::default())),
        }
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn create(&self, rule: PolicyRule) -> StoreResult<String> {
        let mut rules = self.rules.write().await;
        let id = match rule.id.clone() {
            Some(id) if rules.by_id.contains_key(&id) => return Err(StoreError::Conflict(id)),
            Some(id) => id,
            None => loop {
                let candidate = generate_id();
                if !rules.by_id.contains_key(&candidate) {
                    break candidate;
                }
            },
        };
        let rule = prepare(&self.model, rule, &id)?;
        let seq = rules.next_seq;
        rules.next_seq += 1;
        rules.by_id.insert(id.clone(), (seq, rule));
        metrics::gauge!("warden_policy_rules_total").set(rules.by_id.len() as f64);
        Ok(id)
    }

    async fn list(&self, limit: Option<usize>) -> StoreResult<Vec<PolicyRule>> {
        let rules = self.rules.read().await;
        let mut entries: Vec<&(u64, PolicyRule)> = rules.by_id.values().collect();
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(entries
            .into_iter()
            .take(limit.filter(|&cap| cap > 0).unwrap_or(usize::MAX))
            .map(|(_, rule)| rule.clone())
            .collect())
    }

    async fn get(&self, id: &str) -> StoreResult<PolicyRule> {
        let rules = self.rules.read().await;
        rules
            .by_id
            .get(id)
            .map(|(_, rule)| rule.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn update(&self, id: &str, rule: PolicyRule) -> StoreResult<String> {
        let mut rules = self.rules.write().await;
        let Some(entry) = rules.by_id.get_mut(id) else {
            return Err(StoreError::NotFound(id.to_string()));
        };
        entry.1 = prepare(&self.model, rule, id)?;
        Ok(id.to_string())
    }

    async fn delete(&self, id: &str) -> StoreResult<String> {
        let mut rules = self.rules.write().await;
        if rules.by_id.remove(id).is_none() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        metrics::gauge!("warden_policy_rules_total").set(rules.by_id.len() as f64);
        Ok(id.to_string())
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
