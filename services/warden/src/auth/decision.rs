//! Decision engine over the policy store.
//!
//! # Purpose and responsibility
//! Reads the current rules from the [`PolicyStore`] and evaluates a request
//! with the shared [`Enforcer`]. There is no decision cache: every call sees
//! the writes that completed before it started.
//!
//! # Key invariants and assumptions
//! - [`DecisionEngine::decide`] fails closed: store failures, malformed
//!   requests and matcher errors all yield `false`.
//!
//! # Metrics
//! `warden_decisions_total{outcome="allow"|"deny"|"error"}`.
use crate::store::{PolicyStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use warden_authz::{AccessRequest, AuthzError, Enforcer, Model};

#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("policy store read failed: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Authz(#[from] AuthzError),
}

#[derive(Clone)]
pub struct DecisionEngine {
    enforcer: Enforcer,
    store: Arc<dyn PolicyStore>,
}

impl DecisionEngine {
    pub fn new(model: Arc<Model>, store: Arc<dyn PolicyStore>) -> Self {
        Self {
            enforcer: Enforcer::new(model),
            store,
        }
    }

    pub fn model(&self) -> &Model {
        self.enforcer.model()
    }

    /// Whether `request` is permitted. Never errors; see [`Self::evaluate`].
    pub async fn decide(&self, request: &AccessRequest) -> bool {
        match self.evaluate(request).await {
            Ok(allowed) => {
                let outcome = if allowed { "allow" } else { "deny" };
                metrics::counter!("warden_decisions_total", "outcome" => outcome).increment(1);
                allowed
            }
            Err(err) => {
                tracing::warn!(%request, error = %err, "access decision failed, denying");
                metrics::counter!("warden_decisions_total", "outcome" => "error").increment(1);
                false
            }
        }
    }

    /// Evaluate `request` against a fresh read of every stored rule.
    pub async fn evaluate(&self, request: &AccessRequest) -> Result<bool, DecisionError> {
        let rules = self.store.list(None).await?;
        Ok(self.enforcer.enforce(&rules, request)?)
    }
}
