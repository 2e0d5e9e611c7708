//! Per-route authorization middleware.
//!
//! # Purpose and responsibility
//! [`RequestGuard::protect`] wraps a method router so each request is
//! authorized before its handler runs. The handler is never invoked for a
//! denied request.
//!
//! # Key invariants and assumptions
//! - Object defaults to the request path (`/pets/7`), so per-resource rules
//!   and `g2` object groups apply. [`RequestGuard::with_route_template`]
//!   switches to the matched route (`/pets/:id`). Action defaults to the
//!   HTTP method.
//! - The model's request definition must be `(sub, obj, act)`.
//! - No identity headers: 401. Every candidate denied: 403.
use crate::api::error::{ApiError, api_forbidden, api_unauthorized};
use crate::auth::decision::DecisionEngine;
use crate::auth::principal::{IdentityHeaders, Principal};
use axum::extract::{MatchedPath, Request, State};
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::MethodRouter;
use warden_authz::{AccessRequest, AuthzError, AuthzResult};

const GUARD_REQUEST_ARITY: usize = 3;

#[derive(Clone)]
pub struct RequestGuard {
    engine: DecisionEngine,
    identity: IdentityHeaders,
    object: Option<String>,
    action: Option<String>,
    route_template: bool,
}

impl RequestGuard {
    /// # Errors
    /// [`AuthzError::RequestArity`] when the model's request definition does
    /// not have exactly three fields.
    pub fn new(engine: DecisionEngine, identity: IdentityHeaders) -> AuthzResult<Self> {
        let arity = engine.model().request().arity();
        if arity != GUARD_REQUEST_ARITY {
            return Err(AuthzError::RequestArity {
                expected: GUARD_REQUEST_ARITY,
                actual: arity,
            });
        }
        Ok(Self {
            engine,
            identity,
            object: None,
            action: None,
            route_template: false,
        })
    }

    /// Evaluate against a fixed object instead of the request path.
    pub fn with_object(mut self, object: impl Into<String>) -> Self {
        self.object = Some(object.into());
        self
    }

    /// Evaluate against a fixed action instead of the HTTP method.
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Evaluate against the matched route (`/pets/:id`) instead of the
    /// request path.
    pub fn with_route_template(mut self) -> Self {
        self.route_template = true;
        self
    }

    /// Wrap `route` so it only runs for authorized callers.
    pub fn protect<S>(&self, route: MethodRouter<S>) -> MethodRouter<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        route.route_layer(middleware::from_fn_with_state(self.clone(), guard))
    }

    /// Find the first identity in `headers` allowed to perform `action` on `object`.
    pub async fn authorize(
        &self,
        headers: &HeaderMap,
        object: &str,
        action: &str,
    ) -> Result<Principal, ApiError> {
        let candidates = self.identity.subjects(headers);
        if candidates.is_empty() {
            return Err(api_unauthorized("missing caller identity"));
        }
        for principal in candidates {
            let request = AccessRequest::new(principal.subject.as_str(), object, action);
            if self.engine.decide(&request).await {
                tracing::debug!(
                    subject = %principal.subject,
                    source = principal.source.as_str(),
                    object,
                    action,
                    "access granted"
                );
                return Ok(principal);
            }
        }
        tracing::info!(object, action, "access denied");
        Err(api_forbidden("access denied"))
    }

    fn object_for(&self, request: &Request) -> String {
        if let Some(object) = &self.object {
            return object.clone();
        }
        let template = self
            .route_template
            .then(|| request.extensions().get::<MatchedPath>())
            .flatten();
        match template {
            Some(path) => path.as_str().to_string(),
            None => request.uri().path().to_string(),
        }
    }

    fn action_for(&self, request: &Request) -> String {
        self.action
            .clone()
            .unwrap_or_else(|| request.method().as_str().to_string())
    }
}

async fn guard(State(guard): State<RequestGuard>, mut request: Request, next: Next) -> Response {
    let object = guard.object_for(&request);
    let action = guard.action_for(&request);
    match guard.authorize(request.headers(), &object, &action).await {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}
