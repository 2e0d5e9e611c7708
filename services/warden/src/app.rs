//! Warden HTTP application wiring.
//!
//! # Purpose
//! Builds the shared application state from configuration and composes the
//! Axum router: health, the permission API under `api_route`, OpenAPI docs,
//! tracing and optional CORS.
//!
//! # Notes
//! Host services embed warden by calling [`build_state`] and merging
//! [`build_router`] with their own routes, protected by `AppState::guard`.
use crate::api;
use crate::api::openapi::ApiDoc;
use crate::api::types::Permission;
use crate::auth::decision::DecisionEngine;
use crate::auth::guard::RequestGuard;
use crate::auth::principal::IdentityHeaders;
use crate::config::{StorageBackend, WardenConfig};
use crate::observability;
use crate::store::memory::InMemoryPolicyStore;
use crate::store::postgres::PostgresPolicyStore;
use crate::store::{PolicyStore, seed};
use anyhow::{Context, Result};
use axum::Router;
use axum::routing::{MethodRouter, get};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use utoipa::OpenApi;
use warden_authz::{Model, ModelSource, PolicyRule};

#[derive(Clone)]
pub struct AppState {
    pub model: Arc<Model>,
    pub store: Arc<dyn PolicyStore>,
    pub engine: DecisionEngine,
    /// `None` only when the model's requests are not `(sub, obj, act)`.
    pub guard: Option<RequestGuard>,
    pub api_route: String,
    pub protect_api: bool,
    pub cors: bool,
}

/// Load the model, open the policy store, apply seed rules and build the
/// decision engine and request guard.
pub async fn build_state(config: &WardenConfig) -> Result<AppState> {
    let access = &config.access_control;
    let source = match &access.model {
        Some(path) => ModelSource::File(path.clone()),
        None => ModelSource::Default,
    };
    let model = Arc::new(Model::load(&source).context("load access-control model")?);

    let store: Arc<dyn PolicyStore> = match config.storage {
        StorageBackend::Memory => Arc::new(InMemoryPolicyStore::new(model.clone())),
        StorageBackend::Postgres => {
            let pg = config
                .postgres
                .as_ref()
                .context("postgres configuration missing")?;
            Arc::new(
                PostgresPolicyStore::connect(
                    pg,
                    &access.db_name,
                    &access.collection_name,
                    model.clone(),
                )
                .await
                .context("connect postgres policy store")?,
            )
        }
    };
    tracing::info!(
        backend = store.backend_name(),
        durable = store.is_durable(),
        "policy store ready"
    );

    let seeds = seed_rules(&model, &access.seed)?;
    if !seeds.is_empty() {
        let created = seed(store.as_ref(), seeds)
            .await
            .context("seed policy rules")?;
        tracing::info!(created, "seeded policy rules");
    }

    let engine = DecisionEngine::new(model.clone(), store.clone());
    let identity = IdentityHeaders::new(&access.owner_headers, &access.user_headers)?;
    let guard = match RequestGuard::new(engine.clone(), identity) {
        Ok(guard) => Some(guard),
        Err(err) if access.protect_api => {
            return Err(err).context("access_control.protect_api requires a (sub, obj, act) model");
        }
        Err(err) => {
            tracing::warn!(error = %err, "request guard unavailable for this model");
            None
        }
    };

    Ok(AppState {
        model,
        store,
        engine,
        guard,
        api_route: access.api_route.clone(),
        protect_api: access.protect_api,
        cors: config.cors.enabled,
    })
}

fn seed_rules(model: &Model, seeds: &[Permission]) -> Result<Vec<PolicyRule>> {
    seeds
        .iter()
        .cloned()
        .enumerate()
        .map(|(index, permission)| {
            permission
                .into_rule(model)
                .with_context(|| format!("access_control.seed[{index}]"))
        })
        .collect()
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            let parent = observability::trace_context_from_headers(request.headers());
            let span = tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version()
            );
            span.set_parent(parent);
            span
        });

    let guard = state.guard.clone().filter(|_| state.protect_api);
    let protect = |route: MethodRouter<AppState>| match &guard {
        Some(guard) => guard.protect(route),
        None => route,
    };
    let base = &state.api_route;

    let mut router = Router::new()
        .route("/system/health", get(api::system::system_health))
        .route(
            &format!("{base}/permissions"),
            protect(
                get(api::permissions::list_permissions)
                    .post(api::permissions::create_permission),
            ),
        )
        .route(
            &format!("{base}/permissions/:id"),
            protect(
                get(api::permissions::get_permission)
                    .put(api::permissions::update_permission)
                    .delete(api::permissions::delete_permission),
            ),
        )
        .merge(utoipa_swagger_ui::SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()));
    if state.cors {
        router = router.layer(CorsLayer::permissive());
    }
    router.layer(trace_layer).with_state(state)
}
