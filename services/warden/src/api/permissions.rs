//! Permission CRUD handlers.
//!
//! # Purpose
//! Create, list, fetch, replace and delete policy rules. Every write is
//! validated against the loaded model by the store before it is persisted,
//! and is visible to the next access decision.
//!
//! # Security considerations
//! - When `protect_api` is enabled these routes sit behind the request guard;
//!   the authorized caller is logged with each write.
use crate::api::error::{ApiError, api_store_error, api_validation_error};
use crate::api::types::{ErrorResponse, ListQuery, Permission};
use crate::app::AppState;
use crate::auth::principal::Principal;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::{Extension, Json};

fn caller(principal: &Option<Extension<Principal>>) -> &str {
    principal
        .as_ref()
        .map(|Extension(p)| p.subject.as_str())
        .unwrap_or("anonymous")
}

fn permission_body(body: Result<Json<Permission>, JsonRejection>) -> Result<Permission, ApiError> {
    body.map(|Json(permission)| permission)
        .map_err(|rejection| api_validation_error(&rejection.body_text()))
}

fn permission_id(path: Result<Path<String>, PathRejection>) -> Result<String, ApiError> {
    let Path(id) = path.map_err(|rejection| api_validation_error(&rejection.body_text()))?;
    if id.trim().is_empty() {
        return Err(api_validation_error("permission id must not be empty"));
    }
    Ok(id)
}

#[utoipa::path(
    post,
    path = "/permissions",
    tag = "permissions",
    request_body = Permission,
    responses(
        (status = 200, description = "Rule created; returns its id", body = String),
        (status = 400, description = "Malformed rule", body = ErrorResponse),
        (status = 401, description = "No caller identity", body = ErrorResponse),
        (status = 403, description = "Caller not permitted", body = ErrorResponse),
        (status = 409, description = "Id already in use", body = ErrorResponse)
    )
)]
pub(crate) async fn create_permission(
    State(state): State<AppState>,
    principal: Option<Extension<Principal>>,
    body: Result<Json<Permission>, JsonRejection>,
) -> Result<Json<String>, ApiError> {
    let rule = permission_body(body)?
        .into_rule(&state.model)
        .map_err(|err| api_validation_error(&err.to_string()))?;
    let id = state.store.create(rule).await.map_err(api_store_error)?;
    tracing::info!(%id, caller = caller(&principal), "permission created");
    Ok(Json(id))
}

#[utoipa::path(
    get,
    path = "/permissions",
    tag = "permissions",
    params(ListQuery),
    responses(
        (status = 200, description = "Rules, newest first", body = [Permission]),
        (status = 400, description = "Bad query parameter", body = ErrorResponse)
    )
)]
pub(crate) async fn list_permissions(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<Permission>>, ApiError> {
    let Query(query) = query.map_err(|rejection| api_validation_error(&rejection.body_text()))?;
    let rules = state
        .store
        .list(query.limit)
        .await
        .map_err(api_store_error)?;
    Ok(Json(rules.into_iter().map(Permission::from).collect()))
}

#[utoipa::path(
    get,
    path = "/permissions/{id}",
    tag = "permissions",
    params(("id" = String, Path, description = "Rule id")),
    responses(
        (status = 200, description = "The rule", body = Permission),
        (status = 404, description = "No rule with this id", body = ErrorResponse)
    )
)]
pub(crate) async fn get_permission(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<Permission>, ApiError> {
    let id = permission_id(path)?;
    let rule = state.store.get(&id).await.map_err(api_store_error)?;
    Ok(Json(rule.into()))
}

#[utoipa::path(
    put,
    path = "/permissions/{id}",
    tag = "permissions",
    request_body = Permission,
    params(("id" = String, Path, description = "Rule id")),
    responses(
        (status = 200, description = "Rule replaced; returns its id", body = String),
        (status = 400, description = "Malformed rule", body = ErrorResponse),
        (status = 404, description = "No rule with this id", body = ErrorResponse)
    )
)]
pub(crate) async fn update_permission(
    State(state): State<AppState>,
    principal: Option<Extension<Principal>>,
    path: Result<Path<String>, PathRejection>,
    body: Result<Json<Permission>, JsonRejection>,
) -> Result<Json<String>, ApiError> {
    let id = permission_id(path)?;
    let permission = permission_body(body)?;
    if permission.id.as_deref().is_some_and(|body_id| body_id != id) {
        return Err(api_validation_error("body id does not match path id"));
    }
    let rule = permission
        .into_rule(&state.model)
        .map_err(|err| api_validation_error(&err.to_string()))?;
    let id = state.store.update(&id, rule).await.map_err(api_store_error)?;
    tracing::info!(%id, caller = caller(&principal), "permission updated");
    Ok(Json(id))
}

#[utoipa::path(
    delete,
    path = "/permissions/{id}",
    tag = "permissions",
    params(("id" = String, Path, description = "Rule id")),
    responses(
        (status = 200, description = "Rule deleted; returns its id", body = String),
        (status = 404, description = "No rule with this id", body = ErrorResponse)
    )
)]
pub(crate) async fn delete_permission(
    State(state): State<AppState>,
    principal: Option<Extension<Principal>>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<String>, ApiError> {
    let id = permission_id(path)?;
    let id = state.store.delete(&id).await.map_err(api_store_error)?;
    tracing::info!(%id, caller = caller(&principal), "permission deleted");
    Ok(Json(id))
}
