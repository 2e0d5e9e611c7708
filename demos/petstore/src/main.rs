//! # Purpose
//! Demonstrate a host service protecting its own routes with the warden
//! request guard while warden's permission API manages the rules live.
//!
//! # What this demo proves
//! - Guarded handlers only run for callers the stored rules allow.
//! - Rules created or deleted through the permission API take effect on the
//!   very next request, with no restart and no cache to flush.
//! - Group membership (`g` rules) grants the group's permissions.
//! - Object groups (`g2` rules) extend a group's rights to concrete paths
//!   such as `/pets/1`.
//!
//! # High-level flow
//! 1. Start one HTTP server: warden's router merged with `/pets` routes.
//! 2. Seed rules: `root` administers permissions, `customers` may list pets
//!    and read anything filed under `pet-records`.
//! 3. Check alice can list pets but not add one.
//! 4. Grant `customers` POST on `/pets` through the permission API.
//! 5. Check alice can now add a pet but not read it until root files it
//!    under `pet-records`; anonymous callers get 401.
//! 6. Revoke the grant and check alice is denied again.
use anyhow::{Context, Result, bail};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use warden::api::types::{Permission, PermissionRule};
use warden::app::{build_router, build_state};
use warden::auth::guard::RequestGuard;
use warden::auth::principal::Principal;
use warden::config::WardenConfig;

const PERMISSIONS: &str = "/admin/access-control/permissions";
const PERMISSION_RECORDS: &str = "permission-records";
const PET_RECORDS: &str = "pet-records";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Pet {
    id: u64,
    name: String,
    added_by: String,
}

#[derive(Debug, Deserialize)]
struct NewPet {
    name: String,
}

#[derive(Clone, Default)]
struct Pets {
    items: Arc<RwLock<BTreeMap<u64, Pet>>>,
}

async fn list_pets(State(pets): State<Pets>) -> Json<Vec<Pet>> {
    Json(pets.items.read().await.values().cloned().collect())
}

async fn create_pet(
    State(pets): State<Pets>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<NewPet>,
) -> (StatusCode, Json<Pet>) {
    let mut items = pets.items.write().await;
    let id = items.keys().next_back().map_or(1, |last| last + 1);
    let pet = Pet {
        id,
        name: body.name,
        added_by: principal.subject,
    };
    items.insert(id, pet.clone());
    (StatusCode::CREATED, Json(pet))
}

async fn get_pet(State(pets): State<Pets>, Path(id): Path<u64>) -> Result<Json<Pet>, StatusCode> {
    pets.items
        .read()
        .await
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

fn pet_routes(guard: &RequestGuard) -> Router {
    Router::new()
        .route("/pets", guard.protect(get(list_pets).post(create_pet)))
        .route("/pets/:id", guard.protect(get(get_pet)))
        .with_state(Pets::default())
}

fn rule(policy_type: &str, values: &[&str]) -> Permission {
    let mut slots = values.iter().map(|value| Some(value.to_string()));
    Permission {
        id: None,
        rule_section: None,
        policy_type: policy_type.to_string(),
        rule: PermissionRule {
            v0: slots.next().flatten(),
            v1: slots.next().flatten(),
            v2: slots.next().flatten(),
            v3: slots.next().flatten(),
            v4: slots.next().flatten(),
            v5: slots.next().flatten(),
        },
    }
}

fn demo_config() -> WardenConfig {
    let mut config = WardenConfig::default();
    config.access_control.owner_headers = vec!["X-Admin".to_string()];
    config.access_control.user_headers = vec!["X-User".to_string()];
    config.access_control.seed = vec![
        rule("g", &["root", "admins"]),
        rule("p", &["admins", PERMISSIONS, "GET"]),
        rule("p", &["admins", PERMISSIONS, "POST"]),
        rule("p", &["admins", PERMISSION_RECORDS, "DELETE"]),
        rule("g", &["alice", "customers"]),
        rule("p", &["customers", "/pets", "GET"]),
        rule("p", &["customers", PET_RECORDS, "GET"]),
    ];
    config
}

async fn spawn_server() -> Result<(SocketAddr, JoinHandle<()>)> {
    let state = build_state(&demo_config()).await?;
    let guard = state.guard.clone().context("model does not support the guard")?;
    let app = build_router(state).merge(pet_routes(&guard));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app.into_make_service()).await {
            eprintln!("petstore server error: {err}");
        }
    });
    Ok((addr, handle))
}

async fn wait_for_server(http: &reqwest::Client, base: &str) -> Result<()> {
    let url = format!("{base}/system/health");
    for _ in 0..10 {
        if let Ok(response) = http.get(&url).send().await {
            if response.status().is_success() {
                return Ok(());
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    bail!("petstore server did not become ready");
}

fn check(label: &str, actual: reqwest::StatusCode, expected: u16) -> Result<()> {
    if actual.as_u16() != expected {
        bail!("{label}: FAIL (expected {expected}, got {actual})");
    }
    println!("{label}: PASS (status={})", actual.as_u16());
    Ok(())
}

async fn add_pet(
    http: &reqwest::Client,
    base: &str,
    user: &str,
    name: &str,
) -> Result<reqwest::Response> {
    Ok(http
        .post(format!("{base}/pets"))
        .header("X-User", user)
        .json(&json!({ "name": name }))
        .send()
        .await?)
}

/// Create `permission` as root and return the new rule id.
async fn grant(http: &reqwest::Client, base: &str, permission: &Permission) -> Result<String> {
    let response = http
        .post(format!("{base}{PERMISSIONS}"))
        .header("X-Admin", "root")
        .json(permission)
        .send()
        .await?;
    if !response.status().is_success() {
        bail!("grant failed with status {}", response.status());
    }
    Ok(response.json().await?)
}

async fn fetch_pet(
    http: &reqwest::Client,
    base: &str,
    user: Option<&str>,
    id: u64,
) -> Result<reqwest::Response> {
    let mut request = http.get(format!("{base}/pets/{id}"));
    if let Some(user) = user {
        request = request.header("X-User", user);
    }
    Ok(request.send().await?)
}

async fn run_demo() -> Result<()> {
    println!("== Warden Demo: Guarded Pet Store ==");
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(4))
        .build()
        .context("build http client")?;

    let (addr, server) = spawn_server().await?;
    let base = format!("http://{addr}");
    wait_for_server(&http, &base).await?;
    println!("STEP 1 server up: PASS (addr={addr})");

    let response = http
        .get(format!("{base}/pets"))
        .header("X-User", "alice")
        .send()
        .await?;
    check("STEP 2 alice lists pets", response.status(), 200)?;

    let response = add_pet(&http, &base, "alice", "Rex").await?;
    check("STEP 3 alice add pet denied", response.status(), 403)?;

    let grant_id = grant(&http, &base, &rule("p", &["customers", "/pets", "POST"])).await?;
    let grant_path = format!("{PERMISSIONS}/{grant_id}");
    grant(&http, &base, &rule("g2", &[grant_path.as_str(), PERMISSION_RECORDS])).await?;
    println!("STEP 4 root grants customers POST /pets: PASS (id={grant_id})");

    let response = add_pet(&http, &base, "alice", "Rex").await?;
    check("STEP 5 alice add pet allowed", response.status(), 201)?;
    let pet: Pet = response.json().await?;
    println!("        created pet {} ({}) added_by={}", pet.id, pet.name, pet.added_by);

    let response = fetch_pet(&http, &base, Some("alice"), pet.id).await?;
    check("STEP 6 alice fetch unfiled pet denied", response.status(), 403)?;

    let pet_path = format!("/pets/{}", pet.id);
    grant(&http, &base, &rule("g2", &[pet_path.as_str(), PET_RECORDS])).await?;
    let response = fetch_pet(&http, &base, Some("alice"), pet.id).await?;
    check("STEP 7 alice fetch filed pet allowed", response.status(), 200)?;

    let response = fetch_pet(&http, &base, None, pet.id).await?;
    check("STEP 8 anonymous fetch rejected", response.status(), 401)?;

    let response = fetch_pet(&http, &base, Some("bob"), pet.id).await?;
    check("STEP 9 bob fetch denied", response.status(), 403)?;

    let response = http
        .delete(format!("{base}{grant_path}"))
        .header("X-Admin", "root")
        .send()
        .await?;
    check("STEP 10 root revokes grant", response.status(), 200)?;

    let response = add_pet(&http, &base, "alice", "Fido").await?;
    check("STEP 11 alice add pet denied again", response.status(), 403)?;

    server.abort();
    let _ = server.await;
    println!("== Demo complete ==");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    run_demo().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn petstore_demo_end_to_end() -> Result<()> {
        tokio::time::timeout(Duration::from_secs(20), run_demo())
            .await
            .context("petstore demo timeout")?
    }
}
