use warden::api::types::{Permission, PermissionRule};
use warden::app::{build_router, build_state};
use warden::config::WardenConfig;

pub type TestApp = axum::routing::RouterIntoService<axum::body::Body, ()>;

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

pub fn permission(policy_type: &str, values: &[&str]) -> Permission {
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

/// In-memory app built from `config`, the way the binary builds it.
pub async fn app_with(config: WardenConfig) -> TestApp {
    let state = build_state(&config).await.expect("state");
    build_router(state).into_service()
}
