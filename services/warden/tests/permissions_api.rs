mod common;

use axum::http::StatusCode;
use common::{TestApp, app_with, permission, read_json};
use http_helpers::{empty_request, json_request};
use tower::ServiceExt;
use warden::config::WardenConfig;

const BASE: &str = "/admin/access-control/permissions";

async fn open_app() -> TestApp {
    let mut config = WardenConfig::default();
    config.access_control.protect_api = false;
    app_with(config).await
}

async fn create(app: &TestApp, body: serde_json::Value) -> String {
    let response = app
        .clone()
        .oneshot(json_request("POST", BASE, body))
        .await
        .expect("create");
    assert_eq!(response.status(), StatusCode::OK);
    read_json(response)
        .await
        .as_str()
        .expect("id string")
        .to_string()
}

#[tokio::test]
async fn permission_crud_round_trip() {
    let app = open_app().await;
    let id = create(
        &app,
        serde_json::to_value(permission("p", &["alice", "/pets", "POST"])).expect("json"),
    )
    .await;
    assert_eq!(id.len(), warden::store::ID_LENGTH);

    let response = app
        .clone()
        .oneshot(empty_request("GET", &format!("{BASE}/{id}"), None))
        .await
        .expect("get");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(
        body,
        serde_json::json!({
            "id": id,
            "rule_section": "p",
            "policy_type": "p",
            "rule": {"v0": "alice", "v1": "/pets", "v2": "POST"}
        })
    );

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("{BASE}/{id}"),
            serde_json::json!({"policy_type": "g", "rule": {"v0": "alice", "v1": "admins"}}),
        ))
        .await
        .expect("put");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await, serde_json::json!(id));

    let response = app
        .clone()
        .oneshot(empty_request("GET", &format!("{BASE}/{id}"), None))
        .await
        .expect("get");
    let body = read_json(response).await;
    assert_eq!(body["rule_section"], "g");
    assert_eq!(body["rule"]["v1"], "admins");

    let response = app
        .clone()
        .oneshot(empty_request("DELETE", &format!("{BASE}/{id}"), None))
        .await
        .expect("delete");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await, serde_json::json!(id));

    for method in ["GET", "DELETE"] {
        let response = app
            .clone()
            .oneshot(empty_request(method, &format!("{BASE}/{id}"), None))
            .await
            .expect("after delete");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = read_json(response).await;
        assert_eq!(body["code"], 404);
    }
}

#[tokio::test]
async fn list_is_newest_first_and_honours_limit() {
    let app = open_app().await;
    for act in ["GET", "POST", "DELETE"] {
        create(
            &app,
            serde_json::to_value(permission("p", &["alice", "/pets", act])).expect("json"),
        )
        .await;
    }

    let response = app
        .clone()
        .oneshot(empty_request("GET", BASE, None))
        .await
        .expect("list");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    let actions: Vec<_> = body
        .as_array()
        .expect("array")
        .iter()
        .map(|item| item["rule"]["v2"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(actions, vec!["DELETE", "POST", "GET"]);

    let response = app
        .clone()
        .oneshot(empty_request("GET", &format!("{BASE}?limit=1"), None))
        .await
        .expect("list");
    let body = read_json(response).await;
    assert_eq!(body.as_array().map(Vec::len), Some(1));

    let response = app
        .clone()
        .oneshot(empty_request("GET", &format!("{BASE}?limit=0"), None))
        .await
        .expect("list");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body.as_array().map(Vec::len), Some(3));

    let response = app
        .clone()
        .oneshot(empty_request("GET", &format!("{BASE}?limit=lots"), None))
        .await
        .expect("list");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["code"], 400);
}

#[tokio::test]
async fn invalid_rules_are_rejected_and_not_stored() {
    let app = open_app().await;
    let cases = [
        serde_json::json!({"policy_type": "p9", "rule": {"v0": "alice", "v1": "/pets", "v2": "GET"}}),
        serde_json::json!({"policy_type": "p", "rule": {"v0": "alice"}}),
        serde_json::json!({"policy_type": "p", "rule": {"v0": "alice", "v2": "GET"}}),
        serde_json::json!({"rule": {"v0": "alice"}}),
        serde_json::json!({"rule_section": "x", "policy_type": "p", "rule": {}}),
    ];
    for body in cases {
        let response = app
            .clone()
            .oneshot(json_request("POST", BASE, body.clone()))
            .await
            .expect("create");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
        let error = read_json(response).await;
        assert_eq!(error["code"], 400);
        assert!(error["message"].is_string());
    }

    let malformed = axum::http::Request::builder()
        .method("POST")
        .uri(BASE)
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{not json"))
        .expect("request");
    let response = app.clone().oneshot(malformed).await.expect("create");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(empty_request("GET", BASE, None))
        .await
        .expect("list");
    assert_eq!(read_json(response).await, serde_json::json!([]));
}

#[tokio::test]
async fn update_of_unknown_id_is_not_found() {
    let app = open_app().await;
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("{BASE}/nope42"),
            serde_json::to_value(permission("p", &["alice", "/pets", "GET"])).expect("json"),
        ))
        .await
        .expect("put");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_rejects_mismatched_body_id() {
    let app = open_app().await;
    let id = create(
        &app,
        serde_json::to_value(permission("p", &["alice", "/pets", "GET"])).expect("json"),
    )
    .await;
    let mut body = permission("p", &["bob", "/pets", "GET"]);
    body.id = Some("other1".to_string());
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("{BASE}/{id}"),
            serde_json::to_value(body).expect("json"),
        ))
        .await
        .expect("put");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_client_id_conflicts() {
    let app = open_app().await;
    let mut body = permission("p", &["alice", "/pets", "GET"]);
    body.id = Some("fixed1".to_string());
    let body = serde_json::to_value(body).expect("json");
    assert_eq!(create(&app, body.clone()).await, "fixed1");

    let response = app
        .clone()
        .oneshot(json_request("POST", BASE, body))
        .await
        .expect("create");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn health_and_openapi_are_served() {
    let app = open_app().await;
    let response = app
        .clone()
        .oneshot(empty_request("GET", "/system/health", None))
        .await
        .expect("health");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await, serde_json::json!({"status": "ok"}));

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/openapi.json", None))
        .await
        .expect("openapi");
    assert_eq!(response.status(), StatusCode::OK);
    let doc = read_json(response).await;
    assert!(doc["paths"]["/permissions/{id}"].is_object());
}

#[tokio::test]
async fn custom_api_route_moves_the_api() {
    let mut config = WardenConfig::default();
    config.access_control.protect_api = false;
    config.access_control.api_route = "/acl".to_string();
    let app = app_with(config).await;

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/acl/permissions", None))
        .await
        .expect("list");
    assert_eq!(response.status(), StatusCode::OK);
    let response = app
        .clone()
        .oneshot(empty_request("GET", BASE, None))
        .await
        .expect("list");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
