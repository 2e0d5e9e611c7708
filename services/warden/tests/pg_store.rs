#![cfg(feature = "pg-tests")]

use serial_test::serial;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use warden::auth::decision::DecisionEngine;
use warden::config::PostgresConfig;
use warden::store::postgres::PostgresPolicyStore;
use warden::store::{PolicyStore, StoreError};
use warden_authz::{AccessRequest, PolicyRule, default_model};

const TABLE: &str = "warden_pg_tests";

fn database_url() -> Option<String> {
    match std::env::var("WARDEN_TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
        Ok(url) => Some(url),
        Err(_) => {
            eprintln!("skipping pg-tests: set WARDEN_TEST_DATABASE_URL or DATABASE_URL");
            None
        }
    }
}

async fn reset_table(url: &str) -> Result<(), sqlx::Error> {
    let pool = match tokio::time::timeout(
        std::time::Duration::from_secs(2),
        PgPoolOptions::new().max_connections(1).connect(url),
    )
    .await
    {
        Ok(result) => result?,
        Err(_) => return Err(sqlx::Error::PoolTimedOut),
    };
    sqlx::query(&format!("DROP TABLE IF EXISTS {TABLE}"))
        .execute(&pool)
        .await
        .map(|_| ())
}

/// Fresh store on an empty table, or `None` when no database is reachable.
async fn pg_store() -> Option<PostgresPolicyStore> {
    let url = database_url()?;
    if let Err(err) = reset_table(&url).await {
        eprintln!("skipping pg-tests: cannot connect to postgres: {err}");
        return None;
    }
    let db_name = PgConnectOptions::from_str(&url)
        .ok()
        .and_then(|options| options.get_database().map(str::to_string))
        .unwrap_or_else(|| "postgres".to_string());
    let pg = PostgresConfig::from_url(url);
    match PostgresPolicyStore::connect(&pg, &db_name, TABLE, Arc::new(default_model())).await {
        Ok(store) => Some(store),
        Err(err) => {
            eprintln!("skipping pg-tests: connect postgres store failed: {err}");
            None
        }
    }
}

fn p(sub: &str, obj: &str, act: &str) -> PolicyRule {
    PolicyRule::policy("p", [sub, obj, act]).expect("rule")
}

#[tokio::test]
#[serial]
async fn pg_crud_round_trip() {
    let Some(store) = pg_store().await else {
        return;
    };
    let id = store.create(p("alice", "/pets", "POST")).await.expect("create");
    assert_eq!(
        store.get(&id).await.expect("get"),
        p("alice", "/pets", "POST").with_id(id.clone())
    );

    let group = PolicyRule::grouping("g", ["alice", "admins"]).expect("rule");
    assert_eq!(store.update(&id, group.clone()).await.expect("update"), id);
    assert_eq!(store.get(&id).await.expect("get"), group.with_id(id.clone()));

    assert_eq!(store.delete(&id).await.expect("delete"), id);
    assert!(matches!(store.get(&id).await, Err(StoreError::NotFound(_))));
    assert!(matches!(store.delete(&id).await, Err(StoreError::NotFound(_))));
    assert!(matches!(
        store.update(&id, p("a", "b", "c")).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
#[serial]
async fn pg_list_is_newest_first_and_limited() {
    let Some(store) = pg_store().await else {
        return;
    };
    for act in ["GET", "POST", "DELETE"] {
        store.create(p("alice", "/pets", act)).await.expect("create");
    }
    let actions: Vec<_> = store
        .list(None)
        .await
        .expect("list")
        .into_iter()
        .filter_map(|rule| rule.rule.v2)
        .collect();
    assert_eq!(actions, vec!["DELETE", "POST", "GET"]);
    assert_eq!(store.list(Some(1)).await.expect("list").len(), 1);
    assert_eq!(store.list(Some(0)).await.expect("list").len(), 3);
}

#[tokio::test]
#[serial]
async fn pg_rejects_invalid_and_duplicate_rules() {
    let Some(store) = pg_store().await else {
        return;
    };
    let unknown = PolicyRule::policy("p9", ["alice", "/pets", "GET"]).expect("rule");
    assert!(matches!(
        store.create(unknown).await,
        Err(StoreError::InvalidPolicyType(_))
    ));
    store
        .create(p("alice", "/pets", "GET").with_id("fixed1"))
        .await
        .expect("create");
    assert!(matches!(
        store.create(p("bob", "/pets", "GET").with_id("fixed1")).await,
        Err(StoreError::Conflict(_))
    ));
    assert_eq!(store.list(None).await.expect("list").len(), 1);
    store.health_check().await.expect("health");
    assert!(store.is_durable());
}

#[tokio::test]
#[serial]
async fn pg_decisions_follow_stored_rules() {
    let Some(store) = pg_store().await else {
        return;
    };
    let model = Arc::new(default_model());
    let store = Arc::new(store);
    let engine = DecisionEngine::new(model, store.clone());
    store
        .create(p("admins", "/pets", "DELETE"))
        .await
        .expect("create");
    let membership = store
        .create(PolicyRule::grouping("g", ["alice", "admins"]).expect("rule"))
        .await
        .expect("create");

    let request = AccessRequest::new("alice", "/pets", "DELETE");
    assert!(engine.decide(&request).await);
    store.delete(&membership).await.expect("delete");
    assert!(!engine.decide(&request).await);
}
