//! Postgres-backed implementation of the policy store.
//!
//! # What this module is
//! A durable [`PolicyStore`] shared by every warden replica. The configured
//! `db_name` selects the database and `collection_name` the table holding one
//! row per rule.
//!
//! # Key invariants
//! - `id` is the primary key; `seq` is assigned by Postgres at insert and
//!   orders `list` results newest first.
//! - The table name is validated as a plain SQL identifier before it is
//!   interpolated into any statement.
//! - Writes are single-row statements; Postgres row atomicity is the only
//!   consistency guarantee. Concurrent updates to one id are last-write-wins.
//!
//! # Operational notes
//! - The table is created at connect time when missing.
//! - Connection pooling and timeouts are explicit so a dead database fails
//!   requests fast instead of hanging them. Decisions then fail closed.
//!
//! # Security notes
//! - Database URLs may contain credentials; never log `PostgresConfig::url`.
use super::{PolicyStore, StoreError, StoreResult, generate_id, prepare};
use crate::config::PostgresConfig;
use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use warden_authz::{Model, PolicyRule, RuleParams, RuleSection};

/// Attempts at finding an unused generated id before giving up.
const ID_ATTEMPTS: usize = 8;

const RULE_COLUMNS: &str = "id, rule_section, policy_type, v0, v1, v2, v3, v4, v5";

/// Whether `name` can be used unquoted as a Postgres table name.
pub fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= 63
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unavailable(err.into())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().map(|code| code == "23505").unwrap_or(false);
    }
    false
}

/// Row shape of the rule table.
#[derive(Debug, Clone, FromRow)]
struct DbRule {
    id: String,
    rule_section: String,
    policy_type: String,
    v0: Option<String>,
    v1: Option<String>,
    v2: Option<String>,
    v3: Option<String>,
    v4: Option<String>,
    v5: Option<String>,
}

impl TryFrom<DbRule> for PolicyRule {
    type Error = StoreError;

    fn try_from(row: DbRule) -> StoreResult<Self> {
        let rule_section: RuleSection = row
            .rule_section
            .parse()
            .map_err(|err| StoreError::Unavailable(anyhow!("corrupt rule {}: {err}", row.id)))?;
        Ok(PolicyRule {
            id: Some(row.id),
            rule_section,
            policy_type: row.policy_type,
            rule: RuleParams {
                v0: row.v0,
                v1: row.v1,
                v2: row.v2,
                v3: row.v3,
                v4: row.v4,
                v5: row.v5,
            },
        })
    }
}

/// Durable policy store backed by Postgres.
///
/// # Example
/// ```rust,no_run
/// use std::sync::Arc;
/// use warden::config::PostgresConfig;
/// use warden::store::postgres::PostgresPolicyStore;
///
/// async fn open(pg: PostgresConfig) {
///     let model = Arc::new(warden_authz::default_model());
///     let _ = PostgresPolicyStore::connect(&pg, "access_control_db", "policy_rules", model).await;
/// }
/// ```
pub struct PostgresPolicyStore {
    pool: PgPool,
    table: String,
    model: Arc<Model>,
}

impl PostgresPolicyStore {
    /// Connect to `db_name` and make sure `table` exists.
    ///
    /// # Errors
    /// - [`StoreError::InvalidRule`] when `table` is not a plain identifier.
    /// - [`StoreError::Unavailable`] on connection or DDL failure.
    pub async fn connect(
        pg: &PostgresConfig,
        db_name: &str,
        table: &str,
        model: Arc<Model>,
    ) -> StoreResult<Self> {
        if !is_sql_identifier(table) {
            return Err(StoreError::InvalidRule(format!(
                "invalid collection name: {table}"
            )));
        }
        let connect_options = PgConnectOptions::from_str(&pg.url)?.database(db_name);
        let connect = PgPoolOptions::new()
            .max_connections(pg.max_connections)
            .acquire_timeout(Duration::from_millis(pg.acquire_timeout_ms))
            .connect_with(connect_options);
        let pool = tokio::time::timeout(Duration::from_millis(pg.connect_timeout_ms), connect)
            .await
            .map_err(|_| StoreError::Unavailable(anyhow!("timed out connecting to postgres")))??;
        let store = Self {
            pool,
            table: table.to_string(),
            model,
        };
        store.ensure_table().await?;
        Ok(store)
    }

    async fn ensure_table(&self) -> StoreResult<()> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
                 seq BIGSERIAL NOT NULL, \
                 id TEXT PRIMARY KEY, \
                 rule_section TEXT NOT NULL, \
                 policy_type TEXT NOT NULL, \
                 v0 TEXT, v1 TEXT, v2 TEXT, v3 TEXT, v4 TEXT, v5 TEXT\
             )",
            self.table
        );
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }

    async fn insert(&self, rule: &PolicyRule) -> Result<(), sqlx::Error> {
        let sql = format!(
            "INSERT INTO {} ({RULE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            self.table
        );
        bind_rule(sqlx::query(&sql), rule)
            .execute(&self.pool)
            .await
            .map(|_| ())
    }

    async fn count(&self) -> StoreResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table);
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn record_total(&self) {
        if let Ok(total) = self.count().await {
            metrics::gauge!("warden_policy_rules_total").set(total as f64);
        }
    }
}

fn bind_rule<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    rule: &'q PolicyRule,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(rule.id.as_deref())
        .bind(rule.rule_section.as_str())
        .bind(&rule.policy_type)
        .bind(rule.rule.v0.as_deref())
        .bind(rule.rule.v1.as_deref())
        .bind(rule.rule.v2.as_deref())
        .bind(rule.rule.v3.as_deref())
        .bind(rule.rule.v4.as_deref())
        .bind(rule.rule.v5.as_deref())
}

#[async_trait]
impl PolicyStore for PostgresPolicyStore {
    async fn create(&self, rule: PolicyRule) -> StoreResult<String> {
        if let Some(id) = rule.id.clone() {
            let rule = prepare(&self.model, rule, &id)?;
            return match self.insert(&rule).await {
                Ok(()) => {
                    self.record_total().await;
                    Ok(id)
                }
                Err(err) if is_unique_violation(&err) => Err(StoreError::Conflict(id)),
                Err(err) => Err(err.into()),
            };
        }
        for _ in 0..ID_ATTEMPTS {
            let id = generate_id();
            let candidate = prepare(&self.model, rule.clone(), &id)?;
            match self.insert(&candidate).await {
                Ok(()) => {
                    self.record_total().await;
                    return Ok(id);
                }
                Err(err) if is_unique_violation(&err) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(StoreError::Unavailable(anyhow!(
            "could not allocate a free rule id"
        )))
    }

    async fn list(&self, limit: Option<usize>) -> StoreResult<Vec<PolicyRule>> {
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM {} ORDER BY seq DESC LIMIT $1",
            self.table
        );
        let limit = limit
            .filter(|&cap| cap > 0)
            .map(|cap| i64::try_from(cap).unwrap_or(i64::MAX));
        let rows: Vec<DbRule> = sqlx::query_as(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(PolicyRule::try_from).collect()
    }

    async fn get(&self, id: &str) -> StoreResult<PolicyRule> {
        let sql = format!("SELECT {RULE_COLUMNS} FROM {} WHERE id = $1", self.table);
        let row: Option<DbRule> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => row.try_into(),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    async fn update(&self, id: &str, rule: PolicyRule) -> StoreResult<String> {
        let rule = prepare(&self.model, rule, id)?;
        let sql = format!(
            "UPDATE {} SET rule_section = $2, policy_type = $3, \
             v0 = $4, v1 = $5, v2 = $6, v3 = $7, v4 = $8, v5 = $9 \
             WHERE id = $1",
            self.table
        );
        let result = bind_rule(sqlx::query(&sql), &rule)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(id.to_string())
    }

    async fn delete(&self, id: &str) -> StoreResult<String> {
        let sql = format!("DELETE FROM {} WHERE id = $1", self.table);
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        self.record_total().await;
        Ok(id.to_string())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
