//! PostgreSQL（sqlx）によるカタログ参照・クエリ実行・監査レコードの保存

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use sqlx::postgres::{PgDatabaseError, PgPool, PgPoolOptions};

use crate::cgi::audit::{AuditSink, RequestRecord};
use crate::error::Error;
use crate::rest::{Column, CompiledQuery, Database, RelationInfo, RelationName};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const MIGRATE_TIMEOUT: Duration = Duration::from_secs(10);

const RELATIONS_SQL: &str = "\
SELECT n.nspname::text, c.relname::text \
FROM pg_catalog.pg_class c \
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
WHERE c.relkind IN ('r', 'v', 'm', 'p', 'f') \
  AND n.nspname NOT IN ('pg_catalog', 'information_schema') \
  AND n.nspname NOT LIKE 'pg_toast%' \
ORDER BY 1, 2";

const DESCRIBE_SQL: &str = "\
SELECT a.attname::text, \
       format_type(a.atttypid, a.atttypmod), \
       EXISTS ( \
           SELECT 1 FROM pg_catalog.pg_index i \
           WHERE i.indrelid = c.oid AND i.indisprimary AND a.attnum = ANY (i.indkey) \
       ) \
FROM pg_catalog.pg_class c \
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
JOIN pg_catalog.pg_attribute a ON a.attrelid = c.oid \
WHERE n.nspname = $1 AND c.relname = $2 \
  AND c.relkind IN ('r', 'v', 'm', 'p', 'f') \
  AND a.attnum > 0 AND NOT a.attisdropped \
ORDER BY a.attnum";

const INSERT_REQUEST_SQL: &str = "\
INSERT INTO pgbridge_requests \
(id, created_at, duration_ms, ip, method, url, referrer, username, status, size, agent, environment, input, output, error, debug) \
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)";

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => Error::Database {
                code: db.code().map(|code| code.into_owned()),
                message: db.message().to_string(),
                detail: db
                    .try_downcast_ref::<PgDatabaseError>()
                    .and_then(|pg| pg.detail())
                    .map(str::to_string),
            },
            _ => Error::Database {
                code: None,
                message: err.to_string(),
                detail: None,
            },
        }
    }
}

fn timed_out(what: &str) -> Error {
    Error::Database {
        code: None,
        message: format!("{} timed out", what),
        detail: None,
    }
}

/// 監査テーブルのマイグレーションを適用する
pub async fn migrate(pool: &PgPool) -> Result<(), Error> {
    tokio::time::timeout(MIGRATE_TIMEOUT, sqlx::migrate!("./migrations").run(pool))
        .await
        .map_err(|_| timed_out("migration"))?
        .map_err(|e| Error::from(sqlx::Error::from(e)))?;
    Ok(())
}

/// sqlxのコネクションプールを使うカタログ兼実行器
#[derive(Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        let pool = tokio::time::timeout(
            CONNECT_TIMEOUT,
            PgPoolOptions::new().max_connections(2).connect(database_url),
        )
        .await
        .map_err(|_| timed_out("database connection"))??;
        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn relations(&self) -> Result<Vec<RelationName>, Error> {
        let rows: Vec<(String, String)> = sqlx::query_as(RELATIONS_SQL).fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|(schema, name)| RelationName::new(schema, name))
            .collect())
    }

    async fn describe(&self, relation: &RelationName) -> Result<Option<RelationInfo>, Error> {
        let rows: Vec<(String, String, bool)> = sqlx::query_as(DESCRIBE_SQL)
            .bind(relation.schema.as_str())
            .bind(relation.name.as_str())
            .fetch_all(&self.pool)
            .await?;
        if rows.is_empty() {
            debug!("relation {} not found in catalog", relation);
            return Ok(None);
        }
        let columns = rows
            .into_iter()
            .map(|(name, sql_type, primary_key)| Column {
                name,
                sql_type,
                primary_key,
            })
            .collect();
        Ok(Some(RelationInfo::new(relation.clone(), columns)))
    }

    async fn fetch_json(&self, query: &CompiledQuery) -> Result<Option<serde_json::Value>, Error> {
        let mut statement = sqlx::query_scalar::<_, Option<serde_json::Value>>(&query.sql);
        for param in &query.params {
            statement = statement.bind(param.as_str());
        }
        let row = statement.fetch_optional(&self.pool).await?;
        Ok(row.flatten())
    }
}

/// 監査レコードを `pgbridge_requests` テーブルに保存するシンク
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// マイグレーションを適用してからシンクを作成
    pub async fn connect_and_migrate(pool: PgPool) -> Result<Self, Error> {
        migrate(&pool).await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, record: &RequestRecord) -> Result<(), Error> {
        let error = record.error.as_ref().map(serde_json::to_value).transpose()?;
        sqlx::query(INSERT_REQUEST_SQL)
            .bind(record.id)
            .bind(record.timestamp)
            .bind(record.duration_ms)
            .bind(record.ip.as_deref())
            .bind(record.method.as_str())
            .bind(record.url.as_str())
            .bind(record.referrer.as_deref())
            .bind(record.username.as_deref())
            .bind(i32::from(record.status))
            .bind(i64::try_from(record.size).unwrap_or(i64::MAX))
            .bind(record.agent.as_deref())
            .bind(record.environment.as_str())
            .bind(record.input.as_slice())
            .bind(record.output.as_str())
            .bind(error)
            .bind(record.debug.clone())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
