//! Connection pooling and query execution over both dialects.
//!
//! The pool is an enum over the two backends rather than a trait object,
//! so dialect-specific behavior stays visible at the call site and adding
//! a backend is a compile-time exhaustiveness check.
//!
//! SQL is written with `?` placeholders; the server branch rewrites them to
//! numbered placeholders before prepare. The embedded pool is pinned to a
//! single connection: the engine is a single-file database and one writer
//! connection is its real concurrency model.

use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Postgres, Row as _, Sqlite, Transaction};
use std::str::FromStr;
use std::time::Duration;

use crate::config::StoreConfig;
use crate::dialect::DialectKind;
use crate::error::{Result, StoreError};
use crate::value::Value;

/// Rewrite `?` placeholders to `$1..$n`, skipping quoted literals.
pub(crate) fn number_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut index = 0;
    let mut in_string = false;
    for ch in sql.chars() {
        match ch {
            '\'' => {
                in_string = !in_string;
                out.push(ch);
            }
            '?' if !in_string => {
                index += 1;
                out.push('$');
                out.push_str(&index.to_string());
            }
            _ => out.push(ch),
        }
    }
    out
}

fn bind_sqlite<'q>(
    sql: &'q str,
    params: &[Value],
) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    let mut query = sqlx::query(sql);
    for param in params {
        query = match param.clone() {
            Value::Bool(v) => query.bind(v),
            Value::Int(v) => query.bind(v),
            Value::Float(v) => query.bind(v),
            Value::Text(v) => query.bind(v),
            Value::Date(v) => query.bind(v),
            Value::Timestamp(v) => query.bind(v),
            Value::Json(v) => query.bind(v),
        };
    }
    query
}

fn bind_postgres<'q>(
    sql: &'q str,
    params: &[Value],
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    let mut query = sqlx::query(sql);
    for param in params {
        query = match param.clone() {
            Value::Bool(v) => query.bind(v),
            Value::Int(v) => query.bind(v),
            Value::Float(v) => query.bind(v),
            Value::Text(v) => query.bind(v),
            Value::Date(v) => query.bind(v),
            Value::Timestamp(v) => query.bind(v),
            Value::Json(v) => query.bind(v),
        };
    }
    query
}

/// A row from either backend with typed column access.
pub enum DbRow {
    Sqlite(SqliteRow),
    Postgres(PgRow),
}

macro_rules! row_getter {
    ($fn_name:ident, $ty:ty) => {
        pub fn $fn_name(&self, column: &str) -> Result<$ty> {
            match self {
                DbRow::Sqlite(row) => row.try_get(column).map_err(Into::into),
                DbRow::Postgres(row) => row.try_get(column).map_err(Into::into),
            }
        }
    };
}

impl DbRow {
    row_getter!(get_text, String);
    row_getter!(get_opt_text, Option<String>);
    row_getter!(get_bool, bool);
    row_getter!(get_opt_bool, Option<bool>);
    row_getter!(get_i32, i32);
    row_getter!(get_opt_i32, Option<i32>);
    row_getter!(get_i64, i64);
    row_getter!(get_opt_i64, Option<i64>);
    row_getter!(get_date, chrono::NaiveDate);
    row_getter!(get_timestamp, chrono::DateTime<chrono::Utc>);
    row_getter!(get_opt_timestamp, Option<chrono::DateTime<chrono::Utc>>);
    row_getter!(get_opt_json, Option<serde_json::Value>);
}

/// Connection pool over either backend.
#[derive(Clone, Debug)]
pub enum DbPool {
    Sqlite(SqlitePool),
    Postgres(PgPool),
}

impl DbPool {
    /// Connect according to configuration; the URL scheme picks the backend.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        match config.dialect_kind()? {
            DialectKind::Sqlite => {
                let options = SqliteConnectOptions::from_str(&config.database_url)
                    .map_err(|e| StoreError::Config(format!("invalid database URL: {}", e)))?
                    .create_if_missing(true)
                    .foreign_keys(true)
                    .busy_timeout(Duration::from_millis(config.busy_timeout_ms));
                let pool = SqlitePoolOptions::new()
                    .max_connections(1)
                    .connect_with(options)
                    .await?;
                Ok(DbPool::Sqlite(pool))
            }
            DialectKind::Postgres => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(&config.database_url)
                    .await?;
                Ok(DbPool::Postgres(pool))
            }
        }
    }

    /// In-memory embedded database, mainly for tests.
    pub async fn connect_sqlite_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::Config(format!("invalid database URL: {}", e)))?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(DbPool::Sqlite(pool))
    }

    pub fn kind(&self) -> DialectKind {
        match self {
            DbPool::Sqlite(_) => DialectKind::Sqlite,
            DbPool::Postgres(_) => DialectKind::Postgres,
        }
    }

    /// Execute a statement; returns affected row count.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        match self {
            DbPool::Sqlite(pool) => {
                let done = bind_sqlite(sql, params).execute(pool).await?;
                Ok(done.rows_affected())
            }
            DbPool::Postgres(pool) => {
                let sql = number_placeholders(sql);
                let done = bind_postgres(&sql, params).execute(pool).await?;
                Ok(done.rows_affected())
            }
        }
    }

    pub async fn fetch_all(&self, sql: &str, params: &[Value]) -> Result<Vec<DbRow>> {
        match self {
            DbPool::Sqlite(pool) => {
                let rows = bind_sqlite(sql, params).fetch_all(pool).await?;
                Ok(rows.into_iter().map(DbRow::Sqlite).collect())
            }
            DbPool::Postgres(pool) => {
                let sql = number_placeholders(sql);
                let rows = bind_postgres(&sql, params).fetch_all(pool).await?;
                Ok(rows.into_iter().map(DbRow::Postgres).collect())
            }
        }
    }

    pub async fn fetch_optional(&self, sql: &str, params: &[Value]) -> Result<Option<DbRow>> {
        match self {
            DbPool::Sqlite(pool) => {
                let row = bind_sqlite(sql, params).fetch_optional(pool).await?;
                Ok(row.map(DbRow::Sqlite))
            }
            DbPool::Postgres(pool) => {
                let sql = number_placeholders(sql);
                let row = bind_postgres(&sql, params).fetch_optional(pool).await?;
                Ok(row.map(DbRow::Postgres))
            }
        }
    }

    pub async fn fetch_one(&self, sql: &str, params: &[Value]) -> Result<DbRow> {
        self.fetch_optional(sql, params)
            .await?
            .ok_or_else(|| StoreError::internal(sqlx::Error::RowNotFound))
    }

    /// Begin a transaction.
    pub async fn begin(&self) -> Result<DbTx> {
        match self {
            DbPool::Sqlite(pool) => Ok(DbTx::Sqlite(pool.begin().await?)),
            DbPool::Postgres(pool) => Ok(DbTx::Postgres(pool.begin().await?)),
        }
    }
}

/// An open transaction over either backend.
pub enum DbTx {
    Sqlite(Transaction<'static, Sqlite>),
    Postgres(Transaction<'static, Postgres>),
}

impl DbTx {
    pub fn kind(&self) -> DialectKind {
        match self {
            DbTx::Sqlite(_) => DialectKind::Sqlite,
            DbTx::Postgres(_) => DialectKind::Postgres,
        }
    }

    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        match self {
            DbTx::Sqlite(tx) => {
                let done = bind_sqlite(sql, params).execute(&mut **tx).await?;
                Ok(done.rows_affected())
            }
            DbTx::Postgres(tx) => {
                let sql = number_placeholders(sql);
                let done = bind_postgres(&sql, params).execute(&mut **tx).await?;
                Ok(done.rows_affected())
            }
        }
    }

    pub async fn fetch_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<DbRow>> {
        match self {
            DbTx::Sqlite(tx) => {
                let rows = bind_sqlite(sql, params).fetch_all(&mut **tx).await?;
                Ok(rows.into_iter().map(DbRow::Sqlite).collect())
            }
            DbTx::Postgres(tx) => {
                let sql = number_placeholders(sql);
                let rows = bind_postgres(&sql, params).fetch_all(&mut **tx).await?;
                Ok(rows.into_iter().map(DbRow::Postgres).collect())
            }
        }
    }

    pub async fn fetch_optional(&mut self, sql: &str, params: &[Value]) -> Result<Option<DbRow>> {
        match self {
            DbTx::Sqlite(tx) => {
                let row = bind_sqlite(sql, params).fetch_optional(&mut **tx).await?;
                Ok(row.map(DbRow::Sqlite))
            }
            DbTx::Postgres(tx) => {
                let sql = number_placeholders(sql);
                let row = bind_postgres(&sql, params).fetch_optional(&mut **tx).await?;
                Ok(row.map(DbRow::Postgres))
            }
        }
    }

    pub async fn commit(self) -> Result<()> {
        match self {
            DbTx::Sqlite(tx) => tx.commit().await?,
            DbTx::Postgres(tx) => tx.commit().await?,
        }
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        match self {
            DbTx::Sqlite(tx) => tx.rollback().await?,
            DbTx::Postgres(tx) => tx.rollback().await?,
        }
        Ok(())
    }
}
