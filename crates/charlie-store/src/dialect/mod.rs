//! SQL dialect adapters (Strategy pattern).
//!
//! All engine-specific SQL syntax lives behind the [`Dialect`] trait: type
//! and default rendering, placeholder style, introspection queries, and the
//! column-alteration strategy. The embedded dialect cannot alter columns in
//! place and rebuilds the table instead; the server dialect emits direct
//! `ALTER TABLE` statements.

pub mod postgres;
pub mod sqlite;

use async_trait::async_trait;

use crate::catalog::{ColumnSpec, DefaultValue, IndexSpec, SemanticType, TableSpec, UniqueSpec};
use crate::db::DbTx;
use crate::error::{Result, StoreError};

pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

/// Supported engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialectKind {
    /// Embedded single-file engine.
    Sqlite,
    /// Server engine.
    Postgres,
}

impl DialectKind {
    /// Derive the dialect from a database URL scheme.
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url.split(':').next().unwrap_or_default();
        match scheme {
            "sqlite" => Ok(DialectKind::Sqlite),
            "postgres" | "postgresql" => Ok(DialectKind::Postgres),
            other => Err(StoreError::Config(format!(
                "unsupported database URL scheme: {}",
                other
            ))),
        }
    }

    pub fn dialect(&self) -> &'static dyn Dialect {
        match self {
            DialectKind::Sqlite => &SqliteDialect,
            DialectKind::Postgres => &PostgresDialect,
        }
    }
}

/// A column as reported by the live database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntrospectedColumn {
    pub name: String,
    pub declared_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub primary_key: bool,
}

/// SQL dialect implementation.
#[async_trait]
pub trait Dialect: Send + Sync {
    fn kind(&self) -> DialectKind;

    fn name(&self) -> &str;

    /// Quote an identifier, doubling embedded quotes.
    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Render a semantic type as engine SQL.
    fn type_sql(&self, ty: &SemanticType) -> String;

    /// Render a default value as engine SQL. Boolean literals differ: the
    /// embedded engine stores `'0'`/`'1'`, the server `false`/`true`.
    fn default_sql(&self, default: &DefaultValue) -> String;

    /// Positional parameter placeholder (1-based index).
    fn param_placeholder(&self, index: usize) -> String;

    /// Whether DDL participates in transactions. True for both supported
    /// engines; kept on the trait so the migrator can refuse engines where
    /// a mid-revision failure could not roll back.
    fn supports_ddl_transactions(&self) -> bool {
        true
    }

    /// Whether column alteration requires a table rebuild.
    fn alter_requires_rebuild(&self) -> bool;

    fn column_sql(&self, column: &ColumnSpec, primary_key: bool) -> String {
        let mut sql = format!(
            "{} {}",
            self.quote_ident(column.name),
            self.type_sql(&column.ty)
        );
        if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.default_sql(default));
        }
        if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        if primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        sql
    }

    fn create_table_sql(&self, table: &TableSpec) -> String {
        let mut parts: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.column_sql(c, c.name == table.primary_key))
            .collect();

        for unique in &table.uniques {
            let cols = unique
                .columns
                .iter()
                .map(|c| self.quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ");
            parts.push(format!(
                "CONSTRAINT {} UNIQUE ({})",
                self.quote_ident(unique.name),
                cols
            ));
        }

        for fk in &table.foreign_keys {
            let action = match fk.on_delete {
                crate::catalog::OnDelete::Cascade => "CASCADE",
                crate::catalog::OnDelete::SetNull => "SET NULL",
                crate::catalog::OnDelete::Restrict => "RESTRICT",
            };
            parts.push(format!(
                "FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
                self.quote_ident(fk.column),
                self.quote_ident(fk.references_table),
                self.quote_ident(fk.references_column),
                action
            ));
        }

        format!(
            "CREATE TABLE {} (\n    {}\n)",
            self.quote_ident(table.name),
            parts.join(",\n    ")
        )
    }

    fn drop_table_sql(&self, table: &str) -> String {
        format!("DROP TABLE {}", self.quote_ident(table))
    }

    fn add_column_sql(&self, table: &str, column: &ColumnSpec) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_ident(table),
            self.column_sql(column, false)
        )
    }

    fn create_index_sql(&self, table: &str, index: &IndexSpec) -> String {
        let cols = index
            .columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            self.quote_ident(index.name),
            self.quote_ident(table),
            cols
        )
    }

    fn drop_index_sql(&self, name: &str) -> String {
        format!("DROP INDEX {}", self.quote_ident(name))
    }

    async fn table_exists(&self, tx: &mut DbTx, table: &str) -> Result<bool>;

    async fn list_columns(&self, tx: &mut DbTx, table: &str) -> Result<Vec<IntrospectedColumn>>;

    async fn column_exists(&self, tx: &mut DbTx, table: &str, column: &str) -> Result<bool> {
        let columns = self.list_columns(tx, table).await?;
        Ok(columns.iter().any(|c| c.name == column))
    }

    /// Names of secondary indexes on a table (auto-generated constraint
    /// indexes excluded).
    async fn list_indexes(&self, tx: &mut DbTx, table: &str) -> Result<Vec<String>>;

    async fn drop_column(&self, tx: &mut DbTx, table: &str, column: &str) -> Result<()>;

    /// Change nullability and/or default of an existing column to match
    /// `column`. Type changes are not supported.
    async fn alter_column(&self, tx: &mut DbTx, table: &str, column: &ColumnSpec) -> Result<()>;

    async fn add_unique(&self, tx: &mut DbTx, table: &str, unique: &UniqueSpec) -> Result<()>;

    async fn drop_unique(&self, tx: &mut DbTx, table: &str, unique: &UniqueSpec) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_url() {
        assert_eq!(
            DialectKind::from_url("sqlite:charlie.db").unwrap(),
            DialectKind::Sqlite
        );
        assert_eq!(
            DialectKind::from_url("postgres://app@db/charlie").unwrap(),
            DialectKind::Postgres
        );
        assert_eq!(
            DialectKind::from_url("postgresql://app@db/charlie").unwrap(),
            DialectKind::Postgres
        );
        assert!(DialectKind::from_url("mysql://db").is_err());
    }

    #[test]
    fn test_quote_ident() {
        let dialect = SqliteDialect;
        assert_eq!(dialect.quote_ident("name"), "\"name\"");
        assert_eq!(dialect.quote_ident("ta\"ble"), "\"ta\"\"ble\"");
    }

    #[test]
    fn test_boolean_literals_differ() {
        assert_eq!(SqliteDialect.default_sql(&DefaultValue::Bool(false)), "'0'");
        assert_eq!(SqliteDialect.default_sql(&DefaultValue::Bool(true)), "'1'");
        assert_eq!(
            PostgresDialect.default_sql(&DefaultValue::Bool(false)),
            "false"
        );
        assert_eq!(
            PostgresDialect.default_sql(&DefaultValue::Bool(true)),
            "true"
        );
    }

    #[test]
    fn test_json_type_mapping() {
        assert_eq!(SqliteDialect.type_sql(&SemanticType::Json), "TEXT");
        assert_eq!(PostgresDialect.type_sql(&SemanticType::Json), "JSONB");
    }

    #[test]
    fn test_create_table_rendering() {
        let table = crate::catalog::tables::billing_events();
        let sql = SqliteDialect.create_table_sql(&table);
        assert!(sql.starts_with("CREATE TABLE \"billing_events\""));
        assert!(sql.contains("\"id\" VARCHAR(36) NOT NULL PRIMARY KEY"));
        assert!(sql.contains(
            "FOREIGN KEY (\"user_id\") REFERENCES \"users\" (\"id\") ON DELETE CASCADE"
        ));

        let pg = PostgresDialect.create_table_sql(&table);
        assert!(pg.contains("\"payload\" JSONB"));
    }

    #[test]
    fn test_param_placeholders() {
        assert_eq!(SqliteDialect.param_placeholder(3), "?");
        assert_eq!(PostgresDialect.param_placeholder(3), "$3");
    }
}
