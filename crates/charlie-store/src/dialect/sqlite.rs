//! Embedded single-file dialect.
//!
//! The engine supports `ALTER TABLE` only for adding and renaming; changing
//! a column's nullability, default, or constraints goes through a batch
//! table rebuild: introspect the live table, create a replacement with the
//! target shape, copy rows, swap the tables, and recreate surviving
//! indexes. Foreign key checks are deferred to commit for the duration of
//! the swap.

use async_trait::async_trait;

use super::{Dialect, DialectKind, IntrospectedColumn};
use crate::catalog::{ColumnSpec, DefaultValue, SemanticType, UniqueSpec};
use crate::db::DbTx;
use crate::error::{Result, StoreError};
use crate::value::Value;

/// Embedded dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

/// Live column shape from `PRAGMA table_info`.
#[derive(Debug, Clone)]
struct LiveColumn {
    name: String,
    declared_type: String,
    not_null: bool,
    default: Option<String>,
    primary_key: bool,
}

/// Live foreign key from `PRAGMA foreign_key_list`.
#[derive(Debug, Clone)]
struct LiveForeignKey {
    column: String,
    references_table: String,
    references_column: String,
    on_delete: String,
}

/// Live secondary index with its original DDL.
#[derive(Debug, Clone)]
struct LiveIndex {
    columns: Vec<String>,
    sql: String,
}

/// Everything needed to regenerate a table.
#[derive(Debug, Clone)]
struct LiveTableShape {
    columns: Vec<LiveColumn>,
    foreign_keys: Vec<LiveForeignKey>,
    /// Column sets of table-level UNIQUE constraints.
    uniques: Vec<Vec<String>>,
    indexes: Vec<LiveIndex>,
}

/// A single column change driving a rebuild.
enum RebuildChange<'a> {
    DropColumn(&'a str),
    AlterColumn(&'a ColumnSpec),
}

#[async_trait]
impl Dialect for SqliteDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn name(&self) -> &str {
        "sqlite"
    }

    fn type_sql(&self, ty: &SemanticType) -> String {
        match ty {
            SemanticType::Text(Some(n)) => format!("VARCHAR({})", n),
            SemanticType::Text(None) => "TEXT".to_string(),
            SemanticType::Integer => "INTEGER".to_string(),
            SemanticType::BigInt => "BIGINT".to_string(),
            SemanticType::Boolean => "BOOLEAN".to_string(),
            SemanticType::Date => "DATE".to_string(),
            SemanticType::Timestamp => "TIMESTAMP".to_string(),
            // TEXT rather than JSON: a bare JSON decl gets numeric affinity,
            // which would mangle scalar documents.
            SemanticType::Json => "TEXT".to_string(),
        }
    }

    fn default_sql(&self, default: &DefaultValue) -> String {
        match default {
            DefaultValue::Bool(false) => "'0'".to_string(),
            DefaultValue::Bool(true) => "'1'".to_string(),
            DefaultValue::Int(i) => i.to_string(),
            DefaultValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            DefaultValue::EmptyJsonArray => "'[]'".to_string(),
            DefaultValue::EmptyJsonObject => "'{}'".to_string(),
            DefaultValue::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
        }
    }

    fn param_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn alter_requires_rebuild(&self) -> bool {
        true
    }

    async fn table_exists(&self, tx: &mut DbTx, table: &str) -> Result<bool> {
        let row = tx
            .fetch_optional(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
                &[Value::from(table)],
            )
            .await?;
        Ok(row.is_some())
    }

    async fn list_columns(&self, tx: &mut DbTx, table: &str) -> Result<Vec<IntrospectedColumn>> {
        let shape = self.introspect_shape(tx, table).await?;
        Ok(shape
            .columns
            .into_iter()
            .map(|c| IntrospectedColumn {
                name: c.name,
                declared_type: c.declared_type,
                nullable: !c.not_null,
                default: c.default,
                primary_key: c.primary_key,
            })
            .collect())
    }

    async fn list_indexes(&self, tx: &mut DbTx, table: &str) -> Result<Vec<String>> {
        let rows = tx
            .fetch_all(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'index' AND tbl_name = ? AND sql IS NOT NULL \
                 ORDER BY name",
                &[Value::from(table)],
            )
            .await?;
        rows.iter().map(|r| r.get_text("name")).collect()
    }

    async fn drop_column(&self, tx: &mut DbTx, table: &str, column: &str) -> Result<()> {
        self.rebuild(tx, table, RebuildChange::DropColumn(column))
            .await
    }

    async fn alter_column(&self, tx: &mut DbTx, table: &str, column: &ColumnSpec) -> Result<()> {
        self.rebuild(tx, table, RebuildChange::AlterColumn(column))
            .await
    }

    async fn add_unique(&self, tx: &mut DbTx, table: &str, unique: &UniqueSpec) -> Result<()> {
        // Named constraints added after creation are realized as unique
        // indexes; sqlite has no ADD CONSTRAINT.
        let cols = unique
            .columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "CREATE UNIQUE INDEX {} ON {} ({})",
            self.quote_ident(unique.name),
            self.quote_ident(table),
            cols
        );
        tx.execute(&sql, &[]).await?;
        Ok(())
    }

    async fn drop_unique(&self, tx: &mut DbTx, _table: &str, unique: &UniqueSpec) -> Result<()> {
        tx.execute(&self.drop_index_sql(unique.name), &[]).await?;
        Ok(())
    }
}

impl SqliteDialect {
    async fn introspect_shape(&self, tx: &mut DbTx, table: &str) -> Result<LiveTableShape> {
        let quoted = self.quote_ident(table);

        let rows = tx
            .fetch_all(&format!("PRAGMA table_info({})", quoted), &[])
            .await?;
        if rows.is_empty() {
            return Err(StoreError::validation(format!(
                "table {} does not exist",
                table
            )));
        }
        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            columns.push(LiveColumn {
                name: row.get_text("name")?,
                declared_type: row.get_text("type")?,
                not_null: row.get_i64("notnull")? != 0,
                default: row.get_opt_text("dflt_value")?,
                primary_key: row.get_i64("pk")? != 0,
            });
        }

        let rows = tx
            .fetch_all(&format!("PRAGMA foreign_key_list({})", quoted), &[])
            .await?;
        let mut foreign_keys = Vec::with_capacity(rows.len());
        for row in &rows {
            foreign_keys.push(LiveForeignKey {
                column: row.get_text("from")?,
                references_table: row.get_text("table")?,
                references_column: row.get_opt_text("to")?.unwrap_or_else(|| "id".to_string()),
                on_delete: row.get_text("on_delete")?,
            });
        }

        // Table-level UNIQUE constraints surface as origin 'u' auto indexes.
        let mut uniques = Vec::new();
        let rows = tx
            .fetch_all(&format!("PRAGMA index_list({})", quoted), &[])
            .await?;
        let index_meta: Vec<(String, String)> = rows
            .iter()
            .map(|r| Ok((r.get_text("name")?, r.get_text("origin")?)))
            .collect::<Result<_>>()?;
        for (index_name, origin) in &index_meta {
            if origin == "u" {
                uniques.push(self.index_columns(tx, index_name).await?);
            }
        }

        let rows = tx
            .fetch_all(
                "SELECT name, sql FROM sqlite_master \
                 WHERE type = 'index' AND tbl_name = ? AND sql IS NOT NULL",
                &[Value::from(table)],
            )
            .await?;
        let mut indexes = Vec::with_capacity(rows.len());
        for row in &rows {
            let name = row.get_text("name")?;
            indexes.push(LiveIndex {
                columns: self.index_columns(tx, &name).await?,
                sql: row.get_text("sql")?,
            });
        }

        Ok(LiveTableShape {
            columns,
            foreign_keys,
            uniques,
            indexes,
        })
    }

    async fn index_columns(&self, tx: &mut DbTx, index: &str) -> Result<Vec<String>> {
        let rows = tx
            .fetch_all(
                &format!("PRAGMA index_info({})", self.quote_ident(index)),
                &[],
            )
            .await?;
        rows.iter().map(|r| r.get_text("name")).collect()
    }

    fn render_rebuilt_table(&self, name: &str, shape: &LiveTableShape) -> String {
        let mut parts: Vec<String> = Vec::new();
        for column in &shape.columns {
            let mut sql = format!("{} {}", self.quote_ident(&column.name), column.declared_type);
            if let Some(default) = &column.default {
                sql.push_str(" DEFAULT ");
                sql.push_str(default);
            }
            if column.not_null {
                sql.push_str(" NOT NULL");
            }
            if column.primary_key {
                sql.push_str(" PRIMARY KEY");
            }
            parts.push(sql);
        }
        for unique in &shape.uniques {
            let cols = unique
                .iter()
                .map(|c| self.quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ");
            parts.push(format!("UNIQUE ({})", cols));
        }
        for fk in &shape.foreign_keys {
            parts.push(format!(
                "FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
                self.quote_ident(&fk.column),
                self.quote_ident(&fk.references_table),
                self.quote_ident(&fk.references_column),
                fk.on_delete
            ));
        }
        format!(
            "CREATE TABLE {} (\n    {}\n)",
            self.quote_ident(name),
            parts.join(",\n    ")
        )
    }

    async fn rebuild(&self, tx: &mut DbTx, table: &str, change: RebuildChange<'_>) -> Result<()> {
        let mut shape = self.introspect_shape(tx, table).await?;
        let mut copy_columns: Vec<String> = shape.columns.iter().map(|c| c.name.clone()).collect();

        match change {
            RebuildChange::DropColumn(dropped) => {
                if !shape.columns.iter().any(|c| c.name == dropped) {
                    return Err(StoreError::validation(format!(
                        "cannot drop unknown column {}.{}",
                        table, dropped
                    )));
                }
                shape.columns.retain(|c| c.name != dropped);
                shape.foreign_keys.retain(|fk| fk.column != dropped);
                shape.uniques.retain(|u| !u.iter().any(|c| c == dropped));
                shape
                    .indexes
                    .retain(|i| !i.columns.iter().any(|c| c == dropped));
                copy_columns.retain(|c| c != dropped);
            }
            RebuildChange::AlterColumn(target) => {
                let live = shape
                    .columns
                    .iter_mut()
                    .find(|c| c.name == target.name)
                    .ok_or_else(|| {
                        StoreError::validation(format!(
                            "cannot alter unknown column {}.{}",
                            table, target.name
                        ))
                    })?;
                live.declared_type = self.type_sql(&target.ty);
                live.not_null = !target.nullable;
                live.default = target.default.as_ref().map(|d| self.default_sql(d));
            }
        }

        let staging = format!("_rebuild_{}", table);
        let column_list = copy_columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");

        // Constraint checks move to commit so the drop-and-rename swap never
        // trips references from sibling tables.
        tx.execute("PRAGMA defer_foreign_keys = ON", &[]).await?;
        tx.execute(&self.render_rebuilt_table(&staging, &shape), &[])
            .await?;
        tx.execute(
            &format!(
                "INSERT INTO {} ({}) SELECT {} FROM {}",
                self.quote_ident(&staging),
                column_list,
                column_list,
                self.quote_ident(table)
            ),
            &[],
        )
        .await?;
        tx.execute(&self.drop_table_sql(table), &[]).await?;
        tx.execute(
            &format!(
                "ALTER TABLE {} RENAME TO {}",
                self.quote_ident(&staging),
                self.quote_ident(table)
            ),
            &[],
        )
        .await?;
        for index in &shape.indexes {
            tx.execute(&index.sql, &[]).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbPool;

    async fn setup() -> DbPool {
        let pool = DbPool::connect_sqlite_memory().await.unwrap();
        pool.execute(
            "CREATE TABLE items (\n\
             \"id\" VARCHAR(36) NOT NULL PRIMARY KEY,\n\
             \"label\" VARCHAR(255) NOT NULL,\n\
             \"command\" VARCHAR(500) NOT NULL,\n\
             \"flag\" BOOLEAN DEFAULT '0' NOT NULL\n\
             )",
            &[],
        )
        .await
        .unwrap();
        pool.execute("CREATE INDEX ix_items_label ON items (label)", &[])
            .await
            .unwrap();
        pool.execute(
            "INSERT INTO items (id, label, command, flag) VALUES ('a', 'one', 'run', '1')",
            &[],
        )
        .await
        .unwrap();
        pool
    }

    #[tokio::test]
    async fn test_list_columns() {
        let pool = setup().await;
        let mut tx = pool.begin().await.unwrap();
        let cols = SqliteDialect.list_columns(&mut tx, "items").await.unwrap();
        tx.commit().await.unwrap();

        let command = cols.iter().find(|c| c.name == "command").unwrap();
        assert!(!command.nullable);
        assert_eq!(command.declared_type, "VARCHAR(500)");
        let flag = cols.iter().find(|c| c.name == "flag").unwrap();
        assert_eq!(flag.default.as_deref(), Some("'0'"));
        let id = cols.iter().find(|c| c.name == "id").unwrap();
        assert!(id.primary_key);
    }

    #[tokio::test]
    async fn test_column_exists() {
        let pool = setup().await;
        let mut tx = pool.begin().await.unwrap();
        assert!(SqliteDialect
            .column_exists(&mut tx, "items", "label")
            .await
            .unwrap());
        assert!(!SqliteDialect
            .column_exists(&mut tx, "items", "missing")
            .await
            .unwrap());
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_alter_column_to_nullable_rebuilds() {
        let pool = setup().await;
        let mut tx = pool.begin().await.unwrap();
        let target = ColumnSpec::new("command", SemanticType::text(500));
        SqliteDialect
            .alter_column(&mut tx, "items", &target)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        let cols = SqliteDialect.list_columns(&mut tx, "items").await.unwrap();
        let command = cols.iter().find(|c| c.name == "command").unwrap();
        assert!(command.nullable);
        // data and sibling columns survive the rebuild
        let indexes = SqliteDialect.list_indexes(&mut tx, "items").await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(indexes, vec!["ix_items_label".to_string()]);

        let row = pool
            .fetch_one("SELECT * FROM items WHERE id = 'a'", &[])
            .await
            .unwrap();
        assert_eq!(row.get_text("label").unwrap(), "one");
        assert!(row.get_bool("flag").unwrap());
    }

    #[tokio::test]
    async fn test_drop_column_rebuilds_and_prunes_indexes() {
        let pool = setup().await;
        let mut tx = pool.begin().await.unwrap();
        SqliteDialect
            .drop_column(&mut tx, "items", "label")
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        let cols = SqliteDialect.list_columns(&mut tx, "items").await.unwrap();
        assert!(!cols.iter().any(|c| c.name == "label"));
        let indexes = SqliteDialect.list_indexes(&mut tx, "items").await.unwrap();
        tx.commit().await.unwrap();
        assert!(indexes.is_empty(), "index on dropped column must go");

        let row = pool
            .fetch_one("SELECT * FROM items WHERE id = 'a'", &[])
            .await
            .unwrap();
        assert_eq!(row.get_text("command").unwrap(), "run");
    }

    #[tokio::test]
    async fn test_add_and_drop_unique() {
        let pool = setup().await;
        let unique = UniqueSpec::new("uq_items_label", &["label"]);
        let mut tx = pool.begin().await.unwrap();
        SqliteDialect
            .add_unique(&mut tx, "items", &unique)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let dup = pool
            .execute(
                "INSERT INTO items (id, label, command) VALUES ('b', 'one', 'run')",
                &[],
            )
            .await;
        assert!(matches!(
            dup,
            Err(crate::error::StoreError::AlreadyExists { .. })
        ));

        let mut tx = pool.begin().await.unwrap();
        SqliteDialect
            .drop_unique(&mut tx, "items", &unique)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        pool.execute(
            "INSERT INTO items (id, label, command) VALUES ('b', 'one', 'run')",
            &[],
        )
        .await
        .unwrap();
    }
}
