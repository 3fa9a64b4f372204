//! Server dialect.
//!
//! Column alterations are plain `ALTER TABLE` statements; introspection
//! goes through `information_schema` and `pg_indexes`.

use async_trait::async_trait;

use super::{Dialect, DialectKind, IntrospectedColumn};
use crate::catalog::{ColumnSpec, DefaultValue, SemanticType, UniqueSpec};
use crate::db::DbTx;
use crate::error::Result;
use crate::value::Value;

/// Server dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

#[async_trait]
impl Dialect for PostgresDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn name(&self) -> &str {
        "postgres"
    }

    fn type_sql(&self, ty: &SemanticType) -> String {
        match ty {
            SemanticType::Text(Some(n)) => format!("VARCHAR({})", n),
            SemanticType::Text(None) => "TEXT".to_string(),
            SemanticType::Integer => "INTEGER".to_string(),
            SemanticType::BigInt => "BIGINT".to_string(),
            SemanticType::Boolean => "BOOLEAN".to_string(),
            SemanticType::Date => "DATE".to_string(),
            SemanticType::Timestamp => "TIMESTAMPTZ".to_string(),
            SemanticType::Json => "JSONB".to_string(),
        }
    }

    fn default_sql(&self, default: &DefaultValue) -> String {
        match default {
            DefaultValue::Bool(false) => "false".to_string(),
            DefaultValue::Bool(true) => "true".to_string(),
            DefaultValue::Int(i) => i.to_string(),
            DefaultValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            DefaultValue::EmptyJsonArray => "'[]'".to_string(),
            DefaultValue::EmptyJsonObject => "'{}'".to_string(),
            DefaultValue::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
        }
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn alter_requires_rebuild(&self) -> bool {
        false
    }

    async fn table_exists(&self, tx: &mut DbTx, table: &str) -> Result<bool> {
        let row = tx
            .fetch_optional(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = ?",
                &[Value::from(table)],
            )
            .await?;
        Ok(row.is_some())
    }

    async fn list_columns(&self, tx: &mut DbTx, table: &str) -> Result<Vec<IntrospectedColumn>> {
        let rows = tx
            .fetch_all(
                "SELECT c.column_name, c.data_type, c.is_nullable, c.column_default, \
                        (pk.column_name IS NOT NULL) AS is_pk \
                 FROM information_schema.columns c \
                 LEFT JOIN ( \
                     SELECT kcu.column_name \
                     FROM information_schema.table_constraints tc \
                     JOIN information_schema.key_column_usage kcu \
                       ON kcu.constraint_name = tc.constraint_name \
                      AND kcu.table_schema = tc.table_schema \
                     WHERE tc.table_schema = current_schema() \
                       AND tc.table_name = ? \
                       AND tc.constraint_type = 'PRIMARY KEY' \
                 ) pk ON pk.column_name = c.column_name \
                 WHERE c.table_schema = current_schema() AND c.table_name = ? \
                 ORDER BY c.ordinal_position",
                &[Value::from(table), Value::from(table)],
            )
            .await?;
        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            columns.push(IntrospectedColumn {
                name: row.get_text("column_name")?,
                declared_type: row.get_text("data_type")?,
                nullable: row.get_text("is_nullable")? == "YES",
                default: row.get_opt_text("column_default")?,
                primary_key: row.get_bool("is_pk")?,
            });
        }
        Ok(columns)
    }

    async fn list_indexes(&self, tx: &mut DbTx, table: &str) -> Result<Vec<String>> {
        let rows = tx
            .fetch_all(
                "SELECT indexname FROM pg_indexes \
                 WHERE schemaname = current_schema() AND tablename = ? \
                   AND indexname NOT LIKE '%_pkey' \
                 ORDER BY indexname",
                &[Value::from(table)],
            )
            .await?;
        rows.iter().map(|r| r.get_text("indexname")).collect()
    }

    async fn drop_column(&self, tx: &mut DbTx, table: &str, column: &str) -> Result<()> {
        let sql = format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_ident(table),
            self.quote_ident(column)
        );
        tx.execute(&sql, &[]).await?;
        Ok(())
    }

    async fn alter_column(&self, tx: &mut DbTx, table: &str, column: &ColumnSpec) -> Result<()> {
        let table_sql = self.quote_ident(table);
        let column_sql = self.quote_ident(column.name);

        let nullability = if column.nullable {
            format!(
                "ALTER TABLE {} ALTER COLUMN {} DROP NOT NULL",
                table_sql, column_sql
            )
        } else {
            format!(
                "ALTER TABLE {} ALTER COLUMN {} SET NOT NULL",
                table_sql, column_sql
            )
        };
        tx.execute(&nullability, &[]).await?;

        let default = match &column.default {
            Some(d) => format!(
                "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
                table_sql,
                column_sql,
                self.default_sql(d)
            ),
            None => format!(
                "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT",
                table_sql, column_sql
            ),
        };
        tx.execute(&default, &[]).await?;
        Ok(())
    }

    async fn add_unique(&self, tx: &mut DbTx, table: &str, unique: &UniqueSpec) -> Result<()> {
        let cols = unique
            .columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})",
            self.quote_ident(table),
            self.quote_ident(unique.name),
            cols
        );
        tx.execute(&sql, &[]).await?;
        Ok(())
    }

    async fn drop_unique(&self, tx: &mut DbTx, table: &str, unique: &UniqueSpec) -> Result<()> {
        let sql = format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.quote_ident(table),
            self.quote_ident(unique.name)
        );
        tx.execute(&sql, &[]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_sql() {
        let d = PostgresDialect;
        assert_eq!(d.type_sql(&SemanticType::text(255)), "VARCHAR(255)");
        assert_eq!(d.type_sql(&SemanticType::unbounded_text()), "TEXT");
        assert_eq!(d.type_sql(&SemanticType::Timestamp), "TIMESTAMPTZ");
        assert_eq!(d.type_sql(&SemanticType::BigInt), "BIGINT");
    }

    #[test]
    fn test_default_sql_escapes_quotes() {
        let d = PostgresDialect;
        assert_eq!(d.default_sql(&DefaultValue::Text("it's")), "'it''s'");
        assert_eq!(d.default_sql(&DefaultValue::EmptyJsonObject), "'{}'");
        assert_eq!(
            d.default_sql(&DefaultValue::CurrentTimestamp),
            "CURRENT_TIMESTAMP"
        );
    }

    #[test]
    fn test_add_column_rendering() {
        let d = PostgresDialect;
        let col = ColumnSpec::new("use_cache", SemanticType::Boolean)
            .not_null()
            .default_value(DefaultValue::Bool(false));
        assert_eq!(
            d.add_column_sql("mcp_servers", &col),
            "ALTER TABLE \"mcp_servers\" ADD COLUMN \"use_cache\" BOOLEAN DEFAULT false NOT NULL"
        );
    }
}
