//! Structural DDL operations.
//!
//! A revision is a list of these; each renders and executes through the
//! active [`Dialect`], which decides between direct DDL and a table rebuild.

use crate::catalog::{ColumnSpec, IndexSpec, TableSpec, UniqueSpec};
use crate::db::DbTx;
use crate::dialect::{Dialect, DialectKind};
use crate::error::Result;

/// One schema change.
#[derive(Debug, Clone)]
pub enum DdlOp {
    CreateTable(TableSpec),
    DropTable(&'static str),
    AddColumn {
        table: &'static str,
        column: ColumnSpec,
    },
    /// AddColumn guarded by introspection; re-applying is a no-op. Used by
    /// revisions that historically shipped twice to different fleets.
    AddColumnIfAbsent {
        table: &'static str,
        column: ColumnSpec,
    },
    DropColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Change nullability/default of an existing column to the given shape.
    AlterColumn {
        table: &'static str,
        column: ColumnSpec,
    },
    CreateIndex {
        table: &'static str,
        index: IndexSpec,
    },
    DropIndex {
        name: &'static str,
    },
    CreateUnique {
        table: &'static str,
        unique: UniqueSpec,
    },
    DropUnique {
        table: &'static str,
        unique: UniqueSpec,
    },
    /// Raw statement per dialect, for data backfills.
    Sql {
        sqlite: &'static str,
        postgres: &'static str,
    },
}

impl DdlOp {
    /// Raw statement identical on both dialects.
    pub fn sql(statement: &'static str) -> Self {
        DdlOp::Sql {
            sqlite: statement,
            postgres: statement,
        }
    }

    /// Short human description for failure messages.
    pub fn describe(&self) -> String {
        match self {
            DdlOp::CreateTable(t) => format!("create table {}", t.name),
            DdlOp::DropTable(t) => format!("drop table {}", t),
            DdlOp::AddColumn { table, column } => format!("add column {}.{}", table, column.name),
            DdlOp::AddColumnIfAbsent { table, column } => {
                format!("add column {}.{} if absent", table, column.name)
            }
            DdlOp::DropColumn { table, column } => format!("drop column {}.{}", table, column),
            DdlOp::AlterColumn { table, column } => format!("alter column {}.{}", table, column.name),
            DdlOp::CreateIndex { index, .. } => format!("create index {}", index.name),
            DdlOp::DropIndex { name } => format!("drop index {}", name),
            DdlOp::CreateUnique { unique, .. } => format!("create constraint {}", unique.name),
            DdlOp::DropUnique { unique, .. } => format!("drop constraint {}", unique.name),
            DdlOp::Sql { .. } => "raw sql".to_string(),
        }
    }

    /// Execute this operation inside the revision transaction.
    pub async fn apply(&self, tx: &mut DbTx, dialect: &dyn Dialect) -> Result<()> {
        match self {
            DdlOp::CreateTable(table) => {
                tx.execute(&dialect.create_table_sql(table), &[]).await?;
                for index in &table.indexes {
                    tx.execute(&dialect.create_index_sql(table.name, index), &[])
                        .await?;
                }
                Ok(())
            }
            DdlOp::DropTable(table) => {
                tx.execute(&dialect.drop_table_sql(table), &[]).await?;
                Ok(())
            }
            DdlOp::AddColumn { table, column } => {
                tx.execute(&dialect.add_column_sql(table, column), &[])
                    .await?;
                Ok(())
            }
            DdlOp::AddColumnIfAbsent { table, column } => {
                if dialect.column_exists(tx, table, column.name).await? {
                    tracing::debug!(table, column = column.name, "column present, skipping");
                    return Ok(());
                }
                tx.execute(&dialect.add_column_sql(table, column), &[])
                    .await?;
                Ok(())
            }
            DdlOp::DropColumn { table, column } => dialect.drop_column(tx, table, column).await,
            DdlOp::AlterColumn { table, column } => dialect.alter_column(tx, table, column).await,
            DdlOp::CreateIndex { table, index } => {
                tx.execute(&dialect.create_index_sql(table, index), &[])
                    .await?;
                Ok(())
            }
            DdlOp::DropIndex { name } => {
                tx.execute(&dialect.drop_index_sql(name), &[]).await?;
                Ok(())
            }
            DdlOp::CreateUnique { table, unique } => dialect.add_unique(tx, table, unique).await,
            DdlOp::DropUnique { table, unique } => dialect.drop_unique(tx, table, unique).await,
            DdlOp::Sql { sqlite, postgres } => {
                let statement = match dialect.kind() {
                    DialectKind::Sqlite => sqlite,
                    DialectKind::Postgres => postgres,
                };
                tx.execute(statement, &[]).await?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SemanticType;
    use crate::db::DbPool;
    use crate::dialect::SqliteDialect;

    #[tokio::test]
    async fn test_add_column_if_absent_is_idempotent() {
        let pool = DbPool::connect_sqlite_memory().await.unwrap();
        pool.execute("CREATE TABLE t (id VARCHAR(36) NOT NULL PRIMARY KEY)", &[])
            .await
            .unwrap();

        let op = DdlOp::AddColumnIfAbsent {
            table: "t",
            column: ColumnSpec::new("extra", SemanticType::text(100)),
        };

        for _ in 0..2 {
            let mut tx = pool.begin().await.unwrap();
            op.apply(&mut tx, &SqliteDialect).await.unwrap();
            tx.commit().await.unwrap();
        }

        let mut tx = pool.begin().await.unwrap();
        use crate::dialect::Dialect as _;
        let cols = SqliteDialect.list_columns(&mut tx, "t").await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(cols.iter().filter(|c| c.name == "extra").count(), 1);
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            DdlOp::DropColumn {
                table: "conversations",
                column: "agent_id"
            }
            .describe(),
            "drop column conversations.agent_id"
        );
    }
}
