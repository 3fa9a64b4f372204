//! Ordered, reversible schema migrations.
//!
//! Revisions form a strictly linear chain validated at startup. The current
//! position lives in a single-row tracking table inside the database being
//! migrated; each revision applies inside one transaction together with the
//! tracking update, so a failure leaves the database at the last good
//! revision.

pub mod ops;
pub mod revisions;

use tracing::{info, info_span, Instrument};

use crate::db::DbPool;
use crate::dialect::Dialect;
use crate::error::{Result, StoreError};
use crate::value::Value;
use ops::DdlOp;

const TRACKING_TABLE: &str = "schema_revision";

/// Pseudo-target for [`Migrator::down`] meaning "revert everything".
pub const BASE: &str = "base";

/// One reversible schema change set.
pub struct Revision {
    pub id: &'static str,
    pub parent: Option<&'static str>,
    pub label: &'static str,
    pub upgrade: Vec<DdlOp>,
    pub downgrade: Vec<DdlOp>,
}

/// A chain entry with its applied state, for `migrate history`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionStatus {
    pub id: String,
    pub label: String,
    pub applied: bool,
}

enum Direction {
    Up,
    Down,
}

/// Walks the revision chain against a live database.
pub struct Migrator {
    pool: DbPool,
    dialect: &'static dyn Dialect,
    revisions: Vec<Revision>,
}

impl Migrator {
    pub fn new(pool: DbPool) -> Result<Self> {
        let dialect = pool.kind().dialect();
        if !dialect.supports_ddl_transactions() {
            return Err(StoreError::Config(format!(
                "dialect {} cannot run transactional migrations",
                dialect.name()
            )));
        }
        let revisions = revisions::chain();
        validate_chain(&revisions)?;
        Ok(Self {
            pool,
            dialect,
            revisions,
        })
    }

    /// Current revision id, or None at base.
    pub async fn current(&self) -> Result<Option<String>> {
        self.ensure_tracking_table().await?;
        let row = self
            .pool
            .fetch_optional(
                &format!("SELECT revision_id FROM {}", TRACKING_TABLE),
                &[],
            )
            .await?;
        row.map(|r| r.get_text("revision_id")).transpose()
    }

    /// Apply pending revisions up to and including `to` (default: head).
    /// Targeting an already-applied revision is a no-op.
    pub async fn up(&self, to: Option<&str>) -> Result<Vec<String>> {
        self.ensure_tracking_table().await?;
        let start = match self.current().await? {
            Some(id) => self.position_of(&id)? + 1,
            None => 0,
        };
        let end = match to {
            Some(id) => self.position_of(id)? + 1,
            None => self.revisions.len(),
        };
        if end <= start {
            return Ok(Vec::new());
        }

        let mut applied = Vec::with_capacity(end - start);
        for revision in &self.revisions[start..end] {
            self.apply_revision(revision, Direction::Up).await?;
            applied.push(revision.id.to_string());
        }
        Ok(applied)
    }

    /// Revert revisions down to `to`, which remains applied; pass
    /// [`BASE`] to revert everything. The target must not be ahead of the
    /// current position.
    pub async fn down(&self, to: &str) -> Result<Vec<String>> {
        self.ensure_tracking_table().await?;
        let keep = if to == BASE {
            0
        } else {
            self.position_of(to)? + 1
        };
        let current = match self.current().await? {
            Some(id) => self.position_of(&id)?,
            None if keep == 0 => return Ok(Vec::new()),
            None => {
                return Err(StoreError::validation(format!(
                    "cannot downgrade to {}: database is at base",
                    to
                )))
            }
        };
        if keep > current + 1 {
            return Err(StoreError::validation(format!(
                "cannot downgrade to {}: it is ahead of the current revision",
                to
            )));
        }

        let mut reverted = Vec::new();
        for revision in self.revisions[keep..=current].iter().rev() {
            self.apply_revision(revision, Direction::Down).await?;
            reverted.push(revision.id.to_string());
        }
        Ok(reverted)
    }

    /// The full chain in order with applied markers.
    pub async fn history(&self) -> Result<Vec<RevisionStatus>> {
        let applied_through = match self.current().await? {
            Some(id) => Some(self.position_of(&id)?),
            None => None,
        };
        Ok(self
            .revisions
            .iter()
            .enumerate()
            .map(|(position, revision)| RevisionStatus {
                id: revision.id.to_string(),
                label: revision.label.to_string(),
                applied: applied_through.is_some_and(|through| position <= through),
            })
            .collect())
    }

    /// Ids not yet applied, in application order.
    pub async fn pending(&self) -> Result<Vec<String>> {
        Ok(self
            .history()
            .await?
            .into_iter()
            .filter(|status| !status.applied)
            .map(|status| status.id)
            .collect())
    }

    async fn ensure_tracking_table(&self) -> Result<()> {
        self.pool
            .execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {} (revision_id VARCHAR(64) NOT NULL)",
                    TRACKING_TABLE
                ),
                &[],
            )
            .await?;
        Ok(())
    }

    fn position_of(&self, id: &str) -> Result<usize> {
        self.revisions
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| StoreError::validation(format!("unknown revision: {}", id)))
    }

    async fn apply_revision(&self, revision: &Revision, direction: Direction) -> Result<()> {
        let direction_name = match direction {
            Direction::Up => "upgrade",
            Direction::Down => "downgrade",
        };
        let span = info_span!("revision", id = revision.id, direction = direction_name);

        async {
            let mut tx = self.pool.begin().await?;
            let steps = match direction {
                Direction::Up => &revision.upgrade,
                Direction::Down => &revision.downgrade,
            };
            for op in steps {
                op.apply(&mut tx, self.dialect).await.map_err(|err| {
                    StoreError::migration(
                        revision.id,
                        format!("{}: {}", op.describe(), err),
                    )
                })?;
            }

            let new_position = match direction {
                Direction::Up => Some(revision.id),
                Direction::Down => revision.parent,
            };
            tx.execute(&format!("DELETE FROM {}", TRACKING_TABLE), &[])
                .await?;
            if let Some(id) = new_position {
                tx.execute(
                    &format!("INSERT INTO {} (revision_id) VALUES (?)", TRACKING_TABLE),
                    &[Value::from(id)],
                )
                .await?;
            }
            tx.commit().await?;
            info!(label = revision.label, "applied");
            Ok(())
        }
        .instrument(span)
        .await
    }
}

/// Reject duplicate ids and broken parent links.
fn validate_chain(revisions: &[Revision]) -> Result<()> {
    if revisions.is_empty() {
        return Err(StoreError::validation("revision chain is empty"));
    }
    let mut seen = std::collections::HashSet::new();
    for revision in revisions {
        if !seen.insert(revision.id) {
            return Err(StoreError::validation(format!(
                "duplicate revision id: {}",
                revision.id
            )));
        }
    }
    if revisions[0].parent.is_some() {
        return Err(StoreError::validation(format!(
            "first revision {} must have no parent",
            revisions[0].id
        )));
    }
    for pair in revisions.windows(2) {
        if pair[1].parent != Some(pair[0].id) {
            return Err(StoreError::validation(format!(
                "revision {} does not follow {}: chain must be linear",
                pair[1].id, pair[0].id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_is_linear() {
        validate_chain(&revisions::chain()).unwrap();
    }

    #[test]
    fn test_validate_chain_rejects_broken_parent() {
        let revisions = vec![
            Revision {
                id: "a",
                parent: None,
                label: "a",
                upgrade: vec![],
                downgrade: vec![],
            },
            Revision {
                id: "b",
                parent: Some("missing"),
                label: "b",
                upgrade: vec![],
                downgrade: vec![],
            },
        ];
        assert!(validate_chain(&revisions).is_err());
    }

    #[test]
    fn test_validate_chain_rejects_duplicates() {
        let make = |parent| Revision {
            id: "a",
            parent,
            label: "a",
            upgrade: vec![],
            downgrade: vec![],
        };
        assert!(validate_chain(&[make(None), make(Some("a"))]).is_err());
    }

    #[tokio::test]
    async fn test_current_starts_at_base() {
        let pool = crate::db::DbPool::connect_sqlite_memory().await.unwrap();
        let migrator = Migrator::new(pool).unwrap();
        assert_eq!(migrator.current().await.unwrap(), None);
        assert!(migrator.down(BASE).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_target_rejected() {
        let pool = crate::db::DbPool::connect_sqlite_memory().await.unwrap();
        let migrator = Migrator::new(pool).unwrap();
        assert!(migrator.up(Some("nope")).await.is_err());
        assert!(migrator.down("nope").await.is_err());
    }

    async fn user_tables(pool: &DbPool) -> Vec<String> {
        let rows = pool
            .fetch_all(
                "SELECT name FROM sqlite_master WHERE type = 'table' \
                 AND name NOT LIKE 'sqlite_%' ORDER BY name",
                &[],
            )
            .await
            .unwrap();
        rows.iter().map(|r| r.get_text("name").unwrap()).collect()
    }

    #[tokio::test]
    async fn test_head_matches_catalog() {
        let pool = crate::db::DbPool::connect_sqlite_memory().await.unwrap();
        let migrator = Migrator::new(pool.clone()).unwrap();

        let applied = migrator.up(None).await.unwrap();
        assert_eq!(applied.len(), revisions::chain().len());
        assert_eq!(
            migrator.current().await.unwrap().as_deref(),
            applied.last().map(String::as_str)
        );
        assert!(migrator.pending().await.unwrap().is_empty());

        let catalog = crate::catalog::Catalog::head();
        let dialect = pool.kind().dialect();
        let mut tx = pool.begin().await.unwrap();
        for table in catalog.tables() {
            assert!(
                dialect.table_exists(&mut tx, table.name).await.unwrap(),
                "missing table {}",
                table.name
            );
            let live: Vec<String> = dialect
                .list_columns(&mut tx, table.name)
                .await
                .unwrap()
                .into_iter()
                .map(|c| c.name)
                .collect();
            for column in &table.columns {
                assert!(
                    live.contains(&column.name.to_string()),
                    "missing column {}.{}",
                    table.name,
                    column.name
                );
            }
            assert_eq!(
                live.len(),
                table.columns.len(),
                "extra columns on {}",
                table.name
            );
            let indexes = dialect.list_indexes(&mut tx, table.name).await.unwrap();
            for index in &table.indexes {
                assert!(
                    indexes.contains(&index.name.to_string()),
                    "missing index {}",
                    index.name
                );
            }
        }
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_full_downgrade_leaves_only_tracking_table() {
        let pool = crate::db::DbPool::connect_sqlite_memory().await.unwrap();
        let migrator = Migrator::new(pool.clone()).unwrap();

        let applied = migrator.up(None).await.unwrap();
        let reverted = migrator.down(BASE).await.unwrap();
        let mut expected = applied.clone();
        expected.reverse();
        assert_eq!(reverted, expected);

        assert_eq!(migrator.current().await.unwrap(), None);
        assert_eq!(user_tables(&pool).await, vec![TRACKING_TABLE.to_string()]);
    }

    #[tokio::test]
    async fn test_partial_upgrade_and_single_step_down() {
        let pool = crate::db::DbPool::connect_sqlite_memory().await.unwrap();
        let migrator = Migrator::new(pool.clone()).unwrap();

        migrator.up(Some("20260118_0001")).await.unwrap();
        assert_eq!(
            migrator.current().await.unwrap().as_deref(),
            Some("20260118_0001")
        );
        // targeting an already-applied revision is a no-op
        assert!(migrator.up(Some("20260117_0001")).await.unwrap().is_empty());

        let dialect = pool.kind().dialect();
        let mut tx = pool.begin().await.unwrap();
        assert!(dialect
            .column_exists(&mut tx, "mcp_servers", "transport")
            .await
            .unwrap());
        tx.commit().await.unwrap();

        let reverted = migrator.down("20260117_0002").await.unwrap();
        assert_eq!(reverted, vec!["20260118_0001".to_string()]);
        let mut tx = pool.begin().await.unwrap();
        assert!(!dialect
            .column_exists(&mut tx, "mcp_servers", "transport")
            .await
            .unwrap());
        tx.commit().await.unwrap();

        // downgrading to a revision ahead of the current one is rejected
        assert!(migrator.down("20260121_0001").await.is_err());

        // and the remaining distance can still be covered
        let applied = migrator.up(None).await.unwrap();
        assert_eq!(applied.first().map(String::as_str), Some("20260118_0001"));
    }

    #[tokio::test]
    async fn test_history_marks_applied_prefix() {
        let pool = crate::db::DbPool::connect_sqlite_memory().await.unwrap();
        let migrator = Migrator::new(pool).unwrap();
        migrator.up(Some("603ff68b3523")).await.unwrap();

        let history = migrator.history().await.unwrap();
        assert_eq!(history.len(), revisions::chain().len());
        assert!(history[0].applied && history[1].applied);
        assert!(history[2..].iter().all(|s| !s.applied));
    }
}
