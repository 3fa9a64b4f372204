//! Schema catalog: the single source of truth for entity shapes.
//!
//! The catalog describes every table at head revision in dialect-neutral
//! terms. DDL rendering, introspection comparison, and the access layer all
//! read from it; nothing else hardcodes schema facts. `Catalog::validate`
//! runs before any connection is opened and rejects declarations that could
//! not be realized on every supported dialect.

pub mod tables;

use crate::error::{Result, StoreError};

/// Dialect-neutral column type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticType {
    /// Variable-length text, optionally bounded.
    Text(Option<u32>),
    Integer,
    BigInt,
    Boolean,
    Date,
    /// Timezone-aware timestamp.
    Timestamp,
    /// JSON document. Plain text on the embedded dialect, JSONB on the server.
    Json,
}

impl SemanticType {
    pub fn text(max: u32) -> Self {
        SemanticType::Text(Some(max))
    }

    pub fn unbounded_text() -> Self {
        SemanticType::Text(None)
    }
}

/// Column default, rendered per dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultValue {
    Bool(bool),
    Int(i64),
    Text(&'static str),
    EmptyJsonArray,
    EmptyJsonObject,
    CurrentTimestamp,
}

/// A single column declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub ty: SemanticType,
    pub nullable: bool,
    pub default: Option<DefaultValue>,
}

impl ColumnSpec {
    pub fn new(name: &'static str, ty: SemanticType) -> Self {
        Self {
            name,
            ty,
            nullable: true,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }
}

/// Referential action on parent-row deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    Cascade,
    SetNull,
    Restrict,
}

/// Foreign key declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeySpec {
    pub column: &'static str,
    pub references_table: &'static str,
    pub references_column: &'static str,
    pub on_delete: OnDelete,
}

impl ForeignKeySpec {
    pub fn new(column: &'static str, references_table: &'static str, on_delete: OnDelete) -> Self {
        Self {
            column,
            references_table,
            references_column: "id",
            on_delete,
        }
    }
}

/// Secondary index declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub name: &'static str,
    pub columns: Vec<&'static str>,
    pub unique: bool,
}

impl IndexSpec {
    pub fn new(name: &'static str, columns: &[&'static str]) -> Self {
        Self {
            name,
            columns: columns.to_vec(),
            unique: false,
        }
    }

    pub fn unique(name: &'static str, columns: &[&'static str]) -> Self {
        Self {
            name,
            columns: columns.to_vec(),
            unique: true,
        }
    }
}

/// Named multi-column uniqueness constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueSpec {
    pub name: &'static str,
    pub columns: Vec<&'static str>,
}

impl UniqueSpec {
    pub fn new(name: &'static str, columns: &[&'static str]) -> Self {
        Self {
            name,
            columns: columns.to_vec(),
        }
    }
}

/// A full table declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSpec {
    pub name: &'static str,
    pub primary_key: &'static str,
    pub columns: Vec<ColumnSpec>,
    pub foreign_keys: Vec<ForeignKeySpec>,
    pub uniques: Vec<UniqueSpec>,
    pub indexes: Vec<IndexSpec>,
}

impl TableSpec {
    pub fn new(name: &'static str, columns: Vec<ColumnSpec>) -> Self {
        Self {
            name,
            primary_key: "id",
            columns,
            foreign_keys: Vec::new(),
            uniques: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn foreign_keys(mut self, fks: Vec<ForeignKeySpec>) -> Self {
        self.foreign_keys = fks;
        self
    }

    pub fn uniques(mut self, uniques: Vec<UniqueSpec>) -> Self {
        self.uniques = uniques;
        self
    }

    pub fn indexes(mut self, indexes: Vec<IndexSpec>) -> Self {
        self.indexes = indexes;
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// The head-revision catalog.
#[derive(Debug, Clone)]
pub struct Catalog {
    tables: Vec<TableSpec>,
}

impl Catalog {
    /// Catalog at head revision.
    pub fn head() -> Self {
        Catalog {
            tables: tables::all(),
        }
    }

    pub fn tables(&self) -> &[TableSpec] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&TableSpec> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Reject any declaration that could not be realized on every dialect.
    pub fn validate(&self) -> Result<()> {
        let mut table_names = std::collections::HashSet::new();
        let mut index_names = std::collections::HashSet::new();

        for table in &self.tables {
            if table.name.is_empty() {
                return Err(StoreError::validation("table with empty name"));
            }
            if !table_names.insert(table.name) {
                return Err(StoreError::validation(format!(
                    "duplicate table name: {}",
                    table.name
                )));
            }

            let mut column_names = std::collections::HashSet::new();
            for column in &table.columns {
                if column.name.is_empty() {
                    return Err(StoreError::validation(format!(
                        "table {} has a column with an empty name",
                        table.name
                    )));
                }
                if !column_names.insert(column.name) {
                    return Err(StoreError::validation(format!(
                        "table {} declares column {} twice",
                        table.name, column.name
                    )));
                }
                if let SemanticType::Text(Some(0)) = column.ty {
                    return Err(StoreError::validation(format!(
                        "column {}.{} has zero-length text type",
                        table.name, column.name
                    )));
                }
                if let Some(default) = &column.default {
                    if !default_matches_type(default, &column.ty) {
                        return Err(StoreError::validation(format!(
                            "column {}.{} default does not match its type",
                            table.name, column.name
                        )));
                    }
                }
            }

            if table.column(table.primary_key).is_none() {
                return Err(StoreError::validation(format!(
                    "table {} is missing its primary key column {}",
                    table.name, table.primary_key
                )));
            }

            for fk in &table.foreign_keys {
                if table.column(fk.column).is_none() {
                    return Err(StoreError::validation(format!(
                        "table {} foreign key on unknown column {}",
                        table.name, fk.column
                    )));
                }
                let target = self.table(fk.references_table).ok_or_else(|| {
                    StoreError::validation(format!(
                        "table {} references unknown table {}",
                        table.name, fk.references_table
                    ))
                })?;
                if target.column(fk.references_column).is_none() {
                    return Err(StoreError::validation(format!(
                        "table {} references unknown column {}.{}",
                        table.name, fk.references_table, fk.references_column
                    )));
                }
                // SET NULL on a NOT NULL column can never fire cleanly.
                if fk.on_delete == OnDelete::SetNull {
                    if let Some(col) = table.column(fk.column) {
                        if !col.nullable {
                            return Err(StoreError::validation(format!(
                                "table {} column {} is NOT NULL but its foreign key is ON DELETE SET NULL",
                                table.name, fk.column
                            )));
                        }
                    }
                }
            }

            for index in &table.indexes {
                if !index_names.insert(index.name) {
                    return Err(StoreError::validation(format!(
                        "duplicate index name: {}",
                        index.name
                    )));
                }
                for col in &index.columns {
                    if table.column(col).is_none() {
                        return Err(StoreError::validation(format!(
                            "index {} on {} names unknown column {}",
                            index.name, table.name, col
                        )));
                    }
                }
            }

            for unique in &table.uniques {
                if !index_names.insert(unique.name) {
                    return Err(StoreError::validation(format!(
                        "duplicate constraint name: {}",
                        unique.name
                    )));
                }
                for col in &unique.columns {
                    if table.column(col).is_none() {
                        return Err(StoreError::validation(format!(
                            "constraint {} on {} names unknown column {}",
                            unique.name, table.name, col
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

fn default_matches_type(default: &DefaultValue, ty: &SemanticType) -> bool {
    matches!(
        (default, ty),
        (DefaultValue::Bool(_), SemanticType::Boolean)
            | (DefaultValue::Int(_), SemanticType::Integer)
            | (DefaultValue::Int(_), SemanticType::BigInt)
            | (DefaultValue::Text(_), SemanticType::Text(_))
            | (DefaultValue::EmptyJsonArray, SemanticType::Json)
            | (DefaultValue::EmptyJsonObject, SemanticType::Json)
            | (DefaultValue::CurrentTimestamp, SemanticType::Timestamp)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_head_catalog_is_valid() {
        Catalog::head().validate().unwrap();
    }

    #[test]
    fn test_head_catalog_table_lookup() {
        let catalog = Catalog::head();
        assert!(catalog.table("users").is_some());
        assert!(catalog.table("mcp_servers").is_some());
        assert!(catalog.table("agents").is_none(), "legacy table left head");
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let table = TableSpec::new(
            "t",
            vec![ColumnSpec::new("id", SemanticType::text(36)).not_null()],
        );
        let catalog = Catalog {
            tables: vec![table.clone(), table],
        };
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn test_unknown_fk_target_rejected() {
        let table = TableSpec::new(
            "t",
            vec![
                ColumnSpec::new("id", SemanticType::text(36)).not_null(),
                ColumnSpec::new("other_id", SemanticType::text(36)),
            ],
        )
        .foreign_keys(vec![ForeignKeySpec::new("other_id", "missing", OnDelete::Cascade)]);
        let catalog = Catalog { tables: vec![table] };
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn test_set_null_on_not_null_column_rejected() {
        let parent = TableSpec::new(
            "parent",
            vec![ColumnSpec::new("id", SemanticType::text(36)).not_null()],
        );
        let child = TableSpec::new(
            "child",
            vec![
                ColumnSpec::new("id", SemanticType::text(36)).not_null(),
                ColumnSpec::new("parent_id", SemanticType::text(36)).not_null(),
            ],
        )
        .foreign_keys(vec![ForeignKeySpec::new("parent_id", "parent", OnDelete::SetNull)]);
        let catalog = Catalog {
            tables: vec![parent, child],
        };
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn test_default_type_mismatch_rejected() {
        let table = TableSpec::new(
            "t",
            vec![
                ColumnSpec::new("id", SemanticType::text(36)).not_null(),
                ColumnSpec::new("flag", SemanticType::Boolean)
                    .default_value(DefaultValue::Text("nope")),
            ],
        );
        let catalog = Catalog { tables: vec![table] };
        assert!(catalog.validate().is_err());
    }
}
