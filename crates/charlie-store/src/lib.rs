//! # charlie-store
//!
//! Persistence layer for the Charlie agent platform: a declarative schema
//! catalog, a linear revision-chain migrator, and an owner-scoped entity
//! store, all portable across SQLite and PostgreSQL.
//!
//! - **Schema catalog** describing every table in dialect-neutral terms
//! - **Migrations** as a linear chain of reversible revisions, applied one
//!   transaction per revision
//! - **Entity store** where every operation is scoped to the calling user
//! - **Credential encryption** for secrets at rest
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use charlie_store::{Migrator, Page, RequestContext, Store, StoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = StoreConfig::from_yaml_file(Path::new("config.yaml"))?;
//!     let store = Store::connect(&config).await?;
//!     Migrator::new(store.pool().clone())?.up(None).await?;
//!
//!     let ctx = RequestContext::new("user-1");
//!     let projects = store.list_projects(&ctx, false, Page::default()).await?;
//!     println!("{} projects", projects.len());
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod crypto;
pub mod db;
pub mod dialect;
pub mod error;
pub mod migrate;
pub mod sanitize;
pub mod store;
pub mod value;

// Re-exports for convenient access
pub use catalog::Catalog;
pub use config::StoreConfig;
pub use crypto::CredentialCipher;
pub use db::DbPool;
pub use dialect::{Dialect, DialectKind, PostgresDialect, SqliteDialect};
pub use error::{Result, StoreError};
pub use migrate::{Migrator, Revision, RevisionStatus, BASE};
pub use store::{Page, RequestContext, Store};
pub use value::Value;
