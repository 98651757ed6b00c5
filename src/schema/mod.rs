//! Schema helpers for litexplore.
//!
//! Identifiers, foreign key resolution, navigation links and paged table
//! views, all built on top of a [`RemoteExecutor`](crate::query::RemoteExecutor).

mod browse;
mod foreign_keys;
mod identifier;
mod links;

pub use browse::{browse_table, list_tables, CellLink, PageRequest, TablePage, DEFAULT_PAGE_SIZE};
pub use foreign_keys::{by_source_column, ForeignKeyRef, ForeignKeyResolver};
pub use identifier::{ColumnName, Identifier, TableName};
pub use links::{foreign_key_link, ForeignKeyLink};
