//! Table listing and paged table views.

use serde::Serialize;
use tracing::warn;

use super::foreign_keys::{by_source_column, ForeignKeyResolver};
use super::identifier::{Identifier, TableName};
use super::links::{foreign_key_link, ForeignKeyLink};
use crate::error::Result;
use crate::query::{QueryRequest, RemoteExecutor};
use crate::remote::RemoteTarget;
use crate::types::{ResultRow, Value};

/// Rows per page unless the caller asks otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 50;

const LIST_TABLES_SQL: &str = "select name from sqlite_master \
     where type in ('table', 'view') and tbl_name != 'sqlite_sequence'";

/// Lists the tables and views of the target database.
///
/// Names that cannot be used as identifiers are skipped with a warning.
pub async fn list_tables(executor: &dyn RemoteExecutor, target: &RemoteTarget) -> Result<Vec<TableName>> {
    let rows = executor
        .execute(target, &QueryRequest::new(LIST_TABLES_SQL))
        .await?
        .into_rows()?;

    let mut tables = Vec::with_capacity(rows.len());
    for row in &rows {
        let Some(name) = row.get_text("name") else {
            continue;
        };
        match Identifier::new(name) {
            Ok(table) => tables.push(table),
            Err(e) => warn!("Skipping table {name:?}: {e}"),
        }
    }
    Ok(tables)
}

/// One page of a table, optionally filtered.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub table: TableName,
    /// SQL condition placed after `where`, taken as written.
    pub filter: Option<String>,
    /// Zero-based page number.
    pub page: usize,
    pub page_size: usize,
}

impl PageRequest {
    /// Creates a request for the first page of a table.
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            filter: None,
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        let filter = filter.into();
        self.filter = (!filter.trim().is_empty()).then_some(filter);
        self
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Builds the paged select, with limit and offset bound as parameters.
    pub fn to_query(&self) -> QueryRequest {
        let filter = self
            .filter
            .as_deref()
            .map(|filter| format!("where {filter} "))
            .unwrap_or_default();
        let sql = format!(
            "select * from {} {filter}limit :limit offset :offset",
            self.table.escaped()
        );

        QueryRequest::new(sql)
            .with_param("limit", to_integer(self.page_size))
            .with_param("offset", to_integer(self.page.saturating_mul(self.page_size)))
    }
}

fn to_integer(n: usize) -> Value {
    Value::Integer(i64::try_from(n).unwrap_or(i64::MAX))
}

/// A link attached to one cell of a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellLink {
    pub row: usize,
    pub column: String,
    pub link: ForeignKeyLink,
}

/// A page of rows with the foreign key links of its cells.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TablePage {
    pub table: TableName,
    pub rows: Vec<ResultRow>,
    pub links: Vec<CellLink>,
    /// Set while the page came back full, so there may be more rows.
    pub next_page: Option<usize>,
    pub truncated: bool,
}

impl TablePage {
    /// Returns the link for a cell, if its column is a foreign key.
    pub fn link_for(&self, row: usize, column: &str) -> Option<&ForeignKeyLink> {
        self.links
            .iter()
            .find(|cell| cell.row == row && cell.column == column)
            .map(|cell| &cell.link)
    }
}

/// Reads one page of a table and links its foreign key cells.
///
/// A timed-out read is reported as a `Timeout` error carrying the rows.
pub async fn browse_table(
    executor: &dyn RemoteExecutor,
    target: &RemoteTarget,
    request: &PageRequest,
) -> Result<TablePage> {
    let foreign_keys = ForeignKeyResolver::new(executor)
        .resolve(target, &request.table)
        .await?;
    let by_column = by_source_column(&foreign_keys);

    let outcome = executor.execute(target, &request.to_query()).await?;
    let truncated = outcome.truncated;
    let rows = outcome.into_rows()?;

    let mut links = Vec::new();
    for (index, row) in rows.iter().enumerate() {
        for (column, value) in row.iter() {
            let Some(fk) = by_column.get(column) else {
                continue;
            };
            if let Some(link) = foreign_key_link(fk, value)? {
                links.push(CellLink {
                    row: index,
                    column: column.to_string(),
                    link,
                });
            }
        }
    }

    let next_page = (request.page_size > 0 && rows.len() >= request.page_size)
        .then_some(request.page + 1);

    Ok(TablePage {
        table: request.table.clone(),
        rows,
        links,
        next_page,
        truncated,
    })
}
