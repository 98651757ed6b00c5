//! Foreign key resolution through `PRAGMA foreign_key_list`.

use std::collections::{BTreeMap, HashMap};

use futures::future::try_join_all;
use serde::Serialize;
use tracing::debug;

use super::identifier::{ColumnName, Identifier, TableName};
use crate::error::{EngineError, Result};
use crate::query::{QueryRequest, RemoteExecutor};
use crate::remote::RemoteTarget;
use crate::types::ResultRow;

/// A column that references a column of another table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ForeignKeyRef {
    pub source_table: TableName,
    pub source_column: ColumnName,
    pub referenced_table: TableName,
    /// Defaults to the source column's name when the schema leaves it out.
    pub referenced_column: ColumnName,
}

impl ForeignKeyRef {
    /// Builds a reference, defaulting the referenced column to the source column.
    pub fn new(
        source_table: TableName,
        source_column: ColumnName,
        referenced_table: TableName,
        referenced_column: Option<ColumnName>,
    ) -> Self {
        let referenced_column = referenced_column.unwrap_or_else(|| source_column.clone());
        Self {
            source_table,
            source_column,
            referenced_table,
            referenced_column,
        }
    }

    /// Builds a reference from one row of `PRAGMA foreign_key_list`.
    fn from_pragma_row(table: &TableName, row: &ResultRow) -> Result<Self> {
        let from = row
            .get_text("from")
            .ok_or_else(|| missing_field("from", row))?;
        let referenced = row
            .get_text("table")
            .ok_or_else(|| missing_field("table", row))?;
        let to = row
            .get_text("to")
            .filter(|to| !to.is_empty())
            .map(Identifier::new)
            .transpose()?;

        Ok(Self::new(
            table.clone(),
            Identifier::new(from)?,
            Identifier::new(referenced)?,
            to,
        ))
    }
}

fn missing_field(field: &str, row: &ResultRow) -> EngineError {
    let line = serde_json::to_string(row).unwrap_or_default();
    EngineError::decode(line, format!("foreign key row has no '{field}' text"))
}

/// Looks up declared foreign keys through an executor's blocking path.
pub struct ForeignKeyResolver<'a> {
    executor: &'a dyn RemoteExecutor,
}

impl<'a> ForeignKeyResolver<'a> {
    /// Creates a resolver that runs its introspection queries on `executor`.
    pub fn new(executor: &'a dyn RemoteExecutor) -> Self {
        Self { executor }
    }

    /// Returns the foreign keys declared on `table`.
    ///
    /// A table without foreign keys yields an empty vector.
    pub async fn resolve(&self, target: &RemoteTarget, table: &TableName) -> Result<Vec<ForeignKeyRef>> {
        let request = QueryRequest::new(format!("PRAGMA foreign_key_list({})", table.escaped()));
        let rows = self
            .executor
            .execute_once(target, &request)
            .await?
            .unwrap_or_default();

        let refs = rows
            .iter()
            .map(|row| ForeignKeyRef::from_pragma_row(table, row))
            .collect::<Result<Vec<_>>>()?;
        debug!("Table {} has {} foreign keys", table, refs.len());
        Ok(refs)
    }

    /// Resolves several tables concurrently.
    pub async fn resolve_many(
        &self,
        target: &RemoteTarget,
        tables: &[TableName],
    ) -> Result<BTreeMap<TableName, Vec<ForeignKeyRef>>> {
        let resolved = try_join_all(tables.iter().map(|table| async move {
            let refs = self.resolve(target, table).await?;
            Ok::<_, EngineError>((table.clone(), refs))
        }))
        .await?;

        Ok(resolved.into_iter().collect())
    }
}

/// Indexes references by source column name.
///
/// For composite keys the first reference of a column wins.
pub fn by_source_column(refs: &[ForeignKeyRef]) -> HashMap<String, ForeignKeyRef> {
    let mut map = HashMap::with_capacity(refs.len());
    for fk in refs {
        map.entry(fk.source_column.as_str().to_string())
            .or_insert_with(|| fk.clone());
    }
    map
}
