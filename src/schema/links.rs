//! Navigation references from foreign key cells to the rows they point at.
//!
//! A link is plain data: the table to open and a filter selecting the
//! referenced row. Turning it into markup is up to the caller.

use serde::Serialize;

use super::foreign_keys::ForeignKeyRef;
use super::identifier::TableName;
use crate::error::Result;
use crate::query::encode_literal;
use crate::types::Value;

/// Where a foreign key cell leads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeyLink {
    /// Table holding the referenced row.
    pub table: TableName,
    /// SQL filter, e.g. `[id] = 42`.
    pub filter: String,
}

impl ForeignKeyLink {
    /// Encodes the link as `tname=<table>&q=<filter>` query-string pairs.
    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("tname", self.table.as_str())
            .append_pair("q", &self.filter)
            .finish()
    }
}

/// Builds the link for one cell of a foreign key column.
///
/// NULL cells reference nothing and get no link.
pub fn foreign_key_link(fk: &ForeignKeyRef, value: &Value) -> Result<Option<ForeignKeyLink>> {
    if value.is_null() {
        return Ok(None);
    }

    let filter = format!(
        "{} = {}",
        fk.referenced_column.escaped(),
        encode_literal(value)?
    );
    Ok(Some(ForeignKeyLink {
        table: fk.referenced_table.clone(),
        filter,
    }))
}
