//! Projection of enriched items onto table rows.

use indexmap::IndexMap;
use serde_json::Value;

use crate::descriptor::ColumnSpec;
use crate::enrich::EnrichedItem;

/// One table row: column name to value, in column order.
pub type Row = IndexMap<String, Value>;

/// Evaluate every column against the item.
///
/// The row holds exactly the given columns; a field the item lacks is null.
pub fn project(item: &EnrichedItem, columns: &[ColumnSpec]) -> Row {
    columns
        .iter()
        .map(|column| (column.name.clone(), column.extract(item.as_value())))
        .collect()
}
