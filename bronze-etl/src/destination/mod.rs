//! Destination (loader) contract and row flattening.
//!
//! The destination row shape is fixed: hierarchy columns derived from the container
//! path, the item and author identifiers, the payload-backed message columns, and the
//! run metadata stamps. Payload keys outside the fixed set become extra columns so
//! source-specific fields land without schema changes here.

use std::future::Future;

pub mod memory;
pub mod postgres;

pub use memory::MemoryDestination;
pub use postgres::PostgresDestination;

use crate::error::EtlResult;
use crate::types::{ConflictPolicy, ExtractedRow, ScalarValue, TableRef};

/// Destination columns every bronze table carries, in insert order.
pub const FIXED_COLUMNS: [&str; 13] = [
    "channel_id",
    "channel_name",
    "thread_id",
    "thread_name",
    "item_id",
    "author",
    "author_id",
    "content",
    "created_at",
    "edited_at",
    "is_thread",
    "extracted_at",
    "source_tag",
];

/// Payload keys that feed fixed columns rather than extra columns.
const PAYLOAD_BACKED: [&str; 3] = ["content", "created_at", "edited_at"];

/// Trait for systems that can receive extracted rows in bulk.
///
/// Implementations serialize each [`ExtractedRow`] into the destination row shape and
/// write the whole batch under the requested [`ConflictPolicy`]. Writes are not retried
/// row by row; a failure aborts the load.
pub trait Destination {
    /// Returns the name of the destination.
    fn name() -> &'static str;

    /// Bulk-writes `rows` into `table`, returning the number of rows written.
    fn write_rows(
        &self,
        table: &TableRef,
        rows: &[ExtractedRow],
        policy: ConflictPolicy,
    ) -> impl Future<Output = EtlResult<u64>> + Send;

    /// Returns the number of rows currently visible in `table`.
    ///
    /// Used by the pipeline runner for the read-after-write verification.
    fn count_rows(&self, table: &TableRef) -> impl Future<Output = EtlResult<u64>> + Send;
}

/// Returns the sorted union of payload keys across `rows` that are not payload-backed
/// fixed columns.
pub fn extra_columns(rows: &[ExtractedRow]) -> Vec<String> {
    let mut extras: Vec<String> = rows
        .iter()
        .flat_map(|row| row.payload.keys())
        .filter(|key| !PAYLOAD_BACKED.contains(&key.as_str()))
        .filter(|key| !FIXED_COLUMNS.contains(&key.as_str()))
        .cloned()
        .collect();

    extras.sort();
    extras.dedup();
    extras
}

/// Flattens one row into destination column order: [`FIXED_COLUMNS`] then `extras`.
///
/// Missing payload values become [`ScalarValue::Null`].
pub fn row_values(row: &ExtractedRow, extras: &[String]) -> Vec<ScalarValue> {
    let payload_value = |key: &str| row.payload.get(key).cloned().unwrap_or(ScalarValue::Null);

    let mut values = Vec::with_capacity(FIXED_COLUMNS.len() + extras.len());
    values.push(ScalarValue::Text(row.channel().id.clone()));
    values.push(ScalarValue::Text(row.channel().name.clone()));
    values.push(ScalarValue::from(row.thread().map(|t| t.id.clone())));
    values.push(ScalarValue::from(row.thread().map(|t| t.name.clone())));
    values.push(ScalarValue::Text(row.item_id.clone()));
    values.push(ScalarValue::from(row.author_display.clone()));
    values.push(ScalarValue::from(row.author_id.clone()));
    values.push(payload_value("content"));
    values.push(payload_value("created_at"));
    values.push(payload_value("edited_at"));
    values.push(ScalarValue::Bool(row.is_thread()));
    values.push(ScalarValue::Timestamp(row.extracted_at));
    values.push(ScalarValue::Text(row.source_tag.clone()));

    for key in extras {
        values.push(payload_value(key));
    }

    values
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use super::*;
    use crate::types::ContainerRef;

    fn message_row(extra_key: Option<&str>) -> ExtractedRow {
        let mut payload = BTreeMap::new();
        payload.insert(
            "content".to_string(),
            ScalarValue::Text("hello".to_string()),
        );
        payload.insert("created_at".to_string(), ScalarValue::Timestamp(Utc::now()));
        if let Some(key) = extra_key {
            payload.insert(key.to_string(), ScalarValue::Int(3));
        }

        ExtractedRow::new(
            vec![
                ContainerRef::new("c1", "general"),
                ContainerRef::new("t1", "release"),
            ],
            "m1",
            Some("u1".to_string()),
            Some("darcy".to_string()),
            payload,
            Utc::now(),
            "discord",
        )
        .unwrap()
    }

    #[test]
    fn payload_backed_keys_do_not_become_extra_columns() {
        let rows = vec![message_row(None), message_row(Some("reaction_count"))];
        assert_eq!(extra_columns(&rows), vec!["reaction_count".to_string()]);
    }

    #[test]
    fn values_follow_fixed_column_order() {
        let row = message_row(Some("reaction_count"));
        let extras = extra_columns(std::slice::from_ref(&row));
        let values = row_values(&row, &extras);

        assert_eq!(values.len(), FIXED_COLUMNS.len() + 1);
        assert_eq!(values[0], ScalarValue::Text("c1".to_string()));
        assert_eq!(values[2], ScalarValue::Text("t1".to_string()));
        assert_eq!(values[4], ScalarValue::Text("m1".to_string()));
        assert_eq!(values[7], ScalarValue::Text("hello".to_string()));
        // edited_at was never set, so it flattens to NULL.
        assert_eq!(values[9], ScalarValue::Null);
        assert_eq!(values[10], ScalarValue::Bool(true));
        assert_eq!(values[13], ScalarValue::Int(3));
    }
}
