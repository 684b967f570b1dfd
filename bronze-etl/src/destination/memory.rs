use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::bail;
use crate::destination::Destination;
use crate::error::{ErrorKind, EtlResult};
use crate::schema::ExecuteDdl;
use crate::types::{ConflictPolicy, ExtractedRow, TableRef};

#[derive(Debug, Default)]
struct Inner {
    ddl: Vec<String>,
    tables: HashMap<TableRef, Vec<ExtractedRow>>,
}

/// In-memory destination for testing and development purposes.
///
/// [`MemoryDestination`] stores loaded rows and executed DDL in memory so pipeline
/// behavior (conflict policies, verification counts, schema calls) can be asserted
/// without a database. All data is lost when the process terminates.
#[derive(Debug, Clone, Default)]
pub struct MemoryDestination {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the rows currently held for `table`.
    pub async fn table_rows(&self, table: &TableRef) -> Vec<ExtractedRow> {
        let inner = self.inner.lock().await;
        inner.tables.get(table).cloned().unwrap_or_default()
    }

    /// Returns every DDL statement executed against this destination, in order.
    pub async fn ddl_statements(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner.ddl.clone()
    }

    /// Pre-populates `table`, for tests that need a nonempty destination.
    pub async fn seed_rows(&self, table: &TableRef, rows: Vec<ExtractedRow>) {
        let mut inner = self.inner.lock().await;
        inner.tables.entry(table.clone()).or_default().extend(rows);
    }
}

impl ExecuteDdl for MemoryDestination {
    async fn execute_ddl(&self, ddl: &str) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        inner.ddl.push(ddl.to_string());
        Ok(())
    }
}

impl Destination for MemoryDestination {
    fn name() -> &'static str {
        "memory"
    }

    async fn write_rows(
        &self,
        table: &TableRef,
        rows: &[ExtractedRow],
        policy: ConflictPolicy,
    ) -> EtlResult<u64> {
        let mut inner = self.inner.lock().await;
        let existing = inner.tables.entry(table.clone()).or_default();

        match policy {
            ConflictPolicy::Append => {}
            ConflictPolicy::Replace => existing.clear(),
            ConflictPolicy::FailIfExists => {
                if !existing.is_empty() {
                    let held = existing.len();
                    bail!(
                        ErrorKind::DestinationTableNotEmpty,
                        "Destination table already has rows",
                        format!("table {table} holds {held} rows")
                    );
                }
            }
        }

        existing.extend_from_slice(rows);
        let written = rows.len() as u64;

        info!("wrote {written} rows to in-memory table {table} with policy '{policy}'");

        Ok(written)
    }

    async fn count_rows(&self, table: &TableRef) -> EtlResult<u64> {
        let inner = self.inner.lock().await;
        Ok(inner.tables.get(table).map(|rows| rows.len()).unwrap_or(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use super::*;
    use crate::types::ContainerRef;

    fn row(item_id: &str) -> ExtractedRow {
        ExtractedRow::new(
            vec![ContainerRef::new("c1", "general")],
            item_id,
            None,
            None,
            BTreeMap::new(),
            Utc::now(),
            "stub",
        )
        .unwrap()
    }

    fn table() -> TableRef {
        TableRef::new("bronze", "messages")
    }

    #[tokio::test]
    async fn append_keeps_previous_rows() {
        let destination = MemoryDestination::new();
        destination.seed_rows(&table(), vec![row("old")]).await;

        let written = destination
            .write_rows(&table(), &[row("a"), row("b")], ConflictPolicy::Append)
            .await
            .unwrap();

        assert_eq!(written, 2);
        assert_eq!(destination.count_rows(&table()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn replace_leaves_exactly_the_new_rows() {
        let destination = MemoryDestination::new();
        destination
            .seed_rows(&table(), vec![row("old1"), row("old2")])
            .await;

        let written = destination
            .write_rows(&table(), &[row("a")], ConflictPolicy::Replace)
            .await
            .unwrap();

        assert_eq!(written, 1);
        assert_eq!(destination.count_rows(&table()).await.unwrap(), 1);
        let rows = destination.table_rows(&table()).await;
        assert_eq!(rows[0].item_id, "a");
    }

    #[tokio::test]
    async fn fail_if_exists_rejects_nonempty_table() {
        let destination = MemoryDestination::new();
        destination.seed_rows(&table(), vec![row("old")]).await;

        let err = destination
            .write_rows(&table(), &[row("a")], ConflictPolicy::FailIfExists)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DestinationTableNotEmpty);
        // The failed load must not have touched the table.
        assert_eq!(destination.count_rows(&table()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn fail_if_exists_accepts_empty_table() {
        let destination = MemoryDestination::new();

        let written = destination
            .write_rows(&table(), &[row("a")], ConflictPolicy::FailIfExists)
            .await
            .unwrap();

        assert_eq!(written, 1);
    }
}
