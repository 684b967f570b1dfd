use crate::destination::{Destination, MemoryDestination};
use crate::error::EtlResult;
use crate::schema::ExecuteDdl;
use crate::types::{ConflictPolicy, ExtractedRow, TableRef};

/// Destination wrapper that under-reports visible rows by one.
///
/// Simulates a destination where written rows are not yet readable, so the pipeline's
/// read-after-write verification fails.
#[derive(Debug, Clone)]
pub struct MiscountingDestination {
    inner: MemoryDestination,
}

impl MiscountingDestination {
    pub fn wrap(inner: MemoryDestination) -> Self {
        Self { inner }
    }
}

impl ExecuteDdl for MiscountingDestination {
    async fn execute_ddl(&self, ddl: &str) -> EtlResult<()> {
        self.inner.execute_ddl(ddl).await
    }
}

impl Destination for MiscountingDestination {
    fn name() -> &'static str {
        "miscounting-memory"
    }

    async fn write_rows(
        &self,
        table: &TableRef,
        rows: &[ExtractedRow],
        policy: ConflictPolicy,
    ) -> EtlResult<u64> {
        self.inner.write_rows(table, rows, policy).await
    }

    async fn count_rows(&self, table: &TableRef) -> EtlResult<u64> {
        let count = self.inner.count_rows(table).await?;
        Ok(count.saturating_sub(1))
    }
}
