//! Pipeline runner: schema → extract → load → verify.
//!
//! One [`Pipeline`] value executes one run. The stages never overlap and no stage is
//! retried here; the only retry in the system is the extractor's rate-limit pause. A
//! failed stage stops the run and leaves the destination in whatever state the last
//! successful stage produced.

use tracing::{error, info, warn};

use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::destination::Destination;
use crate::error::{ErrorKind, EtlError};
use crate::etl_error;
use crate::extract::SourceExtractor;
use crate::schema::{ExecuteDdl, SchemaManager};
use crate::source::SourceClient;
use crate::types::{ConflictPolicy, PipelineId, TableRef};

/// Lifecycle of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Pending,
    Extracting,
    Loading,
    Verified,
    Failed,
}

/// Per-run record surfaced to the caller when the run ends.
///
/// Created at run start and mutated monotonically as stages complete; nothing here is
/// persisted. `stage_reached` keeps the stage the run was in when it failed (or
/// [`RunStatus::Verified`] on success) so a failed run can report where it stopped.
#[derive(Debug)]
pub struct RunReport {
    pub table: TableRef,
    pub conflict_policy: ConflictPolicy,
    pub status: RunStatus,
    pub stage_reached: RunStatus,
    pub rows_extracted: u64,
    pub rows_loaded: u64,
    pub error: Option<EtlError>,
}

impl RunReport {
    fn new(table: TableRef, conflict_policy: ConflictPolicy) -> Self {
        Self {
            table,
            conflict_policy,
            status: RunStatus::Pending,
            stage_reached: RunStatus::Pending,
            rows_extracted: 0,
            rows_loaded: 0,
            error: None,
        }
    }

    fn advance(&mut self, status: RunStatus) {
        self.status = status;
        self.stage_reached = status;
    }

    fn fail(mut self, err: EtlError) -> Self {
        error!(
            "pipeline run for table {} failed during {:?}: {err}",
            self.table, self.stage_reached
        );
        self.status = RunStatus::Failed;
        self.error = Some(err);
        self
    }

    /// Converts the report into a result, surfacing the stored error for failed runs.
    pub fn into_result(self) -> Result<RunReport, EtlError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

/// A single extraction-and-load run against one destination table.
#[derive(Debug)]
pub struct Pipeline<C, D> {
    id: PipelineId,
    table: TableRef,
    ddl: String,
    conflict_policy: ConflictPolicy,
    extractor: SourceExtractor<C>,
    destination: D,
    shutdown_tx: ShutdownTx,
}

impl<C, D> Pipeline<C, D>
where
    C: SourceClient + Send + Sync,
    D: Destination + ExecuteDdl + Clone + Send + Sync,
{
    pub fn new(
        id: PipelineId,
        table: TableRef,
        ddl: impl Into<String>,
        conflict_policy: ConflictPolicy,
        client: C,
        destination: D,
    ) -> Self {
        // The receiver side is obtained on demand via `subscribe`.
        let (shutdown_tx, _) = create_shutdown_channel();

        Self {
            id,
            table,
            ddl: ddl.into(),
            conflict_policy,
            extractor: SourceExtractor::new(client),
            destination,
            shutdown_tx,
        }
    }

    pub fn id(&self) -> PipelineId {
        self.id
    }

    /// Returns a handle that external code (signal handlers) can use to stop the run.
    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    /// Executes the run to completion and reports the final state.
    ///
    /// `pending → extracting` after the schema stage, `extracting → loading` after
    /// extraction returns un-interrupted, `loading → verified` after the bulk write and
    /// the read-after-write count check. Any stage error short-circuits to `failed`.
    pub async fn run(self) -> RunReport {
        let mut report = RunReport::new(self.table.clone(), self.conflict_policy);

        info!(
            "starting pipeline {} for table {} with policy '{}'",
            self.id, self.table, self.conflict_policy
        );

        let schema_manager = SchemaManager::new(self.destination.clone(), self.table.schema.clone());
        if let Err(err) = schema_manager.ensure_schema().await {
            return report.fail(err);
        }
        if let Err(err) = schema_manager.ensure_table(&self.ddl).await {
            return report.fail(err);
        }

        report.advance(RunStatus::Extracting);

        let extraction = match self.extractor.extract(self.shutdown_tx.subscribe()).await {
            Ok(extraction) => extraction,
            Err(err) => return report.fail(err),
        };
        report.rows_extracted = extraction.rows.len() as u64;

        if extraction.skipped_containers > 0 || extraction.skipped_items > 0 {
            warn!(
                "extraction absorbed local failures: {} containers and {} items skipped",
                extraction.skipped_containers, extraction.skipped_items
            );
        }

        if extraction.interrupted {
            let rows_extracted = report.rows_extracted;
            return report.fail(etl_error!(
                ErrorKind::ExtractionInterrupted,
                "Extraction stopped by shutdown signal",
                format!("{rows_extracted} rows extracted before interruption")
            ));
        }

        report.advance(RunStatus::Loading);

        // Baseline for the read-after-write check; taken before the write so Append
        // verifies against the previous count.
        let pre_count = match self.destination.count_rows(&self.table).await {
            Ok(count) => count,
            Err(err) => return report.fail(err),
        };

        let written = match self
            .destination
            .write_rows(&self.table, &extraction.rows, self.conflict_policy)
            .await
        {
            Ok(written) => written,
            Err(err) => return report.fail(err),
        };
        report.rows_loaded = written;

        let expected = match self.conflict_policy {
            ConflictPolicy::Replace => written,
            ConflictPolicy::Append | ConflictPolicy::FailIfExists => pre_count + written,
        };
        let visible = match self.destination.count_rows(&self.table).await {
            Ok(count) => count,
            Err(err) => return report.fail(err),
        };
        if visible != expected {
            return report.fail(etl_error!(
                ErrorKind::RowCountMismatch,
                "Post-load verification failed",
                format!("table {} shows {visible} rows, expected {expected}", self.table)
            ));
        }

        report.advance(RunStatus::Verified);

        info!(
            "pipeline {} verified: {} rows extracted, {} rows loaded into {}",
            self.id, report.rows_extracted, report.rows_loaded, self.table
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use rand::random;

    use super::*;
    use crate::destination::MemoryDestination;
    use crate::test_utils::{StubBehavior, StubSourceClient, two_channel_guild};

    const TEST_DDL: &str =
        "create table if not exists bronze.messages (item_id text, content text)";

    fn test_table() -> TableRef {
        TableRef::new("bronze", "messages")
    }

    #[tokio::test]
    async fn run_reaches_verified_on_the_two_channel_scenario() {
        let client = StubSourceClient::new(two_channel_guild(), StubBehavior::default());
        let destination = MemoryDestination::new();

        let pipeline = Pipeline::new(
            random(),
            test_table(),
            TEST_DDL,
            ConflictPolicy::Append,
            client.clone(),
            destination.clone(),
        );
        let report = pipeline.run().await;

        assert_eq!(report.status, RunStatus::Verified);
        assert_eq!(report.rows_extracted, 5);
        assert_eq!(report.rows_loaded, 5);
        assert!(report.error.is_none());

        let rows = destination.table_rows(&test_table()).await;
        assert_eq!(rows.len(), 5);
        assert_eq!(
            rows.iter().filter(|r| r.container_path().len() == 1).count(),
            3
        );
        assert_eq!(
            rows.iter().filter(|r| r.container_path().len() == 2).count(),
            2
        );

        // The schema stage ran before extraction: schema first, then the table DDL.
        let ddl = destination.ddl_statements().await;
        assert_eq!(ddl.len(), 2);
        assert!(ddl[0].contains("create schema if not exists"));
        assert_eq!(ddl[1], TEST_DDL);

        assert!(client.session_closed().await);
    }

    #[tokio::test]
    async fn interrupted_extraction_fails_the_run_but_keeps_counters() {
        let behavior = StubBehavior {
            shutdown_after_containers: Some(1),
            ..StubBehavior::default()
        };
        let client = StubSourceClient::new(two_channel_guild(), behavior);
        let destination = MemoryDestination::new();

        let pipeline = Pipeline::new(
            random(),
            test_table(),
            TEST_DDL,
            ConflictPolicy::Append,
            client.clone(),
            destination.clone(),
        );
        client.bind_shutdown(pipeline.shutdown_tx()).await;

        let report = pipeline.run().await;

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.stage_reached, RunStatus::Extracting);
        // Channel A contributes 3 direct rows before its thread is reached; the stub
        // fires the stop signal after the first container (the channel itself), so the
        // thread and channel B are never visited.
        assert_eq!(report.rows_extracted, 3);
        assert_eq!(report.rows_loaded, 0);
        assert_eq!(
            report.error.as_ref().map(|e| e.kind()),
            Some(ErrorKind::ExtractionInterrupted)
        );

        // Nothing was loaded and the session was still released.
        assert_eq!(destination.count_rows(&test_table()).await.unwrap(), 0);
        assert!(client.session_closed().await);
    }

    #[tokio::test]
    async fn failed_session_open_aborts_before_any_load() {
        let behavior = StubBehavior {
            fail_open: true,
            ..StubBehavior::default()
        };
        let client = StubSourceClient::new(two_channel_guild(), behavior);
        let destination = MemoryDestination::new();

        let pipeline = Pipeline::new(
            random(),
            test_table(),
            TEST_DDL,
            ConflictPolicy::Append,
            client,
            destination.clone(),
        );
        let report = pipeline.run().await;

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.stage_reached, RunStatus::Extracting);
        assert_eq!(
            report.error.as_ref().map(|e| e.kind()),
            Some(ErrorKind::AuthenticationError)
        );
        assert_eq!(destination.count_rows(&test_table()).await.unwrap(), 0);
    }
}
