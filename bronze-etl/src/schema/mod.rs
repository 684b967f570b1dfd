//! Idempotent destination schema management.
//!
//! DDL text is supplied by the caller (a file of CREATE-IF-NOT-EXISTS statements) and
//! executed verbatim; this module does not enforce idempotency, it is a pass-through
//! executor that classifies failures.

use std::future::Future;

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;

/// Trait for executors that can run raw DDL against a destination.
///
/// Implemented by the Postgres destination (real DDL) and the in-memory destination
/// (recorded statements), so the pipeline runner is testable without a database.
pub trait ExecuteDdl {
    fn execute_ddl(&self, ddl: &str) -> impl Future<Output = EtlResult<()>> + Send;
}

/// Ensures the destination schema and table exist before a load.
#[derive(Debug, Clone)]
pub struct SchemaManager<E> {
    executor: E,
    schema: String,
}

impl<E> SchemaManager<E>
where
    E: ExecuteDdl,
{
    pub fn new(executor: E, schema: impl Into<String>) -> Self {
        Self {
            executor,
            schema: schema.into(),
        }
    }

    /// Creates the destination schema if it does not exist yet.
    pub async fn ensure_schema(&self) -> EtlResult<()> {
        let ddl = format!(
            "create schema if not exists \"{}\"",
            self.schema.replace('"', "\"\"")
        );
        self.run(&ddl).await
    }

    /// Executes the caller-supplied table DDL as a single statement.
    ///
    /// The DDL is expected to have CREATE-IF-NOT-EXISTS shape so repeated runs leave
    /// the table unchanged. Failures are fatal to the run.
    pub async fn ensure_table(&self, ddl: &str) -> EtlResult<()> {
        self.run(ddl).await
    }

    async fn run(&self, ddl: &str) -> EtlResult<()> {
        self.executor.execute_ddl(ddl).await.map_err(|err| {
            etl_error!(
                ErrorKind::SchemaDdlFailed,
                "Failed to execute destination DDL",
                format!("schema '{}': {err}", self.schema)
            )
        })
    }
}
