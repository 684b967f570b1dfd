use sqlx::postgres::PgPool;
use sqlx::{Postgres, QueryBuilder};
use tracing::info;

use crate::bail;
use crate::destination::{Destination, FIXED_COLUMNS, extra_columns, row_values};
use crate::error::{ErrorKind, EtlResult};
use crate::schema::ExecuteDdl;
use crate::types::{ConflictPolicy, ExtractedRow, ScalarValue, TableRef};

/// Rows per insert statement, sized well under the Postgres bind-parameter limit even
/// with a wide payload.
const INSERT_CHUNK_SIZE: usize = 1000;

/// Postgres destination backed by a sqlx connection pool.
///
/// The whole load (conflict-policy gate, optional truncate, chunked inserts) runs in
/// one transaction, so a failed load leaves the table exactly as the previous stage
/// left it.
#[derive(Debug, Clone)]
pub struct PostgresDestination {
    pool: PgPool,
}

impl PostgresDestination {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ExecuteDdl for PostgresDestination {
    async fn execute_ddl(&self, ddl: &str) -> EtlResult<()> {
        sqlx::raw_sql(ddl).execute(&self.pool).await?;
        Ok(())
    }
}

impl Destination for PostgresDestination {
    fn name() -> &'static str {
        "postgres"
    }

    async fn write_rows(
        &self,
        table: &TableRef,
        rows: &[ExtractedRow],
        policy: ConflictPolicy,
    ) -> EtlResult<u64> {
        let mut tx = self.pool.begin().await?;

        match policy {
            ConflictPolicy::Append => {}
            ConflictPolicy::Replace => {
                sqlx::query(&format!("truncate table {}", table.quoted()))
                    .execute(&mut *tx)
                    .await?;
            }
            ConflictPolicy::FailIfExists => {
                let existing: i64 =
                    sqlx::query_scalar(&format!("select count(*) from {}", table.quoted()))
                        .fetch_one(&mut *tx)
                        .await?;
                if existing > 0 {
                    bail!(
                        ErrorKind::DestinationTableNotEmpty,
                        "Destination table already has rows",
                        format!("table {table} holds {existing} rows")
                    );
                }
            }
        }

        let extras = extra_columns(rows);
        let mut written = 0u64;

        for chunk in rows.chunks(INSERT_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("insert into {} (", table.quoted()));

            let mut separated = builder.separated(", ");
            for column in FIXED_COLUMNS {
                separated.push(format!("\"{column}\""));
            }
            for column in &extras {
                separated.push(format!("\"{}\"", column.replace('"', "\"\"")));
            }
            builder.push(") ");

            builder.push_values(chunk, |mut binds, row| {
                for value in row_values(row, &extras) {
                    match value {
                        ScalarValue::Null => {
                            binds.push("null");
                        }
                        ScalarValue::Bool(v) => {
                            binds.push_bind(v);
                        }
                        ScalarValue::Int(v) => {
                            binds.push_bind(v);
                        }
                        ScalarValue::Float(v) => {
                            binds.push_bind(v);
                        }
                        ScalarValue::Text(v) => {
                            binds.push_bind(v);
                        }
                        ScalarValue::Timestamp(v) => {
                            binds.push_bind(v);
                        }
                    }
                }
            });

            let result = builder.build().execute(&mut *tx).await?;
            written += result.rows_affected();
        }

        tx.commit().await?;

        info!(
            "wrote {written} rows to {table} with policy '{policy}'",
        );

        Ok(written)
    }

    async fn count_rows(&self, table: &TableRef) -> EtlResult<u64> {
        let count: i64 = sqlx::query_scalar(&format!("select count(*) from {}", table.quoted()))
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }
}
