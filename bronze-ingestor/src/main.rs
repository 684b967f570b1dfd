//! Bronze ingestion binary.
//!
//! Runs one extraction-and-load pipeline per invocation: the selected source is
//! traversed eagerly, rows are bulk-loaded into the destination table, and the run
//! ends with a read-after-write verification. The process exits non-zero unless the
//! run reaches the verified state.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, warn};

use bronze_config::load_config;
use bronze_config::shared::{DiscordConfig, IngestorConfig, NotionConfig};
use bronze_etl::concurrency::shutdown::ShutdownTx;
use bronze_etl::destination::PostgresDestination;
use bronze_etl::pipeline::{Pipeline, RunReport};
use bronze_etl::types::TableRef;
use bronze_sources::{DiscordClient, NotionClient};
use bronze_telemetry::init_tracing;

/// Connections kept against the destination; one run only ever uses a handful.
const MAX_POOL_CONNECTIONS: u32 = 4;

#[derive(Debug, Parser)]
#[command(name = "bronze-ingestor", about = "Bronze-layer source ingestion")]
struct Cli {
    #[command(subcommand)]
    source: Source,
}

#[derive(Debug, Subcommand)]
enum Source {
    /// Ingest chat messages from the configured Discord guild.
    Discord {
        /// Path to the CREATE TABLE statement applied before loading.
        #[arg(long)]
        ddl_path: PathBuf,
        /// Destination table name, overriding the default `discord_messages`.
        #[arg(long)]
        table: Option<String>,
    },
    /// Ingest user records from the configured Notion workspace.
    WorkspaceUsers {
        /// Path to the CREATE TABLE statement applied before loading.
        #[arg(long)]
        ddl_path: PathBuf,
        /// Destination table name, overriding the default `workspace_users`.
        #[arg(long)]
        table: Option<String>,
    },
}

impl Source {
    fn default_table(&self) -> &'static str {
        match self {
            Source::Discord { .. } => "discord_messages",
            Source::WorkspaceUsers { .. } => "workspace_users",
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config::<IngestorConfig>() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = init_tracing(env!("CARGO_BIN_NAME")) {
        eprintln!("failed to initialize tracing: {err}");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("failed to start the async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(async_main(cli, config)) {
        Ok(report) => {
            info!(
                "run finished: {} rows extracted, {} rows loaded into {}",
                report.rows_extracted, report.rows_loaded, report.table
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("run failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}

enum ResolvedSource {
    Discord(DiscordConfig),
    Notion(NotionConfig),
}

async fn async_main(cli: Cli, config: IngestorConfig) -> anyhow::Result<RunReport> {
    let (ddl_path, table_override) = match &cli.source {
        Source::Discord { ddl_path, table } | Source::WorkspaceUsers { ddl_path, table } => {
            (ddl_path.clone(), table.clone())
        }
    };

    let ddl = std::fs::read_to_string(&ddl_path)
        .with_context(|| format!("failed to read ddl file {}", ddl_path.display()))?;

    // The per-source section is validated before any network or database call.
    let source = match &cli.source {
        Source::Discord { .. } => ResolvedSource::Discord(
            config
                .require_discord()
                .context("discord source selected")?
                .clone(),
        ),
        Source::WorkspaceUsers { .. } => ResolvedSource::Notion(
            config
                .require_notion()
                .context("workspace-users source selected")?
                .clone(),
        ),
    };

    let pool = PgPoolOptions::new()
        .max_connections(MAX_POOL_CONNECTIONS)
        .connect_with(config.destination.with_db())
        .await
        .context("failed to connect to the destination database")?;
    let destination = PostgresDestination::new(pool);

    let table = TableRef::new(
        config.pipeline.schema_name.clone(),
        table_override.unwrap_or_else(|| cli.source.default_table().to_string()),
    );
    let pipeline_id = u64::from(std::process::id());

    let report = match source {
        ResolvedSource::Discord(discord) => {
            let pipeline = Pipeline::new(
                pipeline_id,
                table,
                ddl,
                config.pipeline.conflict_policy,
                DiscordClient::new(&discord),
                destination,
            );
            spawn_signal_listener(pipeline.shutdown_tx());
            pipeline.run().await
        }
        ResolvedSource::Notion(notion) => {
            let pipeline = Pipeline::new(
                pipeline_id,
                table,
                ddl,
                config.pipeline.conflict_policy,
                NotionClient::new(&notion),
                destination,
            );
            spawn_signal_listener(pipeline.shutdown_tx());
            pipeline.run().await
        }
    };

    report.into_result().map_err(anyhow::Error::from)
}

/// Installs SIGINT/SIGTERM handlers that request a graceful stop.
///
/// The extractor observes the signal between container iterations, so the source
/// session is closed and the run ends as failed rather than the process being killed
/// mid-page.
fn spawn_signal_listener(shutdown_tx: ShutdownTx) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(sigterm) => sigterm,
                    Err(err) => {
                        warn!("failed to install the sigterm handler: {err}");
                        return;
                    }
                };

            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }

        info!("shutdown signal received, stopping after the current container");
        let _ = shutdown_tx.shutdown();
    });
}
