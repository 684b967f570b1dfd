#![cfg(feature = "test-utils")]

use std::time::Duration;

use bronze_etl::concurrency::shutdown::create_shutdown_channel;
use bronze_etl::destination::{Destination, MemoryDestination};
use bronze_etl::error::ErrorKind;
use bronze_etl::extract::SourceExtractor;
use bronze_etl::pipeline::{Pipeline, RunStatus};
use bronze_etl::schema::SchemaManager;
use bronze_etl::test_utils::{
    MiscountingDestination, RateLimitSpec, StubBehavior, StubChannel, StubGuild, StubSourceClient,
    StubThread, message_item, two_channel_guild,
};
use bronze_etl::types::{ConflictPolicy, ContainerRef, TableRef};
use bronze_telemetry::init_test_tracing;
use rand::random;

const TEST_DDL: &str = "create table if not exists bronze.messages (item_id text, content text)";

fn test_table() -> TableRef {
    TableRef::new("bronze", "messages")
}

fn pipeline_with(
    client: StubSourceClient,
    destination: MemoryDestination,
    policy: ConflictPolicy,
) -> Pipeline<StubSourceClient, MemoryDestination> {
    Pipeline::new(random(), test_table(), TEST_DDL, policy, client, destination)
}

#[tokio::test]
async fn zero_message_channel_still_yields_thread_rows() {
    init_test_tracing();

    let guild = StubGuild {
        channels: vec![StubChannel {
            channel: ContainerRef::new("chan-quiet", "announcements"),
            messages: vec![],
            archived_threads: vec![],
            active_threads: vec![StubThread {
                thread: ContainerRef::new("thread-1", "pinned discussion"),
                messages: vec![
                    message_item("t1", "darcy", "hello"),
                    message_item("t2", "sam", "world"),
                ],
            }],
        }],
    };
    let client = StubSourceClient::new(guild, StubBehavior::default());
    let extractor = SourceExtractor::new(client);
    let (_tx, rx) = create_shutdown_channel();

    let extraction = extractor.extract(rx).await.unwrap();

    assert_eq!(extraction.rows.len(), 2);
    assert!(extraction.rows.iter().all(|r| r.is_thread()));
    assert!(!extraction.interrupted);
    assert_eq!(extraction.skipped_containers, 0);
}

#[tokio::test]
async fn thread_listed_as_archived_and_active_is_extracted_once() {
    init_test_tracing();

    let thread = StubThread {
        thread: ContainerRef::new("thread-dup", "both listings"),
        messages: vec![
            message_item("d1", "darcy", "only once"),
            message_item("d2", "sam", "please"),
        ],
    };
    let guild = StubGuild {
        channels: vec![StubChannel {
            channel: ContainerRef::new("chan-a", "general"),
            messages: vec![message_item("m1", "darcy", "hi")],
            archived_threads: vec![thread.clone()],
            active_threads: vec![thread],
        }],
    };
    let client = StubSourceClient::new(guild, StubBehavior::default());
    let extractor = SourceExtractor::new(client);
    let (_tx, rx) = create_shutdown_channel();

    let extraction = extractor.extract(rx).await.unwrap();

    let thread_rows: Vec<_> = extraction.rows.iter().filter(|r| r.is_thread()).collect();
    assert_eq!(thread_rows.len(), 2);
    assert_eq!(extraction.rows.len(), 3);
}

#[tokio::test]
async fn one_shot_rate_limit_returns_the_same_rows_without_duplicates() {
    init_test_tracing();

    let no_throttle = {
        let client = StubSourceClient::new(two_channel_guild(), StubBehavior::default());
        let (_tx, rx) = create_shutdown_channel();
        SourceExtractor::new(client).extract(rx).await.unwrap()
    };

    // Throttle fires mid-pagination of channel A's direct messages (offset 2 is the
    // second page) so the retry must resume the in-flight page, not restart.
    let behavior = StubBehavior {
        rate_limit: Some(RateLimitSpec {
            container_id: "chan-a".to_string(),
            at_offset: 2,
            retry_after: Duration::from_millis(10),
        }),
        ..StubBehavior::default()
    };
    let throttled = {
        let client = StubSourceClient::new(two_channel_guild(), behavior);
        let (_tx, rx) = create_shutdown_channel();
        SourceExtractor::new(client).extract(rx).await.unwrap()
    };

    let ids = |extraction: &bronze_etl::extract::Extraction| {
        extraction
            .rows
            .iter()
            .map(|r| r.item_id.clone())
            .collect::<Vec<_>>()
    };

    assert_eq!(ids(&no_throttle), ids(&throttled));
    assert_eq!(throttled.rows.len(), 5);
}

#[tokio::test]
async fn failing_container_is_skipped_and_the_run_still_verifies() {
    init_test_tracing();

    let behavior = StubBehavior {
        failing_containers: vec!["thread-a".to_string()],
        ..StubBehavior::default()
    };
    let client = StubSourceClient::new(two_channel_guild(), behavior);
    let destination = MemoryDestination::new();

    let report = pipeline_with(client, destination.clone(), ConflictPolicy::Append)
        .run()
        .await;

    // The thread's 2 rows are lost, the channel's 3 direct rows still land.
    assert_eq!(report.status, RunStatus::Verified);
    assert_eq!(report.rows_extracted, 3);
    assert_eq!(report.rows_loaded, 3);
}

#[tokio::test]
async fn ensure_table_is_idempotent_under_reruns() {
    init_test_tracing();

    let destination = MemoryDestination::new();
    let manager = SchemaManager::new(destination.clone(), "bronze");

    manager.ensure_table(TEST_DDL).await.unwrap();
    manager.ensure_table(TEST_DDL).await.unwrap();

    let ddl = destination.ddl_statements().await;
    assert_eq!(ddl, vec![TEST_DDL.to_string(), TEST_DDL.to_string()]);
}

#[tokio::test]
async fn append_runs_accumulate_rows_across_runs() {
    init_test_tracing();

    let destination = MemoryDestination::new();

    for expected_total in [5u64, 10] {
        let client = StubSourceClient::new(two_channel_guild(), StubBehavior::default());
        let report = pipeline_with(client, destination.clone(), ConflictPolicy::Append)
            .run()
            .await;

        assert_eq!(report.status, RunStatus::Verified);
        assert_eq!(report.rows_loaded, 5);
        assert_eq!(
            destination.count_rows(&test_table()).await.unwrap(),
            expected_total
        );
    }
}

#[tokio::test]
async fn replace_run_leaves_exactly_the_new_rows() {
    init_test_tracing();

    let destination = MemoryDestination::new();

    let client = StubSourceClient::new(two_channel_guild(), StubBehavior::default());
    pipeline_with(client, destination.clone(), ConflictPolicy::Append)
        .run()
        .await;

    let client = StubSourceClient::new(two_channel_guild(), StubBehavior::default());
    let report = pipeline_with(client, destination.clone(), ConflictPolicy::Replace)
        .run()
        .await;

    assert_eq!(report.status, RunStatus::Verified);
    assert_eq!(destination.count_rows(&test_table()).await.unwrap(), 5);
}

#[tokio::test]
async fn fail_if_exists_fails_the_run_against_a_nonempty_table() {
    init_test_tracing();

    let destination = MemoryDestination::new();

    let client = StubSourceClient::new(two_channel_guild(), StubBehavior::default());
    pipeline_with(client, destination.clone(), ConflictPolicy::Append)
        .run()
        .await;

    let client = StubSourceClient::new(two_channel_guild(), StubBehavior::default());
    let report = pipeline_with(client, destination.clone(), ConflictPolicy::FailIfExists)
        .run()
        .await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.stage_reached, RunStatus::Loading);
    assert_eq!(
        report.error.as_ref().map(|e| e.kind()),
        Some(ErrorKind::DestinationTableNotEmpty)
    );
    // The failed load left the previous rows untouched.
    assert_eq!(destination.count_rows(&test_table()).await.unwrap(), 5);
}

#[tokio::test]
async fn verification_mismatch_fails_the_run() {
    init_test_tracing();

    let client = StubSourceClient::new(two_channel_guild(), StubBehavior::default());
    let destination = MiscountingDestination::wrap(MemoryDestination::new());

    let pipeline = Pipeline::new(
        random(),
        test_table(),
        TEST_DDL,
        ConflictPolicy::Append,
        client,
        destination,
    );
    let report = pipeline.run().await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.stage_reached, RunStatus::Loading);
    assert_eq!(
        report.error.as_ref().map(|e| e.kind()),
        Some(ErrorKind::RowCountMismatch)
    );
    assert!(report.into_result().is_err());
}
