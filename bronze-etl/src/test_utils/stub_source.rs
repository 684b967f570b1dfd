use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tokio::sync::Mutex;

use crate::bail;
use crate::concurrency::shutdown::ShutdownTx;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::source::{Cursor, ItemPage, SourceClient, SourceItem, ThreadListing};
use crate::types::{ContainerRef, ScalarValue};

/// A thread with its scripted messages.
#[derive(Debug, Clone)]
pub struct StubThread {
    pub thread: ContainerRef,
    pub messages: Vec<SourceItem>,
}

/// A channel with direct messages and archived/active thread listings.
///
/// The same thread may appear in both listings to exercise deduplication.
#[derive(Debug, Clone)]
pub struct StubChannel {
    pub channel: ContainerRef,
    pub messages: Vec<SourceItem>,
    pub archived_threads: Vec<StubThread>,
    pub active_threads: Vec<StubThread>,
}

/// The scripted container tree a [`StubSourceClient`] serves.
#[derive(Debug, Clone, Default)]
pub struct StubGuild {
    pub channels: Vec<StubChannel>,
}

/// One-shot throttle injected into a specific paging call.
#[derive(Debug, Clone)]
pub struct RateLimitSpec {
    /// Container whose paging is throttled.
    pub container_id: String,
    /// Item offset at which the throttle fires (0 = the first page request).
    pub at_offset: usize,
    pub retry_after: Duration,
}

/// Fault and pacing knobs for a [`StubSourceClient`].
#[derive(Debug, Clone)]
pub struct StubBehavior {
    /// Items per page.
    pub page_size: usize,
    /// Fail `open` with an authentication error.
    pub fail_open: bool,
    /// Containers whose item paging always fails with a generic fetch error.
    pub failing_containers: Vec<String>,
    /// Containers that report as vanished mid-run.
    pub missing_containers: Vec<String>,
    /// Channels whose thread enumeration fails.
    pub failing_thread_listings: Vec<String>,
    /// Inject a single rate-limit response.
    pub rate_limit: Option<RateLimitSpec>,
    /// Fire the bound shutdown signal after this many containers have been fully paged.
    pub shutdown_after_containers: Option<usize>,
}

impl Default for StubBehavior {
    fn default() -> Self {
        Self {
            page_size: 2,
            fail_open: false,
            failing_containers: Vec::new(),
            missing_containers: Vec::new(),
            failing_thread_listings: Vec::new(),
            rate_limit: None,
            shutdown_after_containers: None,
        }
    }
}

#[derive(Debug, Default)]
struct StubState {
    open: bool,
    closed: bool,
    rate_limit_fired: bool,
    drained_containers: usize,
    shutdown_tx: Option<ShutdownTx>,
}

/// Scripted [`SourceClient`] used by extractor and pipeline tests.
///
/// Serves a fixed container tree with configurable page size, injected faults, and
/// session bookkeeping so tests can assert the session was released.
#[derive(Debug, Clone)]
pub struct StubSourceClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    channels: Vec<StubChannel>,
    items_by_container: HashMap<String, Vec<SourceItem>>,
    behavior: StubBehavior,
    state: Mutex<StubState>,
}

impl StubSourceClient {
    pub fn new(guild: StubGuild, behavior: StubBehavior) -> Self {
        let mut items_by_container = HashMap::new();
        for channel in &guild.channels {
            items_by_container.insert(channel.channel.id.clone(), channel.messages.clone());
            for thread in channel
                .archived_threads
                .iter()
                .chain(channel.active_threads.iter())
            {
                items_by_container.insert(thread.thread.id.clone(), thread.messages.clone());
            }
        }

        Self {
            inner: Arc::new(Inner {
                channels: guild.channels,
                items_by_container,
                behavior,
                state: Mutex::new(StubState::default()),
            }),
        }
    }

    /// Binds the shutdown transmitter used by `shutdown_after_containers`.
    pub async fn bind_shutdown(&self, tx: ShutdownTx) {
        let mut state = self.inner.state.lock().await;
        state.shutdown_tx = Some(tx);
    }

    /// Returns whether the session was opened and then released.
    pub async fn session_closed(&self) -> bool {
        let state = self.inner.state.lock().await;
        state.open && state.closed
    }

    async fn guard_open(&self) -> EtlResult<()> {
        let state = self.inner.state.lock().await;
        if !state.open || state.closed {
            bail!(
                ErrorKind::SourceConnectionFailed,
                "Source session is not open"
            );
        }
        Ok(())
    }
}

impl SourceClient for StubSourceClient {
    fn name() -> &'static str {
        "stub"
    }

    async fn open(&self) -> EtlResult<()> {
        if self.inner.behavior.fail_open {
            bail!(
                ErrorKind::AuthenticationError,
                "Stub session refused to open"
            );
        }

        let mut state = self.inner.state.lock().await;
        state.open = true;
        Ok(())
    }

    async fn close(&self) -> EtlResult<()> {
        let mut state = self.inner.state.lock().await;
        state.closed = true;
        Ok(())
    }

    async fn list_containers(&self) -> EtlResult<Vec<ContainerRef>> {
        self.guard_open().await?;
        Ok(self
            .inner
            .channels
            .iter()
            .map(|c| c.channel.clone())
            .collect())
    }

    async fn list_threads(&self, channel: &ContainerRef) -> EtlResult<ThreadListing> {
        self.guard_open().await?;

        if self
            .inner
            .behavior
            .failing_thread_listings
            .contains(&channel.id)
        {
            bail!(
                ErrorKind::SourceQueryFailed,
                "Stub thread enumeration failed",
                format!("channel {}", channel.id)
            );
        }

        let Some(stub_channel) = self.inner.channels.iter().find(|c| c.channel.id == channel.id)
        else {
            bail!(
                ErrorKind::SourceContainerMissing,
                "Channel vanished mid-run",
                format!("channel {}", channel.id)
            );
        };

        Ok(ThreadListing {
            archived: stub_channel
                .archived_threads
                .iter()
                .map(|t| t.thread.clone())
                .collect(),
            active: stub_channel
                .active_threads
                .iter()
                .map(|t| t.thread.clone())
                .collect(),
        })
    }

    async fn list_items(
        &self,
        container: &ContainerRef,
        cursor: Option<&Cursor>,
    ) -> EtlResult<ItemPage> {
        self.guard_open().await?;

        let behavior = &self.inner.behavior;
        if behavior.missing_containers.contains(&container.id) {
            bail!(
                ErrorKind::SourceContainerMissing,
                "Container vanished mid-run",
                format!("container {}", container.id)
            );
        }
        if behavior.failing_containers.contains(&container.id) {
            bail!(
                ErrorKind::SourceQueryFailed,
                "Stub item fetch failed",
                format!("container {}", container.id)
            );
        }

        let offset = match cursor {
            Some(cursor) => cursor.as_str().parse::<usize>().map_err(|_| {
                etl_error!(
                    ErrorKind::SourceQueryFailed,
                    "Stub received an unknown cursor",
                    cursor.as_str()
                )
            })?,
            None => 0,
        };

        if let Some(spec) = &behavior.rate_limit
            && spec.container_id == container.id
            && spec.at_offset == offset
        {
            let mut state = self.inner.state.lock().await;
            if !state.rate_limit_fired {
                state.rate_limit_fired = true;
                return Err(etl_error!(
                    ErrorKind::SourceRateLimited,
                    "Stub throttled the session"
                )
                .with_retry_after(spec.retry_after));
            }
        }

        let items = self
            .inner
            .items_by_container
            .get(&container.id)
            .cloned()
            .unwrap_or_default();

        let end = (offset + behavior.page_size).min(items.len());
        let page_items = items[offset.min(items.len())..end].to_vec();
        let next = (end < items.len()).then(|| Cursor::new(end.to_string()));

        if next.is_none() {
            let mut state = self.inner.state.lock().await;
            state.drained_containers += 1;
            if let Some(limit) = behavior.shutdown_after_containers
                && state.drained_containers == limit
                && let Some(tx) = &state.shutdown_tx
            {
                let _ = tx.shutdown();
            }
        }

        Ok(ItemPage {
            items: page_items,
            next,
        })
    }
}

/// Builds a message-shaped [`SourceItem`] with a deterministic creation timestamp.
pub fn message_item(id: &str, author: &str, content: &str) -> SourceItem {
    let mut payload = BTreeMap::new();
    payload.insert(
        "content".to_string(),
        ScalarValue::Text(content.to_string()),
    );
    payload.insert(
        "created_at".to_string(),
        ScalarValue::Timestamp(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
    );
    payload.insert("edited_at".to_string(), ScalarValue::Null);

    SourceItem {
        id: id.to_string(),
        author_id: Some(format!("{author}-id")),
        author_display: Some(author.to_string()),
        payload,
    }
}

/// The canonical two-channel scenario: channel A with 3 direct messages and one thread
/// of 2 messages, channel B empty.
pub fn two_channel_guild() -> StubGuild {
    StubGuild {
        channels: vec![
            StubChannel {
                channel: ContainerRef::new("chan-a", "general"),
                messages: vec![
                    message_item("a1", "darcy", "first"),
                    message_item("a2", "sam", "second"),
                    message_item("a3", "darcy", "third"),
                ],
                archived_threads: vec![StubThread {
                    thread: ContainerRef::new("thread-a", "release talk"),
                    messages: vec![
                        message_item("t1", "sam", "thread start"),
                        message_item("t2", "darcy", "thread reply"),
                    ],
                }],
                active_threads: vec![],
            },
            StubChannel {
                channel: ContainerRef::new("chan-b", "random"),
                messages: vec![],
                archived_threads: vec![],
                active_threads: vec![],
            },
        ],
    }
}
