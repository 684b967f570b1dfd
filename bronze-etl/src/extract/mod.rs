//! Container-tree extraction.
//!
//! [`SourceExtractor`] walks the hierarchy a [`SourceClient`] exposes (channels, then
//! the threads of each channel) and flattens every item into an
//! [`ExtractedRow`]. Paging, rate-limit pauses, partial-failure skips, and
//! cancellation all live here; the client only knows how to fetch one page.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{ErrorKind, EtlResult};
use crate::source::{Cursor, SourceClient, ThreadListing};
use crate::types::{ContainerRef, ExtractedRow};

/// Wait applied when a source signals throttling without telling us for how long.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

/// Outcome of one extraction pass.
///
/// `interrupted` is set when a stop signal was observed between container iterations;
/// the rows gathered up to that point are still returned so the caller can report how
/// far the run got. Skip counters record local failures that were absorbed instead of
/// aborting the run.
#[derive(Debug, Default)]
pub struct Extraction {
    pub rows: Vec<ExtractedRow>,
    pub interrupted: bool,
    pub skipped_containers: u64,
    pub skipped_items: u64,
}

/// Extractor that eagerly materializes every reachable item of a source.
///
/// One authenticated session is held for the whole traversal and released on every
/// path, including errors and interruption. All rows of a run share a single
/// `extracted_at` timestamp and the client's `source_tag`.
#[derive(Debug)]
pub struct SourceExtractor<C> {
    client: C,
}

impl<C> SourceExtractor<C>
where
    C: SourceClient + Sync,
{
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Extracts all rows from the source.
    ///
    /// Fatal errors (session open, top-level container enumeration) propagate; anything
    /// scoped to a single container or item is logged, counted, and skipped.
    pub async fn extract(&self, shutdown: ShutdownRx) -> EtlResult<Extraction> {
        self.client.open().await?;

        let result = self.traverse(&shutdown).await;

        // The session is released regardless of how the traversal ended. A close
        // failure must not mask a traversal error, so it is only logged.
        if let Err(err) = self.client.close().await {
            warn!("failed to close source session: {err}");
        }

        result
    }

    async fn traverse(&self, shutdown: &ShutdownRx) -> EtlResult<Extraction> {
        let extracted_at = Utc::now();
        let mut extraction = Extraction::default();

        let channels = self.list_containers_with_backoff().await?;
        info!(
            "extracting from {} top-level containers of source '{}'",
            channels.len(),
            C::name()
        );

        for channel in &channels {
            if shutdown.is_signaled() {
                info!("stop signal observed, interrupting extraction");
                extraction.interrupted = true;
                return Ok(extraction);
            }

            let direct_path = [channel.clone()];
            self.drain_container(&direct_path, extracted_at, &mut extraction)
                .await;

            let threads = match self.list_threads_with_backoff(channel).await {
                Ok(listing) => dedupe_threads(listing),
                Err(err) => {
                    warn!(
                        "skipping threads of container '{}' after enumeration error: {err}",
                        channel.id
                    );
                    extraction.skipped_containers += 1;
                    continue;
                }
            };

            for thread in threads {
                if shutdown.is_signaled() {
                    info!("stop signal observed, interrupting extraction");
                    extraction.interrupted = true;
                    return Ok(extraction);
                }

                let thread_path = [channel.clone(), thread];
                self.drain_container(&thread_path, extracted_at, &mut extraction)
                    .await;
            }
        }

        info!(
            "extraction finished with {} rows ({} containers skipped, {} items skipped)",
            extraction.rows.len(),
            extraction.skipped_containers,
            extraction.skipped_items
        );

        Ok(extraction)
    }

    /// Pages through one container, emitting a row per item.
    ///
    /// Rate-limit errors pause the traversal and retry the same cursor, so no page is
    /// lost or duplicated across a throttle. Any other fetch error abandons the rest of
    /// this container and lets the run continue.
    async fn drain_container(
        &self,
        path: &[ContainerRef],
        extracted_at: chrono::DateTime<Utc>,
        extraction: &mut Extraction,
    ) {
        let Some(container) = path.last() else {
            return;
        };

        let mut cursor: Option<Cursor> = None;
        loop {
            let page = match self.client.list_items(container, cursor.as_ref()).await {
                Ok(page) => page,
                Err(err) if err.kind() == ErrorKind::SourceRateLimited => {
                    let wait = err.retry_after().unwrap_or(DEFAULT_RETRY_AFTER);
                    warn!(
                        "source rate limited while paging container '{}', resuming in {:?}",
                        container.id, wait
                    );
                    sleep(wait).await;
                    continue;
                }
                Err(err) => {
                    warn!(
                        "skipping remainder of container '{}' after fetch error: {err}",
                        container.id
                    );
                    extraction.skipped_containers += 1;
                    return;
                }
            };

            debug!(
                "fetched page of {} items from container '{}'",
                page.items.len(),
                container.id
            );

            for item in page.items {
                let row = ExtractedRow::new(
                    path.to_vec(),
                    item.id,
                    item.author_id,
                    item.author_display,
                    item.payload,
                    extracted_at,
                    C::name(),
                );
                match row {
                    Ok(row) => extraction.rows.push(row),
                    Err(err) => {
                        warn!("skipping malformed item in container '{}': {err}", container.id);
                        extraction.skipped_items += 1;
                    }
                }
            }

            match page.next {
                Some(next) => cursor = Some(next),
                None => return,
            }
        }
    }

    /// Top-level container enumeration; throttling is retried, everything else is fatal.
    async fn list_containers_with_backoff(&self) -> EtlResult<Vec<ContainerRef>> {
        loop {
            match self.client.list_containers().await {
                Ok(channels) => return Ok(channels),
                Err(err) if err.kind() == ErrorKind::SourceRateLimited => {
                    let wait = err.retry_after().unwrap_or(DEFAULT_RETRY_AFTER);
                    warn!("source rate limited while listing containers, resuming in {wait:?}");
                    sleep(wait).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn list_threads_with_backoff(&self, channel: &ContainerRef) -> EtlResult<ThreadListing> {
        loop {
            match self.client.list_threads(channel).await {
                Ok(listing) => return Ok(listing),
                Err(err) if err.kind() == ErrorKind::SourceRateLimited => {
                    let wait = err.retry_after().unwrap_or(DEFAULT_RETRY_AFTER);
                    warn!(
                        "source rate limited while listing threads of '{}', resuming in {wait:?}",
                        channel.id
                    );
                    sleep(wait).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Merges archived and active thread listings, keeping the first occurrence of each id.
///
/// A thread archived between the two listing calls appears in both; paging it twice
/// would duplicate every one of its rows.
fn dedupe_threads(listing: ThreadListing) -> Vec<ContainerRef> {
    let mut seen = HashSet::new();
    let mut threads = Vec::with_capacity(listing.archived.len() + listing.active.len());

    for thread in listing.archived.into_iter().chain(listing.active) {
        if seen.insert(thread.id.clone()) {
            threads.push(thread);
        }
    }

    threads
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let listing = ThreadListing {
            archived: vec![
                ContainerRef::new("t1", "archived copy"),
                ContainerRef::new("t2", "old thread"),
            ],
            active: vec![
                ContainerRef::new("t1", "active copy"),
                ContainerRef::new("t3", "new thread"),
            ],
        };

        let threads = dedupe_threads(listing);
        let ids: Vec<&str> = threads.iter().map(|t| t.id.as_str()).collect();

        assert_eq!(ids, vec!["t1", "t2", "t3"]);
        assert_eq!(threads[0].name, "archived copy");
    }
}
