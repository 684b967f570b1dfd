use std::collections::BTreeMap;
use std::future::Future;

use crate::error::EtlResult;
use crate::types::{ContainerRef, ScalarValue};

/// Opaque pagination token returned by a source to fetch the next page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(pub String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A leaf record fetched from a source, before it is stamped into an
/// [`crate::types::ExtractedRow`].
#[derive(Debug, Clone, PartialEq)]
pub struct SourceItem {
    pub id: String,
    pub author_id: Option<String>,
    pub author_display: Option<String>,
    pub payload: BTreeMap<String, ScalarValue>,
}

/// One page of items plus the cursor for the next page, if any.
///
/// A `None` cursor means the container is exhausted.
#[derive(Debug, Clone, Default)]
pub struct ItemPage {
    pub items: Vec<SourceItem>,
    pub next: Option<Cursor>,
}

/// Archived and active sub-containers of a channel.
///
/// The two listings may overlap: a thread archived between the two calls shows up in
/// both. The extractor deduplicates by id before paging.
#[derive(Debug, Clone, Default)]
pub struct ThreadListing {
    pub archived: Vec<ContainerRef>,
    pub active: Vec<ContainerRef>,
}

/// Trait for clients that expose paged listing over a container hierarchy.
///
/// Implementations wrap a source-specific wire protocol (Discord REST, Notion REST, a
/// scripted stub) behind request/response calls; the extractor never registers
/// callbacks or sees transport details.
///
/// An authenticated session is opened once per traversal with [`SourceClient::open`]
/// and must be released with [`SourceClient::close`] on every path. Listing calls fail
/// with `AuthenticationError` on bad credentials, `SourceRateLimited` (carrying
/// `retry_after`) when throttled, and `SourceContainerMissing` when a referenced
/// container vanished mid-run.
pub trait SourceClient {
    /// Returns the name of the source, used as the `source_tag` of every row.
    fn name() -> &'static str;

    /// Authenticates and resolves the top-level workspace or guild.
    ///
    /// Any failure here is fatal to the run.
    fn open(&self) -> impl Future<Output = EtlResult<()>> + Send;

    /// Releases the authenticated session.
    fn close(&self) -> impl Future<Output = EtlResult<()>> + Send;

    /// Lists the top-level containers in the order the source returns them.
    fn list_containers(&self) -> impl Future<Output = EtlResult<Vec<ContainerRef>>> + Send;

    /// Lists archived and active sub-containers of a channel.
    fn list_threads(
        &self,
        channel: &ContainerRef,
    ) -> impl Future<Output = EtlResult<ThreadListing>> + Send;

    /// Fetches one page of items from a container.
    ///
    /// Passing the cursor from a previous [`ItemPage`] continues the traversal; `None`
    /// starts from the newest items.
    fn list_items(
        &self,
        container: &ContainerRef,
        cursor: Option<&Cursor>,
    ) -> impl Future<Output = EtlResult<ItemPage>> + Send;
}
