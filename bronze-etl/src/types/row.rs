use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};

/// Reference to a container in the source hierarchy (a channel or a thread).
///
/// Containers are identified by an opaque string id so the same type covers numeric
/// Discord snowflakes and UUID-shaped workspace identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRef {
    pub id: String,
    pub name: String,
}

impl ContainerRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A single scalar value inside a row payload.
///
/// Payloads are flat mappings of field name to scalar; nested structures are rejected at
/// the source boundary by never producing them.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl ScalarValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }
}

impl From<Option<String>> for ScalarValue {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(text) => ScalarValue::Text(text),
            None => ScalarValue::Null,
        }
    }
}

impl From<Option<DateTime<Utc>>> for ScalarValue {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        match value {
            Some(ts) => ScalarValue::Timestamp(ts),
            None => ScalarValue::Null,
        }
    }
}

/// The uniform output unit of an extractor.
///
/// One [`ExtractedRow`] is emitted per source item. The container path models the
/// hierarchy without nesting: `[channel]` for a direct channel message, `[channel,
/// thread]` for a thread message, a single synthetic container for flat sources.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRow {
    container_path: Vec<ContainerRef>,
    pub item_id: String,
    pub author_id: Option<String>,
    pub author_display: Option<String>,
    pub payload: BTreeMap<String, ScalarValue>,
    pub extracted_at: DateTime<Utc>,
    pub source_tag: String,
}

impl ExtractedRow {
    /// Creates a row, validating the row shape at the extractor boundary.
    ///
    /// The container path must be non-empty; rows with an empty path have no destination
    /// columns to land in and indicate an extractor bug.
    pub fn new(
        container_path: Vec<ContainerRef>,
        item_id: impl Into<String>,
        author_id: Option<String>,
        author_display: Option<String>,
        payload: BTreeMap<String, ScalarValue>,
        extracted_at: DateTime<Utc>,
        source_tag: impl Into<String>,
    ) -> EtlResult<Self> {
        let item_id = item_id.into();
        if container_path.is_empty() {
            bail!(
                ErrorKind::ValidationError,
                "Extracted row has an empty container path",
                format!("item {item_id}")
            );
        }

        Ok(Self {
            container_path,
            item_id,
            author_id,
            author_display,
            payload,
            extracted_at,
            source_tag: source_tag.into(),
        })
    }

    /// Returns the ordered container path, guaranteed non-empty.
    pub fn container_path(&self) -> &[ContainerRef] {
        &self.container_path
    }

    /// Returns the top-level container this row was extracted from.
    pub fn channel(&self) -> &ContainerRef {
        &self.container_path[0]
    }

    /// Returns the sub-container (thread) if the row came from one.
    pub fn thread(&self) -> Option<&ContainerRef> {
        self.container_path.get(1)
    }

    /// Returns whether the row originated inside a thread.
    pub fn is_thread(&self) -> bool {
        self.container_path.len() > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_container_path_is_rejected() {
        let row = ExtractedRow::new(
            vec![],
            "m1",
            None,
            None,
            BTreeMap::new(),
            Utc::now(),
            "stub",
        );

        let err = row.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }

    #[test]
    fn thread_accessors_follow_path_length() {
        let channel = ContainerRef::new("c1", "general");
        let thread = ContainerRef::new("t1", "release talk");

        let direct = ExtractedRow::new(
            vec![channel.clone()],
            "m1",
            None,
            None,
            BTreeMap::new(),
            Utc::now(),
            "stub",
        )
        .unwrap();
        let threaded = ExtractedRow::new(
            vec![channel.clone(), thread.clone()],
            "m2",
            None,
            None,
            BTreeMap::new(),
            Utc::now(),
            "stub",
        )
        .unwrap();

        assert!(!direct.is_thread());
        assert_eq!(direct.thread(), None);
        assert!(threaded.is_thread());
        assert_eq!(threaded.channel(), &channel);
        assert_eq!(threaded.thread(), Some(&thread));
    }
}
