//! Error types and result definitions for bronze ingestion runs.
//!
//! Provides a classified error system with captured diagnostic metadata for every
//! failure surfaced by a pipeline run. The [`EtlError`] type carries an [`ErrorKind`]
//! used by the extractor and runner to decide between retrying, skipping, and aborting.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;
use std::time::Duration;

/// Convenient result type for ingestion operations using [`EtlError`] as the error type.
pub type EtlResult<T> = Result<T, EtlError>;

/// Main error type for ingestion operations.
///
/// [`EtlError`] pairs a coarse [`ErrorKind`] with a static description, optional dynamic
/// detail, an optional source error, and the callsite that created it. Rate-limit errors
/// additionally carry the wait the source asked for, so the extractor can resume the
/// same cursor after the pause.
#[derive(Debug, Clone)]
pub struct EtlError {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    retry_after: Option<Duration>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Specific categories of errors that can occur during an ingestion run.
///
/// The kind determines propagation: recoverable kinds are handled inside the extractor,
/// local kinds are absorbed as skips, and everything else aborts the run.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Source errors.
    SourceConnectionFailed,
    AuthenticationError,
    SourceRateLimited,
    SourceContainerMissing,
    SourceQueryFailed,
    ExtractionInterrupted,

    // Row shape errors.
    ValidationError,

    // Destination errors.
    DestinationConnectionFailed,
    SchemaDdlFailed,
    DestinationQueryFailed,
    DestinationTableNotEmpty,
    RowCountMismatch,

    // Configuration & IO errors.
    ConfigError,
    IoError,
    SerializationError,
    DeserializationError,

    // Unknown / uncategorized.
    Unknown,
}

impl EtlError {
    /// Creates an [`EtlError`] from its components.
    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        EtlError {
            kind,
            description,
            detail,
            source,
            retry_after: None,
            location: Location::caller(),
            backtrace: Arc::new(Backtrace::capture()),
        }
    }

    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Returns the wait requested by the source for a [`ErrorKind::SourceRateLimited`] error.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Returns the captured backtrace for this error.
    pub fn backtrace(&self) -> &Backtrace {
        self.backtrace.as_ref()
    }

    /// Attaches an originating [`error::Error`] to this error and returns the modified instance.
    ///
    /// The stored source is preserved across clones and exposed via [`error::Error::source`].
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    /// Attaches the wait requested by a throttling source and returns the modified instance.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

impl PartialEq for EtlError {
    /// Compares errors by kind only, which is what tests and retry decisions care about.
    fn eq(&self, other: &EtlError) -> bool {
        self.kind == other.kind
    }
}

impl fmt::Display for EtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let location = self.location;
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            self.kind,
            self.description,
            location.file(),
            location.line(),
            location.column()
        )?;

        if let Some(detail) = self.detail.as_deref() {
            write!(f, "\n  Detail: {detail}")?;
        }

        Ok(())
    }
}

impl error::Error for EtlError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| source as &(dyn error::Error + 'static))
    }
}

/// Creates an [`EtlError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for EtlError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates an [`EtlError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for EtlError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Converts [`std::io::Error`] to [`EtlError`] with [`ErrorKind::IoError`].
impl From<std::io::Error> for EtlError {
    #[track_caller]
    fn from(err: std::io::Error) -> EtlError {
        let detail = err.to_string();
        let source = Arc::new(err);
        EtlError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`serde_json::Error`] to [`EtlError`] with the appropriate error kind.
impl From<serde_json::Error> for EtlError {
    #[track_caller]
    fn from(err: serde_json::Error) -> EtlError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            _ => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        let detail = err.to_string();
        let source = Arc::new(err);
        EtlError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`sqlx::Error`] to [`EtlError`] with the appropriate error kind.
///
/// Pool and transport failures map to [`ErrorKind::DestinationConnectionFailed`],
/// everything else to [`ErrorKind::DestinationQueryFailed`]. Callers that need a more
/// specific kind (DDL execution, conflict checks) wrap the error themselves.
impl From<sqlx::Error> for EtlError {
    #[track_caller]
    fn from(err: sqlx::Error) -> EtlError {
        let (kind, description) = match &err {
            sqlx::Error::Configuration(_) => {
                (ErrorKind::ConfigError, "Destination configuration invalid")
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => (
                ErrorKind::DestinationConnectionFailed,
                "Destination connection failed",
            ),
            _ => (
                ErrorKind::DestinationQueryFailed,
                "Destination query failed",
            ),
        };

        let detail = err.to_string();
        let source = Arc::new(err);
        EtlError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl_error;

    #[test]
    fn error_carries_kind_description_and_detail() {
        let err = etl_error!(
            ErrorKind::SourceQueryFailed,
            "Failed to fetch page",
            format!("channel {}", 42)
        );

        assert_eq!(err.kind(), ErrorKind::SourceQueryFailed);
        assert_eq!(err.detail(), Some("channel 42"));
        assert!(err.to_string().contains("Failed to fetch page"));
    }

    #[test]
    fn retry_after_is_preserved() {
        let err = etl_error!(ErrorKind::SourceRateLimited, "Source throttled the session")
            .with_retry_after(Duration::from_millis(250));

        assert_eq!(err.retry_after(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn errors_compare_by_kind() {
        let a = etl_error!(ErrorKind::ConfigError, "Missing token");
        let b = etl_error!(ErrorKind::ConfigError, "Missing guild id");

        assert_eq!(a, b);
    }
}
