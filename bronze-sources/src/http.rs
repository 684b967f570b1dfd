//! Shared response handling for the REST source clients.

use std::time::Duration;

use bronze_etl::error::{ErrorKind, EtlError, EtlResult};
use bronze_etl::etl_error;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

/// Cap on response body bytes echoed into error details.
const ERROR_BODY_PREVIEW: usize = 256;

/// Sends a GET request and deserializes a 2xx response body.
///
/// Non-2xx responses are mapped via [`classify_status`] so callers only deal with
/// [`EtlError`] kinds.
pub(crate) async fn get_json<T>(request: reqwest::RequestBuilder, context: &'static str) -> EtlResult<T>
where
    T: DeserializeOwned,
{
    let response = request.send().await.map_err(|err| {
        etl_error!(
            ErrorKind::SourceConnectionFailed,
            "Failed to reach the source API",
            context
        )
        .with_source(err)
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(error_from_response(response, context).await);
    }

    let body = response.text().await.map_err(|err| {
        etl_error!(
            ErrorKind::SourceConnectionFailed,
            "Failed to read the source API response",
            context
        )
        .with_source(err)
    })?;

    serde_json::from_str(&body).map_err(|err| {
        etl_error!(
            ErrorKind::DeserializationError,
            "Source API returned an unexpected body",
            format!("{context}: {err}")
        )
    })
}

/// Builds the error for a non-2xx response, consuming the body for diagnostics.
async fn error_from_response(response: Response, context: &'static str) -> EtlError {
    let status = response.status();
    let retry_after_header = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let body = response.text().await.unwrap_or_default();

    classify_status(status, retry_after_header.as_deref(), &body, context)
}

/// Maps a non-2xx status to the error kind the extractor dispatches on.
///
/// 429 carries the wait the source asked for, taken from the JSON body's
/// `retry_after` field (seconds, fractional) or the `Retry-After` header.
pub(crate) fn classify_status(
    status: StatusCode,
    retry_after_header: Option<&str>,
    body: &str,
    context: &'static str,
) -> EtlError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => etl_error!(
            ErrorKind::AuthenticationError,
            "Source rejected the credentials",
            context
        ),
        StatusCode::NOT_FOUND => etl_error!(
            ErrorKind::SourceContainerMissing,
            "Source container no longer exists",
            context
        ),
        StatusCode::TOO_MANY_REQUESTS => {
            let error = etl_error!(
                ErrorKind::SourceRateLimited,
                "Source throttled the session",
                context
            );

            match parse_retry_after(retry_after_header, body) {
                Some(wait) => error.with_retry_after(wait),
                None => error,
            }
        }
        _ => {
            let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
            etl_error!(
                ErrorKind::SourceQueryFailed,
                "Source API request failed",
                format!("{context}: status {status}: {preview}")
            )
        }
    }
}

fn parse_retry_after(header: Option<&str>, body: &str) -> Option<Duration> {
    let from_body = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("retry_after").and_then(|v| v.as_f64()));

    from_body
        .or_else(|| header.and_then(|value| value.parse::<f64>().ok()))
        .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
        .map(Duration::from_secs_f64)
}
