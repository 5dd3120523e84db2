//! Outbound HTTP collaborators: etcd health, meta admin and the pipeline API.

pub mod etcd;
pub mod meta;
pub mod pipeline;

use std::time::Duration;

use tracing::error;

use crate::util::errors::{Error, Result, StdError};

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::StdError(StdError::HttpError(format!("failed to build http client: {e}"))))
}

pub(crate) fn request_error(target: &str, e: reqwest::Error) -> Error {
    error!("Request to {} failed: {}", target, e);
    Error::StdError(StdError::HttpError(format!("request to {target} failed: {e}")))
}

/// Turns a non-2xx response into `HttpStatusError` carrying the body.
pub(crate) async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    error!("Request to {} returned {}: {}", url, status, body);
    Err(Error::StdError(StdError::HttpStatusError {
        status: status.as_u16(),
        body,
    }))
}
