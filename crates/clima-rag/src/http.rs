//! Shared reqwest helpers for the remote adapters.

use anyhow::{anyhow, Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// JSON client with an optional bearer token baked into the default headers.
pub(crate) fn build_client(bearer: Option<&str>, timeout: Duration) -> Result<Client> {
    let mut headers = HeaderMap::new();
    if let Some(token) = bearer.map(str::trim).filter(|t| !t.is_empty()) {
        let auth = format!("Bearer {}", token);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).context("invalid bearer token")?,
        );
    }
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout)
        .pool_idle_timeout(Duration::from_secs(90))
        .default_headers(headers)
        .build()
        .context("failed to build HTTP client")
}

/// Parse a JSON body, surfacing HTML error pages and body previews on failure.
pub(crate) async fn parse_json_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    endpoint: &str,
) -> Result<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| anyhow!("Failed to read response body from {}: {}", endpoint, e))?;

    let trimmed = body.trim_start();
    if trimmed.starts_with('<') {
        let preview: String = trimmed.chars().take(200).collect();
        return Err(anyhow!(
            "Endpoint {} returned HTML instead of JSON (HTTP {}): {}",
            endpoint,
            status,
            preview
        ));
    }

    serde_json::from_str::<T>(&body).map_err(|e| {
        let preview: String = body.chars().take(300).collect();
        anyhow!(
            "Failed to parse JSON from {} (HTTP {}): {}. Body: {}",
            endpoint,
            status,
            e,
            preview
        )
    })
}

pub(crate) fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

pub(crate) fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

pub(crate) fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(250 * (1 << capped))
}
