mod basic;
mod client;
mod error;
pub mod auth;
pub mod retry;

pub use basic::BasicClient;
pub use client::HttpClient;
pub use error::FetchError;
pub use retry::{RetryPolicy, with_retry};

use bytes::Bytes;
use tracing::debug;

/// GETs `url` once, treating any non-success status as an error.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &reqwest::Url) -> Result<Bytes, FetchError> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.clone());

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    let body = resp.bytes().await?;
    debug!(bytes = body.len(), "Response body received");
    Ok(body)
}

/// [`fetch_bytes`] under a retry policy.
pub async fn fetch_bytes_with_retry<C: HttpClient>(
    client: &C,
    url: &reqwest::Url,
    policy: &RetryPolicy,
) -> Result<Bytes, FetchError> {
    with_retry(policy, move || fetch_bytes(client, url)).await
}
