use super::client::HttpClient;
use super::error::FetchError;
use async_trait::async_trait;
use std::time::Duration;

/// Plain `reqwest` client with connect and request timeouts.
pub struct BasicClient(reqwest::Client);

impl BasicClient {
    /// Builds a client whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()?;
        Ok(Self(client))
    }
}

#[async_trait]
impl HttpClient for BasicClient {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        self.0.execute(req).await
    }
}
