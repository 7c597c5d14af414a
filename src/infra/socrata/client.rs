use async_trait::async_trait;
use tracing::{debug, info};

use crate::fetch::{FetchError, HttpClient, RetryPolicy, fetch_bytes_with_retry};
use crate::parser::parse_crashes_json;
use crate::services::crash_source::{CrashBatch, CrashQuery, CrashSource, DataProvenance};

/// Chicago Data Portal "Traffic Crashes - Crashes" dataset.
pub const CHICAGO_CRASHES_ENDPOINT: &str =
    "https://data.cityofchicago.org/resource/85ca-t3if.json";

/// Fetches crash rows from a Socrata (SODA) dataset.
pub struct SocrataCrashClient<C> {
    http: C,
    endpoint: String,
    retry: RetryPolicy,
}

impl<C: HttpClient> SocrataCrashClient<C> {
    pub fn new(http: C, endpoint: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            retry,
        }
    }

    /// Builds the SODA query URL: newest crashes first, after `since`,
    /// at most `limit` rows.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Request`] if the endpoint is not a valid URL.
    pub fn query_url(&self, query: &CrashQuery) -> Result<reqwest::Url, FetchError> {
        let mut url = reqwest::Url::parse(&self.endpoint)
            .map_err(|e| FetchError::Request(format!("bad endpoint '{}': {e}", self.endpoint)))?;
        url.query_pairs_mut()
            .append_pair("$limit", &query.limit.to_string())
            .append_pair(
                "$where",
                &format!("crash_date > '{}'", query.since.format("%Y-%m-%d")),
            )
            .append_pair("$order", "crash_date DESC");
        Ok(url)
    }
}

#[async_trait]
impl<C: HttpClient> CrashSource for SocrataCrashClient<C> {
    fn name(&self) -> &str {
        &self.endpoint
    }

    #[tracing::instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn fetch_crashes(&self, query: &CrashQuery) -> Result<CrashBatch, FetchError> {
        let url = self.query_url(query)?;
        debug!(url = %url, "Requesting crash rows");

        let fetch_start = std::time::Instant::now();
        let body = fetch_bytes_with_retry(&self.http, &url, &self.retry).await?;
        let records = parse_crashes_json(&body).map_err(|e| FetchError::Decode(format!("{e:#}")))?;

        info!(
            rows = records.len(),
            elapsed_ms = fetch_start.elapsed().as_millis() as u64,
            "Crash rows fetched"
        );

        Ok(CrashBatch::new(
            records,
            DataProvenance::Live {
                source: self.endpoint.clone(),
            },
        ))
    }
}
