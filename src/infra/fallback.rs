use async_trait::async_trait;
use tracing::warn;

use crate::fetch::FetchError;
use crate::infra::mock::MockCrashSource;
use crate::services::crash_source::{CrashBatch, CrashQuery, CrashSource, DataProvenance};

/// Serves the built-in dataset when the wrapped source cannot be reached.
///
/// The substitute batch is tagged [`DataProvenance::Fallback`] with the
/// failure that caused it. Failures other than an unreachable upstream
/// (undecodable data, local I/O) are passed through.
pub struct WithFallback<S> {
    inner: S,
    fallback: MockCrashSource,
}

impl<S: CrashSource> WithFallback<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fallback: MockCrashSource,
        }
    }
}

#[async_trait]
impl<S: CrashSource> CrashSource for WithFallback<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch_crashes(&self, query: &CrashQuery) -> Result<CrashBatch, FetchError> {
        match self.inner.fetch_crashes(query).await {
            Ok(batch) => Ok(batch),
            Err(e) if e.is_upstream_failure() => {
                warn!(
                    source = self.inner.name(),
                    error = %e,
                    "Live crash source unavailable, serving fallback data (NOT live)"
                );
                let batch = self.fallback.fetch_crashes(query).await?;
                Ok(CrashBatch {
                    provenance: DataProvenance::Fallback {
                        reason: e.to_string(),
                    },
                    ..batch
                })
            }
            Err(e) => Err(e),
        }
    }
}
