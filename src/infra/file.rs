use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

use crate::fetch::FetchError;
use crate::parser::parse_crashes;
use crate::services::crash_source::{CrashBatch, CrashQuery, CrashSource, DataProvenance};

/// Reads crash rows from a local JSON array or CSV file.
pub struct FileCrashSource {
    path: PathBuf,
    label: String,
}

impl FileCrashSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = path.display().to_string();
        Self { path, label }
    }
}

#[async_trait]
impl CrashSource for FileCrashSource {
    fn name(&self) -> &str {
        &self.label
    }

    /// Loads the whole file; only the query's row limit is applied.
    async fn fetch_crashes(&self, query: &CrashQuery) -> Result<CrashBatch, FetchError> {
        let bytes = tokio::fs::read(&self.path).await?;
        let mut records = parse_crashes(&bytes).map_err(|e| FetchError::Decode(format!("{e:#}")))?;
        records.truncate(query.limit as usize);

        info!(path = %self.label, rows = records.len(), "Crash rows loaded from file");
        Ok(CrashBatch::new(
            records,
            DataProvenance::File {
                path: self.label.clone(),
            },
        ))
    }
}
