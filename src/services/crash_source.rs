//! Trait and types for pulling crash batches from a data source.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::types::CrashRecord;
use crate::fetch::FetchError;

/// Which crashes to request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashQuery {
    /// Maximum number of rows.
    pub limit: u32,
    /// Only crashes strictly after this date.
    pub since: NaiveDate,
}

impl Default for CrashQuery {
    fn default() -> Self {
        Self {
            limit: 1000,
            since: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or_default(),
        }
    }
}

/// Where a batch of crashes came from.
///
/// Anything other than `Live` must be shown as such; a fallback batch is
/// never real-time data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataProvenance {
    /// Fetched from the named remote source just now.
    Live { source: String },
    /// Read from a local file.
    File { path: String },
    /// The built-in demonstration dataset, requested explicitly.
    Mock,
    /// The built-in dataset, substituted because the live source failed.
    Fallback { reason: String },
}

impl DataProvenance {
    pub fn is_live(&self) -> bool {
        matches!(self, DataProvenance::Live { .. })
    }

    /// Short label for logs and report headers.
    pub fn label(&self) -> &'static str {
        match self {
            DataProvenance::Live { .. } => "live",
            DataProvenance::File { .. } => "file",
            DataProvenance::Mock => "mock",
            DataProvenance::Fallback { .. } => "fallback (not live data)",
        }
    }
}

/// Crash records from one fetch, tagged with their origin.
#[derive(Debug, Clone)]
pub struct CrashBatch {
    pub records: Vec<CrashRecord>,
    pub provenance: DataProvenance,
    pub fetched_at: DateTime<Utc>,
}

impl CrashBatch {
    pub fn new(records: Vec<CrashRecord>, provenance: DataProvenance) -> Self {
        Self {
            records,
            provenance,
            fetched_at: Utc::now(),
        }
    }
}

/// Abstraction over a crash data provider (open-data portal, file, ...).
#[async_trait]
pub trait CrashSource: Send + Sync {
    /// Human-readable name for logs.
    fn name(&self) -> &str;

    /// Fetches the crashes matching `query`.
    async fn fetch_crashes(&self, query: &CrashQuery) -> Result<CrashBatch, FetchError>;
}
