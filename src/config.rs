//! Engine configuration.
//!
//! Read from a JSON file whose path comes from `--config` or the
//! `ROAD_SAFETY_CONFIG` environment variable. Every field has a default, so
//! an empty object (or no file at all) gives the standard setup.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::aggregate::DEFAULT_TOP_N;
use crate::engine::appraisal::{
    Appraiser, CrashCostModel, CrashCostTable, DEFAULT_BLENDED_CRASH_COST, DEFAULT_DISCOUNT_RATE,
    DEFAULT_MAINTENANCE_COST,
};
use crate::engine::rank::{DEFAULT_EXCESS_FACTOR, ProportionalExcess};
use crate::fetch::RetryPolicy;
use crate::infra::socrata::CHICAGO_CRASHES_ENDPOINT;
use crate::services::crash_source::CrashQuery;

pub const CONFIG_ENV_VAR: &str = "ROAD_SAFETY_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostModelKind {
    #[default]
    SeverityWeighted,
    Blended,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub top_n: usize,
    pub excess_factor: f64,
    /// Years of crash history behind the screening counts.
    pub observation_years: f64,
    pub discount_rate: f64,
    pub maintenance_cost: f64,
    pub blended_crash_cost: f64,
    pub crash_costs: CrashCostTable,
    pub cost_model: CostModelKind,
    pub fetch: FetchConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            excess_factor: DEFAULT_EXCESS_FACTOR,
            observation_years: 3.0,
            discount_rate: DEFAULT_DISCOUNT_RATE,
            maintenance_cost: DEFAULT_MAINTENANCE_COST,
            blended_crash_cost: DEFAULT_BLENDED_CRASH_COST,
            crash_costs: CrashCostTable::default(),
            cost_model: CostModelKind::default(),
            fetch: FetchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub endpoint: String,
    pub limit: u32,
    pub since: NaiveDate,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let query = CrashQuery::default();
        Self {
            endpoint: CHICAGO_CRASHES_ENDPOINT.to_string(),
            limit: query.limit,
            since: query.since,
            max_retries: 3,
            base_delay_ms: 500,
            timeout_secs: 30,
        }
    }
}

impl FetchConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
        }
    }

    pub fn query(&self) -> CrashQuery {
        CrashQuery {
            limit: self.limit,
            since: self.since,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl EngineConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Loads from `explicit` if given, else from `$ROAD_SAFETY_CONFIG` if
    /// set, else returns the defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn cost_model(&self) -> CrashCostModel {
        match self.cost_model {
            CostModelKind::SeverityWeighted => CrashCostModel::SeverityWeighted(self.crash_costs),
            CostModelKind::Blended => CrashCostModel::Blended {
                cost_per_crash: self.blended_crash_cost,
            },
        }
    }

    pub fn appraiser(&self) -> Appraiser {
        Appraiser::new(self.cost_model())
    }

    pub fn scorer(&self) -> ProportionalExcess {
        ProportionalExcess {
            factor: self.excess_factor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_empty_object_gives_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.top_n, 50);
        assert_eq!(config.fetch.limit, 1000);
        assert_eq!(config.fetch.since, NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
        assert_eq!(config.fetch.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_partial_override() {
        let config: EngineConfig = serde_json::from_str(
            r#"{
                "cost_model": "blended",
                "blended_crash_cost": 120000,
                "crash_costs": { "fatal": 12000000 },
                "fetch": { "limit": 250, "since": "2024-06-01" }
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.cost_model(),
            CrashCostModel::Blended {
                cost_per_crash: 120_000.0
            }
        );
        assert_eq!(config.crash_costs.fatal, 12_000_000.0);
        assert_eq!(config.crash_costs.incapacitating, 655_000.0);
        let query = config.fetch.query();
        assert_eq!(query.limit, 250);
        assert_eq!(query.since, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(config.fetch.max_retries, 3);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join("road_safety_rater_config_test.json");
        fs::write(&path, r#"{ "top_n": 10, "excess_factor": 0.2 }"#).unwrap();

        let config = EngineConfig::resolve(Some(&path)).unwrap();
        assert_eq!(config.top_n, 10);
        assert_eq!(config.scorer().factor, 0.2);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let path = std::env::temp_dir().join("road_safety_rater_no_such_config.json");
        assert!(EngineConfig::load(&path).is_err());
    }
}
