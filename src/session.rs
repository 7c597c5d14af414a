//! Analysis state carried between workflow steps, and the screening runner.
//!
//! [`AnalysisRun`] is owned by the caller and passed into each step; every
//! update returns a new value. [`ScreeningSession`] allows one outstanding
//! fetch at a time: starting a run aborts the previous one and only the
//! latest run's result is ever returned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::engine::aggregate::{DEFAULT_TOP_N, by_street_name, screen};
use crate::engine::appraisal::{AnnualCrashFrequency, Appraiser};
use crate::engine::rank::{ExcessScorer, ProportionalExcess};
use crate::engine::types::{
    AppraisalResult, Countermeasure, CrashRecord, EconomicParams, Portfolio, Project, SiteSummary,
};
use crate::fetch::FetchError;
use crate::services::crash_source::{CrashQuery, CrashSource, DataProvenance};

/// Ranked sites from one screening run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningReport {
    pub generated_at: DateTime<Utc>,
    pub provenance: DataProvenance,
    pub record_count: usize,
    pub sites: Vec<SiteSummary>,
}

impl ScreeningReport {
    pub fn site(&self, id: &str) -> Option<&SiteSummary> {
        self.sites.iter().find(|s| s.id == id)
    }
}

/// How crashes are grouped, scored, and truncated.
#[derive(Clone)]
pub struct ScreeningSettings {
    pub key: fn(&CrashRecord) -> Option<String>,
    pub scorer: Arc<dyn ExcessScorer>,
    pub top_n: usize,
}

impl Default for ScreeningSettings {
    fn default() -> Self {
        Self {
            key: by_street_name,
            scorer: Arc::new(ProportionalExcess::default()),
            top_n: DEFAULT_TOP_N,
        }
    }
}

impl ScreeningSettings {
    pub fn run(&self, records: &[CrashRecord]) -> Vec<SiteSummary> {
        screen(records, self.key, self.scorer.as_ref(), self.top_n)
    }
}

/// Outcome of [`ScreeningSession::run`].
#[derive(Debug, Clone)]
pub enum ScreeningOutcome {
    Completed(ScreeningReport),
    /// A newer run started before this one finished; its data was dropped.
    Superseded,
}

/// Runs screenings against one crash source, latest run wins.
pub struct ScreeningSession {
    source: Arc<dyn CrashSource>,
    settings: ScreeningSettings,
    generation: AtomicU64,
    in_flight: Mutex<Option<AbortHandle>>,
}

impl ScreeningSession {
    pub fn new(source: Arc<dyn CrashSource>, settings: ScreeningSettings) -> Self {
        Self {
            source,
            settings,
            generation: AtomicU64::new(0),
            in_flight: Mutex::new(None),
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Fetches crashes and screens them.
    ///
    /// Starting a run aborts any fetch still in flight from an earlier
    /// run; that earlier call then returns [`ScreeningOutcome::Superseded`],
    /// as does a run whose fetch finished after a newer run began.
    ///
    /// # Errors
    ///
    /// Returns the source's [`FetchError`] if this run is still current
    /// when the fetch fails.
    #[tracing::instrument(skip(self), fields(source = self.source.name()))]
    pub async fn run(&self, query: CrashQuery) -> Result<ScreeningOutcome, FetchError> {
        // generation order and handle install order must agree
        let (generation, handle) = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let source = Arc::clone(&self.source);
            let handle = tokio::spawn(async move { source.fetch_crashes(&query).await });
            if let Some(previous) = in_flight.replace(handle.abort_handle()) {
                debug!(generation, "Aborting superseded screening fetch");
                previous.abort();
            }
            (generation, handle)
        };

        let fetched = match handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => {
                info!(generation, "Screening run superseded");
                return Ok(ScreeningOutcome::Superseded);
            }
            Err(e) => Err(FetchError::Task(e.to_string())),
        };

        if !self.is_current(generation) {
            info!(generation, "Discarding stale screening result");
            return Ok(ScreeningOutcome::Superseded);
        }

        let batch = fetched?;
        if !batch.provenance.is_live() {
            warn!(provenance = batch.provenance.label(), "Screening on non-live data");
        }

        let sites = self.settings.run(&batch.records);
        info!(
            records = batch.records.len(),
            sites = sites.len(),
            provenance = batch.provenance.label(),
            "Screening complete"
        );

        Ok(ScreeningOutcome::Completed(ScreeningReport {
            generated_at: Utc::now(),
            provenance: batch.provenance,
            record_count: batch.records.len(),
            sites,
        }))
    }
}

/// Everything decided so far in one safety analysis: which sites were
/// picked from screening, what was proposed for each, and how it appraised.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisRun {
    pub id: String,
    pub name: String,
    pub analysis_year: i32,
    selected_sites: Vec<String>,
    sites: HashMap<String, SiteSummary>,
    portfolios: HashMap<String, Portfolio>,
    appraisals: HashMap<String, AppraisalResult>,
}

impl AnalysisRun {
    pub fn new(id: impl Into<String>, name: impl Into<String>, analysis_year: i32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            analysis_year,
            ..Default::default()
        }
    }

    pub fn selected_sites(&self) -> &[String] {
        &self.selected_sites
    }

    pub fn site(&self, id: &str) -> Option<&SiteSummary> {
        self.sites.get(id)
    }

    /// The empty portfolio if nothing was proposed for `site_id`.
    pub fn portfolio(&self, site_id: &str) -> Portfolio {
        self.portfolios.get(site_id).cloned().unwrap_or_default()
    }

    pub fn appraisal(&self, site_id: &str) -> Option<&AppraisalResult> {
        self.appraisals.get(site_id)
    }

    /// Adds a site to the selection (once) and stores its latest summary.
    pub fn with_site_selected(self, site: SiteSummary) -> Self {
        let mut selected_sites = self.selected_sites;
        if !selected_sites.contains(&site.id) {
            selected_sites.push(site.id.clone());
        }
        let mut sites = self.sites;
        sites.insert(site.id.clone(), site);
        Self {
            selected_sites,
            sites,
            ..self
        }
    }

    /// Adds `cm` to the site's portfolio, or removes it if already there.
    /// Any stored appraisal for the site is dropped since it no longer
    /// matches the portfolio.
    pub fn with_countermeasure_toggled(self, site_id: &str, cm: Countermeasure) -> Self {
        let mut portfolios = self.portfolios;
        portfolios.entry(site_id.to_string()).or_default().toggle(cm);
        let mut appraisals = self.appraisals;
        appraisals.remove(site_id);
        Self {
            portfolios,
            appraisals,
            ..self
        }
    }

    pub fn with_appraisal(self, site_id: &str, appraisal: AppraisalResult) -> Self {
        let mut appraisals = self.appraisals;
        appraisals.insert(site_id.to_string(), appraisal);
        Self { appraisals, ..self }
    }

    /// Appraises the site's current portfolio and stores the result.
    /// Returns the run unchanged if the site was never selected.
    pub fn appraise_site(
        self,
        site_id: &str,
        appraiser: &Appraiser,
        params: &EconomicParams,
        observation_years: f64,
    ) -> Self {
        let Some(site) = self.sites.get(site_id) else {
            warn!(site_id, "Cannot appraise a site that was not selected");
            return self;
        };
        let frequency = AnnualCrashFrequency::from_site(site, observation_years);
        let appraisal = appraiser.appraise(&frequency, &self.portfolio(site_id), params);
        self.with_appraisal(site_id, appraisal)
    }

    /// Selected sites that have an appraisal, as prioritization candidates,
    /// in selection order.
    pub fn projects(&self) -> Vec<Project> {
        self.selected_sites
            .iter()
            .filter_map(|id| {
                let appraisal = self.appraisals.get(id)?;
                let site = self.sites.get(id)?;
                Some(Project::from_appraisal(id, &site.display_name(), appraisal).at(site.centroid))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::appraisal::CrashCostModel;
    use crate::services::crash_source::CrashBatch;
    use async_trait::async_trait;
    use std::time::Duration;

    fn crash(street: &str) -> CrashRecord {
        CrashRecord {
            street_name: street.to_string(),
            latitude: Some(41.88),
            longitude: Some(-87.63),
            ..Default::default()
        }
    }

    /// Answers after `delay` with crashes on `street`.
    struct Delayed {
        delay: Duration,
        street: &'static str,
    }

    #[async_trait]
    impl CrashSource for Delayed {
        fn name(&self) -> &str {
            "delayed"
        }

        async fn fetch_crashes(&self, _query: &CrashQuery) -> Result<CrashBatch, FetchError> {
            tokio::time::sleep(self.delay).await;
            Ok(CrashBatch::new(
                vec![crash(self.street), crash(self.street)],
                DataProvenance::Live {
                    source: "test".to_string(),
                },
            ))
        }
    }

    /// First call is slow, later calls are immediate.
    struct SlowThenFast {
        calls: AtomicU64,
    }

    #[async_trait]
    impl CrashSource for SlowThenFast {
        fn name(&self) -> &str {
            "slow-then-fast"
        }

        async fn fetch_crashes(&self, _query: &CrashQuery) -> Result<CrashBatch, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let street = if call == 0 {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "STALE ST"
            } else {
                "FRESH ST"
            };
            Ok(CrashBatch::new(vec![crash(street)], DataProvenance::Mock))
        }
    }

    #[tokio::test]
    async fn test_single_run_completes() {
        let session = ScreeningSession::new(
            Arc::new(Delayed {
                delay: Duration::from_millis(1),
                street: "LAKE SHORE DR",
            }),
            ScreeningSettings::default(),
        );

        match session.run(CrashQuery::default()).await.unwrap() {
            ScreeningOutcome::Completed(report) => {
                assert_eq!(report.record_count, 2);
                assert_eq!(report.sites.len(), 1);
                assert_eq!(report.site("LAKE SHORE DR").unwrap().rank, Some(1));
            }
            ScreeningOutcome::Superseded => panic!("run should complete"),
        }
    }

    #[tokio::test]
    async fn test_newer_run_supersedes_older() {
        let session = Arc::new(ScreeningSession::new(
            Arc::new(SlowThenFast {
                calls: AtomicU64::new(0),
            }),
            ScreeningSettings::default(),
        ));

        let first = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.run(CrashQuery::default()).await })
        };
        // let the first run start its fetch
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = session.run(CrashQuery::default()).await.unwrap();
        let first = first.await.unwrap().unwrap();

        assert!(matches!(first, ScreeningOutcome::Superseded));
        match second {
            ScreeningOutcome::Completed(report) => {
                assert_eq!(report.sites[0].id, "FRESH ST");
            }
            ScreeningOutcome::Superseded => panic!("latest run must win"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_runs_keep_the_latest() {
        let session = Arc::new(ScreeningSession::new(
            Arc::new(Delayed {
                delay: Duration::from_millis(100),
                street: "PULASKI RD",
            }),
            ScreeningSettings::default(),
        ));

        for _ in 0..10 {
            let runs: Vec<_> = (0..4)
                .map(|_| {
                    let session = Arc::clone(&session);
                    tokio::spawn(async move { session.run(CrashQuery::default()).await })
                })
                .collect();

            let mut completed = 0;
            for run in runs {
                if let ScreeningOutcome::Completed(_) = run.await.unwrap().unwrap() {
                    completed += 1;
                }
            }
            assert!(completed >= 1, "every concurrent run was discarded");
        }
    }

    fn cm(id: &str, cmf: f64, cost: f64) -> Countermeasure {
        Countermeasure {
            id: id.to_string(),
            name: id.to_string(),
            cmf,
            cost,
            life: 20,
            crash_type: "All".to_string(),
        }
    }

    fn ranked_site(id: &str, crashes: u32) -> SiteSummary {
        let records: Vec<_> = (0..crashes).map(|_| crash(id)).collect();
        ScreeningSettings::default().run(&records).remove(0)
    }

    #[test]
    fn test_selecting_twice_keeps_one_entry() {
        let run = AnalysisRun::new("proj_001", "District 1 Safety Audit", 2025)
            .with_site_selected(ranked_site("MAIN ST", 3))
            .with_site_selected(ranked_site("MAIN ST", 4));
        assert_eq!(run.selected_sites(), ["MAIN ST".to_string()]);
        assert_eq!(run.site("MAIN ST").unwrap().crashes, 4);
    }

    #[test]
    fn test_updates_leave_the_source_run_unchanged() {
        let base = AnalysisRun::new("p", "p", 2025).with_site_selected(ranked_site("ELM ST", 6));
        let changed = base
            .clone()
            .with_countermeasure_toggled("ELM ST", cm("cmf_004", 0.9, 45_000.0));
        assert!(base.portfolio("ELM ST").is_empty());
        assert_eq!(changed.portfolio("ELM ST").len(), 1);
    }

    #[test]
    fn test_toggle_invalidates_appraisal() {
        let params = EconomicParams {
            construction_cost: 45_000.0,
            maintenance_cost: 0.0,
            service_life: 10,
            discount_rate: 0.04,
        };
        let appraiser = Appraiser::new(CrashCostModel::Blended {
            cost_per_crash: 150_000.0,
        });
        let run = AnalysisRun::new("p", "p", 2025)
            .with_site_selected(ranked_site("ELM ST", 6))
            .with_countermeasure_toggled("ELM ST", cm("cmf_004", 0.9, 45_000.0))
            .appraise_site("ELM ST", &appraiser, &params, 3.0);
        assert!(run.appraisal("ELM ST").is_some());

        let run = run.with_countermeasure_toggled("ELM ST", cm("cmf_005", 0.85, 15_000.0));
        assert!(run.appraisal("ELM ST").is_none());
    }

    #[test]
    fn test_projects_from_appraised_sites() {
        let params = EconomicParams {
            construction_cost: 250_000.0,
            maintenance_cost: 1_000.0,
            service_life: 20,
            discount_rate: 0.04,
        };
        let appraiser = Appraiser::default();
        let run = AnalysisRun::new("p", "p", 2025)
            .with_site_selected(ranked_site("MAIN ST", 9))
            .with_site_selected(ranked_site("ELM ST", 3))
            .with_countermeasure_toggled("MAIN ST", cm("cmf_001", 0.72, 250_000.0))
            .appraise_site("MAIN ST", &appraiser, &params, 3.0)
            .appraise_site("NOWHERE", &appraiser, &params, 3.0);

        let projects = run.projects();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].id, "MAIN ST");
        assert_eq!(projects[0].cost, 250_000.0);
        assert!(projects[0].bcr.unwrap() > 0.0);
        assert!(projects[0].location.is_some());
    }
}
