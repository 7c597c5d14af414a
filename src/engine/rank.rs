//! Screening scores and site ranking.

use crate::engine::types::SiteSummary;
use crate::engine::utility::round_to;
use std::cmp::Ordering;

/// Default multiplier for [`ProportionalExcess`].
pub const DEFAULT_EXCESS_FACTOR: f64 = 0.15;

/// Scores a site's "excess expected crashes". Higher is more urgent.
///
/// Implement this to swap in a predictive method (e.g. an SPF-based
/// Empirical Bayes estimate); [`rank_sites`] orders by whatever score it
/// returns.
pub trait ExcessScorer: Send + Sync {
    fn score(&self, site: &SiteSummary) -> f64;
}

/// `excess = crashes * factor`, rounded to two decimals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProportionalExcess {
    pub factor: f64,
}

impl Default for ProportionalExcess {
    fn default() -> Self {
        Self {
            factor: DEFAULT_EXCESS_FACTOR,
        }
    }
}

impl ExcessScorer for ProportionalExcess {
    fn score(&self, site: &SiteSummary) -> f64 {
        round_to(f64::from(site.crashes) * self.factor, 2)
    }
}

/// Observed crashes minus a fixed expected count per site. Negative scores
/// mean the site performs better than expected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservedOverExpected {
    pub expected: f64,
}

impl ExcessScorer for ObservedOverExpected {
    fn score(&self, site: &SiteSummary) -> f64 {
        round_to(f64::from(site.crashes) - self.expected, 2)
    }
}

/// Orders two scored sites: score descending, then crash count descending.
/// Equal sites compare `Equal`, so a stable sort keeps input order.
fn priority_order(a: &SiteSummary, b: &SiteSummary) -> Ordering {
    b.excess
        .total_cmp(&a.excess)
        .then_with(|| b.crashes.cmp(&a.crashes))
}

/// Scores every site, sorts by priority, keeps the first `top_n` and
/// assigns ranks `1..=n` in that order.
pub fn rank_sites(
    sites: Vec<SiteSummary>,
    scorer: &dyn ExcessScorer,
    top_n: usize,
) -> Vec<SiteSummary> {
    let mut scored: Vec<SiteSummary> = sites
        .into_iter()
        .map(|site| {
            let excess = scorer.score(&site);
            site.with_excess(excess)
        })
        .collect();

    scored.sort_by(priority_order);
    scored.truncate(top_n);

    scored
        .into_iter()
        .zip(1u32..)
        .map(|(site, rank)| site.with_rank(rank))
        .collect()
}
