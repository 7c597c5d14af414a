//! Benefit-cost appraisal of a countermeasure portfolio at one site.
//!
//! Annual benefit is the crash cost avoided per year:
//! `(1 - combined CMF) * annual crash cost`. Benefits and maintenance are
//! discounted over the service life with the uniform-series present value
//! factor; construction is spent up front.

use crate::engine::types::{AppraisalResult, EconomicParams, Portfolio, SiteSummary};
use serde::{Deserialize, Serialize};

/// System-wide discount rate.
pub const DEFAULT_DISCOUNT_RATE: f64 = 0.04;

/// Blended cost of an average crash.
pub const DEFAULT_BLENDED_CRASH_COST: f64 = 150_000.0;

/// Service life used when no countermeasure has been selected.
pub const DEFAULT_SERVICE_LIFE: u32 = 20;

pub const DEFAULT_MAINTENANCE_COST: f64 = 1_000.0;

/// Combines the CMFs of a portfolio into one factor.
pub trait CmfCombiner: Send + Sync {
    fn combine(&self, cmfs: &[f64]) -> f64;
}

/// Unweighted product of every CMF. An empty portfolio combines to exactly 1.
///
/// Successive treatments at one site usually overlap, so this overstates
/// the effect of large portfolios.
#[derive(Debug, Clone, Copy, Default)]
pub struct Multiplicative;

impl CmfCombiner for Multiplicative {
    fn combine(&self, cmfs: &[f64]) -> f64 {
        cmfs.iter().product()
    }
}

/// Societal cost per crash by KABCO severity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashCostTable {
    /// K
    pub fatal: f64,
    /// A
    pub incapacitating: f64,
    /// B
    pub non_incapacitating: f64,
    /// C
    pub possible_injury: f64,
    /// O
    pub property_damage_only: f64,
}

impl Default for CrashCostTable {
    fn default() -> Self {
        Self {
            fatal: 11_200_000.0,
            incapacitating: 655_000.0,
            non_incapacitating: 198_000.0,
            possible_injury: 125_000.0,
            property_damage_only: 11_900.0,
        }
    }
}

impl CrashCostTable {
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            fatal: self.fatal * factor,
            incapacitating: self.incapacitating * factor,
            non_incapacitating: self.non_incapacitating * factor,
            possible_injury: self.possible_injury * factor,
            property_damage_only: self.property_damage_only * factor,
        }
    }
}

/// Crashes per year at a site, split by severity class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnualCrashFrequency {
    pub total: f64,
    pub fatal: f64,
    pub incapacitating: f64,
    pub other: f64,
}

impl AnnualCrashFrequency {
    /// Divides a site's counts by the observation window. A window that is
    /// not a positive number of years is read as one year.
    pub fn from_site(site: &SiteSummary, observation_years: f64) -> Self {
        let years = if observation_years.is_finite() && observation_years > 0.0 {
            observation_years
        } else {
            1.0
        };
        Self {
            total: f64::from(site.crashes) / years,
            fatal: f64::from(site.severity.k) / years,
            incapacitating: f64::from(site.severity.a) / years,
            other: f64::from(site.severity.b) / years,
        }
    }

    /// A frequency with no severity split; every crash counts as `other`.
    pub fn total_only(total: f64) -> Self {
        Self {
            total,
            fatal: 0.0,
            incapacitating: 0.0,
            other: total,
        }
    }
}

/// How crashes are priced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CrashCostModel {
    /// One average cost for every crash.
    Blended { cost_per_crash: f64 },
    /// Each severity class at its own unit cost. Class B ("other") is priced
    /// at the non-incapacitating rate.
    SeverityWeighted(CrashCostTable),
}

impl Default for CrashCostModel {
    fn default() -> Self {
        CrashCostModel::SeverityWeighted(CrashCostTable::default())
    }
}

impl CrashCostModel {
    /// Cost of one year of crashes at the given frequency.
    pub fn annual_cost(&self, frequency: &AnnualCrashFrequency) -> f64 {
        match self {
            CrashCostModel::Blended { cost_per_crash } => frequency.total * cost_per_crash,
            CrashCostModel::SeverityWeighted(table) => {
                frequency.fatal * table.fatal
                    + frequency.incapacitating * table.incapacitating
                    + frequency.other * table.non_incapacitating
            }
        }
    }
}

/// Uniform series present value factor:
/// `((1 + r)^n - 1) / (r * (1 + r)^n)`, and exactly `n` when `r == 0`.
pub fn uspv(rate: f64, years: u32) -> f64 {
    let n = f64::from(years);
    if rate == 0.0 {
        return n;
    }
    let growth = (1.0 + rate).powf(n);
    (growth - 1.0) / (rate * growth)
}

impl EconomicParams {
    /// Defaults derived from a portfolio: construction is the sum of unit
    /// costs and service life the longest life in the portfolio.
    pub fn from_portfolio(portfolio: &Portfolio, maintenance_cost: f64, discount_rate: f64) -> Self {
        Self {
            construction_cost: portfolio.total_cost(),
            maintenance_cost,
            service_life: portfolio.max_life().unwrap_or(DEFAULT_SERVICE_LIFE),
            discount_rate,
        }
    }
}

/// Runs benefit-cost analyses with a fixed CMF combination strategy and
/// crash cost model.
pub struct Appraiser {
    combiner: Box<dyn CmfCombiner>,
    cost_model: CrashCostModel,
}

impl Appraiser {
    pub fn new(cost_model: CrashCostModel) -> Self {
        Self {
            combiner: Box::new(Multiplicative),
            cost_model,
        }
    }

    pub fn with_combiner(self, combiner: impl CmfCombiner + 'static) -> Self {
        Self {
            combiner: Box::new(combiner),
            ..self
        }
    }

    /// Appraises `portfolio` against a site's annual crash frequency.
    ///
    /// Never fails: a zero discounted cost yields `bcr == None`.
    pub fn appraise(
        &self,
        frequency: &AnnualCrashFrequency,
        portfolio: &Portfolio,
        params: &EconomicParams,
    ) -> AppraisalResult {
        let combined_cmf = self.combiner.combine(&portfolio.cmfs());
        let crash_reduction_factor = 1.0 - combined_cmf;
        let annual_benefit = crash_reduction_factor * self.cost_model.annual_cost(frequency);

        let factor = uspv(params.discount_rate, params.service_life);
        let pv_benefit = annual_benefit * factor;
        let pv_maintenance = params.maintenance_cost * factor;
        let pv_cost = params.construction_cost + pv_maintenance;

        let bcr = if pv_cost > 0.0 {
            Some(pv_benefit / pv_cost)
        } else {
            None
        };

        AppraisalResult {
            combined_cmf,
            crash_reduction_factor,
            annual_benefit,
            uspv_factor: factor,
            pv_benefit,
            pv_maintenance,
            construction_cost: params.construction_cost,
            pv_cost,
            npv: pv_benefit - pv_cost,
            bcr,
        }
    }
}

impl Default for Appraiser {
    fn default() -> Self {
        Self::new(CrashCostModel::default())
    }
}
