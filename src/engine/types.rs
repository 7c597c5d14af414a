//! Data types used by the safety analysis engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label given to crashes whose type was not reported.
pub const UNKNOWN_CRASH_TYPE: &str = "UNKNOWN";

/// A single reported collision, decoded from a raw row.
///
/// Numeric fields that could not be parsed are already `None` (or zero for
/// the injury counts) by the time a record reaches the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrashRecord {
    pub street_name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub street_no: Option<i64>,
    pub street_direction: Option<String>,
    pub fatalities: u32,
    pub incapacitating_injuries: u32,
    pub crash_type: String,
}

impl CrashRecord {
    /// Returns the record's position if both axes are finite and non-zero.
    ///
    /// Zero is treated as "missing": crash feeds commonly encode unknown
    /// positions as `0`, and no real site of interest sits on the equator or
    /// the prime meridian.
    pub fn coordinates(&self) -> Option<Coordinate> {
        let lat = self.latitude?;
        let lng = self.longitude?;
        if !lat.is_finite() || !lng.is_finite() || lat == 0.0 || lng == 0.0 {
            return None;
        }
        Some(Coordinate { lat, lng })
    }

    /// Classifies the record into exactly one severity class.
    ///
    /// First match wins: a crash with both fatalities and incapacitating
    /// injuries is `Fatal` only.
    pub fn severity(&self) -> Severity {
        if self.fatalities > 0 {
            Severity::Fatal
        } else if self.incapacitating_injuries > 0 {
            Severity::Incapacitating
        } else {
            Severity::Other
        }
    }

    /// Crash type label, with blanks mapped to [`UNKNOWN_CRASH_TYPE`].
    pub fn crash_type_label(&self) -> &str {
        let label = self.crash_type.trim();
        if label.is_empty() {
            UNKNOWN_CRASH_TYPE
        } else {
            label
        }
    }
}

/// KABCO-style severity class used for screening (K, A, and everything else).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// K
    Fatal,
    /// A
    Incapacitating,
    /// B and below
    Other,
}

/// Crash counts per severity class. `total()` always equals the number of
/// crashes classified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub k: u32,
    pub a: u32,
    pub b: u32,
}

impl SeverityCounts {
    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Fatal => self.k = self.k.saturating_add(1),
            Severity::Incapacitating => self.a = self.a.saturating_add(1),
            Severity::Other => self.b = self.b.saturating_add(1),
        }
    }

    pub fn total(&self) -> u32 {
        self.k.saturating_add(self.a).saturating_add(self.b)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

/// Lowest and highest positive street number seen at a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRange {
    pub min: i64,
    pub max: i64,
}

impl AddressRange {
    pub fn include(range: Option<Self>, number: i64) -> Option<Self> {
        if number <= 0 {
            return range;
        }
        Some(match range {
            None => AddressRange {
                min: number,
                max: number,
            },
            Some(r) => AddressRange {
                min: r.min.min(number),
                max: r.max.max(number),
            },
        })
    }
}

/// Per-site crash summary produced by one aggregation pass.
///
/// `rank` is `None` until the site has been ranked. Updates go through the
/// `with_*` constructors, which return a modified copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteSummary {
    pub id: String,
    pub name: String,
    pub direction: String,
    pub crashes: u32,
    pub fatalities: u32,
    pub incapacitating_injuries: u32,
    pub severity: SeverityCounts,
    pub crash_types: BTreeMap<String, u32>,
    pub centroid: Coordinate,
    pub coord_count: u32,
    pub address_range: Option<AddressRange>,
    pub excess: f64,
    pub rank: Option<u32>,
}

impl SiteSummary {
    /// `"<direction> <street> (<min>-<max>)"`, trimmed. The range is left
    /// out when no street number was observed.
    pub fn display_name(&self) -> String {
        let label = match self.address_range {
            Some(range) => format!(
                "{} {} ({}-{})",
                self.direction, self.name, range.min, range.max
            ),
            None => format!("{} {}", self.direction, self.name),
        };
        label.trim().to_string()
    }

    /// The crash type with the highest count, ties going to the
    /// alphabetically first label.
    pub fn dominant_crash_type(&self) -> Option<(&str, u32)> {
        self.crash_types
            .iter()
            .fold(None, |best: Option<(&str, u32)>, (label, &count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((label.as_str(), count)),
            })
    }

    pub fn with_excess(self, excess: f64) -> Self {
        Self { excess, ..self }
    }

    pub fn with_rank(self, rank: u32) -> Self {
        Self {
            rank: Some(rank),
            ..self
        }
    }
}

/// A treatment that can be applied to a site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Countermeasure {
    pub id: String,
    pub name: String,
    /// Fraction of crashes expected to remain after treatment, in (0, 1].
    pub cmf: f64,
    /// Unit capital cost.
    pub cost: f64,
    /// Service life in years.
    pub life: u32,
    /// Crash type the treatment targets.
    pub crash_type: String,
}

impl Countermeasure {
    /// Percent of crashes removed, `(1 - cmf) * 100`.
    pub fn reduction_percent(&self) -> f64 {
        (1.0 - self.cmf) * 100.0
    }
}

/// Ordered set of countermeasures selected for one site. Ids are unique.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    items: Vec<Countermeasure>,
}

impl Portfolio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a portfolio, keeping the first occurrence of each id.
    pub fn from_countermeasures(items: impl IntoIterator<Item = Countermeasure>) -> Self {
        let mut portfolio = Self::new();
        for item in items {
            portfolio.insert(item);
        }
        portfolio
    }

    /// Appends `cm` unless its id is already present. Returns whether it was added.
    pub fn insert(&mut self, cm: Countermeasure) -> bool {
        if self.contains(&cm.id) {
            return false;
        }
        self.items.push(cm);
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<Countermeasure> {
        let pos = self.items.iter().position(|c| c.id == id)?;
        Some(self.items.remove(pos))
    }

    /// Adds `cm` if absent, removes it if present.
    pub fn toggle(&mut self, cm: Countermeasure) {
        if self.remove(&cm.id).is_none() {
            self.items.push(cm);
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.iter().any(|c| c.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Countermeasure> {
        self.items.iter()
    }

    pub fn cmfs(&self) -> Vec<f64> {
        self.items.iter().map(|c| c.cmf).collect()
    }

    pub fn total_cost(&self) -> f64 {
        self.items.iter().map(|c| c.cost).sum()
    }

    pub fn max_life(&self) -> Option<u32> {
        self.items.iter().map(|c| c.life).max()
    }
}

/// User-entered economic inputs for one appraisal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EconomicParams {
    pub construction_cost: f64,
    /// Annual maintenance cost.
    pub maintenance_cost: f64,
    /// Years.
    pub service_life: u32,
    pub discount_rate: f64,
}

/// Output of the benefit-cost appraiser.
///
/// `bcr` is `None` when the discounted cost is zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AppraisalResult {
    pub combined_cmf: f64,
    pub crash_reduction_factor: f64,
    pub annual_benefit: f64,
    pub uspv_factor: f64,
    pub pv_benefit: f64,
    pub pv_maintenance: f64,
    pub construction_cost: f64,
    pub pv_cost: f64,
    pub npv: f64,
    pub bcr: Option<f64>,
}

/// A candidate project for prioritization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    /// Capital cost charged against the budget.
    pub cost: f64,
    pub bcr: Option<f64>,
    pub npv: f64,
    #[serde(default)]
    pub location: Option<Coordinate>,
}

impl Project {
    pub fn from_appraisal(id: &str, name: &str, appraisal: &AppraisalResult) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            cost: appraisal.construction_cost,
            bcr: appraisal.bcr,
            npv: appraisal.npv,
            location: None,
        }
    }

    pub fn at(self, location: Coordinate) -> Self {
        Self {
            location: Some(location),
            ..self
        }
    }
}

/// A project tagged funded or deferred by one prioritization run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FundingDecision {
    pub project: Project,
    /// 1-based position in priority order.
    pub priority: usize,
    pub funded: bool,
    /// Running total the funding test was made against.
    pub cumulative_cost: f64,
}

/// Before/after comparison for a treated site.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Effectiveness {
    pub before_rate: f64,
    pub after_rate: f64,
    /// Positive means fewer crashes per year after treatment.
    pub reduction: f64,
    /// `None` when the before rate is zero.
    pub percent_reduction: Option<f64>,
}

impl Effectiveness {
    pub fn is_improvement(&self) -> bool {
        self.reduction > 0.0
    }
}
