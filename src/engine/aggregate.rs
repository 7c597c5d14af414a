use crate::engine::rank::{ExcessScorer, rank_sites};
use crate::engine::types::{
    AddressRange, Coordinate, CrashRecord, Severity, SeverityCounts, SiteSummary,
};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Default number of sites kept after ranking.
pub const DEFAULT_TOP_N: usize = 50;

/// Groups crashes by their street name. Records without one are not
/// attributed to any site.
pub fn by_street_name(record: &CrashRecord) -> Option<String> {
    let name = record.street_name.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Running totals for one site while records are consumed.
struct SiteAccumulator {
    key: String,
    direction: String,
    crashes: u32,
    fatalities: u32,
    incapacitating_injuries: u32,
    severity: SeverityCounts,
    crash_types: BTreeMap<String, u32>,
    lat_sum: f64,
    lng_sum: f64,
    coord_count: u32,
    address_range: Option<AddressRange>,
}

impl SiteAccumulator {
    fn new(key: String, record: &CrashRecord) -> Self {
        Self {
            key,
            direction: record.street_direction.clone().unwrap_or_default(),
            crashes: 0,
            fatalities: 0,
            incapacitating_injuries: 0,
            severity: SeverityCounts::default(),
            crash_types: BTreeMap::new(),
            lat_sum: 0.0,
            lng_sum: 0.0,
            coord_count: 0,
            address_range: None,
        }
    }

    fn add(&mut self, record: &CrashRecord) {
        self.crashes = self.crashes.saturating_add(1);

        if let Some(Coordinate { lat, lng }) = record.coordinates() {
            self.lat_sum += lat;
            self.lng_sum += lng;
            self.coord_count = self.coord_count.saturating_add(1);
            if let Some(number) = record.street_no {
                self.address_range = AddressRange::include(self.address_range, number);
            }
        }

        let severity = record.severity();
        self.severity.record(severity);
        match severity {
            Severity::Fatal => {
                self.fatalities = self.fatalities.saturating_add(record.fatalities)
            }
            Severity::Incapacitating => {
                self.incapacitating_injuries = self
                    .incapacitating_injuries
                    .saturating_add(record.incapacitating_injuries)
            }
            Severity::Other => {}
        }

        let count = self
            .crash_types
            .entry(record.crash_type_label().to_string())
            .or_default();
        *count = count.saturating_add(1);
    }

    /// `None` when no record at this site had usable coordinates.
    fn finish(self) -> Option<SiteSummary> {
        if self.coord_count == 0 {
            return None;
        }
        let count = f64::from(self.coord_count);
        Some(SiteSummary {
            id: self.key.clone(),
            name: self.key,
            direction: self.direction,
            crashes: self.crashes,
            fatalities: self.fatalities,
            incapacitating_injuries: self.incapacitating_injuries,
            severity: self.severity,
            crash_types: self.crash_types,
            centroid: Coordinate {
                lat: self.lat_sum / count,
                lng: self.lng_sum / count,
            },
            coord_count: self.coord_count,
            address_range: self.address_range,
            excess: 0.0,
            rank: None,
        })
    }
}

/// Groups crash records into per-site summaries.
///
/// Sites come back in the order their first record appeared. Sites with no
/// valid coordinates are dropped. Summaries are unscored and unranked; see
/// [`screen`] for the full screening pass.
pub fn aggregate_sites<K>(records: &[CrashRecord], key: K) -> Vec<SiteSummary>
where
    K: Fn(&CrashRecord) -> Option<String>,
{
    let mut order: Vec<SiteAccumulator> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut unattributed = 0usize;

    for record in records {
        let Some(site_key) = key(record) else {
            unattributed += 1;
            continue;
        };

        let slot = match index.get(&site_key) {
            Some(&slot) => slot,
            None => {
                index.insert(site_key.clone(), order.len());
                order.push(SiteAccumulator::new(site_key, record));
                order.len() - 1
            }
        };
        order[slot].add(record);
    }

    let groups = order.len();
    let sites: Vec<SiteSummary> = order.into_iter().filter_map(SiteAccumulator::finish).collect();

    debug!(
        records = records.len(),
        unattributed,
        groups,
        located = sites.len(),
        "Crash records aggregated"
    );

    sites
}

/// Runs one screening pass: aggregate, score, order, truncate to `top_n`,
/// and assign ranks 1..=N.
pub fn screen<K>(
    records: &[CrashRecord],
    key: K,
    scorer: &dyn ExcessScorer,
    top_n: usize,
) -> Vec<SiteSummary>
where
    K: Fn(&CrashRecord) -> Option<String>,
{
    rank_sites(aggregate_sites(records, key), scorer, top_n)
}
