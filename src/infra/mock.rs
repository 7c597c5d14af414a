//! Built-in demonstration crash dataset.

use async_trait::async_trait;

use crate::engine::types::CrashRecord;
use crate::fetch::FetchError;
use crate::services::crash_source::{CrashBatch, CrashQuery, CrashSource, DataProvenance};

/// One demonstration corridor and the crashes generated along it.
struct MockCorridor {
    street: &'static str,
    direction: &'static str,
    lat: f64,
    lng: f64,
    first_number: i64,
    crashes: u32,
    fatal: u32,
    incapacitating: u32,
    types: &'static [&'static str],
}

const CORRIDORS: &[MockCorridor] = &[
    MockCorridor {
        street: "MAIN ST",
        direction: "N",
        lat: 40.7128,
        lng: -74.0060,
        first_number: 100,
        crashes: 15,
        fatal: 1,
        incapacitating: 4,
        types: &["REAR END", "ANGLE", "SIDESWIPE SAME DIRECTION"],
    },
    MockCorridor {
        street: "BROADWAY",
        direction: "",
        lat: 40.7138,
        lng: -74.0040,
        first_number: 1000,
        crashes: 8,
        fatal: 0,
        incapacitating: 1,
        types: &["PEDESTRIAN", "REAR END"],
    },
    MockCorridor {
        street: "ELM ST",
        direction: "W",
        lat: 40.7148,
        lng: -74.0010,
        first_number: 200,
        crashes: 12,
        fatal: 0,
        incapacitating: 2,
        types: &["TURNING", "ANGLE"],
    },
    MockCorridor {
        street: "STATE HWY 9",
        direction: "",
        lat: 40.7158,
        lng: -74.0080,
        first_number: 10000,
        crashes: 45,
        fatal: 2,
        incapacitating: 6,
        types: &["REAR END", "FIXED OBJECT", "SIDESWIPE SAME DIRECTION", "HEAD ON"],
    },
    MockCorridor {
        street: "COUNTY RD 45",
        direction: "S",
        lat: 40.7118,
        lng: -74.0090,
        first_number: 4500,
        crashes: 5,
        fatal: 0,
        incapacitating: 0,
        types: &["ANGLE"],
    },
];

/// Expands the corridors into individual crash records. Deterministic.
pub fn mock_crashes() -> Vec<CrashRecord> {
    let mut records = Vec::new();
    for corridor in CORRIDORS {
        for i in 0..corridor.crashes {
            let offset = f64::from(i) * 0.0001;
            let (fatalities, incapacitating_injuries) = if i < corridor.fatal {
                (1, 0)
            } else if i < corridor.fatal + corridor.incapacitating {
                (0, 1)
            } else {
                (0, 0)
            };
            records.push(CrashRecord {
                street_name: corridor.street.to_string(),
                latitude: Some(corridor.lat + offset),
                longitude: Some(corridor.lng - offset),
                street_no: Some(corridor.first_number + i64::from(i) * 10),
                street_direction: if corridor.direction.is_empty() {
                    None
                } else {
                    Some(corridor.direction.to_string())
                },
                fatalities,
                incapacitating_injuries,
                crash_type: corridor.types[i as usize % corridor.types.len()].to_string(),
            });
        }
    }
    records
}

/// Serves [`mock_crashes`], labelled [`DataProvenance::Mock`]. The query's
/// limit is honoured; its date filter is not.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockCrashSource;

#[async_trait]
impl CrashSource for MockCrashSource {
    fn name(&self) -> &str {
        "built-in demonstration data"
    }

    async fn fetch_crashes(&self, query: &CrashQuery) -> Result<CrashBatch, FetchError> {
        let mut records = mock_crashes();
        records.truncate(query.limit as usize);
        Ok(CrashBatch::new(records, DataProvenance::Mock))
    }
}
