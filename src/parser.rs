//! Decoding of raw crash rows into [`CrashRecord`]s.
//!
//! Crash feeds are loose about types: the same column may hold `"2"`, `2`,
//! `"2.0"`, `""` or `null`. Each field is decoded on its own, and a field
//! that does not parse contributes nothing instead of failing the row.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::engine::types::{CrashRecord, UNKNOWN_CRASH_TYPE};
use crate::engine::utility::{parse_count, parse_decimal, parse_integer};

/// One crash row as published by the Chicago Data Portal, fields untyped.
#[derive(Debug, Default, Deserialize)]
pub struct RawCrashRow {
    #[serde(default)]
    pub street_name: Option<Value>,
    #[serde(default)]
    pub latitude: Option<Value>,
    #[serde(default)]
    pub longitude: Option<Value>,
    #[serde(default)]
    pub street_no: Option<Value>,
    #[serde(default)]
    pub street_direction: Option<Value>,
    #[serde(default)]
    pub injuries_fatal: Option<Value>,
    #[serde(default)]
    pub injuries_incapacitating: Option<Value>,
    #[serde(default)]
    pub first_crash_type: Option<Value>,
}

fn text(value: &Option<Value>) -> Option<String> {
    let text = match value.as_ref()? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn decimal(value: &Option<Value>) -> Option<f64> {
    match value.as_ref()? {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_decimal(s),
        _ => None,
    }
}

fn integer(value: &Option<Value>) -> Option<i64> {
    match value.as_ref()? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|v| v.trunc() as i64)),
        Value::String(s) => parse_integer(s),
        _ => None,
    }
}

fn count(value: &Option<Value>) -> u32 {
    match value {
        Some(Value::String(s)) => parse_count(s),
        _ => integer(value)
            .filter(|n| *n > 0)
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
            .unwrap_or(0),
    }
}

impl RawCrashRow {
    pub fn into_record(self) -> CrashRecord {
        CrashRecord {
            street_name: text(&self.street_name).unwrap_or_default(),
            latitude: decimal(&self.latitude),
            longitude: decimal(&self.longitude),
            street_no: integer(&self.street_no),
            street_direction: text(&self.street_direction),
            fatalities: count(&self.injuries_fatal),
            incapacitating_injuries: count(&self.injuries_incapacitating),
            crash_type: text(&self.first_crash_type)
                .unwrap_or_else(|| UNKNOWN_CRASH_TYPE.to_string()),
        }
    }
}

/// Serialization format of a crash batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    /// A JSON array of row objects.
    Json,
    /// CSV with a header row.
    Csv,
}

impl RecordFormat {
    /// JSON if the payload starts with `[`, CSV otherwise.
    pub fn sniff(bytes: &[u8]) -> Self {
        match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'[') => RecordFormat::Json,
            _ => RecordFormat::Csv,
        }
    }
}

/// Decodes a JSON array of crash rows. Array elements that are not objects
/// are skipped.
///
/// # Errors
///
/// Returns an error if the payload is not a JSON array.
pub fn parse_crashes_json(bytes: &[u8]) -> Result<Vec<CrashRecord>> {
    let rows: Vec<Value> =
        serde_json::from_slice(bytes).context("crash payload is not a JSON array")?;

    let mut records = Vec::with_capacity(rows.len());
    let mut skipped = 0usize;
    for row in rows {
        match serde_json::from_value::<RawCrashRow>(row) {
            Ok(raw) => records.push(raw.into_record()),
            Err(e) => {
                skipped += 1;
                debug!(error = %e, "Skipping crash row that is not an object");
            }
        }
    }

    if skipped > 0 {
        warn!(skipped, kept = records.len(), "Some crash rows could not be read");
    }
    Ok(records)
}

/// Decodes CSV crash rows. Columns are matched by header name; unknown
/// columns are ignored.
///
/// # Errors
///
/// Returns an error if the CSV itself is malformed.
pub fn parse_crashes_csv(bytes: &[u8]) -> Result<Vec<CrashRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let mut records = Vec::new();
    for result in rdr.deserialize() {
        let raw: RawCrashRow = result.context("malformed CSV crash row")?;
        records.push(raw.into_record());
    }
    Ok(records)
}

/// Decodes a crash batch in either supported format.
///
/// # Errors
///
/// Returns an error if the payload is not valid JSON or CSV.
pub fn parse_crashes(bytes: &[u8]) -> Result<Vec<CrashRecord>> {
    match RecordFormat::sniff(bytes) {
        RecordFormat::Json => parse_crashes_json(bytes),
        RecordFormat::Csv => parse_crashes_csv(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_socrata_rows() {
        let payload = br#"[
            {"street_name": "WESTERN AVE", "latitude": "41.88", "longitude": "-87.68",
             "street_no": "2400", "street_direction": "N", "injuries_fatal": "0",
             "injuries_incapacitating": "1", "first_crash_type": "ANGLE"},
            {"street_name": "WESTERN AVE", "latitude": 41.9, "longitude": -87.69,
             "injuries_fatal": 2}
        ]"#;

        let records = parse_crashes_json(payload).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.street_name, "WESTERN AVE");
        assert_eq!(first.latitude, Some(41.88));
        assert_eq!(first.street_no, Some(2400));
        assert_eq!(first.street_direction.as_deref(), Some("N"));
        assert_eq!(first.incapacitating_injuries, 1);
        assert_eq!(first.crash_type, "ANGLE");

        let second = &records[1];
        assert_eq!(second.fatalities, 2);
        assert_eq!(second.street_no, None);
        assert_eq!(second.crash_type, UNKNOWN_CRASH_TYPE);
    }

    #[test]
    fn test_malformed_fields_do_not_fail_the_row() {
        let payload = br#"[{"street_name": "KEDZIE AVE", "latitude": "north",
            "longitude": null, "street_no": "n/a", "injuries_fatal": "many",
            "injuries_incapacitating": -3}]"#;

        let records = parse_crashes_json(payload).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.latitude, None);
        assert_eq!(record.longitude, None);
        assert_eq!(record.street_no, None);
        assert_eq!(record.fatalities, 0);
        assert_eq!(record.incapacitating_injuries, 0);
    }

    #[test]
    fn test_non_object_rows_are_skipped() {
        let records = parse_crashes_json(br#"[1, "x", {"street_name": "ELSTON AVE"}]"#).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_non_array_payload_is_an_error() {
        assert!(parse_crashes_json(br#"{"error": "rate limited"}"#).is_err());
    }

    #[test]
    fn test_parse_csv_rows() {
        let payload = b"crash_record_id,street_name,latitude,longitude,street_no,injuries_fatal,injuries_incapacitating,first_crash_type\n\
                        a1,IRVING PARK RD,41.95,-87.72,3900,0,0,REAR END\n\
                        a2,IRVING PARK RD,,,,1,,PEDESTRIAN\n";

        let records = parse_crashes(payload).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].street_no, Some(3900));
        assert_eq!(records[0].latitude, Some(41.95));
        assert_eq!(records[1].latitude, None);
        assert_eq!(records[1].fatalities, 1);
        assert_eq!(records[1].crash_type, "PEDESTRIAN");
    }

    #[test]
    fn test_sniff_format() {
        assert_eq!(RecordFormat::sniff(b"  \n[{}]"), RecordFormat::Json);
        assert_eq!(RecordFormat::sniff(b"street_name\nX"), RecordFormat::Csv);
    }

    #[test]
    fn test_empty_array() {
        assert!(parse_crashes(b"[]").unwrap().is_empty());
    }
}
