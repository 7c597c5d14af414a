//! Output formatting and persistence for analysis results.
//!
//! Supports pretty-printing, JSON files, and CSV append. Nested engine
//! types are flattened into row structs before they reach the CSV writer.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::types::{Coordinate, FundingDecision, Project, SiteSummary};
use csv::WriterBuilder;
use std::fmt::Debug;
use std::fs::OpenOptions;
use std::path::Path;

/// Logs a value using Rust's debug pretty-print format.
pub fn print_pretty(value: &impl Debug) {
    debug!("{:#?}", value);
}

/// Logs a value as pretty-printed JSON.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Writes `value` as pretty-printed JSON to `path`, replacing any existing file.
pub fn write_json(path: impl AsRef<Path>, value: &impl Serialize) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_vec_pretty(value)?;
    std::fs::write(path, body).with_context(|| format!("writing {}", path.display()))?;
    debug!(path = %path.display(), "JSON written");
    Ok(())
}

/// Appends one record as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record(path: impl AsRef<Path>, record: &impl Serialize) -> Result<()> {
    write_records(path, std::slice::from_ref(record))
}

/// Appends every record as a row to a CSV file, writing the header only
/// when the file is new.
pub fn write_records<T: Serialize>(path: impl AsRef<Path>, records: &[T]) -> Result<()> {
    let path = path.as_ref();
    if records.is_empty() {
        debug!(path = %path.display(), "No CSV records to append");
        return Ok(());
    }
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, rows = records.len(), "Appending CSV records");

    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    Ok(())
}

/// One screened site as a flat CSV row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteRow {
    pub rank: Option<u32>,
    pub id: String,
    pub display_name: String,
    pub crashes: u32,
    pub fatalities: u32,
    pub incapacitating_injuries: u32,
    pub k: u32,
    pub a: u32,
    pub b: u32,
    pub excess: f64,
    pub dominant_crash_type: Option<String>,
    pub lat: f64,
    pub lng: f64,
}

impl From<&SiteSummary> for SiteRow {
    fn from(site: &SiteSummary) -> Self {
        Self {
            rank: site.rank,
            id: site.id.clone(),
            display_name: site.display_name(),
            crashes: site.crashes,
            fatalities: site.fatalities,
            incapacitating_injuries: site.incapacitating_injuries,
            k: site.severity.k,
            a: site.severity.a,
            b: site.severity.b,
            excess: site.excess,
            dominant_crash_type: site.dominant_crash_type().map(|(label, _)| label.to_string()),
            lat: site.centroid.lat,
            lng: site.centroid.lng,
        }
    }
}

/// A prioritization candidate as a flat CSV row. Also the input format for
/// `prioritize`: an empty `bcr` cell means the ratio is undefined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRow {
    pub id: String,
    pub name: String,
    pub cost: f64,
    pub bcr: Option<f64>,
    #[serde(default)]
    pub npv: f64,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        let location = match (row.lat, row.lng) {
            (Some(lat), Some(lng)) => Some(Coordinate { lat, lng }),
            _ => None,
        };
        Project {
            id: row.id,
            name: row.name,
            cost: row.cost,
            bcr: row.bcr,
            npv: row.npv,
            location,
        }
    }
}

impl From<&Project> for ProjectRow {
    fn from(project: &Project) -> Self {
        Self {
            id: project.id.clone(),
            name: project.name.clone(),
            cost: project.cost,
            bcr: project.bcr,
            npv: project.npv,
            lat: project.location.map(|c| c.lat),
            lng: project.location.map(|c| c.lng),
        }
    }
}

/// Reads prioritization candidates from a CSV file of [`ProjectRow`]s.
pub fn load_projects(path: impl AsRef<Path>) -> Result<Vec<Project>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let mut projects = Vec::new();
    for (line, row) in reader.deserialize::<ProjectRow>().enumerate() {
        let row = row.with_context(|| format!("{} row {}", path.display(), line + 1))?;
        projects.push(row.into());
    }
    Ok(projects)
}

/// One funding decision as a flat CSV row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionRow {
    pub priority: usize,
    pub id: String,
    pub name: String,
    pub cost: f64,
    pub bcr: Option<f64>,
    pub npv: f64,
    pub funded: bool,
    pub cumulative_cost: f64,
}

impl From<&FundingDecision> for DecisionRow {
    fn from(decision: &FundingDecision) -> Self {
        Self {
            priority: decision.priority,
            id: decision.project.id.clone(),
            name: decision.project.name.clone(),
            cost: decision.project.cost,
            bcr: decision.project.bcr,
            npv: decision.project.npv,
            funded: decision.funded,
            cumulative_cost: decision.cumulative_cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    fn temp_path(name: &str) -> String {
        format!("{}/{}", env::temp_dir().display(), name)
    }

    fn row(id: &str) -> ProjectRow {
        ProjectRow {
            id: id.to_string(),
            name: format!("{id} corridor"),
            cost: 120_000.0,
            bcr: Some(2.5),
            npv: 180_000.0,
            lat: None,
            lng: None,
        }
    }

    #[test]
    fn test_print_pretty_does_not_panic() {
        print_pretty(&row("MAIN ST"));
    }

    #[test]
    fn test_print_json_does_not_panic() {
        print_json(&row("MAIN ST")).unwrap();
    }

    #[test]
    fn test_append_record_creates_file() {
        let path = temp_path("road_safety_rater_test_create.csv");
        let _ = fs::remove_file(&path);

        append_record(&path, &row("MAIN ST")).unwrap();

        assert!(Path::new(&path).exists());
        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.is_empty());

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_append_record_writes_header_once() {
        let path = temp_path("road_safety_rater_test_header.csv");
        let _ = fs::remove_file(&path);

        append_record(&path, &row("MAIN ST")).unwrap();
        append_record(&path, &row("ELM ST")).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let header_count = content.lines().filter(|l| l.starts_with("id,")).count();
        assert_eq!(header_count, 1);
        assert_eq!(content.lines().count(), 3);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_empty_write_leaves_header_for_first_rows() {
        let path = temp_path("road_safety_rater_test_empty_first.csv");
        let _ = fs::remove_file(&path);

        write_records::<ProjectRow>(&path, &[]).unwrap();
        assert!(!Path::new(&path).exists());

        append_record(&path, &row("MAIN ST")).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("id,"));
        assert_eq!(content.lines().count(), 2);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_projects_round_trip_through_csv() {
        let path = temp_path("road_safety_rater_test_projects.csv");
        let _ = fs::remove_file(&path);

        let mut undefined = row("FREE ST");
        undefined.bcr = None;
        undefined.cost = 0.0;
        write_records(&path, &[row("MAIN ST"), undefined]).unwrap();

        let projects = load_projects(&path).unwrap();
        assert_eq!(projects.len(), 2);
        assert_eq!(projects[0].bcr, Some(2.5));
        assert_eq!(projects[1].bcr, None);
        assert_eq!(projects[1].cost, 0.0);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_projects_without_optional_columns() {
        let path = temp_path("road_safety_rater_test_minimal_projects.csv");
        fs::write(&path, "id,name,cost,bcr\np1,Signal,250000,3.1\np2,Lighting,45000,\n").unwrap();

        let projects = load_projects(&path).unwrap();
        assert_eq!(projects[0].cost, 250_000.0);
        assert_eq!(projects[1].bcr, None);
        assert_eq!(projects[1].npv, 0.0);
        assert!(projects[1].location.is_none());

        fs::remove_file(&path).unwrap();
    }
}
