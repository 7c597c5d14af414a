use anyhow::{Context, Result, bail};
use std::collections::HashSet;
use std::path::Path;

use crate::engine::types::{Countermeasure, Portfolio};

/// Countermeasures available for selection.
///
/// Loaded from a JSON array on disk:
/// ```json
/// [
///   { "id": "cmf_001", "name": "Install Traffic Signal", "cmf": 0.72,
///     "cost": 250000, "life": 20, "crash_type": "All" }
/// ]
/// ```
#[derive(Debug, Clone)]
pub struct CountermeasureCatalog {
    entries: Vec<Countermeasure>,
}

fn builtin_entry(id: &str, name: &str, cmf: f64, cost: f64, life: u32, crash_type: &str) -> Countermeasure {
    Countermeasure {
        id: id.to_string(),
        name: name.to_string(),
        cmf,
        cost,
        life,
        crash_type: crash_type.to_string(),
    }
}

impl CountermeasureCatalog {
    /// The five standard treatments shipped with the tool.
    pub fn builtin() -> Self {
        Self {
            entries: vec![
                builtin_entry("cmf_001", "Install Traffic Signal", 0.72, 250_000.0, 20, "All"),
                builtin_entry("cmf_002", "Convert to Roundabout", 0.65, 1_500_000.0, 25, "Injury"),
                builtin_entry("cmf_003", "Add Left Turn Lane", 0.81, 120_000.0, 15, "Rear End"),
                builtin_entry("cmf_004", "Install Street Lighting", 0.90, 45_000.0, 10, "Nighttime"),
                builtin_entry("cmf_005", "Install Rumble Strips", 0.85, 15_000.0, 7, "Run-off-road"),
            ],
        }
    }

    /// Builds a catalog after checking every entry.
    ///
    /// # Errors
    ///
    /// Fails on a duplicate id, a CMF outside (0, 1], a negative or
    /// non-finite cost, or a zero service life.
    pub fn from_entries(entries: Vec<Countermeasure>) -> Result<Self> {
        let mut seen = HashSet::new();
        for cm in &entries {
            if !seen.insert(cm.id.as_str()) {
                bail!("duplicate countermeasure id '{}'", cm.id);
            }
            if !(cm.cmf > 0.0 && cm.cmf <= 1.0) {
                bail!("countermeasure '{}' has CMF {} outside (0, 1]", cm.id, cm.cmf);
            }
            if !cm.cost.is_finite() || cm.cost < 0.0 {
                bail!("countermeasure '{}' has invalid cost {}", cm.id, cm.cost);
            }
            if cm.life == 0 {
                bail!("countermeasure '{}' has zero service life", cm.id);
            }
        }
        Ok(Self { entries })
    }

    /// Loads and validates a catalog from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading countermeasure catalog {}", path.display()))?;
        let entries: Vec<Countermeasure> = serde_json::from_str(&content)
            .with_context(|| format!("parsing countermeasure catalog {}", path.display()))?;
        Self::from_entries(entries).with_context(|| format!("validating {}", path.display()))
    }

    pub fn get(&self, id: &str) -> Option<&Countermeasure> {
        self.entries.iter().find(|c| c.id == id)
    }

    /// Case-insensitive substring match on name or target crash type.
    /// A blank term matches everything.
    pub fn search(&self, term: &str) -> Vec<&Countermeasure> {
        let term = term.trim().to_lowercase();
        self.entries
            .iter()
            .filter(|c| {
                term.is_empty()
                    || c.name.to_lowercase().contains(&term)
                    || c.crash_type.to_lowercase().contains(&term)
            })
            .collect()
    }

    /// Portfolio of the given ids, in the order given. Repeated ids are
    /// kept once.
    ///
    /// # Errors
    ///
    /// Fails if any id is not in the catalog.
    pub fn select<S: AsRef<str>>(&self, ids: &[S]) -> Result<Portfolio> {
        let mut portfolio = Portfolio::new();
        for id in ids {
            let id = id.as_ref();
            let cm = self
                .get(id)
                .with_context(|| format!("unknown countermeasure '{id}'"))?;
            portfolio.insert(cm.clone());
        }
        Ok(portfolio)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Countermeasure> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CountermeasureCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_builtin_lookup() {
        let catalog = CountermeasureCatalog::builtin();
        assert_eq!(catalog.len(), 5);
        let roundabout = catalog.get("cmf_002").unwrap();
        assert_eq!(roundabout.cmf, 0.65);
        assert_eq!(roundabout.cost, 1_500_000.0);
        assert_eq!(roundabout.life, 25);
        assert!(catalog.get("cmf_999").is_none());
    }

    #[test]
    fn test_search_matches_name_and_crash_type() {
        let catalog = CountermeasureCatalog::builtin();
        let hits: Vec<_> = catalog.search("LIGHT").iter().map(|c| c.id.as_str()).collect();
        assert_eq!(hits, vec!["cmf_004"]);
        let hits: Vec<_> = catalog.search("rear").iter().map(|c| c.id.as_str()).collect();
        assert_eq!(hits, vec!["cmf_003"]);
        assert_eq!(catalog.search("  ").len(), 5);
    }

    #[test]
    fn test_select_builds_portfolio() {
        let catalog = CountermeasureCatalog::builtin();
        let portfolio = catalog.select(&["cmf_001", "cmf_004", "cmf_001"]).unwrap();
        assert_eq!(portfolio.len(), 2);
        assert_eq!(portfolio.total_cost(), 295_000.0);
        assert_eq!(portfolio.max_life(), Some(20));

        let err = catalog.select(&["cmf_001", "nope"]).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_rejects_out_of_range_cmf() {
        let mut entries: Vec<_> = CountermeasureCatalog::builtin().iter().cloned().collect();
        entries[0].cmf = 1.2;
        assert!(CountermeasureCatalog::from_entries(entries).is_err());
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let mut entries: Vec<_> = CountermeasureCatalog::builtin().iter().cloned().collect();
        entries[1].id = "cmf_001".to_string();
        let err = CountermeasureCatalog::from_entries(entries).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join("road_safety_rater_catalog_test.json");
        fs::write(
            &path,
            r#"[{"id":"ped_01","name":"High-visibility Crosswalk","cmf":0.6,"cost":30000,"life":8,"crash_type":"Pedestrian"}]"#,
        )
        .unwrap();

        let catalog = CountermeasureCatalog::load(&path).unwrap();
        assert_eq!(catalog.len(), 1);
        assert!((catalog.get("ped_01").unwrap().reduction_percent() - 40.0).abs() < 1e-9);

        fs::remove_file(&path).ok();
    }
}
