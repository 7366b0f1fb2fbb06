use json::object;
use tracing::{info, warn};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyCount {
    pub name: String,
    pub matched: usize,
    pub unmatched: usize,
}

/// Counts describing one generation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationSummary {
    pub macro_elements: usize,
    pub placements: usize,
    pub cell_parts: usize,
    pub instances: usize,
    pub coupling_equations: usize,
    pub periodicity_equations: usize,
    /// Per-instance pairing results of the primary part.
    pub families: Vec<FamilyCount>,
    pub skipped_records: usize,
}

impl GenerationSummary {
    pub fn matched_pairs(&self) -> usize {
        self.families.iter().map(|f| f.matched).sum()
    }

    pub fn unmatched_nodes(&self) -> usize {
        self.families.iter().map(|f| f.unmatched).sum()
    }

    pub fn total_equations(&self) -> usize {
        self.coupling_equations + self.periodicity_equations
    }

    pub fn log(&self) {
        info!(
            "{} macro elements, {} integration points, {} unit-cell instances",
            self.macro_elements, self.placements, self.instances
        );
        info!(
            "{} equations ({} coupling, {} periodicity)",
            self.total_equations(),
            self.coupling_equations,
            self.periodicity_equations
        );
        info!(
            "{} periodic pairs per cell ({} unmatched)",
            self.matched_pairs(),
            self.unmatched_nodes()
        );
        if self.skipped_records > 0 {
            warn!("{} malformed record(s) skipped", self.skipped_records);
        }
    }

    pub fn to_json(&self) -> json::JsonValue {
        let families = json::JsonValue::Array(
            self.families
                .iter()
                .map(|family| {
                    object! {
                        name: family.name.as_str(),
                        matched: family.matched,
                        unmatched: family.unmatched,
                    }
                })
                .collect(),
        );

        object! {
            macro_elements: self.macro_elements,
            integration_points: self.placements,
            cell_parts: self.cell_parts,
            instances: self.instances,
            coupling_equations: self.coupling_equations,
            periodicity_equations: self.periodicity_equations,
            matched_pairs: self.matched_pairs(),
            unmatched_nodes: self.unmatched_nodes(),
            skipped_records: self.skipped_records,
            families: families,
        }
    }

    /// Writes the summary as pretty-printed json
    ///
    /// # Arguments
    /// * `path` - The output path
    pub fn write_json(&self, path: &str) -> Result<()> {
        std::fs::write(path, self.to_json().pretty(2))?;
        info!("wrote summary to {path}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> GenerationSummary {
        GenerationSummary {
            macro_elements: 2,
            placements: 2,
            cell_parts: 2,
            instances: 4,
            coupling_equations: 48,
            periodicity_equations: 60,
            families: vec![
                FamilyCount {
                    name: "FACE_XN-FACE_XP".to_owned(),
                    matched: 4,
                    unmatched: 0,
                },
                FamilyCount {
                    name: "EDGE_X_Y0_Z0-EDGE_X_Y1_Z0".to_owned(),
                    matched: 1,
                    unmatched: 1,
                },
            ],
            skipped_records: 3,
        }
    }

    #[test]
    fn test_totals() {
        let s = summary();
        assert_eq!(s.matched_pairs(), 5);
        assert_eq!(s.unmatched_nodes(), 1);
        assert_eq!(s.total_equations(), 108);
    }

    #[test]
    fn test_write_json_failure_is_io() {
        let dir = std::env::temp_dir().join(format!("directfe2-absent-{}", std::process::id()));
        let path = dir.join("summary.json");
        assert!(!dir.exists());
        let result = summary().write_json(&path.to_string_lossy());
        assert!(matches!(result, Err(crate::error::CouplerError::Io(_))));
    }

    #[test]
    fn test_json_shape() {
        let value = summary().to_json();
        assert_eq!(value["instances"].as_usize(), Some(4));
        assert_eq!(value["coupling_equations"].as_usize(), Some(48));
        assert_eq!(value["families"].len(), 2);
        assert_eq!(value["families"][1]["unmatched"].as_usize(), Some(1));

        let reparsed = json::parse(&value.dump()).unwrap();
        assert_eq!(reparsed, value);
    }
}
