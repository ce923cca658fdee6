// Third-party projection figures (projected points, minutes) keyed by the
// same normalized name scheme the slate uses, so consumers can join them.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::normalize::NameOverrides;

/// Columns the projection file must carry.
pub const REQUIRED_COLUMNS: [&str; 3] = ["Name", "Fpts", "Minutes"];

/// One merged projection. Values are passed through as text; a missing value
/// is an empty string.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectionRecord {
    pub shortname: String,
    pub proj: String,
    pub min: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("failed to read projection file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("projection file is missing column `{0}`")]
    MissingColumn(String),
}

#[derive(Debug, Deserialize)]
struct RawProjection {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Fpts", default)]
    fpts: String,
    #[serde(rename = "Minutes", default)]
    minutes: String,
}

/// Read projections, keeping the first row for each name key.
pub fn load_projections_from_reader<R: Read>(
    rdr: R,
    overrides: &NameOverrides,
) -> Result<Vec<ProjectionRecord>, ProjectionError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(rdr);
    let headers = reader.headers().map_err(|e| ProjectionError::Csv {
        path: "<reader>".into(),
        source: e,
    })?;
    if let Some(column) = REQUIRED_COLUMNS
        .iter()
        .find(|c| !headers.iter().any(|h| h == **c))
    {
        return Err(ProjectionError::MissingColumn(column.to_string()));
    }

    let mut seen = HashSet::new();
    let mut records = Vec::new();
    for result in reader.deserialize::<RawProjection>() {
        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                warn!("skipping malformed projection row: {}", e);
                continue;
            }
        };
        let shortname = overrides.key_for(&raw.name);
        if shortname.is_empty() {
            continue;
        }
        if !seen.insert(shortname.clone()) {
            debug!(%shortname, "duplicate projection row ignored");
            continue;
        }
        records.push(ProjectionRecord {
            shortname,
            proj: raw.fpts,
            min: raw.minutes,
        });
    }
    Ok(records)
}

pub fn load_projections(
    path: &Path,
    overrides: &NameOverrides,
) -> Result<Vec<ProjectionRecord>, ProjectionError> {
    let file = std::fs::File::open(path).map_err(|e| ProjectionError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    load_projections_from_reader(file, overrides).map_err(|e| match e {
        ProjectionError::Csv { source, .. } => ProjectionError::Csv {
            path: path.display().to_string(),
            source,
        },
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_first_row_per_key() {
        let csv_data = "\
Name,Team,Fpts,Minutes
Jalen Brunson,NYK,48.2,35
Jalen Brunson Jr.,NYK,10.0,5
Jayson Tatum,BOS,52.9,36.5";

        let records =
            load_projections_from_reader(csv_data.as_bytes(), &NameOverrides::default()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0],
            ProjectionRecord {
                shortname: "jalenbrunson".into(),
                proj: "48.2".into(),
                min: "35".into(),
            }
        );
        assert_eq!(records[1].shortname, "jaysontatum");
    }

    #[test]
    fn numeric_extra_columns_are_ignored() {
        let csv_data = "\
Name,Team,Salary,Fpts,Minutes
Jalen Brunson,NYK,9800,47.9,35.5
Jayson Tatum,BOS,10200,51.2,36";

        let records =
            load_projections_from_reader(csv_data.as_bytes(), &NameOverrides::default()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].shortname, "jalenbrunson");
        assert_eq!(records[0].proj, "47.9");
        assert_eq!(records[0].min, "35.5");
    }

    #[test]
    fn missing_values_render_as_empty_string() {
        let csv_data = "\
Name,Fpts,Minutes
Some Rookie,,
Another Guy,12.5,";

        let records =
            load_projections_from_reader(csv_data.as_bytes(), &NameOverrides::default()).unwrap();
        assert_eq!(records[0].proj, "");
        assert_eq!(records[0].min, "");
        assert_eq!(records[1].proj, "12.5");
        assert_eq!(records[1].min, "");
    }

    #[test]
    fn overrides_apply_to_projection_names() {
        let csv_data = "Name,Fpts,Minutes\nGG Jackson,20.1,28\n";
        let records =
            load_projections_from_reader(csv_data.as_bytes(), &NameOverrides::builtin()).unwrap();
        assert_eq!(records[0].shortname, "gregoryjackson");
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let csv_data = "Name,Fpts\nA,1\n";
        let err = load_projections_from_reader(csv_data.as_bytes(), &NameOverrides::default())
            .unwrap_err();
        match err {
            ProjectionError::MissingColumn(col) => assert_eq!(col, "Minutes"),
            other => panic!("expected MissingColumn, got: {other}"),
        }
    }
}
