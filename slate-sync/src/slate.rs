// Contest salary slate: raw CSV rows, reconciled entries, and the canonical
// column naming used for storage and for the slate-data response.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::warn;

// ---------------------------------------------------------------------------
// Inbound file
// ---------------------------------------------------------------------------

/// Column headers the salary export must provide.
pub const INBOUND_COLUMNS: [&str; 9] = [
    "Position",
    "Name + ID",
    "Name",
    "ID",
    "Roster Position",
    "Salary",
    "Game Info",
    "TeamAbbrev",
    "AvgPointsPerGame",
];

/// One row of the salary export, exactly as the contest site writes it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SalaryRow {
    #[serde(rename = "Position")]
    pub position: String,
    #[serde(rename = "Name + ID")]
    pub name_id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "ID")]
    pub dk_id: String,
    #[serde(rename = "Roster Position")]
    pub roster_position: String,
    #[serde(rename = "Salary")]
    pub salary: i64,
    #[serde(rename = "Game Info")]
    pub game_info: String,
    #[serde(rename = "TeamAbbrev")]
    pub team_abbrev: String,
    #[serde(rename = "AvgPointsPerGame")]
    pub avg_points_per_game: f64,
    /// 1-based data-row position in the source file; 0 for rows built in
    /// memory.
    #[serde(skip)]
    pub line: usize,
}

impl SalaryRow {
    /// First empty required field, if any.
    fn missing_field(&self) -> Option<&'static str> {
        [
            ("Position", &self.position),
            ("Name + ID", &self.name_id),
            ("Name", &self.name),
            ("ID", &self.dk_id),
            ("Roster Position", &self.roster_position),
            ("Game Info", &self.game_info),
            ("TeamAbbrev", &self.team_abbrev),
        ]
        .into_iter()
        .find(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SlateFileError {
    #[error("failed to read slate file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("slate file {path} is missing column `{column}`")]
    MissingColumn { path: String, column: String },
}

/// A row excluded from a slate run, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowIssue {
    /// 1-based data-row position in the input.
    pub row: usize,
    pub name: String,
    pub reason: String,
}

/// A loaded salary file: the usable rows plus the rows rejected while
/// reading it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SalarySheet {
    pub rows: Vec<SalaryRow>,
    pub rejected: Vec<RowIssue>,
}

/// Read salary rows. Rows with empty or unparseable cells are skipped with a
/// warning and reported in `rejected`.
pub fn load_salary_rows_from_reader<R: Read>(rdr: R) -> Result<SalarySheet, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(rdr);
    let mut sheet = SalarySheet::default();
    let mut record = csv::StringRecord::new();
    let headers = reader.headers()?.clone();
    let name_col = headers.iter().position(|h| h == "Name");

    let mut line = 0;
    while reader.read_record(&mut record)? {
        line += 1;
        let name = name_col
            .and_then(|i| record.get(i))
            .unwrap_or_default()
            .to_string();
        let reason = match record.deserialize::<SalaryRow>(Some(&headers)) {
            Ok(mut row) => match row.missing_field() {
                None => {
                    row.line = line;
                    sheet.rows.push(row);
                    continue;
                }
                Some(field) => format!("empty `{field}`"),
            },
            Err(e) => e.to_string(),
        };
        warn!(line, name = %name, "skipping salary row: {}", reason);
        sheet.rejected.push(RowIssue {
            row: line,
            name,
            reason,
        });
    }
    Ok(sheet)
}

/// Load a salary slate file after checking that all required columns exist.
pub fn load_salary_rows(path: &Path) -> Result<SalarySheet, SlateFileError> {
    let display = path.display().to_string();
    let file = std::fs::File::open(path).map_err(|e| SlateFileError::Io {
        path: display.clone(),
        source: e,
    })?;

    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);
    let headers = reader.headers().map_err(|e| SlateFileError::Csv {
        path: display.clone(),
        source: e,
    })?;
    if let Some(column) = INBOUND_COLUMNS
        .iter()
        .find(|c| !headers.iter().any(|h| h == **c))
    {
        return Err(SlateFileError::MissingColumn {
            path: display,
            column: column.to_string(),
        });
    }

    let file = std::fs::File::open(path).map_err(|e| SlateFileError::Io {
        path: display.clone(),
        source: e,
    })?;
    load_salary_rows_from_reader(file).map_err(|e| SlateFileError::Csv {
        path: display,
        source: e,
    })
}

/// Location of the salary file for a slate, e.g. `data/slates/sal-Main.csv`.
pub fn slate_path(dir: &Path, pattern: &str, slate_id: &str) -> PathBuf {
    dir.join(pattern.replace("{slate_id}", slate_id))
}

// ---------------------------------------------------------------------------
// Canonical columns
// ---------------------------------------------------------------------------

/// Storage column name for an inbound header: lowercase, no spaces, no '+'.
pub fn canonical_column(header: &str) -> String {
    header
        .chars()
        .filter(|c| *c != ' ' && *c != '+')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Columns the pipeline adds after the inbound ones.
const DERIVED_COLUMNS: [&str; 8] = [
    "datetime",
    "opp",
    "team_id",
    "opp_team_id",
    "shortname",
    "player_id",
    "game_date",
    "slateid",
];

/// Columns of the `slate_entries` table, in declaration order: the inbound
/// headers in canonical form, then the derived columns.
pub static SLATE_COLUMNS: LazyLock<Vec<String>> = LazyLock::new(|| {
    INBOUND_COLUMNS
        .iter()
        .map(|h| canonical_column(h))
        .chain(DERIVED_COLUMNS.iter().map(|c| c.to_string()))
        .collect()
});

// ---------------------------------------------------------------------------
// Reconciled entry
// ---------------------------------------------------------------------------

/// A salary row after schedule parsing and identity resolution. This is what
/// gets persisted, one row per (player, game date, slate).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlateEntry {
    pub position: String,
    #[serde(rename = "nameid")]
    pub name_id: String,
    pub name: String,
    #[serde(rename = "id")]
    pub dk_id: String,
    #[serde(rename = "rosterposition")]
    pub roster_position: String,
    pub salary: i64,
    #[serde(rename = "gameinfo")]
    pub game_info: String,
    #[serde(rename = "teamabbrev")]
    pub team_abbrev: String,
    #[serde(rename = "avgpointspergame")]
    pub avg_points_per_game: f64,
    #[serde(rename = "datetime")]
    pub tipoff: DateTime<FixedOffset>,
    pub opp: String,
    pub team_id: Option<i64>,
    pub opp_team_id: Option<i64>,
    pub shortname: String,
    pub player_id: Option<i64>,
    pub game_date: NaiveDate,
    #[serde(rename = "slateid")]
    pub slate_id: String,
}

impl SlateEntry {
    /// Flat `column -> text` record; absent ids render as an empty string
    /// rather than null so consumers never see a null marker.
    pub fn to_record(&self) -> serde_json::Map<String, serde_json::Value> {
        let opt = |v: Option<i64>| v.map(|n| n.to_string()).unwrap_or_default();
        let values = [
            self.position.clone(),
            self.name_id.clone(),
            self.name.clone(),
            self.dk_id.clone(),
            self.roster_position.clone(),
            self.salary.to_string(),
            self.game_info.clone(),
            self.team_abbrev.clone(),
            self.avg_points_per_game.to_string(),
            self.tipoff.to_rfc3339(),
            self.opp.clone(),
            opt(self.team_id),
            opt(self.opp_team_id),
            self.shortname.clone(),
            opt(self.player_id),
            self.game_date.format("%Y-%m-%d").to_string(),
            self.slate_id.clone(),
        ];
        SLATE_COLUMNS
            .iter()
            .zip(values)
            .map(|(col, v)| (col.clone(), serde_json::Value::String(v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "Position,Name + ID,Name,ID,Roster Position,Salary,Game Info,TeamAbbrev,AvgPointsPerGame";

    #[test]
    fn salary_csv_loads() {
        let csv_data = format!(
            "{HEADER}\n\
PG,Jalen Brunson (36381234),Jalen Brunson,36381234,PG/G/UTIL,9800,BOS@NYK 03/14/2025 7:30PM ET,NYK,48.25\n\
C,Kristaps Porzingis (36381240),Kristaps Porzingis,36381240,C/UTIL,7200,BOS@NYK 03/14/2025 7:30PM ET,BOS,36.1"
        );

        let sheet = load_salary_rows_from_reader(csv_data.as_bytes()).unwrap();
        let rows = &sheet.rows;
        assert_eq!(rows.len(), 2);
        assert!(sheet.rejected.is_empty());
        assert_eq!(rows[0].line, 1);
        assert_eq!(rows[1].line, 2);
        assert_eq!(rows[0].name, "Jalen Brunson");
        assert_eq!(rows[0].dk_id, "36381234");
        assert_eq!(rows[0].salary, 9800);
        assert_eq!(rows[0].roster_position, "PG/G/UTIL");
        assert!((rows[0].avg_points_per_game - 48.25).abs() < f64::EPSILON);
        assert_eq!(rows[1].team_abbrev, "BOS");
    }

    #[test]
    fn extra_columns_ignored() {
        let csv_data = format!(
            "{HEADER},Notes\n\
PG,A B (1),A B,1,PG/UTIL,3000,BOS@NYK 03/14/2025 7:30PM ET,NYK,10.0,questionable"
        );
        let sheet = load_salary_rows_from_reader(csv_data.as_bytes()).unwrap();
        assert_eq!(sheet.rows.len(), 1);
    }

    #[test]
    fn rows_with_blank_cells_are_rejected_with_reason() {
        let csv_data = format!(
            "{HEADER}\n\
PG,A B (1),A B,1,PG/UTIL,3000,,NYK,10.0\n\
PG,C D (2),C D,2,PG/UTIL,,BOS@NYK 03/14/2025 7:30PM ET,NYK,10.0\n\
SG,E F (3),E F,3,SG/UTIL,3100,BOS@NYK 03/14/2025 7:30PM ET,BOS,11.5"
        );
        let sheet = load_salary_rows_from_reader(csv_data.as_bytes()).unwrap();
        assert_eq!(sheet.rows.len(), 1);
        assert_eq!(sheet.rows[0].name, "E F");
        assert_eq!(sheet.rows[0].line, 3);

        assert_eq!(sheet.rejected.len(), 2);
        assert_eq!(sheet.rejected[0].row, 1);
        assert_eq!(sheet.rejected[0].name, "A B");
        assert_eq!(sheet.rejected[0].reason, "empty `Game Info`");
        assert_eq!(sheet.rejected[1].row, 2);
        assert_eq!(sheet.rejected[1].name, "C D");
    }

    #[test]
    fn canonical_columns_match_declared_schema() {
        assert_eq!(SLATE_COLUMNS.len(), 17);
        assert_eq!(&SLATE_COLUMNS[..4], ["position", "nameid", "name", "id"]);
        assert_eq!(SLATE_COLUMNS[8], "avgpointspergame");
        assert_eq!(SLATE_COLUMNS[9], "datetime");
        assert_eq!(SLATE_COLUMNS[16], "slateid");
        assert_eq!(canonical_column("Roster Position"), "rosterposition");
    }

    #[test]
    fn slate_path_substitutes_id() {
        let p = slate_path(Path::new("data"), "sal-{slate_id}.csv", "Turbo1");
        assert_eq!(p, PathBuf::from("data/sal-Turbo1.csv"));
    }

    #[test]
    fn missing_column_detected() {
        let dir = std::env::temp_dir().join(format!("slate_missing_col_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sal-x.csv");
        std::fs::write(&path, "Position,Name,ID\nPG,A,1\n").unwrap();

        let err = load_salary_rows(&path).unwrap_err();
        match err {
            SlateFileError::MissingColumn { column, .. } => assert_eq!(column, "Name + ID"),
            other => panic!("expected MissingColumn, got: {other}"),
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn record_renders_missing_ids_as_empty_string() {
        let entry = SlateEntry {
            position: "PG".into(),
            name_id: "A B (1)".into(),
            name: "A B".into(),
            dk_id: "1".into(),
            roster_position: "PG/UTIL".into(),
            salary: 3000,
            game_info: "BOS@NYK 03/14/2025 7:30PM ET".into(),
            team_abbrev: "NYK".into(),
            avg_points_per_game: 10.5,
            tipoff: DateTime::parse_from_rfc3339("2025-03-14T19:30:00-04:00").unwrap(),
            opp: "BOS".into(),
            team_id: Some(1610612752),
            opp_team_id: None,
            shortname: "ab".into(),
            player_id: None,
            game_date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            slate_id: "Main".into(),
        };
        let record = entry.to_record();
        assert_eq!(record.len(), SLATE_COLUMNS.len());
        assert_eq!(record["player_id"], "");
        assert_eq!(record["opp_team_id"], "");
        assert_eq!(record["team_id"], "1610612752");
        assert_eq!(record["game_date"], "2025-03-14");
        assert!(record.values().all(|v| !v.is_null()));
    }
}
