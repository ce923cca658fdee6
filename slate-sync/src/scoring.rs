// Fantasy scoring for a single player's game line: double-double,
// triple-double and the weighted FPTS total.

use serde::{Deserialize, Serialize};

/// A category counts toward a double when it reaches this value.
pub const DOUBLE_THRESHOLD: u32 = 10;

/// Boxscore counting stats used by the scoring formula. Absent stats are
/// zero, not an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StatLine {
    pub points: u32,
    pub rebounds_total: u32,
    pub assists: u32,
    pub steals: u32,
    pub blocks: u32,
    pub turnovers: u32,
    pub three_pointers_made: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FantasyScore {
    pub dd: bool,
    pub td: bool,
    pub fpts: f64,
}

/// Number of {points, rebounds, assists, steals, blocks} at or above
/// [`DOUBLE_THRESHOLD`].
pub fn double_categories(line: &StatLine) -> usize {
    [
        line.points,
        line.rebounds_total,
        line.assists,
        line.steals,
        line.blocks,
    ]
    .into_iter()
    .filter(|&v| v >= DOUBLE_THRESHOLD)
    .count()
}

pub fn score(line: &StatLine) -> FantasyScore {
    let doubles = double_categories(line);
    let dd = doubles >= 2;
    let td = doubles >= 3;

    let fpts = f64::from(line.points)
        + f64::from(line.three_pointers_made) * 0.5
        + f64::from(line.rebounds_total) * 1.25
        + f64::from(line.assists) * 1.5
        + f64::from(line.steals) * 2.0
        + f64::from(line.blocks) * 2.0
        - f64::from(line.turnovers) * 0.5
        + if dd { 1.5 } else { 0.0 }
        + if td { 3.0 } else { 0.0 };

    FantasyScore { dd, td, fpts }
}
