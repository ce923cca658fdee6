// Canonical team and player identities, and CSV loaders for seeding them.

use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A league team. `abbreviation` is unique and is the join key for slate rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamIdentity {
    pub id: i64,
    pub full_name: String,
    pub abbreviation: String,
    pub nickname: String,
    pub city: String,
    pub state: String,
    pub year_founded: i32,
}

/// A player as known to the league's reference table. Ids are stable across
/// runs; historical (inactive) players stay in the set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerIdentity {
    pub id: i64,
    pub full_name: String,
    pub is_active: bool,
}

/// One team's row for one game, as the league's game-finder export lists it.
/// A game therefore appears once per team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    /// First digit is the season type: 1 preseason, 2 regular season,
    /// 3 all-star, 4 playoffs, 5 play-in.
    #[serde(rename = "SEASON_ID")]
    pub season_id: String,
    #[serde(rename = "TEAM_ID")]
    pub team_id: i64,
    #[serde(rename = "TEAM_ABBREVIATION")]
    pub team_abbreviation: String,
    #[serde(rename = "GAME_ID")]
    pub game_id: String,
    #[serde(rename = "GAME_DATE")]
    pub game_date: NaiveDate,
    #[serde(rename = "MATCHUP")]
    pub matchup: String,
    #[serde(rename = "WL", default)]
    pub wl: Option<String>,
    #[serde(rename = "PTS", default)]
    pub pts: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },
}

// ---------------------------------------------------------------------------
// Reader-based loaders
// ---------------------------------------------------------------------------

/// Teams with a blank abbreviation cannot be joined and are skipped.
pub fn load_teams_from_reader<R: Read>(rdr: R) -> Result<Vec<TeamIdentity>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut teams = Vec::new();
    for result in reader.deserialize::<TeamIdentity>() {
        match result {
            Ok(mut team) => {
                team.abbreviation = team.abbreviation.trim().to_uppercase();
                team.full_name = team.full_name.trim().to_string();
                if team.abbreviation.is_empty() {
                    warn!("skipping team {}: empty abbreviation", team.id);
                    continue;
                }
                teams.push(team);
            }
            Err(e) => warn!("skipping malformed team row: {}", e),
        }
    }
    Ok(teams)
}

pub fn load_players_from_reader<R: Read>(rdr: R) -> Result<Vec<PlayerIdentity>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut players = Vec::new();
    for result in reader.deserialize::<PlayerIdentity>() {
        match result {
            Ok(mut player) => {
                player.full_name = player.full_name.trim().to_string();
                players.push(player);
            }
            Err(e) => warn!("skipping malformed player row: {}", e),
        }
    }
    Ok(players)
}

/// Game rows without a game id cannot be keyed and are skipped.
pub fn load_games_from_reader<R: Read>(rdr: R) -> Result<Vec<GameRecord>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(rdr);
    let mut games = Vec::new();
    for result in reader.deserialize::<GameRecord>() {
        match result {
            Ok(mut game) => {
                if game.game_id.is_empty() {
                    warn!("skipping game row for team {}: empty game id", game.team_id);
                    continue;
                }
                game.team_abbreviation = game.team_abbreviation.to_uppercase();
                games.push(game);
            }
            Err(e) => warn!("skipping malformed game row: {}", e),
        }
    }
    Ok(games)
}

// ---------------------------------------------------------------------------
// Path-based loaders
// ---------------------------------------------------------------------------

pub fn load_teams(path: &Path) -> Result<Vec<TeamIdentity>, ReferenceError> {
    let file = std::fs::File::open(path).map_err(|e| ReferenceError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    load_teams_from_reader(file).map_err(|e| ReferenceError::Csv {
        path: path.display().to_string(),
        source: e,
    })
}

pub fn load_players(path: &Path) -> Result<Vec<PlayerIdentity>, ReferenceError> {
    let file = std::fs::File::open(path).map_err(|e| ReferenceError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    load_players_from_reader(file).map_err(|e| ReferenceError::Csv {
        path: path.display().to_string(),
        source: e,
    })
}

pub fn load_games(path: &Path) -> Result<Vec<GameRecord>, ReferenceError> {
    let file = std::fs::File::open(path).map_err(|e| ReferenceError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    load_games_from_reader(file).map_err(|e| ReferenceError::Csv {
        path: path.display().to_string(),
        source: e,
    })
}
