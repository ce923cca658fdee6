// Boxscore ingestion: fetch per-game player lines from the league's live
// data feed, score them, and store them in `player_box`.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::scoring::{score, FantasyScore, StatLine};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// One player's line in one game.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxscorePlayerStat {
    pub game_id: String,
    pub person_id: i64,
    pub name: String,
    pub team: String,
    pub position: Option<String>,
    pub starter: bool,
    pub played: bool,
    pub minutes: Option<String>,
    pub stats: StatLine,
}

/// A boxscore line with its derived DD/TD/FPTS. The score is always computed
/// from `player.stats`, never stored on its own.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPlayerLine {
    pub player: BoxscorePlayerStat,
    pub score: FantasyScore,
}

impl ScoredPlayerLine {
    pub fn from_stat(player: BoxscorePlayerStat) -> Self {
        Self {
            score: score(&player.stats),
            player,
        }
    }
}

/// Both teams' player lines for one game, away team first.
#[derive(Debug, Clone, PartialEq)]
pub struct GameBoxscore {
    pub game_id: String,
    pub players: Vec<BoxscorePlayerStat>,
}

#[derive(Debug, thiserror::Error)]
pub enum BoxscoreError {
    #[error("request for game {game_id} failed: {source}")]
    Http {
        game_id: String,
        source: reqwest::Error,
    },

    #[error("game {game_id} returned HTTP {status}")]
    Status { game_id: String, status: u16 },

    #[error("failed to decode boxscore for game {game_id}: {source}")]
    Decode {
        game_id: String,
        source: serde_json::Error,
    },
}

/// Anything that can produce a boxscore for a game id.
#[async_trait]
pub trait BoxscoreSource: Send + Sync {
    async fn fetch(&self, game_id: &str) -> Result<GameBoxscore, BoxscoreError>;
}

// ---------------------------------------------------------------------------
// Live feed wire format (private)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    game: RawGame,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGame {
    game_id: String,
    home_team: RawTeam,
    away_team: RawTeam,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTeam {
    team_name: String,
    #[serde(default)]
    players: Vec<RawPlayer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlayer {
    person_id: i64,
    name: String,
    #[serde(default)]
    position: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    starter: bool,
    #[serde(default, deserialize_with = "flag")]
    played: bool,
    #[serde(default)]
    statistics: RawStatistics,
}

#[derive(Debug, Default, Deserialize)]
struct RawStatistics {
    #[serde(default)]
    minutes: Option<String>,
    #[serde(flatten)]
    line: StatLine,
}

/// The feed encodes booleans as "1"/"0" strings.
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Text(String),
    }
    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(n) => n != 0,
        Flag::Text(s) => s.trim() == "1" || s.trim().eq_ignore_ascii_case("true"),
    })
}

/// Decode a live-feed boxscore document.
pub fn parse_boxscore(game_id: &str, body: &str) -> Result<GameBoxscore, BoxscoreError> {
    let envelope: RawEnvelope =
        serde_json::from_str(body).map_err(|e| BoxscoreError::Decode {
            game_id: game_id.to_string(),
            source: e,
        })?;
    let game = envelope.game;

    let mut players = Vec::new();
    for team in [game.away_team, game.home_team] {
        for p in team.players {
            players.push(BoxscorePlayerStat {
                game_id: game.game_id.clone(),
                person_id: p.person_id,
                name: p.name,
                team: team.team_name.clone(),
                position: p.position.filter(|s| !s.is_empty()),
                starter: p.starter,
                played: p.played,
                minutes: p.statistics.minutes,
                stats: p.statistics.line,
            });
        }
    }

    Ok(GameBoxscore {
        game_id: game.game_id,
        players,
    })
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// Client for the league CDN's `boxscore_{game_id}.json` documents.
pub struct NbaLiveClient {
    http: reqwest::Client,
    base_url: String,
}

impl NbaLiveClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, game_id: &str) -> String {
        format!("{}/boxscore_{game_id}.json", self.base_url)
    }
}

#[async_trait]
impl BoxscoreSource for NbaLiveClient {
    async fn fetch(&self, game_id: &str) -> Result<GameBoxscore, BoxscoreError> {
        let http_err = |e: reqwest::Error| BoxscoreError::Http {
            game_id: game_id.to_string(),
            source: e,
        };
        let url = self.url_for(game_id);
        debug!(%url, "fetching boxscore");

        let response = self.http.get(&url).send().await.map_err(http_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(BoxscoreError::Status {
                game_id: game_id.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.text().await.map_err(http_err)?;
        parse_boxscore(game_id, &body)
    }
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub processed: Vec<String>,
    pub failed: Vec<String>,
    pub rows_inserted: usize,
}

/// Game ids for an ingest run: the requested ones when given, otherwise every
/// scheduled game before `today` that has no boxscore rows yet.
pub fn games_to_ingest(
    db: &Database,
    requested: &[String],
    today: NaiveDate,
) -> anyhow::Result<Vec<String>> {
    if !requested.is_empty() {
        return Ok(requested.to_vec());
    }
    let pending = db
        .pending_game_ids(today)
        .context("failed to list games without boxscores")?;
    info!(count = pending.len(), "games pending boxscore ingest");
    Ok(pending)
}

/// Fetch, score and store each game in order. A game that fails to fetch is
/// logged and skipped; a database failure aborts the batch. Sleeps `delay`
/// between successfully processed games.
pub async fn ingest_games(
    source: &dyn BoxscoreSource,
    db: &Database,
    game_ids: &[String],
    delay: Duration,
) -> anyhow::Result<IngestReport> {
    let mut report = IngestReport::default();

    for (i, game_id) in game_ids.iter().enumerate() {
        let boxscore = match source.fetch(game_id).await {
            Ok(b) => b,
            Err(e) => {
                warn!("skipping game {game_id}: {e}");
                report.failed.push(game_id.clone());
                continue;
            }
        };

        let lines: Vec<ScoredPlayerLine> = boxscore
            .players
            .into_iter()
            .map(ScoredPlayerLine::from_stat)
            .collect();
        let inserted = db
            .insert_player_box(&lines)
            .with_context(|| format!("failed to store boxscore for game {game_id}"))?;
        info!(game_id = %game_id, lines = lines.len(), inserted, "boxscore stored");

        report.rows_inserted += inserted;
        report.processed.push(game_id.clone());

        if !delay.is_zero() && i + 1 < game_ids.len() {
            tokio::time::sleep(delay).await;
        }
    }

    Ok(report)
}
