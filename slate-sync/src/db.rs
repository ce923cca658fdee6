// SQLite persistence for reference data, reconciled slates, boxscores and the
// key-value publish table.

use std::sync::{Mutex, MutexGuard};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate};
use rusqlite::{params, Connection};

use crate::boxscore::ScoredPlayerLine;
use crate::reference::{GameRecord, PlayerIdentity, TeamIdentity};
use crate::slate::SlateEntry;

/// Version stamped into `PRAGMA user_version` once the schema below exists.
pub const SCHEMA_VERSION: i64 = 2;

const SCHEMA_V1: &str = "
    CREATE TABLE IF NOT EXISTS teams (
        id           INTEGER PRIMARY KEY,
        full_name    TEXT NOT NULL,
        abbreviation TEXT NOT NULL UNIQUE,
        nickname     TEXT NOT NULL,
        city         TEXT NOT NULL,
        state        TEXT NOT NULL,
        year_founded INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS players (
        id        INTEGER PRIMARY KEY,
        full_name TEXT NOT NULL,
        is_active INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS slate_entries (
        position         TEXT NOT NULL,
        nameid           TEXT NOT NULL,
        name             TEXT NOT NULL,
        id               TEXT NOT NULL,
        rosterposition   TEXT NOT NULL,
        salary           INTEGER NOT NULL,
        gameinfo         TEXT NOT NULL,
        teamabbrev       TEXT NOT NULL,
        avgpointspergame REAL NOT NULL,
        datetime         TEXT NOT NULL,
        opp              TEXT NOT NULL,
        team_id          INTEGER,
        opp_team_id      INTEGER,
        shortname        TEXT NOT NULL,
        player_id        INTEGER,
        game_date        TEXT NOT NULL,
        slateid          TEXT NOT NULL
    );

    -- Unmatched players have no player_id; fall back to the contest's own
    -- id so reprocessing them is still a no-op.
    CREATE UNIQUE INDEX IF NOT EXISTS idx_slate_entries_key
        ON slate_entries (COALESCE(player_id, 'dk:' || id), game_date, slateid);

    CREATE INDEX IF NOT EXISTS idx_slate_entries_slateid ON slate_entries(slateid);

    CREATE TABLE IF NOT EXISTS player_box (
        game_id             TEXT NOT NULL,
        person_id           INTEGER NOT NULL,
        name                TEXT NOT NULL,
        team                TEXT NOT NULL,
        position            TEXT,
        starter             INTEGER NOT NULL,
        played              INTEGER NOT NULL,
        minutes             TEXT,
        points              INTEGER NOT NULL,
        rebounds_total      INTEGER NOT NULL,
        assists             INTEGER NOT NULL,
        steals              INTEGER NOT NULL,
        blocks              INTEGER NOT NULL,
        turnovers           INTEGER NOT NULL,
        three_pointers_made INTEGER NOT NULL,
        dd                  INTEGER NOT NULL,
        td                  INTEGER NOT NULL,
        fpts                REAL NOT NULL,
        PRIMARY KEY (game_id, person_id)
    );

    CREATE TABLE IF NOT EXISTS kv_store (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
";

/// Version 2: the game schedule, one row per (game, team).
const SCHEMA_V2: &str = "
    CREATE TABLE IF NOT EXISTS games (
        season_id         TEXT NOT NULL,
        team_id           INTEGER NOT NULL,
        team_abbreviation TEXT NOT NULL,
        game_id           TEXT NOT NULL,
        game_date         TEXT NOT NULL,
        matchup           TEXT NOT NULL,
        wl                TEXT,
        pts               INTEGER,
        PRIMARY KEY (game_id, team_id)
    );

    CREATE INDEX IF NOT EXISTS idx_games_game_date ON games(game_date);
";

/// Season types whose games have no fantasy value: preseason, all-star and
/// play-in (first digit of `season_id`).
const SKIPPED_SEASON_TYPES: &str = "('1', '3', '5')";

/// SQLite-backed store. Every method takes the connection lock only for its
/// own duration, so phases of a run never share a long-lived transaction.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and bring the schema up
    /// to [`SCHEMA_VERSION`]. Pass `":memory:"` for an ephemeral database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to set database pragmas")?;

        Self::migrate(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn migrate(conn: &Connection) -> Result<()> {
        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .context("failed to read schema version")?;

        if version > SCHEMA_VERSION {
            bail!("database schema version {version} is newer than supported ({SCHEMA_VERSION})");
        }

        if version < 1 {
            conn.execute_batch(SCHEMA_V1)
                .context("failed to create database schema")?;
        }
        if version < 2 {
            conn.execute_batch(SCHEMA_V2)
                .context("failed to create games schedule table")?;
        }
        if version < SCHEMA_VERSION {
            conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))
                .context("failed to stamp schema version")?;
        }

        Ok(())
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock).
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    pub fn schema_version(&self) -> Result<i64> {
        let conn = self.conn();
        conn.query_row("PRAGMA user_version", [], |row| row.get(0))
            .context("failed to read schema version")
    }

    // ------------------------------------------------------------------
    // Reference data
    // ------------------------------------------------------------------

    /// Look up a team id by abbreviation. `None` when no team matches.
    pub fn team_id_by_abbrev(&self, abbrev: &str) -> Result<Option<i64>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare_cached("SELECT id FROM teams WHERE abbreviation = ?1")
            .context("failed to prepare team lookup")?;
        let mut rows = stmt
            .query_map(params![abbrev], |row| row.get::<_, i64>(0))
            .context("failed to query team id")?;
        match rows.next() {
            Some(id) => Ok(Some(id.context("failed to read team id")?)),
            None => Ok(None),
        }
    }

    /// Every known player, active or not, ordered by id.
    pub fn player_reference(&self) -> Result<Vec<PlayerIdentity>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT id, full_name, is_active FROM players ORDER BY id")
            .context("failed to prepare player reference query")?;
        let players = stmt
            .query_map([], |row| {
                Ok(PlayerIdentity {
                    id: row.get(0)?,
                    full_name: row.get(1)?,
                    is_active: row.get(2)?,
                })
            })
            .context("failed to query players")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map player rows")?;
        Ok(players)
    }

    /// Insert teams, leaving existing ids untouched. Returns rows inserted.
    pub fn upsert_teams(&self, teams: &[TeamIdentity]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin team import")?;
        let mut inserted = 0;
        for team in teams {
            inserted += tx
                .execute(
                    "INSERT OR IGNORE INTO teams
                        (id, full_name, abbreviation, nickname, city, state, year_founded)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        team.id,
                        team.full_name,
                        team.abbreviation,
                        team.nickname,
                        team.city,
                        team.state,
                        team.year_founded,
                    ],
                )
                .with_context(|| format!("failed to insert team {}", team.abbreviation))?;
        }
        tx.commit().context("failed to commit team import")?;
        Ok(inserted)
    }

    /// Insert players; an existing id only has its active flag refreshed.
    pub fn upsert_players(&self, players: &[PlayerIdentity]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin player import")?;
        for player in players {
            tx.execute(
                "INSERT INTO players (id, full_name, is_active)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET is_active = excluded.is_active",
                params![player.id, player.full_name, player.is_active],
            )
            .with_context(|| format!("failed to upsert player {}", player.id))?;
        }
        tx.commit().context("failed to commit player import")?;
        Ok(())
    }

    /// Flip a player's active flag. Returns `false` if the id is unknown.
    pub fn set_player_active(&self, id: i64, is_active: bool) -> Result<bool> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE players SET is_active = ?2 WHERE id = ?1",
                params![id, is_active],
            )
            .context("failed to update player active flag")?;
        Ok(changed > 0)
    }

    // ------------------------------------------------------------------
    // Slate entries
    // ------------------------------------------------------------------

    /// Insert reconciled entries in one transaction. Rows whose natural key
    /// already exists are skipped, never overwritten. Returns rows inserted.
    pub fn insert_slate_entries(&self, entries: &[SlateEntry]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin slate insert")?;
        let mut inserted = 0;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR IGNORE INTO slate_entries
                        (position, nameid, name, id, rosterposition, salary, gameinfo,
                         teamabbrev, avgpointspergame, datetime, opp, team_id, opp_team_id,
                         shortname, player_id, game_date, slateid)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                )
                .context("failed to prepare slate insert")?;
            for e in entries {
                inserted += stmt
                    .execute(params![
                        e.position,
                        e.name_id,
                        e.name,
                        e.dk_id,
                        e.roster_position,
                        e.salary,
                        e.game_info,
                        e.team_abbrev,
                        e.avg_points_per_game,
                        e.tipoff.to_rfc3339(),
                        e.opp,
                        e.team_id,
                        e.opp_team_id,
                        e.shortname,
                        e.player_id,
                        e.game_date.format("%Y-%m-%d").to_string(),
                        e.slate_id,
                    ])
                    .with_context(|| format!("failed to insert slate entry for {}", e.name))?;
            }
        }
        tx.commit().context("failed to commit slate insert")?;
        Ok(inserted)
    }

    /// All stored entries for a slate, ordered by salary (highest first).
    pub fn load_slate_entries(&self, slate_id: &str) -> Result<Vec<SlateEntry>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT position, nameid, name, id, rosterposition, salary, gameinfo,
                        teamabbrev, avgpointspergame, datetime, opp, team_id, opp_team_id,
                        shortname, player_id, game_date, slateid
                 FROM slate_entries WHERE slateid = ?1
                 ORDER BY salary DESC, name",
            )
            .context("failed to prepare slate entry query")?;

        let entries = stmt
            .query_map(params![slate_id], |row| {
                let tipoff: String = row.get(9)?;
                let game_date: String = row.get(15)?;
                Ok(SlateEntry {
                    position: row.get(0)?,
                    name_id: row.get(1)?,
                    name: row.get(2)?,
                    dk_id: row.get(3)?,
                    roster_position: row.get(4)?,
                    salary: row.get(5)?,
                    game_info: row.get(6)?,
                    team_abbrev: row.get(7)?,
                    avg_points_per_game: row.get(8)?,
                    tipoff: DateTime::parse_from_rfc3339(&tipoff).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            9,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?,
                    opp: row.get(10)?,
                    team_id: row.get(11)?,
                    opp_team_id: row.get(12)?,
                    shortname: row.get(13)?,
                    player_id: row.get(14)?,
                    game_date: NaiveDate::parse_from_str(&game_date, "%Y-%m-%d").map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            15,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?,
                    slate_id: row.get(16)?,
                })
            })
            .context("failed to query slate entries")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map slate entry rows")?;
        Ok(entries)
    }

    pub fn slate_entry_count(&self, slate_id: &str) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM slate_entries WHERE slateid = ?1",
                params![slate_id],
                |row| row.get(0),
            )
            .context("failed to count slate entries")?;
        Ok(count as usize)
    }

    // ------------------------------------------------------------------
    // Boxscores
    // ------------------------------------------------------------------

    /// Insert scored boxscore lines; `(game_id, person_id)` duplicates are
    /// ignored. Returns rows inserted.
    pub fn insert_player_box(&self, lines: &[ScoredPlayerLine]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin boxscore insert")?;
        let mut inserted = 0;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR IGNORE INTO player_box
                        (game_id, person_id, name, team, position, starter, played, minutes,
                         points, rebounds_total, assists, steals, blocks, turnovers,
                         three_pointers_made, dd, td, fpts)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                )
                .context("failed to prepare boxscore insert")?;
            for line in lines {
                let p = &line.player;
                let s = &p.stats;
                inserted += stmt
                    .execute(params![
                        p.game_id,
                        p.person_id,
                        p.name,
                        p.team,
                        p.position,
                        p.starter,
                        p.played,
                        p.minutes,
                        s.points,
                        s.rebounds_total,
                        s.assists,
                        s.steals,
                        s.blocks,
                        s.turnovers,
                        s.three_pointers_made,
                        line.score.dd,
                        line.score.td,
                        line.score.fpts,
                    ])
                    .with_context(|| {
                        format!("failed to insert boxscore line {}/{}", p.game_id, p.person_id)
                    })?;
            }
        }
        tx.commit().context("failed to commit boxscore insert")?;
        Ok(inserted)
    }

    pub fn player_box_count(&self, game_id: &str) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM player_box WHERE game_id = ?1",
                params![game_id],
                |row| row.get(0),
            )
            .context("failed to count boxscore rows")?;
        Ok(count as usize)
    }

    // ------------------------------------------------------------------
    // Game schedule
    // ------------------------------------------------------------------

    /// Insert schedule rows; an existing (game, team) row is left untouched.
    /// Returns rows inserted.
    pub fn insert_games(&self, games: &[GameRecord]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin games import")?;
        let mut inserted = 0;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR IGNORE INTO games
                        (season_id, team_id, team_abbreviation, game_id, game_date, matchup, wl, pts)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )
                .context("failed to prepare games insert")?;
            for g in games {
                inserted += stmt
                    .execute(params![
                        g.season_id,
                        g.team_id,
                        g.team_abbreviation,
                        g.game_id,
                        g.game_date.format("%Y-%m-%d").to_string(),
                        g.matchup,
                        g.wl,
                        g.pts,
                    ])
                    .with_context(|| format!("failed to insert game {}/{}", g.game_id, g.team_id))?;
            }
        }
        tx.commit().context("failed to commit games import")?;
        Ok(inserted)
    }

    /// Games played before `before` by a known team that have no boxscore
    /// rows yet, oldest first. Preseason, all-star and play-in games are
    /// left out.
    pub fn pending_game_ids(&self, before: NaiveDate) -> Result<Vec<String>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT g.game_id, MIN(g.game_date) AS first_date
             FROM games g
             JOIN teams t ON t.id = g.team_id
             WHERE substr(g.season_id, 1, 1) NOT IN {SKIPPED_SEASON_TYPES}
               AND g.game_date < ?1
               AND NOT EXISTS (SELECT 1 FROM player_box pb WHERE pb.game_id = g.game_id)
             GROUP BY g.game_id
             ORDER BY first_date, g.game_id"
        );
        let mut stmt = conn
            .prepare(&sql)
            .context("failed to prepare pending games query")?;
        let ids = stmt
            .query_map(params![before.format("%Y-%m-%d").to_string()], |row| {
                row.get::<_, String>(0)
            })
            .context("failed to query pending games")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map pending game rows")?;
        Ok(ids)
    }

    // ------------------------------------------------------------------
    // Key-value store
    // ------------------------------------------------------------------

    /// Store `value` under `key`, replacing any previous value.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR REPLACE INTO kv_store (key, value) VALUES (?1, ?2)",
            params![key, value],
        )
        .context("failed to save key-value entry")?;
        Ok(())
    }

    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT value FROM kv_store WHERE key = ?1")
            .context("failed to prepare key-value query")?;
        let mut rows = stmt
            .query_map(params![key], |row| row.get::<_, String>(0))
            .context("failed to query key-value store")?;
        match rows.next() {
            Some(value) => Ok(Some(value.context("failed to read key-value row")?)),
            None => Ok(None),
        }
    }
}
