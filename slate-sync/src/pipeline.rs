// Slate reconciliation: parse schedule strings, resolve team and player
// identities, persist idempotently, and publish the slate's team list.

use std::collections::{BTreeSet, HashSet};

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::db::Database;
use crate::normalize::NameOverrides;
use crate::publish::{join_list, team_list_key, Publisher};
use crate::resolve::{CollisionPolicy, PlayerIndex, ReferenceStore, TeamResolver};
use crate::schedule::GameInfo;
use crate::slate::{SalaryRow, SalarySheet, SlateEntry};

pub use crate::slate::RowIssue;

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Reference reads plus the slate write path.
pub trait SlateStore: ReferenceStore {
    /// Insert entries, skipping any whose natural key already exists.
    /// Returns the number of rows actually inserted.
    fn insert_entries(&self, entries: &[SlateEntry]) -> Result<usize>;
}

impl SlateStore for Database {
    fn insert_entries(&self, entries: &[SlateEntry]) -> Result<usize> {
        self.insert_slate_entries(entries)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub overrides: NameOverrides,
    pub collision_policy: CollisionPolicy,
    pub team_list_key_prefix: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            overrides: NameOverrides::builtin(),
            collision_policy: CollisionPolicy::LastWins,
            team_list_key_prefix: "react_slate_teams_".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// A row whose schedule string parsed and whose team is in the matchup.
#[derive(Debug, Clone)]
pub struct ParsedRow {
    pub row: SalaryRow,
    pub game: GameInfo,
    pub opponent: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to load player reference: {0:#}")]
    Reference(anyhow::Error),

    #[error("team lookup failed for {abbrev}: {cause:#}")]
    TeamLookup { abbrev: String, cause: anyhow::Error },

    #[error("failed to persist slate entries: {0:#}")]
    Persist(anyhow::Error),

    #[error("failed to publish {key}: {cause:#}")]
    Publish { key: String, cause: anyhow::Error },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlateSummary {
    pub max_game_date: Option<NaiveDate>,
    pub processed_rows: usize,
    pub unique_teams_key: String,
    pub inserted_rows: usize,
    pub unmatched_names: Vec<String>,
    pub skipped_rows: Vec<RowIssue>,
    pub name_collisions: usize,
}

/// Outcome of one slate run. Serializes as `{"status": "success", ...}` or
/// `{"status": "error", "error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SlateResult {
    Success(SlateSummary),
    Error { error: String },
}

impl SlateResult {
    pub fn is_success(&self) -> bool {
        matches!(self, SlateResult::Success(_))
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct SlatePipeline<'a, S: ?Sized, P: ?Sized> {
    store: &'a S,
    publisher: &'a P,
    settings: PipelineSettings,
}

impl<'a, S, P> SlatePipeline<'a, S, P>
where
    S: SlateStore + ?Sized,
    P: Publisher + ?Sized,
{
    pub fn new(store: &'a S, publisher: &'a P, settings: PipelineSettings) -> Self {
        Self {
            store,
            publisher,
            settings,
        }
    }

    /// Reconcile one slate. Never fails: fatal conditions come back as
    /// [`SlateResult::Error`].
    pub fn run(&self, slate_id: &str, rows: &[SalaryRow]) -> SlateResult {
        self.finish(slate_id, self.try_run(slate_id, rows, &[]))
    }

    /// Like [`run`](Self::run), but rows rejected while loading the file are
    /// reported in `skipped_rows` next to the schedule failures.
    pub fn run_sheet(&self, slate_id: &str, sheet: &SalarySheet) -> SlateResult {
        self.finish(slate_id, self.try_run(slate_id, &sheet.rows, &sheet.rejected))
    }

    fn finish(&self, slate_id: &str, outcome: Result<SlateSummary, PipelineError>) -> SlateResult {
        match outcome {
            Ok(summary) => SlateResult::Success(summary),
            Err(e) => {
                error!(slate_id, "slate run failed: {e}");
                SlateResult::Error {
                    error: e.to_string(),
                }
            }
        }
    }

    fn try_run(
        &self,
        slate_id: &str,
        rows: &[SalaryRow],
        rejected: &[RowIssue],
    ) -> Result<SlateSummary, PipelineError> {
        info!(slate_id, rows = rows.len(), rejected = rejected.len(), "processing slate");

        let (parsed, issues) = parse_rows(rows);
        let mut skipped_rows = rejected.to_vec();
        skipped_rows.extend(issues);
        skipped_rows.sort_by_key(|issue| issue.row);

        let reference = self
            .store
            .player_reference()
            .map_err(PipelineError::Reference)?;
        let index = PlayerIndex::build(
            &reference,
            &self.settings.overrides,
            self.settings.collision_policy,
        );

        let (entries, unmatched_names) = self.resolve_rows(slate_id, &index, parsed)?;
        let inserted_rows = self.persist(&entries)?;
        let unique_teams_key = self.publish_teams(slate_id, rows)?;

        let summary = SlateSummary {
            max_game_date: entries.iter().map(|e| e.game_date).max(),
            processed_rows: entries.len(),
            unique_teams_key,
            inserted_rows,
            unmatched_names,
            skipped_rows,
            name_collisions: index.collisions(),
        };
        info!(
            slate_id,
            processed = summary.processed_rows,
            inserted = summary.inserted_rows,
            unmatched = summary.unmatched_names.len(),
            skipped = summary.skipped_rows.len(),
            "slate processed"
        );
        Ok(summary)
    }

    /// Attach team, opponent and player ids. Team lookups are memoized for the
    /// run; misses leave the id empty. Unmatched display names are returned
    /// once each, in input order.
    pub fn resolve_rows(
        &self,
        slate_id: &str,
        index: &PlayerIndex,
        parsed: Vec<ParsedRow>,
    ) -> Result<(Vec<SlateEntry>, Vec<String>), PipelineError> {
        let mut teams = TeamResolver::new();
        let mut entries = Vec::with_capacity(parsed.len());
        let mut unmatched = Vec::new();
        let mut seen_unmatched = HashSet::new();

        for ParsedRow { row, game, opponent } in parsed {
            let team_id = self.team_id(&mut teams, &row.team_abbrev)?;
            let opp_team_id = self.team_id(&mut teams, &opponent)?;

            let player_id = index.resolve(&row.name);
            if player_id.is_none() && seen_unmatched.insert(row.name.clone()) {
                unmatched.push(row.name.clone());
            }

            entries.push(SlateEntry {
                shortname: index.key_for(&row.name),
                tipoff: game.tipoff.fixed_offset(),
                game_date: game.game_date(),
                opp: opponent,
                team_id,
                opp_team_id,
                player_id,
                slate_id: slate_id.to_string(),
                position: row.position,
                name_id: row.name_id,
                name: row.name,
                dk_id: row.dk_id,
                roster_position: row.roster_position,
                salary: row.salary,
                game_info: row.game_info,
                team_abbrev: row.team_abbrev,
                avg_points_per_game: row.avg_points_per_game,
            });
        }

        if !unmatched.is_empty() {
            warn!(slate_id, count = unmatched.len(), "unmatched player names: {}", unmatched.join(", "));
        }
        Ok((entries, unmatched))
    }

    fn team_id(&self, teams: &mut TeamResolver, abbrev: &str) -> Result<Option<i64>, PipelineError> {
        teams
            .resolve(self.store, abbrev)
            .map_err(|cause| PipelineError::TeamLookup {
                abbrev: abbrev.to_string(),
                cause,
            })
    }

    pub fn persist(&self, entries: &[SlateEntry]) -> Result<usize, PipelineError> {
        self.store
            .insert_entries(entries)
            .map_err(PipelineError::Persist)
    }

    /// Publish the slate's distinct, sorted team abbreviations and return the
    /// key they were stored under.
    pub fn publish_teams(&self, slate_id: &str, rows: &[SalaryRow]) -> Result<String, PipelineError> {
        let key = team_list_key(&self.settings.team_list_key_prefix, slate_id);
        let teams: Vec<String> = rows
            .iter()
            .map(|r| r.team_abbrev.trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        self.publisher
            .set(&key, &join_list(&teams))
            .map_err(|cause| PipelineError::Publish {
                key: key.clone(),
                cause,
            })?;
        Ok(key)
    }
}

/// Parse every row's schedule string and pick its opponent. Rows that fail
/// either step are reported, not returned. Issues carry the row's file
/// position when it has one, else its position in `rows`.
pub fn parse_rows(rows: &[SalaryRow]) -> (Vec<ParsedRow>, Vec<RowIssue>) {
    let mut parsed = Vec::with_capacity(rows.len());
    let mut issues = Vec::new();

    for (i, row) in rows.iter().enumerate() {
        let outcome = GameInfo::parse(&row.game_info).and_then(|game| {
            let opponent = game.opponent_for(&row.team_abbrev)?.to_string();
            Ok((game, opponent))
        });
        match outcome {
            Ok((game, opponent)) => parsed.push(ParsedRow {
                row: row.clone(),
                game,
                opponent,
            }),
            Err(e) => {
                let position = if row.line > 0 { row.line } else { i + 1 };
                warn!(row = position, name = %row.name, "skipping salary row: {e}");
                issues.push(RowIssue {
                    row: position,
                    name: row.name.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    (parsed, issues)
}
