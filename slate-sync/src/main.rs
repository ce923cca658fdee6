// slate-sync entry point.
//
// Each subcommand:
// 1. Initializes tracing (log to file, stdout is reserved for results)
// 2. Loads config from --config-dir (default: current directory)
// 3. Opens the database
// 4. Runs one operation and prints its JSON result

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};

use slate_sync::boxscore::{games_to_ingest, ingest_games, NbaLiveClient};
use slate_sync::config;
use slate_sync::db::Database;
use slate_sync::reference;
use slate_sync::schedule::eastern_today;
use slate_sync::service::SlateService;

#[derive(Debug, Parser)]
#[command(name = "slate-sync", about = "Reconcile contest salary slates with league reference data")]
struct Cli {
    /// Directory holding config/ (and defaults/). Relative data paths in the
    /// config resolve against it too.
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Reconcile one or more salary slates and store the results.
    Process {
        #[arg(required = true)]
        slate_ids: Vec<String>,
    },
    /// Print the slate ids stored by the last `process` run.
    SlateIds,
    /// Print the reconciled rows of one slate.
    SlateData { slate_id: String },
    /// Print projection figures keyed by normalized name.
    Projections,
    /// Import team reference rows from a CSV file.
    ImportTeams { csv: PathBuf },
    /// Import or refresh player reference rows from a CSV file.
    ImportPlayers { csv: PathBuf },
    /// Import game schedule rows (league game-finder export) from a CSV file.
    ImportGames { csv: PathBuf },
    /// Fetch, score and store boxscores. Without ids, every scheduled game
    /// that has no boxscore yet is fetched.
    Boxscores { game_ids: Vec<String> },
}

#[derive(Debug, Serialize)]
struct ImportSummary {
    status: &'static str,
    rows_read: usize,
    rows_inserted: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.config_dir)?;
    info!("slate-sync starting: {:?}", cli.command);

    let config = config::load_config_in(&cli.config_dir).context("failed to load configuration")?;
    let db_path = resolve_db_path(&cli.config_dir, &config.db_path);
    let db = Database::open(&db_path).context("failed to open database")?;
    info!("Database opened at {}", db_path);

    match cli.command {
        Command::Process { slate_ids } => {
            let service = SlateService::new(db, config, &cli.config_dir);
            print_json(&service.process_slates(&slate_ids))?;
        }
        Command::SlateIds => {
            let service = SlateService::new(db, config, &cli.config_dir);
            print_json(&service.slate_ids())?;
        }
        Command::SlateData { slate_id } => {
            let service = SlateService::new(db, config, &cli.config_dir);
            print_json(&service.slate_data(&slate_id))?;
        }
        Command::Projections => {
            let service = SlateService::new(db, config, &cli.config_dir);
            print_json(&service.updated_projections())?;
        }
        Command::ImportTeams { csv } => {
            let teams = reference::load_teams(&csv)?;
            let inserted = db.upsert_teams(&teams)?;
            info!("Imported {} of {} teams", inserted, teams.len());
            print_json(&ImportSummary {
                status: "success",
                rows_read: teams.len(),
                rows_inserted: Some(inserted),
            })?;
        }
        Command::ImportPlayers { csv } => {
            let players = reference::load_players(&csv)?;
            db.upsert_players(&players)?;
            info!("Upserted {} players", players.len());
            print_json(&ImportSummary {
                status: "success",
                rows_read: players.len(),
                rows_inserted: None,
            })?;
        }
        Command::ImportGames { csv } => {
            let games = reference::load_games(&csv)?;
            let inserted = db.insert_games(&games)?;
            info!("Imported {} of {} game rows", inserted, games.len());
            print_json(&ImportSummary {
                status: "success",
                rows_read: games.len(),
                rows_inserted: Some(inserted),
            })?;
        }
        Command::Boxscores { game_ids } => {
            let game_ids = games_to_ingest(&db, &game_ids, eastern_today())?;
            let client = NbaLiveClient::new(&config.boxscore.base_url, config.boxscore.timeout())?;
            let report = ingest_games(&client, &db, &game_ids, config.boxscore.request_delay())
                .await
                .inspect_err(|e| error!("Boxscore ingest aborted: {e:#}"))?;
            print_json(&report)?;
        }
    }

    Ok(())
}

fn resolve_db_path(base_dir: &Path, db_path: &str) -> String {
    if db_path == ":memory:" || Path::new(db_path).is_absolute() {
        db_path.to_string()
    } else {
        base_dir.join(db_path).display().to_string()
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to serialize result")?;
    println!("{text}");
    Ok(())
}

/// Initialize tracing to log to a file; stdout carries the JSON results.
fn init_tracing(base_dir: &Path) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = base_dir.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("slate-sync.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("slate_sync=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
