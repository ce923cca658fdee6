// Request surface: processing slates, listing slate ids, reading reconciled
// rows and merging projections. Transport-free; every call returns data,
// never an error.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::pipeline::{SlatePipeline, SlateResult};
use crate::projections::{load_projections, ProjectionRecord};
use crate::publish::{join_list, split_list, Publisher};
use crate::slate::{load_salary_rows, slate_path};

/// `{"status": "success", ...payload}` or `{"status": "error", "message": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ApiResponse<T> {
    Success(T),
    Error { message: String },
}

impl<T> ApiResponse<T> {
    fn error(message: impl Into<String>) -> Self {
        ApiResponse::Error {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ApiResponse::Success(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlateIds {
    pub slate_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Records<T> {
    pub data: Vec<T>,
}

pub type SlateRecord = serde_json::Map<String, serde_json::Value>;

pub struct SlateService {
    db: Database,
    config: Config,
    base_dir: PathBuf,
}

impl SlateService {
    /// `base_dir` anchors the relative file paths in `config`.
    pub fn new(db: Database, config: Config, base_dir: &Path) -> Self {
        Self {
            db,
            config,
            base_dir: base_dir.to_path_buf(),
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        self.base_dir.join(path)
    }

    /// Record the submitted ids, then reconcile each slate in turn.
    pub fn process_slates(&self, slate_ids: &[String]) -> BTreeMap<String, SlateResult> {
        let mut results = BTreeMap::new();

        if let Err(e) = self
            .db
            .set(&self.config.publish.slate_ids_key, &join_list(slate_ids))
        {
            warn!("failed to store slate id list: {e:#}");
            for id in slate_ids {
                results.insert(
                    id.clone(),
                    SlateResult::Error {
                        error: format!("failed to store slate id list: {e:#}"),
                    },
                );
            }
            return results;
        }

        let slate_dir = self.resolve_path(&self.config.files.slate_dir);
        let settings = self.config.pipeline_settings();
        for id in slate_ids {
            let path = slate_path(&slate_dir, &self.config.files.slate_file_pattern, id);
            let result = match load_salary_rows(&path) {
                Ok(sheet) => {
                    SlatePipeline::new(&self.db, &self.db, settings.clone()).run_sheet(id, &sheet)
                }
                Err(e) => {
                    warn!(slate_id = %id, "cannot load slate file: {e}");
                    SlateResult::Error {
                        error: e.to_string(),
                    }
                }
            };
            results.insert(id.clone(), result);
        }

        info!(
            slates = results.len(),
            failed = results.values().filter(|r| !r.is_success()).count(),
            "slate batch finished"
        );
        results
    }

    /// The id list stored by the last `process_slates` call.
    pub fn slate_ids(&self) -> ApiResponse<SlateIds> {
        match self.db.get(&self.config.publish.slate_ids_key) {
            Ok(Some(value)) if !split_list(&value).is_empty() => ApiResponse::Success(SlateIds {
                slate_ids: split_list(&value),
            }),
            Ok(_) => ApiResponse::error("no slate ids have been stored"),
            Err(e) => ApiResponse::error(format!("{e:#}")),
        }
    }

    /// Reconciled rows for one slate; missing values are empty strings.
    pub fn slate_data(&self, slate_id: &str) -> ApiResponse<Records<SlateRecord>> {
        match self.db.load_slate_entries(slate_id) {
            Ok(entries) if entries.is_empty() => {
                ApiResponse::error(format!("no data stored for slate {slate_id}"))
            }
            Ok(entries) => ApiResponse::Success(Records {
                data: entries.iter().map(|e| e.to_record()).collect(),
            }),
            Err(e) => ApiResponse::error(format!("{e:#}")),
        }
    }

    /// Projection figures keyed by normalized name.
    pub fn updated_projections(&self) -> ApiResponse<Records<ProjectionRecord>> {
        let path = self.resolve_path(&self.config.files.projections_path);
        match load_projections(&path, &self.config.matching.name_overrides()) {
            Ok(data) => ApiResponse::Success(Records { data }),
            Err(e) => ApiResponse::error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BoxscoreConfig, FilesConfig, MatchingConfig, PublishConfig};

    fn config() -> Config {
        Config {
            db_path: ":memory:".into(),
            files: FilesConfig {
                slate_dir: "slates".into(),
                slate_file_pattern: "sal-{slate_id}.csv".into(),
                projections_path: "proj.csv".into(),
            },
            matching: MatchingConfig::default(),
            publish: PublishConfig {
                team_list_key_prefix: "react_slate_teams_".into(),
                slate_ids_key: "react_slateIDs_today".into(),
            },
            boxscore: BoxscoreConfig {
                base_url: "http://localhost".into(),
                request_delay_ms: 0,
                timeout_secs: 1,
            },
        }
    }

    fn service(base: &Path) -> SlateService {
        SlateService::new(Database::open(":memory:").unwrap(), config(), base)
    }

    #[test]
    fn slate_ids_before_any_run_is_an_error() {
        let svc = service(Path::new("."));
        let json = serde_json::to_value(svc.slate_ids()).unwrap();
        assert_eq!(json["status"], "error");
        assert!(json["message"].is_string());
    }

    #[test]
    fn missing_slate_file_is_reported_per_slate() {
        let base = std::env::temp_dir().join(format!("slate_service_missing_{}", std::process::id()));
        let svc = service(&base);

        let results = svc.process_slates(&["Main".to_string(), "Turbo".to_string()]);
        assert_eq!(results.len(), 2);
        assert!(results.values().all(|r| !r.is_success()));

        // The id list is stored even when the files are missing.
        match svc.slate_ids() {
            ApiResponse::Success(ids) => assert_eq!(ids.slate_ids, vec!["Main", "Turbo"]),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn unknown_slate_data_is_an_error() {
        let svc = service(Path::new("."));
        assert!(!svc.slate_data("nope").is_success());
    }

    #[test]
    fn missing_projection_file_is_an_error() {
        let svc = service(Path::new("/nonexistent"));
        let json = serde_json::to_value(svc.updated_projections()).unwrap();
        assert_eq!(json["status"], "error");
    }

    #[test]
    fn success_payload_is_flattened_next_to_status() {
        let resp: ApiResponse<SlateIds> = ApiResponse::Success(SlateIds {
            slate_ids: vec!["Main".into()],
        });
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["slate_ids"][0], "Main");
    }
}
