// Configuration loading and parsing (config/ingest.toml).

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::normalize::{normalize_name, NameOverrides};
use crate::pipeline::PipelineSettings;
use crate::resolve::CollisionPolicy;

/// Name of the config file, both in `defaults/` and `config/`.
pub const CONFIG_FILE: &str = "ingest.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub files: FilesConfig,
    pub matching: MatchingConfig,
    pub publish: PublishConfig,
    pub boxscore: BoxscoreConfig,
}

impl Config {
    /// Settings for a slate pipeline run.
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            overrides: self.matching.name_overrides(),
            collision_policy: self.matching.collision_policy,
            team_list_key_prefix: self.publish.team_list_key_prefix.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// ingest.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire ingest.toml file.
#[derive(Debug, Clone, Deserialize)]
struct IngestFile {
    database: DatabaseSection,
    files: FilesConfig,
    #[serde(default)]
    matching: MatchingConfig,
    publish: PublishConfig,
    boxscore: BoxscoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilesConfig {
    pub slate_dir: String,
    /// File name inside `slate_dir`; `{slate_id}` is substituted.
    pub slate_file_pattern: String,
    pub projections_path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchingConfig {
    #[serde(default)]
    pub collision_policy: CollisionPolicy,
    /// When absent, the built-in corrections are used.
    #[serde(default)]
    pub overrides: Option<HashMap<String, String>>,
}

impl MatchingConfig {
    pub fn name_overrides(&self) -> NameOverrides {
        match &self.overrides {
            Some(map) => NameOverrides::new(map.clone()),
            None => NameOverrides::builtin(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishConfig {
    pub team_list_key_prefix: String,
    pub slate_ids_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoxscoreConfig {
    pub base_url: String,
    pub request_delay_ms: u64,
    pub timeout_secs: u64,
}

impl BoxscoreConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/ingest.toml` relative to `base_dir`.
///
/// Does not copy defaults; `load_config_in()` does that first.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&path)?;
    let file: IngestFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    let config = Config {
        db_path: file.database.path,
        files: file.files,
        matching: file.matching,
        publish: file.publish,
        boxscore: file.boxscore,
    };

    validate(&config)?;

    Ok(config)
}

/// Seed `config/ingest.toml` from `defaults/ingest.toml` when it is missing.
/// Returns the path written, or `None` when the config already existed. An
/// existing file is never overwritten.
pub fn ensure_config_file(base_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let target = base_dir.join("config").join(CONFIG_FILE);
    if target.exists() {
        return Ok(None);
    }

    let source = base_dir.join("defaults").join(CONFIG_FILE);
    let content = std::fs::read(&source).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!(
            "no {} and cannot read {}: {e}; run from the project root or pass --config-dir",
            target.display(),
            source.display()
        ),
    })?;

    if let Some(dir) = target.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to create {}: {e}", dir.display()),
        })?;
    }

    // create_new: a config written concurrently by another process wins.
    match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&target)
    {
        Ok(mut dest) => {
            std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                ConfigError::DefaultsCopyError {
                    message: format!("failed to write {}: {e}", target.display()),
                }
            })?;
            Ok(Some(target))
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(ConfigError::DefaultsCopyError {
            message: format!("failed to create {}: {e}", target.display()),
        }),
    }
}

/// Seed the config from `defaults/` if needed, then load.
pub fn load_config_in(base_dir: &Path) -> Result<Config, ConfigError> {
    ensure_config_file(base_dir)?;
    load_config_from(base_dir)
}

/// Convenience wrapper: loads config relative to the current working directory.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    load_config_in(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.db_path.trim().is_empty() {
        return Err(invalid("database.path", "must not be empty"));
    }

    if !config.files.slate_file_pattern.contains("{slate_id}") {
        return Err(invalid(
            "files.slate_file_pattern",
            format!(
                "must contain `{{slate_id}}`, got `{}`",
                config.files.slate_file_pattern
            ),
        ));
    }

    let key_fields: &[(&str, &str)] = &[
        (
            "publish.team_list_key_prefix",
            config.publish.team_list_key_prefix.as_str(),
        ),
        ("publish.slate_ids_key", config.publish.slate_ids_key.as_str()),
    ];
    for (name, val) in key_fields {
        if val.trim().is_empty() {
            return Err(invalid(name, "must not be empty"));
        }
    }

    // Overrides are matched against normalized keys, so anything else could
    // never fire.
    if let Some(overrides) = &config.matching.overrides {
        for (alias, target) in overrides {
            for value in [alias, target] {
                if value.is_empty() || normalize_name(value) != *value {
                    return Err(invalid(
                        "matching.overrides",
                        format!("`{value}` is not a normalized name key"),
                    ));
                }
            }
        }
    }

    if config.boxscore.timeout_secs == 0 {
        return Err(invalid("boxscore.timeout_secs", "must be > 0"));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Helper: the crate root holding `defaults/`, whether tests run from the
    /// crate or the workspace root.
    fn project_root() -> PathBuf {
        let cwd = std::env::current_dir().unwrap();
        if cwd.join("defaults").exists() {
            cwd
        } else if cwd.join("slate-sync/defaults").exists() {
            cwd.join("slate-sync")
        } else {
            panic!("Cannot locate defaults/ directory from CWD {:?}", cwd);
        }
    }

    const VALID: &str = r#"
[database]
path = "test.db"

[files]
slate_dir = "slates"
slate_file_pattern = "sal-{slate_id}.csv"
projections_path = "proj.csv"

[publish]
team_list_key_prefix = "teams_"
slate_ids_key = "slate_ids"

[boxscore]
base_url = "http://localhost/box"
request_delay_ms = 0
timeout_secs = 5
"#;

    /// Write `toml` as config/ingest.toml under a fresh temp dir.
    fn write_config(name: &str, toml: &str) -> PathBuf {
        let tmp = std::env::temp_dir().join(format!("slate_sync_{name}"));
        let config_dir = tmp.join("config");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join(CONFIG_FILE), toml).unwrap();
        tmp
    }

    fn expect_invalid(tmp: &Path, expected_field: &str) {
        let err = load_config_from(tmp).unwrap_err();
        match &err {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, expected_field),
            other => panic!("expected ValidationError, got: {other}"),
        }
        let _ = fs::remove_dir_all(tmp);
    }

    #[test]
    fn load_valid_config_from_project_defaults() {
        let root = project_root();
        let tmp = std::env::temp_dir().join("slate_sync_project_defaults");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();
        fs::copy(
            root.join("defaults").join(CONFIG_FILE),
            tmp.join("config").join(CONFIG_FILE),
        )
        .unwrap();

        let config = load_config_from(&tmp).expect("defaults should be valid");
        assert_eq!(config.db_path, "slate-sync.db");
        assert_eq!(config.files.slate_file_pattern, "sal-{slate_id}.csv");
        assert_eq!(config.matching.collision_policy, CollisionPolicy::LastWins);
        assert_eq!(config.publish.team_list_key_prefix, "react_slate_teams_");
        assert_eq!(config.publish.slate_ids_key, "react_slateIDs_today");
        assert_eq!(config.boxscore.request_delay(), Duration::from_secs(5));
        assert_eq!(config.boxscore.timeout(), Duration::from_secs(20));

        let overrides = config.matching.name_overrides();
        assert_eq!(overrides.key_for("GG Jackson"), "gregoryjackson");

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn matching_section_is_optional() {
        let tmp = write_config("no_matching", VALID);
        let config = load_config_from(&tmp).unwrap();
        assert_eq!(config.matching.collision_policy, CollisionPolicy::LastWins);
        assert_eq!(config.matching.name_overrides().len(), 2);

        let settings = config.pipeline_settings();
        assert_eq!(settings.team_list_key_prefix, "teams_");
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn explicit_overrides_replace_builtin() {
        let toml = format!(
            "{VALID}\n[matching]\ncollision_policy = \"first_wins\"\n[matching.overrides]\nbigmac = \"marcusmorris\"\n"
        );
        let tmp = write_config("explicit_overrides", &toml);
        let config = load_config_from(&tmp).unwrap();
        assert_eq!(config.matching.collision_policy, CollisionPolicy::FirstWins);

        let overrides = config.matching.name_overrides();
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides.key_for("Big Mac"), "marcusmorris");
        assert_eq!(overrides.key_for("GG Jackson"), "ggjackson");
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_empty_db_path() {
        let toml = VALID.replace(r#"path = "test.db""#, r#"path = """#);
        let tmp = write_config("empty_db", &toml);
        expect_invalid(&tmp, "database.path");
    }

    #[test]
    fn rejects_pattern_without_placeholder() {
        let toml = VALID.replace("sal-{slate_id}.csv", "salaries.csv");
        let tmp = write_config("bad_pattern", &toml);
        expect_invalid(&tmp, "files.slate_file_pattern");
    }

    #[test]
    fn rejects_empty_publish_key() {
        let toml = VALID.replace(r#"slate_ids_key = "slate_ids""#, r#"slate_ids_key = "  ""#);
        let tmp = write_config("empty_key", &toml);
        expect_invalid(&tmp, "publish.slate_ids_key");
    }

    #[test]
    fn rejects_unnormalized_override() {
        let toml = format!("{VALID}\n[matching.overrides]\n\"GG Jackson\" = \"gregoryjackson\"\n");
        let tmp = write_config("bad_override", &toml);
        expect_invalid(&tmp, "matching.overrides");
    }

    #[test]
    fn rejects_zero_timeout() {
        let toml = VALID.replace("timeout_secs = 5", "timeout_secs = 0");
        let tmp = write_config("zero_timeout", &toml);
        expect_invalid(&tmp, "boxscore.timeout_secs");
    }

    #[test]
    fn rejects_unknown_collision_policy() {
        let toml = format!("{VALID}\n[matching]\ncollision_policy = \"random\"\n");
        let tmp = write_config("bad_policy", &toml);
        let err = load_config_from(&tmp).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn file_not_found_for_missing_config() {
        let tmp = std::env::temp_dir().join("slate_sync_missing_config");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();

        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::FileNotFound { path } => {
                assert!(path.ends_with("ingest.toml"), "unexpected path: {path:?}");
            }
            other => panic!("expected FileNotFound, got: {other}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn parse_error_for_invalid_toml() {
        let tmp = write_config("invalid_toml", "[database\npath = ");
        let err = load_config_from(&tmp).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_file_seeds_from_defaults() {
        let tmp = std::env::temp_dir().join("slate_sync_ensure_copies");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("defaults")).unwrap();
        fs::write(tmp.join("defaults").join(CONFIG_FILE), VALID).unwrap();
        fs::write(tmp.join("defaults/notes.toml"), "# not config").unwrap();

        let copied = ensure_config_file(&tmp).unwrap();
        assert_eq!(copied, Some(tmp.join("config").join(CONFIG_FILE)));
        assert!(!tmp.join("config/notes.toml").exists());
        assert!(load_config_in(&tmp).is_ok());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_file_keeps_existing() {
        let tmp = write_config("ensure_skips", "# user edited");
        fs::create_dir_all(tmp.join("defaults")).unwrap();
        fs::write(tmp.join("defaults").join(CONFIG_FILE), VALID).unwrap();

        assert_eq!(ensure_config_file(&tmp).unwrap(), None);
        let content = fs::read_to_string(tmp.join("config").join(CONFIG_FILE)).unwrap();
        assert_eq!(content, "# user edited");

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_file_errors_without_defaults() {
        let tmp = std::env::temp_dir().join("slate_sync_both_missing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        let err = ensure_config_file(&tmp).unwrap_err();
        assert!(matches!(err, ConfigError::DefaultsCopyError { .. }));
        let _ = fs::remove_dir_all(&tmp);
    }
}
