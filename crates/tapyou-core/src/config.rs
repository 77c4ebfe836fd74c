// Configuration loading and parsing (config/client.toml).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::api::models::{SortField, SortOrder};

/// Environment variable that overrides `api.base_url`.
pub const BASE_URL_ENV: &str = "TAPYOU_API_BASE_URL";

/// Name of the single config file under `config/`.
pub const CONFIG_FILE: &str = "client.toml";

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
// client.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub chat: ChatConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub tasks: TasksConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Chat endpoints and reconciliation timings.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_history_path")]
    pub history_path: String,
    #[serde(default = "default_send_path")]
    pub send_path: String,
    /// Interval between transcript fetches while awaiting an agent reply.
    pub poll_interval_ms: u64,
    /// Give up waiting for an agent reply after this long.
    pub reply_timeout_secs: u64,
    /// Interval between background transcript refreshes while idle.
    pub refresh_interval_secs: u64,
    /// Delay before re-checking the transcript after a failed send.
    pub send_recheck_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u32,
    /// Explicit session file location. Defaults to the platform data dir.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            ttl_hours: default_ttl_hours(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TasksConfig {
    #[serde(default)]
    pub sort_by: Option<SortField>,
    #[serde(default)]
    pub sort_order: Option<SortOrder>,
    /// Page size; 0 leaves it to the backend default.
    #[serde(default)]
    pub limit: u32,
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_history_path() -> String {
    "/chat/history".to_string()
}

fn default_send_path() -> String {
    "/chat/".to_string()
}

fn default_ttl_hours() -> u32 {
    24
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/client.toml` relative to `base_dir`.
///
/// Does not copy defaults and does not apply environment overrides; prefer
/// `load_config()` for application startup.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&path)?;
    let config = parse_config(&text).map_err(|source| ConfigError::ParseError {
        path: path.clone(),
        source,
    })?;
    validate(&config)?;
    Ok(config)
}

/// Parse config text without validation.
pub fn parse_config(text: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(text)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    let mut copied = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Load config relative to the current working directory, copying defaults
/// first and applying the `TAPYOU_API_BASE_URL` override.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    let mut config = load_config_from(&cwd)?;
    if let Ok(url) = std::env::var(BASE_URL_ENV) {
        apply_base_url_override(&mut config, &url)?;
    }
    Ok(config)
}

/// Replace the base URL and re-validate.
pub fn apply_base_url_override(config: &mut Config, url: &str) -> Result<(), ConfigError> {
    let url = url.trim();
    if url.is_empty() {
        return Ok(());
    }
    config.api.base_url = url.to_string();
    validate(config)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let url = &config.api.base_url;
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::ValidationError {
            field: "api.base_url".into(),
            message: format!("must start with http:// or https://, got {url:?}"),
        });
    }

    if config.api.request_timeout_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "api.request_timeout_secs".into(),
            message: "must be > 0".into(),
        });
    }

    let chat = &config.chat;
    let timing_fields: &[(&str, u64)] = &[
        ("chat.poll_interval_ms", chat.poll_interval_ms),
        ("chat.reply_timeout_secs", chat.reply_timeout_secs),
        ("chat.refresh_interval_secs", chat.refresh_interval_secs),
        ("chat.send_recheck_delay_ms", chat.send_recheck_delay_ms),
    ];
    for (name, val) in timing_fields {
        if *val == 0 {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must be > 0".into(),
            });
        }
    }

    if chat.poll_interval_ms >= chat.reply_timeout_secs.saturating_mul(1000) {
        return Err(ConfigError::ValidationError {
            field: "chat.poll_interval_ms".into(),
            message: format!(
                "must be shorter than chat.reply_timeout_secs ({}s), got {}ms",
                chat.reply_timeout_secs, chat.poll_interval_ms
            ),
        });
    }

    for (name, path) in [
        ("chat.history_path", &chat.history_path),
        ("chat.send_path", &chat.send_path),
    ] {
        if !path.starts_with('/') {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: format!("must start with '/', got {path:?}"),
            });
        }
    }

    if config.session.ttl_hours == 0 {
        return Err(ConfigError::ValidationError {
            field: "session.ttl_hours".into(),
            message: "must be > 0".into(),
        });
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

    const VALID: &str = r#"
[api]
base_url = "http://localhost:8000"
request_timeout_secs = 10

[chat]
poll_interval_ms = 2000
reply_timeout_secs = 30
refresh_interval_secs = 5
send_recheck_delay_ms = 1000

[session]
ttl_hours = 24

[tasks]
sort_by = "created_at"
sort_order = "desc"
limit = 100
"#;

    /// Workspace-level `defaults/` directory.
    fn workspace_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
    }

    fn temp_base(name: &str) -> PathBuf {
        let tmp = std::env::temp_dir().join(format!("tapyou_config_{name}"));
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();
        tmp
    }

    fn parsed(text: &str) -> Config {
        parse_config(text).expect("should parse")
    }

    #[test]
    fn defaults_file_is_valid() {
        let text = fs::read_to_string(workspace_root().join("defaults").join(CONFIG_FILE))
            .expect("defaults/client.toml should exist");
        let config = parsed(&text);
        validate(&config).expect("defaults should validate");
        assert_eq!(config.chat.poll_interval_ms, 2000);
        assert_eq!(config.chat.reply_timeout_secs, 30);
        assert_eq!(config.chat.refresh_interval_secs, 5);
        assert_eq!(config.chat.send_recheck_delay_ms, 1000);
        assert_eq!(config.session.ttl_hours, 24);
    }

    #[test]
    fn load_from_directory() {
        let tmp = temp_base("load");
        fs::write(tmp.join("config").join(CONFIG_FILE), VALID).unwrap();

        let config = load_config_from(&tmp).expect("should load");
        assert_eq!(config.api.base_url, "http://localhost:8000");
        assert_eq!(config.api.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.chat.history_path, "/chat/history");
        assert_eq!(config.chat.send_path, "/chat/");
        assert_eq!(config.tasks.sort_by, Some(SortField::CreatedAt));
        assert_eq!(config.tasks.sort_order, Some(SortOrder::Desc));
        assert_eq!(config.tasks.limit, 100);

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_file_is_reported() {
        let tmp = temp_base("missing");
        let err = load_config_from(&tmp).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn optional_sections_default() {
        let config = parsed(
            r#"
[api]
base_url = "https://tapyou.example"

[chat]
poll_interval_ms = 500
reply_timeout_secs = 10
refresh_interval_secs = 5
send_recheck_delay_ms = 200
"#,
        );
        validate(&config).unwrap();
        assert_eq!(config.api.request_timeout_secs, 15);
        assert_eq!(config.session.ttl_hours, 24);
        assert!(config.session.path.is_none());
        assert!(config.tasks.sort_by.is_none());
        assert_eq!(config.tasks.limit, 0);
    }

    #[test]
    fn rejects_non_http_base_url() {
        let text = VALID.replace("http://localhost:8000", "localhost:8000");
        let err = validate(&parsed(&text)).unwrap_err();
        match err {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, "api.base_url"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let text = VALID.replace("poll_interval_ms = 2000", "poll_interval_ms = 0");
        let err = validate(&parsed(&text)).unwrap_err();
        match err {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, "chat.poll_interval_ms"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_poll_interval_longer_than_timeout() {
        let text = VALID.replace("poll_interval_ms = 2000", "poll_interval_ms = 45000");
        let err = validate(&parsed(&text)).unwrap_err();
        assert!(err.to_string().contains("shorter than"));
    }

    #[test]
    fn rejects_unknown_sort_field() {
        let text = VALID.replace("sort_by = \"created_at\"", "sort_by = \"priority\"");
        assert!(parse_config(&text).is_err());
    }

    #[test]
    fn base_url_override_is_validated() {
        let mut config = parsed(VALID);
        apply_base_url_override(&mut config, "https://api.tapyou.example").unwrap();
        assert_eq!(config.api.base_url, "https://api.tapyou.example");

        assert!(apply_base_url_override(&mut config, "ftp://nope").is_err());
    }

    #[test]
    fn blank_override_is_ignored() {
        let mut config = parsed(VALID);
        apply_base_url_override(&mut config, "   ").unwrap();
        assert_eq!(config.api.base_url, "http://localhost:8000");
    }

    #[test]
    fn ensure_config_files_copies_missing_defaults() {
        let tmp = std::env::temp_dir().join("tapyou_config_ensure");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("defaults")).unwrap();
        fs::write(tmp.join("defaults").join(CONFIG_FILE), VALID).unwrap();

        let copied = ensure_config_files(&tmp).unwrap();
        assert_eq!(copied.len(), 1);
        assert!(tmp.join("config").join(CONFIG_FILE).exists());

        // Second run leaves the existing file alone.
        let copied = ensure_config_files(&tmp).unwrap();
        assert!(copied.is_empty());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_errors_without_any_directory() {
        let tmp = std::env::temp_dir().join("tapyou_config_empty");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();
        let err = ensure_config_files(&tmp).unwrap_err();
        assert!(matches!(err, ConfigError::DefaultsCopyError { .. }));
        let _ = fs::remove_dir_all(&tmp);
    }
}
