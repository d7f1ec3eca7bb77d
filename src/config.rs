//! Configuration loader and validator for the group sync tool.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub gateway: Gateway,
    #[serde(default)]
    pub telegram: Telegram,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

impl App {
    /// Expands a leading `~/` in `data_dir`.
    pub fn resolved_data_dir(&self) -> String {
        if let Some(rest) = self.data_dir.strip_prefix("~/") {
            if let Ok(home) = std::env::var("HOME") {
                return format!("{}/{}", home.trim_end_matches('/'), rest);
            }
        }
        self.data_dir.clone()
    }

    pub fn results_dir(&self) -> PathBuf {
        Path::new(&self.resolved_data_dir()).join("results")
    }

    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/groupsync.db", self.resolved_data_dir()))
    }
}

/// User-account gateway the provider client talks to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Gateway {
    pub base_url: String,
    pub token: String,
    #[serde(default = "default_session")]
    pub session: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_session() -> String {
    "telegram_session".into()
}

fn default_request_timeout() -> u64 {
    120
}

/// Control-panel bot settings. Only the bot binary needs a token.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Telegram {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub allowed_users: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchConfig {
    pub keywords: Vec<String>,
    pub cities: Vec<String>,
    pub use_transliteration: bool,
    pub use_city_combinations: bool,
    pub limit_per_query: usize,
    pub delay_ms: u64,
    pub max_flood_wait_seconds: u64,
    pub dialog_fallback_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            cities: Vec::new(),
            use_transliteration: true,
            use_city_combinations: true,
            limit_per_query: 50,
            delay_ms: 1000,
            max_flood_wait_seconds: 3600,
            dialog_fallback_limit: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReconcileConfig {
    pub inter_record_delay_seconds: u64,
    pub join_settle_seconds: u64,
    pub max_join_wait_seconds: u64,
    pub member_scan_limit: usize,
    pub dialog_scan_limit: usize,
    pub check_send_permission: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            inter_record_delay_seconds: 10,
            join_settle_seconds: 3,
            max_join_wait_seconds: 300,
            member_scan_limit: 200,
            dialog_scan_limit: 200,
            check_send_permission: true,
        }
    }
}

impl ReconcileConfig {
    pub fn inter_record_delay(&self) -> Duration {
        Duration::from_secs(self.inter_record_delay_seconds)
    }

    pub fn join_settle(&self) -> Duration {
        Duration::from_secs(self.join_settle_seconds)
    }
}

impl Config {
    /// Ensure required directories exist (`app.data_dir` and its `results/`).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(self.app.results_dir())
    }

    /// The bot binary additionally requires a token.
    pub fn require_bot(&self) -> Result<(), ConfigError> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(ConfigError::Invalid("telegram.bot_token must be non-empty"));
        }
        Ok(())
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }

    if cfg.gateway.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("gateway.base_url must be non-empty"));
    }
    if reqwest::Url::parse(&cfg.gateway.base_url).is_err() {
        return Err(ConfigError::Invalid("gateway.base_url must be a valid URL"));
    }
    if cfg.gateway.token.trim().is_empty() {
        return Err(ConfigError::Invalid("gateway.token must be non-empty"));
    }
    if cfg.gateway.request_timeout_seconds == 0 {
        return Err(ConfigError::Invalid("gateway.request_timeout_seconds must be > 0"));
    }

    if cfg.search.limit_per_query == 0 {
        return Err(ConfigError::Invalid("search.limit_per_query must be > 0"));
    }

    let r = &cfg.reconcile;
    if r.inter_record_delay_seconds < 10 {
        return Err(ConfigError::Invalid("reconcile.inter_record_delay_seconds must be >= 10"));
    }
    if r.join_settle_seconds < 3 {
        return Err(ConfigError::Invalid("reconcile.join_settle_seconds must be >= 3"));
    }
    if r.member_scan_limit == 0 {
        return Err(ConfigError::Invalid("reconcile.member_scan_limit must be > 0"));
    }
    if r.dialog_scan_limit == 0 {
        return Err(ConfigError::Invalid("reconcile.dialog_scan_limit must be > 0"));
    }

    Ok(())
}

/// Returns the documented example configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

gateway:
  base_url: "http://127.0.0.1:8081/"
  token: "YOUR_GATEWAY_TOKEN"
  session: "telegram_session"
  request_timeout_seconds: 120

telegram:
  bot_token: "YOUR_TELEGRAM_BOT_TOKEN"
  allowed_users:
    - 123456789

search:
  keywords:
    - "кафе"
    - "coffee"
  cities:
    - "Москва"
  use_transliteration: true
  use_city_combinations: true
  limit_per_query: 50
  delay_ms: 1000
  max_flood_wait_seconds: 3600
  dialog_fallback_limit: 200

reconcile:
  inter_record_delay_seconds: 10
  join_settle_seconds: 3
  max_join_wait_seconds: 300
  member_scan_limit: 200
  dialog_scan_limit: 200
  check_send_permission: true
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        cfg.require_bot().unwrap();
        assert_eq!(cfg.reconcile, ReconcileConfig::default());
    }

    #[test]
    fn sections_default_when_missing() {
        let cfg: Config = serde_yaml::from_str(
            "app:\n  data_dir: ./d\ngateway:\n  base_url: http://localhost:1/\n  token: t\n",
        )
        .unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.search.max_flood_wait_seconds, 3600);
        assert_eq!(cfg.gateway.session, "telegram_session");
        assert!(matches!(cfg.require_bot(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_gateway() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.gateway.token = "".into();
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("gateway.token")), _ => panic!("wrong error") }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.gateway.base_url = "not a url".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn reconcile_delays_have_floors() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.reconcile.inter_record_delay_seconds = 9;
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("inter_record_delay")), _ => panic!("wrong error") }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.reconcile.join_settle_seconds = 2;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.reconcile.member_scan_limit = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn ensure_dirs_creates_results_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.join("results").exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.telegram.allowed_users, vec![123456789]);
        assert_eq!(cfg.search.cities, vec!["Москва".to_string()]);
    }
}
