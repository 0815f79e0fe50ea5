//! invitewatch configuration (`~/.invitewatch/config.toml`).
//!
//! Missing keys fall back to defaults. Rate-limit values are clamped both
//! when loaded and when written through [`Config::set`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::queue::RateLimitPolicy;
use crate::watcher::{default_log_dir, LogFileConfig, LogParser, PatternConfig};

/// Remote invite endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub group_id: String,
    /// Session cookie from the auth handshake. Never logged.
    pub auth_cookie: String,
    pub user_agent: String,
    /// Per-call timeout. Unset means calls may wait indefinitely.
    pub timeout_seconds: Option<u64>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.vrchat.cloud/api/1".to_string(),
            group_id: String::new(),
            auth_cookie: String::new(),
            user_agent: format!("invitewatch/{}", env!("CARGO_PKG_VERSION")),
            timeout_seconds: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the upstream logs. Platform default when unset.
    pub log_dir: Option<PathBuf>,
    /// Display name of the signed-in user, for leave suppression.
    pub local_actor: Option<String>,
    /// Queue an invite for every player who joins.
    pub auto_invite: bool,
    pub poll_interval_ms: u64,
    pub log_files: LogFileConfig,
    pub rate_limit: RateLimitPolicy,
    pub api: ApiConfig,
    pub patterns: PatternConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_dir: None,
            local_actor: None,
            auto_invite: true,
            poll_interval_ms: 1000,
            log_files: LogFileConfig::default(),
            rate_limit: RateLimitPolicy::default(),
            api: ApiConfig::default(),
            patterns: PatternConfig::default(),
        }
    }
}

/// `~/.invitewatch`
pub fn data_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".invitewatch"))
        .ok_or(Error::HomeDirNotFound)
}

pub fn config_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("config.toml"))
}

pub fn history_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("history.db"))
}

impl Config {
    /// Load from the default location and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&config_path()?)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from `path`; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)
            .map_err(|e| Error::ConfigParse(format!("{}: {e}", path.display())))?;
        config.rate_limit = config.rate_limit.clamped();
        LogParser::new(&config.patterns)?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("INVITEWATCH_LOG_DIR") {
            if !dir.is_empty() {
                self.log_dir = Some(PathBuf::from(dir));
            }
        }
        if let Ok(cookie) = std::env::var("INVITEWATCH_AUTH_COOKIE") {
            if !cookie.is_empty() {
                self.api.auth_cookie = cookie;
            }
        }
    }

    /// Write atomically, creating the parent directory if needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| Error::ConfigParse("config path has no parent".to_string()))?;
        fs::create_dir_all(dir)?;

        let content = toml::to_string_pretty(self)?;
        let temp = tempfile::NamedTempFile::new_in(dir)?;
        fs::write(temp.path(), content)?;
        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        info!(path = %path.display(), "Saved config");
        Ok(())
    }

    pub fn log_dir(&self) -> Option<PathBuf> {
        self.log_dir.clone().or_else(default_log_dir)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(100))
    }

    /// Set one dotted key (`rate_limit.batch_count`, `api.group_id`, ...).
    ///
    /// Rate-limit values are clamped to range; an empty value clears an
    /// optional setting.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let invalid = || Error::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };
        let optional = |v: &str| (!v.trim().is_empty()).then(|| v.trim().to_string());

        match key {
            "log_dir" => self.log_dir = optional(value).map(PathBuf::from),
            "local_actor" => self.local_actor = optional(value),
            "auto_invite" => self.auto_invite = value.parse().map_err(|_| invalid())?,
            "poll_interval_ms" => self.poll_interval_ms = value.parse().map_err(|_| invalid())?,

            "log_files.prefix" => self.log_files.prefix = value.to_string(),
            "log_files.suffix" => self.log_files.suffix = value.to_string(),

            "rate_limit.batch_count" => {
                self.rate_limit.batch_count = value.parse().map_err(|_| invalid())?
            }
            "rate_limit.batch_delay_seconds" => {
                self.rate_limit.batch_delay_seconds = value.parse().map_err(|_| invalid())?
            }
            "rate_limit.inter_item_delay_seconds" => {
                self.rate_limit.inter_item_delay_seconds = value.parse().map_err(|_| invalid())?
            }
            "rate_limit.queue_threshold" => {
                self.rate_limit.queue_threshold = value.parse().map_err(|_| invalid())?
            }
            "rate_limit.queue_pause_seconds" => {
                self.rate_limit.queue_pause_seconds = value.parse().map_err(|_| invalid())?
            }

            "api.base_url" => self.api.base_url = value.to_string(),
            "api.group_id" => self.api.group_id = value.trim().to_string(),
            "api.auth_cookie" => self.api.auth_cookie = value.trim().to_string(),
            "api.user_agent" => self.api.user_agent = value.to_string(),
            "api.timeout_seconds" => {
                self.api.timeout_seconds = match optional(value) {
                    Some(v) => Some(v.parse().map_err(|_| invalid())?),
                    None => None,
                }
            }

            "patterns.world_enter" | "patterns.instance_join" | "patterns.player_join"
            | "patterns.player_leave" => {
                let mut patterns = self.patterns.clone();
                match key {
                    "patterns.world_enter" => patterns.world_enter = value.to_string(),
                    "patterns.instance_join" => patterns.instance_join = value.to_string(),
                    "patterns.player_join" => patterns.player_join = value.to_string(),
                    _ => patterns.player_leave = value.to_string(),
                }
                LogParser::new(&patterns)?;
                self.patterns = patterns;
            }

            _ => return Err(Error::UnknownSetting(key.to_string())),
        }

        self.rate_limit = self.rate_limit.clamped();
        Ok(())
    }

    /// Rendered TOML with the auth cookie masked, for display.
    pub fn redacted(&self) -> Result<String> {
        let mut shown = self.clone();
        if !shown.api.auth_cookie.is_empty() {
            shown.api.auth_cookie = "********".to_string();
        }
        Ok(toml::to_string_pretty(&shown)?)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn partial_file_fills_defaults_and_clamps() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
local_actor = "Kaz"

[rate_limit]
batch_count = 500
queue_pause_seconds = 1
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.local_actor.as_deref(), Some("Kaz"));
        assert_eq!(config.rate_limit.batch_count, 50);
        assert_eq!(config.rate_limit.queue_pause_seconds, 60);
        assert_eq!(config.rate_limit.batch_delay_seconds, 12);
        assert!(config.auto_invite);
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.set("api.group_id", "grp_42").unwrap();
        config.set("api.timeout_seconds", "30").unwrap();
        config.set("log_dir", "/tmp/logs").unwrap();
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn set_clamps_rate_limits() {
        let mut config = Config::default();
        config.set("rate_limit.batch_count", "0").unwrap();
        config.set("rate_limit.inter_item_delay_seconds", "120").unwrap();
        config.set("rate_limit.queue_threshold", "5").unwrap();

        assert_eq!(config.rate_limit.batch_count, 1);
        assert_eq!(config.rate_limit.inter_item_delay_seconds, 60.0);
        assert_eq!(config.rate_limit.queue_threshold, 10);
    }

    #[test]
    fn set_rejects_bad_input() {
        let mut config = Config::default();
        assert!(matches!(
            config.set("rate_limit.batch_count", "many"),
            Err(Error::InvalidValue { .. })
        ));
        assert!(matches!(
            config.set("nope", "1"),
            Err(Error::UnknownSetting(_))
        ));
        assert!(matches!(
            config.set("patterns.player_join", "OnPlayerJoined (.+)"),
            Err(Error::Pattern { .. })
        ));
        assert_eq!(config.patterns, PatternConfig::default());
    }

    #[test]
    fn empty_value_clears_optional() {
        let mut config = Config::default();
        config.set("local_actor", "Kaz").unwrap();
        config.set("local_actor", "  ").unwrap();
        assert_eq!(config.local_actor, None);
    }

    #[test]
    fn redacted_hides_cookie() {
        let mut config = Config::default();
        config.set("api.auth_cookie", "authcookie_secret").unwrap();
        let shown = config.redacted().unwrap();
        assert!(!shown.contains("authcookie_secret"));
        assert!(shown.contains("********"));
    }
}
