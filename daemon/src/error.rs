//! Error types for invitewatch.

use thiserror::Error;

/// invitewatch error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("File watch error: {0}")]
    Notify(#[from] notify::Error),

    #[error("Config parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Config render error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Invalid {name} pattern: {reason}")]
    Pattern { name: &'static str, reason: String },

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Config error: {0}")]
    ConfigParse(String),

    #[error("History error: {0}")]
    History(String),

    #[error("Unknown setting: {0}")]
    UnknownSetting(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

pub type Result<T> = std::result::Result<T, Error>;
