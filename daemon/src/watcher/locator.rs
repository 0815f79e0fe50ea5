//! Finding the active log file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Naming convention of the upstream application's log files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogFileConfig {
    pub prefix: String,
    pub suffix: String,
}

impl Default for LogFileConfig {
    fn default() -> Self {
        Self {
            prefix: "output_log_".to_string(),
            suffix: ".txt".to_string(),
        }
    }
}

/// Picks the most recently modified matching file in one directory.
#[derive(Debug, Clone)]
pub struct LogLocator {
    dir: PathBuf,
    naming: LogFileConfig,
}

impl LogLocator {
    pub fn new(dir: impl Into<PathBuf>, naming: LogFileConfig) -> Self {
        Self {
            dir: dir.into(),
            naming,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn dir_exists(&self) -> bool {
        self.dir.is_dir()
    }

    pub fn is_log_file(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with(&self.naming.prefix) && name.ends_with(&self.naming.suffix))
            .unwrap_or(false)
    }

    /// Newest matching file, or `None` if there is none (or no directory).
    pub fn latest(&self) -> Result<Option<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut latest: Option<(SystemTime, PathBuf)> = None;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() || !self.is_log_file(&path) {
                continue;
            }

            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);

            if latest.as_ref().map_or(true, |(newest, _)| modified > *newest) {
                latest = Some((modified, path));
            }
        }

        Ok(latest.map(|(_, path)| path))
    }
}

/// Default log directory of the upstream application on Windows.
pub fn default_log_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| {
        home.join("AppData")
            .join("LocalLow")
            .join("VRChat")
            .join("VRChat")
    })
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;

    fn touch(dir: &Path, name: &str, age: Duration) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
        path
    }

    #[test]
    fn picks_newest_matching_file() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "output_log_2024-05-01_10-00-00.txt", Duration::from_secs(300));
        let newest = touch(dir.path(), "output_log_2024-05-01_12-00-00.txt", Duration::from_secs(10));
        touch(dir.path(), "output_log_old.txt", Duration::from_secs(9000));
        touch(dir.path(), "notes.txt", Duration::from_secs(0));
        touch(dir.path(), "output_log_2024.log", Duration::from_secs(0));

        let locator = LogLocator::new(dir.path(), LogFileConfig::default());
        assert_eq!(locator.latest().unwrap(), Some(newest));
    }

    #[test]
    fn empty_or_missing_dir_is_none() {
        let dir = TempDir::new().unwrap();
        let locator = LogLocator::new(dir.path(), LogFileConfig::default());
        assert!(locator.dir_exists());
        assert_eq!(locator.latest().unwrap(), None);

        let missing = LogLocator::new(dir.path().join("nope"), LogFileConfig::default());
        assert!(!missing.dir_exists());
        assert_eq!(missing.latest().unwrap(), None);
    }

    #[test]
    fn ignores_matching_directories() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("output_log_dir.txt")).unwrap();
        let locator = LogLocator::new(dir.path(), LogFileConfig::default());
        assert_eq!(locator.latest().unwrap(), None);
    }
}
