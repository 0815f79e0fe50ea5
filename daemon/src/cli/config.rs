//! `invitewatch config`: inspect and edit `~/.invitewatch/config.toml`.

use std::path::Path;

use crate::config::{self, Config};
use crate::error::{Error, Result};

pub fn show() -> Result<()> {
    let config = Config::load()?;
    print!("{}", config.redacted()?);
    Ok(())
}

pub fn path() -> Result<()> {
    println!("{}", config::config_path()?.display());
    Ok(())
}

pub fn get(key: &str) -> Result<()> {
    let config = Config::load()?;
    match lookup(&config, key)? {
        Some(value) => println!("{value}"),
        None => println!("(not set)"),
    }
    Ok(())
}

/// Set one key and save. Environment overrides are not written back.
pub fn set(key: &str, value: &str) -> Result<()> {
    let path = config::config_path()?;
    let updated = set_in(&path, key, value)?;
    match lookup(&updated, key)? {
        Some(shown) if key != "api.auth_cookie" => println!("{key} = {shown}"),
        _ => println!("{key} updated"),
    }
    Ok(())
}

fn set_in(path: &Path, key: &str, value: &str) -> Result<Config> {
    let mut config = Config::load_from(path)?;
    config.set(key, value)?;
    config.save_to(path)?;
    Ok(config)
}

/// Rendered value of a dotted key; `None` for unset optional keys.
fn lookup(config: &Config, key: &str) -> Result<Option<String>> {
    let root = toml::Value::try_from(config)?;
    let mut node = &root;
    for part in key.split('.') {
        node = match node.get(part) {
            Some(next) => next,
            None if is_known_optional(key) => return Ok(None),
            None => return Err(Error::UnknownSetting(key.to_string())),
        };
    }
    Ok(Some(match node {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }))
}

fn is_known_optional(key: &str) -> bool {
    matches!(key, "log_dir" | "local_actor" | "api.timeout_seconds")
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn set_persists_clamped_value() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let updated = set_in(&path, "rate_limit.batch_delay_seconds", "9999").unwrap();
        assert_eq!(updated.rate_limit.batch_delay_seconds, 300);

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.rate_limit.batch_delay_seconds, 300);
        assert_eq!(
            lookup(&loaded, "rate_limit.batch_delay_seconds").unwrap(),
            Some("300".to_string())
        );
    }

    #[test]
    fn lookup_handles_unset_and_unknown_keys() {
        let config = Config::default();
        assert_eq!(lookup(&config, "local_actor").unwrap(), None);
        assert_eq!(
            lookup(&config, "log_files.prefix").unwrap(),
            Some("output_log_".to_string())
        );
        assert!(matches!(
            lookup(&config, "rate_limit.nope"),
            Err(Error::UnknownSetting(_))
        ));
    }

    #[test]
    fn failed_set_leaves_file_alone() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        set_in(&path, "api.group_id", "grp_1").unwrap();

        assert!(set_in(&path, "rate_limit.batch_count", "lots").is_err());
        assert_eq!(Config::load_from(&path).unwrap().api.group_id, "grp_1");
    }
}
