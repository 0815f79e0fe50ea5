//! Show invitewatch status: config, log file, current world, history.

use std::path::Path;

use crate::config::{self, Config};
use crate::error::Error;
use crate::storage::HistoryStore;
use crate::watcher::{bootstrap_scan, EventKind, LogLocator, LogParser};

/// Exit codes for status command.
pub mod exit_code {
    pub const OK: i32 = 0;
    pub const NO_LOG_DIR: i32 = 1;
    pub const NOT_CONFIGURED: i32 = 2;
}

/// Run the status command.
pub fn run() -> Result<i32, Error> {
    let config = Config::load()?;
    let config_path = config::config_path()?;

    println!("invitewatch status");
    println!(
        "  Config: {}{}",
        config_path.display(),
        if config_path.exists() { "" } else { " (defaults)" }
    );

    let Some(log_dir) = config.log_dir() else {
        println!("  Log directory: unknown");
        return Ok(exit_code::NO_LOG_DIR);
    };
    let locator = LogLocator::new(log_dir.clone(), config.log_files.clone());
    println!("  Log directory: {}", log_dir.display());

    if !locator.dir_exists() {
        println!();
        println!("Log directory does not exist. Set it with 'invitewatch config set log_dir <path>'.");
        return Ok(exit_code::NO_LOG_DIR);
    }

    match locator.latest()? {
        Some(path) => {
            println!("  Log file: {}", path.display());
            if let Some(last_activity) = get_last_activity(&path) {
                println!("  Last activity: {}", last_activity);
            }

            let parser = LogParser::new(&config.patterns)?;
            let found = bootstrap_scan(&path, &parser)?;
            if let Some(EventKind::WorldEnter { world_name }) = found.world_enter {
                println!("  World: {}", world_name);
            }
            if let Some(EventKind::InstanceJoin {
                world_id,
                instance_id,
                region,
            }) = found.instance_join
            {
                match region {
                    Some(region) => println!("  Instance: {}:{} ({})", world_id, instance_id, region),
                    None => println!("  Instance: {}:{}", world_id, instance_id),
                }
            }
        }
        None => println!("  Log file: none yet"),
    }

    println!(
        "  Local actor: {}",
        config.local_actor.as_deref().unwrap_or("(not set)")
    );
    println!(
        "  Pacing: {} per batch, {}s between batches, {}s between invites",
        config.rate_limit.batch_count,
        config.rate_limit.batch_delay_seconds,
        config.rate_limit.inter_item_delay_seconds
    );

    if let Ok(store) = HistoryStore::open(&config::history_path()?) {
        let summary = store.summary()?;
        println!(
            "  History: {} invites ({} sent, {} skipped, {} errors)",
            summary.total, summary.successful, summary.skipped, summary.errors
        );
    }

    if config.api.group_id.is_empty() || config.api.auth_cookie.is_empty() {
        println!();
        println!("Set api.group_id and api.auth_cookie before running 'invitewatch watch'.");
        return Ok(exit_code::NOT_CONFIGURED);
    }

    Ok(exit_code::OK)
}

/// Get last write to the log file as a human-readable string.
fn get_last_activity(log_file: &Path) -> Option<String> {
    let modified = std::fs::metadata(log_file)
        .ok()
        .and_then(|m| m.modified().ok())?;

    let duration = std::time::SystemTime::now().duration_since(modified).ok()?;

    Some(humanize(duration.as_secs()))
}

fn humanize(secs: u64) -> String {
    if secs < 60 {
        "just now".to_string()
    } else if secs < 3600 {
        let mins = secs / 60;
        format!("{} minute{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if secs < 86400 {
        let hours = secs / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else {
        let days = secs / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    }
}
