//! `invitewatch watch`: tail the log and invite everyone who joins.
//!
//! Reads control lines from stdin while running:
//! `add <user_id> <name>`, `clear`, `queue`, `stats`, `status`, `scan`, `help`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::{DryRunClient, HttpInviteClient, InviteClient};
use crate::config::{self, Config};
use crate::error::{Error, Result};
use crate::queue::{ErrorKind, InviteOutcome, PauseReason, QueueEvent, QueueProcessor, SharedPolicy};
use crate::storage::HistoryStore;
use crate::watcher::{
    DomainEvent, EventKind, FileWatcher, InstanceMonitor, LogParser, MonitorOptions, ReadPass,
    WatchEvent,
};

/// Options from the command line; they win over the config file.
#[derive(Debug, Clone, Default)]
pub struct WatchArgs {
    pub dry_run: bool,
    pub log_dir: Option<PathBuf>,
    pub local_actor: Option<String>,
}

/// A control line typed on stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Add { user_id: String, display_name: String },
    Clear,
    Queue,
    Stats,
    Status,
    Scan,
    Help,
}

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word {
        "add" => {
            let (user_id, name) = match rest.split_once(char::is_whitespace) {
                Some((id, name)) => (id, name.trim()),
                None => (rest, ""),
            };
            if user_id.is_empty() {
                return None;
            }
            Some(Command::Add {
                user_id: user_id.to_string(),
                display_name: if name.is_empty() { user_id } else { name }.to_string(),
            })
        }
        "clear" => Some(Command::Clear),
        "queue" => Some(Command::Queue),
        "stats" => Some(Command::Stats),
        "status" => Some(Command::Status),
        "scan" => Some(Command::Scan),
        "help" | "?" => Some(Command::Help),
        _ => None,
    }
}

/// Whether a join should be queued.
fn should_invite(kind: &EventKind, auto_invite: bool, local_actor: Option<&str>) -> Option<(String, String)> {
    match kind {
        EventKind::PlayerJoin {
            user_id,
            display_name,
        } if auto_invite && local_actor != Some(display_name.as_str()) => {
            Some((user_id.clone(), display_name.clone()))
        }
        _ => None,
    }
}

async fn next_change(watcher: &mut Option<FileWatcher>) -> Option<WatchEvent> {
    match watcher {
        Some(watcher) => watcher.recv().await,
        None => std::future::pending().await,
    }
}

/// Run until Ctrl-C.
pub async fn run(args: WatchArgs) -> Result<()> {
    let config_path = config::config_path()?;
    let mut config = Config::load()?;
    if args.log_dir.is_some() {
        config.log_dir = args.log_dir.clone();
    }
    if args.local_actor.is_some() {
        config.local_actor = args.local_actor.clone();
    }

    let log_dir = config.log_dir().ok_or(Error::HomeDirNotFound)?;
    let parser = Arc::new(LogParser::new(&config.patterns)?);
    let policy = SharedPolicy::new(config.rate_limit);

    let client: Arc<dyn InviteClient> = if args.dry_run {
        Arc::new(DryRunClient)
    } else {
        Arc::new(HttpInviteClient::new(&config.api)?)
    };
    let history = if args.dry_run {
        HistoryStore::in_memory()?
    } else {
        HistoryStore::open(&config::history_path()?)?
    };
    let run_id = Uuid::new_v4().to_string();

    let (queue_tx, mut queue_rx) = mpsc::unbounded_channel();
    let queue = QueueProcessor::new(client, policy.clone(), queue_tx);

    let mut monitor = InstanceMonitor::new(
        MonitorOptions {
            log_dir: log_dir.clone(),
            naming: config.log_files.clone(),
            poll_interval: config.poll_interval(),
            local_actor: config.local_actor.clone(),
        },
        parser,
    );
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<DomainEvent>();
    if !monitor.start(event_tx).await? {
        println!("Log directory not found: {}", log_dir.display());
        println!("Set it with 'invitewatch config set log_dir <path>'.");
        return Ok(());
    }

    let mut config_watch = match FileWatcher::watch_file_debounced(&config_path, Duration::from_millis(500)) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!(error = %e, "Config changes will not be picked up live");
            None
        }
    };

    info!(
        run_id = %run_id,
        dir = %log_dir.display(),
        dry_run = args.dry_run,
        "Watching for players"
    );
    println!("Watching {} (type 'help' for commands, Ctrl-C to stop)", log_dir.display());

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut auto_invite = config.auto_invite;
    let mut local_actor = config.local_actor.clone();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,

            Some(event) = event_rx.recv() => {
                log_domain_event(&event.kind);
                if let Some((user_id, name)) = should_invite(&event.kind, auto_invite, local_actor.as_deref()) {
                    queue.add(&user_id, &name);
                }
            }

            Some(event) = queue_rx.recv() => {
                if let QueueEvent::Outcome { item, outcome } = &event {
                    let world = monitor.status().await.current_world;
                    if let Err(e) = history.record(&run_id, item, outcome, world.as_ref()) {
                        warn!(error = %e, "Failed to record invite history");
                    }
                }
                report_queue_event(&event);
            }

            Some(_) = next_change(&mut config_watch) => {
                match Config::load() {
                    Ok(fresh) => {
                        policy.set(fresh.rate_limit);
                        auto_invite = fresh.auto_invite;
                        if args.local_actor.is_none() && fresh.local_actor != local_actor {
                            local_actor = fresh.local_actor;
                            monitor.set_local_actor(local_actor.clone()).await;
                        }
                        info!("Reloaded config");
                    }
                    Err(e) => warn!(error = %e, "Ignoring invalid config change"),
                }
            }

            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match parse_command(&line) {
                    Some(command) => handle_command(command, &queue, &monitor).await,
                    None => println!("Unknown command: {} (try 'help')", line.trim()),
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    debug!(error = %e, "stdin closed");
                    stdin_open = false;
                }
            },
        }
    }

    monitor.stop().await;
    let stats = queue.stats();
    println!(
        "Stopped. Processed {} ({} sent, {} skipped, {} errors), {} left in queue.",
        stats.total_processed, stats.successful, stats.skipped, stats.errors, stats.queue_size
    );
    Ok(())
}

fn log_domain_event(kind: &EventKind) {
    match kind {
        EventKind::WorldEnter { world_name } => info!(world = %world_name, "Entered world"),
        EventKind::InstanceJoin {
            world_id,
            instance_id,
            region,
        } => info!(%world_id, %instance_id, ?region, "Joined instance"),
        EventKind::PlayerJoin {
            user_id,
            display_name,
        } => info!(%user_id, name = %display_name, "Player joined"),
        EventKind::PlayerLeave {
            user_id,
            display_name,
        } => info!(%user_id, name = %display_name, "Player left"),
    }
}

fn report_queue_event(event: &QueueEvent) {
    match event {
        QueueEvent::Outcome {
            item,
            outcome: InviteOutcome::Error {
                kind: ErrorKind::SessionExpired,
                ..
            },
        } => {
            println!(
                "Session expired while inviting {}. Update api.auth_cookie.",
                item.display_name
            );
        }
        QueueEvent::Paused {
            reason: PauseReason::Threshold,
            duration,
        } => println!("Queue is long, pausing for {}s", duration.as_secs()),
        QueueEvent::Idle => debug!("Queue idle"),
        QueueEvent::Stats(stats) => debug!(?stats, "Queue stats"),
        _ => {}
    }
}

async fn handle_command(command: Command, queue: &QueueProcessor, monitor: &InstanceMonitor) {
    match command {
        Command::Add {
            user_id,
            display_name,
        } => {
            if queue.add(&user_id, &display_name) {
                println!("Queued {display_name} ({user_id})");
            } else {
                println!("{user_id} was already queued this run");
            }
        }
        Command::Clear => {
            queue.clear();
            println!("Queue cleared");
        }
        Command::Queue => {
            let items = queue.queue();
            if items.is_empty() {
                println!("Queue is empty");
            }
            for (n, item) in items.iter().enumerate() {
                println!("  {:>3}. {} ({})", n + 1, item.display_name, item.user_id);
            }
        }
        Command::Stats => {
            let stats = queue.stats();
            println!(
                "processed {} | sent {} | skipped {} | errors {} | queued {} | worker {}",
                stats.total_processed,
                stats.successful,
                stats.skipped,
                stats.errors,
                stats.queue_size,
                if queue.is_worker_running() { "busy" } else { "idle" }
            );
        }
        Command::Status => {
            let status = monitor.status().await;
            println!("running: {}", status.is_running);
            if let Some(path) = &status.log_file {
                println!("log: {}", path.display());
            }
            match &status.current_world {
                Some(world) => println!(
                    "world: {} ({}:{})",
                    world.world_name.as_deref().unwrap_or("?"),
                    world.world_id.as_deref().unwrap_or("?"),
                    world.instance_id.as_deref().unwrap_or("?")
                ),
                None => println!("world: unknown"),
            }
            if let Some(at) = status.last_activity {
                println!("last activity: {}", at.to_rfc3339());
            }
        }
        Command::Scan => match monitor.read_new_lines().await {
            ReadPass::Read { forwarded, truncated } => {
                println!("read pass: {forwarded} events{}", if truncated { " (file truncated)" } else { "" })
            }
            ReadPass::Busy => println!("a read pass is already running"),
            ReadPass::NoFile => println!("no log file yet"),
            ReadPass::Stopped => println!("monitor is stopped"),
            ReadPass::Failed => println!("read failed, see log"),
        },
        Command::Help => {
            println!("add <user_id> [name]  queue an invite by hand");
            println!("clear                 drop everything still queued");
            println!("queue                 list queued users");
            println!("stats                 invite counters for this run");
            println!("status                current log file and world");
            println!("scan                  read the log now");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(
            parse_command("add usr_1 Mika (JP)"),
            Some(Command::Add {
                user_id: "usr_1".to_string(),
                display_name: "Mika (JP)".to_string()
            })
        );
        assert_eq!(
            parse_command("  add   usr_2  "),
            Some(Command::Add {
                user_id: "usr_2".to_string(),
                display_name: "usr_2".to_string()
            })
        );
        assert_eq!(parse_command("add"), None);
        assert_eq!(parse_command("clear"), Some(Command::Clear));
        assert_eq!(parse_command("scan"), Some(Command::Scan));
        assert_eq!(parse_command("?"), Some(Command::Help));
        assert_eq!(parse_command("invite everyone"), None);
    }

    #[test]
    fn only_remote_joins_are_invited() {
        let join = EventKind::PlayerJoin {
            user_id: "usr_1".to_string(),
            display_name: "Kaz".to_string(),
        };
        assert_eq!(
            should_invite(&join, true, Some("Me")),
            Some(("usr_1".to_string(), "Kaz".to_string()))
        );
        assert_eq!(should_invite(&join, true, Some("Kaz")), None);
        assert_eq!(should_invite(&join, false, None), None);

        let leave = EventKind::PlayerLeave {
            user_id: "usr_1".to_string(),
            display_name: "Kaz".to_string(),
        };
        assert_eq!(should_invite(&leave, true, None), None);
    }
}
