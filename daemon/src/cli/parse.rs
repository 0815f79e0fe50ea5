//! `invitewatch parse`: run a whole log file through the classifier and the
//! world tracker, printing the events a live watch would have emitted.

use std::collections::BTreeMap;
use std::path::Path;

use crate::config::Config;
use crate::error::Result;
use crate::watcher::{EventKind, LogParser, WorldTracker};

#[derive(Debug, Default)]
pub struct ParseReport {
    pub total_lines: usize,
    /// Emitted events with their 1-based line number.
    pub events: Vec<(usize, EventKind)>,
    /// Leaves dropped because the local actor was changing worlds.
    pub suppressed: usize,
    pub counts: BTreeMap<&'static str, usize>,
}

pub fn parse_file(path: &Path, parser: &LogParser, local_actor: Option<String>) -> Result<ParseReport> {
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);
    let mut tracker = WorldTracker::new(local_actor);
    let mut report = ParseReport::default();

    for (n, line) in text.lines().enumerate() {
        report.total_lines += 1;
        let Some(kind) = parser.classify(line) else {
            continue;
        };
        match tracker.observe(kind) {
            Some(event) => {
                *report.counts.entry(event.name()).or_insert(0) += 1;
                report.events.push((n + 1, event));
            }
            None => report.suppressed += 1,
        }
    }

    Ok(report)
}

pub fn run(file: &Path, local_actor: Option<String>, json: bool) -> Result<()> {
    let config = Config::load()?;
    let parser = LogParser::new(&config.patterns)?;
    let report = parse_file(file, &parser, local_actor.or(config.local_actor))?;

    for (line, event) in &report.events {
        if json {
            println!("{}", serde_json::to_string(&serde_json::json!({ "line": line, "event": event }))?);
        } else {
            println!("{:>7}  {}", line, describe(event));
        }
    }

    if !json {
        println!();
        println!("{} lines, {} events", report.total_lines, report.events.len());
        for (name, count) in &report.counts {
            println!("  {name}: {count}");
        }
        if report.suppressed > 0 {
            println!("  suppressed leaves: {}", report.suppressed);
        }
    }
    Ok(())
}

fn describe(event: &EventKind) -> String {
    match event {
        EventKind::WorldEnter { world_name } => format!("enter   {world_name}"),
        EventKind::InstanceJoin {
            world_id,
            instance_id,
            region,
        } => match region {
            Some(region) => format!("join    {world_id}:{instance_id} [{region}]"),
            None => format!("join    {world_id}:{instance_id}"),
        },
        EventKind::PlayerJoin {
            user_id,
            display_name,
        } => format!("+player {display_name} ({user_id})"),
        EventKind::PlayerLeave {
            user_id,
            display_name,
        } => format!("-player {display_name} ({user_id})"),
    }
}
