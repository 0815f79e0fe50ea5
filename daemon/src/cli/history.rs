//! `invitewatch history`: recent invite outcomes across runs.

use crate::config;
use crate::error::Result;
use crate::storage::{HistoryRecord, HistoryStore};

pub fn run(limit: usize) -> Result<()> {
    let path = config::history_path()?;
    if !path.exists() {
        println!("No invite history yet.");
        return Ok(());
    }

    let store = HistoryStore::open(&path)?;
    let records = store.recent(limit)?;
    if records.is_empty() {
        println!("No invite history yet.");
        return Ok(());
    }

    for record in records.iter().rev() {
        println!("{}", format_record(record));
    }

    let summary = store.summary()?;
    println!();
    println!(
        "{} total: {} sent, {} skipped, {} errors",
        summary.total, summary.successful, summary.skipped, summary.errors
    );
    Ok(())
}

fn format_record(record: &HistoryRecord) -> String {
    let mut line = format!(
        "{}  {:<8} {} ({})",
        record.recorded_at.format("%Y-%m-%d %H:%M:%S"),
        record.outcome,
        record.display_name,
        record.user_id
    );
    if let Some(detail) = &record.detail {
        line.push_str(&format!(" [{detail}]"));
    }
    if let Some(world) = &record.world_name {
        line.push_str(&format!(" in {world}"));
    }
    line
}
