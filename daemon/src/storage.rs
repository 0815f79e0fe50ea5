//! SQLite invite history.
//!
//! Every terminal outcome is appended with the run it belongs to and the
//! instance the local actor was in at the time. Nothing here feeds back into
//! the queue: the admission set is per run and lives in memory.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::error::{Error, Result};
use crate::queue::{InviteOutcome, QueueItem};
use crate::watcher::WorldContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub run_id: String,
    pub user_id: String,
    pub display_name: String,
    pub outcome: String,
    pub detail: Option<String>,
    pub world_name: Option<String>,
    pub instance_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistorySummary {
    pub total: u64,
    pub successful: u64,
    pub skipped: u64,
    pub errors: u64,
    pub last_recorded_at: Option<DateTime<Utc>>,
}

/// Owns the SQLite connection.
pub struct HistoryStore {
    conn: Connection,
}

impl HistoryStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    /// In-memory database (for tests and `--dry-run`).
    pub fn in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS invite_history (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id        TEXT NOT NULL,
                user_id       TEXT NOT NULL,
                display_name  TEXT NOT NULL,
                outcome       TEXT NOT NULL,
                detail        TEXT,
                world_name    TEXT,
                instance_id   TEXT,
                enqueued_at   TEXT NOT NULL,
                recorded_at   TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_history_recorded ON invite_history(recorded_at);
            CREATE INDEX IF NOT EXISTS idx_history_user ON invite_history(user_id);
            ",
        )?;
        Ok(())
    }

    pub fn record(
        &self,
        run_id: &str,
        item: &QueueItem,
        outcome: &InviteOutcome,
        world: Option<&WorldContext>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO invite_history
                (run_id, user_id, display_name, outcome, detail, world_name, instance_id,
                 enqueued_at, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                run_id,
                item.user_id,
                item.display_name,
                outcome.label(),
                outcome.detail(),
                world.and_then(|w| w.world_name.as_deref()),
                world.and_then(|w| w.instance_id.as_deref()),
                item.enqueued_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Most recent records first.
    pub fn recent(&self, limit: usize) -> Result<Vec<HistoryRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, user_id, display_name, outcome, detail, world_name, instance_id,
                    recorded_at
             FROM invite_history
             ORDER BY id DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            let recorded_at: String = row.get(7)?;
            Ok(HistoryRecord {
                run_id: row.get(0)?,
                user_id: row.get(1)?,
                display_name: row.get(2)?,
                outcome: row.get(3)?,
                detail: row.get(4)?,
                world_name: row.get(5)?,
                instance_id: row.get(6)?,
                recorded_at: parse_timestamp(&recorded_at).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        7,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?,
            })
        })?;

        let records = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn summary(&self) -> Result<HistorySummary> {
        let (total, successful, skipped, errors, last): (i64, i64, i64, i64, Option<String>) =
            self.conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(outcome = 'success'), 0),
                        COALESCE(SUM(outcome = 'skipped'), 0),
                        COALESCE(SUM(outcome = 'error'), 0),
                        MAX(recorded_at)
                 FROM invite_history",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )?;

        Ok(HistorySummary {
            total: total as u64,
            successful: successful as u64,
            skipped: skipped as u64,
            errors: errors as u64,
            last_recorded_at: last.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::History(format!("bad timestamp {value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::queue::outcome::SkipReason;
    use crate::queue::ErrorKind;

    fn item(id: &str) -> QueueItem {
        QueueItem {
            user_id: id.to_string(),
            display_name: format!("name of {id}"),
            enqueued_at: Utc::now(),
        }
    }

    #[test]
    fn records_and_lists_newest_first() {
        let store = HistoryStore::in_memory().unwrap();
        let world = WorldContext {
            world_name: Some("Plaza".to_string()),
            instance_id: Some("123".to_string()),
            ..WorldContext::default()
        };

        store
            .record("run-1", &item("usr_a"), &InviteOutcome::Success, Some(&world))
            .unwrap();
        store
            .record(
                "run-1",
                &item("usr_b"),
                &InviteOutcome::Skipped {
                    reason: SkipReason::NotFound,
                },
                None,
            )
            .unwrap();

        let records = store.recent(10).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].user_id, "usr_b");
        assert_eq!(records[0].outcome, "skipped");
        assert_eq!(records[0].detail.as_deref(), Some("not_found"));
        assert_eq!(records[1].world_name.as_deref(), Some("Plaza"));
        assert_eq!(records[1].instance_id.as_deref(), Some("123"));

        assert_eq!(store.recent(1).unwrap().len(), 1);
    }

    #[test]
    fn summary_counts_outcomes() {
        let store = HistoryStore::in_memory().unwrap();
        assert_eq!(store.summary().unwrap(), HistorySummary::default());

        store
            .record("r", &item("usr_a"), &InviteOutcome::Success, None)
            .unwrap();
        store
            .record(
                "r",
                &item("usr_b"),
                &InviteOutcome::Error {
                    kind: ErrorKind::RateLimited,
                    message: "rate limited".to_string(),
                },
                None,
            )
            .unwrap();

        let summary = store.summary().unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.errors, 1);
        assert!(summary.last_recorded_at.is_some());
    }

    #[test]
    fn bad_timestamp_is_a_history_error() {
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(Error::History(_))
        ));

        let store = HistoryStore::in_memory().unwrap();
        store
            .conn
            .execute(
                "INSERT INTO invite_history
                    (run_id, user_id, display_name, outcome, enqueued_at, recorded_at)
                 VALUES ('r', 'usr_a', 'A', 'success', 'x', 'garbage')",
                [],
            )
            .unwrap();
        assert!(matches!(store.summary(), Err(Error::History(_))));
    }

    #[test]
    fn persists_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub").join("history.db");
        {
            let store = HistoryStore::open(&path).unwrap();
            store
                .record("r", &item("usr_a"), &InviteOutcome::Success, None)
                .unwrap();
        }
        let store = HistoryStore::open(&path).unwrap();
        assert_eq!(store.summary().unwrap().total, 1);
    }
}
