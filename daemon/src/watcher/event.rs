//! Typed events recognised in the upstream log.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// What a single log line means.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    WorldEnter {
        world_name: String,
    },
    InstanceJoin {
        world_id: String,
        instance_id: String,
        region: Option<String>,
    },
    PlayerJoin {
        user_id: String,
        display_name: String,
    },
    PlayerLeave {
        user_id: String,
        display_name: String,
    },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::WorldEnter { .. } => "world_enter",
            EventKind::InstanceJoin { .. } => "instance_join",
            EventKind::PlayerJoin { .. } => "player_join",
            EventKind::PlayerLeave { .. } => "player_leave",
        }
    }
}

/// An event as delivered to consumers, stamped when it was detected
/// (not when the upstream application logged it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainEvent {
    pub detected_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl DomainEvent {
    pub fn now(kind: EventKind) -> Self {
        Self {
            detected_at: Utc::now(),
            kind,
        }
    }
}
