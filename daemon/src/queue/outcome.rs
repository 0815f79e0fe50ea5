//! Classification of invite call results.

use serde::{Deserialize, Serialize};

use crate::api::ApiResponse;
use crate::error::Error;

/// Why an invite was skipped rather than sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyMember,
    AlreadyInvited,
    NotFound,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::AlreadyMember => "already_member",
            SkipReason::AlreadyInvited => "already_invited",
            SkipReason::NotFound => "not_found",
        }
    }
}

/// Error category, so consumers can react to an expired session differently
/// from a generic failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimited,
    SessionExpired,
    Request,
    Transport,
}

/// Terminal result of one queue item. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InviteOutcome {
    Success,
    Skipped { reason: SkipReason },
    Error { kind: ErrorKind, message: String },
}

impl InviteOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, InviteOutcome::Success)
    }

    /// Short label used in logs and the history table.
    pub fn label(&self) -> &'static str {
        match self {
            InviteOutcome::Success => "success",
            InviteOutcome::Skipped { .. } => "skipped",
            InviteOutcome::Error { .. } => "error",
        }
    }

    pub fn detail(&self) -> Option<String> {
        match self {
            InviteOutcome::Success => None,
            InviteOutcome::Skipped { reason } => Some(reason.as_str().to_string()),
            InviteOutcome::Error { message, .. } => Some(message.clone()),
        }
    }

    pub fn from_response(response: &ApiResponse) -> Self {
        match response.status {
            200 | 201 => InviteOutcome::Success,
            400 if response.message.to_lowercase().contains("already") => {
                let reason = if response.message.to_lowercase().contains("invite") {
                    SkipReason::AlreadyInvited
                } else {
                    SkipReason::AlreadyMember
                };
                InviteOutcome::Skipped { reason }
            }
            404 => InviteOutcome::Skipped {
                reason: SkipReason::NotFound,
            },
            429 => InviteOutcome::Error {
                kind: ErrorKind::RateLimited,
                message: "rate limited".to_string(),
            },
            401 | 403 => InviteOutcome::Error {
                kind: ErrorKind::SessionExpired,
                message: "session expired".to_string(),
            },
            status => InviteOutcome::Error {
                kind: ErrorKind::Request,
                message: if response.message.is_empty() {
                    format!("HTTP {status}")
                } else {
                    response.message.clone()
                },
            },
        }
    }

    pub fn from_result(result: Result<ApiResponse, Error>) -> Self {
        match result {
            Ok(response) => Self::from_response(&response),
            Err(e) => InviteOutcome::Error {
                kind: ErrorKind::Transport,
                message: e.to_string(),
            },
        }
    }
}
