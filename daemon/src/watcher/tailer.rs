//! Incremental reads of an append-only log file.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::event::EventKind;
use super::log_parser::LogParser;
use crate::error::Result;

/// Read cursor into one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailState {
    pub path: PathBuf,
    pub byte_offset: u64,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Result of one read pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TailRead {
    /// Complete, trimmed, non-empty lines in file order.
    pub lines: Vec<String>,
    /// The file shrank; the cursor went back to 0 before reading.
    pub truncated: bool,
}

/// Owns a [`TailState`] and advances it.
#[derive(Debug)]
pub struct LogTailer {
    state: TailState,
    /// Bytes after the last newline, completed by a later pass.
    partial: Vec<u8>,
}

impl LogTailer {
    pub fn open_at(path: impl Into<PathBuf>, byte_offset: u64) -> Self {
        Self {
            state: TailState {
                path: path.into(),
                byte_offset,
                last_activity: None,
            },
            partial: Vec::new(),
        }
    }

    pub fn state(&self) -> &TailState {
        &self.state
    }

    pub fn path(&self) -> &Path {
        &self.state.path
    }

    /// Read whatever was appended since the last pass.
    ///
    /// If the file is now smaller than the cursor, the cursor is reset to 0
    /// and the pass reads the new content from the start, reporting
    /// `truncated`.
    pub fn read_new(&mut self) -> Result<TailRead> {
        let len = fs::metadata(&self.state.path)?.len();

        let truncated = len < self.state.byte_offset;
        if truncated {
            self.state.byte_offset = 0;
            self.partial.clear();
        }
        if len == self.state.byte_offset {
            return Ok(TailRead {
                lines: Vec::new(),
                truncated,
            });
        }

        let mut file = File::open(&self.state.path)?;
        file.seek(SeekFrom::Start(self.state.byte_offset))?;
        let mut buf = Vec::new();
        file.take(len - self.state.byte_offset).read_to_end(&mut buf)?;

        self.state.byte_offset += buf.len() as u64;
        if !buf.is_empty() {
            self.state.last_activity = Some(Utc::now());
        }

        self.partial.extend_from_slice(&buf);
        let Some(last_newline) = self.partial.iter().rposition(|b| *b == b'\n') else {
            return Ok(TailRead {
                lines: Vec::new(),
                truncated,
            });
        };
        let complete: Vec<u8> = self.partial.drain(..=last_newline).collect();

        Ok(TailRead {
            lines: split_lines(&complete),
            truncated,
        })
    }
}

fn split_lines(bytes: &[u8]) -> Vec<String> {
    bytes
        .split(|b| *b == b'\n')
        .map(|line| String::from_utf8_lossy(line).trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

/// Current-world facts recovered from an existing file.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Bootstrap {
    pub world_enter: Option<EventKind>,
    pub instance_join: Option<EventKind>,
    /// End of the last complete line when the file was scanned; live
    /// tailing starts here so a line still being written is read whole.
    pub end_offset: u64,
}

/// Scan `path` from the end for the latest world enter and instance join.
pub fn bootstrap_scan(path: &Path, parser: &LogParser) -> Result<Bootstrap> {
    let bytes = fs::read(path)?;
    let complete = bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |last_newline| last_newline + 1);
    let text = String::from_utf8_lossy(&bytes[..complete]);

    let mut found = Bootstrap {
        end_offset: complete as u64,
        ..Bootstrap::default()
    };
    for line in text.lines().rev() {
        match parser.classify(line) {
            Some(event @ EventKind::WorldEnter { .. }) if found.world_enter.is_none() => {
                found.world_enter = Some(event);
            }
            Some(event @ EventKind::InstanceJoin { .. }) if found.instance_join.is_none() => {
                found.instance_join = Some(event);
            }
            _ => {}
        }
        if found.world_enter.is_some() && found.instance_join.is_some() {
            break;
        }
    }

    Ok(found)
}
