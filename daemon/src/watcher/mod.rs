//! Log watching and parsing.

pub mod event;
pub mod file_watcher;
pub mod locator;
pub mod log_parser;
pub mod monitor;
pub mod tailer;
pub mod world_tracker;

pub use event::{DomainEvent, EventKind};
pub use file_watcher::{FileWatcher, WatchEvent};
pub use locator::{default_log_dir, LogFileConfig, LogLocator};
pub use log_parser::{LogParser, PatternConfig};
pub use monitor::{InstanceMonitor, MonitorOptions, ReadPass};
pub use tailer::bootstrap_scan;
pub use world_tracker::{WorldContext, WorldTracker};
