//! Rate-limited invite queue.

pub mod outcome;
pub mod policy;
pub mod processor;

pub use outcome::{ErrorKind, InviteOutcome};
pub use policy::{RateLimitPolicy, SharedPolicy};
pub use processor::{PauseReason, QueueEvent, QueueItem, QueueProcessor};
