//! Pacing policy for the invite queue.

use std::ops::RangeInclusive;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const BATCH_COUNT_RANGE: RangeInclusive<u32> = 1..=50;
pub const BATCH_DELAY_RANGE: RangeInclusive<u64> = 1..=300;
pub const INTER_ITEM_DELAY_RANGE: RangeInclusive<f64> = 0.5..=60.0;
pub const QUEUE_THRESHOLD_RANGE: RangeInclusive<usize> = 10..=500;
pub const QUEUE_PAUSE_RANGE: RangeInclusive<u64> = 60..=3600;

/// Pacing constraints applied by the queue worker.
///
/// Every field is bounded; use [`RateLimitPolicy::clamped`] before storing
/// a value that came from a user.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitPolicy {
    /// Consecutive successful invites before a batch cooldown.
    pub batch_count: u32,
    pub batch_delay_seconds: u64,
    pub inter_item_delay_seconds: f64,
    /// Queue depth at which the worker takes a hard pause.
    pub queue_threshold: usize,
    pub queue_pause_seconds: u64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            batch_count: 8,
            batch_delay_seconds: 12,
            inter_item_delay_seconds: 2.0,
            queue_threshold: 88,
            queue_pause_seconds: 600,
        }
    }
}

impl RateLimitPolicy {
    /// Return a copy with every field forced into its allowed range.
    pub fn clamped(self) -> Self {
        let inter_item = if self.inter_item_delay_seconds.is_nan() {
            Self::default().inter_item_delay_seconds
        } else {
            self.inter_item_delay_seconds.clamp(
                *INTER_ITEM_DELAY_RANGE.start(),
                *INTER_ITEM_DELAY_RANGE.end(),
            )
        };
        Self {
            batch_count: self
                .batch_count
                .clamp(*BATCH_COUNT_RANGE.start(), *BATCH_COUNT_RANGE.end()),
            batch_delay_seconds: self
                .batch_delay_seconds
                .clamp(*BATCH_DELAY_RANGE.start(), *BATCH_DELAY_RANGE.end()),
            inter_item_delay_seconds: inter_item,
            queue_threshold: self
                .queue_threshold
                .clamp(*QUEUE_THRESHOLD_RANGE.start(), *QUEUE_THRESHOLD_RANGE.end()),
            queue_pause_seconds: self
                .queue_pause_seconds
                .clamp(*QUEUE_PAUSE_RANGE.start(), *QUEUE_PAUSE_RANGE.end()),
        }
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_secs(self.batch_delay_seconds)
    }

    pub fn inter_item_delay(&self) -> Duration {
        Duration::from_secs_f64(self.inter_item_delay_seconds)
    }

    pub fn queue_pause(&self) -> Duration {
        Duration::from_secs(self.queue_pause_seconds)
    }
}

/// Live, shared view of the current policy.
///
/// The worker calls [`SharedPolicy::get`] before each pacing decision, so a
/// config reload takes effect on the next item.
#[derive(Debug, Clone, Default)]
pub struct SharedPolicy {
    inner: Arc<RwLock<RateLimitPolicy>>,
}

impl SharedPolicy {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            inner: Arc::new(RwLock::new(policy.clamped())),
        }
    }

    pub fn get(&self) -> RateLimitPolicy {
        match self.inner.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set(&self, policy: RateLimitPolicy) {
        let policy = policy.clamped();
        match self.inner.write() {
            Ok(mut guard) => *guard = policy,
            Err(poisoned) => *poisoned.into_inner() = policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_within_range() {
        let policy = RateLimitPolicy::default();
        assert_eq!(policy, policy.clamped());
    }

    #[test]
    fn clamps_each_field_independently() {
        let policy = RateLimitPolicy {
            batch_count: 0,
            batch_delay_seconds: 10_000,
            inter_item_delay_seconds: 0.1,
            queue_threshold: 3,
            queue_pause_seconds: 5,
        }
        .clamped();

        assert_eq!(policy.batch_count, 1);
        assert_eq!(policy.batch_delay_seconds, 300);
        assert_eq!(policy.inter_item_delay_seconds, 0.5);
        assert_eq!(policy.queue_threshold, 10);
        assert_eq!(policy.queue_pause_seconds, 60);
    }

    #[test]
    fn nan_delay_falls_back_to_default() {
        let policy = RateLimitPolicy {
            inter_item_delay_seconds: f64::NAN,
            ..RateLimitPolicy::default()
        }
        .clamped();
        assert_eq!(policy.inter_item_delay_seconds, 2.0);
    }

    #[test]
    fn shared_policy_sees_live_updates() {
        let shared = SharedPolicy::new(RateLimitPolicy::default());
        let reader = shared.clone();

        shared.set(RateLimitPolicy {
            batch_count: 99,
            ..RateLimitPolicy::default()
        });

        assert_eq!(reader.get().batch_count, 50);
    }
}
