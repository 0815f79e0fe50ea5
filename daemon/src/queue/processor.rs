//! Deduplicating invite queue with a single paced worker.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use super::outcome::InviteOutcome;
use super::policy::SharedPolicy;
use crate::api::InviteClient;

/// How long an empty queue is given to refill before the worker exits.
pub const IDLE_RECHECK: Duration = Duration::from_secs(1);

/// Delay after a non-success outcome. Below the smallest success delay.
pub const ERROR_DELAY: Duration = Duration::from_millis(300);

/// A user waiting to be invited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueItem {
    pub user_id: String,
    pub display_name: String,
    pub enqueued_at: DateTime<Utc>,
}

/// Cumulative counters for the current run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total_processed: u64,
    pub successful: u64,
    pub skipped: u64,
    pub errors: u64,
    pub queue_size: usize,
}

impl QueueStats {
    fn record(&mut self, outcome: &InviteOutcome) {
        self.total_processed += 1;
        match outcome {
            InviteOutcome::Success => self.successful += 1,
            InviteOutcome::Skipped { .. } => self.skipped += 1,
            InviteOutcome::Error { .. } => self.errors += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    /// Queue depth reached `queue_threshold`.
    Threshold,
    /// `batch_count` consecutive successes.
    BatchCooldown,
}

/// Everything the worker reports to its consumer, in order.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    Enqueued(QueueItem),
    Processing(QueueItem),
    Outcome {
        item: QueueItem,
        outcome: InviteOutcome,
    },
    Paused {
        reason: PauseReason,
        duration: Duration,
    },
    Stats(QueueStats),
    /// The queue drained and the worker exited.
    Idle,
}

#[derive(Debug)]
struct QueueState {
    fifo: VecDeque<QueueItem>,
    /// Every user id ever admitted this run.
    admitted: HashSet<String>,
    stats: QueueStats,
    worker_running: bool,
    /// Consecutive successes since the last batch cooldown. Survives the
    /// worker going idle.
    batch: u32,
}

/// FIFO of pending invites drained by one paced worker task.
///
/// Cloning is cheap; clones share the same queue. The worker is spawned on
/// the current tokio runtime by [`QueueProcessor::add`] and exits on its own
/// once the queue stays empty, so there is nothing to shut down.
#[derive(Clone)]
pub struct QueueProcessor {
    client: Arc<dyn InviteClient>,
    policy: SharedPolicy,
    events: UnboundedSender<QueueEvent>,
    state: Arc<Mutex<QueueState>>,
}

impl QueueProcessor {
    pub fn new(
        client: Arc<dyn InviteClient>,
        policy: SharedPolicy,
        events: UnboundedSender<QueueEvent>,
    ) -> Self {
        Self {
            client,
            policy,
            events,
            state: Arc::new(Mutex::new(QueueState {
                fifo: VecDeque::new(),
                admitted: HashSet::new(),
                stats: QueueStats::default(),
                worker_running: false,
                batch: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: QueueEvent) {
        if self.events.send(event).is_err() {
            debug!("Queue event receiver dropped");
        }
    }

    /// Enqueue a user unless they were already admitted this run.
    ///
    /// Must be called from within a tokio runtime: the first add after the
    /// queue went idle spawns the worker.
    pub fn add(&self, user_id: &str, display_name: &str) -> bool {
        let (item, spawn_worker) = {
            let mut state = self.lock();
            if !state.admitted.insert(user_id.to_string()) {
                debug!(user_id, "Already admitted, not queueing");
                return false;
            }
            let item = QueueItem {
                user_id: user_id.to_string(),
                display_name: display_name.to_string(),
                enqueued_at: Utc::now(),
            };
            state.fifo.push_back(item.clone());
            state.stats.queue_size = state.fifo.len();
            let spawn_worker = !state.worker_running;
            state.worker_running = true;
            (item, spawn_worker)
        };

        info!(user_id, display_name, "Queued invite");
        self.emit(QueueEvent::Enqueued(item));

        if spawn_worker {
            let worker = self.clone();
            tokio::spawn(async move { worker.run_worker().await });
        }
        true
    }

    /// Drop every pending item. Admitted ids stay suppressed.
    pub fn clear(&self) {
        let stats = {
            let mut state = self.lock();
            let dropped = state.fifo.len();
            state.fifo.clear();
            state.stats.queue_size = 0;
            info!(dropped, "Cleared invite queue");
            state.stats
        };
        self.emit(QueueEvent::Stats(stats));
    }

    pub fn queue(&self) -> Vec<QueueItem> {
        self.lock().fifo.iter().cloned().collect()
    }

    pub fn stats(&self) -> QueueStats {
        self.lock().stats
    }

    pub fn is_worker_running(&self) -> bool {
        self.lock().worker_running
    }

    async fn run_worker(self) {
        info!("Queue worker started");
        // Set by a threshold pause; lets exactly one item through before
        // the depth is checked again.
        let mut released = false;

        loop {
            let policy = self.policy.get();

            if self.lock().fifo.is_empty() {
                tokio::time::sleep(IDLE_RECHECK).await;
                let mut state = self.lock();
                if state.fifo.is_empty() {
                    state.worker_running = false;
                    drop(state);
                    info!("Queue drained, worker exiting");
                    self.emit(QueueEvent::Idle);
                    return;
                }
                released = false;
                continue;
            }

            let over_threshold = self.lock().fifo.len() >= policy.queue_threshold;
            if over_threshold && !released {
                let duration = policy.queue_pause();
                warn!(
                    depth = self.lock().fifo.len(),
                    threshold = policy.queue_threshold,
                    pause_secs = duration.as_secs(),
                    "Queue over threshold, pausing"
                );
                self.emit(QueueEvent::Paused {
                    reason: PauseReason::Threshold,
                    duration,
                });
                tokio::time::sleep(duration).await;
                released = true;
                continue;
            }
            released = false;

            let item = {
                let mut state = self.lock();
                let Some(item) = state.fifo.pop_front() else {
                    continue;
                };
                state.stats.queue_size = state.fifo.len();
                item
            };

            self.emit(QueueEvent::Processing(item.clone()));
            let outcome = InviteOutcome::from_result(self.client.invite(&item.user_id).await);

            let stats = {
                let mut state = self.lock();
                state.stats.record(&outcome);
                state.stats
            };
            match &outcome {
                InviteOutcome::Success => {
                    info!(user_id = %item.user_id, name = %item.display_name, "Invite sent")
                }
                InviteOutcome::Skipped { reason } => info!(
                    user_id = %item.user_id,
                    reason = reason.as_str(),
                    "Invite skipped"
                ),
                InviteOutcome::Error { kind, message } => warn!(
                    user_id = %item.user_id,
                    ?kind,
                    %message,
                    "Invite failed"
                ),
            }

            let success = outcome.is_success();
            self.emit(QueueEvent::Outcome { item, outcome });
            self.emit(QueueEvent::Stats(stats));

            let policy = self.policy.get();
            if success {
                let batch_done = {
                    let mut state = self.lock();
                    state.batch += 1;
                    if state.batch >= policy.batch_count {
                        state.batch = 0;
                        true
                    } else {
                        false
                    }
                };
                if batch_done {
                    let duration = policy.batch_delay();
                    debug!(secs = duration.as_secs(), "Batch complete, cooling down");
                    self.emit(QueueEvent::Paused {
                        reason: PauseReason::BatchCooldown,
                        duration,
                    });
                    tokio::time::sleep(duration).await;
                } else {
                    tokio::time::sleep(policy.inter_item_delay()).await;
                }
            } else {
                tokio::time::sleep(ERROR_DELAY).await;
            }
        }
    }
}
