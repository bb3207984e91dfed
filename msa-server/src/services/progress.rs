//! Upload progress tracker
//!
//! Keeps a short checkpoint history per operation id so clients can poll the
//! latest state or follow it as a stream. Records age out after a period of
//! inactivity; a background sweeper removes them.

use chrono::{DateTime, Utc};
use futures::Stream;
use msa_common::Clock;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::models::progress::{
    Checkpoint, COMPLETE_PERCENT, MAX_IN_FLIGHT_PERCENT, PHASE_COMPLETED, PHASE_FAILED,
    PHASE_TIMEOUT_COMPLETED,
};

/// Progress store errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProgressError {
    #[error("Unknown operation: {0}")]
    NotFound(String),

    /// The operation already completed or failed; later checkpoints are dropped
    #[error("Operation already completed: {0}")]
    AlreadyCompleted(String),
}

/// Progress tracker settings (`[progress]` section)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProgressSettings {
    /// Checkpoints kept per operation
    pub history_limit: usize,
    /// Idle time after which an operation is evicted
    pub idle_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    /// A subscription with no new checkpoint for this long is closed
    pub subscribe_timeout_secs: u64,
    /// Fallback poll period for subscribers
    pub poll_interval_ms: u64,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            history_limit: 100,
            idle_ttl_secs: 600,
            sweep_interval_secs: 60,
            subscribe_timeout_secs: 120,
            poll_interval_ms: 100,
        }
    }
}

#[derive(Debug)]
struct OperationLog {
    started_at: DateTime<Utc>,
    last_update: DateTime<Utc>,
    checkpoints: VecDeque<Checkpoint>,
    /// Checkpoints ever recorded, including ones trimmed from history
    recorded: u64,
    completed: bool,
}

impl OperationLog {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            started_at: now,
            last_update: now,
            checkpoints: VecDeque::new(),
            recorded: 0,
            completed: false,
        }
    }

    fn elapsed_seconds(&self, now: DateTime<Utc>) -> u64 {
        (now - self.started_at).num_seconds().max(0) as u64
    }

    fn push(&mut self, checkpoint: Checkpoint, limit: usize) {
        self.last_update = checkpoint.timestamp;
        self.checkpoints.push_back(checkpoint);
        self.recorded += 1;
        while self.checkpoints.len() > limit.max(1) {
            self.checkpoints.pop_front();
        }
    }

    /// Checkpoints recorded after the first `seen`, still in history
    fn since(&self, seen: u64) -> Vec<Checkpoint> {
        let first_kept = self.recorded - self.checkpoints.len() as u64;
        let skip = seen.saturating_sub(first_kept) as usize;
        self.checkpoints.iter().skip(skip).cloned().collect()
    }
}

/// Shared in-memory progress store
#[derive(Debug)]
pub struct ProgressStore {
    operations: RwLock<HashMap<String, OperationLog>>,
    changed: Notify,
    clock: Arc<dyn Clock>,
    settings: ProgressSettings,
}

impl ProgressStore {
    pub fn new(clock: Arc<dyn Clock>, settings: ProgressSettings) -> Self {
        Self {
            operations: RwLock::new(HashMap::new()),
            changed: Notify::new(),
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &ProgressSettings {
        &self.settings
    }

    /// Record a checkpoint, creating the operation on first use
    ///
    /// Percent is clamped to 0..=99; only `complete` may report 100.
    pub async fn record(&self, operation_id: &str, percent: i32, phase: &str) -> Result<Checkpoint, ProgressError> {
        let now = self.clock.now();
        let mut operations = self.operations.write().await;
        let log = operations
            .entry(operation_id.to_string())
            .or_insert_with(|| OperationLog::new(now));

        if log.completed {
            tracing::debug!(operation_id, phase, "Ignoring checkpoint after completion");
            return Err(ProgressError::AlreadyCompleted(operation_id.to_string()));
        }

        let checkpoint = Checkpoint {
            percent: percent.clamp(0, MAX_IN_FLIGHT_PERCENT as i32) as u8,
            phase: phase.to_string(),
            elapsed_seconds: log.elapsed_seconds(now),
            timestamp: now,
        };
        log.push(checkpoint.clone(), self.settings.history_limit);
        drop(operations);

        tracing::debug!(operation_id, percent = checkpoint.percent, phase, "Progress checkpoint");
        self.changed.notify_waiters();
        Ok(checkpoint)
    }

    /// Mark the operation finished with a `(100, "completed")` checkpoint
    ///
    /// Calling it again is a no-op.
    pub async fn complete(&self, operation_id: &str) -> Checkpoint {
        self.finish(operation_id, PHASE_COMPLETED, Some(COMPLETE_PERCENT)).await
    }

    /// End the operation with a `"failed"` checkpoint
    ///
    /// The checkpoint keeps the last in-flight percent so a failure never
    /// reads as 100%. Later `record` calls are rejected as after `complete`;
    /// an operation that already finished is left as it is.
    pub async fn fail(&self, operation_id: &str) -> Checkpoint {
        self.finish(operation_id, PHASE_FAILED, None).await
    }

    /// Append the terminal checkpoint; `percent: None` repeats the last one
    async fn finish(&self, operation_id: &str, phase: &str, percent: Option<u8>) -> Checkpoint {
        let now = self.clock.now();
        let mut operations = self.operations.write().await;
        let log = operations
            .entry(operation_id.to_string())
            .or_insert_with(|| OperationLog::new(now));

        if log.completed {
            if let Some(last) = log.checkpoints.back() {
                return last.clone();
            }
        }

        let percent = percent.unwrap_or_else(|| log.checkpoints.back().map(|c| c.percent).unwrap_or(0));
        let checkpoint = Checkpoint {
            percent,
            phase: phase.to_string(),
            elapsed_seconds: log.elapsed_seconds(now),
            timestamp: now,
        };
        log.completed = true;
        log.push(checkpoint.clone(), self.settings.history_limit);
        drop(operations);

        tracing::info!(operation_id, phase, percent, elapsed_seconds = checkpoint.elapsed_seconds, "Operation finished");
        self.changed.notify_waiters();
        checkpoint
    }

    /// Latest checkpoint of an operation
    pub async fn snapshot(&self, operation_id: &str) -> Result<Checkpoint, ProgressError> {
        self.operations
            .read()
            .await
            .get(operation_id)
            .and_then(|log| log.checkpoints.back().cloned())
            .ok_or_else(|| ProgressError::NotFound(operation_id.to_string()))
    }

    /// Remove an operation; returns false if it was not tracked
    pub async fn evict(&self, operation_id: &str) -> bool {
        let removed = self.operations.write().await.remove(operation_id).is_some();
        if removed {
            tracing::debug!(operation_id, "Progress record cleared");
        }
        removed
    }

    /// Evict every operation idle for at least the configured TTL
    pub async fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let ttl = chrono::Duration::seconds(self.settings.idle_ttl_secs as i64);
        let mut operations = self.operations.write().await;
        let before = operations.len();
        operations.retain(|_, log| now - log.last_update < ttl);
        let evicted = before - operations.len();

        if evicted > 0 {
            tracing::info!(evicted, remaining = operations.len(), "Evicted idle progress records");
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.operations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.operations.read().await.is_empty()
    }

    /// New checkpoints after `seen`, the updated count and the log's elapsed time
    async fn poll_since(&self, operation_id: &str, seen: u64) -> (Vec<Checkpoint>, u64, u64) {
        let now = self.clock.now();
        match self.operations.read().await.get(operation_id) {
            Some(log) => (log.since(seen), log.recorded, log.elapsed_seconds(now)),
            None => (Vec::new(), seen, 0),
        }
    }

    /// Follow an operation's checkpoints
    ///
    /// Replays the stored history, then yields new checkpoints as they are
    /// recorded. Ends after a terminal checkpoint. If nothing new arrives for
    /// the subscribe timeout, yields a `(100, "timeout_completed")` checkpoint
    /// and ends. Unknown operations are waited for under the same timeout.
    pub fn subscribe(self: Arc<Self>, operation_id: String) -> impl Stream<Item = Checkpoint> + Send + 'static {
        let quiet_limit = Duration::from_secs(self.settings.subscribe_timeout_secs);
        let poll_interval = Duration::from_millis(self.settings.poll_interval_ms.max(1));

        async_stream::stream! {
            let mut seen = 0u64;
            let mut last_activity = tokio::time::Instant::now();

            loop {
                // Registered before reading so a record in between is not missed
                let notified = self.changed.notified();

                let (fresh, recorded, elapsed_seconds) = self.poll_since(&operation_id, seen).await;
                seen = recorded;

                let mut terminal = false;
                if !fresh.is_empty() {
                    last_activity = tokio::time::Instant::now();
                }
                for checkpoint in fresh {
                    terminal = checkpoint.is_terminal();
                    yield checkpoint;
                    if terminal {
                        break;
                    }
                }
                if terminal {
                    break;
                }

                if last_activity.elapsed() >= quiet_limit {
                    tracing::info!(operation_id = %operation_id, "Progress feed idle, closing with timeout checkpoint");
                    yield Checkpoint {
                        percent: COMPLETE_PERCENT,
                        phase: PHASE_TIMEOUT_COMPLETED.to_string(),
                        elapsed_seconds,
                        timestamp: self.clock.now(),
                    };
                    break;
                }

                tokio::select! {
                    _ = notified => {}
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        }
    }
}

/// Periodically evict idle progress records until `cancel` fires
pub fn spawn_sweeper(store: Arc<ProgressStore>, cancel: CancellationToken) -> JoinHandle<()> {
    let period = Duration::from_secs(store.settings.sweep_interval_secs.max(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Progress sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    store.sweep_expired().await;
                }
            }
        }
    })
}
