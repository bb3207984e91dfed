//! Upload progress checkpoints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Highest percent a non-terminal checkpoint may carry
pub const MAX_IN_FLIGHT_PERCENT: u8 = 99;

/// Percent carried by the terminal checkpoint
pub const COMPLETE_PERCENT: u8 = 100;

/// Phase label of the checkpoint written by `complete`
pub const PHASE_COMPLETED: &str = "completed";

/// Phase label of the checkpoint written by `fail`
pub const PHASE_FAILED: &str = "failed";

/// Phase label of the synthetic checkpoint emitted when a feed goes quiet
pub const PHASE_TIMEOUT_COMPLETED: &str = "timeout_completed";

/// One recorded progress observation
///
/// Serialized with the field names polling clients already consume
/// (`progress`, `step`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(rename = "progress")]
    pub percent: u8,
    #[serde(rename = "step")]
    pub phase: String,
    /// Seconds since the operation's first checkpoint
    pub elapsed_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    /// True for checkpoints that end a progress feed
    pub fn is_terminal(&self) -> bool {
        self.percent >= COMPLETE_PERCENT || self.phase == PHASE_COMPLETED || self.is_failure()
    }

    pub fn is_failure(&self) -> bool {
        self.phase == PHASE_FAILED
    }
}

/// Status summary returned by the polling endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    InProgress,
    Completed,
    Failed,
    NotFound,
}
