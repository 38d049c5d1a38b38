//! Per-operation deadlines.

use std::time::Duration;

use tokio::time::Instant;

/// Creation time plus allowed duration of one operation.
///
/// Checked by the dispatch loop before every attempt; nothing cancels an
/// operation in the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationTimeout {
    created: Instant,
    duration: Duration,
}

impl OperationTimeout {
    /// Starts a deadline `duration` from now.
    pub fn new(duration: Duration) -> Self {
        Self {
            created: Instant::now(),
            duration,
        }
    }

    /// Allowed duration.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Time since the operation was created.
    pub fn elapsed(&self) -> Duration {
        self.created.elapsed()
    }

    /// Returns true once the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.duration
    }

    /// Time left, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.duration.saturating_sub(self.elapsed())
    }
}
