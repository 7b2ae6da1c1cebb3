//! Shared value types: driver state, workflow step outcomes and execution
//! records.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ComponentName, ExecutionId};

// ---------------------------------------------------------------------------
// Driver state
// ---------------------------------------------------------------------------

/// Run state of a driver.
///
/// A driver is `Waiting` for the whole duration of `execute` (it waits on the
/// components it runs) and `Idle` otherwise, including after a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    /// Not executing.
    #[default]
    Idle,
    /// Inside `execute`.
    Waiting,
}

impl std::fmt::Display for DriverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Waiting => write!(f, "waiting"),
        }
    }
}

// ---------------------------------------------------------------------------
// Stop requests
// ---------------------------------------------------------------------------

/// A shareable stop request flag.
///
/// Clones observe the same flag, so a handle can be given to a component, a
/// signal handler or a watchdog thread. Raising it never interrupts a running
/// component; loops check it between units of work.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    /// Creates a lowered flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Withdraws the request.
    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Whether a stop has been requested.
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Workflow stepping
// ---------------------------------------------------------------------------

/// Result of advancing a container's workflow by a single unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// The named member was run.
    Ran(ComponentName),
    /// Every member has run; the next step starts a fresh pass.
    Finished,
}

// ---------------------------------------------------------------------------
// Execution records
// ---------------------------------------------------------------------------

/// Summary of one driver `execute` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Correlation identifier also recorded on the tracing span.
    pub id: ExecutionId,
    /// When `execute` was entered.
    pub started_at: Timestamp,
    /// When `execute` returned. `None` while still running.
    pub finished_at: Option<Timestamp>,
    /// Number of completed `run_iteration` calls.
    pub iterations: u64,
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
