//! Run records stored by the repository.

use chrono::NaiveDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Search,
    Reconcile,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunKind::Search => "search",
            RunKind::Reconcile => "reconcile",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Stopped,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Stopped => "stopped",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse_status(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "stopped" => Some(RunStatus::Stopped),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Run {
    /// Insertion order; breaks ties between runs started in the same second.
    pub seq: i64,
    pub id: String,
    pub kind: String,
    pub status: Option<RunStatus>,
    pub message: String,
    pub total: i64,
    pub started_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
}

impl Run {
    pub fn is_newer_than(&self, other: &Run) -> bool {
        (self.started_at, self.seq) > (other.started_at, other.seq)
    }
}
