//! In-flight jobs keyed by their control-plane owner (a chat id for the bot).
//!
//! The registry is owned by whoever drives jobs and is passed in explicitly;
//! the search and reconcile code never sees it.
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::progress::{Progress, ProgressSink};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a {0} job is already running")]
    AlreadyRunning(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Search,
    Reconcile,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Search => "search",
            JobKind::Reconcile => "reconcile",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Completed,
    Stopped,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Stopped => "stopped",
            JobStatus::Failed => "failed",
        }
    }
}

/// What a finished job hands back: a summary line and the files it wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOutput {
    pub summary: String,
    pub files: Vec<PathBuf>,
}

impl JobOutput {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            files: Vec::new(),
        }
    }

    pub fn with_files(mut self, files: Vec<PathBuf>) -> Self {
        self.files = files;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub kind: JobKind,
    pub status: JobStatus,
    pub message: String,
    /// Files written by the job; empty until it ends.
    pub files: Vec<PathBuf>,
}

struct JobEntry {
    kind: JobKind,
    status: JobStatus,
    message: String,
    files: Vec<PathBuf>,
    cancel: CancellationToken,
}

#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<i64, JobEntry>>,
}

impl JobRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<i64, JobEntry>> {
        // A panic while holding the lock leaves the map itself consistent.
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts `job` for `key` unless one is already running there.
    ///
    /// The returned handle resolves to the final snapshot once the job ends;
    /// errors and panics in the job become a `failed` status.
    pub fn spawn<F, Fut>(
        self: &Arc<Self>,
        key: i64,
        kind: JobKind,
        job: F,
    ) -> Result<JoinHandle<JobSnapshot>, RegistryError>
    where
        F: FnOnce(CancellationToken, Arc<dyn ProgressSink>) -> Fut,
        Fut: Future<Output = anyhow::Result<JobOutput>> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        {
            let mut jobs = self.lock();
            if let Some(existing) = jobs.get(&key) {
                if existing.status == JobStatus::Running {
                    return Err(RegistryError::AlreadyRunning(existing.kind.as_str()));
                }
            }
            jobs.insert(
                key,
                JobEntry {
                    kind,
                    status: JobStatus::Running,
                    message: format!("{} started", kind.as_str()),
                    files: Vec::new(),
                    cancel: cancel.clone(),
                },
            );
        }

        let sink: Arc<dyn ProgressSink> = Arc::new(RegistryProgress {
            registry: Arc::clone(self),
            key,
        });
        let task = tokio::spawn(job(cancel.clone(), sink));
        let registry = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let (status, output) = match task.await {
                Ok(Ok(output)) if cancel.is_cancelled() => (JobStatus::Stopped, output),
                Ok(Ok(output)) => (JobStatus::Completed, output),
                Ok(Err(err)) => {
                    error!(key, kind = kind.as_str(), error = ?err, "job failed");
                    (JobStatus::Failed, JobOutput::new(format!("Error: {:#}", err)))
                }
                Err(join_err) => {
                    error!(key, kind = kind.as_str(), error = %join_err, "job panicked");
                    let message = format!("Error: job aborted: {}", join_err);
                    (JobStatus::Failed, JobOutput::new(message))
                }
            };
            info!(key, kind = kind.as_str(), status = status.as_str(), "job finished");
            registry.finish(key, status, output)
        }))
    }

    fn finish(&self, key: i64, status: JobStatus, output: JobOutput) -> JobSnapshot {
        let mut jobs = self.lock();
        match jobs.get_mut(&key) {
            Some(entry) => {
                entry.status = status;
                entry.message = output.summary;
                entry.files = output.files;
                snapshot_of(entry)
            }
            None => JobSnapshot {
                kind: JobKind::Search,
                status,
                message: output.summary,
                files: output.files,
            },
        }
    }

    /// Requests cancellation of the running job for `key`.
    pub fn stop(&self, key: i64) -> bool {
        let jobs = self.lock();
        match jobs.get(&key) {
            Some(entry) if entry.status == JobStatus::Running => {
                entry.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn snapshot(&self, key: i64) -> Option<JobSnapshot> {
        self.lock().get(&key).map(snapshot_of)
    }

    fn set_message(&self, key: i64, message: String) {
        if let Some(entry) = self.lock().get_mut(&key) {
            if entry.status == JobStatus::Running {
                entry.message = message;
            }
        }
    }
}

fn snapshot_of(entry: &JobEntry) -> JobSnapshot {
    JobSnapshot {
        kind: entry.kind,
        status: entry.status,
        message: entry.message.clone(),
        files: entry.files.clone(),
    }
}

/// Keeps the latest progress line of a job in the registry.
pub struct RegistryProgress {
    registry: Arc<JobRegistry>,
    key: i64,
}

impl ProgressSink for RegistryProgress {
    fn report(&self, update: Progress) {
        let line = format!(
            "{}/{} ({:.1}%) {} | {}",
            update.current,
            update.total,
            update.percent(),
            update.message,
            update.item
        );
        self.registry.set_message(self.key, line);
    }
}
