use tracing::info;

/// One progress update from a running batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    pub message: String,
    pub item: String,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.current as f64 / self.total as f64 * 100.0
    }
}

/// Fire-and-forget receiver of progress updates.
pub trait ProgressSink: Send + Sync {
    fn report(&self, update: Progress);
}

/// Writes progress to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, update: Progress) {
        info!(
            current = update.current,
            total = update.total,
            item = %update.item,
            "{} ({:.1}%)",
            update.message,
            update.percent()
        );
    }
}
