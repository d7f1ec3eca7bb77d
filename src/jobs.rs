//! Search and reconcile jobs: run the core, write tables, record the run.
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::config::Config;
use crate::db::{self, Pool, RunKind, RunStatus, SqliteTables};
use crate::model::GroupRecord;
use crate::progress::ProgressSink;
use crate::provider::AccountContext;
use crate::reconcile::{ReconcileOutcome, ReconcileSettings, Reconciler, ReconciliationBatch};
use crate::report::{candidates, partition, write_partitions, GroupRow, Table, TableWriter};
use crate::search::{GroupSearcher, SearchOutcome, SearchSettings};
use crate::tables::CsvTables;

/// Everything a job needs; cheap to clone into spawned tasks.
#[derive(Clone)]
pub struct JobContext {
    pub cfg: Arc<Config>,
    pub pool: Pool,
    pub account: Arc<dyn AccountContext>,
}

#[derive(Debug)]
pub struct SearchReport {
    pub run_id: String,
    pub outcome: SearchOutcome,
    pub groups_file: PathBuf,
    pub channels_file: PathBuf,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

impl SearchReport {
    pub fn files(&self) -> Vec<PathBuf> {
        vec![self.groups_file.clone(), self.channels_file.clone()]
    }

    pub fn summary(&self) -> String {
        let verb = if self.outcome.cancelled {
            "Search stopped"
        } else {
            "Search finished"
        };
        format!(
            "{}. Found: {} groups, {} channels. Files: {}, {}",
            verb,
            self.outcome.groups.len(),
            self.outcome.channels.len(),
            file_name(&self.groups_file),
            file_name(&self.channels_file)
        )
    }
}

#[derive(Debug)]
pub struct ReconcileReport {
    pub run_id: String,
    pub outcome: ReconcileOutcome,
    pub ready: usize,
    pub still_pending: usize,
    pub ready_file: PathBuf,
    pub pending_file: PathBuf,
}

impl ReconcileReport {
    pub fn files(&self) -> Vec<PathBuf> {
        vec![self.ready_file.clone(), self.pending_file.clone()]
    }

    pub fn summary(&self) -> String {
        let verb = if self.outcome.cancelled {
            "Reconciliation stopped"
        } else {
            "Reconciliation finished"
        };
        format!(
            "{}. Ready: {}, still pending: {}. Files: {}, {}",
            verb,
            self.ready,
            self.still_pending,
            file_name(&self.ready_file),
            file_name(&self.pending_file)
        )
    }
}

fn stamp(cancelled: bool) -> String {
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    if cancelled {
        format!("stopped_{}", ts)
    } else {
        ts
    }
}

fn run_status(cancelled: bool) -> RunStatus {
    if cancelled {
        RunStatus::Stopped
    } else {
        RunStatus::Completed
    }
}

/// Marks the run failed before handing the error back.
async fn fail_run<T>(pool: &Pool, run_id: &str, err: anyhow::Error) -> Result<T> {
    error!(run_id, error = ?err, "run failed");
    if let Err(db_err) = db::finish_run(pool, run_id, RunStatus::Failed, &format!("{:#}", err)).await {
        error!(run_id, error = ?db_err, "failed to record run failure");
    }
    Err(err)
}

#[instrument(skip_all, fields(queries = queries.len()))]
pub async fn run_search(
    ctx: &JobContext,
    queries: &[String],
    cancel: &CancellationToken,
    progress: Option<Arc<dyn ProgressSink>>,
) -> Result<SearchReport> {
    let run_id = db::create_run(&ctx.pool, RunKind::Search, queries.len()).await?;
    let searcher = GroupSearcher::new(ctx.account.as_ref(), SearchSettings::from(&ctx.cfg.search));
    let outcome = searcher.search(queries, cancel, progress).await;

    let csv = CsvTables::in_dir(&ctx.cfg.app.results_dir(), &stamp(outcome.cancelled));
    let sqlite = SqliteTables::new(ctx.pool.clone(), run_id.clone());
    if let Err(err) = write_search_tables(&[&csv as &dyn TableWriter, &sqlite], &outcome).await {
        return fail_run(&ctx.pool, &run_id, err).await;
    }

    let report = SearchReport {
        groups_file: csv.path(Table::Groups),
        channels_file: csv.path(Table::Channels),
        run_id,
        outcome,
    };
    db::finish_run(&ctx.pool, &report.run_id, run_status(report.outcome.cancelled), &report.summary()).await?;
    info!(run_id = %report.run_id, "{}", report.summary());
    Ok(report)
}

async fn write_search_tables(writers: &[&dyn TableWriter], outcome: &SearchOutcome) -> Result<()> {
    let groups: Vec<GroupRow> = outcome.groups.iter().map(GroupRow::from_record).collect();
    let channels: Vec<GroupRow> = outcome.channels.iter().map(GroupRow::from_record).collect();
    for writer in writers {
        writer.write_table(Table::Groups, &groups).await?;
        writer.write_table(Table::Channels, &channels).await?;
    }
    Ok(())
}

#[instrument(skip_all, fields(records = records.len()))]
pub async fn run_reconcile(
    ctx: &JobContext,
    records: Vec<GroupRecord>,
    cancel: &CancellationToken,
    progress: Option<Arc<dyn ProgressSink>>,
) -> Result<ReconcileReport> {
    let run_id = db::create_run(&ctx.pool, RunKind::Reconcile, records.len()).await?;
    let reconciler = Reconciler::new(ctx.account.as_ref(), ReconcileSettings::from(&ctx.cfg.reconcile));
    let mut batch = ReconciliationBatch::new(records, cancel.clone());
    if let Some(sink) = progress {
        batch = batch.with_progress(sink);
    }

    let outcome = match reconciler.run(batch).await {
        Ok(outcome) => outcome,
        Err(err) => return fail_run(&ctx.pool, &run_id, err).await,
    };

    let partitions = partition(outcome.results_with_stopped());
    let csv = CsvTables::in_dir(&ctx.cfg.app.results_dir(), &stamp(outcome.cancelled));
    let sqlite = SqliteTables::new(ctx.pool.clone(), run_id.clone());
    for writer in [&csv as &dyn TableWriter, &sqlite] {
        if let Err(err) = write_partitions(writer, &partitions).await {
            return fail_run(&ctx.pool, &run_id, err).await;
        }
    }

    let report = ReconcileReport {
        ready: partitions.ready.len(),
        still_pending: partitions.still_pending.len(),
        ready_file: csv.path(Table::Ready),
        pending_file: csv.path(Table::Pending),
        run_id,
        outcome,
    };
    db::finish_run(&ctx.pool, &report.run_id, run_status(report.outcome.cancelled), &report.summary()).await?;
    info!(run_id = %report.run_id, "{}", report.summary());
    Ok(report)
}

/// Records to re-check: the still-pending table of the newest reconcile
/// run, plus the groups of the newest search run when that search finished
/// after it. Forum topics and repeated identities are dropped.
pub async fn pending_candidates(pool: &Pool) -> Result<Vec<GroupRecord>> {
    let reconcile = db::latest_run(pool, RunKind::Reconcile)
        .await
        .context("failed to load previous reconciliation")?;
    let search = db::latest_run(pool, RunKind::Search)
        .await
        .context("failed to load previous search")?;

    let mut rows = Vec::new();
    if let Some(run) = &reconcile {
        rows.extend(db::load_rows(pool, &run.id, Table::Pending).await?);
    }
    if let Some(run) = &search {
        if reconcile.as_ref().map_or(true, |r| run.is_newer_than(r)) {
            rows.extend(db::load_rows(pool, &run.id, Table::Groups).await?);
        }
    }
    Ok(candidates(&rows))
}
