mod common;

use common::{FakeAccount, FakeGroup};
use std::sync::Arc;
use tg_groupsync::config::{self, Config};
use tg_groupsync::db::{self, RunStatus};
use tg_groupsync::error::ProviderError;
use tg_groupsync::jobs::{self, JobContext};
use tg_groupsync::model::{EntityKind, GroupRecord};
use tg_groupsync::tables;
use tokio_util::sync::CancellationToken;

async fn context(dir: &std::path::Path, fake: FakeAccount) -> JobContext {
    let mut cfg: Config = serde_yaml::from_str(config::example()).unwrap();
    cfg.app.data_dir = dir.display().to_string();
    cfg.search.delay_ms = 0;
    cfg.reconcile.inter_record_delay_seconds = 0;
    cfg.ensure_dirs().unwrap();

    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    JobContext {
        cfg: Arc::new(cfg),
        pool,
        account: Arc::new(fake),
    }
}

#[tokio::test]
async fn search_then_reconcile_feeds_pending_candidates() {
    let td = tempfile::tempdir().unwrap();
    let open = FakeGroup::new(1, "Cafe Open", Some("cafe_open")).member();
    let closed = FakeGroup::new(2, "Cafe Closed", None)
        .join_responses(vec![Err(ProviderError::ApprovalRequired)]);
    let news = FakeGroup::new(3, "Cafe News", None).channel();
    let found = vec![
        open.entity.clone(),
        closed.entity.clone(),
        news.entity.clone(),
    ];
    assert_eq!(news.entity.kind, EntityKind::Channel);
    let fake = FakeAccount::new(vec![open, closed, news]);
    fake.on_search("cafe", vec![Ok(found)]).await;
    let ctx = context(td.path(), fake).await;
    let cancel = CancellationToken::new();

    let search = jobs::run_search(&ctx, &["cafe".to_string()], &cancel, None)
        .await
        .unwrap();
    assert_eq!(search.outcome.groups.len(), 2);
    assert_eq!(search.outcome.channels.len(), 1);
    assert!(search.groups_file.exists());
    assert_eq!(tables::read_rows(&search.channels_file).unwrap().len(), 1);

    // the first reconciliation picks up the search groups
    let candidates: Vec<GroupRecord> = jobs::pending_candidates(&ctx.pool).await.unwrap();
    assert_eq!(candidates.len(), 2);

    let report = jobs::run_reconcile(&ctx, candidates, &cancel, None).await.unwrap();
    assert_eq!(report.ready, 1);
    assert_eq!(report.still_pending, 1);
    assert!(report.summary().starts_with("Reconciliation finished"));
    let run = db::get_run(&ctx.pool, &report.run_id).await.unwrap().unwrap();
    assert_eq!(run.status, Some(RunStatus::Completed));

    // afterwards only the still-pending group is offered again
    let again = jobs::pending_candidates(&ctx.pool).await.unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].numeric_id, Some(2));
    let from_csv = tables::read_records(&report.pending_file).unwrap();
    assert_eq!(from_csv, again);
}

#[tokio::test]
async fn stopped_reconciliation_saves_unvisited_records_as_pending() {
    let td = tempfile::tempdir().unwrap();
    let groups = vec![
        FakeGroup::new(1, "One", None).member(),
        FakeGroup::new(2, "Two", None).member(),
    ];
    let records: Vec<GroupRecord> = groups.iter().map(FakeGroup::record).collect();
    let ctx = context(td.path(), FakeAccount::new(groups)).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = jobs::run_reconcile(&ctx, records, &cancel, None).await.unwrap();
    assert!(report.outcome.cancelled);
    assert_eq!(report.ready, 0);
    assert_eq!(report.still_pending, 2);
    assert!(report
        .pending_file
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("pending_groups_stopped_"));
    let run = db::get_run(&ctx.pool, &report.run_id).await.unwrap().unwrap();
    assert_eq!(run.status, Some(RunStatus::Stopped));
}

#[tokio::test]
async fn newer_search_results_join_the_pending_candidates() {
    let td = tempfile::tempdir().unwrap();
    let open = FakeGroup::new(1, "Cafe Open", None).member();
    let closed = FakeGroup::new(2, "Cafe Closed", None)
        .join_responses(vec![Err(ProviderError::ApprovalRequired)]);
    let bar = FakeGroup::new(3, "Night Bar", None);
    let fake = FakeAccount::new(vec![open.clone(), closed.clone(), bar.clone()]);
    fake.on_search("cafe", vec![Ok(vec![open.entity.clone(), closed.entity.clone()])])
        .await;
    fake.on_search("bar", vec![Ok(vec![bar.entity.clone(), closed.entity.clone()])])
        .await;
    let ctx = context(td.path(), fake).await;
    let cancel = CancellationToken::new();

    jobs::run_search(&ctx, &["cafe".to_string()], &cancel, None)
        .await
        .unwrap();
    let first = jobs::pending_candidates(&ctx.pool).await.unwrap();
    let report = jobs::run_reconcile(&ctx, first, &cancel, None).await.unwrap();
    assert_eq!((report.ready, report.still_pending), (1, 1));

    jobs::run_search(&ctx, &["bar".to_string()], &cancel, None)
        .await
        .unwrap();
    let ids: Vec<Option<i64>> = jobs::pending_candidates(&ctx.pool)
        .await
        .unwrap()
        .iter()
        .map(|r| r.numeric_id)
        .collect();
    assert_eq!(ids, vec![Some(2), Some(3)]);
}

#[tokio::test]
async fn fresh_search_is_offered_after_an_all_ready_reconciliation() {
    let td = tempfile::tempdir().unwrap();
    let open = FakeGroup::new(1, "Cafe Open", None).member();
    let bar = FakeGroup::new(3, "Night Bar", None);
    let fake = FakeAccount::new(vec![open.clone(), bar.clone()]);
    fake.on_search("cafe", vec![Ok(vec![open.entity.clone()])]).await;
    fake.on_search("bar", vec![Ok(vec![bar.entity.clone()])]).await;
    let ctx = context(td.path(), fake).await;
    let cancel = CancellationToken::new();

    jobs::run_search(&ctx, &["cafe".to_string()], &cancel, None)
        .await
        .unwrap();
    let first = jobs::pending_candidates(&ctx.pool).await.unwrap();
    let report = jobs::run_reconcile(&ctx, first, &cancel, None).await.unwrap();
    assert_eq!((report.ready, report.still_pending), (1, 0));
    assert!(jobs::pending_candidates(&ctx.pool).await.unwrap().is_empty());

    jobs::run_search(&ctx, &["bar".to_string()], &cancel, None)
        .await
        .unwrap();
    let candidates = jobs::pending_candidates(&ctx.pool).await.unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].display_title, "Night Bar");
}
