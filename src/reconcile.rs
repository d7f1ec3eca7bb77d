//! Pending-group reconciliation loop.
//!
//! Records are processed one at a time:
//! resolve → (forum) enumerate topics → verify membership → join if needed →
//! classify → emit. A record's failure becomes an `error` result; only a
//! failure to identify the active account aborts the batch.
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::ReconcileConfig;
use crate::error::ProviderError;
use crate::join::{JoinOrchestrator, JoinOutcome};
use crate::membership::MembershipVerifier;
use crate::model::{ActionTaken, CheckResult, Entity, ForumTopic, GroupRecord};
use crate::progress::{Progress, ProgressSink};
use crate::provider::AccountContext;
use crate::report::{partition, Partitions};

#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub inter_record_delay: Duration,
    pub join_settle: Duration,
    pub max_join_wait: Duration,
    pub member_scan_limit: usize,
    pub dialog_scan_limit: usize,
    pub check_send_permission: bool,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self::from(&ReconcileConfig::default())
    }
}

impl From<&ReconcileConfig> for ReconcileSettings {
    fn from(cfg: &ReconcileConfig) -> Self {
        Self {
            inter_record_delay: cfg.inter_record_delay(),
            join_settle: cfg.join_settle(),
            max_join_wait: Duration::from_secs(cfg.max_join_wait_seconds),
            member_scan_limit: cfg.member_scan_limit,
            dialog_scan_limit: cfg.dialog_scan_limit,
            check_send_permission: cfg.check_send_permission,
        }
    }
}

/// The unit of work: records plus the means to stop and observe it.
pub struct ReconciliationBatch {
    pub records: Vec<GroupRecord>,
    pub cancel: CancellationToken,
    pub progress: Option<Arc<dyn ProgressSink>>,
}

impl ReconciliationBatch {
    pub fn new(records: Vec<GroupRecord>, cancel: CancellationToken) -> Self {
        Self {
            records,
            cancel,
            progress: None,
        }
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    /// One entry per processed record, plus one per emitted forum topic.
    pub results: Vec<(GroupRecord, CheckResult)>,
    /// Input records actually processed.
    pub processed: usize,
    /// Input records never reached because the batch was cancelled.
    pub skipped: Vec<GroupRecord>,
    pub cancelled: bool,
}

impl ReconcileOutcome {
    pub fn partitions(&self) -> Partitions {
        partition(self.results.iter().cloned())
    }

    /// Results followed by a `stopped` entry for every unvisited record.
    pub fn results_with_stopped(&self) -> Vec<(GroupRecord, CheckResult)> {
        self.results
            .iter()
            .cloned()
            .chain(self.skipped.iter().cloned().map(|r| (r, CheckResult::stopped())))
            .collect()
    }
}

pub struct Reconciler<'a> {
    account: &'a dyn AccountContext,
    settings: ReconcileSettings,
}

impl<'a> Reconciler<'a> {
    pub fn new(account: &'a dyn AccountContext, settings: ReconcileSettings) -> Self {
        Self { account, settings }
    }

    #[instrument(skip_all, fields(records = batch.records.len()))]
    pub async fn run(&self, batch: ReconciliationBatch) -> Result<ReconcileOutcome> {
        let me = self
            .account
            .me()
            .await
            .context("failed to identify the active account")?;
        let verifier = MembershipVerifier::new(
            self.account,
            me,
            self.settings.member_scan_limit,
            self.settings.dialog_scan_limit,
        );
        let joiner = JoinOrchestrator::new(
            self.account,
            &verifier,
            self.settings.max_join_wait,
            self.settings.join_settle,
        );

        let total = batch.records.len();
        let report = |current: usize, message: String, item: String| {
            if let Some(sink) = &batch.progress {
                sink.report(Progress {
                    current,
                    total,
                    message,
                    item,
                });
            }
        };

        let mut outcome = ReconcileOutcome::default();
        let mut records = batch.records.iter().enumerate().peekable();
        while let Some((idx, record)) = records.next() {
            if batch.cancel.is_cancelled() {
                info!(processed = outcome.processed, total, "reconciliation stopped");
                outcome.cancelled = true;
                outcome.skipped = batch.records[idx..].to_vec();
                break;
            }

            let label = record.label();
            report(idx, format!("Checking {}", label), label.clone());

            let emitted = self.check_record(&verifier, &joiner, record).await;
            let status = emitted
                .first()
                .map(|(_, r)| r.status.as_str())
                .unwrap_or("unknown");
            report(idx + 1, format!("{}: {}", status, label), label);
            outcome.results.extend(emitted);
            outcome.processed += 1;

            if records.peek().is_some() && !self.settings.inter_record_delay.is_zero() {
                tokio::select! {
                    _ = batch.cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.settings.inter_record_delay) => {}
                }
            }
        }

        let ready = outcome.results.iter().filter(|(_, r)| r.is_ready()).count();
        info!(
            processed = outcome.processed,
            ready,
            still_pending = outcome.results.len() - ready,
            cancelled = outcome.cancelled,
            "reconciliation finished"
        );
        Ok(outcome)
    }

    /// Runs the per-record state machine. The first entry is the record
    /// itself; forum topics follow when the parent is ready.
    async fn check_record(
        &self,
        verifier: &MembershipVerifier<'_>,
        joiner: &JoinOrchestrator<'_>,
        record: &GroupRecord,
    ) -> Vec<(GroupRecord, CheckResult)> {
        let Some(target) = record.identity() else {
            return vec![(
                record.clone(),
                CheckResult::unavailable("record has neither id nor username"),
            )];
        };

        let entity = match self.account.resolve(&target).await {
            Ok(entity) => entity,
            Err(ProviderError::IdentityResolution(msg)) => {
                warn!(%target, "cannot resolve record: {}", msg);
                let result = CheckResult::unavailable(format!("cannot resolve {}: {}", target, msg));
                return vec![(record.clone(), result)];
            }
            Err(err) => {
                warn!(%target, error=%err, "lookup failed");
                return vec![(record.clone(), CheckResult::error(err.to_string()))];
            }
        };

        let topics = if entity.is_forum {
            self.enumerate_topics(&entity).await
        } else {
            Vec::new()
        };

        let result = if verifier.verify(&entity).await {
            self.member_result(&entity).await
        } else {
            match joiner.attempt_join(&entity).await {
                JoinOutcome::Joined => CheckResult::ready("joined", ActionTaken::Joined),
                JoinOutcome::RequestSent => {
                    CheckResult::pending("join request awaiting approval", ActionTaken::RequestSent)
                }
                JoinOutcome::NotJoined => CheckResult::pending("could not join", ActionTaken::None),
            }
        };

        let mut emitted = vec![(record.clone(), result)];
        if emitted[0].1.is_ready() {
            emitted.extend(topics.iter().map(|topic| {
                (
                    GroupRecord::forum_topic(record, topic),
                    CheckResult::ready("forum topic of a ready group", ActionTaken::ForumTopic),
                )
            }));
        }
        emitted
    }

    async fn enumerate_topics(&self, entity: &Entity) -> Vec<ForumTopic> {
        match self.account.forum_topics(entity).await {
            Ok(topics) => {
                info!(entity_id = entity.id, topics = topics.len(), "forum topics enumerated");
                topics
            }
            Err(err) => {
                warn!(entity_id = entity.id, error=%err, "failed to enumerate forum topics");
                Vec::new()
            }
        }
    }

    async fn member_result(&self, entity: &Entity) -> CheckResult {
        if !self.settings.check_send_permission {
            return CheckResult::ready("already a member", ActionTaken::None);
        }
        match self.account.can_send_messages(entity).await {
            Ok(true) => CheckResult::ready("already a member", ActionTaken::None),
            Ok(false) | Err(ProviderError::PermissionDenied) => CheckResult::pending(
                "member, but sending messages is not allowed",
                ActionTaken::None,
            ),
            Err(err) => {
                // A failed lookup is not evidence of missing rights.
                warn!(entity_id = entity.id, error=%err, "send permission check failed");
                CheckResult::ready("already a member", ActionTaken::None)
            }
        }
    }
}
