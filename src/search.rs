//! Keyword search for groups and channels.
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::SearchConfig;
use crate::error::ProviderError;
use crate::model::{Entity, GroupRecord};
use crate::progress::{Progress, ProgressSink};
use crate::provider::AccountContext;

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub limit_per_query: usize,
    pub delay: Duration,
    pub max_flood_wait: Duration,
    pub dialog_fallback_limit: usize,
}

impl From<&SearchConfig> for SearchSettings {
    fn from(cfg: &SearchConfig) -> Self {
        Self {
            limit_per_query: cfg.limit_per_query,
            delay: Duration::from_millis(cfg.delay_ms),
            max_flood_wait: Duration::from_secs(cfg.max_flood_wait_seconds),
            dialog_fallback_limit: cfg.dialog_fallback_limit,
        }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub groups: Vec<GroupRecord>,
    pub channels: Vec<GroupRecord>,
    /// Queries abandoned because the flood wait exceeded the limit.
    pub skipped_queries: Vec<String>,
    pub cancelled: bool,
}

impl SearchOutcome {
    pub fn found(&self) -> usize {
        self.groups.len() + self.channels.len()
    }
}

pub struct GroupSearcher<'a> {
    account: &'a dyn AccountContext,
    settings: SearchSettings,
}

impl<'a> GroupSearcher<'a> {
    pub fn new(account: &'a dyn AccountContext, settings: SearchSettings) -> Self {
        Self { account, settings }
    }

    #[instrument(skip_all, fields(queries = queries.len()))]
    pub async fn search(
        &self,
        queries: &[String],
        cancel: &CancellationToken,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> SearchOutcome {
        let mut outcome = SearchOutcome::default();
        let mut seen = HashSet::new();
        let total = queries.len();

        for (idx, query) in queries.iter().enumerate() {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }

            let before = outcome.found();
            match self.account.search(query, self.settings.limit_per_query).await {
                Ok(entities) => {
                    for entity in entities {
                        self.collect(&mut outcome, &mut seen, &entity, query).await;
                    }
                }
                Err(ProviderError::RateLimited(secs))
                    if Duration::from_secs(secs) > self.settings.max_flood_wait =>
                {
                    warn!(query = %query, secs, "flood wait too long; skipping query");
                    outcome.skipped_queries.push(query.clone());
                }
                Err(err) => {
                    warn!(query = %query, error = %err, "search failed; scanning dialogs instead");
                    self.dialog_fallback(&mut outcome, &mut seen, query).await;
                }
            }

            if let Some(sink) = &progress {
                let in_query = outcome.found() - before;
                sink.report(Progress {
                    current: idx + 1,
                    total,
                    message: format!("Found: {} | in this query: {}", outcome.found(), in_query),
                    item: query.clone(),
                });
            }

            if idx + 1 < total && !self.settings.delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.settings.delay) => {}
                }
            }
        }

        info!(
            groups = outcome.groups.len(),
            channels = outcome.channels.len(),
            skipped = outcome.skipped_queries.len(),
            cancelled = outcome.cancelled,
            "search finished"
        );
        outcome
    }

    async fn dialog_fallback(
        &self,
        outcome: &mut SearchOutcome,
        seen: &mut HashSet<i64>,
        query: &str,
    ) {
        let needle = query.to_lowercase();
        match self.account.dialogs(self.settings.dialog_fallback_limit).await {
            Ok(dialogs) => {
                for entity in dialogs
                    .iter()
                    .filter(|d| d.title.to_lowercase().contains(&needle))
                {
                    self.collect(outcome, seen, entity, query).await;
                }
            }
            Err(err) => warn!(query = %query, error = %err, "dialog fallback failed"),
        }
    }

    async fn collect(
        &self,
        outcome: &mut SearchOutcome,
        seen: &mut HashSet<i64>,
        entity: &Entity,
        query: &str,
    ) {
        if !seen.insert(entity.id) {
            return;
        }
        let count = match self.account.member_count(entity).await {
            Ok(count) => count,
            Err(err) => {
                warn!(entity_id = entity.id, error = %err, "member count unavailable");
                None
            }
        };
        let record = GroupRecord::from_entity(entity, count, query);
        if entity.kind.is_broadcast() {
            outcome.channels.push(record);
        } else {
            outcome.groups.push(record);
        }
    }
}
