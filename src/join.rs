//! Join attempts and their classification.
use std::time::Duration;
use tracing::{info, warn};

use crate::error::ProviderError;
use crate::membership::MembershipVerifier;
use crate::model::{ActionTaken, Entity};
use crate::provider::AccountContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    /// The join left a pending-approval state behind.
    RequestSent,
    NotJoined,
}

impl JoinOutcome {
    pub fn action(&self) -> ActionTaken {
        match self {
            JoinOutcome::Joined => ActionTaken::Joined,
            JoinOutcome::RequestSent => ActionTaken::RequestSent,
            JoinOutcome::NotJoined => ActionTaken::None,
        }
    }
}

pub struct JoinOrchestrator<'a> {
    account: &'a dyn AccountContext,
    verifier: &'a MembershipVerifier<'a>,
    max_wait: Duration,
    settle: Duration,
}

impl<'a> JoinOrchestrator<'a> {
    pub fn new(
        account: &'a dyn AccountContext,
        verifier: &'a MembershipVerifier<'a>,
        max_wait: Duration,
        settle: Duration,
    ) -> Self {
        Self {
            account,
            verifier,
            max_wait,
            settle,
        }
    }

    /// Callers are expected to have checked membership first; there is no
    /// "already a member" short-circuit here.
    pub async fn attempt_join(&self, entity: &Entity) -> JoinOutcome {
        match self.account.join(entity).await {
            Ok(()) => self.settle_and_verify(entity).await,
            Err(ProviderError::RateLimited(secs)) => {
                let wait = Duration::from_secs(secs);
                if wait > self.max_wait {
                    warn!(entity_id = entity.id, secs, "join flood wait too long; giving up");
                    return JoinOutcome::NotJoined;
                }
                info!(entity_id = entity.id, secs, "join flood wait; sleeping before retry");
                tokio::time::sleep(wait).await;
                self.retry(entity).await
            }
            Err(err) => classify_failure(entity, &err),
        }
    }

    async fn retry(&self, entity: &Entity) -> JoinOutcome {
        match self.account.join(entity).await {
            Ok(()) => self.settle_and_verify(entity).await,
            Err(ProviderError::ApprovalRequired) => JoinOutcome::RequestSent,
            Err(ProviderError::Banned) => JoinOutcome::NotJoined,
            Err(err) => {
                warn!(entity_id = entity.id, error=%err, "join retry failed; re-verifying");
                if self.verifier.verify(entity).await {
                    JoinOutcome::Joined
                } else {
                    JoinOutcome::NotJoined
                }
            }
        }
    }

    async fn settle_and_verify(&self, entity: &Entity) -> JoinOutcome {
        tokio::time::sleep(self.settle).await;
        if self.verifier.verify(entity).await {
            JoinOutcome::Joined
        } else {
            JoinOutcome::RequestSent
        }
    }
}

fn classify_failure(entity: &Entity, err: &ProviderError) -> JoinOutcome {
    match err {
        ProviderError::ApprovalRequired => JoinOutcome::RequestSent,
        ProviderError::Banned => {
            warn!(entity_id = entity.id, "account is banned; not joining");
            JoinOutcome::NotJoined
        }
        other => {
            warn!(entity_id = entity.id, error=%other, "join failed");
            JoinOutcome::NotJoined
        }
    }
}
