//! Membership verification cascade.
//!
//! No single provider call answers "is this account a member" reliably, so
//! several independent checks run in order until one is conclusive. When all
//! of them are inconclusive the answer is "not a member".
use tracing::debug;

use crate::error::ProviderError;
use crate::model::{Account, Entity};
use crate::provider::AccountContext;

/// Result of one check in the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evidence {
    Member,
    NotMember,
    Inconclusive,
}

impl Evidence {
    pub fn conclusive(self) -> Option<bool> {
        match self {
            Evidence::Member => Some(true),
            Evidence::NotMember => Some(false),
            Evidence::Inconclusive => None,
        }
    }

    fn from_error(check: &'static str, err: &ProviderError) -> Self {
        match err {
            ProviderError::NotAMember => Evidence::NotMember,
            other => {
                debug!(check, error=%other, "membership check inconclusive");
                Evidence::Inconclusive
            }
        }
    }
}

pub struct MembershipVerifier<'a> {
    account: &'a dyn AccountContext,
    me: Account,
    member_scan_limit: usize,
    dialog_scan_limit: usize,
}

impl<'a> MembershipVerifier<'a> {
    pub fn new(
        account: &'a dyn AccountContext,
        me: Account,
        member_scan_limit: usize,
        dialog_scan_limit: usize,
    ) -> Self {
        Self {
            account,
            me,
            member_scan_limit,
            dialog_scan_limit,
        }
    }

    pub fn me(&self) -> &Account {
        &self.me
    }

    /// Is the active account currently a member of `entity`?
    pub async fn verify(&self, entity: &Entity) -> bool {
        if let Some(answer) = self.direct_lookup(entity).await.conclusive() {
            return answer;
        }
        if let Some(answer) = self.scan_members(entity).await.conclusive() {
            return answer;
        }
        if let Some(answer) = self.scan_dialogs(entity).await.conclusive() {
            return answer;
        }
        debug!(entity_id = entity.id, "all membership checks inconclusive");
        false
    }

    async fn direct_lookup(&self, entity: &Entity) -> Evidence {
        match self.account.participant(entity, &self.me).await {
            Ok(true) => Evidence::Member,
            Ok(false) => Evidence::NotMember,
            Err(err) => Evidence::from_error("participant", &err),
        }
    }

    async fn scan_members(&self, entity: &Entity) -> Evidence {
        match self.account.members(entity, self.member_scan_limit).await {
            Ok(members) if members.iter().any(|m| self.me.same_user(m)) => Evidence::Member,
            Ok(_) => Evidence::Inconclusive,
            Err(err) => Evidence::from_error("members", &err),
        }
    }

    async fn scan_dialogs(&self, entity: &Entity) -> Evidence {
        match self.account.dialogs(self.dialog_scan_limit).await {
            Ok(dialogs) => {
                let found = dialogs.iter().any(|d| {
                    d.id == entity.id
                        || entity
                            .username
                            .as_deref()
                            .map(|u| d.has_username(u))
                            .unwrap_or(false)
                });
                if found {
                    Evidence::Member
                } else {
                    Evidence::Inconclusive
                }
            }
            Err(err) => Evidence::from_error("dialogs", &err),
        }
    }
}
