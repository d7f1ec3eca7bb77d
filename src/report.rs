//! Splits check results into the ready and still-pending tables.
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::model::{ActionTaken, CheckResult, CheckStatus, GroupRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Ready,
    Pending,
    Groups,
    Channels,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Ready => "ready",
            Table::Pending => "pending",
            Table::Groups => "groups",
            Table::Channels => "channels",
        }
    }

    pub fn parse_table(s: &str) -> Option<Self> {
        match s {
            "ready" => Some(Table::Ready),
            "pending" => Some(Table::Pending),
            "groups" => Some(Table::Groups),
            "channels" => Some(Table::Channels),
            _ => None,
        }
    }
}

/// The row shape shared by every table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRow {
    pub id: Option<i64>,
    pub title: String,
    pub handle: Option<String>,
    pub member_count: Option<i64>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub origin_keyword: String,
    pub parent_group: Option<String>,
}

impl GroupRow {
    /// Row for a candidate that has not been checked yet.
    pub fn from_record(record: &GroupRecord) -> Self {
        Self {
            id: record.numeric_id,
            title: record.display_title.clone(),
            handle: record.handle.clone(),
            member_count: record.member_count,
            status: String::new(),
            message: String::new(),
            action: String::new(),
            origin_keyword: record.origin_keyword.clone(),
            parent_group: record.parent_group.clone(),
        }
    }

    pub fn from_result(record: &GroupRecord, result: &CheckResult) -> Self {
        Self {
            status: result.status.as_str().to_string(),
            message: result.message.clone(),
            action: result.action_taken.as_str().to_string(),
            ..Self::from_record(record)
        }
    }

    pub fn to_record(&self) -> GroupRecord {
        GroupRecord {
            numeric_id: self.id,
            handle: self.handle.clone().filter(|h| !h.trim().is_empty()),
            display_title: self.title.clone(),
            member_count: self.member_count,
            origin_keyword: self.origin_keyword.clone(),
            parent_group: self.parent_group.clone().filter(|p| !p.trim().is_empty()),
        }
    }

    /// The check result stored in the row, if it carries one.
    pub fn to_result(&self) -> Option<CheckResult> {
        let status = CheckStatus::parse_status(&self.status)?;
        let action = ActionTaken::parse_action(&self.action).unwrap_or(ActionTaken::None);
        Some(CheckResult::new(status, self.message.clone(), action))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partitions {
    pub ready: Vec<(GroupRecord, CheckResult)>,
    /// Pending, unavailable, error and stopped records alike.
    pub still_pending: Vec<(GroupRecord, CheckResult)>,
}

impl Partitions {
    pub fn rows(&self, table: Table) -> Vec<GroupRow> {
        let items = match table {
            Table::Ready => &self.ready,
            _ => &self.still_pending,
        };
        items
            .iter()
            .map(|(record, result)| GroupRow::from_result(record, result))
            .collect()
    }
}

pub fn partition<I>(results: I) -> Partitions
where
    I: IntoIterator<Item = (GroupRecord, CheckResult)>,
{
    let (ready, still_pending): (Vec<_>, Vec<_>) = results.into_iter().partition(|(_, r)| r.is_ready());
    Partitions {
        ready,
        still_pending,
    }
}

/// Records to feed into a reconciliation, taken from stored rows.
///
/// Forum topics are dropped since they follow their parent group, and rows
/// repeating an identity already seen are collapsed (first one wins).
pub fn candidates<'a, I>(rows: I) -> Vec<GroupRecord>
where
    I: IntoIterator<Item = &'a GroupRow>,
{
    let mut seen = HashSet::new();
    rows.into_iter()
        .map(GroupRow::to_record)
        .filter(|record| !record.is_forum_topic())
        .filter(|record| match record.identity() {
            Some(identity) => seen.insert(identity),
            None => true,
        })
        .collect()
}

/// Destination for rows of one table.
#[async_trait]
pub trait TableWriter: Send + Sync {
    async fn write_table(&self, table: Table, rows: &[GroupRow]) -> Result<()>;
}

/// Writes the ready table, then the still-pending one.
pub async fn write_partitions(writer: &dyn TableWriter, partitions: &Partitions) -> Result<()> {
    writer
        .write_table(Table::Ready, &partitions.rows(Table::Ready))
        .await
        .context("failed to write ready table")?;
    writer
        .write_table(Table::Pending, &partitions.rows(Table::Pending))
        .await
        .context("failed to write pending table")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: i64) -> GroupRecord {
        GroupRecord {
            numeric_id: Some(id),
            handle: None,
            display_title: format!("chat {}", id),
            member_count: None,
            origin_keyword: "kw".into(),
            parent_group: None,
        }
    }

    #[test]
    fn everything_but_ready_needs_attention() {
        let parts = partition(vec![
            (rec(1), CheckResult::ready("ok", ActionTaken::None)),
            (rec(2), CheckResult::pending("wait", ActionTaken::RequestSent)),
            (rec(3), CheckResult::unavailable("gone")),
            (rec(4), CheckResult::error("boom")),
            (rec(5), CheckResult::stopped()),
            (rec(6), CheckResult::ready("joined", ActionTaken::Joined)),
        ]);
        let ready: Vec<_> = parts.ready.iter().map(|(r, _)| r.numeric_id).collect();
        let pending: Vec<_> = parts.still_pending.iter().map(|(r, _)| r.numeric_id).collect();
        assert_eq!(ready, vec![Some(1), Some(6)]);
        assert_eq!(pending, vec![Some(2), Some(3), Some(4), Some(5)]);
    }

    #[test]
    fn row_carries_result() {
        let row = GroupRow::from_result(&rec(9), &CheckResult::pending("wait", ActionTaken::RequestSent));
        assert_eq!(row.status, "pending");
        assert_eq!(row.action, "request_sent");
        assert_eq!(row.to_record(), rec(9));
        assert_eq!(row.to_result().unwrap().action_taken, ActionTaken::RequestSent);
        assert!(GroupRow::from_record(&rec(9)).to_result().is_none());
    }

    #[test]
    fn candidates_skip_topics_and_repeats() {
        let parent = rec(5);
        let topic = GroupRecord::forum_topic(
            &parent,
            &crate::model::ForumTopic {
                id: 51,
                title: "Flights".into(),
            },
        );
        let rows: Vec<GroupRow> = [parent.clone(), topic, rec(6), parent.clone()]
            .iter()
            .map(GroupRow::from_record)
            .collect();
        let picked = candidates(&rows);
        let ids: Vec<_> = picked.iter().map(|r| r.numeric_id).collect();
        assert_eq!(ids, vec![Some(5), Some(6)]);
    }
}
