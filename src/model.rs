use serde::{Deserialize, Serialize};
use std::fmt;

/// How a candidate is addressed when asking the provider to resolve it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Handle(String),
    Id(i64),
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Handle(h) => write!(f, "@{}", h),
            EntityRef::Id(id) => write!(f, "{}", id),
        }
    }
}

/// A candidate group or channel read from a search table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub numeric_id: Option<i64>,
    pub handle: Option<String>,
    pub display_title: String,
    pub member_count: Option<i64>,
    pub origin_keyword: String,
    /// Title of the parent forum when this record is one of its topics.
    pub parent_group: Option<String>,
}

impl GroupRecord {
    /// Preferred identity for resolution: the handle when present, else the id.
    pub fn identity(&self) -> Option<EntityRef> {
        if let Some(handle) = self
            .handle
            .as_deref()
            .map(|h| h.trim().trim_start_matches('@'))
            .filter(|h| !h.is_empty())
        {
            return Some(EntityRef::Handle(handle.to_string()));
        }
        self.numeric_id.map(EntityRef::Id)
    }

    pub fn is_actionable(&self) -> bool {
        self.identity().is_some()
    }

    /// Topic rows carry the topic id, which is not a chat id of its own.
    pub fn is_forum_topic(&self) -> bool {
        self.parent_group.is_some()
    }

    /// Short label used in progress messages and logs.
    pub fn label(&self) -> String {
        match (&self.handle, self.numeric_id) {
            (Some(h), _) if !h.trim().is_empty() => {
                format!("{} (@{})", self.display_title, h.trim_start_matches('@'))
            }
            (_, Some(id)) => format!("{} ({})", self.display_title, id),
            _ => self.display_title.clone(),
        }
    }

    /// Builds the record for a candidate found by search.
    pub fn from_entity(entity: &Entity, member_count: Option<i64>, keyword: &str) -> Self {
        Self {
            numeric_id: Some(entity.id),
            handle: entity.username.clone(),
            display_title: entity.title.clone(),
            member_count: member_count.or(entity.participants_count),
            origin_keyword: keyword.to_string(),
            parent_group: None,
        }
    }

    /// Synthetic record for a forum topic inheriting the parent's membership.
    pub fn forum_topic(parent: &GroupRecord, topic: &ForumTopic) -> Self {
        Self {
            numeric_id: Some(topic.id),
            handle: None,
            display_title: topic.title.clone(),
            member_count: parent.member_count,
            origin_keyword: parent.origin_keyword.clone(),
            parent_group: Some(parent.display_title.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Ready,
    Pending,
    Unavailable,
    Error,
    Stopped,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Ready => "ready",
            CheckStatus::Pending => "pending",
            CheckStatus::Unavailable => "unavailable",
            CheckStatus::Error => "error",
            CheckStatus::Stopped => "stopped",
        }
    }

    /// Lenient parse: tolerates case and surrounding whitespace.
    pub fn parse_status(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ready" => Some(CheckStatus::Ready),
            "pending" => Some(CheckStatus::Pending),
            "unavailable" => Some(CheckStatus::Unavailable),
            "error" => Some(CheckStatus::Error),
            "stopped" => Some(CheckStatus::Stopped),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionTaken {
    None,
    Joined,
    RequestSent,
    ForumTopic,
}

impl ActionTaken {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionTaken::None => "none",
            ActionTaken::Joined => "joined",
            ActionTaken::RequestSent => "request_sent",
            ActionTaken::ForumTopic => "forum_topic",
        }
    }

    pub fn parse_action(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Some(ActionTaken::None),
            "joined" => Some(ActionTaken::Joined),
            "request_sent" => Some(ActionTaken::RequestSent),
            "forum_topic" => Some(ActionTaken::ForumTopic),
            _ => None,
        }
    }
}

/// Outcome of checking one record. Never mutated; a new check builds a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub status: CheckStatus,
    pub message: String,
    pub action_taken: ActionTaken,
}

impl CheckResult {
    pub fn new(status: CheckStatus, message: impl Into<String>, action_taken: ActionTaken) -> Self {
        Self {
            status,
            message: message.into(),
            action_taken,
        }
    }

    pub fn ready(message: impl Into<String>, action_taken: ActionTaken) -> Self {
        Self::new(CheckStatus::Ready, message, action_taken)
    }

    pub fn pending(message: impl Into<String>, action_taken: ActionTaken) -> Self {
        Self::new(CheckStatus::Pending, message, action_taken)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(CheckStatus::Unavailable, message, ActionTaken::None)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(CheckStatus::Error, message, ActionTaken::None)
    }

    pub fn stopped() -> Self {
        Self::new(CheckStatus::Stopped, "stopped before check", ActionTaken::None)
    }

    pub fn is_ready(&self) -> bool {
        self.status == CheckStatus::Ready
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Channel,
    Supergroup,
    BasicGroup,
}

impl EntityKind {
    pub fn is_broadcast(&self) -> bool {
        matches!(self, EntityKind::Channel)
    }
}

/// A group, channel or chat as seen by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub username: Option<String>,
    pub kind: EntityKind,
    #[serde(default)]
    pub is_forum: bool,
    #[serde(default)]
    pub participants_count: Option<i64>,
}

impl Entity {
    /// True when `username` names this entity (case-insensitive, `@` ignored).
    pub fn has_username(&self, username: &str) -> bool {
        let wanted = username.trim_start_matches('@');
        self.username
            .as_deref()
            .map(|u| u.trim_start_matches('@').eq_ignore_ascii_case(wanted))
            .unwrap_or(false)
    }
}

/// The account the session is logged in as, or a participant of a chat.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

impl Account {
    pub fn same_user(&self, other: &Account) -> bool {
        if self.id != 0 && self.id == other.id {
            return true;
        }
        match (&self.username, &other.username) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForumTopic {
    pub id: i64,
    pub title: String,
}
