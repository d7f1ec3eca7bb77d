#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tg_groupsync::error::ProviderError;
use tg_groupsync::model::{Account, Entity, EntityKind, EntityRef, ForumTopic, GroupRecord};
use tg_groupsync::provider::{AccountContext, ProviderResult};
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

pub const ME: i64 = 1000;

/// Scripted behaviour of one chat.
#[derive(Debug, Clone)]
pub struct FakeGroup {
    pub entity: Entity,
    pub member: bool,
    /// Error returned by the direct participant lookup instead of the flag.
    pub lookup_error: Option<ProviderError>,
    /// Whether the member list exposes the account when it is a member.
    pub members_visible: bool,
    pub dialogs_visible: bool,
    /// Responses for successive join calls; empty means success.
    pub join_script: VecDeque<ProviderResult<()>>,
    /// Whether a successful join makes the account a member.
    pub join_grants: bool,
    /// How long after a successful join the provider starts reporting membership.
    pub grant_after: Duration,
    pub joined_at: Option<Instant>,
    pub topics: Vec<ForumTopic>,
    pub can_send: ProviderResult<bool>,
    pub resolve_error: Option<ProviderError>,
}

impl FakeGroup {
    pub fn new(id: i64, title: &str, username: Option<&str>) -> Self {
        Self {
            entity: Entity {
                id,
                title: title.to_string(),
                username: username.map(str::to_string),
                kind: EntityKind::Supergroup,
                is_forum: false,
                participants_count: Some(42),
            },
            member: false,
            lookup_error: None,
            members_visible: true,
            dialogs_visible: true,
            join_script: VecDeque::new(),
            join_grants: true,
            grant_after: Duration::ZERO,
            joined_at: None,
            topics: Vec::new(),
            can_send: Ok(true),
            resolve_error: None,
        }
    }

    pub fn member(mut self) -> Self {
        self.member = true;
        self
    }

    pub fn lookup_error(mut self, err: ProviderError) -> Self {
        self.lookup_error = Some(err);
        self
    }

    pub fn hidden_members(mut self) -> Self {
        self.members_visible = false;
        self
    }

    pub fn hidden_dialog(mut self) -> Self {
        self.dialogs_visible = false;
        self
    }

    pub fn join_responses(mut self, responses: Vec<ProviderResult<()>>) -> Self {
        self.join_script = responses.into();
        self
    }

    pub fn join_does_not_grant(mut self) -> Self {
        self.join_grants = false;
        self
    }

    pub fn grant_after(mut self, lag: Duration) -> Self {
        self.grant_after = lag;
        self
    }

    pub fn forum(mut self, topics: &[(i64, &str)]) -> Self {
        self.entity.is_forum = true;
        self.topics = topics
            .iter()
            .map(|(id, title)| ForumTopic {
                id: *id,
                title: title.to_string(),
            })
            .collect();
        self
    }

    pub fn channel(mut self) -> Self {
        self.entity.kind = EntityKind::Channel;
        self
    }

    pub fn can_send(mut self, answer: ProviderResult<bool>) -> Self {
        self.can_send = answer;
        self
    }

    pub fn resolve_error(mut self, err: ProviderError) -> Self {
        self.resolve_error = Some(err);
        self
    }

    fn is_member_now(&self) -> bool {
        if self.member {
            return true;
        }
        match self.joined_at {
            Some(at) => self.join_grants && at.elapsed() >= self.grant_after,
            None => false,
        }
    }

    pub fn record(&self) -> GroupRecord {
        GroupRecord {
            numeric_id: Some(self.entity.id),
            handle: self.entity.username.clone(),
            display_title: self.entity.title.clone(),
            member_count: self.entity.participants_count,
            origin_keyword: "test".to_string(),
            parent_group: None,
        }
    }
}

#[derive(Default)]
struct State {
    groups: Vec<FakeGroup>,
    searches: HashMap<String, VecDeque<ProviderResult<Vec<Entity>>>>,
    extra_dialogs: Vec<Entity>,
    me_error: Option<ProviderError>,
    calls: Vec<String>,
}

/// In-memory account session driven by [`FakeGroup`] scripts.
#[derive(Clone, Default)]
pub struct FakeAccount {
    state: Arc<Mutex<State>>,
}

impl FakeAccount {
    pub fn new(groups: Vec<FakeGroup>) -> Self {
        let fake = Self::default();
        fake.state.try_lock().expect("fresh state").groups = groups;
        fake
    }

    pub async fn fail_me(&self, err: ProviderError) {
        self.state.lock().await.me_error = Some(err);
    }

    /// Queues responses for a search query; the last one repeats.
    pub async fn on_search(&self, query: &str, responses: Vec<ProviderResult<Vec<Entity>>>) {
        self.state
            .lock()
            .await
            .searches
            .insert(query.to_string(), responses.into());
    }

    /// Dialogs that are not scripted groups, e.g. for the search fallback.
    pub async fn add_dialog(&self, entity: Entity) {
        self.state.lock().await.extra_dialogs.push(entity);
    }

    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    pub async fn count_calls(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

fn find<'a>(groups: &'a mut [FakeGroup], id: i64) -> ProviderResult<&'a mut FakeGroup> {
    groups
        .iter_mut()
        .find(|g| g.entity.id == id)
        .ok_or_else(|| ProviderError::IdentityResolution(format!("no chat {}", id)))
}

#[async_trait]
impl AccountContext for FakeAccount {
    async fn me(&self) -> ProviderResult<Account> {
        let mut st = self.state.lock().await;
        st.calls.push("me".into());
        match &st.me_error {
            Some(err) => Err(err.clone()),
            None => Ok(Account {
                id: ME,
                username: Some("tester".into()),
            }),
        }
    }

    async fn resolve(&self, target: &EntityRef) -> ProviderResult<Entity> {
        let mut st = self.state.lock().await;
        st.calls.push(format!("resolve {}", target));
        let group = st.groups.iter().find(|g| match target {
            EntityRef::Id(id) => g.entity.id == *id,
            EntityRef::Handle(h) => g.entity.has_username(h),
        });
        match group {
            Some(g) => match &g.resolve_error {
                Some(err) => Err(err.clone()),
                None => Ok(g.entity.clone()),
            },
            None => Err(ProviderError::IdentityResolution(format!(
                "No user has \"{}\" as username",
                target
            ))),
        }
    }

    async fn participant(&self, entity: &Entity, _account: &Account) -> ProviderResult<bool> {
        let mut st = self.state.lock().await;
        st.calls.push(format!("participant {}", entity.id));
        let group = find(&mut st.groups, entity.id)?;
        match &group.lookup_error {
            Some(err) => Err(err.clone()),
            None => Ok(group.is_member_now()),
        }
    }

    async fn members(&self, entity: &Entity, limit: usize) -> ProviderResult<Vec<Account>> {
        let mut st = self.state.lock().await;
        st.calls.push(format!("members {}", entity.id));
        let group = find(&mut st.groups, entity.id)?;
        let mut members: Vec<Account> = (1..=3)
            .map(|id| Account {
                id,
                username: None,
            })
            .collect();
        if group.members_visible && group.is_member_now() {
            members.push(Account {
                id: ME,
                username: None,
            });
        }
        members.truncate(limit);
        Ok(members)
    }

    async fn dialogs(&self, limit: usize) -> ProviderResult<Vec<Entity>> {
        let mut st = self.state.lock().await;
        st.calls.push("dialogs".into());
        let mut dialogs: Vec<Entity> = st
            .groups
            .iter()
            .filter(|g| g.dialogs_visible && g.is_member_now())
            .map(|g| g.entity.clone())
            .collect();
        dialogs.extend(st.extra_dialogs.iter().cloned());
        dialogs.truncate(limit);
        Ok(dialogs)
    }

    async fn join(&self, entity: &Entity) -> ProviderResult<()> {
        let mut st = self.state.lock().await;
        st.calls.push(format!("join {}", entity.id));
        let group = find(&mut st.groups, entity.id)?;
        match group.join_script.pop_front().unwrap_or(Ok(())) {
            Ok(()) => {
                group.joined_at = Some(Instant::now());
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn forum_topics(&self, entity: &Entity) -> ProviderResult<Vec<ForumTopic>> {
        let mut st = self.state.lock().await;
        st.calls.push(format!("topics {}", entity.id));
        Ok(find(&mut st.groups, entity.id)?.topics.clone())
    }

    async fn can_send_messages(&self, entity: &Entity) -> ProviderResult<bool> {
        let mut st = self.state.lock().await;
        st.calls.push(format!("can_send {}", entity.id));
        find(&mut st.groups, entity.id)?.can_send.clone()
    }

    async fn search(&self, query: &str, limit: usize) -> ProviderResult<Vec<Entity>> {
        let mut st = self.state.lock().await;
        st.calls.push(format!("search {}", query));
        let Some(responses) = st.searches.get_mut(query) else {
            return Ok(Vec::new());
        };
        let response = if responses.len() > 1 {
            responses.pop_front()
        } else {
            responses.front().cloned()
        };
        response
            .unwrap_or_else(|| Ok(Vec::new()))
            .map(|mut found| {
                found.truncate(limit);
                found
            })
    }

    async fn member_count(&self, entity: &Entity) -> ProviderResult<Option<i64>> {
        let mut st = self.state.lock().await;
        st.calls.push(format!("member_count {}", entity.id));
        Ok(entity.participants_count)
    }
}

pub fn entity(id: i64, title: &str, kind: EntityKind) -> Entity {
    Entity {
        id,
        title: title.to_string(),
        username: None,
        kind,
        is_forum: false,
        participants_count: None,
    }
}
