//! Account-side operations the core needs from Telegram.
//!
//! [`AccountContext`] is the seam between the reconciliation logic and the
//! account session. [`http::GatewayClient`] implements it against a
//! user-account gateway; tests implement it with scripted fakes.
use async_trait::async_trait;

use crate::error::ProviderError;
use crate::model::{Account, Entity, EntityRef, ForumTopic};

pub mod http;

pub use http::GatewayClient;

pub type ProviderResult<T> = Result<T, ProviderError>;

#[async_trait]
pub trait AccountContext: Send + Sync {
    /// The account this session is logged in as.
    async fn me(&self) -> ProviderResult<Account>;

    async fn resolve(&self, target: &EntityRef) -> ProviderResult<Entity>;

    /// Direct participant lookup. `Ok(false)` is an explicit "not a participant".
    async fn participant(&self, entity: &Entity, account: &Account) -> ProviderResult<bool>;

    /// First `limit` members of the entity.
    async fn members(&self, entity: &Entity, limit: usize) -> ProviderResult<Vec<Account>>;

    /// First `limit` conversations of the account.
    async fn dialogs(&self, limit: usize) -> ProviderResult<Vec<Entity>>;

    async fn join(&self, entity: &Entity) -> ProviderResult<()>;

    async fn forum_topics(&self, entity: &Entity) -> ProviderResult<Vec<ForumTopic>>;

    async fn can_send_messages(&self, entity: &Entity) -> ProviderResult<bool>;

    /// Global search for public chats and channels.
    async fn search(&self, query: &str, limit: usize) -> ProviderResult<Vec<Entity>>;

    /// Participant count from the full entity, when the provider exposes it.
    async fn member_count(&self, entity: &Entity) -> ProviderResult<Option<i64>>;
}
