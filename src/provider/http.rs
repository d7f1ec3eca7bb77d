use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use super::{AccountContext, ProviderResult};
use crate::config::Config;
use crate::error::ProviderError;
use crate::model::{Account, Entity, EntityRef, ForumTopic};

/// JSON-over-HTTP client for the user-account gateway.
#[derive(Clone)]
pub struct GatewayClient {
    http: Client,
    base_url: Url,
    token: String,
    session: String,
}

impl fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayClient")
            .field("base_url", &self.base_url)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<EnvelopeParameters>,
}

#[derive(Deserialize)]
struct EnvelopeParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

impl GatewayClient {
    pub fn new(base_url: Url, token: String, session: String, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent("tg-groupsync/0.1")
            .timeout(timeout)
            .build()
            .context("failed to build gateway HTTP client")?;
        Ok(Self {
            http,
            base_url,
            token,
            session,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let base_url = Url::parse(&cfg.gateway.base_url).context("invalid gateway.base_url")?;
        Self::new(
            base_url,
            cfg.gateway.token.clone(),
            cfg.gateway.session.clone(),
            Duration::from_secs(cfg.gateway.request_timeout_seconds),
        )
    }

    pub fn build_request(&self, method: &str, params: &Value) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join(&format!("v1/{}", method))
            .context("invalid gateway base URL")?;
        self.http
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("X-Session", &self.session)
            .header("Content-Type", "application/json")
            .json(params)
            .build()
            .context("failed to build gateway request")
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> ProviderResult<T> {
        let request = self
            .build_request(method, &params)
            .map_err(|e| ProviderError::Transient(format!("{:#}", e)))?;
        debug!(method, url=%request.url(), "gateway request");

        let res = self
            .http
            .execute(request)
            .await
            .map_err(|e| ProviderError::Transient(format!("failed to reach gateway: {}", e)))?;

        let status = res.status();
        let header_retry = res
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = res
            .text()
            .await
            .map_err(|e| ProviderError::Transient(format!("failed to read gateway response: {}", e)))?;

        let result = parse_response(method, status, header_retry, &body)?;
        serde_json::from_value(result).map_err(|e| {
            ProviderError::Transient(format!("invalid {} result from gateway: {}", method, e))
        })
    }
}

/// Unwraps the gateway envelope, turning failures into typed errors.
fn parse_response(
    method: &str,
    status: StatusCode,
    header_retry: Option<u64>,
    body: &str,
) -> ProviderResult<Value> {
    let envelope: Envelope = match serde_json::from_str(body) {
        Ok(env) => env,
        Err(_) if status == StatusCode::TOO_MANY_REQUESTS => {
            warn!(method, "rate limited by gateway: {}", body);
            return Err(ProviderError::RateLimited(header_retry.unwrap_or(0)));
        }
        Err(err) => {
            warn!(method, %status, "gateway returned non-JSON body: {}", body);
            return Err(ProviderError::Transient(format!(
                "gateway error {}: {}",
                status, err
            )));
        }
    };

    if !envelope.ok || !status.is_success() {
        let description = envelope
            .description
            .unwrap_or_else(|| format!("gateway error {}", status));
        let retry_after = envelope
            .parameters
            .and_then(|p| p.retry_after)
            .or(if status == StatusCode::TOO_MANY_REQUESTS {
                header_retry
            } else {
                None
            });
        let err = ProviderError::classify(&description, retry_after);
        debug!(method, %status, ?err, "gateway call failed");
        return Err(err);
    }

    Ok(envelope.result.unwrap_or(Value::Null))
}

fn target_params(target: &EntityRef) -> Value {
    match target {
        EntityRef::Handle(h) => json!({ "username": h }),
        EntityRef::Id(id) => json!({ "chat_id": id }),
    }
}

#[derive(Deserialize)]
struct CanSend {
    can_send_messages: bool,
}

#[derive(Deserialize)]
struct IsMember {
    is_member: bool,
}

#[derive(Deserialize)]
struct MemberCount {
    #[serde(default)]
    count: Option<i64>,
}

#[async_trait]
impl AccountContext for GatewayClient {
    async fn me(&self) -> ProviderResult<Account> {
        self.call("getMe", json!({})).await
    }

    async fn resolve(&self, target: &EntityRef) -> ProviderResult<Entity> {
        self.call("resolveChat", target_params(target)).await
    }

    async fn participant(&self, entity: &Entity, account: &Account) -> ProviderResult<bool> {
        let res: IsMember = self
            .call(
                "getChatMember",
                json!({ "chat_id": entity.id, "user_id": account.id }),
            )
            .await?;
        Ok(res.is_member)
    }

    async fn members(&self, entity: &Entity, limit: usize) -> ProviderResult<Vec<Account>> {
        self.call(
            "getChatMembers",
            json!({ "chat_id": entity.id, "limit": limit }),
        )
        .await
    }

    async fn dialogs(&self, limit: usize) -> ProviderResult<Vec<Entity>> {
        self.call("getDialogs", json!({ "limit": limit })).await
    }

    async fn join(&self, entity: &Entity) -> ProviderResult<()> {
        let _: Value = self
            .call(
                "joinChat",
                json!({ "chat_id": entity.id, "username": entity.username }),
            )
            .await?;
        Ok(())
    }

    async fn forum_topics(&self, entity: &Entity) -> ProviderResult<Vec<ForumTopic>> {
        self.call("getForumTopics", json!({ "chat_id": entity.id })).await
    }

    async fn can_send_messages(&self, entity: &Entity) -> ProviderResult<bool> {
        let res: CanSend = self
            .call("getChatPermissions", json!({ "chat_id": entity.id }))
            .await?;
        Ok(res.can_send_messages)
    }

    async fn search(&self, query: &str, limit: usize) -> ProviderResult<Vec<Entity>> {
        self.call("searchChats", json!({ "query": query, "limit": limit }))
            .await
    }

    async fn member_count(&self, entity: &Entity) -> ProviderResult<Option<i64>> {
        let res: MemberCount = self
            .call("getChatMemberCount", json!({ "chat_id": entity.id }))
            .await?;
        Ok(res.count)
    }
}
