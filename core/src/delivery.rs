//! Delivery abstraction: "delete / notify / kick" for one bot identity. Each identity resolves to
//! exactly one mode: pull (HTTP) when it is in the discovery map, else push (WS session).
//! Nothing is retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::discovery::{Discovery, PullEndpoint};
use crate::error::{Result, UpstreamError};
use crate::onebot::log::prefix;
use crate::onebot::Action;
use crate::session::SessionRegistry;

/// Moderation actions the dispatcher can take against a message or member.
/// Implemented by [`Delivery`]; tests substitute a recorder.
#[async_trait]
pub trait BotActions: Send + Sync {
    /// Withdraw `message_id` through bot `self_id`.
    async fn delete_message(&self, self_id: &str, message_id: &str) -> Result<()>;

    /// Post `text` to the group, mentioning `user_id`.
    async fn notify_group(&self, self_id: &str, group_id: &str, user_id: &str, text: &str) -> Result<()>;

    /// Remove `user_id` from the group.
    async fn kick_member(&self, self_id: &str, group_id: &str, user_id: &str) -> Result<()>;
}

/// Transport chosen for one bot identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryMode {
    Push,
    Pull(PullEndpoint),
}

/// Client for discovery and pull-mode calls. Bot endpoints are trusted, so certificates are checked.
pub fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().connect_timeout(timeout).timeout(timeout).build()
}

pub struct Delivery {
    sessions: Arc<SessionRegistry>,
    discovery: Arc<Discovery>,
    client: reqwest::Client,
    reject_add_request: bool,
}

impl Delivery {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        discovery: Arc<Discovery>,
        client: reqwest::Client,
        reject_add_request: bool,
    ) -> Self {
        Self {
            sessions,
            discovery,
            client,
            reject_add_request,
        }
    }

    pub fn mode(&self, self_id: &str) -> DeliveryMode {
        match self.discovery.get(self_id) {
            Some(endpoint) => DeliveryMode::Pull(endpoint),
            None => DeliveryMode::Push,
        }
    }

    /// Execute one action over the identity's transport.
    pub async fn execute(&self, self_id: &str, action: &Action) -> Result<()> {
        match self.mode(self_id) {
            DeliveryMode::Push => {
                self.sessions.send(self_id, &action.frame())?;
                tracing::info!("{} action={} mode=push", prefix(self_id), action.name());
            }
            DeliveryMode::Pull(endpoint) => {
                self.call_endpoint(&endpoint, action).await?;
                tracing::info!("{} action={} mode=pull base_url={}", prefix(self_id), action.name(), endpoint.base_url);
            }
        }
        Ok(())
    }

    async fn call_endpoint(&self, endpoint: &PullEndpoint, action: &Action) -> Result<(), UpstreamError> {
        let raw = format!("{}/{}", endpoint.base_url.trim_end_matches('/'), action.name());
        let mut url = url::Url::parse(&raw).map_err(|source| UpstreamError::InvalidUrl { url: raw.clone(), source })?;
        {
            let mut query = url.query_pairs_mut();
            if !endpoint.access_token.is_empty() {
                query.append_pair("access_token", &endpoint.access_token);
            }
            if !action.is_post() {
                for (key, value) in action.query_pairs() {
                    query.append_pair(key, &value);
                }
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }

        let request = if action.is_post() {
            self.client.post(url).json(&action.params())
        } else {
            self.client.get(url)
        };
        let res = request.send().await.map_err(|source| UpstreamError::Request {
            endpoint: action.name().to_string(),
            source,
        })?;
        if !res.status().is_success() {
            return Err(UpstreamError::Status {
                endpoint: action.name().to_string(),
                status: res.status().as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BotActions for Delivery {
    async fn delete_message(&self, self_id: &str, message_id: &str) -> Result<()> {
        let action = Action::DeleteMsg {
            message_id: message_id.to_string(),
        };
        self.execute(self_id, &action).await
    }

    async fn notify_group(&self, self_id: &str, group_id: &str, user_id: &str, text: &str) -> Result<()> {
        self.execute(self_id, &Action::group_notice(group_id, user_id, text)).await
    }

    async fn kick_member(&self, self_id: &str, group_id: &str, user_id: &str) -> Result<()> {
        let action = Action::SetGroupKick {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
            reject_add_request: self.reject_add_request,
        };
        self.execute(self_id, &action).await
    }
}
