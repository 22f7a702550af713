//! HTTP client for the organizator memo endpoints.
//!
//! Reads are plain GETs returning JSON; saves are form-encoded POSTs, the
//! way the browser client submits them.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{RemoteTransport, SyncError};
use crate::config::SyncConfig;
use crate::models::{IdName, Memo, ServerMemoReply};

const CLIENT_VERSION: &str = "3";

/// Reply of the memo group listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoGroupsReply {
    pub memogroups: Vec<IdName>,
    #[serde(default, alias = "user", skip_serializing_if = "Option::is_none")]
    pub requester: Option<IdName>,
}

/// [`RemoteTransport`] over HTTP with bearer API-key authentication.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    server_url: String,
    api_key: String,
}

impl HttpTransport {
    /// Creates a transport from config.
    ///
    /// Returns an error if sync is not configured.
    pub fn from_config(config: &SyncConfig) -> Result<Self, SyncError> {
        let server_url = config.server_url.clone().ok_or(SyncError::NotConfigured)?;
        let api_key = config.api_key.clone().ok_or(SyncError::NotConfigured)?;
        Ok(Self::new(server_url, api_key))
    }

    pub fn new(server_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            server_url: server_url.into(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/organizator/{}", self.server_url.trim_end_matches('/'), path)
    }

    fn memo_url(&self, id: i64) -> String {
        self.url(&format!("memo/{}", id))
    }

    /// Form body for a save: the group if any, the id unless the memo is
    /// new, then the text. Every pair ends with `&`.
    pub(crate) fn push_body(memo: &Memo) -> String {
        let mut body = String::new();
        if let Some(group) = &memo.group {
            body.push_str(&format!("group_id={}&", group.id));
        }
        if !memo.is_new() {
            body.push_str(&format!("memo_id={}&", memo.id));
        }
        body.push_str(&format!("text={}&", urlencoding::encode(&memo.text)));
        body
    }

    /// Fails unless the server answers its health check.
    pub async fn check_health(&self) -> Result<(), SyncError> {
        let url = format!("{}/health", self.server_url.trim_end_matches('/'));
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(SyncError::Status {
                status: response.status().as_u16(),
                context: "check server health".to_string(),
            });
        }
        Ok(())
    }

    /// Memo groups the requester may write to.
    pub async fn fetch_groups(&self) -> Result<MemoGroupsReply, SyncError> {
        self.get_json(&self.url("memogroup/"), "fetch memogroups")
            .await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, context: &str) -> Result<T, SyncError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .header("Cache-Control", "no-cache")
            .header("x-organizator-client-version", CLIENT_VERSION)
            .send()
            .await?;
        Self::decode(response, context).await
    }

    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
        context: &str,
    ) -> Result<T, SyncError> {
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            tracing::warn!(%status, context, "server rejected request");
            return Err(SyncError::Status {
                status: status.as_u16(),
                context: context.to_string(),
            });
        }
        response
            .json()
            .await
            .map_err(|e| SyncError::Decode(e.to_string()))
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn fetch_memo(&self, id: i64) -> Result<ServerMemoReply, SyncError> {
        tracing::debug!(id, "fetching memo from server");
        let reply: ServerMemoReply = self
            .get_json(&self.memo_url(id), &format!("fetch memo {}", id))
            .await?;
        if reply.memo.is_none() {
            tracing::info!(id, "memo not found on server");
        }
        Ok(reply)
    }

    async fn push_memo(&self, memo: &Memo) -> Result<ServerMemoReply, SyncError> {
        tracing::debug!(
            id = memo.id,
            size = memo.text.len(),
            group = ?memo.group.as_ref().map(|g| g.id),
            "saving memo to server"
        );
        let response = self
            .client
            .post(self.url("memo/"))
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("x-organizator-client-version", CLIENT_VERSION)
            .body(Self::push_body(memo))
            .send()
            .await?;
        Self::decode(response, &format!("save memo {}", memo.id)).await
    }
}
