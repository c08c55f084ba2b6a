//! Intercom REST gateway.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::bridge::{ConversationClient, SessionBridge, SessionOptions};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};

use super::extract::{extract_batch, ReadBatch};
use super::http::{build_client, check_status};
use super::types::{
    AdminResponse, ContactSearchResponse, Conversation, ConversationList, ConversationPart,
    CreatedConversation,
};

/// Body of the first message in conversations opened by the bridge.
pub const CONVERSATION_GREETING: &str = "Chat has been created";

/// Stateless wrapper over the Intercom REST API, acting as one admin.
///
/// Every call is single-shot: a non-2xx status becomes
/// [`BridgeError::Api`], transport failures become [`BridgeError::Network`].
#[derive(Debug, Clone)]
pub struct IntercomClient {
    http: reqwest::Client,
    base_url: String,
    admin_id: String,
}

impl IntercomClient {
    /// Build a client and resolve the acting admin via `GET /me`.
    pub async fn connect(config: &BridgeConfig) -> Result<Self> {
        let http = build_client(config.require_token()?)?;
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let mut client = Self {
            http,
            base_url,
            admin_id: String::new(),
        };
        client.admin_id = client.fetch_admin_id().await?;
        debug!(admin_id = %client.admin_id, "resolved intercom admin");
        Ok(client)
    }

    /// Build a client for an already known admin without calling `/me`.
    pub fn with_admin_id(config: &BridgeConfig, admin_id: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: build_client(config.require_token()?)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            admin_id: admin_id.into(),
        })
    }

    /// The acting admin, fetched once at connect time.
    pub fn admin_id(&self) -> &str {
        &self.admin_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn fetch_admin_id(&self) -> Result<String> {
        let response = check_status(self.http.get(self.url("/me")).send().await?).await?;
        let admin: AdminResponse = response.json().await?;
        Ok(admin.id)
    }

    /// Resolve an external user id to the Intercom contact id.
    ///
    /// The search operator is fuzzy, so results are filtered for an exact
    /// `external_id` match.
    pub async fn search_contact(&self, external_id: &str) -> Result<Option<String>> {
        let body = json!({
            "query": {
                "field": "external_id",
                "operator": "~",
                "value": external_id,
            }
        });
        let response = check_status(
            self.http
                .post(self.url("/contacts/search"))
                .json(&body)
                .send()
                .await?,
        )
        .await?;
        let found: ContactSearchResponse = response.json().await?;
        Ok(found
            .data
            .into_iter()
            .find(|c| c.external_id.as_deref() == Some(external_id))
            .map(|c| c.id))
    }

    /// Start a new conversation on behalf of the contact with `external_id`.
    pub async fn create_conversation(&self, external_id: &str) -> Result<String> {
        let user_id = self
            .search_contact(external_id)
            .await?
            .ok_or_else(|| BridgeError::ContactNotFound(external_id.to_string()))?;
        let body = json!({
            "from": { "type": "user", "id": user_id },
            "body": CONVERSATION_GREETING,
        });
        let response = check_status(
            self.http
                .post(self.url("/conversations"))
                .json(&body)
                .send()
                .await?,
        )
        .await?;
        let created: CreatedConversation = response.json().await?;
        Ok(created.conversation_id)
    }

    async fn post_part(&self, conversation_id: &str, body: Value) -> Result<()> {
        check_status(
            self.http
                .post(self.url(&format!("/conversations/{conversation_id}/parts")))
                .json(&body)
                .send()
                .await?,
        )
        .await?;
        Ok(())
    }

    pub async fn open_conversation(&self, conversation_id: &str) -> Result<()> {
        self.post_part(
            conversation_id,
            json!({
                "message_type": "open",
                "admin_id": self.admin_id,
            }),
        )
        .await
    }

    pub async fn close_conversation(&self, conversation_id: &str, message: &str) -> Result<()> {
        self.post_part(
            conversation_id,
            json!({
                "message_type": "close",
                "type": "admin",
                "admin_id": self.admin_id,
                "body": message,
            }),
        )
        .await
    }

    pub async fn mark_as_read(&self, conversation_id: &str) -> Result<()> {
        check_status(
            self.http
                .put(self.url(&format!("/conversations/{conversation_id}")))
                .json(&json!({ "read": true }))
                .send()
                .await?,
        )
        .await?;
        Ok(())
    }

    /// Post an admin comment; returns the raw response payload.
    pub async fn reply(&self, conversation_id: &str, text: &str) -> Result<Value> {
        let body = json!({
            "message_type": "comment",
            "type": "admin",
            "admin_id": self.admin_id,
            "body": text,
        });
        let response = check_status(
            self.http
                .post(self.url(&format!("/conversations/{conversation_id}/reply")))
                .json(&body)
                .send()
                .await?,
        )
        .await?;
        Ok(response.json().await?)
    }

    /// Fetch a full conversation including its parts.
    pub async fn get_conversation(&self, conversation_id: &str) -> Result<Conversation> {
        let response = check_status(
            self.http
                .get(self.url(&format!("/conversations/{conversation_id}")))
                .send()
                .await?,
        )
        .await?;
        Ok(response.json().await?)
    }

    /// Parts newer than `after` that were not written by this admin.
    pub async fn get_messages(
        &self,
        conversation_id: &str,
        after: i64,
    ) -> Result<Vec<ConversationPart>> {
        let conversation = self.get_conversation(conversation_id).await?;
        Ok(conversation
            .conversation_parts
            .conversation_parts
            .into_iter()
            .filter(|p| p.created_at > after && p.author.id != self.admin_id)
            .collect())
    }

    /// New user messages since `last_time`, as plain text.
    pub async fn read_messages(&self, conversation_id: &str, last_time: i64) -> Result<ReadBatch> {
        let parts = self.get_messages(conversation_id, last_time).await?;
        Ok(extract_batch(&parts, last_time))
    }

    /// Watermark to start reading from.
    ///
    /// With `skip_last_message` the newest existing user message is treated
    /// as already consumed; otherwise it is delivered on the first read.
    pub async fn get_last_time(&self, conversation_id: &str, skip_last_message: bool) -> Result<i64> {
        let newest = self
            .get_messages(conversation_id, 0)
            .await?
            .iter()
            .map(|p| p.created_at)
            .max()
            .unwrap_or(0);
        Ok(if skip_last_message { newest } else { newest - 1 })
    }

    /// One page of the conversation listing, longest-waiting first.
    pub async fn get_conversation_page(&self, per_page: u32, page: u32) -> Result<ConversationList> {
        let response = check_status(
            self.http
                .get(self.url("/conversations"))
                .query(&[
                    ("order", "desc".to_string()),
                    ("sort", "waiting_since".to_string()),
                    ("per_page", per_page.to_string()),
                    ("page", page.to_string()),
                ])
                .send()
                .await?,
        )
        .await?;
        Ok(response.json().await?)
    }

    /// Build a bridge for an existing conversation.
    pub async fn run_chat_in_conversation(
        self: &Arc<Self>,
        conversation_id: &str,
        was_open: bool,
        options: SessionOptions,
    ) -> Result<SessionBridge> {
        let last_time = match options.start {
            Some(start) => {
                self.get_last_time(conversation_id, start.skip_last_message)
                    .await?
            }
            None => 0,
        };
        Ok(SessionBridge::new(
            Arc::clone(self) as Arc<dyn ConversationClient>,
            conversation_id,
            last_time,
            options.poll_interval,
        )
        .with_was_open(was_open)
        .with_close_message(options.close_after))
    }

    /// Open a conversation with the contact `external_id` and build a bridge
    /// for it.
    pub async fn run_chat_with_user(
        self: &Arc<Self>,
        external_id: &str,
        was_open: bool,
        options: SessionOptions,
    ) -> Result<SessionBridge> {
        let conversation_id = self.create_conversation(external_id).await?;
        self.run_chat_in_conversation(&conversation_id, was_open, options)
            .await
    }
}

#[async_trait]
impl ConversationClient for IntercomClient {
    async fn reply(&self, conversation_id: &str, text: &str) -> Result<Value> {
        IntercomClient::reply(self, conversation_id, text).await
    }

    async fn read_messages(&self, conversation_id: &str, last_time: i64) -> Result<ReadBatch> {
        IntercomClient::read_messages(self, conversation_id, last_time).await
    }

    async fn mark_as_read(&self, conversation_id: &str) -> Result<()> {
        IntercomClient::mark_as_read(self, conversation_id).await
    }

    async fn open_conversation(&self, conversation_id: &str) -> Result<()> {
        IntercomClient::open_conversation(self, conversation_id).await
    }

    async fn close_conversation(&self, conversation_id: &str, message: &str) -> Result<()> {
        IntercomClient::close_conversation(self, conversation_id, message).await
    }
}
