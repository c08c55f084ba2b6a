//! Wire types for the Intercom REST API.
//!
//! Only the fields the bridge reads are modelled; everything else in the
//! payloads is ignored on deserialization.

use serde::{Deserialize, Serialize};

/// Author of a conversation part.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Author {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// One message or event within a conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConversationPart {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub part_type: String,
    pub author: Author,
    #[serde(default)]
    pub body: Option<String>,
    pub created_at: i64,
    #[serde(default)]
    pub redacted: bool,
}

/// Reply statistics for a conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Statistics {
    pub last_contact_reply_at: Option<i64>,
    pub last_admin_reply_at: Option<i64>,
    pub first_admin_reply_at: Option<i64>,
    pub last_close_at: Option<i64>,
    pub count_reopens: Option<u32>,
    pub count_conversation_parts: Option<u32>,
}

/// Parts container embedded in a full conversation payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConversationParts {
    pub conversation_parts: Vec<ConversationPart>,
    pub total_count: u32,
}

/// An Intercom conversation as returned by the listing and fetch endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub open: bool,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default)]
    pub waiting_since: Option<i64>,
    #[serde(default)]
    pub statistics: Option<Statistics>,
    #[serde(default)]
    pub conversation_parts: ConversationParts,
}

impl Conversation {
    /// Whether the contact replied after the last admin reply.
    ///
    /// Conversations without statistics, or without any contact reply, never
    /// qualify. A missing admin reply counts as "never replied".
    pub fn awaiting_reply(&self) -> bool {
        let Some(stats) = &self.statistics else {
            return false;
        };
        match (stats.last_contact_reply_at, stats.last_admin_reply_at) {
            (Some(contact), Some(admin)) => contact > admin,
            (Some(_), None) => true,
            _ => false,
        }
    }

    pub fn parts(&self) -> &[ConversationPart] {
        &self.conversation_parts.conversation_parts
    }
}

/// Pagination block of a conversation listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Pages {
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

/// One page of the conversation listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConversationList {
    pub conversations: Vec<Conversation>,
    pub pages: Pages,
}

/// A contact record from the search endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contact {
    pub id: String,
    #[serde(default)]
    pub external_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContactSearchResponse {
    #[serde(default)]
    pub data: Vec<Contact>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AdminResponse {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedConversation {
    pub conversation_id: String,
}
