//! Shared wiremock fixtures for Intercom integration tests.

#![allow(dead_code)]

use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use intercom_bridge::config::BridgeConfig;
use intercom_bridge::intercom::IntercomClient;

pub const ADMIN_ID: &str = "admin-1";
pub const TOKEN: &str = "test-token";

/// Config pointing at the mock server with fast poll intervals.
pub fn config_for(server: &MockServer) -> BridgeConfig {
    let mut config = BridgeConfig::new(TOKEN).with_base_url(server.uri());
    config.watch.poll_interval_ms = 20;
    config.session.poll_interval_ms = 10;
    config
}

pub async fn mount_me(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "admin",
            "id": ADMIN_ID,
            "email": "support@example.test",
        })))
        .mount(server)
        .await;
}

/// Mount `/me` and connect a client to the mock server.
pub async fn connect(server: &MockServer) -> IntercomClient {
    mount_me(server).await;
    IntercomClient::connect(&config_for(server))
        .await
        .expect("connect")
}

pub fn part(id: &str, author_id: &str, body: &str, created_at: i64) -> Value {
    json!({
        "type": "conversation_part",
        "id": id,
        "part_type": "comment",
        "body": body,
        "created_at": created_at,
        "author": { "type": if author_id == ADMIN_ID { "admin" } else { "user" }, "id": author_id },
        "redacted": false,
    })
}

pub fn conversation(id: &str, open: bool, contact_reply: i64, admin_reply: i64) -> Value {
    conversation_with_parts(id, open, contact_reply, admin_reply, Vec::new())
}

pub fn conversation_with_parts(
    id: &str,
    open: bool,
    contact_reply: i64,
    admin_reply: i64,
    parts: Vec<Value>,
) -> Value {
    let total_count = parts.len();
    json!({
        "type": "conversation",
        "id": id,
        "open": open,
        "state": if open { "open" } else { "closed" },
        "read": false,
        "created_at": 1,
        "updated_at": contact_reply,
        "waiting_since": contact_reply,
        "statistics": {
            "type": "conversation_statistics",
            "last_contact_reply_at": contact_reply,
            "last_admin_reply_at": admin_reply,
        },
        "conversation_parts": {
            "type": "conversation_part.list",
            "conversation_parts": parts,
            "total_count": total_count,
        },
    })
}

pub fn listing(conversations: Vec<Value>, page: u32, total_pages: u32) -> Value {
    json!({
        "type": "conversation.list",
        "conversations": conversations,
        "pages": { "type": "pages", "page": page, "per_page": 20, "total_pages": total_pages },
    })
}

/// Bodies of every request the server saw for `method` + `path`.
pub async fn request_bodies(server: &MockServer, verb: &str, url_path: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.as_str() == verb && r.url.path() == url_path)
        .map(|r| serde_json::from_slice(&r.body).unwrap_or(Value::Null))
        .collect()
}
