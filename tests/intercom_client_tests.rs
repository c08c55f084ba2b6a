mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use intercom_bridge::config::BridgeConfig;
use intercom_bridge::error::{BridgeError, ErrorCategory};
use intercom_bridge::intercom::{Conversation, DiscoverFn, IntercomClient, WatchOptions};

use common::{ADMIN_ID, conversation, conversation_with_parts, listing, part};

async fn mount_conversation(server: &MockServer, id: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/conversations/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn connect_resolves_acting_admin() {
    let server = MockServer::start().await;
    let client = common::connect(&server).await;
    assert_eq!(client.admin_id(), ADMIN_ID);
}

#[tokio::test]
async fn connect_without_token_is_a_configuration_error() {
    let server = MockServer::start().await;
    let config = BridgeConfig::default().with_base_url(server.uri());

    let err = IntercomClient::connect(&config).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);
    assert!(err.to_string().contains("INTERCOM_APIKEY"));
}

#[tokio::test]
async fn rejected_token_surfaces_intercom_error_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "type": "error.list",
            "errors": [{ "code": "unauthorized", "message": "Access Token Invalid" }],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = IntercomClient::connect(&common::config_for(&server))
        .await
        .unwrap_err();
    match &err {
        BridgeError::Api { status, message } => {
            assert_eq!(*status, 401);
            assert_eq!(message, "Access Token Invalid");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
    assert_eq!(err.category(), ErrorCategory::Authentication);
}

#[tokio::test]
async fn search_contact_requires_exact_external_id() {
    let server = MockServer::start().await;
    let client = common::connect(&server).await;
    Mock::given(method("POST"))
        .and(path("/contacts/search"))
        .and(body_partial_json(json!({
            "query": { "field": "external_id", "operator": "~", "value": "user-1" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "list",
            "data": [
                { "type": "contact", "id": "contact-10", "external_id": "user-10" },
                { "type": "contact", "id": "contact-1", "external_id": "user-1" },
            ],
        })))
        .mount(&server)
        .await;

    assert_eq!(
        client.search_contact("user-1").await.unwrap(),
        Some("contact-1".to_string())
    );
}

#[tokio::test]
async fn create_conversation_fails_early_for_unknown_contact() {
    let server = MockServer::start().await;
    let client = common::connect(&server).await;
    Mock::given(method("POST"))
        .and(path("/contacts/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": "contact-10", "external_id": "user-10" }],
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/conversations"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = client.create_conversation("user-1").await.unwrap_err();
    assert!(matches!(err, BridgeError::ContactNotFound(ref id) if id == "user-1"));
}

#[tokio::test]
async fn create_conversation_posts_greeting_from_contact() {
    let server = MockServer::start().await;
    let client = common::connect(&server).await;
    Mock::given(method("POST"))
        .and(path("/contacts/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": "contact-1", "external_id": "user-1" }],
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/conversations"))
        .and(body_json(json!({
            "from": { "type": "user", "id": "contact-1" },
            "body": "Chat has been created",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "conversation_id": "conv-9",
            "message_id": "msg-1",
        })))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(client.create_conversation("user-1").await.unwrap(), "conv-9");
}

#[tokio::test]
async fn get_messages_skips_admin_parts_and_old_parts() {
    let server = MockServer::start().await;
    let client = common::connect(&server).await;
    mount_conversation(
        &server,
        "conv-1",
        conversation_with_parts(
            "conv-1",
            true,
            10,
            5,
            vec![
                part("p1", "user-1", "<p>old</p>", 3),
                part("p2", ADMIN_ID, "<p>admin</p>", 5),
                part("p3", "user-1", "<p>new</p>", 7),
                part("p4", "user-1", "<p>newer</p>", 10),
            ],
        ),
    )
    .await;

    let ids: Vec<String> = client
        .get_messages("conv-1", 5)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(ids, vec!["p3".to_string(), "p4".to_string()]);
}

#[tokio::test]
async fn last_time_depends_on_skip_policy() {
    let server = MockServer::start().await;
    let client = common::connect(&server).await;
    mount_conversation(
        &server,
        "conv-1",
        conversation_with_parts(
            "conv-1",
            true,
            7,
            9,
            vec![
                part("p1", "user-1", "<p>a</p>", 3),
                part("p2", "user-1", "<p>b</p>", 7),
                part("p3", ADMIN_ID, "<p>c</p>", 9),
            ],
        ),
    )
    .await;

    assert_eq!(client.get_last_time("conv-1", true).await.unwrap(), 7);
    assert_eq!(client.get_last_time("conv-1", false).await.unwrap(), 6);
}

#[tokio::test]
async fn read_messages_forwards_paragraph_text_only() {
    let server = MockServer::start().await;
    let client = common::connect(&server).await;
    mount_conversation(
        &server,
        "conv-1",
        conversation_with_parts(
            "conv-1",
            true,
            6,
            1,
            vec![
                part("p1", "user-1", "<p>Hello</p>", 4),
                part("p2", "user-1", "Hello", 6),
            ],
        ),
    )
    .await;

    let batch = client.read_messages("conv-1", 0).await.unwrap();
    assert_eq!(batch.messages, vec!["Hello".to_string()]);
    assert_eq!(batch.last_time, 6);
}

#[tokio::test]
async fn reply_and_state_changes_act_as_admin() {
    let server = MockServer::start().await;
    let client = common::connect(&server).await;
    Mock::given(method("POST"))
        .and(path("/conversations/conv-1/reply"))
        .and(body_json(json!({
            "message_type": "comment",
            "type": "admin",
            "admin_id": ADMIN_ID,
            "body": "Hi there",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "conv-1" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/conversations/conv-1"))
        .and(body_json(json!({ "read": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "conv-1" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/conversations/conv-1/parts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "conv-1" })))
        .expect(2)
        .mount(&server)
        .await;

    let reply = client.reply("conv-1", "Hi there").await.unwrap();
    assert_eq!(reply["id"], "conv-1");
    client.mark_as_read("conv-1").await.unwrap();
    client.open_conversation("conv-1").await.unwrap();
    client.close_conversation("conv-1", "bye").await.unwrap();

    let parts = common::request_bodies(&server, "POST", "/conversations/conv-1/parts").await;
    assert_eq!(
        parts,
        vec![
            json!({ "message_type": "open", "admin_id": ADMIN_ID }),
            json!({ "message_type": "close", "type": "admin", "admin_id": ADMIN_ID, "body": "bye" }),
        ]
    );
}

#[tokio::test]
async fn awaiting_conversations_walks_every_page() {
    let server = MockServer::start().await;
    let client = common::connect(&server).await;
    Mock::given(method("GET"))
        .and(path("/conversations"))
        .and(query_param("order", "desc"))
        .and(query_param("sort", "waiting_since"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(
            vec![conversation("a", true, 100, 50), conversation("b", true, 50, 100)],
            1,
            2,
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/conversations"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(
            vec![conversation("c", false, 30, 20)],
            2,
            2,
        )))
        .mount(&server)
        .await;

    let ids: Vec<String> = client
        .awaiting_conversations(20)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(ids, vec!["a".to_string(), "c".to_string()]);
}

#[tokio::test]
async fn watch_discovers_across_pages_and_honours_stop() {
    let server = MockServer::start().await;
    let client = common::connect(&server).await;
    Mock::given(method("GET"))
        .and(path("/conversations"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(
            vec![conversation("a", true, 100, 50), conversation("b", true, 50, 100)],
            1,
            2,
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/conversations"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(
            vec![conversation("c", true, 30, 20)],
            2,
            2,
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/conversations"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(vec![], 3, 2)))
        .expect(0)
        .mount(&server)
        .await;

    let (found_tx, mut found_rx) = tokio::sync::mpsc::unbounded_channel();
    let on_discover: DiscoverFn = Arc::new(move |conversation: Conversation| {
        let found_tx = found_tx.clone();
        Box::pin(async move {
            let _ = found_tx.send(conversation.id);
        })
    });
    let passes = AtomicUsize::new(0);
    let options = WatchOptions {
        per_page: 20,
        poll_interval: Duration::from_millis(5),
    };

    client
        .watch_conversations(options, on_discover, || passes.fetch_add(1, Ordering::SeqCst) >= 1)
        .await
        .unwrap();

    let mut found = vec![found_rx.recv().await.unwrap(), found_rx.recv().await.unwrap()];
    found.sort();
    assert_eq!(found, vec!["a".to_string(), "c".to_string()]);
}

#[tokio::test]
async fn watch_stops_on_listing_error() {
    let server = MockServer::start().await;
    let client = common::connect(&server).await;
    Mock::given(method("GET"))
        .and(path("/conversations"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({ "reason": "maintenance" })))
        .mount(&server)
        .await;

    let on_discover: DiscoverFn = Arc::new(|_c: Conversation| Box::pin(async {}));
    let err = client
        .watch_conversations(WatchOptions::default(), on_discover, || false)
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Api { status: 503, ref message } if message == "maintenance"));
    assert_eq!(err.category(), ErrorCategory::Server);
}
