mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use intercom_bridge::config::DEFAULT_CLOSE_MESSAGE;
use intercom_bridge::coordinator::Coordinator;
use intercom_bridge::engine::{
    AgentSession, Application, ChatAgent, JobInput, JobOutput, LocalApplication,
};
use intercom_bridge::error::{BridgeError, Result};
use intercom_bridge::intercom::{Conversation, IntercomClient};

use common::{conversation, conversation_with_parts, listing, part};

struct ScriptedAgent;

#[async_trait]
impl ChatAgent for ScriptedAgent {
    async fn converse(&self, input: &JobInput, session: &mut AgentSession) -> Result<Value> {
        let heard = session.listen().await.unwrap_or_default();
        session.say("How can I help?")?;
        Ok(json!({ "heard": heard, "continued": input.continue_conversation }))
    }
}

async fn mount_helpdesk(server: &MockServer) {
    common::mount_me(server).await;
    Mock::given(method("GET"))
        .and(path("/conversations"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(listing(vec![conversation("conv-1", true, 100, 50)], 1, 1)),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/conversations/conv-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(conversation_with_parts(
            "conv-1",
            true,
            100,
            50,
            vec![part("p1", "user-1", "<p>Need help</p>", 100)],
        )))
        .mount(server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/conversations/conv-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "conv-1" })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/conversations/conv-1/reply"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "conv-1" })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/conversations/conv-1/parts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "conv-1" })))
        .mount(server)
        .await;
}

async fn setup(server: &MockServer) -> (Coordinator, Arc<LocalApplication>) {
    mount_helpdesk(server).await;
    let config = common::config_for(server);
    let client = IntercomClient::connect(&config).await.expect("connect");
    let app = Arc::new(LocalApplication::new(Arc::new(ScriptedAgent), &config.engine));
    (Coordinator::new(Arc::new(client), &config), app)
}

async fn wait_for_close(server: &MockServer) -> Vec<Value> {
    for _ in 0..200 {
        let parts = common::request_bodies(server, "POST", "/conversations/conv-1/parts").await;
        if parts.iter().any(|p| p["message_type"] == "close") {
            return parts;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("conversation was never closed");
}

#[tokio::test]
async fn discovered_conversation_is_answered_and_closed() {
    let server = MockServer::start().await;
    let (coordinator, app) = setup(&server).await;

    let (done_tx, mut done_rx) = tokio::sync::mpsc::unbounded_channel();
    coordinator
        .hooks()
        .on_completed(Some(Arc::new(move |c: Conversation, output: JobOutput| {
            let done_tx = done_tx.clone();
            Box::pin(async move {
                let _ = done_tx.send((c.id, output.output));
            })
        })));

    let running = {
        let coordinator = coordinator.clone();
        let app = app.clone();
        tokio::spawn(async move { coordinator.simple_connect(app.as_ref()).await })
    };

    let (id, output) = tokio::time::timeout(Duration::from_secs(5), done_rx.recv())
        .await
        .expect("conversation completed in time")
        .expect("hook fired");
    coordinator.stop();

    assert_eq!(id, "conv-1");
    assert_eq!(output, json!({ "heard": "Need help", "continued": true }));

    let parts = wait_for_close(&server).await;
    let replies = common::request_bodies(&server, "POST", "/conversations/conv-1/reply").await;
    assert!(replies.iter().any(|r| r["body"] == "How can I help?"));

    let close = parts
        .iter()
        .find(|p| p["message_type"] == "close")
        .expect("close part");
    assert_eq!(close["body"], DEFAULT_CLOSE_MESSAGE);
    assert_eq!(close["admin_id"], common::ADMIN_ID);
    // an open conversation is never reopened
    assert!(!parts.iter().any(|p| p["message_type"] == "open"));

    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("watcher stopped")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn second_connect_while_running_is_a_no_op() {
    let server = MockServer::start().await;
    let (coordinator, app) = setup(&server).await;

    let running = {
        let coordinator = coordinator.clone();
        let app = app.clone();
        tokio::spawn(async move { coordinator.simple_connect(app.as_ref()).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = tokio::time::timeout(
        Duration::from_secs(1),
        coordinator.simple_connect(app.as_ref()),
    )
    .await
    .expect("second call returns immediately");
    assert!(second.is_ok());

    coordinator.stop();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("watcher stopped")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn connect_fails_when_queue_events_are_taken() {
    let server = MockServer::start().await;
    let (coordinator, app) = setup(&server).await;
    let _events = app.queue().subscribe().unwrap();

    let first = coordinator.simple_connect(app.as_ref()).await;
    assert!(matches!(first, Err(BridgeError::InvalidState(_))));

    // the guard was released, so the retry is attempted rather than skipped
    let retry = coordinator.simple_connect(app.as_ref()).await;
    assert!(matches!(retry, Err(BridgeError::InvalidState(_))));
    assert!(coordinator.in_flight_ids().is_empty());
}
