//! CLI command handlers.

use std::sync::Arc;

use tracing::{info, warn};

use crate::bridge::{SessionOptions, StartOptions};
use crate::channel::chat_pair;
use crate::config::BridgeConfig;
use crate::coordinator::Coordinator;
use crate::engine::{AgentSession, ChatAgent, ConsoleAgent, JobInput, JobOutput, LocalApplication};
use crate::error::Result;
use crate::intercom::{Conversation, IntercomClient};

/// Handle `intercom-bridge serve`.
pub async fn handle_serve(config: &BridgeConfig) -> Result<()> {
    let client = Arc::new(IntercomClient::connect(config).await?);
    let app = LocalApplication::new(Arc::new(ConsoleAgent::new()), &config.engine);
    let coordinator = Coordinator::new(client, config);

    coordinator
        .hooks()
        .on_completed(Some(Arc::new(|conversation: Conversation, output: JobOutput| {
            Box::pin(async move {
                info!(
                    conversation_id = %conversation.id,
                    lines = output.transcription.len(),
                    "conversation completed"
                );
            })
        })));

    let stopper = coordinator.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("stopping after the current listing pass");
            stopper.stop();
        }
    });

    println!("Watching Intercom as admin {}", coordinator.client().admin_id());
    coordinator.simple_connect(&app).await
}

/// Handle `intercom-bridge list`.
pub async fn handle_list(config: &BridgeConfig, per_page: Option<u32>) -> Result<()> {
    let client = IntercomClient::connect(config).await?;
    let awaiting = client
        .awaiting_conversations(per_page.unwrap_or(config.watch.per_page))
        .await?;

    if awaiting.is_empty() {
        println!("No conversations awaiting a reply.");
        return Ok(());
    }
    for conversation in &awaiting {
        println!(
            "{}\t{}\twaiting since {}",
            conversation.id,
            if conversation.open { "open" } else { "closed" },
            conversation
                .waiting_since
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".into())
        );
    }
    Ok(())
}

/// Handle `intercom-bridge reply <id> <text>`.
pub async fn handle_reply(config: &BridgeConfig, conversation_id: &str, text: &str) -> Result<()> {
    let client = IntercomClient::connect(config).await?;
    client.reply(conversation_id, text).await?;
    println!("Replied to conversation {conversation_id}");
    Ok(())
}

/// Handle `intercom-bridge close <id>`.
pub async fn handle_close(
    config: &BridgeConfig,
    conversation_id: &str,
    message: Option<&str>,
) -> Result<()> {
    let client = IntercomClient::connect(config).await?;
    let message = message.unwrap_or(&config.session.close_message);
    client.close_conversation(conversation_id, message).await?;
    println!("Closed conversation {conversation_id}");
    Ok(())
}

/// Handle `intercom-bridge chat <external-id>`.
pub async fn handle_chat(config: &BridgeConfig, external_id: &str) -> Result<()> {
    let client = Arc::new(IntercomClient::connect(config).await?);
    let options = SessionOptions {
        close_after: Some(config.session.close_message.clone()),
        start: Some(StartOptions {
            skip_last_message: true,
        }),
        poll_interval: config.session.poll_interval(),
    };
    let bridge = client.run_chat_with_user(external_id, true, options).await?;
    let conversation_id = bridge.conversation_id().to_string();

    let (channel, connection) = chat_pair();
    let relay = tokio::spawn(async move { bridge.run(channel).await });

    let mut session = AgentSession::new(connection, Vec::new());
    let input = JobInput {
        conversation_id,
        continue_conversation: false,
    };
    let outcome = ConsoleAgent::new().converse(&input, &mut session).await;
    match &outcome {
        Ok(_) => session.hang_up(),
        Err(err) => session.fail(err.to_string()),
    }

    match relay.await {
        Ok(Err(err)) => warn!(error = %err, "session ended with an error"),
        Err(err) => warn!(error = %err, "session task failed"),
        Ok(Ok(())) => {}
    }
    outcome.map(|_| ())
}
