//! Operator console agent: the person at the terminal plays the AI side.

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use crate::error::Result;

use super::local::{AgentSession, ChatAgent};
use super::JobInput;

/// Typed line that ends the conversation.
pub const HANG_UP_COMMAND: &str = "/bye";

/// Relays helpdesk messages to stdout and stdin lines back as replies.
///
/// Only one conversation can own the terminal at a time; concurrent jobs
/// wait for the stdin lock.
pub struct ConsoleAgent {
    stdin: Mutex<Lines<BufReader<Stdin>>>,
}

impl ConsoleAgent {
    pub fn new() -> Self {
        Self {
            stdin: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

impl Default for ConsoleAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatAgent for ConsoleAgent {
    async fn converse(&self, input: &JobInput, session: &mut AgentSession) -> Result<Value> {
        let mut stdin = self.stdin.lock().await;
        println!(
            "--- conversation {} ({}) - type {HANG_UP_COMMAND} to finish ---",
            input.conversation_id,
            if input.continue_conversation { "continued" } else { "new" }
        );

        let mut replies = 0usize;
        let reason = loop {
            tokio::select! {
                heard = session.listen() => match heard {
                    Some(text) => println!("user> {text}"),
                    None => break "helpdesk closed",
                },
                line = stdin.next_line() => match line? {
                    Some(line) if line.trim() == HANG_UP_COMMAND => break "operator hung up",
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => {
                        session.say(line.trim())?;
                        replies += 1;
                    }
                    None => break "console input closed",
                },
            }
        };

        println!("--- conversation {} ended: {reason} ---", input.conversation_id);
        Ok(json!({ "reason": reason, "replies": replies }))
    }
}
