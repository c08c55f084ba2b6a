//! Interfaces of the conversational-AI engine the coordinator feeds.
//!
//! The engine is a black box with a job queue: the coordinator pushes job
//! ids, the queue reports [`QueueEvent`]s back, and when a job runs the
//! engine asks the installed [`ConnectionProvider`] for a chat channel.
//! [`local::LocalApplication`] is an in-process implementation.

pub mod console;
pub mod local;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::channel::ChatConnection;
use crate::error::Result;

pub use console::ConsoleAgent;
pub use local::{AgentSession, ChatAgent, LocalApplication, LocalQueue};

/// Input the coordinator seeds into every job.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobInput {
    pub conversation_id: String,
    /// True when the Intercom conversation was already open.
    pub continue_conversation: bool,
}

/// Who produced a transcribed line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Human,
    Ai,
}

/// One transcribed line of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transcription {
    pub speaker: Speaker,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl Transcription {
    pub fn human(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Human,
            text: text.into(),
            at: Utc::now(),
        }
    }

    pub fn ai(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Ai,
            text: text.into(),
            at: Utc::now(),
        }
    }
}

/// Observable events emitted while a job executes.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Transcription(Transcription),
    DebugLog(serde_json::Value),
}

/// Callback receiving [`JobEvent`]s.
pub type JobEventSink = Arc<dyn Fn(JobEvent) + Send + Sync>;

/// Result of a finished job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobOutput {
    #[serde(default)]
    pub output: serde_json::Value,
    #[serde(default)]
    pub transcription: Vec<Transcription>,
    pub finished_at: DateTime<Utc>,
}

/// A job the queue has accepted and is ready to run.
#[async_trait]
pub trait JobContext: Send {
    fn job_id(&self) -> &str;

    fn set_input(&mut self, input: JobInput);

    fn add_event_sink(&mut self, sink: JobEventSink);

    /// Run the conversation to completion.
    async fn execute(self: Box<Self>) -> Result<JobOutput>;
}

/// Lifecycle notifications from the job queue.
pub enum QueueEvent {
    Ready {
        job_id: String,
        job: Box<dyn JobContext>,
    },
    Timeout {
        job_id: String,
    },
    Rejected {
        job_id: String,
        reason: String,
    },
}

impl QueueEvent {
    pub fn job_id(&self) -> &str {
        match self {
            Self::Ready { job_id, .. } | Self::Timeout { job_id } | Self::Rejected { job_id, .. } => {
                job_id
            }
        }
    }
}

impl fmt::Debug for QueueEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready { job_id, .. } => f.debug_struct("Ready").field("job_id", job_id).finish(),
            Self::Timeout { job_id } => f.debug_struct("Timeout").field("job_id", job_id).finish(),
            Self::Rejected { job_id, reason } => f
                .debug_struct("Rejected")
                .field("job_id", job_id)
                .field("reason", reason)
                .finish(),
        }
    }
}

/// The engine's job queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Ask the queue to accept a job.
    async fn push(&self, job_id: &str) -> Result<()>;

    /// Take the event stream. Only the first call succeeds.
    fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<QueueEvent>>;
}

/// Factory the engine calls to obtain a chat channel for a running job.
pub type ConnectionProvider = Arc<
    dyn Fn(JobInput) -> Pin<Box<dyn Future<Output = Result<ChatConnection>> + Send>>
        + Send
        + Sync,
>;

/// A deployed engine application.
pub trait Application: Send + Sync {
    fn queue(&self) -> Arc<dyn JobQueue>;

    /// Replace the channel factory used for new jobs.
    fn set_connection_provider(&self, provider: ConnectionProvider);
}
