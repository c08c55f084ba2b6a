//! In-process engine: a bounded job queue that hands each job's chat channel
//! to a [`ChatAgent`].

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

use crate::channel::ChatConnection;
use crate::config::EngineConfig;
use crate::error::{BridgeError, Result};

use super::{
    Application, ConnectionProvider, JobContext, JobEvent, JobEventSink, JobInput, JobOutput,
    JobQueue, QueueEvent, Transcription,
};

/// The conversational side of a local job.
#[async_trait]
pub trait ChatAgent: Send + Sync {
    /// Hold the conversation; returning ends it.
    async fn converse(&self, input: &JobInput, session: &mut AgentSession) -> Result<Value>;
}

/// An agent's view of a running conversation. Every line said or heard is
/// transcribed and reported to the job's event sinks.
pub struct AgentSession {
    connection: ChatConnection,
    sinks: Vec<JobEventSink>,
    transcript: Vec<Transcription>,
}

impl AgentSession {
    pub fn new(connection: ChatConnection, sinks: Vec<JobEventSink>) -> Self {
        Self {
            connection,
            sinks,
            transcript: Vec::new(),
        }
    }

    /// Send AI text to the user.
    pub fn say(&mut self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        self.connection.send_text(text.clone())?;
        self.record(Transcription::ai(text));
        Ok(())
    }

    /// Wait for the next user message; `None` once the bridge is gone.
    pub async fn listen(&mut self) -> Option<String> {
        let text = self.connection.recv_text().await?;
        self.emit(JobEvent::DebugLog(json!({
            "msg": {
                "msgId": "RecognizedSpeechMessage",
                "results": [{ "text": text, "facts": [] }],
            }
        })));
        self.record(Transcription::human(text.clone()));
        Some(text)
    }

    /// Tell the bridge the conversation is over. A bridge that is already
    /// gone is not an error.
    pub fn hang_up(&self) {
        let _ = self.connection.close();
    }

    /// Tell the bridge the conversation ended with an error.
    pub fn fail(&self, message: impl Into<String>) {
        let _ = self.connection.error(message);
    }

    pub fn transcript(&self) -> &[Transcription] {
        &self.transcript
    }

    fn record(&mut self, line: Transcription) {
        self.emit(JobEvent::Transcription(line.clone()));
        self.transcript.push(line);
    }

    fn emit(&self, event: JobEvent) {
        for sink in &self.sinks {
            sink(event.clone());
        }
    }
}

struct QueueShared {
    events_tx: mpsc::UnboundedSender<QueueEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<QueueEvent>>>,
    pending: Mutex<HashSet<String>>,
    slots: Arc<Semaphore>,
    max_pending: usize,
    queue_timeout: Duration,
    provider: RwLock<Option<ConnectionProvider>>,
    agent: Arc<dyn ChatAgent>,
}

impl QueueShared {
    fn emit(&self, event: QueueEvent) {
        if self.events_tx.send(event).is_err() {
            debug!("queue event dropped; nobody subscribed");
        }
    }

    fn release(&self, job_id: &str) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(job_id);
    }
}

/// Bounded queue with a fixed number of concurrently running jobs.
///
/// - more than `max_pending` queued or running jobs → `Rejected`
/// - waiting longer than `queue_timeout` for a slot → `Timeout`
pub struct LocalQueue {
    shared: Arc<QueueShared>,
}

impl LocalQueue {
    pub fn new(agent: Arc<dyn ChatAgent>, config: &EngineConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(QueueShared {
                events_tx,
                events_rx: Mutex::new(Some(events_rx)),
                pending: Mutex::new(HashSet::new()),
                slots: Arc::new(Semaphore::new(config.concurrency.max(1))),
                max_pending: config.max_pending,
                queue_timeout: config.queue_timeout(),
                provider: RwLock::new(None),
                agent,
            }),
        }
    }

    /// Number of queued or running jobs.
    pub fn pending(&self) -> usize {
        self.shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl JobQueue for LocalQueue {
    async fn push(&self, job_id: &str) -> Result<()> {
        {
            let mut pending = self
                .shared
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if pending.contains(job_id) {
                return Err(BridgeError::Queue(format!("job '{job_id}' is already queued")));
            }
            if pending.len() >= self.shared.max_pending {
                drop(pending);
                self.shared.emit(QueueEvent::Rejected {
                    job_id: job_id.to_string(),
                    reason: "queue is full".into(),
                });
                return Ok(());
            }
            pending.insert(job_id.to_string());
        }

        let shared = self.shared.clone();
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            let slot =
                tokio::time::timeout(shared.queue_timeout, shared.slots.clone().acquire_owned())
                    .await;
            match slot {
                Ok(Ok(permit)) => {
                    debug!(job_id = %job_id, "job ready");
                    let job = LocalJob {
                        job_id: job_id.clone(),
                        input: None,
                        sinks: Vec::new(),
                        shared: shared.clone(),
                        _permit: permit,
                    };
                    shared.emit(QueueEvent::Ready {
                        job_id,
                        job: Box::new(job),
                    });
                }
                Ok(Err(_)) => {
                    shared.release(&job_id);
                    shared.emit(QueueEvent::Rejected {
                        job_id,
                        reason: "queue is shut down".into(),
                    });
                }
                Err(_) => {
                    shared.release(&job_id);
                    info!(job_id = %job_id, "job timed out waiting for a slot");
                    shared.emit(QueueEvent::Timeout { job_id });
                }
            }
        });
        Ok(())
    }

    fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<QueueEvent>> {
        self.shared
            .events_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| BridgeError::InvalidState("queue events already subscribed".into()))
    }
}

/// A job holding one concurrency slot until it is dropped.
struct LocalJob {
    job_id: String,
    input: Option<JobInput>,
    sinks: Vec<JobEventSink>,
    shared: Arc<QueueShared>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for LocalJob {
    fn drop(&mut self) {
        self.shared.release(&self.job_id);
    }
}

#[async_trait]
impl JobContext for LocalJob {
    fn job_id(&self) -> &str {
        &self.job_id
    }

    fn set_input(&mut self, input: JobInput) {
        self.input = Some(input);
    }

    fn add_event_sink(&mut self, sink: JobEventSink) {
        self.sinks.push(sink);
    }

    async fn execute(mut self: Box<Self>) -> Result<JobOutput> {
        let input = self
            .input
            .take()
            .ok_or_else(|| BridgeError::InvalidState("job input was not set".into()))?;
        let provider = self
            .shared
            .provider
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| BridgeError::Configuration("no connection provider installed".into()))?;

        let connection = provider(input.clone()).await?;
        let mut session = AgentSession::new(connection, std::mem::take(&mut self.sinks));
        let agent = self.shared.agent.clone();

        match agent.converse(&input, &mut session).await {
            Ok(output) => {
                session.hang_up();
                Ok(JobOutput {
                    output,
                    transcription: session.transcript,
                    finished_at: Utc::now(),
                })
            }
            Err(err) => {
                session.fail(err.to_string());
                Err(err)
            }
        }
    }
}

/// An engine application running entirely in this process.
pub struct LocalApplication {
    queue: Arc<LocalQueue>,
}

impl LocalApplication {
    pub fn new(agent: Arc<dyn ChatAgent>, config: &EngineConfig) -> Self {
        Self {
            queue: Arc::new(LocalQueue::new(agent, config)),
        }
    }

    pub fn local_queue(&self) -> &Arc<LocalQueue> {
        &self.queue
    }
}

impl Application for LocalApplication {
    fn queue(&self) -> Arc<dyn JobQueue> {
        self.queue.clone()
    }

    fn set_connection_provider(&self, provider: ConnectionProvider) {
        *self
            .queue
            .shared
            .provider
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(provider);
    }
}
