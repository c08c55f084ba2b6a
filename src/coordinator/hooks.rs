//! Observer slots for conversation lifecycle outcomes.
//!
//! Each slot holds at most one handler. Setting a slot replaces its handler;
//! setting `None` clears it.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use crate::engine::{JobOutput, Transcription};
use crate::error::BridgeError;
use crate::intercom::Conversation;

pub type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Called with the discovery snapshot and the job's result.
pub type CompletedHook = Arc<dyn Fn(Conversation, JobOutput) -> HookFuture + Send + Sync>;

/// Called with the discovery snapshot and the execution error.
pub type FailedHook = Arc<dyn Fn(Conversation, BridgeError) -> HookFuture + Send + Sync>;

/// Called for rejected and timed-out conversations.
pub type ConversationHook = Arc<dyn Fn(Conversation) -> HookFuture + Send + Sync>;

pub type TranscriptionHook =
    Arc<dyn Fn(Conversation, Transcription) -> HookFuture + Send + Sync>;

/// Severity passed to a [`LogSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        })
    }
}

/// User-supplied receiver of coordinator lifecycle messages.
pub type LogSink = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

#[derive(Default)]
pub struct Hooks {
    completed: RwLock<Option<CompletedHook>>,
    failed: RwLock<Option<FailedHook>>,
    rejected: RwLock<Option<ConversationHook>>,
    timed_out: RwLock<Option<ConversationHook>>,
    transcription: RwLock<Option<TranscriptionHook>>,
    logger: RwLock<Option<LogSink>>,
}

fn replace<T>(slot: &RwLock<Option<T>>, value: Option<T>) {
    *slot.write().unwrap_or_else(PoisonError::into_inner) = value;
}

fn current<T: Clone>(slot: &RwLock<Option<T>>) -> Option<T> {
    slot.read().unwrap_or_else(PoisonError::into_inner).clone()
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_completed(&self, hook: Option<CompletedHook>) {
        replace(&self.completed, hook);
    }

    pub fn on_failed(&self, hook: Option<FailedHook>) {
        replace(&self.failed, hook);
    }

    pub fn on_rejected(&self, hook: Option<ConversationHook>) {
        replace(&self.rejected, hook);
    }

    pub fn on_timed_out(&self, hook: Option<ConversationHook>) {
        replace(&self.timed_out, hook);
    }

    pub fn on_transcription(&self, hook: Option<TranscriptionHook>) {
        replace(&self.transcription, hook);
    }

    pub fn set_logger(&self, sink: Option<LogSink>) {
        replace(&self.logger, sink);
    }

    pub(crate) fn completed(&self) -> Option<CompletedHook> {
        current(&self.completed)
    }

    pub(crate) fn failed(&self) -> Option<FailedHook> {
        current(&self.failed)
    }

    pub(crate) fn rejected(&self) -> Option<ConversationHook> {
        current(&self.rejected)
    }

    pub(crate) fn timed_out(&self) -> Option<ConversationHook> {
        current(&self.timed_out)
    }

    pub(crate) fn transcription(&self) -> Option<TranscriptionHook> {
        current(&self.transcription)
    }

    /// Emit a lifecycle message to tracing and to the user sink, if any.
    pub(crate) fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!("{message}"),
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warn => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
        }
        if let Some(sink) = current(&self.logger) {
            sink(level, message);
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("completed", &self.completed().is_some())
            .field("failed", &self.failed().is_some())
            .field("rejected", &self.rejected().is_some())
            .field("timed_out", &self.timed_out().is_some())
            .field("transcription", &self.transcription().is_some())
            .field("logger", &current(&self.logger).is_some())
            .finish()
    }
}
