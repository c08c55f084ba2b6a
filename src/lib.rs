//! intercom-bridge: routes Intercom helpdesk conversations to an AI engine.
//!
//! A [`coordinator::Coordinator`] watches the Intercom conversation listing,
//! enqueues every conversation awaiting a reply into an engine job queue,
//! and relays messages between the conversation and the engine through a
//! [`bridge::SessionBridge`] while the job runs.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use intercom_bridge::prelude::*;
//!
//! # async fn example() -> intercom_bridge::error::Result<()> {
//! let config = BridgeConfig::load(None)?;
//! let client = Arc::new(IntercomClient::connect(&config).await?);
//! let app = LocalApplication::new(Arc::new(ConsoleAgent::new()), &config.engine);
//! let coordinator = Coordinator::new(client, &config);
//! coordinator.simple_connect(&app).await?;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod channel;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod intercom;
pub mod prelude;

#[cfg(feature = "cli")]
pub mod cli;
