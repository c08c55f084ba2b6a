//! CLI entry point for intercom-bridge.

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Intercom ↔ AI engine bridge
#[derive(Parser, Debug)]
#[command(name = "intercom-bridge", version, about = "Route Intercom conversations to an AI agent")]
pub struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch for conversations and answer them from this console
    Serve,
    /// List conversations awaiting a reply
    List(ListArgs),
    /// Post an admin reply to a conversation
    Reply(ReplyArgs),
    /// Close a conversation
    Close(CloseArgs),
    /// Start a conversation with a contact and chat from this console
    Chat(ChatArgs),
}

#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Conversations per listing page
    #[arg(long)]
    pub per_page: Option<u32>,
}

#[derive(Parser, Debug)]
pub struct ReplyArgs {
    pub conversation_id: String,
    pub text: String,
}

#[derive(Parser, Debug)]
pub struct CloseArgs {
    pub conversation_id: String,

    /// Closing message (defaults to the configured close message)
    #[arg(short, long)]
    pub message: Option<String>,
}

#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// The contact's external id
    pub external_id: String,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
