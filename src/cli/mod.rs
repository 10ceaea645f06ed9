//! Command-line interface parsing and handling
//!
//! This module parses arguments and dispatches into the chat loop or the
//! article browse command.

pub mod articles;
pub mod chat;

use std::error::Error;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "khabar")]
#[command(about = "A terminal news briefing and chat assistant for Odisha")]
#[command(
    long_about = "Khabar is a terminal client for a regional news assistant. It browses a \
bundled article index and answers questions about it through a streaming AI chat with \
article lookups.\n\n\
Environment Variables:\n\
  OPENAI_API_KEY    API key for the chat endpoint (or set api_key in the config file)\n\
  OPENAI_BASE_URL   Custom API base URL (optional, defaults to https://api.openai.com/v1)\n\n\
Chat commands:\n\
  /new [text]       Start a new conversation (optionally seeded with text)\n\
  /list             List conversations, most recently updated first\n\
  /switch <n>       Switch to conversation n from /list\n\
  /delete <n>       Delete conversation n from /list\n\
  /quit             Exit"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Model to use for chat
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Send this message as soon as the chat starts, in a fresh conversation
    #[arg(short = 's', long, global = true, value_name = "TEXT")]
    pub prompt: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the chat interface (default)
    Chat,
    /// Browse the bundled article index
    Articles {
        /// Only show articles from this district
        #[arg(short, long)]
        district: Option<String>,
        /// Only show articles in this category
        #[arg(short, long)]
        category: Option<String>,
        /// Page number (6 articles per page)
        #[arg(short, long, default_value_t = 1)]
        page: usize,
    },
}

pub async fn run() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    match args.command {
        Some(Commands::Articles {
            district,
            category,
            page,
        }) => articles::run(district.as_deref(), category.as_deref(), page),
        Some(Commands::Chat) | None => {
            chat::run(args.model.as_deref(), args.prompt.as_deref()).await
        }
    }
}
