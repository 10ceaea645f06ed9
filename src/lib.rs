//! Khabar is a terminal news briefing and chat client for a regional news
//! assistant backed by remote LLM APIs.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the article index, conversation store, system prompt,
//!   tool dispatch, and the streaming turn engine with its tool-call loop.
//! - [`api`] defines the chat completion payloads spoken to the streaming
//!   endpoint, including tool declarations and tool-call deltas.
//! - [`cli`] parses arguments and runs the interactive chat loop and the
//!   article browse command.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`cli::run`].

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
