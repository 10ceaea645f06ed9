pub mod article;
pub mod chat_stream;
pub mod config;
pub mod engine;
pub mod prompt;
pub mod store;
pub mod tools;
