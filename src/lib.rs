//! Social Agent — AI reply pipeline for social commerce messaging.

pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod safety;
pub mod server;
pub mod store;
