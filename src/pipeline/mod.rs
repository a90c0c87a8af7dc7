//! Inbound message pipeline.
//!
//! Every customer message flows through [`processor::WebhookProcessor`]:
//! dedup, config resolution, persistence, rate limiting, reply generation
//! with guardrails and self-assessed confidence, and finally a disposition
//! that either clears the reply for sending or parks it as a draft for a
//! human.

pub mod approval;
pub mod confidence;
pub mod processor;
pub mod prompts;
pub mod rate_limit;
pub mod responder;
pub mod types;

pub use processor::{ProcessorDeps, WebhookProcessor};
pub use types::{InboundMessage, ProcessingAction, ProcessingResult};
