//! Persistence layer — conversations, messages, drafts, agent configuration
//! and LLM usage.

pub mod libsql_backend;
pub mod migrations;
pub mod models;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use models::{
    ApprovalStatus, Conversation, ConversationKey, ConversationStatus, Direction, DraftDecision,
    FEATURE_SOCIAL_REPLY, NewMessage, StoredMessage, UsageRecord,
};
pub use traits::{Database, SendCounter, UsageLedger};
