//! Persistence contracts used by the pipeline.
//!
//! [`Database`] covers conversations, messages, drafts and configuration.
//! The rate-window count and the usage ledger are separate traits so that
//! each can be swapped or mocked on its own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::{AgentConfigRecord, ConfigRows, ConfigScope};
use crate::error::DatabaseError;
use crate::pipeline::types::Platform;
use crate::store::models::{
    Conversation, ConversationKey, DraftDecision, NewMessage, StoredMessage, UsageRecord,
};

/// Backend-agnostic storage for the messaging pipeline.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Conversations ───────────────────────────────────────────────

    /// Find the conversation for `key` or create it, refreshing
    /// `last_activity` and any display fields present on the key.
    async fn upsert_conversation(
        &self,
        key: &ConversationKey,
    ) -> Result<Conversation, DatabaseError>;

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, DatabaseError>;

    /// Flag a conversation for human attention.
    async fn mark_conversation_escalated(&self, id: &str) -> Result<(), DatabaseError>;

    // ── Messages ────────────────────────────────────────────────────

    /// Whether a message with this platform id was already stored.
    async fn message_exists_with_platform_id(
        &self,
        platform_message_id: &str,
    ) -> Result<bool, DatabaseError>;

    /// Insert a message. A duplicate `platform_message_id` yields
    /// [`DatabaseError::Constraint`].
    async fn insert_message(&self, message: &NewMessage) -> Result<StoredMessage, DatabaseError>;

    async fn get_message(&self, id: &str) -> Result<Option<StoredMessage>, DatabaseError>;

    /// The most recent non-draft messages of a conversation, oldest first,
    /// leaving out `exclude_id`.
    async fn recent_context_messages(
        &self,
        conversation_id: &str,
        limit: usize,
        exclude_id: Option<&str>,
    ) -> Result<Vec<StoredMessage>, DatabaseError>;

    /// Every message of a conversation, oldest first.
    async fn list_conversation_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<StoredMessage>, DatabaseError>;

    // ── Drafts ──────────────────────────────────────────────────────

    /// Drafts awaiting a human decision, oldest first.
    async fn list_pending_drafts(&self, limit: usize) -> Result<Vec<StoredMessage>, DatabaseError>;

    /// Approve or reject a pending draft and return the updated message.
    async fn resolve_draft(
        &self,
        id: &str,
        decision: DraftDecision,
    ) -> Result<StoredMessage, DatabaseError>;

    // ── Agent configuration ─────────────────────────────────────────

    /// Load the global row and the row for `platform` in one query.
    async fn load_agent_configs(&self, platform: Platform) -> Result<ConfigRows, DatabaseError>;

    /// Create or replace the row for `scope`.
    async fn save_agent_config(
        &self,
        scope: ConfigScope,
        record: &AgentConfigRecord,
    ) -> Result<(), DatabaseError>;
}

/// Counts sends inside the rate-limit window.
#[async_trait]
pub trait SendCounter: Send + Sync {
    /// Outbound messages with `sent_at >= since`, optionally for one
    /// platform only.
    async fn count_sent_outbound_since(
        &self,
        since: DateTime<Utc>,
        platform: Option<Platform>,
    ) -> Result<u64, DatabaseError>;
}

/// Append-only record of completion token usage.
#[async_trait]
pub trait UsageLedger: Send + Sync {
    async fn record_usage(&self, record: &UsageRecord) -> Result<(), DatabaseError>;
}
