//! libSQL backend — implementation of the store traits.
//!
//! Supports local file and in-memory databases. Timestamps are written as
//! RFC 3339 with fixed microsecond precision so that string comparison in
//! SQL matches chronological order.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{AgentConfigRecord, ConfigRows, ConfigScope};
use crate::error::DatabaseError;
use crate::pipeline::types::Platform;
use crate::store::migrations;
use crate::store::models::{
    ApprovalStatus, Conversation, ConversationKey, Direction, DraftDecision, NewMessage,
    StoredMessage, UsageRecord,
};
use crate::store::traits::{Database, SendCounter, UsageLedger};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn get_conversation_by_key(
        &self,
        platform: Platform,
        platform_user_id: &str,
        thread_key: &str,
    ) -> Result<Option<Conversation>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations
                     WHERE platform = ?1 AND platform_user_id = ?2 AND thread_key = ?3"
                ),
                params![platform.as_str(), platform_user_id, thread_key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_conversation_by_key: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("get_conversation_by_key: {e}")))?
        {
            Some(row) => Ok(Some(row_to_conversation(&row)?)),
            None => Ok(None),
        }
    }

    async fn query_messages(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<StoredMessage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut messages = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?
        {
            messages.push(row_to_message(&row)?);
        }
        Ok(messages)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical timestamp format for all writes.
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

fn row_err(e: libsql::Error) -> DatabaseError {
    DatabaseError::Query(format!("row parse: {e}"))
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_int(v: Option<i64>) -> libsql::Value {
    match v {
        Some(v) => libsql::Value::Integer(v),
        None => libsql::Value::Null,
    }
}

fn opt_real(v: Option<f64>) -> libsql::Value {
    match v {
        Some(v) => libsql::Value::Real(v),
        None => libsql::Value::Null,
    }
}

/// Serialize an optional string list as a JSON column.
fn opt_json_list(list: Option<&Vec<String>>) -> Result<libsql::Value, DatabaseError> {
    match list {
        Some(list) => serde_json::to_string(list)
            .map(libsql::Value::Text)
            .map_err(|e| DatabaseError::Serialization(e.to_string())),
        None => Ok(libsql::Value::Null),
    }
}

fn parse_json_list(raw: Option<String>) -> Result<Option<Vec<String>>, DatabaseError> {
    raw.map(|s| {
        serde_json::from_str(&s)
            .map_err(|e| DatabaseError::Serialization(format!("invalid string list: {e}")))
    })
    .transpose()
}

/// Whether a libsql error is a uniqueness violation.
fn is_unique_violation(e: &libsql::Error) -> bool {
    e.to_string().contains("UNIQUE constraint failed")
}

const CONVERSATION_COLUMNS: &str = "id, platform, platform_user_id, thread_key, display_name, avatar_url, kind, status, escalated_to_human, escalated_at, created_at, last_activity";

const MESSAGE_COLUMNS: &str = "id, conversation_id, direction, content_type, content, ai_generated, ai_model, ai_confidence, prompt_tokens, completion_tokens, approval_status, platform_message_id, sent_at, created_at, updated_at";

const CONFIG_COLUMNS: &str = "scope, system_prompt, model, temperature, max_tokens, auto_respond_dm, auto_respond_comments, max_messages_per_hour, escalation_keywords, blocked_users";

/// Map a libsql Row to a Conversation. Column order matches CONVERSATION_COLUMNS.
fn row_to_conversation(row: &libsql::Row) -> Result<Conversation, DatabaseError> {
    let platform: String = row.get(1).map_err(row_err)?;
    let thread_key: String = row.get(3).map_err(row_err)?;
    let kind: String = row.get(6).map_err(row_err)?;
    let status: String = row.get(7).map_err(row_err)?;
    let escalated: i64 = row.get(8).map_err(row_err)?;
    let escalated_at: Option<String> = row.get(9).ok();
    let created_str: String = row.get(10).map_err(row_err)?;
    let activity_str: String = row.get(11).map_err(row_err)?;

    Ok(Conversation {
        id: row.get(0).map_err(row_err)?,
        platform: platform.parse().map_err(DatabaseError::Serialization)?,
        platform_user_id: row.get(2).map_err(row_err)?,
        thread_id: (!thread_key.is_empty()).then_some(thread_key),
        display_name: row.get(4).ok(),
        avatar_url: row.get(5).ok(),
        kind: kind.parse().map_err(DatabaseError::Serialization)?,
        status: status.parse().map_err(DatabaseError::Serialization)?,
        escalated_to_human: escalated != 0,
        escalated_at: parse_optional_datetime(&escalated_at),
        created_at: parse_datetime(&created_str),
        last_activity: parse_datetime(&activity_str),
    })
}

/// Map a libsql Row to a StoredMessage. Column order matches MESSAGE_COLUMNS.
fn row_to_message(row: &libsql::Row) -> Result<StoredMessage, DatabaseError> {
    let direction: String = row.get(2).map_err(row_err)?;
    let ai_generated: i64 = row.get(5).map_err(row_err)?;
    let approval: Option<String> = row.get(10).ok();
    let sent_at: Option<String> = row.get(12).ok();
    let created_str: String = row.get(13).map_err(row_err)?;
    let updated_str: String = row.get(14).map_err(row_err)?;

    Ok(StoredMessage {
        id: row.get(0).map_err(row_err)?,
        conversation_id: row.get(1).map_err(row_err)?,
        direction: direction.parse().map_err(DatabaseError::Serialization)?,
        content_type: row.get(3).map_err(row_err)?,
        content: row.get(4).map_err(row_err)?,
        ai_generated: ai_generated != 0,
        ai_model: row.get(6).ok(),
        ai_confidence: row.get::<f64>(7).ok(),
        prompt_tokens: row.get::<i64>(8).ok().map(|v| v as u32),
        completion_tokens: row.get::<i64>(9).ok().map(|v| v as u32),
        approval_status: approval
            .map(|s| s.parse::<ApprovalStatus>())
            .transpose()
            .map_err(DatabaseError::Serialization)?,
        platform_message_id: row.get(11).ok(),
        sent_at: parse_optional_datetime(&sent_at),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

/// Map a libsql Row to `(scope, record)`. Column order matches CONFIG_COLUMNS.
fn row_to_config(row: &libsql::Row) -> Result<(String, AgentConfigRecord), DatabaseError> {
    let scope: String = row.get(0).map_err(row_err)?;
    let record = AgentConfigRecord {
        system_prompt: row.get(1).ok(),
        model: row.get(2).ok(),
        temperature: row.get::<f64>(3).ok().map(|v| v as f32),
        max_tokens: row.get::<i64>(4).ok().map(|v| v as u32),
        auto_respond_dm: row.get::<i64>(5).ok().map(|v| v != 0),
        auto_respond_comments: row.get::<i64>(6).ok().map(|v| v != 0),
        max_messages_per_hour: row.get::<i64>(7).ok().map(|v| v as u32),
        escalation_keywords: parse_json_list(row.get(8).ok())?,
        blocked_users: parse_json_list(row.get(9).ok())?,
    };
    Ok((scope, record))
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Conversations ───────────────────────────────────────────────

    async fn upsert_conversation(
        &self,
        key: &ConversationKey,
    ) -> Result<Conversation, DatabaseError> {
        let thread_key = key.thread_id.as_deref().unwrap_or("");
        let now = ts(Utc::now());
        self.conn()
            .execute(
                "INSERT INTO conversations (id, platform, platform_user_id, thread_key,
                    display_name, avatar_url, kind, status, created_at, last_activity)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'active', ?8, ?8)
                 ON CONFLICT (platform, platform_user_id, thread_key) DO UPDATE SET
                    last_activity = excluded.last_activity,
                    display_name = COALESCE(excluded.display_name, conversations.display_name),
                    avatar_url = COALESCE(excluded.avatar_url, conversations.avatar_url)",
                params![
                    Uuid::new_v4().to_string(),
                    key.platform.as_str(),
                    key.platform_user_id.as_str(),
                    thread_key,
                    opt_text(key.display_name.as_deref()),
                    opt_text(key.avatar_url.as_deref()),
                    key.kind.as_str(),
                    now,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_conversation: {e}")))?;

        let conversation = self
            .get_conversation_by_key(key.platform, &key.platform_user_id, thread_key)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "conversation".into(),
                id: format!("{}/{}/{}", key.platform, key.platform_user_id, thread_key),
            })?;

        debug!(
            conversation_id = %conversation.id,
            platform = %key.platform,
            "Conversation upserted"
        );
        Ok(conversation)
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_conversation: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("get_conversation: {e}")))?
        {
            Some(row) => Ok(Some(row_to_conversation(&row)?)),
            None => Ok(None),
        }
    }

    async fn mark_conversation_escalated(&self, id: &str) -> Result<(), DatabaseError> {
        let now = ts(Utc::now());
        let updated = self
            .conn()
            .execute(
                "UPDATE conversations
                 SET escalated_at = CASE WHEN escalated_to_human = 0 THEN ?2 ELSE escalated_at END,
                     escalated_to_human = 1
                 WHERE id = ?1",
                params![id, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_conversation_escalated: {e}")))?;

        if updated == 0 {
            return Err(DatabaseError::NotFound {
                entity: "conversation".into(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    // ── Messages ────────────────────────────────────────────────────

    async fn message_exists_with_platform_id(
        &self,
        platform_message_id: &str,
    ) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT 1 FROM messages WHERE platform_message_id = ?1 LIMIT 1",
                params![platform_message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("message_exists_with_platform_id: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("message_exists_with_platform_id: {e}")))?;
        Ok(row.is_some())
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<StoredMessage, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let now = ts(Utc::now());
        let sent_at = message.sent_at.map(ts);

        self.conn()
            .execute(
                "INSERT INTO messages (id, conversation_id, direction, content_type, content,
                    ai_generated, ai_model, ai_confidence, prompt_tokens, completion_tokens,
                    approval_status, platform_message_id, sent_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
                params![
                    id.clone(),
                    message.conversation_id.as_str(),
                    message.direction.as_str(),
                    message.content_type.as_str(),
                    message.content.as_str(),
                    i64::from(message.ai_generated),
                    opt_text(message.ai_model.as_deref()),
                    opt_real(message.ai_confidence),
                    opt_int(message.prompt_tokens.map(i64::from)),
                    opt_int(message.completion_tokens.map(i64::from)),
                    opt_text(message.approval_status.as_ref().map(ApprovalStatus::as_str)),
                    opt_text(message.platform_message_id.as_deref()),
                    opt_text(sent_at.as_deref()),
                    now.clone(),
                ],
            )
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DatabaseError::Constraint(format!("insert_message: {e}"))
                } else {
                    DatabaseError::Query(format!("insert_message: {e}"))
                }
            })?;

        debug!(
            id = %id,
            conversation_id = %message.conversation_id,
            direction = message.direction.as_str(),
            "Message inserted into DB"
        );

        let created_at = parse_datetime(&now);
        Ok(StoredMessage {
            id,
            conversation_id: message.conversation_id.clone(),
            direction: message.direction,
            content_type: message.content_type.clone(),
            content: message.content.clone(),
            ai_generated: message.ai_generated,
            ai_model: message.ai_model.clone(),
            ai_confidence: message.ai_confidence,
            prompt_tokens: message.prompt_tokens,
            completion_tokens: message.completion_tokens,
            approval_status: message.approval_status,
            platform_message_id: message.platform_message_id.clone(),
            sent_at: sent_at.as_deref().map(parse_datetime),
            created_at,
            updated_at: created_at,
        })
    }

    async fn get_message(&self, id: &str) -> Result<Option<StoredMessage>, DatabaseError> {
        let mut messages = self
            .query_messages(
                "get_message",
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id],
            )
            .await?;
        Ok(messages.pop())
    }

    async fn recent_context_messages(
        &self,
        conversation_id: &str,
        limit: usize,
        exclude_id: Option<&str>,
    ) -> Result<Vec<StoredMessage>, DatabaseError> {
        let mut messages = self
            .query_messages(
                "recent_context_messages",
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE conversation_id = ?1 AND direction != 'outbound_draft' AND id != ?2
                     ORDER BY created_at DESC, rowid DESC LIMIT ?3"
                ),
                params![conversation_id, exclude_id.unwrap_or(""), limit as i64],
            )
            .await?;
        messages.reverse();
        Ok(messages)
    }

    async fn list_conversation_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<StoredMessage>, DatabaseError> {
        self.query_messages(
            "list_conversation_messages",
            &format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1 ORDER BY created_at ASC, rowid ASC"
            ),
            params![conversation_id],
        )
        .await
    }

    // ── Drafts ──────────────────────────────────────────────────────

    async fn list_pending_drafts(&self, limit: usize) -> Result<Vec<StoredMessage>, DatabaseError> {
        self.query_messages(
            "list_pending_drafts",
            &format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE direction = 'outbound_draft' AND approval_status = 'pending'
                 ORDER BY created_at ASC, rowid ASC LIMIT ?1"
            ),
            params![limit as i64],
        )
        .await
    }

    async fn resolve_draft(
        &self,
        id: &str,
        decision: DraftDecision,
    ) -> Result<StoredMessage, DatabaseError> {
        let not_found = || DatabaseError::NotFound {
            entity: "draft".into(),
            id: id.to_string(),
        };

        let current = self.get_message(id).await?.ok_or_else(not_found)?;
        if current.direction != Direction::OutboundDraft
            || current.approval_status != Some(ApprovalStatus::Pending)
        {
            return Err(DatabaseError::Constraint(format!(
                "message {id} is not a pending draft"
            )));
        }

        let now = ts(Utc::now());
        let updated = match &decision {
            DraftDecision::Approve { edited_content } => self
                .conn()
                .execute(
                    "UPDATE messages
                     SET direction = 'outbound', approval_status = 'approved',
                         content = COALESCE(?2, content), sent_at = ?3, updated_at = ?3
                     WHERE id = ?1 AND direction = 'outbound_draft' AND approval_status = 'pending'",
                    params![id, opt_text(edited_content.as_deref()), now],
                )
                .await,
            DraftDecision::Reject => self
                .conn()
                .execute(
                    "UPDATE messages SET approval_status = 'rejected', updated_at = ?2
                     WHERE id = ?1 AND direction = 'outbound_draft' AND approval_status = 'pending'",
                    params![id, now],
                )
                .await,
        }
        .map_err(|e| DatabaseError::Query(format!("resolve_draft: {e}")))?;

        // Lost a race against another decision on the same draft.
        if updated == 0 {
            return Err(DatabaseError::Constraint(format!(
                "message {id} is not a pending draft"
            )));
        }

        info!(
            id = %id,
            approved = matches!(decision, DraftDecision::Approve { .. }),
            "Draft resolved"
        );
        self.get_message(id).await?.ok_or_else(not_found)
    }

    // ── Agent configuration ─────────────────────────────────────────

    async fn load_agent_configs(&self, platform: Platform) -> Result<ConfigRows, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CONFIG_COLUMNS} FROM agent_config WHERE scope IN ('global', ?1)"
                ),
                params![platform.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_agent_configs: {e}")))?;

        let mut configs = ConfigRows::default();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("load_agent_configs: {e}")))?
        {
            let (scope, record) = row_to_config(&row)?;
            if scope == ConfigScope::Global.key() {
                configs.global = Some(record);
            } else {
                configs.platform = Some(record);
            }
        }
        Ok(configs)
    }

    async fn save_agent_config(
        &self,
        scope: ConfigScope,
        record: &AgentConfigRecord,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO agent_config (scope, system_prompt, model, temperature, max_tokens,
                    auto_respond_dm, auto_respond_comments, max_messages_per_hour,
                    escalation_keywords, blocked_users, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT (scope) DO UPDATE SET
                    system_prompt = excluded.system_prompt,
                    model = excluded.model,
                    temperature = excluded.temperature,
                    max_tokens = excluded.max_tokens,
                    auto_respond_dm = excluded.auto_respond_dm,
                    auto_respond_comments = excluded.auto_respond_comments,
                    max_messages_per_hour = excluded.max_messages_per_hour,
                    escalation_keywords = excluded.escalation_keywords,
                    blocked_users = excluded.blocked_users,
                    updated_at = excluded.updated_at",
                params![
                    scope.key(),
                    opt_text(record.system_prompt.as_deref()),
                    opt_text(record.model.as_deref()),
                    opt_real(record.temperature.map(f64::from)),
                    opt_int(record.max_tokens.map(i64::from)),
                    opt_int(record.auto_respond_dm.map(i64::from)),
                    opt_int(record.auto_respond_comments.map(i64::from)),
                    opt_int(record.max_messages_per_hour.map(i64::from)),
                    opt_json_list(record.escalation_keywords.as_ref())?,
                    opt_json_list(record.blocked_users.as_ref())?,
                    ts(Utc::now()),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_agent_config: {e}")))?;

        info!(scope = scope.key(), "Agent config saved");
        Ok(())
    }
}

#[async_trait]
impl SendCounter for LibSqlBackend {
    async fn count_sent_outbound_since(
        &self,
        since: DateTime<Utc>,
        platform: Option<Platform>,
    ) -> Result<u64, DatabaseError> {
        let since = ts(since);
        let mut rows = match platform {
            None => {
                self.conn()
                    .query(
                        "SELECT COUNT(*) FROM messages
                         WHERE direction = 'outbound' AND sent_at IS NOT NULL AND sent_at >= ?1",
                        params![since],
                    )
                    .await
            }
            Some(platform) => {
                self.conn()
                    .query(
                        "SELECT COUNT(*) FROM messages m
                         JOIN conversations c ON c.id = m.conversation_id
                         WHERE m.direction = 'outbound' AND m.sent_at IS NOT NULL
                           AND m.sent_at >= ?1 AND c.platform = ?2",
                        params![since, platform.as_str()],
                    )
                    .await
            }
        }
        .map_err(|e| DatabaseError::Query(format!("count_sent_outbound_since: {e}")))?;

        let count: i64 = match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("count_sent_outbound_since: {e}")))?
        {
            Some(row) => row.get(0).map_err(row_err)?,
            None => 0,
        };
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl UsageLedger for LibSqlBackend {
    async fn record_usage(&self, record: &UsageRecord) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO llm_usage (id, conversation_id, model, feature, prompt_tokens,
                    completion_tokens, cost_usd, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    Uuid::new_v4().to_string(),
                    opt_text(record.conversation_id.as_deref()),
                    record.model.as_str(),
                    record.feature.as_str(),
                    i64::from(record.prompt_tokens),
                    i64::from(record.completion_tokens),
                    record.cost_usd.to_string(),
                    ts(Utc::now()),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_usage: {e}")))?;

        debug!(model = %record.model, feature = %record.feature, "LLM usage recorded");
        Ok(())
    }
}
