//! Shared types for the inbound message pipeline.

use serde::{Deserialize, Serialize};

// ── Platforms ───────────────────────────────────────────────────────

/// Chat platforms the agent answers on.
///
/// The set is closed on purpose: prompt tone, configuration scopes and rate
/// limiting all match on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Messenger,
    Instagram,
    Telegram,
    Viber,
}

impl Platform {
    /// All supported platforms.
    pub const ALL: [Platform; 4] = [
        Platform::Messenger,
        Platform::Instagram,
        Platform::Telegram,
        Platform::Viber,
    ];

    /// Stable storage/config key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Messenger => "messenger",
            Self::Instagram => "instagram",
            Self::Telegram => "telegram",
            Self::Viber => "viber",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "messenger" => Ok(Self::Messenger),
            "instagram" => Ok(Self::Instagram),
            "telegram" => Ok(Self::Telegram),
            "viber" => Ok(Self::Viber),
            _ => Err(format!("Unknown platform: {}", s)),
        }
    }
}

// ── Conversation kind ───────────────────────────────────────────────

/// Whether a conversation is a private chat or a public comment thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    /// One-to-one direct messages.
    #[default]
    Direct,
    /// Replies under a public post.
    Comment,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Comment => "comment",
        }
    }
}

impl std::fmt::Display for ConversationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConversationKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(Self::Direct),
            "comment" => Ok(Self::Comment),
            _ => Err(format!("Unknown conversation kind: {}", s)),
        }
    }
}

// ── Inbound message ─────────────────────────────────────────────────

/// A customer message that the platform transport has already verified and
/// parsed out of its webhook envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub platform: Platform,
    /// Sender id as assigned by the platform.
    pub platform_user_id: String,
    #[serde(default)]
    pub user_display_name: Option<String>,
    #[serde(default)]
    pub user_avatar_url: Option<String>,
    /// Message body.
    pub text: String,
    /// Platform-assigned message id; the dedup key for webhook retries.
    #[serde(default)]
    pub platform_message_id: Option<String>,
    /// Sub-thread (e.g. the post a comment belongs to).
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Overrides the kind used when the conversation is first created.
    #[serde(default)]
    pub conversation_kind: Option<ConversationKind>,
    /// Content type tag; `text` when absent.
    #[serde(default)]
    pub message_type: Option<String>,
}

impl InboundMessage {
    /// Create a plain text message with no optional fields set.
    pub fn text(platform: Platform, user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            platform,
            platform_user_id: user_id.into(),
            user_display_name: None,
            user_avatar_url: None,
            text: text.into(),
            platform_message_id: None,
            thread_id: None,
            conversation_kind: None,
            message_type: None,
        }
    }

    pub fn with_platform_message_id(mut self, id: impl Into<String>) -> Self {
        self.platform_message_id = Some(id.into());
        self
    }

    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_kind(mut self, kind: ConversationKind) -> Self {
        self.conversation_kind = Some(kind);
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.user_display_name = Some(name.into());
        self
    }

    /// Dedup key, ignoring blank ids.
    pub fn dedup_key(&self) -> Option<&str> {
        self.platform_message_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Thread id with blank values treated as "no thread".
    pub fn normalized_thread_id(&self) -> Option<&str> {
        self.thread_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

// ── AI response ─────────────────────────────────────────────────────

/// Output of the responder: the drafted reply plus everything the
/// disposition step needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiResponse {
    pub content: String,
    /// Model that actually produced the reply.
    pub model: String,
    /// Self-assessed confidence in `[0, 1]`.
    pub confidence: f64,
    pub should_escalate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<String>,
    /// The content filter rejected `content`; it must never reach a customer.
    #[serde(default)]
    pub content_filtered: bool,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

// ── Processing result ───────────────────────────────────────────────

/// What the caller (the platform sender) should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingAction {
    /// Duplicate delivery or blocked user. Do not send.
    Blocked,
    /// Hourly send cap reached. Do not send.
    RateLimited,
    /// Reply auto-approved. Send it now.
    Responded,
    /// Escalation flagged. Reply stored as a draft for a human.
    Escalated,
    /// Reply needs human approval. Do not send yet.
    QueuedForApproval,
    /// Pipeline failed. Do not send.
    Error,
}

impl ProcessingAction {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Blocked => "blocked",
            Self::RateLimited => "rate_limited",
            Self::Responded => "responded",
            Self::Escalated => "escalated",
            Self::QueuedForApproval => "queued_for_approval",
            Self::Error => "error",
        }
    }
}

/// Structured outcome of processing one inbound message.
///
/// Always produced, even on failure, so the webhook transport can
/// acknowledge receipt to the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub action: ProcessingAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// The stored inbound message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// The stored reply or draft.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_response: Option<AiResponse>,
    /// Why the message was blocked or rate limited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessingResult {
    fn empty(success: bool, action: ProcessingAction) -> Self {
        Self {
            success,
            action,
            conversation_id: None,
            message_id: None,
            reply_message_id: None,
            ai_response: None,
            reason: None,
            error: None,
        }
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::empty(true, ProcessingAction::Blocked)
        }
    }

    pub fn rate_limited(
        conversation_id: String,
        message_id: String,
        reason: Option<String>,
    ) -> Self {
        Self {
            conversation_id: Some(conversation_id),
            message_id: Some(message_id),
            reason,
            ..Self::empty(true, ProcessingAction::RateLimited)
        }
    }

    pub fn replied(
        action: ProcessingAction,
        conversation_id: String,
        message_id: String,
        reply_message_id: String,
        ai_response: AiResponse,
    ) -> Self {
        Self {
            conversation_id: Some(conversation_id),
            message_id: Some(message_id),
            reply_message_id: Some(reply_message_id),
            ai_response: Some(ai_response),
            ..Self::empty(true, action)
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::empty(false, ProcessingAction::Error)
        }
    }

    /// Whether the caller should deliver `ai_response.content` now.
    ///
    /// `escalated` replies are sent while a human takes over, except when the
    /// content filter rejected the text: that reply stays a draft only.
    pub fn should_send(&self) -> bool {
        matches!(
            self.action,
            ProcessingAction::Responded | ProcessingAction::Escalated
        ) && self
            .ai_response
            .as_ref()
            .is_some_and(|ai| !ai.content_filtered)
    }
}
