//! Persisted record types: conversations, messages, drafts and usage.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::pipeline::types::{ConversationKind, InboundMessage, Platform};

// ── Conversations ───────────────────────────────────────────────────

/// Lifecycle status of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    #[default]
    Active,
    Archived,
    Blocked,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
            Self::Blocked => "blocked",
        }
    }
}

impl std::str::FromStr for ConversationStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "archived" => Ok(Self::Archived),
            "blocked" => Ok(Self::Blocked),
            _ => Err(format!("Unknown conversation status: {}", s)),
        }
    }
}

/// One ongoing exchange with one customer on one platform thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub platform: Platform,
    pub platform_user_id: String,
    pub thread_id: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub kind: ConversationKind,
    pub status: ConversationStatus,
    pub escalated_to_human: bool,
    pub escalated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Identity and profile fields used to find or create a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationKey {
    pub platform: Platform,
    pub platform_user_id: String,
    /// `None` for thread-less conversations.
    pub thread_id: Option<String>,
    /// Applied only when the conversation is created.
    pub kind: ConversationKind,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl ConversationKey {
    pub fn from_inbound(msg: &InboundMessage) -> Self {
        Self {
            platform: msg.platform,
            platform_user_id: msg.platform_user_id.clone(),
            thread_id: msg.normalized_thread_id().map(str::to_string),
            kind: msg.conversation_kind.unwrap_or_default(),
            display_name: msg.user_display_name.clone(),
            avatar_url: msg.user_avatar_url.clone(),
        }
    }
}

// ── Messages ────────────────────────────────────────────────────────

/// Which way a message travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// From the customer.
    Inbound,
    /// Sent (or cleared to send) to the customer.
    Outbound,
    /// Generated reply waiting for a human.
    OutboundDraft,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
            Self::OutboundDraft => "outbound_draft",
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inbound" => Ok(Self::Inbound),
            "outbound" => Ok(Self::Outbound),
            "outbound_draft" => Ok(Self::OutboundDraft),
            _ => Err(format!("Unknown message direction: {}", s)),
        }
    }
}

/// Approval state of an AI-generated message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    AutoApproved,
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoApproved => "auto_approved",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for ApprovalStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto_approved" => Ok(Self::AutoApproved),
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Unknown approval status: {}", s)),
        }
    }
}

/// A persisted message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub direction: Direction,
    pub content_type: String,
    pub content: String,
    pub ai_generated: bool,
    pub ai_model: Option<String>,
    pub ai_confidence: Option<f64>,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    /// `None` for inbound messages.
    pub approval_status: Option<ApprovalStatus>,
    pub platform_message_id: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a message insert. The store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: String,
    pub direction: Direction,
    pub content_type: String,
    pub content: String,
    pub ai_generated: bool,
    pub ai_model: Option<String>,
    pub ai_confidence: Option<f64>,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub approval_status: Option<ApprovalStatus>,
    pub platform_message_id: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl NewMessage {
    /// A customer message as received.
    pub fn inbound(conversation_id: &str, msg: &InboundMessage) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            direction: Direction::Inbound,
            content_type: msg
                .message_type
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "text".to_string()),
            content: msg.text.clone(),
            ai_generated: false,
            ai_model: None,
            ai_confidence: None,
            prompt_tokens: None,
            completion_tokens: None,
            approval_status: None,
            platform_message_id: msg.dedup_key().map(str::to_string),
            sent_at: None,
        }
    }

    /// A generated reply. Auto-approved replies are stamped as sent.
    #[allow(clippy::too_many_arguments)]
    pub fn ai_reply(
        conversation_id: &str,
        direction: Direction,
        approval_status: ApprovalStatus,
        content: &str,
        model: &str,
        confidence: f64,
        prompt_tokens: u32,
        completion_tokens: u32,
    ) -> Self {
        let sent_at = (approval_status == ApprovalStatus::AutoApproved).then(Utc::now);
        Self {
            conversation_id: conversation_id.to_string(),
            direction,
            content_type: "text".to_string(),
            content: content.to_string(),
            ai_generated: true,
            ai_model: Some(model.to_string()),
            ai_confidence: Some(confidence),
            prompt_tokens: Some(prompt_tokens),
            completion_tokens: Some(completion_tokens),
            approval_status: Some(approval_status),
            platform_message_id: None,
            sent_at,
        }
    }
}

// ── Drafts ──────────────────────────────────────────────────────────

/// A human decision on a pending draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum DraftDecision {
    /// Send the draft, optionally with edited text.
    Approve {
        #[serde(default)]
        edited_content: Option<String>,
    },
    Reject,
}

// ── Usage ───────────────────────────────────────────────────────────

/// Feature tag recorded with each completion's token usage.
pub const FEATURE_SOCIAL_REPLY: &str = "social_reply";

/// One line in the LLM usage ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageRecord {
    pub conversation_id: Option<String>,
    pub model: String,
    pub feature: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cost_usd: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_roundtrip_through_str() {
        for d in [Direction::Inbound, Direction::Outbound, Direction::OutboundDraft] {
            assert_eq!(d.as_str().parse::<Direction>().unwrap(), d);
        }
        for s in [
            ApprovalStatus::AutoApproved,
            ApprovalStatus::Pending,
            ApprovalStatus::Approved,
            ApprovalStatus::Rejected,
        ] {
            assert_eq!(s.as_str().parse::<ApprovalStatus>().unwrap(), s);
        }
        assert!("sent".parse::<ApprovalStatus>().is_err());
        assert_eq!(
            "archived".parse::<ConversationStatus>().unwrap(),
            ConversationStatus::Archived
        );
    }

    #[test]
    fn inbound_defaults_content_type_to_text() {
        let msg = InboundMessage::text(Platform::Telegram, "u1", "hi").with_platform_message_id("p1");
        let new = NewMessage::inbound("c1", &msg);
        assert_eq!(new.content_type, "text");
        assert_eq!(new.direction, Direction::Inbound);
        assert_eq!(new.platform_message_id.as_deref(), Some("p1"));
        assert!(new.approval_status.is_none());
        assert!(new.sent_at.is_none());
    }

    #[test]
    fn only_auto_approved_replies_get_sent_at() {
        let sent = NewMessage::ai_reply(
            "c1",
            Direction::Outbound,
            ApprovalStatus::AutoApproved,
            "hi",
            "gpt-4o-mini",
            0.9,
            10,
            5,
        );
        assert!(sent.sent_at.is_some());

        let draft = NewMessage::ai_reply(
            "c1",
            Direction::OutboundDraft,
            ApprovalStatus::Pending,
            "hi",
            "gpt-4o-mini",
            0.3,
            10,
            5,
        );
        assert!(draft.sent_at.is_none());
        assert!(draft.ai_generated);
    }

    #[test]
    fn conversation_key_normalizes_blank_thread() {
        let msg = InboundMessage::text(Platform::Instagram, "u1", "hi").with_thread("");
        let key = ConversationKey::from_inbound(&msg);
        assert!(key.thread_id.is_none());
        assert_eq!(key.kind, ConversationKind::Direct);
    }

    #[test]
    fn draft_decision_deserializes() {
        let d: DraftDecision =
            serde_json::from_str(r#"{"decision":"approve","edited_content":"new"}"#).unwrap();
        assert_eq!(
            d,
            DraftDecision::Approve {
                edited_content: Some("new".into())
            }
        );
        let d: DraftDecision = serde_json::from_str(r#"{"decision":"reject"}"#).unwrap();
        assert_eq!(d, DraftDecision::Reject);
    }
}
