//! End-to-end pipeline scenarios against an in-memory store.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use social_agent::config::{AgentConfigRecord, ConfigRows, ConfigScope};
use social_agent::error::{DatabaseError, LlmError};
use social_agent::llm::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};
use social_agent::pipeline::prompts::CONFIDENCE_SYSTEM_PROMPT;
use social_agent::pipeline::rate_limit::{
    RateLimitFailureMode, RateLimitPolicy, RateLimitScope, RateLimiter,
};
use social_agent::pipeline::responder::{AiResponder, CONFIDENCE_ON_FAILURE, ResponderConfig};
use social_agent::pipeline::types::{ConversationKind, Platform};
use social_agent::pipeline::{InboundMessage, ProcessingAction, ProcessorDeps, WebhookProcessor};
use social_agent::store::{
    ApprovalStatus, Conversation, ConversationKey, Database, Direction, DraftDecision,
    LibSqlBackend, NewMessage, SendCounter, StoredMessage,
};

// ── Test doubles ────────────────────────────────────────────────────

/// Scripted LLM: fixed reply, fixed confidence answer (or failure), and a
/// count of each kind of call.
struct ScriptedLlm {
    reply: Option<&'static str>,
    confidence: Option<&'static str>,
    reply_calls: AtomicUsize,
    confidence_calls: AtomicUsize,
}

impl ScriptedLlm {
    fn new(reply: &'static str, confidence: &'static str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply),
            confidence: Some(confidence),
            reply_calls: AtomicUsize::new(0),
            confidence_calls: AtomicUsize::new(0),
        })
    }

    fn with_failing_confidence(reply: &'static str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply),
            confidence: None,
            reply_calls: AtomicUsize::new(0),
            confidence_calls: AtomicUsize::new(0),
        })
    }

    fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            confidence: None,
            reply_calls: AtomicUsize::new(0),
            confidence_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (script, counter) = if request.messages[0].content == CONFIDENCE_SYSTEM_PROMPT {
            (self.confidence, &self.confidence_calls)
        } else {
            (self.reply, &self.reply_calls)
        };
        counter.fetch_add(1, Ordering::SeqCst);

        match script {
            Some(content) => Ok(CompletionResponse {
                content: content.to_string(),
                model: "gpt-4o-mini".into(),
                input_tokens: 120,
                output_tokens: 30,
                finish_reason: FinishReason::Stop,
                response_id: None,
            }),
            None => Err(LlmError::RequestFailed {
                provider: "scripted".into(),
                reason: "service unavailable".into(),
            }),
        }
    }
}

struct BrokenCounter;

#[async_trait]
impl SendCounter for BrokenCounter {
    async fn count_sent_outbound_since(
        &self,
        _since: DateTime<Utc>,
        _platform: Option<Platform>,
    ) -> Result<u64, DatabaseError> {
        Err(DatabaseError::Query("database is locked".into()))
    }
}

/// Store whose dedup lookup always misses, as when two deliveries of the
/// same message both pass the lookup before either is inserted.
struct MissingDedupStore {
    inner: Arc<LibSqlBackend>,
}

#[async_trait]
impl Database for MissingDedupStore {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        self.inner.init_schema().await
    }

    async fn upsert_conversation(&self, key: &ConversationKey) -> Result<Conversation, DatabaseError> {
        self.inner.upsert_conversation(key).await
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, DatabaseError> {
        self.inner.get_conversation(id).await
    }

    async fn mark_conversation_escalated(&self, id: &str) -> Result<(), DatabaseError> {
        self.inner.mark_conversation_escalated(id).await
    }

    async fn message_exists_with_platform_id(&self, _id: &str) -> Result<bool, DatabaseError> {
        Ok(false)
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<StoredMessage, DatabaseError> {
        self.inner.insert_message(message).await
    }

    async fn get_message(&self, id: &str) -> Result<Option<StoredMessage>, DatabaseError> {
        self.inner.get_message(id).await
    }

    async fn recent_context_messages(
        &self,
        conversation_id: &str,
        limit: usize,
        exclude_id: Option<&str>,
    ) -> Result<Vec<StoredMessage>, DatabaseError> {
        self.inner
            .recent_context_messages(conversation_id, limit, exclude_id)
            .await
    }

    async fn list_conversation_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<StoredMessage>, DatabaseError> {
        self.inner.list_conversation_messages(conversation_id).await
    }

    async fn list_pending_drafts(&self, limit: usize) -> Result<Vec<StoredMessage>, DatabaseError> {
        self.inner.list_pending_drafts(limit).await
    }

    async fn resolve_draft(
        &self,
        id: &str,
        decision: DraftDecision,
    ) -> Result<StoredMessage, DatabaseError> {
        self.inner.resolve_draft(id, decision).await
    }

    async fn load_agent_configs(&self, platform: Platform) -> Result<ConfigRows, DatabaseError> {
        self.inner.load_agent_configs(platform).await
    }

    async fn save_agent_config(
        &self,
        scope: ConfigScope,
        record: &AgentConfigRecord,
    ) -> Result<(), DatabaseError> {
        self.inner.save_agent_config(scope, record).await
    }
}

// ── Harness ─────────────────────────────────────────────────────────

struct Harness {
    db: Arc<LibSqlBackend>,
    processor: Arc<WebhookProcessor>,
}

async fn harness_with(
    llm: Arc<ScriptedLlm>,
    counter: Option<Arc<dyn SendCounter>>,
    policy: RateLimitPolicy,
) -> Harness {
    let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let counter: Arc<dyn SendCounter> = counter.unwrap_or_else(|| db.clone());
    let processor = WebhookProcessor::new(ProcessorDeps {
        store: db.clone(),
        rate_limiter: RateLimiter::new(counter, policy),
        responder: AiResponder::new(
            llm,
            ResponderConfig {
                request_timeout: Duration::from_secs(5),
                confidence_timeout: Duration::from_secs(5),
            },
        ),
        usage: db.clone(),
        default_model: "gpt-4o-mini".into(),
    });
    Harness {
        db,
        processor: Arc::new(processor),
    }
}

async fn harness(llm: Arc<ScriptedLlm>) -> Harness {
    harness_with(llm, None, RateLimitPolicy::default()).await
}

async fn set_global(db: &LibSqlBackend, record: AgentConfigRecord) {
    db.save_agent_config(ConfigScope::Global, &record)
        .await
        .unwrap();
}

// ── Scenarios ───────────────────────────────────────────────────────

#[tokio::test]
async fn scenario_a_pricing_question_is_escalated() {
    let llm = ScriptedLlm::new("Ще ви изпратим информация съвсем скоро.", "0.95");
    let h = harness(llm).await;

    let msg = InboundMessage::text(Platform::Messenger, "fb-100", "Колко струва сайт?")
        .with_platform_message_id("mid.1");
    let result = h.processor.process(msg).await;

    assert!(result.success);
    assert_eq!(result.action, ProcessingAction::Escalated);
    let ai = result.ai_response.as_ref().unwrap();
    assert!(ai.should_escalate);
    assert!(!ai.content_filtered);
    assert_eq!(ai.escalation_reason.as_deref(), Some("колко струва"));
    assert!(result.should_send());

    let conversation = h
        .db
        .get_conversation(result.conversation_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(conversation.escalated_to_human);
    assert!(conversation.escalated_at.is_some());

    let draft = h
        .db
        .get_message(result.reply_message_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(draft.direction, Direction::OutboundDraft);
    assert_eq!(draft.approval_status, Some(ApprovalStatus::Pending));
    assert!(draft.sent_at.is_none());
}

#[tokio::test]
async fn scenario_b_greeting_is_answered() {
    let llm = ScriptedLlm::new("Здравейте! С какво можем да помогнем?", "0.9");
    let h = harness(llm).await;

    let msg = InboundMessage::text(Platform::Instagram, "ig-7", "Здравейте!")
        .with_platform_message_id("ig.1")
        .with_display_name("Иван");
    let result = h.processor.process(msg).await;

    assert!(result.success);
    assert_eq!(result.action, ProcessingAction::Responded);
    assert!(result.should_send());

    let reply = h
        .db
        .get_message(result.reply_message_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.direction, Direction::Outbound);
    assert_eq!(reply.approval_status, Some(ApprovalStatus::AutoApproved));
    assert!(reply.sent_at.is_some());
    assert_eq!(reply.prompt_tokens, Some(120));

    let conversation = h
        .db
        .get_conversation(result.conversation_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(!conversation.escalated_to_human);
    assert_eq!(conversation.display_name.as_deref(), Some("Иван"));
}

#[tokio::test]
async fn scenario_c_joined_duplicates_store_one_message() {
    let llm = ScriptedLlm::new("Здравейте!", "0.9");
    let h = harness(llm).await;

    let msg = InboundMessage::text(Platform::Telegram, "tg-1", "Здравейте").with_platform_message_id("tg.42");
    let (a, b) = tokio::join!(
        h.processor.process(msg.clone()),
        h.processor.process(msg.clone())
    );

    let blocked = [&a, &b]
        .iter()
        .filter(|r| r.action == ProcessingAction::Blocked)
        .count();
    let responded = [&a, &b]
        .iter()
        .filter(|r| r.action == ProcessingAction::Responded)
        .count();
    assert_eq!(blocked, 1, "a={:?} b={:?}", a.action, b.action);
    assert_eq!(responded, 1);

    let winner = if a.action == ProcessingAction::Responded { &a } else { &b };
    let messages = h
        .db
        .list_conversation_messages(winner.conversation_id.as_deref().unwrap())
        .await
        .unwrap();
    let inbound = messages
        .iter()
        .filter(|m| m.direction == Direction::Inbound)
        .count();
    assert_eq!(inbound, 1);
}

#[tokio::test]
async fn scenario_d_rate_cap_stores_inbound_without_reply() {
    let llm = ScriptedLlm::new("Здравейте!", "0.9");
    let h = harness(llm.clone()).await;
    set_global(
        &h.db,
        AgentConfigRecord {
            max_messages_per_hour: Some(2),
            ..Default::default()
        },
    )
    .await;

    for (user, id) in [("u1", "m1"), ("u2", "m2")] {
        let r = h
            .processor
            .process(InboundMessage::text(Platform::Viber, user, "Здравейте").with_platform_message_id(id))
            .await;
        assert_eq!(r.action, ProcessingAction::Responded);
    }
    let calls_before = llm.reply_calls.load(Ordering::SeqCst);

    let result = h
        .processor
        .process(InboundMessage::text(Platform::Viber, "u3", "Здравейте").with_platform_message_id("m3"))
        .await;

    assert!(result.success);
    assert_eq!(result.action, ProcessingAction::RateLimited);
    assert!(result.reason.is_some());
    assert!(result.reply_message_id.is_none());
    assert_eq!(llm.reply_calls.load(Ordering::SeqCst), calls_before);

    let messages = h
        .db
        .list_conversation_messages(result.conversation_id.as_deref().unwrap())
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].direction, Direction::Inbound);
    assert_eq!(Some(messages[0].id.as_str()), result.message_id.as_deref());
}

#[tokio::test]
async fn duplicate_past_lookup_loses_on_unique_message_id() {
    let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let llm = ScriptedLlm::new("Здравейте!", "0.9");
    let processor = WebhookProcessor::new(ProcessorDeps {
        store: Arc::new(MissingDedupStore { inner: db.clone() }),
        rate_limiter: RateLimiter::new(db.clone(), RateLimitPolicy::default()),
        responder: AiResponder::new(llm.clone(), ResponderConfig::default()),
        usage: db.clone(),
        default_model: "gpt-4o-mini".into(),
    });
    let msg = InboundMessage::text(Platform::Telegram, "tg-9", "Здравейте").with_platform_message_id("tg.77");

    let first = processor.process(msg.clone()).await;
    assert_eq!(first.action, ProcessingAction::Responded);

    let second = processor.process(msg).await;
    assert!(second.success);
    assert_eq!(second.action, ProcessingAction::Blocked);
    assert_eq!(second.reason.as_deref(), Some("duplicate message"));
    assert!(second.message_id.is_none());
    assert_eq!(llm.reply_calls.load(Ordering::SeqCst), 1);

    let messages = db
        .list_conversation_messages(first.conversation_id.as_deref().unwrap())
        .await
        .unwrap();
    let inbound = messages
        .iter()
        .filter(|m| m.direction == Direction::Inbound)
        .count();
    assert_eq!(inbound, 1);
}

// ── Further properties ──────────────────────────────────────────────

#[tokio::test]
async fn replay_after_completion_is_blocked() {
    let llm = ScriptedLlm::new("Здравейте!", "0.9");
    let h = harness(llm.clone()).await;
    let msg = InboundMessage::text(Platform::Messenger, "u1", "Здравейте").with_platform_message_id("dup");

    h.processor.process(msg.clone()).await;
    let replay = h.processor.process(msg).await;

    assert_eq!(replay.action, ProcessingAction::Blocked);
    assert!(replay.conversation_id.is_none());
    assert_eq!(llm.reply_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn platform_blocklist_overrides_global() {
    let llm = ScriptedLlm::new("Здравейте!", "0.9");
    let h = harness(llm).await;
    set_global(
        &h.db,
        AgentConfigRecord {
            blocked_users: Some(vec!["troll".into()]),
            ..Default::default()
        },
    )
    .await;
    h.db.save_agent_config(
        ConfigScope::Platform(Platform::Telegram),
        &AgentConfigRecord {
            blocked_users: Some(vec![]),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let on_messenger = h
        .processor
        .process(InboundMessage::text(Platform::Messenger, "troll", "hi"))
        .await;
    assert_eq!(on_messenger.action, ProcessingAction::Blocked);

    let on_telegram = h
        .processor
        .process(InboundMessage::text(Platform::Telegram, "troll", "hi"))
        .await;
    assert_eq!(on_telegram.action, ProcessingAction::Responded);
}

#[tokio::test]
async fn content_filter_hit_skips_confidence_and_escalates() {
    let llm = ScriptedLlm::new("Можете да ползвате Shopify за това.", "0.99");
    let h = harness(llm.clone()).await;

    let result = h
        .processor
        .process(InboundMessage::text(Platform::Messenger, "u1", "Имате ли магазин?"))
        .await;

    assert_eq!(result.action, ProcessingAction::Escalated);
    assert!(!result.should_send());
    let ai = result.ai_response.unwrap();
    assert_eq!(ai.confidence, 0.0);
    assert!(ai.content_filtered);
    assert_eq!(ai.escalation_reason.as_deref(), Some("competitor_mention: shopify"));
    assert_eq!(llm.confidence_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn confidence_failure_still_sends() {
    let llm = ScriptedLlm::with_failing_confidence("Здравейте!");
    let h = harness(llm).await;

    let result = h
        .processor
        .process(InboundMessage::text(Platform::Telegram, "u1", "Здравейте"))
        .await;

    assert_eq!(result.action, ProcessingAction::Responded);
    assert_eq!(result.ai_response.unwrap().confidence, CONFIDENCE_ON_FAILURE);
}

#[tokio::test]
async fn primary_llm_failure_is_error_with_inbound_kept() {
    let h = harness(ScriptedLlm::unavailable()).await;

    let result = h
        .processor
        .process(InboundMessage::text(Platform::Telegram, "u1", "Здравейте").with_platform_message_id("x1"))
        .await;

    assert!(!result.success);
    assert_eq!(result.action, ProcessingAction::Error);
    assert!(result.error.unwrap().contains("service unavailable"));
    assert!(h.db.message_exists_with_platform_id("x1").await.unwrap());
}

#[tokio::test]
async fn comment_threads_follow_comment_toggle() {
    let llm = ScriptedLlm::new("Благодарим!", "0.99");
    let h = harness(llm).await;
    set_global(
        &h.db,
        AgentConfigRecord {
            auto_respond_comments: Some(false),
            ..Default::default()
        },
    )
    .await;

    let result = h
        .processor
        .process(
            InboundMessage::text(Platform::Instagram, "u1", "Супер!")
                .with_thread("post-9")
                .with_kind(ConversationKind::Comment),
        )
        .await;
    assert_eq!(result.action, ProcessingAction::QueuedForApproval);
    assert_eq!(h.db.list_pending_drafts(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn rate_limit_read_failure_fails_open_by_default() {
    let llm = ScriptedLlm::new("Здравейте!", "0.9");
    let h = harness_with(llm, Some(Arc::new(BrokenCounter)), RateLimitPolicy::default()).await;

    let result = h
        .processor
        .process(InboundMessage::text(Platform::Viber, "u1", "Здравейте"))
        .await;
    assert_eq!(result.action, ProcessingAction::Responded);
}

#[tokio::test]
async fn rate_limit_read_failure_can_fail_closed() {
    let llm = ScriptedLlm::new("Здравейте!", "0.9");
    let h = harness_with(
        llm,
        Some(Arc::new(BrokenCounter)),
        RateLimitPolicy {
            on_error: RateLimitFailureMode::FailClosed,
            ..Default::default()
        },
    )
    .await;

    let result = h
        .processor
        .process(InboundMessage::text(Platform::Viber, "u1", "Здравейте"))
        .await;
    assert_eq!(result.action, ProcessingAction::RateLimited);
    assert!(result.message_id.is_some());
}

#[tokio::test]
async fn per_platform_scope_keeps_budgets_apart() {
    let llm = ScriptedLlm::new("Здравейте!", "0.9");
    let h = harness_with(
        llm,
        None,
        RateLimitPolicy {
            scope: RateLimitScope::PerPlatform,
            ..Default::default()
        },
    )
    .await;
    set_global(
        &h.db,
        AgentConfigRecord {
            max_messages_per_hour: Some(1),
            ..Default::default()
        },
    )
    .await;

    let first = h
        .processor
        .process(InboundMessage::text(Platform::Telegram, "u1", "Здравейте"))
        .await;
    assert_eq!(first.action, ProcessingAction::Responded);

    let other_platform = h
        .processor
        .process(InboundMessage::text(Platform::Viber, "u1", "Здравейте"))
        .await;
    assert_eq!(other_platform.action, ProcessingAction::Responded);

    let same_platform = h
        .processor
        .process(InboundMessage::text(Platform::Telegram, "u2", "Здравейте"))
        .await;
    assert_eq!(same_platform.action, ProcessingAction::RateLimited);
}

#[tokio::test]
async fn approved_draft_counts_towards_rate_window() {
    let llm = ScriptedLlm::new("Ще проверим.", "0.2");
    let h = harness(llm).await;

    let result = h
        .processor
        .process(InboundMessage::text(Platform::Messenger, "u1", "Имате ли свободни дати?"))
        .await;
    assert_eq!(result.action, ProcessingAction::QueuedForApproval);

    let since = Utc::now() - chrono::Duration::minutes(60);
    assert_eq!(h.db.count_sent_outbound_since(since, None).await.unwrap(), 0);

    h.db.resolve_draft(
        result.reply_message_id.as_deref().unwrap(),
        DraftDecision::Approve { edited_content: None },
    )
    .await
    .unwrap();
    assert_eq!(h.db.count_sent_outbound_since(since, None).await.unwrap(), 1);
}
