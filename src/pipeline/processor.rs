//! Webhook processor — runs one inbound customer message through the full
//! pipeline and reports what the platform sender should do.
//!
//! Flow:
//! 1. Dedup on the platform message id
//! 2. Load the global and platform config rows, merge them
//! 3. Blocked-user check
//! 4. Find or create the conversation
//! 5. Persist the inbound message
//! 6. Rate limit check
//! 7. Auto-respond gate for the conversation kind
//! 8. Load conversation history
//! 9. Generate the reply (guardrails, escalation, confidence)
//! 10. Determine the disposition
//! 11. Flag the conversation when escalating
//! 12. Persist the reply or draft
//! 13. Record token usage (never fatal)
//! 14. Report the action
//!
//! Every failure, including a panic, is turned into an `error` result at
//! this boundary so the transport can always acknowledge the webhook.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::config::EffectiveConfig;
use crate::error::{DatabaseError, PipelineError};
use crate::llm::costs::estimate_cost;
use crate::pipeline::approval::{Disposition, determine_approval};
use crate::pipeline::prompts::DEFAULT_CONTEXT_MESSAGES;
use crate::pipeline::rate_limit::RateLimiter;
use crate::pipeline::responder::{AiResponder, GenerateRequest};
use crate::pipeline::types::{InboundMessage, ProcessingAction, ProcessingResult};
use crate::store::{
    ConversationKey, Database, FEATURE_SOCIAL_REPLY, NewMessage, UsageLedger, UsageRecord,
};

const REASON_DUPLICATE: &str = "duplicate message";
const REASON_USER_BLOCKED: &str = "user blocked";

/// Collaborators of the processor.
pub struct ProcessorDeps {
    pub store: Arc<dyn Database>,
    pub rate_limiter: RateLimiter,
    pub responder: AiResponder,
    pub usage: Arc<dyn UsageLedger>,
    /// Model used when neither config row names one.
    pub default_model: String,
}

/// Entry point for inbound customer messages.
///
/// `Send + Sync`; share it behind an `Arc` and call [`process`] from as
/// many tasks as needed.
///
/// [`process`]: WebhookProcessor::process
pub struct WebhookProcessor {
    store: Arc<dyn Database>,
    rate_limiter: RateLimiter,
    responder: AiResponder,
    usage: Arc<dyn UsageLedger>,
    default_model: String,
}

impl WebhookProcessor {
    pub fn new(deps: ProcessorDeps) -> Self {
        Self {
            store: deps.store,
            rate_limiter: deps.rate_limiter,
            responder: deps.responder,
            usage: deps.usage,
            default_model: deps.default_model,
        }
    }

    /// The store this processor writes to.
    pub fn store(&self) -> &Arc<dyn Database> {
        &self.store
    }

    /// Process one inbound message. Never fails.
    pub async fn process(&self, message: InboundMessage) -> ProcessingResult {
        let platform = message.platform;
        let user = message.platform_user_id.clone();

        match AssertUnwindSafe(self.run(message)).catch_unwind().await {
            Ok(Ok(result)) => {
                info!(
                    platform = %platform,
                    user = %user,
                    action = result.action.label(),
                    conversation_id = result.conversation_id.as_deref().unwrap_or("-"),
                    "Inbound message processed"
                );
                result
            }
            Ok(Err(e)) => {
                error!(platform = %platform, user = %user, error = %e, "Pipeline failed");
                ProcessingResult::error(e.to_string())
            }
            Err(panic) => {
                let msg = panic_message(&*panic);
                error!(platform = %platform, user = %user, panic = %msg, "Pipeline panicked");
                ProcessingResult::error(format!("pipeline panicked: {msg}"))
            }
        }
    }

    async fn run(&self, message: InboundMessage) -> Result<ProcessingResult, PipelineError> {
        let platform = message.platform;

        // Step 1: dedup
        if let Some(key) = message.dedup_key() {
            if self.store.message_exists_with_platform_id(key).await? {
                debug!(platform = %platform, platform_message_id = key, "Duplicate delivery");
                return Ok(ProcessingResult::blocked(REASON_DUPLICATE));
            }
        }

        // Step 2: effective config, recomputed on every message
        let rows = self.store.load_agent_configs(platform).await?;
        let config = EffectiveConfig::resolve(
            platform,
            rows.platform.as_ref(),
            rows.global.as_ref(),
            &self.default_model,
        );

        // Step 3: blocked users
        if config.is_blocked(&message.platform_user_id) {
            info!(
                platform = %platform,
                user = %message.platform_user_id,
                "Message from blocked user ignored"
            );
            return Ok(ProcessingResult::blocked(REASON_USER_BLOCKED));
        }

        // Step 4: conversation
        let conversation = self
            .store
            .upsert_conversation(&ConversationKey::from_inbound(&message))
            .await?;

        // Step 5: inbound message; a concurrent duplicate loses on the unique id
        let inbound = match self
            .store
            .insert_message(&NewMessage::inbound(&conversation.id, &message))
            .await
        {
            Ok(stored) => stored,
            Err(DatabaseError::Constraint(reason)) => {
                debug!(
                    conversation_id = %conversation.id,
                    reason = %reason,
                    "Concurrent duplicate delivery"
                );
                return Ok(ProcessingResult::blocked(REASON_DUPLICATE));
            }
            Err(e) => return Err(e.into()),
        };

        // Step 6: rate limit
        let decision = self
            .rate_limiter
            .check(platform, config.max_messages_per_hour)
            .await;
        if !decision.allowed {
            info!(
                conversation_id = %conversation.id,
                count = decision.count_in_window,
                limit = decision.limit,
                "Rate limited, no reply generated"
            );
            return Ok(ProcessingResult::rate_limited(
                conversation.id,
                inbound.id,
                decision.reason,
            ));
        }

        // Step 7: auto-respond toggle
        let auto_respond = config.auto_respond_for(conversation.kind);

        // Step 8: history, without the message just stored
        let history = self
            .store
            .recent_context_messages(&conversation.id, DEFAULT_CONTEXT_MESSAGES, Some(&inbound.id))
            .await?;

        // Step 9: generate
        let ai = self
            .responder
            .generate(&GenerateRequest {
                platform,
                user_message: message.text.clone(),
                history,
                global_prompt: config.global_prompt.clone(),
                platform_prompt: config.platform_prompt.clone(),
                escalation_keywords: config.escalation_keywords.clone(),
                model: config.model.clone(),
                temperature: config.temperature,
                max_tokens: config.max_tokens,
            })
            .await?;

        // Step 10: disposition
        let disposition = determine_approval(ai.confidence, auto_respond, ai.should_escalate);

        // Step 11: escalation flag
        if ai.should_escalate {
            self.store
                .mark_conversation_escalated(&conversation.id)
                .await?;
            info!(
                conversation_id = %conversation.id,
                reason = ai.escalation_reason.as_deref().unwrap_or("-"),
                "Conversation escalated to a human"
            );
        }

        // Step 12: reply or draft
        let reply = self
            .store
            .insert_message(&NewMessage::ai_reply(
                &conversation.id,
                disposition.direction(),
                disposition.approval_status(),
                &ai.content,
                &ai.model,
                ai.confidence,
                ai.prompt_tokens,
                ai.completion_tokens,
            ))
            .await?;

        // Step 13: usage ledger
        let usage = UsageRecord {
            conversation_id: Some(conversation.id.clone()),
            model: ai.model.clone(),
            feature: FEATURE_SOCIAL_REPLY.to_string(),
            prompt_tokens: ai.prompt_tokens,
            completion_tokens: ai.completion_tokens,
            cost_usd: estimate_cost(&ai.model, ai.prompt_tokens, ai.completion_tokens),
        };
        if let Err(e) = self.usage.record_usage(&usage).await {
            warn!(conversation_id = %conversation.id, error = %e, "Failed to record LLM usage");
        }

        // Step 14: action
        let action = if ai.should_escalate {
            ProcessingAction::Escalated
        } else {
            match disposition {
                Disposition::AutoApproved => ProcessingAction::Responded,
                Disposition::Pending => ProcessingAction::QueuedForApproval,
            }
        };

        debug!(
            conversation_id = %conversation.id,
            reply_id = %reply.id,
            confidence = ai.confidence,
            disposition = ?disposition,
            "Reply stored"
        );

        Ok(ProcessingResult::replied(
            action,
            conversation.id,
            inbound.id,
            reply.id,
            ai,
        ))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
