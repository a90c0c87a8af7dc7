//! AI responder — drafts a reply, runs the guardrails and grades its own
//! confidence.
//!
//! Flow:
//! 1. Build system prompt and conversation context
//! 2. Completion call for the reply (bounded by `request_timeout`)
//! 3. Content filter → on a hit, escalate with confidence 0 and stop
//! 4. Escalation keywords on the customer message and the reply
//! 5. Confidence call (bounded by `confidence_timeout`, fail-soft)

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::LlmError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::confidence::parse_confidence;
use crate::pipeline::prompts::{
    CONFIDENCE_SYSTEM_PROMPT, DEFAULT_CONTEXT_MESSAGES, build_confidence_prompt,
    build_conversation_context, build_system_prompt,
};
use crate::pipeline::types::{AiResponse, Platform};
use crate::safety::{detect_escalation, filter_response};
use crate::store::StoredMessage;

/// Confidence assumed when the self-assessment call itself fails.
pub const CONFIDENCE_ON_FAILURE: f64 = 0.8;

/// Temperature for the confidence call (deterministic).
const CONFIDENCE_TEMPERATURE: f32 = 0.0;

/// Max tokens for the confidence call. The answer is a single number.
const CONFIDENCE_MAX_TOKENS: u32 = 10;

/// Time bounds for the two completion calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponderConfig {
    pub request_timeout: Duration,
    pub confidence_timeout: Duration,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            confidence_timeout: Duration::from_secs(10),
        }
    }
}

/// Everything needed to draft one reply.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub platform: Platform,
    pub user_message: String,
    /// Prior messages, oldest first. Drafts are ignored.
    pub history: Vec<StoredMessage>,
    pub global_prompt: Option<String>,
    pub platform_prompt: Option<String>,
    /// `None` selects the built-in keyword list.
    pub escalation_keywords: Option<Vec<String>>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Drafts replies through an [`LlmProvider`].
pub struct AiResponder {
    llm: Arc<dyn LlmProvider>,
    config: ResponderConfig,
}

impl AiResponder {
    pub fn new(llm: Arc<dyn LlmProvider>, config: ResponderConfig) -> Self {
        Self { llm, config }
    }

    /// Draft a reply and assess it.
    ///
    /// Only the primary completion can fail this call. The confidence
    /// call degrades to [`CONFIDENCE_ON_FAILURE`].
    pub async fn generate(&self, request: &GenerateRequest) -> Result<AiResponse, LlmError> {
        let system_prompt = build_system_prompt(
            request.global_prompt.as_deref(),
            request.platform_prompt.as_deref(),
            request.platform,
        );

        let mut messages = Vec::with_capacity(DEFAULT_CONTEXT_MESSAGES + 2);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend(build_conversation_context(
            &request.history,
            DEFAULT_CONTEXT_MESSAGES,
        ));
        messages.push(ChatMessage::user(&request.user_message));

        let completion = CompletionRequest::new(messages)
            .with_model(&request.model)
            .with_temperature(request.temperature)
            .with_max_tokens(request.max_tokens);

        let timeout = self.config.request_timeout;
        let response = tokio::time::timeout(timeout, self.llm.complete(completion))
            .await
            .map_err(|_| LlmError::Timeout { timeout })??;

        let content = response.content.trim().to_string();
        debug!(
            platform = %request.platform,
            model = %response.model,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Reply drafted"
        );

        if let Some(hit) = filter_response(&content) {
            info!(
                platform = %request.platform,
                reason = %hit.reason,
                "Reply blocked by content filter, escalating"
            );
            return Ok(AiResponse {
                content,
                model: response.model,
                confidence: 0.0,
                should_escalate: true,
                escalation_reason: Some(hit.reason),
                content_filtered: true,
                prompt_tokens: response.input_tokens,
                completion_tokens: response.output_tokens,
            });
        }

        let keywords = request.escalation_keywords.as_deref();
        let escalation = detect_escalation(&request.user_message, keywords)
            .or(detect_escalation(&content, keywords));

        let confidence = self
            .assess_confidence(&request.user_message, &content, &response.model)
            .await;

        Ok(AiResponse {
            content,
            model: response.model,
            confidence,
            should_escalate: escalation.should_escalate,
            escalation_reason: escalation.reason,
            content_filtered: false,
            prompt_tokens: response.input_tokens,
            completion_tokens: response.output_tokens,
        })
    }

    /// Ask the model to grade its own reply.
    async fn assess_confidence(&self, user_message: &str, reply: &str, model: &str) -> f64 {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(CONFIDENCE_SYSTEM_PROMPT),
            ChatMessage::user(build_confidence_prompt(user_message, reply)),
        ])
        .with_model(model)
        .with_temperature(CONFIDENCE_TEMPERATURE)
        .with_max_tokens(CONFIDENCE_MAX_TOKENS);

        let timeout = self.config.confidence_timeout;
        match tokio::time::timeout(timeout, self.llm.complete(request)).await {
            Ok(Ok(response)) => {
                let confidence = parse_confidence(&response.content);
                debug!(raw = %response.content.trim(), confidence, "Confidence assessed");
                confidence
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Confidence call failed, assuming {CONFIDENCE_ON_FAILURE}");
                CONFIDENCE_ON_FAILURE
            }
            Err(_) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Confidence call timed out, assuming {CONFIDENCE_ON_FAILURE}"
                );
                CONFIDENCE_ON_FAILURE
            }
        }
    }
}
