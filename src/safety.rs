//! Guardrails for model output and escalation triggers.
//!
//! Two independent checks:
//! - [`filter_response`] rejects generated replies that mention competitors,
//!   contain profanity, or leak internal data. Only model output goes
//!   through it, never customer text.
//! - [`detect_escalation`] flags topics a human must handle (pricing,
//!   complaints, meetings, refunds). It runs on both the customer message and
//!   the generated reply.

use std::sync::LazyLock;

use regex::Regex;

/// Competitor brands that must never appear in an automated reply.
const COMPETITORS: &[&str] = &[
    "wix",
    "squarespace",
    "wordpress.com",
    "webflow",
    "tilda",
    "shopify",
    "godaddy",
];

/// Profanity patterns (English and Bulgarian), matched against lower-cased text.
static PROFANITY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"\b(fuck\w*|shit\w*|bitch\w*|asshole\w*|bastard\w*|dick)\b").unwrap(),
        Regex::new(r"(^|[^\p{L}])(мамка ти|курв\p{L}*|путк\p{L}*|шибан\p{L}*|копел\p{L}*)").unwrap(),
        Regex::new(r"(^|[^\p{L}])(идиот\p{L}*|тъпа?к\p{L}*|глупа?к\p{L}*)").unwrap(),
    ]
});

/// Patterns that indicate internal data leaking into a reply.
static LEAK_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (Regex::new(r"sk-[a-z0-9_\-]{16,}").unwrap(), "api_key"),
        (Regex::new(r"bearer\s+[a-z0-9._\-]{10,}").unwrap(), "bearer_token"),
        (
            Regex::new(r"\b(api[_\- ]?key|secret[_\- ]?key|access[_\- ]?token|service[_\- ]?role)\b")
                .unwrap(),
            "credential_reference",
        ),
        (Regex::new(r"\bpassword\s*[:=]").unwrap(), "password"),
        (
            Regex::new(r"\b(supabase|vercel|openai|anthropic|system prompt|системен промпт)\b")
                .unwrap(),
            "internal_tooling",
        ),
    ]
});

/// Built-in escalation keywords for the Bulgarian market.
pub const DEFAULT_ESCALATION_KEYWORDS: &[&str] = &[
    // pricing
    "цена",
    "колко струва",
    "колко ще струва",
    "оферта",
    "бюджет",
    "отстъпка",
    // complaints
    "оплакване",
    "рекламация",
    "недоволен",
    "недоволна",
    "измама",
    "адвокат",
    // meetings and calls
    "среща",
    "обадете се",
    "телефон",
    // refunds
    "възстановяване",
    "върнете парите",
    "върнете ми парите",
    "отказ от договор",
    // asking for a person
    "жив човек",
    "оператор",
];

/// Which guardrail list produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterCategory {
    Competitor,
    Profanity,
    InternalLeak,
}

/// A forbidden-content hit in a generated reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterHit {
    pub category: FilterCategory,
    /// Stable, log-friendly reason such as `competitor_mention: wix`.
    pub reason: String,
}

/// Check a generated reply against the forbidden-content lists.
///
/// Lists are checked in order (competitors, profanity, internal leaks) and
/// the first hit wins.
pub fn filter_response(text: &str) -> Option<FilterHit> {
    let lowered = text.to_lowercase();

    if let Some(name) = COMPETITORS.iter().find(|name| lowered.contains(*name)) {
        return Some(FilterHit {
            category: FilterCategory::Competitor,
            reason: format!("competitor_mention: {name}"),
        });
    }

    if PROFANITY_PATTERNS.iter().any(|re| re.is_match(&lowered)) {
        return Some(FilterHit {
            category: FilterCategory::Profanity,
            reason: "profanity".to_string(),
        });
    }

    LEAK_PATTERNS
        .iter()
        .find(|(re, _)| re.is_match(&lowered))
        .map(|(_, label)| FilterHit {
            category: FilterCategory::InternalLeak,
            reason: format!("internal_data_leak: {label}"),
        })
}

/// Result of an escalation check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EscalationCheck {
    pub should_escalate: bool,
    /// The first keyword that matched.
    pub reason: Option<String>,
}

impl EscalationCheck {
    /// Combine two checks; `self` keeps its reason when both matched.
    pub fn or(self, other: EscalationCheck) -> EscalationCheck {
        if self.should_escalate { self } else { other }
    }
}

/// Case-insensitive keyword match.
///
/// A caller-supplied list replaces the built-in one entirely.
pub fn detect_escalation(text: &str, keywords: Option<&[String]>) -> EscalationCheck {
    let lowered = text.to_lowercase();

    let hit = match keywords {
        Some(list) => list
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .find(|k| lowered.contains(&k.to_lowercase()))
            .map(str::to_string),
        None => DEFAULT_ESCALATION_KEYWORDS
            .iter()
            .find(|k| lowered.contains(*k))
            .map(|k| k.to_string()),
    };

    match hit {
        Some(keyword) => EscalationCheck {
            should_escalate: true,
            reason: Some(keyword),
        },
        None => EscalationCheck::default(),
    }
}
