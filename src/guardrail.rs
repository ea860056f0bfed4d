//! Ethical guardrail filter
//!
//! Evaluates a candidate answer against a fixed, ordered rule list in a
//! single dispatch loop. The first rule matching at or above the
//! severity cutoff short-circuits with a violation, and every violation
//! appends a [`ViolationRecord`] before returning: the log is an audit
//! trail, not a cache, so the write happens even when the caller goes
//! on to discard the answer.
//!
//! The filter itself is stateless over its inputs; all mutation goes
//! through the injected sink.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::audit::AuditSink;
use crate::error::Result;
use crate::types::{Answer, CoreConfig, Severity, ViolationRecord};

/// Patterns for sensitive personal data (SSNs, card numbers)
static PRIVACY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("static regex"),
        Regex::new(r"\b(?:\d[ -]?){15}\d\b").expect("static regex"),
        Regex::new(r"(?i)social security number").expect("static regex"),
    ]
});

/// Hedging markers an answer must carry when its confidence is below
/// the configured floor
static HEDGE_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(may|might|possibly|perhaps|unsure|uncertain)\b|not sure|not certain|cannot verify|don't have enough")
        .expect("static regex")
});

/// Predicate variant of a guardrail rule
#[derive(Debug, Clone)]
pub enum RuleKind {
    /// Answer text contains a blocked term
    ContentSafety { terms: Vec<String> },
    /// Answer text matches a sensitive-data pattern
    Privacy,
    /// Confidence below `floor` without a hedging marker
    HedgingRequired { floor: f32 },
    /// Answer text contains a bias marker term
    BiasMarkers { terms: Vec<String> },
}

/// One entry in the ordered rule list
#[derive(Debug, Clone)]
pub struct GuardrailRule {
    pub name: String,
    pub severity: Severity,
    pub message: String,
    pub kind: RuleKind,
}

impl GuardrailRule {
    fn matches(&self, answer: &Answer) -> bool {
        let text = answer.text.to_lowercase();
        match &self.kind {
            RuleKind::ContentSafety { terms } | RuleKind::BiasMarkers { terms } => {
                terms.iter().any(|t| text.contains(t.as_str()))
            }
            RuleKind::Privacy => PRIVACY_PATTERNS.iter().any(|p| p.is_match(&answer.text)),
            RuleKind::HedgingRequired { floor } => {
                answer.confidence < *floor && !HEDGE_MARKERS.is_match(&answer.text)
            }
        }
    }
}

/// Outcome of a guardrail check
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Pass,
    Violation {
        rule: String,
        severity: Severity,
        message: String,
    },
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

/// The filter: ordered rules, severity cutoff, injected audit sink
pub struct GuardrailFilter {
    rules: Vec<GuardrailRule>,
    cutoff: Severity,
    sink: Arc<dyn AuditSink>,
}

impl GuardrailFilter {
    pub fn new(rules: Vec<GuardrailRule>, cutoff: Severity, sink: Arc<dyn AuditSink>) -> Self {
        Self { rules, cutoff, sink }
    }

    /// Build the filter with the default rule set.
    pub fn with_default_rules(config: &CoreConfig, sink: Arc<dyn AuditSink>) -> Self {
        Self::new(default_rules(config), config.severity_cutoff, sink)
    }

    /// Evaluate the rule list in order. First match at or above the
    /// cutoff short-circuits; its violation is logged before returning.
    pub fn check(&self, answer: &Answer) -> Result<Verdict> {
        for rule in &self.rules {
            if rule.severity < self.cutoff {
                continue;
            }
            if rule.matches(answer) {
                let record = ViolationRecord {
                    answer_text: answer.text.clone(),
                    rule: rule.name.clone(),
                    severity: rule.severity,
                    timestamp: chrono::Utc::now(),
                };
                self.sink.append_violation(&record)?;
                warn!(rule = %rule.name, severity = %rule.severity, "guardrail violation");
                return Ok(Verdict::Violation {
                    rule: rule.name.clone(),
                    severity: rule.severity,
                    message: rule.message.clone(),
                });
            }
        }
        Ok(Verdict::Pass)
    }
}

/// Default rule set: content safety first, then privacy, then hedging,
/// then bias markers. Order matters; earlier rules win.
pub fn default_rules(config: &CoreConfig) -> Vec<GuardrailRule> {
    vec![
        GuardrailRule {
            name: "content_safety".into(),
            severity: Severity::Critical,
            message: "response must not describe harmful or illegal actions".into(),
            kind: RuleKind::ContentSafety {
                terms: ["how to harm", "how to kill", "build a weapon", "illegal exploit"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            },
        },
        GuardrailRule {
            name: "privacy".into(),
            severity: Severity::Critical,
            message: "response must not expose sensitive personal data".into(),
            kind: RuleKind::Privacy,
        },
        GuardrailRule {
            name: "hedging_required".into(),
            severity: Severity::Medium,
            message: "low-confidence response must be hedged".into(),
            kind: RuleKind::HedgingRequired {
                floor: config.hedging_confidence_floor,
            },
        },
        GuardrailRule {
            name: "bias_markers".into(),
            severity: Severity::Low,
            message: "response carries a bias marker".into(),
            kind: RuleKind::BiasMarkers {
                terms: ["women can't", "men can't", "typical for their race"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            },
        },
    ]
}
