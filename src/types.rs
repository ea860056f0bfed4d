//! Core types for Cognate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Unique identifier for a memory item (UUID v4 string)
pub type MemoryId = String;

/// Unique identifier for a session
pub type SessionId = String;

/// Kind of a memory item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    /// A recorded conversation turn, evicted once the per-session
    /// history window is exceeded
    Conversation,
    /// Long-term knowledge, persists across sessions
    Knowledge,
    /// A discrete fact, persists across sessions
    Fact,
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryKind::Conversation => write!(f, "conversation"),
            MemoryKind::Knowledge => write!(f, "knowledge"),
            MemoryKind::Fact => write!(f, "fact"),
        }
    }
}

impl std::str::FromStr for MemoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "conversation" => Ok(MemoryKind::Conversation),
            "knowledge" => Ok(MemoryKind::Knowledge),
            "fact" => Ok(MemoryKind::Fact),
            _ => Err(format!("Unknown memory kind: {}", s)),
        }
    }
}

/// A single item in the memory store. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Unique identifier
    pub id: MemoryId,
    /// Raw text content
    pub text: String,
    /// Embedding vector (fixed dimension per store)
    pub embedding: Vec<f32>,
    /// Memory kind
    pub kind: MemoryKind,
    /// Where this item came from (feed name, "dialogue", etc.)
    pub source: String,
    /// Owning session for conversation items; None for long-term items
    pub session: Option<SessionId>,
    /// When the item was written
    pub timestamp: DateTime<Utc>,
    /// SHA-256 of normalized text, used for ingestion dedup
    pub content_hash: String,
    /// Arbitrary relevance metadata as JSON
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl MemoryItem {
    /// Build a new item with a fresh UUID and current timestamp.
    pub fn new(
        text: impl Into<String>,
        embedding: Vec<f32>,
        kind: MemoryKind,
        source: impl Into<String>,
    ) -> Self {
        let text = text.into();
        let content_hash = content_hash(&text);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text,
            embedding,
            kind,
            source: source.into(),
            session: None,
            timestamp: Utc::now(),
            content_hash,
            metadata: HashMap::new(),
        }
    }

    /// Attach an owning session (conversation items only).
    pub fn with_session(mut self, session: impl Into<SessionId>) -> Self {
        self.session = Some(session.into());
        self
    }
}

/// SHA-256 hex digest of trimmed, lowercased text
pub fn content_hash(text: &str) -> String {
    let normalized = text.trim().to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// Speaker role in a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Agent => write!(f, "agent"),
        }
    }
}

/// One turn in a session's append-only dialogue sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Monotonic turn counter within the session
    pub turn_id: u64,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// MemoryItems this turn was recorded as / linked to
    #[serde(default)]
    pub memory_ids: Vec<MemoryId>,
    /// Optional NLP enrichment supplied by an external extractor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<QueryFeatures>,
}

/// Enrichment from the external NLP feature extractor. Optional;
/// never required for correctness.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryFeatures {
    pub intent: Option<String>,
    #[serde(default)]
    pub entities: Vec<String>,
    pub sentiment: Option<f32>,
}

/// One step in an inference chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningStep {
    /// Position in the chain, 0-based
    pub step_index: usize,
    /// Evidence ids this step rests on
    pub premise: Vec<MemoryId>,
    /// The inference drawn at this step
    pub inference: String,
    /// Confidence in [0, 1]
    pub confidence: f32,
}

/// A candidate answer produced by the reasoning engine.
/// Immutable once emitted to the guardrail stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    /// Ordered inference chain
    pub chain: Vec<ReasoningStep>,
    /// Aggregate confidence: minimum over step confidences, so it is
    /// monotonically non-increasing as the chain grows
    pub confidence: f32,
    /// All evidence ids cited anywhere in the chain
    pub evidence_ids: Vec<MemoryId>,
    /// Set when no step reached the acceptance threshold
    pub low_confidence: bool,
}

/// Aggregate a chain's step confidences.
///
/// The aggregate is the minimum step confidence. Appending a step can
/// only keep the aggregate equal or lower, never raise it.
pub fn aggregate_confidence(chain: &[ReasoningStep]) -> f32 {
    if chain.is_empty() {
        return 0.0;
    }
    chain
        .iter()
        .map(|s| s.confidence)
        .fold(f32::INFINITY, f32::min)
        .clamp(0.0, 1.0)
}

/// Severity of a guardrail rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

/// Append-only audit record for a guardrail violation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationRecord {
    /// Snapshot of the offending answer text
    pub answer_text: String,
    /// Name of the rule that fired
    pub rule: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

/// Why a correction attempt was made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionReason {
    LowConfidence,
    InconsistentWithEvidence,
    EthicalViolation,
}

impl std::fmt::Display for CorrectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CorrectionReason::LowConfidence => write!(f, "low_confidence"),
            CorrectionReason::InconsistentWithEvidence => write!(f, "inconsistent_with_evidence"),
            CorrectionReason::EthicalViolation => write!(f, "ethical_violation"),
        }
    }
}

/// Append-only audit record for one correction attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionRecord {
    pub original_answer: String,
    /// Revised query fed back into the loop
    pub revised_query: String,
    pub reason: CorrectionReason,
    /// 1-based, strictly increasing per query
    pub attempt_index: u32,
    pub timestamp: DateTime<Utc>,
}

/// Per-kind item counts reported by the store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStats {
    pub conversation_count: usize,
    pub knowledge_count: usize,
    pub fact_count: usize,
    pub total: usize,
}

/// Configuration surface consumed by the core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Embedding vector dimension the store enforces
    pub embedding_dimensions: usize,
    /// How many items to retrieve per query
    pub retrieval_k: usize,
    /// Hard cap on inference chain length
    pub max_reasoning_steps: usize,
    /// A step at or above this confidence can close the chain
    pub step_acceptance_confidence: f32,
    /// Aggregate confidence required to accept without retry
    pub min_acceptance_confidence: f32,
    /// Evidence similarity required to count as supporting a step
    pub support_threshold: f32,
    /// Hard cap on correction retries per query
    pub max_correction_retries: u32,
    /// Per-session conversation items kept in the store
    pub conversation_history_limit: usize,
    /// true: REJECT on retry exhaustion; false: ACCEPT best-seen
    /// answer marked unverified
    pub ethical_strict_mode: bool,
    /// Below this confidence, answers must hedge or the guardrail fires
    pub hedging_confidence_floor: f32,
    /// Rules below this severity never produce a violation
    pub severity_cutoff: Severity,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            embedding_dimensions: 384,
            retrieval_k: 5,
            max_reasoning_steps: 4,
            step_acceptance_confidence: 0.7,
            min_acceptance_confidence: 0.55,
            support_threshold: 0.15,
            max_correction_retries: 3,
            conversation_history_limit: 20,
            ethical_strict_mode: true,
            hedging_confidence_floor: 0.4,
            severity_cutoff: Severity::Low,
        }
    }
}

impl CoreConfig {
    /// Validate bounds. Thresholds must be probabilities and every
    /// loop bound must be non-zero so the pipeline can make progress.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::CognateError;

        if self.embedding_dimensions == 0 {
            return Err(CognateError::Config(
                "embedding_dimensions must be > 0".into(),
            ));
        }
        if self.retrieval_k == 0 {
            return Err(CognateError::Config("retrieval_k must be > 0".into()));
        }
        if self.max_reasoning_steps == 0 {
            return Err(CognateError::Config(
                "max_reasoning_steps must be > 0".into(),
            ));
        }
        if self.conversation_history_limit == 0 {
            return Err(CognateError::Config(
                "conversation_history_limit must be > 0".into(),
            ));
        }
        for (name, value) in [
            ("step_acceptance_confidence", self.step_acceptance_confidence),
            ("min_acceptance_confidence", self.min_acceptance_confidence),
            ("support_threshold", self.support_threshold),
            ("hedging_confidence_floor", self.hedging_confidence_floor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(CognateError::Config(format!(
                    "{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(index: usize, confidence: f32) -> ReasoningStep {
        ReasoningStep {
            step_index: index,
            premise: vec![],
            inference: String::new(),
            confidence,
        }
    }

    #[test]
    fn test_aggregate_is_minimum() {
        let chain = vec![step(0, 0.9), step(1, 0.4), step(2, 0.7)];
        assert_eq!(aggregate_confidence(&chain), 0.4);
    }

    #[test]
    fn test_aggregate_non_increasing() {
        let mut chain = vec![step(0, 0.8)];
        let mut prev = aggregate_confidence(&chain);
        for (i, c) in [0.9, 0.5, 0.6, 0.3].iter().enumerate() {
            chain.push(step(i + 1, *c));
            let next = aggregate_confidence(&chain);
            assert!(next <= prev, "aggregate rose from {} to {}", prev, next);
            prev = next;
        }
    }

    #[test]
    fn test_aggregate_empty_chain_is_zero() {
        assert_eq!(aggregate_confidence(&[]), 0.0);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_kind_roundtrip() {
        for kind in [
            MemoryKind::Conversation,
            MemoryKind::Knowledge,
            MemoryKind::Fact,
        ] {
            let parsed: MemoryKind = kind.to_string().parse().unwrap();
            assert_eq!(kind, parsed);
        }
    }

    #[test]
    fn test_content_hash_normalizes() {
        assert_eq!(content_hash("  Paris  "), content_hash("paris"));
        assert_ne!(content_hash("paris"), content_hash("london"));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(CoreConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_rejects_zero_bounds() {
        let config = CoreConfig {
            max_reasoning_steps: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_out_of_range_threshold() {
        let config = CoreConfig {
            min_acceptance_confidence: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
