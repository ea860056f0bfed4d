//! Reasoning engine
//!
//! Builds a bounded inference chain from a query and retrieved
//! evidence. Pure: a function of (query, evidence, config) with no
//! store writes and no guardrail calls, which keeps it independently
//! testable and lock-free across concurrent sessions.
//!
//! Step selection is greedy: each step picks the remaining evidence
//! item covering the most unresolved query terms, with deterministic
//! tie-breaks by retrieval similarity, then evidence recency, then
//! lexical order of id.

use std::collections::BTreeSet;

use tracing::debug;

use crate::embedding::tokenize;
use crate::memory::RetrievedItem;
use crate::types::{aggregate_confidence, Answer, CoreConfig, MemoryId, MemoryItem, ReasoningStep};

/// Words carrying no retrieval signal, skipped when extracting the
/// unresolved terms of a query
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "how",
    "in", "is", "it", "of", "on", "or", "that", "the", "this", "to", "was", "what", "when",
    "where", "which", "who", "why", "will", "with", "you",
];

/// Fixed reply used when there is nothing to reason over
pub const NO_EVIDENCE_FALLBACK: &str =
    "I'm not sure. I don't have enough remembered knowledge to answer that yet.";

/// Stateless inference engine
pub struct ReasoningEngine {
    max_steps: usize,
    step_acceptance: f32,
}

impl ReasoningEngine {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            max_steps: config.max_reasoning_steps,
            step_acceptance: config.step_acceptance_confidence,
        }
    }

    /// Produce an answer for `query` given retrieved `evidence`.
    ///
    /// Never fails: empty evidence yields a single low-confidence
    /// fallback step instead of an error. The chain never exceeds
    /// `max_reasoning_steps`.
    pub fn infer(&self, query: &str, evidence: &[RetrievedItem]) -> Answer {
        let mut unresolved: BTreeSet<String> = tokenize(query)
            .into_iter()
            .filter(|t| !STOPWORDS.contains(&t.as_str()))
            .collect();
        if unresolved.is_empty() {
            // Query was all stopwords (or empty); fall back to raw tokens
            unresolved = tokenize(query).into_iter().collect();
        }

        let mut remaining: Vec<&RetrievedItem> = evidence.iter().collect();
        let mut chain: Vec<ReasoningStep> = Vec::new();

        while chain.len() < self.max_steps {
            let Some((pick, coverage)) = self.select_evidence(&remaining, &unresolved) else {
                break;
            };

            if coverage == 0.0 && !chain.is_empty() {
                // Nothing left speaks to the unresolved terms
                break;
            }

            let similarity = pick.similarity.clamp(0.0, 1.0);
            let confidence = if coverage == 0.0 {
                // Weak step: cite the closest evidence even though it
                // covers no unresolved term
                (0.25 * similarity).clamp(0.0, 1.0)
            } else {
                (0.35 + 0.4 * coverage + 0.25 * similarity).clamp(0.0, 1.0)
            };

            let covered: Vec<String> = tokenize(&pick.item.text)
                .into_iter()
                .filter(|t| unresolved.contains(t))
                .collect();
            for term in &covered {
                unresolved.remove(term);
            }

            let step = ReasoningStep {
                step_index: chain.len(),
                premise: vec![pick.item.id.clone()],
                inference: format!(
                    "Evidence from {} addresses [{}]: {}",
                    pick.item.source,
                    covered.join(", "),
                    pick.item.text
                ),
                confidence,
            };
            debug!(
                step = step.step_index,
                confidence,
                coverage,
                "reasoning step produced"
            );

            let pick_id = pick.item.id.clone();
            remaining.retain(|e| e.item.id != pick_id);
            chain.push(step);

            if confidence >= self.step_acceptance && unresolved.is_empty() {
                break;
            }
        }

        if chain.is_empty() {
            // No evidence at all: low-confidence fallback, never an error
            chain.push(ReasoningStep {
                step_index: 0,
                premise: vec![],
                inference: NO_EVIDENCE_FALLBACK.to_string(),
                confidence: 0.05,
            });
        }

        let confidence = aggregate_confidence(&chain);
        let low_confidence = chain
            .iter()
            .all(|s| s.confidence < self.step_acceptance);

        let mut evidence_ids: Vec<MemoryId> = Vec::new();
        for step in &chain {
            for id in &step.premise {
                if !evidence_ids.contains(id) {
                    evidence_ids.push(id.clone());
                }
            }
        }

        let text = self.compose_text(&chain, evidence, low_confidence);

        Answer {
            text,
            chain,
            confidence,
            evidence_ids,
            low_confidence,
        }
    }

    /// Pick the remaining evidence item with the best coverage of the
    /// unresolved terms. Ties: similarity, then recency, then id.
    fn select_evidence<'a>(
        &self,
        remaining: &[&'a RetrievedItem],
        unresolved: &BTreeSet<String>,
    ) -> Option<(&'a RetrievedItem, f32)> {
        if remaining.is_empty() {
            return None;
        }

        let coverage_of = |item: &MemoryItem| -> f32 {
            if unresolved.is_empty() {
                return 1.0;
            }
            let tokens: BTreeSet<String> = tokenize(&item.text).into_iter().collect();
            let hits = unresolved.iter().filter(|t| tokens.contains(*t)).count();
            hits as f32 / unresolved.len() as f32
        };

        let mut best = remaining[0];
        let mut best_cov = coverage_of(&best.item);
        for candidate in &remaining[1..] {
            let cov = coverage_of(&candidate.item);
            let better = cov > best_cov
                || (cov == best_cov
                    && (candidate.similarity > best.similarity
                        || (candidate.similarity == best.similarity
                            && (candidate.item.timestamp > best.item.timestamp
                                || (candidate.item.timestamp == best.item.timestamp
                                    && candidate.item.id < best.item.id)))));
            if better {
                best = candidate;
                best_cov = cov;
            }
        }
        Some((best, best_cov))
    }

    fn compose_text(
        &self,
        chain: &[ReasoningStep],
        evidence: &[RetrievedItem],
        low_confidence: bool,
    ) -> String {
        // Anchor the reply on the strongest step's evidence
        let best_step = chain
            .iter()
            .max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .filter(|s| !s.premise.is_empty());

        match best_step {
            Some(step) => {
                let cited = evidence
                    .iter()
                    .find(|e| step.premise.contains(&e.item.id))
                    .map(|e| e.item.text.clone())
                    .unwrap_or_else(|| step.inference.clone());
                if low_confidence {
                    format!("I'm not certain, but this may help: {}", cited)
                } else {
                    format!("Based on what I remember: {}", cited)
                }
            }
            None => NO_EVIDENCE_FALLBACK.to_string(),
        }
    }
}
