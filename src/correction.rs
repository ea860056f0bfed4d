//! Self-correction loop
//!
//! Per-query state machine: RETRIEVE -> INFER -> GUARD -> one of
//! ACCEPT, RETRY, REJECT. Guardrail violations revise the query by
//! appending the violated rule as a negative constraint; consistency
//! failures retry with widened retrieval. The retry budget is a hard
//! cap, so the loop terminates in bounded steps for any input.
//!
//! Exhaustion policy is explicit: `ethical_strict_mode = true` rejects
//! with a fixed fallback, `false` accepts the best guard-passing answer
//! seen so far, marked unverified (and hedged, so callers always see
//! the marker).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::audit::AuditSink;
use crate::embedding::Embedder;
use crate::error::{CognateError, Result};
use crate::guardrail::{GuardrailFilter, Verdict};
use crate::memory::{MemoryStore, RetrievedItem};
use crate::reasoning::ReasoningEngine;
use crate::types::{Answer, CoreConfig, CorrectionReason, CorrectionRecord};

/// Fixed response returned on REJECT
pub const REJECT_FALLBACK: &str =
    "I can't give you a reliable answer to that right now.";

/// Terminal result of one query through the loop
#[derive(Debug, Clone)]
pub enum LoopOutcome {
    /// Answer returned to the caller. `verified` is false when the
    /// retry budget ran out and the best-seen answer was accepted
    /// without passing the consistency check.
    Accepted {
        answer: Answer,
        verified: bool,
        attempts: u32,
    },
    /// Fixed fallback returned; the answer is discarded
    Rejected { fallback: String, attempts: u32 },
}

impl LoopOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            LoopOutcome::Accepted { attempts, .. } => *attempts,
            LoopOutcome::Rejected { attempts, .. } => *attempts,
        }
    }
}

/// Orchestrates engine, store, and guardrail across bounded retries
pub struct CorrectionLoop {
    store: Arc<MemoryStore>,
    embedder: Arc<dyn Embedder>,
    engine: ReasoningEngine,
    guardrail: GuardrailFilter,
    sink: Arc<dyn AuditSink>,
    config: CoreConfig,
}

impl CorrectionLoop {
    pub fn new(
        store: Arc<MemoryStore>,
        embedder: Arc<dyn Embedder>,
        guardrail: GuardrailFilter,
        sink: Arc<dyn AuditSink>,
        config: CoreConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            embedder,
            engine: ReasoningEngine::new(&config),
            guardrail,
            sink,
            config,
        })
    }

    /// Run one query to a terminal state.
    pub fn run(&self, query: &str) -> Result<LoopOutcome> {
        self.run_cancellable(query, None)
    }

    /// Run one query, checking `cancel` between stages. Audit records
    /// appended before cancellation remain; the trail is not rolled
    /// back.
    pub fn run_cancellable(
        &self,
        query: &str,
        cancel: Option<&AtomicBool>,
    ) -> Result<LoopOutcome> {
        let max_attempts = self.config.max_correction_retries + 1;
        let mut current_query = query.to_string();
        let mut best: Option<Answer> = None;

        for attempt in 1..=max_attempts {
            check_cancel(cancel)?;

            // RETRIEVE. Retries widen k instead of revising the query
            // when the problem was confidence, not ethics.
            let embedding = self.embedder.embed(&current_query)?;
            let k = self.config.retrieval_k + (attempt as usize - 1);
            let evidence = match self.store.retrieve(&embedding, k, None) {
                Ok(items) => items,
                Err(e) if e.is_recoverable() => {
                    debug!(attempt, "store empty, inferring from no evidence");
                    Vec::new()
                }
                Err(e) => return Err(e),
            };

            check_cancel(cancel)?;

            // INFER
            let answer = self.engine.infer(&current_query, &evidence);
            debug!(
                attempt,
                confidence = answer.confidence,
                steps = answer.chain.len(),
                "inference complete"
            );
            check_cancel(cancel)?;

            // GUARD
            match self.guardrail.check(&answer)? {
                Verdict::Violation { message, rule, .. } => {
                    if attempt < max_attempts {
                        let revised = format!("{}\n[avoid] {}", current_query, message);
                        self.log_retry(
                            &answer,
                            &revised,
                            CorrectionReason::EthicalViolation,
                            attempt,
                        )?;
                        current_query = revised;
                        continue;
                    }
                    warn!(rule = %rule, attempts = attempt, "retries exhausted on violation, rejecting");
                    return Ok(LoopOutcome::Rejected {
                        fallback: REJECT_FALLBACK.to_string(),
                        attempts: attempt,
                    });
                }
                Verdict::Pass => {}
            }

            // Only guard-passing answers are candidates for lenient
            // exhaustion; a violating answer must never reach the caller
            if best
                .as_ref()
                .map_or(true, |b| answer.confidence > b.confidence)
            {
                best = Some(answer.clone());
            }

            // Consistency check, run only on PASS
            match self.consistency_failure(&answer, &evidence) {
                None => {
                    debug!(attempt, "answer accepted");
                    return Ok(LoopOutcome::Accepted {
                        answer,
                        verified: true,
                        attempts: attempt,
                    });
                }
                Some(reason) => {
                    if attempt < max_attempts {
                        self.log_retry(&answer, &current_query, reason, attempt)?;
                        continue;
                    }
                    return self.exhausted(best, reason, attempt);
                }
            }
        }

        // Unreachable: every iteration of the final attempt returns
        Err(CognateError::RetryBudgetExhausted {
            attempts: max_attempts,
        })
    }

    /// PASS-side verification: aggregate confidence must clear the
    /// acceptance threshold, and every step must rest on at least one
    /// evidence id retrieved above the support threshold.
    fn consistency_failure(
        &self,
        answer: &Answer,
        evidence: &[RetrievedItem],
    ) -> Option<CorrectionReason> {
        if answer.confidence < self.config.min_acceptance_confidence {
            return Some(CorrectionReason::LowConfidence);
        }

        for step in &answer.chain {
            let supported = step.premise.iter().any(|id| {
                evidence
                    .iter()
                    .any(|e| &e.item.id == id && e.similarity >= self.config.support_threshold)
            });
            if !supported {
                return Some(CorrectionReason::InconsistentWithEvidence);
            }
        }
        None
    }

    fn log_retry(
        &self,
        answer: &Answer,
        revised_query: &str,
        reason: CorrectionReason,
        attempt: u32,
    ) -> Result<()> {
        debug!(attempt, reason = %reason, "retrying");
        self.sink.append_correction(&CorrectionRecord {
            original_answer: answer.text.clone(),
            revised_query: revised_query.to_string(),
            reason,
            attempt_index: attempt,
            timestamp: Utc::now(),
        })
    }

    /// Budget ran out on a consistency failure: policy decides.
    fn exhausted(
        &self,
        best: Option<Answer>,
        reason: CorrectionReason,
        attempts: u32,
    ) -> Result<LoopOutcome> {
        if self.config.ethical_strict_mode {
            warn!(attempts, reason = %reason, "retries exhausted, rejecting (strict mode)");
            return Ok(LoopOutcome::Rejected {
                fallback: REJECT_FALLBACK.to_string(),
                attempts,
            });
        }

        // Best-seen answer, explicitly marked and hedged
        let mut answer = best.unwrap_or_else(|| Answer {
            text: REJECT_FALLBACK.to_string(),
            chain: vec![],
            confidence: 0.0,
            evidence_ids: vec![],
            low_confidence: true,
        });
        answer.low_confidence = true;
        answer.text = format!("I couldn't fully verify this, so take it with caution: {}", answer.text);
        warn!(attempts, reason = %reason, "retries exhausted, accepting unverified");
        Ok(LoopOutcome::Accepted {
            answer,
            verified: false,
            attempts,
        })
    }
}

fn check_cancel(cancel: Option<&AtomicBool>) -> Result<()> {
    if cancel.map_or(false, |c| c.load(Ordering::SeqCst)) {
        return Err(CognateError::Cancelled);
    }
    Ok(())
}
