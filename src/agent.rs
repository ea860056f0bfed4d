//! Agent plumbing around the correction loop
//!
//! Owns session bookkeeping and the failure surface the loop itself
//! does not handle: embedding failures become a user-visible fallback
//! reply, and completed exchanges are recorded back into the memory
//! store as conversation items. Turns are recorded after the loop runs
//! so a query never retrieves itself as evidence.

use std::sync::Arc;

use tracing::{error, warn};

use crate::audit::AuditSink;
use crate::correction::{CorrectionLoop, LoopOutcome};
use crate::embedding::Embedder;
use crate::error::{CognateError, Result};
use crate::guardrail::GuardrailFilter;
use crate::memory::{MemoryStore, Session};
use crate::types::{CoreConfig, MemoryItem, MemoryKind, QueryFeatures, Role};

/// Fixed reply when the embedding capability fails for a query
pub const EMBEDDING_FAILURE_FALLBACK: &str =
    "Something went wrong while processing your question. Please try again.";

/// How a reply came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyDisposition {
    /// The loop accepted an answer; `verified` mirrors the loop outcome
    Answered { verified: bool },
    /// The loop rejected; the fixed fallback was returned
    Refused,
    /// A fatal per-query failure (embedding); fallback returned
    Failed,
}

/// What the caller gets back for one query
#[derive(Debug, Clone)]
pub struct AgentReply {
    pub text: String,
    pub disposition: ReplyDisposition,
    pub attempts: u32,
}

/// The conversational agent core: store + loop + sessions
pub struct Agent {
    store: Arc<MemoryStore>,
    embedder: Arc<dyn Embedder>,
    correction: CorrectionLoop,
    config: CoreConfig,
}

impl Agent {
    pub fn new(
        store: Arc<MemoryStore>,
        embedder: Arc<dyn Embedder>,
        sink: Arc<dyn AuditSink>,
        config: CoreConfig,
    ) -> Result<Self> {
        let guardrail = GuardrailFilter::with_default_rules(&config, Arc::clone(&sink));
        let correction = CorrectionLoop::new(
            Arc::clone(&store),
            Arc::clone(&embedder),
            guardrail,
            sink,
            config.clone(),
        )?;
        Ok(Self {
            store,
            embedder,
            correction,
            config,
        })
    }

    /// Open a fresh session bounded by the configured history limit.
    pub fn open_session(&self) -> Session {
        Session::new(self.config.conversation_history_limit)
    }

    pub fn answer(&self, session: &mut Session, query: &str) -> Result<AgentReply> {
        self.answer_with_features(session, query, None)
    }

    /// Answer a query within a session, with optional NLP enrichment
    /// attached to the recorded turn.
    pub fn answer_with_features(
        &self,
        session: &mut Session,
        query: &str,
        features: Option<QueryFeatures>,
    ) -> Result<AgentReply> {
        if session.is_closed() {
            return Err(CognateError::SessionClosed(session.id().to_string()));
        }

        let cancel = session.cancel_flag();
        let reply = match self.correction.run_cancellable(query, Some(&cancel)) {
            Ok(LoopOutcome::Accepted {
                answer,
                verified,
                attempts,
            }) => AgentReply {
                text: answer.text,
                disposition: ReplyDisposition::Answered { verified },
                attempts,
            },
            Ok(LoopOutcome::Rejected { fallback, attempts }) => AgentReply {
                text: fallback,
                disposition: ReplyDisposition::Refused,
                attempts,
            },
            Err(CognateError::Embedding(e)) => {
                // Fatal for this query: no embedding means no retrieval
                // and no reasoning. Logged, never retried in-loop.
                error!(error = %e, "embedding failure, returning fallback");
                AgentReply {
                    text: EMBEDDING_FAILURE_FALLBACK.to_string(),
                    disposition: ReplyDisposition::Failed,
                    attempts: 0,
                }
            }
            Err(e) => return Err(e),
        };

        // Record the exchange for conversational continuity. Rejected
        // and failed queries still record the turn; answers are never
        // written back as knowledge.
        self.record_turn(session, Role::User, query, features)?;
        self.record_turn(session, Role::Agent, &reply.text, None)?;

        Ok(reply)
    }

    fn record_turn(
        &self,
        session: &mut Session,
        role: Role,
        text: &str,
        features: Option<QueryFeatures>,
    ) -> Result<()> {
        let memory_ids = match self.embedder.embed(text) {
            Ok(embedding) => {
                let item = MemoryItem::new(text, embedding, MemoryKind::Conversation, "dialogue")
                    .with_session(session.id());
                vec![self.store.record(item)?]
            }
            Err(e) => {
                // The turn still lands in the session transcript
                warn!(error = %e, "could not embed turn, session-only record");
                vec![]
            }
        };
        session.push_turn(role, text, memory_ids, features)?;
        Ok(())
    }
}
