//! Cognate - reasoning-memory-correction core for conversational agents
//!
//! Answers a query by combining retrieved long-term knowledge,
//! short-term dialogue context, bounded multi-step inference, ethical
//! filtering, and self-verification with a hard retry budget.

pub mod agent;
pub mod audit;
pub mod correction;
pub mod embedding;
pub mod error;
pub mod guardrail;
pub mod ingest;
pub mod memory;
pub mod reasoning;
pub mod types;

pub use agent::{Agent, AgentReply, ReplyDisposition};
pub use audit::{AuditSink, JsonlSink, MemorySink};
pub use correction::{CorrectionLoop, LoopOutcome};
pub use embedding::{cosine_similarity, Embedder, HashEmbedder};
pub use error::{CognateError, Result};
pub use guardrail::{GuardrailFilter, GuardrailRule, Verdict};
pub use memory::{MemoryStore, RetrievedItem, Session};
pub use reasoning::ReasoningEngine;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
