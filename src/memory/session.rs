//! Conversation sessions
//!
//! A session owns its bounded, append-only turn sequence and a close
//! flag. Closing a session cancels any in-flight query between pipeline
//! stages.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{CognateError, Result};
use crate::types::{ConversationTurn, MemoryId, QueryFeatures, Role, SessionId};

/// A conversation session. Created on first interaction, torn down on
/// explicit close (or caller-side timeout).
pub struct Session {
    id: SessionId,
    created_at: DateTime<Utc>,
    turns: VecDeque<ConversationTurn>,
    history_limit: usize,
    next_turn_id: u64,
    closed: Arc<AtomicBool>,
}

impl Session {
    pub fn new(history_limit: usize) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        debug!(session = %id, "session created");
        Self {
            id,
            created_at: Utc::now(),
            turns: VecDeque::new(),
            history_limit,
            next_turn_id: 0,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Append a turn, evicting the oldest once the history window is
    /// exceeded. Turn ids keep increasing across evictions.
    pub fn push_turn(
        &mut self,
        role: Role,
        text: impl Into<String>,
        memory_ids: Vec<MemoryId>,
        features: Option<QueryFeatures>,
    ) -> Result<u64> {
        if self.is_closed() {
            return Err(CognateError::SessionClosed(self.id.clone()));
        }

        let turn_id = self.next_turn_id;
        self.next_turn_id += 1;
        self.turns.push_back(ConversationTurn {
            turn_id,
            role,
            text: text.into(),
            timestamp: Utc::now(),
            memory_ids,
            features,
        });

        while self.turns.len() > self.history_limit {
            self.turns.pop_front();
        }

        Ok(turn_id)
    }

    /// Turns currently inside the history window, oldest first
    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    /// Close the session. Sets the cancel flag checked between
    /// pipeline stages.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        debug!(session = %self.id, "session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Shared flag for cancelling in-flight queries
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turns_bounded_oldest_evicted() {
        let mut session = Session::new(3);
        for i in 0..5 {
            session
                .push_turn(Role::User, format!("turn {}", i), vec![], None)
                .unwrap();
        }

        assert_eq!(session.turn_count(), 3);
        let ids: Vec<u64> = session.turns().map(|t| t.turn_id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn test_turn_ids_strictly_increase() {
        let mut session = Session::new(2);
        let a = session.push_turn(Role::User, "a", vec![], None).unwrap();
        let b = session.push_turn(Role::Agent, "b", vec![], None).unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_closed_session_rejects_turns() {
        let mut session = Session::new(3);
        session.close();
        assert!(matches!(
            session.push_turn(Role::User, "late", vec![], None),
            Err(CognateError::SessionClosed(_))
        ));
    }

    #[test]
    fn test_cancel_flag_shared() {
        let session = Session::new(3);
        let flag = session.cancel_flag();
        assert!(!flag.load(Ordering::SeqCst));
        session.close();
        assert!(flag.load(Ordering::SeqCst));
    }
}
