use std::collections::VecDeque;

use tracing::warn;

use crate::error::PersistenceError;
use crate::storage::KeyValueStore;
use crate::types::ConversationTurn;

pub(crate) const HISTORY_KEY: &str = "history";

/// Bounded dialogue log, oldest turn first
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ConversationHistory {
    turns: VecDeque<ConversationTurn>,
    cap: usize,
}

impl ConversationHistory {
    pub fn new(cap: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(cap),
            cap,
        }
    }

    /// Best effort: missing or unreadable data gives an empty history
    pub fn load(store: &dyn KeyValueStore, cap: usize) -> Self {
        let mut history = Self::new(cap);
        match Self::read(store) {
            Ok(turns) => {
                history.turns = turns.into();
                history.truncate();
            }
            Err(err) => warn!("discarding stored history: {}", err),
        }
        history
    }

    fn read(store: &dyn KeyValueStore) -> Result<Vec<ConversationTurn>, PersistenceError> {
        match store.get(HISTORY_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    pub fn persist(&self, store: &dyn KeyValueStore) -> Result<(), PersistenceError> {
        let raw = serde_json::to_string(&self.turns)?;
        store.set(HISTORY_KEY, &raw)
    }

    /// Appends a completed exchange, dropping the oldest turns past the cap
    pub fn push_exchange(&mut self, user: ConversationTurn, agent: ConversationTurn) {
        self.turns.push_back(user);
        self.turns.push_back(agent);
        self.truncate();
    }

    pub fn clear(&mut self) -> usize {
        let count = self.turns.len();
        self.turns.clear();
        count
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    fn truncate(&mut self) {
        while self.turns.len() > self.cap {
            self.turns.pop_front();
        }
    }
}
