//! Per-document conversation memory

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::MemoryConfig;

/// One question and the answer given to it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub question: String,
    pub answer: String,
    pub asked_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            asked_at: Utc::now(),
        }
    }

    fn char_len(&self) -> usize {
        self.question.chars().count() + self.answer.chars().count()
    }
}

#[derive(Debug)]
struct TurnLog {
    turns: VecDeque<Turn>,
    total_chars: usize,
    max_turns: usize,
    max_chars: usize,
}

impl TurnLog {
    fn push(&mut self, turn: Turn) {
        self.total_chars += turn.char_len();
        self.turns.push_back(turn);

        // Oldest first; the newest turn is always kept
        while self.turns.len() > self.max_turns
            || (self.total_chars > self.max_chars && self.turns.len() > 1)
        {
            match self.turns.pop_front() {
                Some(evicted) => self.total_chars -= evicted.char_len(),
                None => break,
            }
        }
    }
}

/// Shared handle to one document's turn log
#[derive(Debug, Clone)]
pub struct MemoryHandle {
    log: Arc<Mutex<TurnLog>>,
}

impl MemoryHandle {
    fn new(max_turns: usize, max_chars: usize) -> Self {
        Self {
            log: Arc::new(Mutex::new(TurnLog {
                turns: VecDeque::new(),
                total_chars: 0,
                max_turns: max_turns.max(1),
                max_chars,
            })),
        }
    }

    /// Add a turn at the end, evicting the oldest turns past the caps
    pub fn append(&self, turn: Turn) {
        self.log.lock().push(turn);
    }

    /// All retained turns, oldest first
    pub fn history(&self) -> Vec<Turn> {
        self.log.lock().turns.iter().cloned().collect()
    }

    /// The last `n` turns, oldest first
    pub fn recent(&self, n: usize) -> Vec<Turn> {
        let log = self.log.lock();
        let skip = log.turns.len().saturating_sub(n);
        log.turns.iter().skip(skip).cloned().collect()
    }

    pub fn clear(&self) {
        let mut log = self.log.lock();
        log.turns.clear();
        log.total_chars = 0;
    }

    pub fn len(&self) -> usize {
        self.log.lock().turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.lock().turns.is_empty()
    }
}

/// Process-wide registry of turn logs keyed by `doc_id`.
///
/// Logs are created on first use and live until forgotten; nothing is
/// persisted across restarts.
#[derive(Debug)]
pub struct MemoryRegistry {
    logs: DashMap<String, MemoryHandle>,
    max_turns: usize,
    max_chars: usize,
}

impl MemoryRegistry {
    pub fn new(max_turns: usize, max_chars: usize) -> Self {
        Self {
            logs: DashMap::new(),
            max_turns,
            max_chars,
        }
    }

    pub fn from_config(config: &MemoryConfig) -> Self {
        Self::new(config.max_turns, config.max_chars)
    }

    /// Handle for `doc_id`, created lazily
    pub fn get(&self, doc_id: &str) -> MemoryHandle {
        self.logs
            .entry(doc_id.to_string())
            .or_insert_with(|| MemoryHandle::new(self.max_turns, self.max_chars))
            .clone()
    }

    /// Turns recorded for `doc_id` (empty if none)
    pub fn history(&self, doc_id: &str) -> Vec<Turn> {
        self.logs
            .get(doc_id)
            .map(|handle| handle.history())
            .unwrap_or_default()
    }

    /// Drop the log for `doc_id`; returns whether one existed
    pub fn forget(&self, doc_id: &str) -> bool {
        self.logs.remove(doc_id).is_some()
    }

    /// Number of documents with a log
    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::from_config(&MemoryConfig::default())
    }
}
