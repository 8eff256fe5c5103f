//! Step-back support: a stack of full machine snapshots taken before each step.

use std::collections::VecDeque;

use crate::assembly::AssemblyListing;
use crate::types::Symbol;

/// Everything a step can change, captured by value right before the step is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub state: String,
    pub head: usize,
    pub tape: Vec<Symbol>,
    pub current_instruction: String,
    pub assembly: AssemblyListing,
    pub step_count: usize,
}

/// Manages execution history for stepping backward.
///
/// There is no redo: stepping forward after a step back discards the undone branch.
#[derive(Debug, Default)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    limit: Option<usize>,
}

impl History {
    /// Creates a history holding at most `limit` entries (`None` for unbounded).
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            limit,
        }
    }

    /// Add a snapshot to history, evicting the oldest one when full.
    pub fn push(&mut self, entry: HistoryEntry) {
        if self.limit == Some(0) {
            return;
        }

        if self.limit.is_some_and(|limit| self.entries.len() >= limit) {
            self.entries.pop_front();
        }

        self.entries.push_back(entry);
    }

    /// Removes and returns the most recent snapshot.
    pub fn pop(&mut self) -> Option<HistoryEntry> {
        self.entries.pop_back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
