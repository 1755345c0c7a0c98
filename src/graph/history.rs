//! Undo/redo history over the graph model.
//!
//! Entries before the cursor are undo states, entries from the cursor on are
//! redo states. Undo and redo swap the live model into the slot they vacate,
//! so a single list serves both directions.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::config::DEFAULT_HISTORY_LIMIT;

use super::model::GraphModel;

/// An independent copy of the graph taken before an edit.
#[derive(Debug, Clone)]
pub struct HistorySnapshot {
    /// Graph state.
    pub model: GraphModel,

    /// Human-readable description of the edit.
    pub description: String,

    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
}

impl HistorySnapshot {
    /// Deep-copies the model into a new snapshot.
    pub fn capture(model: &GraphModel, description: impl Into<String>) -> Self {
        Self {
            model: model.clone(),
            description: description.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Bounded undo/redo history.
#[derive(Debug, Clone)]
pub struct HistoryManager {
    entries: VecDeque<HistorySnapshot>,
    cursor: usize,
    limit: usize,
    /// Key of the last coalesced push; cleared by any other history call.
    coalesce_key: Option<String>,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl HistoryManager {
    /// Creates an empty history keeping at most `limit` undo levels.
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cursor: 0,
            limit: limit.max(1),
            coalesce_key: None,
        }
    }

    /// Records the state before an edit.
    ///
    /// Any redo branch is discarded. Once the limit is exceeded the oldest
    /// entry is evicted.
    pub fn push(&mut self, model: &GraphModel, description: impl Into<String>) {
        self.coalesce_key = None;
        self.record(HistorySnapshot::capture(model, description));
    }

    /// Records the state before an edit unless the previous push used the
    /// same key.
    ///
    /// Used for continuous edits such as dragging a knob, where only the
    /// state before the first step is worth restoring. Returns true if a
    /// snapshot was recorded.
    pub fn push_coalesced(
        &mut self,
        key: impl Into<String>,
        model: &GraphModel,
        description: impl Into<String>,
    ) -> bool {
        let key = key.into();
        if self.coalesce_key.as_deref() == Some(key.as_str()) {
            return false;
        }
        self.record(HistorySnapshot::capture(model, description));
        self.coalesce_key = Some(key);
        true
    }

    fn record(&mut self, snapshot: HistorySnapshot) {
        self.entries.truncate(self.cursor);
        self.entries.push_back(snapshot);
        while self.entries.len() > self.limit {
            self.entries.pop_front();
        }
        self.cursor = self.entries.len();
    }

    /// Steps back one edit.
    ///
    /// `current` is kept for redo; the returned model is the state before
    /// the most recent edit, or `None` when there is nothing to undo.
    pub fn undo(&mut self, current: &GraphModel) -> Option<GraphModel> {
        if !self.can_undo() {
            return None;
        }
        self.coalesce_key = None;
        self.cursor -= 1;
        Some(self.swap(self.cursor, current))
    }

    /// Steps forward one edit, or returns `None` when there is nothing to redo.
    pub fn redo(&mut self, current: &GraphModel) -> Option<GraphModel> {
        if !self.can_redo() {
            return None;
        }
        self.coalesce_key = None;
        let restored = self.swap(self.cursor, current);
        self.cursor += 1;
        Some(restored)
    }

    fn swap(&mut self, index: usize, current: &GraphModel) -> GraphModel {
        let slot = &mut self.entries[index];
        slot.timestamp = Utc::now();
        std::mem::replace(&mut slot.model, current.clone())
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    /// Description of the edit `undo` would revert.
    pub fn undo_description(&self) -> Option<&str> {
        self.cursor
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .map(|s| s.description.as_str())
    }

    /// Description of the edit `redo` would reapply.
    pub fn redo_description(&self) -> Option<&str> {
        self.entries.get(self.cursor).map(|s| s.description.as_str())
    }

    /// Number of stored snapshots in both directions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Iterates over the stored snapshots, oldest first.
    pub fn snapshots(&self) -> impl Iterator<Item = &HistorySnapshot> {
        self.entries.iter()
    }

    /// Drops all history.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
        self.coalesce_key = None;
    }
}
