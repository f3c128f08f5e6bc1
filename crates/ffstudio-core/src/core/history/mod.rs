//! Graph History Module
//!
//! Snapshot based undo/redo for the node graph. Every committed entry is a
//! full serialization of the graph; undo and redo restore by reconfiguring
//! the graph from the entry at the new cursor.
//!
//! Edits are debounced: bursts of `enqueue_snapshot` calls collapse into one
//! entry once the graph has been quiet for the debounce interval.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::core::graph::{Graph, SerializedGraph};
use crate::core::{CoreError, CoreResult};

pub const DEFAULT_MAX_HISTORY: usize = 10;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

// =============================================================================
// Pending Snapshot
// =============================================================================

/// Serialization waiting for the debounce deadline
#[derive(Debug, Clone)]
struct PendingSnapshot {
    json: String,
    deadline: Instant,
}

// =============================================================================
// Graph History
// =============================================================================

/// Linear snapshot history with a cursor
#[derive(Debug)]
pub struct GraphHistory {
    entries: VecDeque<String>,
    cursor: usize,
    max_history: usize,
    debounce: Duration,
    pending: Option<PendingSnapshot>,
}

impl GraphHistory {
    /// Creates a history seeded with the current state of `graph`.
    pub fn new(graph: &Graph) -> CoreResult<Self> {
        let mut history = Self {
            entries: VecDeque::new(),
            cursor: 0,
            max_history: DEFAULT_MAX_HISTORY,
            debounce: DEFAULT_DEBOUNCE,
            pending: None,
        };
        history.reset_history(graph)?;
        Ok(history)
    }

    /// Sets the history cap (at least one entry).
    pub fn with_max_history(mut self, max: usize) -> Self {
        self.max_history = max.max(1);
        self.evict_overflow();
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Drops all entries and pending edits and reseeds from `graph`.
    ///
    /// Called when another graph is loaded so histories never mix.
    pub fn reset_history(&mut self, graph: &Graph) -> CoreResult<()> {
        let json = graph.serialize().to_json()?;
        self.pending = None;
        self.entries.clear();
        self.entries.push_back(json);
        self.cursor = 0;
        tracing::debug!("history reset");
        Ok(())
    }

    /// Records that `graph` changed; the snapshot commits after the debounce.
    ///
    /// A newer call replaces a pending snapshot and restarts the timer. After
    /// undo or redo the graph serializes to the restored entry, so a change
    /// notification for the restore itself commits nothing.
    pub fn enqueue_snapshot(&mut self, graph: &Graph) -> CoreResult<()> {
        let json = graph.serialize().to_json()?;
        self.pending = Some(PendingSnapshot {
            json,
            deadline: Instant::now() + self.debounce,
        });
        Ok(())
    }

    /// Commits the pending snapshot if its deadline has passed.
    pub fn poll(&mut self) -> bool {
        self.poll_at(Instant::now())
    }

    /// Commits the pending snapshot if its deadline is at or before `now`.
    pub fn poll_at(&mut self, now: Instant) -> bool {
        match &self.pending {
            Some(pending) if pending.deadline <= now => self.flush(),
            _ => false,
        }
    }

    /// Commits the pending snapshot immediately.
    ///
    /// Returns true if a new entry was added.
    pub fn flush(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => self.commit(pending.json),
            None => false,
        }
    }

    /// Waits out the debounce interval, then commits.
    pub async fn settle(&mut self) -> bool {
        let Some(deadline) = self.pending.as_ref().map(|p| p.deadline) else {
            return false;
        };
        tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
        self.poll_at(deadline)
    }

    fn commit(&mut self, json: String) -> bool {
        if self.entries.get(self.cursor) == Some(&json) {
            tracing::debug!("snapshot identical to current entry, discarded");
            return false;
        }

        self.entries.truncate(self.cursor + 1);
        self.entries.push_back(json);
        self.cursor = self.entries.len() - 1;
        self.evict_overflow();
        tracing::debug!(entries = self.entries.len(), cursor = self.cursor, "snapshot committed");
        true
    }

    fn evict_overflow(&mut self) {
        while self.entries.len() > self.max_history {
            self.entries.pop_front();
            self.cursor = self.cursor.saturating_sub(1);
        }
    }

    /// Steps back one entry and restores it into `graph`.
    ///
    /// A pending edit is committed first. Returns false at the oldest entry.
    pub fn undo(&mut self, graph: &mut Graph) -> CoreResult<bool> {
        self.flush();
        if self.cursor == 0 {
            return Ok(false);
        }
        self.restore(self.cursor - 1, graph)?;
        Ok(true)
    }

    /// Steps forward one entry and restores it into `graph`.
    ///
    /// Returns false at the newest entry.
    pub fn redo(&mut self, graph: &mut Graph) -> CoreResult<bool> {
        self.flush();
        if self.cursor + 1 >= self.entries.len() {
            return Ok(false);
        }
        self.restore(self.cursor + 1, graph)?;
        Ok(true)
    }

    /// Reconfigures `graph` from entry `target`; the cursor moves only on success.
    fn restore(&mut self, target: usize, graph: &mut Graph) -> CoreResult<()> {
        let json = self
            .entries
            .get(target)
            .ok_or_else(|| CoreError::StaleSnapshot(format!("no entry at {target}")))?;

        let doc = match SerializedGraph::from_json(json) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::error!(index = target, error = %e, "stale snapshot, restore skipped");
                return Err(CoreError::StaleSnapshot(e.to_string()));
            }
        };

        graph.configure(&doc)?;

        self.cursor = target;
        tracing::debug!(cursor = self.cursor, "snapshot restored");
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Serialization at the cursor
    pub fn current_state(&self) -> Option<&str> {
        self.entries.get(self.cursor).map(String::as_str)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }
}
