// ============================================================================
// HISTORY: full-document snapshots on a bounded, branch-truncating stack
// ============================================================================

use std::collections::VecDeque;

use crate::canvas::{Document, Layer};

// ============================================================================
// HISTORY STATE - immutable deep copy of the document
// ============================================================================

/// Canvas size plus every layer (visible or hidden) with its own pixel copy.
/// Never mutated after capture; restoring clones out of it.
#[derive(Clone, Debug)]
pub struct HistoryState {
    description: String,
    width: u32,
    height: u32,
    layers: Vec<Layer>,
    memory: usize,
}

impl HistoryState {
    pub fn capture(doc: &Document, description: impl Into<String>) -> Self {
        let layers = doc.layers().to_vec();
        let memory = layers.iter().map(|l| l.pixels.memory_bytes()).sum();
        Self {
            description: description.into(),
            width: doc.width(),
            height: doc.height(),
            layers,
            memory,
        }
    }

    /// Replace the live document's size and layers with copies of this state.
    pub fn restore_into(&self, doc: &mut Document) {
        doc.replace_all(self.width, self.height, self.layers.clone());
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn memory_bytes(&self) -> usize {
        self.memory
    }
}

// ============================================================================
// HISTORY MANAGER - step pointer over the snapshot stack
// ============================================================================

/// Undo/redo history with a length cap and optional memory cap.
#[derive(Debug)]
pub struct HistoryManager {
    states: VecDeque<HistoryState>,
    step: usize,
    max_history_size: usize,
    /// Optional memory cap in bytes. The current state is never evicted.
    max_memory_bytes: Option<usize>,
    total_memory: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(20)
    }
}

impl HistoryManager {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            states: VecDeque::new(),
            step: 0,
            max_history_size: max_history_size.max(1),
            max_memory_bytes: None,
            total_memory: 0,
        }
    }

    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.max_memory_bytes = Some(bytes);
        self
    }

    /// Capture the document and push it as the new current state.
    pub fn snapshot(&mut self, doc: &Document, description: &str) {
        self.push(HistoryState::capture(doc, description));
    }

    pub fn push(&mut self, state: HistoryState) {
        // Drop the redo branch
        if !self.states.is_empty() {
            for dropped in self.states.drain(self.step + 1..) {
                self.total_memory = self.total_memory.saturating_sub(dropped.memory_bytes());
            }
        }

        tracing::debug!(description = state.description(), bytes = state.memory_bytes(), "History snapshot");
        self.total_memory += state.memory_bytes();
        self.states.push_back(state);
        self.prune();
        self.step = self.states.len() - 1;
    }

    /// Step back one state. Returns `false` when already at the oldest.
    pub fn undo(&mut self, doc: &mut Document) -> bool {
        if self.states.is_empty() || self.step == 0 {
            return false;
        }
        self.step -= 1;
        self.states[self.step].restore_into(doc);
        true
    }

    /// Step forward one state. Returns `false` when already at the newest.
    pub fn redo(&mut self, doc: &mut Document) -> bool {
        if self.step + 1 >= self.states.len() {
            return false;
        }
        self.step += 1;
        self.states[self.step].restore_into(doc);
        true
    }

    /// Jump straight to `step` (0 = oldest retained state).
    pub fn undo_to(&mut self, step: usize, doc: &mut Document) -> bool {
        if step >= self.states.len() || step == self.step {
            return false;
        }
        self.step = step;
        self.states[step].restore_into(doc);
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.states.is_empty() && self.step > 0
    }

    pub fn can_redo(&self) -> bool {
        self.step + 1 < self.states.len()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn max_len(&self) -> usize {
        self.max_history_size
    }

    pub fn current(&self) -> Option<&HistoryState> {
        self.states.get(self.step)
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.can_undo().then(|| self.states[self.step].description())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.states.get(self.step + 1).map(|s| s.description())
    }

    /// Descriptions oldest first.
    pub fn descriptions(&self) -> Vec<&str> {
        self.states.iter().map(|s| s.description()).collect()
    }

    /// Bytes of pixel data retained by all states (O(1) via cached total).
    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    pub fn clear(&mut self) {
        self.states.clear();
        self.step = 0;
        self.total_memory = 0;
    }

    /// Evict oldest states until within limits. Runs right after a push, so
    /// the newest state is the current one and always survives.
    fn prune(&mut self) {
        while self.states.len() > self.max_history_size {
            self.evict_oldest();
        }
        if let Some(max_bytes) = self.max_memory_bytes {
            while self.total_memory > max_bytes && self.states.len() > 1 {
                self.evict_oldest();
            }
        }
    }

    fn evict_oldest(&mut self) {
        if let Some(removed) = self.states.pop_front() {
            self.total_memory = self.total_memory.saturating_sub(removed.memory_bytes());
        }
    }
}
