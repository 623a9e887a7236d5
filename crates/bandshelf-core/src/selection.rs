//! Selection model for the import picker.
//!
//! Defines the contract the progress UI builds on: per-candidate checkbox
//! selection with a tri-state "select all" indicator, and the running
//! textual summary of batch counts. The tracker works on cloned candidate
//! snapshots; it never touches orchestrator state.

use serde::{Deserialize, Serialize};

use crate::import::{BatchStats, ImportCandidate};

/// Tri-state value of the "select all" indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectAllState {
    /// No candidate is selected.
    None,
    /// Some but not all candidates are selected.
    Some,
    /// Every candidate is selected.
    All,
}

/// Checkbox selection over a list of import candidates.
///
/// Candidates keep their list order; the selected subset is returned in
/// that order, which is the order the batch will start in.
#[derive(Debug, Clone, Default)]
pub struct SelectionTracker {
    candidates: Vec<ImportCandidate>,
    selected: Vec<bool>,
}

impl SelectionTracker {
    /// Create a tracker over the given candidates, none selected.
    #[must_use]
    pub fn new(candidates: Vec<ImportCandidate>) -> Self {
        let selected = vec![false; candidates.len()];
        Self {
            candidates,
            selected,
        }
    }

    /// Number of candidates in the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Check whether the candidate list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Number of selected candidates.
    #[must_use]
    pub fn selected_count(&self) -> usize {
        self.selected.iter().filter(|&&s| s).count()
    }

    /// Check whether the candidate at `index` is selected.
    #[must_use]
    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.get(index).copied().unwrap_or(false)
    }

    /// Toggle the candidate at `index`. Out-of-range indices are ignored.
    pub fn toggle(&mut self, index: usize) {
        if let Some(slot) = self.selected.get_mut(index) {
            *slot = !*slot;
        }
    }

    /// Select every candidate.
    pub fn select_all(&mut self) {
        self.selected.fill(true);
    }

    /// Deselect every candidate.
    pub fn clear(&mut self) {
        self.selected.fill(false);
    }

    /// Toggle the "select all" checkbox: selects everything unless
    /// everything is already selected, in which case it clears.
    pub fn toggle_all(&mut self) {
        if self.select_all_state() == SelectAllState::All {
            self.clear();
        } else {
            self.select_all();
        }
    }

    /// Current tri-state value of the "select all" indicator.
    #[must_use]
    pub fn select_all_state(&self) -> SelectAllState {
        let count = self.selected_count();
        if count == 0 {
            SelectAllState::None
        } else if count == self.candidates.len() {
            SelectAllState::All
        } else {
            SelectAllState::Some
        }
    }

    /// The selected candidates, cloned in list order.
    #[must_use]
    pub fn selected(&self) -> Vec<ImportCandidate> {
        self.candidates
            .iter()
            .zip(&self.selected)
            .filter(|&(_, &selected)| selected)
            .map(|(candidate, _)| candidate.clone())
            .collect()
    }
}

/// Render the running batch summary shown next to the progress list.
#[must_use]
pub fn summary_line(stats: &BatchStats) -> String {
    format!(
        "{} succeeded, {} failed, {} in progress",
        stats.succeeded,
        stats.failed,
        stats.in_progress + stats.pending
    )
}
