//! Undo/redo history.
//!
//! Each entry holds enough pen snapshots to invert the edit exactly. Bulk
//! edits push a single entry so one undo reverses the whole batch.

use crate::paint_order::PaintOrder;
use crate::pen::{Pen, PenId};
use crate::store::PenStore;

/// A reversible edit.
#[derive(Debug, Clone)]
pub enum HistoryEntry {
    /// Pens that were added.
    Add { pens: Vec<Pen> },
    /// Pens before (`initial`) and after (`pens`) an in-place change.
    Update { initial: Vec<Pen>, pens: Vec<Pen> },
    /// Removed pens with their paint position at removal time, in removal
    /// order.
    Delete { pens: Vec<(usize, Pen)> },
    /// Paint order before and after a layer move.
    Reorder { initial: Vec<PenId>, order: Vec<PenId> },
    /// Several edits undone and redone together.
    Batch(Vec<HistoryEntry>),
}

impl HistoryEntry {
    fn revert(&self, store: &mut PenStore) {
        match self {
            HistoryEntry::Add { pens } => {
                for pen in pens.iter().rev() {
                    store.remove(&pen.id);
                }
            }
            HistoryEntry::Update { initial, .. } => restore(store, initial),
            HistoryEntry::Delete { pens } => {
                for (pos, pen) in pens.iter().rev() {
                    store.insert_at(*pos, pen.clone());
                }
                store.rebuild_all();
            }
            HistoryEntry::Reorder { initial, .. } => {
                *store.order_mut() = PaintOrder::from_ids(initial.clone());
            }
            HistoryEntry::Batch(entries) => {
                for entry in entries.iter().rev() {
                    entry.revert(store);
                }
            }
        }
    }

    /// Point every reference to pen `old` at `new`.
    fn rename(&mut self, old: &str, new: &str) {
        match self {
            HistoryEntry::Add { pens } => {
                for pen in pens {
                    pen.rename_refs(old, new);
                }
            }
            HistoryEntry::Update { initial, pens } => {
                for pen in initial.iter_mut().chain(pens.iter_mut()) {
                    pen.rename_refs(old, new);
                }
            }
            HistoryEntry::Delete { pens } => {
                for (_, pen) in pens {
                    pen.rename_refs(old, new);
                }
            }
            HistoryEntry::Reorder { initial, order } => {
                for id in initial.iter_mut().chain(order.iter_mut()) {
                    if id.as_str() == old {
                        *id = new.to_string();
                    }
                }
            }
            HistoryEntry::Batch(entries) => {
                for entry in entries {
                    entry.rename(old, new);
                }
            }
        }
    }

    fn apply(&self, store: &mut PenStore) {
        match self {
            HistoryEntry::Add { pens } => {
                for pen in pens {
                    store.insert(pen.clone());
                }
                store.rebuild_all();
            }
            HistoryEntry::Update { pens, .. } => restore(store, pens),
            HistoryEntry::Delete { pens } => {
                for (_, pen) in pens {
                    store.remove(&pen.id);
                }
            }
            HistoryEntry::Reorder { order, .. } => {
                *store.order_mut() = PaintOrder::from_ids(order.clone());
            }
            HistoryEntry::Batch(entries) => {
                for entry in entries {
                    entry.apply(store);
                }
            }
        }
    }
}

fn restore(store: &mut PenStore, pens: &[Pen]) {
    for pen in pens {
        if !store.replace(pen.clone()) {
            store.insert(pen.clone());
        }
    }
    store.rebuild_all();
}

/// Undo and redo stacks.
#[derive(Debug, Clone, Default)]
pub struct History {
    undo_stack: Vec<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    /// Maximum undo depth; 0 keeps everything.
    limit: usize,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
        self.trim();
    }

    /// Follow a pen rename through both stacks.
    pub fn rename(&mut self, old: &str, new: &str) {
        for entry in self.undo_stack.iter_mut().chain(self.redo_stack.iter_mut()) {
            entry.rename(old, new);
        }
    }

    /// Record an edit that has already been applied. Clears the redo stack.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.undo_stack.push(entry);
        self.redo_stack.clear();
        self.trim();
    }

    fn trim(&mut self) {
        if self.limit > 0 && self.undo_stack.len() > self.limit {
            let excess = self.undo_stack.len() - self.limit;
            self.undo_stack.drain(..excess);
        }
    }

    /// Undo the last edit. Returns false if there was nothing to undo.
    pub fn undo(&mut self, store: &mut PenStore) -> bool {
        match self.undo_stack.pop() {
            Some(entry) => {
                entry.revert(store);
                self.redo_stack.push(entry);
                true
            }
            None => false,
        }
    }

    /// Redo the last undone edit. Returns false if there was nothing to redo.
    pub fn redo(&mut self, store: &mut PenStore) -> bool {
        match self.redo_stack.pop() {
            Some(entry) => {
                entry.apply(store);
                self.undo_stack.push(entry);
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}
