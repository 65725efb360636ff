//! Paint order of pens.
//!
//! One ordered sequence serves two roles: pens are painted back to front
//! (later entries on top) and hit-tested front to back.

use crate::pen::PenId;

/// Ordered pen ids, back to front.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaintOrder {
    ids: Vec<PenId>,
}

impl PaintOrder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids(ids: Vec<PenId>) -> Self {
        Self { ids }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[PenId] {
        &self.ids
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.ids.iter().position(|p| p == id)
    }

    /// Ids in paint order (back to front).
    pub fn paint_iter(&self) -> impl Iterator<Item = &PenId> {
        self.ids.iter()
    }

    /// Ids in hit-test priority (front to back).
    pub fn hit_iter(&self) -> impl Iterator<Item = &PenId> {
        self.ids.iter().rev()
    }

    /// Append on top.
    pub fn push(&mut self, id: PenId) {
        self.ids.push(id);
    }

    /// Insert at `index`, clamped to the end.
    pub fn insert(&mut self, index: usize, id: PenId) {
        let index = index.min(self.ids.len());
        self.ids.insert(index, id);
    }

    /// Remove an id, returning its former position.
    pub fn remove(&mut self, id: &str) -> Option<usize> {
        let pos = self.position(id)?;
        self.ids.remove(pos);
        Some(pos)
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Replace an id in place.
    pub fn rename(&mut self, old: &str, new: &str) {
        if let Some(pos) = self.position(old) {
            self.ids[pos] = new.to_string();
        }
    }

    /// Bring to the front (painted last).
    pub fn top(&mut self, id: &str) -> bool {
        match self.remove(id) {
            Some(_) => {
                self.ids.push(id.to_string());
                true
            }
            None => false,
        }
    }

    /// Send to the back (painted first).
    pub fn bottom(&mut self, id: &str) -> bool {
        match self.remove(id) {
            Some(_) => {
                self.ids.insert(0, id.to_string());
                true
            }
            None => false,
        }
    }

    /// Move one step towards the front. No-op when already on top.
    pub fn up(&mut self, id: &str) -> bool {
        match self.position(id) {
            Some(pos) if pos + 1 < self.ids.len() => {
                self.ids.swap(pos, pos + 1);
                true
            }
            _ => false,
        }
    }

    /// Move one step towards the back. No-op when already at the bottom.
    pub fn down(&mut self, id: &str) -> bool {
        match self.position(id) {
            Some(pos) if pos > 0 => {
                self.ids.swap(pos, pos - 1);
                true
            }
            _ => false,
        }
    }

    /// Relocate to `to_index` (clamped), shifting the pens in between by one.
    /// The pen ends up exactly at `to_index`.
    pub fn set_layer(&mut self, id: &str, to_index: usize) -> bool {
        let Some(pos) = self.position(id) else {
            return false;
        };
        let to_index = to_index.min(self.ids.len() - 1);
        if pos == to_index {
            return false;
        }
        let moved = self.ids.remove(pos);
        self.ids.insert(to_index, moved);
        true
    }
}
