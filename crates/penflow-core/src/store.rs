//! Canonical store of pens.
//!
//! Holds the id → pen map, the paint order, the selection and the set of
//! animating pens, and keeps every pen's runtime cache in step with its
//! persisted fields.

use crate::paint_order::PaintOrder;
use crate::pen::{Pen, PenId, calc_text_lines, generate_id, is_mirrored};
use crate::rect::{bounding_rect, calc_relative_rect, calc_world_rect};
use kurbo::{Point, Rect};
use serde_json::Value;
use std::collections::HashMap;

/// All pens of a document plus their runtime sets.
#[derive(Debug, Clone, Default)]
pub struct PenStore {
    pens: HashMap<PenId, Pen>,
    order: PaintOrder,
    active: Vec<PenId>,
    animates: Vec<PenId>,
}

impl PenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pens.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pens.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Pen> {
        self.pens.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Pen> {
        self.pens.get_mut(id)
    }

    pub fn order(&self) -> &PaintOrder {
        &self.order
    }

    pub fn order_mut(&mut self) -> &mut PaintOrder {
        &mut self.order
    }

    /// Pens in paint order (back to front).
    pub fn iter(&self) -> impl Iterator<Item = &Pen> {
        self.order.paint_iter().filter_map(|id| self.pens.get(id))
    }

    /// All ids in paint order.
    pub fn ids(&self) -> Vec<PenId> {
        self.order.ids().to_vec()
    }

    /// Pens whose id equals `key` or whose tags contain it, in paint order.
    /// Tags are not unique, so several pens may match.
    pub fn find(&self, key: &str) -> Vec<PenId> {
        self.iter()
            .filter(|p| p.id == key || p.has_tag(key))
            .map(|p| p.id.clone())
            .collect()
    }

    /// Insert a pen on top. A missing id is generated; a duplicate id is
    /// rejected. The runtime cache is rebuilt.
    pub fn insert(&mut self, pen: Pen) -> Option<PenId> {
        let index = self.order.len();
        self.insert_at(index, pen)
    }

    /// Insert a pen at a paint position.
    pub fn insert_at(&mut self, index: usize, mut pen: Pen) -> Option<PenId> {
        if pen.id.is_empty() {
            pen.id = generate_id();
        }
        if self.pens.contains_key(&pen.id) {
            log::warn!("Rejecting pen with duplicate id {}", pen.id);
            return None;
        }
        let id = pen.id.clone();
        self.order.insert(index, id.clone());
        self.pens.insert(id.clone(), pen);
        self.make_calculative(&id);
        Some(id)
    }

    /// Replace a pen's persisted fields with `pen` (same id), keeping its
    /// paint position, and rebuild its cache. Selection and the animation
    /// clock stay with the live pen.
    pub fn replace(&mut self, pen: Pen) -> bool {
        let id = pen.id.clone();
        if !self.pens.contains_key(&id) {
            return false;
        }
        let active = self.active.contains(&id);
        let animation = self
            .pens
            .insert(id.clone(), pen)
            .map(|old| old.calculative.animation)
            .unwrap_or_default();
        self.make_calculative(&id);
        if let Some(p) = self.pens.get_mut(&id) {
            p.calculative.active = active;
            p.calculative.animation = animation;
        }
        true
    }

    /// Remove a pen, returning its former paint position and value. The pen
    /// is detached from its parent's child list.
    pub fn remove(&mut self, id: &str) -> Option<(usize, Pen)> {
        let pen = self.pens.remove(id)?;
        let pos = self.order.remove(id).unwrap_or(0);
        self.active.retain(|a| a != id);
        self.animates.retain(|a| a != id);
        if let Some(parent) = pen.parent_id.as_deref().and_then(|p| self.pens.get_mut(p)) {
            parent.children.retain(|c| c != id);
        }
        Some((pos, pen))
    }

    pub fn clear(&mut self) {
        self.pens.clear();
        self.order.clear();
        self.active.clear();
        self.animates.clear();
    }

    /// Clone the given pens, skipping unknown ids.
    pub fn snapshot(&self, ids: &[PenId]) -> Vec<Pen> {
        ids.iter().filter_map(|id| self.pens.get(id).cloned()).collect()
    }

    pub fn parent_of(&self, id: &str) -> Option<&Pen> {
        let parent = self.pens.get(id)?.parent_id.as_deref()?;
        self.pens.get(parent)
    }

    /// Rebuild a pen's runtime cache from its persisted fields.
    pub fn make_calculative(&mut self, id: &str) {
        let Some(pen) = self.pens.get_mut(id) else {
            return;
        };
        let mut values = serde_json::Map::new();
        if let Ok(Value::Object(map)) = serde_json::to_value(&*pen) {
            for (k, v) in map {
                if is_mirrored(&k, &v) {
                    values.insert(k, v);
                }
            }
        }
        pen.calculative.values = values;
        calc_text_lines(pen);
        self.dirty_pen_rect(id);
    }

    /// Rebuild every cache. Nodes first so connectors resolve against
    /// up-to-date node rects.
    pub fn rebuild_all(&mut self) {
        let ids = self.ids();
        for id in &ids {
            self.make_calculative(id);
        }
        let lines: Vec<PenId> = ids
            .into_iter()
            .filter(|id| self.pens.get(id).is_some_and(|p| p.is_line()))
            .collect();
        for id in &lines {
            self.calc_line_geometry(id);
        }
    }

    /// Recompute the world rect of a pen and its descendants, mark them
    /// dirty and refresh connectors attached to them.
    pub fn dirty_pen_rect(&mut self, id: &str) {
        let mut stack = vec![id.to_string()];
        let mut seen = Vec::new();
        while let Some(current) = stack.pop() {
            if seen.contains(&current) {
                continue;
            }
            seen.push(current.clone());

            let Some(pen) = self.pens.get(&current) else {
                continue;
            };
            if pen.is_line() {
                self.calc_line_geometry(&current);
                continue;
            }
            let rect = self.compute_world_rect(&current);
            let children = match self.pens.get_mut(&current) {
                Some(pen) => {
                    pen.calculative.world_rect = rect;
                    pen.calculative.dirty = true;
                    pen.children.clone()
                }
                None => continue,
            };
            self.update_lines(&current);
            stack.extend(children);
        }
    }

    /// World rect following the parent chain. A cyclic chain stops at the
    /// first repeated ancestor.
    fn compute_world_rect(&self, id: &str) -> Rect {
        let mut chain = Vec::new();
        let mut cursor = self.pens.get(id);
        while let Some(pen) = cursor {
            if chain.iter().any(|p: &&Pen| p.id == pen.id) {
                break;
            }
            chain.push(pen);
            cursor = pen.parent_id.as_deref().and_then(|p| self.pens.get(p));
        }
        let mut rect: Option<Rect> = None;
        for pen in chain.iter().rev() {
            rect = Some(match rect {
                Some(parent) => calc_world_rect(pen.rect(), parent),
                None => pen.rect(),
            });
        }
        rect.unwrap_or(Rect::ZERO)
    }

    /// Recompute geometry of every connector bound to `node`.
    pub fn update_lines(&mut self, node: &str) {
        let lines: Vec<PenId> = self
            .pens
            .values()
            .filter(|p| p.is_line() && p.touches(node))
            .map(|p| p.id.clone())
            .collect();
        for line in lines {
            self.calc_line_geometry(&line);
        }
    }

    /// Resolve a connector's points: bound anchors follow the center of
    /// their node, free anchors use their own coordinates.
    fn calc_line_geometry(&mut self, id: &str) {
        let Some(line) = self.pens.get(id) else {
            return;
        };
        let points: Vec<Point> = line
            .anchors
            .iter()
            .map(|a| {
                a.connect_to
                    .as_deref()
                    .and_then(|n| self.pens.get(n))
                    .filter(|n| !n.is_line())
                    .map(|n| n.calculative.world_rect.center())
                    .unwrap_or(Point::new(a.x, a.y))
            })
            .collect();
        let rect = bounding_rect(points.iter().map(|p| Rect::from_points(*p, *p)))
            .unwrap_or_else(|| line.rect());
        if let Some(line) = self.pens.get_mut(id) {
            line.calculative.world_anchors = points;
            line.calculative.world_rect = rect;
            line.calculative.dirty = true;
        }
    }

    pub fn world_rect(&self, id: &str) -> Option<Rect> {
        self.pens.get(id).map(|p| p.calculative.world_rect)
    }

    /// Place a pen at a world rect. A child stores it relative to its
    /// parent.
    pub fn set_world_rect(&mut self, id: &str, rect: Rect) {
        let parent_rect = self.parent_of(id).map(|p| p.calculative.world_rect);
        let Some(pen) = self.pens.get_mut(id) else {
            return;
        };
        match parent_rect {
            Some(parent) => pen.set_rect(calc_relative_rect(rect, parent)),
            None => pen.set_rect(rect),
        }
        self.make_calculative(id);
    }

    // --- Selection ---

    pub fn active(&self) -> &[PenId] {
        &self.active
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.active.iter().any(|a| a == id)
    }

    /// Replace the selection, returning the ids that were deselected.
    pub fn set_active(&mut self, ids: &[PenId]) -> Vec<PenId> {
        let previous = self.clear_active();
        for id in ids {
            if let Some(pen) = self.pens.get_mut(id) {
                pen.calculative.active = true;
                if !self.active.contains(id) {
                    self.active.push(id.clone());
                }
            }
        }
        previous.into_iter().filter(|p| !ids.contains(p)).collect()
    }

    /// Clear the selection, returning the previously selected ids.
    pub fn clear_active(&mut self) -> Vec<PenId> {
        let previous = std::mem::take(&mut self.active);
        for id in &previous {
            if let Some(pen) = self.pens.get_mut(id) {
                pen.calculative.active = false;
            }
        }
        previous
    }

    pub fn deselect(&mut self, id: &str) {
        self.active.retain(|a| a != id);
        if let Some(pen) = self.pens.get_mut(id) {
            pen.calculative.active = false;
        }
    }

    // --- Animating set ---

    pub fn animates(&self) -> &[PenId] {
        &self.animates
    }

    pub fn is_animating(&self, id: &str) -> bool {
        self.animates.iter().any(|a| a == id)
    }

    pub fn add_animating(&mut self, id: &str) {
        if self.pens.contains_key(id) && !self.is_animating(id) {
            self.animates.push(id.to_string());
        }
    }

    pub fn remove_animating(&mut self, id: &str) {
        self.animates.retain(|a| a != id);
    }

    /// Rename a pen, rewriting every reference to it. Fails when `old` does
    /// not resolve to exactly one pen, `new` already resolves to one, or
    /// the ids are equal.
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        if old == new || new.is_empty() {
            return false;
        }
        let matches = self.find(old);
        if matches.len() != 1 || matches[0] != old || !self.find(new).is_empty() {
            return false;
        }
        let Some(pen) = self.pens.remove(old) else {
            return false;
        };
        self.pens.insert(new.to_string(), pen);
        self.order.rename(old, new);

        let rename_in = |ids: &mut Vec<PenId>| {
            for id in ids.iter_mut().filter(|id| id.as_str() == old) {
                *id = new.to_string();
            }
        };
        rename_in(&mut self.active);
        rename_in(&mut self.animates);

        for pen in self.pens.values_mut() {
            pen.rename_refs(old, new);
        }
        true
    }
}
