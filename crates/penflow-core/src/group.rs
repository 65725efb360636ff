//! Grouping: combine, uncombine and reparenting.
//!
//! Grouped children keep their rect as fractions of the container, so
//! moving or resizing the container carries them along. Every operation
//! here returns the history entry that undoes it; the caller decides
//! whether to record it.

use crate::history::HistoryEntry;
use crate::pen::{LockState, Pen, PenId, PenType, generate_id};
use crate::rect::{bounding_rect, calc_relative_rect};
use crate::store::PenStore;

/// Name of containers synthesized by `combine`.
pub const COMBINE_NAME: &str = "combine";

const SIZE_TOLERANCE: f64 = 1e-9;

/// Result of [`combine`].
#[derive(Debug, Clone)]
pub struct Combined {
    pub container: PenId,
    /// Whether the container was synthesized.
    pub created: bool,
    pub entry: Option<HistoryEntry>,
}

/// Result of [`uncombine`].
#[derive(Debug, Clone)]
pub struct Uncombined {
    pub released: Vec<PenId>,
    /// The synthetic container, if it was deleted.
    pub deleted: Option<Pen>,
    pub entry: HistoryEntry,
}

/// Whether `ancestor` is `id` or one of its parents.
pub fn is_ancestor(store: &PenStore, ancestor: &str, id: &str) -> bool {
    let mut seen: Vec<&str> = Vec::new();
    let mut cursor = Some(id);
    while let Some(current) = cursor {
        if current == ancestor {
            return true;
        }
        if seen.contains(&current) {
            return false;
        }
        seen.push(current);
        cursor = store.get(current).and_then(|p| p.parent_id.as_deref());
    }
    false
}

/// Reparent `children` into `parent`.
///
/// Each child is detached from any previous parent, appended to the
/// parent's child list, converted to a rect relative to the parent's world
/// rect and locked against moving. Children already under `parent`, unknown
/// ids and moves that would create a cycle are skipped. Returns the ids of
/// every pen that changed (parents included).
pub fn push_children(store: &mut PenStore, parent: &str, children: &[PenId]) -> Vec<PenId> {
    let Some(parent_rect) = store.world_rect(parent) else {
        return Vec::new();
    };
    let mut touched: Vec<PenId> = Vec::new();
    fn touch(id: &str, touched: &mut Vec<PenId>) {
        if !touched.iter().any(|t| t == id) {
            touched.push(id.to_string());
        }
    }

    for child in children {
        let Some(pen) = store.get(child) else {
            continue;
        };
        if pen.parent_id.as_deref() == Some(parent) || is_ancestor(store, child, parent) {
            continue;
        }
        let world = pen.calculative.world_rect;
        if let Some(previous) = pen.parent_id.clone() {
            if let Some(prev) = store.get_mut(&previous) {
                prev.children.retain(|c| c != child);
                touch(&previous, &mut touched);
            }
        }
        if let Some(pen) = store.get_mut(child) {
            pen.parent_id = Some(parent.to_string());
            pen.set_rect(calc_relative_rect(world, parent_rect));
            pen.locked = LockState::DisableMove;
        }
        if let Some(parent_pen) = store.get_mut(parent) {
            parent_pen.children.push(child.clone());
        }
        touch(child, &mut touched);
        touch(parent, &mut touched);
    }
    if !touched.is_empty() {
        store.dirty_pen_rect(parent);
    }
    touched
}

/// Group pens under one container.
///
/// A single connector is turned into a node instead. Otherwise an input pen
/// whose size equals the bounding rect of the set becomes the container;
/// when none does, a `combine` pen is synthesized on top. The other pens
/// become locked children of type node.
pub fn combine(store: &mut PenStore, ids: &[PenId]) -> Option<Combined> {
    let ids: Vec<PenId> = ids.iter().filter(|id| store.contains(id)).cloned().collect();
    let first = ids.first()?.clone();

    if ids.len() == 1 {
        let initial = store.snapshot(&ids);
        let pen = store.get_mut(&first)?;
        if !pen.is_line() {
            return Some(Combined {
                container: first,
                created: false,
                entry: None,
            });
        }
        pen.pen_type = PenType::Node;
        store.make_calculative(&first);
        let pens = store.snapshot(&ids);
        return Some(Combined {
            container: first,
            created: false,
            entry: Some(HistoryEntry::Update { initial, pens }),
        });
    }

    let rect = bounding_rect(ids.iter().filter_map(|id| store.world_rect(id)))?;
    let existing = ids.iter().find(|id| {
        store.world_rect(id).is_some_and(|r| {
            (r.width() - rect.width()).abs() <= SIZE_TOLERANCE
                && (r.height() - rect.height()).abs() <= SIZE_TOLERANCE
        })
    });

    let mut entries = Vec::new();
    let (container, created) = match existing {
        Some(id) => (id.clone(), false),
        None => {
            let pen = Pen::node(generate_id(), rect.x0, rect.y0, rect.width(), rect.height())
                .with_name(COMBINE_NAME);
            let id = store.insert(pen)?;
            entries.push(HistoryEntry::Add {
                pens: store.snapshot(std::slice::from_ref(&id)),
            });
            (id, true)
        }
    };

    let children: Vec<PenId> = ids.iter().filter(|id| **id != container).cloned().collect();
    let mut involved: Vec<PenId> = vec![container.clone()];
    for child in &children {
        involved.push(child.clone());
        if let Some(prev) = store.get(child).and_then(|p| p.parent_id.clone()) {
            if !involved.contains(&prev) {
                involved.push(prev);
            }
        }
    }
    let initial = store.snapshot(&involved);

    let touched = push_children(store, &container, &children);
    for child in &children {
        if let Some(pen) = store.get_mut(child) {
            if pen.pen_type != PenType::Node {
                pen.pen_type = PenType::Node;
            }
        }
    }
    store.dirty_pen_rect(&container);
    log::debug!(
        "Combined {} pen(s) under {} ({})",
        children.len(),
        container,
        if created { "new" } else { "existing" }
    );

    if !touched.is_empty() {
        entries.push(HistoryEntry::Update {
            initial,
            pens: store.snapshot(&involved),
        });
    }
    let entry = match entries.len() {
        0 => None,
        1 => entries.pop(),
        _ => Some(HistoryEntry::Batch(entries)),
    };
    Some(Combined {
        container,
        created,
        entry,
    })
}

/// Dissolve a group.
///
/// Children get their absolute rect back from their last world rect, lose
/// their parent and lock, and are deselected. A synthetic `combine`
/// container is deleted. `None` when the pen has no children.
pub fn uncombine(store: &mut PenStore, id: &str) -> Option<Uncombined> {
    let container = store.get(id)?;
    if container.children.is_empty() {
        return None;
    }
    let children = container.children.clone();
    let synthetic = container.name == COMBINE_NAME;

    let mut involved = vec![id.to_string()];
    involved.extend(children.iter().cloned());
    let initial = store.snapshot(&involved);

    let mut released = Vec::new();
    for child in &children {
        let Some(world) = store.world_rect(child) else {
            continue;
        };
        if let Some(pen) = store.get_mut(child) {
            pen.set_rect(world);
            pen.parent_id = None;
            pen.locked = LockState::None;
            released.push(child.clone());
        }
        store.deselect(child);
    }
    if let Some(pen) = store.get_mut(id) {
        pen.children.clear();
    }
    for child in &released {
        store.dirty_pen_rect(child);
    }

    let update = HistoryEntry::Update {
        initial,
        pens: store.snapshot(&involved),
    };
    let (deleted, entry) = if synthetic {
        match store.remove(id) {
            Some((pos, pen)) => (
                Some(pen.clone()),
                HistoryEntry::Batch(vec![update, HistoryEntry::Delete { pens: vec![(pos, pen)] }]),
            ),
            None => (None, update),
        }
    } else {
        (None, update)
    };
    Some(Uncombined {
        released,
        deleted,
        entry,
    })
}
