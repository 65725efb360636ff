//! Best-effort layout helpers and viewport math.
//!
//! Node helpers ignore connectors (their geometry follows the nodes) and
//! return one Update entry covering every pen they moved, so a single undo
//! reverses the whole batch.

use crate::history::HistoryEntry;
use crate::pen::PenId;
use crate::rect::bounding_rect;
use crate::store::PenStore;
use kurbo::{Point, Rect, Size, Vec2};

/// Alignment target for [`align_nodes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
    Top,
    Bottom,
    /// Horizontal centers.
    Center,
    /// Vertical centers.
    Middle,
}

impl Align {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "left" => Some(Align::Left),
            "right" => Some(Align::Right),
            "top" => Some(Align::Top),
            "bottom" => Some(Align::Bottom),
            "center" => Some(Align::Center),
            "middle" => Some(Align::Middle),
            _ => None,
        }
    }
}

/// View padding: top, right, bottom, left.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Padding {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl From<f64> for Padding {
    fn from(v: f64) -> Self {
        Self {
            top: v,
            right: v,
            bottom: v,
            left: v,
        }
    }
}

impl From<[f64; 2]> for Padding {
    fn from([vertical, horizontal]: [f64; 2]) -> Self {
        Self {
            top: vertical,
            right: horizontal,
            bottom: vertical,
            left: horizontal,
        }
    }
}

impl From<[f64; 4]> for Padding {
    fn from([top, right, bottom, left]: [f64; 4]) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }
}

/// Bounding world rect of `ids`, or of every pen when `ids` is `None`.
pub fn get_rect(store: &PenStore, ids: Option<&[PenId]>) -> Option<Rect> {
    match ids {
        Some(ids) => bounding_rect(ids.iter().filter_map(|id| store.world_rect(id))),
        None => bounding_rect(store.iter().map(|p| p.calculative.world_rect)),
    }
}

fn nodes(store: &PenStore, ids: Option<&[PenId]>) -> Vec<PenId> {
    let all;
    let ids = match ids {
        Some(ids) => ids,
        None => {
            all = store.ids();
            &all
        }
    };
    ids.iter()
        .filter(|id| store.get(id).is_some_and(|p| !p.is_line()))
        .cloned()
        .collect()
}

/// Snapshot `ids`, run `f`, and return an Update entry if anything moved.
fn bulk_update(
    store: &mut PenStore,
    ids: &[PenId],
    f: impl FnOnce(&mut PenStore),
) -> Option<HistoryEntry> {
    if ids.is_empty() {
        return None;
    }
    let initial = store.snapshot(ids);
    f(store);
    let pens = store.snapshot(ids);
    let changed = initial
        .iter()
        .zip(&pens)
        .any(|(a, b)| a.to_persisted() != b.to_persisted());
    changed.then_some(HistoryEntry::Update { initial, pens })
}

fn move_to(store: &mut PenStore, id: &str, origin: Point) {
    if let Some(rect) = store.world_rect(id) {
        store.set_world_rect(id, Rect::from_origin_size(origin, rect.size()));
    }
}

/// Align nodes against `rect` (default: the bounding rect of the whole
/// document).
pub fn align_nodes(
    store: &mut PenStore,
    align: Align,
    ids: Option<&[PenId]>,
    rect: Option<Rect>,
) -> Option<HistoryEntry> {
    let rect = rect.or_else(|| get_rect(store, None))?;
    let targets = nodes(store, ids);
    bulk_update(store, &targets, |store| {
        for id in &targets {
            let Some(r) = store.world_rect(id) else {
                continue;
            };
            let origin = match align {
                Align::Left => Point::new(rect.x0, r.y0),
                Align::Right => Point::new(rect.x1 - r.width(), r.y0),
                Align::Top => Point::new(r.x0, rect.y0),
                Align::Bottom => Point::new(r.x0, rect.y1 - r.height()),
                Align::Center => Point::new(rect.center().x - r.width() / 2.0, r.y0),
                Align::Middle => Point::new(r.x0, rect.center().y - r.height() / 2.0),
            };
            move_to(store, id, origin);
        }
    })
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    Horizontal,
    Vertical,
}

fn space_between_by(
    store: &mut PenStore,
    axis: Axis,
    ids: Option<&[PenId]>,
    distance: Option<f64>,
) -> Option<HistoryEntry> {
    let mut targets = nodes(store, ids);
    if targets.len() <= 2 {
        return None;
    }
    let distance = match distance {
        Some(d) if d > 0.0 => d,
        _ => {
            let rect = get_rect(store, None)?;
            match axis {
                Axis::Horizontal => rect.width(),
                Axis::Vertical => rect.height(),
            }
        }
    };

    let extent = |r: Rect| match axis {
        Axis::Horizontal => r.width(),
        Axis::Vertical => r.height(),
    };
    let start = |r: Rect| match axis {
        Axis::Horizontal => r.x0,
        Axis::Vertical => r.y0,
    };
    let rects: Vec<Rect> = targets.iter().filter_map(|id| store.world_rect(id)).collect();
    let total: f64 = rects.iter().map(|r| extent(*r)).sum();
    let space = (distance - total) / (targets.len() - 1) as f64;

    targets.sort_by(|a, b| {
        let ra = store.world_rect(a).map(start).unwrap_or(0.0);
        let rb = store.world_rect(b).map(start).unwrap_or(0.0);
        ra.total_cmp(&rb)
    });

    bulk_update(store, &targets, |store| {
        let mut cursor = targets
            .first()
            .and_then(|id| store.world_rect(id))
            .map(start)
            .unwrap_or(0.0);
        for id in &targets {
            let Some(r) = store.world_rect(id) else {
                continue;
            };
            let origin = match axis {
                Axis::Horizontal => Point::new(cursor, r.y0),
                Axis::Vertical => Point::new(r.x0, cursor),
            };
            move_to(store, id, origin);
            cursor += extent(r) + space;
        }
    })
}

/// Distribute nodes horizontally with equal gaps over `width` (default: the
/// document width). Needs at least three nodes.
pub fn space_between(store: &mut PenStore, ids: Option<&[PenId]>, width: Option<f64>) -> Option<HistoryEntry> {
    space_between_by(store, Axis::Horizontal, ids, width)
}

/// Vertical counterpart of [`space_between`].
pub fn space_between_column(
    store: &mut PenStore,
    ids: Option<&[PenId]>,
    height: Option<f64>,
) -> Option<HistoryEntry> {
    space_between_by(store, Axis::Vertical, ids, height)
}

/// Flow nodes into a grid of uniform cells (the largest node's size),
/// left to right, wrapping at `width` (default: the document width).
pub fn layout(
    store: &mut PenStore,
    ids: Option<&[PenId]>,
    width: Option<f64>,
    space: f64,
) -> Option<HistoryEntry> {
    let targets = nodes(store, ids);
    let rect = get_rect(store, Some(&targets))?;
    let width = match width {
        Some(w) if w > 0.0 => w,
        _ => get_rect(store, None)?.width(),
    };

    let (mut max_w, mut max_h) = (0.0f64, 0.0f64);
    for r in targets.iter().filter_map(|id| store.world_rect(id)) {
        max_w = max_w.max(r.width());
        max_h = max_h.max(r.height());
    }

    bulk_update(store, &targets, |store| {
        let mut center = Point::new(rect.x0 + max_w / 2.0, rect.y0 + max_h / 2.0);
        for id in &targets {
            let Some(r) = store.world_rect(id) else {
                continue;
            };
            move_to(
                store,
                id,
                Point::new(center.x - r.width() / 2.0, center.y - r.height() / 2.0),
            );
            let used = center.x + max_w / 2.0 - rect.x0;
            if width - used >= max_w + space {
                center.x += max_w + space;
            } else {
                center.x = rect.x0 + max_w / 2.0;
                center.y += max_h + space;
            }
        }
    })
}

/// Document-to-screen transform: `screen = doc * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub offset: Vec2,
    pub scale: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            scale: 1.0,
        }
    }
}

impl Viewport {
    pub fn to_screen(&self, p: Point) -> Point {
        (p.to_vec2() * self.scale + self.offset).to_point()
    }

    pub fn translate(&mut self, delta: Vec2) {
        self.offset += delta;
    }

    /// Zoom to `scale` keeping the screen point `center` fixed.
    pub fn scale_at(&mut self, scale: f64, center: Point) {
        if self.scale <= 0.0 || scale <= 0.0 {
            return;
        }
        let c = center.to_vec2();
        self.offset = c - (c - self.offset) * (scale / self.scale);
        self.scale = scale;
    }

    /// Scale that fits `content` into `view` minus padding. With `fit` the
    /// whole content shows; otherwise the shorter side fills the view.
    pub fn fit_scale(content: Rect, view: Size, padding: Padding, fit: bool) -> Option<f64> {
        if content.width() <= 0.0 || content.height() <= 0.0 {
            return None;
        }
        let w = (view.width - padding.left - padding.right) / content.width();
        let h = (view.height - padding.top - padding.bottom) / content.height();
        let ratio = if fit { w.min(h) } else { w.max(h) };
        (ratio > 0.0).then_some(ratio)
    }

    /// Translate so `content`'s center lands on the view center.
    pub fn center_on(&mut self, content: Rect, view: Size) {
        let view_center = Vec2::new(view.width / 2.0, view.height / 2.0);
        self.offset = view_center - content.center().to_vec2() * self.scale;
    }
}
