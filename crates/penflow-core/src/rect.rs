//! Rectangle helpers for parent-relative placement.
//!
//! A child's persisted rect is stored as fractions of its parent's world
//! rect: `x = (child.x - parent.x) / parent.width`, and so on. Converting
//! back multiplies through the parent's current world rect.

use kurbo::{Point, Rect, Size};

/// Extents smaller than this are treated as 1 so the ratio stays finite and
/// the round trip is still exact.
const MIN_EXTENT: f64 = 1e-9;

fn safe_extent(v: f64) -> f64 {
    if v.abs() < MIN_EXTENT { 1.0 } else { v }
}

/// Rect from the persisted `x, y, width, height` fields.
pub fn rect_from_xywh(x: f64, y: f64, width: f64, height: f64) -> Rect {
    Rect::from_origin_size(Point::new(x, y), Size::new(width, height))
}

/// Union of all rects, or `None` for an empty input.
pub fn bounding_rect(rects: impl IntoIterator<Item = Rect>) -> Option<Rect> {
    rects.into_iter().fold(None, |acc, r| {
        Some(match acc {
            Some(a) => a.union(r),
            None => r,
        })
    })
}

/// Express `rect` as fractions of `parent`.
pub fn calc_relative_rect(rect: Rect, parent: Rect) -> Rect {
    let pw = safe_extent(parent.width());
    let ph = safe_extent(parent.height());
    rect_from_xywh(
        (rect.x0 - parent.x0) / pw,
        (rect.y0 - parent.y0) / ph,
        rect.width() / pw,
        rect.height() / ph,
    )
}

/// Inverse of [`calc_relative_rect`].
pub fn calc_world_rect(relative: Rect, parent: Rect) -> Rect {
    let pw = safe_extent(parent.width());
    let ph = safe_extent(parent.height());
    rect_from_xywh(
        parent.x0 + relative.x0 * pw,
        parent.y0 + relative.y0 * ph,
        relative.width() * pw,
        relative.height() * ph,
    )
}

/// Approximate equality used by tests and by container detection.
pub fn rect_approx_eq(a: Rect, b: Rect, tolerance: f64) -> bool {
    (a.x0 - b.x0).abs() <= tolerance
        && (a.y0 - b.y0).abs() <= tolerance
        && (a.x1 - b.x1).abs() <= tolerance
        && (a.y1 - b.y1).abs() <= tolerance
}
