//! Runtime-only cache derived from a pen's persisted fields.

use crate::animate::AnimationClock;
use kurbo::{Point, Rect};
use serde_json::{Map, Value};

/// Derived values recomputed whenever a persisted field changes.
///
/// Never serialized. Everything here is a function of the pen's persisted
/// fields, its ancestors' rects and the current animation clock.
#[derive(Debug, Clone, Default)]
pub struct Calculative {
    /// Absolute rect in document coordinates.
    pub world_rect: Rect,
    /// Resolved connector points (bound anchors follow their node).
    pub world_anchors: Vec<Point>,
    /// Needs repainting.
    pub dirty: bool,
    /// Text the current `text_lines` were computed from.
    pub text: Option<String>,
    pub text_lines: Vec<String>,
    /// Shadow copies of scalar fields; animation writes here.
    pub values: Map<String, Value>,
    /// Selected.
    pub active: bool,
    pub animation: AnimationClock,
}

impl Calculative {
    /// Numeric shadow value, if any.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(Value::as_f64)
    }
}
