//! Value synchronization.
//!
//! Inbound partial values (from a live-data channel or a direct
//! `set_value` call) are merged into pens here and the runtime cache is
//! brought back in step. Façade-level concerns (hooks, rule dispatch,
//! history, render) wrap these primitives in `Topology::set_value`.

use crate::animate::calc_animate_duration;
use crate::error::{PenError, SyncError};
use crate::pen::{PenId, calc_text_lines, is_mirrored};
use crate::store::PenStore;
use serde_json::{Map, Value};

/// Keys whose change moves or resizes a pen.
const GEOMETRY_KEYS: [&str; 4] = ["x", "y", "width", "height"];

/// Knobs for `Topology::set_value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetValueOptions {
    /// Record one undoable Update covering every touched pen.
    pub history: bool,
    /// Request a full render afterwards.
    pub render: bool,
}

impl Default for SetValueOptions {
    fn default() -> Self {
        Self {
            history: false,
            render: true,
        }
    }
}

/// What merging a patch into one pen changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueChange {
    pub id: PenId,
    pub keys: Vec<String>,
    pub text: bool,
    pub geometry: bool,
    pub image: bool,
}

/// The lookup key of a patch: `id` if present, else `tag`.
pub fn patch_target(patch: &Map<String, Value>) -> Option<String> {
    let key = |k: &str| match patch.get(k) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    key("id").or_else(|| key("tag"))
}

/// Merge `patch` into pen `id` and refresh its cache.
///
/// Text changes recompute text lines, scalar values (and `lineDash`) are
/// mirrored into the cache, and geometry changes recompute the world rect
/// and the connectors touching the pen. New frames rewind the pen's
/// timeline. A patch that changes nothing, or does not fit the pen schema,
/// leaves the pen untouched.
pub fn apply_value(
    store: &mut PenStore,
    id: &str,
    patch: &Map<String, Value>,
) -> Result<Option<ValueChange>, PenError> {
    let Some(pen) = store.get_mut(id) else {
        return Ok(None);
    };
    let keys = pen.apply_patch(patch)?;
    if keys.is_empty() {
        return Ok(None);
    }
    if keys.iter().any(|k| k == "frames") {
        // A running timeline restarts against the new frames.
        let clock = &mut pen.calculative.animation;
        clock.start = None;
        clock.frame_index = 0;
        calc_animate_duration(pen);
    }

    let mut change = ValueChange {
        id: id.to_string(),
        ..ValueChange::default()
    };
    if pen.calculative.text != pen.text {
        calc_text_lines(pen);
        change.text = true;
    }
    for key in &keys {
        let value = &patch[key.as_str()];
        if is_mirrored(key, value) {
            pen.calculative.values.insert(key.clone(), value.clone());
        }
    }
    change.geometry = keys
        .iter()
        .any(|k| GEOMETRY_KEYS.contains(&k.as_str()) && !patch[k.as_str()].is_null());
    change.image = patch
        .get("image")
        .is_some_and(|v| !v.is_null() && v.as_str() != Some(""));
    change.keys = keys;

    if change.geometry {
        store.dirty_pen_rect(id);
    } else if let Some(pen) = store.get_mut(id) {
        pen.calculative.dirty = true;
    }
    Ok(Some(change))
}

/// Parse an inbound payload into value patches.
///
/// A single object becomes one patch, an array one patch per element. A
/// `sub_id` overrides each patch's `id`.
pub fn parse_message(payload: &str, sub_id: Option<&str>) -> Result<Vec<Map<String, Value>>, SyncError> {
    let message: Value = serde_json::from_str(payload)?;
    let items = match message {
        Value::Array(items) => items,
        other => vec![other],
    };
    let mut patches = Vec::with_capacity(items.len());
    for item in items {
        let Value::Object(mut patch) = item else {
            return Err(SyncError::NotAnObject(item.to_string()));
        };
        if let Some(sub_id) = sub_id {
            patch.insert("id".to_string(), Value::from(sub_id));
        }
        patches.push(patch);
    }
    Ok(patches)
}
