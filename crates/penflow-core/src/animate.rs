//! Frame-based animation timelines.
//!
//! A pen animates through its `frames`, each declaring a duration and the
//! field values reached at its end. Numeric fields are interpolated
//! linearly into the runtime cache; persisted fields never change.

use crate::pen::{Pen, PenId, is_mirrored};
use crate::rect::rect_from_xywh;
use crate::store::PenStore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const GEOMETRY_KEYS: [&str; 4] = ["x", "y", "width", "height"];

/// One step of a pen's animation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Milliseconds.
    #[serde(default)]
    pub duration: u64,
    /// Target values at the end of the frame.
    #[serde(flatten)]
    pub values: Map<String, Value>,
}

impl Frame {
    pub fn new(duration: u64) -> Self {
        Self {
            duration,
            values: Map::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

/// Per-pen timeline state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimationClock {
    /// Timestamp the timeline was paused at.
    pub pause: Option<u64>,
    /// Timeline start; `None` until the first tick after a start or stop.
    pub start: Option<u64>,
    pub frame_start: u64,
    pub frame_end: u64,
    pub frame_index: usize,
    pub cycle_index: u32,
    /// Sum of frame durations.
    pub duration: u64,
    /// Values at the beginning of the current frame.
    pub from: Map<String, Value>,
}

/// Pens touched by a tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    /// Pens whose animated values changed.
    pub dirty: Vec<PenId>,
    /// Pens whose timeline completed and left the animating set.
    pub finished: Vec<PenId>,
}

/// Recompute `calculative.animation.duration` from the frames.
pub fn calc_animate_duration(pen: &mut Pen) -> u64 {
    let duration = pen.frames.iter().map(|f| f.duration).sum();
    pen.calculative.animation.duration = duration;
    duration
}

/// Start or resume timelines. Paused pens resume in place: the paused span
/// does not count towards the timeline.
pub fn start(store: &mut PenStore, ids: &[PenId], now: u64) {
    for id in ids {
        let Some(pen) = store.get_mut(id) else {
            continue;
        };
        let clock = &mut pen.calculative.animation;
        match clock.pause.take() {
            Some(paused_at) => {
                let elapsed = now.saturating_sub(paused_at);
                clock.frame_start += elapsed;
                clock.frame_end += elapsed;
                log::debug!("Resumed animation of {} after {}ms", id, elapsed);
            }
            None => {
                calc_animate_duration(pen);
                store.add_animating(id);
            }
        }
    }
}

/// Pause timelines. Already paused pens keep their first pause time.
pub fn pause(store: &mut PenStore, ids: &[PenId], now: u64) {
    for id in ids {
        if let Some(pen) = store.get_mut(id) {
            let clock = &mut pen.calculative.animation;
            if clock.pause.is_none() {
                clock.pause = Some(now);
            }
        }
    }
}

/// Stop timelines: clear the pause marker, rewind and restore the animated
/// values. The pen stays in the animating set, so the next tick plays it
/// again from the first frame.
pub fn stop(store: &mut PenStore, ids: &[PenId]) {
    for id in ids {
        let Some(pen) = store.get_mut(id) else {
            continue;
        };
        pen.calculative.animation.pause = None;
        pen.calculative.animation.start = None;
        restore_values(pen);
        store.dirty_pen_rect(id);
    }
}

/// Advance every running timeline to `now`.
pub fn tick(store: &mut PenStore, now: u64) -> TickOutcome {
    let mut outcome = TickOutcome::default();
    for id in store.animates().to_vec() {
        let Some(pen) = store.get_mut(&id) else {
            continue;
        };
        if pen.calculative.animation.pause.is_some() {
            continue;
        }
        if pen.frames.is_empty() || calc_animate_duration(pen) == 0 {
            restore_values(pen);
            pen.calculative.animation = Default::default();
            outcome.finished.push(id);
            continue;
        }

        // Frames replaced under a running timeline: replay from the start.
        if pen.calculative.animation.frame_index >= pen.frames.len() {
            pen.calculative.animation.start = None;
        }
        if pen.calculative.animation.start.is_none() {
            let clock = &mut pen.calculative.animation;
            clock.start = Some(now);
            clock.cycle_index = 0;
            begin_frame(pen, 0, now);
        }

        let mut finished = false;
        while now >= pen.calculative.animation.frame_end {
            let done = pen.calculative.animation.frame_index;
            let reached = pen.frames.get(done).map(|f| f.values.clone()).unwrap_or_default();
            pen.calculative.values.extend(reached);
            let next = done + 1;
            let at = pen.calculative.animation.frame_end;
            if next < pen.frames.len() {
                begin_frame(pen, next, at);
                continue;
            }
            pen.calculative.animation.cycle_index += 1;
            let cycles_done = pen
                .animate_cycle
                .is_some_and(|c| pen.calculative.animation.cycle_index >= c);
            if cycles_done {
                finished = true;
                break;
            }
            begin_frame(pen, 0, at);
        }

        if finished {
            restore_values(pen);
            pen.calculative.animation = Default::default();
            outcome.finished.push(id);
            continue;
        }

        interpolate(pen, now);
        outcome.dirty.push(id);
    }

    for id in &outcome.finished {
        store.remove_animating(id);
        store.dirty_pen_rect(id);
    }
    outcome
}

fn begin_frame(pen: &mut Pen, index: usize, at: u64) {
    let Some(frame) = pen.frames.get(index) else {
        return;
    };
    let duration = frame.duration;
    let keys: Vec<String> = frame.values.keys().cloned().collect();
    let mut from = Map::new();
    for key in keys {
        let current = pen
            .calculative
            .values
            .get(&key)
            .cloned()
            .or_else(|| pen.field(&key))
            .unwrap_or(Value::Null);
        from.insert(key, current);
    }
    let clock = &mut pen.calculative.animation;
    clock.frame_index = index;
    clock.frame_start = at;
    clock.frame_end = at + duration;
    clock.from = from;
}

fn interpolate(pen: &mut Pen, now: u64) {
    let clock = &pen.calculative.animation;
    let span = clock.frame_end.saturating_sub(clock.frame_start);
    let progress = if span == 0 {
        1.0
    } else {
        (now.saturating_sub(clock.frame_start) as f64 / span as f64).clamp(0.0, 1.0)
    };

    let Some(frame) = pen.frames.get(clock.frame_index) else {
        return;
    };
    let mut updates = Vec::with_capacity(frame.values.len());
    for (key, target) in &frame.values {
        let from = clock.from.get(key).and_then(Value::as_f64);
        let value = match (from, target.as_f64()) {
            (Some(a), Some(b)) => Value::from(a + (b - a) * progress),
            _ => target.clone(),
        };
        updates.push((key.clone(), value));
    }

    let mut geometry = false;
    for (key, value) in updates {
        geometry |= GEOMETRY_KEYS.contains(&key.as_str());
        pen.calculative.values.insert(key, value);
    }
    if geometry && pen.parent_id.is_none() {
        let c = &pen.calculative;
        let rect = rect_from_xywh(
            c.number("x").unwrap_or(pen.x),
            c.number("y").unwrap_or(pen.y),
            c.number("width").unwrap_or(pen.width),
            c.number("height").unwrap_or(pen.height),
        );
        pen.calculative.world_rect = rect;
    }
    pen.calculative.dirty = true;
}

/// Put every animated key back to its persisted value.
fn restore_values(pen: &mut Pen) {
    let keys: Vec<String> = pen
        .frames
        .iter()
        .flat_map(|f| f.values.keys().cloned())
        .collect();
    for key in keys {
        match pen.field(&key) {
            Some(v) if is_mirrored(&key, &v) => {
                pen.calculative.values.insert(key, v);
            }
            _ => {
                pen.calculative.values.remove(&key);
            }
        }
    }
    pen.calculative.dirty = true;
}
