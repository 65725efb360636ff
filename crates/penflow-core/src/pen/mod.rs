//! Pen definitions: nodes and connectors of a diagram.

mod calculative;
mod text;

pub use calculative::Calculative;
pub use text::{DEFAULT_FONT_SIZE, calc_text_lines};

use crate::animate::Frame;
use crate::error::PenError;
use crate::event::EventBinding;
use crate::rect::rect_from_xywh;
use kurbo::Rect;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Unique identifier for pens.
pub type PenId = String;

/// Generate a short random pen id (8 hex chars).
pub fn generate_id() -> PenId {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// Whether a pen is a shape or a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PenType {
    #[default]
    Node = 0,
    Line = 1,
}

impl From<PenType> for u8 {
    fn from(t: PenType) -> u8 {
        t as u8
    }
}

impl TryFrom<u8> for PenType {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(PenType::Node),
            1 => Ok(PenType::Line),
            other => Err(format!("unknown pen type {other}")),
        }
    }
}

/// Restrictions on interactive mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum LockState {
    #[default]
    None = 0,
    DisableEdit = 1,
    DisableMove = 2,
    Disable = 10,
}

impl LockState {
    pub fn is_none(&self) -> bool {
        *self == LockState::None
    }

    /// Whether the pen may be moved interactively.
    pub fn allows_move(&self) -> bool {
        matches!(self, LockState::None | LockState::DisableEdit)
    }
}

impl From<LockState> for u8 {
    fn from(l: LockState) -> u8 {
        l as u8
    }
}

impl TryFrom<u8> for LockState {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(LockState::None),
            1 => Ok(LockState::DisableEdit),
            2 => Ok(LockState::DisableMove),
            10 => Ok(LockState::Disable),
            other => Err(format!("unknown lock state {other}")),
        }
    }
}

/// A connector endpoint or bend point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anchor {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    /// Node this anchor is bound to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_to: Option<PenId>,
}

impl Anchor {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            id: generate_id(),
            x,
            y,
            connect_to: None,
        }
    }

    /// An anchor bound to a node.
    pub fn connected(node: impl Into<PenId>) -> Self {
        Self {
            connect_to: Some(node.into()),
            ..Self::new(0.0, 0.0)
        }
    }
}

/// A document element: a node (shape) or a connector (line).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pen {
    #[serde(default)]
    pub id: PenId,
    /// Pen kind, used to look up drawing and lifecycle hooks.
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub pen_type: PenType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    /// Connector points; first is the source, last the destination.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub anchors: Vec<Anchor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<PenId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PenId>,
    #[serde(default, skip_serializing_if = "LockState::is_none")]
    pub locked: LockState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_dash: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<EventBinding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<Frame>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub auto_play: bool,
    /// Number of times the frame sequence plays; `None` loops forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animate_cycle: Option<u32>,
    /// Any other field, kept so live data can address arbitrary keys.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// Runtime-only derived values.
    #[serde(skip)]
    pub calculative: Calculative,
}

impl Pen {
    /// Create a node.
    pub fn node(id: impl Into<PenId>, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            id: id.into(),
            name: "rectangle".to_string(),
            x,
            y,
            width,
            height,
            ..Self::default()
        }
    }

    /// Create a connector between two optional nodes.
    pub fn line(id: impl Into<PenId>, from: Option<&str>, to: Option<&str>) -> Self {
        let anchor = |node: Option<&str>| match node {
            Some(n) => Anchor::connected(n),
            None => Anchor::new(0.0, 0.0),
        };
        Self {
            id: id.into(),
            name: "line".to_string(),
            pen_type: PenType::Line,
            anchors: vec![anchor(from), anchor(to)],
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_events(mut self, events: Vec<EventBinding>) -> Self {
        self.events = events;
        self
    }

    pub fn with_frames(mut self, frames: Vec<Frame>) -> Self {
        self.frames = frames;
        self
    }

    pub fn is_line(&self) -> bool {
        self.pen_type == PenType::Line
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Persisted rect (relative to the parent when `parent_id` is set).
    pub fn rect(&self) -> Rect {
        rect_from_xywh(self.x, self.y, self.width, self.height)
    }

    pub fn set_rect(&mut self, rect: Rect) {
        self.x = rect.x0;
        self.y = rect.y0;
        self.width = rect.width();
        self.height = rect.height();
    }

    /// Node id bound to the first anchor.
    pub fn source(&self) -> Option<&str> {
        self.anchors.first().and_then(|a| a.connect_to.as_deref())
    }

    /// Node id bound to the last anchor.
    pub fn target(&self) -> Option<&str> {
        self.anchors.last().and_then(|a| a.connect_to.as_deref())
    }

    /// Whether any anchor of this connector is bound to `node`.
    pub fn touches(&self, node: &str) -> bool {
        self.anchors
            .iter()
            .any(|a| a.connect_to.as_deref() == Some(node))
    }

    /// Point every reference to pen `old` at `new`: the own id, the parent,
    /// the child list and anchor bindings.
    pub fn rename_refs(&mut self, old: &str, new: &str) {
        if self.id == old {
            self.id = new.to_string();
        }
        if self.parent_id.as_deref() == Some(old) {
            self.parent_id = Some(new.to_string());
        }
        for child in self.children.iter_mut().filter(|c| c.as_str() == old) {
            *child = new.to_string();
        }
        for anchor in &mut self.anchors {
            if anchor.connect_to.as_deref() == Some(old) {
                anchor.connect_to = Some(new.to_string());
            }
        }
    }

    /// Read a persisted field by its JSON name.
    pub fn field(&self, key: &str) -> Option<Value> {
        match key {
            "id" => Some(Value::from(self.id.clone())),
            "name" => Some(Value::from(self.name.clone())),
            "x" => Some(Value::from(self.x)),
            "y" => Some(Value::from(self.y)),
            "width" => Some(Value::from(self.width)),
            "height" => Some(Value::from(self.height)),
            "text" => self.text.clone().map(Value::from),
            "image" => self.image.clone().map(Value::from),
            _ => match self.extra.get(key) {
                Some(v) => Some(v.clone()),
                None => serde_json::to_value(self).ok()?.get(key).cloned(),
            },
        }
    }

    /// Shallow-merge `patch` into the persisted fields.
    ///
    /// `id` and `tag` address the pen and are never merged. Returns the
    /// keys whose persisted value changed; when none did the pen is left
    /// as it was. On a schema mismatch the pen is left unchanged.
    pub fn apply_patch(&mut self, patch: &Map<String, Value>) -> Result<Vec<String>, PenError> {
        let keys: Vec<String> = patch
            .keys()
            .filter(|k| k.as_str() != "id" && k.as_str() != "tag")
            .cloned()
            .collect();
        if keys.is_empty() {
            return Ok(keys);
        }

        let before = serde_json::to_value(&*self)?;
        let mut value = before.clone();
        if let Value::Object(map) = &mut value {
            for k in &keys {
                map.insert(k.clone(), patch[k].clone());
            }
        }
        let mut merged: Pen = serde_json::from_value(value)?;
        let after = serde_json::to_value(&merged)?;
        let keys: Vec<String> = keys
            .into_iter()
            .filter(|k| before.get(k.as_str()) != after.get(k.as_str()))
            .collect();
        if keys.is_empty() {
            return Ok(keys);
        }

        // Compiled caches live on the bindings and the runtime cache; keep
        // them unless the bindings themselves were replaced.
        merged.calculative = std::mem::take(&mut self.calculative);
        if !patch.contains_key("events") {
            merged.events = std::mem::take(&mut self.events);
        }
        *self = merged;
        Ok(keys)
    }

    /// Persisted fields only, as JSON. Used to compare pens while ignoring
    /// the runtime cache.
    pub fn to_persisted(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Whether a field value is mirrored into the runtime cache by value sync.
/// Compound values are skipped except the dash pattern.
pub fn is_mirrored(key: &str, value: &Value) -> bool {
    key == "lineDash" || !(value.is_object() || value.is_array())
}
