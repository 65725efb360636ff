//! Persisted document shape.

use crate::pen::{LockState, Pen};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Version stamped on export.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// A serialized diagram: pens in paint order plus document settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyData {
    #[serde(default)]
    pub pens: Vec<Pen>,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default = "default_scale")]
    pub scale: f64,
    /// Run mode when not `None`: rule bindings execute.
    #[serde(default)]
    pub locked: LockState,
    /// Startup script source; kept for round-tripping, never executed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_js: Option<String>,
    /// Live-data WebSocket URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub websocket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mqtt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mqtt_options: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mqtt_topics: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_cb_js: Option<String>,
    /// Registered socket callback to call for every inbound message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_cb_fn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

fn default_scale() -> f64 {
    1.0
}

impl Default for TopologyData {
    fn default() -> Self {
        Self {
            pens: Vec::new(),
            x: 0.0,
            y: 0.0,
            scale: 1.0,
            locked: LockState::None,
            init_js: None,
            websocket: None,
            mqtt: None,
            mqtt_options: None,
            mqtt_topics: None,
            socket_cb_js: None,
            socket_cb_fn: None,
            version: None,
        }
    }
}

impl TopologyData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self) -> bool {
        !self.locked.is_none()
    }

    /// Settings without pens.
    pub fn settings(&self) -> Self {
        Self {
            pens: Vec::new(),
            ..self.clone()
        }
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Pen ids that appear more than once, in first-repeat order.
    pub fn duplicate_ids(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        let mut repeated = Vec::new();
        for pen in self.pens.iter().filter(|p| !p.id.is_empty()) {
            if !seen.insert(pen.id.as_str()) && !repeated.contains(&pen.id.as_str()) {
                repeated.push(pen.id.as_str());
            }
        }
        repeated
    }

    /// MQTT topics, comma separated in the persisted form.
    pub fn topics(&self) -> Vec<&str> {
        self.mqtt_topics
            .as_deref()
            .map(|t| t.split(',').map(str::trim).filter(|t| !t.is_empty()).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_from_empty_object() {
        let data: TopologyData = serde_json::from_str("{}").unwrap();
        assert!(data.pens.is_empty());
        assert_eq!(data.scale, 1.0);
        assert!(!data.is_locked());
    }

    #[test]
    fn test_camel_case_fields() {
        let data: TopologyData = serde_json::from_value(json!({
            "pens": [{"id": "a", "type": 0}],
            "locked": 10,
            "socketCbFn": "onData",
            "mqttTopics": "plant/a, plant/b",
        }))
        .unwrap();
        assert!(data.is_locked());
        assert_eq!(data.socket_cb_fn.as_deref(), Some("onData"));
        assert_eq!(data.topics(), vec!["plant/a", "plant/b"]);
        let back = serde_json::to_value(&data).unwrap();
        assert_eq!(back["socketCbFn"], "onData");
        assert!(back.get("initJs").is_none());
    }

    #[test]
    fn test_json_text_round_trip() {
        let mut data = TopologyData::new();
        data.websocket = Some("ws://localhost:9001".into());
        data.pens.push(Pen::node("a", 1.0, 2.0, 3.0, 4.0));
        let loaded = TopologyData::from_json(&data.to_json().unwrap()).unwrap();
        assert_eq!(loaded.websocket, data.websocket);
        assert_eq!(loaded.pens[0].to_persisted(), data.pens[0].to_persisted());
        assert!(TopologyData::from_json("[1, 2]").is_err());
    }
}
