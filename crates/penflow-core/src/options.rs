//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Options supplied at construction. Every field has a default, so a
/// partial JSON object is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    /// Maximum undo depth; 0 keeps everything.
    pub history_limit: usize,
    pub min_scale: f64,
    pub max_scale: f64,
    /// Gap used by `layout` when none is given.
    pub layout_space: f64,
    /// Padding used by `fit_view`.
    pub view_padding: f64,
    /// Target context for `Link` actions without params.
    pub default_link_target: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            history_limit: 0,
            min_scale: 0.1,
            max_scale: 10.0,
            layout_space: 30.0,
            view_padding: 10.0,
            default_link_target: "_blank".to_string(),
        }
    }
}

impl Options {
    pub fn clamp_scale(&self, scale: f64) -> f64 {
        scale.clamp(self.min_scale, self.max_scale)
    }
}
