//! Declarative event bindings and their gates.
//!
//! A binding ties a trigger (`name`) to an action, optionally gated by a
//! predicate. Compiled predicates and action scripts are cached on the
//! binding the first time they compile successfully.

use crate::pen::Pen;
use crate::registry::{NativePredicate, PenRegistry};
use crate::script::{Expr, Scope, Script, compare, compile_expr, compile_script, truthy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::rc::Rc;

/// Structural triggers the engine dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    Add,
    Enter,
    Leave,
    Active,
    Inactive,
    Click,
    DblClick,
    ValueUpdate,
}

impl Trigger {
    pub const ALL: [Trigger; 8] = [
        Trigger::Add,
        Trigger::Enter,
        Trigger::Leave,
        Trigger::Active,
        Trigger::Inactive,
        Trigger::Click,
        Trigger::DblClick,
        Trigger::ValueUpdate,
    ];

    /// Binding name and bus topic of this trigger.
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Add => "add",
            Trigger::Enter => "enter",
            Trigger::Leave => "leave",
            Trigger::Active => "active",
            Trigger::Inactive => "inactive",
            Trigger::Click => "click",
            Trigger::DblClick => "dblclick",
            Trigger::ValueUpdate => "valueUpdate",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a binding does when it fires. Unknown names deserialize to
/// `Custom` and fire only if a handler was registered for them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventAction {
    Link,
    StartAnimate,
    PauseAnimate,
    StopAnimate,
    Function,
    WindowFn,
    Emit,
    Custom(String),
}

impl From<String> for EventAction {
    fn from(name: String) -> Self {
        match name.as_str() {
            "link" => EventAction::Link,
            "startAnimate" => EventAction::StartAnimate,
            "pauseAnimate" => EventAction::PauseAnimate,
            "stopAnimate" => EventAction::StopAnimate,
            "function" => EventAction::Function,
            "windowFn" => EventAction::WindowFn,
            "emit" => EventAction::Emit,
            _ => EventAction::Custom(name),
        }
    }
}

impl From<EventAction> for String {
    fn from(action: EventAction) -> String {
        match action {
            EventAction::Link => "link".into(),
            EventAction::StartAnimate => "startAnimate".into(),
            EventAction::PauseAnimate => "pauseAnimate".into(),
            EventAction::StopAnimate => "stopAnimate".into(),
            EventAction::Function => "function".into(),
            EventAction::WindowFn => "windowFn".into(),
            EventAction::Emit => "emit".into(),
            EventAction::Custom(name) => name,
        }
    }
}

/// A resolved predicate.
#[derive(Clone)]
pub enum Compiled {
    Expr(Rc<Expr>),
    Native(NativePredicate),
}

impl fmt::Debug for Compiled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compiled::Expr(expr) => f.debug_tuple("Expr").field(expr).finish(),
            Compiled::Native(_) => f.write_str("Native"),
        }
    }
}

/// Gate on a binding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Predicate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
    /// Expression source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fn_js: Option<String>,
    /// Name of a registered predicate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fn_name: Option<String>,
    #[serde(skip)]
    pub compiled: Option<Compiled>,
}

impl Predicate {
    /// `pen[key] <comparison> value`.
    pub fn comparison(key: &str, comparison: &str, value: impl Into<Value>) -> Self {
        Self {
            key: Some(key.to_string()),
            comparison: Some(comparison.to_string()),
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn expression(src: impl Into<String>) -> Self {
        Self {
            fn_js: Some(src.into()),
            ..Self::default()
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            fn_name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn native(f: impl Fn(&Pen, &Value) -> bool + 'static) -> Self {
        Self {
            compiled: Some(Compiled::Native(Rc::new(f))),
            ..Self::default()
        }
    }

    /// Evaluate the gate, resolving and caching the callable first if
    /// needed. Compile failures are logged and leave nothing cached.
    pub fn evaluate(&mut self, pen: &Pen, params: &Value, registry: &PenRegistry) -> bool {
        if self.compiled.is_none() {
            if let Some(name) = &self.fn_name {
                match registry.predicate(name) {
                    Some(f) => self.compiled = Some(Compiled::Native(f)),
                    None => {
                        log::warn!("Predicate '{}' is not registered", name);
                        return false;
                    }
                }
            } else if let Some(src) = &self.fn_js {
                match compile_expr(src) {
                    Ok(expr) => self.compiled = Some(Compiled::Expr(Rc::new(expr))),
                    Err(err) => {
                        log::error!("Failed to compile predicate on pen {}: {}", pen.id, err);
                        return false;
                    }
                }
            }
        }

        match &self.compiled {
            Some(Compiled::Native(f)) => f(pen, params),
            Some(Compiled::Expr(expr)) => {
                let pen_value = pen.to_persisted();
                truthy(&expr.eval(&Scope {
                    pen: &pen_value,
                    params,
                }))
            }
            None => {
                let (Some(key), Some(op)) = (&self.key, &self.comparison) else {
                    return false;
                };
                let actual = pen.field(key).unwrap_or(Value::Null);
                compare(&actual, op, &self.value)
            }
        }
    }
}

/// `{name, action, value, params, where?}` on a pen.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBinding {
    /// Trigger name.
    pub name: String,
    pub action: EventAction,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<Predicate>,
    /// Compiled `Function` action script.
    #[serde(skip)]
    pub script: Option<Rc<Script>>,
}

impl EventBinding {
    pub fn new(trigger: Trigger, action: EventAction) -> Self {
        Self {
            name: trigger.as_str().to_string(),
            action,
            value: Value::Null,
            params: Value::Null,
            predicate: None,
            script: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_params(mut self, params: impl Into<Value>) -> Self {
        self.params = params.into();
        self
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Whether the gate lets the binding fire. No predicate always fires.
    pub fn gate(&mut self, pen: &Pen, registry: &PenRegistry) -> bool {
        match &mut self.predicate {
            None => true,
            Some(predicate) => predicate.evaluate(pen, &self.params, registry),
        }
    }

    /// Compiled action script for `Function` bindings.
    pub fn compiled_script(&mut self) -> Option<Rc<Script>> {
        if self.script.is_none() {
            let src = self.value.as_str().unwrap_or_default();
            match compile_script(src) {
                Ok(script) => self.script = Some(Rc::new(script)),
                Err(err) => {
                    log::error!("Failed to compile action script: {}", err);
                    return None;
                }
            }
        }
        self.script.clone()
    }
}

/// Bindings of `pen` that fire for `trigger`, in declaration order.
///
/// Only bindings whose action `is_registered` are considered. Caches built
/// while gating are written back to the pen; the returned bindings are
/// clones carrying them.
pub fn firing_bindings(
    pen: &mut Pen,
    trigger: &str,
    is_registered: impl Fn(&EventAction) -> bool,
    registry: &PenRegistry,
) -> Vec<EventBinding> {
    let mut events = std::mem::take(&mut pen.events);
    let mut fired = Vec::new();
    for binding in events.iter_mut() {
        if binding.name != trigger || !is_registered(&binding.action) {
            continue;
        }
        if !binding.gate(pen, registry) {
            continue;
        }
        if binding.action == EventAction::Function {
            binding.compiled_script();
        }
        fired.push(binding.clone());
    }
    pen.events = events;
    log::debug!("{} of pen {} fired {} binding(s)", trigger, pen.id, fired.len());
    fired
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pen_with(events: Vec<EventBinding>) -> Pen {
        let mut pen = Pen::node("p", 0.0, 0.0, 10.0, 10.0).with_events(events);
        pen.extra.insert("value".into(), json!(12));
        pen
    }

    fn all(_: &EventAction) -> bool {
        true
    }

    #[test]
    fn test_binding_serde() {
        let binding: EventBinding = serde_json::from_value(json!({
            "name": "click",
            "action": "emit",
            "value": "hello",
            "where": {"key": "value", "comparison": ">", "value": 3}
        }))
        .unwrap();
        assert_eq!(binding.action, EventAction::Emit);
        assert!(binding.predicate.is_some());
        let back = serde_json::to_value(&binding).unwrap();
        assert_eq!(back["action"], "emit");
        assert_eq!(back["where"]["comparison"], ">");

        let custom: EventAction = serde_json::from_value(json!("beep")).unwrap();
        assert_eq!(custom, EventAction::Custom("beep".into()));
    }

    #[test]
    fn test_structural_comparisons() {
        let registry = PenRegistry::new();
        let pen = pen_with(vec![]);
        let cases = [
            (">", json!(10), true),
            (">=", json!(12), true),
            ("<", json!(12), false),
            ("<=", json!(12), true),
            ("=", json!("12"), true),
            ("==", json!(12), true),
            ("!=", json!(12), false),
        ];
        for (op, value, expected) in cases {
            let mut p = Predicate::comparison("value", op, value);
            assert_eq!(p.evaluate(&pen, &Value::Null, &registry), expected, "{op}");
        }
    }

    #[test]
    fn test_expression_predicate_cached() {
        let registry = PenRegistry::new();
        let pen = pen_with(vec![]);
        let mut p = Predicate::expression("pen.value > params.min");
        assert!(p.evaluate(&pen, &json!({"min": 5}), &registry));
        assert!(matches!(p.compiled, Some(Compiled::Expr(_))));
        assert!(!p.evaluate(&pen, &json!({"min": 50}), &registry));
    }

    #[test]
    fn test_compile_failure_is_inert_and_retried() {
        let registry = PenRegistry::new();
        let pen = pen_with(vec![]);
        let mut p = Predicate::expression("pen.value >");
        assert!(!p.evaluate(&pen, &Value::Null, &registry));
        assert!(p.compiled.is_none());

        p.fn_js = Some("pen.value > 1".into());
        assert!(p.evaluate(&pen, &Value::Null, &registry));
    }

    #[test]
    fn test_native_and_named_predicates() {
        let mut registry = PenRegistry::new();
        registry.register_predicate("wide", |pen, _| pen.width >= 10.0);
        let pen = pen_with(vec![]);

        assert!(Predicate::native(|_, _| true).evaluate(&pen, &Value::Null, &registry));
        let mut named = Predicate::named("wide");
        assert!(named.evaluate(&pen, &Value::Null, &registry));
        assert!(matches!(named.compiled, Some(Compiled::Native(_))));
        assert!(!Predicate::named("nope").evaluate(&pen, &Value::Null, &registry));
    }

    #[test]
    fn test_firing_bindings_filters_and_caches() {
        let registry = PenRegistry::new();
        let mut pen = pen_with(vec![
            EventBinding::new(Trigger::Click, EventAction::Emit).with_value("a"),
            EventBinding::new(Trigger::DblClick, EventAction::Emit).with_value("b"),
            EventBinding::new(Trigger::Click, EventAction::Function)
                .with_value("pen.x = 1")
                .with_predicate(Predicate::expression("pen.value == 12")),
            EventBinding::new(Trigger::Click, EventAction::Link)
                .with_predicate(Predicate::comparison("value", "<", 0)),
        ]);

        let fired = firing_bindings(&mut pen, "click", all, &registry);
        assert_eq!(fired.len(), 2);
        assert_eq!(fired[0].value, json!("a"));
        assert!(fired[1].script.is_some());
        // Caches persist on the pen.
        assert!(pen.events[2].script.is_some());
        assert!(pen.events[2].predicate.as_ref().unwrap().compiled.is_some());
        assert_eq!(pen.events.len(), 4);

        let none = firing_bindings(&mut pen, "click", |_| false, &registry);
        assert!(none.is_empty());
    }
}
