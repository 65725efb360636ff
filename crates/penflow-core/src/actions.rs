//! Built-in rule actions.
//!
//! Each handler receives the engine, the id of the pen whose binding fired
//! and the binding itself. Hosts add their own with
//! `Topology::register_action`.

use crate::event::{EventAction, EventBinding};
use crate::pen::PenId;
use crate::script::Scope;
use crate::surface::Surface;
use crate::sync::SetValueOptions;
use crate::topology::Topology;
use serde_json::{Value, json};
use std::rc::Rc;

/// Action handler invoked with `(engine, pen id, binding)`.
pub type ActionHandler<S> = Rc<dyn Fn(&mut Topology<S>, &PenId, &EventBinding)>;

fn handler<S, F>(f: F) -> ActionHandler<S>
where
    S: Surface + 'static,
    F: Fn(&mut Topology<S>, &PenId, &EventBinding) + 'static,
{
    Rc::new(f)
}

/// The default action table.
pub(crate) fn builtin<S: Surface + 'static>() -> Vec<(EventAction, ActionHandler<S>)> {
    vec![
        (EventAction::Link, handler(link::<S>)),
        (EventAction::StartAnimate, handler(start_animate::<S>)),
        (EventAction::PauseAnimate, handler(pause_animate::<S>)),
        (EventAction::StopAnimate, handler(stop_animate::<S>)),
        (EventAction::Function, handler(function::<S>)),
        (EventAction::WindowFn, handler(window_fn::<S>)),
        (EventAction::Emit, handler(emit::<S>)),
    ]
}

fn non_empty(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.is_empty())
}

/// Pens named by the binding value (an id/tag or a list of them), else the
/// triggering pen.
fn targets<S: Surface + 'static>(topology: &Topology<S>, id: &PenId, binding: &EventBinding) -> Vec<PenId> {
    let keys: Vec<&str> = match &binding.value {
        Value::String(s) if !s.is_empty() => vec![s.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => return vec![id.clone()],
    };
    let mut ids: Vec<PenId> = Vec::new();
    for key in keys {
        for found in topology.find(key) {
            if !ids.contains(&found) {
                ids.push(found);
            }
        }
    }
    ids
}

fn link<S: Surface + 'static>(topology: &mut Topology<S>, _id: &PenId, binding: &EventBinding) {
    let Some(url) = non_empty(&binding.value) else {
        log::warn!("Link action without a URL");
        return;
    };
    let target = non_empty(&binding.params)
        .map(str::to_string)
        .unwrap_or_else(|| topology.options().default_link_target.clone());
    topology.surface_mut().open_url(url, &target);
}

fn start_animate<S: Surface + 'static>(topology: &mut Topology<S>, id: &PenId, binding: &EventBinding) {
    let ids = targets(topology, id, binding);
    topology.start_animate(Some(&ids));
}

fn pause_animate<S: Surface + 'static>(topology: &mut Topology<S>, id: &PenId, binding: &EventBinding) {
    let ids = targets(topology, id, binding);
    topology.pause_animate(Some(&ids));
}

fn stop_animate<S: Surface + 'static>(topology: &mut Topology<S>, id: &PenId, binding: &EventBinding) {
    let ids = targets(topology, id, binding);
    topology.stop_animate(Some(&ids));
}

/// Run the binding's script and apply its assignments as a value update.
fn function<S: Surface + 'static>(topology: &mut Topology<S>, id: &PenId, binding: &EventBinding) {
    let Some(script) = binding.script.clone() else {
        return;
    };
    let Some(pen) = topology.get_pen(id).map(|p| p.to_persisted()) else {
        return;
    };
    let mut patch = script.run(&Scope {
        pen: &pen,
        params: &binding.params,
    });
    if patch.is_empty() {
        return;
    }
    patch.insert("id".into(), Value::from(id.clone()));
    topology.set_value(&patch, SetValueOptions::default());
}

fn window_fn<S: Surface + 'static>(topology: &mut Topology<S>, id: &PenId, binding: &EventBinding) {
    let Some(name) = non_empty(&binding.value) else {
        return;
    };
    let Some(f) = topology.registry().function(name) else {
        log::warn!("No host function registered as {}", name);
        return;
    };
    if let Some(pen) = topology.get_pen(id) {
        f(pen, &binding.params);
    }
}

fn emit<S: Surface + 'static>(topology: &mut Topology<S>, id: &PenId, binding: &EventBinding) {
    let Some(topic) = non_empty(&binding.value) else {
        return;
    };
    let Some(pen) = topology.get_pen(id).map(|p| p.to_persisted()) else {
        return;
    };
    topology.emit(topic, &json!({ "pen": pen, "params": binding.params }));
}
