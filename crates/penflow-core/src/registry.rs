//! Pen-kind registry.
//!
//! Lifecycle hooks, host functions and named predicates are registered here
//! and handed to the engine at construction instead of living in global
//! scope.

use crate::pen::Pen;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Lifecycle callback on a pen.
pub type PenHook = Rc<dyn Fn(&Pen)>;

/// Host function invoked with `(pen, params)`.
pub type HostFn = Rc<dyn Fn(&Pen, &Value)>;

/// Native predicate invoked with `(pen, params)`.
pub type NativePredicate = Rc<dyn Fn(&Pen, &Value) -> bool>;

/// Callback receiving every inbound live-data message.
pub type SocketCallback = Rc<dyn Fn(&Value)>;

/// Lifecycle hooks of one pen kind, looked up by the pen's `name`.
#[derive(Clone, Default)]
pub struct PenKind {
    pub on_add: Option<PenHook>,
    pub on_value: Option<PenHook>,
    pub on_destroy: Option<PenHook>,
    pub on_click: Option<PenHook>,
}

impl PenKind {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_add(mut self, hook: impl Fn(&Pen) + 'static) -> Self {
        self.on_add = Some(Rc::new(hook));
        self
    }

    pub fn on_value(mut self, hook: impl Fn(&Pen) + 'static) -> Self {
        self.on_value = Some(Rc::new(hook));
        self
    }

    pub fn on_destroy(mut self, hook: impl Fn(&Pen) + 'static) -> Self {
        self.on_destroy = Some(Rc::new(hook));
        self
    }

    pub fn on_click(mut self, hook: impl Fn(&Pen) + 'static) -> Self {
        self.on_click = Some(Rc::new(hook));
        self
    }
}

/// Which lifecycle hook to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Add,
    Value,
    Destroy,
    Click,
}

#[derive(Clone, Default)]
pub struct PenRegistry {
    kinds: HashMap<String, PenKind>,
    functions: HashMap<String, HostFn>,
    predicates: HashMap<String, NativePredicate>,
    socket_callbacks: HashMap<String, SocketCallback>,
}

impl fmt::Debug for PenRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PenRegistry")
            .field("kinds", &self.kinds.keys().collect::<Vec<_>>())
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("predicates", &self.predicates.keys().collect::<Vec<_>>())
            .field(
                "socket_callbacks",
                &self.socket_callbacks.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl PenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_kind(&mut self, name: impl Into<String>, kind: PenKind) -> &mut Self {
        self.kinds.insert(name.into(), kind);
        self
    }

    pub fn register_function(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&Pen, &Value) + 'static,
    ) -> &mut Self {
        self.functions.insert(name.into(), Rc::new(f));
        self
    }

    pub fn register_predicate(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&Pen, &Value) -> bool + 'static,
    ) -> &mut Self {
        self.predicates.insert(name.into(), Rc::new(f));
        self
    }

    pub fn register_socket_callback(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&Value) + 'static,
    ) -> &mut Self {
        self.socket_callbacks.insert(name.into(), Rc::new(f));
        self
    }

    pub fn kind(&self, name: &str) -> Option<&PenKind> {
        self.kinds.get(name)
    }

    pub fn function(&self, name: &str) -> Option<HostFn> {
        self.functions.get(name).cloned()
    }

    pub fn predicate(&self, name: &str) -> Option<NativePredicate> {
        self.predicates.get(name).cloned()
    }

    pub fn socket_callback(&self, name: &str) -> Option<SocketCallback> {
        self.socket_callbacks.get(name).cloned()
    }

    /// Hook for `pen`'s kind, if one is registered.
    pub fn hook(&self, pen: &Pen, lifecycle: Lifecycle) -> Option<PenHook> {
        let kind = self.kinds.get(&pen.name)?;
        match lifecycle {
            Lifecycle::Add => kind.on_add.clone(),
            Lifecycle::Value => kind.on_value.clone(),
            Lifecycle::Destroy => kind.on_destroy.clone(),
            Lifecycle::Click => kind.on_click.clone(),
        }
    }
}
