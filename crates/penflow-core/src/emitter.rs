//! Publish/subscribe bus for document events.

use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Topic that receives every event.
pub const WILDCARD: &str = "*";

/// Callback receiving the topic and its payload.
pub type Handler = Rc<dyn Fn(&str, &Value)>;

/// Handle returned by [`EventBus::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Inner {
    next_id: u64,
    handlers: HashMap<String, Vec<(SubscriptionId, Handler)>>,
}

/// Named-topic event bus. Handlers may subscribe or emit re-entrantly.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Rc<RefCell<Inner>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("EventBus")
            .field("topics", &inner.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, topic: &str, handler: impl Fn(&str, &Value) + 'static) -> SubscriptionId {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner
            .handlers
            .entry(topic.to_string())
            .or_default()
            .push((id, Rc::new(handler)));
        id
    }

    /// Remove one subscription. Returns false if it was not registered.
    pub fn off(&self, topic: &str, id: SubscriptionId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let Some(handlers) = inner.handlers.get_mut(topic) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(h, _)| *h != id);
        before != handlers.len()
    }

    /// Remove every subscription on a topic.
    pub fn off_all(&self, topic: &str) {
        self.inner.borrow_mut().handlers.remove(topic);
    }

    pub fn emit(&self, topic: &str, payload: &Value) {
        // Collect first so handlers can touch the bus.
        let handlers: Vec<Handler> = {
            let inner = self.inner.borrow();
            let direct = inner.handlers.get(topic).into_iter().flatten();
            let wildcard = inner
                .handlers
                .get(WILDCARD)
                .into_iter()
                .flatten()
                .filter(|_| topic != WILDCARD);
            direct.chain(wildcard).map(|(_, h)| h.clone()).collect()
        };
        for handler in handlers {
            handler(topic, payload);
        }
    }

    pub fn clear(&self) {
        self.inner.borrow_mut().handlers.clear();
    }
}
