//! The engine façade.
//!
//! `Topology` owns the pen store and history and wires every operation to
//! the same sequence: mutate the store, refresh the runtime cache, record
//! history, publish the structural event, run rule bindings and finally ask
//! the surface to repaint.

use crate::actions::{ActionHandler, builtin};
use crate::animate::{self, TickOutcome};
#[cfg(not(target_arch = "wasm32"))]
use crate::channel::{ChannelEvent, LiveChannel};
use crate::clock::{Clock, SystemClock};
use crate::document::{TopologyData, VERSION};
use crate::emitter::{EventBus, SubscriptionId};
#[cfg(not(target_arch = "wasm32"))]
use crate::error::ChannelError;
use crate::event::{EventAction, EventBinding, Trigger, firing_bindings};
use crate::graph::{self, LineFilter};
use crate::group;
use crate::history::{History, HistoryEntry};
use crate::layout::{self, Align, Padding, Viewport};
use crate::options::Options;
use crate::paint_order::PaintOrder;
use crate::pen::{LockState, Pen, PenId};
use crate::registry::{Lifecycle, PenRegistry};
use crate::surface::{NullSurface, Surface};
use crate::sync::{self, SetValueOptions};
use kurbo::{Point, Rect, Vec2};
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Veto consulted before a pen is added; `false` skips the pen.
pub type BeforeAddPen = Rc<dyn Fn(&Pen) -> bool>;

/// A live diagram: pens, behavior, history and the collaborators that
/// display it.
pub struct Topology<S: Surface + 'static = NullSurface> {
    store: crate::store::PenStore,
    history: History,
    registry: PenRegistry,
    options: Options,
    surface: S,
    bus: EventBus,
    /// Document settings; `pens` is always empty, the store owns them.
    settings: TopologyData,
    clock: Box<dyn Clock>,
    actions: HashMap<EventAction, ActionHandler<S>>,
    before_add_pen: Option<BeforeAddPen>,
    /// Pen and trigger pairs whose bindings are running.
    dispatching: HashSet<(PenId, Trigger)>,
    #[cfg(not(target_arch = "wasm32"))]
    channel: Option<LiveChannel>,
}

impl<S: Surface + 'static> std::fmt::Debug for Topology<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topology")
            .field("pens", &self.store.len())
            .field("locked", &self.settings.locked)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Default for Topology<NullSurface> {
    fn default() -> Self {
        Self::new(PenRegistry::new(), Options::default(), NullSurface)
    }
}

impl<S: Surface + 'static> Topology<S> {
    /// Create an empty engine.
    pub fn new(registry: PenRegistry, options: Options, surface: S) -> Self {
        let actions = builtin::<S>().into_iter().collect();
        Self {
            store: crate::store::PenStore::new(),
            history: History::with_limit(options.history_limit),
            registry,
            options,
            surface,
            bus: EventBus::new(),
            settings: TopologyData::default(),
            clock: Box::new(SystemClock),
            actions,
            before_add_pen: None,
            dispatching: HashSet::new(),
            #[cfg(not(target_arch = "wasm32"))]
            channel: None,
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    // --- Accessors ---

    pub fn store(&self) -> &crate::store::PenStore {
        &self.store
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn registry(&self) -> &PenRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PenRegistry {
        &mut self.registry
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn set_options(&mut self, options: Options) {
        self.history.set_limit(options.history_limit);
        self.options = options;
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// Document settings (without pens).
    pub fn settings(&self) -> &TopologyData {
        &self.settings
    }

    pub fn is_locked(&self) -> bool {
        self.settings.is_locked()
    }

    /// Switch between edit mode (`None`) and run mode.
    pub fn set_locked(&mut self, locked: LockState) {
        self.settings.locked = locked;
    }

    pub fn get_pen(&self, id: &str) -> Option<&Pen> {
        self.store.get(id)
    }

    /// Pens whose id or tags match `key`, in paint order.
    pub fn find(&self, key: &str) -> Vec<PenId> {
        self.store.find(key)
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    // --- Event bus ---

    /// Subscribe to a topic; `*` receives every topic.
    pub fn on(&self, topic: &str, handler: impl Fn(&str, &Value) + 'static) -> SubscriptionId {
        self.bus.on(topic, handler)
    }

    pub fn off(&self, topic: &str, id: SubscriptionId) -> bool {
        self.bus.off(topic, id)
    }

    pub fn emit(&self, topic: &str, payload: &Value) {
        self.bus.emit(topic, payload);
    }

    /// Register or replace the handler for a rule action.
    pub fn register_action(
        &mut self,
        action: EventAction,
        handler: impl Fn(&mut Topology<S>, &PenId, &EventBinding) + 'static,
    ) {
        self.actions.insert(action, Rc::new(handler));
    }

    pub fn set_before_add_pen(&mut self, hook: Option<BeforeAddPen>) {
        self.before_add_pen = hook;
    }

    // --- Document lifecycle ---

    /// Replace the document. Old pens get their destroy hook; the new ones
    /// are added with caches rebuilt, then auto-play animations start and
    /// the live channel connects.
    pub fn open(&mut self, mut data: TopologyData) {
        self.destroy_pens();
        self.history.clear();

        let pens = std::mem::take(&mut data.pens);
        self.settings = data;
        for pen in pens {
            self.store.insert(pen);
        }
        self.store.rebuild_all();
        for id in self.store.ids() {
            self.run_hook(&id, Lifecycle::Add);
        }
        log::info!("Opened document with {} pen(s)", self.store.len());

        self.render(true);
        #[cfg(not(target_arch = "wasm32"))]
        if let Err(err) = self.connect_socket(None) {
            log::warn!("Live channel not connected: {}", err);
        }
        self.start_animate(None);
        self.bus.emit("opened", &Value::Null);
    }

    /// Export the document, stamped with the engine version.
    pub fn data(&self) -> TopologyData {
        TopologyData {
            pens: self.store.iter().cloned().collect(),
            version: Some(VERSION.to_string()),
            ..self.settings.clone()
        }
    }

    /// Empty the document and reset settings and history.
    pub fn clear(&mut self) {
        self.store.clear();
        self.history.clear();
        self.settings = TopologyData::default();
        self.render(true);
    }

    /// Tear down: destroy hooks, close the channel, drop subscribers.
    pub fn destroy(&mut self) {
        self.destroy_pens();
        #[cfg(not(target_arch = "wasm32"))]
        self.close_socket();
        self.bus.clear();
        log::info!("Engine destroyed");
    }

    fn destroy_pens(&mut self) {
        for id in self.store.ids() {
            self.run_hook(&id, Lifecycle::Destroy);
        }
        self.store.clear();
    }

    pub fn resize(&mut self, width: Option<f64>, height: Option<f64>) {
        self.surface.resize(width, height);
        let size = self.surface.size();
        self.bus
            .emit("resize", &json!({ "width": size.width, "height": size.height }));
        self.render(true);
    }

    /// Ask the surface to repaint. A partial render invalidates the world
    /// rect of every dirty pen first.
    pub fn render(&mut self, full: bool) {
        let ids = self.store.ids();
        for id in &ids {
            let Some(pen) = self.store.get_mut(id) else {
                continue;
            };
            if pen.calculative.dirty {
                pen.calculative.dirty = false;
                if !full {
                    self.surface.invalidate(pen.calculative.world_rect);
                }
            }
        }
        self.surface.render(full);
    }

    // --- Pens ---

    pub fn add_pen(&mut self, pen: Pen, history: bool) -> Option<PenId> {
        self.add_pens(vec![pen], history).into_iter().next()
    }

    /// Add pens on top of the paint order. Pens vetoed by the
    /// before-add hook or carrying a duplicate id are skipped.
    pub fn add_pens(&mut self, pens: Vec<Pen>, history: bool) -> Vec<PenId> {
        let mut added = Vec::new();
        for pen in pens {
            if let Some(hook) = &self.before_add_pen {
                if !hook(&pen) {
                    log::debug!("Pen {} vetoed before add", pen.id);
                    continue;
                }
            }
            if let Some(id) = self.store.insert(pen) {
                added.push(id);
            }
        }
        if added.is_empty() {
            return added;
        }
        self.render(true);
        self.notify(Trigger::Add, &added);
        if history {
            self.history.push(HistoryEntry::Add {
                pens: self.store.snapshot(&added),
            });
        }
        added
    }

    /// Delete pens and, recursively, their children. Returns the removed
    /// pens.
    pub fn delete(&mut self, ids: &[PenId], history: bool) -> Vec<Pen> {
        let mut doomed: Vec<PenId> = Vec::new();
        let mut stack: Vec<PenId> = ids.iter().rev().cloned().collect();
        while let Some(id) = stack.pop() {
            if doomed.contains(&id) {
                continue;
            }
            let Some(pen) = self.store.get(&id) else {
                continue;
            };
            stack.extend(pen.children.iter().rev().cloned());
            doomed.push(id);
        }
        if doomed.is_empty() {
            return Vec::new();
        }

        let parents: Vec<PenId> = doomed
            .iter()
            .filter_map(|id| self.store.get(id)?.parent_id.clone())
            .filter(|p| !doomed.contains(p))
            .fold(Vec::new(), |mut acc, p| {
                if !acc.contains(&p) {
                    acc.push(p);
                }
                acc
            });
        let initial = self.store.snapshot(&parents);

        for id in &doomed {
            self.run_hook(id, Lifecycle::Destroy);
        }
        let removed: Vec<(usize, Pen)> = doomed.iter().filter_map(|id| self.store.remove(id)).collect();
        for parent in &parents {
            self.store.dirty_pen_rect(parent);
        }

        if history {
            let delete = HistoryEntry::Delete {
                pens: removed.clone(),
            };
            let entry = if parents.is_empty() {
                delete
            } else {
                HistoryEntry::Batch(vec![
                    delete,
                    HistoryEntry::Update {
                        initial,
                        pens: self.store.snapshot(&parents),
                    },
                ])
            };
            self.history.push(entry);
        }

        let pens: Vec<Pen> = removed.into_iter().map(|(_, pen)| pen).collect();
        self.bus.emit(
            "delete",
            &Value::Array(pens.iter().map(Pen::to_persisted).collect()),
        );
        self.render(true);
        pens
    }

    /// Select exactly `ids`. Deselected pens fire `inactive`, the new
    /// selection fires `active`.
    pub fn active(&mut self, ids: &[PenId]) {
        let deselected = self.store.set_active(ids);
        if !deselected.is_empty() {
            self.notify(Trigger::Inactive, &deselected);
        }
        let selected = self.store.active().to_vec();
        if !selected.is_empty() {
            self.notify(Trigger::Active, &selected);
        }
        self.render(false);
    }

    /// Clear the selection.
    pub fn inactive(&mut self) {
        let previous = self.store.clear_active();
        if !previous.is_empty() {
            self.notify(Trigger::Inactive, &previous);
        }
        self.render(false);
    }

    /// Give a pen a new id, rewriting references to it.
    pub fn change_pen_id(&mut self, old: &str, new: &str) -> bool {
        let renamed = self.store.rename(old, new);
        if renamed {
            self.history.rename(old, new);
            self.render(false);
        } else {
            log::debug!("Cannot rename pen {} to {}", old, new);
        }
        renamed
    }

    pub fn get_parent(&self, id: &str) -> Option<&Pen> {
        self.store.parent_of(id)
    }

    /// Move pens by `delta` in document units. Locked children stay put.
    /// Returns the ids actually moved.
    pub fn translate_pens(&mut self, ids: &[PenId], delta: Vec2, history: bool) -> Vec<PenId> {
        let movable: Vec<PenId> = ids
            .iter()
            .filter(|id| match self.store.get(id) {
                Some(pen) => pen.parent_id.is_none() || pen.locked.is_none(),
                None => false,
            })
            .cloned()
            .collect();
        if movable.is_empty() {
            return movable;
        }
        let initial = self.store.snapshot(&movable);

        for id in &movable {
            let is_line = self.store.get(id).is_some_and(Pen::is_line);
            if is_line {
                if let Some(line) = self.store.get_mut(id) {
                    for anchor in line.anchors.iter_mut().filter(|a| a.connect_to.is_none()) {
                        anchor.x += delta.x;
                        anchor.y += delta.y;
                    }
                }
                self.store.dirty_pen_rect(id);
            } else if let Some(rect) = self.store.world_rect(id) {
                self.store.set_world_rect(id, rect + delta);
            }
        }

        if history {
            self.history.push(HistoryEntry::Update {
                initial,
                pens: self.store.snapshot(&movable),
            });
        }
        self.render(false);
        movable
    }

    // --- Grouping ---

    /// Group pens under one container, which ends up selected. Returns the
    /// container id.
    pub fn combine(&mut self, ids: &[PenId]) -> Option<PenId> {
        let combined = group::combine(&mut self.store, ids)?;
        if let Some(entry) = combined.entry {
            self.history.push(entry);
        }
        let container = combined.container;
        self.store.set_active(std::slice::from_ref(&container));
        self.notify(Trigger::Add, std::slice::from_ref(&container));
        self.render(true);
        Some(container)
    }

    /// Release a container's children. Synthetic containers are deleted.
    pub fn uncombine(&mut self, id: &str) -> bool {
        let Some(uncombined) = group::uncombine(&mut self.store, id) else {
            return false;
        };
        if let Some(pen) = &uncombined.deleted {
            if let Some(hook) = self.registry.hook(pen, Lifecycle::Destroy) {
                hook(pen);
            }
            self.bus.emit("delete", &Value::Array(vec![pen.to_persisted()]));
        }
        self.history.push(uncombined.entry);
        self.store.clear_active();
        self.render(true);
        true
    }

    /// Reparent `children` under `parent`. Returns the ids touched.
    pub fn push_children(&mut self, parent: &str, children: &[PenId]) -> Vec<PenId> {
        let mut involved: Vec<PenId> = vec![parent.to_string()];
        for child in children {
            let previous = self.store.get(child).and_then(|p| p.parent_id.clone());
            for id in std::iter::once(child.clone()).chain(previous) {
                if !involved.contains(&id) {
                    involved.push(id);
                }
            }
        }
        let initial = self.store.snapshot(&involved);

        let touched = group::push_children(&mut self.store, parent, children);
        if !touched.is_empty() {
            self.history.push(HistoryEntry::Update {
                initial,
                pens: self.store.snapshot(&involved),
            });
            self.render(true);
        }
        touched
    }

    // --- Paint order ---

    pub fn top(&mut self, id: &str) -> bool {
        self.reorder(|order| order.top(id))
    }

    pub fn bottom(&mut self, id: &str) -> bool {
        self.reorder(|order| order.bottom(id))
    }

    pub fn up(&mut self, id: &str) -> bool {
        self.reorder(|order| order.up(id))
    }

    pub fn down(&mut self, id: &str) -> bool {
        self.reorder(|order| order.down(id))
    }

    /// Move a pen to paint index `index`, clamped to the last slot.
    pub fn set_layer(&mut self, id: &str, index: usize) -> bool {
        self.reorder(|order| order.set_layer(id, index))
    }

    fn reorder(&mut self, f: impl FnOnce(&mut PaintOrder) -> bool) -> bool {
        let initial = self.store.ids();
        if !f(self.store.order_mut()) {
            return false;
        }
        let order = self.store.ids();
        if order == initial {
            return false;
        }
        self.history.push(HistoryEntry::Reorder { initial, order });
        self.render(true);
        true
    }

    // --- History ---

    pub fn push_history(&mut self, entry: HistoryEntry) {
        self.history.push(entry);
    }

    pub fn undo(&mut self) -> bool {
        let done = self.history.undo(&mut self.store);
        if done {
            self.render(true);
        }
        done
    }

    pub fn redo(&mut self) -> bool {
        let done = self.history.redo(&mut self.store);
        if done {
            self.render(true);
        }
        done
    }

    // --- Rules ---

    /// Dispatch a pointer-originated trigger for one pen: publish it and
    /// run the matching rules.
    pub fn dispatch(&mut self, trigger: Trigger, id: &str) {
        if !self.store.contains(id) {
            return;
        }
        self.notify(trigger, &[id.to_string()]);
    }

    /// Publish `trigger` for `ids` on the bus, then apply the dispatch
    /// policy: lifecycle hooks always, bindings only in run mode.
    fn notify(&mut self, trigger: Trigger, ids: &[PenId]) {
        let payload = match ids {
            [single] if !matches!(trigger, Trigger::Add) => self
                .store
                .get(single)
                .map(Pen::to_persisted)
                .unwrap_or(Value::Null),
            _ => Value::Array(
                ids.iter()
                    .filter_map(|id| self.store.get(id))
                    .map(Pen::to_persisted)
                    .collect(),
            ),
        };
        self.bus.emit(trigger.as_str(), &payload);

        for id in ids {
            match trigger {
                Trigger::Add => self.run_hook(id, Lifecycle::Add),
                Trigger::Click => self.run_hook(id, Lifecycle::Click),
                Trigger::ValueUpdate => self.run_hook(id, Lifecycle::Value),
                _ => {}
            }
            if self.is_locked() {
                self.do_event(id, trigger);
            }
        }
    }

    fn run_hook(&self, id: &str, lifecycle: Lifecycle) {
        let Some(pen) = self.store.get(id) else {
            return;
        };
        if let Some(hook) = self.registry.hook(pen, lifecycle) {
            hook(pen);
        }
    }

    /// Run the bindings of pen `id` that fire for `trigger`. A binding that
    /// re-triggers its own pen and trigger is not run again.
    fn do_event(&mut self, id: &str, trigger: Trigger) {
        let key = (id.to_string(), trigger);
        if self.dispatching.contains(&key) {
            log::debug!("Skipping re-entrant {} on pen {}", trigger.as_str(), id);
            return;
        }
        let fired = {
            let actions = &self.actions;
            let Some(pen) = self.store.get_mut(id) else {
                return;
            };
            firing_bindings(pen, trigger.as_str(), |a| actions.contains_key(a), &self.registry)
        };
        let id = id.to_string();
        self.dispatching.insert(key.clone());
        for binding in &fired {
            let Some(handler) = self.actions.get(&binding.action).cloned() else {
                continue;
            };
            handler(self, &id, binding);
        }
        self.dispatching.remove(&key);
    }

    // --- Animation ---

    /// Start (or resume) timelines. Without a target, every auto-play pen
    /// with frames.
    pub fn start_animate(&mut self, target: Option<&[PenId]>) {
        let ids = match target {
            Some(ids) => ids.to_vec(),
            None => self
                .store
                .iter()
                .filter(|p| p.auto_play && !p.frames.is_empty())
                .map(|p| p.id.clone())
                .collect(),
        };
        if ids.is_empty() {
            return;
        }
        let now = self.clock.now();
        animate::start(&mut self.store, &ids, now);
    }

    /// Pause timelines. Without a target, every animating pen.
    pub fn pause_animate(&mut self, target: Option<&[PenId]>) {
        let ids = target.map_or_else(|| self.store.animates().to_vec(), <[PenId]>::to_vec);
        let now = self.clock.now();
        animate::pause(&mut self.store, &ids, now);
    }

    /// Stop timelines and restore the persisted values. The pens stay
    /// scheduled and replay from their first frame on the next tick.
    pub fn stop_animate(&mut self, target: Option<&[PenId]>) {
        let ids = target.map_or_else(|| self.store.animates().to_vec(), <[PenId]>::to_vec);
        animate::stop(&mut self.store, &ids);
        self.render(false);
    }

    /// Advance every running timeline to the clock's current time.
    pub fn tick(&mut self) -> TickOutcome {
        let now = self.clock.now();
        let outcome = animate::tick(&mut self.store, now);
        if !outcome.dirty.is_empty() || !outcome.finished.is_empty() {
            self.render(false);
        }
        outcome
    }

    // --- Values ---

    /// Merge a partial value into the pens it addresses (`id`, else
    /// `tag`). Returns the ids updated.
    pub fn set_value(&mut self, patch: &Map<String, Value>, opts: SetValueOptions) -> Vec<PenId> {
        let Some(key) = sync::patch_target(patch) else {
            log::warn!("Value without id or tag ignored");
            return Vec::new();
        };
        let ids = self.store.find(&key);
        let initial = if opts.history {
            self.store.snapshot(&ids)
        } else {
            Vec::new()
        };

        let mut changed = Vec::new();
        for id in &ids {
            match sync::apply_value(&mut self.store, id, patch) {
                Ok(Some(change)) => {
                    if change.image {
                        if let Some(pen) = self.store.get(id) {
                            self.surface.load_image(pen);
                        }
                    }
                    changed.push(change.id);
                }
                Ok(None) => {}
                Err(err) => log::warn!("Value for pen {} ignored: {}", id, err),
            }
        }
        for id in &changed {
            self.notify(Trigger::ValueUpdate, std::slice::from_ref(id));
        }

        if opts.history && !changed.is_empty() {
            let initial = initial.into_iter().filter(|p| changed.contains(&p.id)).collect();
            self.history.push(HistoryEntry::Update {
                initial,
                pens: self.store.snapshot(&changed),
            });
        }
        if opts.render {
            self.render(true);
        }
        changed
    }

    /// Apply an inbound live-data message. Malformed payloads are logged
    /// and dropped.
    pub fn do_socket(&mut self, payload: &str, sub_id: Option<&str>) {
        let patches = match sync::parse_message(payload, sub_id) {
            Ok(patches) => patches,
            Err(err) => {
                log::warn!("Dropping live-data message: {}", err);
                return;
            }
        };
        let opts = SetValueOptions {
            history: false,
            render: false,
        };
        for patch in &patches {
            self.set_value(patch, opts);
        }
        self.render(true);

        let message = Value::Array(patches.into_iter().map(Value::Object).collect());
        self.bus.emit("socket", &message);
        if let Some(name) = self.settings.socket_cb_fn.as_deref() {
            match self.registry.socket_callback(name) {
                Some(cb) => cb(&message),
                None => log::warn!("No socket callback registered as {}", name),
            }
        }
    }

    // --- Live channel ---

    /// Connect the live-data channel to `url`, or to the document's
    /// `websocket` when `None`. Without either this does nothing.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn connect_socket(&mut self, url: Option<&str>) -> Result<(), ChannelError> {
        let Some(url) = url.map(str::to_string).or_else(|| self.settings.websocket.clone()) else {
            return Ok(());
        };
        self.close_socket();
        let mut channel = LiveChannel::new();
        channel.connect(&url)?;
        self.channel = Some(channel);
        Ok(())
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn close_socket(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn is_socket_open(&self) -> bool {
        self.channel.as_ref().is_some_and(LiveChannel::is_open)
    }

    /// Drain the channel into `do_socket`. Returns the number of messages
    /// applied.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn pump_socket(&mut self) -> usize {
        let events = match self.channel.as_mut() {
            Some(channel) => channel.poll_events(),
            None => return 0,
        };
        let mut messages = 0;
        for event in events {
            match event {
                ChannelEvent::Message(text) => {
                    self.do_socket(&text, None);
                    messages += 1;
                }
                ChannelEvent::Connected => log::info!("Live channel connected"),
                ChannelEvent::Disconnected => log::info!("Live channel disconnected"),
                ChannelEvent::Reconnecting { attempt } => {
                    log::info!("Live channel reconnecting (attempt {})", attempt)
                }
                ChannelEvent::Error { message } => log::warn!("Live channel error: {}", message),
            }
        }
        messages
    }

    // --- Connectivity ---

    pub fn get_lines(&self, node: &str, filter: LineFilter) -> Vec<PenId> {
        graph::get_lines(&self.store, node, filter)
    }

    pub fn next_node(&self, id: &str) -> Vec<PenId> {
        graph::next_node(&self.store, id)
    }

    pub fn previous_node(&self, id: &str) -> Vec<PenId> {
        graph::previous_node(&self.store, id)
    }

    pub fn downstream_nodes(&self, id: &str) -> Vec<PenId> {
        graph::downstream_nodes(&self.store, id)
    }

    pub fn upstream_nodes(&self, id: &str) -> Vec<PenId> {
        graph::upstream_nodes(&self.store, id)
    }

    // --- Layout ---

    pub fn get_rect(&self, ids: Option<&[PenId]>) -> Option<Rect> {
        layout::get_rect(&self.store, ids)
    }

    pub fn align_nodes(&mut self, align: Align, ids: Option<&[PenId]>, rect: Option<Rect>) -> bool {
        let entry = layout::align_nodes(&mut self.store, align, ids, rect);
        self.record(entry)
    }

    pub fn space_between(&mut self, ids: Option<&[PenId]>, width: Option<f64>) -> bool {
        let entry = layout::space_between(&mut self.store, ids, width);
        self.record(entry)
    }

    pub fn space_between_column(&mut self, ids: Option<&[PenId]>, height: Option<f64>) -> bool {
        let entry = layout::space_between_column(&mut self.store, ids, height);
        self.record(entry)
    }

    /// Grid layout; `space` defaults to `Options::layout_space`.
    pub fn layout(&mut self, ids: Option<&[PenId]>, width: Option<f64>, space: Option<f64>) -> bool {
        let space = space.unwrap_or(self.options.layout_space);
        let entry = layout::layout(&mut self.store, ids, width, space);
        self.record(entry)
    }

    /// Push a bulk layout entry and publish a value update for every pen
    /// it moved.
    fn record(&mut self, entry: Option<HistoryEntry>) -> bool {
        let Some(entry) = entry else {
            return false;
        };
        let moved: Vec<PenId> = match &entry {
            HistoryEntry::Update { initial, pens } => initial
                .iter()
                .zip(pens)
                .filter(|(a, b)| a.to_persisted() != b.to_persisted())
                .map(|(_, b)| b.id.clone())
                .collect(),
            _ => Vec::new(),
        };
        self.history.push(entry);
        for id in &moved {
            self.notify(Trigger::ValueUpdate, std::slice::from_ref(id));
        }
        self.render(true);
        true
    }

    // --- Viewport ---

    pub fn viewport(&self) -> Viewport {
        Viewport {
            offset: Vec2::new(self.settings.x, self.settings.y),
            scale: self.settings.scale,
        }
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.settings.x = viewport.offset.x;
        self.settings.y = viewport.offset.y;
        self.settings.scale = viewport.scale;
    }

    pub fn translate(&mut self, delta: Vec2) {
        let mut viewport = self.viewport();
        viewport.translate(delta);
        self.set_viewport(viewport);
        self.bus
            .emit("translate", &json!({ "x": self.settings.x, "y": self.settings.y }));
        self.render(true);
    }

    /// Zoom to `scale` (clamped to the configured range) around `center`,
    /// by default the middle of the surface.
    pub fn scale(&mut self, scale: f64, center: Option<Point>) {
        let scale = self.options.clamp_scale(scale);
        let center = center.unwrap_or_else(|| {
            let size = self.surface.size();
            Point::new(size.width / 2.0, size.height / 2.0)
        });
        let mut viewport = self.viewport();
        viewport.scale_at(scale, center);
        self.set_viewport(viewport);
        self.bus.emit("scale", &json!(scale));
        self.render(true);
    }

    /// Scale the whole document into the surface and center it. With `fit`
    /// everything shows; otherwise the view is filled.
    pub fn fit_view(&mut self, fit: bool, padding: Option<Padding>) {
        let Some(rect) = self.get_rect(None) else {
            return;
        };
        let padding = padding.unwrap_or_else(|| Padding::from(self.options.view_padding));
        let Some(ratio) = Viewport::fit_scale(rect, self.surface.size(), padding, fit) else {
            return;
        };
        let mut viewport = self.viewport();
        viewport.scale = self.options.clamp_scale(ratio);
        self.set_viewport(viewport);
        self.center_view();
    }

    /// Put the document's center in the middle of the surface.
    pub fn center_view(&mut self) {
        let Some(rect) = self.get_rect(None) else {
            return;
        };
        let mut viewport = self.viewport();
        viewport.center_on(rect, self.surface.size());
        self.set_viewport(viewport);
        self.render(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animate::Frame;
    use crate::clock::ManualClock;
    use crate::event::Predicate;
    use crate::registry::PenKind;
    use crate::surface::RecordingSurface;
    use std::cell::RefCell;

    type Engine = Topology<RecordingSurface>;

    fn engine() -> Engine {
        Topology::new(PenRegistry::new(), Options::default(), RecordingSurface::default())
    }

    fn recorder(topology: &Engine, topic: &str) -> Rc<RefCell<Vec<Value>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        topology.on(topic, move |_, payload| sink.borrow_mut().push(payload.clone()));
        seen
    }

    fn patch(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn ids(names: &[&str]) -> Vec<PenId> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn chain_doc() -> TopologyData {
        TopologyData {
            pens: vec![
                Pen::node("n1", 0.0, 0.0, 10.0, 10.0),
                Pen::node("n2", 100.0, 0.0, 10.0, 10.0),
                Pen::line("l1", Some("n1"), Some("n2")),
            ],
            ..TopologyData::default()
        }
    }

    #[test]
    fn test_open_runs_hooks_and_emits_opened() {
        let destroyed = Rc::new(RefCell::new(Vec::new()));
        let added = Rc::new(RefCell::new(Vec::new()));
        let mut registry = PenRegistry::new();
        let (d, a) = (destroyed.clone(), added.clone());
        registry.register_kind(
            "rectangle",
            PenKind::new()
                .on_destroy(move |p| d.borrow_mut().push(p.id.clone()))
                .on_add(move |p| a.borrow_mut().push(p.id.clone())),
        );
        let mut t = Topology::new(registry, Options::default(), RecordingSurface::default());
        let opened = recorder(&t, "opened");

        t.open(chain_doc());
        assert_eq!(*added.borrow(), ids(&["n1", "n2"]));
        assert_eq!(opened.borrow().len(), 1);

        t.open(TopologyData::default());
        assert_eq!(*destroyed.borrow(), ids(&["n1", "n2"]));
        assert!(t.store().is_empty());
    }

    #[test]
    fn test_data_round_trip() {
        let mut t = engine();
        let mut doc = chain_doc();
        doc.socket_cb_fn = Some("onData".into());
        t.open(doc);
        let data = t.data();
        assert_eq!(data.pens.len(), 3);
        assert_eq!(data.version.as_deref(), Some(VERSION));
        assert_eq!(data.socket_cb_fn.as_deref(), Some("onData"));
        assert!(t.settings().pens.is_empty());
    }

    #[test]
    fn test_add_pens_veto_and_history() {
        let mut t = engine();
        let added = recorder(&t, "add");
        t.set_before_add_pen(Some(Rc::new(|p: &Pen| p.id != "blocked")));
        let ids = t.add_pens(
            vec![
                Pen::node("a", 0.0, 0.0, 1.0, 1.0),
                Pen::node("blocked", 0.0, 0.0, 1.0, 1.0),
            ],
            true,
        );
        assert_eq!(ids, vec!["a"]);
        assert_eq!(added.borrow().len(), 1);
        assert!(t.undo());
        assert!(t.store().is_empty());
        assert!(t.redo());
        assert!(t.store().contains("a"));
    }

    #[test]
    fn test_delete_recurses_and_undoes() {
        let mut t = engine();
        t.add_pens(
            vec![
                Pen::node("a", 0.0, 0.0, 10.0, 10.0),
                Pen::node("b", 20.0, 0.0, 10.0, 10.0),
                Pen::node("other", 50.0, 0.0, 10.0, 10.0),
            ],
            false,
        );
        let container = t.combine(&ids(&["a", "b"])).unwrap();
        let before: Vec<Value> = t.store().iter().map(Pen::to_persisted).collect();

        let removed = t.delete(&[container.clone()], true);
        assert_eq!(removed.len(), 3);
        assert_eq!(t.store().ids(), vec!["other"]);

        assert!(t.undo());
        let after: Vec<Value> = t.store().iter().map(Pen::to_persisted).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_delete_child_updates_parent() {
        let mut t = engine();
        t.add_pens(
            vec![
                Pen::node("a", 0.0, 0.0, 10.0, 10.0),
                Pen::node("b", 20.0, 0.0, 10.0, 10.0),
            ],
            false,
        );
        let container = t.combine(&ids(&["a", "b"])).unwrap();
        t.delete(&ids(&["a"]), true);
        assert_eq!(t.get_pen(&container).unwrap().children, vec!["b"]);
        t.undo();
        assert_eq!(t.get_pen(&container).unwrap().children, vec!["a", "b"]);
        assert_eq!(t.get_parent("a").unwrap().id, container);
    }

    #[test]
    fn test_rules_only_fire_when_locked() {
        let mut t = engine();
        t.add_pen(
            Pen::node("p", 0.0, 0.0, 1.0, 1.0).with_events(vec![
                EventBinding::new(Trigger::Click, EventAction::Emit).with_value("clicked"),
                EventBinding::new(Trigger::DblClick, EventAction::Emit).with_value("double"),
            ]),
            false,
        );
        let clicked = recorder(&t, "clicked");
        let double = recorder(&t, "double");

        t.dispatch(Trigger::Click, "p");
        assert!(clicked.borrow().is_empty());

        t.set_locked(LockState::Disable);
        t.dispatch(Trigger::Click, "p");
        assert_eq!(clicked.borrow().len(), 1);
        assert_eq!(clicked.borrow()[0]["pen"]["id"], "p");
        assert!(double.borrow().is_empty());

        t.dispatch(Trigger::DblClick, "p");
        assert_eq!(double.borrow().len(), 1);
    }

    #[test]
    fn test_click_hook_runs_unlocked() {
        let clicks = Rc::new(RefCell::new(0));
        let mut registry = PenRegistry::new();
        let c = clicks.clone();
        registry.register_kind("rectangle", PenKind::new().on_click(move |_| *c.borrow_mut() += 1));
        let mut t = Topology::new(registry, Options::default(), RecordingSurface::default());
        t.add_pen(Pen::node("p", 0.0, 0.0, 1.0, 1.0), false);
        t.dispatch(Trigger::Click, "p");
        assert_eq!(*clicks.borrow(), 1);
    }

    #[test]
    fn test_link_action_uses_default_target() {
        let mut t = engine();
        t.set_locked(LockState::Disable);
        t.add_pen(
            Pen::node("p", 0.0, 0.0, 1.0, 1.0).with_events(vec![
                EventBinding::new(Trigger::Click, EventAction::Link).with_value("https://example.com"),
            ]),
            false,
        );
        t.dispatch(Trigger::Click, "p");
        assert_eq!(
            t.surface().opened,
            vec![("https://example.com".to_string(), "_blank".to_string())]
        );
    }

    #[test]
    fn test_function_action_sets_values() {
        let mut t = engine();
        t.set_locked(LockState::Disable);
        let mut pen = Pen::node("p", 0.0, 0.0, 1.0, 1.0).with_events(vec![
            EventBinding::new(Trigger::Click, EventAction::Function)
                .with_value("pen.count = pen.count + params.step;")
                .with_params(json!({ "step": 2 })),
        ]);
        pen.extra.insert("count".into(), json!(1));
        t.add_pen(pen, false);
        t.dispatch(Trigger::Click, "p");
        t.dispatch(Trigger::Click, "p");
        assert_eq!(t.get_pen("p").unwrap().extra["count"], json!(5.0));
    }

    #[test]
    fn test_gated_binding() {
        let mut t = engine();
        t.set_locked(LockState::Disable);
        let mut pen = Pen::node("p", 0.0, 0.0, 1.0, 1.0).with_events(vec![
            EventBinding::new(Trigger::ValueUpdate, EventAction::Emit)
                .with_value("alarm")
                .with_predicate(Predicate::comparison("temp", ">", 50)),
        ]);
        pen.extra.insert("temp".into(), json!(20));
        t.add_pen(pen, false);
        let alarms = recorder(&t, "alarm");

        t.set_value(&patch(json!({"id": "p", "temp": 40})), SetValueOptions::default());
        assert!(alarms.borrow().is_empty());
        t.set_value(&patch(json!({"id": "p", "temp": 80})), SetValueOptions::default());
        assert_eq!(alarms.borrow().len(), 1);
    }

    #[test]
    fn test_custom_action() {
        let mut t = engine();
        t.set_locked(LockState::Disable);
        let hits = Rc::new(RefCell::new(Vec::new()));
        let h = hits.clone();
        t.register_action(EventAction::Custom("beep".into()), move |_, id, b| {
            h.borrow_mut().push((id.clone(), b.value.clone()));
        });
        t.add_pen(
            Pen::node("p", 0.0, 0.0, 1.0, 1.0).with_events(vec![
                EventBinding::new(Trigger::Enter, EventAction::Custom("beep".into())).with_value(3),
                EventBinding::new(Trigger::Enter, EventAction::Custom("unknown".into())),
            ]),
            false,
        );
        t.dispatch(Trigger::Enter, "p");
        assert_eq!(*hits.borrow(), vec![("p".to_string(), json!(3))]);
    }

    #[test]
    fn test_set_value_by_tag_with_history() {
        let mut t = engine();
        t.add_pens(
            vec![
                Pen::node("a", 0.0, 0.0, 100.0, 20.0).with_tags(["pump"]),
                Pen::node("b", 0.0, 0.0, 100.0, 20.0).with_tags(["pump"]),
                Pen::node("c", 0.0, 0.0, 100.0, 20.0),
            ],
            false,
        );
        let updated = t.set_value(
            &patch(json!({"tag": "pump", "text": "on"})),
            SetValueOptions {
                history: true,
                render: true,
            },
        );
        assert_eq!(updated, ids(&["a", "b"]));
        assert_eq!(t.get_pen("a").unwrap().calculative.text_lines, vec!["on"]);
        assert!(t.get_pen("c").unwrap().text.is_none());
        assert!(t.undo());
        assert!(t.get_pen("a").unwrap().text.is_none());
        assert!(t.get_pen("b").unwrap().text.is_none());
    }

    #[test]
    fn test_set_value_image_loads() {
        let mut t = engine();
        t.add_pen(Pen::node("a", 0.0, 0.0, 1.0, 1.0), false);
        t.set_value(&patch(json!({"id": "a", "image": "pump.png"})), SetValueOptions::default());
        assert_eq!(t.surface().images, vec!["a"]);
    }

    #[test]
    fn test_do_socket() {
        let received = Rc::new(RefCell::new(Vec::new()));
        let mut registry = PenRegistry::new();
        let r = received.clone();
        registry.register_socket_callback("onData", move |msg| r.borrow_mut().push(msg.clone()));
        let mut t = Topology::new(registry, Options::default(), RecordingSurface::default());
        let mut doc = chain_doc();
        doc.socket_cb_fn = Some("onData".into());
        t.open(doc);
        let socket = recorder(&t, "socket");

        t.do_socket(r#"[{"id": "n1", "x": 50}]"#, None);
        assert_eq!(t.get_pen("n1").unwrap().x, 50.0);
        assert_eq!(t.get_pen("l1").unwrap().calculative.world_anchors[0].x, 55.0);
        assert_eq!(socket.borrow().len(), 1);
        assert_eq!(received.borrow().len(), 1);

        t.do_socket(r#"{"y": 7}"#, Some("n2"));
        assert_eq!(t.get_pen("n2").unwrap().y, 7.0);

        let before = t.data().pens.iter().map(Pen::to_persisted).collect::<Vec<_>>();
        t.do_socket("{not json", None);
        let after = t.data().pens.iter().map(Pen::to_persisted).collect::<Vec<_>>();
        assert_eq!(before, after);
        assert_eq!(socket.borrow().len(), 2);
    }

    #[test]
    fn test_animation_through_actions() {
        let clock = ManualClock::new(1_000);
        let mut t = engine().with_clock(clock.clone());
        t.set_locked(LockState::Disable);
        let mut lamp = Pen::node("lamp", 0.0, 0.0, 10.0, 10.0)
            .with_tags(["lamp"])
            .with_frames(vec![Frame::new(1_000).with("opacity", 0.0)]);
        lamp.extra.insert("opacity".into(), json!(1.0));
        t.add_pens(
            vec![
                lamp,
                Pen::node("button", 0.0, 0.0, 10.0, 10.0).with_events(vec![
                    EventBinding::new(Trigger::Click, EventAction::StartAnimate).with_value("lamp"),
                    EventBinding::new(Trigger::DblClick, EventAction::PauseAnimate)
                        .with_value(json!(["lamp"])),
                ]),
            ],
            false,
        );
        t.dispatch(Trigger::Click, "button");
        assert!(t.store().is_animating("lamp"));
        assert!(!t.store().is_animating("button"));

        t.tick();
        clock.advance(500);
        t.tick();
        assert_eq!(t.get_pen("lamp").unwrap().calculative.number("opacity"), Some(0.5));

        t.dispatch(Trigger::DblClick, "button");
        clock.advance(300);
        t.tick();
        assert_eq!(t.get_pen("lamp").unwrap().calculative.number("opacity"), Some(0.5));
    }

    #[test]
    fn test_open_starts_auto_play() {
        let mut t = engine().with_clock(ManualClock::new(0));
        let mut lamp = Pen::node("lamp", 0.0, 0.0, 1.0, 1.0).with_frames(vec![Frame::new(100)]);
        lamp.auto_play = true;
        t.open(TopologyData {
            pens: vec![lamp, Pen::node("still", 0.0, 0.0, 1.0, 1.0)],
            ..TopologyData::default()
        });
        assert_eq!(t.store().animates(), ids(&["lamp"]));
        t.stop_animate(None);
        assert!(t.store().is_animating("lamp"));
    }

    #[test]
    fn test_layers_record_history() {
        let mut t = engine();
        t.add_pens(
            vec![
                Pen::node("a", 0.0, 0.0, 1.0, 1.0),
                Pen::node("b", 0.0, 0.0, 1.0, 1.0),
                Pen::node("c", 0.0, 0.0, 1.0, 1.0),
            ],
            false,
        );
        assert!(t.top("a"));
        assert_eq!(t.store().ids(), ids(&["b", "c", "a"]));
        assert!(!t.top("a"));
        assert!(t.set_layer("a", 0));
        assert_eq!(t.store().ids(), ids(&["a", "b", "c"]));
        t.undo();
        assert_eq!(t.store().ids(), ids(&["b", "c", "a"]));
    }

    #[test]
    fn test_translate_skips_locked_children() {
        let mut t = engine();
        t.add_pens(
            vec![
                Pen::node("a", 0.0, 0.0, 10.0, 10.0),
                Pen::node("b", 20.0, 0.0, 10.0, 10.0),
            ],
            false,
        );
        let container = t.combine(&ids(&["a", "b"])).unwrap();
        let moved = t.translate_pens(&ids(&["a"]), Vec2::new(5.0, 5.0), true);
        assert!(moved.is_empty());

        let moved = t.translate_pens(&[container.clone()], Vec2::new(5.0, 5.0), true);
        assert_eq!(moved, vec![container]);
        assert_eq!(t.store().world_rect("a").unwrap().origin(), Point::new(5.0, 5.0));
    }

    #[test]
    fn test_active_and_inactive_events() {
        let mut t = engine();
        t.add_pens(
            vec![Pen::node("a", 0.0, 0.0, 1.0, 1.0), Pen::node("b", 0.0, 0.0, 1.0, 1.0)],
            false,
        );
        let active = recorder(&t, "active");
        let inactive = recorder(&t, "inactive");
        t.active(&ids(&["a"]));
        t.active(&ids(&["b"]));
        assert_eq!(active.borrow().len(), 2);
        assert_eq!(inactive.borrow().len(), 1);
        t.inactive();
        assert_eq!(inactive.borrow().len(), 2);
        assert!(t.store().active().is_empty());
    }

    #[test]
    fn test_uncombine_through_facade() {
        let mut t = engine();
        t.add_pens(
            vec![Pen::node("a", 0.0, 0.0, 10.0, 10.0), Pen::node("b", 20.0, 0.0, 10.0, 10.0)],
            false,
        );
        let deleted = recorder(&t, "delete");
        let container = t.combine(&ids(&["a", "b"])).unwrap();
        assert_eq!(t.store().active(), [container.clone()]);
        assert!(t.uncombine(&container));
        assert!(!t.store().contains(&container));
        assert_eq!(deleted.borrow().len(), 1);
        assert!(t.store().active().is_empty());
        assert!(!t.uncombine("a"));
    }

    #[test]
    fn test_graph_and_layout_wrappers() {
        let mut t = engine();
        t.open(chain_doc());
        assert_eq!(t.next_node("n1"), ids(&["n2"]));
        assert_eq!(t.get_lines("n2", LineFilter::In), ids(&["l1"]));
        assert!(t.align_nodes(Align::Top, None, Some(Rect::new(0.0, 20.0, 200.0, 100.0))));
        assert_eq!(t.get_pen("n2").unwrap().y, 20.0);
        assert!(t.undo());
        assert_eq!(t.get_pen("n2").unwrap().y, 0.0);
    }

    #[test]
    fn test_layout_helpers_publish_value_updates() {
        let hooked = Rc::new(RefCell::new(Vec::new()));
        let mut registry = PenRegistry::new();
        let h = hooked.clone();
        registry.register_kind(
            "rectangle",
            PenKind::new().on_value(move |p| h.borrow_mut().push(p.id.clone())),
        );
        let mut t = Topology::new(registry, Options::default(), RecordingSurface::default());
        t.open(TopologyData {
            pens: vec![
                Pen::node("n1", 0.0, 0.0, 10.0, 10.0),
                Pen::node("n2", 100.0, 30.0, 10.0, 10.0),
            ],
            ..TopologyData::default()
        });
        let updates = recorder(&t, "valueUpdate");

        assert!(t.align_nodes(Align::Top, None, None));
        assert_eq!(*hooked.borrow(), ids(&["n2"]));
        assert_eq!(updates.borrow().len(), 1);
        assert_eq!(updates.borrow()[0]["id"], "n2");
        assert_eq!(updates.borrow()[0]["y"], json!(0.0));
    }

    #[test]
    fn test_value_update_function_runs_once() {
        let mut t = engine();
        t.set_locked(LockState::Disable);
        let mut pen = Pen::node("p", 0.0, 0.0, 1.0, 1.0).with_events(vec![
            EventBinding::new(Trigger::ValueUpdate, EventAction::Function)
                .with_value("pen.count = pen.count + 1"),
        ]);
        pen.extra.insert("count".into(), json!(0));
        t.add_pen(pen, false);

        t.do_socket(r#"{"id":"p","temp":1}"#, None);
        assert_eq!(t.get_pen("p").unwrap().extra["count"], json!(1.0));
        t.do_socket(r#"{"id":"p","temp":2}"#, None);
        assert_eq!(t.get_pen("p").unwrap().extra["count"], json!(2.0));
        // Repeating a value changes nothing and fires nothing.
        t.do_socket(r#"{"id":"p","temp":2}"#, None);
        assert_eq!(t.get_pen("p").unwrap().extra["count"], json!(2.0));
    }

    #[test]
    fn test_rename_keeps_history_consistent() {
        let mut t = engine();
        t.add_pen(Pen::node("a", 0.0, 0.0, 10.0, 10.0), true);
        t.translate_pens(&ids(&["a"]), Vec2::new(5.0, 0.0), true);
        assert!(t.change_pen_id("a", "b"));

        assert!(t.undo());
        assert_eq!(t.store().ids(), ids(&["b"]));
        assert_eq!(t.get_pen("b").unwrap().x, 0.0);
        assert!(t.undo());
        assert!(t.store().is_empty());
        assert!(t.redo());
        assert!(t.redo());
        assert_eq!(t.store().ids(), ids(&["b"]));
        assert_eq!(t.get_pen("b").unwrap().x, 5.0);
    }

    #[test]
    fn test_fit_and_scale() {
        let mut t = engine();
        t.open(TopologyData {
            pens: vec![Pen::node("a", 0.0, 0.0, 100.0, 50.0)],
            ..TopologyData::default()
        });
        t.resize(Some(220.0), Some(220.0));
        t.fit_view(true, None);
        assert_eq!(t.viewport().scale, 2.0);
        assert_eq!(t.viewport().to_screen(Point::new(50.0, 25.0)), Point::new(110.0, 110.0));

        t.scale(100.0, None);
        assert_eq!(t.viewport().scale, 10.0);
        t.translate(Vec2::new(1.0, 2.0));
        let vp = t.viewport();
        assert_eq!(vp.to_screen(Point::new(50.0, 25.0)), Point::new(111.0, 112.0));
    }

    #[test]
    fn test_partial_render_invalidates_dirty_pens() {
        let mut t = engine();
        t.add_pen(Pen::node("a", 0.0, 0.0, 4.0, 4.0), false);
        t.set_value(
            &patch(json!({"id": "a", "x": 1})),
            SetValueOptions {
                history: false,
                render: false,
            },
        );
        t.render(false);
        assert_eq!(t.surface().invalidated, vec![Rect::new(1.0, 0.0, 5.0, 4.0)]);
    }
}
