//! PenFlow Core Library
//!
//! Document and behavior engine for interactive diagrams: pens and
//! connectors, undo history, declarative event rules, frame animation,
//! live value synchronization and connectivity queries. Painting and
//! pointer handling belong to a [`Surface`] supplied by the host.

pub mod actions;
pub mod animate;
#[cfg(not(target_arch = "wasm32"))]
pub mod channel;
pub mod clock;
pub mod document;
pub mod emitter;
pub mod error;
pub mod event;
pub mod graph;
pub mod group;
pub mod history;
pub mod layout;
pub mod options;
pub mod paint_order;
pub mod pen;
pub mod rect;
pub mod registry;
pub mod script;
pub mod storage;
pub mod store;
pub mod surface;
pub mod sync;
pub mod topology;

pub use animate::{AnimationClock, Frame, TickOutcome};
#[cfg(not(target_arch = "wasm32"))]
pub use channel::{ChannelEvent, ChannelOptions, ConnectionState, LiveChannel, topic_sub_id};
pub use clock::{Clock, ManualClock, SystemClock};
pub use document::{TopologyData, VERSION};
pub use emitter::{EventBus, SubscriptionId, WILDCARD};
pub use error::{ChannelError, PenError, ScriptError, SyncError};
pub use event::{EventAction, EventBinding, Predicate, Trigger};
pub use graph::LineFilter;
pub use history::{History, HistoryEntry};
pub use layout::{Align, Padding, Viewport};
pub use options::Options;
pub use paint_order::PaintOrder;
pub use pen::{Anchor, LockState, Pen, PenId, PenType};
pub use registry::{Lifecycle, PenKind, PenRegistry};
pub use storage::{MemoryStorage, Storage, StorageError, StorageResult};
#[cfg(not(target_arch = "wasm32"))]
pub use storage::FileStorage;
pub use store::PenStore;
pub use surface::{NullSurface, RecordingSurface, Surface};
pub use sync::SetValueOptions;
pub use topology::Topology;
