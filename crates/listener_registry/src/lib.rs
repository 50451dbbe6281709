//! # Listener Registry
//!
//! Registration and dispatch core for observer-style notifications. Many
//! listeners attach to one [`Dispatcher`] and are called back whenever an
//! event is fired, which decouples the code producing state changes from the
//! code reacting to them.
//!
//! ## Key Features
//!
//! - **O(1) churn**: add/remove are amortized constant time, even with tens of
//!   thousands of registrations per table
//! - **Weak registrations**: a listener can register without being kept alive
//!   by the registry
//! - **Two tiers**: deferred listeners fire after every normal listener of the
//!   same event
//! - **Per-type routing**: listeners hear every event, or only one event type
//! - **Re-entrant**: listeners may add, remove or fire from their callback
//!
//! ## Architecture
//!
//! - **ListenerHandle**: strong or weak hold on a listener
//! - **SlotTable**: tombstoned slot storage with lazy compaction
//! - **TypeRouter**: normal/deferred table pairs keyed by event type
//! - **Dispatcher**: registration facade and ordered fan-out
//!
//! ## Usage
//!
//! ```rust
//! use listener_registry::*;
//! use std::sync::Arc;
//!
//! trait SelectionListener {
//!     fn selection_changed(&self, index: usize) -> Result<(), ListenerError>;
//! }
//!
//! #[derive(Debug)]
//! enum WidgetEvent {
//!     Selection(usize),
//!     Repaint,
//! }
//!
//! #[derive(Debug, Clone, PartialEq, Eq, Hash)]
//! enum WidgetEventKind {
//!     Selection,
//! }
//!
//! struct SelectionFamily;
//!
//! impl EventFamily for SelectionFamily {
//!     type Event = WidgetEvent;
//!     type Listener = dyn SelectionListener;
//!     type Key = WidgetEventKind;
//!
//!     fn classify(&self, event: &WidgetEvent) -> TypeKey<WidgetEventKind> {
//!         match event {
//!             WidgetEvent::Selection(_) => TypeKey::Type(WidgetEventKind::Selection),
//!             WidgetEvent::Repaint => TypeKey::Any,
//!         }
//!     }
//!
//!     fn handle(&self, listener: &dyn SelectionListener, event: &WidgetEvent) -> Result<(), ListenerError> {
//!         match event {
//!             WidgetEvent::Selection(index) => listener.selection_changed(*index),
//!             WidgetEvent::Repaint => Ok(()),
//!         }
//!     }
//! }
//!
//! struct StatusBar;
//!
//! impl SelectionListener for StatusBar {
//!     fn selection_changed(&self, index: usize) -> Result<(), ListenerError> {
//!         println!("row {index} selected");
//!         Ok(())
//!     }
//! }
//!
//! let dispatcher = Dispatcher::new(SelectionFamily);
//! let status: Arc<dyn SelectionListener> = Arc::new(StatusBar);
//! dispatcher.add_for(&status, true, WidgetEventKind::Selection);
//!
//! let report = dispatcher.fire(&WidgetEvent::Selection(3));
//! assert_eq!(report.delivered, 1);
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod router;
pub mod slot_table;

// Re-exports for convenience
pub use config::{RegistryConfig, DEFAULT_COMPACTION_RATIO};
pub use dispatcher::{DispatchStats, Dispatcher, EventFamily, FireReport, FnFamily};
pub use error::{ConfigError, ListenerError};
pub use handle::{ListenerHandle, ListenerId};
pub use router::{EventKeyType, Tier, TypeKey, TypeRouter};
pub use slot_table::{Pass, SlotTable};

/// Version information
pub const LISTENER_REGISTRY_VERSION: &str = env!("CARGO_PKG_VERSION");
