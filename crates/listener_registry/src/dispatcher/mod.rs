//! Dispatcher facade: registration, removal and ordered fan-out
//!
//! A [`Dispatcher`] owns one [`TypeRouter`] and delegates the meaning of an
//! event to an [`EventFamily`]: `classify` picks the type key an event is
//! routed by, `handle` performs the typed callback on one listener.
//!
//! Every `fire` resolves up to four tables in a fixed order:
//!
//! 1. ANY / normal
//! 2. type / normal
//! 3. ANY / deferred
//! 4. type / deferred
//!
//! The type tables are skipped when the event classifies as ANY. Within a
//! table, newer registrations fire first.
//!
//! All operations take `&self`. No internal borrow is held while a listener
//! runs, so listeners may register, unregister or fire on the same dispatcher
//! from inside their callback. A removal reaches slots the current pass has
//! not visited yet; a registration made mid-pass is first observed by the
//! next `fire`. Listener destructors must not call back into the dispatcher
//! that drops them.

use crate::config::RegistryConfig;
use crate::error::ListenerError;
use crate::handle::ListenerId;
use crate::router::{EventKeyType, Tier, TypeKey, TypeRouter};
use crate::slot_table::Pass;
use serde::Serialize;
use smallvec::SmallVec;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, error, trace};


/// The two extension points of one event family.
///
/// Both functions must be total and have no side effect beyond the callback
/// itself.
pub trait EventFamily {
    type Event: ?Sized;
    type Listener: ?Sized;
    type Key: EventKeyType;

    /// Type key the event is routed by; `TypeKey::Any` reaches ANY tables only
    fn classify(&self, event: &Self::Event) -> TypeKey<Self::Key>;

    /// Deliver `event` to one listener
    fn handle(&self, listener: &Self::Listener, event: &Self::Event) -> Result<(), ListenerError>;
}

/// Closure-backed [`EventFamily`] for families without a dedicated type
pub struct FnFamily<E: ?Sized, L: ?Sized, K, C, H> {
    classify: C,
    handle: H,
    _phantom: PhantomData<fn(&E, &L) -> K>,
}

impl<E, L, K, C, H> FnFamily<E, L, K, C, H>
where
    E: ?Sized,
    L: ?Sized,
    K: EventKeyType,
    C: Fn(&E) -> TypeKey<K>,
    H: Fn(&L, &E) -> Result<(), ListenerError>,
{
    /// Build a family from a classifier and a delivery closure
    pub fn new(classify: C, handle: H) -> Self {
        Self {
            classify,
            handle,
            _phantom: PhantomData,
        }
    }
}

impl<E, L, K, C, H> EventFamily for FnFamily<E, L, K, C, H>
where
    E: ?Sized,
    L: ?Sized,
    K: EventKeyType,
    C: Fn(&E) -> TypeKey<K>,
    H: Fn(&L, &E) -> Result<(), ListenerError>,
{
    type Event = E;
    type Listener = L;
    type Key = K;

    fn classify(&self, event: &E) -> TypeKey<K> {
        (self.classify)(event)
    }

    fn handle(&self, listener: &L, event: &E) -> Result<(), ListenerError> {
        (self.handle)(listener, event)
    }
}

/// Outcome of a single [`Dispatcher::fire`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FireReport {
    /// Listeners whose callback returned `Ok`
    pub delivered: usize,
    /// Listeners whose callback returned `Err`
    pub failed: usize,
}

impl FireReport {
    /// Total callbacks made
    pub fn invoked(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Statistics for dispatcher monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub events_fired: u64,
    pub deliveries: u64,
    pub listener_failures: u64,
    pub total_listeners: usize,
}

/// Listener registry and fan-out for one event family.
///
/// Not thread-safe: a dispatcher shared between threads needs a lock supplied
/// by the caller.
pub struct Dispatcher<F: EventFamily> {
    family: F,
    router: RefCell<TypeRouter<F::Key, F::Listener>>,
    stats: RefCell<DispatchStats>,
}

impl<F: EventFamily> Dispatcher<F> {
    /// Create a dispatcher with the default [`RegistryConfig`]
    pub fn new(family: F) -> Self {
        Self::with_config(family, &RegistryConfig::default())
    }

    /// Create a dispatcher whose tables use `config`
    pub fn with_config(family: F, config: &RegistryConfig) -> Self {
        Self {
            family,
            router: RefCell::new(TypeRouter::new(config.compaction_ratio)),
            stats: RefCell::new(DispatchStats::default()),
        }
    }

    /// The event family this dispatcher classifies and delivers with
    pub fn family(&self) -> &F {
        &self.family
    }

    /// Listen to every event
    pub fn add(&self, listener: &Arc<F::Listener>, weak: bool) {
        self.register(listener, weak, &TypeKey::Any, Tier::Normal);
    }

    /// Listen to events classified as `key`
    pub fn add_for(&self, listener: &Arc<F::Listener>, weak: bool, key: F::Key) {
        self.register(listener, weak, &TypeKey::Type(key), Tier::Normal);
    }

    /// Listen to every event, after all normal listeners
    pub fn add_deferred(&self, listener: &Arc<F::Listener>, weak: bool) {
        self.register(listener, weak, &TypeKey::Any, Tier::Deferred);
    }

    /// Listen to events classified as `key`, after all normal listeners
    pub fn add_deferred_for(&self, listener: &Arc<F::Listener>, weak: bool, key: F::Key) {
        self.register(listener, weak, &TypeKey::Type(key), Tier::Deferred);
    }

    /// Remove every registration of `listener`, returning how many there were
    pub fn remove(&self, listener: &Arc<F::Listener>) -> usize {
        let removed = self.router.borrow_mut().remove_everywhere(listener);
        if removed > 0 {
            debug!("🗑️ Removed {} registration(s) of listener {}", removed, ListenerId::of(listener));
        }
        removed
    }

    /// Remove `listener` from the normal and deferred tables of `key` only
    pub fn remove_for(&self, listener: &Arc<F::Listener>, key: F::Key) -> usize {
        let key = TypeKey::Type(key);
        let removed = self.router.borrow_mut().remove_from_type(listener, &key);
        if removed > 0 {
            debug!("🗑️ Removed {} registration(s) of listener {} from {:?}", removed, ListenerId::of(listener), key);
        }
        removed
    }

    /// Deliver `event` to every live listener of the matching tables.
    ///
    /// Passes over all matching tables are opened before the first callback,
    /// so registrations made during this call are first seen by the next one.
    /// A listener returning `Err` is logged and counted; the pass carries on
    /// with the remaining listeners. A panicking listener unwinds out of
    /// `fire` and leaves the registry consistent.
    pub fn fire(&self, event: &F::Event) -> FireReport {
        let key = self.family.classify(event);
        trace!("📤 Firing event routed by {:?}", key);

        let guards: SmallVec<[PassGuard<'_, F::Key, F::Listener>; 4]> = Self::routes(&key)
            .into_iter()
            .filter_map(|(route, tier)| self.open_pass(route, tier))
            .collect();

        let mut report = FireReport::default();
        for mut guard in guards {
            while let Some(listener) = guard.next_listener() {
                match self.family.handle(&listener, event) {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        error!("❌ Listener failed on {:?}/{:?}: {}", guard.route, guard.tier, e);
                        report.failed += 1;
                    }
                }
            }
        }

        let mut stats = self.stats.borrow_mut();
        stats.events_fired += 1;
        stats.deliveries += report.delivered as u64;
        stats.listener_failures += report.failed as u64;
        report
    }

    /// Live listeners across all tables
    pub fn listener_count(&self) -> usize {
        self.router.borrow_mut().listener_count()
    }

    /// Type keys that currently have tables
    pub fn registered_keys(&self) -> Vec<F::Key> {
        self.router.borrow().registered_keys()
    }

    /// Snapshot of dispatch counters, with the current live listener count
    pub fn stats(&self) -> DispatchStats {
        let mut stats = self.stats.borrow().clone();
        stats.total_listeners = self.listener_count();
        stats
    }

    fn register(&self, listener: &Arc<F::Listener>, weak: bool, key: &TypeKey<F::Key>, tier: Tier) {
        trace!("📝 Registering listener {} on {:?}/{:?} (weak: {})", ListenerId::of(listener), key, tier, weak);
        self.router
            .borrow_mut()
            .table_mut(key, tier)
            .add(listener, weak);
    }

    /// Tables an event classified as `key` reaches, in firing order
    fn routes(key: &TypeKey<F::Key>) -> SmallVec<[(TypeKey<F::Key>, Tier); 4]> {
        let mut routes = SmallVec::new();
        for tier in [Tier::Normal, Tier::Deferred] {
            routes.push((TypeKey::Any, tier));
            if !key.is_any() {
                routes.push((key.clone(), tier));
            }
        }
        routes
    }

    fn open_pass(&self, route: TypeKey<F::Key>, tier: Tier) -> Option<PassGuard<'_, F::Key, F::Listener>> {
        let pass = self.router.borrow_mut().existing_mut(&route, tier)?.begin_pass();
        Some(PassGuard {
            router: &self.router,
            route,
            tier,
            pass: Some(pass),
        })
    }
}

impl<F: EventFamily> fmt::Debug for Dispatcher<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("stats", &self.stats.borrow())
            .finish_non_exhaustive()
    }
}

/// An open pass over one table for the duration of a `fire`.
///
/// The router is only borrowed while stepping, never across a callback.
/// Dropping the guard, including during unwinding, closes the pass.
struct PassGuard<'a, K: EventKeyType, L: ?Sized> {
    router: &'a RefCell<TypeRouter<K, L>>,
    route: TypeKey<K>,
    tier: Tier,
    pass: Option<Pass>,
}

impl<K: EventKeyType, L: ?Sized> PassGuard<'_, K, L> {
    fn next_listener(&mut self) -> Option<Arc<L>> {
        let pass = self.pass.as_mut()?;
        self.router
            .borrow_mut()
            .existing_mut(&self.route, self.tier)?
            .next_in_pass(pass)
    }
}

impl<K: EventKeyType, L: ?Sized> Drop for PassGuard<'_, K, L> {
    fn drop(&mut self) {
        let Some(pass) = self.pass.take() else {
            return;
        };
        // Every router borrow is a temporary scoped to one step, released
        // before any callback runs and before unwinding reaches a guard.
        if let Some(table) = self.router.borrow_mut().existing_mut(&self.route, self.tier) {
            table.end_pass(pass);
        }
    }
}
