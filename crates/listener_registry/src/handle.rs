//! Strong and weak holds on a registered listener

use std::fmt;
use std::sync::{Arc, Weak};

/// Identity of a listener, derived from the address of its shared allocation.
///
/// A `Weak` keeps the allocation (not the value) alive, so an identity cannot
/// be handed out to a different listener while any handle for it is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(usize);

impl ListenerId {
    /// Identity of a live listener
    pub fn of<L: ?Sized>(listener: &Arc<L>) -> Self {
        Self(Arc::as_ptr(listener) as *const () as usize)
    }

    fn of_weak<L: ?Sized>(listener: &Weak<L>) -> Self {
        Self(Weak::as_ptr(listener) as *const () as usize)
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener@{:#x}", self.0)
    }
}

/// A registered listener, held either strongly or weakly.
///
/// A strong handle keeps the listener reachable for as long as it stays
/// registered. A weak handle never affects reachability and reports itself
/// dead once the last `Arc` to the listener is dropped.
pub enum ListenerHandle<L: ?Sized> {
    Strong(Arc<L>),
    Weak(Weak<L>),
}

impl<L: ?Sized> ListenerHandle<L> {
    /// Create a handle for `listener`, weak or strong
    pub fn new(listener: &Arc<L>, weak: bool) -> Self {
        if weak {
            Self::weak(listener)
        } else {
            Self::strong(listener)
        }
    }

    /// Hold `listener` strongly, keeping it alive while registered
    pub fn strong(listener: &Arc<L>) -> Self {
        Self::Strong(Arc::clone(listener))
    }

    /// Hold `listener` without affecting its lifetime
    pub fn weak(listener: &Arc<L>) -> Self {
        Self::Weak(Arc::downgrade(listener))
    }

    /// Strong handles are always alive; weak ones until the referent is reclaimed.
    pub fn is_alive(&self) -> bool {
        match self {
            Self::Strong(_) => true,
            Self::Weak(weak) => weak.strong_count() > 0,
        }
    }

    /// Whether this handle was registered weakly
    pub fn is_weak(&self) -> bool {
        matches!(self, Self::Weak(_))
    }

    /// The listener, or `None` if a weak referent has been reclaimed
    pub fn upgrade(&self) -> Option<Arc<L>> {
        match self {
            Self::Strong(strong) => Some(Arc::clone(strong)),
            Self::Weak(weak) => weak.upgrade(),
        }
    }

    /// Identity of the listener, available even after a weak referent is reclaimed
    pub fn identity(&self) -> ListenerId {
        match self {
            Self::Strong(strong) => ListenerId::of(strong),
            Self::Weak(weak) => ListenerId::of_weak(weak),
        }
    }

    /// Identity equality against a raw listener
    pub fn matches(&self, listener: &Arc<L>) -> bool {
        self.identity() == ListenerId::of(listener)
    }
}

impl<L: ?Sized> Clone for ListenerHandle<L> {
    fn clone(&self) -> Self {
        match self {
            Self::Strong(strong) => Self::Strong(Arc::clone(strong)),
            Self::Weak(weak) => Self::Weak(Weak::clone(weak)),
        }
    }
}

impl<L: ?Sized> fmt::Debug for ListenerHandle<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("identity", &self.identity())
            .field("weak", &self.is_weak())
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    #[test]
    fn strong_handle_keeps_listener_alive() {
        let listener: Arc<dyn Greeter> = Arc::new(English);
        let handle = ListenerHandle::new(&listener, false);
        drop(listener);

        assert!(handle.is_alive());
        assert!(!handle.is_weak());
        assert_eq!(handle.upgrade().map(|l| l.greet()), Some("hello".to_string()));
    }

    #[test]
    fn weak_handle_dies_with_its_referent() {
        let listener: Arc<dyn Greeter> = Arc::new(English);
        let handle = ListenerHandle::new(&listener, true);
        assert!(handle.is_alive());
        assert!(handle.upgrade().is_some());

        drop(listener);
        assert!(!handle.is_alive());
        assert!(handle.upgrade().is_none());
    }

    #[test]
    fn identity_is_shared_between_strong_and_weak_holds() {
        let listener = Arc::new(English);
        let other = Arc::new(English);
        let strong = ListenerHandle::strong(&listener);
        let weak = ListenerHandle::weak(&listener);

        assert_eq!(strong.identity(), weak.identity());
        assert!(strong.matches(&listener));
        assert!(weak.matches(&listener));
        assert!(!weak.matches(&other));
    }

    #[test]
    fn weak_identity_survives_reclamation() {
        let listener = Arc::new(7u32);
        let expected = ListenerId::of(&listener);
        let handle = ListenerHandle::weak(&listener);
        drop(listener);

        assert_eq!(handle.identity(), expected);
    }
}
