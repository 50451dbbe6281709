//! Routing of listener tables by event type

use crate::slot_table::SlotTable;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

/// Trait bound for event-type keys
pub trait EventKeyType: Clone + Eq + Hash + Debug + 'static {}

impl<T> EventKeyType for T where T: Clone + Eq + Hash + Debug + 'static {}

/// Which events a table serves: every event, or one event type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKey<K> {
    Any,
    Type(K),
}

impl<K> TypeKey<K> {
    /// Whether this key serves every event
    pub fn is_any(&self) -> bool {
        matches!(self, TypeKey::Any)
    }
}

impl<K> From<K> for TypeKey<K> {
    fn from(key: K) -> Self {
        TypeKey::Type(key)
    }
}

/// Priority class of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Fires in registration order, newest first
    Normal,
    /// Fires after every normal listener of the same event
    Deferred,
}

struct TablePair<L: ?Sized> {
    normal: SlotTable<L>,
    deferred: SlotTable<L>,
}

impl<L: ?Sized> TablePair<L> {
    fn new(compaction_ratio: usize) -> Self {
        Self {
            normal: SlotTable::with_compaction_ratio(compaction_ratio),
            deferred: SlotTable::with_compaction_ratio(compaction_ratio),
        }
    }

    fn tier_mut(&mut self, tier: Tier) -> &mut SlotTable<L> {
        match tier {
            Tier::Normal => &mut self.normal,
            Tier::Deferred => &mut self.deferred,
        }
    }

    fn remove_all(&mut self, listener: &Arc<L>) -> usize {
        self.normal.remove_all(listener) + self.deferred.remove_all(listener)
    }

    fn size(&mut self) -> usize {
        self.normal.size() + self.deferred.size()
    }
}

/// Normal and deferred tables per event type, plus one pair for every type.
///
/// Tables are created on first access and never dropped.
pub struct TypeRouter<K: EventKeyType, L: ?Sized> {
    any: TablePair<L>,
    typed: HashMap<K, TablePair<L>>,
    compaction_ratio: usize,
}

impl<K: EventKeyType, L: ?Sized> TypeRouter<K, L> {
    /// Create a router whose tables compact at `compaction_ratio`
    pub fn new(compaction_ratio: usize) -> Self {
        Self {
            any: TablePair::new(compaction_ratio),
            typed: HashMap::new(),
            compaction_ratio,
        }
    }

    /// Table for `key` and `tier`, creating the pair if needed
    pub fn table_mut(&mut self, key: &TypeKey<K>, tier: Tier) -> &mut SlotTable<L> {
        match key {
            TypeKey::Any => self.any.tier_mut(tier),
            TypeKey::Type(k) => {
                let ratio = self.compaction_ratio;
                self.typed
                    .entry(k.clone())
                    .or_insert_with(|| TablePair::new(ratio))
                    .tier_mut(tier)
            }
        }
    }

    /// Normal-tier table for `key`, creating the pair if needed
    pub fn normal_table(&mut self, key: &TypeKey<K>) -> &mut SlotTable<L> {
        self.table_mut(key, Tier::Normal)
    }

    /// Deferred-tier table for `key`, creating the pair if needed
    pub fn deferred_table(&mut self, key: &TypeKey<K>) -> &mut SlotTable<L> {
        self.table_mut(key, Tier::Deferred)
    }

    /// Table for `key` and `tier` if it has been created
    pub fn existing_mut(&mut self, key: &TypeKey<K>, tier: Tier) -> Option<&mut SlotTable<L>> {
        match key {
            TypeKey::Any => Some(self.any.tier_mut(tier)),
            TypeKey::Type(k) => self.typed.get_mut(k).map(|pair| pair.tier_mut(tier)),
        }
    }

    /// Remove every registration of `listener`, in every table
    pub fn remove_everywhere(&mut self, listener: &Arc<L>) -> usize {
        let mut removed = self.any.remove_all(listener);
        for pair in self.typed.values_mut() {
            removed += pair.remove_all(listener);
        }
        removed
    }

    /// Remove `listener` from the two tables of `key` only
    pub fn remove_from_type(&mut self, listener: &Arc<L>, key: &TypeKey<K>) -> usize {
        match key {
            TypeKey::Any => self.any.remove_all(listener),
            TypeKey::Type(k) => self
                .typed
                .get_mut(k)
                .map_or(0, |pair| pair.remove_all(listener)),
        }
    }

    /// Live listeners across all tables
    pub fn listener_count(&mut self) -> usize {
        self.any.size() + self.typed.values_mut().map(TablePair::size).sum::<usize>()
    }

    /// Type keys that have tables
    pub fn registered_keys(&self) -> Vec<K> {
        self.typed.keys().cloned().collect()
    }
}
