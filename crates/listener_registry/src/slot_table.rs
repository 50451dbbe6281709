//! Unordered bag of listeners for one routing bucket.
//!
//! Listeners live in an append-only backing sequence of slots. Removal clears
//! a slot in place (a tombstone) instead of shifting the sequence, which keeps
//! add/remove O(1) and leaves in-flight passes valid. Once the backing
//! sequence holds more than `compaction_ratio` times as many slots as live
//! listeners, the next operation rebuilds it with only the live entries.
//!
//! An index keyed by [`ListenerId`] points at the most recent live occurrence
//! of each listener. Older duplicates hang off that slot through a chain of
//! `previous` positions, so every occurrence can be removed on its own.

use crate::config::DEFAULT_COMPACTION_RATIO;
use crate::handle::{ListenerHandle, ListenerId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

enum Slot<L: ?Sized> {
    Empty,
    Occupied {
        handle: ListenerHandle<L>,
        /// Position of the next-older occurrence of the same listener
        previous: Option<usize>,
    },
}

impl<L: ?Sized> Slot<L> {
    fn is_occupied(&self) -> bool {
        matches!(self, Slot::Occupied { .. })
    }
}

/// Cursor of one traversal over a [`SlotTable`].
///
/// Obtained from [`SlotTable::begin_pass`] and handed back through
/// [`SlotTable::end_pass`]. The pass only covers slots that existed when it
/// began; listeners added afterwards are not observed by it.
#[derive(Debug)]
#[must_use = "a pass must be closed with SlotTable::end_pass"]
pub struct Pass {
    cursor: usize,
}

/// Slot storage for the listeners of one bucket
pub struct SlotTable<L: ?Sized> {
    slots: Vec<Slot<L>>,
    index: HashMap<ListenerId, usize>,
    live: usize,
    weak_slots: usize,
    /// Backing length at the last reclaimed-weak sweep
    swept_len: usize,
    open_passes: usize,
    compaction_ratio: usize,
}

impl<L: ?Sized> SlotTable<L> {
    /// Create an empty table with the default compaction ratio
    pub fn new() -> Self {
        Self::with_compaction_ratio(DEFAULT_COMPACTION_RATIO)
    }

    /// Create a table that compacts once `backing > ratio * live`.
    ///
    /// A ratio below 1 is treated as 1.
    pub fn with_compaction_ratio(ratio: usize) -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
            live: 0,
            weak_slots: 0,
            swept_len: 0,
            open_passes: 0,
            compaction_ratio: ratio.max(1),
        }
    }

    /// Register `listener`, strongly or weakly.
    ///
    /// Registering the same listener twice yields two independent entries.
    pub fn add(&mut self, listener: &Arc<L>, weak: bool) {
        self.maintain();

        let handle = ListenerHandle::new(listener, weak);
        let position = self.slots.len();
        let previous = self.index.insert(handle.identity(), position);
        if weak {
            self.weak_slots += 1;
        }
        self.slots.push(Slot::Occupied { handle, previous });
        self.live += 1;
    }

    /// Remove the most recent occurrence of `listener`.
    ///
    /// Returns `false` if the listener was not registered.
    pub fn remove(&mut self, listener: &Arc<L>) -> bool {
        let removed = self.remove_newest(ListenerId::of(listener));
        self.maintain();
        removed
    }

    /// Remove every occurrence of `listener`, returning how many there were.
    pub fn remove_all(&mut self, listener: &Arc<L>) -> usize {
        let id = ListenerId::of(listener);
        let mut removed = 0;
        while self.remove_newest(id) {
            removed += 1;
        }
        self.maintain();
        removed
    }

    /// Number of live listeners.
    ///
    /// Weak handles whose referent has been reclaimed are swept out first.
    pub fn size(&mut self) -> usize {
        self.sweep_reclaimed();
        self.maintain();
        self.live
    }

    /// Whether no live listener remains, after sweeping reclaimed weak handles
    pub fn is_empty(&mut self) -> bool {
        self.size() == 0
    }

    /// Whether `listener` has at least one registration in this table
    pub fn contains(&self, listener: &Arc<L>) -> bool {
        self.index.contains_key(&ListenerId::of(listener))
    }

    /// Number of slots in the backing sequence, tombstones included
    pub fn backing_len(&self) -> usize {
        self.slots.len()
    }

    /// Listeners from most to least recently added.
    ///
    /// The iterator borrows the table for its whole lifetime. Callers that
    /// need to remove listeners mid-traversal drive the pass themselves with
    /// [`begin_pass`](Self::begin_pass) and [`next_in_pass`](Self::next_in_pass).
    pub fn iter(&mut self) -> Iter<'_, L> {
        let pass = self.begin_pass();
        Iter {
            table: self,
            pass: Some(pass),
        }
    }

    /// Rebuild the backing sequence if tombstones outweigh live entries.
    ///
    /// Reclaimed weak handles are swept out each time the backing sequence
    /// doubles, so they stop counting as live before the ratio is checked.
    /// Never compacts while a pass is open.
    pub fn maintain(&mut self) {
        if self.open_passes > 0 {
            return;
        }
        if self.weak_slots > 0 && self.slots.len() >= self.swept_len.saturating_mul(2) {
            self.sweep_reclaimed();
        }
        if self.slots.len() > self.compaction_ratio.saturating_mul(self.live) {
            self.compact();
        }
    }

    /// Open a traversal from the newest slot to the oldest.
    pub fn begin_pass(&mut self) -> Pass {
        self.maintain();
        self.open_passes += 1;
        Pass {
            cursor: self.slots.len(),
        }
    }

    /// Next live listener of the pass, clearing reclaimed weak slots on the way.
    pub fn next_in_pass(&mut self, pass: &mut Pass) -> Option<Arc<L>> {
        while pass.cursor > 0 {
            pass.cursor -= 1;
            let position = pass.cursor;
            let upgraded = match self.slots.get(position) {
                Some(Slot::Occupied { handle, .. }) => handle.upgrade(),
                _ => continue,
            };
            match upgraded {
                Some(listener) => return Some(listener),
                None => self.clear_reclaimed(position),
            }
        }
        None
    }

    /// Close a pass opened on this table with [`begin_pass`](Self::begin_pass).
    pub fn end_pass(&mut self, _pass: Pass) {
        debug_assert!(self.open_passes > 0, "end_pass without an open pass");
        self.open_passes = self.open_passes.saturating_sub(1);
    }

    fn remove_newest(&mut self, id: ListenerId) -> bool {
        let Some(position) = self.index.get(&id).copied() else {
            return false;
        };

        let previous = match std::mem::replace(&mut self.slots[position], Slot::Empty) {
            Slot::Occupied { handle, previous } => {
                if handle.is_weak() {
                    self.weak_slots -= 1;
                }
                self.live -= 1;
                previous
            }
            Slot::Empty => None,
        };

        match previous.filter(|p| self.slots.get(*p).is_some_and(Slot::is_occupied)) {
            Some(older) => {
                self.index.insert(id, older);
            }
            None => {
                self.index.remove(&id);
            }
        }
        true
    }

    /// Clear a slot whose weak referent is gone.
    ///
    /// A reclaimed referent cannot have a strong registration anywhere, so
    /// every occurrence of the identity is dead and its index entry goes.
    fn clear_reclaimed(&mut self, position: usize) {
        if let Slot::Occupied { handle, .. } = std::mem::replace(&mut self.slots[position], Slot::Empty) {
            self.live -= 1;
            self.weak_slots -= 1;
            self.index.remove(&handle.identity());
        }
    }

    fn sweep_reclaimed(&mut self) {
        self.swept_len = self.slots.len();
        if self.weak_slots == 0 {
            return;
        }
        for position in 0..self.slots.len() {
            let reclaimed = matches!(
                &self.slots[position],
                Slot::Occupied { handle, .. } if !handle.is_alive()
            );
            if reclaimed {
                self.clear_reclaimed(position);
            }
        }
    }

    fn compact(&mut self) {
        let before = self.slots.len();
        let old = std::mem::replace(&mut self.slots, Vec::with_capacity(self.live));
        self.index.clear();
        self.weak_slots = 0;

        for slot in old {
            if let Slot::Occupied { handle, .. } = slot {
                if !handle.is_alive() {
                    continue;
                }
                if handle.is_weak() {
                    self.weak_slots += 1;
                }
                let previous = self.index.insert(handle.identity(), self.slots.len());
                self.slots.push(Slot::Occupied { handle, previous });
            }
        }
        self.live = self.slots.len();
        self.swept_len = self.slots.len();

        debug!(
            "🧹 Compacted listener table: {} -> {} slots ({} weak)",
            before,
            self.slots.len(),
            self.weak_slots
        );
    }
}

impl<L: ?Sized> Default for SlotTable<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ?Sized> fmt::Debug for SlotTable<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotTable")
            .field("backing_len", &self.slots.len())
            .field("live", &self.live)
            .field("weak_slots", &self.weak_slots)
            .field("open_passes", &self.open_passes)
            .finish()
    }
}

/// Iterator returned by [`SlotTable::iter`]
pub struct Iter<'a, L: ?Sized> {
    table: &'a mut SlotTable<L>,
    pass: Option<Pass>,
}

impl<L: ?Sized> Iterator for Iter<'_, L> {
    type Item = Arc<L>;

    fn next(&mut self) -> Option<Self::Item> {
        let pass = self.pass.as_mut()?;
        let next = self.table.next_in_pass(pass);
        if next.is_none() {
            if let Some(pass) = self.pass.take() {
                self.table.end_pass(pass);
            }
        }
        next
    }
}

impl<L: ?Sized> Drop for Iter<'_, L> {
    fn drop(&mut self) {
        if let Some(pass) = self.pass.take() {
            self.table.end_pass(pass);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listeners(count: usize) -> Vec<Arc<usize>> {
        (0..count).map(Arc::new).collect()
    }

    fn drain(table: &mut SlotTable<usize>) -> Vec<usize> {
        table.iter().map(|l| *l).collect()
    }

    #[test]
    fn iterates_newest_first() {
        let all = listeners(10);
        let mut table = SlotTable::new();
        for l in &all {
            table.add(l, false);
        }

        assert_eq!(drain(&mut table), vec![9, 8, 7, 6, 5, 4, 3, 2, 1, 0]);
        assert_eq!(table.size(), 10);
    }

    #[test]
    fn tombstones_then_compacts_past_twice_live() {
        let a = listeners(10);
        let mut table = SlotTable::new();
        for l in &a {
            table.add(l, false);
        }

        for i in [1, 3, 5, 7, 9] {
            assert!(table.remove(&a[i]));
        }
        assert_eq!(table.backing_len(), 10);
        assert_eq!(drain(&mut table), vec![8, 6, 4, 2, 0]);

        assert!(table.remove(&a[0]));
        assert_eq!(drain(&mut table), vec![8, 6, 4, 2]);
        assert_eq!(table.backing_len(), 4);
    }

    #[test]
    fn duplicates_are_independent_entries() {
        let a = listeners(2);
        let mut table = SlotTable::new();
        table.add(&a[0], false);
        table.add(&a[1], false);
        table.add(&a[0], false);

        assert_eq!(drain(&mut table), vec![0, 1, 0]);

        assert!(table.remove(&a[0]));
        assert_eq!(drain(&mut table), vec![1, 0]);
        assert!(table.contains(&a[0]));

        assert!(table.remove(&a[0]));
        assert!(!table.contains(&a[0]));
        assert!(!table.remove(&a[0]));
        assert_eq!(drain(&mut table), vec![1]);
    }

    #[test]
    fn remove_all_clears_every_occurrence() {
        let a = listeners(2);
        let mut table = SlotTable::new();
        for _ in 0..3 {
            table.add(&a[0], false);
            table.add(&a[1], true);
        }

        assert_eq!(table.remove_all(&a[0]), 3);
        assert_eq!(table.remove_all(&a[0]), 0);
        assert_eq!(drain(&mut table), vec![1, 1, 1]);
        assert_eq!(table.size(), 3);
    }

    #[test]
    fn removing_unknown_listener_is_noop() {
        let a = listeners(2);
        let mut table = SlotTable::new();
        table.add(&a[0], false);

        assert!(!table.remove(&a[1]));
        assert_eq!(table.size(), 1);
    }

    #[test]
    fn duplicate_chain_survives_compaction() {
        let a = listeners(4);
        let mut table = SlotTable::new();
        table.add(&a[0], false);
        table.add(&a[1], false);
        table.add(&a[0], false);
        table.add(&a[2], false);
        table.add(&a[3], false);

        assert!(table.remove(&a[2]));
        assert!(table.remove(&a[3]));
        assert!(table.remove(&a[1]));
        // 5 slots > 2 * 2 live: rebuilt
        assert_eq!(table.backing_len(), 2);
        assert_eq!(drain(&mut table), vec![0, 0]);

        assert!(table.remove(&a[0]));
        assert!(table.remove(&a[0]));
        assert!(!table.remove(&a[0]));
        assert_eq!(table.size(), 0);
    }

    #[test]
    fn reclaimed_weak_listeners_disappear_without_remove() {
        let keep = Arc::new(1usize);
        let mut table = SlotTable::new();
        table.add(&keep, true);
        {
            let gone = Arc::new(2usize);
            table.add(&gone, true);
            table.add(&gone, true);
            assert_eq!(table.size(), 3);
        }

        assert_eq!(table.size(), 1);
        assert_eq!(drain(&mut table), vec![1]);
        assert_eq!(table.backing_len(), 1);
    }

    #[test]
    fn weak_and_strong_registrations_of_one_listener() {
        let l = Arc::new(5usize);
        let mut table = SlotTable::new();
        table.add(&l, true);
        table.add(&l, false);
        drop(l);

        // the strong registration keeps the weak one alive too
        assert_eq!(table.size(), 2);
        assert_eq!(drain(&mut table), vec![5, 5]);
    }

    #[test]
    fn size_matches_drained_iteration() {
        let a = listeners(20);
        let mut table = SlotTable::new();
        for (i, l) in a.iter().enumerate() {
            table.add(l, i % 3 == 0);
        }
        for l in a.iter().step_by(4) {
            table.remove(l);
        }
        table.add(&a[4], false);

        let drained = drain(&mut table).len();
        assert_eq!(table.size(), drained);
    }

    #[test]
    fn maintain_does_not_change_observed_order() {
        let a = listeners(12);
        let mut without = SlotTable::new();
        let mut with = SlotTable::new();
        for l in &a {
            without.add(l, false);
            with.add(l, false);
        }
        for i in [0, 2, 3, 5, 7, 8, 11] {
            without.remove(&a[i]);
            with.remove(&a[i]);
        }

        with.maintain();
        assert_eq!(drain(&mut without), drain(&mut with));
    }

    #[test]
    fn removal_during_pass_respects_visited_slots() {
        let a = listeners(5);
        let mut table = SlotTable::new();
        for l in &a {
            table.add(l, false);
        }

        let mut pass = table.begin_pass();
        let mut seen = Vec::new();
        while let Some(l) = table.next_in_pass(&mut pass) {
            seen.push(*l);
            if *l == 3 {
                // 4 already visited, 1 not yet
                table.remove(&a[4]);
                table.remove(&a[1]);
            }
        }
        table.end_pass(pass);

        assert_eq!(seen, vec![4, 3, 2, 0]);
        assert_eq!(drain(&mut table), vec![3, 2, 0]);
    }

    #[test]
    fn no_compaction_while_pass_is_open() {
        let a = listeners(6);
        let mut table = SlotTable::new();
        for l in &a {
            table.add(l, false);
        }

        let mut pass = table.begin_pass();
        assert_eq!(table.next_in_pass(&mut pass).map(|l| *l), Some(5));
        for l in &a[..5] {
            table.remove(l);
        }
        assert_eq!(table.backing_len(), 6);
        assert_eq!(table.next_in_pass(&mut pass), None);
        table.end_pass(pass);

        table.maintain();
        assert_eq!(table.backing_len(), 1);
    }

    #[test]
    fn additions_during_pass_are_not_observed() {
        let a = listeners(3);
        let mut table = SlotTable::new();
        table.add(&a[0], false);
        table.add(&a[1], false);

        let mut pass = table.begin_pass();
        let mut seen = Vec::new();
        while let Some(l) = table.next_in_pass(&mut pass) {
            seen.push(*l);
            if *l == 1 {
                table.add(&a[2], false);
            }
        }
        table.end_pass(pass);

        assert_eq!(seen, vec![1, 0]);
        assert_eq!(drain(&mut table), vec![2, 1, 0]);
    }

    #[test]
    fn abandoned_iterator_releases_its_pass() {
        let a = listeners(4);
        let mut table = SlotTable::new();
        for l in &a {
            table.add(l, false);
        }

        assert_eq!(table.iter().next().map(|l| *l), Some(3));
        for l in &a[..3] {
            table.remove(l);
        }
        assert_eq!(table.backing_len(), 1);
    }

    #[test]
    fn configurable_ratio() {
        let a = listeners(8);
        let mut table = SlotTable::with_compaction_ratio(4);
        for l in &a {
            table.add(l, false);
        }
        for l in &a[..6] {
            table.remove(l);
        }
        // 8 slots, 2 live: 8 > 4 * 2 is false
        assert_eq!(table.backing_len(), 8);

        table.remove(&a[6]);
        assert_eq!(table.backing_len(), 1);
    }

    #[test]
    fn huge_ratio_does_not_overflow() {
        let a = listeners(4);
        let mut table = SlotTable::with_compaction_ratio(usize::MAX);
        for l in &a {
            table.add(l, false);
        }
        for l in &a[..3] {
            table.remove(l);
        }
        assert_eq!(table.backing_len(), 4);
        assert_eq!(table.size(), 1);

        // Only an empty table is ever compacted
        table.remove(&a[3]);
        assert_eq!(table.backing_len(), 0);
    }

    #[test]
    fn dead_weak_listeners_do_not_block_compaction() {
        let mut table = SlotTable::new();
        {
            let weak = listeners(1000);
            for l in &weak {
                table.add(l, true);
            }
        }

        // Only add/remove from here on: no size() call and no pass
        let strong = Arc::new(5000);
        for _ in 0..1000 {
            table.add(&strong, false);
            table.remove(&strong);
            assert!(table.backing_len() <= 2048);
        }
        table.add(&strong, false);

        assert!(table.backing_len() <= 2, "backing_len = {}", table.backing_len());
        assert_eq!(drain(&mut table), vec![5000]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "end_pass without an open pass")]
    fn closing_a_pass_on_the_wrong_table_is_caught() {
        let mut opened: SlotTable<usize> = SlotTable::new();
        let mut other: SlotTable<usize> = SlotTable::new();
        let pass = opened.begin_pass();
        other.end_pass(pass);
    }
}
