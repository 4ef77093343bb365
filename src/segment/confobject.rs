//! The segmented conf data model: one slot per registered id, each
//! holding the last successfully parsed value (if any), whether its most
//! recent load attempt failed, and the mtime that value was parsed from.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug)]
pub struct SegmentSlot<T> {
    pub id: u32,
    pub value: Option<Arc<T>>,
    pub failed_load: bool,
    pub mtime: SystemTime,
}

impl<T> SegmentSlot<T> {
    /// True iff this slot currently holds a payload produced by a
    /// successful load, as opposed to one that is only present because a
    /// prior value (or a last-good fallback) survived a failed attempt.
    /// Defined so that `loaded ⟹ !failed_load` holds by construction,
    /// matching the invariant every reader-facing consumer relies on.
    pub fn loaded(&self) -> bool {
        self.value.is_some() && !self.failed_load
    }
}

impl<T> Clone for SegmentSlot<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            value: self.value.clone(),
            failed_load: self.failed_load,
            mtime: self.mtime,
        }
    }
}

/// A published segmented configuration: every currently-registered
/// segment id, sorted, looked up by binary search the way the dispatcher
/// maintains its slot array.
#[derive(Debug)]
pub struct SegmentedConf<T> {
    slots: Vec<SegmentSlot<T>>,
}

impl<T> Clone for SegmentedConf<T> {
    fn clone(&self) -> Self {
        Self { slots: self.slots.clone() }
    }
}

impl<T> Default for SegmentedConf<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T> SegmentedConf<T> {
    pub fn find(&self, id: u32) -> Option<&SegmentSlot<T>> {
        self.slots.binary_search_by_key(&id, |s| s.id).ok().map(|i| &self.slots[i])
    }

    pub fn get(&self, id: u32) -> Option<Arc<T>> {
        self.find(id).and_then(|slot| slot.value.clone())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SegmentSlot<T>> {
        self.slots.iter()
    }

    /// The timestamp this segmented conf is stamped with: the maximum
    /// mtime across its segments, or the Unix epoch when empty.
    pub fn mtime(&self) -> SystemTime {
        self.slots.iter().map(|s| s.mtime).max().unwrap_or(UNIX_EPOCH)
    }

    pub(super) fn slots_mut(&mut self) -> &mut Vec<SegmentSlot<T>> {
        &mut self.slots
    }
}
