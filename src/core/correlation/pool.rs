// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-size correlation pool.
//!
//! Slots are allocated once when a session is initialised. Capture ids map
//! to a slot by modulus, so lookup is constant time and never allocates.
//! Each slot has its own lock; producers for different captures contend
//! only when their ids share a slot.

use super::slot::{CaptureId, CorrelationSlot};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Index of a slot in its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotRef(usize);

impl SlotRef {
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug)]
pub struct SlotPool {
    slots: Box<[Mutex<CorrelationSlot>]>,
}

impl SlotPool {
    /// `size` must be non-zero; configuration validation guarantees it.
    pub fn new(size: usize) -> Self {
        debug_assert!(size > 0, "slot pool needs at least one slot");
        let slots = (0..size)
            .map(|_| Mutex::new(CorrelationSlot::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { slots }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot owning `capture_id`.
    #[inline]
    pub fn acquire_or_find(&self, capture_id: CaptureId) -> SlotRef {
        SlotRef(capture_id as usize % self.slots.len())
    }

    /// Lock a slot. A producer that panicked while holding the lock leaves
    /// the slot in a consistent state (every transition is a plain field
    /// write), so the poison flag is ignored.
    #[inline]
    pub fn lock(&self, slot: SlotRef) -> MutexGuard<'_, CorrelationSlot> {
        self.slots[slot.0]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_complete(&self, slot: SlotRef) -> bool {
        self.lock(slot).is_complete()
    }

    pub fn clear(&self, slot: SlotRef) {
        self.lock(slot).clear();
    }

    pub fn refs(&self) -> impl Iterator<Item = SlotRef> {
        (0..self.slots.len()).map(SlotRef)
    }

    /// Slots currently holding a partial capture
    pub fn occupied(&self) -> usize {
        self.refs().filter(|r| self.lock(*r).is_occupied()).count()
    }
}
