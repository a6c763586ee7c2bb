// SPDX-License-Identifier: MIT OR Apache-2.0

//! Seam to the DMA buffer collaborator.
//!
//! The correlator only ever holds physical addresses. Turning an address into
//! payload bytes, and handing the buffer back to the ring once the capture is
//! done with it, belong to the owner of the DMA ring.

use crate::core::stats::DiagnosticCounters;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError};

pub trait DmaBufferPool: Debug + Send + Sync {
    /// Copy out `len` payload bytes of the buffer at `physical_address`.
    /// `None` when the buffer cannot be mapped.
    fn translate(&self, physical_address: u64, len: u32) -> Option<Vec<u8>>;

    /// Return the buffer to its ring.
    fn release(&self, physical_address: u64);
}

/// Ownership of one DMA buffer while a capture is being finished.
///
/// The buffer is released exactly once, when the lease is dropped, whichever
/// way the capture ends (emitted, rejected, evicted).
#[derive(Debug)]
pub struct PayloadLease {
    pool: Arc<dyn DmaBufferPool>,
    counters: Arc<DiagnosticCounters>,
    physical_address: u64,
}

impl PayloadLease {
    pub fn new(
        pool: Arc<dyn DmaBufferPool>,
        counters: Arc<DiagnosticCounters>,
        physical_address: u64,
    ) -> Self {
        Self {
            pool,
            counters,
            physical_address,
        }
    }

    #[inline]
    pub fn physical_address(&self) -> u64 {
        self.physical_address
    }

    pub fn payload(&self, len: u32) -> Option<Vec<u8>> {
        self.pool.translate(self.physical_address, len)
    }
}

impl Drop for PayloadLease {
    fn drop(&mut self) {
        self.pool.release(self.physical_address);
        self.counters.record_buffer_release();
    }
}

/// Heap-backed buffer pool, used by the replay tool and the tests.
#[derive(Debug, Default)]
pub struct InMemoryDmaPool {
    buffers: Mutex<HashMap<u64, Vec<u8>>>,
    releases: Mutex<HashMap<u64, usize>>,
}

impl InMemoryDmaPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place `bytes` at `physical_address`, as the microcode DMA would.
    pub fn stage(&self, physical_address: u64, bytes: Vec<u8>) {
        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(physical_address, bytes);
    }

    /// How many times the buffer at `physical_address` was released
    pub fn release_count(&self, physical_address: u64) -> usize {
        self.releases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&physical_address)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_releases(&self) -> usize {
        self.releases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }

    /// Buffers staged but not yet released
    pub fn outstanding(&self) -> usize {
        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl DmaBufferPool for InMemoryDmaPool {
    fn translate(&self, physical_address: u64, len: u32) -> Option<Vec<u8>> {
        let buffers = self.buffers.lock().unwrap_or_else(PoisonError::into_inner);
        let buffer = buffers.get(&physical_address)?;
        buffer.get(..len as usize).map(<[u8]>::to_vec)
    }

    fn release(&self, physical_address: u64) {
        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&physical_address);
        *self
            .releases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(physical_address)
            .or_insert(0) += 1;
    }
}
