// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns a joined capture into a finished record.
//!
//! Runs after the slot lock is released. The DBR buffer is leased for the
//! duration of the build and released on every exit path.

use super::metadata::VersionedMetadata;
use super::record::{CfrRecord, RecordHeader, CFR_START_MAGIC};
use super::types::CaptureSnapshot;
use crate::core::config::CorrelatorConfig;
use crate::core::correlation::slot::JoinedCapture;
use crate::core::dma::{DmaBufferPool, PayloadLease};
use crate::core::error::{CfrError, CfrResult};
use crate::core::stats::DiagnosticCounters;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug)]
pub struct RecordBuilder {
    config: Arc<CorrelatorConfig>,
    snapshot: Arc<RwLock<CaptureSnapshot>>,
    dma: Arc<dyn DmaBufferPool>,
    counters: Arc<DiagnosticCounters>,
}

impl RecordBuilder {
    pub fn new(
        config: Arc<CorrelatorConfig>,
        snapshot: Arc<RwLock<CaptureSnapshot>>,
        dma: Arc<dyn DmaBufferPool>,
        counters: Arc<DiagnosticCounters>,
    ) -> Self {
        Self {
            config,
            snapshot,
            dma,
            counters,
        }
    }

    /// Take ownership of a DBR buffer until the returned lease is dropped.
    pub fn lease(&self, physical_address: u64) -> PayloadLease {
        PayloadLease::new(
            Arc::clone(&self.dma),
            Arc::clone(&self.counters),
            physical_address,
        )
    }

    /// Replace the capture configuration consulted for later records.
    pub fn update_snapshot(&self, snapshot: CaptureSnapshot) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    pub fn snapshot(&self) -> CaptureSnapshot {
        *self.snapshot.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Assemble header and payload for `joined`. Failures are counted here;
    /// the DBR buffer is released either way.
    pub fn build(&self, joined: &JoinedCapture) -> CfrResult<CfrRecord> {
        let lease = self.lease(joined.dbr.physical_address);
        let length = joined.payload_len();

        if length == 0 || length > self.config.max_payload_len {
            self.counters.record_invalid_length();
            return Err(CfrError::invalid_length(length, self.config.max_payload_len));
        }
        if let Some(declared) = joined.completion.dma_header.total_bytes() {
            if length != u32::from(declared) {
                self.counters.record_invalid_length();
                return Err(CfrError::LengthMismatch {
                    length,
                    declared: u32::from(declared),
                });
            }
        }

        let payload = match lease.payload(length) {
            Some(bytes) => bytes,
            None => {
                self.counters.record_buffer_unavailable();
                return Err(CfrError::BufferUnavailable {
                    physical_address: lease.physical_address(),
                });
            }
        };

        let snapshot = self.snapshot();
        // Completion arrival time, so the record is the same whichever half came first
        let timestamp = joined.completion.received_at_ms as u32;
        let metadata = VersionedMetadata::assemble(
            self.config.metadata_version,
            &snapshot,
            &joined.completion.dma_header,
            timestamp,
            length,
        );

        Ok(CfrRecord {
            header: RecordHeader {
                start_magic: CFR_START_MAGIC,
                vendor_id: self.config.vendor_id,
                data_version: self.config.data_version,
                chip_type: self.config.chip_type as u8,
                platform_type: self.config.platform_type as u8,
                reserved: 0,
                metadata,
            },
            payload,
        })
    }
}
