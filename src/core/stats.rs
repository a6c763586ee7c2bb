// SPDX-License-Identifier: MIT OR Apache-2.0

//! Diagnostic counters.
//!
//! Every drop, eviction and duplicate is counted here; nothing the
//! correlator discards is silent. Counters are reset when a capture session
//! is initialised and otherwise only grow.

use chrono::{DateTime, Utc};
use crossbeam::utils::CachePadded;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Which completion source delivered an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Dbr,
    TxRx,
}

impl EventSource {
    pub const fn as_str(&self) -> &'static str {
        match self {
            EventSource::Dbr => "DBR",
            EventSource::TxRx => "TX/RX",
        }
    }
}

#[derive(Debug, Default)]
pub struct DiagnosticCounters {
    // Hot path, one increment per event
    dbr_events: CachePadded<AtomicU64>,
    txrx_events: CachePadded<AtomicU64>,
    joins: CachePadded<AtomicU64>,
    records_emitted: CachePadded<AtomicU64>,

    collisions: AtomicU64,
    duplicate_dbr: AtomicU64,
    duplicate_txrx: AtomicU64,
    timeout_missing_completion: AtomicU64,
    timeout_missing_dbr: AtomicU64,
    flush_all_slots: AtomicU64,
    flush_all_dbr: AtomicU64,
    flush_all_txrx: AtomicU64,
    invalid_length: AtomicU64,
    malformed_headers: AtomicU64,
    buffer_unavailable: AtomicU64,
    buffers_released: AtomicU64,
    sink_failures: AtomicU64,
    dispatch_drops: AtomicU64,
    rejected_inactive: AtomicU64,
}

#[inline]
fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

#[inline]
fn read(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

impl DiagnosticCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&self, source: EventSource) {
        match source {
            EventSource::Dbr => bump(&self.dbr_events),
            EventSource::TxRx => bump(&self.txrx_events),
        }
    }

    pub fn record_join(&self) {
        bump(&self.joins);
    }

    pub fn record_emitted(&self) {
        bump(&self.records_emitted);
    }

    pub fn record_collision(&self) {
        bump(&self.collisions);
    }

    pub fn record_duplicate(&self, source: EventSource) {
        match source {
            EventSource::Dbr => bump(&self.duplicate_dbr),
            EventSource::TxRx => bump(&self.duplicate_txrx),
        }
    }

    /// A partial slot aged out; `present` is the half that did arrive.
    pub fn record_timeout(&self, present: EventSource) {
        match present {
            EventSource::Dbr => bump(&self.timeout_missing_completion),
            EventSource::TxRx => bump(&self.timeout_missing_dbr),
        }
    }

    pub fn record_flush_all(&self, dbr_present: bool, txrx_present: bool) {
        bump(&self.flush_all_slots);
        if dbr_present {
            bump(&self.flush_all_dbr);
        }
        if txrx_present {
            bump(&self.flush_all_txrx);
        }
    }

    pub fn record_invalid_length(&self) {
        bump(&self.invalid_length);
    }

    pub fn record_malformed_header(&self) {
        bump(&self.malformed_headers);
    }

    pub fn record_buffer_unavailable(&self) {
        bump(&self.buffer_unavailable);
    }

    pub fn record_buffer_release(&self) {
        bump(&self.buffers_released);
    }

    pub fn record_sink_failure(&self) {
        bump(&self.sink_failures);
    }

    pub fn record_dispatch_drop(&self) {
        bump(&self.dispatch_drops);
    }

    pub fn record_rejected_inactive(&self) {
        bump(&self.rejected_inactive);
    }

    pub fn reset(&self) {
        for counter in [
            &*self.dbr_events,
            &*self.txrx_events,
            &*self.joins,
            &*self.records_emitted,
            &self.collisions,
            &self.duplicate_dbr,
            &self.duplicate_txrx,
            &self.timeout_missing_completion,
            &self.timeout_missing_dbr,
            &self.flush_all_slots,
            &self.flush_all_dbr,
            &self.flush_all_txrx,
            &self.invalid_length,
            &self.malformed_headers,
            &self.buffer_unavailable,
            &self.buffers_released,
            &self.sink_failures,
            &self.dispatch_drops,
            &self.rejected_inactive,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            captured_at: Utc::now(),
            dbr_events: read(&self.dbr_events),
            txrx_events: read(&self.txrx_events),
            joins: read(&self.joins),
            records_emitted: read(&self.records_emitted),
            collisions: read(&self.collisions),
            duplicate_dbr: read(&self.duplicate_dbr),
            duplicate_txrx: read(&self.duplicate_txrx),
            timeout_missing_completion: read(&self.timeout_missing_completion),
            timeout_missing_dbr: read(&self.timeout_missing_dbr),
            flush_all_slots: read(&self.flush_all_slots),
            flush_all_dbr: read(&self.flush_all_dbr),
            flush_all_txrx: read(&self.flush_all_txrx),
            invalid_length: read(&self.invalid_length),
            malformed_headers: read(&self.malformed_headers),
            buffer_unavailable: read(&self.buffer_unavailable),
            buffers_released: read(&self.buffers_released),
            sink_failures: read(&self.sink_failures),
            dispatch_drops: read(&self.dispatch_drops),
            rejected_inactive: read(&self.rejected_inactive),
        }
    }
}

/// Point-in-time copy of the counters, for status queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub captured_at: DateTime<Utc>,
    pub dbr_events: u64,
    pub txrx_events: u64,
    pub joins: u64,
    pub records_emitted: u64,
    pub collisions: u64,
    pub duplicate_dbr: u64,
    pub duplicate_txrx: u64,
    pub timeout_missing_completion: u64,
    pub timeout_missing_dbr: u64,
    pub flush_all_slots: u64,
    pub flush_all_dbr: u64,
    pub flush_all_txrx: u64,
    pub invalid_length: u64,
    pub malformed_headers: u64,
    pub buffer_unavailable: u64,
    pub buffers_released: u64,
    pub sink_failures: u64,
    pub dispatch_drops: u64,
    pub rejected_inactive: u64,
}

impl StatsSnapshot {
    pub fn duplicates(&self) -> u64 {
        self.duplicate_dbr + self.duplicate_txrx
    }

    pub fn timeouts(&self) -> u64 {
        self.timeout_missing_completion + self.timeout_missing_dbr
    }

    /// Sum of every counter that represents a lost or discarded event
    pub fn error_total(&self) -> u64 {
        self.collisions
            + self.duplicates()
            + self.timeouts()
            + self.flush_all_slots
            + self.invalid_length
            + self.malformed_headers
            + self.buffer_unavailable
            + self.sink_failures
            + self.dispatch_drops
            + self.rejected_inactive
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let counters = DiagnosticCounters::new();
        let snap = counters.snapshot();
        assert_eq!(snap.error_total(), 0);
        assert_eq!(snap.dbr_events, 0);
    }

    #[test]
    fn test_timeout_counts_missing_half() {
        let counters = DiagnosticCounters::new();
        counters.record_timeout(EventSource::Dbr);
        counters.record_timeout(EventSource::Dbr);
        counters.record_timeout(EventSource::TxRx);
        let snap = counters.snapshot();
        assert_eq!(snap.timeout_missing_completion, 2);
        assert_eq!(snap.timeout_missing_dbr, 1);
        assert_eq!(snap.timeouts(), 3);
    }

    #[test]
    fn test_reset_clears_everything() {
        let counters = DiagnosticCounters::new();
        counters.record_event(EventSource::Dbr);
        counters.record_flush_all(true, false);
        counters.record_invalid_length();
        counters.reset();
        let snap = counters.snapshot();
        assert_eq!(snap.dbr_events, 0);
        assert_eq!(snap.flush_all_slots, 0);
        assert_eq!(snap.error_total(), 0);
    }

    #[test]
    fn test_snapshot_serializes_to_json() {
        let counters = DiagnosticCounters::new();
        counters.record_join();
        let json = counters.snapshot().to_json().unwrap();
        assert!(json.contains("\"joins\": 1"));
    }
}
