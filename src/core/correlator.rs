// SPDX-License-Identifier: MIT OR Apache-2.0

//! # CFR Correlator
//!
//! Joins the two independent completions every channel-frequency-response
//! capture produces: the DBR completion (payload written to a DMA buffer)
//! and the TX/RX completion (capture metadata and hardware DMA header).
//! They arrive in either order, possibly on different threads. When both
//! halves of a capture are present the record is assembled and handed to
//! the sink exactly once.
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized --init--> Initialized --start--> Running --stop--> Stopped
//!                                                   ^                 |
//!                                                   +------start------+
//! Stopped/Initialized --deinit--> Deinitialized --init--> Initialized
//! ```
//!
//! Events are only accepted while `Running`. `stop()` returns after the
//! sweeper has stopped, every partial capture has been flushed and the
//! emitter has drained; no DBR buffer is held by the pool afterwards.

use crate::core::capture::builder::RecordBuilder;
use crate::core::capture::dma_header::DmaDescriptorHeader;
use crate::core::capture::types::CaptureSnapshot;
use crate::core::config::CorrelatorConfig;
use crate::core::correlation::clock::{Clock, MonotonicClock};
use crate::core::correlation::pool::{SlotPool, SlotRef};
use crate::core::correlation::slot::{
    Admission, CaptureId, CompletionHalf, DbrHalf, JoinedCapture, PartialCapture,
};
use crate::core::correlation::sweeper::{AgingSweeper, AgingTarget};
use crate::core::dma::DmaBufferPool;
use crate::core::error::{CfrError, CfrResult};
use crate::core::registry::{CaptureControl, UnassocClientRegistry};
use crate::core::stats::{DiagnosticCounters, EventSource, StatsSnapshot};
use crate::core::stream::dispatcher::EmitDispatcher;
use crate::core::stream::sink::Sink;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Running,
    Stopped,
    Deinitialized,
}

/// What happened to an accepted completion event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Stored, waiting for the other half
    Pending,
    /// Completed a capture, which was handed to the record builder
    Joined,
    /// Re-delivery of a half already seen; counted and ignored
    Duplicate,
}

/// State shared with the aging thread.
#[derive(Debug)]
struct CorrelatorCore {
    config: Arc<CorrelatorConfig>,
    clock: Arc<dyn Clock>,
    counters: Arc<DiagnosticCounters>,
    pool: SlotPool,
    builder: RecordBuilder,
    dispatcher: EmitDispatcher,
    running: AtomicBool,
    // Held shared by every producer for the duration of an event, taken
    // exclusively by `stop` to wait out in-flight events.
    ingest_gate: RwLock<()>,
}

impl CorrelatorCore {
    fn release(&self, physical_address: u64) {
        drop(self.builder.lease(physical_address));
    }

    fn on_dbr_completion(
        &self,
        capture_id: CaptureId,
        physical_address: u64,
        length: u32,
    ) -> CfrResult<IngestOutcome> {
        let _gate = self.ingest_gate.read().unwrap_or_else(PoisonError::into_inner);
        if !self.running.load(Ordering::Acquire) {
            self.counters.record_rejected_inactive();
            self.release(physical_address);
            return Err(CfrError::invalid_state(format!(
                "DBR completion for capture {} while not running",
                capture_id
            )));
        }
        self.counters.record_event(EventSource::Dbr);
        log::debug!(
            "DBR completion: capture {} addr {:#x} len {}",
            capture_id,
            physical_address,
            length
        );

        let max = self.config.max_payload_len;
        if length == 0 || length > max {
            self.counters.record_invalid_length();
            self.release(physical_address);
            log::warn!(
                "Dropping DBR completion for capture {}: length {} outside 1..={}",
                capture_id,
                length,
                max
            );
            return Err(CfrError::invalid_length(length, max));
        }

        let half = DbrHalf {
            capture_id,
            physical_address,
            length,
            received_at_ms: self.clock.now_ms(),
        };
        let slot = self.pool.acquire_or_find(capture_id);
        let admission = self
            .pool
            .lock(slot)
            .admit_dbr(half, self.config.aging_timeout_ms);
        Ok(self.settle(slot, capture_id, EventSource::Dbr, admission))
    }

    fn on_tx_rx_completion(
        &self,
        capture_id: CaptureId,
        addr_primary: u32,
        addr_secondary: u32,
        hw_header: &[u8],
    ) -> CfrResult<IngestOutcome> {
        let _gate = self.ingest_gate.read().unwrap_or_else(PoisonError::into_inner);
        if !self.running.load(Ordering::Acquire) {
            self.counters.record_rejected_inactive();
            return Err(CfrError::invalid_state(format!(
                "TX/RX completion for capture {} while not running",
                capture_id
            )));
        }
        self.counters.record_event(EventSource::TxRx);
        log::debug!(
            "TX/RX completion: capture {} addr {:#x}/{:#x}",
            capture_id,
            addr_primary,
            addr_secondary
        );

        let dma_header = match DmaDescriptorHeader::decode(hw_header) {
            Ok(header) => header,
            Err(e) => {
                self.counters.record_malformed_header();
                log::warn!("Dropping TX/RX completion for capture {}: {}", capture_id, e);
                return Err(e);
            }
        };

        let half = CompletionHalf {
            capture_id,
            addr_primary,
            addr_secondary,
            dma_header,
            received_at_ms: self.clock.now_ms(),
        };
        let slot = self.pool.acquire_or_find(capture_id);
        let admission = self
            .pool
            .lock(slot)
            .admit_completion(half, self.config.aging_timeout_ms);
        Ok(self.settle(slot, capture_id, EventSource::TxRx, admission))
    }

    /// Act on an admission after the slot lock is released.
    fn settle(
        &self,
        slot: SlotRef,
        capture_id: CaptureId,
        source: EventSource,
        admission: Admission,
    ) -> IngestOutcome {
        match admission {
            Admission::Pending { evicted } => {
                if let Some(partial) = evicted {
                    self.counters.record_collision();
                    log::warn!(
                        "{}",
                        CfrError::Collision {
                            slot: slot.index(),
                            evicted: partial.capture_id,
                            incoming: capture_id,
                        }
                    );
                    self.discard(&partial);
                }
                IngestOutcome::Pending
            }
            Admission::Joined(joined) => {
                self.counters.record_join();
                self.build_and_emit(&joined);
                IngestOutcome::Joined
            }
            Admission::Duplicate { stray_buffer } => {
                self.counters.record_duplicate(source);
                log::warn!("{}", CfrError::duplicate(capture_id, source.as_str()));
                if let Some(buffer) = stray_buffer {
                    self.release(buffer);
                }
                IngestOutcome::Duplicate
            }
        }
    }

    fn build_and_emit(&self, joined: &JoinedCapture) {
        match self.builder.build(joined) {
            Ok(record) => {
                log::debug!(
                    "Capture {} joined, emitting {} byte payload",
                    joined.capture_id,
                    record.payload.len()
                );
                self.dispatcher.dispatch(record.to_bytes());
            }
            Err(e) => log::warn!("Dropping joined capture {}: {}", joined.capture_id, e),
        }
    }

    fn discard(&self, partial: &PartialCapture) {
        if let Some(buffer) = partial.buffer() {
            self.release(buffer);
        }
    }

    fn evict_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let timeout = self.config.aging_timeout_ms;
        let mut evicted = 0;
        for slot in self.pool.refs() {
            let stale = self.pool.lock(slot).take_if_stale(now, timeout);
            if let Some(partial) = stale {
                if let Some(present) = partial.present() {
                    self.counters.record_timeout(present);
                    let missing = match present {
                        EventSource::Dbr => EventSource::TxRx,
                        EventSource::TxRx => EventSource::Dbr,
                    };
                    log::warn!(
                        "{}",
                        CfrError::Timeout {
                            capture_id: partial.capture_id,
                            missing: missing.as_str(),
                        }
                    );
                }
                self.discard(&partial);
                evicted += 1;
            }
        }
        evicted
    }

    fn flush_all(&self) -> usize {
        let mut flushed = 0;
        for slot in self.pool.refs() {
            let partial = {
                let mut guard = self.pool.lock(slot);
                let partial = guard.take_partial();
                guard.clear();
                partial
            };
            if let Some(partial) = partial {
                self.counters
                    .record_flush_all(partial.dbr.is_some(), partial.completion.is_some());
                self.discard(&partial);
                flushed += 1;
            }
        }
        if flushed > 0 {
            log::warn!("Flushed {} partial captures", flushed);
        }
        flushed
    }

    fn clear_pool(&self) {
        for slot in self.pool.refs() {
            let partial = {
                let mut guard = self.pool.lock(slot);
                let partial = guard.take_partial();
                guard.clear();
                partial
            };
            if let Some(partial) = partial {
                self.discard(&partial);
            }
        }
    }
}

impl AgingTarget for CorrelatorCore {
    fn sweep_expired(&self) -> usize {
        self.evict_expired()
    }
}

/// Capture correlation session.
///
/// Completion handlers take `&self` and may be called from any number of
/// threads. Lifecycle and control methods serialise among themselves.
#[derive(Debug)]
pub struct CfrCorrelator {
    core: Arc<CorrelatorCore>,
    sweeper: Mutex<AgingSweeper>,
    state: Mutex<SessionState>,
    control: Mutex<CaptureControl>,
}

impl CfrCorrelator {
    pub fn new(
        config: CorrelatorConfig,
        dma: Arc<dyn DmaBufferPool>,
        sink: Arc<dyn Sink>,
    ) -> CfrResult<Self> {
        Self::with_clock(config, dma, sink, Arc::new(MonotonicClock::new()))
    }

    /// Build with an explicit time source for arrival stamps and aging.
    pub fn with_clock(
        config: CorrelatorConfig,
        dma: Arc<dyn DmaBufferPool>,
        sink: Arc<dyn Sink>,
        clock: Arc<dyn Clock>,
    ) -> CfrResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let counters = Arc::new(DiagnosticCounters::new());
        let builder = RecordBuilder::new(
            Arc::clone(&config),
            Arc::new(RwLock::new(CaptureSnapshot::default())),
            dma,
            Arc::clone(&counters),
        );
        let dispatcher = EmitDispatcher::new(
            config.dispatch_mode,
            config.dispatch_queue_depth,
            sink,
            Arc::clone(&counters),
        );
        let control = CaptureControl::new(
            UnassocClientRegistry::new(config.unassoc_pool_size, config.unassoc_policy),
            config.max_sta_count,
        );

        let core = CorrelatorCore {
            pool: SlotPool::new(config.pool_size),
            config: Arc::clone(&config),
            clock,
            counters,
            builder,
            dispatcher,
            running: AtomicBool::new(false),
            ingest_gate: RwLock::new(()),
        };

        Ok(Self {
            sweeper: Mutex::new(AgingSweeper::new(config.sweep_interval())),
            core: Arc::new(core),
            state: Mutex::new(SessionState::Uninitialized),
            control: Mutex::new(control),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition_error(op: &str, state: SessionState) -> CfrError {
        CfrError::invalid_state(format!("cannot {} while {:?}", op, state))
    }

    pub fn state(&self) -> SessionState {
        *self.lock_state()
    }

    #[inline]
    pub fn config(&self) -> &CorrelatorConfig {
        &self.core.config
    }

    /// Prepare a session: empty pool, counters reset.
    pub fn init(&self) -> CfrResult<()> {
        let mut state = self.lock_state();
        match *state {
            SessionState::Uninitialized | SessionState::Stopped | SessionState::Deinitialized => {}
            other => return Err(Self::transition_error("init", other)),
        }
        self.core.clear_pool();
        self.core.counters.reset();
        *state = SessionState::Initialized;
        log::info!(
            "CFR correlator initialised: {} slots, aging {} ms, metadata v{}",
            self.core.pool.len(),
            self.core.config.aging_timeout_ms,
            self.core.config.metadata_version.as_u8()
        );
        Ok(())
    }

    /// Start accepting events.
    pub fn start(&self) -> CfrResult<()> {
        let mut state = self.lock_state();
        match *state {
            SessionState::Initialized | SessionState::Stopped => {}
            other => return Err(Self::transition_error("start", other)),
        }
        self.core.dispatcher.start()?;
        let target: Arc<dyn AgingTarget> = self.core.clone();
        if let Err(e) = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .start(target)
        {
            self.core.dispatcher.stop();
            return Err(e);
        }
        self.core.running.store(true, Ordering::Release);
        *state = SessionState::Running;
        log::info!("CFR correlator started");
        Ok(())
    }

    /// Stop accepting events, stop aging, flush every partial capture and
    /// drain the emitter. Returns the number of partial captures flushed.
    pub fn stop(&self) -> CfrResult<usize> {
        let mut state = self.lock_state();
        if *state != SessionState::Running {
            return Err(Self::transition_error("stop", *state));
        }
        self.core.running.store(false, Ordering::Release);
        drop(
            self.core
                .ingest_gate
                .write()
                .unwrap_or_else(PoisonError::into_inner),
        );
        self.sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stop();
        let flushed = self.core.flush_all();
        self.core.dispatcher.stop();
        *state = SessionState::Stopped;
        log::info!("CFR correlator stopped, {} partial captures flushed", flushed);
        Ok(flushed)
    }

    /// Tear the session down, dropping pending capture requests.
    pub fn deinit(&self) -> CfrResult<()> {
        let mut state = self.lock_state();
        match *state {
            SessionState::Initialized | SessionState::Stopped => {}
            other => return Err(Self::transition_error("deinit", other)),
        }
        self.core.clear_pool();
        self.control().clear_all();
        *state = SessionState::Deinitialized;
        log::info!("CFR correlator deinitialised");
        Ok(())
    }

    /// DBR completion: the payload of `capture_id` is in the buffer at
    /// `physical_address`.
    pub fn on_dbr_completion(
        &self,
        capture_id: CaptureId,
        physical_address: u64,
        length: u32,
    ) -> CfrResult<IngestOutcome> {
        self.core
            .on_dbr_completion(capture_id, physical_address, length)
    }

    /// TX/RX completion carrying the raw hardware DMA header of `capture_id`.
    pub fn on_tx_rx_completion(
        &self,
        capture_id: CaptureId,
        addr_primary: u32,
        addr_secondary: u32,
        hw_header: &[u8],
    ) -> CfrResult<IngestOutcome> {
        self.core
            .on_tx_rx_completion(capture_id, addr_primary, addr_secondary, hw_header)
    }

    /// Run one aging pass now; returns the number of captures evicted.
    pub fn sweep_now(&self) -> usize {
        self.core.evict_expired()
    }

    /// Evict every partial capture regardless of age.
    pub fn flush_all(&self) -> usize {
        self.core.flush_all()
    }

    pub fn update_snapshot(&self, snapshot: CaptureSnapshot) {
        self.core.builder.update_snapshot(snapshot);
    }

    pub fn snapshot(&self) -> CaptureSnapshot {
        self.core.builder.snapshot()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.core.counters.snapshot()
    }

    /// Slots currently holding a partial capture
    pub fn occupied_slots(&self) -> usize {
        self.core.pool.occupied()
    }

    /// Capture enable/disable control path and its pending-request registry
    pub fn control(&self) -> MutexGuard<'_, CaptureControl> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for CfrCorrelator {
    fn drop(&mut self) {
        if self.state() == SessionState::Running {
            if let Err(e) = self.stop() {
                log::error!("Failed to stop CFR correlator on drop: {}", e);
            }
        }
    }
}
