// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hands finished records to the sink.
//!
//! **Worker mode** (default): records go through a bounded channel to one
//! emitter thread. A full channel drops the record and counts it; producers
//! never block on the sink.
//!
//! **Inline mode**: the producer that completed the join publishes directly,
//! after its slot lock has been released.

use crate::core::error::CfrResult;
use crate::core::stats::DiagnosticCounters;
use crate::core::stream::sink::Sink;
use crossbeam_channel::{bounded, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    #[default]
    Worker,
    Inline,
}

#[derive(Debug)]
pub struct EmitDispatcher {
    mode: DispatchMode,
    queue_depth: usize,
    sink: Arc<dyn Sink>,
    counters: Arc<DiagnosticCounters>,
    sender: RwLock<Option<Sender<Vec<u8>>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    accepting: AtomicBool,
}

fn deliver(sink: &dyn Sink, counters: &DiagnosticCounters, record: &[u8]) {
    match sink.publish(record) {
        Ok(()) => counters.record_emitted(),
        Err(e) => {
            counters.record_sink_failure();
            log::error!("Sink rejected record of {} bytes: {}", record.len(), e);
        }
    }
}

impl EmitDispatcher {
    pub fn new(
        mode: DispatchMode,
        queue_depth: usize,
        sink: Arc<dyn Sink>,
        counters: Arc<DiagnosticCounters>,
    ) -> Self {
        Self {
            mode,
            queue_depth: queue_depth.max(1),
            sink,
            counters,
            sender: RwLock::new(None),
            handle: Mutex::new(None),
            accepting: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    pub fn is_running(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Start the sink and, in worker mode, the emitter thread.
    pub fn start(&self) -> CfrResult<()> {
        if self.accepting.load(Ordering::Acquire) {
            return Ok(());
        }
        self.sink.start();

        if self.mode == DispatchMode::Worker {
            let (tx, rx) = bounded::<Vec<u8>>(self.queue_depth);
            let sink = Arc::clone(&self.sink);
            let counters = Arc::clone(&self.counters);
            let handle = thread::Builder::new()
                .name("cfr-emitter".to_string())
                .spawn(move || {
                    for record in rx.iter() {
                        deliver(sink.as_ref(), &counters, &record);
                    }
                })?;
            *self.sender.write().unwrap_or_else(PoisonError::into_inner) = Some(tx);
            *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        }

        self.accepting.store(true, Ordering::Release);
        log::debug!("Emit dispatcher started in {:?} mode", self.mode);
        Ok(())
    }

    /// Forward one serialized record.
    pub fn dispatch(&self, record: Vec<u8>) {
        if !self.accepting.load(Ordering::Acquire) {
            self.counters.record_dispatch_drop();
            log::warn!("Dispatcher stopped, dropping record of {} bytes", record.len());
            return;
        }

        match self.mode {
            DispatchMode::Inline => deliver(self.sink.as_ref(), &self.counters, &record),
            DispatchMode::Worker => {
                let sender = self.sender.read().unwrap_or_else(PoisonError::into_inner);
                let result = match sender.as_ref() {
                    Some(tx) => tx.try_send(record),
                    None => Err(TrySendError::Disconnected(record)),
                };
                match result {
                    Ok(()) => {}
                    Err(TrySendError::Full(record)) => {
                        self.counters.record_dispatch_drop();
                        log::warn!(
                            "Emit queue full ({}), dropping record of {} bytes",
                            self.queue_depth,
                            record.len()
                        );
                    }
                    Err(TrySendError::Disconnected(record)) => {
                        self.counters.record_dispatch_drop();
                        log::warn!("Emitter gone, dropping record of {} bytes", record.len());
                    }
                }
            }
        }
    }

    /// Stop accepting, deliver everything already queued, join the emitter
    /// and stop the sink.
    pub fn stop(&self) {
        let was_running = self.accepting.swap(false, Ordering::AcqRel);
        // Waits for in-flight dispatch calls holding the read lock
        self.sender
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("Emitter thread panicked");
            }
        }
        if was_running {
            self.sink.stop();
            log::debug!("Emit dispatcher stopped");
        }
    }
}

impl Drop for EmitDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
