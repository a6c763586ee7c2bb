// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::core::capture::record::CfrRecord;
use crate::core::error::{CfrError, CfrResult};
use crate::core::stream::sink::sink_trait::Sink;
use std::sync::{Arc, Mutex, PoisonError};

/// LogSink - logs a one-line summary per record and keeps the raw bytes.
///
/// Used by the replay tool and by tests that need to inspect what was
/// emitted.
#[derive(Debug, Clone)]
pub struct LogSink {
    pub records: Arc<Mutex<Vec<Vec<u8>>>>,
    pub prefix: String,
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink {
    pub fn new() -> Self {
        Self::with_prefix("[CFR]")
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            prefix: prefix.into(),
        }
    }

    /// Raw records received so far
    pub fn records(&self) -> Vec<Vec<u8>> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Received records decoded back into their structured form
    pub fn decoded(&self) -> CfrResult<Vec<CfrRecord>> {
        self.records()
            .iter()
            .map(|bytes| CfrRecord::parse(bytes).map(|(record, _)| record))
            .collect()
    }
}

impl Sink for LogSink {
    fn publish(&self, record: &[u8]) -> CfrResult<()> {
        let (parsed, _) = CfrRecord::parse(record).map_err(|e| {
            CfrError::sink_with_source("LogSink received an undecodable record", Box::new(e))
        })?;
        let metadata = &parsed.header.metadata;
        log::info!(
            "{} v{} peer={} bw={} len={} ts={}",
            self.prefix,
            metadata.version().as_u8(),
            metadata.peer_addr(),
            metadata.info().capture_bw,
            parsed.payload.len(),
            metadata.info().timestamp
        );
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.to_vec());
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Sink> {
        Box::new(self.clone())
    }
}
