// SPDX-License-Identifier: MIT OR Apache-2.0

//! Replay of recorded completion events.
//!
//! A script is JSON lines, one event per line. Blank lines and lines
//! starting with `#` are skipped.
//!
//! ```text
//! {"type":"snapshot","snapshot":{"peer_addr":"00:03:7f:01:02:03"}}
//! {"type":"dbr","capture_id":7,"address":4096,"length":256}
//! {"type":"tx_rx","capture_id":7,"addr_primary":8192,"addr_secondary":12288,"header":{"ppdu_id":7}}
//! {"type":"advance","ms":3001}
//! {"type":"sweep"}
//! ```
//!
//! Time only moves on `advance`, so a replay is deterministic.

use crate::core::capture::dma_header::DmaDescriptorHeader;
use crate::core::capture::types::CaptureSnapshot;
use crate::core::config::CorrelatorConfig;
use crate::core::correlation::clock::ManualClock;
use crate::core::correlator::{CfrCorrelator, IngestOutcome};
use crate::core::dma::InMemoryDmaPool;
use crate::core::error::{CfrError, CfrResult};
use crate::core::stats::StatsSnapshot;
use crate::core::stream::sink::Sink;
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::sync::Arc;

/// Fields of a hardware DMA header to synthesize, or raw bytes to pass
/// through unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HeaderFields {
    pub ppdu_id: u16,
    pub nss: u8,
    pub chains: u8,
    pub bandwidth: u8,
    pub preamble: u8,
    pub peer_id: Option<u16>,
    pub total_bytes: Option<u16>,
    pub raw: Option<Vec<u8>>,
}

impl HeaderFields {
    pub fn to_bytes(&self) -> Vec<u8> {
        if let Some(raw) = &self.raw {
            return raw.clone();
        }
        let mut header = DmaDescriptorHeader::cfr(self.ppdu_id)
            .with_streams(self.nss.max(1), self.chains.max(1))
            .with_bandwidth(self.bandwidth)
            .with_preamble(self.preamble);
        if let Some(peer) = self.peer_id {
            header = header.with_peer(peer);
        }
        if let Some(total) = self.total_bytes {
            header = header.with_total_bytes(total);
        }
        header.encode()
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayEvent {
    /// DBR completion. Unless `stage` is false, `length` bytes of a
    /// per-capture pattern are placed at `address` first.
    Dbr {
        capture_id: u32,
        address: u64,
        length: u32,
        #[serde(default = "default_true")]
        stage: bool,
    },
    TxRx {
        capture_id: u32,
        #[serde(default)]
        addr_primary: u32,
        #[serde(default)]
        addr_secondary: u32,
        #[serde(default)]
        header: HeaderFields,
    },
    /// Move the clock forward
    Advance { ms: u64 },
    Sweep,
    Flush,
    Snapshot { snapshot: CaptureSnapshot },
}

/// Payload bytes staged for a replayed DBR completion
pub fn pattern(capture_id: u32, length: u32) -> Vec<u8> {
    (0..length).map(|i| (i as u8) ^ (capture_id as u8)).collect()
}

pub fn parse_script<R: BufRead>(reader: R) -> CfrResult<Vec<ReplayEvent>> {
    let mut events = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let event = serde_json::from_str(trimmed)
            .map_err(|e| CfrError::other(format!("line {}: {}", idx + 1, e)))?;
        events.push(event);
    }
    Ok(events)
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    pub events: usize,
    pub pending: usize,
    pub joined: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub evicted: usize,
    pub flushed_on_stop: usize,
    pub stats: StatsSnapshot,
}

/// Run `events` through a fresh correlator session, stopping it at the end.
pub fn run(
    events: &[ReplayEvent],
    config: CorrelatorConfig,
    sink: Arc<dyn Sink>,
) -> CfrResult<ReplaySummary> {
    let dma = Arc::new(InMemoryDmaPool::new());
    let clock = Arc::new(ManualClock::new(0));
    let correlator = CfrCorrelator::with_clock(config, dma.clone(), sink, clock.clone())?;
    correlator.init()?;
    correlator.start()?;

    let mut summary = ReplaySummary {
        events: events.len(),
        pending: 0,
        joined: 0,
        duplicates: 0,
        rejected: 0,
        evicted: 0,
        flushed_on_stop: 0,
        stats: correlator.stats(),
    };

    for event in events {
        let outcome = match event {
            ReplayEvent::Dbr {
                capture_id,
                address,
                length,
                stage,
            } => {
                if *stage {
                    dma.stage(*address, pattern(*capture_id, *length));
                }
                Some(correlator.on_dbr_completion(*capture_id, *address, *length))
            }
            ReplayEvent::TxRx {
                capture_id,
                addr_primary,
                addr_secondary,
                header,
            } => Some(correlator.on_tx_rx_completion(
                *capture_id,
                *addr_primary,
                *addr_secondary,
                &header.to_bytes(),
            )),
            ReplayEvent::Advance { ms } => {
                clock.advance(*ms);
                None
            }
            ReplayEvent::Sweep => {
                summary.evicted += correlator.sweep_now();
                None
            }
            ReplayEvent::Flush => {
                summary.evicted += correlator.flush_all();
                None
            }
            ReplayEvent::Snapshot { snapshot } => {
                correlator.update_snapshot(*snapshot);
                None
            }
        };

        match outcome {
            Some(Ok(IngestOutcome::Pending)) => summary.pending += 1,
            Some(Ok(IngestOutcome::Joined)) => summary.joined += 1,
            Some(Ok(IngestOutcome::Duplicate)) => summary.duplicates += 1,
            Some(Err(e)) => {
                log::debug!("Replay event rejected: {}", e);
                summary.rejected += 1;
            }
            None => {}
        }
    }

    summary.flushed_on_stop = correlator.stop()?;
    summary.stats = correlator.stats();
    Ok(summary)
}
