// SPDX-License-Identifier: MIT OR Apache-2.0

#![allow(dead_code)]

use cfr_correlator::core::capture::dma_header::DmaDescriptorHeader;
use cfr_correlator::core::capture::record::CfrRecord;
use cfr_correlator::core::config::CorrelatorConfig;
use cfr_correlator::core::correlation::clock::ManualClock;
use cfr_correlator::core::dma::InMemoryDmaPool;
use cfr_correlator::core::stream::dispatcher::DispatchMode;
use cfr_correlator::core::stream::sink::LogSink;
use cfr_correlator::CfrCorrelator;
use std::sync::Arc;

/// A running correlator wired to an in-memory DMA pool, a collecting sink
/// and a manual clock.
pub struct Harness {
    pub correlator: CfrCorrelator,
    pub dma: Arc<InMemoryDmaPool>,
    pub sink: LogSink,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(config: CorrelatorConfig) -> Self {
        let dma = Arc::new(InMemoryDmaPool::new());
        let sink = LogSink::new();
        let clock = Arc::new(ManualClock::new(10_000));
        let correlator =
            CfrCorrelator::with_clock(config, dma.clone(), Arc::new(sink.clone()), clock.clone())
                .expect("valid config");
        correlator.init().expect("init");
        correlator.start().expect("start");
        Self {
            correlator,
            dma,
            sink,
            clock,
        }
    }

    /// Inline dispatch, so emitted records are visible as soon as the
    /// joining call returns.
    pub fn inline(pool_size: usize) -> Self {
        Self::new(CorrelatorConfig {
            pool_size,
            dispatch_mode: DispatchMode::Inline,
            ..CorrelatorConfig::default()
        })
    }

    /// Stage a payload and deliver its DBR completion.
    pub fn dbr(&self, capture_id: u32, address: u64, length: u32) {
        self.dma.stage(address, payload(capture_id, length));
        self.correlator
            .on_dbr_completion(capture_id, address, length)
            .expect("dbr accepted");
    }

    pub fn completion(&self, capture_id: u32) {
        self.correlator
            .on_tx_rx_completion(capture_id, 0x2000, 0x3000, &header(capture_id))
            .expect("completion accepted");
    }

    pub fn records(&self) -> Vec<CfrRecord> {
        self.sink.decoded().expect("records decode")
    }
}

pub fn payload(capture_id: u32, length: u32) -> Vec<u8> {
    (0..length)
        .map(|i| (i as u8).wrapping_add(capture_id as u8))
        .collect()
}

pub fn header(capture_id: u32) -> Vec<u8> {
    DmaDescriptorHeader::cfr(capture_id as u16)
        .with_streams(2, 2)
        .with_bandwidth(2)
        .encode()
}
