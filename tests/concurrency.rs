// SPDX-License-Identifier: MIT OR Apache-2.0

#[path = "common/mod.rs"]
mod common;

use cfr_correlator::core::config::CorrelatorConfig;
use cfr_correlator::core::dma::InMemoryDmaPool;
use cfr_correlator::core::stream::dispatcher::DispatchMode;
use cfr_correlator::core::stream::sink::LogSink;
use cfr_correlator::CfrCorrelator;
use common::{header, payload, Harness};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_concurrent_producers_emit_each_capture_once() {
    const CAPTURES: u32 = 140;
    let h = Arc::new(Harness::inline(140));
    for id in 0..CAPTURES {
        h.dma.stage(0x10_0000 + u64::from(id) * 0x1000, payload(id, 64));
    }

    let dbr_side = {
        let h = Arc::clone(&h);
        thread::spawn(move || {
            for id in 0..CAPTURES {
                h.correlator
                    .on_dbr_completion(id, 0x10_0000 + u64::from(id) * 0x1000, 64)
                    .unwrap();
            }
        })
    };
    let txrx_side = {
        let h = Arc::clone(&h);
        thread::spawn(move || {
            for id in (0..CAPTURES).rev() {
                h.correlator
                    .on_tx_rx_completion(id, 0, 0, &header(id))
                    .unwrap();
            }
        })
    };
    dbr_side.join().unwrap();
    txrx_side.join().unwrap();

    let stats = h.correlator.stats();
    assert_eq!(stats.joins, u64::from(CAPTURES));
    assert_eq!(stats.records_emitted, u64::from(CAPTURES));
    assert_eq!(stats.error_total(), 0);
    assert_eq!(h.correlator.occupied_slots(), 0);
    assert_eq!(h.dma.outstanding(), 0);
}

#[test]
fn test_background_sweeper_evicts_within_timeout_and_interval() {
    let config = CorrelatorConfig {
        pool_size: 8,
        aging_timeout_ms: 40,
        sweep_interval_ms: 20,
        dispatch_mode: DispatchMode::Inline,
        ..CorrelatorConfig::default()
    };
    let dma = Arc::new(InMemoryDmaPool::new());
    dma.stage(0x1000, vec![0; 16]);
    let correlator = CfrCorrelator::new(config, dma.clone(), Arc::new(LogSink::new())).unwrap();
    correlator.init().unwrap();
    correlator.start().unwrap();

    correlator.on_dbr_completion(1, 0x1000, 16).unwrap();
    let started = Instant::now();
    while correlator.occupied_slots() > 0 && started.elapsed() < Duration::from_secs(2) {
        thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(correlator.occupied_slots(), 0);
    assert_eq!(correlator.stats().timeout_missing_completion, 1);
    assert_eq!(dma.release_count(0x1000), 1);
    correlator.stop().unwrap();
    assert_eq!(correlator.stats().flush_all_slots, 0);
}

#[test]
fn test_sweeper_racing_producers_accounts_for_every_event() {
    const CAPTURES: u32 = 400;
    let config = CorrelatorConfig {
        pool_size: 4,
        aging_timeout_ms: 1,
        sweep_interval_ms: 1,
        dispatch_mode: DispatchMode::Inline,
        ..CorrelatorConfig::default()
    };
    let dma = Arc::new(InMemoryDmaPool::new());
    for id in 0..CAPTURES {
        dma.stage(0x10_0000 + u64::from(id) * 0x1000, payload(id, 32));
    }
    let sink = LogSink::new();
    let correlator =
        Arc::new(CfrCorrelator::new(config, dma.clone(), Arc::new(sink.clone())).unwrap());
    correlator.init().unwrap();
    correlator.start().unwrap();

    let dbr_side = {
        let correlator = Arc::clone(&correlator);
        thread::spawn(move || {
            for id in 0..CAPTURES {
                correlator
                    .on_dbr_completion(id, 0x10_0000 + u64::from(id) * 0x1000, 32)
                    .unwrap();
                if id % 16 == 0 {
                    thread::sleep(Duration::from_millis(2));
                }
            }
        })
    };
    let txrx_side = {
        let correlator = Arc::clone(&correlator);
        thread::spawn(move || {
            for id in 0..CAPTURES {
                correlator
                    .on_tx_rx_completion(id, 0, 0, &header(id))
                    .unwrap();
                if id % 24 == 0 {
                    thread::sleep(Duration::from_millis(2));
                }
            }
        })
    };
    dbr_side.join().unwrap();
    txrx_side.join().unwrap();
    correlator.stop().unwrap();

    let stats = correlator.stats();
    let events = stats.dbr_events + stats.txrx_events;
    assert_eq!(events, 2 * u64::from(CAPTURES));
    assert_eq!(
        2 * stats.joins + stats.timeouts() + stats.collisions + stats.flush_all_slots + stats.duplicates(),
        events
    );
    assert_eq!(stats.records_emitted, stats.joins);
    assert_eq!(sink.len() as u64, stats.joins);
    assert_eq!(stats.buffers_released, u64::from(CAPTURES));
    assert_eq!(dma.outstanding(), 0);
    assert_eq!(correlator.occupied_slots(), 0);
}
