// SPDX-License-Identifier: MIT OR Apache-2.0

#[path = "common/mod.rs"]
mod common;

use cfr_correlator::core::capture::dma_header::DmaDescriptorHeader;
use cfr_correlator::core::capture::types::{CaptureSnapshot, ChannelInfo, MacAddress};
use cfr_correlator::core::capture::MetadataVersion;
use cfr_correlator::core::config::CorrelatorConfig;
use cfr_correlator::core::stream::dispatcher::DispatchMode;
use cfr_correlator::{CfrError, IngestOutcome};
use common::{header, payload, Harness};
use rand::seq::SliceRandom;

#[test]
fn test_pool_of_four_scenario() {
    let h = Harness::inline(4);
    h.dma.stage(0x1000, payload(7, 256));

    assert_eq!(
        h.correlator.on_dbr_completion(7, 0x1000, 256).unwrap(),
        IngestOutcome::Pending
    );
    assert_eq!(
        h.correlator
            .on_tx_rx_completion(7, 0x2000, 0x3000, &header(7))
            .unwrap(),
        IngestOutcome::Joined
    );

    let records = h.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].header.metadata.payload_len(), 256);
    assert_eq!(records[0].payload, payload(7, 256));
    let stats = h.correlator.stats();
    assert_eq!(stats.error_total(), 0);
    assert_eq!(stats.joins, 1);

    let err = h.correlator.on_dbr_completion(9, 0x4000, 0).unwrap_err();
    assert!(matches!(err, CfrError::InvalidLength { length: 0, .. }));
    assert_eq!(h.correlator.stats().invalid_length, 1);
    assert_eq!(h.records().len(), 1);
}

#[test]
fn test_join_is_order_independent() {
    let mut rng = rand::thread_rng();
    let mut reference = None;

    for _ in 0..8 {
        let h = Harness::inline(16);
        let mut order: Vec<(u32, bool)> = (0..12u32).flat_map(|id| [(id, true), (id, false)]).collect();
        order.shuffle(&mut rng);

        for (id, is_dbr) in order {
            if is_dbr {
                h.dbr(id, 0x10_000 + u64::from(id) * 0x1000, 64 + id);
            } else {
                h.completion(id);
            }
        }

        let mut records: Vec<_> = h.records().into_iter().map(|r| r.to_bytes()).collect();
        records.sort();
        assert_eq!(records.len(), 12);
        assert_eq!(h.correlator.occupied_slots(), 0);
        match &reference {
            None => reference = Some(records),
            Some(expected) => assert_eq!(&records, expected),
        }
    }
}

#[test]
fn test_duplicate_completion_emits_once() {
    let h = Harness::inline(4);
    h.dbr(5, 0x1000, 32);
    h.completion(5);
    assert_eq!(
        h.correlator
            .on_tx_rx_completion(5, 0x2000, 0x3000, &header(5))
            .unwrap(),
        IngestOutcome::Duplicate
    );

    assert_eq!(h.records().len(), 1);
    let stats = h.correlator.stats();
    assert_eq!(stats.duplicate_txrx, 1);
    assert_eq!(stats.records_emitted, 1);
    assert_eq!(h.correlator.occupied_slots(), 0);
}

#[test]
fn test_duplicate_before_join_keeps_first_delivery() {
    let h = Harness::inline(4);
    h.completion(6);
    assert_eq!(
        h.correlator
            .on_tx_rx_completion(6, 0x9999, 0x9999, &header(6))
            .unwrap(),
        IngestOutcome::Duplicate
    );
    h.dbr(6, 0x1000, 16);
    assert_eq!(h.records().len(), 1);
    assert_eq!(h.correlator.stats().duplicate_txrx, 1);
}

#[test]
fn test_duplicate_dbr_with_other_buffer_releases_it() {
    let h = Harness::inline(4);
    h.dbr(5, 0x1000, 32);
    h.dma.stage(0x2000, payload(5, 32));
    assert_eq!(
        h.correlator.on_dbr_completion(5, 0x2000, 32).unwrap(),
        IngestOutcome::Duplicate
    );
    assert_eq!(h.dma.release_count(0x2000), 1);

    h.completion(5);
    h.correlator.stop().unwrap();
    assert_eq!(h.records()[0].payload, payload(5, 32));
    assert_eq!(h.dma.release_count(0x1000), 1);
    assert_eq!(h.dma.release_count(0x2000), 1);
    assert_eq!(h.dma.outstanding(), 0);
    assert_eq!(h.correlator.stats().duplicate_dbr, 1);
}

#[test]
fn test_payload_shorter_than_declared_is_dropped() {
    let h = Harness::inline(4);
    h.dbr(7, 0x1000, 64);
    let declared = DmaDescriptorHeader::cfr(7).with_total_bytes(128).encode();
    assert_eq!(
        h.correlator
            .on_tx_rx_completion(7, 0x2000, 0x3000, &declared)
            .unwrap(),
        IngestOutcome::Joined
    );

    let stats = h.correlator.stats();
    assert_eq!(stats.invalid_length, 1);
    assert_eq!(stats.records_emitted, 0);
    assert!(h.records().is_empty());
    assert_eq!(h.dma.release_count(0x1000), 1);
}

#[test]
fn test_collision_evicts_and_reassigns() {
    let h = Harness::inline(4);
    h.dbr(1, 0x1000, 16);
    // 5 maps to the same slot as 1
    h.completion(5);
    h.dbr(5, 0x5000, 16);

    let stats = h.correlator.stats();
    assert_eq!(stats.collisions, 1);
    assert_eq!(stats.records_emitted, 1);
    assert_eq!(h.dma.release_count(0x1000), 1);
    assert_eq!(h.records()[0].payload, payload(5, 16));
}

#[test]
fn test_single_halves_age_out() {
    let h = Harness::inline(8);
    h.dbr(1, 0x1000, 16);
    h.completion(2);
    h.completion(3);

    let timeout = h.correlator.config().aging_timeout_ms;
    let interval = h.correlator.config().sweep_interval_ms;
    h.clock.advance(timeout);
    assert_eq!(h.correlator.sweep_now(), 0);
    h.clock.advance(interval);
    assert_eq!(h.correlator.sweep_now(), 3);

    let stats = h.correlator.stats();
    assert_eq!(stats.timeout_missing_completion, 1);
    assert_eq!(stats.timeout_missing_dbr, 2);
    assert_eq!(stats.records_emitted, 0);
    assert_eq!(h.correlator.occupied_slots(), 0);
    assert_eq!(h.dma.release_count(0x1000), 1);
}

#[test]
fn test_stop_flushes_every_partial_slot() {
    let h = Harness::inline(8);
    h.dbr(1, 0x1000, 16);
    h.dbr(2, 0x2000, 16);
    h.completion(3);
    h.dbr(4, 0x4000, 16);
    h.completion(4);

    assert_eq!(h.correlator.occupied_slots(), 3);
    assert_eq!(h.correlator.stop().unwrap(), 3);
    assert_eq!(h.correlator.occupied_slots(), 0);

    let stats = h.correlator.stats();
    assert_eq!(stats.flush_all_slots, 3);
    assert_eq!(stats.flush_all_dbr, 2);
    assert_eq!(stats.flush_all_txrx, 1);
    assert_eq!(h.dma.outstanding(), 0);
    assert_eq!(stats.buffers_released, 3);
}

#[test]
fn test_v2_record_carries_snapshot() {
    let h = Harness::inline(4);
    let peer: MacAddress = "00:03:7f:aa:bb:cc".parse().unwrap();
    let mut snapshot = CaptureSnapshot {
        peer_addr: peer,
        channel: ChannelInfo {
            channel_bw: 2,
            phy_mode: 11,
            prim20_chan: 5180,
            center_freq1: 5210,
            center_freq2: 0,
        },
        ..CaptureSnapshot::default()
    };
    snapshot.chain_rssi[0] = 45;
    snapshot.chain_rssi[1] = 47;
    snapshot.chain_phase[1] = 512;
    h.correlator.update_snapshot(snapshot);

    h.dbr(3, 0x1000, 128);
    h.completion(3);

    let record = &h.records()[0];
    let metadata = &record.header.metadata;
    assert_eq!(metadata.version(), MetadataVersion::V2);
    assert_eq!(metadata.peer_addr(), peer);
    let info = metadata.info();
    assert_eq!(info.capture_bw, 2);
    assert_eq!(info.channel_bw, 2);
    assert_eq!(info.prim20_chan, 5180);
    assert_eq!(info.center_freq1, 5210);
    assert_eq!(info.timestamp, 10_000);
    assert_eq!(info.length, 128);
    let chains = metadata.chains().unwrap();
    assert_eq!(chains.chain_rssi[..2], [45, 47]);
    assert_eq!(chains.chain_phase[1], 512);
}

#[test]
fn test_v3_metadata_version_from_config() {
    let h = Harness::new(CorrelatorConfig {
        pool_size: 4,
        metadata_version: MetadataVersion::V3,
        dispatch_mode: DispatchMode::Inline,
        ..CorrelatorConfig::default()
    });
    h.dbr(2, 0x1000, 8);
    h.completion(2);
    let records = h.records();
    assert_eq!(records[0].header.metadata_version(), MetadataVersion::V3);
    assert_eq!(records[0].payload.len(), 8);
}

#[test]
fn test_worker_mode_delivers_after_stop() {
    let h = Harness::new(CorrelatorConfig {
        pool_size: 32,
        ..CorrelatorConfig::default()
    });
    for id in 0..20 {
        h.dbr(id, 0x1000 * u64::from(id + 1), 32);
        h.completion(id);
    }
    h.correlator.stop().unwrap();
    assert_eq!(h.sink.len(), 20);
    assert_eq!(h.correlator.stats().records_emitted, 20);
}
