// SPDX-License-Identifier: MIT OR Apache-2.0

use cfr_correlator::core::capture::record::RecordReader;
use cfr_correlator::core::config::CorrelatorConfig;
use cfr_correlator::core::replay::{self, pattern};
use cfr_correlator::core::stream::sink::FileSink;
use std::sync::Arc;

const SCRIPT: &str = r#"
{"type":"snapshot","snapshot":{"peer_addr":"00:03:7f:01:02:03","channel":{"prim20_chan":36}}}
{"type":"dbr","capture_id":1,"address":4096,"length":100}
{"type":"tx_rx","capture_id":1,"header":{"ppdu_id":1,"bandwidth":1,"total_bytes":100}}
{"type":"tx_rx","capture_id":2,"header":{"ppdu_id":2}}
{"type":"dbr","capture_id":2,"address":8192,"length":50}
{"type":"dbr","capture_id":3,"address":12288,"length":10}
{"type":"advance","ms":3001}
{"type":"sweep"}
"#;

#[test]
fn test_replay_to_file_then_decode() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.bin");
    let config = CorrelatorConfig::from_yaml_str("pool_size: 8\nmetadata_version: 1\n").unwrap();

    let events = replay::parse_script(SCRIPT.as_bytes()).unwrap();
    let summary = replay::run(&events, config, Arc::new(FileSink::create(&path).unwrap())).unwrap();
    assert_eq!(summary.joined, 2);
    assert_eq!(summary.evicted, 1);
    assert_eq!(summary.stats.timeout_missing_completion, 1);

    let bytes = std::fs::read(&path).unwrap();
    let records: Vec<_> = RecordReader::new(&bytes).collect::<Result<_, _>>().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].payload, pattern(1, 100));
    assert_eq!(records[0].header.metadata.info().prim20_chan, 36);
    assert_eq!(records[0].header.metadata.info().capture_bw, 1);
    assert_eq!(
        records[1].header.metadata.peer_addr().to_string(),
        "00:03:7f:01:02:03"
    );
}
