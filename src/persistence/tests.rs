use super::LogStore;
use crate::broker::{BrokerError, Record};
use crate::message::Headers;

use tempfile::tempdir;

fn record(topic: &str, partition: i32, offset: i64, body: &str) -> Record {
    Record {
        topic: topic.to_string(),
        partition,
        offset,
        payload: body.as_bytes().to_vec(),
        headers: Headers::new().with("id", format!("{topic}-{partition}-{offset}")),
        timestamp: 1_725_000_000_000,
    }
}

#[test]
fn test_store_and_load_records() {
    let dir = tempdir().unwrap();
    let store = LogStore::open(dir.path()).unwrap();

    store.append(&record("jobs", 0, 0, "first")).unwrap();
    store.append(&record("jobs", 0, 1, "second")).unwrap();

    let records = store.load_records().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].payload, b"first");
    assert_eq!(records[1].offset, 1);
    assert_eq!(records[1].headers.message_id(), Some("jobs-0-1"));
}

#[test]
fn test_records_come_back_in_partition_then_offset_order() {
    let dir = tempdir().unwrap();
    let store = LogStore::open(dir.path()).unwrap();

    store.append(&record("jobs", 1, 0, "p1-0")).unwrap();
    store.append(&record("jobs", 0, 1, "p0-1")).unwrap();
    store.append(&record("jobs", 0, 0, "p0-0")).unwrap();

    let order: Vec<_> = store
        .load_records()
        .unwrap()
        .into_iter()
        .map(|r| (r.partition, r.offset))
        .collect();
    assert_eq!(order, vec![(0, 0), (0, 1), (1, 0)]);
}

#[test]
fn test_offsets_survive_reopen() {
    let dir = tempdir().unwrap();
    {
        let store = LogStore::open(dir.path()).unwrap();
        store.store_offset("workers", "jobs", 0, 7).unwrap();
        store.store_offset("workers", "jobs", 0, 9).unwrap();
        store.flush().unwrap();
    }

    let store = LogStore::open(dir.path()).unwrap();
    let offsets = store.load_offsets().unwrap();
    assert_eq!(offsets.len(), 1);
    assert_eq!(offsets[0].group, "workers");
    assert_eq!(offsets[0].topic, "jobs");
    assert_eq!(offsets[0].partition, 0);
    assert_eq!(offsets[0].offset, 9);
}

#[test]
fn test_empty_store_returns_empty_vecs() {
    let dir = tempdir().unwrap();
    let store = LogStore::open(dir.path()).unwrap();
    assert!(store.load_records().unwrap().is_empty());
    assert!(store.load_offsets().unwrap().is_empty());
}

#[test]
fn test_corrupt_offsets_fail_the_load() {
    let dir = tempdir().unwrap();
    {
        let store = LogStore::open(dir.path()).unwrap();
        store.store_offset("workers", "jobs", 0, 3).unwrap();
        store.flush().unwrap();
    }
    {
        let db = sled::open(dir.path()).unwrap();
        let tree = db.open_tree("offsets").unwrap();
        tree.insert("workers\0jobs\0zero", 4_i64.to_be_bytes().to_vec())
            .unwrap();
        db.flush().unwrap();
    }

    let store = LogStore::open(dir.path()).unwrap();
    let err = store.load_offsets().unwrap_err();
    assert!(matches!(err, BrokerError::Corrupt(ref msg) if msg.contains("unreadable partition")));
}

#[test]
fn test_truncated_offset_value_fails_the_load() {
    let dir = tempdir().unwrap();
    {
        let db = sled::open(dir.path()).unwrap();
        let tree = db.open_tree("offsets").unwrap();
        tree.insert("workers\0jobs\00", vec![1_u8, 2]).unwrap();
        db.flush().unwrap();
    }

    let store = LogStore::open(dir.path()).unwrap();
    assert!(matches!(
        store.load_offsets(),
        Err(BrokerError::Corrupt(_))
    ));
}
