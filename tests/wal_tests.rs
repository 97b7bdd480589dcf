//! Tests for the WAL
//!
//! These tests verify:
//! - Writing records and sequence numbering
//! - Reading records back in order
//! - CRC validation of record bodies
//! - Recovery from torn tails and corrupt records
//! - Gap accounting for dropped flushes

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;

use replikv::config::WalSyncStrategy;
use replikv::fault::RandomFlushLoss;
use replikv::wal::{BulkItem, Operation, WalReader, WalRecord, WalRecovery, WalWriter, HEADER_SIZE};
use replikv::KvError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal");
    (temp_dir, wal_path)
}

fn open_writer(path: &PathBuf) -> WalWriter<Operation> {
    WalWriter::open(path, WalSyncStrategy::EveryWrite, 1).unwrap()
}

fn read_all(path: &PathBuf) -> Vec<WalRecord<Operation>> {
    WalReader::<Operation>::open(path)
        .unwrap()
        .entries()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

// =============================================================================
// Writing
// =============================================================================

#[test]
fn test_write_single_record() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = open_writer(&wal_path);

    let seq = writer.append(&Operation::set("key1", "value1"), false).unwrap();

    assert_eq!(seq, 1);
    assert_eq!(writer.next_seq(), 2);
    assert!(!writer.is_empty());
}

#[test]
fn test_sequence_starts_where_requested() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer: WalWriter<Operation> = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite, 42).unwrap();

    assert_eq!(writer.append(&Operation::delete("k"), false).unwrap(), 42);
    assert_eq!(writer.append(&Operation::delete("k"), false).unwrap(), 43);
}

#[test]
fn test_append_record_rejects_rewind() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = open_writer(&wal_path);
    writer.append_record(&WalRecord::new(5, Operation::set("a", "1"))).unwrap();

    let result = writer.append_record(&WalRecord::new(3, Operation::set("b", "2")));

    assert!(matches!(result, Err(KvError::WalCorruption(_))));
    assert_eq!(writer.next_seq(), 6);
}

#[test]
fn test_truncate_keeps_counting() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = open_writer(&wal_path);
    writer.append(&Operation::set("a", "1"), false).unwrap();
    writer.append(&Operation::set("b", "2"), false).unwrap();

    writer.truncate().unwrap();

    assert!(writer.is_empty());
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), 0);
    assert_eq!(writer.append(&Operation::set("c", "3"), false).unwrap(), 3);
}

#[cfg(target_os = "linux")]
#[test]
fn test_failed_write_does_not_consume_sequence() {
    // Every write to /dev/full fails with ENOSPC
    let mut writer: WalWriter<Operation> =
        WalWriter::open(std::path::Path::new("/dev/full"), WalSyncStrategy::EveryWrite, 7).unwrap();

    let result = writer.append(&Operation::set("a", "1"), false);

    assert!(matches!(result, Err(KvError::DurabilityFailure(_))));
    assert_eq!(writer.next_seq(), 7);
}

#[test]
fn test_batched_sync_writes_every_record() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer: WalWriter<Operation> =
        WalWriter::open(&wal_path, WalSyncStrategy::EveryNEntries { count: 4 }, 1).unwrap();
    for i in 0..10 {
        writer.append(&Operation::set(format!("k{}", i), "v"), false).unwrap();
    }
    writer.sync().unwrap();

    assert_eq!(read_all(&wal_path).len(), 10);
}

// =============================================================================
// Reading
// =============================================================================

#[test]
fn test_read_back_in_order() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = open_writer(&wal_path);
    let bulk = Operation::BulkSet {
        items: vec![
            BulkItem {
                key: "x".into(),
                value: b"1".to_vec(),
                stamp: None,
            },
            BulkItem {
                key: "y".into(),
                value: b"2".to_vec(),
                stamp: None,
            },
        ],
    };
    writer.append(&Operation::set("a", "1"), false).unwrap();
    writer.append(&Operation::delete("a"), false).unwrap();
    writer.append(&bulk, false).unwrap();

    let records = read_all(&wal_path);

    let seqs: Vec<u64> = records.iter().map(|r| r.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3]);
    assert_eq!(records[0].payload, Operation::set("a", "1"));
    assert_eq!(records[1].payload, Operation::delete("a"));
    assert_eq!(records[2].payload, bulk);
    assert_eq!(records[2].payload.keys(), vec!["x", "y"]);
}

#[test]
fn test_append_at_preserves_timestamp() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = open_writer(&wal_path);

    writer.append_at(&Operation::set("a", "1"), 1_234_567, false).unwrap();

    assert_eq!(read_all(&wal_path)[0].timestamp, 1_234_567);
}

#[test]
fn test_strict_reader_rejects_corruption() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = open_writer(&wal_path);
    writer.append(&Operation::set("a", "1"), false).unwrap();
    drop(writer);

    let mut bytes = fs::read(&wal_path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&wal_path, &bytes).unwrap();

    let mut reader = WalReader::<Operation>::open(&wal_path).unwrap();
    assert!(matches!(reader.next_entry(), Err(KvError::WalCorruption(_))));
}

#[test]
fn test_crc_covers_sequence_number() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = open_writer(&wal_path);
    writer.append(&Operation::set("a", "1"), false).unwrap();
    drop(writer);

    // Rewrite the sequence number but keep body and CRC
    let mut bytes = fs::read(&wal_path).unwrap();
    bytes[0..8].copy_from_slice(&99u64.to_le_bytes());
    fs::write(&wal_path, &bytes).unwrap();

    let mut reader = WalReader::<Operation>::open(&wal_path).unwrap();
    assert!(reader.next_entry().is_err());
}

// =============================================================================
// Recovery
// =============================================================================

#[test]
fn test_recover_missing_file() {
    let (_temp, wal_path) = setup_temp_wal();

    let (records, result) = WalRecovery::recover::<Operation>(&wal_path).unwrap();

    assert!(records.is_empty());
    assert_eq!(result.entries_recovered, 0);
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_truncates_torn_tail() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = open_writer(&wal_path);
    writer.append(&Operation::set("a", "1"), false).unwrap();
    let good_len = writer.len();
    writer.append(&Operation::set("b", "2"), false).unwrap();
    drop(writer);

    let file = OpenOptions::new().write(true).open(&wal_path).unwrap();
    file.set_len(good_len + HEADER_SIZE as u64 + 3).unwrap();
    drop(file);

    let verified = WalRecovery::verify::<Operation>(&wal_path).unwrap();
    assert!(verified.was_truncated);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), good_len + HEADER_SIZE as u64 + 3);

    let (records, result) = WalRecovery::recover::<Operation>(&wal_path).unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(result.entries_recovered, 1);
    assert_eq!(result.last_seq, 1);
    assert!(result.was_truncated);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), good_len);
}

#[test]
fn test_recover_header_only_fragment() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = open_writer(&wal_path);
    writer.append(&Operation::set("a", "1"), false).unwrap();
    let good_len = writer.len();
    drop(writer);

    let mut bytes = fs::read(&wal_path).unwrap();
    bytes.extend_from_slice(&[0xAB; 5]);
    fs::write(&wal_path, &bytes).unwrap();

    let (records, result) = WalRecovery::recover::<Operation>(&wal_path).unwrap();

    assert_eq!(records.len(), 1);
    assert!(result.was_truncated);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), good_len);
}

#[test]
fn test_recover_skips_corrupt_middle_record() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = open_writer(&wal_path);
    writer.append(&Operation::set("a", "1"), false).unwrap();
    let first_len = writer.len() as usize;
    writer.append(&Operation::set("b", "2"), false).unwrap();
    writer.append(&Operation::set("c", "3"), false).unwrap();
    drop(writer);

    let mut bytes = fs::read(&wal_path).unwrap();
    bytes[first_len + HEADER_SIZE] ^= 0xFF;
    fs::write(&wal_path, &bytes).unwrap();

    let (records, result) = WalRecovery::recover::<Operation>(&wal_path).unwrap();

    let seqs: Vec<u64> = records.iter().map(|r| r.seq).collect();
    assert_eq!(seqs, vec![1, 3]);
    assert_eq!(result.entries_corrupted, 1);
    assert_eq!(result.entries_missing, 1);
    assert!(!result.was_truncated);
}

#[test]
fn test_dropped_flush_leaves_gap() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = open_writer(&wal_path).with_fault(Arc::new(RandomFlushLoss::new(1.0, Some(1))));

    writer.append(&Operation::set("a", "1"), false).unwrap();
    let dropped = writer.append(&Operation::set("b", "2"), true).unwrap();
    writer.append(&Operation::set("c", "3"), false).unwrap();
    drop(writer);

    let (records, result) = WalRecovery::recover::<Operation>(&wal_path).unwrap();

    assert_eq!(dropped, 2);
    assert_eq!(records.len(), 2);
    assert_eq!(result.entries_missing, 1);
    assert_eq!(result.last_seq, 3);
}

#[test]
fn test_rewrite_replaces_contents() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = open_writer(&wal_path);
    for key in ["a", "b", "c"] {
        writer.append(&Operation::set(key, "v"), false).unwrap();
    }

    let keep = vec![WalRecord::new(1, Operation::set("a", "v"))];
    writer.rewrite(&keep, 2).unwrap();
    writer.append(&Operation::set("z", "v"), false).unwrap();
    drop(writer);

    let records = read_all(&wal_path);
    let seqs: Vec<u64> = records.iter().map(|r| r.seq).collect();
    assert_eq!(seqs, vec![1, 2]);
    assert_eq!(records[1].payload, Operation::set("z", "v"));
}
