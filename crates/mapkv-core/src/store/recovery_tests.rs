//! Crash-recovery tests: byte-level surgery on the data and meta files,
//! then a remount to observe what validation salvages.

use serial_test::serial;
use tempfile::TempDir;

use super::{paths, Store, StoreMode, SyncMode};
use crate::error::RecoverStrategy;
use crate::meta::MetaInfo;

/// Ten keys: the first insert runs a full rewrite (anchoring
/// `lastConfirmed` at a one-key image), the other nine are plain appends.
fn seed_store(dir: &TempDir, id: &str) -> (usize, usize) {
    let kv = Store::open_unregistered(id, StoreMode::SingleProcess, None, &dir.path().join(id))
        .expect("open store");
    for i in 1..=10 {
        assert!(kv.set_i32(&format!("key_{i}"), i));
    }
    kv.sync(SyncMode::Sync);
    let meta = read_meta(dir, id);
    (
        usize::try_from(meta.actual_size).expect("size fits"),
        usize::try_from(meta.last_actual_size).expect("size fits"),
    )
}

fn reopen(dir: &TempDir, id: &str) -> Store {
    Store::open_unregistered(id, StoreMode::SingleProcess, None, &dir.path().join(id))
        .expect("reopen store")
}

fn read_meta(dir: &TempDir, id: &str) -> MetaInfo {
    let meta_path = paths::meta_path(&dir.path().join(id));
    MetaInfo::read(&std::fs::read(meta_path).expect("read meta file"))
}

fn patch_data(dir: &TempDir, id: &str, offset: usize, patch: impl FnOnce(&mut u8)) {
    let path = dir.path().join(id);
    let mut data = std::fs::read(&path).expect("read data file");
    patch(&mut data[offset]);
    std::fs::write(&path, data).expect("write data file");
}

fn break_last_confirmed(dir: &TempDir, id: &str) {
    let path = paths::meta_path(&dir.path().join(id));
    let mut bytes = std::fs::read(&path).expect("read meta file");
    // lastCRCDigest lives at offset 48
    bytes[48] ^= 0xFF;
    std::fs::write(&path, bytes).expect("write meta file");
}

#[test]
#[serial]
fn test_recovers_from_last_confirmed_on_torn_tail() {
    let dir = TempDir::new().expect("temp dir");
    let (actual, last_confirmed) = seed_store(&dir, "torn");
    assert!(last_confirmed < actual);

    // a byte in the appended region flips; the primary CRC no longer holds
    patch_data(&dir, "torn", 4 + actual - 2, |b| *b ^= 0x55);

    let kv = reopen(&dir, "torn");
    assert_eq!(kv.count(), 1);
    assert_eq!(kv.get_i32("key_1", 0), 1);
    assert!(!kv.contains_key("key_10"));
    assert_eq!(kv.actual_size(), last_confirmed);

    // the meta file was rolled back to the confirmed point
    let meta = read_meta(&dir, "torn");
    assert_eq!(meta.actual_size, last_confirmed as u64);
}

#[test]
#[serial]
fn test_truncated_file_recovers_to_last_confirmed() {
    let dir = TempDir::new().expect("temp dir");
    let (_actual, last_confirmed) = seed_store(&dir, "trunc");

    // lose everything past three bytes into the second record, the way a
    // dropped page write would
    let path = dir.path().join("trunc");
    let file = std::fs::OpenOptions::new()
        .write(true)
        .open(&path)
        .expect("open data file");
    file.set_len((4 + last_confirmed + 3) as u64).expect("truncate");
    drop(file);

    let kv = reopen(&dir, "trunc");
    assert_eq!(kv.count(), 1);
    assert_eq!(kv.get_i32("key_1", 0), 1);
}

#[test]
#[serial]
fn test_greedy_recovery_replays_parseable_prefix() {
    let dir = TempDir::new().expect("temp dir");
    let (actual, _) = seed_store(&dir, "greedy");

    // record 10 is `varint(6) "key_10" varint(1) <i32>`; its value-length
    // byte is second from the end. Pointing it past the buffer makes the
    // record structurally torn.
    patch_data(&dir, "greedy", 4 + actual - 2, |b| *b = 60);
    // and the confirmed anchor is gone too
    break_last_confirmed(&dir, "greedy");

    Store::register_recover_handler(|_, _| RecoverStrategy::Recover);
    let kv = reopen(&dir, "greedy");
    Store::unregister_recover_handler();

    assert_eq!(kv.count(), 9);
    assert_eq!(kv.get_i32("key_9", 0), 9);
    assert!(!kv.contains_key("key_10"));

    // recovery compacted, so the store is fully healthy again
    let meta = read_meta(&dir, "greedy");
    assert_eq!(meta.last_actual_size, meta.actual_size);
    assert!(Store::is_file_valid(dir.path(), "greedy"));
}

#[test]
#[serial]
fn test_default_policy_discards_unrecoverable_state() {
    let dir = TempDir::new().expect("temp dir");
    let (actual, _) = seed_store(&dir, "discard");
    let seq_before = read_meta(&dir, "discard").sequence;

    // corrupt the live payload inside the confirmed prefix and the anchor,
    // leaving nothing to fall back to
    patch_data(&dir, "discard", 5, |b| *b ^= 0xFF);
    patch_data(&dir, "discard", 4 + actual - 2, |b| *b ^= 0xFF);
    break_last_confirmed(&dir, "discard");

    let kv = reopen(&dir, "discard");
    assert_eq!(kv.count(), 0);
    assert_eq!(kv.actual_size(), 0);
    assert!(read_meta(&dir, "discard").sequence > seq_before);

    // the namespace keeps working
    assert!(kv.set_i32("fresh", 1));
    assert_eq!(kv.get_i32("fresh", 0), 1);
}

#[test]
#[serial]
fn test_bytes_beyond_actual_size_are_invisible() {
    let dir = TempDir::new().expect("temp dir");
    let (actual, _) = seed_store(&dir, "slack");

    // a crash mid-append leaves partial record bytes past the committed
    // length, with the meta untouched
    let path = dir.path().join("slack");
    let mut data = std::fs::read(&path).expect("read data file");
    for byte in &mut data[4 + actual..4 + actual + 16] {
        *byte = 0xAB;
    }
    std::fs::write(&path, data).expect("write data file");

    let kv = reopen(&dir, "slack");
    assert_eq!(kv.count(), 10);
    assert_eq!(kv.get_i32("key_10", 0), 10);
}
