//! Tests for the mmap file primitives

use tempfile::TempDir;

use super::{page_size, round_to_page, MetaFile, MmapedFile};

fn temp_path(dir: &TempDir, name: &str) -> std::path::PathBuf {
    dir.path().join(name)
}

#[test]
fn test_round_to_page() {
    let page = page_size();
    assert_eq!(round_to_page(0), page);
    assert_eq!(round_to_page(1), page);
    assert_eq!(round_to_page(page), 2 * page);
    assert_eq!(round_to_page(page + 1), 2 * page);
}

#[test]
fn test_open_creates_one_page_file() {
    let dir = TempDir::new().expect("temp dir");
    let file = MmapedFile::open(&temp_path(&dir, "data")).expect("open");

    assert_eq!(file.len(), page_size());
    assert_eq!(file.disk_len().expect("stat") as usize, page_size());
    assert!(file.as_slice().iter().all(|&b| b == 0));
}

#[test]
fn test_writes_persist_across_reopen() {
    let dir = TempDir::new().expect("temp dir");
    let path = temp_path(&dir, "data");

    {
        let mut file = MmapedFile::open(&path).expect("open");
        file.as_mut_slice()[..5].copy_from_slice(b"hello");
        file.flush(true).expect("flush");
    }

    let file = MmapedFile::open(&path).expect("reopen");
    assert_eq!(&file.as_slice()[..5], b"hello");
}

#[test]
fn test_resize_grows_and_zero_fills() {
    let dir = TempDir::new().expect("temp dir");
    let mut file = MmapedFile::open(&temp_path(&dir, "data")).expect("open");
    let page = page_size();

    file.as_mut_slice()[..4].copy_from_slice(b"keep");
    file.resize(4 * page).expect("grow");

    assert_eq!(file.len(), 4 * page);
    assert_eq!(&file.as_slice()[..4], b"keep");
    assert!(file.as_slice()[page..].iter().all(|&b| b == 0));
}

#[test]
fn test_resize_shrinks() {
    let dir = TempDir::new().expect("temp dir");
    let mut file = MmapedFile::open(&temp_path(&dir, "data")).expect("open");
    let page = page_size();

    file.resize(8 * page).expect("grow");
    file.resize(2 * page).expect("shrink");

    assert_eq!(file.len(), 2 * page);
    assert_eq!(file.disk_len().expect("stat") as usize, 2 * page);
}

#[test]
fn test_open_rounds_odd_sized_file_up() {
    let dir = TempDir::new().expect("temp dir");
    let path = temp_path(&dir, "data");
    std::fs::write(&path, vec![0xAAu8; 100]).expect("seed file");

    let file = MmapedFile::open(&path).expect("open");
    assert_eq!(file.len(), page_size());
    // original bytes kept, extension zero-filled
    assert!(file.as_slice()[..100].iter().all(|&b| b == 0xAA));
    assert!(file.as_slice()[100..].iter().all(|&b| b == 0));
}

#[test]
fn test_meta_file_is_one_page() {
    let dir = TempDir::new().expect("temp dir");
    let meta = MetaFile::open(&temp_path(&dir, "data.crc")).expect("open");
    assert_eq!(meta.bytes().len(), page_size());
}
