//! Integration tests for the paged file buffer.
//!
//! These exercise page bookkeeping and the on-disk file together.

use pagestore::buffer::PagedFileBuffer;
use pagestore::storage::DiskManager;
use pagestore::{Error, StoreConfig};
use tempfile::tempdir;

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(7).wrapping_add(seed)).collect()
}

fn assert_chained(buffer: &PagedFileBuffer) {
    let pages = buffer.pages();
    for pair in pages.windows(2) {
        assert_eq!(pair[1].start_position(), pair[0].end_position() + 1);
        assert_eq!(pair[0].len(), buffer.page_size());
    }
    if let Some(last) = pages.last() {
        assert_eq!(last.end_position() + 1, buffer.len());
    }
}

/// Data written through a tiny cache survives eviction and reopen.
#[test]
fn test_contents_survive_eviction_and_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("buffer.db");
    let data = pattern(1000, 3);

    {
        let disk = DiskManager::create(&path).unwrap();
        let mut buffer = PagedFileBuffer::new(disk, 64, 2).unwrap();
        buffer.add_range(&data).unwrap();
        assert!(buffer.resident_page_count() <= 2);
        assert!(buffer.stats().snapshot().evictions > 0);
        buffer.flush().unwrap();
    }

    let disk = DiskManager::open(&path, false).unwrap();
    let mut buffer = PagedFileBuffer::new(disk, 64, 2).unwrap();
    assert_eq!(buffer.len(), 1000);
    assert_eq!(buffer.page_count(), 16);
    assert_eq!(buffer.read_span(0, 1000).unwrap(), data);
}

/// After a flush the file holds exactly the logical bytes.
#[test]
fn test_file_length_tracks_last_page() {
    let dir = tempdir().unwrap();
    let config = StoreConfig::builder().page_size(128).max_memory(256).build().unwrap();
    let mut buffer = PagedFileBuffer::open(dir.path().join("len.db"), &config).unwrap();

    buffer.add_range(&pattern(500, 1)).unwrap();
    buffer.flush().unwrap();
    assert_chained(&buffer);
    assert_eq!(buffer.file_len(), 500);

    buffer.remove_range(100, 250).unwrap();
    buffer.flush().unwrap();
    assert_chained(&buffer);
    assert_eq!(buffer.file_len(), 250);
    assert_eq!(buffer.file_len(), buffer.pages().last().unwrap().end_position() + 1);

    buffer.truncate(0).unwrap();
    buffer.flush().unwrap();
    assert_eq!(buffer.page_count(), 0);
    assert_eq!(buffer.file_len(), 0);
}

/// Inserting in the middle shifts the tail across page boundaries.
#[test]
fn test_insert_shifts_across_pages() {
    let dir = tempdir().unwrap();
    let disk = DiskManager::create(dir.path().join("shift.db")).unwrap();
    let mut buffer = PagedFileBuffer::new(disk, 32, 3).unwrap();

    let head = pattern(100, 0);
    let middle = pattern(45, 99);
    buffer.add_range(&head).unwrap();
    buffer.insert_range(50, &middle).unwrap();
    assert_chained(&buffer);

    let mut expected = head[..50].to_vec();
    expected.extend_from_slice(&middle);
    expected.extend_from_slice(&head[50..]);
    assert_eq!(buffer.read_span(0, expected.len()).unwrap(), expected);
}

/// Expanding zero-fills and reads past the end are rejected.
#[test]
fn test_expand_and_bounds() {
    let dir = tempdir().unwrap();
    let disk = DiskManager::create(dir.path().join("expand.db")).unwrap();
    let mut buffer = PagedFileBuffer::new(disk, 16, 4).unwrap();

    buffer.add_range(b"abc").unwrap();
    buffer.expand_to(40).unwrap();
    buffer.expand_by(2).unwrap();
    assert_eq!(buffer.len(), 42);
    assert_chained(&buffer);
    assert_eq!(buffer.read_span(3, 39).unwrap(), vec![0u8; 39]);

    assert!(matches!(
        buffer.read_span(40, 3),
        Err(Error::IndexOutOfRange { .. })
    ));
}
