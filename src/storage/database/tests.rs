use super::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;
use tempfile::tempdir;

fn mem_db() -> Database {
    Database::in_memory(DatabaseOptions::default()).unwrap()
}

#[test]
fn fresh_database_has_only_header_chunk() {
    let db = mem_db();
    assert_eq!(db.chunk_count(), 1);
    assert_eq!(db.size(), CHUNK_SIZE as u64);
    assert!(DATA_AREA as usize + DATA_AREA_SIZE == CHUNK_SIZE);
}

#[test]
fn malloc_returns_zeroed_aligned_records() {
    let db = mem_db();
    let a = db.malloc(30).unwrap();
    let b = db.malloc(30).unwrap();
    assert_ne!(a, b);
    for rec in [a, b] {
        assert_eq!((rec.0 - BLOCK_HEADER_SIZE as u64) % BLOCK_SIZE_DELTA as u64, 0);
        assert!(db.block_size(rec).unwrap() >= 30);
        assert!(db.get_bytes(rec, 30).unwrap().iter().all(|&byte| byte == 0));
    }
    assert_eq!(db.stats().mallocs, 2);
}

#[test]
fn freed_blocks_are_reused() {
    let db = mem_db();
    let a = db.malloc(40).unwrap();
    db.put_int(a, 77).unwrap();
    db.free(a).unwrap();
    let b = db.malloc(40).unwrap();
    assert_eq!(a, b);
    assert_eq!(db.get_int(b).unwrap(), 0, "reallocated block is cleared");
    assert_eq!(db.chunk_count(), 2);
}

#[test]
fn double_free_is_rejected() {
    let db = mem_db();
    let a = db.malloc(8).unwrap();
    db.free(a).unwrap();
    assert!(matches!(db.free(a), Err(PdomError::Corruption(_))));
}

#[test]
fn malloc_bounds() {
    let db = mem_db();
    assert!(db.malloc(0).is_err());
    assert!(db.malloc(MAX_MALLOC_SIZE + 1).is_err());
    let big = db.malloc(MAX_MALLOC_SIZE).unwrap();
    assert_eq!(db.block_size(big).unwrap(), MAX_MALLOC_SIZE);
}

#[test]
fn primitive_accessors_roundtrip() {
    let db = mem_db();
    let rec = db.malloc(64).unwrap();
    db.put_byte(rec, 0xAB).unwrap();
    db.put_short(rec.add(1), -1234).unwrap();
    db.put_three_byte_uint(rec.add(3), 0x00AB_CDEF).unwrap();
    db.put_int(rec.add(6), i32::MIN).unwrap();
    db.put_long(rec.add(10), -42).unwrap();
    db.put_rec_ptr(rec.add(18), rec).unwrap();
    db.put_bytes(rec.add(22), b"abc").unwrap();

    assert_eq!(db.get_byte(rec).unwrap(), 0xAB);
    assert_eq!(db.get_short(rec.add(1)).unwrap(), -1234);
    assert_eq!(db.get_three_byte_uint(rec.add(3)).unwrap(), 0x00AB_CDEF);
    assert_eq!(db.get_int(rec.add(6)).unwrap(), i32::MIN);
    assert_eq!(db.get_long(rec.add(10)).unwrap(), -42);
    assert_eq!(db.get_rec_ptr(rec.add(18)).unwrap(), rec);
    assert_eq!(db.get_bytes(rec.add(22), 3).unwrap(), b"abc");
    assert!(db.put_three_byte_uint(rec, 1 << 24).is_err());
}

#[test]
fn pointer_compression_roundtrip() {
    assert_eq!(compress_ptr(RecPtr::NULL).unwrap(), 0);
    assert_eq!(decompress_ptr(0), RecPtr::NULL);
    let rec = RecPtr(CHUNK_SIZE as u64 * 3 + 8 * 5 + BLOCK_HEADER_SIZE as u64);
    assert_eq!(decompress_ptr(compress_ptr(rec).unwrap()), rec);
    assert!(compress_ptr(RecPtr(CHUNK_SIZE as u64 + 3)).is_err());
}

#[test]
fn exceeding_max_size_is_too_large() {
    let db = Database::in_memory(DatabaseOptions::default().max_size(3 * CHUNK_SIZE as u64))
        .unwrap();
    db.malloc(MAX_MALLOC_SIZE).unwrap();
    db.malloc(MAX_MALLOC_SIZE).unwrap();
    let err = db.malloc(MAX_MALLOC_SIZE).unwrap_err();
    assert!(err.is_too_large());
}

#[test]
fn random_workload_never_hands_out_overlapping_blocks() {
    let db = mem_db();
    let mut rng = ChaCha8Rng::seed_from_u64(0x5EED);
    let mut live: Vec<(RecPtr, usize)> = Vec::new();
    for _ in 0..2_000 {
        if !live.is_empty() && rng.gen_bool(0.4) {
            let idx = rng.gen_range(0..live.len());
            let (rec, _) = live.swap_remove(idx);
            db.free(rec).unwrap();
        } else {
            let size = rng.gen_range(1..600);
            let rec = db.malloc(size).unwrap();
            live.push((rec, size));
        }
    }
    let mut ranges: Vec<(u64, u64)> = live
        .iter()
        .map(|(rec, _)| (rec.0, rec.0 + db.block_size(*rec).unwrap() as u64))
        .collect();
    ranges.sort();
    for pair in ranges.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "blocks overlap: {pair:?}");
    }
    let unique: HashSet<_> = live.iter().map(|(rec, _)| *rec).collect();
    assert_eq!(unique.len(), live.len());
}

#[test]
fn persisted_database_reopens_with_same_contents() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.pdom");
    let rec;
    {
        let db = Database::create(&path, DatabaseOptions::default()).unwrap();
        rec = db.malloc(16).unwrap();
        db.put_long(rec, 0x1122_3344_5566_7788).unwrap();
        db.put_rec_ptr(Database::root_area(0), rec).unwrap();
        db.flush().unwrap();
    }
    let db = Database::open(&path, DatabaseOptions::default()).unwrap();
    assert_eq!(db.get_rec_ptr(Database::root_area(0)).unwrap(), rec);
    assert_eq!(db.get_long(rec).unwrap(), 0x1122_3344_5566_7788);
    let next = db.malloc(16).unwrap();
    assert_ne!(next, rec, "free lists survive reopen");
}

#[test]
fn corrupted_header_is_detected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.pdom");
    {
        let db = Database::create(&path, DatabaseOptions::default()).unwrap();
        db.malloc(16).unwrap();
        db.flush().unwrap();
    }
    {
        let io = StdFileIo::open(&path).unwrap();
        io.write_at(DATA_AREA + 10, &[0xFF]).unwrap();
    }
    let err = Database::open(&path, DatabaseOptions::default())
        .err()
        .expect("checksum mismatch");
    assert!(matches!(err, PdomError::Corruption(_)));
    assert!(Database::open(
        &path,
        DatabaseOptions::default().verify_header_checksum(false)
    )
    .is_ok());
}
