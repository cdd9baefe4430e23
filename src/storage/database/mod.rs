#![forbid(unsafe_code)]
//! Byte-addressable heap backing the index.
//!
//! The heap is a sequence of [`CHUNK_SIZE`] chunks. Chunk 0 is the header: magic, format
//! version, checksum, chunk count, the free-list heads of the block allocator and a small
//! root area ([`DATA_AREA`]) owned by the layer above. Every other chunk is carved into
//! blocks whose size is a multiple of [`BLOCK_SIZE_DELTA`]; a block starts with an `i16`
//! size that is positive while the block is free and negative while it is allocated.
//! Records are addressed by the byte following that size, and stored record pointers are
//! compressed to [`PTR_SIZE`] bytes by dropping the alignment bits.
//!
//! Allocations never move. A block never spans two chunks, so a single allocation is
//! capped at [`MAX_MALLOC_SIZE`]; larger payloads are chunked by the caller.

mod chunk;

#[cfg(test)]
mod tests;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, trace};

use crate::primitives::io::{FileIo, StdFileIo};
use crate::storage::options::DatabaseOptions;
use crate::types::{header_crc32, PdomError, RecPtr, Result};
use chunk::{Chunk, ChunkTable};

/// Size of one heap chunk in bytes.
pub const CHUNK_SIZE: usize = 4096;
/// Bytes in front of every block holding its signed size.
pub const BLOCK_HEADER_SIZE: usize = 2;
/// log2 of the allocation granularity.
pub const BLOCK_SIZE_DELTA_BITS: u32 = 3;
/// Allocation granularity in bytes.
pub const BLOCK_SIZE_DELTA: usize = 1 << BLOCK_SIZE_DELTA_BITS;
/// Smallest block, in deltas; a free block must hold its size and two list links.
pub const MIN_BLOCK_DELTAS: usize = 2;
/// Largest block, in deltas: one whole chunk.
pub const MAX_BLOCK_DELTAS: usize = CHUNK_SIZE / BLOCK_SIZE_DELTA;
/// Largest payload a single `malloc` can return.
pub const MAX_MALLOC_SIZE: usize = MAX_BLOCK_DELTAS * BLOCK_SIZE_DELTA - BLOCK_HEADER_SIZE;
/// Size of a stored record pointer.
pub const PTR_SIZE: usize = 4;
/// Size of a stored short.
pub const SHORT_SIZE: usize = 2;
/// Size of a stored three-byte unsigned int.
pub const THREE_BYTE_SIZE: usize = 3;
/// Size of a stored int.
pub const INT_SIZE: usize = 4;
/// Size of a stored long.
pub const LONG_SIZE: usize = 8;
/// Largest database a compressed pointer can address.
pub const MAX_ADDRESSABLE: u64 = (u32::MAX as u64 + 1) << BLOCK_SIZE_DELTA_BITS;
/// Version of the on-disk layout.
pub const FORMAT_VERSION: u32 = 1;

const MAGIC: [u8; 4] = *b"PDOM";

mod header {
    //! Byte offsets of fixed header fields in chunk 0.
    pub const MAGIC: u64 = 0;
    pub const VERSION: u64 = 4;
    pub const CRC32: u64 = 8;
    pub const CHUNK_COUNT: u64 = 12;
    pub const FREE_LISTS: u64 = 16;
}

/// First byte of the root area available to the layer above.
pub const DATA_AREA: u64 =
    (header::FREE_LISTS + ((MAX_BLOCK_DELTAS + 1) * PTR_SIZE) as u64 + 7) & !7;
/// Number of bytes in the root area.
pub const DATA_AREA_SIZE: usize = CHUNK_SIZE - DATA_AREA as usize;

const FREE_PREV: u64 = BLOCK_HEADER_SIZE as u64;
const FREE_NEXT: u64 = FREE_PREV + PTR_SIZE as u64;

/// Snapshot of allocator counters.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct DatabaseStatsSnapshot {
    /// Number of `malloc` calls served.
    pub mallocs: u64,
    /// Number of `free` calls served.
    pub frees: u64,
    /// Number of chunks appended to the heap.
    pub chunks_added: u64,
    /// Bytes currently held by allocated blocks, headers included.
    pub bytes_in_use: u64,
}

#[derive(Default)]
struct DatabaseStats {
    mallocs: AtomicU64,
    frees: AtomicU64,
    chunks_added: AtomicU64,
    bytes_in_use: AtomicU64,
}

impl DatabaseStats {
    fn snapshot(&self) -> DatabaseStatsSnapshot {
        DatabaseStatsSnapshot {
            mallocs: self.mallocs.load(Ordering::Relaxed),
            frees: self.frees.load(Ordering::Relaxed),
            chunks_added: self.chunks_added.load(Ordering::Relaxed),
            bytes_in_use: self.bytes_in_use.load(Ordering::Relaxed),
        }
    }
}

/// The heap database.
pub struct Database {
    table: RwLock<ChunkTable>,
    io: Option<Arc<dyn FileIo>>,
    options: DatabaseOptions,
    stats: DatabaseStats,
}

impl Database {
    /// Creates a database that lives only in memory.
    pub fn in_memory(options: DatabaseOptions) -> Result<Self> {
        let db = Self::with_io(None, options);
        db.init_header()?;
        Ok(db)
    }

    /// Creates (truncating) a database file at `path`.
    pub fn create(path: impl AsRef<Path>, options: DatabaseOptions) -> Result<Self> {
        let io: Arc<dyn FileIo> = Arc::new(StdFileIo::create(path)?);
        let db = Self::with_io(Some(io), options);
        db.init_header()?;
        db.flush()?;
        Ok(db)
    }

    /// Opens an existing database file.
    pub fn open(path: impl AsRef<Path>, options: DatabaseOptions) -> Result<Self> {
        let io: Arc<dyn FileIo> = Arc::new(StdFileIo::open(path)?);
        let len = io.len()?;
        if len == 0 || len % CHUNK_SIZE as u64 != 0 {
            return Err(PdomError::corruption(format!(
                "database file length {len} is not a positive multiple of {CHUNK_SIZE}"
            )));
        }
        let mut table = ChunkTable::default();
        let count = len / CHUNK_SIZE as u64;
        for index in 0..count {
            let mut bytes = vec![0u8; CHUNK_SIZE];
            io.read_at(index * CHUNK_SIZE as u64, &mut bytes)?;
            table.chunks.push(Chunk::from_bytes(bytes)?);
        }
        validate_header(&table, options.verify_header_checksum)?;
        debug!(chunks = count, "db.open");
        let db = Self::with_io(Some(io), options);
        *db.table.write() = table;
        Ok(db)
    }

    /// Opens `path` if it exists, otherwise creates it.
    pub fn open_or_create(path: impl AsRef<Path>, options: DatabaseOptions) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::open(path, options)
        } else {
            Self::create(path, options)
        }
    }

    fn with_io(io: Option<Arc<dyn FileIo>>, options: DatabaseOptions) -> Self {
        Self {
            table: RwLock::new(ChunkTable::default()),
            io,
            options,
            stats: DatabaseStats::default(),
        }
    }

    fn init_header(&self) -> Result<()> {
        let mut table = self.table.write();
        table.chunks.clear();
        table.chunks.push(Chunk::zeroed());
        table.write(header::MAGIC, &MAGIC)?;
        table.write(header::VERSION, &FORMAT_VERSION.to_be_bytes())?;
        table.write(header::CHUNK_COUNT, &1u32.to_be_bytes())?;
        Ok(())
    }

    /// Writes all dirty chunks to the backing file. A no-op for in-memory databases.
    pub fn flush(&self) -> Result<()> {
        let Some(io) = self.io.as_ref() else {
            return Ok(());
        };
        let mut table = self.table.write();
        let count = table.chunks.len() as u32;
        table.write(header::CHUNK_COUNT, &count.to_be_bytes())?;
        table.write(header::CRC32, &0u32.to_be_bytes())?;
        let crc = header_crc32(FORMAT_VERSION, &table.chunks[0].data);
        table.write(header::CRC32, &crc.to_be_bytes())?;
        let mut written = 0usize;
        for (index, chunk) in table.chunks.iter_mut().enumerate() {
            if chunk.dirty {
                io.write_at((index * CHUNK_SIZE) as u64, &chunk.data)?;
                chunk.dirty = false;
                written += 1;
            }
        }
        if self.options.sync_on_flush {
            io.sync_all()?;
        }
        debug!(chunks = written, total = count, "db.flush");
        Ok(())
    }

    /// Returns true when the database is backed by a file.
    pub fn is_persistent(&self) -> bool {
        self.io.is_some()
    }

    /// Current size of the heap in bytes.
    pub fn size(&self) -> u64 {
        self.table.read().size()
    }

    /// Number of chunks in the heap.
    pub fn chunk_count(&self) -> usize {
        self.table.read().chunks.len()
    }

    /// Options the database was opened with.
    pub fn options(&self) -> &DatabaseOptions {
        &self.options
    }

    /// Snapshot of allocator counters since the database was opened.
    pub fn stats(&self) -> DatabaseStatsSnapshot {
        self.stats.snapshot()
    }

    /// Allocates a zeroed block with room for `size` bytes.
    pub fn malloc(&self, size: usize) -> Result<RecPtr> {
        if size == 0 || size > MAX_MALLOC_SIZE {
            return Err(PdomError::Invalid("malloc size outside 1..=MAX_MALLOC_SIZE"));
        }
        let needed = ((size + BLOCK_HEADER_SIZE + BLOCK_SIZE_DELTA - 1) >> BLOCK_SIZE_DELTA_BITS)
            .max(MIN_BLOCK_DELTAS);
        let mut table = self.table.write();
        let mut found = None;
        for deltas in needed..=MAX_BLOCK_DELTAS {
            let block = first_free_block(&table, deltas)?;
            if block != 0 {
                found = Some((block, deltas));
                break;
            }
        }
        let (block, mut deltas) = match found {
            Some((block, deltas)) => {
                remove_free_block(&mut table, block, deltas)?;
                (block, deltas)
            }
            None => (self.grow(&mut table)?, MAX_BLOCK_DELTAS),
        };
        if deltas - needed >= MIN_BLOCK_DELTAS {
            let rest = block + (needed * BLOCK_SIZE_DELTA) as u64;
            add_free_block(&mut table, rest, deltas - needed)?;
            deltas = needed;
        }
        let bytes = deltas * BLOCK_SIZE_DELTA;
        table.write(block, &(-(bytes as i32) as i16).to_be_bytes())?;
        table.fill(block + BLOCK_HEADER_SIZE as u64, bytes - BLOCK_HEADER_SIZE, 0)?;
        self.stats.mallocs.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes_in_use
            .fetch_add(bytes as u64, Ordering::Relaxed);
        Ok(RecPtr(block + BLOCK_HEADER_SIZE as u64))
    }

    /// Returns a block obtained from [`Database::malloc`] to the allocator.
    pub fn free(&self, record: RecPtr) -> Result<()> {
        if record.is_null() {
            return Err(PdomError::Invalid("free of null record"));
        }
        let block = record.0 - BLOCK_HEADER_SIZE as u64;
        let mut table = self.table.write();
        let size = i16::from_be_bytes(table.read_array::<2>(block)?);
        if size >= 0 {
            return Err(PdomError::corruption(format!(
                "free of block {record} that is not allocated"
            )));
        }
        let bytes = -(size as i32) as usize;
        if bytes % BLOCK_SIZE_DELTA != 0 || bytes > CHUNK_SIZE {
            return Err(PdomError::corruption(format!(
                "block {record} has invalid size {bytes}"
            )));
        }
        add_free_block(&mut table, block, bytes / BLOCK_SIZE_DELTA)?;
        self.stats.frees.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes_in_use
            .fetch_sub(bytes as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Usable bytes of an allocated block.
    pub fn block_size(&self, record: RecPtr) -> Result<usize> {
        let block = record.0 - BLOCK_HEADER_SIZE as u64;
        let size = i16::from_be_bytes(self.table.read().read_array::<2>(block)?);
        if size >= 0 {
            return Err(PdomError::corruption(format!(
                "record {record} is not an allocated block"
            )));
        }
        Ok(-(size as i32) as usize - BLOCK_HEADER_SIZE)
    }

    fn grow(&self, table: &mut ChunkTable) -> Result<u64> {
        let new_size = table.size() + CHUNK_SIZE as u64;
        let limit = self.options.max_size.min(MAX_ADDRESSABLE);
        if new_size > limit {
            error!(requested = new_size, limit, "db.malloc.too_large");
            return Err(PdomError::TooLarge {
                requested: new_size,
                limit,
            });
        }
        let start = table.size();
        table.chunks.push(Chunk::zeroed());
        self.stats.chunks_added.fetch_add(1, Ordering::Relaxed);
        trace!(chunk = table.chunks.len() - 1, "db.malloc.grow");
        Ok(start)
    }

    /// Reads one byte.
    pub fn get_byte(&self, at: RecPtr) -> Result<u8> {
        Ok(self.table.read().read_array::<1>(at.0)?[0])
    }

    /// Writes one byte.
    pub fn put_byte(&self, at: RecPtr, value: u8) -> Result<()> {
        self.table.write().write(at.0, &[value])
    }

    /// Reads a 16-bit signed value.
    pub fn get_short(&self, at: RecPtr) -> Result<i16> {
        Ok(i16::from_be_bytes(self.table.read().read_array(at.0)?))
    }

    /// Writes a 16-bit signed value.
    pub fn put_short(&self, at: RecPtr, value: i16) -> Result<()> {
        self.table.write().write(at.0, &value.to_be_bytes())
    }

    /// Reads a 24-bit unsigned value.
    pub fn get_three_byte_uint(&self, at: RecPtr) -> Result<u32> {
        let [a, b, c] = self.table.read().read_array::<3>(at.0)?;
        Ok(u32::from_be_bytes([0, a, b, c]))
    }

    /// Writes a 24-bit unsigned value.
    pub fn put_three_byte_uint(&self, at: RecPtr, value: u32) -> Result<()> {
        if value >= 1 << 24 {
            return Err(PdomError::Invalid("value does not fit in three bytes"));
        }
        let [_, a, b, c] = value.to_be_bytes();
        self.table.write().write(at.0, &[a, b, c])
    }

    /// Reads a 32-bit signed value.
    pub fn get_int(&self, at: RecPtr) -> Result<i32> {
        Ok(i32::from_be_bytes(self.table.read().read_array(at.0)?))
    }

    /// Writes a 32-bit signed value.
    pub fn put_int(&self, at: RecPtr, value: i32) -> Result<()> {
        self.table.write().write(at.0, &value.to_be_bytes())
    }

    /// Reads a 64-bit signed value.
    pub fn get_long(&self, at: RecPtr) -> Result<i64> {
        Ok(i64::from_be_bytes(self.table.read().read_array(at.0)?))
    }

    /// Writes a 64-bit signed value.
    pub fn put_long(&self, at: RecPtr, value: i64) -> Result<()> {
        self.table.write().write(at.0, &value.to_be_bytes())
    }

    /// Reads a compressed record pointer.
    pub fn get_rec_ptr(&self, at: RecPtr) -> Result<RecPtr> {
        let raw = u32::from_be_bytes(self.table.read().read_array(at.0)?);
        Ok(decompress_ptr(raw))
    }

    /// Writes a record pointer in compressed form.
    pub fn put_rec_ptr(&self, at: RecPtr, value: RecPtr) -> Result<()> {
        let raw = compress_ptr(value)?;
        self.table.write().write(at.0, &raw.to_be_bytes())
    }

    /// Copies `dst.len()` bytes starting at `at`.
    pub fn read_bytes(&self, at: RecPtr, dst: &mut [u8]) -> Result<()> {
        self.table.read().read(at.0, dst)
    }

    /// Returns `len` bytes starting at `at`.
    pub fn get_bytes(&self, at: RecPtr, len: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; len];
        self.read_bytes(at, &mut out)?;
        Ok(out)
    }

    /// Writes `src` starting at `at`.
    pub fn put_bytes(&self, at: RecPtr, src: &[u8]) -> Result<()> {
        self.table.write().write(at.0, src)
    }

    /// Zeroes `len` bytes starting at `at`.
    pub fn clear_bytes(&self, at: RecPtr, len: usize) -> Result<()> {
        self.table.write().fill(at.0, len, 0)
    }

    /// Address of the `offset`-th byte of the root area.
    pub fn root_area(offset: usize) -> RecPtr {
        debug_assert!(offset < DATA_AREA_SIZE, "root area offset out of range");
        RecPtr(DATA_AREA + offset as u64)
    }
}

/// Compresses a record pointer to its stored form.
pub fn compress_ptr(value: RecPtr) -> Result<u32> {
    if value.is_null() {
        return Ok(0);
    }
    let shifted = value
        .0
        .checked_sub(BLOCK_HEADER_SIZE as u64)
        .ok_or(PdomError::Invalid("record pointer below first block"))?;
    if shifted % BLOCK_SIZE_DELTA as u64 != 0 {
        return Err(PdomError::Invalid("record pointer not block aligned"));
    }
    u32::try_from(shifted >> BLOCK_SIZE_DELTA_BITS)
        .map_err(|_| PdomError::Invalid("record pointer beyond addressable range"))
}

/// Expands a stored record pointer.
pub fn decompress_ptr(raw: u32) -> RecPtr {
    if raw == 0 {
        RecPtr::NULL
    } else {
        RecPtr((u64::from(raw) << BLOCK_SIZE_DELTA_BITS) + BLOCK_HEADER_SIZE as u64)
    }
}

fn validate_header(table: &ChunkTable, verify_checksum: bool) -> Result<()> {
    let magic = table.read_array::<4>(header::MAGIC)?;
    if magic != MAGIC {
        return Err(PdomError::corruption("invalid database magic"));
    }
    let version = u32::from_be_bytes(table.read_array(header::VERSION)?);
    if version != FORMAT_VERSION {
        return Err(PdomError::corruption(format!(
            "unsupported database format version {version}"
        )));
    }
    let count = u32::from_be_bytes(table.read_array(header::CHUNK_COUNT)?) as usize;
    if count != table.chunks.len() {
        return Err(PdomError::corruption(format!(
            "header records {count} chunks, file holds {}",
            table.chunks.len()
        )));
    }
    if verify_checksum {
        let stored = u32::from_be_bytes(table.read_array(header::CRC32)?);
        let mut copy = table.chunks[0].data.to_vec();
        copy[header::CRC32 as usize..header::CRC32 as usize + 4].fill(0);
        if header_crc32(FORMAT_VERSION, &copy) != stored {
            return Err(PdomError::corruption("database header checksum mismatch"));
        }
    }
    Ok(())
}

fn free_list_slot(deltas: usize) -> u64 {
    header::FREE_LISTS + (deltas * PTR_SIZE) as u64
}

fn encode_block(block: u64) -> Result<u32> {
    if block == 0 {
        return Ok(0);
    }
    compress_ptr(RecPtr(block + BLOCK_HEADER_SIZE as u64))
}

fn decode_block(raw: u32) -> u64 {
    let ptr = decompress_ptr(raw);
    if ptr.is_null() {
        0
    } else {
        ptr.0 - BLOCK_HEADER_SIZE as u64
    }
}

fn read_link(table: &ChunkTable, at: u64) -> Result<u64> {
    Ok(decode_block(u32::from_be_bytes(table.read_array(at)?)))
}

fn write_link(table: &mut ChunkTable, at: u64, block: u64) -> Result<()> {
    table.write(at, &encode_block(block)?.to_be_bytes())
}

fn first_free_block(table: &ChunkTable, deltas: usize) -> Result<u64> {
    read_link(table, free_list_slot(deltas))
}

fn add_free_block(table: &mut ChunkTable, block: u64, deltas: usize) -> Result<()> {
    let bytes = (deltas * BLOCK_SIZE_DELTA) as i16;
    table.write(block, &bytes.to_be_bytes())?;
    let head = first_free_block(table, deltas)?;
    write_link(table, block + FREE_PREV, 0)?;
    write_link(table, block + FREE_NEXT, head)?;
    if head != 0 {
        write_link(table, head + FREE_PREV, block)?;
    }
    write_link(table, free_list_slot(deltas), block)
}

fn remove_free_block(table: &mut ChunkTable, block: u64, deltas: usize) -> Result<()> {
    let prev = read_link(table, block + FREE_PREV)?;
    let next = read_link(table, block + FREE_NEXT)?;
    if prev != 0 {
        write_link(table, prev + FREE_NEXT, next)?;
    } else {
        write_link(table, free_list_slot(deltas), next)?;
    }
    if next != 0 {
        write_link(table, next + FREE_PREV, prev)?;
    }
    Ok(())
}
