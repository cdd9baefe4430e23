use crate::types::{PdomError, Result};

use super::CHUNK_SIZE;

/// One fixed-size region of the heap, loaded in memory.
pub(crate) struct Chunk {
    pub(crate) data: Box<[u8]>,
    pub(crate) dirty: bool,
}

impl Chunk {
    pub(crate) fn zeroed() -> Self {
        Self {
            data: vec![0u8; CHUNK_SIZE].into_boxed_slice(),
            dirty: true,
        }
    }

    pub(crate) fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() != CHUNK_SIZE {
            return Err(PdomError::corruption(format!(
                "chunk has {} bytes, expected {CHUNK_SIZE}",
                bytes.len()
            )));
        }
        Ok(Self {
            data: bytes.into_boxed_slice(),
            dirty: false,
        })
    }
}

/// All chunks of a database, indexed by `address / CHUNK_SIZE`.
#[derive(Default)]
pub(crate) struct ChunkTable {
    pub(crate) chunks: Vec<Chunk>,
}

impl ChunkTable {
    fn locate(&self, address: u64, len: usize) -> Result<(usize, usize)> {
        let index = (address / CHUNK_SIZE as u64) as usize;
        let offset = (address % CHUNK_SIZE as u64) as usize;
        if index >= self.chunks.len() || offset + len > CHUNK_SIZE {
            return Err(PdomError::corruption(format!(
                "access of {len} bytes at {address:#x} outside database of {} chunks",
                self.chunks.len()
            )));
        }
        Ok((index, offset))
    }

    pub(crate) fn read(&self, address: u64, dst: &mut [u8]) -> Result<()> {
        let mut done = 0usize;
        while done < dst.len() {
            let at = address + done as u64;
            let room = CHUNK_SIZE - (at % CHUNK_SIZE as u64) as usize;
            let n = room.min(dst.len() - done);
            let (index, offset) = self.locate(at, n)?;
            dst[done..done + n].copy_from_slice(&self.chunks[index].data[offset..offset + n]);
            done += n;
        }
        Ok(())
    }

    pub(crate) fn write(&mut self, address: u64, src: &[u8]) -> Result<()> {
        let mut done = 0usize;
        while done < src.len() {
            let at = address + done as u64;
            let room = CHUNK_SIZE - (at % CHUNK_SIZE as u64) as usize;
            let n = room.min(src.len() - done);
            let (index, offset) = self.locate(at, n)?;
            let chunk = &mut self.chunks[index];
            chunk.data[offset..offset + n].copy_from_slice(&src[done..done + n]);
            chunk.dirty = true;
            done += n;
        }
        Ok(())
    }

    pub(crate) fn fill(&mut self, address: u64, len: usize, byte: u8) -> Result<()> {
        let (index, offset) = self.locate(address, len)?;
        let chunk = &mut self.chunks[index];
        chunk.data[offset..offset + len].fill(byte);
        chunk.dirty = true;
        Ok(())
    }

    pub(crate) fn read_array<const N: usize>(&self, address: u64) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        self.read(address, &mut out)?;
        Ok(out)
    }

    pub(crate) fn size(&self) -> u64 {
        (self.chunks.len() * CHUNK_SIZE) as u64
    }
}
