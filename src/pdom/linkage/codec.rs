//! Fixed-size slots holding marshalled items, with chained storage for large payloads.
//!
//! A payload that fits its slot (and does not start with [`INDIRECT_TYPE`]) is stored
//! inline, zero padded. Anything else is written as `INDIRECT_TYPE` plus a pointer to a
//! chain of heap blocks holding `varint(len) ++ payload`. Every block but the last is
//! [`MAX_MALLOC_SIZE`] bytes and ends with the pointer to the next one, so block sizes
//! follow from the length alone.

use tracing::trace;

use super::types::{
    Evaluation, IndexType, IndexValue, MarshalBuffer, TemplateArgument, UnmarshalBuffer,
    INDIRECT_TYPE,
};
use crate::primitives::bytes::var;
use crate::storage::database::{Database, MAX_MALLOC_SIZE, PTR_SIZE};
use crate::types::{PdomError, RecPtr, Result};

/// Slot size of a stored type.
pub const TYPE_SIZE: usize = 2 + PTR_SIZE;
/// Slot size of a stored value.
pub const VALUE_SIZE: usize = 1 + PTR_SIZE;
/// Slot size of a stored evaluation.
pub const EVALUATION_SIZE: usize = 2 + PTR_SIZE;
/// Slot size of a stored template argument.
pub const ARGUMENT_SIZE: usize = 2 + PTR_SIZE;

const CHAIN_DATA: usize = MAX_MALLOC_SIZE - PTR_SIZE;

/// Sizes of the blocks of a chain holding `total` bytes (length prefix included).
fn chunk_sizes(total: usize) -> Vec<usize> {
    let mut sizes = Vec::new();
    let mut remaining = total;
    while remaining > MAX_MALLOC_SIZE {
        sizes.push(MAX_MALLOC_SIZE);
        remaining -= CHAIN_DATA;
    }
    sizes.push(remaining);
    sizes
}

fn is_inline(bytes: &[u8], slot_size: usize) -> bool {
    bytes.len() <= slot_size && bytes.first() != Some(&INDIRECT_TYPE)
}

/// Stores `bytes` into the slot. The previous content must have been deleted.
pub fn store_bytes(db: &Database, slot: RecPtr, slot_size: usize, bytes: &[u8]) -> Result<()> {
    debug_assert!(slot_size > PTR_SIZE);
    if is_inline(bytes, slot_size) {
        db.put_bytes(slot, bytes)?;
        return db.clear_bytes(slot.add(bytes.len() as u64), slot_size - bytes.len());
    }

    let mut payload = Vec::with_capacity(bytes.len() + var::MAX_U64_LEN);
    var::encode_u64(bytes.len() as u64, &mut payload);
    payload.extend_from_slice(bytes);

    let sizes = chunk_sizes(payload.len());
    let mut blocks = Vec::with_capacity(sizes.len());
    for size in &sizes {
        blocks.push(db.malloc(*size)?);
    }
    let mut offset = 0;
    for (i, (block, size)) in blocks.iter().zip(&sizes).enumerate() {
        match blocks.get(i + 1) {
            Some(next) => {
                db.put_bytes(*block, &payload[offset..offset + CHAIN_DATA])?;
                db.put_rec_ptr(block.add(CHAIN_DATA as u64), *next)?;
                offset += CHAIN_DATA;
            }
            None => {
                db.put_bytes(*block, &payload[offset..offset + size])?;
                offset += size;
            }
        }
    }
    trace!(len = bytes.len(), blocks = blocks.len(), "pdom.codec.store_indirect");
    db.clear_bytes(slot, slot_size)?;
    db.put_byte(slot, INDIRECT_TYPE)?;
    db.put_rec_ptr(slot.add(1), blocks[0])
}

fn read_length(db: &Database, first: RecPtr) -> Result<(u64, usize)> {
    let mut encoded = Vec::with_capacity(var::MAX_U64_LEN);
    loop {
        let byte = db.get_byte(first.add(encoded.len() as u64))?;
        encoded.push(byte);
        if byte & 0x80 == 0 {
            break;
        }
        if encoded.len() == var::MAX_U64_LEN {
            return Err(PdomError::unmarshal("indirect length is not a varint"));
        }
    }
    let mut off = 0;
    let len = var::decode_u64(&encoded, &mut off)?;
    Ok((len, off))
}

fn chain(db: &Database, first: RecPtr) -> Result<(Vec<(RecPtr, usize)>, usize)> {
    let (len, prefix) = read_length(db, first)?;
    let total = usize::try_from(len)
        .ok()
        .and_then(|len| len.checked_add(prefix))
        .ok_or_else(|| PdomError::unmarshal("indirect length overflow"))?;
    let sizes = chunk_sizes(total);
    let mut blocks = Vec::with_capacity(sizes.len());
    let mut block = first;
    for (i, size) in sizes.iter().enumerate() {
        if block.is_null() {
            return Err(PdomError::corruption("indirect chain ends early"));
        }
        blocks.push((block, *size));
        if i + 1 < sizes.len() {
            block = db.get_rec_ptr(block.add(CHAIN_DATA as u64))?;
        }
    }
    Ok((blocks, prefix))
}

/// Reads the payload stored in the slot. Inline payloads come back with their padding.
pub fn load_bytes(db: &Database, slot: RecPtr, slot_size: usize) -> Result<Vec<u8>> {
    let inline = db.get_bytes(slot, slot_size)?;
    if inline[0] != INDIRECT_TYPE {
        return Ok(inline);
    }
    let first = db.get_rec_ptr(slot.add(1))?;
    let (blocks, prefix) = chain(db, first)?;
    let last = blocks.len() - 1;
    let mut payload = Vec::new();
    for (i, (block, size)) in blocks.into_iter().enumerate() {
        let data = if i == last { size } else { CHAIN_DATA };
        payload.extend_from_slice(&db.get_bytes(block, data)?);
    }
    payload.drain(..prefix);
    Ok(payload)
}

/// Frees any chain the slot points to and zeroes the slot.
pub fn delete_bytes(db: &Database, slot: RecPtr, slot_size: usize) -> Result<()> {
    if db.get_byte(slot)? == INDIRECT_TYPE {
        let first = db.get_rec_ptr(slot.add(1))?;
        if !first.is_null() {
            let (blocks, _) = chain(db, first)?;
            for (block, _) in blocks {
                db.free(block)?;
            }
        }
    }
    db.clear_bytes(slot, slot_size)
}

fn replace(db: &Database, slot: RecPtr, slot_size: usize, bytes: &[u8]) -> Result<()> {
    delete_bytes(db, slot, slot_size)?;
    store_bytes(db, slot, slot_size, bytes)
}

/// Stores a type into a [`TYPE_SIZE`] slot, replacing what was there.
pub fn store_type(db: &Database, slot: RecPtr, ty: Option<&IndexType>) -> Result<()> {
    let mut buf = MarshalBuffer::new();
    buf.put_type(ty);
    replace(db, slot, TYPE_SIZE, buf.as_bytes())
}

/// Loads the type in a [`TYPE_SIZE`] slot.
pub fn load_type(db: &Database, slot: RecPtr) -> Result<Option<IndexType>> {
    let bytes = load_bytes(db, slot, TYPE_SIZE)?;
    UnmarshalBuffer::new(&bytes).get_type()
}

/// Stores a value into a [`VALUE_SIZE`] slot, replacing what was there.
pub fn store_value(db: &Database, slot: RecPtr, value: Option<&IndexValue>) -> Result<()> {
    let mut buf = MarshalBuffer::new();
    buf.put_value(value);
    replace(db, slot, VALUE_SIZE, buf.as_bytes())
}

/// Loads the value in a [`VALUE_SIZE`] slot.
pub fn load_value(db: &Database, slot: RecPtr) -> Result<Option<IndexValue>> {
    let bytes = load_bytes(db, slot, VALUE_SIZE)?;
    UnmarshalBuffer::new(&bytes).get_value()
}

/// Stores an evaluation into an [`EVALUATION_SIZE`] slot, replacing what was there.
pub fn store_evaluation(db: &Database, slot: RecPtr, evaluation: Option<&Evaluation>) -> Result<()> {
    let mut buf = MarshalBuffer::new();
    buf.put_evaluation(evaluation);
    replace(db, slot, EVALUATION_SIZE, buf.as_bytes())
}

/// Loads the evaluation in an [`EVALUATION_SIZE`] slot.
pub fn load_evaluation(db: &Database, slot: RecPtr) -> Result<Option<Evaluation>> {
    let bytes = load_bytes(db, slot, EVALUATION_SIZE)?;
    UnmarshalBuffer::new(&bytes).get_evaluation()
}

/// Stores a template argument into an [`ARGUMENT_SIZE`] slot, replacing what was there.
pub fn store_template_argument(
    db: &Database,
    slot: RecPtr,
    argument: &TemplateArgument,
) -> Result<()> {
    let mut buf = MarshalBuffer::new();
    buf.put_template_argument(argument);
    replace(db, slot, ARGUMENT_SIZE, buf.as_bytes())
}

/// Loads the template argument in an [`ARGUMENT_SIZE`] slot.
pub fn load_template_argument(db: &Database, slot: RecPtr) -> Result<TemplateArgument> {
    let bytes = load_bytes(db, slot, ARGUMENT_SIZE)?;
    UnmarshalBuffer::new(&bytes).get_template_argument()
}
