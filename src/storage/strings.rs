#![forbid(unsafe_code)]
//! Length-prefixed strings stored in the heap.
//!
//! A string whose bytes fit next to its length in one block is stored inline. Longer
//! strings chain additional blocks: the first block holds the length, a pointer to the
//! next block and as many bytes as fit; every following block holds a next pointer and
//! more bytes.

use std::cmp::Ordering;

use crate::storage::database::{Database, INT_SIZE, MAX_MALLOC_SIZE, PTR_SIZE};
use crate::types::{PdomError, RecPtr, Result};

const LENGTH: u64 = 0;
const SHORT_CHARS: u64 = INT_SIZE as u64;
const LONG_NEXT: u64 = INT_SIZE as u64;
const LONG_CHARS: u64 = (INT_SIZE + PTR_SIZE) as u64;
const CONT_NEXT: u64 = 0;
const CONT_CHARS: u64 = PTR_SIZE as u64;

const MAX_SHORT_LEN: usize = MAX_MALLOC_SIZE - INT_SIZE;
const LONG_FIRST_LEN: usize = MAX_MALLOC_SIZE - INT_SIZE - PTR_SIZE;
const LONG_CONT_LEN: usize = MAX_MALLOC_SIZE - PTR_SIZE;

/// Handle to a string record.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DbString {
    record: RecPtr,
}

impl DbString {
    /// Stores `value` and returns its handle.
    pub fn create(db: &Database, value: &str) -> Result<Self> {
        let bytes = value.as_bytes();
        let len =
            i32::try_from(bytes.len()).map_err(|_| PdomError::Invalid("string too long"))?;
        if bytes.len() <= MAX_SHORT_LEN {
            let record = db.malloc(INT_SIZE + bytes.len().max(1))?;
            db.put_int(record.add(LENGTH), len)?;
            db.put_bytes(record.add(SHORT_CHARS), bytes)?;
            return Ok(Self { record });
        }
        let record = db.malloc(MAX_MALLOC_SIZE)?;
        db.put_int(record.add(LENGTH), len)?;
        db.put_bytes(record.add(LONG_CHARS), &bytes[..LONG_FIRST_LEN])?;
        let mut link = record.add(LONG_NEXT);
        let mut rest = &bytes[LONG_FIRST_LEN..];
        while !rest.is_empty() {
            let take = rest.len().min(LONG_CONT_LEN);
            let block = db.malloc(PTR_SIZE + take)?;
            db.put_rec_ptr(link, block)?;
            db.put_bytes(block.add(CONT_CHARS), &rest[..take])?;
            link = block.add(CONT_NEXT);
            rest = &rest[take..];
        }
        Ok(Self { record })
    }

    /// Wraps an existing string record.
    pub fn at(record: RecPtr) -> Self {
        Self { record }
    }

    /// Address of the string record.
    pub fn record(&self) -> RecPtr {
        self.record
    }

    /// Length of the string in bytes.
    pub fn len(&self, db: &Database) -> Result<usize> {
        let len = db.get_int(self.record.add(LENGTH))?;
        usize::try_from(len)
            .map_err(|_| PdomError::corruption(format!("negative string length at {}", self.record)))
    }

    /// Returns true for the empty string.
    pub fn is_empty(&self, db: &Database) -> Result<bool> {
        Ok(self.len(db)? == 0)
    }

    /// Reads the raw bytes of the string.
    pub fn bytes(&self, db: &Database) -> Result<Vec<u8>> {
        let len = self.len(db)?;
        if len <= MAX_SHORT_LEN {
            return db.get_bytes(self.record.add(SHORT_CHARS), len);
        }
        let mut out = Vec::with_capacity(len);
        out.extend_from_slice(&db.get_bytes(self.record.add(LONG_CHARS), LONG_FIRST_LEN)?);
        let mut next = db.get_rec_ptr(self.record.add(LONG_NEXT))?;
        while out.len() < len {
            if next.is_null() {
                return Err(PdomError::corruption(format!(
                    "string chain at {} ends early",
                    self.record
                )));
            }
            let take = (len - out.len()).min(LONG_CONT_LEN);
            out.extend_from_slice(&db.get_bytes(next.add(CONT_CHARS), take)?);
            next = db.get_rec_ptr(next.add(CONT_NEXT))?;
        }
        Ok(out)
    }

    /// Reads the string.
    pub fn read(&self, db: &Database) -> Result<String> {
        String::from_utf8(self.bytes(db)?)
            .map_err(|_| PdomError::corruption(format!("string at {} is not UTF-8", self.record)))
    }

    /// Frees every block of the string.
    pub fn delete(self, db: &Database) -> Result<()> {
        let len = self.len(db)?;
        if len > MAX_SHORT_LEN {
            let mut next = db.get_rec_ptr(self.record.add(LONG_NEXT))?;
            while let Some(block) = next.non_null() {
                next = db.get_rec_ptr(block.add(CONT_NEXT))?;
                db.free(block)?;
            }
        }
        db.free(self.record)
    }

    /// Compares the stored string with `other`.
    pub fn compare(&self, db: &Database, other: &[u8], case_sensitive: bool) -> Result<Ordering> {
        let bytes = self.bytes(db)?;
        Ok(if case_sensitive {
            bytes.as_slice().cmp(other)
        } else {
            compare_ignore_case(&bytes, other)
        })
    }

    /// Compares in the order used by name indexes, see [`compare_compatible_with_ignore_case`].
    pub fn compare_compatible_with_ignore_case(
        &self,
        db: &Database,
        other: &[u8],
    ) -> Result<Ordering> {
        Ok(compare_compatible_with_ignore_case(&self.bytes(db)?, other))
    }

    /// Returns true if the stored string equals `other` exactly.
    pub fn equals(&self, db: &Database, other: &str) -> Result<bool> {
        if self.len(db)? != other.len() {
            return Ok(false);
        }
        Ok(self.bytes(db)? == other.as_bytes())
    }
}

/// Orders ASCII letters without regard to case.
pub fn compare_ignore_case(a: &[u8], b: &[u8]) -> Ordering {
    let lhs = a.iter().map(u8::to_ascii_lowercase);
    let rhs = b.iter().map(u8::to_ascii_lowercase);
    lhs.cmp(rhs)
}

/// Case-insensitive order refined by a case-sensitive tie-break.
///
/// Names that differ only in case are adjacent, so a case-insensitive search is a
/// contiguous range while an exact search still finds exactly one position.
pub fn compare_compatible_with_ignore_case(a: &[u8], b: &[u8]) -> Ordering {
    compare_ignore_case(a, b).then_with(|| a.cmp(b))
}

/// Compares the first `prefix.len()` bytes of `name` with `prefix`, ignoring case.
///
/// Returns `Equal` for every name starting with `prefix` in any case, which makes the
/// prefix range a contiguous run in an index ordered by
/// [`compare_compatible_with_ignore_case`]. Case-sensitive prefix searches descend with
/// this order and filter with [`starts_with`].
pub fn compare_prefix(name: &[u8], prefix: &[u8]) -> Ordering {
    let head = &name[..name.len().min(prefix.len())];
    match compare_ignore_case(head, prefix) {
        Ordering::Equal if head.len() < prefix.len() => Ordering::Less,
        ordering => ordering,
    }
}

/// Returns true if `name` starts with `prefix`.
pub fn starts_with(name: &[u8], prefix: &[u8], case_sensitive: bool) -> bool {
    name.len() >= prefix.len() && {
        let head = &name[..prefix.len()];
        if case_sensitive {
            head == prefix
        } else {
            head.eq_ignore_ascii_case(prefix)
        }
    }
}
