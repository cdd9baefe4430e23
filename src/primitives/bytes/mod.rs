#![forbid(unsafe_code)]
//! Varint and buffer utilities shared by the record codecs.

pub mod var {
    //! Base-128 varints: little-endian groups of 7 bits, continuation bit `0x80` on every
    //! byte except the last. Signed values are stored as their unsigned bit pattern.

    use crate::types::{PdomError, Result};

    /// Longest encoding of a `u32`.
    pub const MAX_U32_LEN: usize = 5;
    /// Longest encoding of a `u64`.
    pub const MAX_U64_LEN: usize = 10;

    /// Encodes a u64 as an unsigned varint.
    pub fn encode_u64(mut v: u64, out: &mut Vec<u8>) {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                out.push(byte);
                break;
            }
            out.push(byte | 0x80);
        }
    }

    /// Encodes a u32 as an unsigned varint.
    pub fn encode_u32(v: u32, out: &mut Vec<u8>) {
        encode_u64(u64::from(v), out);
    }

    /// Encodes an i32 through its unsigned bit pattern (negative values take five bytes).
    pub fn encode_i32(v: i32, out: &mut Vec<u8>) {
        encode_u32(v as u32, out);
    }

    /// Encodes an i64 through its unsigned bit pattern (negative values take ten bytes).
    pub fn encode_i64(v: i64, out: &mut Vec<u8>) {
        encode_u64(v as u64, out);
    }

    /// Number of bytes `encode_u64` produces for `v`: `ceil(bits / 7)`, minimum one.
    pub fn encoded_len(v: u64) -> usize {
        let bits = 64 - v.leading_zeros() as usize;
        bits.div_ceil(7).max(1)
    }

    /// Decodes a u64 varint from a slice, advancing the offset.
    pub fn decode_u64(src: &[u8], off: &mut usize) -> Result<u64> {
        let mut result = 0u64;
        let mut shift = 0u32;
        for i in 0..MAX_U64_LEN {
            let byte = *src
                .get(*off)
                .ok_or_else(|| PdomError::unmarshal(format!("varint truncated at byte {i}")))?;
            *off += 1;
            let payload = u64::from(byte & 0x7f);
            if i == MAX_U64_LEN - 1 && payload > 1 {
                return Err(PdomError::unmarshal("varint overflows 64 bits"));
            }
            result |= payload << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
        Err(PdomError::unmarshal("varint longer than 10 bytes"))
    }

    /// Decodes a u32 varint from a slice, advancing the offset.
    pub fn decode_u32(src: &[u8], off: &mut usize) -> Result<u32> {
        let value = decode_u64(src, off)?;
        u32::try_from(value).map_err(|_| PdomError::unmarshal("varint overflows 32 bits"))
    }

    /// Decodes an i32 stored through its unsigned bit pattern.
    pub fn decode_i32(src: &[u8], off: &mut usize) -> Result<i32> {
        Ok(decode_u32(src, off)? as i32)
    }

    /// Decodes an i64 stored through its unsigned bit pattern.
    pub fn decode_i64(src: &[u8], off: &mut usize) -> Result<i64> {
        Ok(decode_u64(src, off)? as i64)
    }
}

pub mod buf {
    //! A slice-backed cursor for decoding marshalled payloads.

    use core::fmt;

    use super::var;
    use crate::types::{PdomError, Result};

    /// A cursor for reading bytes from a slice with offset tracking.
    pub struct Cursor<'a> {
        /// The underlying byte slice.
        pub buf: &'a [u8],
        /// Current read offset.
        pub off: usize,
    }

    impl<'a> Cursor<'a> {
        /// Creates a new cursor starting at offset 0.
        pub fn new(buf: &'a [u8]) -> Self {
            Self { buf, off: 0 }
        }

        /// Takes the next `n` bytes, advancing the offset.
        pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
            let end = self
                .off
                .checked_add(n)
                .ok_or_else(|| PdomError::unmarshal("cursor offset overflow"))?;
            if end > self.buf.len() {
                return Err(PdomError::unmarshal(format!(
                    "cursor take beyond buffer: need {n}, remaining {}",
                    self.remaining()
                )));
            }
            let slice = &self.buf[self.off..end];
            self.off = end;
            Ok(slice)
        }

        /// Reads one byte.
        pub fn byte(&mut self) -> Result<u8> {
            Ok(self.take(1)?[0])
        }

        /// Reads a big-endian i16.
        pub fn short(&mut self) -> Result<i16> {
            let bytes = self.take(2)?;
            Ok(i16::from_be_bytes([bytes[0], bytes[1]]))
        }

        /// Reads an unsigned varint.
        pub fn var_u64(&mut self) -> Result<u64> {
            var::decode_u64(self.buf, &mut self.off)
        }

        /// Reads a varint-encoded i32.
        pub fn var_i32(&mut self) -> Result<i32> {
            var::decode_i32(self.buf, &mut self.off)
        }

        /// Reads a varint-encoded i64.
        pub fn var_i64(&mut self) -> Result<i64> {
            var::decode_i64(self.buf, &mut self.off)
        }

        /// Returns the number of bytes remaining in the buffer.
        pub fn remaining(&self) -> usize {
            self.buf.len().saturating_sub(self.off)
        }

        /// Returns true once every byte has been consumed.
        pub fn is_exhausted(&self) -> bool {
            self.remaining() == 0
        }
    }

    impl<'a> fmt::Debug for Cursor<'a> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("Cursor")
                .field("off", &self.off)
                .field("remaining", &self.remaining())
                .finish()
        }
    }
}
