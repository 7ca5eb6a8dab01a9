//! Bit-field toolkit shared by every scheme decoder.
//!
//! All reads are big-endian in bit order: bit 0 is the most significant bit of
//! byte 0. Reads past the end of a buffer yield zero bits instead of failing,
//! so decoders tolerate truncated dumps and rely on their own validity checks.
//! `BitCursor::try_read` is the strict variant for callers that need it.

use thiserror::Error;

/// Strict-mode read failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BitsError {
    #[error("bit read overrun: {wanted} bits at offset {offset}, buffer holds {available}")]
    Overrun {
        offset: usize,
        wanted: usize,
        available: usize,
    },
    #[error("field width {0} exceeds 32 bits")]
    TooWide(usize),
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Read `len` bits (at most 32) starting at `offset`.
pub fn get_bits(buf: &[u8], offset: usize, len: usize) -> u32 {
    let len = len.min(32);
    let mut val: u64 = 0;
    for i in 0..len {
        val = (val << 1) | bit_at(buf, offset + i) as u64;
    }
    val as u32
}

/// Write the low `len` bits of `value` at `offset`. Bits beyond the buffer are dropped.
pub fn set_bits(buf: &mut [u8], offset: usize, len: usize, value: u32) {
    let len = len.min(32);
    for i in 0..len {
        let pos = offset + i;
        let byte = pos / 8;
        if byte >= buf.len() {
            return;
        }
        let mask = 0x80u8 >> (pos % 8);
        if (value >> (len - 1 - i)) & 1 == 1 {
            buf[byte] |= mask;
        } else {
            buf[byte] &= !mask;
        }
    }
}

fn bit_at(buf: &[u8], pos: usize) -> u8 {
    match buf.get(pos / 8) {
        Some(b) => (b >> (7 - pos % 8)) & 1,
        None => 0,
    }
}

/// Big-endian integer from `len` bytes at `offset` (missing bytes read as zero).
pub fn byte_int(buf: &[u8], offset: usize, len: usize) -> u64 {
    (0..len.min(8)).fold(0u64, |acc, i| {
        (acc << 8) | buf.get(offset + i).copied().unwrap_or(0) as u64
    })
}

/// Little-endian integer from `len` bytes at `offset` (missing bytes read as zero).
pub fn byte_int_le(buf: &[u8], offset: usize, len: usize) -> u64 {
    (0..len.min(8)).rev().fold(0u64, |acc, i| {
        (acc << 8) | buf.get(offset + i).copied().unwrap_or(0) as u64
    })
}

/// Decode one packed BCD byte (`0x42` → 42). `None` if a nibble is above 9.
pub fn bcd_byte(b: u8) -> Option<u32> {
    let (hi, lo) = (b >> 4, b & 0x0F);
    if hi > 9 || lo > 9 {
        return None;
    }
    Some(hi as u32 * 10 + lo as u32)
}

/// Decode a run of packed BCD bytes into one integer.
pub fn bcd_to_int(data: &[u8]) -> Option<u64> {
    data.iter()
        .try_fold(0u64, |acc, &b| Some(acc * 100 + bcd_byte(b)? as u64))
}

/// Ones'-complement-like sign convention: with `positive` clear the stored
/// magnitude is the bitwise complement of the value, so the result is
/// `-(magnitude XOR mask)` where `mask` is all ones over `width` bits.
pub fn sign_magnitude(positive: bool, magnitude: u32, width: usize) -> i64 {
    if positive {
        magnitude as i64
    } else {
        let mask = if width >= 32 {
            u32::MAX
        } else {
            (1u32 << width) - 1
        };
        -(((magnitude ^ mask) & mask) as i64)
    }
}

// ---------------------------------------------------------------------------
// BitCursor
// ---------------------------------------------------------------------------

/// Sequential reader over a record, used for presence-bitmask layouts where
/// field positions depend on which earlier fields were present.
#[derive(Debug, Clone)]
pub struct BitCursor<'a> {
    buf: &'a [u8],
    offset: usize,
    overrun: bool,
}

impl<'a> BitCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::at(buf, 0)
    }

    pub fn at(buf: &'a [u8], offset: usize) -> Self {
        BitCursor {
            buf,
            offset,
            overrun: false,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bits left before the end of the buffer.
    pub fn remaining(&self) -> usize {
        (self.buf.len() * 8).saturating_sub(self.offset)
    }

    /// True once any lenient read crossed the end of the buffer.
    pub fn overran(&self) -> bool {
        self.overrun
    }

    /// Lenient read: missing bits are zero and the overrun is remembered.
    pub fn read(&mut self, len: usize) -> u32 {
        if len > self.remaining() {
            self.overrun = true;
        }
        let val = get_bits(self.buf, self.offset, len);
        self.offset += len;
        val
    }

    pub fn read_bool(&mut self) -> bool {
        self.read(1) == 1
    }

    pub fn skip(&mut self, len: usize) {
        if len > self.remaining() {
            self.overrun = true;
        }
        self.offset += len;
    }

    /// Read a `len`-bit field only if bit `bit` (LSB = field 0) of `mask` is set.
    /// The cursor advances only past present fields.
    pub fn read_if(&mut self, mask: u32, bit: u32, len: usize) -> Option<u32> {
        if bit < 32 && mask & (1 << bit) != 0 {
            Some(self.read(len))
        } else {
            None
        }
    }

    /// Strict read: fails instead of padding with zeros.
    pub fn try_read(&mut self, len: usize) -> Result<u32, BitsError> {
        if len > 32 {
            return Err(BitsError::TooWide(len));
        }
        if len > self.remaining() {
            return Err(BitsError::Overrun {
                offset: self.offset,
                wanted: len,
                available: self.remaining(),
            });
        }
        Ok(self.read(len))
    }
}

/// Sequential writer, the mirror of `BitCursor`. Used to build records.
#[derive(Debug)]
pub struct BitWriter<'a> {
    buf: &'a mut [u8],
    offset: usize,
}

impl<'a> BitWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        BitWriter { buf, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn write(&mut self, len: usize, value: u32) -> &mut Self {
        set_bits(self.buf, self.offset, len, value);
        self.offset += len;
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
