//! Rice coding (Golomb coding with a power-of-two divisor).
//!
//! A value `x >= 1` is written as `q = (x - 1) >> m` one-bits, a zero-bit,
//! then the low `m` bits of `x - 1`, most significant first. Small values
//! cost `m + 1` bits. Posting lists store ascending doc ids as a first id
//! plus Rice-coded gaps.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_PARAMETER: u32 = 16;
/// Parameter used for doc id gaps.
pub const DELTA_PARAMETER: u32 = 6;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("rice parameter must be between 0 and 16, got {0}")]
    BadParameter(u32),
    #[error("value >= 1 expected, got {0}")]
    ValueTooSmall(u32),
    #[error("ids must be strictly ascending")]
    NotAscending,
    #[error("cannot delta-encode an empty list")]
    Empty,
    #[error("rice code ends mid-value")]
    Truncated,
    #[error("decoded value does not fit in 32 bits")]
    Overflow,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitArray {
    bytes: Vec<u8>,
    nbits: usize,
}

impl BitArray {
    pub fn get(&self, i: usize) -> Option<bool> {
        if i >= self.nbits {
            return None;
        }
        // nbits comes from disk and may claim more bits than stored
        let byte = self.bytes.get(i / 8)?;
        Some(byte & (1 << (i % 8)) != 0)
    }

    pub fn push(&mut self, bit: bool) {
        if self.nbits % 8 == 0 {
            self.bytes.push(0);
        }
        if bit {
            let last = self.bytes.len() - 1;
            self.bytes[last] |= 1 << (self.nbits % 8);
        }
        self.nbits += 1;
    }

    pub fn len(&self) -> usize {
        self.nbits
    }

    pub fn is_empty(&self) -> bool {
        self.nbits == 0
    }

    /// Packed bits, low bit first; the last byte may carry padding zeros.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiceCode {
    m: u32,
    bits: BitArray,
    len: usize,
}

impl RiceCode {
    pub fn new(m: u32) -> Result<Self, CodecError> {
        if m > MAX_PARAMETER {
            return Err(CodecError::BadParameter(m));
        }
        Ok(Self { m, bits: BitArray::default(), len: 0 })
    }

    pub fn append(&mut self, val: u32) -> Result<(), CodecError> {
        if val < 1 {
            return Err(CodecError::ValueTooSmall(val));
        }
        let v = val - 1;
        for _ in 0..(v >> self.m) {
            self.bits.push(true);
        }
        self.bits.push(false);
        for i in (0..self.m).rev() {
            self.bits.push((v >> i) & 1 == 1);
        }
        self.len += 1;
        Ok(())
    }

    pub fn to_vec(&self) -> Result<Vec<u32>, CodecError> {
        let mut out = Vec::with_capacity(self.len.min(self.bits.len()));
        let mut i = 0;
        for _ in 0..self.len {
            let mut unary: u64 = 0;
            while self.bits.get(i).ok_or(CodecError::Truncated)? {
                unary += 1;
                i += 1;
            }
            i += 1;
            let mut binary: u64 = 0;
            for _ in 0..self.m {
                let bit = self.bits.get(i).ok_or(CodecError::Truncated)?;
                binary = (binary << 1) | bit as u64;
                i += 1;
            }
            let value = unary
                .checked_shl(self.m)
                .and_then(|q| q.checked_add(binary + 1))
                .and_then(|v| u32::try_from(v).ok())
                .ok_or(CodecError::Overflow)?;
            out.push(value);
        }
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn parameter(&self) -> u32 {
        self.m
    }

    pub fn bit_len(&self) -> usize {
        self.bits.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bits.as_bytes()
    }
}

pub fn encode(m: u32, values: &[u32]) -> Result<RiceCode, CodecError> {
    let mut code = RiceCode::new(m)?;
    for &v in values {
        code.append(v)?;
    }
    Ok(code)
}

/// Split a strictly ascending list into its first element and coded gaps.
pub fn encode_deltas(ids: &[u32]) -> Result<(u32, RiceCode), CodecError> {
    let (&first, _) = ids.split_first().ok_or(CodecError::Empty)?;
    let mut deltas = RiceCode::new(DELTA_PARAMETER)?;
    for pair in ids.windows(2) {
        if pair[1] <= pair[0] {
            return Err(CodecError::NotAscending);
        }
        deltas.append(pair[1] - pair[0])?;
    }
    Ok((first, deltas))
}

pub fn decode_deltas(first: u32, deltas: &RiceCode) -> Result<Vec<u32>, CodecError> {
    let gaps = deltas.to_vec()?;
    let mut out = Vec::with_capacity(gaps.len() + 1);
    out.push(first);
    let mut cur = first;
    for gap in gaps {
        cur = cur.checked_add(gap).ok_or(CodecError::Overflow)?;
        out.push(cur);
    }
    Ok(out)
}
