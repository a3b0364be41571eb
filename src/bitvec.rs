// Copyright (c) 2026-present, the shred-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Fixed-width bit-packed vectors: [`BitVector`] packs `1..=32`-bit values
//! tightly into bytes, and [`BoolVector`] specializes it to single bits for
//! repetition/definition-level presence tracking and record validity masks.
//!
//! The original C implementation reads elements out of a raw `uint64_t*`
//! view and, to keep every read within one 64-bit load, shifts the read
//! window by 4 bytes whenever an element would otherwise straddle a word
//! boundary. We keep that exact addressing trick (it is what makes
//! `1..=32`-bit packing fast without cross-word shifting logic) but back it
//! with an owned, auto-growing `Vec<u8>` instead of a caller-supplied
//! pointer: the buffer zero-extends on demand, so there is no separate
//! "pre-zero the next word" bookkeeping to replicate.

use std::io::{Read, Write};

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// A vector of fixed-width unsigned integers, each `1..=32` bits wide,
/// packed into a byte buffer.
#[derive(Clone, Debug)]
pub struct BitVector {
    mask_size: u32,
    mask: u64,
    bytes: Vec<u8>,
    elem_used: u64,
}

impl BitVector {
    /// A new, empty vector packing `mask_size`-bit elements (`1..=32`).
    pub fn new(mask_size: u32) -> Self {
        assert!((1..=32).contains(&mask_size), "mask_size must be 1..=32");
        Self {
            mask_size,
            mask: (1u64 << mask_size) - 1,
            bytes: Vec::new(),
            elem_used: 0,
        }
    }

    /// A new, empty vector with room for at least `elem_cap` elements
    /// pre-allocated.
    pub fn with_capacity(mask_size: u32, elem_cap: u64) -> Self {
        let mut v = Self::new(mask_size);
        let bit_cap = elem_cap * mask_size as u64;
        v.bytes.reserve(crate::util::bytes_used(bit_cap) as usize + 8);
        v
    }

    /// Rehydrates a vector from its previously-encoded byte content,
    /// trusting `elem_used` rather than re-deriving it from `bytes.len()`
    /// (the tail of `bytes` may be padding).
    pub fn from_parts(mask_size: u32, elem_used: u64, bytes: Vec<u8>) -> Self {
        let mut v = Self::new(mask_size);
        v.bytes = bytes;
        v.elem_used = elem_used;
        v
    }

    pub fn mask_size(&self) -> u32 {
        self.mask_size
    }

    pub fn mask(&self) -> u64 {
        self.mask
    }

    pub fn len(&self) -> u64 {
        self.elem_used
    }

    pub fn is_empty(&self) -> bool {
        self.elem_used == 0
    }

    /// Raw packed bytes, including any straddle-avoidance padding.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Bytes actually touched by `elem_used` elements.
    pub fn used_size(&self) -> u64 {
        crate::util::bytes_used(self.elem_used * self.mask_size as u64)
    }

    /// Value at element index `ei`.
    pub fn get(&self, ei: u64) -> u64 {
        self.get_by_bit(ei * self.mask_size as u64)
    }

    /// Overwrites the value at element index `ei`. `ei` must be `< len()`.
    pub fn set(&mut self, ei: u64, val: u64) {
        self.set_by_bit(ei * self.mask_size as u64, val);
    }

    /// Appends a new element, growing the backing buffer as needed.
    pub fn append(&mut self, val: u64) {
        let bi = self.elem_used * self.mask_size as u64;
        self.grow_for_bit(bi);
        self.write_bits(bi, val & self.mask);
        self.elem_used += 1;
    }

    /// Value at raw bit index `bi` (must already be within the written
    /// range).
    pub fn get_by_bit(&self, bi: u64) -> u64 {
        if self.mask_size == 0 {
            return 0;
        }
        let (byte_off, shift) = self.unit_for(bi);
        let word = self.read_word(byte_off);
        (word >> shift) & self.mask
    }

    /// Overwrites the value at raw bit index `bi`, growing the buffer if
    /// `bi` falls past the current content.
    pub fn set_by_bit(&mut self, bi: u64, val: u64) {
        self.grow_for_bit(bi);
        self.write_bits(bi, val & self.mask);
    }

    fn grow_for_bit(&mut self, bi: u64) {
        let (byte_off, _) = self.unit_for(bi);
        let need = byte_off as usize + 8;
        if self.bytes.len() < need {
            self.bytes.resize(need, 0);
        }
    }

    /// Computes the straddle-avoiding (byte offset, bit shift) pair for bit
    /// index `bi`: a plain word/bit split, shifted down by one 32-bit lane
    /// whenever the element would otherwise cross a 64-bit boundary.
    fn unit_for(&self, bi: u64) -> (u64, u32) {
        let word_byte = (bi / 64) * 8;
        let mut uidx = (bi % 64) as u32;
        let mut byte_off = word_byte;
        if uidx + self.mask_size > 64 {
            byte_off += 4;
            uidx -= 32;
        }
        (byte_off, uidx)
    }

    fn read_word(&self, byte_off: u64) -> u64 {
        let off = byte_off as usize;
        let mut buf = [0u8; 8];
        let avail = self.bytes.len().saturating_sub(off).min(8);
        buf[..avail].copy_from_slice(&self.bytes[off..off + avail]);
        u64::from_le_bytes(buf)
    }

    fn write_bits(&mut self, bi: u64, val: u64) {
        let (byte_off, shift) = self.unit_for(bi);
        let mut word = self.read_word(byte_off);
        word &= !(self.mask << shift);
        word |= val << shift;
        let bytes = word.to_le_bytes();
        let off = byte_off as usize;
        self.bytes[off..off + 8].copy_from_slice(&bytes);
    }

    /// Forces the logical element count, without touching the buffer.
    /// Used when an element count is known up front (e.g. after a bulk
    /// `copy_from`).
    pub fn resize_elem_used(&mut self, elem_used: u64) {
        self.elem_used = elem_used;
        let need = crate::util::bytes_used(elem_used * self.mask_size as u64) as usize + 8;
        if self.bytes.len() < need {
            self.bytes.resize(need, 0);
        }
    }

    /// Copies another vector's logical content (same `mask_size` required).
    pub fn copy_from(&mut self, src: &BitVector) {
        assert_eq!(self.mask_size, src.mask_size, "mask_size mismatch");
        self.bytes.clear();
        self.bytes.extend_from_slice(&src.bytes);
        self.elem_used = src.elem_used;
    }
}

impl Encode for BitVector {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u32::<LittleEndian>(self.mask_size)?;
        writer.write_u64::<LittleEndian>(self.elem_used)?;
        writer.write_u64::<LittleEndian>(self.used_size())?;
        writer.write_all(&self.bytes[..self.used_size() as usize])?;
        Ok(())
    }
}

impl Decode for BitVector {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let mask_size = reader.read_u32::<LittleEndian>()?;
        let elem_used = reader.read_u64::<LittleEndian>()?;
        let len = reader.read_u64::<LittleEndian>()?;
        let mut bytes = vec![0u8; len as usize];
        reader.read_exact(&mut bytes)?;
        Ok(Self::from_parts(mask_size, elem_used, bytes))
    }
}

/// A single-bit specialization of [`BitVector`]: schema-node presence
/// masks, repetition/definition-level "is-set" tracking, and record
/// validity bitmaps.
#[derive(Clone, Debug)]
pub struct BoolVector(BitVector);

impl BoolVector {
    pub fn new() -> Self {
        Self(BitVector::new(1))
    }

    pub fn with_capacity(elem_cap: u64) -> Self {
        Self(BitVector::with_capacity(1, elem_cap))
    }

    pub fn from_parts(elem_used: u64, bytes: Vec<u8>) -> Self {
        Self(BitVector::from_parts(1, elem_used, bytes))
    }

    pub fn len(&self) -> u64 {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn get(&self, ei: u64) -> bool {
        self.0.get(ei) != 0
    }

    pub fn set(&mut self, ei: u64) {
        self.0.set(ei, 1);
    }

    pub fn set_val(&mut self, ei: u64, val: bool) {
        self.0.set(ei, val as u64);
    }

    pub fn append(&mut self, val: bool) {
        self.0.append(val as u64);
    }

    pub fn set_all(&mut self) {
        for b in self.0.bytes.iter_mut() {
            *b = 0xff;
        }
    }

    pub fn clear_all(&mut self) {
        for b in self.0.bytes.iter_mut() {
            *b = 0;
        }
    }

    pub fn flip_all(&mut self) {
        for b in self.0.bytes.iter_mut() {
            *b = !*b;
        }
    }

    /// Sets every bit in `[bgn, end)`.
    pub fn set_bit_by_range(&mut self, bgn: u64, end: u64) {
        for bi in bgn..end {
            self.0.set_by_bit(bi, 1);
        }
    }

    /// Clears every bit in `[bgn, end)`.
    pub fn clear_bit_by_range(&mut self, bgn: u64, end: u64) {
        for bi in bgn..end {
            self.0.set_by_bit(bi, 0);
        }
    }

    /// True iff every bit in `[bgn, end)` is set.
    pub fn calc_and_by_range(&self, bgn: u64, end: u64) -> bool {
        (end - bgn) == self.get_pop_count(bgn, end)
    }

    /// True iff any bit in `[bgn, end)` is set.
    pub fn calc_or_by_range(&self, bgn: u64, end: u64) -> bool {
        self.get_pop_count(bgn, end) > 0
    }

    /// Number of set bits in `[bgn, end)`.
    pub fn get_pop_count(&self, bgn: u64, end: u64) -> u64 {
        if end <= bgn {
            return 0;
        }
        let mut count = 0u64;
        // Byte-granular popcount with masked edge bytes; simple and exact,
        // in place of the original's lookup table.
        let first_byte = (bgn / 8) as usize;
        let last_byte = ((end - 1) / 8) as usize;
        for byte_idx in first_byte..=last_byte {
            let byte = *self.0.bytes.get(byte_idx).unwrap_or(&0);
            let byte_bgn = (byte_idx as u64) * 8;
            let lo = bgn.saturating_sub(byte_bgn).min(8) as u32;
            let hi = (end.saturating_sub(byte_bgn)).min(8) as u32;
            if hi <= lo {
                continue;
            }
            let width = hi - lo;
            let mask = if width == 8 { 0xffu8 } else { ((1u16 << width) - 1) as u8 } << lo;
            count += (byte & mask).count_ones() as u64;
        }
        count
    }

    /// Index of the next set bit at or after `bi`, or `None` if there is
    /// none within the used range.
    pub fn get_next_set_bit(&self, bi: u64) -> Option<u64> {
        let total = self.0.elem_used;
        let mut idx = bi;
        while idx < total {
            let byte_idx = (idx / 8) as usize;
            let byte = *self.0.bytes.get(byte_idx).unwrap_or(&0);
            let lo = (idx % 8) as u32;
            let masked = byte >> lo;
            if masked == 0 {
                idx += 8 - lo as u64;
                continue;
            }
            idx += masked.trailing_zeros() as u64;
            return if idx < total { Some(idx) } else { None };
        }
        None
    }

    /// ORs `other` into `self` bit-for-bit; both must carry the same
    /// element count.
    pub fn merge_or(&mut self, other: &BoolVector) {
        self.check(other);
        for (a, b) in self.0.bytes.iter_mut().zip(other.0.bytes.iter()) {
            *a |= *b;
        }
    }

    /// ANDs `other` into `self` bit-for-bit; both must carry the same
    /// element count.
    pub fn merge_and(&mut self, other: &BoolVector) {
        self.check(other);
        for (a, b) in self.0.bytes.iter_mut().zip(other.0.bytes.iter()) {
            *a &= *b;
        }
    }

    fn check(&self, other: &BoolVector) {
        assert_eq!(self.0.elem_used, other.0.elem_used, "boolean vector length mismatch");
    }
}

impl Default for BoolVector {
    fn default() -> Self {
        Self::new()
    }
}

impl Encode for BoolVector {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        self.0.encode_into(writer)
    }
}

impl Decode for BoolVector {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        Ok(Self(BitVector::decode_from(reader)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_round_trip_stays_exact() {
        let mut v = BitVector::new(5);
        for i in 0..100u64 {
            v.append(i % 32);
        }
        assert_eq!(v.len(), 100);
        for i in 0..100u64 {
            assert_eq!(v.get(i), i % 32);
        }
    }

    #[test]
    fn straddling_elements_survive_unaligned_widths() {
        // mask_size 7 guarantees some elements straddle a 64-bit boundary.
        let mut v = BitVector::new(7);
        let values: Vec<u64> = (0..50).map(|i| (i * 3) % 128).collect();
        for &val in &values {
            v.append(val);
        }
        for (i, &val) in values.iter().enumerate() {
            assert_eq!(v.get(i as u64), val);
        }
    }

    #[test]
    fn set_overwrites_in_place() {
        let mut v = BitVector::new(4);
        for _ in 0..10 {
            v.append(0);
        }
        v.set(3, 9);
        assert_eq!(v.get(3), 9);
        assert_eq!(v.get(2), 0);
        assert_eq!(v.get(4), 0);
    }

    #[test]
    fn encode_decode_round_trip() {
        let mut v = BitVector::new(9);
        for i in 0..30u64 {
            v.append(i * 7 % 512);
        }
        let bytes = v.encode_into_vec();
        let mut cursor = std::io::Cursor::new(bytes);
        let back = BitVector::decode_from(&mut cursor).unwrap();
        assert_eq!(back.len(), v.len());
        for i in 0..30u64 {
            assert_eq!(back.get(i), v.get(i));
        }
    }

    #[test]
    fn bool_vector_append_and_popcount() {
        let mut bv = BoolVector::new();
        for i in 0..64u64 {
            bv.append(i % 3 == 0);
        }
        let expected = (0..64u64).filter(|i| i % 3 == 0).count() as u64;
        assert_eq!(bv.get_pop_count(0, 64), expected);
    }

    #[test]
    fn bool_vector_next_set_bit() {
        let mut bv = BoolVector::new();
        for _ in 0..10 {
            bv.append(false);
        }
        bv.set_val(6, true);
        assert_eq!(bv.get_next_set_bit(0), Some(6));
        assert_eq!(bv.get_next_set_bit(7), None);
    }

    #[test]
    fn bool_vector_merge_or_and() {
        let mut a = BoolVector::new();
        let mut b = BoolVector::new();
        for i in 0..16 {
            a.append(i % 2 == 0);
            b.append(i % 3 == 0);
        }
        let mut or_v = a.clone();
        or_v.merge_or(&b);
        for i in 0..16u64 {
            assert_eq!(or_v.get(i), a.get(i) || b.get(i));
        }

        let mut and_v = a.clone();
        and_v.merge_and(&b);
        for i in 0..16u64 {
            assert_eq!(and_v.get(i), a.get(i) && b.get(i));
        }
    }

    #[test]
    fn range_set_and_clear() {
        let mut bv = BoolVector::new();
        for _ in 0..20 {
            bv.append(false);
        }
        bv.set_bit_by_range(4, 10);
        assert!(bv.calc_and_by_range(4, 10));
        assert!(!bv.calc_and_by_range(3, 10));
        assert!(bv.calc_or_by_range(0, 20));
        bv.clear_bit_by_range(5, 8);
        assert!(!bv.calc_and_by_range(4, 10));
    }
}
