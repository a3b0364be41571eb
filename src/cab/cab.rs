// Copyright (c) 2026-present, the shred-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! One in-memory CAB: a record-aligned run of column items for a single
//! leaf, backed by packed rep/def vectors plus the leaf's value array.
//!
//! The original splits a CAB into "major" (value) and "minor" (rep/def,
//! null-bitmap) storage units sized up front from a record-count estimate.
//! Rust's auto-growing `Vec`-backed [`BitVector`]/[`ValueArray`] make the
//! minor/major split and its pre-sizing unnecessary: a CAB here is just the
//! three parallel streams growing together as items are appended.

use crate::bitvec::BitVector;
use crate::cab::descriptor::{CabKind, ItemInfo};
use crate::error::Result;
use crate::types::{DataTypeId, Value};
use crate::util;
use crate::value_array::ValueArray;

/// One column item read back out of a CAB: `(rep, def, nrep, value)`.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnItem {
    pub rep: u32,
    pub def: u32,
    pub nrep: u32,
    pub value: Option<Value>,
}

/// A record-aligned run of column items for one leaf, held in memory while
/// it is being filled or just after being read off disk.
#[derive(Clone, Debug)]
pub struct Cab {
    max_rep: u32,
    max_def: u32,
    rep: BitVector,
    def: BitVector,
    values: ValueArray,
    record_num: u32,
}

impl Cab {
    /// A fresh, empty CAB for a leaf whose path allows repetition levels
    /// `0..=max_rep` and definition levels `0..=max_def`.
    pub fn new(dtype: DataTypeId, max_rep: u32, max_def: u32) -> Self {
        Self {
            max_rep,
            max_def,
            rep: BitVector::new(util::bits_used(max_rep).max(1)),
            def: BitVector::new(util::bits_used(max_def).max(1)),
            values: ValueArray::new(dtype),
            record_num: 0,
        }
    }

    /// Rehydrates a CAB from its already-decoded parts (after a layouter
    /// decompress + page-strip pass).
    pub fn from_parts(max_rep: u32, max_def: u32, rep: BitVector, def: BitVector, values: ValueArray, record_num: u32) -> Self {
        Self { max_rep, max_def, rep, def, values, record_num }
    }

    pub fn max_rep(&self) -> u32 {
        self.max_rep
    }

    pub fn max_def(&self) -> u32 {
        self.max_def
    }

    pub fn rep_vector(&self) -> &BitVector {
        &self.rep
    }

    pub fn def_vector(&self) -> &BitVector {
        &self.def
    }

    pub fn values(&self) -> &ValueArray {
        &self.values
    }

    pub fn item_num(&self) -> u64 {
        self.rep.len()
    }

    pub fn is_empty(&self) -> bool {
        self.item_num() == 0
    }

    /// Records observed so far: every item whose `rep == 0` opens a new
    /// record, matching the Dremel convention that repetition level 0 means
    /// "start of record" regardless of nesting depth.
    pub fn record_num(&self) -> u32 {
        self.record_num
    }

    /// True once the CAB holds `cap` or more records and should be rotated
    /// out to storage.
    pub fn is_full(&self, cap: u32) -> bool {
        self.record_num >= cap
    }

    fn push_item(&mut self, rep: u32, def: u32) {
        self.rep.append(rep as u64);
        self.def.append(def as u64);
        if rep == 0 {
            self.record_num += 1;
        }
    }

    /// Appends a leaf value, present at definition level `def == max_def`.
    pub fn write_value(&mut self, rep: u32, def: u32, value: &Value) -> Result<()> {
        self.push_item(rep, def);
        self.values.write_value(value)
    }

    /// Appends a leaf value parsed from its text form.
    pub fn write_text(&mut self, rep: u32, def: u32, txt: &str) -> Result<()> {
        self.push_item(rep, def);
        self.values.write_text(txt)
    }

    /// Appends one null item (an absent leaf or ancestor at `def`).
    pub fn write_null(&mut self, rep: u32, def: u32) {
        self.push_item(rep, def);
        self.values.write_null();
    }

    /// Appends `count` identical null items in one call, matching
    /// `CABWriter::writeNull(rep, def, nnum)`'s bulk form used to backfill
    /// whole records a late-appearing column missed.
    pub fn write_null_run(&mut self, rep: u32, def: u32, count: u64) {
        for _ in 0..count {
            self.write_null(rep, def);
        }
    }

    /// Item-index range `[begin, end)` covering the `relative_idx`-th
    /// record stored in this CAB (0-based, relative to the CAB's own
    /// `begin_record`), found by counting `rep == 0` boundaries. `None` if
    /// the CAB holds fewer than `relative_idx + 1` records.
    pub fn record_bounds(&self, relative_idx: u32) -> Option<(u64, u64)> {
        let n = self.item_num();
        let mut seen = 0u32;
        let mut start = None;
        for i in 0..n {
            if self.rep.get(i) == 0 {
                if start.is_some() {
                    return Some((start.unwrap(), i));
                }
                if seen == relative_idx {
                    start = Some(i);
                }
                seen += 1;
            }
        }
        start.map(|s| (s, n))
    }

    /// Reads back item `idx`, computing `nrep` from the following item's
    /// `rep` (0 past the end).
    pub fn read(&self, idx: u64) -> Result<ColumnItem> {
        let rep = self.rep.get(idx) as u32;
        let def = self.def.get(idx) as u32;
        let nrep = if idx + 1 < self.item_num() {
            self.rep.get(idx + 1) as u32
        } else {
            0
        };
        let value = if def == self.max_def {
            self.values.read(idx)?
        } else {
            None
        };
        Ok(ColumnItem { rep, def, nrep, value })
    }

    /// Rolls up `(item_num, null_num, trivial_count, kind)` over the whole
    /// CAB. `null_num` counts items whose `def < max_def` (no leaf value
    /// stored); `trivial_count` counts the simplest null shape, `rep == 0
    /// && def == 0` (the column is entirely absent for that record) —
    /// always `<= null_num`.
    pub fn classify(&self) -> (ItemInfo, CabKind) {
        let item_num = self.item_num();
        let mut null_num = 0u64;
        let mut trivial_count = 0u64;
        for i in 0..item_num {
            let rep = self.rep.get(i) as u32;
            let def = self.def.get(i) as u32;
            if def < self.max_def {
                null_num += 1;
                if rep == 0 && def == 0 {
                    trivial_count += 1;
                }
            }
        }
        let kind = if item_num == 0 {
            CabKind::Trivial
        } else if trivial_count == item_num {
            CabKind::Trivial
        } else if null_num == item_num {
            CabKind::AllNull
        } else {
            CabKind::Crucial
        };
        let info = ItemInfo {
            begin_record: 0,
            record_num: self.record_num,
            item_num,
            null_num,
            trivial_count,
            kind_id: kind.id(),
        };
        (info, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cab() -> Cab {
        let mut cab = Cab::new(DataTypeId::Int32, 0, 1);
        cab.write_value(0, 1, &Value::Int32(10)).unwrap();
        cab.write_null(0, 0);
        cab.write_value(0, 1, &Value::Int32(30)).unwrap();
        cab
    }

    #[test]
    fn record_num_counts_rep_zero_items() {
        let cab = sample_cab();
        assert_eq!(cab.record_num(), 3);
        assert_eq!(cab.item_num(), 3);
    }

    #[test]
    fn read_computes_nrep_from_next_item() {
        let cab = sample_cab();
        let item0 = cab.read(0).unwrap();
        assert_eq!(item0.nrep, 0);
        assert_eq!(item0.value, Some(Value::Int32(10)));
        let item2 = cab.read(2).unwrap();
        assert_eq!(item2.nrep, 0);
    }

    #[test]
    fn null_item_has_no_value() {
        let cab = sample_cab();
        let item1 = cab.read(1).unwrap();
        assert_eq!(item1.def, 0);
        assert_eq!(item1.value, None);
    }

    #[test]
    fn classify_crucial_when_some_values_present() {
        let cab = sample_cab();
        let (info, kind) = cab.classify();
        assert_eq!(kind, CabKind::Crucial);
        assert_eq!(info.item_num, 3);
        assert_eq!(info.null_num, 1);
        assert_eq!(info.trivial_count, 1);
    }

    #[test]
    fn classify_all_null_when_present_but_never_valued() {
        let mut cab = Cab::new(DataTypeId::Int32, 0, 2);
        cab.write_null(0, 1);
        cab.write_null(0, 1);
        let (info, kind) = cab.classify();
        assert_eq!(kind, CabKind::AllNull);
        assert_eq!(info.trivial_count, 0);
    }

    #[test]
    fn classify_trivial_when_column_never_appears() {
        let mut cab = Cab::new(DataTypeId::Int32, 0, 2);
        cab.write_null_run(0, 0, 4);
        let (info, kind) = cab.classify();
        assert_eq!(kind, CabKind::Trivial);
        assert_eq!(info.trivial_count, 4);
    }

    #[test]
    fn record_bounds_finds_item_range_by_rep_zero_boundaries() {
        let mut cab = Cab::new(DataTypeId::Int32, 1, 1);
        // record 0: one item (rep 0)
        cab.write_value(0, 1, &Value::Int32(1)).unwrap();
        // record 1: two items (rep 0, then rep 1 repeat)
        cab.write_value(0, 1, &Value::Int32(2)).unwrap();
        cab.write_value(1, 1, &Value::Int32(3)).unwrap();
        // record 2: one item
        cab.write_null(0, 0);

        assert_eq!(cab.record_bounds(0), Some((0, 1)));
        assert_eq!(cab.record_bounds(1), Some((1, 3)));
        assert_eq!(cab.record_bounds(2), Some((3, 4)));
        assert_eq!(cab.record_bounds(3), None);
    }

    #[test]
    fn is_full_honours_cab_record_cap() {
        let cab = sample_cab();
        assert!(cab.is_full(3));
        assert!(!cab.is_full(4));
    }
}
