// Copyright (c) 2026-present, the shred-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Binary value storage for one leaf column: [`ValueArray::Fixed`] for
//! types with a constant width, [`ValueArray::Variable`] for `String`.
//!
//! The original keeps variable-length values in a chain of 4 MiB buffers
//! so a single huge value never forces a bulk reallocation of everything
//! written so far. A single auto-growing `Vec<u8>` gets the same amortized
//! cost in Rust without the bookkeeping, so that's what backs
//! [`VariableValueArray`]; the offset-table shape (one `u32` per value, a
//! sentinel for null) is kept as-is since CAB persists it in that form.

use crate::error::{Error, Result};
use crate::types::{DataTypeId, Value};

/// Sentinel offset marking a null entry in a [`VariableValueArray`].
pub const NULL_OFFSET: u32 = u32::MAX;

/// A column's binary value storage, fixed- or variable-width depending on
/// the leaf's data type.
#[derive(Clone, Debug)]
pub enum ValueArray {
    Fixed(FixedValueArray),
    Variable(VariableValueArray),
}

impl ValueArray {
    /// Picks the fixed or variable representation for `dt`, matching
    /// `BinaryValueArray::create`'s `getDefSize() > 0` test.
    pub fn new(dt: DataTypeId) -> Self {
        if dt.is_var() {
            Self::Variable(VariableValueArray::new(dt))
        } else {
            Self::Fixed(FixedValueArray::new(dt))
        }
    }

    pub fn data_type(&self) -> DataTypeId {
        match self {
            Self::Fixed(f) => f.dtype,
            Self::Variable(v) => v.dtype,
        }
    }

    pub fn len(&self) -> u64 {
        match self {
            Self::Fixed(f) => f.len(),
            Self::Variable(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends a null entry.
    pub fn write_null(&mut self) {
        match self {
            Self::Fixed(f) => f.write_null(),
            Self::Variable(v) => v.write_null(),
        }
    }

    /// Parses `txt` per the column's data type and appends it.
    pub fn write_text(&mut self, txt: &str) -> Result<()> {
        match self {
            Self::Fixed(f) => f.write_text(txt),
            Self::Variable(v) => v.write_text(txt),
        }
    }

    /// Appends an already-decoded value, which must match this array's
    /// data type.
    pub fn write_value(&mut self, value: &Value) -> Result<()> {
        match self {
            Self::Fixed(f) => f.write_value(value),
            Self::Variable(v) => v.write_value(value),
        }
    }

    pub fn is_null(&self, idx: u64) -> bool {
        match self {
            Self::Fixed(f) => f.is_null(idx),
            Self::Variable(v) => v.is_null(idx),
        }
    }

    /// Reads and decodes the value at `idx`, or `None` if it is null.
    pub fn read(&self, idx: u64) -> Result<Option<Value>> {
        match self {
            Self::Fixed(f) => f.read(idx),
            Self::Variable(v) => v.read(idx),
        }
    }

    /// Rehydrates a fixed-width array from its raw slot bytes.
    pub fn from_fixed_parts(dtype: DataTypeId, bytes: Vec<u8>) -> Self {
        Self::Fixed(FixedValueArray::from_parts(dtype, bytes))
    }

    /// Rehydrates a variable-width array from its offset table and values
    /// blob.
    pub fn from_variable_parts(dtype: DataTypeId, offsets: Vec<u32>, values: Vec<u8>) -> Self {
        Self::Variable(VariableValueArray::from_parts(dtype, offsets, values))
    }
}

/// Fixed-width value storage: a flat byte buffer, one `dtype.fixed_size()`
/// slot per value. Unwritten slots carry the data type's null sentinel, so
/// CAB can allocate the whole array up front and still read consistent
/// nulls from never-written tail slots.
#[derive(Clone, Debug)]
pub struct FixedValueArray {
    dtype: DataTypeId,
    width: usize,
    bytes: Vec<u8>,
    val_num: u64,
}

impl FixedValueArray {
    pub fn new(dtype: DataTypeId) -> Self {
        assert!(dtype.is_fixed(), "{dtype} is not a fixed-width type");
        Self {
            dtype,
            width: dtype.fixed_size() as usize,
            bytes: Vec::new(),
            val_num: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.val_num
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.val_num as usize * self.width]
    }

    fn push_slot(&mut self) -> usize {
        let at = self.bytes.len();
        self.bytes.resize(at + self.width, 0);
        self.val_num += 1;
        at
    }

    pub fn write_null(&mut self) {
        let at = self.push_slot();
        let w = self.width;
        self.dtype.fill_null(&mut self.bytes[at..at + w]);
    }

    pub fn write_text(&mut self, txt: &str) -> Result<()> {
        let value = Value::parse_text(self.dtype, txt)?;
        self.write_value(&value)
    }

    pub fn write_value(&mut self, value: &Value) -> Result<()> {
        if value.data_type() != self.dtype {
            return Err(Error::InvalidInput(format!(
                "value of type {} written to a {} column",
                value.data_type(),
                self.dtype
            )));
        }
        let bin = value.to_binary();
        let at = self.push_slot();
        self.bytes[at..at + self.width].copy_from_slice(&bin);
        Ok(())
    }

    /// Matches the original's "null" test: the stored slot equals the
    /// type's null sentinel. Only meaningful for numeric types; `Bytes`
    /// has no reserved sentinel, so its nullness is tracked purely by the
    /// column's definition-level vector.
    pub fn is_null(&self, idx: u64) -> bool {
        if !matches!(
            self.dtype,
            DataTypeId::Boolean
                | DataTypeId::Int8
                | DataTypeId::Int16
                | DataTypeId::Int32
                | DataTypeId::Int64
                | DataTypeId::Float
                | DataTypeId::Double
        ) {
            return false;
        }
        let Some(slot) = self.slot(idx) else { return true };
        let mut null_buf = vec![0u8; self.width];
        self.dtype.fill_null(&mut null_buf);
        slot == null_buf
    }

    fn slot(&self, idx: u64) -> Option<&[u8]> {
        if idx >= self.val_num {
            return None;
        }
        let at = idx as usize * self.width;
        Some(&self.bytes[at..at + self.width])
    }

    pub fn read(&self, idx: u64) -> Result<Option<Value>> {
        let Some(slot) = self.slot(idx) else {
            return Ok(None);
        };
        if self.is_null(idx) {
            return Ok(None);
        }
        Ok(Some(Value::from_binary(self.dtype, slot)?))
    }

    /// Rehydrates a fixed array from raw bytes already loaded off disk (a
    /// CAB major unit), with no re-parsing or re-validation of the slots.
    pub fn from_parts(dtype: DataTypeId, bytes: Vec<u8>) -> Self {
        assert!(dtype.is_fixed(), "{dtype} is not a fixed-width type");
        let width = dtype.fixed_size() as usize;
        let val_num = if width == 0 { 0 } else { (bytes.len() / width) as u64 };
        Self { dtype, width, bytes, val_num }
    }
}

/// Variable-width value storage for `String`: a `u32` offset per value
/// (`NULL_OFFSET` for null) into a single values buffer, matching the
/// original `VarLengthValueArray`'s on-disk shape.
#[derive(Clone, Debug)]
pub struct VariableValueArray {
    dtype: DataTypeId,
    offsets: Vec<u32>,
    values: Vec<u8>,
    cur_off: u32,
}

impl VariableValueArray {
    pub fn new(dtype: DataTypeId) -> Self {
        assert!(dtype.is_var(), "{dtype} is not a variable-width type");
        Self {
            dtype,
            offsets: Vec::new(),
            values: Vec::new(),
            cur_off: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.offsets.len() as u64
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    pub fn values_bytes(&self) -> &[u8] {
        &self.values
    }

    pub fn write_null(&mut self) {
        self.offsets.push(NULL_OFFSET);
    }

    pub fn write_text(&mut self, txt: &str) -> Result<()> {
        let value = Value::parse_text(self.dtype, txt)?;
        self.write_value(&value)
    }

    pub fn write_value(&mut self, value: &Value) -> Result<()> {
        if value.data_type() != self.dtype {
            return Err(Error::InvalidInput(format!(
                "value of type {} written to a {} column",
                value.data_type(),
                self.dtype
            )));
        }
        let bin = value.to_binary();
        self.append_raw(&bin);
        Ok(())
    }

    fn append_raw(&mut self, bin: &[u8]) {
        self.offsets.push(self.cur_off);
        self.values.extend_from_slice(bin);
        self.cur_off += bin.len() as u32;
    }

    pub fn is_null(&self, idx: u64) -> bool {
        self.offsets
            .get(idx as usize)
            .map(|&o| o == NULL_OFFSET)
            .unwrap_or(true)
    }

    /// Raw byte slice for the value at `idx`, or `None` if null/absent.
    pub fn read_raw(&self, idx: u64) -> Option<&[u8]> {
        let off = *self.offsets.get(idx as usize)?;
        if off == NULL_OFFSET {
            return None;
        }
        let tail = idx as usize + 1 == self.offsets.len();
        let next = if tail { self.cur_off } else { self.offsets[idx as usize + 1] };
        Some(&self.values[off as usize..next as usize])
    }

    pub fn read(&self, idx: u64) -> Result<Option<Value>> {
        let Some(raw) = self.read_raw(idx) else {
            return Ok(None);
        };
        Ok(Some(Value::from_binary(self.dtype, raw)?))
    }

    /// Rehydrates a variable array from its offset table and values blob,
    /// already loaded off disk (a CAB major unit).
    pub fn from_parts(dtype: DataTypeId, offsets: Vec<u32>, values: Vec<u8>) -> Self {
        assert!(dtype.is_var(), "{dtype} is not a variable-width type");
        let cur_off = values.len() as u32;
        Self { dtype, offsets, values, cur_off }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_array_round_trips_values_and_nulls() {
        let mut arr = FixedValueArray::new(DataTypeId::Int32);
        arr.write_value(&Value::Int32(7)).unwrap();
        arr.write_null();
        arr.write_value(&Value::Int32(-3)).unwrap();

        assert_eq!(arr.read(0).unwrap(), Some(Value::Int32(7)));
        assert_eq!(arr.read(1).unwrap(), None);
        assert_eq!(arr.read(2).unwrap(), Some(Value::Int32(-3)));
    }

    #[test]
    fn fixed_array_rejects_type_mismatch() {
        let mut arr = FixedValueArray::new(DataTypeId::Int32);
        let err = arr.write_value(&Value::Boolean(true)).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn variable_array_computes_length_from_next_offset() {
        let mut arr = VariableValueArray::new(DataTypeId::String);
        arr.write_value(&Value::String("ab".into())).unwrap();
        arr.write_null();
        arr.write_value(&Value::String("longer value".into())).unwrap();

        assert_eq!(arr.read(0).unwrap(), Some(Value::String("ab".into())));
        assert_eq!(arr.read(1).unwrap(), None);
        assert_eq!(arr.read(2).unwrap(), Some(Value::String("longer value".into())));
    }

    #[test]
    fn variable_array_tail_length_uses_current_offset() {
        let mut arr = VariableValueArray::new(DataTypeId::String);
        arr.write_value(&Value::String("x".into())).unwrap();
        let raw = arr.read_raw(0).unwrap();
        assert_eq!(raw, b"x\0");
    }

    #[test]
    fn fixed_array_rehydrates_from_raw_bytes() {
        let mut arr = FixedValueArray::new(DataTypeId::Int32);
        arr.write_value(&Value::Int32(11)).unwrap();
        arr.write_null();
        let bytes = arr.as_bytes().to_vec();

        let reloaded = FixedValueArray::from_parts(DataTypeId::Int32, bytes);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.read(0).unwrap(), Some(Value::Int32(11)));
        assert_eq!(reloaded.read(1).unwrap(), None);
    }

    #[test]
    fn variable_array_rehydrates_from_raw_parts() {
        let mut arr = VariableValueArray::new(DataTypeId::String);
        arr.write_value(&Value::String("hi".into())).unwrap();
        arr.write_null();
        let offsets = arr.offsets().to_vec();
        let values = arr.values_bytes().to_vec();

        let reloaded = VariableValueArray::from_parts(DataTypeId::String, offsets, values);
        assert_eq!(reloaded.read(0).unwrap(), Some(Value::String("hi".into())));
        assert_eq!(reloaded.read(1).unwrap(), None);
    }

    #[test]
    fn value_array_dispatches_by_type() {
        let mut fixed = ValueArray::new(DataTypeId::Double);
        fixed.write_text("3.5").unwrap();
        assert_eq!(fixed.read(0).unwrap(), Some(Value::Double(3.5)));

        let mut var = ValueArray::new(DataTypeId::String);
        var.write_text("hi").unwrap();
        assert_eq!(var.read(0).unwrap(), Some(Value::String("hi".into())));
    }
}
