// Copyright (c) 2026-present, the shred-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! One leaf column's CAB descriptor sidecar: `[descriptor array | footer]`,
//! mirroring the original's `CABInfoBuffer` on-disk layout (§6).

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::coding::{Decode, Encode};
use crate::error::Result;
use crate::types::Value;

/// A CAB's kind, decided once at flush time and never revisited.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CabKind {
    /// Every item in the CAB is null.
    AllNull,
    /// Every item shares one repeated/definition shape with no values at
    /// all worth storing distinctly (e.g. an always-absent optional leaf).
    Trivial,
    /// The general case: rep/def bits plus stored values.
    Crucial,
}

impl CabKind {
    pub fn id(self) -> u8 {
        match self {
            Self::Trivial => 0,
            Self::AllNull => 1,
            Self::Crucial => 2,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Trivial),
            1 => Some(Self::AllNull),
            2 => Some(Self::Crucial),
            _ => None,
        }
    }
}

/// Per-CAB item counters, matching `CABItemInfo`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ItemInfo {
    pub begin_record: u64,
    pub record_num: u32,
    pub item_num: u64,
    pub null_num: u64,
    /// Items that are null *and* contribute nothing beyond their rep/def
    /// pair worth storing (the all-absent optional case). Always
    /// `<= null_num <= item_num`; drives the trivial/all-null/crucial
    /// classification at flush time.
    pub trivial_count: u64,
    pub kind_id: u8,
}

impl Encode for ItemInfo {
    fn encode_into<W: Write>(&self, w: &mut W) -> std::result::Result<(), crate::coding::EncodeError> {
        w.write_u64::<LittleEndian>(self.begin_record)?;
        w.write_u32::<LittleEndian>(self.record_num)?;
        w.write_u64::<LittleEndian>(self.item_num)?;
        w.write_u64::<LittleEndian>(self.null_num)?;
        w.write_u64::<LittleEndian>(self.trivial_count)?;
        w.write_u8(self.kind_id)?;
        Ok(())
    }
}

impl Decode for ItemInfo {
    fn decode_from<R: Read>(r: &mut R) -> std::result::Result<Self, crate::coding::DecodeError> {
        Ok(Self {
            begin_record: r.read_u64::<LittleEndian>()?,
            record_num: r.read_u32::<LittleEndian>()?,
            item_num: r.read_u64::<LittleEndian>()?,
            null_num: r.read_u64::<LittleEndian>()?,
            trivial_count: r.read_u64::<LittleEndian>()?,
            kind_id: r.read_u8()?,
        })
    }
}

/// Min/max value bookkeeping for a CAB, carried only for leaf types
/// cheap enough to compare byte-wise (numeric and `Bytes`); a `Value`'s own
/// `compare` does the actual ordering at write time (§11 "CAB min/max
/// ValueInfo").
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValueInfo {
    pub min: Option<Value>,
    pub max: Option<Value>,
}

impl ValueInfo {
    pub fn observe(&mut self, v: &Value) {
        match &self.min {
            Some(cur) if matches!(v.compare(cur), Some(std::cmp::Ordering::Less)) => self.min = Some(v.clone()),
            None => self.min = Some(v.clone()),
            _ => {}
        }
        match &self.max {
            Some(cur) if matches!(v.compare(cur), Some(std::cmp::Ordering::Greater)) => self.max = Some(v.clone()),
            None => self.max = Some(v.clone()),
            _ => {}
        }
    }
}

/// One CAB's descriptor: where its payload lives on disk, how big it is
/// compressed/decompressed, and its item/value summary.
#[derive(Clone, Debug)]
pub struct CabDescriptor {
    pub strg_size: u32,
    pub dsk_size: u32,
    pub mem_size: u32,
    pub cmp_type_id: u8,
    pub file_off: u64,
    pub item_info: ItemInfo,
    pub value_info: ValueInfo,
    /// Set on the last CAB written before a column writer is closed (and
    /// never revisited after); lets a reader know this CAB may still be
    /// growing if it's reopened for append.
    pub is_tail: bool,
}

impl CabDescriptor {
    pub fn no_storage(&self) -> bool {
        self.strg_size == 0
    }
}

impl Encode for CabDescriptor {
    fn encode_into<W: Write>(&self, w: &mut W) -> std::result::Result<(), crate::coding::EncodeError> {
        w.write_u32::<LittleEndian>(self.strg_size)?;
        w.write_u32::<LittleEndian>(self.dsk_size)?;
        w.write_u32::<LittleEndian>(self.mem_size)?;
        w.write_u8(self.cmp_type_id)?;
        w.write_u64::<LittleEndian>(self.file_off)?;
        self.item_info.encode_into(w)?;
        encode_value_opt(&self.value_info.min, w)?;
        encode_value_opt(&self.value_info.max, w)?;
        w.write_u8(self.is_tail as u8)?;
        Ok(())
    }
}

impl Decode for CabDescriptor {
    fn decode_from<R: Read>(r: &mut R) -> std::result::Result<Self, crate::coding::DecodeError> {
        let strg_size = r.read_u32::<LittleEndian>()?;
        let dsk_size = r.read_u32::<LittleEndian>()?;
        let mem_size = r.read_u32::<LittleEndian>()?;
        let cmp_type_id = r.read_u8()?;
        let file_off = r.read_u64::<LittleEndian>()?;
        let item_info = ItemInfo::decode_from(r)?;
        let min = decode_value_opt(r)?;
        let max = decode_value_opt(r)?;
        let is_tail = r.read_u8()? != 0;
        Ok(Self {
            strg_size,
            dsk_size,
            mem_size,
            cmp_type_id,
            file_off,
            item_info,
            value_info: ValueInfo { min, max },
            is_tail,
        })
    }
}

fn encode_value_opt<W: Write>(v: &Option<Value>, w: &mut W) -> std::result::Result<(), crate::coding::EncodeError> {
    match v {
        None => {
            w.write_u8(0)?;
        }
        Some(val) => {
            w.write_u8(1)?;
            w.write_u8(val.data_type().id())?;
            let bin = val.to_binary();
            w.write_u32::<LittleEndian>(bin.len() as u32)?;
            w.write_all(&bin)?;
        }
    }
    Ok(())
}

fn decode_value_opt<R: Read>(r: &mut R) -> std::result::Result<Option<Value>, crate::coding::DecodeError> {
    let tag = r.read_u8()?;
    if tag == 0 {
        return Ok(None);
    }
    let dt_id = r.read_u8()?;
    let dt = crate::types::DataTypeId::from_id(dt_id)
        .ok_or_else(|| crate::coding::DecodeError::Invalid("unknown data type id in CAB value info".into()))?;
    let len = r.read_u32::<LittleEndian>()? as usize;
    let mut bin = vec![0u8; len];
    r.read_exact(&mut bin)?;
    let val = Value::from_binary(dt, &bin).map_err(|e| crate::coding::DecodeError::Invalid(e.to_string()))?;
    Ok(Some(val))
}

/// Footer of a column's descriptor file: its own value-info rollup across
/// every CAB, plus bookkeeping mirroring `CABInfoBuffer::Footer`.
#[derive(Clone, Debug, Default)]
struct Footer {
    value_info: ValueInfo,
    valid_recd: u64,
    total_recd: u64,
    info_used: u64,
}

impl Encode for Footer {
    fn encode_into<W: Write>(&self, w: &mut W) -> std::result::Result<(), crate::coding::EncodeError> {
        encode_value_opt(&self.value_info.min, w)?;
        encode_value_opt(&self.value_info.max, w)?;
        w.write_u64::<LittleEndian>(self.valid_recd)?;
        w.write_u64::<LittleEndian>(self.total_recd)?;
        w.write_u64::<LittleEndian>(self.info_used)?;
        Ok(())
    }
}

impl Decode for Footer {
    fn decode_from<R: Read>(r: &mut R) -> std::result::Result<Self, crate::coding::DecodeError> {
        let min = decode_value_opt(r)?;
        let max = decode_value_opt(r)?;
        Ok(Self {
            value_info: ValueInfo { min, max },
            valid_recd: r.read_u64::<LittleEndian>()?,
            total_recd: r.read_u64::<LittleEndian>()?,
            info_used: r.read_u64::<LittleEndian>()?,
        })
    }
}

/// A column's `.info` sidecar: the ordered array of [`CabDescriptor`]s plus
/// the column-wide [`Footer`], held entirely in memory and rewritten in
/// full on every flush (columns are appended to far more often than they
/// grow large enough for partial rewrites to matter at this scale).
#[derive(Default)]
pub struct CabDescriptorBuffer {
    descriptors: Vec<CabDescriptor>,
    footer: Footer,
}

impl CabDescriptorBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn get(&self, idx: usize) -> &CabDescriptor {
        &self.descriptors[idx]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CabDescriptor> {
        self.descriptors.iter()
    }

    pub fn total_record_num(&self) -> u64 {
        self.footer.total_recd
    }

    pub fn value_info(&self) -> &ValueInfo {
        &self.footer.value_info
    }

    /// Record index at which this column first became valid (the leaf's
    /// discovery point, distinct from any physical `begin_record` an
    /// in-window backfill may have assigned its first CAB).
    pub fn first_valid_record(&self) -> u64 {
        self.footer.valid_recd
    }

    /// Sets the column's discovery point; called once, when a column
    /// writer is created for a leaf that doesn't appear in record 0.
    pub fn set_first_valid_record(&mut self, recd_id: u64) {
        self.footer.valid_recd = recd_id;
    }

    /// Appends a new descriptor, rolling its item/value counts into the
    /// footer. Only the newest descriptor is ever the tail.
    pub fn append(&mut self, desc: CabDescriptor) {
        self.footer.total_recd += desc.item_info.record_num as u64;
        if let Some(v) = &desc.value_info.min {
            self.footer.value_info.observe(v);
        }
        if let Some(v) = &desc.value_info.max {
            self.footer.value_info.observe(v);
        }
        self.footer.info_used += 1;
        if desc.is_tail {
            for d in &mut self.descriptors {
                d.is_tail = false;
            }
        }
        self.descriptors.push(desc);
    }

    /// Binary-searches for the descriptor index whose record range contains
    /// `recd_id`, matching `ColumnReader`'s random-access lookup.
    pub fn locate(&self, recd_id: u64) -> Option<usize> {
        if self.descriptors.is_empty() {
            return None;
        }
        let mut lo = 0usize;
        let mut hi = self.descriptors.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            let d = &self.descriptors[mid];
            let bgn = d.item_info.begin_record;
            let end = bgn + d.item_info.record_num as u64;
            if recd_id < bgn {
                hi = mid;
            } else if recd_id >= end {
                lo = mid + 1;
            } else {
                return Some(mid);
            }
        }
        None
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().write(true).create(true).truncate(true).open(path)?;
        let mut w = BufWriter::new(file);
        w.write_u64::<LittleEndian>(self.descriptors.len() as u64)?;
        for d in &self.descriptors {
            d.encode_into(&mut w)?;
        }
        self.footer.encode_into(&mut w)?;
        w.flush()?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let mut r = BufReader::new(file);
        let n = r.read_u64::<LittleEndian>()?;
        let mut descriptors = Vec::with_capacity(n as usize);
        for _ in 0..n {
            descriptors.push(CabDescriptor::decode_from(&mut r)?);
        }
        let footer = Footer::decode_from(&mut r)?;
        Ok(Self { descriptors, footer })
    }

    /// Reopens the sidecar for in-place appends by seeking past the
    /// previous footer and resuming descriptor writes from there, matching
    /// `CABInfoBuffer`'s `append` mode.
    pub fn append_to_file(path: impl AsRef<Path>, new_descs: &[CabDescriptor]) -> Result<()> {
        let mut buf = if path.as_ref().exists() {
            Self::load(&path)?
        } else {
            Self::new()
        };
        for d in new_descs {
            buf.append(d.clone());
        }
        buf.save(path)
    }

    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::new())
        }
    }
}

/// Opens `path` positioned to append raw CAB payload bytes after whatever
/// is already there, matching the column data file's append-only layout.
pub fn open_data_file_for_append(path: impl AsRef<Path>) -> Result<File> {
    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().read(true).write(true).create(true).open(path)?;
    file.seek(SeekFrom::End(0))?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataTypeId;

    fn sample_desc(bgn: u64, nrec: u32) -> CabDescriptor {
        CabDescriptor {
            strg_size: 128,
            dsk_size: 100,
            mem_size: 120,
            cmp_type_id: 0,
            file_off: 0,
            item_info: ItemInfo {
                begin_record: bgn,
                record_num: nrec,
                item_num: nrec as u64,
                null_num: 0,
                trivial_count: 0,
                kind_id: CabKind::Crucial.id(),
            },
            value_info: ValueInfo {
                min: Some(Value::Int32(1)),
                max: Some(Value::Int32(9)),
            },
            is_tail: false,
        }
    }

    #[test]
    fn descriptor_buffer_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("col.info");

        let mut buf = CabDescriptorBuffer::new();
        buf.append(sample_desc(0, 8));
        buf.append(sample_desc(8, 8));
        buf.save(&path).unwrap();

        let reloaded = CabDescriptorBuffer::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.total_record_num(), 16);
        assert_eq!(reloaded.value_info().min, Some(Value::Int32(1)));
        assert_eq!(reloaded.value_info().max, Some(Value::Int32(9)));
    }

    #[test]
    fn locate_finds_owning_cab_by_record_id() {
        let mut buf = CabDescriptorBuffer::new();
        buf.append(sample_desc(0, 8));
        buf.append(sample_desc(8, 8));
        buf.append(sample_desc(16, 4));

        assert_eq!(buf.locate(0), Some(0));
        assert_eq!(buf.locate(7), Some(0));
        assert_eq!(buf.locate(8), Some(1));
        assert_eq!(buf.locate(19), Some(2));
        assert_eq!(buf.locate(20), None);
    }

    #[test]
    fn value_info_tracks_extremes_across_appends() {
        let mut info = ValueInfo::default();
        info.observe(&Value::Int32(4));
        info.observe(&Value::Int32(-2));
        info.observe(&Value::Int32(9));
        assert_eq!(info.min, Some(Value::Int32(-2)));
        assert_eq!(info.max, Some(Value::Int32(9)));
    }

    #[test]
    fn unused_data_type_id_still_fits_into_this_module() {
        let _ = DataTypeId::Int32;
    }

    #[test]
    fn only_newest_descriptor_stays_tail() {
        let mut buf = CabDescriptorBuffer::new();
        let mut first = sample_desc(0, 8);
        first.is_tail = true;
        buf.append(first);
        let mut second = sample_desc(8, 8);
        second.is_tail = true;
        buf.append(second);

        assert!(!buf.get(0).is_tail);
        assert!(buf.get(1).is_tail);
    }

    #[test]
    fn first_valid_record_defaults_to_zero_and_is_settable() {
        let mut buf = CabDescriptorBuffer::new();
        assert_eq!(buf.first_valid_record(), 0);
        buf.set_first_valid_record(7);
        assert_eq!(buf.first_valid_record(), 7);
    }
}
