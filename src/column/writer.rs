// Copyright (c) 2026-present, the shred-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! One leaf's append-only column storage: a current in-memory [`Cab`],
//! rotated out to the data file and descriptor sidecar once it reaches
//! `cab_recd_num` records.

use std::fs::File;
use std::io::Seek;
use std::path::{Path, PathBuf};

use log::trace;

use crate::cab::{Cab, CabDescriptor, CabDescriptorBuffer, CabLayouter, Compression, ValueInfo};
use crate::config::Config;
use crate::error::Result;
use crate::types::{DataTypeId, Value};

/// Append-only writer for one leaf column: buffers items into the current
/// CAB and flushes it to disk on rotation or explicit close.
pub struct ColumnWriter {
    data_path: PathBuf,
    info_path: PathBuf,
    cab_recd_num: u32,
    mem_align: u32,
    compression: Compression,
    dtype: DataTypeId,
    max_rep: u32,
    max_def: u32,
    cur: Cab,
    cur_value_info: ValueInfo,
    descriptors: CabDescriptorBuffer,
    data_file: File,
    flushed_recd_num: u64,
}

impl ColumnWriter {
    /// Creates a column writer valid from record index `rbgn` (the record
    /// at which the leaf was first observed); `rbgn == 0` for leaves
    /// present since the table's very first record.
    pub fn init2write(
        cfg: &Config,
        data_path: impl Into<PathBuf>,
        info_path: impl Into<PathBuf>,
        dtype: DataTypeId,
        max_rep: u32,
        max_def: u32,
        rbgn: u64,
    ) -> Result<Self> {
        let data_path = data_path.into();
        let info_path = info_path.into();
        let data_file = crate::cab::descriptor::open_data_file_for_append(&data_path)?;
        let mut descriptors = CabDescriptorBuffer::new();
        descriptors.set_first_valid_record(rbgn);

        Ok(Self {
            data_path,
            info_path,
            cab_recd_num: cfg.cab_recd_num,
            mem_align: cfg.mem_align_size,
            compression: Compression::default_for_build(),
            dtype,
            max_rep,
            max_def,
            cur: Cab::new(dtype, max_rep, max_def),
            cur_value_info: ValueInfo::default(),
            descriptors,
            data_file,
            flushed_recd_num: 0,
        })
    }

    /// Reopens a previously-closed column for further writes, appending new
    /// CABs after whatever is already on disk.
    pub fn init2append(cfg: &Config, data_path: impl Into<PathBuf>, info_path: impl Into<PathBuf>, dtype: DataTypeId, max_rep: u32, max_def: u32) -> Result<Self> {
        let data_path = data_path.into();
        let info_path = info_path.into();
        let data_file = crate::cab::descriptor::open_data_file_for_append(&data_path)?;
        let descriptors = CabDescriptorBuffer::open_or_create(&info_path)?;
        let flushed_recd_num = descriptors.total_record_num();

        Ok(Self {
            data_path,
            info_path,
            cab_recd_num: cfg.cab_recd_num,
            mem_align: cfg.mem_align_size,
            compression: Compression::default_for_build(),
            dtype,
            max_rep,
            max_def,
            cur: Cab::new(dtype, max_rep, max_def),
            cur_value_info: ValueInfo::default(),
            descriptors,
            data_file,
            flushed_recd_num,
        })
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn max_rep(&self) -> u32 {
        self.max_rep
    }

    pub fn max_def(&self) -> u32 {
        self.max_def
    }

    /// Total records observed by this column so far, flushed plus buffered.
    pub fn recd_num(&self) -> u64 {
        self.flushed_recd_num + self.cur.record_num() as u64
    }

    /// Record index this column became valid from (its discovery point).
    pub fn valid_recd_idx(&self) -> u64 {
        self.descriptors.first_valid_record()
    }

    pub fn write_value(&mut self, rep: u32, def: u32, value: &Value) -> Result<()> {
        self.cur.write_value(rep, def, value)?;
        self.cur_value_info.observe(value);
        self.maybe_rotate()
    }

    pub fn write_text(&mut self, rep: u32, def: u32, txt: &str) -> Result<()> {
        if def == self.max_def && !Value::is_null_text(self.dtype, txt) {
            let value = Value::parse_text(self.dtype, txt)?;
            self.cur_value_info.observe(&value);
        }
        self.cur.write_text(rep, def, txt)?;
        self.maybe_rotate()
    }

    pub fn write_null(&mut self, rep: u32, def: u32) -> Result<()> {
        self.cur.write_null(rep, def);
        self.maybe_rotate()
    }

    pub fn write_null_run(&mut self, rep: u32, def: u32, count: u64) -> Result<()> {
        self.cur.write_null_run(rep, def, count);
        self.maybe_rotate()
    }

    fn maybe_rotate(&mut self) -> Result<()> {
        if self.cur.is_full(self.cab_recd_num) {
            self.flush_cab(false)?;
        }
        Ok(())
    }

    /// Flushes the current CAB to disk if it holds anything, marking it
    /// `is_tail` when `closing` (the last CAB a reader may still see
    /// growing if the column is reopened for append).
    fn flush_cab(&mut self, closing: bool) -> Result<()> {
        if self.cur.is_empty() {
            return Ok(());
        }
        self.data_file.seek(std::io::SeekFrom::End(0))?;
        let layout = CabLayouter::write(&mut self.data_file, &self.cur, self.mem_align, self.compression)?;
        let (mut item_info, _kind) = self.cur.classify();
        item_info.begin_record = self.flushed_recd_num;

        let desc = CabDescriptor {
            strg_size: layout.strg_size,
            dsk_size: layout.dsk_size,
            mem_size: layout.mem_size,
            cmp_type_id: layout.cmp_type_id,
            file_off: layout.file_off,
            item_info,
            value_info: std::mem::take(&mut self.cur_value_info),
            is_tail: closing,
        };
        trace!("flushing CAB for {:?}: {} records at offset {}", self.data_path, desc.item_info.record_num, desc.file_off);

        self.flushed_recd_num += desc.item_info.record_num as u64;
        self.descriptors.append(desc);
        self.descriptors.save(&self.info_path)?;
        self.cur = Cab::new(self.dtype, self.max_rep, self.max_def);
        Ok(())
    }

    /// Flushes whatever remains buffered, marking the final CAB (if any
    /// items are pending) as the column's tail.
    pub fn close(&mut self) -> Result<()> {
        self.flush_cab(true)
    }
}

impl Drop for ColumnWriter {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotates_cab_on_full_and_persists_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::new(dir.path()).with_cab_recd_num(2);
        let data_path = dir.path().join("col.bin");
        let info_path = dir.path().join("col.bin.info");

        let mut w = ColumnWriter::init2write(&cfg, &data_path, &info_path, DataTypeId::Int32, 0, 0, 0).unwrap();
        for i in 0..5 {
            w.write_value(0, 0, &Value::Int32(i)).unwrap();
        }
        assert_eq!(w.recd_num(), 5);
        w.close().unwrap();

        let descs = CabDescriptorBuffer::load(&info_path).unwrap();
        // 2 full CABs of 2 records each, plus a closing tail CAB of 1.
        assert_eq!(descs.len(), 3);
        assert_eq!(descs.total_record_num(), 5);
        assert!(descs.get(2).is_tail);
        assert!(!descs.get(0).is_tail);
    }

    #[test]
    fn late_column_records_its_discovery_point() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::new(dir.path());
        let data_path = dir.path().join("col.bin");
        let info_path = dir.path().join("col.bin.info");

        let mut w = ColumnWriter::init2write(&cfg, &data_path, &info_path, DataTypeId::Int32, 0, 0, 3).unwrap();
        assert_eq!(w.valid_recd_idx(), 3);
        w.write_value(0, 0, &Value::Int32(1)).unwrap();
        w.close().unwrap();
        let descs = CabDescriptorBuffer::load(&info_path).unwrap();
        assert_eq!(descs.first_valid_record(), 3);
    }

    #[test]
    fn flush_carries_per_cab_min_max() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::new(dir.path()).with_cab_recd_num(3);
        let data_path = dir.path().join("col.bin");
        let info_path = dir.path().join("col.bin.info");

        let mut w = ColumnWriter::init2write(&cfg, &data_path, &info_path, DataTypeId::Int32, 0, 0, 0).unwrap();
        w.write_value(0, 0, &Value::Int32(4)).unwrap();
        w.write_value(0, 0, &Value::Int32(-2)).unwrap();
        w.write_value(0, 0, &Value::Int32(9)).unwrap();
        w.close().unwrap();

        let descs = CabDescriptorBuffer::load(&info_path).unwrap();
        assert_eq!(descs.get(0).value_info.min, Some(Value::Int32(-2)));
        assert_eq!(descs.get(0).value_info.max, Some(Value::Int32(9)));
    }
}
