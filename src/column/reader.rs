// Copyright (c) 2026-present, the shred-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Random-access reader for one leaf column: locates a record's owning CAB
//! with `CabDescriptorBuffer::locate`'s binary search, then scans that
//! CAB's rep vector for the record's item range.

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::cab::{Cab, CabDescriptorBuffer, CabLayouter, ColumnItem};
use crate::error::{Error, Result};

/// Reads one leaf column's CABs back, by record id.
pub struct ColumnReader {
    data_path: PathBuf,
    descriptors: CabDescriptorBuffer,
    data_file: File,
    cached_cab_idx: Option<usize>,
    cached_cab: Option<Cab>,
}

impl ColumnReader {
    pub fn open(data_path: impl Into<PathBuf>, info_path: impl AsRef<Path>) -> Result<Self> {
        let data_path = data_path.into();
        let descriptors = CabDescriptorBuffer::load(&info_path)?;
        let data_file = File::open(&data_path)?;
        Ok(Self {
            data_path,
            descriptors,
            data_file,
            cached_cab_idx: None,
            cached_cab: None,
        })
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn recd_num(&self) -> u64 {
        self.descriptors.total_record_num()
    }

    /// Record index this column is valid from; records before it never
    /// stored any item for this leaf.
    pub fn valid_recd_idx(&self) -> u64 {
        self.descriptors.first_valid_record()
    }

    fn load_cab(&mut self, cab_idx: usize) -> Result<&Cab> {
        if self.cached_cab_idx != Some(cab_idx) {
            let desc = self.descriptors.get(cab_idx);
            let cab = CabLayouter::read(&mut self.data_file, desc.file_off)?;
            self.cached_cab = Some(cab);
            self.cached_cab_idx = Some(cab_idx);
        }
        Ok(self.cached_cab.as_ref().unwrap())
    }

    /// Every column item this leaf recorded for `recd_id`, or an empty
    /// vector if the record predates this column's discovery (the leaf
    /// never appeared in or before that record).
    pub fn read_record(&mut self, recd_id: u64) -> Result<Vec<ColumnItem>> {
        if recd_id < self.valid_recd_idx() {
            return Ok(Vec::new());
        }
        let Some(cab_idx) = self.descriptors.locate(recd_id) else {
            return Ok(Vec::new());
        };
        let begin_record = self.descriptors.get(cab_idx).item_info.begin_record;
        let relative = (recd_id - begin_record) as u32;

        let cab = self.load_cab(cab_idx)?;
        let Some((begin, end)) = cab.record_bounds(relative) else {
            return Err(Error::Corrupt(format!(
                "CAB at {:?} claims record {recd_id} but has no matching item range",
                self.data_path
            )));
        };

        let mut items = Vec::with_capacity((end - begin) as usize);
        for idx in begin..end {
            items.push(cab.read(idx)?);
        }
        Ok(items)
    }
}
