// Copyright (c) 2026-present, the shred-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Per-table fan-out of leaf [`ColumnWriter`]s (C10), plus the per-record
//! occurrence counter ([`TreeCounter`]) the shredder consults to know how
//! many times an ancestor has already appeared in the record currently
//! being shredded — the basis for both "fill a null for a child that never
//! showed up" and "backfill a newly-discovered leaf for array elements
//! already processed this record".

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

use crate::column::{ColumnReader, ColumnWriter};
use crate::config::Config;
use crate::error::Result;
use crate::schema::{SchemaSignature, SchemaTree};
use crate::types::{DataTypeId, Value};
use crate::util;

/// Per-record occurrence counts for schema nodes, reset at the start of
/// every record; the root-level count of completed records survives resets.
///
/// Grounded on `original_source/src/steed/parse/TreeCounter.h/.cpp`: the
/// original keeps a fixed-size array sized to the tree's current node count
/// and clears it record by record. A `HashMap` replaces the array here since
/// this port's schema tree can grow between records without a separate
/// resize step.
#[derive(Default)]
pub struct TreeCounter {
    seen: FxHashMap<SchemaSignature, u32>,
    completed_records: u64,
}

impl TreeCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A counter seeded with `completed_records` records already on disk,
    /// used when reopening a table for further appends.
    pub fn resume(completed_records: u64) -> Self {
        Self { seen: FxHashMap::default(), completed_records }
    }

    /// Clears per-node counts ahead of shredding a new record.
    pub fn begin_record(&mut self) {
        self.seen.clear();
    }

    /// Marks one more occurrence of `sign` in the record being shredded,
    /// returning the occurrence count *after* this mark (1 for the first).
    pub fn mark(&mut self, sign: SchemaSignature) -> u32 {
        let e = self.seen.entry(sign).or_insert(0);
        *e += 1;
        *e
    }

    /// Occurrences of `sign` seen so far in the current record.
    pub fn seen(&self, sign: SchemaSignature) -> u32 {
        self.seen.get(&sign).copied().unwrap_or(0)
    }

    /// Closes out the record being shredded, bumping the completed count.
    pub fn end_record(&mut self) {
        self.completed_records += 1;
    }

    /// Records fully shredded so far (not counting one in progress).
    pub fn completed_records(&self) -> u64 {
        self.completed_records
    }
}

/// Owns one [`ColumnWriter`] per discovered leaf, creating them lazily as
/// the shredder's schema-tree walk discovers new leaves, and keeps the
/// table-wide record count the assembler needs to know when to stop.
///
/// Grounded on `original_source/src/steed/parse/CollectionWriter.h/.cpp`:
/// the original's "tree-counter-driven alignment" is narrowed here to what
/// is actually load-bearing for correctness — see [`CollectionWriter::get_or_create`]'s
/// doc comment for the resolved design question.
pub struct CollectionWriter<'a> {
    cfg: &'a Config,
    table_dir: PathBuf,
    writers: HashMap<SchemaSignature, ColumnWriter>,
    counter: TreeCounter,
}

impl<'a> CollectionWriter<'a> {
    pub fn new(cfg: &'a Config, table_dir: impl Into<PathBuf>) -> Self {
        Self {
            cfg,
            table_dir: table_dir.into(),
            writers: HashMap::new(),
            counter: TreeCounter::new(),
        }
    }

    /// Reopens a table for appending: every leaf already present in `tree`
    /// that has a column file on disk gets a writer resumed with
    /// [`ColumnWriter::init2append`], and the record counter is seeded from
    /// the table's persisted total so newly-discovered leaves backfill
    /// against the right record index.
    pub fn resume(
        cfg: &'a Config,
        table_dir: impl Into<PathBuf>,
        tree: &SchemaTree,
        leaves: &[SchemaSignature],
    ) -> Result<Self> {
        let table_dir = table_dir.into();
        let completed = read_total_records(&table_dir)?;
        let mut writers = HashMap::new();
        for &leaf in leaves {
            let path = util::encode_column_path(tree, leaf);
            let data_path = util::column_data_path(&table_dir, &path);
            let info_path = util::column_info_path(&table_dir, &path);
            if !data_path.exists() || !info_path.exists() {
                continue;
            }
            let node = tree.node(leaf);
            let path_vec = tree.get_path(leaf);
            let max_rep = path_vec.iter().filter(|&&s| tree.is_repeated(s)).count() as u32;
            let max_def = path_vec.len() as u32;
            let w = ColumnWriter::init2append(cfg, &data_path, &info_path, node.data_type(), max_rep, max_def)?;
            writers.insert(leaf, w);
        }
        Ok(Self {
            cfg,
            table_dir,
            writers,
            counter: TreeCounter::resume(completed),
        })
    }

    pub fn counter(&mut self) -> &mut TreeCounter {
        &mut self.counter
    }

    /// Occurrences of `sign` seen so far in the record currently being
    /// shredded (read-only convenience over [`CollectionWriter::counter`]).
    pub fn seen(&self, sign: SchemaSignature) -> u32 {
        self.counter.seen(sign)
    }

    pub fn total_records(&self) -> u64 {
        self.counter.completed_records()
    }

    pub fn begin_record(&mut self) {
        self.counter.begin_record();
    }

    pub fn end_record(&mut self) {
        self.counter.end_record();
    }

    /// Returns the writer for `leaf`, creating it (and backfilling the
    /// current in-flight record's already-processed sibling occurrences)
    /// on first discovery.
    ///
    /// Design decision (recorded in `DESIGN.md`): a late-discovered leaf's
    /// `ColumnWriter` is created with `rbgn` set to the table's completed
    /// record count, i.e. it holds nothing for any earlier record at all —
    /// `ColumnReader::read_record` already treats "before `valid_recd_idx`"
    /// as an implicit null, so there is no need to physically write a null
    /// item into every prior record's column file. Backfilling only
    /// happens *within* the record currently being shredded, for repeated
    /// ancestors whose earlier occurrences (e.g. earlier elements of the
    /// same array) this record has already walked past: `nulls_needed`
    /// below is exactly that count, taken from the tree-counter.
    pub fn get_or_create(
        &mut self,
        tree: &SchemaTree,
        leaf: SchemaSignature,
        nulls_needed: u32,
    ) -> Result<&mut ColumnWriter> {
        if !self.writers.contains_key(&leaf) {
            let path = util::encode_column_path(tree, leaf);
            let data_path = util::column_data_path(&self.table_dir, &path);
            let info_path = util::column_info_path(&self.table_dir, &path);
            let node = tree.node(leaf);
            let path_vec = tree.get_path(leaf);
            let max_rep = path_vec.iter().filter(|&&s| tree.is_repeated(s)).count() as u32;
            let max_def = path_vec.len() as u32;
            let mut w = ColumnWriter::init2write(
                self.cfg,
                &data_path,
                &info_path,
                node.data_type(),
                max_rep,
                max_def,
                self.counter.completed_records(),
            )?;
            if nulls_needed > 0 {
                w.write_null_run(0, 0, nulls_needed as u64)?;
            }
            self.writers.insert(leaf, w);
        }
        Ok(self.writers.get_mut(&leaf).expect("just inserted"))
    }

    /// Every writer this session has touched, keyed by leaf signature
    /// (used by the table facade to reopen readers after a flush).
    pub fn writers(&self) -> impl Iterator<Item = (&SchemaSignature, &ColumnWriter)> {
        self.writers.iter()
    }

    /// Flushes every open column writer's pending CAB, the table's record
    /// count, and the owning schema tree.
    pub fn close(&mut self, tree: &SchemaTree, cfg: &Config, db: &str, table: &str) -> Result<()> {
        for w in self.writers.values_mut() {
            w.close()?;
        }
        tree.save(util::schema_path(cfg, db, table))?;
        std::fs::write(table_count_path(&self.table_dir), self.total_records().to_le_bytes())?;
        Ok(())
    }
}

/// Path to the small sidecar file recording a table's total record count
/// (not part of any single column's descriptor, since a table may have
/// zero columns — e.g. every record is an empty object).
pub fn table_count_path(table_dir: &Path) -> PathBuf {
    table_dir.join(".record_count")
}

/// Reads back a table's total record count, or 0 if it was never written.
pub fn read_total_records(table_dir: &Path) -> Result<u64> {
    match std::fs::read(table_count_path(table_dir)) {
        Ok(bytes) if bytes.len() == 8 => {
            let mut b = [0u8; 8];
            b.copy_from_slice(&bytes);
            Ok(u64::from_le_bytes(b))
        }
        Ok(_) => Ok(0),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// Opens a [`ColumnReader`] for every leaf currently present in `tree`,
/// keyed by signature; leaves never written at all (no data/info file on
/// disk yet) are silently skipped, matching "an always-absent leaf has no
/// column file" (§4.11).
pub fn open_readers(cfg: &Config, table_dir: &Path, tree: &SchemaTree, leaves: &[SchemaSignature]) -> Result<HashMap<SchemaSignature, ColumnReader>> {
    let _ = cfg;
    let mut out = HashMap::new();
    for &leaf in leaves {
        let path = util::encode_column_path(tree, leaf);
        let data_path = util::column_data_path(table_dir, &path);
        let info_path = util::column_info_path(table_dir, &path);
        if !data_path.exists() || !info_path.exists() {
            continue;
        }
        out.insert(leaf, ColumnReader::open(&data_path, &info_path)?);
    }
    Ok(out)
}

/// Writes `value`'s text form into `leaf`'s column, lazily creating the
/// writer via [`CollectionWriter::get_or_create`]. A thin convenience used
/// by the shredder so it never has to juggle `ColumnWriter` directly.
pub fn write_leaf_value(writer: &mut ColumnWriter, rep: u32, def: u32, value: Option<&Value>) -> Result<()> {
    match value {
        Some(v) => writer.write_value(rep, def, v),
        None => writer.write_null(rep, def),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SchemaTree, ValueCategory};

    #[test]
    fn tree_counter_resets_per_record_but_not_total() {
        let mut c = TreeCounter::new();
        c.begin_record();
        assert_eq!(c.mark(1), 1);
        assert_eq!(c.mark(1), 2);
        c.end_record();
        assert_eq!(c.completed_records(), 1);
        c.begin_record();
        assert_eq!(c.seen(1), 0);
    }

    #[test]
    fn late_leaf_does_not_backfill_earlier_records() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::new(dir.path());
        let mut tree = SchemaTree::new();
        let root = SchemaTree::root_signature();
        let a = tree.add_node("a", root, DataTypeId::Int32, ValueCategory::Single);

        let mut cw = CollectionWriter::new(&cfg, dir.path().join("t1"));
        cw.begin_record();
        {
            let w = cw.get_or_create(&tree, a, 0).unwrap();
            w.write_value(0, 1, &Value::Int32(1)).unwrap();
        }
        cw.end_record();
        cw.begin_record();
        let b = tree.add_node("b", root, DataTypeId::Int32, ValueCategory::Single);
        {
            // b discovered at record 1; no earlier sibling occurrences to
            // backfill since it's directly under the (non-repeated) root.
            let w = cw.get_or_create(&tree, b, 0).unwrap();
            w.write_value(0, 1, &Value::Int32(2)).unwrap();
            assert_eq!(w.valid_recd_idx(), 1);
        }
        cw.end_record();
        assert_eq!(cw.total_records(), 2);
    }

    #[test]
    fn late_leaf_under_an_array_backfills_earlier_elements() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::new(dir.path());
        let mut tree = SchemaTree::new();
        let root = SchemaTree::root_signature();
        let x = tree.add_node("x", root, DataTypeId::Invalid, ValueCategory::Multi);
        let k = tree.add_node("k", x, DataTypeId::Int32, ValueCategory::Single);

        let mut cw = CollectionWriter::new(&cfg, dir.path().join("t1"));
        cw.begin_record();
        {
            let w = cw.get_or_create(&tree, k, 0).unwrap();
            w.write_value(0, 2, &Value::Int32(1)).unwrap();
            cw.counter().mark(x);
            let w = cw.get_or_create(&tree, k, 0).unwrap();
            w.write_value(1, 2, &Value::Int32(2)).unwrap();
            cw.counter().mark(x);
        }
        // m appears only on the second element: one prior occurrence to
        // backfill, taken from the tree-counter's count of x so far.
        let m = tree.add_node("m", x, DataTypeId::Int32, ValueCategory::Single);
        let prior = cw.counter().seen(x);
        {
            let w = cw.get_or_create(&tree, m, prior).unwrap();
            w.write_value(1, 2, &Value::Int32(5)).unwrap();
        }
        cw.end_record();
        let w = cw.writers().find(|(&s, _)| s == m).unwrap().1;
        assert_eq!(w.recd_num(), 1);
    }

    #[test]
    fn resume_continues_record_count_and_reopens_existing_columns() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::new(dir.path());
        let table_dir = dir.path().join("t1");
        let mut tree = SchemaTree::new();
        let root = SchemaTree::root_signature();
        let a = tree.add_node("a", root, DataTypeId::Int32, ValueCategory::Single);

        {
            let mut cw = CollectionWriter::new(&cfg, &table_dir);
            cw.begin_record();
            cw.get_or_create(&tree, a, 0).unwrap().write_value(0, 1, &Value::Int32(1)).unwrap();
            cw.end_record();
            cw.close(&tree, &cfg, "db1", "t1").unwrap();
        }

        let leaves = [a];
        let mut cw = CollectionWriter::resume(&cfg, &table_dir, &tree, &leaves).unwrap();
        assert_eq!(cw.total_records(), 1);
        cw.begin_record();
        cw.get_or_create(&tree, a, 0).unwrap().write_value(0, 1, &Value::Int32(2)).unwrap();
        cw.end_record();
        assert_eq!(cw.total_records(), 2);
    }
}
