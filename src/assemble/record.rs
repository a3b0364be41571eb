// Copyright (c) 2026-present, the shred-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Nested record assembly (C14): walks a record's active columns in the
//! order [`super::fsm::FsmTable`] prescribes and folds the `(rep, def,
//! value)` items read off each one back into a single nested
//! [`AssembledValue`].
//!
//! Grounded on `original_source/src/steed/assemble/RecordNestedAssembler.{h,cpp}`
//! and `RecordBuilder.{h,cpp}`: the original drives a `move2level`/
//! `return2level` pair of calls off the same FSM lookup and builds a packed
//! binary row struct incrementally. This port keeps the same control flow
//! (`move2level` only ever opens deeper, `return2level` closes back up to a
//! target level and, when the call is a "move to front" transition, flushes
//! the remaining open level's in-progress array element) but targets an
//! in-memory [`AssembledValue`] tree instead of a packed buffer, so there is
//! no binary struct length bookkeeping and no eager array-slot reservation:
//! an array element is simply whatever accumulated in a frame since it was
//! last flushed.
//!
//! [`ColumnReader::read_record`] is a batch-per-record call rather than a
//! streaming cursor, so each active column's items for the record being
//! assembled are fetched once up front and walked with a per-column cursor.

use crate::cab::ColumnItem;
use crate::column::ColumnReader;
use crate::schema::{QueryPaths, SchemaPath, SchemaSignature, SchemaTree};
use crate::Result;

use super::fsm::FsmTable;
use super::tracker::AssemblyColumnTracker;
use super::value::AssembledValue;

/// One query leaf: the path it was inferred at plus the reader to pull its
/// `ColumnItem`s from.
pub struct ColumnSource {
    pub path: SchemaPath,
    pub reader: ColumnReader,
}

impl ColumnSource {
    pub fn new(path: SchemaPath, reader: ColumnReader) -> Self {
        Self { path, reader }
    }
}

/// In-progress content for one open schema-path position.
///
/// Mirrors `RowObjectBuilder`/`RowArrayBuilder` pairs indexed by path
/// position in the original: `fields` is the object a child frame attaches
/// into, `scalar` is set directly when this frame is itself a leaf, and
/// `array` accumulates finished elements when the node is repeated (or, for
/// a non-repeated node, holds at most the one finished value).
struct Frame {
    sign: SchemaSignature,
    repeated: bool,
    fields: Vec<(SchemaSignature, AssembledValue)>,
    scalar: Option<AssembledValue>,
    array: Vec<AssembledValue>,
    /// Set once this occurrence actually received content (a scalar write
    /// of its own, or a deeper frame opened beneath it). A repeated frame
    /// that closes untouched contributes zero elements rather than one
    /// `Null` placeholder — the difference between `x: []` and `x: [null]`.
    touched: bool,
}

impl Frame {
    fn new(sign: SchemaSignature, repeated: bool) -> Self {
        Self {
            sign,
            repeated,
            fields: Vec::new(),
            scalar: None,
            array: Vec::new(),
            touched: false,
        }
    }

    /// Folds whatever has accumulated since the last flush into one value
    /// and pushes it onto `array`, leaving the frame ready for a new
    /// element (or, for a non-repeated frame, its one and only value).
    fn finish_element(&mut self) {
        if self.repeated && !self.touched {
            return;
        }
        let content = self.scalar.take().unwrap_or_else(|| {
            if self.fields.is_empty() {
                AssembledValue::Null
            } else {
                AssembledValue::Object(std::mem::take(&mut self.fields))
            }
        });
        self.array.push(content);
        self.touched = false;
    }

    fn close(mut self) -> AssembledValue {
        self.finish_element();
        if self.repeated {
            AssembledValue::Array(self.array)
        } else {
            self.array.pop().unwrap_or(AssembledValue::Null)
        }
    }
}

/// Opens frames for every path position up to (but short of needing to
/// close any) `tgt_def`. Never shrinks the stack; positions already open
/// are left untouched ("existed" in the original: a shallower sibling
/// column already established this prefix).
fn move2level(stack: &mut Vec<Frame>, tree: &SchemaTree, path: &SchemaPath, tgt_def: u32) {
    let tgt_len = tgt_def as usize;
    while stack.len() < tgt_len {
        let i = stack.len();
        if let Some(parent) = stack.last_mut() {
            parent.touched = true;
        }
        let sign = path[i];
        let repeated = tree.is_repeated(sign);
        stack.push(Frame::new(sign, repeated));
    }
}

/// Closes frames back down to `tgt_lvl`, attaching each one's finished
/// value into its parent's fields as it closes. If this is a "move to
/// front" transition (`mv2frt`, a column switch that loops back to an
/// earlier-or-same column under a shared repeated ancestor) and the frame
/// left open at `tgt_lvl` is itself repeated, its current element is
/// flushed too, so the next item starts a fresh occurrence rather than
/// silently extending the last one.
fn return2level(
    stack: &mut Vec<Frame>,
    root_fields: &mut Vec<(SchemaSignature, AssembledValue)>,
    tgt_lvl: u32,
    mv2frt: bool,
) {
    let tgt_len = tgt_lvl as usize;
    while stack.len() > tgt_len {
        let frame = stack.pop().unwrap();
        let sign = frame.sign;
        let value = frame.close();
        let parent = match stack.last_mut() {
            Some(f) => &mut f.fields,
            None => &mut *root_fields,
        };
        parent.push((sign, value));
    }
    if mv2frt {
        if let Some(top) = stack.last_mut() {
            if top.repeated {
                top.finish_element();
            }
        }
    }
}

/// Level to return to after a column switch from `cidx` to `nidx` with
/// `nrep` observed on the item just read off `cidx`.
///
/// Same column (`cidx == nidx`, a repeated leaf revisiting itself): `nrep`
/// names the level directly. Different columns: the common repeated
/// ancestor level between the two paths, capped by `nrep` when moving back
/// to an earlier column (the repetition may close out at a shallower,
/// still-shared, repeated level than the schema alone would suggest).
fn common_level(tree: &SchemaTree, paths: &[SchemaPath], cidx: usize, nidx: usize, nrep: u32) -> u32 {
    if cidx == nidx {
        return nrep;
    }
    if nidx <= cidx {
        let lvl = tree.common_repetition_level(&paths[cidx], &paths[nidx]);
        nrep.min(lvl)
    } else {
        SchemaTree::lowest_same_level(&paths[nidx], &paths[cidx])
    }
}

fn assemble_record(
    tree: &SchemaTree,
    fsm: &FsmTable,
    paths: &[SchemaPath],
    columns: &[Vec<ColumnItem>],
) -> AssembledValue {
    let mut root_fields = Vec::new();
    if columns.is_empty() {
        return AssembledValue::Object(root_fields);
    }

    let mut stack: Vec<Frame> = Vec::new();
    let mut cursors = vec![0usize; columns.len()];
    let mut cidx = 0usize;

    loop {
        let sp = &paths[cidx];
        let items = &columns[cidx];
        let cur = cursors[cidx];
        if cur >= items.len() {
            // No item left for this record on this column: nothing further
            // to assemble (a well-formed shred always leaves at least one
            // item per active column per record).
            break;
        }
        let item = &items[cur];
        cursors[cidx] += 1;

        move2level(&mut stack, tree, sp, item.def);
        if item.def as usize == sp.len() {
            if let Some(value) = &item.value {
                if let Some(top) = stack.last_mut() {
                    top.scalar = Some(AssembledValue::Scalar(value.clone()));
                    top.touched = true;
                }
            }
        }

        let nidx = fsm.lookup(cidx, item.nrep);
        if fsm.is_terminal(nidx) {
            return2level(&mut stack, &mut root_fields, 0, false);
            break;
        }
        let nidx = nidx as usize;
        let mv2frt = nidx <= cidx;
        let tgt_lvl = common_level(tree, paths, cidx, nidx, item.nrep);
        return2level(&mut stack, &mut root_fields, tgt_lvl, mv2frt);
        cidx = nidx;
    }

    AssembledValue::Object(root_fields)
}

/// Drives record-at-a-time assembly over a fixed set of query columns,
/// rebuilding its [`FsmTable`] whenever [`AssemblyColumnTracker`] activates
/// a column that was discovered partway through the table (§4.14).
pub struct RecordBuilder<'a> {
    tree: &'a SchemaTree,
    sources: Vec<ColumnSource>,
    tracker: AssemblyColumnTracker,
    fsm: Option<(FsmTable, Vec<usize>)>,
}

impl<'a> RecordBuilder<'a> {
    pub fn new(tree: &'a SchemaTree, sources: Vec<ColumnSource>) -> Self {
        let valid_from = sources.iter().map(|s| s.reader.valid_recd_idx()).collect();
        let tracker = AssemblyColumnTracker::new(valid_from);
        Self {
            tree,
            sources,
            tracker,
            fsm: None,
        }
    }

    /// Highest record id, across all columns, worth calling [`Self::assemble`] on.
    pub fn record_count(&self) -> u64 {
        self.sources.iter().map(|s| s.reader.recd_num()).max().unwrap_or(0)
    }

    fn ensure_fsm(&mut self, recd_id: u64) {
        let changed = self.tracker.advance_to(recd_id);
        if changed || self.fsm.is_none() {
            let mut active: Vec<usize> = self.tracker.active_columns().collect();
            active.sort_by_key(|&i| self.sources[i].path.back().unwrap_or(SchemaSignature::MAX));
            let paths = QueryPaths::new(active.iter().map(|&i| self.sources[i].path.clone()).collect());
            let table = FsmTable::build(self.tree, &paths);
            self.fsm = Some((table, active));
        }
    }

    /// Assembles one record, reading only the columns currently active for
    /// `recd_id`.
    pub fn assemble(&mut self, recd_id: u64) -> Result<AssembledValue> {
        self.ensure_fsm(recd_id);
        let (fsm, active) = self.fsm.as_ref().unwrap();
        if active.is_empty() {
            return Ok(AssembledValue::Object(Vec::new()));
        }

        let mut columns = Vec::with_capacity(active.len());
        let mut paths = Vec::with_capacity(active.len());
        for &gidx in active {
            columns.push(self.sources[gidx].reader.read_record(recd_id)?);
            paths.push(self.sources[gidx].path.clone());
        }

        Ok(assemble_record(self.tree, fsm, &paths, &columns))
    }
}
