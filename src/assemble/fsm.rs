// Copyright (c) 2026-present, the shred-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The column transition table (C13): for a query with `n` active columns,
//! `T[c][rep]` says which column to read from next after consuming an item
//! with repetition level `rep` out of column `c`.
//!
//! Construction appends one virtual, empty terminal path at index `n` ahead
//! of building the table. Every real path's `common_repetition_level`
//! against the empty path is `0` by definition (no shared prefix at all),
//! so comparing the last real column against the terminal falls out of the
//! same recursive rule used for every other pair, with no special case for
//! "this is the last column" (§4.13).

use crate::schema::{QueryPaths, SchemaPath, SchemaTree};

/// Sentinel used while building the table before a row's remaining holes are
/// filled in by propagation; never observed by callers of [`FsmTable::lookup`].
const UNREACHABLE: i32 = -1;

/// Column index meaning "no more columns to read; this record is done."
pub type ColumnIndex = i32;

/// The built transition table plus the terminal marker callers compare
/// [`FsmTable::lookup`]'s result against.
pub struct FsmTable {
    /// `rows[c][rep]`, width `max_path_len + 1` per row.
    rows: Vec<Vec<ColumnIndex>>,
    /// One past the last real column; returned once a query path's last
    /// item has been consumed.
    terminal: ColumnIndex,
}

impl FsmTable {
    /// Builds the table for `paths` (already sorted by leaf signature, as
    /// [`QueryPaths::new`] leaves them).
    pub fn build(tree: &SchemaTree, paths: &QueryPaths) -> Self {
        let n = paths.len();
        let terminal = n as ColumnIndex;
        let width = paths.iter().map(|p| p.len()).max().unwrap_or(0) + 1;

        let empty = SchemaPath::new();
        let path_at = |i: usize| -> &SchemaPath {
            if i == n {
                &empty
            } else {
                paths.get(i)
            }
        };

        let mut rows = vec![vec![UNREACHABLE; width]; n];

        for c in 0..n {
            let b = c + 1; // barrier column; may be `n` (terminal) for the last real column
            let bl = tree.common_repetition_level(path_at(c), path_at(b)) as usize;
            for rep in 0..=bl.min(width - 1) {
                rows[c][rep] = b as ColumnIndex;
            }
            for f in (0..=c).rev() {
                let k = tree.common_repetition_level(path_at(c), path_at(f)) as usize;
                if k > bl && k < width {
                    rows[c][k] = f as ColumnIndex;
                }
            }
            for i in (0..width - 1).rev() {
                if rows[c][i] == UNREACHABLE {
                    rows[c][i] = rows[c][i + 1];
                }
            }
            let path = paths.get(c);
            for i in 1..width.min(path.len() + 1) {
                let sign = path[i - 1];
                if !tree.is_repeated(sign) {
                    rows[c][i] = UNREACHABLE;
                }
            }
        }

        Self { rows, terminal }
    }

    /// The next column to read from after an item with repetition level
    /// `rep` was read out of column `col`. Never [`UNREACHABLE`] for a
    /// well-formed table built from a connected query path set; compare the
    /// result against [`FsmTable::is_terminal`] to detect end-of-record.
    pub fn lookup(&self, col: usize, rep: u32) -> ColumnIndex {
        let row = &self.rows[col];
        let idx = (rep as usize).min(row.len() - 1);
        row[idx]
    }

    pub fn is_terminal(&self, col: ColumnIndex) -> bool {
        col == self.terminal
    }

    pub fn terminal(&self) -> ColumnIndex {
        self.terminal
    }

    pub fn column_count(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ValueCategory;
    use crate::types::DataTypeId;

    fn paths_for(tree: &SchemaTree, leaves: &[u32]) -> QueryPaths {
        QueryPaths::new(leaves.iter().map(|&l| tree.get_path(l)).collect())
    }

    #[test]
    fn flat_record_single_column_always_terminates() {
        let mut tree = SchemaTree::new();
        let root = SchemaTree::root_signature();
        let a = tree.add_node("a", root, DataTypeId::Int32, ValueCategory::Single);
        let paths = paths_for(&tree, &[a]);
        let fsm = FsmTable::build(&tree, &paths);
        assert!(fsm.is_terminal(fsm.lookup(0, 0)));
    }

    #[test]
    fn two_sibling_scalars_alternate_then_terminate() {
        let mut tree = SchemaTree::new();
        let root = SchemaTree::root_signature();
        let a = tree.add_node("a", root, DataTypeId::Int32, ValueCategory::Single);
        let b = tree.add_node("b", root, DataTypeId::Int32, ValueCategory::Single);
        let paths = paths_for(&tree, &[a, b]);
        let fsm = FsmTable::build(&tree, &paths);
        // After column 0 (a), next is column 1 (b); after column 1, terminal.
        assert_eq!(fsm.lookup(0, 0), 1);
        assert!(fsm.is_terminal(fsm.lookup(1, 0)));
    }

    #[test]
    fn repeated_array_column_revisits_itself() {
        let mut tree = SchemaTree::new();
        let root = SchemaTree::root_signature();
        let x = tree.add_node("x", root, DataTypeId::Invalid, ValueCategory::Multi);
        let k = tree.add_node("k", x, DataTypeId::Int32, ValueCategory::Single);
        let paths = paths_for(&tree, &[k]);
        let fsm = FsmTable::build(&tree, &paths);
        // rep==0: first element or empty array -> terminal once only column.
        // rep==1 (repeated occurrence of x): transitions back to column 0.
        assert_eq!(fsm.lookup(0, 1), 0);
    }

    #[test]
    fn every_row_eventually_reaches_terminal_for_rep_zero() {
        let mut tree = SchemaTree::new();
        let root = SchemaTree::root_signature();
        let x = tree.add_node("x", root, DataTypeId::Invalid, ValueCategory::Multi);
        let k = tree.add_node("k", x, DataTypeId::Int32, ValueCategory::Single);
        let m = tree.add_node("m", x, DataTypeId::Int32, ValueCategory::Single);
        let paths = paths_for(&tree, &[k, m]);
        let fsm = FsmTable::build(&tree, &paths);
        let mut col = 0usize;
        let mut steps = 0;
        loop {
            let next = fsm.lookup(col, 0);
            if fsm.is_terminal(next) {
                break;
            }
            col = next as usize;
            steps += 1;
            assert!(steps < 10, "table does not converge to terminal at rep 0");
        }
    }
}
