// Copyright (c) 2026-present, the shred-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! End-to-end ingest/assemble round trips, one per scenario in the
//! testable-properties table: flat records, a late-appearing field,
//! nested repetition, an empty array, a heterogeneous (indexed) array,
//! and dynamic-key templates.

use shred_tree::assemble::{to_json, ColumnSource, RecordBuilder};
use shred_tree::collection::{open_readers, CollectionWriter};
use shred_tree::config::Config;
use shred_tree::ingest::{from_json, Shredder};
use shred_tree::schema::{SchemaSignature, SchemaTree};

/// Shreds every record in `records` into a fresh table under `dir`, then
/// reassembles it using every leaf currently in the schema, returning one
/// rendered JSON value per input record in order.
fn round_trip(dir: &std::path::Path, records: &[serde_json::Value]) -> Vec<serde_json::Value> {
    round_trip_with(dir, records, Shredder::new())
}

fn round_trip_with(dir: &std::path::Path, records: &[serde_json::Value], shredder: Shredder) -> Vec<serde_json::Value> {
    let cfg = Config::new(dir);
    let table_dir = dir.join("t1");
    let mut tree = SchemaTree::new();
    let mut collection = CollectionWriter::new(&cfg, &table_dir);

    for record in records {
        shredder.shred_record(&mut tree, &mut collection, &from_json(record)).unwrap();
    }
    collection.close(&tree, &cfg, "db1", "t1").unwrap();

    assemble_all(&cfg, &table_dir, &tree)
}

fn leaves(tree: &SchemaTree) -> Vec<SchemaSignature> {
    (0..tree.node_count() as SchemaSignature)
        .filter(|&s| tree.is_valid(s) && tree.node(s).is_leaf())
        .collect()
}

fn assemble_all(cfg: &Config, table_dir: &std::path::Path, tree: &SchemaTree) -> Vec<serde_json::Value> {
    let leaves = leaves(tree);
    let readers = open_readers(cfg, table_dir, tree, &leaves).unwrap();
    if readers.is_empty() {
        return Vec::new();
    }
    let sources: Vec<ColumnSource> = readers
        .into_iter()
        .map(|(leaf, reader)| ColumnSource::new(tree.get_path(leaf), reader))
        .collect();
    let mut builder = RecordBuilder::new(tree, sources);
    (0..builder.record_count()).map(|id| to_json(tree, &builder.assemble(id).unwrap())).collect()
}

#[test]
fn flat_record() {
    let dir = tempfile::tempdir().unwrap();
    let out = round_trip(
        dir.path(),
        &[
            serde_json::json!({"a": 1, "b": "x"}),
            serde_json::json!({"a": 2, "b": "y"}),
        ],
    );
    assert_eq!(out, vec![serde_json::json!({"a": 1, "b": "x"}), serde_json::json!({"a": 2, "b": "y"})]);
}

#[test]
fn late_appearing_field() {
    let dir = tempfile::tempdir().unwrap();
    let out = round_trip(
        dir.path(),
        &[serde_json::json!({"a": 1}), serde_json::json!({"a": 2, "b": 3})],
    );
    // b is absent from record 0 entirely rather than carrying an explicit
    // null, per the assembler's "never-present field is omitted" rule.
    assert_eq!(out, vec![serde_json::json!({"a": 1}), serde_json::json!({"a": 2, "b": 3})]);
}

#[test]
fn nested_repetition() {
    let dir = tempfile::tempdir().unwrap();
    let out = round_trip(dir.path(), &[serde_json::json!({"x": [{"k": 1}, {"k": 2}]})]);
    assert_eq!(out, vec![serde_json::json!({"x": [{"k": 1}, {"k": 2}]})]);
}

#[test]
fn empty_array() {
    let dir = tempfile::tempdir().unwrap();
    // Record 0 establishes xs as a leaf; record 1's empty array nulls out
    // at that leaf's own level rather than the parent's, so it assembles
    // as an empty array instead of being omitted.
    let out = round_trip(dir.path(), &[serde_json::json!({"xs": [1]}), serde_json::json!({"xs": []})]);
    assert_eq!(out, vec![serde_json::json!({"xs": [1]}), serde_json::json!({"xs": []})]);
}

#[test]
fn mixed_heterogeneous_array() {
    let dir = tempfile::tempdir().unwrap();
    let out = round_trip(dir.path(), &[serde_json::json!({"a": [1, "two", 3.0]})]);
    // Indexed arrays get one leaf per position (named by position), so
    // the assembled shape is an object keyed by position rather than a
    // JSON array; element order is preserved via the key ordering.
    assert_eq!(out, vec![serde_json::json!({"a": {"0": 1, "1": "two", "2": 3.0}})]);
}

#[test]
fn dynamic_keys_use_a_template() {
    let dir = tempfile::tempdir().unwrap();
    let shredder = Shredder::with_template_fields(["m".to_string()]);
    let out = round_trip_with(
        dir.path(),
        &[
            serde_json::json!({"m": {"k1": 1, "k2": 2}}),
            serde_json::json!({"m": {"k3": 3}}),
        ],
        shredder,
    );
    assert_eq!(out.len(), 2);
    // Both records assemble as a sequence of (key, value) pairs under the
    // template's key/value leaves rather than per-key schema nodes.
    assert_eq!(out[0], serde_json::json!({"m": [{"=KEY=": "k1", "=VAL=": 1}, {"=KEY=": "k2", "=VAL=": 2}]}));
    assert_eq!(out[1], serde_json::json!({"m": [{"=KEY=": "k3", "=VAL=": 3}]}));
}

#[test]
fn superset_of_leaf_paths_still_round_trips() {
    // Testable property: assemble(S, r) == r' for any superset S of a
    // record's own leaves, here including a leaf `b` that record 0 never
    // touches at all.
    let dir = tempfile::tempdir().unwrap();
    let cfg = Config::new(dir.path());
    let table_dir = dir.path().join("t1");
    let mut tree = SchemaTree::new();
    let mut collection = CollectionWriter::new(&cfg, &table_dir);
    let shredder = Shredder::new();

    shredder.shred_record(&mut tree, &mut collection, &from_json(&serde_json::json!({"a": 1}))).unwrap();
    shredder.shred_record(&mut tree, &mut collection, &from_json(&serde_json::json!({"a": 2, "b": "z"}))).unwrap();
    collection.close(&tree, &cfg, "db1", "t1").unwrap();

    let out = assemble_all(&cfg, &table_dir, &tree);
    assert_eq!(out, vec![serde_json::json!({"a": 1}), serde_json::json!({"a": 2, "b": "z"})]);
}

#[test]
fn append_extends_an_existing_table() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = Config::new(dir.path());
    let table_dir = dir.path().join("t1");

    {
        let mut tree = SchemaTree::new();
        let mut collection = CollectionWriter::new(&cfg, &table_dir);
        Shredder::new().shred_record(&mut tree, &mut collection, &from_json(&serde_json::json!({"a": 1}))).unwrap();
        collection.close(&tree, &cfg, "db1", "t1").unwrap();
    }

    let mut tree = SchemaTree::load(shred_tree::util::schema_path(&cfg, "db1", "t1")).unwrap();
    let existing = leaves(&tree);
    let mut collection = CollectionWriter::resume(&cfg, &table_dir, &tree, &existing).unwrap();
    assert_eq!(collection.total_records(), 1);
    Shredder::new().shred_record(&mut tree, &mut collection, &from_json(&serde_json::json!({"a": 2}))).unwrap();
    collection.close(&tree, &cfg, "db1", "t1").unwrap();

    let out = assemble_all(&cfg, &table_dir, &tree);
    assert_eq!(out, vec![serde_json::json!({"a": 1}), serde_json::json!({"a": 2})]);
}
