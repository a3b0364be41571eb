// Copyright (c) 2026-present, the shred-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A shredding-and-assembly engine for semi-structured records.
//!
//! Nested JSON records are shredded into Dremel-style columns against a
//! schema tree inferred on the fly ([`ingest`]), stored record-aligned on
//! disk in compressed, checksummed blocks ([`cab`], [`column`]), and
//! reassembled back into nested records for an arbitrary subset of columns
//! ([`assemble`]).
//!
//! # Example
//!
//! ```
//! use shred_tree::config::Config;
//! use shred_tree::schema::SchemaTree;
//! use shred_tree::collection::CollectionWriter;
//! use shred_tree::ingest::{from_json, Shredder};
//! # fn main() -> shred_tree::Result<()> {
//! # let dir = tempfile::tempdir().unwrap();
//!
//! let cfg = Config::new(dir.path());
//! let mut tree = SchemaTree::new();
//! let mut collection = CollectionWriter::new(&cfg, dir.path().join("t1"));
//! let shredder = Shredder::new();
//!
//! let record = from_json(&serde_json::json!({"a": 1, "b": "hi"}));
//! shredder.shred_record(&mut tree, &mut collection, &record)?;
//! collection.close(&tree, &cfg, "db1", "t1")?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod error;

pub mod coding;

pub mod config;

pub mod types;

pub mod bitvec;

pub mod value_array;

pub mod util;

pub mod schema;

#[doc(hidden)]
pub mod cab;

pub mod column;

pub mod collection;

pub mod ingest;

pub mod assemble;

pub use error::{Error, Result};
pub use schema::{SchemaNode, SchemaSignature, SchemaTree, SchemaTreeMap, ValueCategory};
pub use types::{DataTypeId, Value};
