// Copyright (c) 2026-present, the shred-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The typed, incrementally-inferred schema tree (C4), its root-to-leaf
//! paths (C5), and the process-level map from `(db, table)` to an owning
//! tree (§4.4 "Schema-tree map").

pub mod node;
pub mod path;
pub mod tree;
pub mod tree_map;

pub use node::{FieldId, SchemaNode, SchemaSignature, ValueCategory, INVALID_SIGN};
pub use path::{QueryPaths, SchemaPath};
pub use tree::SchemaTree;
pub use tree_map::SchemaTreeMap;
