// Copyright (c) 2026-present, the shred-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The in-memory record tree the shredder walks: every node is one of
//! {object, array, scalar, null}, matching §4.11's input invariant. This is
//! the crate's own type, kept separate from whatever tokenizer produced it.

/// One node of an ingest-time record tree.
///
/// `from_json` is the only bridge from an external tokenizer
/// (`serde_json::Value`) into this type; nothing else in the crate depends
/// on `serde_json`'s own value representation.
#[derive(Clone, Debug, PartialEq)]
pub enum Field {
    Null,
    Bool(bool),
    /// Every JSON integer becomes `Int`, regardless of its magnitude, so a
    /// field's inferred data type does not drift between records as values
    /// happen to grow past `i32`'s range.
    Int(i64),
    /// Every JSON float becomes `Float`, for the same width-stability
    /// reason as `Int`.
    Float(f64),
    Str(String),
    Array(Vec<Field>),
    Object(Vec<(String, Field)>),
}

impl Field {
    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null)
    }

    pub fn as_object(&self) -> Option<&[(String, Field)]> {
        match self {
            Field::Object(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Field]> {
        match self {
            Field::Array(items) => Some(items),
            _ => None,
        }
    }
}

/// Converts a parsed `serde_json::Value` into this crate's own [`Field`]
/// tree. Glue, not a parser: `serde_json` already tokenized the text.
pub fn from_json(value: &serde_json::Value) -> Field {
    match value {
        serde_json::Value::Null => Field::Null,
        serde_json::Value::Bool(b) => Field::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Field::Int(i)
            } else {
                Field::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Field::Str(s.clone()),
        serde_json::Value::Array(items) => Field::Array(items.iter().map(from_json).collect()),
        serde_json::Value::Object(map) => {
            Field::Object(map.iter().map(|(k, v)| (k.clone(), from_json(v))).collect())
        }
    }
}
