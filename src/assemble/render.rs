// Copyright (c) 2026-present, the shred-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Renders an [`AssembledValue`] back to [`serde_json::Value`]. A stand-in
//! for the original's out-of-scope record printer (§4.15): the assembler's
//! own tree already carries everything this needs, so rendering is a
//! direct recursive walk rather than another pass over column data.

use crate::schema::SchemaTree;
use crate::types::Value;

use super::value::AssembledValue;

/// Converts `value` to JSON, resolving object field names (and template
/// key/value node names, where relevant) against `tree`.
pub fn to_json(tree: &SchemaTree, value: &AssembledValue) -> serde_json::Value {
    match value {
        AssembledValue::Null => serde_json::Value::Null,
        AssembledValue::Scalar(v) => scalar_to_json(v),
        AssembledValue::Array(items) => {
            serde_json::Value::Array(items.iter().map(|v| to_json(tree, v)).collect())
        }
        AssembledValue::Object(fields) => {
            let mut obj = serde_json::Map::with_capacity(fields.len());
            for (sign, v) in fields {
                obj.insert(tree.name(*sign).to_owned(), to_json(tree, v));
            }
            serde_json::Value::Object(obj)
        }
        AssembledValue::Map(entries) => {
            let mut obj = serde_json::Map::with_capacity(entries.len());
            for (key, v) in entries {
                obj.insert(key.clone(), to_json(tree, v));
            }
            serde_json::Value::Object(obj)
        }
    }
}

fn scalar_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Int8(n) => serde_json::Value::from(*n as i64),
        Value::Int16(n) => serde_json::Value::from(*n as i64),
        Value::Int32(n) => serde_json::Value::from(*n as i64),
        Value::Int64(n) => serde_json::Value::from(*n),
        Value::Float(f) => serde_json::Number::from_f64(*f as f64)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Double(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(_) => serde_json::Value::String(value.to_text()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ValueCategory;
    use crate::types::DataTypeId;

    #[test]
    fn renders_flat_object() {
        let mut tree = SchemaTree::new();
        let root = SchemaTree::root_signature();
        let a = tree.add_node("a", root, DataTypeId::Int32, ValueCategory::Single);
        let b = tree.add_node("b", root, DataTypeId::String, ValueCategory::Single);

        let assembled = AssembledValue::Object(vec![
            (a, AssembledValue::Scalar(Value::Int32(7))),
            (b, AssembledValue::Scalar(Value::String("hi".into()))),
        ]);

        let json = to_json(&tree, &assembled);
        assert_eq!(json, serde_json::json!({"a": 7, "b": "hi"}));
    }

    #[test]
    fn renders_array_of_objects() {
        let mut tree = SchemaTree::new();
        let root = SchemaTree::root_signature();
        let x = tree.add_node("x", root, DataTypeId::Invalid, ValueCategory::Multi);
        let k = tree.add_node("k", x, DataTypeId::Int32, ValueCategory::Single);

        let assembled = AssembledValue::Object(vec![(
            x,
            AssembledValue::Array(vec![
                AssembledValue::Object(vec![(k, AssembledValue::Scalar(Value::Int32(1)))]),
                AssembledValue::Object(vec![(k, AssembledValue::Scalar(Value::Int32(2)))]),
            ]),
        )]);

        let json = to_json(&tree, &assembled);
        assert_eq!(json, serde_json::json!({"x": [{"k": 1}, {"k": 2}]}));
    }

    #[test]
    fn renders_null_and_empty_array() {
        let mut tree = SchemaTree::new();
        let root = SchemaTree::root_signature();
        let x = tree.add_node("x", root, DataTypeId::Int32, ValueCategory::Multi);

        let assembled = AssembledValue::Object(vec![(x, AssembledValue::Array(Vec::new()))]);
        let json = to_json(&tree, &assembled);
        assert_eq!(json, serde_json::json!({"x": []}));

        assert_eq!(to_json(&tree, &AssembledValue::Null), serde_json::Value::Null);
    }

    #[test]
    fn renders_map_with_runtime_keys() {
        let tree = SchemaTree::new();
        let assembled = AssembledValue::Map(vec![
            ("k1".to_string(), AssembledValue::Scalar(Value::Int32(1))),
            ("k2".to_string(), AssembledValue::Scalar(Value::Int32(2))),
        ]);
        let json = to_json(&tree, &assembled);
        assert_eq!(json, serde_json::json!({"k1": 1, "k2": 2}));
    }
}
