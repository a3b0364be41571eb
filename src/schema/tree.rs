// Copyright (c) 2026-present, the shred-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The schema tree: an append-only, typed multi-way tree discovered
//! on the fly as records are shredded, with a name-keyed multimap for
//! sibling lookup and an on-disk image for persistence across process
//! restarts.

use std::io::{Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rustc_hash::FxHashMap;

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::config::{TEMPLATE_KEY_NAME, TEMPLATE_VALUE_NAME};
use crate::error::{Error, Result};
use crate::schema::node::{FieldId, SchemaNode, SchemaSignature, ValueCategory, INVALID_SIGN};
use crate::schema::path::SchemaPath;
use crate::types::DataTypeId;

/// Name reserved for a schema template's root node (§3 "Schema template").
pub const TEMPLATE_ROOT_NAME: &str = crate::config::TEMPLATE_NAME;

/// The incrementally-inferred schema tree for one table.
///
/// Storage mirrors the original's split representation: a contiguous node
/// arena indexed by [`SchemaSignature`], a parallel name table, a parallel
/// valid-flag table, and a `(name, parent)` hash multimap used by
/// [`SchemaTree::find_node`] before any insert (invariant (c) in §3 is
/// enforced by the caller via that lookup, never inside `add_node` itself).
#[derive(Clone, Debug)]
pub struct SchemaTree {
    nodes: Vec<SchemaNode>,
    names: Vec<String>,
    valid: Vec<bool>,
    by_name_parent: FxHashMap<(String, SchemaSignature), Vec<SchemaSignature>>,
    next_field_id: FieldId,
}

impl SchemaTree {
    /// A fresh tree containing only the root (signature 0, empty name,
    /// single-valued object), matching invariant (f).
    pub fn new() -> Self {
        let root = SchemaNode::root();
        let mut t = Self {
            nodes: vec![root],
            names: vec![String::new()],
            valid: vec![true],
            by_name_parent: FxHashMap::default(),
            next_field_id: 1,
        };
        t.by_name_parent
            .insert((String::new(), INVALID_SIGN), vec![0]);
        t
    }

    pub fn root_signature() -> SchemaSignature {
        0
    }

    pub fn node(&self, sign: SchemaSignature) -> &SchemaNode {
        &self.nodes[sign as usize]
    }

    pub fn name(&self, sign: SchemaSignature) -> &str {
        &self.names[sign as usize]
    }

    pub fn is_valid(&self, sign: SchemaSignature) -> bool {
        self.valid[sign as usize]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// A node is repeated (§3 "Schema node") iff it is a multi-valued array
    /// or the root of a template: both mean "more than one occurrence is
    /// possible under one parent occurrence", which is what the FSM and
    /// shredder need to treat as a Dremel repetition boundary. The root
    /// itself counts as repeated in the Dremel sense (§3 "common repetition
    /// level"), even though it carries `ValueCategory::Single`.
    pub fn is_repeated(&self, sign: SchemaSignature) -> bool {
        if sign == Self::root_signature() {
            return true;
        }
        let n = self.node(sign);
        n.is_multi_array() || n.is_template()
    }

    /// Looks up any existing child of `parent` named `name`, regardless of
    /// type or category. Used where the caller has no type/category to
    /// classify against (a genuinely empty array has no element to infer a
    /// shape from) but still needs to recognise a shape already established
    /// by an earlier occurrence.
    pub fn find_any_node(&self, name: &str, parent: SchemaSignature) -> Option<SchemaSignature> {
        let key = (name.to_string(), parent);
        self.by_name_parent.get(&key)?.first().copied()
    }

    /// Looks up an existing child of `parent` named `name` whose type and
    /// category match; the shredder always calls this before `add_node`,
    /// so invariant (c) ("distinct (name, type, category) triples") is
    /// upheld by construction rather than enforced here.
    pub fn find_node(
        &self,
        name: &str,
        parent: SchemaSignature,
        dt: DataTypeId,
        category: ValueCategory,
    ) -> Option<SchemaSignature> {
        let key = (name.to_string(), parent);
        let candidates = self.by_name_parent.get(&key)?;
        candidates
            .iter()
            .copied()
            .find(|&sign| {
                let n = self.node(sign);
                n.data_type() == dt && n.category() == category
            })
    }

    /// Appends a brand-new node as a child of `parent`. Callers must have
    /// already missed on [`SchemaTree::find_node`].
    pub fn add_node(
        &mut self,
        name: &str,
        parent: SchemaSignature,
        dt: DataTypeId,
        category: ValueCategory,
    ) -> SchemaSignature {
        let index = self.nodes.len() as SchemaSignature;
        let field_id = self.next_field_id;
        self.next_field_id += 1;

        let node = {
            let parent_node = self.node(parent);
            SchemaNode::new(parent_node, index, dt, field_id, category)
        };
        self.nodes.push(node);
        self.names.push(name.to_string());
        self.valid.push(true);
        self.nodes[parent as usize].add_child(index);

        self.by_name_parent
            .entry((name.to_string(), parent))
            .or_default()
            .push(index);

        index
    }

    /// Materialises a dynamic-key map (§3 "Schema template") as three
    /// nodes: a repeated template root, a synthetic string-typed key, and
    /// a value node carrying the inferred value type/category. The key and
    /// value signatures are always `root + 1` and `root + 2`.
    pub fn add_template(
        &mut self,
        name: &str,
        parent: SchemaSignature,
        value_dt: DataTypeId,
        value_category: ValueCategory,
    ) -> (SchemaSignature, SchemaSignature, SchemaSignature) {
        let root = self.add_node(name, parent, value_dt, value_category);
        self.nodes[root as usize].set_template_flag();

        let key = self.add_node(TEMPLATE_KEY_NAME, root, DataTypeId::String, ValueCategory::Single);
        let value = self.add_node(TEMPLATE_VALUE_NAME, root, value_dt, value_category);

        debug_assert_eq!(key, root + 1);
        debug_assert_eq!(value, root + 2);
        (root, key, value)
    }

    /// Looks up the template rooted at `root`'s key/value children by the
    /// constant offsets, without another hash lookup.
    pub fn template_key_of(&self, root: SchemaSignature) -> SchemaSignature {
        root + 1
    }

    pub fn template_value_of(&self, root: SchemaSignature) -> SchemaSignature {
        root + 2
    }

    /// Walks parent pointers from `leaf` up to (but excluding) the root,
    /// returning them root-first.
    pub fn get_path(&self, leaf: SchemaSignature) -> SchemaPath {
        let mut rev = Vec::new();
        let mut cur = leaf;
        while cur != Self::root_signature() {
            rev.push(cur);
            cur = self.node(cur).parent();
        }
        rev.reverse();
        rev.into_iter().collect()
    }

    /// The largest path index whose schema node is repeated, translated to
    /// a 1-based *level* (so the root, level 0, is the answer when nothing
    /// in `path` is repeated) — matches
    /// `SchemaTree::getLowestRepeatedNodeIndex(path) + 1`.
    pub fn get_lowest_repeated_level(&self, path: &SchemaPath) -> u32 {
        for i in (0..path.len()).rev() {
            if self.is_repeated(path[i]) {
                return (i + 1) as u32;
            }
        }
        0
    }

    /// Length of the common root-first prefix of `a` and `b`, including the
    /// (implicit) root — i.e. the number of leading signatures the two
    /// paths share.
    pub fn lowest_same_level(a: &SchemaPath, b: &SchemaPath) -> u32 {
        let mut n = 0u32;
        for i in 0..a.len().min(b.len()) {
            if a[i] != b[i] {
                break;
            }
            n += 1;
        }
        n
    }

    /// The deepest level at which `a` and `b` still share a *repeated*
    /// ancestor (root counts), walking up from their lowest same level.
    pub fn common_repetition_level(&self, a: &SchemaPath, b: &SchemaPath) -> u32 {
        let mut level = Self::lowest_same_level(a, b);
        while level > 0 {
            let sign = a[(level - 1) as usize];
            if self.is_repeated(sign) {
                break;
            }
            level -= 1;
        }
        level
    }

    /// Renders the tree as an indented debug view: one line per node,
    /// `name#category#type` the way column paths are encoded on disk
    /// (§6 "Column-path encoding").
    pub fn fmt_tree(&self) -> String {
        let mut out = String::new();
        self.fmt_node(Self::root_signature(), 0, &mut out);
        out
    }

    fn fmt_node(&self, sign: SchemaSignature, depth: usize, out: &mut String) {
        let node = self.node(sign);
        if sign != Self::root_signature() {
            out.push_str(&"  ".repeat(depth));
            out.push_str(&format!(
                "{}#{}#{}\n",
                self.name(sign),
                node.category().id(),
                (b'A' + node.data_type().id()) as char
            ));
        }
        for &child in node.children() {
            self.fmt_node(child, depth + 1, out);
        }
    }

    /// Persists the schema image to `path` (§6 "Schema image format").
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = self.encode_into_vec();
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Reloads a previously-saved schema image, rebuilding the hash
    /// multimap and re-deriving each parent's child list from the decoded
    /// `parent` pointers (the original's "re-invoke addChild" step).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let mut cursor = std::io::Cursor::new(bytes);
        Ok(Self::decode_from(&mut cursor)?)
    }
}

impl Default for SchemaTree {
    fn default() -> Self {
        Self::new()
    }
}

impl Encode for SchemaTree {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        let mut body = Vec::new();
        body.write_u32::<LittleEndian>(self.nodes.len() as u32)?;
        for (i, node) in self.nodes.iter().enumerate() {
            body.write_u32::<LittleEndian>(node.index())?;
            body.write_u32::<LittleEndian>(node.field_id())?;
            body.write_u32::<LittleEndian>(node.parent())?;
            body.write_u32::<LittleEndian>(node.level())?;
            body.write_u8(node.data_type().id())?;
            body.write_u8(node.category().id())?;
            body.write_u8(node.is_template() as u8)?;
            let children = node.children();
            body.write_u32::<LittleEndian>(children.len() as u32)?;
            for &c in children {
                body.write_u32::<LittleEndian>(c)?;
            }
            debug_assert_eq!(node.index() as usize, i);
        }
        for name in &self.names {
            body.write_all(name.as_bytes())?;
            body.write_u8(0)?;
        }
        for &v in &self.valid {
            body.write_u8(v as u8)?;
        }

        writer.write_u64::<LittleEndian>(body.len() as u64)?;
        writer.write_all(&body)?;
        Ok(())
    }
}

impl Decode for SchemaTree {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let body_len = reader.read_u64::<LittleEndian>()?;
        let mut body = vec![0u8; body_len as usize];
        reader.read_exact(&mut body)?;
        let mut cur = std::io::Cursor::new(body);

        let node_count = cur.read_u32::<LittleEndian>()? as usize;
        let mut raw_nodes = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            let index = cur.read_u32::<LittleEndian>()?;
            let field_id = cur.read_u32::<LittleEndian>()?;
            let parent = cur.read_u32::<LittleEndian>()?;
            let level = cur.read_u32::<LittleEndian>()?;
            let dt_id = cur.read_u8()?;
            let cat_id = cur.read_u8()?;
            let is_template = cur.read_u8()? != 0;
            let child_count = cur.read_u32::<LittleEndian>()?;
            let mut children = Vec::with_capacity(child_count as usize);
            for _ in 0..child_count {
                children.push(cur.read_u32::<LittleEndian>()?);
            }
            raw_nodes.push((index, field_id, parent, level, dt_id, cat_id, is_template, children));
        }

        let mut names = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            let mut name = Vec::new();
            loop {
                let b = cur.read_u8()?;
                if b == 0 {
                    break;
                }
                name.push(b);
            }
            names.push(String::from_utf8(name).map_err(|_| DecodeError::Truncated("schema node name"))?);
        }

        let mut valid = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            valid.push(cur.read_u8()? != 0);
        }

        let mut nodes = Vec::with_capacity(node_count);
        let mut next_field_id = 1;
        for (index, field_id, parent, level, dt_id, cat_id, is_template, children) in raw_nodes {
            let dt = DataTypeId::from_id(dt_id)
                .ok_or(DecodeError::InvalidTag("schema node data type", dt_id as u64))?;
            let category = ValueCategory::from_id(cat_id)
                .ok_or(DecodeError::InvalidTag("schema node category", cat_id as u64))?;
            let mut node = if index == 0 {
                SchemaNode::root()
            } else {
                let parent_stub = SchemaNode::root();
                let mut n = SchemaNode::new(&parent_stub, index, dt, field_id, category);
                n
            };
            // `SchemaNode::new` derives level/parent from a borrowed parent
            // node we don't have handy during decode; patch them in
            // directly (decode re-creates the exact persisted shape, it
            // doesn't re-run inference).
            node = patch_node(node, parent, level);
            for &c in &children {
                node.add_child(c);
            }
            if is_template {
                node.set_template_flag();
            }
            next_field_id = next_field_id.max(field_id + 1);
            nodes.push(node);
        }

        let mut by_name_parent: FxHashMap<(String, SchemaSignature), Vec<SchemaSignature>> =
            FxHashMap::default();
        for (i, name) in names.iter().enumerate() {
            let parent = nodes[i].parent();
            by_name_parent
                .entry((name.clone(), parent))
                .or_default()
                .push(i as SchemaSignature);
        }

        Ok(SchemaTree { nodes, names, valid, by_name_parent, next_field_id })
    }
}

/// Overwrites the parent/level a freshly-constructed [`SchemaNode`] was
/// given (decode doesn't have the real parent node borrowed) with the
/// persisted values.
fn patch_node(mut node: SchemaNode, parent: SchemaSignature, level: u32) -> SchemaNode {
    node.set_parent_level(parent, level);
    node
}
