// Copyright (c) 2026-present, the shred-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Process-level registry from `(db, table)` to an owning [`SchemaTree`]
//! (§4.4 "Schema-tree map"). Entries are created on first access, cached
//! for the life of the map, and persisted to disk on every mutation.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::Config;
use crate::error::Result;
use crate::schema::tree::SchemaTree;

/// Owns every table's [`SchemaTree`] a process has touched, keyed by
/// `(db, table)`. Concurrent writers to different tables are safe only if
/// the caller serialises insertion into this map itself (§5), matching the
/// original's documented caveat: the map's internal structure does not
/// protect itself.
#[derive(Default)]
pub struct SchemaTreeMap {
    trees: HashMap<(String, String), SchemaTree>,
}

impl SchemaTreeMap {
    pub fn new() -> Self {
        Self { trees: HashMap::new() }
    }

    fn key(db: &str, table: &str) -> (String, String) {
        (db.to_string(), table.to_string())
    }

    /// Returns the cached tree, loading its on-disk image on a cache miss,
    /// or `Ok(None)` if neither a cached nor persisted tree exists yet.
    pub fn get_defined_tree(
        &mut self,
        cfg: &Config,
        db: &str,
        table: &str,
    ) -> Result<Option<&SchemaTree>> {
        let key = Self::key(db, table);
        if !self.trees.contains_key(&key) {
            let path = crate::util::schema_path(cfg, db, table);
            if !path.exists() {
                return Ok(None);
            }
            let tree = SchemaTree::load(&path)?;
            self.trees.insert(key.clone(), tree);
        }
        Ok(self.trees.get(&key))
    }

    /// Returns the cached tree for `(db, table)`, creating a fresh one (just
    /// the root node) if neither a cached nor persisted tree exists.
    pub fn get_or_create(&mut self, cfg: &Config, db: &str, table: &str) -> Result<&mut SchemaTree> {
        let key = Self::key(db, table);
        if !self.trees.contains_key(&key) {
            let path = crate::util::schema_path(cfg, db, table);
            let tree = if path.exists() { SchemaTree::load(&path)? } else { SchemaTree::new() };
            self.trees.insert(key.clone(), tree);
        }
        Ok(self.trees.get_mut(&key).expect("just inserted"))
    }

    /// Flushes `(db, table)`'s tree to its schema image, matching
    /// "flushed on every write that adds nodes" (§3 Lifecycles).
    pub fn flush(&self, cfg: &Config, db: &str, table: &str) -> Result<()> {
        let key = Self::key(db, table);
        if let Some(tree) = self.trees.get(&key) {
            let path = crate::util::schema_path(cfg, db, table);
            tree.save(&path)?;
        }
        Ok(())
    }

    /// Drops `(db, table)`'s tree from the cache without touching its image
    /// on disk.
    pub fn evict(&mut self, db: &str, table: &str) {
        self.trees.remove(&Self::key(db, table));
    }

    /// Frees every cached tree, matching "the owning registry frees all
    /// trees at shutdown" (§4.4).
    pub fn destroy(&mut self) {
        self.trees.clear();
    }

    /// Deletes the on-disk schema image and evicts the cached tree, used
    /// by the `drop table` CLI path.
    pub fn drop_table(&mut self, cfg: &Config, db: &str, table: &str) -> Result<()> {
        self.evict(db, table);
        let path = crate::util::schema_path(cfg, db, table);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    pub fn path_for(cfg: &Config, db: &str, table: &str) -> PathBuf {
        crate::util::schema_path(cfg, db, table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::node::ValueCategory;
    use crate::schema::tree::SchemaTree;
    use crate::types::DataTypeId;

    #[test]
    fn get_or_create_then_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::new(dir.path());
        let mut map = SchemaTreeMap::new();

        {
            let tree = map.get_or_create(&cfg, "db1", "t1").unwrap();
            tree.add_node("a", SchemaTree::root_signature(), DataTypeId::Int32, ValueCategory::Single);
        }
        map.flush(&cfg, "db1", "t1").unwrap();
        map.evict("db1", "t1");

        let reloaded = map.get_defined_tree(&cfg, "db1", "t1").unwrap().expect("should exist");
        assert_eq!(reloaded.node_count(), 2);
    }

    #[test]
    fn undefined_table_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::new(dir.path());
        let mut map = SchemaTreeMap::new();
        assert!(map.get_defined_tree(&cfg, "db1", "missing").unwrap().is_none());
    }
}
