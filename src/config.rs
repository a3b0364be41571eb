// Copyright (c) 2026-present, the shred-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Engine configuration: storage layout, CAB sizing, and parse/assemble
//! buffering knobs. Mirrors the teacher's plain-struct-plus-builder
//! `Config` rather than a generic key-value map.

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Reserved names used for the three nodes that make up a schema template
/// (§3 "Schema template").
pub const TEMPLATE_NAME: &str = "TMPLT";
pub const TEMPLATE_KEY_NAME: &str = "=KEY=";
pub const TEMPLATE_VALUE_NAME: &str = "=VAL=";

/// Engine-wide configuration.
///
/// Constructed with [`Config::new`] and tuned with the `with_*` builders,
/// or loaded from a `key = value` text file with [`Config::load_from`].
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Base directory under which every database lives.
    pub store_base: PathBuf,
    /// Per-database subdirectory holding column files.
    pub data_dir: String,
    /// Per-database subdirectory holding schema images.
    pub schema_dir: String,

    /// Memory/disk page alignment size for CAB payloads.
    pub mem_align_size: u32,
    /// Records held by one CAB before it rotates.
    pub cab_recd_num: u32,
    /// Maximum size, in bytes, of one assembled record.
    pub recd_max_len: u32,
    /// Maximum size, in bytes, of one leaf binary value.
    pub max_bin_val_len: u32,
    /// Maximum nesting depth a schema path may reach.
    pub max_nested_level: u32,
    /// Growth factor used when a buffer needs to reserve more capacity.
    pub reserve_factor: f64,

    /// Ingest-side text-item buffering: records batched per flush.
    pub text_recd_num: u32,
    /// Ingest-side text-item buffering: average expected record length.
    pub text_recd_avg_len: u32,

    /// Record capacity used to size an assembly batch's output buffer.
    pub assemble_buf_cap: u32,

    /// Sibling-count threshold for inferring a key→value template instead
    /// of per-key schema nodes. Reserved: not read by the shredder, per
    /// `spec.md` §9 Open Question (iii).
    pub template_key_threshold: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_base: PathBuf::from("/data"),
            data_dir: "cols".to_string(),
            schema_dir: "schema".to_string(),

            mem_align_size: 4096,
            cab_recd_num: 8,
            recd_max_len: 64 * 1024,
            max_bin_val_len: 1024 * 1024,
            max_nested_level: 32,
            reserve_factor: 1.618,

            text_recd_num: 16,
            text_recd_avg_len: 1024 * 1024,

            assemble_buf_cap: 64 * 1024 * 1024,

            template_key_threshold: 10,
        }
    }
}

impl Config {
    /// A fresh config rooted at `store_base`.
    pub fn new<P: AsRef<Path>>(store_base: P) -> Self {
        Self {
            store_base: store_base.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn with_data_dir(mut self, v: impl Into<String>) -> Self {
        self.data_dir = v.into();
        self
    }

    pub fn with_schema_dir(mut self, v: impl Into<String>) -> Self {
        self.schema_dir = v.into();
        self
    }

    pub fn with_cab_recd_num(mut self, v: u32) -> Self {
        self.cab_recd_num = v;
        self
    }

    pub fn with_mem_align_size(mut self, v: u32) -> Self {
        self.mem_align_size = v;
        self
    }

    /// Loads a config file and applies recognised `key = value` lines on
    /// top of `self`. Unknown keys are ignored, blank lines and lines
    /// starting with `#` are skipped.
    pub fn load_from(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let text = match std::fs::read_to_string(path.as_ref()) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(self),
            Err(e) => return Err(e.into()),
        };

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let val = val.trim();
            self.apply_option(key, val);
        }
        Ok(self)
    }

    fn apply_option(&mut self, key: &str, val: &str) {
        match key {
            "store_base" => self.store_base = PathBuf::from(val),
            "data_dir" => self.data_dir = val.to_string(),
            "schema_dir" => self.schema_dir = val.to_string(),
            "mem_align_size" => {
                if let Ok(v) = val.parse() {
                    self.mem_align_size = v;
                }
            }
            "cab_recd_num" => {
                if let Ok(v) = val.parse() {
                    self.cab_recd_num = v;
                }
            }
            "recd_max_len" => {
                if let Ok(v) = val.parse() {
                    self.recd_max_len = v;
                }
            }
            "max_bin_val_len" => {
                if let Ok(v) = val.parse() {
                    self.max_bin_val_len = v;
                }
            }
            "max_nested_level" => {
                if let Ok(v) = val.parse() {
                    self.max_nested_level = v;
                }
            }
            "assemble_buf_cap" => {
                if let Ok(v) = val.parse() {
                    self.assemble_buf_cap = v;
                }
            }
            "reserve_factor" => {
                if let Ok(v) = val.parse() {
                    self.reserve_factor = v;
                }
            }
            "text_recd_num" => {
                if let Ok(v) = val.parse() {
                    self.text_recd_num = v;
                }
            }
            "text_recd_avg_len" => {
                if let Ok(v) = val.parse() {
                    self.text_recd_avg_len = v;
                }
            }
            // unknown options are ignored, per spec §6.
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let c = Config::default();
        assert_eq!(c.mem_align_size, 4096);
        assert_eq!(c.recd_max_len, 64 * 1024);
        assert_eq!(c.max_bin_val_len, 1024 * 1024);
        assert_eq!(c.max_nested_level, 32);
        assert_eq!(c.assemble_buf_cap, 64 * 1024 * 1024);
    }

    #[test]
    fn load_ignores_unknown_keys() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let path = dir.path().join("shred.conf");
        std::fs::write(
            &path,
            "store_base = /tmp/x\nmystery_option = 42\ncab_recd_num = 99\n",
        )
        .expect("write");

        let cfg = Config::default().load_from(&path).expect("load");
        assert_eq!(cfg.store_base, PathBuf::from("/tmp/x"));
        assert_eq!(cfg.cab_recd_num, 99);
    }

    #[test]
    fn load_missing_file_is_noop() {
        let cfg = Config::default()
            .load_from("/nonexistent/shred.conf")
            .expect("missing file is fine");
        assert_eq!(cfg, Config::default());
    }
}
