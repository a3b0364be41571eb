// Copyright (c) 2026-present, the shred-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! CLI tool for shredding JSON records into a table and reassembling them
//! back out again.
//!
//! Grounded on `lsm-tree/src/tool.rs`'s `clap` derive subcommands and
//! `die!`-style exit codes, trimmed to this crate's lighter stack: no
//! `rustyline` interactive shell, no `tracing` (just `log`/`env_logger`).
//! Implements exactly the subcommands of the `#[6] EXTERNAL INTERFACES`
//! CLI grammar: `create db`, `drop db`, `create table`, `drop table`,
//! `parse`, `append`, `assemble`.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use shred_tree::collection::CollectionWriter;
use shred_tree::config::Config;
use shred_tree::ingest::{from_json, Field, Shredder};
use shred_tree::schema::{SchemaSignature, SchemaTree, SchemaTreeMap};
use shred_tree::{assemble, util, Error, Result};

macro_rules! die {
    ($($arg:tt)*) => {{
        log::error!($($arg)*);
        std::process::exit(1)
    }};
}

/// CLI tool for shredding and reassembling semi-structured records
#[derive(Parser, Debug)]
#[command(name = "shred")]
struct Args {
    /// Root directory under which every database lives
    #[arg(short, long, global = true, default_value = ".")]
    store_base: PathBuf,

    /// Config file to load on top of the defaults (unknown keys ignored)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a database or table
    Create {
        #[command(subcommand)]
        target: CreateTarget,
    },
    /// Drop a database or table
    Drop {
        #[command(subcommand)]
        target: DropTarget,
    },
    /// Shred a newline-delimited JSON file into a table, replacing its
    /// current contents
    Parse {
        db: String,
        table: String,
        json_path: PathBuf,
    },
    /// Shred a newline-delimited JSON file's records onto the end of an
    /// existing table
    Append {
        db: String,
        table: String,
        json_path: PathBuf,
    },
    /// Reassemble a table's records, one JSON object per line, for the
    /// given dotted column names (every leaf, if none are given)
    Assemble {
        db: String,
        table: String,
        #[arg(value_name = "COL")]
        columns: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum CreateTarget {
    Db { name: String },
    Table { db: String, table: String },
}

#[derive(Subcommand, Debug)]
enum DropTarget {
    Db { name: String },
    Table { db: String, table: String },
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let mut cfg = Config::new(&args.store_base);
    if let Some(path) = &args.config {
        cfg = match cfg.load_from(path) {
            Ok(c) => c,
            Err(e) => die!("failed to load {path:?}: {e}"),
        };
    }

    let mut tree_map = SchemaTreeMap::new();
    if let Err(e) = run(&cfg, &mut tree_map, args.command) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cfg: &Config, tree_map: &mut SchemaTreeMap, command: Command) -> Result<()> {
    match command {
        Command::Create { target: CreateTarget::Db { name } } => create_db(cfg, &name),
        Command::Create { target: CreateTarget::Table { db, table } } => create_table(cfg, tree_map, &db, &table),
        Command::Drop { target: DropTarget::Db { name } } => drop_db(cfg, &name),
        Command::Drop { target: DropTarget::Table { db, table } } => drop_table(cfg, tree_map, &db, &table),
        Command::Parse { db, table, json_path } => parse_cmd(cfg, tree_map, &db, &table, &json_path),
        Command::Append { db, table, json_path } => append_cmd(cfg, tree_map, &db, &table, &json_path),
        Command::Assemble { db, table, columns } => assemble_cmd(cfg, tree_map, &db, &table, &columns),
    }
}

fn create_db(cfg: &Config, name: &str) -> Result<()> {
    std::fs::create_dir_all(util::schema_dir(cfg, name))?;
    std::fs::create_dir_all(util::data_root_dir(cfg, name))?;
    Ok(())
}

fn drop_db(cfg: &Config, name: &str) -> Result<()> {
    remove_dir_if_present(&util::database_dir(cfg, name))
}

fn create_table(cfg: &Config, tree_map: &mut SchemaTreeMap, db: &str, table: &str) -> Result<()> {
    if !util::database_dir(cfg, db).exists() {
        die!("database {db} does not exist, run `create db {db}` first");
    }
    std::fs::create_dir_all(util::table_data_dir(cfg, db, table))?;
    tree_map.get_or_create(cfg, db, table)?;
    tree_map.flush(cfg, db, table)?;
    Ok(())
}

fn drop_table(cfg: &Config, tree_map: &mut SchemaTreeMap, db: &str, table: &str) -> Result<()> {
    tree_map.drop_table(cfg, db, table)?;
    remove_dir_if_present(&util::table_data_dir(cfg, db, table))
}

fn remove_dir_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn parse_cmd(cfg: &Config, tree_map: &mut SchemaTreeMap, db: &str, table: &str, json_path: &Path) -> Result<()> {
    let records = read_records(json_path)?;
    drop_table(cfg, tree_map, db, table)?;
    let table_dir = util::table_data_dir(cfg, db, table);
    std::fs::create_dir_all(&table_dir)?;

    let tree = tree_map.get_or_create(cfg, db, table)?;
    let mut collection = CollectionWriter::new(cfg, table_dir);
    shred_all(tree, &mut collection, &records)?;
    collection.close(tree, cfg, db, table)?;
    Ok(())
}

fn append_cmd(cfg: &Config, tree_map: &mut SchemaTreeMap, db: &str, table: &str, json_path: &Path) -> Result<()> {
    let table_dir = util::table_data_dir(cfg, db, table);
    if !table_dir.exists() {
        die!("table {db}.{table} does not exist, run `create table {db} {table}` first");
    }
    let records = read_records(json_path)?;

    let tree = tree_map.get_or_create(cfg, db, table)?;
    let existing = leaf_signatures(tree);
    let mut collection = CollectionWriter::resume(cfg, table_dir, tree, &existing)?;
    shred_all(tree, &mut collection, &records)?;
    collection.close(tree, cfg, db, table)?;
    Ok(())
}

fn shred_all(tree: &mut SchemaTree, collection: &mut CollectionWriter, records: &[Field]) -> Result<()> {
    let shredder = Shredder::new();
    for record in records {
        collection.begin_record();
        shredder.shred_record(tree, collection, record)?;
        collection.end_record();
    }
    log::info!("shredded {} record(s)", records.len());
    Ok(())
}

fn assemble_cmd(cfg: &Config, tree_map: &mut SchemaTreeMap, db: &str, table: &str, columns: &[String]) -> Result<()> {
    let table_dir = util::table_data_dir(cfg, db, table);
    let tree = match tree_map.get_defined_tree(cfg, db, table)? {
        Some(t) => t,
        None => die!("table {db}.{table} does not exist"),
    };

    let leaves = if columns.is_empty() {
        leaf_signatures(tree)
    } else {
        let mut out = Vec::new();
        for c in columns {
            let node = resolve_column(tree, c).unwrap_or_else(|| die!("no such column: {c}"));
            collect_leaves(tree, node, &mut out);
        }
        out
    };

    let readers = shred_tree::collection::open_readers(cfg, &table_dir, tree, &leaves)?;
    if readers.is_empty() {
        // Every requested column is always-absent (no column file written
        // yet); the table still has a record count to honor (§6, a table
        // may have zero columns).
        let total = shred_tree::collection::read_total_records(&table_dir)?;
        for _ in 0..total {
            println!("{{}}");
        }
        return Ok(());
    }

    let mut sources = Vec::with_capacity(readers.len());
    for (leaf, reader) in readers {
        sources.push(assemble::ColumnSource::new(tree.get_path(leaf), reader));
    }
    let mut builder = assemble::RecordBuilder::new(tree, sources);
    for recd_id in 0..builder.record_count() {
        let value = builder.assemble(recd_id)?;
        println!("{}", assemble::to_json(tree, &value));
    }
    Ok(())
}

/// Every currently-known leaf signature in `tree`.
fn leaf_signatures(tree: &SchemaTree) -> Vec<SchemaSignature> {
    (0..tree.node_count() as SchemaSignature)
        .filter(|&sign| tree.is_valid(sign) && tree.node(sign).is_leaf())
        .collect()
}

/// Expands a named column to every leaf reachable underneath it: `sign`
/// itself if it is already a leaf, otherwise every leaf descendant (e.g.
/// a container field, an indexed array's positions, or a template's key
/// and value nodes).
fn collect_leaves(tree: &SchemaTree, sign: SchemaSignature, out: &mut Vec<SchemaSignature>) {
    if tree.node(sign).is_leaf() {
        out.push(sign);
        return;
    }
    for &child in tree.node(sign).children() {
        if tree.is_valid(child) {
            collect_leaves(tree, child, out);
        }
    }
}

/// Resolves a dotted column name (e.g. `x.k`) to the leaf it names by
/// walking child names from the root; `None` if any segment is missing.
fn resolve_column(tree: &SchemaTree, dotted: &str) -> Option<SchemaSignature> {
    let mut cur = SchemaTree::root_signature();
    for part in dotted.split('.') {
        cur = tree
            .node(cur)
            .children()
            .iter()
            .copied()
            .find(|&child| tree.is_valid(child) && tree.name(child) == part)?;
    }
    Some(cur)
}

/// Reads `path` as newline-delimited JSON, one record per non-blank line.
fn read_records(path: &Path) -> Result<Vec<Field>> {
    let text = std::fs::read_to_string(path)?;
    let mut records = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(line)
            .map_err(|e| Error::InvalidInput(format!("{path:?}:{}: {e}", n + 1)))?;
        records.push(from_json(&value));
    }
    Ok(records)
}
