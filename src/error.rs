// Copyright (c) 2026-present, the shred-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{DecodeError, EncodeError};

/// Errors produced by the shredding/assembly engine.
///
/// Variants are taxonomic, not one-per-call-site: I/O failures, malformed
/// on-disk structures, schema misses, buffer exhaustion, invalid input and
/// corruption are each collapsed into one variant carrying a message.
#[derive(Debug)]
pub enum Error {
    /// Open/read/write/seek/mkdir/remove failed.
    Io(std::io::Error),

    /// A binary structure failed to serialize.
    Encode(EncodeError),

    /// A binary structure failed to deserialize (bad tag, truncated buffer).
    Decode(DecodeError),

    /// `find_node` was expected to hit and missed; indicates a corrupt or
    /// mismatched schema tree.
    SchemaMiss(String),

    /// An allocation or write request exceeded a buffer's capacity without
    /// a resize permission bit.
    BufferExhausted(String),

    /// Malformed JSON, or a declared value that could not be translated to
    /// its data type's binary form.
    InvalidInput(String),

    /// An on-disk structure failed a checksum or structural sanity check.
    Corrupt(String),

    /// A requested database, table, or column does not exist.
    NotFound(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Encode(e) => write!(f, "encode error: {e}"),
            Self::Decode(e) => write!(f, "decode error: {e}"),
            Self::SchemaMiss(m) => write!(f, "schema miss: {m}"),
            Self::BufferExhausted(m) => write!(f, "buffer exhausted: {m}"),
            Self::InvalidInput(m) => write!(f, "invalid input: {m}"),
            Self::Corrupt(m) => write!(f, "corrupt data: {m}"),
            Self::NotFound(m) => write!(f, "not found: {m}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

/// Result type threaded through the whole crate.
pub type Result<T> = std::result::Result<T, Error>;
