// Copyright (c) 2026-present, the shred-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Binary (de)serialization traits shared by the schema image, CAB
//! descriptors, and CAB payload headers.

use std::io::{Read, Write};

/// Error during serialization.
#[derive(Debug)]
pub enum EncodeError {
    /// I/O error while writing.
    Io(std::io::Error),
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EncodeError {}

impl From<std::io::Error> for EncodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Error during deserialization.
#[derive(Debug)]
pub enum DecodeError {
    /// I/O error while reading.
    Io(std::io::Error),

    /// An enum tag did not match any known variant.
    InvalidTag(&'static str, u64),

    /// The buffer ended before the structure was fully read.
    Truncated(&'static str),

    /// A decoded value failed a semantic check (not just a bad tag).
    Invalid(String),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "{e}"),
            Self::InvalidTag(what, tag) => write!(f, "invalid {what} tag: {tag}"),
            Self::Truncated(what) => write!(f, "truncated {what}"),
            Self::Invalid(m) => write!(f, "invalid data: {m}"),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<std::io::Error> for DecodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Serializes a structure into a byte stream.
pub trait Encode {
    /// Writes `self` into `writer`.
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError>;

    /// Serializes into a fresh `Vec<u8>`.
    fn encode_into_vec(&self) -> Vec<u8> {
        let mut v = Vec::new();
        // A `Vec<u8>` writer cannot fail.
        self.encode_into(&mut v).expect("encoding into a Vec cannot fail");
        v
    }
}

/// Deserializes a structure from a byte stream.
pub trait Decode: Sized {
    /// Reads `Self` out of `reader`.
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError>;
}
