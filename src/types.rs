// Copyright (c) 2026-present, the shred-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The closed set of primitive leaf types, their text/binary conversion
//! rules, and their null sentinels.
//!
//! There is no registration mechanism and no dynamic dispatch here: the
//! type set is fixed, so [`DataTypeId`] is a plain enum and every behaviour
//! hangs off a `match` or a `'static` table indexed by it, rather than a
//! trait-object hierarchy.

use std::cmp::Ordering;
use std::fmt;

/// Identifies one of the primitive leaf types a schema node can hold.
///
/// `Invalid` is a real variant, not an `Option` wrapper: an un-inferred or
/// corrupt schema node carries it explicitly, matching how the node's type
/// id is persisted on disk.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum DataTypeId {
    Invalid = 0,
    Boolean = 1,
    Int8 = 2,
    Int16 = 3,
    Int32 = 4,
    Int64 = 5,
    Float = 6,
    Double = 7,
    String = 8,
    Bytes = 9,
}

/// One past the last valid [`DataTypeId`], matching `s_type_max`.
pub const TYPE_MAX: u8 = 10;

/// Fixed width, in bytes, of the [`DataTypeId::Bytes`] type.
pub const BYTES_WIDTH: usize = 12;

struct TypeDesc {
    name: &'static str,
    /// Fixed slot width in bytes; `0` for the one variable-length type
    /// (`String`); never negative here (negative is reserved for
    /// `Invalid`, handled separately).
    size: i32,
}

const DESCRIPTORS: [TypeDesc; TYPE_MAX as usize] = [
    TypeDesc { name: "invalid", size: -1 },
    TypeDesc { name: "boolean", size: 1 },
    TypeDesc { name: "int8", size: 1 },
    TypeDesc { name: "int16", size: 2 },
    TypeDesc { name: "int32", size: 4 },
    TypeDesc { name: "int64", size: 8 },
    TypeDesc { name: "float", size: 4 },
    TypeDesc { name: "double", size: 8 },
    TypeDesc { name: "string", size: 0 },
    TypeDesc { name: "bytes", size: BYTES_WIDTH as i32 },
];

impl DataTypeId {
    /// Recovers a `DataTypeId` from its persisted numeric id.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Invalid),
            1 => Some(Self::Boolean),
            2 => Some(Self::Int8),
            3 => Some(Self::Int16),
            4 => Some(Self::Int32),
            5 => Some(Self::Int64),
            6 => Some(Self::Float),
            7 => Some(Self::Double),
            8 => Some(Self::String),
            9 => Some(Self::Bytes),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        DESCRIPTORS[self.id() as usize].name
    }

    /// Fixed slot width in bytes; `0` means variable-length, `-1` means
    /// the type carries no storage at all (`Invalid`).
    pub fn fixed_size(self) -> i32 {
        DESCRIPTORS[self.id() as usize].size
    }

    pub fn is_invalid(self) -> bool {
        self.fixed_size() < 0
    }

    pub fn is_fixed(self) -> bool {
        self.fixed_size() > 0
    }

    pub fn is_var(self) -> bool {
        self.fixed_size() == 0
    }

    pub fn is_primitive(self) -> bool {
        !self.is_invalid()
    }

    /// Fills `buf` (whose length must be a multiple of the type's fixed
    /// width) with this type's null sentinel. Variable-length types have
    /// no sentinel here: their nullness is carried by the value array's
    /// offset table, not by a reserved bit pattern.
    pub fn fill_null(self, buf: &mut [u8]) {
        let w = self.fixed_size().max(0) as usize;
        if w == 0 {
            return;
        }
        debug_assert_eq!(buf.len() % w, 0, "buffer not a multiple of the type width");
        for slot in buf.chunks_exact_mut(w) {
            slot.copy_from_slice(&self.null_sentinel()[..w]);
        }
    }

    /// The null sentinel for one slot of this type, left-padded into an
    /// 8-byte scratch array. Numeric types use their minimum representable
    /// value, matching the original's `TypeNumeric::s_null`; `Boolean`
    /// uses `false`.
    fn null_sentinel(self) -> [u8; 8] {
        let mut out = [0u8; 8];
        match self {
            Self::Boolean => out[0] = 0,
            Self::Int8 => out[0] = i8::MIN as u8,
            Self::Int16 => out[..2].copy_from_slice(&i16::MIN.to_le_bytes()),
            Self::Int32 => out[..4].copy_from_slice(&i32::MIN.to_le_bytes()),
            Self::Int64 => out[..8].copy_from_slice(&i64::MIN.to_le_bytes()),
            // The original sentinel is `FLT_MIN`/`DBL_MIN`: the smallest
            // positive normal value, not the most negative one.
            Self::Float => out[..4].copy_from_slice(&f32::MIN_POSITIVE.to_le_bytes()),
            Self::Double => out[..8].copy_from_slice(&f64::MIN_POSITIVE.to_le_bytes()),
            Self::String | Self::Bytes | Self::Invalid => {}
        }
        out
    }
}

impl fmt::Display for DataTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded leaf value, tagged by its [`DataTypeId`].
///
/// This is the in-memory currency passed between the shredder, the column
/// writer/reader, and the record assembler; it owns its bytes rather than
/// borrowing, since values get buffered across column and CAB boundaries.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Boolean(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    String(String),
    Bytes([u8; BYTES_WIDTH]),
}

impl Value {
    pub fn data_type(&self) -> DataTypeId {
        match self {
            Self::Boolean(_) => DataTypeId::Boolean,
            Self::Int8(_) => DataTypeId::Int8,
            Self::Int16(_) => DataTypeId::Int16,
            Self::Int32(_) => DataTypeId::Int32,
            Self::Int64(_) => DataTypeId::Int64,
            Self::Float(_) => DataTypeId::Float,
            Self::Double(_) => DataTypeId::Double,
            Self::String(_) => DataTypeId::String,
            Self::Bytes(_) => DataTypeId::Bytes,
        }
    }

    /// Encodes the value's binary form: fixed-width little-endian for
    /// numerics, a NUL-terminated byte string for `String`, 12 raw bytes
    /// for `Bytes`.
    pub fn to_binary(&self) -> Vec<u8> {
        match self {
            Self::Boolean(b) => vec![*b as u8],
            Self::Int8(v) => vec![*v as u8],
            Self::Int16(v) => v.to_le_bytes().to_vec(),
            Self::Int32(v) => v.to_le_bytes().to_vec(),
            Self::Int64(v) => v.to_le_bytes().to_vec(),
            Self::Float(v) => v.to_le_bytes().to_vec(),
            Self::Double(v) => v.to_le_bytes().to_vec(),
            Self::String(s) => {
                let mut out = Vec::with_capacity(s.len() + 1);
                out.extend_from_slice(s.as_bytes());
                out.push(0);
                out
            }
            Self::Bytes(b) => b.to_vec(),
        }
    }

    /// Decodes a binary slice of the given type into a `Value`. `bin` must
    /// be exactly the type's fixed width, or (for `String`) NUL-terminated
    /// or unterminated UTF-8.
    pub fn from_binary(dt: DataTypeId, bin: &[u8]) -> crate::error::Result<Self> {
        use crate::error::Error;
        let need = dt.fixed_size();
        if need > 0 && bin.len() != need as usize {
            return Err(Error::Corrupt(format!(
                "{} value has wrong width: expected {need}, got {}",
                dt.name(),
                bin.len()
            )));
        }
        Ok(match dt {
            DataTypeId::Invalid => {
                return Err(Error::InvalidInput("cannot decode an invalid-type value".into()))
            }
            DataTypeId::Boolean => Self::Boolean(bin[0] != 0),
            DataTypeId::Int8 => Self::Int8(bin[0] as i8),
            DataTypeId::Int16 => Self::Int16(i16::from_le_bytes(bin.try_into().unwrap())),
            DataTypeId::Int32 => Self::Int32(i32::from_le_bytes(bin.try_into().unwrap())),
            DataTypeId::Int64 => Self::Int64(i64::from_le_bytes(bin.try_into().unwrap())),
            DataTypeId::Float => Self::Float(f32::from_le_bytes(bin.try_into().unwrap())),
            DataTypeId::Double => Self::Double(f64::from_le_bytes(bin.try_into().unwrap())),
            DataTypeId::String => {
                let raw = bin.strip_suffix(&[0]).unwrap_or(bin);
                let s = std::str::from_utf8(raw)
                    .map_err(|e| Error::Corrupt(format!("string value is not utf-8: {e}")))?;
                Self::String(s.to_string())
            }
            DataTypeId::Bytes => {
                let mut b = [0u8; BYTES_WIDTH];
                b.copy_from_slice(bin);
                Self::Bytes(b)
            }
        })
    }

    /// Parses a value out of its JSON-adjacent text form. Strings are
    /// expected already unquoted (the caller strips JSON string quoting);
    /// `Bytes` is expected as lowercase hex.
    pub fn parse_text(dt: DataTypeId, txt: &str) -> crate::error::Result<Self> {
        use crate::error::Error;
        let bad = |e: std::num::ParseIntError| Error::InvalidInput(format!("{txt:?}: {e}"));
        let bad_f = |e: std::num::ParseFloatError| Error::InvalidInput(format!("{txt:?}: {e}"));
        Ok(match dt {
            DataTypeId::Invalid => {
                return Err(Error::InvalidInput("cannot parse an invalid-type value".into()))
            }
            DataTypeId::Boolean => match txt {
                "true" => Self::Boolean(true),
                "false" => Self::Boolean(false),
                _ => return Err(Error::InvalidInput(format!("not a boolean: {txt:?}"))),
            },
            DataTypeId::Int8 => Self::Int8(txt.parse().map_err(bad)?),
            DataTypeId::Int16 => Self::Int16(txt.parse().map_err(bad)?),
            DataTypeId::Int32 => Self::Int32(txt.parse().map_err(bad)?),
            DataTypeId::Int64 => Self::Int64(txt.parse().map_err(bad)?),
            DataTypeId::Float => Self::Float(txt.parse().map_err(bad_f)?),
            DataTypeId::Double => Self::Double(txt.parse().map_err(bad_f)?),
            DataTypeId::String => Self::String(txt.to_string()),
            DataTypeId::Bytes => Self::Bytes(bytes_from_hex(txt)?),
        })
    }

    /// Renders the value's text form: quoted for `String`, `true`/`false`
    /// for `Boolean`, lowercase hex for `Bytes`, `Display` for numerics.
    pub fn to_text(&self) -> String {
        match self {
            Self::Boolean(b) => if *b { "true" } else { "false" }.to_string(),
            Self::Int8(v) => v.to_string(),
            Self::Int16(v) => v.to_string(),
            Self::Int32(v) => v.to_string(),
            Self::Int64(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Double(v) => v.to_string(),
            Self::String(s) => format!("\"{s}\""),
            Self::Bytes(b) => bytes_to_hex(b),
        }
    }

    /// Matches the original's `compareIsNull`: a string is "null" if it is
    /// empty or is the literal text `null`, in addition to the ordinary
    /// Dremel null (absent def level) tracked outside this type. Only
    /// meaningful for `String`.
    pub fn is_null_text(dt: DataTypeId, txt: &str) -> bool {
        dt == DataTypeId::String && (txt.is_empty() || txt == "null")
    }

    /// Three-way comparison. `None` when comparing across differing
    /// variants (should not happen once typed through a schema node) or
    /// when a float comparison hits `NaN`.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Boolean(a), Self::Boolean(b)) => Some(a.cmp(b)),
            (Self::Int8(a), Self::Int8(b)) => Some(a.cmp(b)),
            (Self::Int16(a), Self::Int16(b)) => Some(a.cmp(b)),
            (Self::Int32(a), Self::Int32(b)) => Some(a.cmp(b)),
            (Self::Int64(a), Self::Int64(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Double(a), Self::Double(b)) => a.partial_cmp(b),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Bytes(a), Self::Bytes(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

fn bytes_to_hex(b: &[u8; BYTES_WIDTH]) -> String {
    let mut s = String::with_capacity(BYTES_WIDTH * 2);
    for byte in b {
        s.push(HEX_DIGITS[(byte >> 4) as usize] as char);
        s.push(HEX_DIGITS[(byte & 0x0f) as usize] as char);
    }
    s
}

fn from_hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

fn bytes_from_hex(txt: &str) -> crate::error::Result<[u8; BYTES_WIDTH]> {
    use crate::error::Error;
    let chars = txt.as_bytes();
    if chars.len() != BYTES_WIDTH * 2 {
        return Err(Error::InvalidInput(format!(
            "bytes value must be {} hex chars, got {}",
            BYTES_WIDTH * 2,
            chars.len()
        )));
    }
    let mut out = [0u8; BYTES_WIDTH];
    for i in 0..BYTES_WIDTH {
        let hi = from_hex_digit(chars[2 * i])
            .ok_or_else(|| Error::InvalidInput(format!("bad hex digit in {txt:?}")))?;
        let lo = from_hex_digit(chars[2 * i + 1])
            .ok_or_else(|| Error::InvalidInput(format!("bad hex digit in {txt:?}")))?;
        out[i] = (hi << 4) | lo;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_ids() {
        for id in 0..TYPE_MAX {
            let t = DataTypeId::from_id(id).unwrap();
            assert_eq!(t.id(), id);
        }
        assert!(DataTypeId::from_id(TYPE_MAX).is_none());
    }

    #[test]
    fn widths_and_categories() {
        assert!(DataTypeId::Invalid.is_invalid());
        assert!(DataTypeId::String.is_var());
        assert!(!DataTypeId::String.is_fixed());
        assert!(DataTypeId::Bytes.is_fixed());
        assert_eq!(DataTypeId::Bytes.fixed_size(), 12);
        assert_eq!(DataTypeId::Int32.fixed_size(), 4);
    }

    #[test]
    fn numeric_null_is_minimum() {
        let mut buf = [0xffu8; 4];
        DataTypeId::Int32.fill_null(&mut buf);
        assert_eq!(i32::from_le_bytes(buf), i32::MIN);
    }

    #[test]
    fn boolean_text_form_is_literal() {
        let v = Value::parse_text(DataTypeId::Boolean, "true").unwrap();
        assert_eq!(v, Value::Boolean(true));
        assert_eq!(v.to_text(), "true");
    }

    #[test]
    fn string_text_form_is_quoted() {
        let v = Value::String("hi".to_string());
        assert_eq!(v.to_text(), "\"hi\"");
    }

    #[test]
    fn string_null_text_matches_original_rule() {
        assert!(Value::is_null_text(DataTypeId::String, ""));
        assert!(Value::is_null_text(DataTypeId::String, "null"));
        assert!(!Value::is_null_text(DataTypeId::String, "hi"));
    }

    #[test]
    fn bytes_hex_round_trip() {
        let b = [0x0au8, 0xff, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x10];
        let v = Value::Bytes(b);
        let text = v.to_text();
        assert_eq!(text.len(), BYTES_WIDTH * 2);
        assert_eq!(text, "0aff01020304050607080910");
        let parsed = Value::parse_text(DataTypeId::Bytes, &text).unwrap();
        assert_eq!(parsed, v);
    }

    #[test]
    fn string_binary_is_nul_terminated() {
        let v = Value::String("ok".to_string());
        let bin = v.to_binary();
        assert_eq!(bin, b"ok\0");
        let back = Value::from_binary(DataTypeId::String, &bin).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn compare_orders_numerics() {
        assert_eq!(Value::Int32(1).compare(&Value::Int32(2)), Some(Ordering::Less));
        assert_eq!(Value::Double(1.5).compare(&Value::Double(1.5)), Some(Ordering::Equal));
    }
}
