// Copyright (c) 2026-present, the shred-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The assembler's output value: a self-describing binary nested-record
//! layout (§3 "In-memory record"), built by [`super::record::RecordBuilder`]
//! and consumed either by [`super::render::to_json`] (test/CLI stand-in for
//! the out-of-scope record printer, §4.15) or by `encode_into`/`decode_from`
//! directly.
//!
//! `[size|values|offset_array|info]` from the spec is realised here as:
//! a leading `u32` total size (so a sibling can be skipped without
//! descending into it), a tag byte, then per-variant content ending in an
//! offset table sized 1/2/4 bytes per entry depending on how large the
//! values blob turned out to be (the "offset-width flag"). Objects prepend
//! an `id array` of schema signatures ahead of the offset table, matching
//! "objects additionally prepend an id array before the offset array";
//! template maps use an equivalent string id array since their keys are
//! runtime data, not schema signatures (§3 "Schema template" supplement,
//! see `DESIGN.md`).

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::schema::SchemaSignature;
use crate::types::{DataTypeId, Value};

const TAG_NULL: u8 = 0;
const TAG_SCALAR: u8 = 1;
const TAG_ARRAY: u8 = 2;
const TAG_OBJECT: u8 = 3;
const TAG_MAP: u8 = 4;

/// One assembled node: absent, a leaf scalar, a homogeneous/indexed array,
/// a schema-keyed object, or a template's runtime-keyed map.
#[derive(Clone, Debug, PartialEq)]
pub enum AssembledValue {
    Null,
    Scalar(Value),
    Array(Vec<AssembledValue>),
    Object(Vec<(SchemaSignature, AssembledValue)>),
    Map(Vec<(String, AssembledValue)>),
}

impl AssembledValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// Smallest byte width (1, 2, or 4) that can index `max_offset`.
fn offset_width(max_offset: usize) -> u8 {
    if max_offset <= u8::MAX as usize {
        1
    } else if max_offset <= u16::MAX as usize {
        2
    } else {
        4
    }
}

fn write_offset<W: Write>(w: &mut W, width: u8, off: u32) -> Result<(), EncodeError> {
    match width {
        1 => w.write_u8(off as u8)?,
        2 => w.write_u16::<LittleEndian>(off as u16)?,
        _ => w.write_u32::<LittleEndian>(off)?,
    }
    Ok(())
}

fn read_offset<R: Read>(r: &mut R, width: u8) -> Result<u32, DecodeError> {
    Ok(match width {
        1 => r.read_u8()? as u32,
        2 => r.read_u16::<LittleEndian>()? as u32,
        _ => r.read_u32::<LittleEndian>()?,
    })
}

impl Encode for AssembledValue {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        let mut body = Vec::new();
        match self {
            Self::Null => {
                body.write_u8(TAG_NULL)?;
            }
            Self::Scalar(v) => {
                body.write_u8(TAG_SCALAR)?;
                body.write_u8(v.data_type().id())?;
                let bin = v.to_binary();
                body.write_u32::<LittleEndian>(bin.len() as u32)?;
                body.write_all(&bin)?;
            }
            Self::Array(items) => {
                body.write_u8(TAG_ARRAY)?;
                let mut offsets = Vec::with_capacity(items.len());
                let mut values = Vec::new();
                for item in items {
                    offsets.push(values.len() as u32);
                    item.encode_into(&mut values)?;
                }
                let width = offset_width(values.len());
                body.write_all(&values)?;
                for off in &offsets {
                    write_offset(&mut body, width, *off)?;
                }
                body.write_u32::<LittleEndian>(items.len() as u32)?;
                body.write_u8(width)?;
            }
            Self::Object(fields) => {
                body.write_u8(TAG_OBJECT)?;
                let mut offsets = Vec::with_capacity(fields.len());
                let mut values = Vec::new();
                for (_, v) in fields {
                    offsets.push(values.len() as u32);
                    v.encode_into(&mut values)?;
                }
                let width = offset_width(values.len());
                body.write_all(&values)?;
                for (sign, _) in fields {
                    body.write_u32::<LittleEndian>(*sign)?;
                }
                for off in &offsets {
                    write_offset(&mut body, width, *off)?;
                }
                body.write_u32::<LittleEndian>(fields.len() as u32)?;
                body.write_u8(width)?;
            }
            Self::Map(entries) => {
                body.write_u8(TAG_MAP)?;
                let mut offsets = Vec::with_capacity(entries.len());
                let mut values = Vec::new();
                for (_, v) in entries {
                    offsets.push(values.len() as u32);
                    v.encode_into(&mut values)?;
                }
                let width = offset_width(values.len());
                body.write_all(&values)?;
                for (key, _) in entries {
                    body.write_u32::<LittleEndian>(key.len() as u32)?;
                    body.write_all(key.as_bytes())?;
                }
                for off in &offsets {
                    write_offset(&mut body, width, *off)?;
                }
                body.write_u32::<LittleEndian>(entries.len() as u32)?;
                body.write_u8(width)?;
            }
        }
        writer.write_u32::<LittleEndian>(body.len() as u32)?;
        writer.write_all(&body)?;
        Ok(())
    }
}

impl Decode for AssembledValue {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let total = reader.read_u32::<LittleEndian>()? as usize;
        let mut body = vec![0u8; total];
        reader.read_exact(&mut body)?;
        let mut cur = std::io::Cursor::new(body);

        let tag = cur.read_u8()?;
        match tag {
            TAG_NULL => Ok(Self::Null),
            TAG_SCALAR => {
                let dt_id = cur.read_u8()?;
                let dt = DataTypeId::from_id(dt_id)
                    .ok_or(DecodeError::InvalidTag("assembled scalar type", dt_id as u64))?;
                let len = cur.read_u32::<LittleEndian>()? as usize;
                let mut bin = vec![0u8; len];
                cur.read_exact(&mut bin)?;
                let value = Value::from_binary(dt, &bin)
                    .map_err(|e| DecodeError::Invalid(e.to_string()))?;
                Ok(Self::Scalar(value))
            }
            TAG_ARRAY => {
                // Count/width sit at the very end; read them first.
                let end = cur.get_ref().len();
                let width = cur.get_ref()[end - 1];
                let count = u32::from_le_bytes(cur.get_ref()[end - 5..end - 1].try_into().unwrap()) as usize;
                let offsets_start = end - 5 - count * width as usize;
                let values_end = offsets_start;

                let mut items = Vec::with_capacity(count);
                let mut offcur = std::io::Cursor::new(&cur.get_ref()[offsets_start..end - 5]);
                let mut offsets = Vec::with_capacity(count);
                for _ in 0..count {
                    offsets.push(read_offset(&mut offcur, width)? as usize);
                }
                for i in 0..count {
                    let start = 1 + offsets[i];
                    let stop = if i + 1 < count { 1 + offsets[i + 1] } else { values_end };
                    let mut slice = std::io::Cursor::new(&cur.get_ref()[start..stop]);
                    items.push(AssembledValue::decode_from(&mut slice)?);
                }
                Ok(Self::Array(items))
            }
            TAG_OBJECT => {
                let end = cur.get_ref().len();
                let width = cur.get_ref()[end - 1];
                let count = u32::from_le_bytes(cur.get_ref()[end - 5..end - 1].try_into().unwrap()) as usize;
                let offsets_start = end - 5 - count * width as usize;
                let ids_start = offsets_start - count * 4;
                let values_end = ids_start;

                let mut signs = Vec::with_capacity(count);
                for i in 0..count {
                    let off = ids_start + i * 4;
                    signs.push(u32::from_le_bytes(cur.get_ref()[off..off + 4].try_into().unwrap()));
                }
                let mut offsets = Vec::with_capacity(count);
                let mut offcur = std::io::Cursor::new(&cur.get_ref()[offsets_start..end - 5]);
                for _ in 0..count {
                    offsets.push(read_offset(&mut offcur, width)? as usize);
                }
                let mut fields = Vec::with_capacity(count);
                for i in 0..count {
                    let start = 1 + offsets[i];
                    let stop = if i + 1 < count { 1 + offsets[i + 1] } else { values_end };
                    let mut slice = std::io::Cursor::new(&cur.get_ref()[start..stop]);
                    fields.push((signs[i], AssembledValue::decode_from(&mut slice)?));
                }
                Ok(Self::Object(fields))
            }
            TAG_MAP => {
                let end = cur.get_ref().len();
                let width = cur.get_ref()[end - 1];
                let count = u32::from_le_bytes(cur.get_ref()[end - 5..end - 1].try_into().unwrap()) as usize;
                let offsets_start = end - 5 - count * width as usize;

                // Keys sit between the values blob and the offset table,
                // each `u32 len | bytes`; walk them forward since they're
                // variable-length.
                let mut offsets = Vec::with_capacity(count);
                {
                    let mut offcur = std::io::Cursor::new(&cur.get_ref()[offsets_start..end - 5]);
                    for _ in 0..count {
                        offsets.push(read_offset(&mut offcur, width)? as usize);
                    }
                }
                // Keys block ends exactly where offsets_start begins; to
                // find where it *starts* we must walk from the end of the
                // values blob, whose length is `offsets[last element]`'s
                // encoded content end, i.e. the max over decoded children.
                // Simpler: the values blob occupies [1, values_end) where
                // values_end is discovered by decoding the last element
                // with the scan below, so first locate the keys block by
                // scanning backward isn't possible for variable-length
                // keys without a count of bytes; instead re-derive
                // values_end by decoding greedily from offset 1 since
                // every child is self-length-prefixed.
                let mut values_end = 1usize;
                for _ in 0..count {
                    let child_total = u32::from_le_bytes(cur.get_ref()[values_end..values_end + 4].try_into().unwrap()) as usize;
                    values_end += 4 + child_total;
                }
                let mut pos = values_end;
                let mut keys = Vec::with_capacity(count);
                for _ in 0..count {
                    let klen = u32::from_le_bytes(cur.get_ref()[pos..pos + 4].try_into().unwrap()) as usize;
                    pos += 4;
                    let key = std::str::from_utf8(&cur.get_ref()[pos..pos + klen])
                        .map_err(|_| DecodeError::Truncated("template map key"))?
                        .to_string();
                    pos += klen;
                    keys.push(key);
                }

                let mut entries = Vec::with_capacity(count);
                for i in 0..count {
                    let start = 1 + offsets[i];
                    let stop = if i + 1 < count { 1 + offsets[i + 1] } else { values_end };
                    let mut slice = std::io::Cursor::new(&cur.get_ref()[start..stop]);
                    entries.push((keys[i].clone(), AssembledValue::decode_from(&mut slice)?));
                }
                Ok(Self::Map(entries))
            }
            other => Err(DecodeError::InvalidTag("assembled value", other as u64)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_round_trips() {
        let v = AssembledValue::Null;
        let bytes = v.encode_into_vec();
        let mut cur = std::io::Cursor::new(bytes);
        assert_eq!(AssembledValue::decode_from(&mut cur).unwrap(), v);
    }

    #[test]
    fn scalar_round_trips() {
        let v = AssembledValue::Scalar(Value::Int32(42));
        let bytes = v.encode_into_vec();
        let mut cur = std::io::Cursor::new(bytes);
        assert_eq!(AssembledValue::decode_from(&mut cur).unwrap(), v);
    }

    #[test]
    fn array_of_scalars_round_trips() {
        let v = AssembledValue::Array(vec![
            AssembledValue::Scalar(Value::Int32(1)),
            AssembledValue::Null,
            AssembledValue::Scalar(Value::Int32(3)),
        ]);
        let bytes = v.encode_into_vec();
        let mut cur = std::io::Cursor::new(bytes);
        assert_eq!(AssembledValue::decode_from(&mut cur).unwrap(), v);
    }

    #[test]
    fn object_round_trips() {
        let v = AssembledValue::Object(vec![
            (1, AssembledValue::Scalar(Value::Int32(1))),
            (2, AssembledValue::Scalar(Value::String("x".into()))),
        ]);
        let bytes = v.encode_into_vec();
        let mut cur = std::io::Cursor::new(bytes);
        assert_eq!(AssembledValue::decode_from(&mut cur).unwrap(), v);
    }

    #[test]
    fn nested_object_in_array_round_trips() {
        let v = AssembledValue::Array(vec![
            AssembledValue::Object(vec![(5, AssembledValue::Scalar(Value::Int64(1)))]),
            AssembledValue::Object(vec![(5, AssembledValue::Scalar(Value::Int64(2)))]),
        ]);
        let bytes = v.encode_into_vec();
        let mut cur = std::io::Cursor::new(bytes);
        assert_eq!(AssembledValue::decode_from(&mut cur).unwrap(), v);
    }

    #[test]
    fn map_round_trips() {
        let v = AssembledValue::Map(vec![
            ("k1".to_string(), AssembledValue::Scalar(Value::Int64(1))),
            ("k2".to_string(), AssembledValue::Scalar(Value::Int64(2))),
        ]);
        let bytes = v.encode_into_vec();
        let mut cur = std::io::Cursor::new(bytes);
        assert_eq!(AssembledValue::decode_from(&mut cur).unwrap(), v);
    }
}
