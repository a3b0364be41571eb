// Copyright (c) 2026-present, the shred-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Turns an in-memory [`Cab`] into the bytes written to (and read back
//! from) a column's data file: serialize, optionally LZ4-compress, checksum,
//! and pad to the configured page alignment — mirroring the teacher's
//! `Block<T>::to_bytes_compressed`/`from_reader` pair (`segment/block/mod.rs`)
//! but operating on a whole CAB instead of a slice of generic items.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use xxhash_rust::xxh3::xxh3_64;

use crate::bitvec::BitVector;
use crate::cab::cab::Cab;
use crate::coding::{Decode, Encode};
use crate::error::{Error, Result};
use crate::types::DataTypeId;
use crate::util;
use crate::value_array::ValueArray;

/// Compression applied to a CAB's serialized payload before it hits disk.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Compression {
    None,
    Lz4,
}

impl Compression {
    pub fn id(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Lz4 => 1,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::None),
            1 => Some(Self::Lz4),
            _ => None,
        }
    }

    /// The engine's default: LZ4 when the feature is compiled in, otherwise
    /// uncompressed.
    pub fn default_for_build() -> Self {
        #[cfg(feature = "lz4")]
        {
            Self::Lz4
        }
        #[cfg(not(feature = "lz4"))]
        {
            Self::None
        }
    }
}

/// Where a CAB landed on disk and how big it is in each representation,
/// returned by [`CabLayouter::write`] for the caller to fold into a
/// `CabDescriptor`.
#[derive(Copy, Clone, Debug)]
pub struct LayoutResult {
    pub file_off: u64,
    pub strg_size: u32,
    pub dsk_size: u32,
    pub mem_size: u32,
    pub cmp_type_id: u8,
}

/// Stateless (de)serializer between a [`Cab`] and its on-disk byte range.
pub struct CabLayouter;

const HEADER_LEN: u64 = 8 /* checksum */ + 4 /* dsk_size */ + 4 /* mem_size */ + 1 /* cmp_type_id */;

impl CabLayouter {
    /// Serializes `cab`'s content (not rep/def/value headers — the raw
    /// logical payload), ignoring compression/padding.
    fn pack(cab: &Cab) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_u8(cab.values().data_type().id()).unwrap();
        buf.write_u32::<LittleEndian>(cab.max_rep()).unwrap();
        buf.write_u32::<LittleEndian>(cab.max_def()).unwrap();
        buf.write_u32::<LittleEndian>(cab.record_num()).unwrap();
        cab.rep_vector().encode_into(&mut buf).unwrap();
        cab.def_vector().encode_into(&mut buf).unwrap();
        encode_values(cab.values(), &mut buf).unwrap();
        buf
    }

    /// Writes `cab` to `file` at the current end-of-file offset, compressing
    /// and page-padding per `mem_align`. Returns where it landed and how big
    /// each stage was, for the descriptor.
    pub fn write<W: Write + Seek>(file: &mut W, cab: &Cab, mem_align: u32, compression: Compression) -> Result<LayoutResult> {
        let file_off = file.stream_position()?;
        let raw = Self::pack(cab);
        let mem_size = raw.len() as u32;

        let packed = match compression {
            Compression::None => raw,
            Compression::Lz4 => {
                #[cfg(feature = "lz4")]
                {
                    lz4_flex::compress_prepend_size(&raw)
                }
                #[cfg(not(feature = "lz4"))]
                {
                    return Err(Error::InvalidInput("lz4 compression requested but the lz4 feature is disabled".into()));
                }
            }
        };
        let dsk_size = packed.len() as u32;
        let checksum = xxh3_64(&packed);

        let mut header = Vec::with_capacity(HEADER_LEN as usize);
        header.write_u64::<LittleEndian>(checksum)?;
        header.write_u32::<LittleEndian>(dsk_size)?;
        header.write_u32::<LittleEndian>(mem_size)?;
        header.write_u8(compression.id())?;

        let unpadded = HEADER_LEN + dsk_size as u64;
        let padded = util::align_size(unpadded, mem_align as u64);
        let pad = (padded - unpadded) as usize;

        file.write_all(&header)?;
        file.write_all(&packed)?;
        if pad > 0 {
            file.write_all(&vec![0u8; pad])?;
        }

        Ok(LayoutResult {
            file_off,
            strg_size: padded as u32,
            dsk_size,
            mem_size,
            cmp_type_id: compression.id(),
        })
    }

    /// Reads a CAB back from `file` at `file_off`, verifying its checksum
    /// and decompressing per the stored compression id.
    pub fn read<R: Read + Seek>(file: &mut R, file_off: u64) -> Result<Cab> {
        file.seek(SeekFrom::Start(file_off))?;
        let checksum = file.read_u64::<LittleEndian>()?;
        let dsk_size = file.read_u32::<LittleEndian>()?;
        let _mem_size = file.read_u32::<LittleEndian>()?;
        let cmp_id = file.read_u8()?;
        let compression = Compression::from_id(cmp_id)
            .ok_or_else(|| Error::Corrupt(format!("unknown CAB compression id {cmp_id}")))?;

        let mut packed = vec![0u8; dsk_size as usize];
        file.read_exact(&mut packed)?;

        if xxh3_64(&packed) != checksum {
            return Err(Error::Corrupt("CAB payload failed checksum verification".into()));
        }

        let raw = match compression {
            Compression::None => packed,
            Compression::Lz4 => {
                #[cfg(feature = "lz4")]
                {
                    lz4_flex::decompress_size_prepended(&packed)
                        .map_err(|e| Error::Corrupt(format!("lz4 decompress failed: {e}")))?
                }
                #[cfg(not(feature = "lz4"))]
                {
                    return Err(Error::Corrupt("CAB was compressed with lz4 but the lz4 feature is disabled".into()));
                }
            }
        };

        let mut cur = Cursor::new(raw);
        let dt_id = cur.read_u8()?;
        let dtype = DataTypeId::from_id(dt_id).ok_or_else(|| Error::Corrupt(format!("bad CAB data type id {dt_id}")))?;
        let max_rep = cur.read_u32::<LittleEndian>()?;
        let max_def = cur.read_u32::<LittleEndian>()?;
        let record_num = cur.read_u32::<LittleEndian>()?;
        let rep = BitVector::decode_from(&mut cur)?;
        let def = BitVector::decode_from(&mut cur)?;
        let values = decode_values(dtype, &mut cur)?;

        Ok(Cab::from_parts(max_rep, max_def, rep, def, values, record_num))
    }
}

fn encode_values<W: Write>(values: &ValueArray, w: &mut W) -> Result<()> {
    match values {
        ValueArray::Fixed(f) => {
            w.write_u8(0)?;
            let bytes = f.as_bytes();
            w.write_u64::<LittleEndian>(bytes.len() as u64)?;
            w.write_all(bytes)?;
        }
        ValueArray::Variable(v) => {
            w.write_u8(1)?;
            let offsets = v.offsets();
            w.write_u64::<LittleEndian>(offsets.len() as u64)?;
            for &o in offsets {
                w.write_u32::<LittleEndian>(o)?;
            }
            let vb = v.values_bytes();
            w.write_u64::<LittleEndian>(vb.len() as u64)?;
            w.write_all(vb)?;
        }
    }
    Ok(())
}

fn decode_values<R: Read>(dtype: DataTypeId, r: &mut R) -> Result<ValueArray> {
    let kind = r.read_u8()?;
    match kind {
        0 => {
            let len = r.read_u64::<LittleEndian>()? as usize;
            let mut bytes = vec![0u8; len];
            r.read_exact(&mut bytes)?;
            Ok(ValueArray::from_fixed_parts(dtype, bytes))
        }
        1 => {
            let n = r.read_u64::<LittleEndian>()? as usize;
            let mut offsets = Vec::with_capacity(n);
            for _ in 0..n {
                offsets.push(r.read_u32::<LittleEndian>()?);
            }
            let vlen = r.read_u64::<LittleEndian>()? as usize;
            let mut values = vec![0u8; vlen];
            r.read_exact(&mut values)?;
            Ok(ValueArray::from_variable_parts(dtype, offsets, values))
        }
        _ => Err(Error::Corrupt(format!("unknown CAB value array kind {kind}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;
    use std::io::Cursor as IoCursor;

    fn sample_cab() -> Cab {
        let mut cab = Cab::new(DataTypeId::Int32, 0, 1);
        cab.write_value(0, 1, &Value::Int32(10)).unwrap();
        cab.write_null(0, 0);
        cab.write_value(0, 1, &Value::Int32(30)).unwrap();
        cab
    }

    #[test]
    fn round_trips_through_layout_uncompressed() {
        let cab = sample_cab();
        let mut file = IoCursor::new(Vec::new());
        let layout = CabLayouter::write(&mut file, &cab, 4096, Compression::None).unwrap();
        assert_eq!(layout.file_off, 0);
        assert_eq!(file.get_ref().len() as u32, layout.strg_size);
        assert_eq!(layout.strg_size % 4096, 0);

        let back = CabLayouter::read(&mut file, 0).unwrap();
        assert_eq!(back.item_num(), cab.item_num());
        assert_eq!(back.read(0).unwrap().value, Some(Value::Int32(10)));
        assert_eq!(back.read(1).unwrap().value, None);
        assert_eq!(back.read(2).unwrap().value, Some(Value::Int32(30)));
    }

    #[cfg(feature = "lz4")]
    #[test]
    fn round_trips_through_layout_compressed() {
        let cab = sample_cab();
        let mut file = IoCursor::new(Vec::new());
        let layout = CabLayouter::write(&mut file, &cab, 512, Compression::Lz4).unwrap();
        assert_eq!(layout.cmp_type_id, Compression::Lz4.id());

        let back = CabLayouter::read(&mut file, 0).unwrap();
        assert_eq!(back.record_num(), cab.record_num());
        assert_eq!(back.read(0).unwrap().value, Some(Value::Int32(10)));
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let cab = sample_cab();
        let mut file = IoCursor::new(Vec::new());
        CabLayouter::write(&mut file, &cab, 4096, Compression::None).unwrap();
        let bytes = file.get_mut();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        let mut reopened = IoCursor::new(bytes.clone());
        let err = CabLayouter::read(&mut reopened, 0).unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
    }

    #[test]
    fn multiple_cabs_append_back_to_back() {
        let cab_a = sample_cab();
        let mut cab_b = Cab::new(DataTypeId::Int32, 0, 1);
        cab_b.write_value(0, 1, &Value::Int32(99)).unwrap();

        let mut file = IoCursor::new(Vec::new());
        let layout_a = CabLayouter::write(&mut file, &cab_a, 64, Compression::None).unwrap();
        let layout_b = CabLayouter::write(&mut file, &cab_b, 64, Compression::None).unwrap();
        assert_eq!(layout_b.file_off, layout_a.strg_size as u64);

        let back_a = CabLayouter::read(&mut file, layout_a.file_off).unwrap();
        let back_b = CabLayouter::read(&mut file, layout_b.file_off).unwrap();
        assert_eq!(back_a.item_num(), cab_a.item_num());
        assert_eq!(back_b.read(0).unwrap().value, Some(Value::Int32(99)));
    }
}
