//! Self-describing tensor array files.
//!
//! Each of a segment's four arrays (`indptr`, `indices`, `data`, `row_ids`)
//! is its own file: a small fixed header declaring dtype and element count,
//! followed by a raw contiguous little-endian payload. Readers memory-map
//! the payload region read-only, grounded on the header-then-mmap-payload
//! idiom used for trigram postings in the retrieval pack's mmap index
//! reader.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

/// Magic bytes identifying a Recollex tensor array file: "RXAR".
pub const ARRAY_MAGIC: [u8; 4] = *b"RXAR";

/// Current array file format version.
pub const ARRAY_FORMAT_VERSION: u32 = 1;

/// Header size in bytes: magic(4) + version(4) + dtype(1) + pad(3) + len(8).
pub const HEADER_LEN: usize = 20;

/// Element dtype stored in an array file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    /// `i64`, used for `indptr`.
    I64,
    /// `i32`, used for `indices`.
    I32,
    /// `f32`, used for `data`.
    F32,
    /// `u64`, used for `row_ids`.
    U64,
}

impl DType {
    fn tag(self) -> u8 {
        match self {
            DType::I64 => 0,
            DType::I32 => 1,
            DType::F32 => 2,
            DType::U64 => 3,
        }
    }

    fn from_tag(tag: u8) -> Result<DType, ArrayFileError> {
        match tag {
            0 => Ok(DType::I64),
            1 => Ok(DType::I32),
            2 => Ok(DType::F32),
            3 => Ok(DType::U64),
            other => Err(ArrayFileError::InvalidDType(other)),
        }
    }

    fn elem_size(self) -> usize {
        match self {
            DType::I64 | DType::U64 => 8,
            DType::I32 | DType::F32 => 4,
        }
    }
}

/// Write an `i64` array file.
pub fn write_i64_array(path: &Path, values: &[i64]) -> io::Result<()> {
    write_array(path, DType::I64, values.len(), |w| {
        for v in values {
            w.write_i64::<LittleEndian>(*v)?;
        }
        Ok(())
    })
}

/// Write an `i32` array file.
pub fn write_i32_array(path: &Path, values: &[i32]) -> io::Result<()> {
    write_array(path, DType::I32, values.len(), |w| {
        for v in values {
            w.write_i32::<LittleEndian>(*v)?;
        }
        Ok(())
    })
}

/// Write an `f32` array file.
pub fn write_f32_array(path: &Path, values: &[f32]) -> io::Result<()> {
    write_array(path, DType::F32, values.len(), |w| {
        for v in values {
            w.write_f32::<LittleEndian>(*v)?;
        }
        Ok(())
    })
}

/// Write a `u64` array file.
pub fn write_u64_array(path: &Path, values: &[u64]) -> io::Result<()> {
    write_array(path, DType::U64, values.len(), |w| {
        for v in values {
            w.write_u64::<LittleEndian>(*v)?;
        }
        Ok(())
    })
}

fn write_array(
    path: &Path,
    dtype: DType,
    len: usize,
    write_payload: impl FnOnce(&mut Vec<u8>) -> io::Result<()>,
) -> io::Result<()> {
    let mut buf = Vec::with_capacity(HEADER_LEN + len * dtype.elem_size());
    buf.extend_from_slice(&ARRAY_MAGIC);
    buf.write_u32::<LittleEndian>(ARRAY_FORMAT_VERSION)?;
    buf.push(dtype.tag());
    buf.extend_from_slice(&[0u8; 3]);
    buf.write_u64::<LittleEndian>(len as u64)?;
    write_payload(&mut buf)?;

    let mut file = File::create(path)?;
    file.write_all(&buf)?;
    file.sync_all()?;
    Ok(())
}

/// A read-only, memory-mapped tensor array file.
pub struct ArrayFile {
    mmap: Mmap,
    dtype: DType,
    len: usize,
}

impl ArrayFile {
    /// Open and validate an array file, memory-mapping its payload.
    pub fn open(path: &Path) -> Result<ArrayFile, ArrayFileError> {
        let file = File::open(path)?;
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        if mmap.len() < HEADER_LEN {
            return Err(ArrayFileError::TooShort);
        }
        if mmap[0..4] != ARRAY_MAGIC {
            return Err(ArrayFileError::InvalidMagic);
        }
        let mut cursor = &mmap[4..8];
        let version = cursor.read_u32::<LittleEndian>()?;
        if version != ARRAY_FORMAT_VERSION {
            return Err(ArrayFileError::UnsupportedVersion(version));
        }
        let dtype = DType::from_tag(mmap[8])?;
        let mut cursor = &mmap[12..20];
        let len = cursor.read_u64::<LittleEndian>()? as usize;

        let expected_payload = len * dtype.elem_size();
        if mmap.len() != HEADER_LEN + expected_payload {
            return Err(ArrayFileError::LengthMismatch {
                expected: HEADER_LEN + expected_payload,
                actual: mmap.len(),
            });
        }

        Ok(ArrayFile { mmap, dtype, len })
    }

    /// Number of elements in this array.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn payload(&self) -> &[u8] {
        &self.mmap[HEADER_LEN..]
    }

    /// View this array as `i64` elements. Panics if the file's dtype is not
    /// `I64`.
    pub fn as_i64_slice(&self) -> Vec<i64> {
        assert_eq!(self.dtype, DType::I64);
        decode_le::<8, i64>(self.payload(), self.len, |b| {
            i64::from_le_bytes(b.try_into().unwrap())
        })
    }

    /// View this array as `i32` elements. Panics if the file's dtype is not
    /// `I32`.
    pub fn as_i32_slice(&self) -> Vec<i32> {
        assert_eq!(self.dtype, DType::I32);
        decode_le::<4, i32>(self.payload(), self.len, |b| {
            i32::from_le_bytes(b.try_into().unwrap())
        })
    }

    /// View this array as `f32` elements. Panics if the file's dtype is not
    /// `F32`.
    pub fn as_f32_slice(&self) -> Vec<f32> {
        assert_eq!(self.dtype, DType::F32);
        decode_le::<4, f32>(self.payload(), self.len, |b| {
            f32::from_le_bytes(b.try_into().unwrap())
        })
    }

    /// View this array as `u64` elements. Panics if the file's dtype is not
    /// `U64`.
    pub fn as_u64_slice(&self) -> Vec<u64> {
        assert_eq!(self.dtype, DType::U64);
        decode_le::<8, u64>(self.payload(), self.len, |b| {
            u64::from_le_bytes(b.try_into().unwrap())
        })
    }
}

fn decode_le<const N: usize, T: Copy>(
    payload: &[u8],
    len: usize,
    from_bytes: impl Fn([u8; N]) -> T,
) -> Vec<T> {
    let mut out = Vec::with_capacity(len);
    for chunk in payload.chunks_exact(N) {
        let mut arr = [0u8; N];
        arr.copy_from_slice(chunk);
        out.push(from_bytes(arr));
    }
    out
}

/// Errors raised opening or validating an array file.
#[derive(Debug, thiserror::Error)]
pub enum ArrayFileError {
    /// File is shorter than the fixed header.
    #[error("array file too short")]
    TooShort,

    /// Header magic did not match.
    #[error("invalid array file magic")]
    InvalidMagic,

    /// Header declared an unsupported format version.
    #[error("unsupported array file version {0}")]
    UnsupportedVersion(u32),

    /// Header declared a dtype tag this build does not recognize.
    #[error("invalid dtype tag {0}")]
    InvalidDType(u8),

    /// Payload length did not match `len * element size`.
    #[error("array length mismatch: expected {expected} bytes, file is {actual} bytes")]
    LengthMismatch {
        /// Expected total file size.
        expected: usize,
        /// Actual total file size.
        actual: usize,
    },

    /// Underlying filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_i32_array_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("indices");
        let values = vec![1i32, 2, 3, -4, 5];
        write_i32_array(&path, &values).unwrap();

        let arr = ArrayFile::open(&path).unwrap();
        assert_eq!(arr.len(), 5);
        assert_eq!(arr.as_i32_slice(), values);
    }

    #[test]
    fn test_f32_array_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data");
        let values = vec![0.5f32, 0.7, -1.25];
        write_f32_array(&path, &values).unwrap();

        let arr = ArrayFile::open(&path).unwrap();
        assert_eq!(arr.as_f32_slice(), values);
    }

    #[test]
    fn test_i64_array_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("indptr");
        let values = vec![0i64, 2, 5, 5, 9];
        write_i64_array(&path, &values).unwrap();

        let arr = ArrayFile::open(&path).unwrap();
        assert_eq!(arr.as_i64_slice(), values);
    }

    #[test]
    fn test_u64_array_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("row_ids");
        let values = vec![10u64, 20, 30];
        write_u64_array(&path, &values).unwrap();

        let arr = ArrayFile::open(&path).unwrap();
        assert_eq!(arr.as_u64_slice(), values);
    }

    #[test]
    fn test_empty_array() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty");
        write_i32_array(&path, &[]).unwrap();

        let arr = ArrayFile::open(&path).unwrap();
        assert!(arr.is_empty());
        assert_eq!(arr.as_i32_slice(), Vec::<i32>::new());
    }

    #[test]
    fn test_invalid_magic_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad");
        std::fs::write(&path, [0u8; 32]).unwrap();
        let result = ArrayFile::open(&path);
        assert!(matches!(result, Err(ArrayFileError::InvalidMagic)));
    }

    #[test]
    fn test_too_short_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short");
        std::fs::write(&path, b"RX").unwrap();
        let result = ArrayFile::open(&path);
        assert!(matches!(result, Err(ArrayFileError::TooShort)));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("truncated");
        write_i32_array(&path, &[1, 2, 3]).unwrap();
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 2);
        std::fs::write(&path, bytes).unwrap();
        let result = ArrayFile::open(&path);
        assert!(matches!(result, Err(ArrayFileError::LengthMismatch { .. })));
    }

    #[test]
    fn test_wrong_dtype_accessor_panics() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("indices");
        write_i32_array(&path, &[1, 2, 3]).unwrap();
        let arr = ArrayFile::open(&path).unwrap();
        let result = std::panic::catch_unwind(|| arr.as_f32_slice());
        assert!(result.is_err());
    }
}
