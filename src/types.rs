//! Core sample types for sigflow-rs
//!
//! Every stream in the pipeline carries samples of exactly one element type.
//! This module defines that type tag and the typed storage behind it.
//!
//! # Main Types
//!
//! - [`SampleType`] - Element type tag (bool, byte, short, int, long, float, double)
//! - [`SampleData`] - Typed, contiguous sample storage (one `Vec` per element type)
//! - [`Element`] - Trait connecting a Rust primitive to its [`SampleType`]
//!
//! # Layout
//!
//! Samples are stored interleaved: for a stream of dimension `d`, sample `i`
//! occupies elements `i * d .. (i + 1) * d`. The on-disk representation is the
//! same layout in little-endian byte order.

use crate::pipeline::error::StreamError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

/// Element type of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    /// Boolean, stored as one byte on disk
    Bool,
    /// 8-bit unsigned integer
    Byte,
    /// 16-bit signed integer
    Short,
    /// 32-bit signed integer
    Int,
    /// 64-bit signed integer
    Long,
    /// 32-bit floating point
    #[default]
    Float,
    /// 64-bit floating point
    Double,
}

impl SampleType {
    /// Size in bytes of one element
    pub fn byte_width(&self) -> usize {
        match self {
            SampleType::Bool | SampleType::Byte => 1,
            SampleType::Short => 2,
            SampleType::Int | SampleType::Float => 4,
            SampleType::Long | SampleType::Double => 8,
        }
    }

    /// Numeric tag used in persisted stream headers
    pub fn tag(&self) -> u8 {
        match self {
            SampleType::Bool => 1,
            SampleType::Byte => 2,
            SampleType::Short => 3,
            SampleType::Int => 4,
            SampleType::Long => 5,
            SampleType::Float => 6,
            SampleType::Double => 7,
        }
    }

    /// Inverse of [`SampleType::tag`]
    pub fn from_tag(tag: u8) -> Option<Self> {
        SampleType::all().iter().copied().find(|t| t.tag() == tag)
    }

    /// All supported element types
    pub fn all() -> &'static [SampleType] {
        &[
            SampleType::Bool,
            SampleType::Byte,
            SampleType::Short,
            SampleType::Int,
            SampleType::Long,
            SampleType::Float,
            SampleType::Double,
        ]
    }

    /// Lowercase name, as used in headers and options
    pub fn name(&self) -> &'static str {
        match self {
            SampleType::Bool => "bool",
            SampleType::Byte => "byte",
            SampleType::Short => "short",
            SampleType::Int => "int",
            SampleType::Long => "long",
            SampleType::Float => "float",
            SampleType::Double => "double",
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SampleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        SampleType::all()
            .iter()
            .copied()
            .find(|t| t.name() == lower)
            .ok_or_else(|| format!("unknown sample type '{}'", s))
    }
}

/// Typed sample storage. The variant always matches the stream's [`SampleType`].
#[derive(Debug, Clone, PartialEq)]
pub enum SampleData {
    Bool(Vec<bool>),
    Byte(Vec<u8>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Long(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

/// Run `$body` with `$v` bound to the inner `Vec` of whichever variant `$data` holds.
macro_rules! with_values {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            SampleData::Bool($v) => $body,
            SampleData::Byte($v) => $body,
            SampleData::Short($v) => $body,
            SampleData::Int($v) => $body,
            SampleData::Long($v) => $body,
            SampleData::Float($v) => $body,
            SampleData::Double($v) => $body,
        }
    };
}

/// Run `$body` with both sides bound when `$lhs` and `$rhs` hold the same variant.
macro_rules! with_same_variant {
    ($lhs:expr, $rhs:expr, |$a:ident, $b:ident| $body:expr) => {
        match ($lhs, $rhs) {
            (SampleData::Bool($a), SampleData::Bool($b)) => Ok($body),
            (SampleData::Byte($a), SampleData::Byte($b)) => Ok($body),
            (SampleData::Short($a), SampleData::Short($b)) => Ok($body),
            (SampleData::Int($a), SampleData::Int($b)) => Ok($body),
            (SampleData::Long($a), SampleData::Long($b)) => Ok($body),
            (SampleData::Float($a), SampleData::Float($b)) => Ok($body),
            (SampleData::Double($a), SampleData::Double($b)) => Ok($body),
            (a, b) => Err(StreamError::TypeMismatch {
                expected: a.sample_type(),
                actual: b.sample_type(),
            }),
        }
    };
}

impl SampleData {
    /// Storage for `len` elements of type `sample_type`, all zero/false
    pub fn zeroed(sample_type: SampleType, len: usize) -> Self {
        match sample_type {
            SampleType::Bool => SampleData::Bool(vec![false; len]),
            SampleType::Byte => SampleData::Byte(vec![0; len]),
            SampleType::Short => SampleData::Short(vec![0; len]),
            SampleType::Int => SampleData::Int(vec![0; len]),
            SampleType::Long => SampleData::Long(vec![0; len]),
            SampleType::Float => SampleData::Float(vec![0.0; len]),
            SampleType::Double => SampleData::Double(vec![0.0; len]),
        }
    }

    pub fn sample_type(&self) -> SampleType {
        match self {
            SampleData::Bool(_) => SampleType::Bool,
            SampleData::Byte(_) => SampleType::Byte,
            SampleData::Short(_) => SampleType::Short,
            SampleData::Int(_) => SampleType::Int,
            SampleData::Long(_) => SampleType::Long,
            SampleData::Float(_) => SampleType::Float,
            SampleData::Double(_) => SampleType::Double,
        }
    }

    /// Number of elements (not samples)
    pub fn len(&self) -> usize {
        with_values!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Grow or shrink to `len` elements, zero-filling new ones
    pub fn resize(&mut self, len: usize) {
        with_values!(self, v => v.resize(len, Default::default()))
    }

    /// Copy `n` elements from `src[src_offset..]` into `self[dst_offset..]`.
    pub fn copy_from(
        &mut self,
        dst_offset: usize,
        src: &SampleData,
        src_offset: usize,
        n: usize,
    ) -> Result<(), StreamError> {
        if dst_offset + n > self.len() {
            return Err(StreamError::OutOfRange {
                offset: dst_offset,
                len: n,
                available: self.len(),
            });
        }
        if src_offset + n > src.len() {
            return Err(StreamError::OutOfRange {
                offset: src_offset,
                len: n,
                available: src.len(),
            });
        }
        with_same_variant!(self, src, |dst, s| dst[dst_offset..dst_offset + n]
            .copy_from_slice(&s[src_offset..src_offset + n]))
    }

    /// Element `index` widened to `f64`
    pub fn get_f64(&self, index: usize) -> Option<f64> {
        with_values!(self, v => v.get(index).map(|x| x.to_f64()))
    }

    /// Overwrite element `index` with `value` narrowed to the storage type.
    /// Returns `false` if out of range.
    pub fn set_f64(&mut self, index: usize, value: f64) -> bool {
        with_values!(self, v => match v.get_mut(index) {
            Some(slot) => {
                *slot = Element::from_f64(value);
                true
            }
            None => false,
        })
    }

    /// All elements widened to `f64`
    pub fn to_f64_vec(&self) -> Vec<f64> {
        with_values!(self, v => v.iter().map(|x| x.to_f64()).collect())
    }

    /// Write all elements in little-endian byte order
    pub fn write_le<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let mut bytes = Vec::with_capacity(self.len() * self.sample_type().byte_width());
        match self {
            SampleData::Bool(v) => bytes.extend(v.iter().map(|&b| b as u8)),
            SampleData::Byte(v) => bytes.extend_from_slice(v),
            SampleData::Short(v) => v.iter().for_each(|x| bytes.extend_from_slice(&x.to_le_bytes())),
            SampleData::Int(v) => v.iter().for_each(|x| bytes.extend_from_slice(&x.to_le_bytes())),
            SampleData::Long(v) => v.iter().for_each(|x| bytes.extend_from_slice(&x.to_le_bytes())),
            SampleData::Float(v) => v.iter().for_each(|x| bytes.extend_from_slice(&x.to_le_bytes())),
            SampleData::Double(v) => v.iter().for_each(|x| bytes.extend_from_slice(&x.to_le_bytes())),
        }
        writer.write_all(&bytes)
    }

    /// Decode little-endian bytes into storage of `sample_type`
    pub fn from_le_bytes(sample_type: SampleType, bytes: &[u8]) -> Result<Self, StreamError> {
        let width = sample_type.byte_width();
        if bytes.len() % width != 0 {
            return Err(StreamError::Truncated {
                len: bytes.len(),
                width,
            });
        }
        let chunks = bytes.chunks_exact(width);
        Ok(match sample_type {
            SampleType::Bool => SampleData::Bool(bytes.iter().map(|&b| b != 0).collect()),
            SampleType::Byte => SampleData::Byte(bytes.to_vec()),
            SampleType::Short => {
                SampleData::Short(chunks.map(|c| i16::from_le_bytes([c[0], c[1]])).collect())
            }
            SampleType::Int => SampleData::Int(
                chunks
                    .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            SampleType::Long => SampleData::Long(
                chunks
                    .map(|c| i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                    .collect(),
            ),
            SampleType::Float => SampleData::Float(
                chunks
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            SampleType::Double => SampleData::Double(
                chunks
                    .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                    .collect(),
            ),
        })
    }
}

/// A primitive that can be stored in a stream
pub trait Element: Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    const TYPE: SampleType;

    fn slice(data: &SampleData) -> Option<&[Self]>;
    fn slice_mut(data: &mut SampleData) -> Option<&mut [Self]>;
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident, |$x:ident| $to:expr, |$f:ident| $from:expr) => {
        impl Element for $ty {
            const TYPE: SampleType = SampleType::$variant;

            fn slice(data: &SampleData) -> Option<&[Self]> {
                match data {
                    SampleData::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn slice_mut(data: &mut SampleData) -> Option<&mut [Self]> {
                match data {
                    SampleData::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn to_f64(self) -> f64 {
                let $x = self;
                $to
            }

            fn from_f64($f: f64) -> Self {
                $from
            }
        }
    };
}

impl_element!(bool, Bool, |x| if x { 1.0 } else { 0.0 }, |f| f != 0.0);
impl_element!(u8, Byte, |x| x as f64, |f| f as u8);
impl_element!(i16, Short, |x| x as f64, |f| f as i16);
impl_element!(i32, Int, |x| x as f64, |f| f as i32);
impl_element!(i64, Long, |x| x as f64, |f| f as i64);
impl_element!(f32, Float, |x| x as f64, |f| f as f32);
impl_element!(f64, Double, |x| x, |f| f);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_type_widths() {
        assert_eq!(SampleType::Bool.byte_width(), 1);
        assert_eq!(SampleType::Short.byte_width(), 2);
        assert_eq!(SampleType::Float.byte_width(), 4);
        assert_eq!(SampleType::Double.byte_width(), 8);
    }

    #[test]
    fn test_sample_type_tags_are_unique() {
        for t in SampleType::all() {
            assert_eq!(SampleType::from_tag(t.tag()), Some(*t));
        }
        assert_eq!(SampleType::from_tag(0), None);
    }

    #[test]
    fn test_sample_type_parse() {
        assert_eq!("Float".parse::<SampleType>(), Ok(SampleType::Float));
        assert_eq!(" short ".parse::<SampleType>(), Ok(SampleType::Short));
        assert!("complex".parse::<SampleType>().is_err());
    }

    #[test]
    fn test_copy_between_same_types() {
        let src = SampleData::Int(vec![1, 2, 3, 4]);
        let mut dst = SampleData::zeroed(SampleType::Int, 4);
        dst.copy_from(1, &src, 2, 2).unwrap();
        assert_eq!(dst, SampleData::Int(vec![0, 3, 4, 0]));
    }

    #[test]
    fn test_copy_rejects_type_mismatch() {
        let src = SampleData::Float(vec![1.0]);
        let mut dst = SampleData::zeroed(SampleType::Double, 1);
        let err = dst.copy_from(0, &src, 0, 1).unwrap_err();
        assert!(matches!(
            err,
            StreamError::TypeMismatch {
                expected: SampleType::Double,
                actual: SampleType::Float
            }
        ));
    }

    #[test]
    fn test_copy_rejects_out_of_range() {
        let src = SampleData::Byte(vec![1, 2]);
        let mut dst = SampleData::zeroed(SampleType::Byte, 2);
        assert!(dst.copy_from(1, &src, 0, 2).is_err());
        assert!(dst.copy_from(0, &src, 1, 2).is_err());
    }

    #[test]
    fn test_le_bytes_round_trip() {
        let data = SampleData::Short(vec![-2, 0, 300]);
        let mut bytes = Vec::new();
        data.write_le(&mut bytes).unwrap();
        assert_eq!(bytes.len(), 6);
        let decoded = SampleData::from_le_bytes(SampleType::Short, &bytes).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_from_le_bytes_rejects_partial_element() {
        let err = SampleData::from_le_bytes(SampleType::Int, &[0, 1, 2]).unwrap_err();
        assert!(matches!(err, StreamError::Truncated { len: 3, width: 4 }));
    }

    #[test]
    fn test_f64_access() {
        let mut data = SampleData::zeroed(SampleType::Bool, 2);
        assert!(data.set_f64(1, 1.0));
        assert!(!data.set_f64(2, 1.0));
        assert_eq!(data.get_f64(1), Some(1.0));
        assert_eq!(data.to_f64_vec(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_element_slices() {
        let mut data = SampleData::Float(vec![0.5, 1.5]);
        assert_eq!(f32::slice(&data), Some(&[0.5f32, 1.5][..]));
        assert!(f64::slice(&data).is_none());
        f32::slice_mut(&mut data).unwrap()[0] = 2.0;
        assert_eq!(data.get_f64(0), Some(2.0));
    }
}
