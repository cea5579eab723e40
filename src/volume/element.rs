//! This module defines the voxel element API: the closed set of scalar
//! kinds a volume can hold, the data container over those kinds, and the
//! value scaling applied when converting between them.
use crate::error::{NiftiError, Result};
use byteordered::{ByteOrdered, Endianness};
use num_complex::{Complex32, Complex64};
use rgb::{ComponentMap, RGB8};
use std::io::Write;
use std::ops::Range;

/// Kind of a single voxel element.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum ScalarKind {
    /// One bit (boolean) per voxel
    Bit,
    /// `u8`
    U8,
    /// `i8`
    I8,
    /// `u16`
    U16,
    /// `i16`
    I16,
    /// `u32`
    U32,
    /// `i32`
    I32,
    /// `u64`
    U64,
    /// `i64`
    I64,
    /// `f32`
    F32,
    /// `f64`
    F64,
    /// Complex number made of two `f32`
    Complex64,
    /// Complex number made of two `f64`
    Complex128,
    /// 8-bit RGB color
    Rgb24,
    /// 3-vector of `f32`
    Vector3F32,
}

impl ScalarKind {
    /// Number of bits of one element.
    pub fn bits(self) -> usize {
        use ScalarKind::*;
        match self {
            Bit => 1,
            U8 | I8 => 8,
            U16 | I16 => 16,
            Rgb24 => 24,
            U32 | I32 | F32 => 32,
            U64 | I64 | F64 | Complex64 => 64,
            Vector3F32 => 96,
            Complex128 => 128,
        }
    }

    /// Number of bytes needed for `count` elements of this kind, or `None`
    /// if it overflows `usize`.
    pub fn bytes_for(self, count: usize) -> Option<usize> {
        let bits = count.checked_mul(self.bits())?.checked_add(7)?;
        Some(bits / 8)
    }

    /// Whether this kind is a floating point scalar or is made of them.
    pub fn is_float(self) -> bool {
        use ScalarKind::*;
        matches!(self, F32 | F64 | Complex64 | Complex128 | Vector3F32)
    }

    /// Whether this is a complex number kind.
    pub fn is_complex(self) -> bool {
        matches!(self, ScalarKind::Complex64 | ScalarKind::Complex128)
    }

    /// Whether this kind has several channels per voxel.
    pub fn is_multichannel(self) -> bool {
        matches!(self, ScalarKind::Rgb24 | ScalarKind::Vector3F32)
    }

    /// Representable range of integer kinds. `None` for everything else.
    pub fn value_range(self) -> Option<(f64, f64)> {
        use ScalarKind::*;
        Some(match self {
            Bit => (0., 1.),
            U8 => (0., u8::MAX as f64),
            I8 => (i8::MIN as f64, i8::MAX as f64),
            U16 => (0., u16::MAX as f64),
            I16 => (i16::MIN as f64, i16::MAX as f64),
            U32 => (0., u32::MAX as f64),
            I32 => (i32::MIN as f64, i32::MAX as f64),
            U64 => (0., u64::MAX as f64),
            I64 => (i64::MIN as f64, i64::MAX as f64),
            _ => return None,
        })
    }
}

/// Linear value mapping `dst = src * slope + intercept`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalingPair {
    /// Multiplicative factor
    pub slope: f64,
    /// Additive term
    pub intercept: f64,
}

impl Default for ScalingPair {
    fn default() -> Self {
        ScalingPair::IDENTITY
    }
}

impl ScalingPair {
    /// The mapping which leaves values untouched.
    pub const IDENTITY: ScalingPair = ScalingPair {
        slope: 1.,
        intercept: 0.,
    };

    /// Create a new scaling pair.
    pub fn new(slope: f64, intercept: f64) -> Self {
        ScalingPair { slope, intercept }
    }

    /// Map a single value.
    pub fn apply(&self, value: f64) -> f64 {
        value * self.slope + self.intercept
    }

    /// Whether this is the identity mapping.
    pub fn is_identity(&self) -> bool {
        self.slope == 1. && self.intercept == 0.
    }

    /// The mapping undoing this one. A zero slope is treated as 1.
    pub fn inverse(&self) -> ScalingPair {
        let slope = if self.slope == 0. { 1. } else { self.slope };
        ScalingPair::new(1. / slope, -self.intercept / slope)
    }

    /// The mapping applying `self` first, then `next`.
    pub fn then(&self, next: ScalingPair) -> ScalingPair {
        ScalingPair::new(
            self.slope * next.slope,
            self.intercept * next.slope + next.intercept,
        )
    }
}

/// Voxel values of a volume, in Fortran order (row index fastest).
#[derive(Debug, Clone, PartialEq)]
pub enum VoxelData {
    /// Bit values
    Bit(Vec<bool>),
    /// `u8` values
    U8(Vec<u8>),
    /// `i8` values
    I8(Vec<i8>),
    /// `u16` values
    U16(Vec<u16>),
    /// `i16` values
    I16(Vec<i16>),
    /// `u32` values
    U32(Vec<u32>),
    /// `i32` values
    I32(Vec<i32>),
    /// `u64` values
    U64(Vec<u64>),
    /// `i64` values
    I64(Vec<i64>),
    /// `f32` values
    F32(Vec<f32>),
    /// `f64` values
    F64(Vec<f64>),
    /// single precision complex values
    Complex64(Vec<Complex32>),
    /// double precision complex values
    Complex128(Vec<Complex64>),
    /// RGB colors
    Rgb24(Vec<RGB8>),
    /// 3-vectors
    Vector3F32(Vec<[f32; 3]>),
}

/// Evaluate an expression on the inner vector, whatever its type.
macro_rules! on_data {
    ($data: expr, $v: ident => $body: expr) => {
        match $data {
            VoxelData::Bit($v) => $body,
            VoxelData::U8($v) => $body,
            VoxelData::I8($v) => $body,
            VoxelData::U16($v) => $body,
            VoxelData::I16($v) => $body,
            VoxelData::U32($v) => $body,
            VoxelData::I32($v) => $body,
            VoxelData::U64($v) => $body,
            VoxelData::I64($v) => $body,
            VoxelData::F32($v) => $body,
            VoxelData::F64($v) => $body,
            VoxelData::Complex64($v) => $body,
            VoxelData::Complex128($v) => $body,
            VoxelData::Rgb24($v) => $body,
            VoxelData::Vector3F32($v) => $body,
        }
    };
}

/// Build new data of the same kind out of the inner vector.
macro_rules! map_data {
    ($data: expr, $v: ident => $body: expr) => {
        match $data {
            VoxelData::Bit($v) => VoxelData::Bit($body),
            VoxelData::U8($v) => VoxelData::U8($body),
            VoxelData::I8($v) => VoxelData::I8($body),
            VoxelData::U16($v) => VoxelData::U16($body),
            VoxelData::I16($v) => VoxelData::I16($body),
            VoxelData::U32($v) => VoxelData::U32($body),
            VoxelData::I32($v) => VoxelData::I32($body),
            VoxelData::U64($v) => VoxelData::U64($body),
            VoxelData::I64($v) => VoxelData::I64($body),
            VoxelData::F32($v) => VoxelData::F32($body),
            VoxelData::F64($v) => VoxelData::F64($body),
            VoxelData::Complex64($v) => VoxelData::Complex64($body),
            VoxelData::Complex128($v) => VoxelData::Complex128($body),
            VoxelData::Rgb24($v) => VoxelData::Rgb24($body),
            VoxelData::Vector3F32($v) => VoxelData::Vector3F32($body),
        }
    };
}

impl VoxelData {
    /// The kind of the elements.
    pub fn kind(&self) -> ScalarKind {
        match self {
            VoxelData::Bit(_) => ScalarKind::Bit,
            VoxelData::U8(_) => ScalarKind::U8,
            VoxelData::I8(_) => ScalarKind::I8,
            VoxelData::U16(_) => ScalarKind::U16,
            VoxelData::I16(_) => ScalarKind::I16,
            VoxelData::U32(_) => ScalarKind::U32,
            VoxelData::I32(_) => ScalarKind::I32,
            VoxelData::U64(_) => ScalarKind::U64,
            VoxelData::I64(_) => ScalarKind::I64,
            VoxelData::F32(_) => ScalarKind::F32,
            VoxelData::F64(_) => ScalarKind::F64,
            VoxelData::Complex64(_) => ScalarKind::Complex64,
            VoxelData::Complex128(_) => ScalarKind::Complex128,
            VoxelData::Rgb24(_) => ScalarKind::Rgb24,
            VoxelData::Vector3F32(_) => ScalarKind::Vector3F32,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        on_data!(self, v => v.len())
    }

    /// Whether there are no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy out a contiguous range of elements.
    pub fn block(&self, range: Range<usize>) -> VoxelData {
        map_data!(self, v => v[range.clone()].to_vec())
    }

    /// Copy out the elements at the given indices, in that order.
    pub fn gather(&self, indices: &[usize]) -> VoxelData {
        map_data!(self, v => indices.iter().map(|&i| v[i]).collect())
    }

    /// All values as `f64`, for real scalar kinds (bits included).
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        macro_rules! cast {
            ($v: expr) => {
                Some($v.iter().map(|&x| x as f64).collect())
            };
        }
        match self {
            VoxelData::Bit(v) => Some(v.iter().map(|&b| if b { 1. } else { 0. }).collect()),
            VoxelData::U8(v) => cast!(v),
            VoxelData::I8(v) => cast!(v),
            VoxelData::U16(v) => cast!(v),
            VoxelData::I16(v) => cast!(v),
            VoxelData::U32(v) => cast!(v),
            VoxelData::I32(v) => cast!(v),
            VoxelData::U64(v) => cast!(v),
            VoxelData::I64(v) => cast!(v),
            VoxelData::F32(v) => cast!(v),
            VoxelData::F64(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// Smallest and largest value, ignoring NaN. Vector fields consider all
    /// of their components. `None` for empty data, complex numbers
    /// and colors.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        let fold = |acc: Option<(f64, f64)>, x: f64| {
            if x.is_nan() {
                return acc;
            }
            Some(match acc {
                None => (x, x),
                Some((lo, hi)) => (lo.min(x), hi.max(x)),
            })
        };
        match self {
            VoxelData::Vector3F32(v) => v
                .iter()
                .flat_map(|c| c.iter())
                .map(|&x| x as f64)
                .fold(None, fold),
            _ => self.to_f64_vec()?.into_iter().fold(None, fold),
        }
    }

    /// The scaling which brings every value of this data into the range of
    /// `target`. Floating point targets, non-scalar data and data that
    /// already fits get the identity.
    pub fn scaling_to(&self, target: ScalarKind) -> ScalingPair {
        let (tmin, tmax) = match target.value_range() {
            Some(range) => range,
            None => return ScalingPair::IDENTITY,
        };
        if self.kind().is_complex() || self.kind().is_multichannel() {
            return ScalingPair::IDENTITY;
        }
        let (min, max) = match self.min_max() {
            Some(m) => m,
            None => return ScalingPair::IDENTITY,
        };
        if min >= tmin && max <= tmax {
            return ScalingPair::IDENTITY;
        }
        if max == min {
            return ScalingPair::new(1., tmin - min);
        }
        let slope = (tmax - tmin) / (max - min);
        ScalingPair::new(slope, tmin - min * slope)
    }

    /// Convert to another kind, mapping every value through `scaling`.
    /// Integer targets round and saturate.
    pub fn convert(&self, target: ScalarKind, scaling: ScalingPair) -> Result<VoxelData> {
        if self.kind() == target && scaling.is_identity() {
            return Ok(self.clone());
        }
        if let Some(values) = self.to_f64_vec() {
            return from_f64_iter(target, values.into_iter().map(|v| scaling.apply(v)));
        }
        let unsupported = || NiftiError::UnsupportedVoxelKind(target);
        let s = scaling;
        match (self, target) {
            (VoxelData::Complex64(v), ScalarKind::Complex64) => Ok(VoxelData::Complex64(
                v.iter()
                    .map(|c| Complex32::new(s.apply(c.re as f64) as f32, (c.im as f64 * s.slope) as f32))
                    .collect(),
            )),
            (VoxelData::Complex64(v), ScalarKind::Complex128) => Ok(VoxelData::Complex128(
                v.iter()
                    .map(|c| Complex64::new(s.apply(c.re as f64), c.im as f64 * s.slope))
                    .collect(),
            )),
            (VoxelData::Complex128(v), ScalarKind::Complex64) => Ok(VoxelData::Complex64(
                v.iter()
                    .map(|c| Complex32::new(s.apply(c.re) as f32, (c.im * s.slope) as f32))
                    .collect(),
            )),
            (VoxelData::Complex128(v), ScalarKind::Complex128) => Ok(VoxelData::Complex128(
                v.iter()
                    .map(|c| Complex64::new(s.apply(c.re), c.im * s.slope))
                    .collect(),
            )),
            (VoxelData::Rgb24(v), ScalarKind::Rgb24) => Ok(VoxelData::Rgb24(
                v.iter()
                    .map(|c| c.map(|x| s.apply(x as f64).round() as u8))
                    .collect(),
            )),
            (VoxelData::Rgb24(v), ScalarKind::Vector3F32) => Ok(VoxelData::Vector3F32(
                v.iter()
                    .map(|c| [c.r, c.g, c.b].map(|x| s.apply(x as f64) as f32))
                    .collect(),
            )),
            (VoxelData::Vector3F32(v), ScalarKind::Vector3F32) => Ok(VoxelData::Vector3F32(
                v.iter()
                    .map(|c| c.map(|x| s.apply(x as f64) as f32))
                    .collect(),
            )),
            (VoxelData::Vector3F32(v), ScalarKind::Rgb24) => Ok(VoxelData::Rgb24(
                v.iter()
                    .map(|c| {
                        let [r, g, b] = c.map(|x| s.apply(x as f64).round() as u8);
                        RGB8::new(r, g, b)
                    })
                    .collect(),
            )),
            _ => Err(unsupported()),
        }
    }

    /// Apply a scaling pair to every value, promoting to `f64`. Only real
    /// scalar data can be rescaled.
    pub fn rescaled(&self, scaling: ScalingPair) -> Option<VoxelData> {
        let values = self.to_f64_vec()?;
        Some(VoxelData::F64(
            values.into_iter().map(|v| scaling.apply(v)).collect(),
        ))
    }

    /// Decode `count` elements of the given kind from raw bytes. Bits are
    /// unpacked most significant bit first.
    pub fn from_bytes(
        kind: ScalarKind,
        bytes: &[u8],
        count: usize,
        endianness: Endianness,
    ) -> Result<VoxelData> {
        let expected = kind
            .bytes_for(count)
            .ok_or(NiftiError::IncompatibleLength(bytes.len(), usize::MAX))?;
        if bytes.len() < expected {
            return Err(NiftiError::IncompatibleLength(bytes.len(), expected));
        }
        let bytes = &bytes[..expected];
        let mut src = ByteOrdered::runtime(bytes, endianness);

        macro_rules! read_all {
            ($variant: ident, $read: ident) => {{
                let mut v = Vec::with_capacity(count);
                for _ in 0..count {
                    v.push(src.$read()?);
                }
                VoxelData::$variant(v)
            }};
        }

        Ok(match kind {
            ScalarKind::Bit => VoxelData::Bit(unpack_bits(bytes, count)),
            ScalarKind::U8 => VoxelData::U8(bytes.to_vec()),
            ScalarKind::I8 => VoxelData::I8(bytemuck::cast_slice(bytes).to_vec()),
            ScalarKind::U16 => read_all!(U16, read_u16),
            ScalarKind::I16 => read_all!(I16, read_i16),
            ScalarKind::U32 => read_all!(U32, read_u32),
            ScalarKind::I32 => read_all!(I32, read_i32),
            ScalarKind::U64 => read_all!(U64, read_u64),
            ScalarKind::I64 => read_all!(I64, read_i64),
            ScalarKind::F32 => read_all!(F32, read_f32),
            ScalarKind::F64 => read_all!(F64, read_f64),
            ScalarKind::Complex64 => {
                let mut v = Vec::with_capacity(count);
                for _ in 0..count {
                    let re = src.read_f32()?;
                    let im = src.read_f32()?;
                    v.push(Complex32::new(re, im));
                }
                VoxelData::Complex64(v)
            }
            ScalarKind::Complex128 => {
                let mut v = Vec::with_capacity(count);
                for _ in 0..count {
                    let re = src.read_f64()?;
                    let im = src.read_f64()?;
                    v.push(Complex64::new(re, im));
                }
                VoxelData::Complex128(v)
            }
            ScalarKind::Rgb24 => VoxelData::Rgb24(
                bytes
                    .chunks_exact(3)
                    .map(|c| RGB8::new(c[0], c[1], c[2]))
                    .collect(),
            ),
            ScalarKind::Vector3F32 => {
                let mut v = Vec::with_capacity(count);
                for _ in 0..count {
                    v.push([src.read_f32()?, src.read_f32()?, src.read_f32()?]);
                }
                VoxelData::Vector3F32(v)
            }
        })
    }

    /// Encode every element with the given byte order. Bits are written
    /// one byte each; use [`pack_bits_into`] for packed output.
    ///
    /// [`pack_bits_into`]: ./fn.pack_bits_into.html
    pub fn write_to<W: Write>(&self, writer: W, endianness: Endianness) -> Result<()> {
        let mut out = ByteOrdered::runtime(writer, endianness);

        macro_rules! write_each {
            ($v: expr, $write: ident) => {
                for &x in $v {
                    out.$write(x)?;
                }
            };
        }

        match self {
            VoxelData::Bit(v) => {
                for &b in v {
                    out.write_u8(b as u8)?;
                }
            }
            VoxelData::U8(v) => out.write_all(v)?,
            VoxelData::I8(v) => out.write_all(bytemuck::cast_slice(v))?,
            VoxelData::U16(v) => write_each!(v, write_u16),
            VoxelData::I16(v) => write_each!(v, write_i16),
            VoxelData::U32(v) => write_each!(v, write_u32),
            VoxelData::I32(v) => write_each!(v, write_i32),
            VoxelData::U64(v) => write_each!(v, write_u64),
            VoxelData::I64(v) => write_each!(v, write_i64),
            VoxelData::F32(v) => write_each!(v, write_f32),
            VoxelData::F64(v) => write_each!(v, write_f64),
            VoxelData::Complex64(v) if endianness == Endianness::native() => {
                out.write_all(bytemuck::cast_slice(v))?
            }
            VoxelData::Complex128(v) if endianness == Endianness::native() => {
                out.write_all(bytemuck::cast_slice(v))?
            }
            VoxelData::Complex64(v) => {
                for c in v {
                    out.write_f32(c.re)?;
                    out.write_f32(c.im)?;
                }
            }
            VoxelData::Complex128(v) => {
                for c in v {
                    out.write_f64(c.re)?;
                    out.write_f64(c.im)?;
                }
            }
            VoxelData::Rgb24(v) => {
                for c in v {
                    out.write_all(&[c.r, c.g, c.b])?;
                }
            }
            VoxelData::Vector3F32(v) => {
                for c in v {
                    for &x in c {
                        out.write_f32(x)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn from_f64_iter<I>(target: ScalarKind, values: I) -> Result<VoxelData>
where
    I: Iterator<Item = f64>,
{
    // `as` saturates and maps NaN to zero
    macro_rules! int {
        ($variant: ident, $t: ty) => {
            VoxelData::$variant(values.map(|v| v.round() as $t).collect())
        };
    }
    Ok(match target {
        ScalarKind::Bit => VoxelData::Bit(values.map(|v| v != 0.).collect()),
        ScalarKind::U8 => int!(U8, u8),
        ScalarKind::I8 => int!(I8, i8),
        ScalarKind::U16 => int!(U16, u16),
        ScalarKind::I16 => int!(I16, i16),
        ScalarKind::U32 => int!(U32, u32),
        ScalarKind::I32 => int!(I32, i32),
        ScalarKind::U64 => int!(U64, u64),
        ScalarKind::I64 => int!(I64, i64),
        ScalarKind::F32 => VoxelData::F32(values.map(|v| v as f32).collect()),
        ScalarKind::F64 => VoxelData::F64(values.collect()),
        ScalarKind::Complex64 => {
            VoxelData::Complex64(values.map(|v| Complex32::new(v as f32, 0.)).collect())
        }
        ScalarKind::Complex128 => {
            VoxelData::Complex128(values.map(|v| Complex64::new(v, 0.)).collect())
        }
        ScalarKind::Rgb24 | ScalarKind::Vector3F32 => {
            return Err(NiftiError::UnsupportedVoxelKind(target))
        }
    })
}

/// Unpack `count` bits, most significant bit of each byte first.
pub fn unpack_bits(bytes: &[u8], count: usize) -> Vec<bool> {
    (0..count)
        .map(|i| bytes[i / 8] & (0x80 >> (i % 8)) != 0)
        .collect()
}

/// Store `bits` into `buf` starting at absolute bit index `bit_offset`,
/// most significant bit of each byte first. Bits not covered are left
/// untouched.
pub fn pack_bits_into(buf: &mut [u8], bit_offset: usize, bits: &[bool]) {
    for (i, &b) in bits.iter().enumerate() {
        let pos = bit_offset + i;
        let mask = 0x80 >> (pos % 8);
        if b {
            buf[pos / 8] |= mask;
        } else {
            buf[pos / 8] &= !mask;
        }
    }
}

/// Trait type for characterizing a voxel element: a Rust type with a
/// one to one correspondence to a [`ScalarKind`].
///
/// [`ScalarKind`]: ./enum.ScalarKind.html
pub trait DataElement: 'static + Sized + Copy {
    /// The kind mapped to this type
    const KIND: ScalarKind;

    /// Wrap a vector of elements.
    fn into_data(values: Vec<Self>) -> VoxelData;

    /// Unwrap a vector of elements, giving the data back if it holds
    /// another kind.
    fn from_data(data: VoxelData) -> std::result::Result<Vec<Self>, VoxelData>;

    /// Borrow the elements, if the data holds this kind.
    fn as_slice(data: &VoxelData) -> Option<&[Self]>;

    /// Build an element out of a real value. Integers round and saturate,
    /// multi-component types replicate the value.
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_data_element {
    ($t: ty, $variant: ident, |$x: ident| $cast: expr) => {
        impl DataElement for $t {
            const KIND: ScalarKind = ScalarKind::$variant;

            fn into_data(values: Vec<Self>) -> VoxelData {
                VoxelData::$variant(values)
            }

            fn from_data(data: VoxelData) -> std::result::Result<Vec<Self>, VoxelData> {
                match data {
                    VoxelData::$variant(v) => Ok(v),
                    other => Err(other),
                }
            }

            fn as_slice(data: &VoxelData) -> Option<&[Self]> {
                match data {
                    VoxelData::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn from_f64($x: f64) -> Self {
                $cast
            }
        }
    };
}

impl_data_element!(bool, Bit, |v| v != 0.);
impl_data_element!(u8, U8, |v| v.round() as u8);
impl_data_element!(i8, I8, |v| v.round() as i8);
impl_data_element!(u16, U16, |v| v.round() as u16);
impl_data_element!(i16, I16, |v| v.round() as i16);
impl_data_element!(u32, U32, |v| v.round() as u32);
impl_data_element!(i32, I32, |v| v.round() as i32);
impl_data_element!(u64, U64, |v| v.round() as u64);
impl_data_element!(i64, I64, |v| v.round() as i64);
impl_data_element!(f32, F32, |v| v as f32);
impl_data_element!(f64, F64, |v| v);
impl_data_element!(Complex32, Complex64, |v| Complex32::new(v as f32, 0.));
impl_data_element!(Complex64, Complex128, |v| Complex64::new(v, 0.));
impl_data_element!(RGB8, Rgb24, |v| {
    let c = v.round() as u8;
    RGB8::new(c, c, c)
});
impl_data_element!([f32; 3], Vector3F32, |v| [v as f32; 3]);
