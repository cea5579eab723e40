//! This module contains multiple types defined by the standard,
//! plus the dialects understood by the reader and the writer.
//! Primitive integer values can be converted to these types and vice-versa.

use num_derive::FromPrimitive;
use std::fmt;
use std::str::FromStr;

/// Data type for representing a NIfTI value type in a volume.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, FromPrimitive)]
#[repr(i16)]
pub enum NiftiType {
    /// 1 bit per voxel, packed most significant bit first.
    // NIFTI_TYPE_BINARY          1
    Binary = 1,
    /// unsigned char.
    // NIFTI_TYPE_UINT8           2
    Uint8 = 2,
    /// signed short.
    // NIFTI_TYPE_INT16           4
    Int16 = 4,
    /// signed int.
    // NIFTI_TYPE_INT32           8
    Int32 = 8,
    /// 32 bit float.
    // NIFTI_TYPE_FLOAT32        16
    Float32 = 16,
    /// 64 bit complex = 2 32 bit floats.
    // NIFTI_TYPE_COMPLEX64      32
    Complex64 = 32,
    /// 64 bit float = double.
    // NIFTI_TYPE_FLOAT64        64
    Float64 = 64,
    /// 3 8 bit bytes.
    // NIFTI_TYPE_RGB24         128
    Rgb24 = 128,
    /// signed char.
    // NIFTI_TYPE_INT8          256
    Int8 = 256,
    /// unsigned short.
    // NIFTI_TYPE_UINT16        512
    Uint16 = 512,
    /// unsigned int.
    // NIFTI_TYPE_UINT32        768
    Uint32 = 768,
    /// signed long long.
    // NIFTI_TYPE_INT64        1024
    Int64 = 1024,
    /// unsigned long long.
    // NIFTI_TYPE_UINT64       1280
    Uint64 = 1280,
    /// 128 bit float = long double.
    // NIFTI_TYPE_FLOAT128     1536
    Float128 = 1536,
    /// 128 bit complex = 2 64 bit floats.
    // NIFTI_TYPE_COMPLEX128   1792
    Complex128 = 1792,
    /// 256 bit complex = 2 128 bit floats
    // NIFTI_TYPE_COMPLEX256   2048
    Complex256 = 2048,
    /// 4 8 bit bytes.
    // NIFTI_TYPE_RGBA32       2304
    Rgba32 = 2304,
}

impl NiftiType {
    /// Retrieve the number of bits of an element of this data type.
    pub fn bits(self) -> usize {
        use NiftiType::*;
        match self {
            Binary => 1,
            Int8 | Uint8 => 8,
            Int16 | Uint16 => 16,
            Rgb24 => 24,
            Int32 | Uint32 | Float32 | Rgba32 => 32,
            Int64 | Uint64 | Float64 | Complex64 => 64,
            Float128 | Complex128 => 128,
            Complex256 => 256,
        }
    }
}

/// An enum type which represents a unit type.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, FromPrimitive)]
pub enum Unit {
    /// NIFTI code for unspecified units.
    Unknown = 0,
    /* Space codes are multiples of 1. */
    /// NIFTI code for meters.
    Meter = 1,
    /// NIFTI code for millimeters.
    Mm = 2,
    /// NIFTI code for micrometers.
    Micron = 3,
    /* Time codes are multiples of 8. */
    /// NIFTI code for seconds.
    Sec = 8,
    /// NIFTI code for milliseconds.
    Msec = 16,
    /// NIFTI code for microseconds.
    Usec = 24,
    /* These units are for spectral data: */
    /// NIFTI code for Hertz.
    Hz = 32,
    /// NIFTI code for ppm.
    Ppm = 40,
    /// NIFTI code for radians per second.
    Rads = 48,
}

impl Unit {
    /// Factor turning a length in this unit into millimeters.
    /// Anything that is not a space unit is taken as millimeters.
    pub fn to_mm(self) -> f64 {
        match self {
            Unit::Meter => 1e3,
            Unit::Micron => 1e-3,
            _ => 1.,
        }
    }

    /// Factor turning a duration in this unit into milliseconds.
    /// Unknown and non-time units are taken as milliseconds.
    pub fn to_ms(self) -> f64 {
        match self {
            Unit::Sec => 1e3,
            Unit::Usec => 1e-3,
            _ => 1.,
        }
    }
}

/// An enum type for representing a NIFTI XForm.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, FromPrimitive)]
pub enum XForm {
    /// Arbitrary coordinates (Method 1).
    Unknown = 0,
    /// Scanner-based anatomical coordinates
    ScannerAnat = 1,
    /// Coordinates aligned to another file's,
    /// or to anatomical "truth".
    AlignedAnat = 2,
    /// Coordinates aligned to Talairach-Tournoux
    /// Atlas; (0,0,0)=AC, etc.
    Talairach = 3,
    /// MNI 152 normalized coordinates.
    Mni152 = 4,
}

/// An enum type for representing the slice order.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, FromPrimitive)]
pub enum SliceOrder {
    /// NIFTI_SLICE_UNKNOWN
    Unknown = 0,
    /// NIFTI_SLICE_SEQ_INC
    SeqInc = 1,
    /// NIFTI_SLICE_SEQ_DEC
    SeqDec = 2,
    /// NIFTI_SLICE_ALT_INC
    AltInc = 3,
    /// NIFTI_SLICE_ALT_DEC
    AltDec = 4,
    /// NIFTI_SLICE_ALT_INC2
    AltInc2 = 5,
    /// NIFTI_SLICE_ALT_DEC2
    AltDec2 = 6,
}

impl SliceOrder {
    /// Whether slices are acquired in an interleaved fashion.
    pub fn is_interleaved(self) -> bool {
        matches!(
            self,
            SliceOrder::AltInc | SliceOrder::AltDec | SliceOrder::AltInc2 | SliceOrder::AltDec2
        )
    }
}

/// Tool-specific variants of the format's conventions.
///
/// Dialects only change how volumes are written (flips and type
/// fallbacks), and how a few ambiguous layouts are interpreted on load.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Dialect {
    /// Plain NIfTI-1.
    None,
    /// Conventions expected by FSL.
    Fsl,
    /// Conventions expected by SPM.
    Spm,
}

impl Default for Dialect {
    fn default() -> Self {
        Dialect::None
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dialect::None => "",
            Dialect::Fsl => "fsl",
            Dialect::Spm => "spm",
        })
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Dialect::None),
            "fsl" => Ok(Dialect::Fsl),
            "spm" => Ok(Dialect::Spm),
            other => Err(format!("unknown dialect `{}` (known are: fsl, spm)", other)),
        }
    }
}
