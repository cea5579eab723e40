//! This module defines the `NiftiHeader` struct, which is used
//! to provide important information about NIFTI-1 volumes,
//! together with the field table describing its on-disk layout.
//!
//! The header is never overlaid on the raw bytes. Instead, the 348 bytes are
//! copied into an owned buffer, byte-swapped in place (if needed) by walking
//! [`HEADER_FIELDS`], and only then parsed into a `NiftiHeader`.
//!
//! [`HEADER_FIELDS`]: ./constant.HEADER_FIELDS.html

use crate::error::{NiftiError, Result};
use crate::typedef::*;
use crate::util::trim_nul;
use byteordered::{ByteOrdered, Endianness};
use log::warn;
use num_traits::FromPrimitive;
use std::convert::TryInto;
use std::io::{Read, Write};

/// Size of a NIfTI-1 header, in bytes.
pub const HEADER_SIZE: usize = 348;
/// Smallest valid voxel offset in a single-file NIfTI-1 (header plus extender).
pub const MIN_VOX_OFFSET: usize = 352;
/// Magic code for NIFTI-1 header files (extention ".hdr[.gz]").
pub const MAGIC_CODE_NI1: &[u8; 4] = b"ni1\0";
/// Magic code for full NIFTI-1 files (extention ".nii[.gz]").
pub const MAGIC_CODE_NIP1: &[u8; 4] = b"n+1\0";

/// Primitive kind of a header field element.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum FieldKind {
    /// Raw characters, never swapped.
    Bytes,
    /// 8-bit integer, never swapped.
    Int8,
    /// 16-bit signed integer.
    Int16,
    /// 32-bit signed integer.
    Int32,
    /// 32-bit IEEE float.
    Float32,
}

impl FieldKind {
    /// Width of one element, in bytes.
    pub fn width(self) -> usize {
        match self {
            FieldKind::Bytes | FieldKind::Int8 => 1,
            FieldKind::Int16 => 2,
            FieldKind::Int32 | FieldKind::Float32 => 4,
        }
    }
}

/// Location and shape of one field in the raw header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct HeaderField {
    /// Field name, as in `nifti1.h`.
    pub name: &'static str,
    /// Byte offset from the start of the header.
    pub offset: usize,
    /// Element kind.
    pub kind: FieldKind,
    /// Number of elements (1 for scalars).
    pub count: usize,
}

impl HeaderField {
    const fn new(name: &'static str, offset: usize, kind: FieldKind, count: usize) -> Self {
        HeaderField {
            name,
            offset,
            kind,
            count,
        }
    }

    /// Total size of the field, in bytes.
    pub fn size(&self) -> usize {
        self.kind.width() * self.count
    }

    /// Reverse the bytes of every element of this field inside `buf`.
    pub fn swap_in(&self, buf: &mut [u8]) {
        let width = self.kind.width();
        if width < 2 {
            return;
        }
        for element in buf[self.offset..self.offset + self.size()].chunks_exact_mut(width) {
            element.reverse();
        }
    }
}

/// Layout of the NIfTI-1 header.
#[rustfmt::skip]
pub const HEADER_FIELDS: [HeaderField; 44] = [
    HeaderField::new("sizeof_hdr",       0, FieldKind::Int32,   1),
    HeaderField::new("data_type",        4, FieldKind::Bytes,   10),
    HeaderField::new("db_name",         14, FieldKind::Bytes,   18),
    HeaderField::new("extents",         32, FieldKind::Int32,   1),
    HeaderField::new("session_error",   36, FieldKind::Int16,   1),
    HeaderField::new("regular",         38, FieldKind::Int8,    1),
    HeaderField::new("dim_info",        39, FieldKind::Int8,    1),
    HeaderField::new("dim",             40, FieldKind::Int16,   8),
    HeaderField::new("intent_p1",       56, FieldKind::Float32, 1),
    HeaderField::new("intent_p2",       60, FieldKind::Float32, 1),
    HeaderField::new("intent_p3",       64, FieldKind::Float32, 1),
    HeaderField::new("intent_code",     68, FieldKind::Int16,   1),
    HeaderField::new("datatype",        70, FieldKind::Int16,   1),
    HeaderField::new("bitpix",          72, FieldKind::Int16,   1),
    HeaderField::new("slice_start",     74, FieldKind::Int16,   1),
    HeaderField::new("pixdim",          76, FieldKind::Float32, 8),
    HeaderField::new("vox_offset",     108, FieldKind::Float32, 1),
    HeaderField::new("scl_slope",      112, FieldKind::Float32, 1),
    HeaderField::new("scl_inter",      116, FieldKind::Float32, 1),
    HeaderField::new("slice_end",      120, FieldKind::Int16,   1),
    HeaderField::new("slice_code",     122, FieldKind::Int8,    1),
    HeaderField::new("xyzt_units",     123, FieldKind::Int8,    1),
    HeaderField::new("cal_max",        124, FieldKind::Float32, 1),
    HeaderField::new("cal_min",        128, FieldKind::Float32, 1),
    HeaderField::new("slice_duration", 132, FieldKind::Float32, 1),
    HeaderField::new("toffset",        136, FieldKind::Float32, 1),
    HeaderField::new("glmax",          140, FieldKind::Int32,   1),
    HeaderField::new("glmin",          144, FieldKind::Int32,   1),
    HeaderField::new("descrip",        148, FieldKind::Bytes,   80),
    HeaderField::new("aux_file",       228, FieldKind::Bytes,   24),
    HeaderField::new("qform_code",     252, FieldKind::Int16,   1),
    HeaderField::new("sform_code",     254, FieldKind::Int16,   1),
    HeaderField::new("quatern_b",      256, FieldKind::Float32, 1),
    HeaderField::new("quatern_c",      260, FieldKind::Float32, 1),
    HeaderField::new("quatern_d",      264, FieldKind::Float32, 1),
    HeaderField::new("qoffset_x",      268, FieldKind::Float32, 1),
    HeaderField::new("qoffset_y",      272, FieldKind::Float32, 1),
    HeaderField::new("qoffset_z",      276, FieldKind::Float32, 1),
    HeaderField::new("srow_x",         280, FieldKind::Float32, 4),
    HeaderField::new("srow_y",         296, FieldKind::Float32, 4),
    HeaderField::new("srow_z",         312, FieldKind::Float32, 4),
    HeaderField::new("intent_name",    328, FieldKind::Bytes,   16),
    HeaderField::new("magic",          344, FieldKind::Bytes,   4),
    HeaderField::new("extender",       348, FieldKind::Bytes,   0),
];

/// Look up a header field by name.
pub fn header_field(name: &str) -> Option<&'static HeaderField> {
    HEADER_FIELDS.iter().find(|f| f.name == name)
}

/// Detect whether the raw header in `buf` was written with the opposite
/// byte order and, if so, byte-swap every multi-byte field in place.
///
/// The decision is made on `sizeof_hdr` alone: if it reads as 348 only
/// after swapping, the whole header is swapped. Returns whether a swap
/// took place. Applying this function twice restores the original bytes.
pub fn detect_and_swap_endian(buf: &mut [u8]) -> bool {
    if buf.len() < HEADER_SIZE {
        return false;
    }
    let sizeof_hdr = i32::from_ne_bytes(buf[0..4].try_into().unwrap_or([0; 4]));
    if sizeof_hdr.swap_bytes() != HEADER_SIZE as i32 {
        return false;
    }
    for field in HEADER_FIELDS.iter() {
        field.swap_in(buf);
    }
    true
}

/// The NIFTI-1 header data type.
/// All fields are public and named as in `nifti1.h`.
///
/// # Examples
///
/// ```
/// use nifti_sa::NiftiHeader;
/// # use nifti_sa::Result;
///
/// # fn run() -> Result<()> {
/// let mut hdr = NiftiHeader::default();
/// hdr.cal_max = 128.;
/// let bytes = hdr.to_bytes()?;
/// assert_eq!(bytes.len(), 348);
/// # Ok(())
/// # }
/// # run().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct NiftiHeader {
    /// Header size, must be 348
    pub sizeof_hdr: i32,
    /// Unused in NIFTI-1
    pub data_type: [u8; 10],
    /// Unused in NIFTI-1
    pub db_name: [u8; 18],
    /// Unused in NIFTI-1
    pub extents: i32,
    /// Unused in NIFTI-1
    pub session_error: i16,
    /// Unused in NIFTI-1
    pub regular: u8,
    /// MRI slice ordering
    pub dim_info: u8,
    /// Data array dimensions
    pub dim: [i16; 8],
    /// 1st intent parameter
    pub intent_p1: f32,
    /// 2nd intent parameter
    pub intent_p2: f32,
    /// 3rd intent parameter
    pub intent_p3: f32,
    /// NIFTI_INTENT_* code
    pub intent_code: i16,
    /// Defines the data type!
    pub datatype: i16,
    /// Number of bits per voxel
    pub bitpix: i16,
    /// First slice index
    pub slice_start: i16,
    /// Grid spacings
    pub pixdim: [f32; 8],
    /// Offset into .nii file to reach the volume
    pub vox_offset: f32,
    /// Data scaling: slope
    pub scl_slope: f32,
    /// Data scaling: offset
    pub scl_inter: f32,
    /// Last slice index
    pub slice_end: i16,
    /// Slice timing order
    pub slice_code: u8,
    /// Units of pixdim[1..4]
    pub xyzt_units: u8,
    /// Max display intensity
    pub cal_max: f32,
    /// Min display intensity
    pub cal_min: f32,
    /// Time for 1 slice
    pub slice_duration: f32,
    /// Time axis shift
    pub toffset: f32,
    /// Unused in NIFTI-1
    pub glmax: i32,
    /// Unused in NIFTI-1
    pub glmin: i32,

    /// Any text you like
    pub descrip: [u8; 80],
    /// Auxiliary filename
    pub aux_file: [u8; 24],
    /// NIFTI_XFORM_* code
    pub qform_code: i16,
    /// NIFTI_XFORM_* code
    pub sform_code: i16,
    /// Quaternion b param
    pub quatern_b: f32,
    /// Quaternion c param
    pub quatern_c: f32,
    /// Quaternion d param
    pub quatern_d: f32,
    /// Quaternion x shift
    pub qoffset_x: f32,
    /// Quaternion y shift
    pub qoffset_y: f32,
    /// Quaternion z shift
    pub qoffset_z: f32,

    /// 1st row affine transform
    pub srow_x: [f32; 4],
    /// 2nd row affine transform
    pub srow_y: [f32; 4],
    /// 3rd row affine transform
    pub srow_z: [f32; 4],

    /// 'name' or meaning of data
    pub intent_name: [u8; 16],

    /// Magic code. Must be `b"ni1\0"` or `b"n+1\0"`
    pub magic: [u8; 4],

    /// Byte order the header (and its voxels) were stored with
    pub endianness: Endianness,
}

impl Default for NiftiHeader {
    fn default() -> NiftiHeader {
        NiftiHeader {
            sizeof_hdr: HEADER_SIZE as i32,
            dim: [1, 1, 1, 1, 1, 1, 1, 1],
            pixdim: [1.; 8],
            vox_offset: MIN_VOX_OFFSET as f32,
            scl_slope: 1.,
            magic: *MAGIC_CODE_NIP1,
            ..NiftiHeader::zeroed()
        }
    }
}

impl NiftiHeader {
    /// A header with every field set to zero, in this system's byte order.
    /// This is the starting point of every header built for writing.
    pub fn zeroed() -> NiftiHeader {
        NiftiHeader {
            sizeof_hdr: 0,
            data_type: [0; 10],
            db_name: [0; 18],
            extents: 0,
            session_error: 0,
            regular: 0,
            dim_info: 0,
            dim: [0; 8],
            intent_p1: 0.,
            intent_p2: 0.,
            intent_p3: 0.,
            intent_code: 0,
            datatype: 0,
            bitpix: 0,
            slice_start: 0,
            pixdim: [0.; 8],
            vox_offset: 0.,
            scl_slope: 0.,
            scl_inter: 0.,
            slice_end: 0,
            slice_code: 0,
            xyzt_units: 0,
            cal_max: 0.,
            cal_min: 0.,
            slice_duration: 0.,
            toffset: 0.,
            glmax: 0,
            glmin: 0,
            descrip: [0; 80],
            aux_file: [0; 24],
            qform_code: 0,
            sform_code: 0,
            quatern_b: 0.,
            quatern_c: 0.,
            quatern_d: 0.,
            qoffset_x: 0.,
            qoffset_y: 0.,
            qoffset_z: 0.,
            srow_x: [0.; 4],
            srow_y: [0.; 4],
            srow_z: [0.; 4],
            intent_name: [0; 16],
            magic: [0; 4],
            endianness: Endianness::native(),
        }
    }

    /// Parse a header from the first 348 bytes of `raw`, reading every
    /// field with the given byte order. No validation is made other than
    /// a warning on an unknown magic code.
    pub fn from_raw(raw: &[u8], endianness: Endianness) -> Result<NiftiHeader> {
        if raw.len() < HEADER_SIZE {
            return Err(NiftiError::TruncatedHeader(raw.len()));
        }
        let mut input = ByteOrdered::runtime(&raw[..HEADER_SIZE], endianness);
        let mut h = NiftiHeader::zeroed();
        h.endianness = endianness;

        h.sizeof_hdr = input.read_i32()?;
        input.read_exact(&mut h.data_type)?;
        input.read_exact(&mut h.db_name)?;
        h.extents = input.read_i32()?;
        h.session_error = input.read_i16()?;
        h.regular = input.read_u8()?;
        h.dim_info = input.read_u8()?;
        for v in &mut h.dim {
            *v = input.read_i16()?;
        }
        h.intent_p1 = input.read_f32()?;
        h.intent_p2 = input.read_f32()?;
        h.intent_p3 = input.read_f32()?;
        h.intent_code = input.read_i16()?;
        h.datatype = input.read_i16()?;
        h.bitpix = input.read_i16()?;
        h.slice_start = input.read_i16()?;
        for v in &mut h.pixdim {
            *v = input.read_f32()?;
        }
        h.vox_offset = input.read_f32()?;
        h.scl_slope = input.read_f32()?;
        h.scl_inter = input.read_f32()?;
        h.slice_end = input.read_i16()?;
        h.slice_code = input.read_u8()?;
        h.xyzt_units = input.read_u8()?;
        h.cal_max = input.read_f32()?;
        h.cal_min = input.read_f32()?;
        h.slice_duration = input.read_f32()?;
        h.toffset = input.read_f32()?;
        h.glmax = input.read_i32()?;
        h.glmin = input.read_i32()?;

        input.read_exact(&mut h.descrip)?;
        input.read_exact(&mut h.aux_file)?;
        h.qform_code = input.read_i16()?;
        h.sform_code = input.read_i16()?;
        h.quatern_b = input.read_f32()?;
        h.quatern_c = input.read_f32()?;
        h.quatern_d = input.read_f32()?;
        h.qoffset_x = input.read_f32()?;
        h.qoffset_y = input.read_f32()?;
        h.qoffset_z = input.read_f32()?;
        for v in &mut h.srow_x {
            *v = input.read_f32()?;
        }
        for v in &mut h.srow_y {
            *v = input.read_f32()?;
        }
        for v in &mut h.srow_z {
            *v = input.read_f32()?;
        }
        input.read_exact(&mut h.intent_name)?;
        input.read_exact(&mut h.magic)?;

        if &h.magic != MAGIC_CODE_NI1 && &h.magic != MAGIC_CODE_NIP1 {
            warn!("unknown magic code {:?}, reading the file as n+1 anyway", h.magic);
        }
        Ok(h)
    }

    /// Serialize the header with its own byte order.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut out = ByteOrdered::runtime(writer, self.endianness);
        out.write_i32(self.sizeof_hdr)?;
        out.write_all(&self.data_type)?;
        out.write_all(&self.db_name)?;
        out.write_i32(self.extents)?;
        out.write_i16(self.session_error)?;
        out.write_u8(self.regular)?;
        out.write_u8(self.dim_info)?;
        for s in &self.dim {
            out.write_i16(*s)?;
        }
        out.write_f32(self.intent_p1)?;
        out.write_f32(self.intent_p2)?;
        out.write_f32(self.intent_p3)?;
        out.write_i16(self.intent_code)?;
        out.write_i16(self.datatype)?;
        out.write_i16(self.bitpix)?;
        out.write_i16(self.slice_start)?;
        for f in &self.pixdim {
            out.write_f32(*f)?;
        }
        out.write_f32(self.vox_offset)?;
        out.write_f32(self.scl_slope)?;
        out.write_f32(self.scl_inter)?;
        out.write_i16(self.slice_end)?;
        out.write_u8(self.slice_code)?;
        out.write_u8(self.xyzt_units)?;
        out.write_f32(self.cal_max)?;
        out.write_f32(self.cal_min)?;
        out.write_f32(self.slice_duration)?;
        out.write_f32(self.toffset)?;
        out.write_i32(self.glmax)?;
        out.write_i32(self.glmin)?;

        out.write_all(&self.descrip)?;
        out.write_all(&self.aux_file)?;
        out.write_i16(self.qform_code)?;
        out.write_i16(self.sform_code)?;
        for f in &[
            self.quatern_b,
            self.quatern_c,
            self.quatern_d,
            self.qoffset_x,
            self.qoffset_y,
            self.qoffset_z,
        ] {
            out.write_f32(*f)?;
        }
        for f in self.srow_x.iter().chain(&self.srow_y).chain(&self.srow_z) {
            out.write_f32(*f)?;
        }
        out.write_all(&self.intent_name)?;
        out.write_all(&self.magic)?;
        Ok(())
    }

    /// Serialize the header into a new 348 byte buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        self.write_to(&mut buf)?;
        debug_assert_eq!(buf.len(), HEADER_SIZE);
        Ok(buf)
    }

    /// Fix the structural problems a reader can recover from, warning
    /// about each of them.
    ///
    /// Returns the names of the repaired fields.
    pub fn validate_and_repair(&mut self) -> Vec<&'static str> {
        let mut repaired = Vec::new();

        if self.sizeof_hdr < HEADER_SIZE as i32 {
            warn!("sizeof_hdr of the file ({}) is invalid, assuming 348", self.sizeof_hdr);
            self.sizeof_hdr = HEADER_SIZE as i32;
            repaired.push("sizeof_hdr");
        }

        // also catches NaN
        if !(self.vox_offset >= MIN_VOX_OFFSET as f32) {
            warn!("vox_offset of the file ({}) is invalid, assuming 352", self.vox_offset);
            self.vox_offset = MIN_VOX_OFFSET as f32;
            repaired.push("vox_offset");
        }

        if self.slice_duration < 0. {
            warn!("ignoring invalid slice duration ({})", self.slice_duration);
            self.slice_duration = 0.;
            repaired.push("slice_duration");
        }

        let mut relevant = 1;
        for i in 1..5 {
            if self.dim[i] <= 0 {
                warn!("Resetting invalid dim[{}] ({}) to 1", i, self.dim[i]);
                self.dim[i] = 1;
                if !repaired.contains(&"dim") {
                    repaired.push("dim");
                }
            }
            if self.dim[i] > 1 {
                relevant = i as i16;
            }
        }
        if self.dim[5..].iter().any(|&d| d > 1) {
            warn!(
                "dimensions beyond the 4th ({:?}) are not supported and will be ignored",
                &self.dim[5..]
            );
        }
        if relevant != self.dim[0] {
            warn!(
                "dim[0]=={} doesn't fit the image, assuming {}",
                self.dim[0], relevant
            );
            self.dim[0] = relevant;
            repaired.push("dim[0]");
        }

        repaired
    }

    /// The four leading dimensions (`dim[1..=4]`) as a size vector.
    /// Non-positive entries count as 1.
    pub fn size(&self) -> [usize; 4] {
        let mut size = [1; 4];
        for (s, &d) in size.iter_mut().zip(&self.dim[1..5]) {
            *s = if d > 0 { d as usize } else { 1 };
        }
        size
    }

    /// Get the data type as a validated enum.
    pub fn data_type(&self) -> Result<NiftiType> {
        FromPrimitive::from_i16(self.datatype)
            .ok_or(NiftiError::InvalidCode("datatype", self.datatype))
    }

    /// Get the spatial units type as a validated unit enum.
    pub fn xyzt_to_space(&self) -> Result<Unit> {
        let space_code = self.xyzt_units & 0o0007;
        FromPrimitive::from_u8(space_code)
            .ok_or(NiftiError::InvalidCode("xyzt units (space)", space_code as i16))
    }

    /// Get the time units type as a validated unit enum.
    pub fn xyzt_to_time(&self) -> Result<Unit> {
        let time_code = self.xyzt_units & 0o0070;
        FromPrimitive::from_u8(time_code)
            .ok_or(NiftiError::InvalidCode("xyzt units (time)", time_code as i16))
    }

    /// Get the slice order as a validated enum.
    pub fn slice_order(&self) -> Result<SliceOrder> {
        FromPrimitive::from_u8(self.slice_code)
            .ok_or(NiftiError::InvalidCode("slice order", self.slice_code as i16))
    }

    /// Get the qform coordinate mapping method as a validated enum.
    pub fn qform(&self) -> Result<XForm> {
        FromPrimitive::from_i16(self.qform_code)
            .ok_or(NiftiError::InvalidCode("qform", self.qform_code))
    }

    /// Get the sform coordinate mapping method as a validated enum.
    pub fn sform(&self) -> Result<XForm> {
        FromPrimitive::from_i16(self.sform_code)
            .ok_or(NiftiError::InvalidCode("sform", self.sform_code))
    }

    /// The `descrip` field up to its first NUL byte, lossily decoded.
    pub fn description_str(&self) -> String {
        String::from_utf8_lossy(trim_nul(&self.descrip)).into_owned()
    }

    /// Safely set the `descrip` field using a buffer.
    pub fn set_description(&mut self, description: &[u8]) -> Result<()> {
        let len = description.len();
        if len > self.descrip.len() {
            return Err(NiftiError::IncorrectDescriptionLength(len));
        }
        self.descrip = [0; 80];
        self.descrip[..len].copy_from_slice(description);
        Ok(())
    }

    /// Set the `descrip` field from a string, cutting it at 80 bytes
    /// (on a character boundary).
    pub fn set_description_lossy(&mut self, description: &str) {
        let mut end = description.len().min(self.descrip.len());
        while !description.is_char_boundary(end) {
            end -= 1;
        }
        self.descrip = [0; 80];
        self.descrip[..end].copy_from_slice(&description.as_bytes()[..end]);
    }
}
