//! Mapping between the header's datatype codes and voxel kinds, and the
//! choice of how a volume's voxels get stored for a given dialect.

use crate::error::{NiftiError, Result};
use crate::header::NiftiHeader;
use crate::typedef::{Dialect, NiftiType};
use crate::util::voxel_count;
use crate::volume::element::{ScalarKind, ScalingPair, VoxelData};
use crate::volume::VoxelVolume;
use byteordered::Endianness;
use log::{info, warn};
use num_traits::FromPrimitive;
use rgb::RGB8;
use std::collections::HashMap;
use std::sync::OnceLock;

struct TypeTable {
    to_kind: HashMap<NiftiType, ScalarKind>,
    to_code: HashMap<ScalarKind, NiftiType>,
}

fn type_table() -> &'static TypeTable {
    static TABLE: OnceLock<TypeTable> = OnceLock::new();
    TABLE.get_or_init(|| {
        let pairs = [
            (NiftiType::Binary, ScalarKind::Bit),
            (NiftiType::Uint8, ScalarKind::U8),
            (NiftiType::Int8, ScalarKind::I8),
            (NiftiType::Uint16, ScalarKind::U16),
            (NiftiType::Int16, ScalarKind::I16),
            (NiftiType::Uint32, ScalarKind::U32),
            (NiftiType::Int32, ScalarKind::I32),
            (NiftiType::Uint64, ScalarKind::U64),
            (NiftiType::Int64, ScalarKind::I64),
            (NiftiType::Float32, ScalarKind::F32),
            (NiftiType::Float64, ScalarKind::F64),
            (NiftiType::Complex64, ScalarKind::Complex64),
            (NiftiType::Complex128, ScalarKind::Complex128),
            (NiftiType::Rgb24, ScalarKind::Rgb24),
        ];
        TypeTable {
            to_kind: pairs.iter().copied().collect(),
            to_code: pairs.iter().map(|&(c, k)| (k, c)).collect(),
        }
    })
}

/// The voxel kind stored under a datatype code, if supported.
pub fn kind_for_code(code: NiftiType) -> Option<ScalarKind> {
    type_table().to_kind.get(&code).copied()
}

/// The datatype code for a voxel kind, if it has one.
pub fn code_for_kind(kind: ScalarKind) -> Option<NiftiType> {
    type_table().to_code.get(&kind).copied()
}

/// How the voxels of a volume are copied into the file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WriteStrategy {
    /// Plain element copy, converting to `target` through `scaling`.
    Common {
        /// Kind stored in the file
        target: ScalarKind,
        /// Mapping from volume values to stored values
        scaling: ScalingPair,
    },
    /// Bit-packed storage, most significant bit first.
    Bit,
    /// Multi-channel voxels (colors or vectors) stored as three
    /// consecutive time-volumes, one per channel.
    FslRgb,
}

impl WriteStrategy {
    /// Datatype code written to the header for a volume of kind `source`.
    pub fn datatype(&self, source: ScalarKind) -> Result<NiftiType> {
        match self {
            WriteStrategy::Bit => Ok(NiftiType::Binary),
            WriteStrategy::FslRgb if source == ScalarKind::Vector3F32 => Ok(NiftiType::Float32),
            WriteStrategy::FslRgb => Ok(NiftiType::Uint8),
            WriteStrategy::Common { target, .. } => {
                code_for_kind(*target).ok_or(NiftiError::UnsupportedVoxelKind(*target))
            }
        }
    }

    /// Size of the stored image. Channels of `FslRgb` take the time axis.
    pub fn stored_size(&self, size: [usize; 4]) -> [usize; 4] {
        match self {
            WriteStrategy::FslRgb => [size[0], size[1], size[2], 3],
            _ => size,
        }
    }

    /// The scaling applied to values on their way into the file.
    pub fn scaling(&self) -> ScalingPair {
        match self {
            WriteStrategy::Common { scaling, .. } => *scaling,
            _ => ScalingPair::IDENTITY,
        }
    }
}

/// Choose how to store `volume` for the given dialect.
///
/// # Errors
///
/// - `NiftiError::ColorWithoutTimeAxis` for a multi-channel volume with
///   several timesteps written for fsl.
/// - `NiftiError::UnsupportedVoxelKind` if the voxel kind cannot be
///   stored at all.
pub fn select_write_strategy(volume: &VoxelVolume, dialect: Dialect) -> Result<WriteStrategy> {
    let kind = volume.kind();
    let target = match (kind, dialect) {
        (ScalarKind::Bit, Dialect::None) => return Ok(WriteStrategy::Bit),
        (ScalarKind::Bit, _) => {
            info!("{} does not support arbitrary bit depth, falling back to u8", dialect);
            ScalarKind::U8
        }
        (ScalarKind::Rgb24, Dialect::Fsl) | (ScalarKind::Vector3F32, Dialect::Fsl) => {
            if volume.size()[3] > 1 {
                return Err(NiftiError::ColorWithoutTimeAxis(volume.size()));
            }
            info!("storing {:?} voxels as 3 volumes for fsl", kind);
            return Ok(WriteStrategy::FslRgb);
        }
        (ScalarKind::U16, Dialect::Fsl) => {
            info!("fsl does not support u16, falling back to i16");
            ScalarKind::I16
        }
        (ScalarKind::U32, Dialect::Fsl) => {
            info!("fsl does not support u32, falling back to i32");
            ScalarKind::I32
        }
        (k, _) => {
            let _ = code_for_kind(k).ok_or(NiftiError::UnsupportedVoxelKind(k))?;
            k
        }
    };
    let scaling = volume.data().scaling_to(target);
    Ok(WriteStrategy::Common { target, scaling })
}

/// Decode the voxel payload described by `header`.
///
/// Returns the data and the volume size, which differs from the header's
/// when fsl's three-volume color or vector layout is folded into one
/// multi-channel volume.
///
/// # Errors
///
/// - `NiftiError::UnsupportedDataType` if the datatype code is unknown or
///   has no voxel kind.
/// - `NiftiError::VolumeTooLarge` if the header's dimensions describe more
///   bytes than can be addressed.
/// - `NiftiError::IncompatibleLength` if `payload` is too short.
pub fn decode_read_value(
    header: &NiftiHeader,
    dialect: Dialect,
    payload: &[u8],
    endianness: Endianness,
) -> Result<(VoxelData, [usize; 4])> {
    let kind = NiftiType::from_i16(header.datatype)
        .and_then(kind_for_code)
        .ok_or(NiftiError::UnsupportedDataType(header.datatype))?;
    if header.bitpix as usize != kind.bits() {
        warn!(
            "bitpix ({}) does not fit the datatype {:?} ({} bits)",
            header.bitpix,
            kind,
            kind.bits()
        );
    }

    let mut size = header.size();
    let count = voxel_count(&size).ok_or(NiftiError::VolumeTooLarge(size))?;
    let expected = kind.bytes_for(count).ok_or(NiftiError::VolumeTooLarge(size))?;
    if payload.len() < expected {
        return Err(NiftiError::IncompatibleLength(payload.len(), expected));
    }
    let data = VoxelData::from_bytes(kind, payload, count, endianness)?;

    if dialect == Dialect::Fsl && size[3] == 3 {
        let n = count / 3;
        let folded = match &data {
            VoxelData::U8(v) => Some(VoxelData::Rgb24(
                (0..n).map(|i| RGB8::new(v[i], v[i + n], v[i + 2 * n])).collect(),
            )),
            VoxelData::F32(v) => Some(VoxelData::Vector3F32(
                (0..n).map(|i| [v[i], v[i + n], v[i + 2 * n]]).collect(),
            )),
            _ => None,
        };
        if let Some(folded) = folded {
            info!("reading 3 volumes of {:?} as one {:?} volume for fsl", kind, folded.kind());
            size[3] = 1;
            return Ok((folded, size));
        }
    }
    Ok((data, size))
}

/// Whether `kind` can be rescaled to real values on load.
pub(crate) fn is_rescalable(kind: ScalarKind) -> bool {
    !(kind.is_complex() || kind.is_multichannel() || kind == ScalarKind::Bit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::NiftiHeader;
    use pretty_assertions::assert_eq;

    #[test]
    fn table_is_bijective() {
        for &code in &[
            NiftiType::Binary,
            NiftiType::Uint8,
            NiftiType::Int16,
            NiftiType::Complex128,
            NiftiType::Rgb24,
        ] {
            let kind = kind_for_code(code).unwrap();
            assert_eq!(code_for_kind(kind), Some(code));
        }
        assert_eq!(kind_for_code(NiftiType::Float128), None);
        assert_eq!(kind_for_code(NiftiType::Rgba32), None);
        assert_eq!(code_for_kind(ScalarKind::Vector3F32), None);
    }

    #[test]
    fn fsl_fallbacks() {
        let vol = VoxelVolume::from_vec([2, 1, 1, 1], vec![0u16, 65535]).unwrap();
        let strategy = select_write_strategy(&vol, Dialect::Fsl).unwrap();
        assert_eq!(
            strategy,
            WriteStrategy::Common {
                target: ScalarKind::I16,
                scaling: ScalingPair::new(1., -32768.)
            }
        );
        assert_eq!(strategy.datatype(ScalarKind::U16).unwrap(), NiftiType::Int16);

        let strategy = select_write_strategy(&vol, Dialect::None).unwrap();
        assert_eq!(
            strategy,
            WriteStrategy::Common {
                target: ScalarKind::U16,
                scaling: ScalingPair::IDENTITY
            }
        );
    }

    #[test]
    fn bit_strategy() {
        let vol = VoxelVolume::from_vec([8, 1, 1, 1], vec![true; 8]).unwrap();
        assert_eq!(select_write_strategy(&vol, Dialect::None).unwrap(), WriteStrategy::Bit);
        match select_write_strategy(&vol, Dialect::Spm).unwrap() {
            WriteStrategy::Common { target: ScalarKind::U8, .. } => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn fsl_color() {
        let color = vec![RGB8::new(1, 2, 3); 4];
        let vol = VoxelVolume::from_vec([2, 2, 1, 1], color.clone()).unwrap();
        let strategy = select_write_strategy(&vol, Dialect::Fsl).unwrap();
        assert_eq!(strategy, WriteStrategy::FslRgb);
        assert_eq!(strategy.stored_size([2, 2, 1, 1]), [2, 2, 1, 3]);

        let vol = VoxelVolume::from_vec([2, 1, 1, 2], color).unwrap();
        match select_write_strategy(&vol, Dialect::Fsl) {
            Err(NiftiError::ColorWithoutTimeAxis([2, 1, 1, 2])) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            select_write_strategy(&vol, Dialect::None).unwrap(),
            WriteStrategy::Common {
                target: ScalarKind::Rgb24,
                scaling: ScalingPair::IDENTITY
            }
        );
    }

    #[test]
    fn vector_needs_fsl() {
        let vol = VoxelVolume::from_vec([1, 1, 1, 1], vec![[0f32; 3]]).unwrap();
        match select_write_strategy(&vol, Dialect::None) {
            Err(NiftiError::UnsupportedVoxelKind(ScalarKind::Vector3F32)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn decode_fsl_channels() {
        let mut h = NiftiHeader::default();
        h.dim = [4, 2, 1, 1, 3, 1, 1, 1];
        h.datatype = NiftiType::Uint8 as i16;
        h.bitpix = 8;
        let payload = [10, 11, 20, 21, 30, 31];

        let (data, size) = decode_read_value(&h, Dialect::Fsl, &payload, Endianness::native()).unwrap();
        assert_eq!(size, [2, 1, 1, 1]);
        assert_eq!(
            data,
            VoxelData::Rgb24(vec![RGB8::new(10, 20, 30), RGB8::new(11, 21, 31)])
        );

        let (data, size) = decode_read_value(&h, Dialect::None, &payload, Endianness::native()).unwrap();
        assert_eq!(size, [2, 1, 1, 3]);
        assert_eq!(data.kind(), ScalarKind::U8);
    }

    #[test]
    fn decode_errors() {
        let mut h = NiftiHeader::default();
        h.dim = [1, 4, 1, 1, 1, 1, 1, 1];
        h.datatype = 3;
        match decode_read_value(&h, Dialect::None, &[0; 16], Endianness::native()) {
            Err(NiftiError::UnsupportedDataType(3)) => {}
            other => panic!("unexpected {:?}", other),
        }
        h.datatype = NiftiType::Float128 as i16;
        match decode_read_value(&h, Dialect::None, &[0; 64], Endianness::native()) {
            Err(NiftiError::UnsupportedDataType(1536)) => {}
            other => panic!("unexpected {:?}", other),
        }
        h.datatype = NiftiType::Float32 as i16;
        match decode_read_value(&h, Dialect::None, &[0; 15], Endianness::native()) {
            Err(NiftiError::IncompatibleLength(15, 16)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn decode_bits() {
        let mut h = NiftiHeader::default();
        h.dim = [1, 10, 1, 1, 1, 1, 1, 1];
        h.datatype = NiftiType::Binary as i16;
        h.bitpix = 1;
        let (data, _) = decode_read_value(&h, Dialect::None, &[0xA0, 0x40], Endianness::native()).unwrap();
        assert_eq!(
            data,
            VoxelData::Bit(vec![true, false, true, false, false, false, false, false, false, true])
        );
    }
}
