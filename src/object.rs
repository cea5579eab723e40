//! Module for reading complete NIFTI-1 files into voxel volumes.
//!
//! A file is read in one go: the header is validated and repaired, the
//! voxel payload decoded according to the header's datatype, and the
//! geometry, timing and DICOM properties attached to the resulting
//! [`VoxelVolume`].
//!
//! [`VoxelVolume`]: ../volume/struct.VoxelVolume.html

use crate::affine::read_geometry;
use crate::descrip::parse_spm_description;
use crate::dicom::{sanitise, translate_dcmmeta};
use crate::error::{NiftiError, Result};
use crate::extension::read_extensions;
use crate::header::{detect_and_swap_endian, NiftiHeader, HEADER_SIZE, MAGIC_CODE_NI1};
use crate::property::PropertyMap;
use crate::slice_timing::parse_slice_ordering;
use crate::typedef::{Dialect, Unit};
use crate::typemap::{decode_read_value, is_rescalable};
use crate::util::read_whole_file;
use crate::volume::element::ScalingPair;
use crate::volume::VoxelVolume;
use byteordered::Endianness;
use log::{debug, info, warn};
use std::path::Path;

/// Options and flags which can be used to configure how a NIfTI file is
/// read.
///
/// # Example
///
/// ```no_run
/// use nifti_sa::{Dialect, ReaderOptions};
/// # use nifti_sa::Result;
///
/// # fn run() -> Result<()> {
/// let volumes = ReaderOptions::new()
///     .dialect(Dialect::Fsl)
///     .read_file("dti_V1.nii.gz")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReaderOptions {
    dialect: Dialect,
}

impl ReaderOptions {
    /// Options with the default dialect.
    pub fn new() -> ReaderOptions {
        ReaderOptions::default()
    }

    /// Interpret the file following the conventions of a dialect.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Read a `.nii` or `.nii.gz` file. Compressed files are recognized
    /// by their extension.
    pub fn read_file<P: AsRef<Path>>(&self, path: P) -> Result<Vec<VoxelVolume>> {
        let bytes = read_whole_file(&path)?;
        debug!(
            "read {} bytes from {}",
            bytes.len(),
            path.as_ref().display()
        );
        self.read_bytes(&bytes)
    }

    /// Read a NIfTI image held in memory.
    pub fn read_bytes(&self, bytes: &[u8]) -> Result<Vec<VoxelVolume>> {
        load(bytes, self.dialect)
    }
}

/// Parse the header of a file, fixing its byte order and whatever
/// structural problems can be repaired.
///
/// The returned header's `endianness` is the byte order of the file.
pub fn read_header(bytes: &[u8]) -> Result<NiftiHeader> {
    if bytes.len() < HEADER_SIZE {
        return Err(NiftiError::TruncatedHeader(bytes.len()));
    }
    let mut raw = bytes[..HEADER_SIZE].to_vec();
    let endianness = if detect_and_swap_endian(&mut raw) {
        info!("the file is not in native byte order, swapping");
        Endianness::native().to_opposite()
    } else {
        Endianness::native()
    };
    let mut header = NiftiHeader::from_raw(&raw, Endianness::native())?;
    header.endianness = endianness;

    if &header.magic == MAGIC_CODE_NI1 {
        warn!("the file is the header of a hdr/img pair, which is not supported");
        return Err(NiftiError::InvalidFormat);
    }
    let _ = header.validate_and_repair();
    Ok(header)
}

/// Load all volumes of a NIfTI-1 image held in memory.
///
/// # Errors
///
/// - `NiftiError::TruncatedHeader` if there are less than 348 bytes.
/// - `NiftiError::UnsupportedDataType` for datatypes without voxel kind.
/// - `NiftiError::VolumeTooLarge` if the dimensions describe more bytes
///   than can be addressed.
/// - `NiftiError::IncompatibleLength` if the voxel payload is too short.
pub fn load(bytes: &[u8], dialect: Dialect) -> Result<Vec<VoxelVolume>> {
    let header = read_header(bytes)?;
    let endianness = header.endianness;
    let vox_offset = header.vox_offset as usize;
    let payload = bytes.get(vox_offset..).unwrap_or(&[]);

    let (data, size) = decode_read_value(&header, dialect, payload, endianness)?;
    let mut volume = VoxelVolume::new(size, data)?;
    info!(
        "read {:?} volume of size {:?} ({} byte order)",
        volume.kind(),
        size,
        if endianness == Endianness::native() { "native" } else { "swapped" }
    );

    let has_dcmmeta = read_extensions(
        bytes,
        header.sizeof_hdr as usize,
        vox_offset,
        endianness,
        volume.props_mut(),
    );
    read_header_properties(&header, volume.props_mut());
    apply_scaling(&header, &mut volume)?;

    let ordered_by_meta = has_dcmmeta && translate_dcmmeta(volume.props_mut(), size[2]);
    if !ordered_by_meta {
        parse_slice_ordering(&header, &mut volume);
    }
    sanitise(volume.props_mut());

    Ok(vec![volume])
}

fn read_header_properties(header: &NiftiHeader, props: &mut PropertyMap) {
    read_geometry(props, header);

    if header.pixdim[4] > 0. {
        let time_factor = header.xyzt_to_time().map(Unit::to_ms).unwrap_or(1.);
        let _ = props.set("repetitionTime", header.pixdim[4] as f64 * time_factor);
    }

    let description = header.description_str();
    if !description.is_empty() && !parse_spm_description(props, &description) {
        let _ = props.set("sequenceDescription", description);
    }

    if header.cal_max != 0. || header.cal_min != 0. {
        let _ = props.set("window/min", header.cal_min as f64);
        let _ = props.set("window/max", header.cal_max as f64);
    }

    if header.intent_code != 0 {
        warn!("Ignoring intent_code {}", header.intent_code);
        let _ = props.set("nifti/intent_code", header.intent_code);
    }

    let _ = props.set("sequenceNumber", 0i64);
}

/// Apply `scl_slope` and `scl_inter`, promoting the voxels to `f64`.
/// A zero slope counts as 1.
fn apply_scaling(header: &NiftiHeader, volume: &mut VoxelVolume) -> Result<()> {
    let slope = header.scl_slope as f64;
    let intercept = header.scl_inter as f64;
    if (slope == 0. || slope == 1.) && intercept == 0. {
        return Ok(());
    }
    let scaling = ScalingPair::new(if slope == 0. { 1. } else { slope }, intercept);
    if !is_rescalable(volume.kind()) {
        warn!(
            "Ignoring scaling {:?} of the header, it cannot be applied to {:?} voxels",
            scaling,
            volume.kind()
        );
        return Ok(());
    }
    if let Some(rescaled) = volume.data().rescaled(scaling) {
        info!("Applying scaling {:?} from the header, result will be in f64", scaling);
        volume.set_data(rescaled)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typedef::{NiftiType, SliceOrder, XForm};
    use crate::volume::element::{ScalarKind, VoxelData};
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    fn header(datatype: NiftiType, dim: [i16; 4]) -> NiftiHeader {
        let mut h = NiftiHeader::default();
        h.datatype = datatype as i16;
        h.bitpix = datatype.bits() as i16;
        h.dim[1..5].copy_from_slice(&dim);
        h.dim[0] = 4;
        h
    }

    fn file(h: &NiftiHeader, payload: &[u8]) -> Vec<u8> {
        let mut bytes = h.to_bytes().unwrap();
        bytes.resize(h.vox_offset as usize, 0);
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn minimal_u8() {
        let mut h = header(NiftiType::Uint8, [2, 2, 1, 1]);
        h.set_description_lossy("phantom");
        h.pixdim[4] = 2.5;
        h.xyzt_units = Unit::Mm as u8 | Unit::Sec as u8;
        let vols = load(&file(&h, &[1, 2, 3, 4]), Dialect::None).unwrap();
        assert_eq!(vols.len(), 1);
        let vol = &vols[0];
        assert_eq!(vol.size(), [2, 2, 1, 1]);
        assert_eq!(vol.data(), &VoxelData::U8(vec![1, 2, 3, 4]));

        let props = vol.props();
        assert_eq!(props.get_str("sequenceDescription"), Some("phantom"));
        assert_eq!(props.get_f64("repetitionTime"), Some(2500.));
        assert_eq!(props.get_i64("sequenceNumber"), Some(0));
        assert_eq!(props.get_vector3("rowVec"), Some([-1., 0., 0.]));
        assert_eq!(props.get_i64("acquisitionNumber"), Some(0));
        assert!(!props.contains("window/max"));
    }

    #[test]
    fn short_payload() {
        let h = header(NiftiType::Int16, [4, 4, 1, 1]);
        match load(&file(&h, &[0; 10]), Dialect::None) {
            Err(NiftiError::IncompatibleLength(10, 32)) => {}
            other => panic!("unexpected {:?}", other),
        }
        match load(&[0; 100], Dialect::None) {
            Err(NiftiError::TruncatedHeader(100)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unsupported_type() {
        let h = header(NiftiType::Float128, [1, 1, 1, 1]);
        match load(&file(&h, &[0; 16]), Dialect::None) {
            Err(NiftiError::UnsupportedDataType(1536)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn scaling_promotes() {
        let mut h = header(NiftiType::Int16, [2, 1, 1, 1]);
        h.scl_slope = 0.5;
        h.scl_inter = -1.;
        let mut payload = Vec::new();
        for v in [4i16, -6] {
            payload.extend_from_slice(&v.to_ne_bytes());
        }
        let vol = load(&file(&h, &payload), Dialect::None).unwrap().remove(0);
        assert_eq!(vol.kind(), ScalarKind::F64);
        assert_eq!(vol.data(), &VoxelData::F64(vec![1., -4.]));
    }

    #[test]
    fn header_properties() {
        let mut h = header(NiftiType::Float32, [1, 1, 3, 1]);
        h.cal_min = -1.;
        h.cal_max = 10.;
        h.intent_code = 2;
        h.slice_code = SliceOrder::SeqDec as u8;
        h.slice_duration = 20.;
        h.xyzt_units = Unit::Mm as u8 | Unit::Msec as u8;
        h.qform_code = XForm::ScannerAnat as i16;
        h.quatern_d = 1.;
        h.qoffset_x = 10.;
        let vol = load(&file(&h, &[0; 12]), Dialect::None).unwrap().remove(0);
        let props = vol.props();
        assert_eq!(props.get_f64("window/min"), Some(-1.));
        assert_eq!(props.get_f64("window/max"), Some(10.));
        assert_eq!(props.get_i64("nifti/intent_code"), Some(2));
        assert_eq!(props.get_i64("nifti/qform_code"), Some(1));
        assert_eq!(props.get_f64_list("acquisitionNumber"), Some(vec![2., 1., 0.]));
        assert_eq!(props.get_f64_list("acquisitionTime"), Some(vec![40., 20., 0.]));
        let row = props.get_vector3("rowVec").unwrap();
        assert_relative_eq!(row[0], 1., epsilon = 1e-6);
        let origin = props.get_vector3("indexOrigin").unwrap();
        assert_relative_eq!(origin[0], -10., epsilon = 1e-6);
    }

    #[test]
    fn analyze_pair_is_rejected() {
        let mut h = header(NiftiType::Uint8, [1, 1, 1, 1]);
        h.magic = *MAGIC_CODE_NI1;
        match load(&file(&h, &[0]), Dialect::None) {
            Err(NiftiError::InvalidFormat) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn spm_description() {
        let mut h = header(NiftiType::Uint8, [1, 1, 1, 1]);
        h.set_description_lossy("TR=3000ms TE=40ms FA=80deg 01-Jan-2010 12:00:00");
        let vol = load(&file(&h, &[0]), Dialect::Spm).unwrap().remove(0);
        assert!(!vol.props().contains("sequenceDescription"));
        assert_eq!(vol.props().get_i64("repetitionTime"), Some(3000));
        assert_eq!(vol.props().get_i64("flipAngle"), Some(80));
    }
}
