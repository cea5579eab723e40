//! Utility functions to write nifti images.
//!
//! A volume is written as a single `.nii` (or `.nii.gz`) file: a 348 byte
//! header in native byte order, an empty extender and the voxel payload
//! starting at byte 352. Dialects change how voxels are laid out, so the
//! geometry stored in the header is adjusted along with them.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use byteordered::Endianness;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, info, warn};
use nalgebra::{Matrix3, Vector3};

use crate::affine::{axis_vectors, flip_geometry, store_qform, store_sform};
use crate::descrip::store_spm_description;
use crate::error::{NiftiError, Result};
use crate::header::{NiftiHeader, HEADER_SIZE, MAGIC_CODE_NIP1, MIN_VOX_OFFSET};
use crate::property::{PropertyMap, PropertyValue};
use crate::slice_timing::guess_from_props;
use crate::typedef::{Dialect, Unit};
use crate::typemap::{select_write_strategy, WriteStrategy};
use crate::util::{is_gz_file, sidecar_path};
use crate::volume::element::{pack_bits_into, ScalarKind, ScalingPair, VoxelData};
use crate::volume::VoxelVolume;

/// Options and flags which can be used to configure how a volume is
/// written.
///
/// # Example
///
/// ```no_run
/// use nifti_sa::{Dialect, VoxelVolume, WriterOptions};
/// # use nifti_sa::Result;
///
/// # fn run(volume: &VoxelVolume) -> Result<()> {
/// WriterOptions::new("dwi.nii.gz")
///     .dialect(Dialect::Fsl)
///     .write_volume(volume)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct WriterOptions {
    path: PathBuf,
    dialect: Dialect,
    compression: Option<Compression>,
}

impl WriterOptions {
    /// Options for writing to `path`. Output is compressed if the file
    /// name ends with `.gz`.
    pub fn new<P: AsRef<Path>>(path: P) -> WriterOptions {
        let compression = if is_gz_file(&path) {
            Some(Compression::default())
        } else {
            None
        };
        WriterOptions {
            path: path.as_ref().to_path_buf(),
            dialect: Dialect::default(),
            compression,
        }
    }

    /// Write following the conventions of a dialect.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Set the gzip compression level, or `None` to write plain bytes
    /// regardless of the file name.
    pub fn compression(mut self, compression: Option<Compression>) -> Self {
        self.compression = compression;
        self
    }

    /// Write the volume, plus the `.bval`/`.bvec` sidecars for fsl
    /// diffusion data.
    pub fn write_volume(&self, volume: &VoxelVolume) -> Result<()> {
        let image = PreparedImage::new(volume, self.dialect)?;
        let bytes = image.to_bytes(volume)?;

        let writer = BufWriter::new(File::create(&self.path)?);
        if let Some(level) = self.compression {
            let mut e = GzEncoder::new(writer, level);
            e.write_all(&bytes)?;
            e.finish()?.flush()?;
        } else {
            let mut writer = writer;
            writer.write_all(&bytes)?;
            writer.flush()?;
        }
        info!("wrote {} bytes to {}", bytes.len(), self.path.display());

        if let Some(gradients) = &image.gradients {
            write_diffusion_sidecars(&self.path, gradients)?;
        }
        Ok(())
    }
}

/// Write a volume to a nifti file (.nii or .nii.gz).
pub fn write<P: AsRef<Path>>(volume: &VoxelVolume, path: P, dialect: Dialect) -> Result<()> {
    WriterOptions::new(path).dialect(dialect).write_volume(volume)
}

/// Encode a volume into the bytes of an uncompressed `.nii` file.
/// Diffusion sidecars are not produced.
///
/// Axes longer than `i16::MAX` do not fit a NIfTI-1 header and fail with
/// `NiftiError::VolumeTooLarge`.
pub fn encode(volume: &VoxelVolume, dialect: Dialect) -> Result<Vec<u8>> {
    PreparedImage::new(volume, dialect)?.to_bytes(volume)
}

/// Everything that is decided before voxels get copied.
#[derive(Debug)]
struct PreparedImage {
    header: NiftiHeader,
    strategy: WriteStrategy,
    /// image axes (row, column, slice) stored in reverse order
    flips: [bool; 3],
    /// diffusion directions in slice space, with their b-values
    gradients: Option<Vec<(f64, [f64; 3])>>,
}

impl PreparedImage {
    fn new(volume: &VoxelVolume, dialect: Dialect) -> Result<Self> {
        let strategy = select_write_strategy(volume, dialect)?;
        let size = volume.size();
        let stored = strategy.stored_size(size);
        let datatype = strategy.datatype(volume.kind())?;

        let mut header = NiftiHeader::zeroed();
        header.sizeof_hdr = HEADER_SIZE as i32;
        header.dim[0] = stored
            .iter()
            .rposition(|&d| d > 1)
            .map_or(1, |i| i as i16 + 1);
        for (d, &s) in header.dim[1..5].iter_mut().zip(&stored) {
            *d = i16::try_from(s).map_err(|_| NiftiError::VolumeTooLarge(stored))?;
        }
        header.dim[5..].copy_from_slice(&[1, 1, 1]);
        header.datatype = datatype as i16;
        header.bitpix = datatype.bits() as i16;
        header.vox_offset = MIN_VOX_OFFSET as f32;

        let mut props = volume.props().clone();
        let flips = apply_dialect_flips(&mut props, size, dialect)?;

        let gradients = if dialect == Dialect::Fsl && props.contains("diffusionGradient") {
            Some(diffusion_gradients(&props, size[3])?)
        } else {
            None
        };

        let (order, duration) = guess_from_props(&slice_ordered(&props, size, flips[2]), size[2]);
        header.slice_code = order as u8;
        header.slice_duration = duration as f32;

        let (cal_min, cal_max) = calibration(volume);
        header.cal_min = cal_min as f32;
        header.cal_max = cal_max as f32;

        store_qform(&props, &mut header)?;
        store_sform(&props, &mut header)?;

        if let Some(tr) = props.get_f64("repetitionTime") {
            header.pixdim[4] = tr as f32;
        }
        header.xyzt_units = Unit::Mm as u8 | Unit::Msec as u8;
        // readDim=1 phaseDim=2 sliceDim=3
        header.dim_info = 1 | (2 << 2) | (3 << 4);
        header.slice_start = 0;
        header.slice_end = header.dim[3] - 1;

        if dialect == Dialect::Spm {
            header.set_description_lossy(&store_spm_description(&props));
        } else if let Some(description) = props.get_str("sequenceDescription") {
            header.set_description_lossy(description);
        }

        let mut scaling = strategy.scaling().inverse();
        if dialect != Dialect::Spm {
            let rescale = ScalingPair::new(
                props.get_f64("DICOM/RescaleSlope").unwrap_or(1.),
                props.get_f64("DICOM/RescaleIntercept").unwrap_or(0.),
            );
            scaling = scaling.then(rescale);
        }
        header.scl_slope = scaling.slope as f32;
        header.scl_inter = scaling.intercept as f32;
        header.magic = *MAGIC_CODE_NIP1;

        Ok(PreparedImage {
            header,
            strategy,
            flips,
            gradients,
        })
    }

    fn to_bytes(&self, volume: &VoxelVolume) -> Result<Vec<u8>> {
        let mut bytes = self.header.to_bytes()?;
        // extender: no extensions
        bytes.resize(MIN_VOX_OFFSET, 0);
        self.copy_voxels(volume, &mut bytes)?;
        Ok(bytes)
    }

    /// Append the payload, one slice at a time, applying pending flips.
    fn copy_voxels(&self, volume: &VoxelVolume, out: &mut Vec<u8>) -> Result<()> {
        let [nx, ny, nz, nt] = volume.size();
        let slice_len = volume.slice_len();
        let in_slice = in_slice_order(nx, ny, self.flips[0], self.flips[1]);
        let source_slice = |t: usize, z: usize| {
            let z = if self.flips[2] { nz - 1 - z } else { z };
            let start = (t * nz + z) * slice_len;
            let block = volume.data().block(start..start + slice_len);
            match &in_slice {
                Some(indices) => block.gather(indices),
                None => block,
            }
        };
        let endianness = Endianness::native();

        match self.strategy {
            WriteStrategy::Common { target, scaling } => {
                for t in 0..nt {
                    for z in 0..nz {
                        source_slice(t, z)
                            .convert(target, scaling)?
                            .write_to(&mut *out, endianness)?;
                    }
                }
            }
            WriteStrategy::Bit => {
                let len = ScalarKind::Bit
                    .bytes_for(volume.data().len())
                    .ok_or(NiftiError::VolumeTooLarge(volume.size()))?;
                let mut bits = vec![0u8; len];
                for t in 0..nt {
                    for z in 0..nz {
                        if let VoxelData::Bit(slice) = source_slice(t, z) {
                            pack_bits_into(&mut bits, (t * nz + z) * slice_len, &slice);
                        }
                    }
                }
                out.extend_from_slice(&bits);
            }
            WriteStrategy::FslRgb => {
                for channel in 0..3 {
                    for z in 0..nz {
                        channel_of(&source_slice(0, z), channel)?.write_to(&mut *out, endianness)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Source index of every voxel of a stored slice, or `None` if the slice
/// is stored as is.
fn in_slice_order(nx: usize, ny: usize, flip_rows: bool, flip_columns: bool) -> Option<Vec<usize>> {
    if !flip_rows && !flip_columns {
        return None;
    }
    let mut indices = Vec::with_capacity(nx * ny);
    for j in 0..ny {
        let sj = if flip_columns { ny - 1 - j } else { j };
        for i in 0..nx {
            let si = if flip_rows { nx - 1 - i } else { i };
            indices.push(sj * nx + si);
        }
    }
    Some(indices)
}

fn channel_of(data: &VoxelData, channel: usize) -> Result<VoxelData> {
    match data {
        VoxelData::Rgb24(v) => Ok(VoxelData::U8(
            v.iter()
                .map(|c| match channel {
                    0 => c.r,
                    1 => c.g,
                    _ => c.b,
                })
                .collect(),
        )),
        VoxelData::Vector3F32(v) => Ok(VoxelData::F32(v.iter().map(|c| c[channel]).collect())),
        other => Err(NiftiError::UnsupportedVoxelKind(other.kind())),
    }
}

/// Flip the geometry as the dialect requires, returning which image axes
/// have to be stored in reverse order.
fn apply_dialect_flips(
    props: &mut PropertyMap,
    size: [usize; 4],
    dialect: Dialect,
) -> Result<[bool; 3]> {
    let mut flips = [false; 3];
    match dialect {
        Dialect::Spm => {
            let axes = axis_vectors(props)?;
            let axis = (0..3)
                .max_by(|&a, &b| axes[a][2].abs().total_cmp(&axes[b][2].abs()))
                .unwrap_or(2);
            info!("Flipping image axis {} (closest to scanner z) for spm", axis);
            flip_geometry(props, axis, size[axis])?;
            flips[axis] = true;
        }
        Dialect::Fsl => {
            if was_mosaic(props) {
                let [row, column, slice] = axis_vectors(props)?;
                if Matrix3::from_columns(&[row, column, slice]).determinant() < 0. {
                    info!("Flipping slices of a siemens mosaic image for fsl compatibility");
                    flip_geometry(props, 2, size[2])?;
                    flips[2] = true;
                }
            }
            info!("Flipping columns of image for fsl compatibility");
            flip_geometry(props, 1, size[1])?;
            flips[1] = true;
        }
        Dialect::None => {}
    }
    Ok(flips)
}

fn was_mosaic(props: &PropertyMap) -> bool {
    match props.get("DICOM/ImageType") {
        Some(PropertyValue::List(types)) => types.iter().any(|t| t.as_str() == Some("WAS_MOSAIC")),
        Some(PropertyValue::Text(types)) => types.split('\\').any(|t| t == "WAS_MOSAIC"),
        _ => false,
    }
}

/// The timing properties as seen after reversing the slice order, if
/// `reversed`.
fn slice_ordered(props: &PropertyMap, size: [usize; 4], reversed: bool) -> PropertyMap {
    let mut timing = PropertyMap::new();
    for name in ["acquisitionTime", "acquisitionNumber"] {
        match props.get_list(name) {
            Some(values) if reversed && values.len() >= size[2] => {
                let mut values = values[..size[2]].to_vec();
                values.reverse();
                let _ = timing.set(name, values);
            }
            Some(values) => {
                let _ = timing.set(name, values.to_vec());
            }
            None => {}
        }
    }
    timing
}

/// `cal_min` and `cal_max` for a volume: its window if it has one, the
/// full range for colors, nothing for complex data, its value range
/// otherwise.
fn calibration(volume: &VoxelVolume) -> (f64, f64) {
    let kind = volume.kind();
    if kind == ScalarKind::Rgb24 {
        return (0., 255.);
    }
    if kind.is_complex() {
        return (0., 0.);
    }
    let props = volume.props();
    if let (Some(min), Some(max)) = (props.get_f64("window/min"), props.get_f64("window/max")) {
        return (min, max);
    }
    volume.data().min_max().unwrap_or((0., 0.))
}

/// Diffusion gradients of every timestep, as b-value and normalized
/// direction in slice space.
fn diffusion_gradients(props: &PropertyMap, timesteps: usize) -> Result<Vec<(f64, [f64; 3])>> {
    let directions: Vec<[f64; 3]> = match props.get("diffusionGradient") {
        Some(PropertyValue::List(list)) => list.iter().filter_map(PropertyValue::as_vector3).collect(),
        Some(v) => v.as_vector3().map(|g| vec![g; timesteps]).unwrap_or_default(),
        None => Vec::new(),
    };
    if directions.len() != timesteps {
        warn!(
            "Got {} diffusion gradients for {} volumes",
            directions.len(),
            timesteps
        );
    }
    if timesteps < 2 {
        warn!("The image seems to have diffusion data, but has only one volume");
    }

    let [row, column, slice] = axis_vectors(props)?;
    let to_slice_space = Matrix3::from_rows(&[row.transpose(), column.transpose(), slice.transpose()]);
    Ok(directions
        .into_iter()
        .map(|g| {
            let g = Vector3::from(g);
            let bvalue = g.norm();
            if bvalue > 0. {
                let d = to_slice_space * (g / bvalue);
                (bvalue, [d[0], d[1], d[2]])
            } else {
                (0., [0.; 3])
            }
        })
        .collect())
}

/// Format with at most 14 significant digits.
fn format_value(v: f64) -> String {
    let rounded: f64 = format!("{:.13e}", v).parse().unwrap_or(v);
    if rounded == 0. {
        "0".to_string()
    } else {
        format!("{}", rounded)
    }
}

fn write_diffusion_sidecars(path: &Path, gradients: &[(f64, [f64; 3])]) -> Result<()> {
    let bval_path = sidecar_path(path, "bval");
    let mut bval = BufWriter::new(File::create(&bval_path)?);
    for (bvalue, _) in gradients {
        write!(bval, "{} ", format_value(*bvalue))?;
    }
    writeln!(bval)?;
    bval.flush()?;

    // x-elements of all directions, then all y-elements and so on
    let bvec_path = sidecar_path(path, "bvec");
    let mut bvec = BufWriter::new(File::create(&bvec_path)?);
    for axis in 0..3 {
        for (_, direction) in gradients {
            write!(bvec, "{} ", format_value(direction[axis]))?;
        }
        writeln!(bvec)?;
    }
    bvec.flush()?;

    info!(
        "Stored diffusion information for fsl to {} and {}",
        bval_path.display(),
        bvec_path.display()
    );
    debug!("{} gradients", gradients.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::load;
    use crate::typedef::{NiftiType, SliceOrder};
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rgb::RGB8;
    use tempfile::tempdir;

    fn geometry(props: &mut PropertyMap) {
        let _ = props.set("rowVec", [1., 0., 0.]);
        let _ = props.set("columnVec", [0., 1., 0.]);
        let _ = props.set("sliceVec", [0., 0., 1.]);
        let _ = props.set("voxelSize", [1., 1., 1.]);
        let _ = props.set("indexOrigin", [0., 0., 0.]);
    }

    fn volume<T: crate::DataElement>(size: [usize; 4], values: Vec<T>) -> VoxelVolume {
        let mut props = PropertyMap::new();
        geometry(&mut props);
        VoxelVolume::from_vec(size, values).unwrap().with_props(props)
    }

    fn header_of(bytes: &[u8]) -> NiftiHeader {
        NiftiHeader::from_raw(bytes, Endianness::native()).unwrap()
    }

    #[test]
    fn header_fields() {
        let mut vol = volume([2, 3, 4, 1], (0..24).map(|v| v as f32).collect());
        let _ = vol.props_mut().set("repetitionTime", 2000.);
        let _ = vol.props_mut().set("sequenceDescription", "localizer");
        let _ = vol.props_mut().set("acquisitionNumber", vec![0i64, 2, 1, 3]);
        let bytes = encode(&vol, Dialect::None).unwrap();
        assert_eq!(bytes.len(), 352 + 24 * 4);

        let h = header_of(&bytes);
        assert_eq!(h.sizeof_hdr, 348);
        assert_eq!(h.dim, [3, 2, 3, 4, 1, 1, 1, 1]);
        assert_eq!(h.datatype, NiftiType::Float32 as i16);
        assert_eq!(h.bitpix, 32);
        assert_eq!(h.vox_offset, 352.);
        assert_eq!(&h.magic, MAGIC_CODE_NIP1);
        assert_eq!(h.pixdim[4], 2000.);
        assert_eq!(h.xyzt_units, 2 | 16);
        assert_eq!(h.dim_info, 57);
        assert_eq!(h.slice_end, 3);
        assert_eq!(h.slice_code, SliceOrder::AltInc as u8);
        assert_eq!((h.cal_min, h.cal_max), (0., 23.));
        assert_eq!((h.scl_slope, h.scl_inter), (1., 0.));
        assert!(h.qform_code > 0 && h.sform_code > 0);
        assert_eq!(h.description_str(), "localizer");
        assert_eq!(&bytes[348..352], &[0, 0, 0, 0]);
    }

    #[test]
    fn window_and_rescale() {
        let mut vol = volume([2, 1, 1, 1], vec![0i16, 100]);
        let _ = vol.props_mut().set("window/min", -5.);
        let _ = vol.props_mut().set("window/max", 50.);
        let _ = vol.props_mut().set("DICOM/RescaleSlope", 2.);
        let _ = vol.props_mut().set("DICOM/RescaleIntercept", -1024.);
        let h = header_of(&encode(&vol, Dialect::None).unwrap());
        assert_eq!((h.cal_min, h.cal_max), (-5., 50.));
        assert_eq!((h.scl_slope, h.scl_inter), (2., -1024.));

        let h = header_of(&encode(&vol, Dialect::Spm).unwrap());
        assert_eq!((h.scl_slope, h.scl_inter), (1., 0.));
    }

    #[test]
    fn bits_are_packed() {
        let bits = vec![true, false, true, true, false, false, false, true, true];
        let vol = volume([3, 3, 1, 1], bits.clone());
        let bytes = encode(&vol, Dialect::None).unwrap();
        assert_eq!(&bytes[352..], &[0b1011_0001, 0b1000_0000]);
        let back = load(&bytes, Dialect::None).unwrap().remove(0);
        assert_eq!(back.data(), &VoxelData::Bit(bits.clone()));

        let bytes = encode(&vol, Dialect::Fsl).unwrap();
        assert_eq!(header_of(&bytes).datatype, NiftiType::Uint8 as i16);
    }

    #[test]
    fn axis_too_long_for_header() {
        let vol = volume([40000, 1, 1, 1], vec![0u8; 40000]);
        match encode(&vol, Dialect::None) {
            Err(NiftiError::VolumeTooLarge([40000, 1, 1, 1])) => {}
            other => panic!("unexpected result {:?}", other.map(|b| b.len())),
        }

        let vol = volume([32767, 1, 1, 1], vec![0u8; 32767]);
        let h = header_of(&encode(&vol, Dialect::None).unwrap());
        assert_eq!((h.dim[0], h.dim[1]), (1, 32767));
    }

    #[test]
    fn fsl_flips_columns() {
        let vol = volume([2, 2, 1, 1], vec![1u8, 2, 3, 4]);
        let bytes = encode(&vol, Dialect::Fsl).unwrap();
        assert_eq!(&bytes[352..], &[3, 4, 1, 2]);

        let back = load(&bytes, Dialect::Fsl).unwrap().remove(0);
        let column = back.props().get_vector3("columnVec").unwrap();
        assert_relative_eq!(column[1], -1., epsilon = 1e-6);
        let origin = back.props().get_vector3("indexOrigin").unwrap();
        assert_relative_eq!(origin[1], 1., epsilon = 1e-6);
    }

    #[test]
    fn fsl_color() {
        let colors = vec![RGB8::new(1, 2, 3), RGB8::new(4, 5, 6)];
        let vol = volume([2, 1, 1, 1], colors.clone());
        let bytes = encode(&vol, Dialect::Fsl).unwrap();
        let h = header_of(&bytes);
        assert_eq!(h.dim, [4, 2, 1, 1, 3, 1, 1, 1]);
        assert_eq!(h.datatype, NiftiType::Uint8 as i16);
        assert_eq!((h.cal_min, h.cal_max), (0., 255.));
        assert_eq!(&bytes[352..], &[1, 4, 2, 5, 3, 6]);

        let back = load(&bytes, Dialect::Fsl).unwrap().remove(0);
        assert_eq!(back.size(), [2, 1, 1, 1]);
        assert_eq!(back.data(), &VoxelData::Rgb24(colors));

        let vol = volume([1, 1, 1, 2], vec![RGB8::new(1, 2, 3); 2]);
        assert!(encode(&vol, Dialect::Fsl).is_err());
    }

    #[test]
    fn spm_flip_keeps_world_positions() {
        let mut vol = volume([1, 1, 3, 1], vec![1u8, 2, 3]);
        let _ = vol.props_mut().set(
            "sequenceStart",
            chrono::NaiveDate::from_ymd_opt(2020, 5, 4)
                .unwrap()
                .and_hms_opt(8, 30, 0)
                .unwrap(),
        );
        let _ = vol.props_mut().set("repetitionTime", 1500.);
        let bytes = encode(&vol, Dialect::Spm).unwrap();
        assert_eq!(&bytes[352..], &[3, 2, 1]);
        assert_eq!(
            header_of(&bytes).description_str(),
            "TR=1500ms 04-May-2020 08:30:00"
        );

        let back = load(&bytes, Dialect::Spm).unwrap().remove(0);
        let slice = back.props().get_vector3("sliceVec").unwrap();
        assert_relative_eq!(slice[2], -1., epsilon = 1e-6);
        let origin = back.props().get_vector3("indexOrigin").unwrap();
        assert_relative_eq!(origin[2], 2., epsilon = 1e-6);
    }

    #[test]
    fn diffusion_sidecars() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dwi.nii");
        let mut vol = volume([1, 1, 1, 4], vec![0i16; 4]);
        let _ = vol.props_mut().set(
            "diffusionGradient",
            vec![
                PropertyValue::Vector3([0., 0., 0.]),
                PropertyValue::Vector3([1000., 0., 0.]),
                PropertyValue::Vector3([0., 500., 0.]),
                PropertyValue::Vector3([0., 0., 700.]),
            ],
        );
        write(&vol, &path, Dialect::Fsl).unwrap();
        assert!(path.exists());

        let bval = std::fs::read_to_string(dir.path().join("dwi.bval")).unwrap();
        assert_eq!(bval, "0 1000 500 700 \n");
        // columns are flipped for fsl, which turns the y axis around
        let bvec = std::fs::read_to_string(dir.path().join("dwi.bvec")).unwrap();
        assert_eq!(bvec, "0 1 0 0 \n0 0 -1 0 \n0 0 0 1 \n");
    }

    #[test]
    fn values_with_few_digits() {
        assert_eq!(format_value(0.), "0");
        assert_eq!(format_value(-0.5), "-0.5");
        assert_eq!(format_value(1. / 3.), "0.33333333333333");
    }
}
