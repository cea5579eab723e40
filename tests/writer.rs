use approx::assert_relative_eq;
use nifti_sa::affine::voxel_position;
use nifti_sa::{
    encode, load, read_header, write, Dialect, NiftiType, PropertyMap, ReaderOptions, SliceOrder,
    VoxelData, VoxelVolume, WriterOptions,
};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

mod util;

use util::{geometry, identity_volume, offset, rotation};

fn assert_vector_eq(props: &PropertyMap, name: &str, expected: [f64; 3], epsilon: f64) {
    let actual = props
        .get_vector3(name)
        .unwrap_or_else(|| panic!("{} is missing", name));
    for (a, e) in actual.iter().zip(&expected) {
        assert_relative_eq!(*a, *e, epsilon = epsilon);
    }
}

fn assert_same_geometry(read: &PropertyMap, written: &PropertyMap, epsilon: f64) {
    for name in &["rowVec", "columnVec", "sliceVec", "voxelSize", "indexOrigin"] {
        assert_vector_eq(read, name, written.get_vector3(name).unwrap(), epsilon);
    }
}

#[test]
fn identity_float_volume() {
    let size = [64, 64, 30, 1];
    let values: Vec<f32> = (0..64 * 64 * 30).map(|v| v as f32 * 0.5).collect();
    let props = geometry(
        [1., 0., 0.],
        [0., 1., 0.],
        [0., 0., 1.],
        [2., 2., 3.],
        [-63., -63., -43.5],
    );
    let vol = VoxelVolume::from_vec(size, values.clone())
        .unwrap()
        .with_props(props.clone());

    let dir = tempdir().unwrap();
    let path = dir.path().join("identity.nii");
    write(&vol, &path, Dialect::None).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let header = read_header(&bytes).unwrap();
    assert!(header.sform_code > 0);
    assert!(header.qform_code > 0);
    assert_eq!(header.datatype, NiftiType::Float32 as i16);

    let read = ReaderOptions::new().read_file(&path).unwrap().remove(0);
    assert_eq!(read.size(), size);
    assert_eq!(read.data(), &VoxelData::F32(values));
    for name in &["rowVec", "columnVec", "sliceVec", "voxelSize", "indexOrigin"] {
        assert_eq!(read.props().get_vector3(name), props.get_vector3(name), "{}", name);
    }
}

#[test]
fn rotated_geometry() {
    let axis = [1. / 3., 2. / 3., 2. / 3.];
    let [row, column, slice] = rotation(axis, 0.7);
    for &mirrored in &[false, true] {
        let slice = if mirrored { slice.map(|v| -v) } else { slice };
        let props = geometry(row, column, slice, [0.9, 0.9, 4.], [-112.5, 87.25, 30.]);
        let vol = VoxelVolume::from_vec([4, 3, 2, 1], vec![0i16; 24])
            .unwrap()
            .with_props(props.clone());
        let mut bytes = encode(&vol, Dialect::None).unwrap();

        let header = read_header(&bytes).unwrap();
        assert_eq!(header.pixdim[0], if mirrored { -1. } else { 1. });

        // sform
        let read = load(&bytes, Dialect::None).unwrap().remove(0);
        assert_same_geometry(read.props(), &props, 1e-5);

        // qform only
        bytes[offset::SFORM_CODE..offset::SFORM_CODE + 2].copy_from_slice(&0i16.to_ne_bytes());
        let read = load(&bytes, Dialect::None).unwrap().remove(0);
        assert!(!read.props().contains("nifti/sform_code"));
        assert_same_geometry(read.props(), &props, 1e-5);
    }
}

#[test]
fn fsl_unsigned_fallback() {
    let values: Vec<u16> = vec![0, 1, 1000, 40000, 65535, 12345];
    let vol = identity_volume([3, 2, 1, 1], values.clone());
    let bytes = encode(&vol, Dialect::Fsl).unwrap();
    assert_eq!(read_header(&bytes).unwrap().datatype, NiftiType::Int16 as i16);

    let read = load(&bytes, Dialect::Fsl).unwrap().remove(0);
    let read = read.data().to_f64_vec().unwrap();
    // rows are kept, columns come back flipped
    let expected: Vec<f64> = [40000., 65535., 12345., 0., 1., 1000.].to_vec();
    for (r, e) in read.iter().zip(&expected) {
        assert_relative_eq!(*r, *e, epsilon = 0.5);
    }

    // values within the range of i16 are stored as they are
    let vol = identity_volume([2, 1, 1, 1], vec![3u16, 7]);
    let bytes = encode(&vol, Dialect::Fsl).unwrap();
    let header = read_header(&bytes).unwrap();
    assert_eq!((header.scl_slope, header.scl_inter), (1., 0.));
    assert_eq!(&bytes[352..], &[3i16.to_ne_bytes(), 7i16.to_ne_bytes()].concat()[..]);
}

#[test]
fn dialect_flips_keep_positions() {
    let [row, column, slice] = rotation([0., 0., 1.], 0.3);
    let props = geometry(row, column, slice, [1., 2., 3.], [10., 20., 30.]);
    let size = [3, 4, 5, 1];
    let values: Vec<u8> = (0..60).collect();
    let vol = VoxelVolume::from_vec(size, values)
        .unwrap()
        .with_props(props.clone());

    // (row, column, slice) flips expected from each dialect
    for &(dialect, flips) in &[
        (Dialect::None, [false, false, false]),
        (Dialect::Fsl, [false, true, false]),
        (Dialect::Spm, [false, false, true]),
    ] {
        let bytes = encode(&vol, dialect).unwrap();
        let read = load(&bytes, dialect).unwrap().remove(0);
        let data = read.data().to_f64_vec().unwrap();

        for &(i, j, k) in &[(0, 0, 0), (2, 1, 3), (1, 3, 4)] {
            let stored = [
                if flips[0] { size[0] - 1 - i } else { i },
                if flips[1] { size[1] - 1 - j } else { j },
                if flips[2] { size[2] - 1 - k } else { k },
            ];
            let source_index = i + size[0] * (j + size[1] * k);
            let stored_index = stored[0] + size[0] * (stored[1] + size[1] * stored[2]);
            assert_eq!(data[stored_index], source_index as f64, "{:?}", dialect);

            let expected = voxel_position(&props, [i as f64, j as f64, k as f64]).unwrap();
            let actual = voxel_position(
                read.props(),
                [stored[0] as f64, stored[1] as f64, stored[2] as f64],
            )
            .unwrap();
            for d in 0..3 {
                assert_relative_eq!(actual[d], expected[d], epsilon = 1e-3);
            }
        }
    }
}

#[test]
fn slice_timing_is_stored() {
    let mut vol = identity_volume([1, 1, 5, 1], vec![0u8; 5]);
    // slice i was acquired at times[i]
    let _ = vol
        .props_mut()
        .set("acquisitionTime", vec![0., 300., 100., 400., 200.]);
    let header = read_header(&encode(&vol, Dialect::None).unwrap()).unwrap();
    assert_eq!(header.slice_order().unwrap(), SliceOrder::AltInc);
    assert_eq!(header.slice_duration, 150.);

    let _ = vol
        .props_mut()
        .set("acquisitionTime", vec![400., 300., 200., 100., 0.]);
    let header = read_header(&encode(&vol, Dialect::None).unwrap()).unwrap();
    assert_eq!(header.slice_order().unwrap(), SliceOrder::SeqDec);
    assert_eq!(header.slice_duration, 100.);

    // spm reverses the slices, and with them the acquisition order
    let header = read_header(&encode(&vol, Dialect::Spm).unwrap()).unwrap();
    assert_eq!(header.slice_order().unwrap(), SliceOrder::SeqInc);
    assert_eq!(header.slice_code, 1);
}

#[test]
fn bit_volume() {
    let bits: Vec<bool> = (0..27).map(|i| i % 3 == 0 || i % 7 == 0).collect();
    let vol = identity_volume([3, 3, 3, 1], bits.clone());
    let bytes = encode(&vol, Dialect::None).unwrap();
    let header = read_header(&bytes).unwrap();
    assert_eq!(header.datatype, NiftiType::Binary as i16);
    assert_eq!(header.bitpix, 1);
    assert_eq!(bytes.len(), 352 + 4);

    let read = load(&bytes, Dialect::None).unwrap().remove(0);
    assert_eq!(read.data(), &VoxelData::Bit(bits));
}

#[test]
fn fsl_color_volume() {
    let colors: Vec<rgb::RGB8> = (0..12u8).map(|i| rgb::RGB8::new(i, i * 2, 255 - i)).collect();
    let vol = identity_volume([2, 3, 2, 1], colors.clone());
    let bytes = encode(&vol, Dialect::Fsl).unwrap();
    let header = read_header(&bytes).unwrap();
    assert_eq!(header.dim, [4, 2, 3, 2, 3, 1, 1, 1]);

    let read = load(&bytes, Dialect::Fsl).unwrap().remove(0);
    assert_eq!(read.size(), [2, 3, 2, 1]);
    // undo the column flip
    let mut unflipped = Vec::new();
    if let VoxelData::Rgb24(read) = read.data() {
        for k in 0..2 {
            for j in (0..3).rev() {
                unflipped.extend_from_slice(&read[(k * 3 + j) * 2..(k * 3 + j) * 2 + 2]);
            }
        }
    }
    assert_eq!(unflipped, colors);

    let vol = identity_volume([1, 1, 1, 2], colors[..2].to_vec());
    assert!(encode(&vol, Dialect::Fsl).is_err());
}

#[test]
fn spm_description() {
    let mut vol = identity_volume([2, 2, 2, 1], vec![1i32; 8]);
    let start = chrono::NaiveDate::from_ymd_opt(2011, 12, 24)
        .unwrap()
        .and_hms_opt(9, 0, 1)
        .unwrap();
    let _ = vol.props_mut().set("repetitionTime", 2000.);
    let _ = vol.props_mut().set("echoTime", 30i64);
    let _ = vol.props_mut().set("flipAngle", 90i64);
    let _ = vol.props_mut().set("sequenceStart", start);
    let _ = vol.props_mut().set("sequenceDescription", "not for spm");

    let bytes = encode(&vol, Dialect::Spm).unwrap();
    let header = read_header(&bytes).unwrap();
    assert_eq!(
        header.description_str(),
        "TR=2000ms TE=30ms FA=90deg 24-Dec-2011 09:00:01"
    );

    let read = load(&bytes, Dialect::Spm).unwrap().remove(0);
    let props = read.props();
    assert_eq!(props.get_f64("repetitionTime"), Some(2000.));
    assert_eq!(props.get_i64("echoTime"), Some(30));
    assert_eq!(props.get_i64("flipAngle"), Some(90));
    assert_eq!(props.get("sequenceStart").and_then(|v| v.as_timestamp()), Some(start));
    assert!(!props.contains("sequenceDescription"));
}

#[test]
fn compressed_output() {
    let dir = tempdir().unwrap();
    let vol = identity_volume([4, 4, 4, 2], (0..128).map(|v| v as i16 - 64).collect::<Vec<_>>());

    let gz = dir.path().join("series.nii.gz");
    WriterOptions::new(&gz).write_volume(&vol).unwrap();
    let raw = std::fs::read(&gz).unwrap();
    assert_eq!(&raw[..2], &[0x1f, 0x8b]);

    let plain = dir.path().join("forced.nii.gz");
    WriterOptions::new(&plain)
        .compression(None)
        .write_volume(&vol)
        .unwrap();
    assert_eq!(std::fs::read(&plain).unwrap(), encode(&vol, Dialect::None).unwrap());

    let read = ReaderOptions::new().read_file(&gz).unwrap().remove(0);
    assert_eq!(read.size(), [4, 4, 4, 2]);
    assert_eq!(read.data(), vol.data());
}

#[test]
fn diffusion_files() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dwi.nii.gz");
    let mut vol = identity_volume([2, 2, 2, 2], vec![0f32; 16]);
    let _ = vol.props_mut().set("diffusionGradient", [0., 0., 1000.]);
    WriterOptions::new(&path)
        .dialect(Dialect::Fsl)
        .write_volume(&vol)
        .unwrap();

    let bval = std::fs::read_to_string(dir.path().join("dwi.bval")).unwrap();
    assert_eq!(bval.trim(), "1000 1000");
    let bvec = std::fs::read_to_string(dir.path().join("dwi.bvec")).unwrap();
    let lines: Vec<&str> = bvec.lines().map(str::trim).collect();
    assert_eq!(lines, vec!["0 0", "0 0", "1 1"]);

    // sidecars are only written for fsl
    let other = dir.path().join("other.nii");
    write(&vol, &other, Dialect::None).unwrap();
    assert!(!dir.path().join("other.bval").exists());
}

#[cfg(feature = "ndarray_volumes")]
#[test]
fn loaded_volume_into_ndarray() {
    use nifti_sa::IntoNdArray;

    let vol = identity_volume([3, 2, 1, 1], vec![1u8, 2, 3, 4, 5, 6]);
    let read = load(&encode(&vol, Dialect::None).unwrap(), Dialect::None)
        .unwrap()
        .remove(0);
    let arr = read.into_ndarray::<f32>().unwrap();
    assert_eq!(arr.shape(), &[3, 2]);
    assert_eq!(arr[[2, 1]], 6.);
    assert_eq!(arr[[1, 0]], 2.);
}
