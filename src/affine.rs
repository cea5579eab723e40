//! Conversions between the header's geometry encodings (qform quaternion
//! and sform affine) and the volume's geometry properties.
//!
//! Volumes describe their orientation in a native space which differs from
//! the NIfTI world space by the sign of the first two axes:
//! `native = NIFTI2NATIVE * nifti`. The relevant properties are `rowVec`,
//! `columnVec` and `sliceVec` (unit vectors), `voxelSize`, the optional
//! `voxelGap`, and `indexOrigin` (position of the first voxel).

use crate::error::{NiftiError, Result};
use crate::header::NiftiHeader;
use crate::property::PropertyMap;
use crate::typedef::{Unit, XForm};
use log::{debug, warn};
use nalgebra::{Matrix3, Matrix4, Vector3, Vector4};
use num_traits::FromPrimitive;

/// Axis convention change between NIfTI world space and native space,
/// `diag(-1, -1, 1, 1)`.
pub fn nifti2native() -> Matrix4<f64> {
    Matrix4::from_diagonal(&Vector4::new(-1., -1., 1., 1.))
}

/// Property names of the three image axes.
pub const AXIS_VECTORS: [&str; 3] = ["rowVec", "columnVec", "sliceVec"];

fn required_vector(props: &PropertyMap, name: &str) -> Result<Vector3<f64>> {
    props
        .get_vector3(name)
        .map(Vector3::from)
        .ok_or_else(|| NiftiError::MissingProperty(name.to_string()))
}

/// The three axis vectors of the volume, normalized. A missing
/// `sliceVec` is taken as the cross product of the other two.
pub fn axis_vectors(props: &PropertyMap) -> Result<[Vector3<f64>; 3]> {
    let row = required_vector(props, "rowVec")?.normalize();
    let column = required_vector(props, "columnVec")?.normalize();
    let slice = match props.get_vector3("sliceVec") {
        Some(v) => Vector3::from(v).normalize(),
        None => row.cross(&column),
    };
    Ok([row, column, slice])
}

/// Build the image to NIfTI world affine of a volume.
///
/// The first three columns are the axis vectors scaled by the voxel size
/// (plus any voxel gap), the fourth is `indexOrigin`. The result is
/// brought from native space into NIfTI space.
pub fn get_nifti_matrix(props: &PropertyMap) -> Result<Matrix4<f64>> {
    let axes = axis_vectors(props)?;
    let voxel_size = required_vector(props, "voxelSize")?;
    let gap = props
        .get_vector3("voxelGap")
        .map(Vector3::from)
        .unwrap_or_else(Vector3::zeros);
    let origin = props
        .get_vector3("indexOrigin")
        .map(Vector3::from)
        .unwrap_or_else(Vector3::zeros);

    let mut image2native = Matrix4::identity();
    for (i, axis) in axes.iter().enumerate() {
        let column = axis * (voxel_size[i] + gap[i]);
        image2native
            .fixed_view_mut::<3, 1>(0, i)
            .copy_from(&column);
    }
    image2native.fixed_view_mut::<3, 1>(0, 3).copy_from(&origin);

    Ok(nifti2native().transpose() * image2native)
}

fn space_factor(header: &NiftiHeader) -> f64 {
    header.xyzt_to_space().map(Unit::to_mm).unwrap_or(1.)
}

fn store_axes(props: &mut PropertyMap, image2native: &Matrix3<f64>) {
    for (i, name) in AXIS_VECTORS.iter().enumerate() {
        let c = image2native.column(i);
        let _ = props.set(*name, [c[0], c[1], c[2]]);
    }
}

/// Derive the geometry from the sform affine (`srow_x`, `srow_y`,
/// `srow_z`).
pub fn use_sform(props: &mut PropertyMap, header: &NiftiHeader) {
    debug!(
        "Using sform ({}) {:?}-{:?}-{:?} to calc orientation",
        header.sform_code, header.srow_x, header.srow_y, header.srow_z
    );
    let factor = space_factor(header);

    let mut image2nifti = Matrix4::zeros();
    for (r, row) in [header.srow_x, header.srow_y, header.srow_z].iter().enumerate() {
        for (c, v) in row.iter().enumerate() {
            image2nifti[(r, c)] = *v as f64;
        }
    }
    let image2native = nifti2native() * image2nifti;

    let origin = image2native.fixed_view::<3, 1>(0, 3) * factor;
    let _ = props.set("indexOrigin", [origin[0], origin[1], origin[2]]);

    let mut axes: Matrix3<f64> = image2native.fixed_view::<3, 3>(0, 0).into_owned();
    let mut voxel_size = [1.; 3];
    for i in 0..3 {
        let len = axes.column(i).norm();
        if len > 0. {
            voxel_size[i] = len * factor;
            let normalized = axes.column(i) / len;
            axes.set_column(i, &normalized);
        } else {
            warn!("sform column {} has zero length, assuming the native axis", i);
            let mut unit = Vector3::zeros();
            unit[i] = if i < 2 { -1. } else { 1. };
            axes.set_column(i, &unit);
        }
    }
    store_axes(props, &axes);
    let _ = props.set("voxelSize", voxel_size);

    for i in 0..3 {
        let pixdim = header.pixdim[i + 1] as f64 * factor;
        if (pixdim - voxel_size[i]).abs() > 1e-4 * voxel_size[i].max(1.) {
            warn!(
                "The voxel size {} computed from the sform differs from pixdim[{}] ({})",
                voxel_size[i],
                i + 1,
                pixdim
            );
        }
    }
    debug!(
        "Computed indexOrigin={:?} voxelSize={:?} from sform",
        origin.as_slice(),
        voxel_size
    );
}

/// Derive the geometry from the qform quaternion, its offset and
/// `pixdim`.
pub fn use_qform(props: &mut PropertyMap, header: &NiftiHeader) {
    let mut b = header.quatern_b as f64;
    let mut c = header.quatern_c as f64;
    let mut d = header.quatern_d as f64;
    let bcd = b * b + c * c + d * d;
    let a = if bcd > 1. {
        // too long, normalize and leave the angle at 180 degrees
        let len = bcd.sqrt();
        b /= len;
        c /= len;
        d /= len;
        0.
    } else {
        (1. - bcd).max(0.).sqrt()
    };
    let qfac = if header.pixdim[0] < 0. { -1. } else { 1. };
    debug!(
        "Using qform ({}) quaternion=({}, {}, {}, {}) with qfac={}",
        header.qform_code, a, b, c, d, qfac
    );

    #[rustfmt::skip]
    let rotation = Matrix3::new(
        a * a + b * b - c * c - d * d, 2. * (b * c - a * d),          2. * (b * d + a * c) * qfac,
        2. * (b * c + a * d),          a * a - b * b + c * c - d * d, 2. * (c * d - a * b) * qfac,
        2. * (b * d - a * c),          2. * (c * d + a * b),          (a * a - b * b - c * c + d * d) * qfac,
    );
    let to_native: Matrix3<f64> = nifti2native().fixed_view::<3, 3>(0, 0).into_owned();
    store_axes(props, &(to_native * rotation));

    let factor = space_factor(header);
    let offset = to_native
        * Vector3::new(
            header.qoffset_x as f64,
            header.qoffset_y as f64,
            header.qoffset_z as f64,
        )
        * factor;
    let _ = props.set("indexOrigin", [offset[0], offset[1], offset[2]]);

    let mut voxel_size = [1.; 3];
    for (v, &p) in voxel_size.iter_mut().zip(&header.pixdim[1..4]) {
        if p > 0. {
            *v = p as f64 * factor;
        }
    }
    let _ = props.set("voxelSize", voxel_size);
}

/// Store the volume's orientation as a qform quaternion, offset and
/// `pixdim[0..=3]`.
///
/// An improper frame (determinant of the normalized axes not positive) is
/// recorded with `qfac = -1` and the third axis flipped before conversion.
pub fn store_qform(props: &PropertyMap, header: &mut NiftiHeader) -> Result<()> {
    let image2nifti = get_nifti_matrix(props)?;

    let mut r: Matrix3<f64> = image2nifti.fixed_view::<3, 3>(0, 0).into_owned();
    for i in 0..3 {
        let len = r.column(i).norm();
        header.pixdim[i + 1] = len as f32;
        if len > 0. {
            let normalized = r.column(i) / len;
            r.set_column(i, &normalized);
        }
    }

    if r.determinant() > 0. {
        header.pixdim[0] = 1.;
    } else {
        let flipped = -r.column(2);
        r.set_column(2, &flipped);
        header.pixdim[0] = -1.;
    }

    if header.qform_code <= 0 {
        header.qform_code = props
            .get_i64("nifti/qform_code")
            .filter(|&c| c > 0)
            .unwrap_or(XForm::ScannerAnat as i64) as i16;
    }

    let [b, c, d] = quaternion_from_rotation(&r);
    header.quatern_b = b as f32;
    header.quatern_c = c as f32;
    header.quatern_d = d as f32;
    header.qoffset_x = image2nifti[(0, 3)] as f32;
    header.qoffset_y = image2nifti[(1, 3)] as f32;
    header.qoffset_z = image2nifti[(2, 3)] as f32;
    Ok(())
}

/// Compute the `(b, c, d)` quaternion parameters of a proper rotation.
///
/// The four branches pick the largest diagonal term to divide by, which
/// avoids cancellation close to 180 degree rotations.
pub fn quaternion_from_rotation(r: &Matrix3<f64>) -> [f64; 3] {
    let (r11, r12, r13) = (r[(0, 0)], r[(0, 1)], r[(0, 2)]);
    let (r21, r22, r23) = (r[(1, 0)], r[(1, 1)], r[(1, 2)]);
    let (r31, r32, r33) = (r[(2, 0)], r[(2, 1)], r[(2, 2)]);

    let a_square = r11 + r22 + r33 + 1.;
    if a_square > 0.5 {
        let a = 0.5 * a_square.sqrt();
        return [
            0.25 * (r32 - r23) / a,
            0.25 * (r13 - r31) / a,
            0.25 * (r21 - r12) / a,
        ];
    }

    let xd = 1. + r11 - (r22 + r33); // 4*b*b
    let yd = 1. + r22 - (r11 + r33); // 4*c*c
    let zd = 1. + r33 - (r11 + r22); // 4*d*d
    let (a, b, c, d);
    if xd > 1. {
        b = 0.5 * xd.sqrt();
        c = 0.25 * (r12 + r21) / b;
        d = 0.25 * (r13 + r31) / b;
        a = 0.25 * (r32 - r23) / b;
    } else if yd > 1. {
        c = 0.5 * yd.sqrt();
        b = 0.25 * (r12 + r21) / c;
        d = 0.25 * (r23 + r32) / c;
        a = 0.25 * (r13 - r31) / c;
    } else {
        d = 0.5 * zd.sqrt();
        b = 0.25 * (r13 + r31) / d;
        c = 0.25 * (r23 + r32) / d;
        a = 0.25 * (r21 - r12) / d;
    }
    if a < 0. {
        [-b, -c, -d]
    } else {
        [b, c, d]
    }
}

/// Store the volume's image to NIfTI affine as the sform rows.
pub fn store_sform(props: &PropertyMap, header: &mut NiftiHeader) -> Result<()> {
    let sform = get_nifti_matrix(props)?;
    if header.sform_code <= 0 {
        header.sform_code = props
            .get_i64("nifti/sform_code")
            .filter(|&c| c > 0)
            .unwrap_or(XForm::ScannerAnat as i64) as i16;
    }
    for (r, row) in [&mut header.srow_x, &mut header.srow_y, &mut header.srow_z]
        .iter_mut()
        .enumerate()
    {
        for (c, v) in row.iter_mut().enumerate() {
            *v = sform[(r, c)] as f32;
        }
    }
    Ok(())
}

/// Set the geometry properties of a freshly read volume, preferring the
/// sform over the qform. Without either, an identity orientation is
/// assumed. Used form codes are kept as `nifti/sform_code` and
/// `nifti/qform_code`.
pub fn read_geometry(props: &mut PropertyMap, header: &NiftiHeader) {
    for (code, name) in [(header.sform_code, "sform"), (header.qform_code, "qform")] {
        if code > 0 && XForm::from_i16(code).is_none() {
            warn!("unknown {}_code {}, using it anyway", name, code);
        }
    }

    if header.sform_code > 0 {
        use_sform(props, header);
        let _ = props.set("nifti/sform_code", header.sform_code);
        if header.qform_code > 0 {
            let _ = props.set("nifti/qform_code", header.qform_code);
        }
    } else if header.qform_code > 0 {
        use_qform(props, header);
        let _ = props.set("nifti/qform_code", header.qform_code);
    } else {
        warn!("Neither sform nor qform are set, assuming identity matrix");
        let factor = space_factor(header);
        let mut voxel_size = [1.; 3];
        for (v, &p) in voxel_size.iter_mut().zip(&header.pixdim[1..4]) {
            if p > 0. {
                *v = p as f64 * factor;
            }
        }
        let _ = props.set("rowVec", [-1., 0., 0.]);
        let _ = props.set("columnVec", [0., -1., 0.]);
        let _ = props.set("sliceVec", [0., 0., 1.]);
        let _ = props.set("voxelSize", voxel_size);
        let _ = props.set("indexOrigin", [0., 0., 0.]);
    }
}

/// Change the geometry so that it describes the volume after its voxels
/// were mirrored along image `axis` (0 to 2), which has `extent` voxels.
/// World positions of all voxels are preserved.
pub fn flip_geometry(props: &mut PropertyMap, axis: usize, extent: usize) -> Result<()> {
    let axes = axis_vectors(props)?;
    let voxel_size = required_vector(props, "voxelSize")?;
    let gap = props.get_vector3("voxelGap").unwrap_or([0.; 3]);
    let origin = props
        .get_vector3("indexOrigin")
        .map(Vector3::from)
        .unwrap_or_else(Vector3::zeros);

    let step = axes[axis] * (voxel_size[axis] + gap[axis]);
    let origin = origin + step * (extent.saturating_sub(1) as f64);
    let flipped = -axes[axis];
    let _ = props.set(AXIS_VECTORS[axis], [flipped[0], flipped[1], flipped[2]]);
    if axis != 2 && !props.contains("sliceVec") {
        let _ = props.set("sliceVec", [axes[2][0], axes[2][1], axes[2][2]]);
    }
    let _ = props.set("indexOrigin", [origin[0], origin[1], origin[2]]);
    debug!("flipped {} (extent {}), new indexOrigin {:?}", AXIS_VECTORS[axis], extent, origin.as_slice());
    Ok(())
}

/// Position of the voxel at `index` in native space.
pub fn voxel_position(props: &PropertyMap, index: [f64; 3]) -> Result<Vector3<f64>> {
    let m = nifti2native() * get_nifti_matrix(props)?;
    let p = m * Vector4::new(index[0], index[1], index[2], 1.);
    Ok(Vector3::new(p[0], p[1], p[2]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn scenario_a() -> PropertyMap {
        let mut props = PropertyMap::new();
        let _ = props.set("rowVec", [1., 0., 0.]);
        let _ = props.set("columnVec", [0., 1., 0.]);
        let _ = props.set("sliceVec", [0., 0., 1.]);
        let _ = props.set("voxelSize", [2., 2., 3.]);
        let _ = props.set("indexOrigin", [-63., -63., -43.5]);
        props
    }

    #[test]
    fn nifti_matrix_of_identity_frame() {
        let m = get_nifti_matrix(&scenario_a()).unwrap();
        #[rustfmt::skip]
        let expected = Matrix4::new(
            -2., 0., 0., 63.,
            0., -2., 0., 63.,
            0., 0., 3., -43.5,
            0., 0., 0., 1.,
        );
        assert_relative_eq!(m, expected);
    }

    #[test]
    fn store_both_forms() {
        let mut h = NiftiHeader::zeroed();
        store_sform(&scenario_a(), &mut h).unwrap();
        store_qform(&scenario_a(), &mut h).unwrap();
        assert_eq!(h.srow_x, [-2., 0., 0., 63.]);
        assert_eq!(h.srow_y, [0., -2., 0., 63.]);
        assert_eq!(h.srow_z, [0., 0., 3., -43.5]);
        assert_eq!(h.sform_code, 1);
        assert_eq!(h.qform_code, 1);
        assert_eq!(h.pixdim[..4], [1., 2., 2., 3.]);
        assert_relative_eq!(h.quatern_b, 0.);
        assert_relative_eq!(h.quatern_c, 0.);
        assert_relative_eq!(h.quatern_d, 1.);
        assert_eq!([h.qoffset_x, h.qoffset_y, h.qoffset_z], [63., 63., -43.5]);
    }

    #[test]
    fn forms_agree() {
        let mut props = PropertyMap::new();
        let s = std::f64::consts::FRAC_1_SQRT_2;
        let _ = props.set("rowVec", [s, s, 0.]);
        let _ = props.set("columnVec", [-s, s, 0.]);
        let _ = props.set("sliceVec", [0., 0., -1.]);
        let _ = props.set("voxelSize", [1.5, 1.5, 4.]);
        let _ = props.set("indexOrigin", [10., -20., 30.]);

        let mut h = NiftiHeader::zeroed();
        store_sform(&props, &mut h).unwrap();
        store_qform(&props, &mut h).unwrap();
        // mirrored frame
        assert_eq!(h.pixdim[0], -1.);

        let mut from_s = PropertyMap::new();
        use_sform(&mut from_s, &h);
        let mut from_q = PropertyMap::new();
        use_qform(&mut from_q, &h);
        for name in AXIS_VECTORS.iter().chain(&["voxelSize", "indexOrigin"]) {
            let a = Vector3::from(from_s.get_vector3(name).unwrap());
            let b = Vector3::from(from_q.get_vector3(name).unwrap());
            let expected = Vector3::from(props.get_vector3(name).unwrap());
            assert_relative_eq!(a, b, epsilon = 1e-5);
            assert_relative_eq!(a, expected, epsilon = 1e-5);
        }
    }

    #[test]
    fn proper_frame_has_positive_qfac() {
        let mut h = NiftiHeader::zeroed();
        store_qform(&scenario_a(), &mut h).unwrap();
        assert_eq!(h.pixdim[0], 1.);
    }

    #[test]
    fn long_quaternion_is_normalized() {
        let mut h = NiftiHeader::default();
        h.qform_code = 1;
        h.quatern_b = 0.;
        h.quatern_c = 0.;
        h.quatern_d = 2.;
        let mut props = PropertyMap::new();
        use_qform(&mut props, &h);
        assert_relative_eq!(
            Vector3::from(props.get_vector3("rowVec").unwrap()),
            Vector3::new(1., 0., 0.)
        );
    }

    #[test]
    fn identity_fallback_and_units() {
        let mut h = NiftiHeader::default();
        h.pixdim = [1., 0.002, 0.002, 0.003, 0., 0., 0., 0.];
        h.xyzt_units = Unit::Meter as u8;
        let mut props = PropertyMap::new();
        read_geometry(&mut props, &h);
        assert_eq!(props.get_vector3("rowVec"), Some([-1., 0., 0.]));
        assert_eq!(props.get_vector3("columnVec"), Some([0., -1., 0.]));
        assert_eq!(props.get_vector3("indexOrigin"), Some([0., 0., 0.]));
        let size = Vector3::from(props.get_vector3("voxelSize").unwrap());
        assert_relative_eq!(size, Vector3::new(2., 2., 3.), epsilon = 1e-4);
        assert!(!props.contains("nifti/sform_code"));
    }

    #[test]
    fn flipping_preserves_positions() {
        let mut props = scenario_a();
        let before = voxel_position(&props, [3., 5., 7.]).unwrap();
        flip_geometry(&mut props, 1, 64).unwrap();
        assert_eq!(props.get_vector3("columnVec"), Some([0., -1., 0.]));
        let after = voxel_position(&props, [3., 58., 7.]).unwrap();
        assert_relative_eq!(before, after);
    }
}
