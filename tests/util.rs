use nifti_sa::{DataElement, PropertyMap, VoxelVolume};

/// Offsets of header fields, as laid out in a NIfTI-1 file.
#[allow(dead_code)]
pub mod offset {
    pub const SFORM_CODE: usize = 254;
}

/// Geometry properties of a volume with the given axes.
pub fn geometry(
    row: [f64; 3],
    column: [f64; 3],
    slice: [f64; 3],
    voxel_size: [f64; 3],
    origin: [f64; 3],
) -> PropertyMap {
    let mut props = PropertyMap::new();
    let _ = props.set("rowVec", row);
    let _ = props.set("columnVec", column);
    let _ = props.set("sliceVec", slice);
    let _ = props.set("voxelSize", voxel_size);
    let _ = props.set("indexOrigin", origin);
    props
}

/// A volume with unit voxels and identity orientation.
#[allow(dead_code)]
pub fn identity_volume<T: DataElement>(size: [usize; 4], values: Vec<T>) -> VoxelVolume {
    VoxelVolume::from_vec(size, values).unwrap().with_props(geometry(
        [1., 0., 0.],
        [0., 1., 0.],
        [0., 0., 1.],
        [1., 1., 1.],
        [0., 0., 0.],
    ))
}

/// Rotation by `angle` radians around the unit `axis`.
#[allow(dead_code)]
pub fn rotation(axis: [f64; 3], angle: f64) -> [[f64; 3]; 3] {
    let [x, y, z] = axis;
    let (s, c) = angle.sin_cos();
    let t = 1. - c;
    [
        [t * x * x + c, t * x * y + s * z, t * x * z - s * y],
        [t * x * y - s * z, t * y * y + c, t * y * z + s * x],
        [t * x * z + s * y, t * y * z - s * x, t * z * z + c],
    ]
}
