//! An application for writing a NIFTI file from scratch

use nifti_sa::{Dialect, PropertyMap, VoxelVolume, WriterOptions};
use std::env;

fn main() {
    let mut args = env::args().skip(1);
    let filename = args.next().expect("Path to NIFTI file is required");
    let dialect = match args.next().as_deref() {
        Some("fsl") => Dialect::Fsl,
        Some("spm") => Dialect::Spm,
        _ => Dialect::None,
    };

    // generate some test data 64x64x8 float32, a gradient along the rows
    let values: Vec<f32> = (0..64 * 64 * 8).map(|i| (i % 64) as f32).collect();
    let mut props = PropertyMap::new();
    let _ = props.set("rowVec", [1., 0., 0.]);
    let _ = props.set("columnVec", [0., 1., 0.]);
    let _ = props.set("sliceVec", [0., 0., 1.]);
    let _ = props.set("voxelSize", [3., 3., 4.]);
    let _ = props.set("indexOrigin", [-94.5, -94.5, -14.]);
    let _ = props.set("repetitionTime", 2000.);
    let _ = props.set("sequenceDescription", "gen_nifti");

    let volume = VoxelVolume::from_vec([64, 64, 8, 1], values)
        .unwrap()
        .with_props(props);
    WriterOptions::new(&filename)
        .dialect(dialect)
        .write_volume(&volume)
        .unwrap();
}
