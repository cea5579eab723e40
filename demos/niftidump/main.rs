//! An application for reading NIFTI-1 file meta-data and properties.

use nifti_sa::{read_header, ReaderOptions};
use std::env;

fn main() {
    let mut args = env::args().skip(1);
    let filename = args.next().expect("Path to NIFTI file is required");

    let volumes = ReaderOptions::new()
        .read_file(&filename)
        .expect("Failed to read NIFTI file");
    let bytes = std::fs::read(&filename).expect("Failed to read NIFTI file");
    if let Ok(header) = read_header(&bytes) {
        println!("{:#?}", &header);
    }
    for volume in &volumes {
        println!("{:?} voxels of size {:?}", volume.kind(), volume.size());
        for (name, value) in volume.props() {
            println!("  {} = {:?}", name, value);
        }
    }
}
