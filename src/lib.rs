//! Standalone implementation of the NIfTI-1 file format.
//!
//! Single-file images (`.nii`, optionally gzip compressed) are read into a
//! [`VoxelVolume`]: a 4-D array of voxels plus a [`PropertyMap`] holding
//! the scanner geometry, slice timing and DICOM attributes recovered from
//! the header and its DcmMeta extension. Volumes are written back with the
//! conventions of plain NIfTI-1, FSL or SPM.
//!
//! # Example
//!
//! ```no_run
//! use nifti_sa::{Dialect, ReaderOptions, WriterOptions};
//! # use nifti_sa::Result;
//!
//! # fn run() -> Result<()> {
//! let volumes = ReaderOptions::new().read_file("t1.nii.gz")?;
//! let volume = &volumes[0];
//! println!("{:?} voxels of kind {:?}", volume.size(), volume.kind());
//! if let Some(tr) = volume.props().get_f64("repetitionTime") {
//!     println!("TR = {} ms", tr);
//! }
//!
//! WriterOptions::new("t1_fsl.nii")
//!     .dialect(Dialect::Fsl)
//!     .write_volume(volume)?;
//! # Ok(())
//! # }
//! ```
//!
//! [`VoxelVolume`]: ./volume/struct.VoxelVolume.html
//! [`PropertyMap`]: ./property/struct.PropertyMap.html
#![deny(missing_debug_implementations)]
#![warn(missing_docs, unused_extern_crates, trivial_casts, unused_results)]

pub mod affine;
pub mod descrip;
pub mod dicom;
pub mod error;
pub mod extension;
pub mod header;
pub mod object;
pub mod property;
pub mod slice_timing;
pub mod typedef;
pub mod typemap;
mod util;
pub mod volume;
pub mod writer;

pub use byteordered::Endianness;
pub use error::{NiftiError, Result};
pub use header::NiftiHeader;
pub use object::{load, read_header, ReaderOptions};
pub use property::{PropertyMap, PropertyValue};
pub use typedef::{Dialect, NiftiType, SliceOrder, Unit, XForm};
pub use volume::element::{DataElement, ScalarKind, ScalingPair, VoxelData};
#[cfg(feature = "ndarray_volumes")]
pub use volume::ndarray::IntoNdArray;
pub use volume::VoxelVolume;
pub use writer::{encode, write, WriterOptions};
