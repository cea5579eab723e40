//! Types for error handling go here.

use crate::volume::element::ScalarKind;
use quick_error::quick_error;
use std::io::Error as IOError;

quick_error! {
    /// Error type for all error variants originated by this crate.
    #[derive(Debug)]
    #[non_exhaustive]
    pub enum NiftiError {
        /// An invalid NIfTI-1 file was read.
        InvalidFormat {
            display("Invalid NIfTI-1 file")
        }
        /// The source ends before the 348 header bytes.
        TruncatedHeader(len: usize) {
            display("Header is too short: got {} of 348 bytes", len)
        }
        /// The voxel payload is shorter than what the header announces.
        IncompatibleLength(got: usize, expected: usize) {
            display("Voxel payload holds {} bytes, but {} are required", got, expected)
        }
        /// The number of elements does not match the volume size.
        IncorrectVolumeLength(got: usize, expected: usize) {
            display("Volume data has {} elements, but its size requires {}", got, expected)
        }
        /// The volume has more voxels than can be addressed, or an axis
        /// longer than a NIfTI-1 dimension can hold.
        VolumeTooLarge(size: [usize; 4]) {
            display("Volume of size {:?} is too large", size)
        }
        /// The header's datatype is not supported.
        UnsupportedDataType(code: i16) {
            display("Unsupported data type code {}", code)
        }
        /// The voxel kind has no NIfTI-1 counterpart.
        UnsupportedVoxelKind(kind: ScalarKind) {
            display("Voxel kind {:?} cannot be stored as NIfTI-1", kind)
        }
        /// A color volume cannot be written for fsl because the time axis
        /// is already in use.
        ColorWithoutTimeAxis(size: [usize; 4]) {
            display("Cannot store color image of size {:?} using the fsl dialect (the 4th dimension is needed for the colors)", size)
        }
        /// A property the operation depends on is missing or of the wrong type.
        MissingProperty(name: String) {
            display("Missing or malformed property `{}`", name)
        }
        /// The field `descrip` must be at most 80 bytes long.
        IncorrectDescriptionLength(len: usize) {
            display("Description length ({} bytes) is greater than 80 bytes.", len)
        }
        /// An enumerated header field holds an unknown code.
        InvalidCode(typename: &'static str, code: i16) {
            display("invalid code `{}` for header field {}", code, typename)
        }
        /// The DcmMeta extension is not valid JSON.
        Json(err: serde_json::Error) {
            from()
            source(err)
            display("Invalid JSON extension: {}", err)
        }
        /// I/O Error
        Io(err: IOError) {
            from()
            source(err)
            display("I/O Error: {}", err)
        }
    }
}

/// Alias type for results originated from this crate.
pub type Result<T> = ::std::result::Result<T, NiftiError>;
