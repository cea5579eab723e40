//! Private utility module
use flate2::bufread::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read, Result as IoResult};
use std::path::{Path, PathBuf};

/// Bytes of a fixed-size text field up to its first NUL.
pub fn trim_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

/// Number of voxels in a volume of the given size, or `None` if it
/// overflows `usize`.
pub fn voxel_count(size: &[usize; 4]) -> Option<usize> {
    size.iter().try_fold(1usize, |n, &d| n.checked_mul(d))
}

/// Check whether the given file path ends with `.gz`.
pub fn is_gz_file<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .file_name()
        .map(|a| a.to_string_lossy().ends_with(".gz"))
        .unwrap_or(false)
}

/// Read the whole file into memory, decompressing it on the fly if its
/// name ends with `.gz`.
pub fn read_whole_file<P: AsRef<Path>>(path: P) -> IoResult<Vec<u8>> {
    let path = path.as_ref();
    let file = BufReader::new(File::open(path)?);
    let mut bytes = Vec::new();
    if is_gz_file(path) {
        let _ = GzDecoder::new(file).read_to_end(&mut bytes)?;
    } else {
        let mut file = file;
        let _ = file.read_to_end(&mut bytes)?;
    }
    Ok(bytes)
}

/// Path of a sidecar file next to `path`: the `.nii` or `.nii.gz`
/// extension is replaced by `extension`.
pub fn sidecar_path<P: AsRef<Path>>(path: P, extension: &str) -> PathBuf {
    let path = path.as_ref();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let base = name.strip_suffix(".gz").unwrap_or(name.as_str());
    let stem = base.strip_suffix(".nii").unwrap_or(base);
    path.with_file_name(format!("{}.{}", stem, extension))
}
