//! This module defines the voxel volume type produced by the reader and
//! consumed by the writer: a 4-D array of voxels together with the
//! properties describing its geometry and acquisition.
//!
//! An integration with `ndarray` allows for more elegant and
//! efficient approaches, and should be preferred when possible.
//! In order to do so, you must add the `ndarray_volumes` feature
//! to this crate.

pub mod element;
#[cfg(feature = "ndarray_volumes")]
pub mod ndarray;

use self::element::{DataElement, ScalarKind, VoxelData};
use crate::error::{NiftiError, Result};
use crate::property::PropertyMap;
use crate::util::voxel_count;

/// A volume of voxels with up to four dimensions
/// (row, column, slice, time).
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelVolume {
    size: [usize; 4],
    data: VoxelData,
    props: PropertyMap,
}

impl VoxelVolume {
    /// Create a volume without properties.
    ///
    /// # Errors
    ///
    /// - `NiftiError::IncorrectVolumeLength` if the number of elements does
    ///   not match the product of `size`.
    pub fn new(size: [usize; 4], data: VoxelData) -> Result<Self> {
        let expected = voxel_count(&size).ok_or(NiftiError::VolumeTooLarge(size))?;
        if data.len() != expected {
            return Err(NiftiError::IncorrectVolumeLength(data.len(), expected));
        }
        Ok(VoxelVolume {
            size,
            data,
            props: PropertyMap::new(),
        })
    }

    /// Create a volume out of a vector of elements.
    pub fn from_vec<T: DataElement>(size: [usize; 4], values: Vec<T>) -> Result<Self> {
        Self::new(size, T::into_data(values))
    }

    /// Replace the properties of this volume.
    pub fn with_props(mut self, props: PropertyMap) -> Self {
        self.props = props;
        self
    }

    /// Size of the volume (row, column, slice, time).
    pub fn size(&self) -> [usize; 4] {
        self.size
    }

    /// Number of voxels in one slice.
    pub fn slice_len(&self) -> usize {
        self.size[0] * self.size[1]
    }

    /// The voxel data.
    pub fn data(&self) -> &VoxelData {
        &self.data
    }

    /// Kind of the voxel values.
    pub fn kind(&self) -> ScalarKind {
        self.data.kind()
    }

    /// Geometry, timing and DICOM properties.
    pub fn props(&self) -> &PropertyMap {
        &self.props
    }

    /// Mutable access to the properties.
    pub fn props_mut(&mut self) -> &mut PropertyMap {
        &mut self.props
    }

    /// Replace the voxel data, keeping size and properties.
    ///
    /// # Errors
    ///
    /// - `NiftiError::IncorrectVolumeLength` if the new data has a
    ///   different number of elements.
    pub fn set_data(&mut self, data: VoxelData) -> Result<()> {
        if data.len() != self.data.len() {
            return Err(NiftiError::IncorrectVolumeLength(data.len(), self.data.len()));
        }
        self.data = data;
        Ok(())
    }

    /// Change the size without touching the data. The number of voxels
    /// must stay the same.
    pub fn reshape(&mut self, size: [usize; 4]) -> Result<()> {
        let expected = voxel_count(&size).ok_or(NiftiError::VolumeTooLarge(size))?;
        if expected != self.data.len() {
            return Err(NiftiError::IncorrectVolumeLength(self.data.len(), expected));
        }
        self.size = size;
        Ok(())
    }

    /// Decompose the volume into its parts.
    pub fn into_parts(self) -> ([usize; 4], VoxelData, PropertyMap) {
        (self.size, self.data, self.props)
    }
}
