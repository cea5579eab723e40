//! Interfaces and implementations specific to integration with `ndarray`.
//!
//! This module introduces the trait [`IntoNdArray`], which enables mapping a
//! [`VoxelVolume`] into an [`Array`] with a dynamic number of dimensions and
//! an arbitrary element type.
//!
//! If the source and target element kinds match, the voxel vector is moved
//! into the array as is. Otherwise, real scalar values are cast to the target
//! type through `f64`. Complex, color and vector voxels can only be
//! extracted with their own element type.
//!
//! #### Note on memory order
//!
//! Voxels are kept in column major order (also called Fortran order). As
//! such, the array resulting from this operation will also be in this memory
//! order, rather than the usual row major order (AKA C ordering).
//!
//! [`IntoNdArray`]: ./trait.IntoNdArray.html
//! [`VoxelVolume`]: ../struct.VoxelVolume.html
//! [`Array`]: ../../../ndarray/type.Array.html
//!
use crate::error::{NiftiError, Result};
use crate::volume::element::DataElement;
use crate::volume::VoxelVolume;
use ndarray::{Array, IxDyn, ShapeBuilder};

/// Trait for volumes which can be converted to an ndarray.
///
/// Please see the [module-level documentation](index.html) for more details.
pub trait IntoNdArray {
    /// Consume the volume into an ndarray with as many dimensions as the
    /// volume effectively has, and the given target element type `T`.
    fn into_ndarray<T>(self) -> Result<Array<T, IxDyn>>
    where
        T: DataElement;
}

impl IntoNdArray for VoxelVolume {
    fn into_ndarray<T>(self) -> Result<Array<T, IxDyn>>
    where
        T: DataElement,
    {
        let (size, data, _) = self.into_parts();
        let ndim = size.iter().rposition(|&d| d > 1).map_or(1, |i| i + 1);
        let shape = &size[..ndim];

        let values: Vec<T> = match T::from_data(data) {
            Ok(values) => values,
            Err(data) => data
                .to_f64_vec()
                .ok_or(NiftiError::UnsupportedVoxelKind(data.kind()))?
                .into_iter()
                .map(T::from_f64)
                .collect(),
        };
        let len = values.len();
        Array::from_shape_vec(IxDyn(shape).f(), values)
            .map_err(|_| NiftiError::IncorrectVolumeLength(len, shape.iter().product()))
    }
}
