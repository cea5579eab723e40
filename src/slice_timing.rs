//! Slice acquisition order: guessed from a volume's timing properties when
//! writing, and expanded from the header's `slice_code` when reading.

use crate::header::NiftiHeader;
use crate::property::{PropertyMap, PropertyValue};
use crate::typedef::{SliceOrder, Unit};
use crate::volume::VoxelVolume;
use log::{info, warn};
use num_traits::FromPrimitive;

/// Guess the slice order code and the slice duration (in ms) of a volume.
///
/// The order is decided by comparing `acquisitionTime` (or
/// `acquisitionNumber` if there are no times) of the first, second and
/// middle slice. The duration can only be derived from times; it is 0
/// otherwise.
pub fn guess_slice_ordering(volume: &VoxelVolume) -> (SliceOrder, f64) {
    guess_from_props(volume.props(), volume.size()[2])
}

/// Same as [`guess_slice_ordering`], on the properties of a volume with
/// `slices` slices.
///
/// [`guess_slice_ordering`]: ./fn.guess_slice_ordering.html
pub fn guess_from_props(props: &PropertyMap, slices: usize) -> (SliceOrder, f64) {
    if slices < 2 {
        return (SliceOrder::SeqInc, 0.);
    }
    let (name, values) = match props.get_f64_list("acquisitionTime") {
        Some(times) if times.len() >= slices => ("acquisitionTime", times),
        _ => match props.get_f64_list("acquisitionNumber") {
            Some(numbers) if numbers.len() >= slices => ("acquisitionNumber", numbers),
            _ => return (SliceOrder::SeqInc, 0.),
        },
    };

    let first = values[0];
    let second = values[1];
    let middle = values[slices / 2];

    let order = if first > second {
        if middle > second {
            info!(
                "The \"middle\" {} ({}) is greater than the second ({}), assuming decrementing interleaved slice order",
                name, middle, second
            );
            SliceOrder::AltDec
        } else {
            info!(
                "The first {} ({}) is greater than the second ({}), assuming decrementing slice order",
                name, first, second
            );
            SliceOrder::SeqDec
        }
    } else if middle < second {
        info!(
            "The \"middle\" {} ({}) is less than the second ({}), assuming incrementing interleaved slice order",
            name, middle, second
        );
        SliceOrder::AltInc
    } else {
        SliceOrder::SeqInc
    };

    let duration = if name == "acquisitionTime" {
        let delta = (first - second).abs();
        if order.is_interleaved() {
            delta / 2.
        } else {
            delta
        }
    } else {
        0.
    };
    (order, duration)
}

/// The acquisition sequence of `n` slices of one timestep for the given
/// order: the k-th entry is the index of the k-th acquired slice.
pub fn slice_permutation(order: SliceOrder, n: usize) -> Vec<usize> {
    let evens = (0..n).step_by(2);
    let odds = (1..n).step_by(2);
    match order {
        SliceOrder::Unknown | SliceOrder::SeqInc => (0..n).collect(),
        SliceOrder::SeqDec => (0..n).rev().collect(),
        SliceOrder::AltInc => evens.chain(odds).collect(),
        SliceOrder::AltInc2 => odds.chain(evens).collect(),
        SliceOrder::AltDec => {
            let top = (0..n).rev().step_by(2);
            let next = (0..n.saturating_sub(1)).rev().step_by(2);
            top.chain(next).collect()
        }
        SliceOrder::AltDec2 => {
            let next = (0..n.saturating_sub(1)).rev().step_by(2);
            let top = (0..n).rev().step_by(2);
            next.chain(top).collect()
        }
    }
}

/// Set `acquisitionNumber` (and `acquisitionTime` if the header has a
/// slice duration) from the header's slice code.
///
/// Numbers of timestep `t` are offset by `slices * t`. Times are in ms.
///
/// The `acquisitionNumber` list stored here holds slice indices in
/// acquisition order: entry `k` is the slice acquired `k`-th. A list taken
/// from DcmMeta's `InstanceNumber` instead holds one number per slice, in
/// slice order, and that is how [`guess_from_props`] reads it on write.
/// For the alternating orders the two readings differ, so a file read
/// with `acquisitionNumber` from this function may be guessed as another
/// order when written again. `acquisitionTime` is per slice in both cases
/// and takes precedence when guessing.
///
/// [`guess_from_props`]: ./fn.guess_from_props.html
pub fn parse_slice_ordering(header: &NiftiHeader, volume: &mut VoxelVolume) {
    let [_, _, slices, timesteps] = volume.size();

    let order = match SliceOrder::from_u8(header.slice_code) {
        Some(order) => order,
        None => {
            warn!(
                "Unknown slice code {}, falling back to sequential incrementing order",
                header.slice_code
            );
            SliceOrder::SeqInc
        }
    };

    let permutation = slice_permutation(order, slices);
    let numbers: Vec<i64> = (0..timesteps)
        .flat_map(|t| permutation.iter().map(move |&i| (t * slices + i) as i64))
        .collect();

    let props = volume.props_mut();
    if numbers.len() == 1 {
        let _ = props.set("acquisitionNumber", 0i64);
    } else {
        let _ = props.set("acquisitionNumber", numbers.clone());
    }

    if header.slice_duration > 0. {
        let time_factor = header.xyzt_to_time().map(Unit::to_ms).unwrap_or(1.);
        let step = header.slice_duration as f64 * time_factor;
        let times: Vec<PropertyValue> = numbers
            .iter()
            .map(|&n| PropertyValue::Float(n as f64 * step))
            .collect();
        let _ = props.set("acquisitionTime", times);
    }
}
