//! Methods for moving flags and weights between native and averaged resolution.

use log::trace;
use ndarray::{parallel::prelude::*, ArrayView3, ArrayViewMut, ArrayViewMut3, Axis, Dimension};

use crate::ChanAvgError;

/// For each native channel, the index of the averaged channel it falls into.
///
/// A `width` of zero is treated as 1.
pub fn chan_to_bin_map(num_chans: usize, width: usize) -> Vec<usize> {
    let width = width.max(1);
    (0..num_chans).map(|chan_idx| chan_idx / width).collect()
}

/// Propagate an edited flag cube at averaged resolution back onto the native
/// resolution flag cube.
///
/// Every native channel whose bin is flagged in `edited` is flagged in
/// `high_res`. Flags are only ever set, so existing flags in `high_res` are
/// kept. Native channels whose bin index is past the end of `edited` are left
/// alone.
///
/// # Errors
///
/// - [`ChanAvgError::InvalidWidth`] if `width` is zero
/// - [`ChanAvgError::BadArrayShape`] if the correlation or row counts differ
///
/// # Examples
///
/// ```rust
/// use chanavg::{flags::propagate_chan_avg_flags, ndarray::Array3};
///
/// let edited = Array3::from_shape_vec((1, 2, 1), vec![false, true]).unwrap();
/// let mut high_res = Array3::from_elem((1, 4, 1), false);
/// high_res[(0, 0, 0)] = true;
///
/// propagate_chan_avg_flags(edited.view(), high_res.view_mut(), 2).unwrap();
///
/// assert_eq!(
///     high_res.iter().copied().collect::<Vec<_>>(),
///     vec![true, false, true, true]
/// );
/// ```
pub fn propagate_chan_avg_flags(
    edited: ArrayView3<bool>,
    mut high_res: ArrayViewMut3<bool>,
    width: usize,
) -> Result<(), ChanAvgError> {
    trace!("start propagate_chan_avg_flags");
    if width == 0 {
        return Err(ChanAvgError::InvalidWidth { width });
    }
    let (edited_corrs, _, edited_rows) = edited.dim();
    let (high_res_corrs, _, high_res_rows) = high_res.dim();
    if (edited_corrs, edited_rows) != (high_res_corrs, high_res_rows) {
        return Err(ChanAvgError::BadArrayShape {
            argument: "edited".into(),
            function: "propagate_chan_avg_flags".into(),
            expected: format!("({high_res_corrs}, _, {high_res_rows})"),
            received: format!("{:?}", edited.dim()),
        });
    }

    high_res
        .axis_iter_mut(Axis(2))
        .into_par_iter()
        .zip(edited.axis_iter(Axis(2)).into_par_iter())
        .for_each(|(mut high_res_row, edited_row)| {
            for ((corr_idx, chan_idx), flag) in high_res_row.indexed_iter_mut() {
                if let Some(true) = edited_row.get((corr_idx, chan_idx / width)) {
                    *flag = true;
                }
            }
        });

    trace!("end propagate_chan_avg_flags");
    Ok(())
}

/// Convert a sigma to a weight, `1 / sigma^2`. Sigmas too small to invert give
/// a weight of zero.
pub fn sigma_to_weight(sigma: f32) -> f32 {
    if sigma > f32::MIN_POSITIVE {
        1. / (sigma * sigma)
    } else {
        0.
    }
}

/// Convert a weight to a sigma, `1 / sqrt(weight)`. Weights too small to invert
/// give a sigma of -1.
pub fn weight_to_sigma(weight: f32) -> f32 {
    if weight > f32::MIN_POSITIVE {
        1. / weight.sqrt()
    } else {
        -1.
    }
}

/// [`sigma_to_weight`] over a whole array, in place.
pub fn sigma_to_weight_array<D: Dimension>(mut array: ArrayViewMut<f32, D>) {
    array.par_map_inplace(|value| *value = sigma_to_weight(*value));
}

/// [`weight_to_sigma`] over a whole array, in place.
pub fn weight_to_sigma_array<D: Dimension>(mut array: ArrayViewMut<f32, D>) {
    array.par_map_inplace(|value| *value = weight_to_sigma(*value));
}
