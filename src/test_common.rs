use ndarray::Array3;
use num_complex::Complex;

use crate::{
    config::{ChanAvgContext, ChanAvgContextBuilder, ChanBin},
    tvi::OwnedVisBuffer,
};

/// A buffer of `shape` for `spw` with distinct visibilities, a sprinkling of
/// flags, and channels every 10MHz from 100MHz.
pub fn synthetic_buffer(spw: usize, shape: (usize, usize, usize)) -> OwnedVisBuffer {
    let vis = Array3::from_shape_fn(shape, |(corr_idx, chan_idx, row_idx)| {
        Complex::new(
            (corr_idx * 100 + chan_idx) as f32,
            -(row_idx as f32),
        )
    });
    let flags = Array3::from_shape_fn(shape, |(corr_idx, chan_idx, row_idx)| {
        (corr_idx + chan_idx + row_idx) % 7 == 6
    });
    OwnedVisBuffer::new(spw, vis, flags, 100e6, 10e6)
}

pub fn chanavg_ctx(chanbin: ChanBin, spw_num_chans: &[(usize, usize)]) -> ChanAvgContext {
    ChanAvgContextBuilder::default()
        .chanbin(chanbin)
        .spw_num_chans(spw_num_chans.to_vec())
        .build()
        .unwrap()
}
