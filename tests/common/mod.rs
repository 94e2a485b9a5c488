use chanavg::{
    ndarray::Array3, ChanAvgContext, ChanAvgContextBuilder, ChanBin, Complex, OwnedVisBuffer,
};

/// A buffer of `shape` for `spw` where the visibility of each channel is its
/// channel index, with weights of 1 and sigmas of 1.
pub fn ramp_buffer(spw: usize, shape: (usize, usize, usize)) -> OwnedVisBuffer {
    let vis = Array3::from_shape_fn(shape, |(_, chan_idx, _)| Complex::new(chan_idx as f32, 0.));
    let flags = Array3::from_elem(shape, false);
    let mut buffer = OwnedVisBuffer::new(spw, vis, flags, 150e6, 40e3);
    buffer.weights = Some(Array3::from_elem(shape, 1.));
    buffer.sigmas = Some(Array3::from_elem(shape, 1.));
    buffer.vis_model = Some(buffer.vis.mapv(|vis| vis * 2.));
    buffer.vis_corrected = Some(buffer.vis.mapv(|vis| vis * 3.));
    buffer
}

pub fn chanavg_ctx(chanbin: ChanBin, spw_num_chans: &[(usize, usize)]) -> ChanAvgContext {
    ChanAvgContextBuilder::default()
        .chanbin(chanbin)
        .spw_num_chans(spw_num_chans.to_vec())
        .build()
        .unwrap()
}
