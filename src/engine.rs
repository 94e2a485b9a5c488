//! Drive a reduction kernel along every column of a cube map.

use log::{trace, warn};

use crate::{cube::DataCubeMap, kernels::AverageKernel, ChanAvgError};

/// The number of channels after averaging `num_input_chans` channels in bins of
/// `width`, counting a ragged final bin.
///
/// # Examples
///
/// ```rust
/// use chanavg::num_output_chans;
///
/// assert_eq!(num_output_chans(10, 3), 4);
/// assert_eq!(num_output_chans(9, 3), 3);
/// ```
pub fn num_output_chans(num_input_chans: usize, width: usize) -> usize {
    if width == 0 {
        return 0;
    }
    (num_input_chans + width - 1) / width
}

/// Applies one [`AverageKernel`] with a fixed bin width to whole cube maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelAverageEngine {
    kernel: AverageKernel,
    width: usize,
}

impl ChannelAverageEngine {
    /// Create an engine averaging in bins of `width` channels.
    ///
    /// # Errors
    ///
    /// [`ChanAvgError::InvalidWidth`] if `width` is zero.
    pub fn new(kernel: AverageKernel, width: usize) -> Result<Self, ChanAvgError> {
        if width == 0 {
            return Err(ChanAvgError::InvalidWidth { width });
        }
        Ok(Self { kernel, width })
    }

    /// The kernel this engine applies.
    pub fn kernel(&self) -> AverageKernel {
        self.kernel
    }

    /// The bin width.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Average every `(correlation, row)` column of `input` into `output`.
    ///
    /// # Errors
    ///
    /// - [`ChanAvgError::BadArrayShape`] if the maps have a different number of
    ///   columns
    /// - anything [`AverageKernel::apply`] returns
    pub fn transform_all(
        &self,
        input: &mut DataCubeMap,
        output: &mut DataCubeMap,
    ) -> Result<(), ChanAvgError> {
        trace!("start transform_all");
        if input.num_columns() != output.num_columns() {
            return Err(ChanAvgError::BadArrayShape {
                argument: "output".into(),
                function: "ChannelAverageEngine::transform_all".into(),
                expected: format!("{} (correlation, row) columns", input.num_columns()),
                received: format!("{} (correlation, row) columns", output.num_columns()),
            });
        }

        let num_bins = num_output_chans(input.column_length(), self.width);
        if num_bins > output.column_length() {
            warn!(
                "{} channels in bins of {} make {} bins, but output only has {} channels. \
                the last {} bins will be skipped",
                input.column_length(),
                self.width,
                num_bins,
                output.column_length(),
                num_bins - output.column_length()
            );
        }

        input.setup_column_iteration();
        output.setup_column_iteration();
        while !input.past_end() {
            self.transform(input, output)?;
            input.advance();
            output.advance();
        }
        trace!("end transform_all");
        Ok(())
    }

    /// Average the current column of `input` into the current column of
    /// `output`, full bins first then the ragged trailing bin. Bins which don't
    /// fit in the output are not written.
    ///
    /// Returns the number of output channels written.
    ///
    /// # Errors
    ///
    /// anything [`AverageKernel::apply`] returns
    pub fn transform(
        &self,
        input: &DataCubeMap,
        output: &mut DataCubeMap,
    ) -> Result<usize, ChanAvgError> {
        let num_input_chans = input.column_length();
        let num_output_chans = output.column_length();
        let tail = num_input_chans % self.width;
        let limit = num_input_chans - tail;

        let mut out_idx = 0;
        for start in (0..limit).step_by(self.width) {
            if out_idx >= num_output_chans {
                return Ok(out_idx);
            }
            self.kernel
                .apply(input, output, start, out_idx, self.width)?;
            out_idx += 1;
        }
        if tail > 0 && out_idx < num_output_chans {
            self.kernel.apply(input, output, limit, out_idx, tail)?;
            out_idx += 1;
        }
        Ok(out_idx)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::{Array3, Axis};
    use num_complex::Complex;

    use super::{num_output_chans, ChannelAverageEngine};
    use crate::{
        cube::{DataColumn, DataCubeMap, DataCubeView},
        kernels::AverageKernel,
        ChanAvgError,
    };

    #[test]
    fn test_num_output_chans() {
        assert_eq!(num_output_chans(10, 3), 4);
        assert_eq!(num_output_chans(9, 3), 3);
        assert_eq!(num_output_chans(1, 1), 1);
        assert_eq!(num_output_chans(7, 3), 3);
        assert_eq!(num_output_chans(5, 0), 0);
    }

    #[test]
    fn test_zero_width() {
        assert!(matches!(
            ChannelAverageEngine::new(AverageKernel::Plain, 0),
            Err(ChanAvgError::InvalidWidth { width: 0 })
        ));
    }

    #[test]
    fn test_width_one_is_identity() {
        let vis = Array3::from_shape_fn((2, 5, 3), |(c, ch, r)| {
            Complex::new((c * 100 + ch * 10 + r) as f32, -(ch as f32))
        });
        let flags = Array3::from_shape_fn((2, 5, 3), |(c, ch, r)| (c + ch + r) % 3 == 0);
        let mut out_vis = Array3::from_elem((2, 5, 3), Complex::new(0_f32, 0.));
        let mut out_flags = Array3::from_elem((2, 5, 3), false);

        {
            let mut input = DataCubeMap::new();
            input
                .add_column(DataColumn::Data, DataCubeView::read(vis.view()))
                .unwrap();
            input
                .add_column(DataColumn::Flag, DataCubeView::read(flags.view()))
                .unwrap();
            let mut output = DataCubeMap::new();
            output
                .add_column(DataColumn::Data, DataCubeView::write(out_vis.view_mut()))
                .unwrap();
            output
                .add_column(DataColumn::Flag, DataCubeView::write(out_flags.view_mut()))
                .unwrap();
            ChannelAverageEngine::new(AverageKernel::Flagged, 1)
                .unwrap()
                .transform_all(&mut input, &mut output)
                .unwrap();
            ChannelAverageEngine::new(AverageKernel::LogicalAnd, 1)
                .unwrap()
                .transform_all(&mut input, &mut output)
                .unwrap();
        }

        assert_eq!(out_vis, vis);
        assert_eq!(out_flags, flags);
    }

    #[test]
    fn test_ragged_trailing_bin() {
        let data = Array3::from_shape_fn((1, 7, 2), |(_, ch, r)| (ch + r * 10) as f32);
        let mut out = Array3::from_elem((1, 3, 2), -1_f32);
        {
            let mut input = DataCubeMap::new();
            input
                .add_column(DataColumn::Data, DataCubeView::read(data.view()))
                .unwrap();
            let mut output = DataCubeMap::new();
            output
                .add_column(DataColumn::Data, DataCubeView::write(out.view_mut()))
                .unwrap();
            ChannelAverageEngine::new(AverageKernel::Plain, 3)
                .unwrap()
                .transform_all(&mut input, &mut output)
                .unwrap();
        }
        let row_0 = out.index_axis(Axis(2), 0);
        assert_abs_diff_eq!(row_0[(0, 0)], 1.);
        assert_abs_diff_eq!(row_0[(0, 1)], 4.);
        // the last bin is built from channel 6 alone
        assert_abs_diff_eq!(row_0[(0, 2)], 6.);
        assert_abs_diff_eq!(out[(0, 2, 1)], 16.);
    }

    #[test]
    fn test_trailing_bin_skipped_when_output_short() {
        let data = Array3::from_shape_fn((1, 7, 1), |(_, ch, _)| ch as f32);
        let mut out = Array3::from_elem((1, 2, 1), -1_f32);
        let mut input = DataCubeMap::new();
        input
            .add_column(DataColumn::Data, DataCubeView::read(data.view()))
            .unwrap();
        let engine = ChannelAverageEngine::new(AverageKernel::Plain, 3).unwrap();
        {
            let mut output = DataCubeMap::new();
            output
                .add_column(DataColumn::Data, DataCubeView::write(out.view_mut()))
                .unwrap();
            input.setup_column_iteration();
            output.setup_column_iteration();
            assert_eq!(engine.transform(&input, &mut output).unwrap(), 2);
        }
        assert_abs_diff_eq!(out[(0, 0, 0)], 1.);
        assert_abs_diff_eq!(out[(0, 1, 0)], 4.);

        // full bins past the end of the output are skipped too
        let mut tiny = Array3::from_elem((1, 1, 1), -1_f32);
        {
            let mut output = DataCubeMap::new();
            output
                .add_column(DataColumn::Data, DataCubeView::write(tiny.view_mut()))
                .unwrap();
            engine.transform_all(&mut input, &mut output).unwrap();
        }
        assert_abs_diff_eq!(tiny[(0, 0, 0)], 1.);
    }

    #[test]
    fn test_mismatched_columns() {
        let data = Array3::from_elem((2, 4, 3), 1_f32);
        let mut out = Array3::from_elem((2, 2, 2), 0_f32);
        let mut input = DataCubeMap::new();
        input
            .add_column(DataColumn::Data, DataCubeView::read(data.view()))
            .unwrap();
        let mut output = DataCubeMap::new();
        output
            .add_column(DataColumn::Data, DataCubeView::write(out.view_mut()))
            .unwrap();
        assert!(matches!(
            ChannelAverageEngine::new(AverageKernel::Plain, 2)
                .unwrap()
                .transform_all(&mut input, &mut output),
            Err(ChanAvgError::BadArrayShape { .. })
        ));
    }
}
