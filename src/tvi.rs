//! A channel averaging layer over a stream of visibility buffers.
//!
//! [`ChannelAverageTvi`] wraps an upstream [`VisBuffer`] and presents every
//! quantity at averaged resolution. Edited flags go the other way through
//! [`ChannelAverageTvi::write_flag`], which back-propagates them onto the
//! native resolution flags before handing them to the upstream.

use std::{
    collections::{hash_map::Entry, HashMap},
    fmt::{Debug, Display},
    sync::{Mutex, PoisonError},
};

use log::{debug, trace};
use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3};
use num_complex::Complex;

use crate::{
    config::{ChanAvgContext, ChanBinMap, SpwBinning},
    cube::{CubeElement, DataColumn, DataCubeMap, DataCubeView},
    engine::ChannelAverageEngine,
    flags::{propagate_chan_avg_flags, sigma_to_weight_array, weight_to_sigma_array},
    kernels::{AverageKernel, Averageable},
    ChanAvgError,
};

/// The reference frame frequencies are requested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrequencyFrame {
    /// rest frequency
    Rest,
    /// kinematic local standard of rest
    Lsrk,
    /// dynamical local standard of rest
    Lsrd,
    /// barycentric
    Barycentric,
    /// geocentric
    Geocentric,
    /// topocentric
    #[default]
    Topocentric,
}

impl Display for FrequencyFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Rest => "REST",
                Self::Lsrk => "LSRK",
                Self::Lsrd => "LSRD",
                Self::Barycentric => "BARY",
                Self::Geocentric => "GEO",
                Self::Topocentric => "TOPO",
            }
        )
    }
}

/// A source of visibility buffers at native resolution.
///
/// Cubes have the axes `[correlation][channel][row]` and must all match
/// [`VisBuffer::shape`].
pub trait VisBuffer {
    /// `(correlations, channels, rows)` of the current buffer.
    fn shape(&self) -> (usize, usize, usize);

    /// The spectral window of the current buffer.
    fn spectral_window(&self) -> usize;

    /// Flags, `true` is bad.
    ///
    /// # Errors
    ///
    /// if the flags can't be read.
    fn flag_cube(&self) -> Result<ArrayView3<'_, bool>, ChanAvgError>;

    /// Per-channel weights.
    ///
    /// # Errors
    ///
    /// if the buffer has no weight spectrum.
    fn weight_spectrum(&self) -> Result<ArrayView3<'_, f32>, ChanAvgError>;

    /// Per-row weights, `[correlation][row]`.
    ///
    /// # Errors
    ///
    /// if the buffer has no row weights.
    fn weight(&self) -> Result<ArrayView2<'_, f32>, ChanAvgError>;

    /// Per-row sigmas, `[correlation][row]`.
    ///
    /// # Errors
    ///
    /// if the buffer has no row sigmas.
    fn sigma(&self) -> Result<ArrayView2<'_, f32>, ChanAvgError>;

    /// Whether [`VisBuffer::weight_spectrum`] is available.
    fn weight_spectrum_exists(&self) -> bool;

    /// Per-channel sigmas.
    ///
    /// # Errors
    ///
    /// if the buffer has no sigma spectrum.
    fn sigma_spectrum(&self) -> Result<ArrayView3<'_, f32>, ChanAvgError>;

    /// Observed visibilities.
    ///
    /// # Errors
    ///
    /// if the column can't be read.
    fn vis_cube(&self) -> Result<ArrayView3<'_, Complex<f32>>, ChanAvgError>;

    /// Corrected visibilities.
    ///
    /// # Errors
    ///
    /// if the column can't be read.
    fn vis_cube_corrected(&self) -> Result<ArrayView3<'_, Complex<f32>>, ChanAvgError>;

    /// Model visibilities.
    ///
    /// # Errors
    ///
    /// if the column can't be read.
    fn vis_cube_model(&self) -> Result<ArrayView3<'_, Complex<f32>>, ChanAvgError>;

    /// Real valued (single dish) data.
    ///
    /// # Errors
    ///
    /// if the column can't be read.
    fn vis_cube_float(&self) -> Result<ArrayView3<'_, f32>, ChanAvgError>;

    /// Channel frequencies \[Hz\] of `spw` in `frame` at `time`.
    ///
    /// # Errors
    ///
    /// if the frequencies can't be computed.
    fn frequencies(
        &self,
        time: f64,
        frame: FrequencyFrame,
        spw: usize,
        ms_id: usize,
    ) -> Result<Array1<f64>, ChanAvgError>;

    /// Channel widths \[Hz\] of `spw`.
    ///
    /// # Errors
    ///
    /// if the widths can't be read.
    fn channel_widths(&self, spw: usize, ms_id: usize) -> Result<Array1<f64>, ChanAvgError>;

    /// Persist a native resolution flag cube.
    ///
    /// # Errors
    ///
    /// if the flags can't be written.
    fn write_flag(&mut self, flags: ArrayView3<bool>) -> Result<(), ChanAvgError>;
}

/// A [`VisBuffer`] over owned arrays of a single spectral window.
///
/// Optional columns which are `None` report an [`ChanAvgError::Upstream`]
/// error when read.
#[derive(Debug, Clone)]
pub struct OwnedVisBuffer {
    /// spectral window id
    pub spw: usize,
    /// observed visibilities
    pub vis: Array3<Complex<f32>>,
    /// flags, replaced by [`VisBuffer::write_flag`]
    pub flags: Array3<bool>,
    /// weight spectrum
    pub weights: Option<Array3<f32>>,
    /// sigma spectrum
    pub sigmas: Option<Array3<f32>>,
    /// row weights, `[correlation][row]`
    pub row_weights: Option<Array2<f32>>,
    /// row sigmas, `[correlation][row]`
    pub row_sigmas: Option<Array2<f32>>,
    /// corrected visibilities
    pub vis_corrected: Option<Array3<Complex<f32>>>,
    /// model visibilities
    pub vis_model: Option<Array3<Complex<f32>>>,
    /// real valued data
    pub vis_float: Option<Array3<f32>>,
    /// channel frequencies \[Hz\]
    pub freqs_hz: Array1<f64>,
    /// channel widths \[Hz\]
    pub chan_widths_hz: Array1<f64>,
}

impl OwnedVisBuffer {
    /// A buffer with visibilities and flags, `freqs_hz` of `chan_width_hz` wide
    /// channels starting at `start_freq_hz`, and no optional columns.
    pub fn new(
        spw: usize,
        vis: Array3<Complex<f32>>,
        flags: Array3<bool>,
        start_freq_hz: f64,
        chan_width_hz: f64,
    ) -> Self {
        let num_chans = vis.dim().1;
        Self {
            spw,
            vis,
            flags,
            weights: None,
            sigmas: None,
            row_weights: None,
            row_sigmas: None,
            vis_corrected: None,
            vis_model: None,
            vis_float: None,
            freqs_hz: Array1::from_shape_fn(num_chans, |chan_idx| {
                start_freq_hz + chan_idx as f64 * chan_width_hz
            }),
            chan_widths_hz: Array1::from_elem(num_chans, chan_width_hz),
        }
    }
}

fn missing<T>(column: &str) -> Result<T, ChanAvgError> {
    Err(ChanAvgError::Upstream(format!("{column} is not present")))
}

impl VisBuffer for OwnedVisBuffer {
    fn shape(&self) -> (usize, usize, usize) {
        self.vis.dim()
    }

    fn spectral_window(&self) -> usize {
        self.spw
    }

    fn flag_cube(&self) -> Result<ArrayView3<'_, bool>, ChanAvgError> {
        Ok(self.flags.view())
    }

    fn weight_spectrum(&self) -> Result<ArrayView3<'_, f32>, ChanAvgError> {
        self.weights
            .as_ref()
            .map_or_else(|| missing("WEIGHT_SPECTRUM"), |weights| Ok(weights.view()))
    }

    fn weight(&self) -> Result<ArrayView2<'_, f32>, ChanAvgError> {
        self.row_weights
            .as_ref()
            .map_or_else(|| missing("WEIGHT"), |weights| Ok(weights.view()))
    }

    fn sigma(&self) -> Result<ArrayView2<'_, f32>, ChanAvgError> {
        self.row_sigmas
            .as_ref()
            .map_or_else(|| missing("SIGMA"), |sigmas| Ok(sigmas.view()))
    }

    fn weight_spectrum_exists(&self) -> bool {
        self.weights.is_some()
    }

    fn sigma_spectrum(&self) -> Result<ArrayView3<'_, f32>, ChanAvgError> {
        self.sigmas
            .as_ref()
            .map_or_else(|| missing("SIGMA_SPECTRUM"), |sigmas| Ok(sigmas.view()))
    }

    fn vis_cube(&self) -> Result<ArrayView3<'_, Complex<f32>>, ChanAvgError> {
        Ok(self.vis.view())
    }

    fn vis_cube_corrected(&self) -> Result<ArrayView3<'_, Complex<f32>>, ChanAvgError> {
        self.vis_corrected
            .as_ref()
            .map_or_else(|| missing("CORRECTED_DATA"), |vis| Ok(vis.view()))
    }

    fn vis_cube_model(&self) -> Result<ArrayView3<'_, Complex<f32>>, ChanAvgError> {
        self.vis_model
            .as_ref()
            .map_or_else(|| missing("MODEL_DATA"), |vis| Ok(vis.view()))
    }

    fn vis_cube_float(&self) -> Result<ArrayView3<'_, f32>, ChanAvgError> {
        self.vis_float
            .as_ref()
            .map_or_else(|| missing("FLOAT_DATA"), |vis| Ok(vis.view()))
    }

    fn frequencies(
        &self,
        _time: f64,
        _frame: FrequencyFrame,
        spw: usize,
        _ms_id: usize,
    ) -> Result<Array1<f64>, ChanAvgError> {
        if spw != self.spw {
            return Err(ChanAvgError::Upstream(format!(
                "no frequencies for spw {spw}, buffer holds spw {}",
                self.spw
            )));
        }
        Ok(self.freqs_hz.clone())
    }

    fn channel_widths(&self, spw: usize, _ms_id: usize) -> Result<Array1<f64>, ChanAvgError> {
        if spw != self.spw {
            return Err(ChanAvgError::Upstream(format!(
                "no channel widths for spw {spw}, buffer holds spw {}",
                self.spw
            )));
        }
        Ok(self.chan_widths_hz.clone())
    }

    fn write_flag(&mut self, flags: ArrayView3<bool>) -> Result<(), ChanAvgError> {
        if flags.dim() != self.flags.dim() {
            return Err(ChanAvgError::BadArrayShape {
                argument: "flags".into(),
                function: "OwnedVisBuffer::write_flag".into(),
                expected: format!("{:?}", self.flags.dim()),
                received: format!("{:?}", flags.dim()),
            });
        }
        self.flags.assign(&flags);
        Ok(())
    }
}

/// Presents an upstream [`VisBuffer`] at averaged channel resolution.
#[derive(Debug)]
pub struct ChannelAverageTvi<V> {
    upstream: V,
    bin_map: ChanBinMap,
    /// `(correlations, channels)` first seen for each spw
    spw_shapes: Mutex<HashMap<usize, (usize, usize)>>,
}

impl<V: VisBuffer> ChannelAverageTvi<V> {
    /// Wrap `upstream`, averaging as configured by `chanavg_ctx`.
    ///
    /// # Errors
    ///
    /// [`ChanAvgError::Config`] if the bin widths can't be resolved.
    pub fn new(upstream: V, chanavg_ctx: &ChanAvgContext) -> Result<Self, ChanAvgError> {
        trace!("start ChannelAverageTvi::new");
        let bin_map = chanavg_ctx.bin_map()?;
        for (spw, binning) in bin_map.iter() {
            debug!(
                "spw {spw}: {} chans in bins of {} -> {} chans",
                binning.num_input_chans, binning.width, binning.num_output_chans
            );
        }
        trace!("end ChannelAverageTvi::new");
        Ok(Self {
            upstream,
            bin_map,
            spw_shapes: Mutex::new(HashMap::new()),
        })
    }

    /// The wrapped buffer.
    pub fn upstream(&self) -> &V {
        &self.upstream
    }

    /// The wrapped buffer, mutably. Used to move the upstream on to the next
    /// buffer.
    pub fn upstream_mut(&mut self) -> &mut V {
        &mut self.upstream
    }

    /// Unwrap the upstream buffer.
    pub fn into_inner(self) -> V {
        self.upstream
    }

    /// The resolved bin widths.
    pub fn bin_map(&self) -> &ChanBinMap {
        &self.bin_map
    }

    /// The spectral window of the current buffer.
    pub fn spectral_window(&self) -> usize {
        self.upstream.spectral_window()
    }

    /// `(correlations, averaged channels, rows)` of the current buffer.
    ///
    /// # Errors
    ///
    /// see [`ChannelAverageTvi::flag`]
    pub fn shape(&self) -> Result<(usize, usize, usize), ChanAvgError> {
        let (binning, (num_corrs, _, num_rows)) = self.validate()?;
        Ok((num_corrs, binning.num_output_chans, num_rows))
    }

    fn binning(&self, spw: usize) -> Result<SpwBinning, ChanAvgError> {
        self.bin_map
            .get(spw)
            .copied()
            .ok_or(ChanAvgError::UnknownSpw { spw })
    }

    /// Check the upstream shape against the configuration and the shape first
    /// seen for this spw.
    fn validate(&self) -> Result<(SpwBinning, (usize, usize, usize)), ChanAvgError> {
        let spw = self.upstream.spectral_window();
        let binning = self.binning(spw)?;
        let shape @ (num_corrs, num_chans, _) = self.upstream.shape();
        if num_chans != binning.num_input_chans {
            return Err(ChanAvgError::ShapeChanged {
                spw,
                expected: format!("{} channels", binning.num_input_chans),
                received: format!("{num_chans} channels"),
            });
        }
        let mut spw_shapes = self
            .spw_shapes
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match spw_shapes.entry(spw) {
            Entry::Occupied(entry) if *entry.get() != (num_corrs, num_chans) => {
                let (expected_corrs, expected_chans) = *entry.get();
                return Err(ChanAvgError::ShapeChanged {
                    spw,
                    expected: format!("{expected_corrs} correlations, {expected_chans} channels"),
                    received: format!("{num_corrs} correlations, {num_chans} channels"),
                });
            }
            Entry::Occupied(_) => {}
            Entry::Vacant(entry) => {
                entry.insert((num_corrs, num_chans));
            }
        }
        Ok((binning, shape))
    }

    /// Run `kernel` over `input` into a freshly allocated averaged cube.
    fn reduce<T: CubeElement + Default>(
        mut input: DataCubeMap,
        kernel: AverageKernel,
        binning: &SpwBinning,
        (num_corrs, _, num_rows): (usize, usize, usize),
    ) -> Result<Array3<T>, ChanAvgError> {
        let mut output = Array3::from_elem(
            (num_corrs, binning.num_output_chans, num_rows),
            T::default(),
        );
        {
            let mut output_map = DataCubeMap::new();
            output_map.add_column(kernel.output_column(), DataCubeView::write(output.view_mut()))?;
            ChannelAverageEngine::new(kernel, binning.width)?
                .transform_all(&mut input, &mut output_map)?;
        }
        Ok(output)
    }

    /// Average a data quantity, weighted when the upstream has a weight spectrum.
    fn average_data<'a, T: Averageable + Default>(
        &'a self,
        name: &str,
        data: ArrayView3<'a, T>,
    ) -> Result<Array3<T>, ChanAvgError> {
        trace!("start {name}");
        let (binning, shape) = self.validate()?;
        check_cube_shape(name, data.dim(), shape)?;
        if binning.width == 1 {
            debug!("{name}: width is 1, passing through");
            return Ok(data.to_owned());
        }

        let flags = self.upstream.flag_cube()?;
        check_cube_shape("FLAG", flags.dim(), shape)?;
        let mut input = DataCubeMap::new();
        input.add_column(DataColumn::Data, DataCubeView::read(data))?;
        input.add_column(DataColumn::Flag, DataCubeView::read(flags))?;
        let kernel = if self.upstream.weight_spectrum_exists() {
            let weights = self.upstream.weight_spectrum()?;
            check_cube_shape("WEIGHT_SPECTRUM", weights.dim(), shape)?;
            input.add_column(DataColumn::WeightSpectrum, DataCubeView::read(weights))?;
            AverageKernel::Weighted
        } else {
            AverageKernel::Flagged
        };

        let result = Self::reduce(input, kernel, &binning, shape);
        trace!("end {name}");
        result
    }

    /// Averaged flags, a channel is flagged only when its whole bin is flagged.
    ///
    /// # Errors
    ///
    /// - [`ChanAvgError::UnknownSpw`] if the buffer's spw has no bin width
    /// - [`ChanAvgError::ShapeChanged`] if the buffer's shape disagrees with the
    ///   configuration or with earlier buffers of the same spw
    /// - [`ChanAvgError::BadArrayShape`] if an upstream cube disagrees with the
    ///   upstream's shape
    pub fn flag(&self) -> Result<Array3<bool>, ChanAvgError> {
        trace!("start flag");
        let (binning, shape) = self.validate()?;
        let flags = self.upstream.flag_cube()?;
        check_cube_shape("FLAG", flags.dim(), shape)?;
        if binning.width == 1 {
            debug!("flag: width is 1, passing through");
            return Ok(flags.to_owned());
        }
        let mut input = DataCubeMap::new();
        input.add_column(DataColumn::Flag, DataCubeView::read(flags))?;
        let result = Self::reduce(input, AverageKernel::LogicalAnd, &binning, shape);
        trace!("end flag");
        result
    }

    /// Averaged real valued data.
    ///
    /// # Errors
    ///
    /// see [`ChannelAverageTvi::flag`], and any error reading the upstream column.
    pub fn float_data(&self) -> Result<Array3<f32>, ChanAvgError> {
        self.average_data("FLOAT_DATA", self.upstream.vis_cube_float()?)
    }

    /// Averaged observed visibilities.
    ///
    /// # Errors
    ///
    /// see [`ChannelAverageTvi::flag`], and any error reading the upstream column.
    pub fn visibility_observed(&self) -> Result<Array3<Complex<f32>>, ChanAvgError> {
        self.average_data("DATA", self.upstream.vis_cube()?)
    }

    /// Averaged corrected visibilities.
    ///
    /// # Errors
    ///
    /// see [`ChannelAverageTvi::flag`], and any error reading the upstream column.
    pub fn visibility_corrected(&self) -> Result<Array3<Complex<f32>>, ChanAvgError> {
        self.average_data("CORRECTED_DATA", self.upstream.vis_cube_corrected()?)
    }

    /// Averaged model visibilities.
    ///
    /// # Errors
    ///
    /// see [`ChannelAverageTvi::flag`], and any error reading the upstream column.
    pub fn visibility_model(&self) -> Result<Array3<Complex<f32>>, ChanAvgError> {
        self.average_data("MODEL_DATA", self.upstream.vis_cube_model()?)
    }

    /// Accumulated weights.
    ///
    /// # Errors
    ///
    /// see [`ChannelAverageTvi::flag`], and any error reading the upstream column.
    pub fn weight_spectrum(&self) -> Result<Array3<f32>, ChanAvgError> {
        trace!("start weight_spectrum");
        let (binning, shape) = self.validate()?;
        let weights = self.upstream.weight_spectrum()?;
        check_cube_shape("WEIGHT_SPECTRUM", weights.dim(), shape)?;
        if binning.width == 1 {
            debug!("weight_spectrum: width is 1, passing through");
            return Ok(weights.to_owned());
        }
        let flags = self.upstream.flag_cube()?;
        check_cube_shape("FLAG", flags.dim(), shape)?;
        let mut input = DataCubeMap::new();
        input.add_column(DataColumn::Data, DataCubeView::read(weights))?;
        input.add_column(DataColumn::Flag, DataCubeView::read(flags))?;
        let result = Self::reduce(input, AverageKernel::Accumulate, &binning, shape);
        trace!("end weight_spectrum");
        result
    }

    /// Sigmas of the averaged channels. Sigmas are accumulated as weights and
    /// converted back.
    ///
    /// # Errors
    ///
    /// see [`ChannelAverageTvi::flag`], and any error reading the upstream column.
    pub fn sigma_spectrum(&self) -> Result<Array3<f32>, ChanAvgError> {
        trace!("start sigma_spectrum");
        let (binning, shape) = self.validate()?;
        let sigmas = self.upstream.sigma_spectrum()?;
        check_cube_shape("SIGMA_SPECTRUM", sigmas.dim(), shape)?;
        if binning.width == 1 {
            debug!("sigma_spectrum: width is 1, passing through");
            return Ok(sigmas.to_owned());
        }
        let flags = self.upstream.flag_cube()?;
        check_cube_shape("FLAG", flags.dim(), shape)?;

        let mut weights = sigmas.to_owned();
        sigma_to_weight_array(weights.view_mut());
        let mut input = DataCubeMap::new();
        input.add_column(DataColumn::Data, DataCubeView::read(weights.view()))?;
        input.add_column(DataColumn::Flag, DataCubeView::read(flags))?;
        let mut result = Self::reduce(input, AverageKernel::Accumulate, &binning, shape)?;
        weight_to_sigma_array(result.view_mut());
        trace!("end sigma_spectrum");
        Ok(result)
    }

    /// Row weights, scaled by [`SpwBinning::weight_factor`].
    ///
    /// # Errors
    ///
    /// see [`ChannelAverageTvi::flag`], and any error reading the upstream column.
    pub fn weight(&self) -> Result<Array2<f32>, ChanAvgError> {
        trace!("start weight");
        let (binning, (num_corrs, _, num_rows)) = self.validate()?;
        let weights = self.upstream.weight()?;
        check_cube_shape("WEIGHT", weights.dim(), (num_corrs, num_rows))?;
        let factor = binning.weight_factor();
        let result = weights.mapv(|weight| weight * factor);
        trace!("end weight");
        Ok(result)
    }

    /// Row sigmas, scaled by [`SpwBinning::sigma_factor`].
    ///
    /// # Errors
    ///
    /// see [`ChannelAverageTvi::flag`], and any error reading the upstream column.
    pub fn sigma(&self) -> Result<Array2<f32>, ChanAvgError> {
        trace!("start sigma");
        let (binning, (num_corrs, _, num_rows)) = self.validate()?;
        let sigmas = self.upstream.sigma()?;
        check_cube_shape("SIGMA", sigmas.dim(), (num_corrs, num_rows))?;
        let factor = binning.sigma_factor();
        let result = sigmas.mapv(|sigma| sigma * factor);
        trace!("end sigma");
        Ok(result)
    }

    /// Centre frequencies \[Hz\] of the averaged channels of `spw`, the plain
    /// mean of each bin.
    ///
    /// # Errors
    ///
    /// - [`ChanAvgError::UnknownSpw`] if `spw` has no bin width
    /// - [`ChanAvgError::BadArrayShape`] if the upstream returns the wrong
    ///   number of channels
    pub fn frequencies(
        &self,
        time: f64,
        frame: FrequencyFrame,
        spw: usize,
        ms_id: usize,
    ) -> Result<Array1<f64>, ChanAvgError> {
        trace!("start frequencies (spw={spw}, frame={frame})");
        let binning = self.binning(spw)?;
        let freqs = self.upstream.frequencies(time, frame, spw, ms_id)?;
        let result = average_vector("frequencies", freqs, &binning)?;
        trace!("end frequencies");
        Ok(result)
    }

    /// Widths \[Hz\] of the averaged channels of `spw`, the sum of the widths in
    /// each bin.
    ///
    /// # Errors
    ///
    /// see [`ChannelAverageTvi::frequencies`]
    pub fn channel_widths(&self, spw: usize, ms_id: usize) -> Result<Array1<f64>, ChanAvgError> {
        trace!("start channel_widths (spw={spw})");
        let binning = self.binning(spw)?;
        let widths = self.upstream.channel_widths(spw, ms_id)?;
        let mut result = average_vector("channel widths", widths, &binning)?;
        for (bin_idx, width) in result.iter_mut().enumerate() {
            let bin_start = bin_idx * binning.width;
            let bin_size = binning.width.min(binning.num_input_chans - bin_start);
            *width *= bin_size as f64;
        }
        trace!("end channel_widths");
        Ok(result)
    }

    /// Back-propagate flags edited at averaged resolution onto the upstream's
    /// native flags, and write the merged flags upstream.
    ///
    /// # Errors
    ///
    /// - see [`ChannelAverageTvi::flag`]
    /// - [`ChanAvgError::BadArrayShape`] if `edited` is not at averaged resolution
    /// - any error from the upstream [`VisBuffer::write_flag`]
    pub fn write_flag(&mut self, edited: ArrayView3<bool>) -> Result<(), ChanAvgError> {
        trace!("start write_flag");
        let (binning, shape @ (num_corrs, _, num_rows)) = self.validate()?;
        let expected = (num_corrs, binning.num_output_chans, num_rows);
        if edited.dim() != expected {
            return Err(ChanAvgError::BadArrayShape {
                argument: "edited".into(),
                function: "ChannelAverageTvi::write_flag".into(),
                expected: format!("{expected:?}"),
                received: format!("{:?}", edited.dim()),
            });
        }
        let native_flags = self.upstream.flag_cube()?;
        check_cube_shape("FLAG", native_flags.dim(), shape)?;
        let mut merged = native_flags.to_owned();
        propagate_chan_avg_flags(edited, merged.view_mut(), binning.width)?;
        self.upstream.write_flag(merged.view())?;
        trace!("end write_flag");
        Ok(())
    }
}

fn check_cube_shape<D: PartialEq + Debug>(
    name: &str,
    received: D,
    expected: D,
) -> Result<(), ChanAvgError> {
    if received != expected {
        return Err(ChanAvgError::BadArrayShape {
            argument: name.into(),
            function: "VisBuffer".into(),
            expected: format!("{expected:?}"),
            received: format!("{received:?}"),
        });
    }
    Ok(())
}

/// Plain average of a per-channel series.
fn average_vector(
    name: &str,
    series: Array1<f64>,
    binning: &SpwBinning,
) -> Result<Array1<f64>, ChanAvgError> {
    if series.len() != binning.num_input_chans {
        return Err(ChanAvgError::BadArrayShape {
            argument: name.into(),
            function: "VisBuffer".into(),
            expected: format!("{} channels", binning.num_input_chans),
            received: format!("{} channels", series.len()),
        });
    }
    if binning.width == 1 || series.len() == 1 {
        debug!("{name}: nothing to average, passing through");
        return Ok(series);
    }
    let mut output = Array1::zeros(binning.num_output_chans);
    {
        let mut input = DataCubeMap::new();
        input.add_column(DataColumn::Data, DataCubeView::read_vector(series.view()))?;
        let mut output_map = DataCubeMap::new();
        output_map.add_column(DataColumn::Data, DataCubeView::write_vector(output.view_mut()))?;
        ChannelAverageEngine::new(AverageKernel::Plain, binning.width)?
            .transform_all(&mut input, &mut output_map)?;
    }
    Ok(output)
}

/// The averaged view of a single series, without an upstream buffer.
///
/// # Errors
///
/// [`ChanAvgError::InvalidWidth`] if `width` is zero.
pub fn average_series(series: ArrayView1<f64>, width: usize) -> Result<Array1<f64>, ChanAvgError> {
    if width == 0 {
        return Err(ChanAvgError::InvalidWidth { width });
    }
    let num_chans = series.len();
    let binning = SpwBinning {
        requested_width: width as i64,
        width: width.min(num_chans.max(1)),
        num_input_chans: num_chans,
        num_output_chans: crate::num_output_chans(num_chans, width.min(num_chans.max(1))),
    };
    average_vector("series", series.to_owned(), &binning)
}
