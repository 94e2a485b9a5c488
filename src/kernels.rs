//! Reduction kernels which turn one bin of input channels into one output channel.
//!
//! The flagged, weighted and accumulating kernels share the accumulator flag
//! rule: the accumulator starts with the flag of the first sample in the bin.
//! The first unflagged sample seen while the accumulator is flagged discards
//! everything accumulated so far and restarts the sum from that sample. Every
//! other sample, including a flagged sample after an unflagged one, is summed.

use std::ops::AddAssign;

use log::trace;
use ndarray::{s, ArrayView1};
use num_complex::Complex;
use num_traits::Zero;

use crate::{
    cube::{CubeElement, CubeMapError, DataColumn, DataCubeMap, ElementKind},
    ChanAvgError,
};

/// A numeric element which can be summed, weighted and normalised.
pub trait Averageable: CubeElement + Zero + AddAssign {
    /// Multiply by a weight.
    fn scale(self, weight: f32) -> Self;

    /// Divide by a normalisation factor, in the element's own precision.
    fn normalise(self, norm: f32) -> Self;
}

impl Averageable for f32 {
    fn scale(self, weight: f32) -> Self {
        self * weight
    }

    fn normalise(self, norm: f32) -> Self {
        self / norm
    }
}

impl Averageable for f64 {
    fn scale(self, weight: f32) -> Self {
        self * weight as f64
    }

    fn normalise(self, norm: f32) -> Self {
        self / norm as f64
    }
}

impl Averageable for Complex<f32> {
    fn scale(self, weight: f32) -> Self {
        self * weight
    }

    fn normalise(self, norm: f32) -> Self {
        self / norm
    }
}

/// The ways a bin of channels can be reduced to a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AverageKernel {
    /// `sum / width` of `DATA`, flags are ignored
    Plain,
    /// flag-aware mean of `DATA` with unit weights
    Flagged,
    /// flag-aware mean of `DATA` weighted by `WEIGHT_SPECTRUM`
    Weighted,
    /// `FLAG` is true only when every input flag is true
    LogicalAnd,
    /// flag-aware sum of `DATA` without normalisation
    Accumulate,
}

impl AverageKernel {
    /// The columns this kernel reads from the input map.
    pub fn input_columns(&self) -> &'static [DataColumn] {
        match self {
            Self::Plain => &[DataColumn::Data],
            Self::Flagged | Self::Accumulate => &[DataColumn::Data, DataColumn::Flag],
            Self::Weighted => &[
                DataColumn::Data,
                DataColumn::Flag,
                DataColumn::WeightSpectrum,
            ],
            Self::LogicalAnd => &[DataColumn::Flag],
        }
    }

    /// The column this kernel writes in the output map.
    pub fn output_column(&self) -> DataColumn {
        match self {
            Self::LogicalAnd => DataColumn::Flag,
            _ => DataColumn::Data,
        }
    }

    /// Reduce input channels `start..start + width` of the current column of
    /// `input` into channel `out_idx` of the current column of `output`.
    ///
    /// The element type is taken from the `DATA` view of `input`.
    ///
    /// # Errors
    ///
    /// - [`ChanAvgError::BadArrayShape`] if the window or `out_idx` is out of range
    /// - [`ChanAvgError::CubeMap`] if a required column is missing, mistyped or
    ///   read-only
    pub fn apply(
        &self,
        input: &DataCubeMap,
        output: &mut DataCubeMap,
        start: usize,
        out_idx: usize,
        width: usize,
    ) -> Result<(), ChanAvgError> {
        match (self, input.kind(DataColumn::Data)) {
            (Self::LogicalAnd, _) => logical_and(input, output, start, out_idx, width),
            (_, Some(ElementKind::Float)) => {
                self.reduce::<f32>(input, output, start, out_idx, width)
            }
            (_, Some(ElementKind::Double)) => {
                self.reduce::<f64>(input, output, start, out_idx, width)
            }
            (_, Some(ElementKind::Complex)) => {
                self.reduce::<Complex<f32>>(input, output, start, out_idx, width)
            }
            (_, Some(found)) => Err(CubeMapError::TypeMismatch {
                column: DataColumn::Data,
                expected: ElementKind::Float,
                found,
            }
            .into()),
            (_, None) => Err(CubeMapError::MissingColumn {
                column: DataColumn::Data,
            }
            .into()),
        }
    }

    fn reduce<T: Averageable>(
        &self,
        input: &DataCubeMap,
        output: &mut DataCubeMap,
        start: usize,
        out_idx: usize,
        width: usize,
    ) -> Result<(), ChanAvgError> {
        let data = input.vector::<T>(DataColumn::Data)?;
        let data = window(data, start, width, "DATA")?;

        let value = if *self == Self::Plain {
            let mut sum = T::zero();
            data.iter().for_each(|&value| sum += value);
            sum.normalise(width as f32)
        } else {
            let flags = window(input.vector::<bool>(DataColumn::Flag)?, start, width, "FLAG")?;
            let weights = if *self == Self::Weighted {
                Some(window(
                    input.vector::<f32>(DataColumn::WeightSpectrum)?,
                    start,
                    width,
                    "WEIGHT_SPECTRUM",
                )?)
            } else {
                None
            };
            let (sum, norm) = accumulate(data, flags, weights);
            match self {
                Self::Accumulate => sum,
                _ if norm > 0. => sum.normalise(norm),
                _ => T::zero(),
            }
        };

        let mut out = output.vector_mut::<T>(DataColumn::Data)?;
        *out_slot(&mut out, out_idx, "DATA")? = value;
        Ok(())
    }
}

/// Sum of `data` (optionally weighted) and its normalisation, following the
/// accumulator flag rule.
fn accumulate<T: Averageable>(
    data: ArrayView1<T>,
    flags: ArrayView1<bool>,
    weights: Option<ArrayView1<f32>>,
) -> (T, f32) {
    let mut acc_flag = flags.get(0).copied().unwrap_or(false);
    let mut sum = T::zero();
    let mut norm = 0_f32;
    for (idx, (&value, &flag)) in data.iter().zip(flags.iter()).enumerate() {
        let weight = weights.as_ref().map_or(1., |weights| weights[idx]);
        if acc_flag && !flag {
            acc_flag = false;
            sum = value.scale(weight);
            norm = weight;
        } else {
            sum += value.scale(weight);
            norm += weight;
        }
    }
    (sum, norm)
}

fn logical_and(
    input: &DataCubeMap,
    output: &mut DataCubeMap,
    start: usize,
    out_idx: usize,
    width: usize,
) -> Result<(), ChanAvgError> {
    let flags = window(input.vector::<bool>(DataColumn::Flag)?, start, width, "FLAG")?;
    let all_flagged = flags.iter().all(|&flag| flag);
    let mut out = output.vector_mut::<bool>(DataColumn::Flag)?;
    *out_slot(&mut out, out_idx, "FLAG")? = all_flagged;
    Ok(())
}

fn window<'a, T>(
    column: ArrayView1<'a, T>,
    start: usize,
    width: usize,
    name: &str,
) -> Result<ArrayView1<'a, T>, ChanAvgError> {
    if width == 0 || start + width > column.len() {
        trace!("window {start}..{} out of range for {name}", start + width);
        return Err(ChanAvgError::BadArrayShape {
            argument: format!("input {name}"),
            function: "AverageKernel::apply".into(),
            expected: format!("channels {}..{} within 0..{}", start, start + width, column.len()),
            received: format!("{} channels", column.len()),
        });
    }
    Ok(column.slice_move(s![start..start + width]))
}

fn out_slot<'v, T>(
    column: &'v mut ndarray::ArrayViewMut1<'_, T>,
    out_idx: usize,
    name: &str,
) -> Result<&'v mut T, ChanAvgError> {
    let len = column.len();
    column
        .get_mut(out_idx)
        .ok_or_else(|| ChanAvgError::BadArrayShape {
            argument: format!("output {name}"),
            function: "AverageKernel::apply".into(),
            expected: format!("channel index {out_idx} < {len}"),
            received: format!("{len} channels"),
        })
}
