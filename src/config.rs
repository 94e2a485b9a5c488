//! Channel bin width configuration.
//!
//! The user supplies a `chanbin`, either one width for every spectral window or
//! one width per selected spectral window. [`ChanBinMap`] resolves that against
//! the native channel count of each spectral window, clamping widths which can't
//! be honoured.

use std::{
    collections::BTreeMap,
    fmt::Display,
    str::FromStr,
};

use derive_builder::Builder;
use itertools::Itertools;
use log::{trace, warn};
use thiserror::Error;

use crate::engine::num_output_chans;

#[derive(Error, Debug)]
/// Errors raised while resolving the channel bin widths.
pub enum ChanBinError {
    #[error("invalid chanbin {received:?}, expected a positive integer or a comma separated list of integers")]
    /// The chanbin value could not be parsed.
    InvalidChanBin {
        /// The text that was received
        received: String,
    },

    #[error("chanbin has {received} widths but {expected} spectral windows are selected")]
    /// A per-spw chanbin does not line up with the spw selection.
    ChanBinLengthMismatch {
        /// Number of selected spectral windows
        expected: usize,
        /// Number of widths provided
        received: usize,
    },

    #[error("invalid spectral window selection: {reason}")]
    /// The selection is empty, repeats a spectral window, or has no channels.
    InvalidSpwSelection {
        /// What is wrong with the selection
        reason: String,
    },
}

/// The requested channel bin widths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChanBin {
    /// A single width applied to every selected spectral window
    Uniform(i64),
    /// One width per selected spectral window, in selection order
    PerSpw(Vec<i64>),
}

impl Default for ChanBin {
    fn default() -> Self {
        Self::Uniform(1)
    }
}

impl Display for ChanBin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uniform(width) => write!(f, "{width}"),
            Self::PerSpw(widths) => write!(f, "{}", widths.iter().join(",")),
        }
    }
}

impl FromStr for ChanBin {
    type Err = ChanBinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ChanBinError::InvalidChanBin {
            received: s.to_string(),
        };
        let widths = s
            .split(',')
            .map(|token| token.trim().parse::<i64>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;
        match widths.as_slice() {
            [] => Err(invalid()),
            [width] if !s.contains(',') => Ok(Self::Uniform(*width)),
            _ => Ok(Self::PerSpw(widths)),
        }
    }
}

/// The resolved averaging of one spectral window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpwBinning {
    /// The width that was asked for
    pub requested_width: i64,
    /// The width that will be used, `1 <= width <= num_input_chans`
    pub width: usize,
    /// Native channel count
    pub num_input_chans: usize,
    /// Averaged channel count, `ceil(num_input_chans / width)`
    pub num_output_chans: usize,
}

impl SpwBinning {
    fn new(spw: usize, requested_width: i64, num_input_chans: usize) -> Self {
        let width = match usize::try_from(requested_width) {
            Ok(width) if (1..=num_input_chans).contains(&width) => width,
            _ => {
                warn!(
                    "spw {spw}: chanbin {requested_width} is outside 1..={num_input_chans}, \
                    clamping to {num_input_chans}"
                );
                num_input_chans
            }
        };
        Self {
            requested_width,
            width,
            num_input_chans,
            num_output_chans: num_output_chans(num_input_chans, width),
        }
    }

    /// Whether the requested width had to be adjusted.
    pub fn is_clamped(&self) -> bool {
        usize::try_from(self.requested_width).map_or(true, |width| width != self.width)
    }

    /// The number of channels in the final, ragged bin. Zero when the bins are even.
    pub fn trailing_bin_chans(&self) -> usize {
        self.num_input_chans % self.width
    }

    /// Scale for row weights once `width` channels are combined.
    pub fn weight_factor(&self) -> f32 {
        self.width as f32
    }

    /// Scale for row sigmas, `1 / sqrt(weight_factor)`.
    pub fn sigma_factor(&self) -> f32 {
        1. / self.weight_factor().sqrt()
    }
}

/// Per-spectral-window bin widths. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChanBinMap {
    binnings: BTreeMap<usize, SpwBinning>,
}

impl ChanBinMap {
    /// Resolve `chanbin` against the selected `(spw, num_chans)` pairs.
    ///
    /// Widths below 1 or above the spw's channel count are clamped to the
    /// channel count with a warning.
    ///
    /// # Errors
    ///
    /// - [`ChanBinError::ChanBinLengthMismatch`] if a per-spw chanbin has a
    ///   different length to `spw_num_chans`
    /// - [`ChanBinError::InvalidSpwSelection`] if `spw_num_chans` is empty, repeats
    ///   a spw, or lists a spw without channels
    pub fn new(chanbin: &ChanBin, spw_num_chans: &[(usize, usize)]) -> Result<Self, ChanBinError> {
        trace!("start ChanBinMap::new");
        if spw_num_chans.is_empty() {
            return Err(ChanBinError::InvalidSpwSelection {
                reason: "no spectral windows selected".into(),
            });
        }
        let widths = match chanbin {
            ChanBin::Uniform(width) => vec![*width; spw_num_chans.len()],
            ChanBin::PerSpw(widths) if widths.len() != spw_num_chans.len() => {
                return Err(ChanBinError::ChanBinLengthMismatch {
                    expected: spw_num_chans.len(),
                    received: widths.len(),
                });
            }
            ChanBin::PerSpw(widths) => widths.clone(),
        };

        let mut binnings = BTreeMap::new();
        for (&(spw, num_chans), requested_width) in spw_num_chans.iter().zip(widths) {
            if num_chans == 0 {
                return Err(ChanBinError::InvalidSpwSelection {
                    reason: format!("spw {spw} has no channels"),
                });
            }
            if binnings
                .insert(spw, SpwBinning::new(spw, requested_width, num_chans))
                .is_some()
            {
                return Err(ChanBinError::InvalidSpwSelection {
                    reason: format!("spw {spw} selected more than once"),
                });
            }
        }
        trace!("end ChanBinMap::new");
        Ok(Self { binnings })
    }

    /// The resolved binning for `spw`.
    pub fn get(&self, spw: usize) -> Option<&SpwBinning> {
        self.binnings.get(&spw)
    }

    /// The bin width for `spw`.
    pub fn width(&self, spw: usize) -> Option<usize> {
        self.get(spw).map(|binning| binning.width)
    }

    /// The averaged channel count for `spw`.
    pub fn num_output_chans(&self, spw: usize) -> Option<usize> {
        self.get(spw).map(|binning| binning.num_output_chans)
    }

    /// Binnings in increasing spw order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &SpwBinning)> + '_ {
        self.binnings.iter().map(|(&spw, binning)| (spw, binning))
    }

    /// Number of spectral windows.
    pub fn len(&self) -> usize {
        self.binnings.len()
    }

    /// Whether no spectral windows are configured.
    pub fn is_empty(&self) -> bool {
        self.binnings.is_empty()
    }
}

/// Options for channel averaging a selection of spectral windows
#[derive(Builder, Debug, Default, Clone)]
pub struct ChanAvgContext {
    /// The requested bin widths
    pub chanbin: ChanBin,
    /// `(spw id, native channel count)` for each selected spectral window
    pub spw_num_chans: Vec<(usize, usize)>,
}

impl Display for ChanAvgContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} average channels (chanbin={}).",
            if self.chanbin == ChanBin::Uniform(1) {
                "Will not"
            } else {
                "Will"
            },
            self.chanbin
        )?;
        writeln!(
            f,
            "Selected {} spectral windows: {}",
            self.spw_num_chans.len(),
            self.spw_num_chans
                .iter()
                .map(|(spw, num_chans)| format!("{spw} ({num_chans} chans)"))
                .join(", ")
        )?;
        Ok(())
    }
}

impl ChanAvgContext {
    /// A one line description of the averaging this context will do.
    pub fn as_comment(&self) -> String {
        [
            if self.chanbin == ChanBin::Uniform(1) {
                None
            } else {
                Some(format!("channel averaging with chanbin {}", self.chanbin))
            },
            if self.spw_num_chans.is_empty() {
                None
            } else {
                Some(format!(
                    "spws {}",
                    self.spw_num_chans.iter().map(|(spw, _)| spw).join(",")
                ))
            },
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<String>>()
        .join(", ")
    }

    /// Resolve the bin width map for this context.
    ///
    /// # Errors
    ///
    /// see [`ChanBinMap::new`]
    pub fn bin_map(&self) -> Result<ChanBinMap, ChanBinError> {
        ChanBinMap::new(&self.chanbin, &self.spw_num_chans)
    }
}
