#![warn(missing_docs)]
#![warn(clippy::missing_safety_doc)]
#![warn(clippy::missing_errors_doc)]

//! Chanavg averages radio interferometric visibility cubes along the channel
//! axis, and propagates flags edited at averaged resolution back onto the
//! native resolution flags.
//!
//! Cubes have the axes `[correlation][channel][row]`. Each spectral window is
//! averaged in bins of a configurable width, with a ragged final bin when the
//! width doesn't divide the channel count.
//!
//! # Examples
//!
//! Average an in-memory buffer in bins of 2 channels, then flag an averaged
//! channel and write it back.
//!
//! ```rust
//! use chanavg::{
//!     ndarray::Array3, ChanAvgContextBuilder, ChanBin, ChannelAverageTvi, Complex,
//!     OwnedVisBuffer,
//! };
//!
//! // 2 correlations, 5 channels, 3 rows
//! let vis = Array3::from_elem((2, 5, 3), Complex::new(1_f32, 0.));
//! let flags = Array3::from_elem((2, 5, 3), false);
//! let buffer = OwnedVisBuffer::new(0, vis, flags, 100e6, 10e3);
//!
//! let chanavg_ctx = ChanAvgContextBuilder::default()
//!     .chanbin(ChanBin::Uniform(2))
//!     .spw_num_chans(vec![(0, 5)])
//!     .build()
//!     .unwrap();
//! let mut tvi = ChannelAverageTvi::new(buffer, &chanavg_ctx).unwrap();
//!
//! let averaged = tvi.visibility_observed().unwrap();
//! assert_eq!(averaged.dim(), (2, 3, 3));
//!
//! let mut edited = tvi.flag().unwrap();
//! edited[(0, 1, 0)] = true;
//! tvi.write_flag(edited.view()).unwrap();
//!
//! let native_flags = &tvi.upstream().flags;
//! assert!(native_flags[(0, 2, 0)] && native_flags[(0, 3, 0)]);
//! assert!(!native_flags[(0, 4, 0)]);
//! ```

use cfg_if::cfg_if;

pub mod config;
pub use config::{
    ChanAvgContext, ChanAvgContextBuilder, ChanBin, ChanBinError, ChanBinMap, SpwBinning,
};

pub mod cube;
pub use cube::{CubeElement, CubeMapError, DataColumn, DataCubeMap, DataCubeView, ElementKind};

pub mod engine;
pub use engine::{num_output_chans, ChannelAverageEngine};

pub mod error;
pub use error::{CLIError, ChanAvgError};

pub mod flags;
pub use flags::{chan_to_bin_map, propagate_chan_avg_flags, sigma_to_weight, weight_to_sigma};

pub mod kernels;
pub use kernels::{AverageKernel, Averageable};

pub mod tvi;
pub use tvi::{average_series, ChannelAverageTvi, FrequencyFrame, OwnedVisBuffer, VisBuffer};

cfg_if! {
    if #[cfg(feature = "cli")] {
        pub mod cli;
        pub use cli::ChanAvgCli;
    }
}

pub use ndarray;
pub use num_complex::Complex;

#[cfg(test)]
mod test_common;
