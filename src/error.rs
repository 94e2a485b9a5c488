//! Errors that can occur in chanavg

use thiserror::Error;

use crate::{config::ChanBinError, cube::CubeMapError};

#[derive(Error, Debug)]
#[allow(clippy::upper_case_acronyms)]
/// Errors relating to CLI Argument parsing
pub enum CLIError {
    #[error("Invalid Command Line Argument {option}\nexpected {expected}, received {received}")]
    /// When a bad value is provided to a command line argument
    InvalidCommandLineArgument {
        /// The argument name within the clap app
        option: String,
        /// Description of what value was expected
        expected: String,
        /// The value that was received instead
        received: String,
    },
}

/// An enum of all the errors possible in chanavg
#[derive(Error, Debug)]
pub enum ChanAvgError {
    #[error(transparent)]
    /// Error derived from [`ChanBinError`], raised while building the bin width map.
    Config(#[from] ChanBinError),

    #[error(transparent)]
    /// Error derived from [`CubeMapError`]
    CubeMap(#[from] CubeMapError),

    #[error("shape of spw {spw} has changed within the same chunk. expected {expected}, received {received}. Invalid data.")]
    /// The upstream buffer changed correlation or channel count for a spectral window.
    ShapeChanged {
        /// The spectral window id
        spw: usize,
        /// The shape we had cached for this spectral window
        expected: String,
        /// The shape the upstream buffer reported
        received: String,
    },

    #[error("spectral window {spw} is not part of the averaging selection")]
    /// A spectral window was requested which has no bin width.
    UnknownSpw {
        /// The spectral window id
        spw: usize,
    },

    #[error("bad array shape supplied to argument {argument} of function {function}. expected {expected}, received {received}")]
    /// Error for bad array shape in provided argument
    BadArrayShape {
        /// The argument name within the function
        argument: String,
        /// The function name
        function: String,
        /// The expected shape
        expected: String,
        /// The shape that was received instead
        received: String,
    },

    #[error("channel bin width must be at least 1, received {width}")]
    /// A transform was asked to average with a zero bin width.
    InvalidWidth {
        /// The offending width
        width: usize,
    },

    #[error("upstream visibility buffer: {0}")]
    /// An error reported by the upstream visibility buffer.
    Upstream(String),

    #[error(transparent)]
    /// Error derived from [`CLIError`]
    CLIError(#[from] CLIError),

    #[cfg(feature = "cli")]
    #[error(transparent)]
    /// Error derived from [`clap::Error`]
    ClapError(#[from] clap::Error),

    #[error("Dry run")]
    /// The command line asked only for a summary.
    DryRun {},
}
