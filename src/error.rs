//! Errors that can occur in delayspec

use thiserror::Error;

#[derive(Error, Debug)]
/// Errors relating to command line argument parsing
pub enum CLIError {
    /// An argument was given a value outside of what it accepts
    #[error("Invalid value for command line argument {option}: expected {expected}, received {received}")]
    InvalidCommandLineArgument {
        /// The argument name within the clap parser
        option: String,
        /// A description of the values expected by the argument
        expected: String,
        /// The value that was received
        received: String,
    },
}

#[derive(Error, Debug)]
/// All the errors that can occur while filtering or estimating delay spectra
pub enum DelaySpecError {
    /// The window family name was not recognised.
    #[error("Unknown window function {name}, expected one of nuttall, blackman_nuttall, blackman_harris")]
    UnknownWindow {
        /// The name that was given
        name: String,
    },

    /// The product mask name was not recognised.
    #[error("Unknown product mask {name}, expected one of no_auto, no_intra, x_only, y_only")]
    UnknownProductMask {
        /// The name that was given
        name: String,
    },

    /// Updating the weights after delay filtering was requested.
    #[error("Weight updating is not implemented.")]
    WeightUpdateNotImplemented,

    /// A real to complex transform was requested with an odd length.
    #[error("Fourier transform length must be even, received {n}")]
    OddTransformLength {
        /// The requested length
        n: usize,
    },

    /// A channel index does not fit within the transform.
    #[error("Channel index {channel} is beyond the last channel {max} of the transform")]
    ChannelOutOfRange {
        /// The offending channel index
        channel: usize,
        /// The largest allowed channel index
        max: usize,
    },

    /// A channel centre does not fall on the channel comb.
    #[error("Channel centre {centre} MHz is not an integer number of {spacing} MHz channels from {freq_zero} MHz")]
    InvalidChannelMapping {
        /// The centre of the offending channel [MHz]
        centre: f64,
        /// The frequency of the zero channel [MHz]
        freq_zero: f64,
        /// The channel spacing [MHz]
        spacing: f64,
    },

    /// The number of channels can't be rebinned by the requested factor.
    #[error("Binning factor {channel_bin} must exactly divide the number of channels {num_chans}")]
    RebinMismatch {
        /// The number of channels in the stream
        num_chans: usize,
        /// The requested binning factor
        channel_bin: usize,
    },

    /// No Gibbs samples were requested.
    #[error("At least one Gibbs sample must be drawn")]
    NoSamples,

    /// There are too few samples to estimate a variance from.
    #[error("At least two time samples are needed to draw a spectrum, received {num_samples}")]
    InsufficientEnsemble {
        /// The number of samples available
        num_samples: usize,
    },

    /// The posterior precision matrix was not positive definite.
    #[error("{source_file}:{source_line}\nWiener filter system is not positive definite at Gibbs iteration {iteration}")]
    NotPositiveDefinite {
        /// The file where the error originated (usually `file!()`)
        source_file: &'static str,
        /// The line number where the error originated (usually `line!()`)
        source_line: u32,
        /// The Gibbs iteration that failed
        iteration: usize,
    },

    /// The power spectrum contained a non-positive or non-finite value.
    #[error("Power spectrum value {value} in delay bin {index} is not strictly positive")]
    NonPositiveSpectrum {
        /// The delay bin
        index: usize,
        /// The offending value
        value: f64,
    },

    /// The singular value decomposition did not converge.
    #[error("{source_file}:{source_line}\nSingular value decomposition of a {rows}x{cols} matrix did not converge")]
    SvdNotConverged {
        /// The file where the error originated (usually `file!()`)
        source_file: &'static str,
        /// The line number where the error originated (usually `line!()`)
        source_line: u32,
        /// Rows of the decomposed matrix
        rows: usize,
        /// Columns of the decomposed matrix
        cols: usize,
    },

    /// An array had an unexpected shape.
    #[error("Bad array shape supplied to argument {argument} of function {function}. expected {expected}, received {received}")]
    BadArrayShape {
        /// The argument name within the function
        argument: String,
        /// The function name
        function: String,
        /// A description of the expected shape
        expected: String,
        /// A description of the shape that was received
        received: String,
    },

    /// Only a summary was requested.
    #[error("Dry run")]
    DryRun {},

    #[error(transparent)]
    /// Error derived from [`CLIError`]
    CLIError(#[from] CLIError),

    #[cfg(feature = "cli")]
    #[error(transparent)]
    /// Error derived from [`clap::Error`]
    ClapError(#[from] clap::Error),

    #[error(transparent)]
    /// Error derived from [`std::io::Error`]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    /// Error derived from [`serde_json::Error`]
    Json(#[from] serde_json::Error),
}
