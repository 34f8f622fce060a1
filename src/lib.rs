#![warn(missing_docs)]
#![warn(clippy::missing_safety_doc)]
#![warn(clippy::missing_errors_doc)]

//! delayspec estimates and filters the delay power spectrum of visibilities from a radio
//! interferometer, whose frequency channels may be an irregular subset of a regular comb.
//!
//! # Examples
//!
//! Here's an example of how to remove the smooth spectrum of the foregrounds from a stream
//!
//! ```rust
//! use delayspec::{DelayFilterContextBuilder, FreqChannel, VisStream};
//! use ndarray::Array1;
//! use num_complex::Complex;
//!
//! // sixteen 390.625kHz channels starting at 400MHz
//! let freq = (0..16)
//!     .map(|i| FreqChannel {
//!         centre: 400.0 + 0.390625 * i as f64,
//!         width: 0.390625,
//!     })
//!     .collect();
//!
//! // a single product between feeds 0 and 1 at two times, with a flat spectrum
//! let mut stream = VisStream::zeros(freq, vec![(0, 1)], Array1::zeros(2));
//! stream.vis.fill(Complex::new(1.0, 0.0));
//! stream.weight.fill(1.0);
//!
//! // remove everything below 0.05us
//! let filter_ctx = DelayFilterContextBuilder::default()
//!     .delay_cut(0.05)
//!     .draw_progress(false)
//!     .build()
//!     .unwrap();
//! filter_ctx.filter(&mut stream).unwrap();
//!
//! assert!(stream.vis.iter().all(|v| v.norm() < 1e-2));
//! ```
//!
//! # Details
//!
//! Delay spectra are estimated per baseline by a Gibbs sampler which alternates between drawing
//! the underlying signal given the current spectrum (see [`gibbs::GibbsSampler`]) and the
//! spectrum given the signal. Filtering projects out the span of low delays in the unflagged
//! channels (see [`null_filter::null_delay_filter`]).

pub mod constants;
pub mod containers;
pub mod error;
pub mod estimate;
pub mod filter;
pub mod fourier;
pub mod gibbs;
pub mod mask;
pub mod null_filter;
pub mod rebin;
pub mod stokes;
pub mod util;
pub mod window;

#[cfg(feature = "cli")]
pub mod cli;

pub use containers::{DelaySpectrum, Feed, FreqChannel, Polarisation, TelescopeGeometry, VisStream};
pub use error::DelaySpecError;
pub use estimate::{DelaySpectrumContext, DelaySpectrumContextBuilder};
pub use filter::{DelayFilterContext, DelayFilterContextBuilder};
pub use num_complex::Complex;

/// Time the evaluation of an expression, adding the elapsed time to a map of durations.
///
/// ```rust
/// use delayspec::with_increment_duration;
/// use std::{collections::HashMap, time::Duration};
///
/// let mut durations = HashMap::<String, Duration>::new();
/// let sum: u32 = with_increment_duration!(durations, "sum", (1..10).sum());
/// assert_eq!(sum, 45);
/// assert!(durations.contains_key("sum"));
/// ```
#[macro_export]
macro_rules! with_increment_duration {
    ($durations:expr, $name:expr, $body:expr) => {{
        let _now = std::time::Instant::now();
        let _res = $body;
        *$durations
            .entry($name.to_string())
            .or_insert_with(std::time::Duration::default) += _now.elapsed();
        _res
    }};
}
