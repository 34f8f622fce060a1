//! Deterministic removal of low delay modes.
//!
//! The modes to remove are found numerically: a dense grid of complex
//! exponentials spanning `[-max_delay, max_delay]` is evaluated at the
//! channel frequencies, and the left singular vectors with significant
//! singular values form the subspace that the filter projects out.

use log::{debug, trace};
use nalgebra::DMatrix;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::{
    constants::{DEFAULT_NULL_TOLERANCE, DEFAULT_NUM_NULL_DELAYS},
    util::from_dmatrix,
    window::{window_generalised, WindowType},
    DelaySpecError,
};

/// Maximum number of iterations to let the SVD run for before giving up.
const SVD_MAX_ITERATIONS: usize = 10_000;

/// Options for constructing a [`NullFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NullFilterOptions {
    /// Number of trial delays spanning the cut
    pub num_delay: usize,
    /// Singular values below `tol` times the largest are kept in the data
    pub tol: f64,
    /// Apodisation applied to the modes and to the data on input, if any. The
    /// filtered data stay apodised.
    pub window: Option<WindowType>,
}

impl Default for NullFilterOptions {
    fn default() -> Self {
        Self {
            num_delay: DEFAULT_NUM_NULL_DELAYS,
            tol: DEFAULT_NULL_TOLERANCE,
            window: Some(WindowType::Nuttall),
        }
    }
}

/// A projection which nulls delays below some value.
#[derive(Debug, Clone)]
pub struct NullFilter {
    /// The filter as a `(nfreq, nfreq)` matrix, applied on the left of data.
    pub projector: Array2<Complex<f64>>,
    /// The number of modes the filter removes.
    pub num_modes: usize,
}

impl NullFilter {
    /// Filter data shaped `(nfreq, ...)`, returning the filtered copy.
    pub fn apply(&self, data: ArrayView2<Complex<f64>>) -> Array2<Complex<f64>> {
        self.projector.dot(&data)
    }
}

/// Take frequency data and null out any delays below some value.
///
/// # Arguments
///
/// * `freq` - frequencies we have data at [MHz].
/// * `max_delay` - maximum delay to remove [us].
/// * `mask` - per channel mask, zero for channels to exclude.
/// * `options` - see [`NullFilterOptions`].
///
/// The filter is `(I - P Pᴴ) diag(mask * w)`, where `P` holds the significant
/// left singular vectors of the windowed, masked mode matrix and `w` is the
/// window (or all ones).
///
/// # Errors
///
/// [`DelaySpecError::BadArrayShape`] if `mask` and `freq` differ in length,
/// and [`DelaySpecError::SvdNotConverged`] if the decomposition fails.
pub fn null_delay_filter(
    freq: ArrayView1<f64>,
    max_delay: f64,
    mask: ArrayView1<f64>,
    options: &NullFilterOptions,
) -> Result<NullFilter, DelaySpecError> {
    trace!("start null_delay_filter");

    let num_freqs = freq.len();
    if mask.len() != num_freqs {
        return Err(DelaySpecError::BadArrayShape {
            argument: "mask".into(),
            function: "null_delay_filter".into(),
            expected: format!("({num_freqs},)"),
            received: format!("({},)", mask.len()),
        });
    }
    if num_freqs == 0 {
        return Ok(NullFilter {
            projector: Array2::zeros((0, 0)),
            num_modes: 0,
        });
    }

    // Construct the window function
    let mask_window: Array1<f64> = match options.window {
        Some(window) => {
            let freq_min = freq.fold(f64::INFINITY, |acc, &f| acc.min(f));
            let freq_max = freq.fold(f64::NEG_INFINITY, |acc, &f| acc.max(f));
            let span = freq_max - freq_min;
            let x = freq.mapv(|f| if span > 0.0 { (f - freq_min) / span } else { 0.0 });
            &mask * &window_generalised(x.view(), window)
        }
        None => mask.to_owned(),
    };

    let delays = Array1::linspace(-max_delay, max_delay, options.num_delay);

    // Construct the Fourier matrix
    let modes = DMatrix::from_fn(num_freqs, delays.len(), |freq_idx, delay_idx| {
        Complex::from_polar(
            mask_window[freq_idx],
            2.0 * std::f64::consts::PI * delays[delay_idx] * freq[freq_idx],
        )
    });

    let mut proj = DMatrix::<Complex<f64>>::identity(num_freqs, num_freqs);
    let mut num_modes = 0;

    // with nothing to decompose there are no modes to remove
    if !delays.is_empty() && mask_window.iter().any(|&mw| mw != 0.0) {
        // Use an SVD to figure out the set of significant modes spanning the
        // delays we are wanting to get rid of.
        let (rows, cols) = modes.shape();
        let svd_error = || DelaySpecError::SvdNotConverged {
            source_file: file!(),
            source_line: line!(),
            rows,
            cols,
        };
        let svd = modes
            .try_svd(true, false, f64::EPSILON * 5.0, SVD_MAX_ITERATIONS)
            .ok_or_else(svd_error)?;
        let u = svd.u.ok_or_else(svd_error)?;

        let sig_max = svd.singular_values.iter().fold(0.0_f64, |acc, &s| acc.max(s));
        let significant: Vec<usize> = svd
            .singular_values
            .iter()
            .enumerate()
            .filter(|(_, &s)| s > options.tol * sig_max)
            .map(|(idx, _)| idx)
            .collect();
        num_modes = significant.len();

        // Construct a projection matrix for the filter
        let p = u.select_columns(significant.iter());
        proj -= &p * p.adjoint();
    }
    debug!("Removing {num_modes} modes below {max_delay} us");

    let mut projector = from_dmatrix(&proj);

    // re-apply the mask and window to the data going in
    for mut row in projector.rows_mut() {
        row.zip_mut_with(&mask_window, |p, &mw| *p *= mw);
    }

    trace!("end null_delay_filter");

    Ok(NullFilter {
        projector,
        num_modes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    /// 16 channels spaced 0.390625 MHz apart.
    fn test_freqs() -> Array1<f64> {
        Array1::from_iter((0..16).map(|i| 400.0 + 0.390625 * i as f64))
    }

    fn energy(data: ArrayView1<Complex<f64>>) -> f64 {
        data.iter().map(|v| v.norm_sqr()).sum()
    }

    /// Apply the filter to a single real series.
    fn filter_series(filter: &NullFilter, series: &Array1<f64>) -> Array1<Complex<f64>> {
        let data = series.mapv(|v| Complex::new(v, 0.0)).insert_axis(ndarray::Axis(1));
        filter.apply(data.view()).column(0).to_owned()
    }

    fn unwindowed(tol: f64) -> NullFilterOptions {
        NullFilterOptions {
            tol,
            window: None,
            ..Default::default()
        }
    }

    #[test]
    fn test_projector_idempotent() {
        let freq = test_freqs();
        let mask = Array1::ones(16);
        let filter = null_delay_filter(freq.view(), 0.3, mask.view(), &unwindowed(1e-8)).unwrap();
        assert!(filter.num_modes > 0);
        let series = Array1::from_iter((0..16).map(|i| (0.3 * i as f64).sin() + 0.1 * i as f64));
        let once = filter_series(&filter, &series);
        let twice = filter
            .apply(once.view().insert_axis(ndarray::Axis(1)))
            .column(0)
            .to_owned();
        assert_abs_diff_eq!(twice, once, epsilon = 1e-10);
    }

    #[test]
    fn test_projector_idempotent_with_flags() {
        let freq = test_freqs();
        let mut mask = Array1::ones(16);
        mask[3] = 0.0;
        mask[11] = 0.0;
        let filter = null_delay_filter(freq.view(), 0.1, mask.view(), &unwindowed(1e-3)).unwrap();
        let squared = filter.projector.dot(&filter.projector);
        assert_abs_diff_eq!(squared, filter.projector, epsilon = 1e-10);
        // flagged channels are zeroed on the way in
        for i in 0..16 {
            assert_abs_diff_eq!(filter.projector[[i, 3]].norm(), 0.0);
            assert_abs_diff_eq!(filter.projector[[i, 11]].norm(), 0.0);
        }
    }

    #[test]
    fn test_dc_removed_below_resolution() {
        // the band spans ~5.9 MHz, so 0.05 us is well below the delay resolution
        let freq = test_freqs();
        let mask = Array1::ones(16);
        let options = NullFilterOptions {
            window: None,
            ..Default::default()
        };
        let filter = null_delay_filter(freq.view(), 0.05, mask.view(), &options).unwrap();
        let dc = Array1::ones(16);
        let filtered = filter_series(&filter, &dc);
        assert!(energy(filtered.view()) < 1e-6 * 16.0);
    }

    #[test]
    fn test_dc_removed_windowed() {
        let freq = test_freqs();
        let mask = Array1::ones(16);
        let filter =
            null_delay_filter(freq.view(), 0.05, mask.view(), &NullFilterOptions::default())
                .unwrap();
        assert!(filter.num_modes > 0);
        let filtered = filter_series(&filter, &Array1::ones(16));
        assert!(energy(filtered.view()) < 1e-6);
    }

    #[test]
    fn test_cosine_inside_and_outside_cut() {
        let freq = test_freqs();
        let centre = freq.mean().unwrap();
        let mask = Array1::ones(16);
        let filter = null_delay_filter(freq.view(), 0.05, mask.view(), &unwindowed(1e-2)).unwrap();
        assert_eq!(filter.num_modes, 3);

        let cosine = |delay: f64| freq.mapv(|f| (2.0 * PI * delay * (f - centre)).cos());

        // 7 / (16 * 0.390625 MHz) = 1.12 us, well outside the cut
        let outside = cosine(1.12);
        let kept = energy(filter_series(&filter, &outside).view()) / outside.mapv(|v| v * v).sum();
        assert!(kept > 0.99, "kept {kept}");

        let inside = cosine(0.01);
        let kept = energy(filter_series(&filter, &inside).view()) / inside.mapv(|v| v * v).sum();
        assert!(kept < 0.01, "kept {kept}");
    }

    #[test]
    fn test_zero_rank_is_identity() {
        let freq = test_freqs();
        let mask = Array1::zeros(16);
        let filter = null_delay_filter(freq.view(), 0.1, mask.view(), &unwindowed(1e-8)).unwrap();
        assert_eq!(filter.num_modes, 0);
        assert_abs_diff_eq!(filter.projector, Array2::zeros((16, 16)));

        let mask = Array1::ones(16);
        let options = NullFilterOptions {
            num_delay: 0,
            ..unwindowed(1e-8)
        };
        let filter = null_delay_filter(freq.view(), 0.1, mask.view(), &options).unwrap();
        assert_eq!(filter.num_modes, 0);
        assert_abs_diff_eq!(filter.projector, Array2::eye(16));
    }

    #[test]
    fn test_mask_shape_mismatch() {
        let freq = test_freqs();
        let mask = Array1::ones(15);
        assert!(matches!(
            null_delay_filter(freq.view(), 0.1, mask.view(), &NullFilterOptions::default()),
            Err(DelaySpecError::BadArrayShape { .. })
        ));
    }
}
