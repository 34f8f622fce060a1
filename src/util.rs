//! Utility functions

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use nalgebra::{DMatrix, Scalar};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Median of a set of values, averaging the middle pair for even lengths.
///
/// NaNs sort after every other value. Returns `0.0` for an empty input.
pub fn median(values: ArrayView1<f64>) -> f64 {
    let mut sorted = values.to_vec();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Median of a 2D array along `axis`.
pub fn median_axis(values: ArrayView2<f64>, axis: Axis) -> Array1<f64> {
    values.map_axis(axis, median)
}

/// Sample frequencies of a length `n` discrete Fourier transform with sample
/// spacing `d`, in the standard order (zero, positive, then negative).
pub fn fftfreq(n: usize, d: f64) -> Array1<f64> {
    let scale = 1.0 / (n as f64 * d);
    let num_positive = (n + 1) / 2;
    Array1::from_iter((0..n).map(|i| {
        if i < num_positive {
            i as f64 * scale
        } else {
            (i as f64 - n as f64) * scale
        }
    }))
}

/// Shift the zero-frequency element to the centre of the array.
pub fn fftshift<T: Clone>(values: ArrayView1<T>) -> Array1<T> {
    let n = values.len();
    let shift = n / 2;
    Array1::from_iter((0..n).map(|i| values[(i + n - shift) % n].clone()))
}

/// Copy an [`ndarray::ArrayView2`] into a column-major [`nalgebra::DMatrix`].
pub(crate) fn to_dmatrix<T: Scalar + Copy>(array: ArrayView2<T>) -> DMatrix<T> {
    let (rows, cols) = array.dim();
    DMatrix::from_fn(rows, cols, |r, c| array[[r, c]])
}

/// Copy a [`nalgebra::DMatrix`] into an [`ndarray::Array2`].
pub(crate) fn from_dmatrix<T: Scalar + Copy>(matrix: &DMatrix<T>) -> Array2<T> {
    Array2::from_shape_fn(matrix.shape(), |(r, c)| matrix[(r, c)])
}

/// A progress bar with `len` steps, drawn to stderr if `draw_progress`.
pub(crate) fn progress_bar(len: usize, message: &'static str, draw_progress: bool) -> ProgressBar {
    let draw_target = if draw_progress {
        ProgressDrawTarget::stderr()
    } else {
        ProgressDrawTarget::hidden()
    };
    let progress = ProgressBar::with_draw_target(Some(len as u64), draw_target);
    progress.set_style(
        match ProgressStyle::default_bar()
            .template("{msg:16}: [{elapsed_precise}] [{wide_bar:.cyan/blue}] {percent:3}% ({eta:5})")
        {
            Ok(style) => style.progress_chars("=> "),
            Err(_) => ProgressStyle::default_bar(),
        },
    );
    progress.set_message(message);
    progress
}
