//! Fourier design matrices between real delay series and complex channels.
//!
//! Complex channel data are packed as alternating real and imaginary
//! elements, so a selection of `k` channels corresponds to `2k` rows (or
//! columns) of the matrix.

use std::f64::consts::PI;

use ndarray::Array2;

use crate::DelaySpecError;

/// Resolve the channel selection for a transform of length `n`, checking that
/// `n` is even and every channel lies in `0..=n/2`.
pub(crate) fn resolve_channels(n: usize, fsel: Option<&[usize]>) -> Result<Vec<usize>, DelaySpecError> {
    if n % 2 != 0 {
        return Err(DelaySpecError::OddTransformLength { n });
    }
    let max = n / 2;
    match fsel {
        None => Ok((0..=max).collect()),
        Some(fsel) => {
            if let Some(&channel) = fsel.iter().find(|&&channel| channel > max) {
                return Err(DelaySpecError::ChannelOutOfRange { channel, max });
            }
            Ok(fsel.to_vec())
        }
    }
}

/// Generate a Fourier matrix representing a real to complex FFT.
///
/// The result has shape `(2 * nchan, n)`; row `2i` holds the cosine and row
/// `2i + 1` the negative sine at channel `fsel[i]`.
///
/// # Arguments
///
/// * `n` - length of the real series being transformed. Must be even.
/// * `fsel` - indices of the channels to include, by default all `n/2 + 1`.
///
/// # Errors
///
/// [`DelaySpecError::OddTransformLength`] for odd `n`, and
/// [`DelaySpecError::ChannelOutOfRange`] if a channel is beyond `n/2`.
pub fn fourier_matrix_r2c(n: usize, fsel: Option<&[usize]>) -> Result<Array2<f64>, DelaySpecError> {
    let fa = resolve_channels(n, fsel)?;
    let mut fr = Array2::zeros((2 * fa.len(), n));
    for (chan_idx, &f) in fa.iter().enumerate() {
        for t in 0..n {
            let (sin, cos) = (2.0 * PI * (t * f) as f64 / n as f64).sin_cos();
            fr[[2 * chan_idx, t]] = cos;
            fr[[2 * chan_idx + 1, t]] = -sin;
        }
    }
    Ok(fr)
}

/// Generate a Fourier matrix representing a complex to real FFT.
///
/// The result has shape `(n, 2 * nchan)`. The weighting is `1/n` for the zero
/// and Nyquist channels and `2/n` elsewhere, which accounts for the folded
/// negative frequencies of a real series.
///
/// # Errors
///
/// As [`fourier_matrix_r2c`].
pub fn fourier_matrix_c2r(n: usize, fsel: Option<&[usize]>) -> Result<Array2<f64>, DelaySpecError> {
    let fa = resolve_channels(n, fsel)?;
    let mut fr = Array2::zeros((n, 2 * fa.len()));
    for (chan_idx, &f) in fa.iter().enumerate() {
        let mul = (if f == 0 || f == n / 2 { 1.0 } else { 2.0 }) / n as f64;
        for t in 0..n {
            let (sin, cos) = (2.0 * PI * (t * f) as f64 / n as f64).sin_cos();
            fr[[t, 2 * chan_idx]] = cos * mul;
            fr[[t, 2 * chan_idx + 1]] = -sin * mul;
        }
    }
    Ok(fr)
}
