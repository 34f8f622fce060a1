//! Generalised cosine-sum apodisation windows.
//!
//! Unlike the usual `n`-point window generators these can be evaluated at
//! arbitrary locations in `[0, 1]`, so they still make sense for irregular
//! channel selections.

use std::{f64::consts::PI, fmt::Display, str::FromStr};

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::DelaySpecError;

/// The family of 4-term cosine-sum window to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowType {
    /// Nuttall window, continuous first derivative at the edges.
    #[default]
    Nuttall,
    /// Blackman-Nuttall window
    BlackmanNuttall,
    /// Blackman-Harris window (-92 dB sidelobes)
    BlackmanHarris,
}

impl WindowType {
    /// The cosine coefficients `a_k` of this family, lowest harmonic first.
    pub fn coefficients(&self) -> [f64; 4] {
        match self {
            Self::Nuttall => [0.355768, -0.487396, 0.144232, -0.012604],
            Self::BlackmanNuttall => [0.3635819, -0.4891775, 0.1365995, -0.0106411],
            Self::BlackmanHarris => [0.35875, -0.48829, 0.14128, -0.01168],
        }
    }

    /// Evaluate the window at a single location in `[0, 1]`.
    pub fn eval(&self, x: f64) -> f64 {
        self.coefficients()
            .iter()
            .enumerate()
            .map(|(k, a)| a * (2.0 * PI * k as f64 * x).cos())
            .sum()
    }
}

impl Display for WindowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Nuttall => "nuttall",
                Self::BlackmanNuttall => "blackman_nuttall",
                Self::BlackmanHarris => "blackman_harris",
            }
        )
    }
}

impl FromStr for WindowType {
    type Err = DelaySpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nuttall" => Ok(Self::Nuttall),
            "blackman_nuttall" => Ok(Self::BlackmanNuttall),
            "blackman_harris" => Ok(Self::BlackmanHarris),
            _ => Err(DelaySpecError::UnknownWindow { name: s.to_string() }),
        }
    }
}

/// A generalised high-order window at arbitrary locations.
///
/// # Arguments
///
/// * `x` - locations to evaluate at, which must lie in the range 0 to 1.
/// * `window` - the window family.
///
/// # Examples
///
/// ```rust
/// use delayspec::window::{window_generalised, WindowType};
/// use ndarray::array;
///
/// let w = window_generalised(array![0.0, 0.5, 1.0].view(), WindowType::Nuttall);
/// assert!(w[0].abs() < 1e-6);
/// assert!((w[1] - 1.0).abs() < 1e-6);
/// ```
pub fn window_generalised(x: ArrayView1<f64>, window: WindowType) -> Array1<f64> {
    x.mapv(|x| window.eval(x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    const ALL_WINDOWS: [WindowType; 3] = [
        WindowType::Nuttall,
        WindowType::BlackmanNuttall,
        WindowType::BlackmanHarris,
    ];

    #[test]
    fn test_window_edges_near_zero() {
        let x = array![0.0, 1.0];
        for window in ALL_WINDOWS {
            let w = window_generalised(x.view(), window);
            // periodic in x, so both edges agree
            assert_abs_diff_eq!(w[0], w[1], epsilon = 1e-12);
            assert!(w[0].abs() < 1e-3, "{window} edge value {}", w[0]);
        }
        let w = window_generalised(x.view(), WindowType::Nuttall);
        assert_abs_diff_eq!(w[0], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_window_peak_and_symmetry() {
        let x = Array1::linspace(0.0, 1.0, 11);
        for window in ALL_WINDOWS {
            let w = window_generalised(x.view(), window);
            assert_abs_diff_eq!(w[5], 1.0, epsilon = 1e-6);
            for i in 0..5 {
                assert_abs_diff_eq!(w[i], w[10 - i], epsilon = 1e-12);
                assert!(w[i] < w[i + 1]);
            }
        }
    }

    #[test]
    fn test_window_irregular_locations() {
        let x = array![0.013, 0.27, 0.31, 0.8];
        let w = window_generalised(x.view(), WindowType::BlackmanHarris);
        for (&xi, &wi) in x.iter().zip(w.iter()) {
            assert_abs_diff_eq!(wi, WindowType::BlackmanHarris.eval(xi));
            assert!(wi > 0.0);
        }
    }

    #[test]
    fn test_window_from_str() {
        assert_eq!(
            "blackman_nuttall".parse::<WindowType>().unwrap(),
            WindowType::BlackmanNuttall
        );
        assert_eq!("Nuttall".parse::<WindowType>().unwrap(), WindowType::Nuttall);
        for window in ALL_WINDOWS {
            assert_eq!(window.to_string().parse::<WindowType>().unwrap(), window);
        }
        assert!(matches!(
            "hann".parse::<WindowType>(),
            Err(DelaySpecError::UnknownWindow { .. })
        ));
    }
}
