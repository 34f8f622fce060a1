//! Gibbs sampling of delay power spectra.
//!
//! Each iteration draws a realisation of the delay-domain signal given the
//! current power spectrum (a perturbed Wiener filter), then draws a new power
//! spectrum given that signal (a scaled inverse chi-squared). Only the spectrum
//! draws are returned.

use log::trace;
use nalgebra::Cholesky;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use num_complex::Complex;
use rand::Rng;
use rand_distr::{ChiSquared, Distribution, StandardNormal};

use crate::{
    fourier::{fourier_matrix_r2c, resolve_channels},
    util::{from_dmatrix, to_dmatrix},
    window::{window_generalised, WindowType},
    DelaySpecError,
};

/// A sampler for delay spectra of length `n` from one channel selection.
///
/// The (optionally apodised) Fourier matrix is built once, so a sampler can be
/// shared by every baseline with the same channels.
#[derive(Debug, Clone)]
pub struct GibbsSampler {
    n: usize,
    fsel: Vec<usize>,
    /// window for each interleaved real / imaginary row
    window: Option<Array1<f64>>,
    /// `(2 * nchan, n)`
    fourier: Array2<f64>,
}

impl GibbsSampler {
    /// Create a sampler for `n` delays, where there are `n / 2 + 1` channels in
    /// total of which `fsel` are present (by default all of them).
    ///
    /// # Errors
    ///
    /// As [`fourier_matrix_r2c`].
    pub fn new(
        n: usize,
        fsel: Option<&[usize]>,
        window: Option<WindowType>,
    ) -> Result<Self, DelaySpecError> {
        let fsel = resolve_channels(n, fsel)?;
        let mut fourier = fourier_matrix_r2c(n, Some(fsel.as_slice()))?;

        let window = window.map(|window| {
            let total_freq = (n / 2 + 1) as f64;
            let x = Array1::from_iter(fsel.iter().map(|&f| f as f64 / total_freq));
            let w = window_generalised(x.view(), window);
            Array1::from_iter(w.iter().flat_map(|&w| [w, w]))
        });
        if let Some(w) = window.as_ref() {
            fourier *= &w.view().insert_axis(Axis(1));
        }

        Ok(Self {
            n,
            fsel,
            window,
            fourier,
        })
    }

    /// The number of delay samples in each spectrum draw.
    pub fn num_delays(&self) -> usize {
        self.n
    }

    /// The channel indices this sampler expects data for.
    pub fn channels(&self) -> &[usize] {
        &self.fsel
    }

    /// Interleave real and imaginary parts of `(nchan, ntime)` data, applying
    /// the window if there is one.
    fn pack(&self, data: ArrayView2<Complex<f64>>) -> Array2<f64> {
        let (num_chans, num_times) = data.dim();
        let mut packed = Array2::zeros((2 * num_chans, num_times));
        for ((chan_idx, time_idx), vis) in data.indexed_iter() {
            packed[[2 * chan_idx, time_idx]] = vis.re;
            packed[[2 * chan_idx + 1, time_idx]] = vis.im;
        }
        if let Some(w) = self.window.as_ref() {
            packed *= &w.view().insert_axis(Axis(1));
        }
        packed
    }

    /// Expand the channel inverse noise to the real and imaginary parts. The
    /// zero and Nyquist channels are strictly real.
    fn expand_noise(&self, noise_inv: ArrayView1<f64>) -> Array1<f64> {
        let nyquist = self.n / 2;
        let mut expanded = Array1::zeros(2 * self.fsel.len());
        for (chan_idx, (&f, &ni)) in self.fsel.iter().zip(noise_inv.iter()).enumerate() {
            if f == 0 || f == nyquist {
                expanded[2 * chan_idx] = ni;
            } else {
                expanded[2 * chan_idx] = ni / 2f64.sqrt();
                expanded[2 * chan_idx + 1] = ni / 2f64.sqrt();
            }
        }
        expanded
    }

    /// Draw `niter` power spectrum samples.
    ///
    /// # Arguments
    ///
    /// * `data` - `(nchan, ntime)` visibilities at the sampler's channels.
    ///   Every time sample is treated as an independent realisation.
    /// * `noise_inv` - `(nchan,)` inverse noise variance, zero where flagged.
    /// * `initial_s` - `(n,)` power spectrum to start the chain from.
    /// * `niter` - number of samples to draw.
    /// * `rng` - source of randomness.
    ///
    /// # Errors
    ///
    /// - [`DelaySpecError::BadArrayShape`] if any input has the wrong shape.
    /// - [`DelaySpecError::InsufficientEnsemble`] if there are fewer than two
    ///   time samples.
    /// - [`DelaySpecError::NonPositiveSpectrum`] if the spectrum (initial or
    ///   drawn) is not strictly positive and finite. Every returned draw has
    ///   been checked.
    /// - [`DelaySpecError::NotPositiveDefinite`] if the Wiener filter system
    ///   can't be factorised.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        data: ArrayView2<Complex<f64>>,
        noise_inv: ArrayView1<f64>,
        initial_s: ArrayView1<f64>,
        niter: usize,
        rng: &mut R,
    ) -> Result<Vec<Array1<f64>>, DelaySpecError> {
        trace!("start GibbsSampler::sample");

        let num_chans = self.fsel.len();
        let (data_chans, num_times) = data.dim();
        if data_chans != num_chans {
            return Err(DelaySpecError::BadArrayShape {
                argument: "data".into(),
                function: "GibbsSampler::sample".into(),
                expected: format!("({num_chans}, ntime)"),
                received: format!("{:?}", data.dim()),
            });
        }
        if noise_inv.len() != num_chans {
            return Err(DelaySpecError::BadArrayShape {
                argument: "noise_inv".into(),
                function: "GibbsSampler::sample".into(),
                expected: format!("({num_chans},)"),
                received: format!("({},)", noise_inv.len()),
            });
        }
        if initial_s.len() != self.n {
            return Err(DelaySpecError::BadArrayShape {
                argument: "initial_s".into(),
                function: "GibbsSampler::sample".into(),
                expected: format!("({},)", self.n),
                received: format!("({},)", initial_s.len()),
            });
        }
        if num_times < 2 {
            return Err(DelaySpecError::InsufficientEnsemble {
                num_samples: num_times,
            });
        }

        let packed = self.pack(data);
        let noise_inv_r = self.expand_noise(noise_inv);
        let sqrt_noise_inv_r = noise_inv_r.mapv(f64::sqrt).insert_axis(Axis(1));

        // Fᵀ N is used multiple times
        let ftni = &self.fourier.t() * &noise_inv_r.view().insert_axis(Axis(0));
        let ftnif = ftni.dot(&self.fourier);
        let ftnid = ftni.dot(&packed);

        let df = num_times as f64;
        let chi2 = ChiSquared::new(df).map_err(|_| DelaySpecError::InsufficientEnsemble {
            num_samples: num_times,
        })?;

        let mut spec = Vec::with_capacity(niter);
        let mut s_samp = initial_s.to_owned();

        if niter > 0 {
            check_spectrum(s_samp.view())?;
        }

        for iteration in 0..niter {
            // Draw a signal sample with the perturbed Wiener filter
            let si = s_samp.mapv(f64::recip);
            let mut ci = ftnif.clone();
            ci.diag_mut().zip_mut_with(&si, |c, &s| *c += s);

            let w1: Array2<f64> =
                Array2::from_shape_simple_fn((self.n, num_times), || StandardNormal.sample(&mut *rng));
            let w2: Array2<f64> =
                Array2::from_shape_simple_fn(packed.raw_dim(), || StandardNormal.sample(&mut *rng));

            let y = &ftnid
                + &(w1 * &si.mapv(f64::sqrt).insert_axis(Axis(1)))
                + self.fourier.t().dot(&(w2 * &sqrt_noise_inv_r));

            let chol = Cholesky::new(to_dmatrix(ci.view())).ok_or(
                DelaySpecError::NotPositiveDefinite {
                    source_file: file!(),
                    source_line: line!(),
                    iteration,
                },
            )?;
            let d_samp = from_dmatrix(&chol.solve(&to_dmatrix(y.view())));

            // Draw a power spectrum sample from the inverse chi-squared implied
            // by a flat prior
            let s_hat = d_samp.var_axis(Axis(1), 0.0);
            s_samp = s_hat.mapv(|s| s * df / chi2.sample(&mut *rng));
            check_spectrum(s_samp.view())?;

            spec.push(s_samp.clone());
        }

        trace!("end GibbsSampler::sample");
        Ok(spec)
    }
}

fn check_spectrum(s: ArrayView1<f64>) -> Result<(), DelaySpecError> {
    match s
        .iter()
        .enumerate()
        .find(|(_, &s)| !(s.is_finite() && s > 0.0))
    {
        Some((index, &value)) => Err(DelaySpecError::NonPositiveSpectrum { index, value }),
        None => Ok(()),
    }
}

/// Estimate the delay spectrum by Gibbs sampling.
///
/// Estimates the spectrum at the `n` delay samples conjugate to `n / 2 + 1`
/// frequency channels, of which `fsel` (by default all) have data. See
/// [`GibbsSampler::sample`] for the arguments.
///
/// # Errors
///
/// As [`GibbsSampler::new`] and [`GibbsSampler::sample`].
#[allow(clippy::too_many_arguments)]
pub fn delay_spectrum_gibbs<R: Rng + ?Sized>(
    data: ArrayView2<Complex<f64>>,
    n: usize,
    noise_inv: ArrayView1<f64>,
    initial_s: ArrayView1<f64>,
    window: Option<WindowType>,
    fsel: Option<&[usize]>,
    niter: usize,
    rng: &mut R,
) -> Result<Vec<Array1<f64>>, DelaySpecError> {
    GibbsSampler::new(n, fsel, window)?.sample(data, noise_inv, initial_s, niter, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use crate::util::median;

    /// Complex channel data from a packed `(2 * nchan, ntime)` array.
    fn unpack(packed: &Array2<f64>) -> Array2<Complex<f64>> {
        let (rows, num_times) = packed.dim();
        Array2::from_shape_fn((rows / 2, num_times), |(c, t)| {
            Complex::new(packed[[2 * c, t]], packed[[2 * c + 1, t]])
        })
    }

    fn random_data(num_chans: usize, num_times: usize, rng: &mut ChaCha8Rng) -> Array2<Complex<f64>> {
        Array2::from_shape_simple_fn((num_chans, num_times), || {
            Complex::new(StandardNormal.sample(&mut *rng), StandardNormal.sample(&mut *rng))
        })
    }

    #[test]
    fn test_draws_strictly_positive() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let fsel = [1, 2, 3, 5, 8];
        let data = random_data(fsel.len(), 10, &mut rng);
        let noise_inv = Array1::from_elem(fsel.len(), 4.0);
        let initial_s = Array1::from_elem(16, 10.0);

        let spec = delay_spectrum_gibbs(
            data.view(),
            16,
            noise_inv.view(),
            initial_s.view(),
            Some(WindowType::Nuttall),
            Some(fsel.as_slice()),
            20,
            &mut rng,
        )
        .unwrap();

        assert_eq!(spec.len(), 20);
        for draw in spec.iter() {
            assert_eq!(draw.len(), 16);
            assert!(draw.iter().all(|&s| s.is_finite() && s > 0.0));
        }
    }

    #[test]
    fn test_flat_spectrum_recovered() {
        let n = 32;
        let num_times = 64;
        let s0: f64 = 1.0;
        let sampler = GibbsSampler::new(n, None, None).unwrap();
        let fourier = fourier_matrix_r2c(n, None).unwrap();
        let num_chans = sampler.channels().len();

        let mut means = vec![];
        for seed in 0..4 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let signal: Array2<f64> = Array2::from_shape_simple_fn((n, num_times), || {
                let z: f64 = StandardNormal.sample(&mut rng);
                s0.sqrt() * z
            });
            let noise: Array2<f64> = Array2::from_shape_simple_fn((2 * num_chans, num_times), || {
                let z: f64 = StandardNormal.sample(&mut rng);
                0.01 * z
            });
            let data = unpack(&(fourier.dot(&signal) + noise));
            let noise_inv = Array1::from_elem(num_chans, 1e4);
            let initial_s = Array1::from_elem(n, 10.0);

            let spec = sampler
                .sample(data.view(), noise_inv.view(), initial_s.view(), 20, &mut rng)
                .unwrap();
            let tail = ndarray::stack(
                Axis(0),
                &spec[10..].iter().map(|s| s.view()).collect::<Vec<_>>(),
            )
            .unwrap();
            let median_spec = tail.map_axis(Axis(0), median);
            means.push(median_spec.mean().unwrap());
        }
        let mean = means.iter().sum::<f64>() / means.len() as f64;
        assert!((mean - s0).abs() < 0.25 * s0, "mean spectrum {mean}");
    }

    #[test]
    fn test_flagged_channels_have_no_influence() {
        let n = 8;
        let noise_inv = Array1::zeros(5);
        let initial_s = Array1::from_elem(n, 2.0);
        let sampler = GibbsSampler::new(n, None, Some(WindowType::BlackmanHarris)).unwrap();

        let quiet = Array2::from_elem((5, 4), Complex::new(1.0, -1.0));
        let loud = Array2::from_elem((5, 4), Complex::new(1e6, 3e5));

        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let a = sampler
            .sample(quiet.view(), noise_inv.view(), initial_s.view(), 5, &mut rng)
            .unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let b = sampler
            .sample(loud.view(), noise_inv.view(), initial_s.view(), 5, &mut rng)
            .unwrap();
        for (a, b) in a.iter().zip(b.iter()) {
            assert_abs_diff_eq!(a, b);
        }
    }

    #[test]
    fn test_sampler_errors() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(matches!(
            GibbsSampler::new(15, None, None),
            Err(DelaySpecError::OddTransformLength { n: 15 })
        ));

        let sampler = GibbsSampler::new(8, Some(&[0, 1, 2][..]), None).unwrap();
        assert_eq!(sampler.num_delays(), 8);
        assert_eq!(sampler.channels(), &[0, 1, 2]);
        let noise_inv = Array1::ones(3);
        let initial_s = Array1::ones(8);

        let single = random_data(3, 1, &mut rng);
        assert!(matches!(
            sampler.sample(single.view(), noise_inv.view(), initial_s.view(), 2, &mut rng),
            Err(DelaySpecError::InsufficientEnsemble { num_samples: 1 })
        ));

        let data = random_data(3, 6, &mut rng);
        let mut bad_s = initial_s.clone();
        bad_s[5] = 0.0;
        assert!(matches!(
            sampler.sample(data.view(), noise_inv.view(), bad_s.view(), 2, &mut rng),
            Err(DelaySpecError::NonPositiveSpectrum { index: 5, .. })
        ));

        let short_noise = Array1::ones(2);
        assert!(matches!(
            sampler.sample(data.view(), short_noise.view(), initial_s.view(), 2, &mut rng),
            Err(DelaySpecError::BadArrayShape { .. })
        ));
        let wrong_chans = random_data(4, 6, &mut rng);
        assert!(matches!(
            sampler.sample(wrong_chans.view(), noise_inv.view(), initial_s.view(), 2, &mut rng),
            Err(DelaySpecError::BadArrayShape { .. })
        ));

        // with no iterations the initial spectrum isn't even checked
        assert!(sampler
            .sample(data.view(), noise_inv.view(), bad_s.view(), 0, &mut rng)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_overflowing_draw_is_rejected() {
        // with no data the signal draw scales as sqrt(S), so the variance of a
        // chain started at the largest float overflows on the first draw
        let n = 8;
        let sampler = GibbsSampler::new(n, None, None).unwrap();
        assert_eq!(sampler.num_delays(), n);
        let data = Array2::from_elem((5, 8), Complex::new(1.0, 0.0));
        let noise_inv = Array1::zeros(5);
        let initial_s = Array1::from_elem(n, f64::MAX);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert!(matches!(
            sampler.sample(data.view(), noise_inv.view(), initial_s.view(), 1, &mut rng),
            Err(DelaySpecError::NonPositiveSpectrum { .. })
        ));
    }
}
