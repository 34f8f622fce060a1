//! Estimate the delay power spectrum of instrumental Stokes I.

use std::fmt::Display;

use derive_builder::Builder;
use log::{debug, info, trace};
use ndarray::{Array1, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::{
    constants::{CHANNEL_MAPPING_TOLERANCE, DEFAULT_INITIAL_SPECTRUM, DEFAULT_NUM_GIBBS_SAMPLES},
    containers::{DelaySpectrum, FreqChannel, TelescopeGeometry, VisStream},
    gibbs::GibbsSampler,
    mask::ProductMask,
    stokes::stokes_i,
    util::{fftfreq, fftshift, median, median_axis, progress_bar},
    window::WindowType,
    DelaySpecError,
};

/// Options for estimating delay spectra by Gibbs sampling.
#[derive(Builder, Debug, Clone)]
pub struct DelaySpectrumContext {
    /// The number of Gibbs samples to draw for each baseline
    #[builder(default = "DEFAULT_NUM_GIBBS_SAMPLES")]
    pub nsamp: usize,
    /// The frequency of the zero channel, the DC channel out of the F-engine
    /// [MHz]. Defaults to the first channel of the stream.
    #[builder(default)]
    pub freq_zero: Option<f64>,
    /// The spacing of the underlying channels [MHz]. Defaults to the smallest
    /// gap between channels in the stream.
    #[builder(default)]
    pub freq_spacing: Option<f64>,
    /// The number of channels in the full set produced by the F-engine. By
    /// default the last channel of the stream is assumed to be the last of
    /// the set (or the penultimate if `skip_nyquist` is set).
    #[builder(default)]
    pub nfreq: Option<usize>,
    /// Whether the Nyquist channel is missing from the data, as with the
    /// output of CASPER PFBs
    #[builder(default = "true")]
    pub skip_nyquist: bool,
    /// Apodisation used by the sampler
    #[builder(default = "Some(WindowType::Nuttall)")]
    pub window: Option<WindowType>,
    /// Flat value of the spectrum each chain starts from
    #[builder(default = "DEFAULT_INITIAL_SPECTRUM")]
    pub initial_s: f64,
    /// Seed for the random draws, from entropy if not given
    #[builder(default)]
    pub seed: Option<u64>,
    /// Policies for excluding products from Stokes I
    #[builder(default)]
    pub product_masks: Vec<ProductMask>,
    /// Whether to draw progress bars
    #[builder(default = "true")]
    pub draw_progress: bool,
}

impl Default for DelaySpectrumContext {
    fn default() -> Self {
        Self {
            nsamp: DEFAULT_NUM_GIBBS_SAMPLES,
            freq_zero: None,
            freq_spacing: None,
            nfreq: None,
            skip_nyquist: true,
            window: Some(WindowType::Nuttall),
            initial_s: DEFAULT_INITIAL_SPECTRUM,
            seed: None,
            product_masks: vec![],
            draw_progress: true,
        }
    }
}

impl Display for DelaySpectrumContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Will draw {} Gibbs samples per baseline, starting from a flat spectrum of {}.",
            self.nsamp, self.initial_s
        )?;
        match self.freq_zero {
            Some(freq_zero) => writeln!(f, "Zero channel at {freq_zero} MHz.")?,
            None => writeln!(f, "Zero channel at the first channel of the data.")?,
        }
        match self.freq_spacing {
            Some(spacing) => writeln!(f, "Channel spacing {spacing} MHz.")?,
            None => writeln!(f, "Channel spacing from the smallest gap in the data.")?,
        }
        match self.nfreq {
            Some(nfreq) => writeln!(f, "{nfreq} channels in the full set.")?,
            None => writeln!(
                f,
                "Full set of channels inferred from the last channel, {} Nyquist.",
                if self.skip_nyquist {
                    "skipping"
                } else {
                    "including"
                }
            )?,
        }
        match self.window {
            Some(window) => writeln!(f, "Will apodise with a {window} window.")?,
            None => writeln!(f, "Will not apodise.")?,
        }
        if !self.product_masks.is_empty() {
            writeln!(
                f,
                "Will mask products with {}.",
                self.product_masks
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            )?;
        }
        if let Some(seed) = self.seed {
            writeln!(f, "Random seed {seed}.")?;
        }
        Ok(())
    }
}

/// How the channels of a stream sit within the full set of channels.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyStructure {
    /// Frequency of the zero channel [MHz]
    pub freq_zero: f64,
    /// Spacing of the full set of channels [MHz]
    pub freq_spacing: f64,
    /// Index of each stream channel in the full set
    pub channel_index: Vec<usize>,
    /// Number of channels in the full set
    pub nfreq: usize,
}

impl FrequencyStructure {
    /// Number of delays conjugate to the full set, assuming each transformed
    /// frame had an even number of samples.
    pub fn ndelay(&self) -> usize {
        2 * (self.nfreq - 1)
    }

    /// Zero centred delays [us].
    pub fn delays(&self) -> Array1<f64> {
        fftshift(fftfreq(self.ndelay(), self.freq_spacing).view())
    }
}

impl DelaySpectrumContext {
    /// Work out where the channels sit within the full set of channels.
    ///
    /// # Errors
    ///
    /// - [`DelaySpecError::BadArrayShape`] if there are no channels, if the
    ///   spacing can't be inferred from a single channel, or if the full set
    ///   would have fewer than two channels.
    /// - [`DelaySpecError::InvalidChannelMapping`] if the spacing isn't
    ///   positive, or a channel centre isn't a whole number of channels from
    ///   the zero channel.
    /// - [`DelaySpecError::ChannelOutOfRange`] if a channel is beyond `nfreq`.
    pub fn frequency_structure(
        &self,
        freq: &[FreqChannel],
    ) -> Result<FrequencyStructure, DelaySpecError> {
        let bad_freq = |expected: &str| DelaySpecError::BadArrayShape {
            argument: "freq".into(),
            function: "DelaySpectrumContext::frequency_structure".into(),
            expected: expected.into(),
            received: format!("{} channels", freq.len()),
        };
        let first = freq.first().ok_or_else(|| bad_freq("at least one channel"))?;
        let freq_zero = self.freq_zero.unwrap_or(first.centre);
        let freq_spacing = match self.freq_spacing {
            Some(spacing) => spacing,
            None => freq
                .windows(2)
                .map(|pair| (pair[1].centre - pair[0].centre).abs())
                .reduce(f64::min)
                .ok_or_else(|| bad_freq("at least two channels, or an explicit spacing"))?,
        };
        if !(freq_spacing.is_finite() && freq_spacing > 0.0) {
            return Err(DelaySpecError::InvalidChannelMapping {
                centre: first.centre,
                freq_zero,
                spacing: freq_spacing,
            });
        }

        let channel_index = freq
            .iter()
            .map(|chan| {
                let ratio = (chan.centre - freq_zero).abs() / freq_spacing;
                let index = ratio.round();
                if (ratio - index).abs() > CHANNEL_MAPPING_TOLERANCE {
                    Err(DelaySpecError::InvalidChannelMapping {
                        centre: chan.centre,
                        freq_zero,
                        spacing: freq_spacing,
                    })
                } else {
                    Ok(index as usize)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        // first channel exists, so there is a last index
        let last = channel_index[channel_index.len() - 1];
        let nfreq = self
            .nfreq
            .unwrap_or(last + 1 + usize::from(self.skip_nyquist));
        if nfreq < 2 {
            return Err(DelaySpecError::BadArrayShape {
                argument: "nfreq".into(),
                function: "DelaySpectrumContext::frequency_structure".into(),
                expected: "at least 2".into(),
                received: format!("{nfreq}"),
            });
        }
        if let Some(&channel) = channel_index.iter().max().filter(|&&max| max >= nfreq) {
            return Err(DelaySpecError::ChannelOutOfRange {
                channel,
                max: nfreq - 1,
            });
        }

        Ok(FrequencyStructure {
            freq_zero,
            freq_spacing,
            channel_index,
            nfreq,
        })
    }

    /// Estimate the delay spectrum of each Stokes I baseline of the stream.
    ///
    /// Baselines whose data are all zero (including those without every
    /// polarisation) keep a spectrum of zero. For the others the spectrum is
    /// the median over the last half of the Gibbs samples, presuming that
    /// removes the burn-in.
    ///
    /// # Errors
    ///
    /// - [`DelaySpecError::NoSamples`] if `nsamp` is zero.
    /// - errors from [`DelaySpectrumContext::frequency_structure`],
    ///   [`stokes_i`] and the sampler, which abort the whole run.
    pub fn estimate(
        &self,
        stream: &VisStream,
        geometry: &TelescopeGeometry,
    ) -> Result<DelaySpectrum, DelaySpecError> {
        trace!("start DelaySpectrumContext::estimate");
        if self.nsamp == 0 {
            return Err(DelaySpecError::NoSamples);
        }

        let stokes = stokes_i(stream, geometry, &self.product_masks)?;
        let freq_structure = self.frequency_structure(&stream.freq)?;
        let ndelay = freq_structure.ndelay();
        info!(
            "Estimating delay spectra of {} baselines at {} delays.",
            stokes.baselines.nrows(),
            ndelay
        );

        let mut delay_spec = DelaySpectrum::new(stokes.baselines.clone(), freq_structure.delays());
        let sampler = GibbsSampler::new(
            ndelay,
            Some(freq_structure.channel_index.as_slice()),
            self.window,
        )?;
        let initial_s = Array1::from_elem(ndelay, self.initial_s);
        let seed = self.seed.unwrap_or_else(rand::random);
        // a lone sample is used as is
        let num_tail = (self.nsamp / 2).max(1);

        let progress = progress_bar(stokes.baselines.nrows(), "delay spectrum", self.draw_progress);

        delay_spec
            .spectrum
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(stokes.vis.axis_iter(Axis(0)))
            .zip(stokes.weight.axis_iter(Axis(0)))
            .enumerate()
            .try_for_each(|(bl_idx, ((mut spec_row, vis), weight))| {
                if vis.iter().all(|v| v.re == 0.0 && v.im == 0.0) {
                    debug!("baseline {bl_idx} has no data");
                    progress.inc(1);
                    return Ok(());
                }
                debug!("Delay transforming baseline {bl_idx}");

                let noise_inv = median_axis(weight, Axis(1));
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                rng.set_stream(bl_idx as u64);
                let spec = sampler.sample(vis, noise_inv.view(), initial_s.view(), self.nsamp, &mut rng)?;

                let tail = ndarray::stack(
                    Axis(0),
                    &spec[spec.len() - num_tail..]
                        .iter()
                        .map(|s| s.view())
                        .collect::<Vec<_>>(),
                )
                .map_err(|_| DelaySpecError::BadArrayShape {
                    argument: "spec".into(),
                    function: "DelaySpectrumContext::estimate".into(),
                    expected: format!("{num_tail} samples of ({ndelay},)"),
                    received: format!("{} samples", spec.len()),
                })?;
                let spec_av = tail.map_axis(Axis(0), median);
                spec_row.assign(&fftshift(spec_av.view()));
                progress.inc(1);
                Ok::<(), DelaySpecError>(())
            })?;

        progress.finish();
        trace!("end DelaySpectrumContext::estimate");
        Ok(delay_spec)
    }
}
