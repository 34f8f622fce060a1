//! Deterministic removal of low delay power from a visibility stream.

use std::fmt::Display;

use derive_builder::Builder;
use log::{debug, trace};
use ndarray::Axis;
use rayon::prelude::*;

use crate::{
    constants::DEFAULT_DELAY_CUT_US,
    containers::VisStream,
    null_filter::{null_delay_filter, NullFilterOptions},
    util::{median_axis, progress_bar},
    DelaySpecError,
};

/// Options for delay filtering a stream.
#[derive(Builder, Debug, Clone)]
pub struct DelayFilterContext {
    /// Delay below which power is removed [us]
    #[builder(default = "DEFAULT_DELAY_CUT_US")]
    pub delay_cut: f64,
    /// Whether to update the weights after filtering. Not implemented.
    #[builder(default = "false")]
    pub update_weight: bool,
    /// How the null space is constructed
    #[builder(default)]
    pub null_filter: NullFilterOptions,
    /// Whether to draw progress bars
    #[builder(default = "true")]
    pub draw_progress: bool,
}

impl Default for DelayFilterContext {
    fn default() -> Self {
        Self {
            delay_cut: DEFAULT_DELAY_CUT_US,
            update_weight: false,
            null_filter: NullFilterOptions::default(),
            draw_progress: true,
        }
    }
}

impl Display for DelayFilterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Will remove delays below {} us using {} trial delays.",
            self.delay_cut, self.null_filter.num_delay
        )?;
        writeln!(
            f,
            "Will keep modes with singular values below {} of the largest.",
            self.null_filter.tol
        )?;
        match self.null_filter.window {
            Some(window) => writeln!(f, "Will apodise with a {window} window.")?,
            None => writeln!(f, "Will not apodise.")?,
        }
        writeln!(
            f,
            "{} update weights.",
            if self.update_weight { "Will" } else { "Will not" }
        )?;
        Ok(())
    }
}

impl DelayFilterContext {
    /// Remove delays below `delay_cut` from every product of the stream, in
    /// place. Weights are left untouched.
    ///
    /// Each product is filtered with a projector built from the channels where
    /// its median weight over time is positive. The weight only selects
    /// channels: it becomes a 0/1 mask, so it neither weights the
    /// decomposition nor scales the output.
    ///
    /// With the default Nuttall window the output is apodised as well as
    /// filtered, so even a cosine well outside the cut keeps only about 12% of
    /// its energy. Set `null_filter.window` to `None` to leave it untouched.
    ///
    /// # Errors
    ///
    /// - [`DelaySpecError::WeightUpdateNotImplemented`] if `update_weight` is
    ///   set, before any data is touched.
    /// - errors from [`VisStream::validate`] and [`null_delay_filter`], which
    ///   abort the whole run.
    pub fn filter(&self, stream: &mut VisStream) -> Result<(), DelaySpecError> {
        trace!("start DelayFilterContext::filter");
        if self.update_weight {
            return Err(DelaySpecError::WeightUpdateNotImplemented);
        }
        stream.validate()?;

        let freq = stream.freq_centres();
        let progress = progress_bar(stream.num_prods(), "delay filter", self.draw_progress);

        stream
            .vis
            .axis_iter_mut(Axis(1))
            .into_par_iter()
            .zip(stream.weight.axis_iter(Axis(1)))
            .enumerate()
            .try_for_each(|(prod_idx, (mut vis_prod, weight_prod))| {
                let mask = median_axis(weight_prod, Axis(1)).mapv(|w| if w > 0.0 { 1.0 } else { 0.0 });
                let filter =
                    null_delay_filter(freq.view(), self.delay_cut, mask.view(), &self.null_filter)?;
                debug!("product {prod_idx}: removed {} modes", filter.num_modes);
                let filtered = filter.apply(vis_prod.view());
                vis_prod.assign(&filtered);
                progress.inc(1);
                Ok::<(), DelaySpecError>(())
            })?;

        progress.finish();
        trace!("end DelayFilterContext::filter");
        Ok(())
    }
}
