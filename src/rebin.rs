//! Rebinning of neighbouring frequency channels.

use log::trace;
use ndarray::{Array3, Axis};
use num_complex::Complex;

use crate::{
    containers::{FreqChannel, VisStream},
    DelaySpecError,
};

/// Combine each run of `channel_bin` neighbouring channels into one.
///
/// Centres are averaged, widths and weights are summed, and visibilities are
/// averaged with the weights (zero where the summed weight is zero).
///
/// # Errors
///
/// [`DelaySpecError::RebinMismatch`] if `channel_bin` is zero or doesn't
/// divide the number of channels. Other errors as [`VisStream::validate`].
pub fn rebin_frequency(stream: &VisStream, channel_bin: usize) -> Result<VisStream, DelaySpecError> {
    trace!("start rebin_frequency");
    stream.validate()?;

    let num_chans = stream.num_freqs();
    if channel_bin == 0 || num_chans % channel_bin != 0 {
        return Err(DelaySpecError::RebinMismatch {
            num_chans,
            channel_bin,
        });
    }
    let num_out = num_chans / channel_bin;

    let freq = stream
        .freq
        .chunks(channel_bin)
        .map(|chunk| FreqChannel {
            centre: chunk.iter().map(|chan| chan.centre).sum::<f64>() / channel_bin as f64,
            width: chunk.iter().map(|chan| chan.width).sum(),
        })
        .collect();

    let shape = (num_out, stream.num_prods(), stream.num_times());
    let mut vis = Array3::<Complex<f64>>::zeros(shape);
    let mut weight = Array3::<f64>::zeros(shape);

    for (((mut vis_out, mut weight_out), vis_in), weight_in) in vis
        .axis_iter_mut(Axis(0))
        .zip(weight.axis_iter_mut(Axis(0)))
        .zip(stream.vis.axis_chunks_iter(Axis(0), channel_bin))
        .zip(stream.weight.axis_chunks_iter(Axis(0), channel_bin))
    {
        for (vis_chan, weight_chan) in vis_in.outer_iter().zip(weight_in.outer_iter()) {
            ndarray::Zip::from(&mut vis_out)
                .and(&vis_chan)
                .and(&weight_chan)
                .for_each(|out, &v, &w| *out += v * w);
            weight_out += &weight_chan;
        }
        ndarray::Zip::from(&mut vis_out)
            .and(&weight_out)
            .for_each(|out, &w| *out = if w > 0.0 { *out / w } else { Complex::default() });
    }

    trace!("end rebin_frequency");
    VisStream::new(freq, stream.prod.clone(), stream.time.clone(), vis, weight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array1;

    fn stream() -> VisStream {
        let freq = (0..6)
            .map(|i| FreqChannel {
                centre: 600.0 + i as f64,
                width: 1.0,
            })
            .collect();
        let mut stream = VisStream::zeros(freq, vec![(0, 1)], Array1::zeros(2));
        for ((f, _, t), vis) in stream.vis.indexed_iter_mut() {
            *vis = Complex::new(f as f64, t as f64);
        }
        stream.weight.fill(1.0);
        stream
    }

    #[test]
    fn test_rebin_weighted_average() {
        let mut stream = stream();
        // weight the first channel twice as much, and flag the last pair
        stream.weight[[0, 0, 0]] = 2.0;
        stream.weight[[4, 0, 1]] = 0.0;
        stream.weight[[5, 0, 1]] = 0.0;

        let rebinned = rebin_frequency(&stream, 2).unwrap();
        assert_eq!(rebinned.vis.dim(), (3, 1, 2));
        assert_abs_diff_eq!(rebinned.freq[1].centre, 602.5);
        assert_abs_diff_eq!(rebinned.freq[1].width, 2.0);

        assert_abs_diff_eq!(rebinned.vis[[0, 0, 0]], Complex::new(1.0 / 3.0, 0.0), epsilon = 1e-12);
        assert_abs_diff_eq!(rebinned.vis[[1, 0, 1]], Complex::new(2.5, 1.0), epsilon = 1e-12);
        assert_abs_diff_eq!(rebinned.vis[[2, 0, 1]], Complex::new(0.0, 0.0));

        // weights are conserved
        assert_abs_diff_eq!(rebinned.weight.sum(), stream.weight.sum());
        assert_abs_diff_eq!(rebinned.weight[[0, 0, 0]], 3.0);
    }

    #[test]
    fn test_rebin_mismatch() {
        assert!(matches!(
            rebin_frequency(&stream(), 4),
            Err(DelaySpecError::RebinMismatch {
                num_chans: 6,
                channel_bin: 4
            })
        ));
        assert!(matches!(
            rebin_frequency(&stream(), 0),
            Err(DelaySpecError::RebinMismatch { .. })
        ));
    }
}
