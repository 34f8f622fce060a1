//! Containers for visibilities, telescope layout and delay spectra.

use std::fmt::Display;

use ndarray::{Array1, Array2, Array3};
use num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::DelaySpecError;

/// A single frequency channel [MHz].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FreqChannel {
    /// Centre frequency [MHz]
    pub centre: f64,
    /// Channel width [MHz]
    pub width: f64,
}

/// Visibilities for a set of feed products, ordered `(freq, prod, time)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisStream {
    /// Frequency channels, possibly an irregular subset of a regular comb
    pub freq: Vec<FreqChannel>,
    /// Feed pair `(fi, fj)` of each product
    pub prod: Vec<(usize, usize)>,
    /// Sample times (or any other ensemble axis)
    pub time: Array1<f64>,
    /// Complex visibilities `(freq, prod, time)`
    pub vis: Array3<Complex<f64>>,
    /// Inverse variance weights with the same shape as `vis`, zero where flagged
    pub weight: Array3<f64>,
}

impl VisStream {
    /// Create a new stream, checking that the arrays agree with the axes.
    ///
    /// # Errors
    ///
    /// [`DelaySpecError::BadArrayShape`] if `vis` or `weight` don't match the
    /// lengths of `freq`, `prod` and `time`.
    pub fn new(
        freq: Vec<FreqChannel>,
        prod: Vec<(usize, usize)>,
        time: Array1<f64>,
        vis: Array3<Complex<f64>>,
        weight: Array3<f64>,
    ) -> Result<Self, DelaySpecError> {
        let stream = Self {
            freq,
            prod,
            time,
            vis,
            weight,
        };
        stream.validate()?;
        Ok(stream)
    }

    /// Create a stream of zero visibilities and weights.
    pub fn zeros(freq: Vec<FreqChannel>, prod: Vec<(usize, usize)>, time: Array1<f64>) -> Self {
        let shape = (freq.len(), prod.len(), time.len());
        Self {
            freq,
            prod,
            time,
            vis: Array3::zeros(shape),
            weight: Array3::zeros(shape),
        }
    }

    /// Check the array shapes, e.g. after deserializing.
    ///
    /// # Errors
    ///
    /// See [`VisStream::new`].
    pub fn validate(&self) -> Result<(), DelaySpecError> {
        let expected = (self.num_freqs(), self.num_prods(), self.num_times());
        for (argument, dim) in [("vis", self.vis.dim()), ("weight", self.weight.dim())] {
            if dim != expected {
                return Err(DelaySpecError::BadArrayShape {
                    argument: argument.into(),
                    function: "VisStream::validate".into(),
                    expected: format!("{expected:?}"),
                    received: format!("{dim:?}"),
                });
            }
        }
        Ok(())
    }

    /// Number of frequency channels.
    pub fn num_freqs(&self) -> usize {
        self.freq.len()
    }

    /// Number of feed products.
    pub fn num_prods(&self) -> usize {
        self.prod.len()
    }

    /// Number of time samples.
    pub fn num_times(&self) -> usize {
        self.time.len()
    }

    /// Channel centre frequencies [MHz].
    pub fn freq_centres(&self) -> Array1<f64> {
        self.freq.iter().map(|chan| chan.centre).collect()
    }
}

/// The polarisation a feed is sensitive to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarisation {
    /// Aligned east-west
    X,
    /// Aligned north-south
    Y,
    /// Anything which isn't a working X or Y feed
    Unknown,
}

impl Display for Polarisation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::X => "X",
                Self::Y => "Y",
                Self::Unknown => "?",
            }
        )
    }
}

/// A single feed of the telescope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feed {
    /// Polarisation of the feed
    pub pol: Polarisation,
    /// Index of the cylinder (or station) the feed sits on
    pub cylinder: usize,
}

impl Feed {
    /// Create a new feed.
    pub fn new(pol: Polarisation, cylinder: usize) -> Self {
        Self { pol, cylinder }
    }
}

/// The parts of a telescope's layout needed to combine feed products into
/// baselines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelescopeGeometry {
    /// All feeds, indexed by the feed numbers in [`VisStream::prod`]
    pub feeds: Vec<Feed>,
    /// `(nfeed, nfeed)` map of feed pair to baseline index, `None` if the pair
    /// isn't a valid baseline
    pub feedmap: Array2<Option<usize>>,
    /// `(nbaseline, 2)` baseline vectors, east-west and north-south [m]
    pub baselines: Array2<f64>,
}

impl TelescopeGeometry {
    /// Create a new geometry, checking the feed map against the baselines.
    ///
    /// # Errors
    ///
    /// [`DelaySpecError::BadArrayShape`] if `feedmap` isn't `(nfeed, nfeed)`,
    /// `baselines` isn't `(nbaseline, 2)`, or the map points past the last
    /// baseline.
    pub fn new(
        feeds: Vec<Feed>,
        feedmap: Array2<Option<usize>>,
        baselines: Array2<f64>,
    ) -> Result<Self, DelaySpecError> {
        let geometry = Self {
            feeds,
            feedmap,
            baselines,
        };
        geometry.validate()?;
        Ok(geometry)
    }

    /// Build a geometry from feed positions `(x, y)` [m]. Every feed pair
    /// `(fi, fj)` with `fi <= fj` maps to the baseline `pos[fj] - pos[fi]`,
    /// shared between pairs with identical separations.
    ///
    /// # Errors
    ///
    /// [`DelaySpecError::BadArrayShape`] if there isn't one position per feed.
    pub fn from_positions(feeds: Vec<Feed>, positions: &[[f64; 2]]) -> Result<Self, DelaySpecError> {
        let num_feeds = feeds.len();
        if positions.len() != num_feeds {
            return Err(DelaySpecError::BadArrayShape {
                argument: "positions".into(),
                function: "TelescopeGeometry::from_positions".into(),
                expected: format!("[{num_feeds}]"),
                received: format!("[{}]", positions.len()),
            });
        }
        let mut unique: Vec<[f64; 2]> = vec![];
        let mut feedmap = Array2::from_elem((num_feeds, num_feeds), None);
        for fi in 0..num_feeds {
            for fj in fi..num_feeds {
                let sep = [
                    positions[fj][0] - positions[fi][0],
                    positions[fj][1] - positions[fi][1],
                ];
                let bl_idx = match unique.iter().position(|&u| u == sep) {
                    Some(bl_idx) => bl_idx,
                    None => {
                        unique.push(sep);
                        unique.len() - 1
                    }
                };
                feedmap[[fi, fj]] = Some(bl_idx);
            }
        }
        let baselines = Array2::from_shape_fn((unique.len(), 2), |(b, c)| unique[b][c]);
        Self::new(feeds, feedmap, baselines)
    }

    /// Check the array shapes, e.g. after deserializing.
    ///
    /// # Errors
    ///
    /// See [`TelescopeGeometry::new`].
    pub fn validate(&self) -> Result<(), DelaySpecError> {
        let num_feeds = self.num_feeds();
        if self.feedmap.dim() != (num_feeds, num_feeds) {
            return Err(DelaySpecError::BadArrayShape {
                argument: "feedmap".into(),
                function: "TelescopeGeometry::validate".into(),
                expected: format!("({num_feeds}, {num_feeds})"),
                received: format!("{:?}", self.feedmap.dim()),
            });
        }
        if self.baselines.ncols() != 2 {
            return Err(DelaySpecError::BadArrayShape {
                argument: "baselines".into(),
                function: "TelescopeGeometry::validate".into(),
                expected: "(nbaseline, 2)".into(),
                received: format!("{:?}", self.baselines.dim()),
            });
        }
        let num_baselines = self.num_baselines();
        if let Some(bl_idx) = self.feedmap.iter().flatten().find(|&&b| b >= num_baselines) {
            return Err(DelaySpecError::BadArrayShape {
                argument: "feedmap".into(),
                function: "TelescopeGeometry::validate".into(),
                expected: format!("baseline indices < {num_baselines}"),
                received: format!("{bl_idx}"),
            });
        }
        Ok(())
    }

    /// Number of feeds.
    pub fn num_feeds(&self) -> usize {
        self.feeds.len()
    }

    /// Number of baselines.
    pub fn num_baselines(&self) -> usize {
        self.baselines.nrows()
    }

    /// The baseline index of a feed pair, if it is a valid baseline.
    pub fn baseline_index(&self, fi: usize, fj: usize) -> Option<usize> {
        self.feedmap.get((fi, fj)).copied().flatten()
    }

    /// The `(x, y)` vector of a baseline [m].
    pub fn baseline(&self, bl_idx: usize) -> [f64; 2] {
        [self.baselines[[bl_idx, 0]], self.baselines[[bl_idx, 1]]]
    }
}

/// Delay power spectra for a set of baselines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelaySpectrum {
    /// `(nbase, 2)` baseline vectors [m]
    pub baselines: Array2<f64>,
    /// Zero centred delays [us]
    pub delays: Array1<f64>,
    /// `(nbase, ndelay)` power spectrum
    pub spectrum: Array2<f64>,
}

impl DelaySpectrum {
    /// Create a spectrum of zeros.
    pub fn new(baselines: Array2<f64>, delays: Array1<f64>) -> Self {
        let spectrum = Array2::zeros((baselines.nrows(), delays.len()));
        Self {
            baselines,
            delays,
            spectrum,
        }
    }
}
