//! Combine feed products into instrumental Stokes I baselines.

use std::{cmp::Ordering, collections::HashSet};

use itertools::Itertools;
use log::{debug, trace};
use ndarray::{s, Array2, Array3};
use num_complex::Complex;

use crate::{
    containers::{Polarisation, TelescopeGeometry, VisStream},
    mask::{product_mask, ProductMask},
    DelaySpecError,
};

/// Instrumental Stokes I visibilities, ordered `(baseline, freq, time)`.
#[derive(Debug, Clone)]
pub struct StokesI {
    /// Summed XX and YY visibilities
    pub vis: Array3<Complex<f64>>,
    /// Summed weights
    pub weight: Array3<f64>,
    /// `(nbase, 2)` unique baseline vectors [m], sorted by `x` then `y`
    pub baselines: Array2<f64>,
}

const REQUIRED_POLS: [(Polarisation, Polarisation); 4] = [
    (Polarisation::X, Polarisation::X),
    (Polarisation::X, Polarisation::Y),
    (Polarisation::Y, Polarisation::X),
    (Polarisation::Y, Polarisation::Y),
];

fn cmp_baselines(a: &[f64; 2], b: &[f64; 2]) -> Ordering {
    a[0].total_cmp(&b[0]).then(a[1].total_cmp(&b[1]))
}

/// Extract instrumental Stokes I from a stream of feed products.
///
/// Products are grouped by the vector of the baseline they map to. A group is
/// only used if it contains all four of the XX, XY, YX and YY combinations, in
/// which case the (unmasked) XX and YY products are summed along with their
/// weights. Groups which are skipped keep zero data. Products between feeds
/// that aren't a valid baseline are ignored entirely.
///
/// # Errors
///
/// [`DelaySpecError::BadArrayShape`] if the stream or the geometry is
/// inconsistent.
pub fn stokes_i(
    stream: &VisStream,
    geometry: &TelescopeGeometry,
    masks: &[ProductMask],
) -> Result<StokesI, DelaySpecError> {
    trace!("start stokes_i");
    stream.validate()?;
    geometry.validate()?;

    // the baseline vector of every product with a valid feed pair, adding zero
    // so that -0.0 and 0.0 compare equal
    let prod_baselines: Vec<Option<[f64; 2]>> = stream
        .prod
        .iter()
        .map(|&(fi, fj)| {
            geometry.baseline_index(fi, fj).map(|bl_idx| {
                let [x, y] = geometry.baseline(bl_idx);
                [x + 0.0, y + 0.0]
            })
        })
        .collect();

    let ubase: Vec<[f64; 2]> = prod_baselines
        .iter()
        .flatten()
        .copied()
        .sorted_by(cmp_baselines)
        .dedup()
        .collect();
    let num_base = ubase.len();

    let prod_groups: Vec<Option<usize>> = prod_baselines
        .iter()
        .map(|bl| bl.and_then(|bl| ubase.binary_search_by(|u| cmp_baselines(u, &bl)).ok()))
        .collect();

    let pol_of = |feed: usize| {
        geometry
            .feeds
            .get(feed)
            .map_or(Polarisation::Unknown, |feed| feed.pol)
    };

    // which polarisation combinations each group has
    let mut group_pols = vec![HashSet::new(); num_base];
    for (&(fi, fj), group) in stream.prod.iter().zip(prod_groups.iter()) {
        if let Some(group) = group {
            group_pols[*group].insert((pol_of(fi), pol_of(fj)));
        }
    }
    let complete: Vec<bool> = group_pols
        .iter()
        .map(|pols| REQUIRED_POLS.iter().all(|pol| pols.contains(pol)))
        .collect();
    let num_incomplete = complete.iter().filter(|&&c| !c).count();
    if num_incomplete > 0 {
        debug!("skipping {num_incomplete} of {num_base} baselines without all polarisations");
    }

    let keep = product_mask(geometry, &stream.prod, masks);

    let shape = (num_base, stream.num_freqs(), stream.num_times());
    let mut vis = Array3::zeros(shape);
    let mut weight = Array3::zeros(shape);
    for (prod_idx, (&(fi, fj), group)) in stream.prod.iter().zip(prod_groups.iter()).enumerate() {
        let Some(group) = *group else {
            continue;
        };
        let pol = pol_of(fi);
        if !complete[group]
            || !keep[prod_idx]
            || pol != pol_of(fj)
            || pol == Polarisation::Unknown
        {
            continue;
        }
        let mut group_vis = vis.slice_mut(s![group, .., ..]);
        group_vis += &stream.vis.slice(s![.., prod_idx, ..]);
        let mut group_weight = weight.slice_mut(s![group, .., ..]);
        group_weight += &stream.weight.slice(s![.., prod_idx, ..]);
    }

    let baselines = Array2::from_shape_fn((num_base, 2), |(b, c)| ubase[b][c]);

    trace!("end stokes_i");
    Ok(StokesI {
        vis,
        weight,
        baselines,
    })
}
