//! Declarative selection of feed products.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    containers::{Polarisation, TelescopeGeometry},
    DelaySpecError,
};

/// A policy for excluding feed products from a Stokes I combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductMask {
    /// Exclude autocorrelations
    NoAuto,
    /// Exclude products between feeds on the same cylinder
    NoIntraCylinder,
    /// Exclude products where either feed has a known polarisation other than
    /// this one. Feeds of unknown polarisation don't exclude a product.
    PolOnly(Polarisation),
}

impl ProductMask {
    /// Whether the product between feeds `fi` and `fj` survives this policy.
    ///
    /// Feeds that the geometry doesn't know about never survive.
    pub fn keep(&self, geometry: &TelescopeGeometry, fi: usize, fj: usize) -> bool {
        let (Some(feed_i), Some(feed_j)) = (geometry.feeds.get(fi), geometry.feeds.get(fj)) else {
            return false;
        };
        match self {
            Self::NoAuto => fi != fj,
            Self::NoIntraCylinder => feed_i.cylinder != feed_j.cylinder,
            Self::PolOnly(pol) => [feed_i, feed_j]
                .iter()
                .all(|feed| feed.pol == *pol || feed.pol == Polarisation::Unknown),
        }
    }
}

impl Display for ProductMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAuto => write!(f, "no_auto"),
            Self::NoIntraCylinder => write!(f, "no_intra"),
            Self::PolOnly(Polarisation::X) => write!(f, "x_only"),
            Self::PolOnly(Polarisation::Y) => write!(f, "y_only"),
            Self::PolOnly(pol) => write!(f, "{pol}_only"),
        }
    }
}

impl FromStr for ProductMask {
    type Err = DelaySpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "no_auto" => Ok(Self::NoAuto),
            "no_intra" => Ok(Self::NoIntraCylinder),
            "x_only" => Ok(Self::PolOnly(Polarisation::X)),
            "y_only" => Ok(Self::PolOnly(Polarisation::Y)),
            _ => Err(DelaySpecError::UnknownProductMask { name: s.to_string() }),
        }
    }
}

/// Combine several policies into a mask over `prods`, true where every policy
/// keeps the product.
pub fn product_mask(
    geometry: &TelescopeGeometry,
    prods: &[(usize, usize)],
    masks: &[ProductMask],
) -> Vec<bool> {
    prods
        .iter()
        .map(|&(fi, fj)| masks.iter().all(|mask| mask.keep(geometry, fi, fj)))
        .collect()
}
