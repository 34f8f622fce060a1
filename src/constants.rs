// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Default values for filtering and spectrum estimation.
//!
//! Frequencies are in MHz and delays in microseconds throughout.

/// Delay below which power is removed by the delay filter [us]
pub const DEFAULT_DELAY_CUT_US: f64 = 0.1;

/// Number of trial delays spanning the cut used to build the null space
pub const DEFAULT_NUM_NULL_DELAYS: usize = 200;

/// Singular values below this fraction of the largest are not removed
pub const DEFAULT_NULL_TOLERANCE: f64 = 1e-8;

/// Number of Gibbs samples to draw for each baseline
pub const DEFAULT_NUM_GIBBS_SAMPLES: usize = 20;

/// Flat starting value of the delay power spectrum.
pub const DEFAULT_INITIAL_SPECTRUM: f64 = 1e1;

/// How far a channel centre may fall from the channel comb, in units of channels.
pub const CHANNEL_MAPPING_TOLERANCE: f64 = 1e-3;
