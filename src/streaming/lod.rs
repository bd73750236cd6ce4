//! Distance-based chunk detail selection
//!
//! Each chunk is built once at the detail chosen from its distance to the
//! viewer at build time. Closer bands use more upsampling passes; chunks
//! within `detail_range` also get detail noise.

use serde::{Deserialize, Serialize};

/// One distance band: chunks closer than `max_distance` use `res_factor`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LodBand {
    pub max_distance: f32,
    pub res_factor: u32,
}

/// Mapping from viewer distance to chunk build detail.
///
/// With no bands every chunk uses the configured fixed `res_factor`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodPolicy {
    /// Bands sorted by ascending `max_distance`.
    pub bands: Vec<LodBand>,
    /// Detail noise distance; 0 defers to the fixed `add_noise` flag.
    pub detail_range: f32,
}

/// Detail chosen for one chunk build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LodChoice {
    pub res_factor: u32,
    pub add_noise: bool,
}

impl LodPolicy {
    /// Upsampling passes for a chunk at `distance`.
    ///
    /// # Examples
    /// ```
    /// use planetoid::streaming::lod::{LodBand, LodPolicy};
    ///
    /// let policy = LodPolicy {
    ///     bands: vec![
    ///         LodBand { max_distance: 50.0, res_factor: 2 },
    ///         LodBand { max_distance: 100.0, res_factor: 1 },
    ///     ],
    ///     detail_range: 0.0,
    /// };
    /// assert_eq!(policy.res_factor_for_distance(10.0, 0), 2);
    /// assert_eq!(policy.res_factor_for_distance(75.0, 0), 1);
    /// assert_eq!(policy.res_factor_for_distance(500.0, 0), 0); // fallback
    /// ```
    pub fn res_factor_for_distance(&self, distance: f32, fallback: u32) -> u32 {
        self.bands
            .iter()
            .find(|band| distance < band.max_distance)
            .map_or(fallback, |band| band.res_factor)
    }

    /// Full build detail for a chunk at `distance`.
    ///
    /// Detail noise only makes sense on upsampled chunks, so it is never
    /// enabled for `res_factor == 0` when a detail range is set.
    ///
    /// # Examples
    /// ```
    /// use planetoid::streaming::lod::{LodBand, LodChoice, LodPolicy};
    ///
    /// let policy = LodPolicy {
    ///     bands: vec![LodBand { max_distance: 40.0, res_factor: 1 }],
    ///     detail_range: 20.0,
    /// };
    /// assert_eq!(policy.choose(5.0, 0, false), LodChoice { res_factor: 1, add_noise: true });
    /// assert_eq!(policy.choose(30.0, 0, false), LodChoice { res_factor: 1, add_noise: false });
    /// assert_eq!(LodPolicy::default().choose(5.0, 2, true), LodChoice { res_factor: 2, add_noise: true });
    /// ```
    pub fn choose(&self, distance: f32, fallback_res_factor: u32, fallback_add_noise: bool) -> LodChoice {
        let res_factor = self.res_factor_for_distance(distance, fallback_res_factor);
        let add_noise = if self.detail_range > 0.0 {
            res_factor > 0 && distance < self.detail_range
        } else {
            fallback_add_noise
        };
        LodChoice { res_factor, add_noise }
    }

    /// Every `res_factor` the bands can produce.
    pub fn res_factors(&self) -> impl Iterator<Item = u32> + '_ {
        self.bands.iter().map(|band| band.res_factor)
    }

    pub fn check(&self) -> Result<(), String> {
        if !(self.detail_range.is_finite() && self.detail_range >= 0.0) {
            return Err("LOD detail range must be non-negative".into());
        }
        let mut previous = 0.0f32;
        for band in &self.bands {
            if !(band.max_distance.is_finite() && band.max_distance > previous) {
                return Err(format!(
                    "LOD band distances must be positive and ascending, got {} after {}",
                    band.max_distance, previous
                ));
            }
            previous = band.max_distance;
        }
        Ok(())
    }
}
