//! Planet configuration
//!
//! A [`PlanetConfig`] is immutable once built into a planet; changing any of
//! it means rebuilding the density field and every chunk.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};
use crate::field::FieldGeometry;
use crate::streaming::{CandidateWindow, LodPolicy};

pub use crate::erosion::config::{HydraulicParams, ThermalParams};
pub use crate::terrain::params::{CarveParams, NoiseParams};

/// Largest supported number of upsampling passes.
pub const MAX_RES_FACTOR: u32 = 6;

/// Largest padded chunk lattice, in points.
pub const MAX_CHUNK_POINTS: u64 = 1 << 27;

/// Largest global lattice, in points.
pub const MAX_FIELD_POINTS: u64 = 1 << 31;

/// Planet shape and global lattice resolution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanetParams {
    pub radius: f32,
    /// Empty margin above the surface included in the lattice.
    pub atmosphere: f32,
    /// Half thickness of the shell where chunks are considered.
    pub radial_range: f32,
    /// Cells per axis of the global lattice.
    pub global_res: u32,
    pub iso_level: f32,
    /// Radius of an always-solid core, 0 to disable.
    pub fill_radius: f32,
}

impl Default for PlanetParams {
    fn default() -> Self {
        Self {
            radius: 100.0,
            atmosphere: 20.0,
            radial_range: 30.0,
            global_res: 96,
            iso_level: 0.0,
            fill_radius: 0.0,
        }
    }
}

/// Surface extraction options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshParams {
    /// Interpolate crossings along edges; midpoints otherwise.
    pub interpolate: bool,
    /// Flip winding and normal sign.
    pub invert_normals: bool,
    /// Recompute normals from faces after triangulation.
    pub flat_shade: bool,
}

impl Default for MeshParams {
    fn default() -> Self {
        Self {
            interpolate: true,
            invert_normals: true,
            flat_shade: false,
        }
    }
}

/// Chunking and streaming behavior.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingParams {
    /// Global lattice cells per chunk along each axis.
    pub chunk_res: u32,
    /// Upsampling passes for chunks without an LOD band.
    pub res_factor: u32,
    /// Inject detail noise into upsampled chunks.
    pub add_noise: bool,
    /// Chunks farther than this from the viewer are not kept.
    pub view_range: f32,
    /// Maximum chunk builds per tick.
    pub chunks_per_update: u32,
    /// Live mesh memory cap in megabytes; 0 is unlimited.
    pub mesh_memory_mb: usize,
    pub window: CandidateWindow,
    pub lod: LodPolicy,
}

impl Default for StreamingParams {
    fn default() -> Self {
        Self {
            chunk_res: 8,
            res_factor: 0,
            add_noise: false,
            view_range: 150.0,
            chunks_per_update: 10,
            mesh_memory_mb: 0,
            window: CandidateWindow::Shell,
            lod: LodPolicy::default(),
        }
    }
}

/// Everything needed to build a planet.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanetConfig {
    pub planet: PlanetParams,
    pub noise: NoiseParams,
    pub mesh: MeshParams,
    pub streaming: StreamingParams,
    pub hydraulic: HydraulicParams,
    pub thermal: ThermalParams,
}

impl PlanetConfig {
    /// Lattice placement for this configuration.
    pub fn geometry(&self) -> FieldGeometry {
        FieldGeometry::centered(
            self.planet.global_res,
            self.planet.radius + self.planet.atmosphere,
        )
    }

    /// Number of chunks along each axis of the lattice.
    pub fn chunks_per_axis(&self) -> u32 {
        self.planet.global_res / self.streaming.chunk_res.max(1)
    }

    /// World-space edge length of one chunk.
    pub fn chunk_size(&self) -> f32 {
        self.streaming.chunk_res as f32 * self.geometry().increment
    }

    /// Reject parameter combinations the pipeline cannot build.
    pub fn validate(&self) -> Result<()> {
        let p = &self.planet;
        if !(p.radius.is_finite() && p.radius > 0.0) {
            return Err(Error::config(format!("radius must be positive, got {}", p.radius)));
        }
        if !(p.atmosphere.is_finite() && p.atmosphere >= 0.0) {
            return Err(Error::config("atmosphere must be non-negative"));
        }
        if !(p.radial_range.is_finite() && p.radial_range >= 0.0) {
            return Err(Error::config("radial range must be non-negative"));
        }
        if !(p.iso_level.is_finite() && p.fill_radius.is_finite() && p.fill_radius >= 0.0) {
            return Err(Error::config("iso level and fill radius must be finite, fill radius non-negative"));
        }
        if p.global_res == 0 {
            return Err(Error::config("global resolution must be at least 1"));
        }
        let field_points = (p.global_res as u64 + 1).pow(3);
        if field_points > MAX_FIELD_POINTS {
            return Err(Error::config(format!(
                "global resolution {} gives {} lattice points, limit is {}",
                p.global_res, field_points, MAX_FIELD_POINTS
            )));
        }

        let s = &self.streaming;
        if s.chunk_res == 0 {
            return Err(Error::config("chunk resolution must be at least 1"));
        }
        if p.global_res % s.chunk_res != 0 {
            return Err(Error::config(format!(
                "global resolution {} is not a multiple of chunk resolution {}",
                p.global_res, s.chunk_res
            )));
        }
        if s.chunks_per_update == 0 {
            return Err(Error::config("chunks per update must be at least 1"));
        }
        if !(s.view_range.is_finite() && s.view_range > 0.0) {
            return Err(Error::config("view range must be positive"));
        }
        s.lod.check().map_err(Error::Configuration)?;
        for res_factor in std::iter::once(s.res_factor).chain(s.lod.res_factors()) {
            check_chunk_resolution(s.chunk_res, res_factor)?;
        }
        if let CandidateWindow::Cube { half_extent } = s.window {
            if half_extent < 0 {
                return Err(Error::config("cube window half extent must be non-negative"));
            }
        }

        self.noise.check().map_err(Error::Configuration)?;
        self.hydraulic.check().map_err(Error::Configuration)?;
        self.thermal.check().map_err(Error::Configuration)?;
        Ok(())
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PlanetConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Save as pretty-printed JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Check that `chunk_res` doubled `res_factor` times stays addressable.
pub fn check_chunk_resolution(chunk_res: u32, res_factor: u32) -> Result<()> {
    if res_factor > MAX_RES_FACTOR {
        return Err(Error::config(format!(
            "resolution factor {} exceeds maximum {}",
            res_factor, MAX_RES_FACTOR
        )));
    }
    let final_res = chunk_res
        .checked_shl(res_factor)
        .filter(|r| r >> res_factor == chunk_res)
        .ok_or_else(|| Error::config(format!(
            "chunk resolution {} cannot be doubled {} times",
            chunk_res, res_factor
        )))?;
    let padded = final_res as u64 + 3;
    if padded.pow(3) > MAX_CHUNK_POINTS {
        return Err(Error::config(format!(
            "final chunk resolution {} exceeds the chunk lattice limit",
            final_res
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::LodBand;

    #[test]
    fn test_default_config_is_valid() {
        let config = PlanetConfig::default();
        config.validate().unwrap();
        assert_eq!(config.chunks_per_axis(), 12);
        assert_eq!(config.geometry().grid_res(), 97);
        assert!((config.chunk_size() - 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_rejects_non_multiple_chunk_res() {
        let mut config = PlanetConfig::default();
        config.streaming.chunk_res = 7;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_rejects_excessive_res_factor() {
        let mut config = PlanetConfig::default();
        config.streaming.res_factor = MAX_RES_FACTOR + 1;
        assert!(config.validate().is_err());

        config.streaming.res_factor = 0;
        config.streaming.lod = LodPolicy {
            bands: vec![LodBand { max_distance: 10.0, res_factor: 9 }],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_oversized_chunk_lattice() {
        assert!(check_chunk_resolution(8, 3).is_ok());
        assert!(check_chunk_resolution(1024, 6).is_err());
    }

    #[test]
    fn test_rejects_bad_radius() {
        let mut config = PlanetConfig::default();
        config.planet.radius = 0.0;
        assert!(config.validate().is_err());
        config.planet.radius = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_partial_uses_defaults() {
        let config = PlanetConfig::from_json_str(r#"{ "planet": { "radius": 50.0, "atmosphere": 14.0, "global_res": 64 } }"#).unwrap();
        assert_eq!(config.planet.radius, 50.0);
        assert_eq!(config.planet.global_res, 64);
        assert_eq!(config.streaming.chunk_res, 8);
        assert_eq!(config.noise, NoiseParams::default());
    }

    #[test]
    fn test_json_invalid_is_rejected() {
        let err = PlanetConfig::from_json_str(r#"{ "streaming": { "chunk_res": 5 } }"#).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(matches!(PlanetConfig::from_json_str("{ not json"), Err(Error::Parse(_))));
    }

    #[test]
    fn test_save_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("configs").join("planet.json");
        let mut config = PlanetConfig::default();
        config.noise.carve = Some(CarveParams::default());
        config.streaming.window = CandidateWindow::Cube { half_extent: 3 };
        config.save(&path).unwrap();

        let loaded = PlanetConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
