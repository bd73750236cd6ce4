//! Erosion configuration

use serde::{Deserialize, Serialize};

/// Particle-based hydraulic erosion parameters.
///
/// Distances are in world units unless noted; per-step quantities are in
/// lattice units.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HydraulicParams {
    /// Particles spawned per batch when the caller does not override it.
    pub num_particles: u32,
    /// Seed for spawn positions.
    pub seed: u64,
    /// Distance moved per unit speed each step (lattice units).
    pub step_size: f32,
    /// Spawn sphere radius around the planet center (world units).
    pub starting_radius: f32,
    pub init_water: f32,
    pub init_sediment: f32,
    /// Particles die below this water mass.
    pub min_water: f32,
    /// Fraction of water lost per step.
    pub evaporation: f32,
    pub gravity: f32,
    /// Sediment capacity factor.
    pub capacity: f32,
    /// Fraction of spare capacity eroded per step.
    pub erosion: f32,
    /// Fraction of excess sediment deposited per step.
    pub deposition: f32,
    /// Splat falloff across the surface normal.
    pub k_normal: f32,
    /// Splat falloff along the surface.
    pub k_tangent: f32,
    /// Lower bound on the slope term of the capacity.
    pub k_min_deposition: f32,
    /// Direction inertia.
    pub alpha_1: f32,
    /// Speed inertia.
    pub alpha_2: f32,
    /// Splat kernel width.
    pub sigma: f32,
    /// Ground friction coefficient.
    pub k_fric: f32,
    /// Quadratic air drag coefficient.
    pub k_air: f32,
    /// Particles faster than this are killed.
    pub max_speed: f32,
    /// Step budget per particle.
    pub max_steps: u32,
}

impl Default for HydraulicParams {
    fn default() -> Self {
        Self {
            num_particles: 1024 * 12,
            seed: 12345,
            step_size: 1.0,
            starting_radius: 115.0,
            init_water: 1.0,
            init_sediment: 0.0,
            min_water: 0.05,
            evaporation: 0.01,
            gravity: 10.0,
            capacity: 0.01,
            erosion: 0.01,
            deposition: 0.3,
            k_normal: 0.05,
            k_tangent: 0.2,
            k_min_deposition: 0.001,
            alpha_1: 0.5,
            alpha_2: 0.9,
            sigma: 0.5,
            k_fric: 0.5,
            k_air: 0.121, // terminal velocity of roughly 9 units/s
            max_speed: 50.0,
            max_steps: 256,
        }
    }
}

impl HydraulicParams {
    pub fn check(&self) -> Result<(), String> {
        let finite = [
            self.step_size, self.starting_radius, self.init_water, self.init_sediment,
            self.min_water, self.evaporation, self.gravity, self.capacity, self.erosion,
            self.deposition, self.k_normal, self.k_tangent, self.k_min_deposition,
            self.alpha_1, self.alpha_2, self.sigma, self.k_fric, self.k_air, self.max_speed,
        ];
        if finite.iter().any(|v| !v.is_finite()) {
            return Err("hydraulic parameters must be finite".into());
        }
        if self.step_size <= 0.0 || self.sigma <= 0.0 {
            return Err("hydraulic step size and sigma must be positive".into());
        }
        if !(0.0..=1.0).contains(&self.alpha_1) || !(0.0..=1.0).contains(&self.alpha_2) {
            return Err("hydraulic inertia factors must lie in [0, 1]".into());
        }
        if !(0.0..=1.0).contains(&self.evaporation) {
            return Err(format!("hydraulic evaporation {} outside [0, 1]", self.evaporation));
        }
        Ok(())
    }
}

/// Talus-driven thermal erosion parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermalParams {
    /// Steepest stable slope in degrees.
    pub talus_angle: f32,
    /// Transfers smaller than this are skipped.
    pub min_sediment_loss: f32,
    /// Fraction of the excess moved per pass.
    pub step_size: f32,
}

impl Default for ThermalParams {
    fn default() -> Self {
        Self {
            talus_angle: 35.0,
            min_sediment_loss: 1.0e-3,
            step_size: 0.5,
        }
    }
}

impl ThermalParams {
    pub fn check(&self) -> Result<(), String> {
        if !(self.talus_angle.is_finite() && (0.0..90.0).contains(&self.talus_angle)) {
            return Err(format!("thermal talus angle {} outside [0, 90)", self.talus_angle));
        }
        if !(self.min_sediment_loss.is_finite() && self.min_sediment_loss >= 0.0) {
            return Err("thermal min sediment loss must be non-negative".into());
        }
        if !(self.step_size.is_finite() && (0.0..=1.0).contains(&self.step_size)) {
            return Err(format!("thermal step size {} outside [0, 1]", self.step_size));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hydraulic_defaults() {
        let params = HydraulicParams::default();
        assert_eq!(params.num_particles, 12288);
        assert_eq!(params.min_water, 0.05);
        assert_eq!(params.deposition, 0.3);
        assert!(params.check().is_ok());
    }

    #[test]
    fn test_hydraulic_rejects_bad_inertia() {
        let params = HydraulicParams { alpha_1: 1.5, ..Default::default() };
        assert!(params.check().is_err());
    }

    #[test]
    fn test_thermal_defaults_and_range() {
        assert!(ThermalParams::default().check().is_ok());
        let steep = ThermalParams { talus_angle: 90.0, ..Default::default() };
        assert!(steep.check().is_err());
    }
}
