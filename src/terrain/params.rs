//! Noise parameters for density synthesis

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Maximum accepted octave count for any noise layer.
pub const MAX_OCTAVES: u32 = 16;

/// Layered coherent noise applied on top of the planet shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseParams {
    pub seed: u32,
    pub frequency: f32,   // Base frequency in cycles per world unit
    pub octaves: u32,     // Number of layers summed
    pub lacunarity: f32,  // Frequency multiplier per octave
    pub persistence: f32, // Amplitude multiplier per octave
    pub offset: Vec3,     // Domain offset applied before sampling
    /// World-space height of a unit noise value.
    pub amplitude: f32,
    /// Radius where noise starts fading in.
    pub mask_start_radius: f32,
    /// Radius where noise has faded out again.
    pub mask_end_radius: f32,
    /// 0 disables the radial mask, 1 applies it fully.
    pub mask_strength: f32,
    /// Optional cave/overhang layer.
    pub carve: Option<CarveParams>,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            seed: 12345,
            frequency: 0.02,
            octaves: 4,
            lacunarity: 2.0,
            persistence: 0.5,
            offset: Vec3::ZERO,
            amplitude: 12.0,
            mask_start_radius: 70.0,
            mask_end_radius: 130.0,
            mask_strength: 1.0,
            carve: None,
        }
    }
}

/// Secondary noise that removes material where it is positive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarveParams {
    pub frequency: f32,
    pub octaves: u32,
    pub lacunarity: f32,
    pub persistence: f32,
    pub offset: Vec3,
    pub strength: f32,
    /// Raw carve noise is clamped to `±clamp_range` before scaling.
    pub clamp_range: f32,
}

impl Default for CarveParams {
    fn default() -> Self {
        Self {
            frequency: 0.05,
            octaves: 3,
            lacunarity: 2.0,
            persistence: 0.5,
            offset: Vec3::new(17.0, -31.0, 5.0),
            strength: 6.0,
            clamp_range: 0.5,
        }
    }
}

impl NoiseParams {
    /// Check the parameter set, returning a description of the first problem.
    pub fn check(&self) -> Result<(), String> {
        check_layer("noise", self.frequency, self.octaves, self.lacunarity, self.persistence)?;
        if !self.amplitude.is_finite() || !self.offset.is_finite() {
            return Err("noise amplitude and offset must be finite".into());
        }
        if !(self.mask_start_radius.is_finite() && self.mask_end_radius.is_finite()) {
            return Err("noise mask radii must be finite".into());
        }
        if self.mask_end_radius < self.mask_start_radius {
            return Err(format!(
                "noise mask end radius {} is below start radius {}",
                self.mask_end_radius, self.mask_start_radius
            ));
        }
        if !(0.0..=1.0).contains(&self.mask_strength) {
            return Err(format!("noise mask strength {} outside [0, 1]", self.mask_strength));
        }
        if let Some(carve) = &self.carve {
            check_layer("carve", carve.frequency, carve.octaves, carve.lacunarity, carve.persistence)?;
            if !(carve.strength.is_finite() && carve.clamp_range.is_finite()) || carve.clamp_range < 0.0 {
                return Err("carve strength must be finite and clamp range non-negative".into());
            }
        }
        Ok(())
    }
}

fn check_layer(name: &str, frequency: f32, octaves: u32, lacunarity: f32, persistence: f32) -> Result<(), String> {
    if !(frequency.is_finite() && frequency > 0.0) {
        return Err(format!("{name} frequency must be positive, got {frequency}"));
    }
    if !(lacunarity.is_finite() && lacunarity > 0.0) {
        return Err(format!("{name} lacunarity must be positive, got {lacunarity}"));
    }
    if !persistence.is_finite() {
        return Err(format!("{name} persistence must be finite"));
    }
    if octaves > MAX_OCTAVES {
        return Err(format!("{name} octaves {octaves} exceeds maximum {MAX_OCTAVES}"));
    }
    Ok(())
}
