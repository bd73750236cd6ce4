//! Density synthesis from a sphere and layered coherent noise

use std::time::Instant;

use glam::Vec3;
use noise::{NoiseFn, SuperSimplex};

use super::params::{CarveParams, NoiseParams};
use crate::core::Result;
use crate::field::{DensityField, FieldGeometry, FieldWrite};
use crate::math::smoothstep;

/// Fraction of the mask band spent fading in and out at each end.
const MASK_FADE_FRACTION: f32 = 0.25;

/// Produces density values for every point of the global lattice.
///
/// φ starts as the signed distance to a sphere of `radius` (negative inside),
/// gets radially masked noise added on top, then optional carving and an
/// inner fill sphere.
pub struct FieldSynthesizer {
    radius: f32,
    fill_radius: f32,
    params: NoiseParams,
    base: SuperSimplex,
    carve: Option<SuperSimplex>,
}

impl FieldSynthesizer {
    pub fn new(radius: f32, fill_radius: f32, params: NoiseParams) -> Self {
        let base = SuperSimplex::new(params.seed);
        let carve = params
            .carve
            .as_ref()
            .map(|_| SuperSimplex::new(params.seed.wrapping_add(0x9e37_79b9)));
        Self {
            radius,
            fill_radius,
            params,
            base,
            carve,
        }
    }

    pub fn params(&self) -> &NoiseParams {
        &self.params
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Radial mask weight in `[1 - strength, 1]`, continuous in `r`.
    pub fn mask_weight(&self, r: f32) -> f32 {
        let start = self.params.mask_start_radius;
        let end = self.params.mask_end_radius;
        let fade = (end - start) * MASK_FADE_FRACTION;
        let band = smoothstep(start, start + fade, r) * (1.0 - smoothstep(end - fade, end, r));
        1.0 - self.params.mask_strength * (1.0 - band)
    }

    /// Unscaled octave sum of the base layer at `frequency_scale` times the base frequency.
    pub fn octave_sum(&self, p: Vec3, frequency_scale: f32) -> f32 {
        let params = &self.params;
        fbm(
            &self.base,
            p + params.offset,
            params.frequency * frequency_scale,
            params.octaves,
            params.lacunarity,
            params.persistence,
        )
    }

    fn carve_at(&self, p: Vec3, carve: &CarveParams, source: &SuperSimplex) -> f32 {
        let raw = fbm(
            source,
            p + carve.offset,
            carve.frequency,
            carve.octaves,
            carve.lacunarity,
            carve.persistence,
        );
        raw.clamp(-carve.clamp_range, carve.clamp_range) * carve.strength
    }

    /// Density at a world position.
    pub fn density_at(&self, p: Vec3) -> f32 {
        let r = p.length();
        let mut phi = r - self.radius;

        let weight = self.mask_weight(r);
        if weight > 0.0 && self.params.octaves > 0 {
            phi += self.params.amplitude * weight * self.octave_sum(p, 1.0);
        }

        if let (Some(carve), Some(source)) = (&self.params.carve, &self.carve) {
            phi += weight * self.carve_at(p, carve, source);
        }

        if self.fill_radius > 0.0 {
            phi = phi.min(r - self.fill_radius);
        }
        phi
    }

    /// Extra detail at twice the base frequency, masked like the base layer.
    pub fn detail_at(&self, p: Vec3) -> f32 {
        let weight = self.mask_weight(p.length());
        if weight <= 0.0 || self.params.octaves == 0 {
            return 0.0;
        }
        self.params.amplitude * weight * self.octave_sum(p, 2.0)
    }

    /// Overwrite every value of `field` from its own geometry.
    pub fn fill<F: FieldWrite>(&self, field: &mut F) {
        let geometry = *field.geometry();
        field.overwrite_with(|i| self.density_at(geometry.world_position(geometry.coords(i))));
    }

    /// Allocate and fill a new field.
    pub fn synthesize(&self, geometry: FieldGeometry) -> Result<DensityField> {
        let start = Instant::now();
        let mut field = DensityField::new(geometry)?;
        self.fill(&mut field);
        log::info!(
            "Synthesized {}^3 density field ({} points) in {:.2}s",
            geometry.grid_res(),
            field.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(field)
    }
}

/// Sum `octaves` layers of `source` with geometric frequency and amplitude.
fn fbm(source: &SuperSimplex, p: Vec3, frequency: f32, octaves: u32, lacunarity: f32, persistence: f32) -> f32 {
    let mut sum = 0.0;
    let mut freq = frequency;
    let mut amp = 1.0;
    for _ in 0..octaves {
        let q = p * freq;
        sum += amp * source.get([q.x as f64, q.y as f64, q.z as f64]) as f32;
        freq *= lacunarity;
        amp *= persistence;
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldRead;

    fn synthesizer(params: NoiseParams) -> FieldSynthesizer {
        FieldSynthesizer::new(20.0, 0.0, params)
    }

    #[test]
    fn test_field_size_matches_grid_res() {
        let synth = synthesizer(NoiseParams::default());
        for res in [8u32, 9, 10] {
            let field = synth.synthesize(FieldGeometry::centered(res, 30.0)).unwrap();
            let n = (res + 1) as usize;
            assert_eq!(field.len(), n * n * n);
        }
    }

    #[test]
    fn test_field_is_not_uniformly_zero() {
        let synth = synthesizer(NoiseParams { octaves: 3, ..Default::default() });
        let field = synth.synthesize(FieldGeometry::centered(8, 30.0)).unwrap();
        assert!((0..field.len()).any(|i| field.value(i) != 0.0));
    }

    #[test]
    fn test_sphere_sign_convention() {
        let synth = synthesizer(NoiseParams { octaves: 0, ..Default::default() });
        assert!(synth.density_at(Vec3::ZERO) < 0.0);
        assert!(synth.density_at(Vec3::new(40.0, 0.0, 0.0)) > 0.0);
        assert!(synth.density_at(Vec3::new(0.0, 20.0, 0.0)).abs() < 1e-5);
    }

    #[test]
    fn test_mask_weight_is_continuous() {
        let synth = synthesizer(NoiseParams {
            mask_start_radius: 10.0,
            mask_end_radius: 30.0,
            mask_strength: 1.0,
            ..Default::default()
        });
        let eps = 1e-3;
        for edge in [10.0f32, 15.0, 25.0, 30.0] {
            let below = synth.mask_weight(edge - eps);
            let above = synth.mask_weight(edge + eps);
            assert!((below - above).abs() < 1e-2, "jump at {edge}: {below} vs {above}");
        }
        assert_eq!(synth.mask_weight(5.0), 0.0);
        assert_eq!(synth.mask_weight(20.0), 1.0);
        assert_eq!(synth.mask_weight(40.0), 0.0);
    }

    #[test]
    fn test_mask_strength_zero_disables_mask() {
        let synth = synthesizer(NoiseParams { mask_strength: 0.0, ..Default::default() });
        assert_eq!(synth.mask_weight(0.0), 1.0);
        assert_eq!(synth.mask_weight(1.0e4), 1.0);
    }

    #[test]
    fn test_fill_radius_keeps_core_solid() {
        let synth = FieldSynthesizer::new(
            20.0,
            10.0,
            NoiseParams {
                amplitude: 1.0e3,
                mask_strength: 0.0,
                ..Default::default()
            },
        );
        let p = Vec3::new(2.0, 1.0, 0.5);
        assert!(synth.density_at(p) <= p.length() - 10.0);
    }

    #[test]
    fn test_carve_layer_changes_density() {
        let plain = synthesizer(NoiseParams { mask_strength: 0.0, ..Default::default() });
        let carved = synthesizer(NoiseParams {
            mask_strength: 0.0,
            carve: Some(CarveParams { strength: 50.0, ..Default::default() }),
            ..Default::default()
        });
        let differs = (0..32).any(|i| {
            let p = Vec3::new(i as f32 * 0.7, 20.0, 3.0);
            (plain.density_at(p) - carved.density_at(p)).abs() > 1e-4
        });
        assert!(differs);
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = synthesizer(NoiseParams { seed: 1, mask_strength: 0.0, ..Default::default() });
        let b = synthesizer(NoiseParams { seed: 2, mask_strength: 0.0, ..Default::default() });
        let p = Vec3::new(13.3, 7.1, -4.2);
        assert_ne!(a.density_at(p), b.density_at(p));
    }
}
