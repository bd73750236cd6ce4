//! Talus-angle thermal erosion
//!
//! One pass moves material from exposed solid points whose surface is
//! steeper than the talus angle to their steepest lower neighbor. Transfer
//! sizes come from a snapshot taken before the pass; the updates themselves
//! are accumulated atomically into the live field.

use std::time::Instant;

use glam::{IVec3, Vec3};

use super::config::ThermalParams;
use crate::core::{dispatch, Result};
use crate::field::{FieldAccumulate, FieldHandle, FieldRead};

const FACE_NEIGHBORS: [IVec3; 6] = [
    IVec3::X,
    IVec3::NEG_X,
    IVec3::Y,
    IVec3::NEG_Y,
    IVec3::Z,
    IVec3::NEG_Z,
];

/// Totals for one pass.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ThermalReport {
    pub transfers: usize,
    pub moved: f64,
}

/// A single planned move of material.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transfer {
    pub source: usize,
    pub target: usize,
    pub amount: f32,
}

#[derive(Clone, Debug)]
pub struct ThermalSimulator {
    params: ThermalParams,
    iso_level: f32,
}

impl ThermalSimulator {
    pub fn new(params: ThermalParams, iso_level: f32) -> Self {
        Self { params, iso_level }
    }

    pub fn params(&self) -> &ThermalParams {
        &self.params
    }

    /// Transfer leaving lattice point `idx`, judged on `field` alone.
    pub fn plan<F: FieldRead + ?Sized>(&self, field: &F, idx: usize) -> Option<Transfer> {
        let geometry = field.geometry();
        let p = geometry.coords(idx);
        let phi = field.value(idx);
        if phi >= self.iso_level {
            return None;
        }

        let max = geometry.global_res as i32;
        let inside = |q: IVec3| q.cmpge(IVec3::ZERO).all() && q.cmple(IVec3::splat(max)).all();
        let ip = p.as_ivec3();
        let exposed = FACE_NEIGHBORS.iter().any(|&d| {
            let q = ip + d;
            inside(q) && field.get(q.x as u32, q.y as u32, q.z as u32) >= self.iso_level
        });
        if !exposed {
            return None;
        }

        let down = (geometry.center_grid() - p.as_vec3()).normalize_or_zero();
        let normal = field.lattice_gradient(p).normalize_or_zero();
        if down == Vec3::ZERO || normal == Vec3::ZERO {
            return None;
        }
        let slope = normal.dot(-down).clamp(-1.0, 1.0).acos().to_degrees();
        let talus = self.params.talus_angle;
        if slope <= talus || slope >= 90.0 {
            return None;
        }

        let amount = self.params.step_size * (self.iso_level - phi) * (slope - talus) / (90.0 - talus);
        if amount.is_nan() || amount < self.params.min_sediment_loss {
            return None;
        }

        let mut best: Option<(usize, f32)> = None;
        for dz in -1..=1 {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let d = IVec3::new(dx, dy, dz);
                    let q = ip + d;
                    if d == IVec3::ZERO || !inside(q) {
                        continue;
                    }
                    let along = d.as_vec3().normalize().dot(down);
                    if along <= 0.0 {
                        continue;
                    }
                    let q = q.as_uvec3();
                    let score = (field.get(q.x, q.y, q.z) - phi) * along;
                    if score > 0.0 && best.is_none_or(|(_, s)| score > s) {
                        best = Some((geometry.index(q.x, q.y, q.z), score));
                    }
                }
            }
        }

        best.map(|(target, _)| Transfer { source: idx, target, amount })
    }

    /// One sweep over the whole field.
    pub fn run_pass<F: FieldAccumulate + ?Sized>(&self, field: &F) -> Result<ThermalReport> {
        let start = Instant::now();
        let snapshot = field.snapshot()?;
        let report = dispatch::reduce_indices(
            snapshot.values().len(),
            ThermalReport::default(),
            |idx| match self.plan(&snapshot, idx) {
                Some(t) => {
                    // Material leaves the source (density rises) and settles on the target.
                    field.accumulate(t.source, t.amount);
                    field.accumulate(t.target, -t.amount);
                    ThermalReport { transfers: 1, moved: t.amount as f64 }
                }
                None => ThermalReport::default(),
            },
            |a, b| ThermalReport {
                transfers: a.transfers + b.transfers,
                moved: a.moved + b.moved,
            },
        );

        log::info!(
            "Thermal pass: {} transfers, moved {:.4} in {:.1}ms",
            report.transfers,
            report.moved,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(report)
    }

    /// Run a pass with the field's exclusive guard held throughout.
    pub fn run_on(&self, handle: &FieldHandle) -> Result<ThermalReport> {
        let guard = handle.write();
        self.run_pass(&*guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{DensityField, FieldGeometry};

    fn field_from(global_res: u32, f: impl Fn(Vec3) -> f32) -> DensityField {
        let geometry = FieldGeometry::centered(global_res, global_res as f32 * 0.5);
        let values = (0..geometry.len())
            .map(|i| f(geometry.world_position(geometry.coords(i))))
            .collect();
        DensityField::from_values(geometry, values).unwrap()
    }

    #[test]
    fn test_flat_region_moves_nothing() {
        // Sphere: the surface normal is everywhere parallel to up.
        let field = field_from(16, |p| p.length() - 5.0);
        let before = field.snapshot().unwrap();
        let report = ThermalSimulator::new(ThermalParams::default(), 0.0).run_pass(&field).unwrap();
        assert_eq!(report.transfers, 0);
        assert_eq!(report.moved, 0.0);
        assert_eq!(field.snapshot().unwrap().values(), before.values());
    }

    #[test]
    fn test_steep_slope_transfers_and_conserves() {
        // Plane tilted 60 degrees from horizontal, above the center.
        let normal = Vec3::new(60f32.to_radians().sin(), 0.0, 60f32.to_radians().cos());
        let field = field_from(16, |p| (p - Vec3::new(0.0, 0.0, 4.0)).dot(normal));
        let before = field.total();

        let sim = ThermalSimulator::new(
            ThermalParams { talus_angle: 30.0, min_sediment_loss: 1e-4, step_size: 0.5 },
            0.0,
        );
        let report = sim.run_pass(&field).unwrap();

        assert!(report.transfers > 0);
        assert!(report.moved > 0.0);
        assert!((field.total() - before).abs() < 1e-2);
        assert!(field.snapshot().unwrap().values().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_interior_and_empty_points_are_skipped() {
        let field = field_from(8, |p| (p - Vec3::new(0.0, 0.0, 1.0)).dot(Vec3::new(1.0, 0.0, 0.2).normalize()));
        let sim = ThermalSimulator::new(ThermalParams { talus_angle: 10.0, min_sediment_loss: 0.0, step_size: 1.0 }, 0.0);
        for idx in 0..field.len() {
            let phi = field.value(idx);
            if let Some(t) = sim.plan(&field, idx) {
                assert!(phi < 0.0);
                assert!(field.value(t.target) > phi);
                assert!(t.amount > 0.0);
            }
        }
        let deep = field.geometry().index(0, 4, 4);
        assert!(sim.plan(&field, deep).is_none());
    }

    #[test]
    fn test_sub_threshold_transfers_are_skipped() {
        let normal = Vec3::new(60f32.to_radians().sin(), 0.0, 60f32.to_radians().cos());
        let field = field_from(16, |p| (p - Vec3::new(0.0, 0.0, 4.0)).dot(normal));
        let before = field.snapshot().unwrap();
        let sim = ThermalSimulator::new(
            ThermalParams { talus_angle: 30.0, min_sediment_loss: 1.0e3, step_size: 0.5 },
            0.0,
        );
        let report = sim.run_pass(&field).unwrap();
        assert_eq!(report.transfers, 0);
        assert_eq!(field.snapshot().unwrap().values(), before.values());
    }
}
