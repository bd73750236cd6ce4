//! Particle-based hydraulic erosion on the 3D density field
//!
//! Each particle is a droplet carrying water and sediment. Particles never
//! interact with each other; they only meet through the field, where their
//! erosion and deposition are splatted with atomic accumulation.

use std::f32::consts::TAU;
use std::time::Instant;

use glam::{IVec3, Vec3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::config::HydraulicParams;
use crate::core::{dispatch, try_alloc, Result};
use crate::field::{FieldAccumulate, FieldGeometry, FieldHandle};
use crate::math::trilinear_weights;

/// Distance from the iso level, in density units, within which a particle
/// touches the surface.
const CONTACT_BAND: f32 = 1.0;

/// Why a particle stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeathCause {
    /// Water fell below the minimum.
    Dry,
    /// Speed exceeded the kill threshold.
    Overspeed,
    /// Step budget used up.
    Exhausted,
    /// Left the lattice.
    OutOfBounds,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParticleState {
    #[default]
    Alive,
    Dead(DeathCause),
}

/// One droplet. Position and direction are in grid units.
#[derive(Clone, Debug, Default)]
pub struct Particle {
    pub position: Vec3,
    pub direction: Vec3,
    pub speed: f32,
    pub water: f32,
    pub sediment: f32,
    pub steps: u32,
    pub state: ParticleState,
    /// Material removed from the field over the particle's life.
    pub eroded: f32,
    /// Material added back to the field.
    pub deposited: f32,
}

impl Particle {
    /// Particle at rest at `position`, heading toward `target`.
    pub fn new(position: Vec3, target: Vec3, params: &HydraulicParams) -> Self {
        Self {
            position,
            direction: (target - position).normalize_or_zero(),
            water: params.init_water,
            sediment: params.init_sediment,
            ..Default::default()
        }
    }

    pub fn is_alive(&self) -> bool {
        self.state == ParticleState::Alive
    }

    fn kill(&mut self, cause: DeathCause) {
        self.state = ParticleState::Dead(cause);
    }

    /// Advance one step. Returns whether the particle is still alive.
    pub fn step<F: FieldAccumulate + ?Sized>(&mut self, field: &F, params: &HydraulicParams, iso_level: f32) -> bool {
        if !self.is_alive() {
            return false;
        }
        if self.water < params.min_water {
            self.kill(DeathCause::Dry);
            return false;
        }
        let geometry = field.geometry();
        if !geometry.contains_grid(self.position) {
            self.kill(DeathCause::OutOfBounds);
            return false;
        }

        let gravity = (geometry.center_grid() - self.position).normalize_or_zero();
        let phi = field.sample(self.position);
        let normal = field.gradient(self.position).normalize_or_zero();
        // At or under the surface band counts as contact so buried particles slide out.
        let in_contact = phi - iso_level <= CONTACT_BAND && normal != Vec3::ZERO;

        let (target, slope) = if in_contact {
            let tangent = gravity - normal * gravity.dot(normal);
            (tangent.normalize_or_zero(), tangent.length().min(1.0))
        } else {
            (gravity, 1.0)
        };

        let mut heading = self.direction;
        if in_contact && heading.dot(normal) < 0.0 {
            heading -= normal * heading.dot(normal);
        }
        let blended = heading * params.alpha_1 + target * (1.0 - params.alpha_1);
        self.direction = blended.try_normalize().unwrap_or(target);

        let drive = if in_contact { slope } else { 1.0 };
        let mut speed = params.alpha_2 * self.speed + (1.0 - params.alpha_2) * params.gravity * drive;
        if in_contact {
            speed *= (1.0 - params.k_fric * (1.0 - slope) * params.step_size).max(0.0);
        }
        speed -= params.k_air * speed * speed * params.step_size;
        self.speed = speed.max(0.0);

        if in_contact {
            let capacity = slope.max(params.k_min_deposition) * self.speed * self.water * params.capacity;
            if self.sediment > capacity {
                let amount = params.deposition * (self.sediment - capacity);
                self.sediment -= amount;
                self.deposited += amount;
                splat(field, self.position, normal, -amount, params);
            } else {
                let amount = params.erosion * (capacity - self.sediment);
                self.sediment += amount;
                self.eroded += amount;
                splat(field, self.position, normal, amount, params);
            }
        }

        self.position += self.direction * self.speed * params.step_size;
        self.water *= 1.0 - params.evaporation;
        self.steps += 1;

        if self.speed > params.max_speed {
            self.kill(DeathCause::Overspeed);
        } else if self.steps >= params.max_steps {
            self.kill(DeathCause::Exhausted);
        } else if !geometry.contains_grid(self.position) {
            self.kill(DeathCause::OutOfBounds);
        }
        self.is_alive()
    }

    /// Step until the particle dies.
    pub fn run<F: FieldAccumulate + ?Sized>(&mut self, field: &F, params: &HydraulicParams, iso_level: f32) {
        while self.step(field, params, iso_level) {}
    }
}

/// Spread `amount` over the 8 lattice points around `position`.
///
/// Weights are trilinear, attenuated separately across and along the surface,
/// then normalized so exactly `amount` reaches the field.
pub fn splat<F: FieldAccumulate + ?Sized>(field: &F, position: Vec3, normal: Vec3, amount: f32, params: &HydraulicParams) {
    if amount == 0.0 || !amount.is_finite() {
        return;
    }
    let geometry = field.geometry();
    let base = position.floor();
    let t = position - base;
    let base = base.as_ivec3();
    let trilinear = trilinear_weights(t.x, t.y, t.z);

    let mut targets = [(0usize, 0.0f32); 8];
    let mut count = 0;
    let mut total = 0.0;
    for (i, w_tri) in trilinear.iter().enumerate() {
        let point = base + IVec3::new((i & 1) as i32, ((i >> 1) & 1) as i32, ((i >> 2) & 1) as i32);
        if !in_lattice(geometry, point) {
            continue;
        }
        let d = point.as_vec3() - position;
        let dn = d.dot(normal);
        let dt2 = (d.length_squared() - dn * dn).max(0.0);
        let w = w_tri * (-(params.k_normal * dn * dn + params.k_tangent * dt2) / params.sigma).exp();
        if w > 0.0 {
            let p = point.as_uvec3();
            targets[count] = (geometry.index(p.x, p.y, p.z), w);
            count += 1;
            total += w;
        }
    }
    if total <= 0.0 {
        return;
    }
    for &(idx, w) in &targets[..count] {
        field.accumulate(idx, amount * w / total);
    }
}

#[inline]
fn in_lattice(geometry: &FieldGeometry, p: IVec3) -> bool {
    let max = geometry.global_res as i32;
    p.cmpge(IVec3::ZERO).all() && p.cmple(IVec3::splat(max)).all()
}

/// Totals for one batch.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BatchReport {
    pub particles: usize,
    pub steps: u64,
    pub eroded: f64,
    pub deposited: f64,
}

/// Runs batches of independent particles against a field.
#[derive(Clone, Debug)]
pub struct HydraulicSimulator {
    params: HydraulicParams,
    iso_level: f32,
    batches_run: u64,
    particles: Vec<Particle>,
}

impl HydraulicSimulator {
    pub fn new(params: HydraulicParams, iso_level: f32) -> Self {
        Self {
            params,
            iso_level,
            batches_run: 0,
            particles: Vec::new(),
        }
    }

    pub fn params(&self) -> &HydraulicParams {
        &self.params
    }

    /// Final particle states of the most recent batch.
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn batches_run(&self) -> u64 {
        self.batches_run
    }

    /// Random spawn points on the starting sphere, mapped into grid space.
    ///
    /// Successive batches draw from different streams of the same seed.
    pub fn spawn(&self, geometry: &FieldGeometry, count: usize) -> Result<Vec<Particle>> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.params.seed.wrapping_add(self.batches_run));
        let center = geometry.center_grid();
        let mut particles = try_alloc::<Particle>(count, "particle batch")?;
        for particle in particles.iter_mut() {
            let z: f32 = rng.random_range(-1.0..1.0);
            let theta: f32 = rng.random_range(0.0..TAU);
            let r = (1.0 - z * z).sqrt();
            let world = Vec3::new(r * theta.cos(), r * theta.sin(), z) * self.params.starting_radius;
            *particle = Particle::new(geometry.to_grid(world), center, &self.params);
        }
        Ok(particles)
    }

    /// Spawn `count` particles and run each to completion in parallel.
    pub fn run_batch<F: FieldAccumulate + ?Sized>(&mut self, field: &F, count: usize) -> Result<BatchReport> {
        let start = Instant::now();
        let mut particles = self.spawn(field.geometry(), count)?;
        let params = &self.params;
        let iso_level = self.iso_level;
        dispatch::update_indexed(&mut particles, |_, particle| particle.run(field, params, iso_level));

        let report = particles.iter().fold(
            BatchReport {
                particles: particles.len(),
                ..Default::default()
            },
            |mut acc, p| {
                acc.steps += p.steps as u64;
                acc.eroded += p.eroded as f64;
                acc.deposited += p.deposited as f64;
                acc
            },
        );
        self.particles = particles;
        self.batches_run += 1;

        log::info!(
            "Hydraulic batch {}: {} particles, {} steps, eroded {:.4}, deposited {:.4} in {:.1}ms",
            self.batches_run,
            report.particles,
            report.steps,
            report.eroded,
            report.deposited,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(report)
    }

    /// Run a batch with the field's exclusive guard held for the whole pass.
    pub fn run_on(&mut self, handle: &FieldHandle, count: usize) -> Result<BatchReport> {
        let guard = handle.write();
        self.run_batch(&*guard, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{DensityField, FieldRead};

    fn sphere_field(global_res: u32, half_extent: f32, radius: f32) -> DensityField {
        let geometry = FieldGeometry::centered(global_res, half_extent);
        let values = (0..geometry.len())
            .map(|i| geometry.world_position(geometry.coords(i)).length() - radius)
            .collect();
        DensityField::from_values(geometry, values).unwrap()
    }

    #[test]
    fn test_dry_particle_dies_before_first_step() {
        let field = sphere_field(8, 10.0, 5.0);
        let params = HydraulicParams::default();
        let mut particle = Particle::new(Vec3::splat(2.0), Vec3::splat(4.0), &params);
        particle.water = params.min_water * 0.5;
        let before = field.total();

        assert!(!particle.step(&field, &params, 0.0));
        assert_eq!(particle.state, ParticleState::Dead(DeathCause::Dry));
        assert_eq!(particle.steps, 0);
        assert_eq!(field.total(), before);
    }

    #[test]
    fn test_free_fall_moves_toward_center() {
        let field = sphere_field(16, 20.0, 5.0);
        let params = HydraulicParams::default();
        let center = field.geometry().center_grid();
        let start = center + Vec3::new(0.0, 0.0, 7.0);
        let mut particle = Particle::new(start, center, &params);
        let before = field.total();

        assert!(particle.step(&field, &params, 0.0));
        assert!(particle.position.distance(center) < start.distance(center));
        assert_eq!(particle.eroded, 0.0);
        assert_eq!(field.total(), before);
    }

    /// Plane through `on_surface` whose normal leans 45° off the radial
    /// direction there, in a field with one world unit per cell.
    fn tilted_plane(on_surface: Vec3) -> DensityField {
        let geometry = FieldGeometry::centered(16, 8.0);
        let normal = Vec3::new(1.0, 0.0, 1.0).normalize();
        let values = (0..geometry.len())
            .map(|i| (geometry.coords(i).as_vec3() - on_surface).dot(normal))
            .collect();
        DensityField::from_values(geometry, values).unwrap()
    }

    fn strong_params() -> HydraulicParams {
        HydraulicParams {
            capacity: 1.0,
            erosion: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_contact_step_erodes_and_raises_density() {
        let start = Vec3::new(8.0, 8.0, 14.0);
        let field = tilted_plane(start);
        let params = strong_params();
        let mut particle = Particle::new(start, field.geometry().center_grid(), &params);
        let total = field.total();
        let phi = field.sample(start);

        assert!(particle.step(&field, &params, 0.0));
        assert!(particle.eroded > 0.0);
        assert_eq!(particle.deposited, 0.0);
        assert!((particle.sediment - particle.eroded).abs() < 1e-6);
        assert!(field.sample(start) > phi);
        let delta = field.total() - total;
        assert!((delta - particle.eroded as f64).abs() < 1e-4, "delta {} eroded {}", delta, particle.eroded);
        // Slides along the plane: downhill in z, sideways in +x
        assert!(particle.position.z < start.z && particle.position.x > start.x);
    }

    #[test]
    fn test_overloaded_particle_deposits_and_lowers_density() {
        let start = Vec3::new(8.0, 8.0, 14.0);
        let field = tilted_plane(start);
        let params = strong_params();
        let mut particle = Particle::new(start, field.geometry().center_grid(), &params);
        particle.sediment = 1.0;
        let total = field.total();
        let phi = field.sample(start);

        assert!(particle.step(&field, &params, 0.0));
        assert!(particle.deposited > 0.0);
        assert_eq!(particle.eroded, 0.0);
        assert!((particle.sediment + particle.deposited - 1.0).abs() < 1e-6);
        assert!(field.sample(start) < phi);
        let delta = field.total() - total;
        assert!((delta + particle.deposited as f64).abs() < 1e-4, "delta {} deposited {}", delta, particle.deposited);
    }

    #[test]
    fn test_particle_leaving_lattice_dies() {
        let field = sphere_field(8, 10.0, 5.0);
        let params = HydraulicParams::default();
        let mut particle = Particle::new(Vec3::splat(-3.0), Vec3::ZERO, &params);
        particle.run(&field, &params, 0.0);
        assert_eq!(particle.state, ParticleState::Dead(DeathCause::OutOfBounds));
    }

    #[test]
    fn test_splat_delivers_exact_amount() {
        let geometry = FieldGeometry::centered(8, 4.0);
        let field = DensityField::new(geometry).unwrap();
        let params = HydraulicParams::default();
        splat(&field, Vec3::new(3.3, 4.6, 2.1), Vec3::Z, 0.25, &params);
        assert!((field.total() - 0.25).abs() < 1e-6);

        // Corners off the lattice are dropped and the rest renormalized.
        splat(&field, Vec3::new(8.5, 8.5, 8.5), Vec3::Z, 0.5, &params);
        assert!((field.total() - 0.75).abs() < 1e-6);
        assert!((field.get(8, 8, 8) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_spawn_on_starting_sphere() {
        let geometry = FieldGeometry::centered(32, 40.0);
        let sim = HydraulicSimulator::new(HydraulicParams { starting_radius: 30.0, ..Default::default() }, 0.0);
        let particles = sim.spawn(&geometry, 100).unwrap();
        let center = geometry.center_grid();
        for p in &particles {
            let world = geometry.start + p.position * geometry.increment;
            assert!((world.length() - 30.0).abs() < 1e-3);
            assert!(p.direction.dot((center - p.position).normalize()) > 0.999);
            assert!(p.is_alive());
        }
    }

    #[test]
    fn test_batch_terminates_and_stays_finite() {
        let field = sphere_field(24, 30.0, 20.0);
        let params = HydraulicParams {
            starting_radius: 24.0,
            max_steps: 64,
            ..Default::default()
        };
        let mut sim = HydraulicSimulator::new(params, 0.0);
        let report = sim.run_batch(&field, 128).unwrap();

        assert_eq!(report.particles, 128);
        assert_eq!(sim.particles().len(), 128);
        assert!(sim.particles().iter().all(|p| !p.is_alive()));
        assert!(sim.particles().iter().all(|p| p.steps <= 64));
        assert!(report.eroded.is_finite() && report.deposited.is_finite());
        let snapshot = field.snapshot().unwrap();
        assert!(snapshot.values().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_batches_use_fresh_spawns() {
        let field = sphere_field(16, 20.0, 10.0);
        let mut sim = HydraulicSimulator::new(HydraulicParams { starting_radius: 15.0, ..Default::default() }, 0.0);
        let first = sim.spawn(field.geometry(), 4).unwrap();
        sim.run_batch(&field, 4).unwrap();
        let second = sim.spawn(field.geometry(), 4).unwrap();
        assert_ne!(first[0].position, second[0].position);
    }
}
