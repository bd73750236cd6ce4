//! The shared density lattice and its access capabilities
//!
//! Values are stored as `f32` bit patterns in atomics so erosion kernels can
//! accumulate into overlapping cells from many threads without locking.
//! Readers only need `&DensityField`; full overwrites need `&mut`.

use std::sync::atomic::{AtomicU32, Ordering};

use glam::{IVec3, UVec3, Vec3};

use super::geometry::FieldGeometry;
use crate::core::dispatch;
use crate::core::{Error, Result};
use crate::math::trilinear;

/// Magnitude bound for any stored density value.
pub const DENSITY_LIMIT: f32 = 1.0e6;

/// Replace non-finite values and clamp into `±DENSITY_LIMIT`.
#[inline]
pub fn sanitize(value: f32) -> f32 {
    if value.is_nan() {
        DENSITY_LIMIT
    } else {
        value.clamp(-DENSITY_LIMIT, DENSITY_LIMIT)
    }
}

/// Read-only view of a density lattice.
pub trait FieldRead: Sync {
    fn geometry(&self) -> &FieldGeometry;

    /// Value at a flat index.
    fn value(&self, idx: usize) -> f32;

    /// Value at a lattice point.
    #[inline]
    fn get(&self, x: u32, y: u32, z: u32) -> f32 {
        self.value(self.geometry().index(x, y, z))
    }

    /// Value at a possibly out-of-range point, clamped to the nearest edge.
    #[inline]
    fn get_clamped(&self, p: IVec3) -> f32 {
        let max = self.geometry().global_res as i32;
        let c = p.clamp(IVec3::ZERO, IVec3::splat(max)).as_uvec3();
        self.get(c.x, c.y, c.z)
    }

    /// Trilinear sample at a continuous grid position, clamped to the lattice.
    fn sample(&self, p: Vec3) -> f32 {
        let max = self.geometry().global_res as f32;
        let p = p.clamp(Vec3::ZERO, Vec3::splat(max));
        let base = p.floor().as_ivec3();
        let t = p - base.as_vec3();
        let mut corners = [0.0; 8];
        for (i, c) in corners.iter_mut().enumerate() {
            let offset = IVec3::new((i & 1) as i32, ((i >> 1) & 1) as i32, ((i >> 2) & 1) as i32);
            *c = self.get_clamped(base + offset);
        }
        trilinear(&corners, t.x, t.y, t.z)
    }

    /// Central-difference gradient in grid units.
    fn gradient(&self, p: Vec3) -> Vec3 {
        Vec3::new(
            self.sample(p + Vec3::X) - self.sample(p - Vec3::X),
            self.sample(p + Vec3::Y) - self.sample(p - Vec3::Y),
            self.sample(p + Vec3::Z) - self.sample(p - Vec3::Z),
        ) * 0.5
    }

    /// Central-difference gradient at a lattice point.
    fn lattice_gradient(&self, p: UVec3) -> Vec3 {
        let p = p.as_ivec3();
        Vec3::new(
            self.get_clamped(p + IVec3::X) - self.get_clamped(p - IVec3::X),
            self.get_clamped(p + IVec3::Y) - self.get_clamped(p - IVec3::Y),
            self.get_clamped(p + IVec3::Z) - self.get_clamped(p - IVec3::Z),
        ) * 0.5
    }

    /// Copy every value into a detached snapshot.
    fn snapshot(&self) -> Result<FieldSnapshot> {
        let geometry = *self.geometry();
        let mut values = crate::core::try_alloc::<f32>(geometry.len(), "field snapshot")?;
        dispatch::fill_indexed(&mut values, |i| self.value(i));
        Ok(FieldSnapshot { geometry, values })
    }
}

/// Exclusive whole-field overwrite.
pub trait FieldWrite: FieldRead {
    /// Replace every value with `f(index)`, computed in parallel.
    fn overwrite_with<F>(&mut self, f: F)
    where
        F: Fn(usize) -> f32 + Sync + Send;
}

/// Localized additive updates from concurrent writers.
pub trait FieldAccumulate: FieldRead {
    /// Atomically add `delta` to the value at `idx`.
    ///
    /// Non-finite deltas are ignored and the result is clamped.
    fn accumulate(&self, idx: usize, delta: f32);
}

/// The global density lattice.
pub struct DensityField {
    geometry: FieldGeometry,
    values: Vec<AtomicU32>,
}

impl DensityField {
    /// Allocate a zero-filled field.
    pub fn new(geometry: FieldGeometry) -> Result<Self> {
        let len = geometry.len();
        let mut values = Vec::new();
        values.try_reserve_exact(len).map_err(|_| Error::ResourceExhausted {
            what: "density field",
            bytes: len.saturating_mul(std::mem::size_of::<AtomicU32>()),
        })?;
        values.extend((0..len).map(|_| AtomicU32::new(0.0f32.to_bits())));
        Ok(Self { geometry, values })
    }

    /// Build a field from precomputed values in lattice order.
    pub fn from_values(geometry: FieldGeometry, values: Vec<f32>) -> Result<Self> {
        if values.len() != geometry.len() {
            return Err(Error::config(format!(
                "field has {} values, geometry needs {}",
                values.len(),
                geometry.len()
            )));
        }
        let values = values
            .into_iter()
            .map(|v| AtomicU32::new(sanitize(v).to_bits()))
            .collect();
        Ok(Self { geometry, values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sum of all values; used to check that transfers conserve material.
    pub fn total(&self) -> f64 {
        self.values
            .iter()
            .map(|v| f32::from_bits(v.load(Ordering::Relaxed)) as f64)
            .sum()
    }
}

impl FieldRead for DensityField {
    fn geometry(&self) -> &FieldGeometry {
        &self.geometry
    }

    #[inline]
    fn value(&self, idx: usize) -> f32 {
        f32::from_bits(self.values[idx].load(Ordering::Relaxed))
    }
}

impl FieldWrite for DensityField {
    fn overwrite_with<F>(&mut self, f: F)
    where
        F: Fn(usize) -> f32 + Sync + Send,
    {
        // Exclusive borrow: plain stores are enough.
        dispatch::fill_indexed(&mut self.values, |i| AtomicU32::new(sanitize(f(i)).to_bits()));
    }
}

impl FieldAccumulate for DensityField {
    fn accumulate(&self, idx: usize, delta: f32) {
        if delta == 0.0 || !delta.is_finite() {
            return;
        }
        let Some(cell) = self.values.get(idx) else {
            return;
        };
        // fetch_update retries the CAS until no other writer intervened.
        let _ = cell.fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
            Some(sanitize(f32::from_bits(bits) + delta).to_bits())
        });
    }
}

/// Detached copy of a field taken before a pass mutates the original.
#[derive(Clone, Debug)]
pub struct FieldSnapshot {
    geometry: FieldGeometry,
    values: Vec<f32>,
}

impl FieldSnapshot {
    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

impl FieldRead for FieldSnapshot {
    fn geometry(&self) -> &FieldGeometry {
        &self.geometry
    }

    #[inline]
    fn value(&self, idx: usize) -> f32 {
        self.values[idx]
    }
}
