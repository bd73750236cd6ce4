//! Mapping between world space and the global lattice

use glam::{UVec3, Vec3};
use serde::{Deserialize, Serialize};

/// Placement of the global lattice in planet space.
///
/// The lattice has `global_res` cells and `global_res + 1` points per axis,
/// starting at `start` with a uniform `increment` between points.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldGeometry {
    pub global_res: u32,
    pub start: Vec3,
    pub increment: f32,
}

impl FieldGeometry {
    /// Lattice centered on the planet origin spanning `±half_extent`.
    pub fn centered(global_res: u32, half_extent: f32) -> Self {
        Self {
            global_res,
            start: Vec3::splat(-half_extent),
            increment: 2.0 * half_extent / global_res.max(1) as f32,
        }
    }

    /// Points per axis.
    #[inline]
    pub fn grid_res(&self) -> u32 {
        self.global_res + 1
    }

    /// Total number of lattice points.
    #[inline]
    pub fn len(&self) -> usize {
        let n = self.grid_res() as usize;
        n * n * n
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat index `x + y*N + z*N²`.
    #[inline]
    pub fn index(&self, x: u32, y: u32, z: u32) -> usize {
        let n = self.grid_res() as usize;
        x as usize + y as usize * n + z as usize * n * n
    }

    /// Inverse of [`index`](Self::index).
    #[inline]
    pub fn coords(&self, idx: usize) -> UVec3 {
        let n = self.grid_res() as usize;
        UVec3::new((idx % n) as u32, ((idx / n) % n) as u32, (idx / (n * n)) as u32)
    }

    /// World position of a lattice point.
    #[inline]
    pub fn world_position(&self, point: UVec3) -> Vec3 {
        self.start + point.as_vec3() * self.increment
    }

    /// Continuous grid coordinate of a world position.
    #[inline]
    pub fn to_grid(&self, world: Vec3) -> Vec3 {
        (world - self.start) / self.increment
    }

    /// Grid coordinate of the planet center.
    #[inline]
    pub fn center_grid(&self) -> Vec3 {
        self.to_grid(Vec3::ZERO)
    }

    /// Whether a continuous grid position lies inside the lattice.
    #[inline]
    pub fn contains_grid(&self, p: Vec3) -> bool {
        let max = self.global_res as f32;
        p.is_finite() && p.cmpge(Vec3::ZERO).all() && p.cmple(Vec3::splat(max)).all()
    }
}
