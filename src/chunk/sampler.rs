//! Per-chunk lattice extraction, upsampling and detail injection

use std::sync::Arc;
use std::time::Instant;

use glam::{IVec3, Vec3};

use super::descriptor::ChunkDescriptor;
use crate::core::{dispatch, try_alloc, Result};
use crate::field::FieldRead;
use crate::math::trilinear;
use crate::terrain::FieldSynthesizer;

/// A chunk's density lattice with a one-point halo on every face.
///
/// Core points are addressed with coordinates in `0..grid_res`; the halo
/// extends that to `-1..=grid_res`.
#[derive(Clone, Debug)]
pub struct ChunkLattice {
    res: u32,
    values: Vec<f32>,
}

impl ChunkLattice {
    /// Zero-filled lattice with `res` cells per axis.
    pub fn new(res: u32) -> Result<Self> {
        let dim = res as usize + 3;
        let values = try_alloc::<f32>(dim * dim * dim, "chunk lattice")?;
        Ok(Self { res, values })
    }

    /// Lattice filled from a function of core coordinates (halo included).
    pub fn from_fn<F>(res: u32, f: F) -> Result<Self>
    where
        F: Fn(IVec3) -> f32 + Sync + Send,
    {
        let mut lattice = Self::new(res)?;
        let dim = lattice.padded_dim();
        dispatch::fill_indexed(&mut lattice.values, |i| f(padded_coords(i, dim)));
        Ok(lattice)
    }

    /// Cells per axis.
    pub fn res(&self) -> u32 {
        self.res
    }

    /// Core points per axis.
    pub fn grid_res(&self) -> u32 {
        self.res + 1
    }

    /// Stored points per axis including the halo.
    pub fn padded_dim(&self) -> usize {
        self.res as usize + 3
    }

    /// Number of core points, `grid_res³`.
    pub fn len(&self) -> usize {
        let n = self.grid_res() as usize;
        n * n * n
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of stored points including the halo.
    pub fn padded_len(&self) -> usize {
        self.values.len()
    }

    /// Raw padded storage, x fastest.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    #[inline]
    fn padded_index(&self, p: IVec3) -> usize {
        let dim = self.padded_dim();
        let q = (p + IVec3::ONE).as_uvec3();
        q.x as usize + q.y as usize * dim + q.z as usize * dim * dim
    }

    /// Value at a core or halo coordinate.
    #[inline]
    pub fn get(&self, p: IVec3) -> f32 {
        self.values[self.padded_index(p)]
    }

    /// Central-difference gradient at a core point.
    pub fn gradient(&self, p: IVec3) -> Vec3 {
        Vec3::new(
            self.get(p + IVec3::X) - self.get(p - IVec3::X),
            self.get(p + IVec3::Y) - self.get(p - IVec3::Y),
            self.get(p + IVec3::Z) - self.get(p - IVec3::Z),
        ) * 0.5
    }

    /// Core values in lattice order.
    pub fn core_values(&self) -> Vec<f32> {
        let n = self.grid_res() as i32;
        let mut out = Vec::with_capacity(self.len());
        for z in 0..n {
            for y in 0..n {
                for x in 0..n {
                    out.push(self.get(IVec3::new(x, y, z)));
                }
            }
        }
        out
    }

    /// Double the resolution, keeping the halo.
    ///
    /// Points that coincide with a coarse point copy it bit-exactly; every
    /// other point is the trilinear blend of its enclosing coarse corners.
    pub fn upsample(&self) -> Result<ChunkLattice> {
        let fine_res = self.res * 2;
        ChunkLattice::from_fn(fine_res, |p| {
            let (lo_x, tx) = split_fine(p.x);
            let (lo_y, ty) = split_fine(p.y);
            let (lo_z, tz) = split_fine(p.z);
            let lo = IVec3::new(lo_x, lo_y, lo_z);
            if tx == 0.0 && ty == 0.0 && tz == 0.0 {
                return self.get(lo);
            }
            let mut corners = [0.0; 8];
            for (i, c) in corners.iter_mut().enumerate() {
                let offset = IVec3::new((i & 1) as i32, ((i >> 1) & 1) as i32, ((i >> 2) & 1) as i32);
                // Aligned axes never step to their upper corner.
                let step = offset * IVec3::new((tx > 0.0) as i32, (ty > 0.0) as i32, (tz > 0.0) as i32);
                *c = self.get(lo + step);
            }
            trilinear(&corners, tx, ty, tz)
        })
    }
}

/// Coarse coordinate and blend factor for one fine coordinate.
#[inline]
fn split_fine(c: i32) -> (i32, f32) {
    if c.rem_euclid(2) == 0 {
        (c / 2, 0.0)
    } else {
        (c.div_euclid(2), 0.5)
    }
}

#[inline]
fn padded_coords(i: usize, dim: usize) -> IVec3 {
    IVec3::new(
        (i % dim) as i32 - 1,
        ((i / dim) % dim) as i32 - 1,
        (i / (dim * dim)) as i32 - 1,
    )
}

/// Builds chunk lattices from the global field.
#[derive(Clone)]
pub struct ChunkSampler {
    synthesizer: Arc<FieldSynthesizer>,
}

impl ChunkSampler {
    pub fn new(synthesizer: Arc<FieldSynthesizer>) -> Self {
        Self { synthesizer }
    }

    /// Copy the chunk's coarse region plus halo, 1:1.
    ///
    /// Halo points past the edge of the global lattice replicate the edge.
    pub fn extract<F: FieldRead + ?Sized>(&self, field: &F, desc: &ChunkDescriptor) -> Result<ChunkLattice> {
        let offset = desc.grid_offset.as_ivec3();
        ChunkLattice::from_fn(desc.initial_res, |p| field.get_clamped(offset + p))
    }

    /// Add detail noise at every stored point.
    pub fn inject_detail(&self, lattice: &mut ChunkLattice, desc: &ChunkDescriptor) {
        let dim = lattice.padded_dim();
        let spacing = desc.increment * desc.initial_res as f32 / lattice.res() as f32;
        let origin = desc.origin;
        let synthesizer = &self.synthesizer;
        dispatch::update_indexed(&mut lattice.values, |i, value| {
            let world = origin + padded_coords(i, dim).as_vec3() * spacing;
            *value += synthesizer.detail_at(world);
        });
    }

    /// Full sampling pipeline for one chunk.
    pub fn sample<F: FieldRead + ?Sized>(&self, field: &F, desc: &ChunkDescriptor) -> Result<ChunkLattice> {
        let start = Instant::now();
        let mut lattice = self.extract(field, desc)?;
        for _ in 0..desc.res_factor {
            lattice = lattice.upsample()?;
        }
        if desc.add_noise {
            self.inject_detail(&mut lattice, desc);
        }
        log::debug!(
            "Sampled chunk {:?}: {}^3 points ({} padded) in {:.1}ms",
            desc.coord,
            lattice.grid_res(),
            lattice.padded_len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(lattice)
    }
}
