//! Chunk coordinates and build descriptors

use glam::{IVec3, UVec3, Vec3};

use crate::config::check_chunk_resolution;
use crate::core::{Error, Result};
use crate::field::FieldGeometry;
use crate::math::Aabb;

/// Integer coordinate identifying a chunk in the planet's chunk grid
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ChunkCoord {
    /// Create a new chunk coordinate
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn as_ivec3(&self) -> IVec3 {
        IVec3::new(self.x, self.y, self.z)
    }
}

impl From<IVec3> for ChunkCoord {
    fn from(v: IVec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

/// How the global lattice is cut into chunks.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChunkLayout {
    pub geometry: FieldGeometry,
    /// Lattice cells per chunk along each axis.
    pub chunk_res: u32,
}

impl ChunkLayout {
    pub fn new(geometry: FieldGeometry, chunk_res: u32) -> Result<Self> {
        if chunk_res == 0 || geometry.global_res % chunk_res != 0 {
            return Err(Error::config(format!(
                "global resolution {} is not a multiple of chunk resolution {}",
                geometry.global_res, chunk_res
            )));
        }
        Ok(Self { geometry, chunk_res })
    }

    /// Chunks per axis.
    pub fn chunks_per_axis(&self) -> i32 {
        (self.geometry.global_res / self.chunk_res) as i32
    }

    /// World-space edge length of a chunk.
    pub fn chunk_size(&self) -> f32 {
        self.chunk_res as f32 * self.geometry.increment
    }

    pub fn contains(&self, coord: ChunkCoord) -> bool {
        let n = self.chunks_per_axis();
        let c = coord.as_ivec3();
        c.cmpge(IVec3::ZERO).all() && c.cmplt(IVec3::splat(n)).all()
    }

    /// Chunk containing a world position (may lie outside the grid).
    pub fn from_world_pos(&self, pos: Vec3) -> ChunkCoord {
        ((pos - self.geometry.start) / self.chunk_size()).floor().as_ivec3().into()
    }

    /// First global lattice point covered by the chunk.
    pub fn grid_offset(&self, coord: ChunkCoord) -> UVec3 {
        coord.as_ivec3().max(IVec3::ZERO).as_uvec3() * self.chunk_res
    }

    /// World-space minimum corner.
    pub fn origin(&self, coord: ChunkCoord) -> Vec3 {
        self.geometry.start + coord.as_ivec3().as_vec3() * self.chunk_size()
    }

    pub fn center(&self, coord: ChunkCoord) -> Vec3 {
        self.origin(coord) + Vec3::splat(self.chunk_size() * 0.5)
    }

    pub fn bounds(&self, coord: ChunkCoord) -> Aabb {
        let origin = self.origin(coord);
        Aabb::new(origin, origin + Vec3::splat(self.chunk_size()))
    }

    /// Describe a chunk build at the given detail.
    pub fn descriptor(&self, coord: ChunkCoord, res_factor: u32, add_noise: bool) -> Result<ChunkDescriptor> {
        if !self.contains(coord) {
            return Err(Error::config(format!("chunk {:?} is outside the chunk grid", coord)));
        }
        ChunkDescriptor::new(
            coord,
            self.grid_offset(coord),
            self.origin(coord),
            self.chunk_res,
            res_factor,
            add_noise,
            self.geometry.increment,
        )
    }
}

/// Everything needed to sample and mesh one chunk.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChunkDescriptor {
    pub coord: ChunkCoord,
    /// Global lattice point at the chunk's minimum corner.
    pub grid_offset: UVec3,
    /// World position of the minimum corner.
    pub origin: Vec3,
    /// Cells per axis before upsampling.
    pub initial_res: u32,
    /// Number of resolution doublings.
    pub res_factor: u32,
    pub add_noise: bool,
    /// World spacing of the coarse lattice.
    pub increment: f32,
}

impl ChunkDescriptor {
    pub fn new(
        coord: ChunkCoord,
        grid_offset: UVec3,
        origin: Vec3,
        initial_res: u32,
        res_factor: u32,
        add_noise: bool,
        increment: f32,
    ) -> Result<Self> {
        if initial_res == 0 {
            return Err(Error::config("chunk initial resolution must be at least 1"));
        }
        if !(increment.is_finite() && increment > 0.0) {
            return Err(Error::config(format!("chunk increment must be positive, got {increment}")));
        }
        check_chunk_resolution(initial_res, res_factor)?;
        Ok(Self {
            coord,
            grid_offset,
            origin,
            initial_res,
            res_factor,
            add_noise,
            increment,
        })
    }

    /// Points per axis before upsampling.
    pub fn initial_grid_res(&self) -> u32 {
        self.initial_res + 1
    }

    /// Cells per axis after all passes.
    pub fn final_res(&self) -> u32 {
        self.initial_res << self.res_factor
    }

    /// Points per axis after all passes.
    pub fn final_grid_res(&self) -> u32 {
        self.final_res() + 1
    }

    /// World spacing of the final lattice.
    pub fn final_increment(&self) -> f32 {
        self.increment / (1u32 << self.res_factor) as f32
    }

    pub fn bounds(&self) -> Aabb {
        let size = self.initial_res as f32 * self.increment;
        Aabb::new(self.origin, self.origin + Vec3::splat(size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> ChunkLayout {
        ChunkLayout::new(FieldGeometry::centered(32, 16.0), 8).unwrap()
    }

    #[test]
    fn test_chunk_coord_new() {
        let coord = ChunkCoord::new(1, 2, 3);
        assert_eq!(coord.x, 1);
        assert_eq!(coord.y, 2);
        assert_eq!(coord.z, 3);
        assert_eq!(ChunkCoord::from(IVec3::new(1, 2, 3)), coord);
    }

    #[test]
    fn test_layout_geometry() {
        let layout = layout();
        assert_eq!(layout.chunks_per_axis(), 4);
        assert_eq!(layout.chunk_size(), 8.0);
        let coord = ChunkCoord::new(1, 2, 3);
        assert_eq!(layout.grid_offset(coord), UVec3::new(8, 16, 24));
        assert_eq!(layout.origin(coord), Vec3::new(-8.0, 0.0, 8.0));
        assert_eq!(layout.center(coord), Vec3::new(-4.0, 4.0, 12.0));
        assert_eq!(layout.from_world_pos(Vec3::new(-5.0, 1.0, 9.0)), coord);
        assert!(layout.contains(coord));
        assert!(!layout.contains(ChunkCoord::new(4, 0, 0)));
        assert!(!layout.contains(ChunkCoord::new(-1, 0, 0)));
    }

    #[test]
    fn test_layout_rejects_uneven_split() {
        assert!(ChunkLayout::new(FieldGeometry::centered(30, 1.0), 8).is_err());
    }

    #[test]
    fn test_descriptor_resolutions() {
        let desc = layout().descriptor(ChunkCoord::new(0, 0, 0), 2, false).unwrap();
        assert_eq!(desc.initial_grid_res(), 9);
        assert_eq!(desc.final_res(), 32);
        assert_eq!(desc.final_grid_res(), 33);
        assert_eq!(desc.final_increment(), 0.25);
        assert_eq!(desc.bounds().size(), Vec3::splat(8.0));
    }

    #[test]
    fn test_descriptor_rejects_out_of_grid() {
        assert!(layout().descriptor(ChunkCoord::new(9, 0, 0), 0, false).is_err());
    }

    #[test]
    fn test_descriptor_rejects_bad_res_factor() {
        let result = ChunkDescriptor::new(
            ChunkCoord::new(0, 0, 0), UVec3::ZERO, Vec3::ZERO, 8, 40, false, 1.0,
        );
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
