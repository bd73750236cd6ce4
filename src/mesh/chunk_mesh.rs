//! Chunk mesh output, consumers and statistics

use std::collections::HashMap;

use glam::{Mat4, Vec3};

use crate::chunk::ChunkCoord;

/// Triangle mesh extracted from one chunk, in planet space.
#[derive(Clone, Debug, Default)]
pub struct ChunkMesh {
    pub coord: ChunkCoord,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
}

impl ChunkMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Flat triangle index list.
    pub fn indices(&self) -> &[u32] {
        bytemuck::cast_slice(&self.triangles)
    }

    /// Approximate heap size of the mesh buffers.
    pub fn memory_bytes(&self) -> usize {
        (self.positions.len() + self.normals.len()) * std::mem::size_of::<Vec3>()
            + self.triangles.len() * std::mem::size_of::<[u32; 3]>()
    }

    /// Replace vertex normals with area-weighted face normals.
    pub fn recalculate_normals(&mut self) {
        let mut accum = vec![Vec3::ZERO; self.positions.len()];
        for &[a, b, c] in &self.triangles {
            let (pa, pb, pc) = (
                self.positions[a as usize],
                self.positions[b as usize],
                self.positions[c as usize],
            );
            let face = (pb - pa).cross(pc - pa);
            accum[a as usize] += face;
            accum[b as usize] += face;
            accum[c as usize] += face;
        }
        self.normals = accum.into_iter().map(Vec3::normalize_or_zero).collect();
    }

    /// Copy of the mesh with positions and normals mapped through `transform`.
    pub fn transformed(&self, transform: &Mat4) -> ChunkMesh {
        let normal_matrix = transform.inverse().transpose();
        ChunkMesh {
            coord: self.coord,
            positions: self.positions.iter().map(|p| transform.transform_point3(*p)).collect(),
            normals: self
                .normals
                .iter()
                .map(|n| normal_matrix.transform_vector3(*n).normalize_or_zero())
                .collect(),
            triangles: self.triangles.clone(),
        }
    }
}

/// Consumer of finished chunk meshes (renderer, exporter, collider builder).
pub trait MeshSink {
    /// Take ownership of the arrays for `coord`, replacing any previous mesh.
    ///
    /// Positions and normals are in planet space; `parent` maps planet space
    /// into the consumer's world.
    fn submit(&mut self, coord: ChunkCoord, positions: &[Vec3], normals: &[Vec3], indices: &[u32], parent: &Mat4);

    /// Release everything held for `coord`.
    fn release(&mut self, coord: ChunkCoord);
}

/// Sink that discards meshes.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl MeshSink for NullSink {
    fn submit(&mut self, _: ChunkCoord, _: &[Vec3], _: &[Vec3], _: &[u32], _: &Mat4) {}

    fn release(&mut self, _: ChunkCoord) {}
}

/// Sink that keeps a world-space copy of every live mesh.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub meshes: HashMap<ChunkCoord, ChunkMesh>,
    pub submitted: usize,
    pub released: usize,
}

impl MeshSink for CollectingSink {
    fn submit(&mut self, coord: ChunkCoord, positions: &[Vec3], normals: &[Vec3], indices: &[u32], parent: &Mat4) {
        let mesh = ChunkMesh {
            coord,
            positions: positions.to_vec(),
            normals: normals.to_vec(),
            triangles: indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]]).collect(),
        };
        self.meshes.insert(coord, mesh.transformed(parent));
        self.submitted += 1;
    }

    fn release(&mut self, coord: ChunkCoord) {
        if self.meshes.remove(&coord).is_some() {
            self.released += 1;
        }
    }
}

/// Radial extent of the extracted surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshStats {
    pub min_radius: f32,
    pub max_radius: f32,
    pub vertex_count: usize,
    pub triangle_count: usize,
}

impl Default for MeshStats {
    fn default() -> Self {
        Self {
            min_radius: f32::INFINITY,
            max_radius: 0.0,
            vertex_count: 0,
            triangle_count: 0,
        }
    }
}

impl MeshStats {
    /// Fold one mesh in, measuring radii from `center`.
    pub fn include(&mut self, mesh: &ChunkMesh, center: Vec3) {
        for p in &mesh.positions {
            let r = p.distance(center);
            self.min_radius = self.min_radius.min(r);
            self.max_radius = self.max_radius.max(r);
        }
        self.vertex_count += mesh.vertex_count();
        self.triangle_count += mesh.triangle_count();
    }

    /// Height difference between the highest and lowest vertex.
    pub fn height_delta(&self) -> f32 {
        if self.vertex_count == 0 {
            0.0
        } else {
            self.max_radius - self.min_radius
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> ChunkMesh {
        ChunkMesh {
            coord: ChunkCoord::new(1, 1, 1),
            positions: vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            normals: vec![Vec3::X; 4],
            triangles: vec![[0, 1, 2], [0, 2, 3]],
        }
    }

    #[test]
    fn test_indices_flatten_triangles() {
        let mesh = quad();
        assert_eq!(mesh.indices(), &[0, 1, 2, 0, 2, 3]);
        assert_eq!(mesh.memory_bytes(), 8 * 12 + 2 * 12);
    }

    #[test]
    fn test_recalculate_normals() {
        let mut mesh = quad();
        mesh.recalculate_normals();
        for n in &mesh.normals {
            assert!((*n - Vec3::Z).length() < 1e-6);
        }
    }

    #[test]
    fn test_transformed_moves_positions() {
        let mesh = quad();
        let moved = mesh.transformed(&Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0)));
        assert_eq!(moved.positions[2], Vec3::new(1.0, 1.0, 5.0));
        assert_eq!(moved.normals[0], Vec3::X);
    }

    #[test]
    fn test_collecting_sink() {
        let mut sink = CollectingSink::default();
        let mesh = quad();
        sink.submit(mesh.coord, &mesh.positions, &mesh.normals, mesh.indices(), &Mat4::IDENTITY);
        assert_eq!(sink.meshes[&mesh.coord].triangles, mesh.triangles);
        sink.release(mesh.coord);
        sink.release(mesh.coord);
        assert!(sink.meshes.is_empty());
        assert_eq!(sink.released, 1);
    }

    #[test]
    fn test_stats_height_delta() {
        let mut stats = MeshStats::default();
        assert_eq!(stats.height_delta(), 0.0);
        stats.include(&quad(), Vec3::ZERO);
        assert_eq!(stats.min_radius, 0.0);
        assert!((stats.max_radius - 2f32.sqrt()).abs() < 1e-6);
        assert_eq!(stats.triangle_count, 2);
    }
}
