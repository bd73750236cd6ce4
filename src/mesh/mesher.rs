//! Marching cubes over a chunk lattice
//!
//! Three passes, each a full data-parallel kernel:
//! 1. normals at every core lattice point from central differences,
//! 2. one vertex per crossed lattice edge, indexed through [`EdgeVertexTable`],
//! 3. triangles per cell from the lookup tables.

use std::time::Instant;

use glam::{IVec3, UVec3, Vec3};

use super::chunk_mesh::ChunkMesh;
use super::edge::{EdgeKey, EdgeVertexTable};
use super::tables::{CORNER_OFFSETS, EDGE_TABLE, END, TRI_TABLE};
use crate::chunk::{ChunkCoord, ChunkDescriptor, ChunkLattice};
use crate::config::MeshParams;
use crate::core::{dispatch, try_alloc, Result};

/// Denominators below this are treated as a flat edge and use the midpoint.
const FLAT_EDGE_EPSILON: f32 = 1.0e-12;

/// Extracts the iso-surface of a chunk lattice as an indexed mesh.
#[derive(Clone, Debug)]
pub struct SurfaceMesher {
    params: MeshParams,
    iso_level: f32,
}

impl SurfaceMesher {
    pub fn new(params: MeshParams, iso_level: f32) -> Self {
        Self { params, iso_level }
    }

    pub fn params(&self) -> &MeshParams {
        &self.params
    }

    pub fn iso_level(&self) -> f32 {
        self.iso_level
    }

    /// Mesh a sampled chunk in planet space.
    pub fn mesh_chunk(&self, lattice: &ChunkLattice, desc: &ChunkDescriptor) -> Result<ChunkMesh> {
        self.extract(lattice, desc.coord, desc.origin, desc.final_increment())
    }

    /// Mesh a lattice whose core point (0,0,0) sits at `origin` with `spacing` between points.
    pub fn extract(&self, lattice: &ChunkLattice, coord: ChunkCoord, origin: Vec3, spacing: f32) -> Result<ChunkMesh> {
        let start = Instant::now();
        let grid_res = lattice.grid_res();
        let point_count = lattice.len();
        let sign = if self.params.invert_normals { -1.0 } else { 1.0 };

        // Pass 1: normals
        let mut normals = try_alloc::<Vec3>(point_count, "normal scratch")?;
        dispatch::fill_indexed(&mut normals, |i| {
            -lattice.gradient(core_coords(i, grid_res).as_ivec3()).normalize_or_zero()
        });

        // Pass 2: vertices on crossed edges
        let edges = EdgeVertexTable::new(grid_res)?;
        let placed = dispatch::flat_map_indices(point_count, |i| {
            let p = core_coords(i, grid_res);
            let mut out: Vec<(u32, Vec3, Vec3)> = Vec::new();
            for axis in 0..3 {
                let q = p + UVec3::AXES[axis];
                if q.cmpge(UVec3::splat(grid_res)).any() {
                    continue;
                }
                let phi_p = lattice.get(p.as_ivec3());
                let phi_q = lattice.get(q.as_ivec3());
                if (phi_p < self.iso_level) == (phi_q < self.iso_level) {
                    continue;
                }
                let Some(index) = edges.claim(EdgeKey::new(p, q)) else {
                    continue;
                };
                let t = self.crossing(phi_p, phi_q);
                let position = origin + (p.as_vec3() + UVec3::AXES[axis].as_vec3() * t) * spacing;
                let n_p = normals[i];
                let n_q = normals[index_of(q, grid_res)];
                let normal = match n_p.lerp(n_q, t).try_normalize() {
                    Some(n) => n,
                    None if n_p != Vec3::ZERO => n_p,
                    None => n_q,
                };
                out.push((index, position, normal * sign));
            }
            out
        });

        let vertex_count = edges.vertex_count() as usize;
        let mut positions = try_alloc::<Vec3>(vertex_count, "vertex buffer")?;
        let mut vertex_normals = try_alloc::<Vec3>(vertex_count, "vertex normal buffer")?;
        for (index, position, normal) in placed {
            positions[index as usize] = position;
            vertex_normals[index as usize] = normal;
        }
        drop(normals);

        // Pass 3: triangles
        let res = lattice.res();
        let cell_count = (res as usize).pow(3);
        let invert = self.params.invert_normals;
        let triangles = dispatch::flat_map_indices(cell_count, |i| {
            let cell = core_coords(i, res);
            let cube_index = self.cube_index(lattice, cell.as_ivec3());
            let mut out: Vec<[u32; 3]> = Vec::new();
            if EDGE_TABLE[cube_index] == 0 {
                return out;
            }
            let row = &TRI_TABLE[cube_index];
            for tri in row.chunks_exact(3) {
                if tri[0] == END {
                    break;
                }
                let lookup = |e: i8| edges.get(EdgeKey::from_cell_edge(cell, e as usize));
                if let (Some(a), Some(b), Some(c)) = (lookup(tri[0]), lookup(tri[1]), lookup(tri[2])) {
                    out.push(if invert { [c, b, a] } else { [a, b, c] });
                }
            }
            out
        });

        let mut mesh = ChunkMesh {
            coord,
            positions,
            normals: vertex_normals,
            triangles,
        };
        if self.params.flat_shade {
            mesh.recalculate_normals();
        }

        log::debug!(
            "Meshed chunk {:?}: {} vertices, {} triangles in {:.1}ms",
            coord,
            mesh.vertex_count(),
            mesh.triangle_count(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(mesh)
    }

    /// Interpolation parameter of the iso crossing along an edge.
    fn crossing(&self, phi_a: f32, phi_b: f32) -> f32 {
        if !self.params.interpolate {
            return 0.5;
        }
        let denom = phi_b - phi_a;
        if denom.abs() < FLAT_EDGE_EPSILON {
            return 0.5;
        }
        ((self.iso_level - phi_a) / denom).clamp(0.0, 1.0)
    }

    /// Bit `i` set when corner `i` of the cell is below the iso level.
    pub fn cube_index(&self, lattice: &ChunkLattice, cell: IVec3) -> usize {
        let mut cube_index = 0;
        for (i, offset) in CORNER_OFFSETS.iter().enumerate() {
            if lattice.get(cell + UVec3::from(*offset).as_ivec3()) < self.iso_level {
                cube_index |= 1 << i;
            }
        }
        cube_index
    }
}

#[inline]
fn core_coords(i: usize, dim: u32) -> UVec3 {
    let n = dim as usize;
    UVec3::new((i % n) as u32, ((i / n) % n) as u32, (i / (n * n)) as u32)
}

#[inline]
fn index_of(p: UVec3, dim: u32) -> usize {
    let n = dim as usize;
    p.x as usize + p.y as usize * n + p.z as usize * n * n
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn mesher(invert_normals: bool) -> SurfaceMesher {
        SurfaceMesher::new(
            MeshParams {
                interpolate: true,
                invert_normals,
                flat_shade: false,
            },
            0.0,
        )
    }

    fn sphere_lattice(res: u32, radius: f32) -> ChunkLattice {
        let c = res as f32 * 0.5;
        ChunkLattice::from_fn(res, |p| (p.as_vec3() - Vec3::splat(c)).length() - radius).unwrap()
    }

    #[test]
    fn test_uniform_lattice_emits_nothing() {
        for value in [-1.0f32, 1.0] {
            let lattice = ChunkLattice::from_fn(4, |_| value).unwrap();
            let mesh = mesher(false).extract(&lattice, ChunkCoord::default(), Vec3::ZERO, 1.0).unwrap();
            assert!(mesh.is_empty());
            assert_eq!(mesh.vertex_count(), 0);
        }
    }

    #[test]
    fn test_full_cube_index_has_no_triangles() {
        let lattice = ChunkLattice::from_fn(1, |_| -5.0).unwrap();
        let index = mesher(false).cube_index(&lattice, IVec3::ZERO);
        assert_eq!(index, 255);
        assert_eq!(TRI_TABLE[index][0], END);
    }

    #[test]
    fn test_shared_edge_vertex_is_deduplicated() {
        // Plane crossing between x=1 and x=2 in a 3-cell lattice. The edge
        // (1,1,0)-(2,1,0) is shared by cells (1,0,0) and (1,1,0).
        let lattice = ChunkLattice::from_fn(3, |p| p.x as f32 - 1.5).unwrap();
        let mesh = mesher(false).extract(&lattice, ChunkCoord::default(), Vec3::ZERO, 1.0).unwrap();

        // One vertex per crossed x-edge: 4 x 4 points in the y/z plane.
        assert_eq!(mesh.vertex_count(), 16);
        let unique: HashSet<[u32; 3]> = mesh.positions.iter().map(|p| p.to_array().map(f32::to_bits)).collect();
        assert_eq!(unique.len(), mesh.vertex_count());

        let target = Vec3::new(1.5, 1.0, 0.0);
        let shared = mesh.positions.iter().position(|p| *p == target).unwrap() as u32;
        let referencing: Vec<_> = mesh.triangles.iter().filter(|t| t.contains(&shared)).collect();
        assert!(referencing.len() >= 2);

        // 3 x 3 crossed cells, two triangles each
        assert_eq!(mesh.triangle_count(), 18);
    }

    #[test]
    fn test_interpolation_places_crossing() {
        let lattice = ChunkLattice::from_fn(1, |p| p.x as f32 * 4.0 - 1.0).unwrap();
        let mesh = mesher(false).extract(&lattice, ChunkCoord::default(), Vec3::ZERO, 2.0).unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        for p in &mesh.positions {
            assert!((p.x - 0.5).abs() < 1e-6, "crossing at {p}");
        }

        let midpoint = SurfaceMesher::new(MeshParams { interpolate: false, ..Default::default() }, 0.0);
        let mesh = midpoint.extract(&lattice, ChunkCoord::default(), Vec3::ZERO, 2.0).unwrap();
        assert!(mesh.positions.iter().all(|p| p.x == 1.0));
    }

    #[test]
    fn test_sphere_normals_and_winding() {
        let lattice = sphere_lattice(12, 4.3);
        let center = Vec3::splat(6.0);
        for invert in [false, true] {
            let mesh = mesher(invert).extract(&lattice, ChunkCoord::default(), Vec3::ZERO, 1.0).unwrap();
            assert!(!mesh.is_empty());
            let outward = if invert { 1.0 } else { -1.0 };
            for (p, n) in mesh.positions.iter().zip(&mesh.normals) {
                let radial = (*p - center).normalize();
                assert!(n.dot(radial) * outward > 0.5);
            }
            let mut agree = 0;
            for &[a, b, c] in &mesh.triangles {
                let (pa, pb, pc) = (mesh.positions[a as usize], mesh.positions[b as usize], mesh.positions[c as usize]);
                let face = (pb - pa).cross(pc - pa);
                let radial = (pa + pb + pc) / 3.0 - center;
                if face.dot(radial) * outward > 0.0 {
                    agree += 1;
                }
            }
            assert!(agree * 20 >= mesh.triangle_count() * 19, "{agree} of {}", mesh.triangle_count());
        }
    }

    #[test]
    fn test_all_triangle_indices_are_valid() {
        let lattice = sphere_lattice(10, 3.3);
        let mesh = mesher(true).extract(&lattice, ChunkCoord::default(), Vec3::ZERO, 0.5).unwrap();
        let n = mesh.vertex_count() as u32;
        assert!(mesh.triangles.iter().flatten().all(|&i| i < n));
        assert!(mesh.triangles.iter().all(|t| t[0] != t[1] && t[1] != t[2] && t[0] != t[2]));
    }

    #[test]
    fn test_flat_shade_recomputes_normals() {
        let lattice = ChunkLattice::from_fn(2, |p| p.z as f32 - 0.5).unwrap();
        let flat = SurfaceMesher::new(MeshParams { flat_shade: true, invert_normals: false, interpolate: true }, 0.0);
        let mesh = flat.extract(&lattice, ChunkCoord::default(), Vec3::ZERO, 1.0).unwrap();
        for n in &mesh.normals {
            assert!((n.z.abs() - 1.0).abs() < 1e-5);
        }
    }
}
