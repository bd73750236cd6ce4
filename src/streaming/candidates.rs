//! Which chunk coordinates can ever hold terrain

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::chunk::{ChunkCoord, ChunkLayout};

/// Filter applied to the chunk grid before ranking.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateWindow {
    /// Chunks whose bounds meet the band `radius ± radial_range` around
    /// the planet center.
    #[default]
    Shell,
    /// Chunks closer than `half_extent` chunk widths to the planet center
    /// on every axis.
    Cube { half_extent: i32 },
    /// Every chunk of the grid.
    Full,
}

impl CandidateWindow {
    /// Whether `coord` passes the window.
    pub fn admits(&self, layout: &ChunkLayout, coord: ChunkCoord, radius: f32, radial_range: f32) -> bool {
        match *self {
            CandidateWindow::Full => true,
            CandidateWindow::Cube { half_extent } => {
                let bounds = layout.bounds(coord);
                let gap = bounds.min.max(-bounds.max).max(Vec3::ZERO).max_element();
                gap < half_extent as f32 * layout.chunk_size()
            }
            CandidateWindow::Shell => {
                // A zero-width band still meets every chunk the sphere passes
                // through, which is a single layer.
                let bounds = layout.bounds(coord);
                let inner = (radius - radial_range.abs()).max(0.0);
                let outer = radius + radial_range.abs();
                bounds.distance_to_point(Vec3::ZERO) <= outer
                    && bounds.max_distance_to_point(Vec3::ZERO) >= inner
            }
        }
    }

    /// All admitted coordinates in lattice order.
    pub fn candidates(&self, layout: &ChunkLayout, radius: f32, radial_range: f32) -> Vec<ChunkCoord> {
        let n = layout.chunks_per_axis();
        let mut out = Vec::new();
        for z in 0..n {
            for y in 0..n {
                for x in 0..n {
                    let coord = ChunkCoord::new(x, y, z);
                    if self.admits(layout, coord, radius, radial_range) {
                        out.push(coord);
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldGeometry;

    fn layout() -> ChunkLayout {
        // 8 chunks of 10 world units per axis, spanning ±40.
        ChunkLayout::new(FieldGeometry::centered(32, 40.0), 4).unwrap()
    }

    #[test]
    fn test_full_window_is_whole_grid() {
        let coords = CandidateWindow::Full.candidates(&layout(), 20.0, 5.0);
        assert_eq!(coords.len(), 512);
    }

    #[test]
    fn test_shell_excludes_core_and_corners() {
        let layout = layout();
        let coords = CandidateWindow::Shell.candidates(&layout, 25.0, 5.0);
        assert!(!coords.is_empty());
        assert!(coords.len() < 512);
        // Chunks touching the center lie inside the inner radius.
        assert!(!coords.contains(&ChunkCoord::new(3, 3, 3)));
        assert!(!coords.contains(&ChunkCoord::new(0, 0, 0)));
        for coord in &coords {
            let b = layout.bounds(*coord);
            assert!(b.distance_to_point(Vec3::ZERO) <= 30.0);
            assert!(b.max_distance_to_point(Vec3::ZERO) >= 20.0);
        }
    }

    #[test]
    fn test_thin_shell_admits_one_layer() {
        let layout = layout();
        let coords = CandidateWindow::Shell.candidates(&layout, 25.0, 0.0);
        assert!(!coords.is_empty());
        // Along +x only the chunk spanning x in [20, 30] meets the sphere.
        let on_axis: Vec<_> = coords.iter().filter(|c| c.y == 3 && c.z == 3 && c.x >= 4).collect();
        assert_eq!(on_axis, vec![&ChunkCoord::new(6, 3, 3)]);
    }

    #[test]
    fn test_cube_window() {
        let layout = layout();
        let none = CandidateWindow::Cube { half_extent: 0 }.candidates(&layout, 0.0, 0.0);
        assert!(none.is_empty());
        let inner = CandidateWindow::Cube { half_extent: 1 }.candidates(&layout, 0.0, 0.0);
        assert_eq!(inner.len(), 8);
        let all = CandidateWindow::Cube { half_extent: 4 }.candidates(&layout, 0.0, 0.0);
        assert_eq!(all.len(), 512);
    }

    #[test]
    fn test_window_serde() {
        let json = serde_json::to_string(&CandidateWindow::Cube { half_extent: 3 }).unwrap();
        let back: CandidateWindow = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CandidateWindow::Cube { half_extent: 3 });
        let shell: CandidateWindow = serde_json::from_str("\"Shell\"").unwrap();
        assert_eq!(shell, CandidateWindow::Shell);
    }
}
