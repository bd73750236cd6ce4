//! Edge-keyed vertex deduplication

use std::sync::atomic::{AtomicU32, Ordering};

use glam::UVec3;

use super::tables::{CORNER_OFFSETS, EDGE_CORNERS};
use crate::core::{Error, Result};

const UNASSIGNED: u32 = u32::MAX;
const CLAIMED: u32 = u32::MAX - 1;

/// Order-independent identity of a lattice edge.
///
/// Built from integer lattice coordinates, so both endpoint orders and every
/// cell sharing the edge produce the same key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EdgeKey {
    /// Lower endpoint.
    pub origin: UVec3,
    /// Axis of the edge: 0 = x, 1 = y, 2 = z.
    pub axis: u8,
}

impl EdgeKey {
    /// Key for the edge joining two axis-adjacent lattice points.
    pub fn new(a: UVec3, b: UVec3) -> Self {
        let origin = a.min(b);
        let delta = a.max(b) - origin;
        debug_assert_eq!(delta.x + delta.y + delta.z, 1, "points {a} and {b} are not adjacent");
        let axis = if delta.x != 0 { 0 } else if delta.y != 0 { 1 } else { 2 };
        Self { origin, axis }
    }

    /// Key for local edge `edge` (0..12) of the cell whose minimum corner is `cell`.
    pub fn from_cell_edge(cell: UVec3, edge: usize) -> Self {
        let [a, b] = EDGE_CORNERS[edge];
        Self::new(
            cell + UVec3::from(CORNER_OFFSETS[a]),
            cell + UVec3::from(CORNER_OFFSETS[b]),
        )
    }

    /// Dense slot for this key in a lattice with `grid_res` points per axis.
    #[inline]
    pub fn slot(&self, grid_res: u32) -> usize {
        let n = grid_res as usize;
        let point = self.origin.x as usize + self.origin.y as usize * n + self.origin.z as usize * n * n;
        point * 3 + self.axis as usize
    }
}

/// Direct-mapped table from [`EdgeKey`] to vertex index.
///
/// Indices come from a shared monotonic counter; the first caller to claim
/// an edge gets its index and later claims are refused.
pub struct EdgeVertexTable {
    grid_res: u32,
    slots: Vec<AtomicU32>,
    next: AtomicU32,
}

impl EdgeVertexTable {
    pub fn new(grid_res: u32) -> Result<Self> {
        let n = grid_res as usize;
        let len = n * n * n * 3;
        let mut slots = Vec::new();
        slots.try_reserve_exact(len).map_err(|_| Error::ResourceExhausted {
            what: "edge vertex table",
            bytes: len.saturating_mul(std::mem::size_of::<AtomicU32>()),
        })?;
        slots.extend((0..len).map(|_| AtomicU32::new(UNASSIGNED)));
        Ok(Self {
            grid_res,
            slots,
            next: AtomicU32::new(0),
        })
    }

    /// Assign a vertex index to `key` unless someone already has.
    pub fn claim(&self, key: EdgeKey) -> Option<u32> {
        let slot = &self.slots[key.slot(self.grid_res)];
        slot.compare_exchange(UNASSIGNED, CLAIMED, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        let index = self.next.fetch_add(1, Ordering::AcqRel);
        slot.store(index, Ordering::Release);
        Some(index)
    }

    /// Vertex index of `key`, if one was assigned.
    pub fn get(&self, key: EdgeKey) -> Option<u32> {
        match self.slots.get(key.slot(self.grid_res))?.load(Ordering::Acquire) {
            UNASSIGNED | CLAIMED => None,
            index => Some(index),
        }
    }

    /// Number of vertex indices handed out.
    pub fn vertex_count(&self) -> u32 {
        self.next.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatch;

    #[test]
    fn test_key_is_order_independent() {
        let a = UVec3::new(2, 3, 4);
        let b = UVec3::new(2, 4, 4);
        assert_eq!(EdgeKey::new(a, b), EdgeKey::new(b, a));
        assert_eq!(EdgeKey::new(a, b).axis, 1);
        assert_eq!(EdgeKey::new(a, b).origin, a);
    }

    #[test]
    fn test_shared_edge_between_cells() {
        // Edge 1 of cell (0,0,0) joins (1,0,0)-(1,1,0); it is edge 3 of cell (1,0,0).
        let left = EdgeKey::from_cell_edge(UVec3::ZERO, 1);
        let right = EdgeKey::from_cell_edge(UVec3::new(1, 0, 0), 3);
        assert_eq!(left, right);
        assert_ne!(left.slot(4), EdgeKey::from_cell_edge(UVec3::ZERO, 3).slot(4));
    }

    #[test]
    fn test_first_claim_wins() {
        let table = EdgeVertexTable::new(4).unwrap();
        let key = EdgeKey::from_cell_edge(UVec3::new(1, 1, 1), 8);
        assert_eq!(table.get(key), None);
        assert_eq!(table.claim(key), Some(0));
        assert_eq!(table.claim(key), None);
        assert_eq!(table.get(key), Some(0));
        assert_eq!(table.vertex_count(), 1);
    }

    #[test]
    fn test_concurrent_claims_assign_once() {
        let table = EdgeVertexTable::new(3).unwrap();
        let key = EdgeKey::new(UVec3::new(0, 0, 0), UVec3::new(1, 0, 0));
        let winners = dispatch::map_indices(256, |_| table.claim(key).is_some());
        assert_eq!(winners.iter().filter(|w| **w).count(), 1);
        assert_eq!(table.vertex_count(), 1);
    }
}
