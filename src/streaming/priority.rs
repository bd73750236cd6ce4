//! Priority queue for chunk builds based on viewer distance

use crate::chunk::{ChunkCoord, ChunkLayout};
use crate::core::types::Vec3;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Priority information for a chunk
#[derive(Clone, Copy, Debug)]
pub struct ChunkPriority {
    pub coord: ChunkCoord,
    pub priority: f32, // Higher = more important
    pub distance: f32, // Distance from viewer to chunk center
}

impl ChunkPriority {
    /// Priority of a chunk for a viewer in planet space
    pub fn calculate(coord: ChunkCoord, layout: &ChunkLayout, viewer: Vec3) -> Self {
        let distance = viewer.distance(layout.center(coord));
        Self {
            coord,
            priority: 1.0 / (distance + 1.0),
            distance,
        }
    }
}

impl Eq for ChunkPriority {}

impl PartialEq for ChunkPriority {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Ord for ChunkPriority {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap on priority; equal priorities pop in ascending coordinate order
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.coord.cmp(&self.coord))
    }
}

impl PartialOrd for ChunkPriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Priority queue for chunk builds
pub struct ChunkPriorityQueue {
    heap: BinaryHeap<ChunkPriority>,
    max_distance: f32, // Don't queue chunks beyond this
}

impl ChunkPriorityQueue {
    pub fn new(max_distance: f32) -> Self {
        Self {
            heap: BinaryHeap::new(),
            max_distance,
        }
    }

    pub fn max_distance(&self) -> f32 {
        self.max_distance
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Add a chunk if it is within range
    pub fn push(&mut self, priority: ChunkPriority) {
        if priority.distance <= self.max_distance {
            self.heap.push(priority);
        }
    }

    /// Highest priority chunk
    pub fn pop(&mut self) -> Option<ChunkPriority> {
        self.heap.pop()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Rebuild the queue from `candidates`, skipping those `skip` rejects.
    pub fn update<F>(&mut self, candidates: &[ChunkCoord], layout: &ChunkLayout, viewer: Vec3, skip: F)
    where
        F: Fn(ChunkCoord) -> bool,
    {
        self.clear();
        for &coord in candidates {
            if skip(coord) {
                continue;
            }
            self.push(ChunkPriority::calculate(coord, layout, viewer));
        }
    }
}
