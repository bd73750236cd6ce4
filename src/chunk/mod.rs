//! Chunk addressing and per-chunk lattice sampling

pub mod descriptor;
pub mod sampler;

pub use descriptor::{ChunkCoord, ChunkDescriptor, ChunkLayout};
pub use sampler::{ChunkLattice, ChunkSampler};
