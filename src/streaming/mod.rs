//! Chunk streaming around a viewer
//!
//! The controller decides which chunks are live, builds them through the
//! sampler and mesher under a per-tick budget, and hands finished meshes to a
//! [`MeshSink`](crate::mesh::MeshSink).

pub mod candidates;
pub mod priority;
pub mod budget;
pub mod lod;
pub mod chunk_builder;
pub mod controller;

pub use candidates::CandidateWindow;
pub use priority::{ChunkPriority, ChunkPriorityQueue};
pub use budget::{BuildBudget, MemoryBudget};
pub use lod::{LodBand, LodChoice, LodPolicy};
pub use chunk_builder::{build_chunk, BuildRequest, BuildResult, ChunkBuilder};
pub use controller::{StreamingController, TickReport};
