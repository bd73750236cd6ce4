//! Surface extraction

pub mod tables;
pub mod edge;
pub mod chunk_mesh;
pub mod mesher;

pub use edge::{EdgeKey, EdgeVertexTable};
pub use chunk_mesh::{ChunkMesh, MeshSink, NullSink, CollectingSink, MeshStats};
pub use mesher::SurfaceMesher;
