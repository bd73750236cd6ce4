//! Global density lattice shared by synthesis, sampling, meshing and erosion

pub mod geometry;
pub mod density;
pub mod handle;

pub use geometry::FieldGeometry;
pub use density::{
    DensityField, FieldSnapshot, FieldRead, FieldWrite, FieldAccumulate,
    DENSITY_LIMIT, sanitize,
};
pub use handle::FieldHandle;
