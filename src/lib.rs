//! Planetoid - procedural planet terrain
//!
//! A planet is a signed density field on a cubic lattice. Chunks of the
//! lattice are sampled, optionally upsampled, and polygonized with marching
//! cubes; particle and thermal erosion reshape the field; a streaming
//! controller keeps the chunks near a viewer meshed.

pub mod core;
pub mod math;
pub mod config;
pub mod field;
pub mod terrain;
pub mod chunk;
pub mod mesh;
pub mod erosion;
pub mod streaming;
pub mod planet;

pub use config::PlanetConfig;
pub use core::{Error, Result};
pub use planet::{ErosionSummary, Planet};
