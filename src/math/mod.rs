//! Mathematical utilities

pub mod aabb;
pub mod interp;

pub use aabb::Aabb;
pub use interp::{lerp, smoothstep, trilinear, trilinear_weights};
