//! Core type aliases and re-exports

pub use glam::{
    Vec3,
    Mat4,
    IVec3, UVec3,
};

/// Standard Result type for the crate
pub type Result<T> = std::result::Result<T, crate::core::error::Error>;

/// Allocate a zero-filled buffer, reporting allocation failure instead of aborting.
pub fn try_alloc<T: Clone + Default>(len: usize, what: &'static str) -> Result<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| crate::core::error::Error::ResourceExhausted {
        what,
        bytes: len.saturating_mul(std::mem::size_of::<T>()),
    })?;
    buf.resize(len, T::default());
    Ok(buf)
}
