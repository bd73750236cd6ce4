//! Data-parallel kernel dispatch
//!
//! Every pass over lattice points, cube cells or particles goes through these
//! helpers. Each call returns only after all elements have been processed, so
//! the return is the read-after-write barrier between passes.

use rayon::prelude::*;

/// Run `kernel` once for every index in `0..count`.
pub fn for_each_index<F>(count: usize, kernel: F)
where
    F: Fn(usize) + Sync + Send,
{
    (0..count).into_par_iter().for_each(kernel);
}

/// Run `kernel` for every index and collect the results in index order.
pub fn map_indices<T, F>(count: usize, kernel: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    (0..count).into_par_iter().map(kernel).collect()
}

/// Run `kernel` over every index and gather all emitted items.
///
/// Item order across indices is unspecified beyond what rayon's collect gives.
pub fn flat_map_indices<T, I, F>(count: usize, kernel: F) -> Vec<T>
where
    T: Send,
    I: IntoIterator<Item = T>,
    F: Fn(usize) -> I + Sync + Send,
{
    (0..count)
        .into_par_iter()
        .flat_map_iter(kernel)
        .collect()
}

/// Fill `out` in parallel, one element per index.
pub fn fill_indexed<T, F>(out: &mut [T], kernel: F)
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    out.par_iter_mut()
        .enumerate()
        .for_each(|(i, slot)| *slot = kernel(i));
}

/// Update `out` in parallel, one element per index.
pub fn update_indexed<T, F>(out: &mut [T], kernel: F)
where
    T: Send,
    F: Fn(usize, &mut T) + Sync + Send,
{
    out.par_iter_mut()
        .enumerate()
        .for_each(|(i, slot)| kernel(i, slot));
}

/// Map every index and fold the results with an associative `reduce`.
pub fn reduce_indices<T, F, R>(count: usize, identity: T, kernel: F, reduce: R) -> T
where
    T: Clone + Send + Sync,
    F: Fn(usize) -> T + Sync + Send,
    R: Fn(T, T) -> T + Sync + Send,
{
    (0..count)
        .into_par_iter()
        .map(kernel)
        .reduce(|| identity.clone(), reduce)
}
