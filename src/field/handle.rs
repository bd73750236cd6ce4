//! Shared ownership of the planet's density field

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::density::DensityField;

/// Cloneable handle to the one density field of a planet.
///
/// Readers (sampler, mesher) take shared guards. Erosion takes the exclusive
/// guard for a whole pass and accumulates through atomics inside it, so a
/// mesh build never observes a half-finished pass. Every exclusive access
/// bumps the generation, so meshes built from an earlier field can be told
/// apart from current ones.
#[derive(Clone)]
pub struct FieldHandle {
    field: Arc<RwLock<DensityField>>,
    generation: Arc<AtomicU64>,
}

impl FieldHandle {
    pub fn new(field: DensityField) -> Self {
        Self {
            field: Arc::new(RwLock::new(field)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared read access.
    pub fn read(&self) -> RwLockReadGuard<'_, DensityField> {
        self.field.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive access for a mutating pass. Bumps the generation.
    pub fn write(&self) -> RwLockWriteGuard<'_, DensityField> {
        let guard = self.field.write().unwrap_or_else(PoisonError::into_inner);
        // Bumped under the guard: a reader holding a read guard sees a stable value
        self.generation.fetch_add(1, Ordering::AcqRel);
        guard
    }

    /// Swap in a freshly built field.
    pub fn replace(&self, field: DensityField) {
        *self.write() = field;
    }

    /// Incremented on every exclusive access, including replacement.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldGeometry, FieldRead, FieldWrite};

    #[test]
    fn test_replace_bumps_generation() {
        let geometry = FieldGeometry::centered(4, 2.0);
        let handle = FieldHandle::new(DensityField::new(geometry).unwrap());
        let clone = handle.clone();
        assert_eq!(handle.generation(), 0);

        let replacement = DensityField::from_values(geometry, vec![1.0; geometry.len()]).unwrap();
        handle.replace(replacement);

        assert_eq!(clone.generation(), 1);
        assert_eq!(clone.read().value(0), 1.0);
    }

    #[test]
    fn test_write_bumps_generation_and_read_does_not() {
        let geometry = FieldGeometry::centered(4, 2.0);
        let handle = FieldHandle::new(DensityField::new(geometry).unwrap());

        drop(handle.read());
        assert_eq!(handle.generation(), 0);

        handle.write().overwrite_with(|_| 5.0);
        assert_eq!(handle.generation(), 1);
        assert_eq!(handle.read().value(0), 5.0);
    }
}
