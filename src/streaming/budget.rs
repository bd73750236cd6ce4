//! Per-tick build throttle and live mesh memory accounting
//!
//! The build budget is the streaming backpressure: a tick never starts more
//! builds than it allows, and whatever is left stays a candidate for the next
//! tick. Mesh memory is tracked so callers can cap how much geometry stays
//! resident.

/// Number of chunk builds allowed in one tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuildBudget {
    per_tick: usize,
    spent: usize,
}

impl BuildBudget {
    pub fn new(per_tick: usize) -> Self {
        Self { per_tick, spent: 0 }
    }

    /// Start a new tick.
    pub fn reset(&mut self) {
        self.spent = 0;
    }

    /// Take one build slot if any are left.
    pub fn try_spend(&mut self) -> bool {
        if self.spent < self.per_tick {
            self.spent += 1;
            true
        } else {
            false
        }
    }

    pub fn remaining(&self) -> usize {
        self.per_tick - self.spent
    }

    pub fn spent(&self) -> usize {
        self.spent
    }

    pub fn per_tick(&self) -> usize {
        self.per_tick
    }
}

/// Memory held by live chunk meshes.
///
/// A budget of zero bytes means unlimited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryBudget {
    budget_bytes: usize,
    used_bytes: usize,
}

impl MemoryBudget {
    /// Create a budget of `budget_mb` megabytes.
    pub fn new(budget_mb: usize) -> Self {
        Self::from_bytes(budget_mb.saturating_mul(1024 * 1024))
    }

    pub fn from_bytes(budget_bytes: usize) -> Self {
        Self { budget_bytes, used_bytes: 0 }
    }

    /// Change the cap, keeping tracked usage.
    pub fn set_limit(&mut self, budget_bytes: usize) {
        self.budget_bytes = budget_bytes;
    }

    pub fn add(&mut self, bytes: usize) {
        self.used_bytes = self.used_bytes.saturating_add(bytes);
    }

    pub fn remove(&mut self, bytes: usize) {
        self.used_bytes = self.used_bytes.saturating_sub(bytes);
    }

    /// Forget all tracked usage.
    pub fn clear(&mut self) {
        self.used_bytes = 0;
    }

    pub fn used(&self) -> usize {
        self.used_bytes
    }

    pub fn is_unlimited(&self) -> bool {
        self.budget_bytes == 0
    }

    /// Bytes left, `usize::MAX` when unlimited.
    pub fn available(&self) -> usize {
        if self.is_unlimited() {
            usize::MAX
        } else {
            self.budget_bytes.saturating_sub(self.used_bytes)
        }
    }

    /// Usage as a fraction of the budget (0.0 to 1.0+).
    pub fn pressure(&self) -> f32 {
        if self.is_unlimited() {
            return 0.0;
        }
        self.used_bytes as f32 / self.budget_bytes as f32
    }

    /// Whether new builds should wait for memory to be released.
    pub fn is_exhausted(&self) -> bool {
        !self.is_unlimited() && self.available() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_budget_spends_exactly() {
        let mut budget = BuildBudget::new(3);
        let granted = (0..10).filter(|_| budget.try_spend()).count();
        assert_eq!(granted, 3);
        assert_eq!(budget.remaining(), 0);

        budget.reset();
        assert_eq!(budget.remaining(), 3);
        assert_eq!(budget.spent(), 0);
    }

    #[test]
    fn test_zero_budget_grants_nothing() {
        let mut budget = BuildBudget::new(0);
        assert!(!budget.try_spend());
    }

    #[test]
    fn test_memory_tracking() {
        let mut budget = MemoryBudget::new(1);
        budget.add(512 * 1024);
        assert_eq!(budget.used(), 512 * 1024);
        assert!((budget.pressure() - 0.5).abs() < 1e-6);
        assert_eq!(budget.available(), 512 * 1024);

        budget.add(512 * 1024);
        assert!(budget.is_exhausted());

        budget.remove(usize::MAX);
        assert_eq!(budget.used(), 0);
        assert!(!budget.is_exhausted());
    }

    #[test]
    fn test_limit_change_keeps_usage() {
        let mut budget = MemoryBudget::from_bytes(100);
        budget.add(80);
        budget.set_limit(50);
        assert!(budget.is_exhausted());
        budget.set_limit(0);
        assert!(budget.is_unlimited());
        assert_eq!(budget.used(), 80);
    }

    #[test]
    fn test_unlimited_memory() {
        let mut budget = MemoryBudget::new(0);
        budget.add(usize::MAX);
        budget.add(100);
        assert_eq!(budget.used(), usize::MAX);
        assert!(!budget.is_exhausted());
        assert_eq!(budget.pressure(), 0.0);
        assert_eq!(budget.available(), usize::MAX);
    }
}
