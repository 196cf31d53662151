//! Device ID allocation
//!
//! IDs double as window ordering in viewers, so they are kept small: the
//! smallest free ID within a bounded window is handed out first. Once the
//! window is full, a counter starting just above it takes over.

use super::entry::DeviceId;

/// Allocator for device IDs
///
/// Not thread-safe on its own; the registry calls it under its write lock.
#[derive(Debug)]
pub struct IdAllocator {
    /// Largest ID considered by the smallest-free search
    window: u32,
    /// Next candidate once the window is exhausted
    next_overflow: u32,
}

impl IdAllocator {
    /// Create an allocator with the given search window
    pub fn new(window: u32) -> Self {
        Self {
            window,
            next_overflow: window.saturating_add(1),
        }
    }

    /// Hand out an ID for which `in_use` returns false
    pub fn allocate(&mut self, in_use: impl Fn(DeviceId) -> bool) -> DeviceId {
        if let Some(id) = (1..=self.window)
            .map(DeviceId::new)
            .find(|id| !in_use(*id))
        {
            return id;
        }

        loop {
            let candidate = DeviceId::new(self.next_overflow);
            self.next_overflow = self
                .next_overflow
                .checked_add(1)
                .unwrap_or(self.window.saturating_add(1));

            if !in_use(candidate) {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn used(ids: &[u32]) -> BTreeSet<DeviceId> {
        ids.iter().copied().map(DeviceId::new).collect()
    }

    #[test]
    fn test_starts_at_one() {
        let mut ids = IdAllocator::new(10);
        assert_eq!(ids.allocate(|_| false), DeviceId::new(1));
    }

    #[test]
    fn test_fills_smallest_gap() {
        let mut ids = IdAllocator::new(10);
        let taken = used(&[1, 2, 4, 5]);
        assert_eq!(ids.allocate(|id| taken.contains(&id)), DeviceId::new(3));
    }

    #[test]
    fn test_falls_back_past_window() {
        let mut ids = IdAllocator::new(3);
        let mut taken = used(&[1, 2, 3]);

        let a = ids.allocate(|id| taken.contains(&id));
        taken.insert(a);
        let b = ids.allocate(|id| taken.contains(&id));

        assert_eq!(a, DeviceId::new(4));
        assert_eq!(b, DeviceId::new(5));
    }

    #[test]
    fn test_fallback_skips_live_ids() {
        let mut ids = IdAllocator::new(2);
        let taken = used(&[1, 2, 3, 4]);
        assert_eq!(ids.allocate(|id| taken.contains(&id)), DeviceId::new(5));
    }

    #[test]
    fn test_window_reused_after_release() {
        let mut ids = IdAllocator::new(2);
        let mut taken = used(&[1, 2]);
        assert_eq!(ids.allocate(|id| taken.contains(&id)), DeviceId::new(3));

        taken.remove(&DeviceId::new(1));
        assert_eq!(ids.allocate(|id| taken.contains(&id)), DeviceId::new(1));
    }
}
