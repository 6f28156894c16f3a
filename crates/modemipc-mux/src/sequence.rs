//! Sequence id allocation.

use std::fmt;

/// Lowest valid sequence id. 0 means "no id".
pub const MIN_SEQUENCE: u8 = 1;
/// Highest valid sequence id. 255 is the broadcast/none marker.
pub const MAX_SEQUENCE: u8 = 254;

/// A sequence id in [1, 254] tagging one outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequenceId(u8);

impl SequenceId {
    /// Accepts only values in the valid range.
    pub fn new(raw: u8) -> Option<Self> {
        Self::is_valid(raw).then_some(Self(raw))
    }

    pub fn is_valid(raw: u8) -> bool {
        (MIN_SEQUENCE..=MAX_SEQUENCE).contains(&raw)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Cycles through [1, 254], skipping ids the caller reports as in use.
#[derive(Debug, Clone)]
pub struct SequenceAllocator {
    next: u8,
}

impl SequenceAllocator {
    pub fn new() -> Self {
        Self { next: MIN_SEQUENCE }
    }

    /// The next id not in use, or `None` when all 254 are taken.
    pub fn allocate(&mut self, in_use: impl Fn(SequenceId) -> bool) -> Option<SequenceId> {
        for _ in MIN_SEQUENCE..=MAX_SEQUENCE {
            let candidate = SequenceId(self.next);
            self.next = if self.next >= MAX_SEQUENCE {
                MIN_SEQUENCE
            } else {
                self.next + 1
            };
            if !in_use(candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

impl Default for SequenceAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn wraps_after_254_without_touching_reserved_values() {
        let mut alloc = SequenceAllocator::new();
        let ids: Vec<u8> = (0..254)
            .map(|_| alloc.allocate(|_| false).unwrap().get())
            .collect();
        assert_eq!(ids.first(), Some(&1));
        assert_eq!(ids.last(), Some(&254));

        let wrapped = alloc.allocate(|_| false).unwrap();
        assert_eq!(wrapped.get(), 1);
    }

    #[test]
    fn skips_outstanding_ids() {
        let mut alloc = SequenceAllocator::new();
        let busy: HashSet<u8> = [1, 2, 4].into_iter().collect();

        let first = alloc.allocate(|id| busy.contains(&id.get())).unwrap();
        let second = alloc.allocate(|id| busy.contains(&id.get())).unwrap();
        assert_eq!(first.get(), 3);
        assert_eq!(second.get(), 5);
    }

    #[test]
    fn exhausted_when_everything_is_outstanding() {
        let mut alloc = SequenceAllocator::new();
        assert!(alloc.allocate(|_| true).is_none());
    }

    #[test]
    fn validity_range() {
        assert!(SequenceId::new(0).is_none());
        assert!(SequenceId::new(255).is_none());
        assert_eq!(SequenceId::new(1).map(SequenceId::get), Some(1));
        assert_eq!(SequenceId::new(254).map(SequenceId::get), Some(254));
    }
}
