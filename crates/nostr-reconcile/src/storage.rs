// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Sorted ID storage

use std::ops::Range;

use crate::error::Error;
use crate::frame::{Bound, Fingerprint, Id};

/// Sorted set of IDs
///
/// Insert all the items, then [`Storage::seal`] before reconciling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Storage {
    items: Vec<Id>,
    sealed: bool,
}

impl Storage {
    /// New empty storage
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// New empty storage with capacity
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            sealed: false,
        }
    }

    /// Add an item
    pub fn insert(&mut self, id: Id) -> Result<(), Error> {
        if self.sealed {
            return Err(Error::AlreadySealed);
        }
        self.items.push(id);
        Ok(())
    }

    /// Sort and deduplicate the items
    pub fn seal(&mut self) -> Result<(), Error> {
        if self.sealed {
            return Err(Error::AlreadySealed);
        }
        self.items.sort_unstable();
        self.items.dedup();
        self.sealed = true;
        Ok(())
    }

    /// Check if sealed
    #[inline]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Number of items
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn items(&self, range: Range<usize>) -> &[Id] {
        &self.items[range]
    }

    /// Index of the first item not lower than `bound`
    pub(crate) fn find(&self, bound: &Bound) -> usize {
        match bound {
            Bound::Min => 0,
            Bound::Id(id) => self.items.partition_point(|item| item < id),
            Bound::Max => self.items.len(),
        }
    }

    /// Indexes of the items within `[lower, upper)`
    pub(crate) fn range(&self, lower: &Bound, upper: &Bound) -> Range<usize> {
        let start: usize = self.find(lower);
        let end: usize = self.find(upper).max(start);
        start..end
    }

    pub(crate) fn fingerprint(&self, range: Range<usize>) -> Fingerprint {
        Fingerprint::compute(self.items(range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(b: u8) -> Id {
        [b; 32]
    }

    #[test]
    fn test_seal_sorts_and_dedups() {
        let mut storage = Storage::new();
        storage.insert(id(3)).unwrap();
        storage.insert(id(1)).unwrap();
        storage.insert(id(3)).unwrap();
        storage.seal().unwrap();

        assert_eq!(storage.len(), 2);
        assert_eq!(storage.items(0..2), &[id(1), id(3)]);

        assert_eq!(storage.insert(id(4)), Err(Error::AlreadySealed));
        assert_eq!(storage.seal(), Err(Error::AlreadySealed));
    }

    #[test]
    fn test_range() {
        let mut storage = Storage::new();
        for b in [10, 20, 30, 40] {
            storage.insert(id(b)).unwrap();
        }
        storage.seal().unwrap();

        assert_eq!(storage.range(&Bound::Min, &Bound::Max), 0..4);
        assert_eq!(storage.range(&Bound::Id(id(20)), &Bound::Id(id(40))), 1..3);
        assert_eq!(storage.range(&Bound::Id(id(21)), &Bound::Max), 2..4);
        assert_eq!(storage.range(&Bound::Id(id(50)), &Bound::Max), 4..4);
    }
}
