// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Events collection

use std::collections::btree_set::IntoIter;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use nostr_core::{Event, Filter};

/// Newest-first collection of events, bounded by the filter `limit`
#[derive(Debug, Clone)]
pub struct Events {
    set: BTreeSet<Event>,
    limit: Option<usize>,
    hash: u64,
}

impl PartialEq for Events {
    fn eq(&self, other: &Self) -> bool {
        self.set == other.set
    }
}

impl Eq for Events {}

impl Events {
    /// New collection for the results of `filter`
    pub fn new(filter: &Filter) -> Self {
        let mut hasher = DefaultHasher::new();
        filter.hash(&mut hasher);

        Self {
            set: BTreeSet::new(),
            limit: filter.limit,
            hash: hasher.finish(),
        }
    }

    /// Returns the number of events in the collection.
    #[inline]
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// Check if the collection is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Check if contains [`Event`]
    #[inline]
    pub fn contains(&self, event: &Event) -> bool {
        self.set.contains(event)
    }

    /// Insert [`Event`]
    ///
    /// Returns `true` if the event is in the collection after the insertion: an event older than
    /// everything in a full collection is discarded.
    pub fn insert(&mut self, event: Event) -> bool {
        let id = event.id;
        let inserted: bool = self.set.insert(event);
        self.truncate();
        inserted && self.set.iter().any(|e| e.id == id)
    }

    /// Insert events
    pub fn extend<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = Event>,
    {
        self.set.extend(events);
        self.truncate();
    }

    /// Merge two collections
    ///
    /// The limit is kept only if both collections come from the same filter, otherwise the
    /// result is unbounded.
    pub fn merge(mut self, other: Self) -> Self {
        if self.hash != other.hash {
            self.limit = None;
            self.hash = 0;
        }

        self.extend(other.set);
        self
    }

    /// Get first (newest) [`Event`]
    #[inline]
    pub fn first(&self) -> Option<&Event> {
        self.set.first()
    }

    /// Get first (newest) [`Event`]
    #[inline]
    pub fn first_owned(self) -> Option<Event> {
        self.into_iter().next()
    }

    /// Get last (oldest) [`Event`]
    #[inline]
    pub fn last(&self) -> Option<&Event> {
        self.set.last()
    }

    /// Iterate events, newest first
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.set.iter()
    }

    /// Convert the collection to vector of events.
    #[inline]
    pub fn to_vec(self) -> Vec<Event> {
        self.into_iter().collect()
    }

    fn truncate(&mut self) {
        if let Some(limit) = self.limit {
            while self.set.len() > limit {
                self.set.pop_last();
            }
        }
    }
}

impl IntoIterator for Events {
    type Item = Event;
    type IntoIter = IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.set.into_iter()
    }
}

impl<'a> IntoIterator for &'a Events {
    type Item = &'a Event;
    type IntoIter = std::collections::btree_set::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.set.iter()
    }
}

#[cfg(test)]
mod tests {
    use nostr_core::{EventBuilder, Keys, Timestamp};

    use super::*;

    fn note(keys: &Keys, secs: u64) -> Event {
        EventBuilder::text_note(format!("note {secs}"))
            .custom_created_at(Timestamp::from_secs(secs))
            .sign_with_keys(keys)
            .unwrap()
    }

    #[test]
    fn test_newest_first_with_limit() {
        let keys = Keys::generate();
        let mut events = Events::new(&Filter::new().limit(2));
        assert!(events.insert(note(&keys, 10)));
        assert!(events.insert(note(&keys, 30)));
        assert!(events.insert(note(&keys, 20)));
        // Older than everything in a full collection
        assert!(!events.insert(note(&keys, 5)));

        let secs: Vec<u64> = events.iter().map(|e| e.created_at.as_secs()).collect();
        assert_eq!(secs, vec![30, 20]);
    }

    #[test]
    fn test_merge() {
        let keys = Keys::generate();
        let filter = Filter::new().limit(2);

        let mut a = Events::new(&filter);
        a.extend([note(&keys, 1), note(&keys, 2)]);
        let mut b = Events::new(&filter);
        b.extend([note(&keys, 3), note(&keys, 2)]);

        let merged = a.clone().merge(b);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.first().unwrap().created_at.as_secs(), 3);

        // Different filters: limit dropped
        let mut c = Events::new(&Filter::new());
        c.insert(note(&keys, 4));
        assert_eq!(a.merge(c).len(), 3);
    }
}
