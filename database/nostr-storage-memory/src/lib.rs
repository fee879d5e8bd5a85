// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Memory (RAM) storage backend

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]
#![allow(clippy::mutable_key_type)] // Needed to suppress false positive for `BTreeSet<Arc<Event>>`
#![doc = include_str!("../README.md")]

use std::num::NonZeroUsize;

use nostr_storage::prelude::*;
use tokio::sync::RwLock;

pub mod prelude;
mod store;

use self::store::MemoryStore;

/// In-memory database options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryOptions {
    /// Keep at most this many events, evicting the oldest ones (default: unbounded)
    pub capacity: Option<NonZeroUsize>,
    /// Apply deletion requests (kind 5) to the stored events (default: `true`)
    pub process_deletions: bool,
}

impl Default for MemoryOptions {
    fn default() -> Self {
        Self {
            capacity: None,
            process_deletions: true,
        }
    }
}

impl MemoryOptions {
    /// Cap the number of stored events
    #[inline]
    pub fn capacity(mut self, max: NonZeroUsize) -> Self {
        self.capacity = Some(max);
        self
    }

    /// Store deletion requests as plain events without applying them
    #[inline]
    pub fn ignore_deletions(mut self) -> Self {
        self.process_deletions = false;
        self
    }
}

/// Memory Database (RAM)
#[derive(Debug)]
pub struct MemoryDatabase {
    store: RwLock<MemoryStore>,
}

impl Default for MemoryDatabase {
    #[inline]
    fn default() -> Self {
        Self::unbounded()
    }
}

impl MemoryDatabase {
    /// Database without a capacity limit
    #[inline]
    pub fn unbounded() -> Self {
        Self::with_options(MemoryOptions::default())
    }

    /// Database holding at most `max` events
    #[inline]
    pub fn bounded(max: NonZeroUsize) -> Self {
        Self::with_options(MemoryOptions::default().capacity(max))
    }

    /// Database with custom options
    pub fn with_options(opts: MemoryOptions) -> Self {
        Self {
            store: RwLock::new(MemoryStore::new(opts)),
        }
    }
}

impl NostrDatabase for MemoryDatabase {
    fn backend(&self) -> Backend {
        Backend::Memory
    }

    fn features(&self) -> Features {
        Features {
            persistent: false,
            event_expiration: false,
            full_text_search: true,
        }
    }

    fn save_event<'a>(
        &'a self,
        event: &'a Event,
    ) -> BoxedFuture<'a, Result<SaveEventStatus, DatabaseError>> {
        Box::pin(async move {
            if let Err(e) = event.verify() {
                tracing::debug!(id = %event.id, error = %e, "Rejected invalid event");
                return Ok(SaveEventStatus::Rejected(RejectedReason::Invalid));
            }

            let mut store = self.store.write().await;
            let status: SaveEventStatus = store.index_event(event);
            tracing::trace!(id = %event.id, ?status, "Indexed event");
            Ok(status)
        })
    }

    fn check_id<'a>(
        &'a self,
        event_id: &'a EventId,
    ) -> BoxedFuture<'a, Result<DatabaseEventStatus, DatabaseError>> {
        Box::pin(async move {
            let store = self.store.read().await;

            if store.has_event_id_been_deleted(event_id) {
                Ok(DatabaseEventStatus::Deleted)
            } else if store.has_event(event_id) {
                Ok(DatabaseEventStatus::Saved)
            } else {
                Ok(DatabaseEventStatus::NotExistent)
            }
        })
    }

    fn event_by_id<'a>(
        &'a self,
        event_id: &'a EventId,
    ) -> BoxedFuture<'a, Result<Option<Event>, DatabaseError>> {
        Box::pin(async move {
            let store = self.store.read().await;
            Ok(store.event_by_id(event_id).cloned())
        })
    }

    fn count(&self, filter: Filter) -> BoxedFuture<'_, Result<usize, DatabaseError>> {
        Box::pin(async move {
            let store = self.store.read().await;
            Ok(store.count(filter))
        })
    }

    fn query(&self, filter: Filter) -> BoxedFuture<'_, Result<Events, DatabaseError>> {
        Box::pin(async move {
            let store = self.store.read().await;
            let mut events = Events::new(&filter);
            events.extend(store.query(filter).cloned());
            Ok(events)
        })
    }

    fn sync_items(&self, filter: Filter) -> BoxedFuture<'_, Result<Vec<EventId>, DatabaseError>> {
        Box::pin(async move {
            let store = self.store.read().await;
            Ok(store.sync_items(filter))
        })
    }

    fn delete(&self, filter: Filter) -> BoxedFuture<'_, Result<(), DatabaseError>> {
        Box::pin(async move {
            let mut store = self.store.write().await;
            store.delete(filter);
            Ok(())
        })
    }

    fn wipe(&self) -> BoxedFuture<'_, Result<(), DatabaseError>> {
        Box::pin(async move {
            let mut store = self.store.write().await;
            store.clear();
            Ok(())
        })
    }
}
