// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Nostr Storage

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]
#![doc = include_str!("../README.md")]

use std::fmt;
use std::sync::Arc;

pub use nostr_core;
use nostr_core::util::BoxedFuture;
use nostr_core::{Event, EventId, Filter};

mod error;
pub mod events;
pub mod prelude;

pub use self::error::DatabaseError;
pub use self::events::Events;

/// Backend
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Memory
    Memory,
    /// Custom
    Custom(String),
}

/// Database features
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Features {
    /// The database persists events across restarts
    pub persistent: bool,
    /// Expired events are removed automatically
    pub event_expiration: bool,
    /// `search` filters are supported
    pub full_text_search: bool,
}

/// Database event status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DatabaseEventStatus {
    /// The event is saved into the database
    Saved,
    /// The event is marked as deleted
    Deleted,
    /// The event doesn't exist
    NotExistent,
}

/// Reason why event wasn't stored into the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RejectedReason {
    /// Ephemeral events aren't expected to be stored
    Ephemeral,
    /// The event already exists
    Duplicate,
    /// The event was deleted
    Deleted,
    /// The event is expired
    Expired,
    /// The event was replaced
    Replaced,
    /// Attempt to delete a non-owned event
    InvalidDelete,
    /// The event is malformed (i.e. addressable event without identifier)
    Invalid,
    /// Other reason
    Other,
}

impl fmt::Display for RejectedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ephemeral => write!(f, "ephemeral event"),
            Self::Duplicate => write!(f, "already have this event"),
            Self::Deleted => write!(f, "this event is deleted"),
            Self::Expired => write!(f, "event is expired"),
            Self::Replaced => write!(f, "replaced by a newer event"),
            Self::InvalidDelete => write!(f, "can't delete events of other authors"),
            Self::Invalid => write!(f, "malformed event"),
            Self::Other => write!(f, "unknown"),
        }
    }
}

/// Save event status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SaveEventStatus {
    /// The event has been successfully saved
    Success,
    /// The event has been rejected
    Rejected(RejectedReason),
}

impl SaveEventStatus {
    /// Check if event is successfully saved
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

#[doc(hidden)]
pub trait IntoNostrDatabase {
    fn into_nostr_database(self) -> Arc<dyn NostrDatabase>;
}

impl IntoNostrDatabase for Arc<dyn NostrDatabase> {
    fn into_nostr_database(self) -> Arc<dyn NostrDatabase> {
        self
    }
}

impl<T> IntoNostrDatabase for T
where
    T: NostrDatabase + Sized + 'static,
{
    fn into_nostr_database(self) -> Arc<dyn NostrDatabase> {
        Arc::new(self)
    }
}

impl<T> IntoNostrDatabase for Arc<T>
where
    T: NostrDatabase + 'static,
{
    fn into_nostr_database(self) -> Arc<dyn NostrDatabase> {
        self
    }
}

/// Nostr events database
///
/// Implementations must be internally synchronized: every method takes `&self`.
pub trait NostrDatabase: fmt::Debug + Send + Sync {
    /// Name of the backend
    fn backend(&self) -> Backend;

    /// Supported features
    fn features(&self) -> Features;

    /// Save [`Event`] into store
    ///
    /// Saving an already stored event returns [`RejectedReason::Duplicate`] without touching
    /// the store.
    ///
    /// **This method assumes that [`Event`] was already verified**
    fn save_event<'a>(
        &'a self,
        event: &'a Event,
    ) -> BoxedFuture<'a, Result<SaveEventStatus, DatabaseError>>;

    /// Check event status by ID
    ///
    /// Check if the event is saved, deleted or not existent.
    fn check_id<'a>(
        &'a self,
        event_id: &'a EventId,
    ) -> BoxedFuture<'a, Result<DatabaseEventStatus, DatabaseError>>;

    /// Get [`Event`] by [`EventId`]
    fn event_by_id<'a>(
        &'a self,
        event_id: &'a EventId,
    ) -> BoxedFuture<'a, Result<Option<Event>, DatabaseError>>;

    /// Count the events matching the [`Filter`]
    ///
    /// Use `Filter::new()` or `Filter::default()` to count all events.
    fn count(&self, filter: Filter) -> BoxedFuture<'_, Result<usize, DatabaseError>>;

    /// Query the events matching the [`Filter`], newest first
    fn query(&self, filter: Filter) -> BoxedFuture<'_, Result<Events, DatabaseError>>;

    /// Get the IDs of the events matching the [`Filter`], for reconciliation
    fn sync_items(&self, filter: Filter) -> BoxedFuture<'_, Result<Vec<EventId>, DatabaseError>> {
        Box::pin(async move {
            let events: Events = self.query(filter).await?;
            Ok(events.into_iter().map(|e| e.id).collect())
        })
    }

    /// Delete all events that match the [`Filter`]
    fn delete(&self, filter: Filter) -> BoxedFuture<'_, Result<(), DatabaseError>>;

    /// Wipe all data
    fn wipe(&self) -> BoxedFuture<'_, Result<(), DatabaseError>>;
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use nostr_core::{EventBuilder, Keys};
    use tokio::sync::RwLock;

    use super::*;

    /// Smallest possible backend: only implements the required methods.
    #[derive(Debug, Default)]
    struct MapDatabase {
        events: RwLock<HashMap<EventId, Event>>,
    }

    impl NostrDatabase for MapDatabase {
        fn backend(&self) -> Backend {
            Backend::Custom(String::from("map"))
        }

        fn features(&self) -> Features {
            Features::default()
        }

        fn save_event<'a>(
            &'a self,
            event: &'a Event,
        ) -> BoxedFuture<'a, Result<SaveEventStatus, DatabaseError>> {
            Box::pin(async move {
                let mut events = self.events.write().await;
                if events.insert(event.id, event.clone()).is_some() {
                    return Ok(SaveEventStatus::Rejected(RejectedReason::Duplicate));
                }
                Ok(SaveEventStatus::Success)
            })
        }

        fn check_id<'a>(
            &'a self,
            event_id: &'a EventId,
        ) -> BoxedFuture<'a, Result<DatabaseEventStatus, DatabaseError>> {
            Box::pin(async move {
                let events = self.events.read().await;
                Ok(if events.contains_key(event_id) {
                    DatabaseEventStatus::Saved
                } else {
                    DatabaseEventStatus::NotExistent
                })
            })
        }

        fn event_by_id<'a>(
            &'a self,
            event_id: &'a EventId,
        ) -> BoxedFuture<'a, Result<Option<Event>, DatabaseError>> {
            Box::pin(async move { Ok(self.events.read().await.get(event_id).cloned()) })
        }

        fn count(&self, filter: Filter) -> BoxedFuture<'_, Result<usize, DatabaseError>> {
            Box::pin(async move { Ok(self.query(filter).await?.len()) })
        }

        fn query(&self, filter: Filter) -> BoxedFuture<'_, Result<Events, DatabaseError>> {
            Box::pin(async move {
                let events = self.events.read().await;
                let mut out = Events::new(&filter);
                out.extend(events.values().filter(|e| filter.match_event(e)).cloned());
                Ok(out)
            })
        }

        fn delete(&self, _filter: Filter) -> BoxedFuture<'_, Result<(), DatabaseError>> {
            Box::pin(async move { Err(DatabaseError::Unsupported("delete")) })
        }

        fn wipe(&self) -> BoxedFuture<'_, Result<(), DatabaseError>> {
            Box::pin(async move {
                self.events.write().await.clear();
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn test_default_sync_items() {
        let database: Arc<dyn NostrDatabase> = MapDatabase::default().into_nostr_database();
        let keys = Keys::generate();
        let event = EventBuilder::text_note("a").sign_with_keys(&keys).unwrap();

        assert!(database.save_event(&event).await.unwrap().is_success());
        assert_eq!(
            database.save_event(&event).await.unwrap(),
            SaveEventStatus::Rejected(RejectedReason::Duplicate)
        );

        let items = database.sync_items(Filter::new()).await.unwrap();
        assert_eq!(items, vec![event.id]);
        assert!(matches!(
            database.delete(Filter::new()).await,
            Err(DatabaseError::Unsupported(_))
        ));
    }
}
