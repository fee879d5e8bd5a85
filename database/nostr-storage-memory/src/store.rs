// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::iter;
use std::ops::Deref;
use std::sync::Arc;

use btreecap::{BTreeCapSet, Capacity, Insert, OverCapacityPolicy};
use nostr_core::{Event, EventId, Filter, Kind, PublicKey, SingleLetterTag, Timestamp};
use nostr_storage::{RejectedReason, SaveEventStatus};

use crate::MemoryOptions;

type DatabaseEvent = Arc<Event>;

/// `<kind>:<pubkey>:<identifier>` reference to a replaceable or addressable event
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Coordinate {
    kind: Kind,
    public_key: PublicKey,
    identifier: String,
}

impl Coordinate {
    fn parse(s: &str) -> Option<Self> {
        let mut parts = s.splitn(3, ':');
        let kind: u16 = parts.next()?.parse().ok()?;
        let public_key: PublicKey = PublicKey::from_hex(parts.next()?).ok()?;
        let identifier: String = parts.next().unwrap_or_default().to_string();
        Some(Self {
            kind: Kind::from(kind),
            public_key,
            identifier,
        })
    }
}

struct TimeBounds {
    since: Option<Timestamp>,
    until: Option<Timestamp>,
}

impl TimeBounds {
    const NONE: Self = Self {
        since: None,
        until: None,
    };

    fn until(until: Timestamp) -> Self {
        Self {
            since: None,
            until: Some(until),
        }
    }

    #[inline]
    fn contains(&self, ts: Timestamp) -> bool {
        self.since.is_none_or(|since| ts >= since) && self.until.is_none_or(|until| ts <= until)
    }
}

enum QueryPattern {
    Author(PublicKey, TimeBounds),
    KindAuthor(Kind, PublicKey, TimeBounds),
    Addressable(Kind, PublicKey, String, TimeBounds),
    Generic(Box<Filter>),
}

impl From<Filter> for QueryPattern {
    fn from(filter: Filter) -> Self {
        let single = |len: usize| len == 1;
        let kinds: Option<&BTreeSet<Kind>> = filter.kinds.as_ref().filter(|s| single(s.len()));
        let authors: Option<&BTreeSet<PublicKey>> =
            filter.authors.as_ref().filter(|s| single(s.len()));
        let has_kinds: bool = filter.kinds.as_ref().is_some_and(|s| !s.is_empty());
        let has_ids: bool = filter.ids.as_ref().is_some_and(|s| !s.is_empty());
        let identifier: Option<String> = SingleLetterTag::from_char('d')
            .ok()
            .and_then(|d| filter.generic_tags.get(&d))
            .filter(|values| values.len() == 1)
            .and_then(|values| values.iter().next().cloned());

        if has_ids || filter.search.is_some() {
            return Self::Generic(Box::new(filter));
        }

        let bounds = TimeBounds {
            since: filter.since,
            until: filter.until,
        };
        let first_kind: Option<Kind> = kinds.and_then(|s| s.iter().next().copied());
        let first_author: Option<PublicKey> = authors.and_then(|s| s.iter().next().copied());

        match (
            has_kinds,
            first_kind,
            first_author,
            filter.generic_tags.len(),
            identifier,
        ) {
            (false, None, Some(author), 0, None) => Self::Author(author, bounds),
            (true, Some(kind), Some(author), 0, None) => Self::KindAuthor(kind, author, bounds),
            (true, Some(kind), Some(author), 1, Some(identifier)) if kind.is_addressable() => {
                Self::Addressable(kind, author, identifier, bounds)
            }
            _ => Self::Generic(Box::new(filter)),
        }
    }
}

enum InternalQueryResult<'a> {
    All,
    Set(BTreeSet<&'a DatabaseEvent>),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryStore {
    options: MemoryOptions,
    /// Sorted events (newest first)
    events: BTreeCapSet<DatabaseEvent>,
    /// Events by ID
    ids: HashMap<EventId, DatabaseEvent>,
    author_index: HashMap<PublicKey, BTreeSet<DatabaseEvent>>,
    kind_author_index: HashMap<(Kind, PublicKey), BTreeSet<DatabaseEvent>>,
    addressable_index: HashMap<(Kind, PublicKey, String), DatabaseEvent>,
    deleted_ids: HashSet<EventId>,
    deleted_coordinates: HashMap<Coordinate, Timestamp>,
}

impl MemoryStore {
    pub(crate) fn new(options: MemoryOptions) -> Self {
        let mut store: Self = Self {
            options,
            ..Default::default()
        };

        if let Some(max) = options.capacity {
            store.events.change_capacity(Capacity::Bounded {
                max,
                policy: OverCapacityPolicy::Last,
            });
        }

        store
    }

    /// Index an [`Event`]
    ///
    /// The id and signature must have been verified by the caller.
    pub fn index_event(&mut self, event: &Event) -> SaveEventStatus {
        if event.kind.is_ephemeral() {
            return SaveEventStatus::Rejected(RejectedReason::Ephemeral);
        }

        let now = Timestamp::now();
        self.internal_index_event(event, &now)
    }

    fn internal_index_event(&mut self, event: &Event, now: &Timestamp) -> SaveEventStatus {
        if self.ids.contains_key(&event.id) {
            return SaveEventStatus::Rejected(RejectedReason::Duplicate);
        }

        if self.deleted_ids.contains(&event.id) {
            return SaveEventStatus::Rejected(RejectedReason::Deleted);
        }

        if event.is_expired_at(now) {
            return SaveEventStatus::Rejected(RejectedReason::Expired);
        }

        let author: PublicKey = event.pubkey;
        let kind: Kind = event.kind;

        let to_discard: HashSet<EventId> = if kind.is_replaceable() {
            let coordinate = Coordinate {
                kind,
                public_key: author,
                identifier: String::new(),
            };
            if self.has_coordinate_been_deleted(&coordinate, &event.created_at) {
                return SaveEventStatus::Rejected(RejectedReason::Deleted);
            }

            let mut to_discard: HashSet<EventId> = HashSet::new();
            for ev in self.query_by_kind_and_author(kind, author, TimeBounds::NONE) {
                if has_event_been_replaced(ev, event) {
                    return SaveEventStatus::Rejected(RejectedReason::Replaced);
                }
                to_discard.insert(ev.id);
            }
            to_discard
        } else if kind.is_addressable() {
            let Some(identifier) = event.identifier() else {
                return SaveEventStatus::Rejected(RejectedReason::Invalid);
            };

            let coordinate = Coordinate {
                kind,
                public_key: author,
                identifier: identifier.to_string(),
            };
            if self.has_coordinate_been_deleted(&coordinate, &event.created_at) {
                return SaveEventStatus::Rejected(RejectedReason::Deleted);
            }

            let mut to_discard: HashSet<EventId> = HashSet::new();
            if let Some(ev) =
                self.query_addressable(kind, author, identifier.to_string(), TimeBounds::NONE)
            {
                if has_event_been_replaced(ev, event) {
                    return SaveEventStatus::Rejected(RejectedReason::Replaced);
                }
                to_discard.insert(ev.id);
            }
            to_discard
        } else if self.options.process_deletions && kind == Kind::EventDeletion {
            match self.process_deletion(event) {
                Ok(to_discard) => to_discard,
                Err(reason) => return SaveEventStatus::Rejected(reason),
            }
        } else {
            HashSet::new()
        };

        self.discard_events(to_discard);
        self.insert(event);

        SaveEventStatus::Success
    }

    /// Collect the events targeted by a deletion request.
    ///
    /// Nothing is touched if the request targets an event of another author.
    fn process_deletion(&mut self, event: &Event) -> Result<HashSet<EventId>, RejectedReason> {
        let author: PublicKey = event.pubkey;
        let created_at: Timestamp = event.created_at;

        let coordinates: Vec<Coordinate> =
            event.coordinates().filter_map(Coordinate::parse).collect();

        let mut to_discard: HashSet<EventId> = HashSet::new();

        // `e` tags
        for id in event.event_ids() {
            if let Some(ev) = self.ids.get(&id) {
                if ev.pubkey != author {
                    tracing::debug!(id = %event.id, target = %id, "Deletion of a non-owned event");
                    return Err(RejectedReason::InvalidDelete);
                }

                if ev.created_at <= created_at {
                    to_discard.insert(ev.id);
                }
            }
        }

        // `a` tags
        if coordinates.iter().any(|c| c.public_key != author) {
            tracing::debug!(id = %event.id, "Deletion of a non-owned coordinate");
            return Err(RejectedReason::InvalidDelete);
        }

        for coordinate in coordinates.into_iter() {
            if coordinate.identifier.is_empty() {
                to_discard.extend(
                    self.query_by_kind_and_author(
                        coordinate.kind,
                        coordinate.public_key,
                        TimeBounds::until(created_at),
                    )
                    .map(|e| e.id),
                );
            } else if let Some(ev) = self.query_addressable(
                coordinate.kind,
                coordinate.public_key,
                coordinate.identifier.clone(),
                TimeBounds::until(created_at),
            ) {
                to_discard.insert(ev.id);
            }

            // Keep the newest deletion timestamp
            self.deleted_coordinates
                .entry(coordinate)
                .and_modify(|t| {
                    if created_at > *t {
                        *t = created_at
                    }
                })
                .or_insert(created_at);
        }

        Ok(to_discard)
    }

    fn insert(&mut self, event: &Event) {
        let e: DatabaseEvent = Arc::new(event.clone());
        let author: PublicKey = e.pubkey;
        let kind: Kind = e.kind;

        let Insert { inserted, pop } = self.events.insert(e.clone());

        if inserted {
            self.ids.insert(e.id, e.clone());
            self.author_index
                .entry(author)
                .or_default()
                .insert(e.clone());

            if kind.is_addressable() {
                if let Some(identifier) = e.identifier() {
                    self.addressable_index
                        .insert((kind, author, identifier.to_string()), e.clone());
                }
            }

            self.kind_author_index
                .entry((kind, author))
                .or_default()
                .insert(e);
        }

        // Over capacity: the oldest event was evicted
        if let Some(event) = pop {
            self.unindex(&event);
        }
    }

    /// Remove events and remember their IDs as deleted
    fn discard_events(&mut self, ids: HashSet<EventId>) {
        for id in ids.into_iter() {
            if let Some(ev) = self.ids.get(&id).cloned() {
                self.events.remove(&ev);
                self.unindex(&ev);
            }
            self.deleted_ids.insert(id);
        }
    }

    fn unindex(&mut self, ev: &DatabaseEvent) {
        self.ids.remove(&ev.id);

        if let Some(set) = self.author_index.get_mut(&ev.pubkey) {
            set.remove(ev);
        }

        if ev.kind.is_addressable() {
            if let Some(identifier) = ev.identifier() {
                self.addressable_index
                    .remove(&(ev.kind, ev.pubkey, identifier.to_string()));
            }
        }

        if let Some(set) = self.kind_author_index.get_mut(&(ev.kind, ev.pubkey)) {
            set.remove(ev);
        }
    }

    fn query_by_author<'a>(
        &'a self,
        author: PublicKey,
        bounds: TimeBounds,
    ) -> Box<dyn Iterator<Item = &'a DatabaseEvent> + 'a> {
        match self.author_index.get(&author) {
            Some(set) => Box::new(set.iter().filter(move |ev| bounds.contains(ev.created_at))),
            None => Box::new(iter::empty()),
        }
    }

    fn query_by_kind_and_author<'a>(
        &'a self,
        kind: Kind,
        author: PublicKey,
        bounds: TimeBounds,
    ) -> Box<dyn Iterator<Item = &'a DatabaseEvent> + 'a> {
        match self.kind_author_index.get(&(kind, author)) {
            Some(set) => Box::new(set.iter().filter(move |ev| bounds.contains(ev.created_at))),
            None => Box::new(iter::empty()),
        }
    }

    fn query_addressable(
        &self,
        kind: Kind,
        author: PublicKey,
        identifier: String,
        bounds: TimeBounds,
    ) -> Option<&DatabaseEvent> {
        if !kind.is_addressable() {
            return None;
        }

        let ev: &DatabaseEvent = self.addressable_index.get(&(kind, author, identifier))?;

        if bounds.contains(ev.created_at) {
            Some(ev)
        } else {
            None
        }
    }

    fn generic_query(&self, filter: Filter) -> impl Iterator<Item = &DatabaseEvent> {
        self.events
            .iter()
            .filter(move |event| filter.match_event(event))
    }

    fn internal_query(&self, filter: Filter) -> InternalQueryResult<'_> {
        if filter.is_empty() {
            return InternalQueryResult::All;
        }

        if let (Some(since), Some(until)) = (filter.since, filter.until) {
            if since > until {
                return InternalQueryResult::Set(BTreeSet::new());
            }
        }

        let limit: Option<usize> = filter.limit;

        let evs: Box<dyn Iterator<Item = &DatabaseEvent>> = match QueryPattern::from(filter) {
            QueryPattern::Author(author, bounds) => self.query_by_author(author, bounds),
            QueryPattern::KindAuthor(kind, author, bounds) => {
                self.query_by_kind_and_author(kind, author, bounds)
            }
            QueryPattern::Addressable(kind, author, identifier, bounds) => {
                match self.query_addressable(kind, author, identifier, bounds) {
                    Some(ev) => Box::new(iter::once(ev)),
                    None => Box::new(iter::empty()),
                }
            }
            QueryPattern::Generic(filter) => Box::new(self.generic_query(*filter)),
        };

        // Every source iterates newest first
        let set: BTreeSet<&DatabaseEvent> = match limit {
            Some(limit) => evs.take(limit).collect(),
            None => evs.collect(),
        };

        InternalQueryResult::Set(set)
    }

    #[inline]
    pub fn event_by_id(&self, id: &EventId) -> Option<&Event> {
        self.ids.get(id).map(|e| e.deref())
    }

    #[inline]
    pub fn has_event(&self, id: &EventId) -> bool {
        self.ids.contains_key(id)
    }

    /// Check if an event with [`EventId`] has been deleted
    #[inline]
    pub fn has_event_id_been_deleted(&self, event_id: &EventId) -> bool {
        self.deleted_ids.contains(event_id)
    }

    fn has_coordinate_been_deleted(&self, coordinate: &Coordinate, timestamp: &Timestamp) -> bool {
        self.deleted_coordinates
            .get(coordinate)
            .is_some_and(|t| t >= timestamp)
    }

    /// Query, newest first
    pub fn query<'a>(&'a self, filter: Filter) -> Box<dyn Iterator<Item = &'a Event> + 'a> {
        match self.internal_query(filter) {
            InternalQueryResult::All => Box::new(self.events.iter().map(|ev| ev.as_ref())),
            InternalQueryResult::Set(set) => Box::new(set.into_iter().map(|ev| ev.as_ref())),
        }
    }

    /// Count events
    pub fn count(&self, filter: Filter) -> usize {
        match self.internal_query(filter) {
            InternalQueryResult::All => self.events.len(),
            InternalQueryResult::Set(set) => set.len(),
        }
    }

    /// IDs of the matching events
    pub fn sync_items(&self, filter: Filter) -> Vec<EventId> {
        match self.internal_query(filter) {
            InternalQueryResult::All => self.events.iter().map(|ev| ev.id).collect(),
            InternalQueryResult::Set(set) => set.into_iter().map(|ev| ev.id).collect(),
        }
    }

    pub fn delete(&mut self, filter: Filter) {
        match self.internal_query(filter) {
            InternalQueryResult::All => {
                self.clear();
            }
            InternalQueryResult::Set(set) => {
                let ids: HashSet<EventId> = set.into_iter().map(|ev| ev.id).collect();
                self.discard_events(ids);
            }
        }
    }

    pub fn clear(&mut self) {
        let capacity: Capacity = self.events.capacity();

        *self = Self {
            options: self.options,
            ..Default::default()
        };

        self.events.change_capacity(capacity);
    }
}

/// Check if the incoming event must be rejected because the stored one has precedence.
///
/// On equal timestamps the event with the lowest ID wins.
#[inline]
fn has_event_been_replaced(stored: &Event, incoming: &Event) -> bool {
    match stored.created_at.cmp(&incoming.created_at) {
        Ordering::Greater => true,
        Ordering::Equal => stored.id < incoming.id,
        Ordering::Less => false,
    }
}
