// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Filters

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Event, EventId, JsonUtil, Kind, PublicKey, Timestamp};

/// Generic tag queries
pub type GenericTags = BTreeMap<SingleLetterTag, BTreeSet<String>>;

/// Single-letter tag error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleLetterTagError {
    /// Not an ASCII letter
    InvalidChar(char),
    /// Expected exactly one char
    ExpectedChar,
}

impl std::error::Error for SingleLetterTagError {}

impl fmt::Display for SingleLetterTagError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidChar(c) => write!(f, "Invalid single-letter tag: {c}"),
            Self::ExpectedChar => write!(f, "Expected exactly one char"),
        }
    }
}

/// Single-letter tag name (`a-z`, `A-Z`)
///
/// Only single-letter tags are indexed by relays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SingleLetterTag(char);

impl SingleLetterTag {
    /// Parse from char
    #[inline]
    pub fn from_char(c: char) -> Result<Self, SingleLetterTagError> {
        if c.is_ascii_alphabetic() {
            Ok(Self(c))
        } else {
            Err(SingleLetterTagError::InvalidChar(c))
        }
    }

    /// Get as char
    #[inline]
    pub fn as_char(&self) -> char {
        self.0
    }

    /// Check if lowercase
    #[inline]
    pub fn is_lowercase(&self) -> bool {
        self.0.is_ascii_lowercase()
    }
}

impl fmt::Display for SingleLetterTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SingleLetterTag {
    type Err = SingleLetterTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::from_char(c),
            _ => Err(SingleLetterTagError::ExpectedChar),
        }
    }
}

/// Subscription filter
///
/// An event matches when every present field is satisfied. Absent (or empty) fields
/// impose no constraint.
///
/// <https://github.com/nostr-protocol/nips/blob/master/01.md>
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Filter {
    /// Event IDs
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub ids: Option<BTreeSet<EventId>>,
    /// Authors
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub authors: Option<BTreeSet<PublicKey>>,
    /// Kinds
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub kinds: Option<BTreeSet<Kind>>,
    /// Full-text query, matched case-insensitively against the content
    ///
    /// <https://github.com/nostr-protocol/nips/blob/master/50.md>
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub search: Option<String>,
    /// Events must be newer or equal to this
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub since: Option<Timestamp>,
    /// Events must be older or equal to this
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub until: Option<Timestamp>,
    /// Max number of events returned by the initial query
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub limit: Option<usize>,
    /// Generic tag queries (`#e`, `#p`, `#t`, ...)
    #[serde(
        flatten,
        serialize_with = "serialize_generic_tags",
        deserialize_with = "deserialize_generic_tags"
    )]
    #[serde(default)]
    pub generic_tags: GenericTags,
}

impl Filter {
    /// Empty filter
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add event ID
    #[inline]
    pub fn id(self, id: EventId) -> Self {
        self.ids([id])
    }

    /// Add event IDs
    pub fn ids<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = EventId>,
    {
        self.ids = extend_or_collect(self.ids, ids);
        self
    }

    /// Add author
    #[inline]
    pub fn author(self, author: PublicKey) -> Self {
        self.authors([author])
    }

    /// Add authors
    pub fn authors<I>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = PublicKey>,
    {
        self.authors = extend_or_collect(self.authors, authors);
        self
    }

    /// Add kind
    #[inline]
    pub fn kind(self, kind: Kind) -> Self {
        self.kinds([kind])
    }

    /// Add kinds
    pub fn kinds<I>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = Kind>,
    {
        self.kinds = extend_or_collect(self.kinds, kinds);
        self
    }

    /// Add `#e` tag value
    #[inline]
    pub fn event(self, id: EventId) -> Self {
        self.custom_tag(SingleLetterTag('e'), [id.to_hex()])
    }

    /// Add `#p` tag value
    #[inline]
    pub fn pubkey(self, public_key: PublicKey) -> Self {
        self.custom_tag(SingleLetterTag('p'), [public_key.to_hex()])
    }

    /// Add `#t` tag value
    #[inline]
    pub fn hashtag<S>(self, hashtag: S) -> Self
    where
        S: Into<String>,
    {
        self.custom_tag(SingleLetterTag('t'), [hashtag.into()])
    }

    /// Add `#d` tag value
    #[inline]
    pub fn identifier<S>(self, identifier: S) -> Self
    where
        S: Into<String>,
    {
        self.custom_tag(SingleLetterTag('d'), [identifier.into()])
    }

    /// Add values for a single-letter tag
    pub fn custom_tag<I, S>(mut self, tag: SingleLetterTag, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.generic_tags
            .entry(tag)
            .or_default()
            .extend(values.into_iter().map(|v| v.into()));
        self
    }

    /// Set search query
    #[inline]
    pub fn search<S>(mut self, value: S) -> Self
    where
        S: Into<String>,
    {
        self.search = Some(value.into());
        self
    }

    /// Set since
    #[inline]
    pub fn since(mut self, since: Timestamp) -> Self {
        self.since = Some(since);
        self
    }

    /// Set until
    #[inline]
    pub fn until(mut self, until: Timestamp) -> Self {
        self.until = Some(until);
        self
    }

    /// Set limit
    #[inline]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Remove limit
    #[inline]
    pub fn remove_limit(mut self) -> Self {
        self.limit = None;
        self
    }

    /// Check if the filter has no constraints
    #[inline]
    pub fn is_empty(&self) -> bool {
        self == &Filter::default()
    }

    #[inline]
    fn ids_match(&self, event: &Event) -> bool {
        self.ids
            .as_ref()
            .is_none_or(|ids| ids.is_empty() || ids.contains(&event.id))
    }

    #[inline]
    fn authors_match(&self, event: &Event) -> bool {
        self.authors
            .as_ref()
            .is_none_or(|authors| authors.is_empty() || authors.contains(&event.pubkey))
    }

    #[inline]
    fn kind_match(&self, event: &Event) -> bool {
        self.kinds
            .as_ref()
            .is_none_or(|kinds| kinds.is_empty() || kinds.contains(&event.kind))
    }

    fn tag_match(&self, event: &Event) -> bool {
        if self.generic_tags.is_empty() {
            return true;
        }

        self.generic_tags.iter().all(|(name, values)| {
            if values.is_empty() {
                return true;
            }

            event.tags.iter().any(|tag| {
                tag.single_letter_tag() == Some(*name)
                    && tag.content().is_some_and(|c| values.contains(c))
            })
        })
    }

    fn search_match(&self, event: &Event) -> bool {
        match &self.search {
            Some(query) => event
                .content
                .to_lowercase()
                .contains(&query.to_lowercase()),
            None => true,
        }
    }

    /// Determine if the [`Filter`] matches the [`Event`]
    ///
    /// `limit` is ignored: it bounds query results, not single events.
    pub fn match_event(&self, event: &Event) -> bool {
        self.ids_match(event)
            && self.authors_match(event)
            && self.kind_match(event)
            && self.since.is_none_or(|t| event.created_at >= t)
            && self.until.is_none_or(|t| event.created_at <= t)
            && self.tag_match(event)
            && self.search_match(event)
    }
}

/// Check if at least one of the filters matches the event
#[inline]
pub fn match_any(filters: &[Filter], event: &Event) -> bool {
    filters.iter().any(|f| f.match_event(event))
}

impl From<Filter> for Vec<Filter> {
    #[inline]
    fn from(filter: Filter) -> Self {
        vec![filter]
    }
}

impl JsonUtil for Filter {
    type Err = serde_json::Error;
}

fn serialize_generic_tags<S>(generic_tags: &GenericTags, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(generic_tags.len()))?;
    for (tag, values) in generic_tags.iter() {
        map.serialize_entry(&format!("#{tag}"), values)?;
    }
    map.end()
}

fn deserialize_generic_tags<'de, D>(deserializer: D) -> Result<GenericTags, D::Error>
where
    D: Deserializer<'de>,
{
    struct GenericTagsVisitor;

    impl<'de> Visitor<'de> for GenericTagsVisitor {
        type Value = GenericTags;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("map in which the keys are \"#X\" for some character X")
        }

        fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
        where
            M: MapAccess<'de>,
        {
            let mut generic_tags = GenericTags::new();
            while let Some(key) = map.next_key::<String>()? {
                let mut chars = key.chars();
                if let (Some('#'), Some(ch), None) = (chars.next(), chars.next(), chars.next()) {
                    let tag: SingleLetterTag =
                        SingleLetterTag::from_char(ch).map_err(serde::de::Error::custom)?;
                    let values: BTreeSet<String> = map.next_value()?;
                    generic_tags.insert(tag, values);
                } else {
                    map.next_value::<serde::de::IgnoredAny>()?;
                }
            }
            Ok(generic_tags)
        }
    }

    deserializer.deserialize_map(GenericTagsVisitor)
}

fn extend_or_collect<T, I>(mut set: Option<BTreeSet<T>>, iter: I) -> Option<BTreeSet<T>>
where
    I: IntoIterator<Item = T>,
    T: Ord,
{
    match set.as_mut() {
        Some(s) => s.extend(iter),
        None => set = Some(iter.into_iter().collect()),
    };
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventBuilder, Keys, Tag};

    fn note(keys: &Keys, content: &str, created_at: u64, tags: Vec<Tag>) -> Event {
        EventBuilder::text_note(content)
            .tags(tags)
            .custom_created_at(Timestamp::from_secs(created_at))
            .sign_with_keys(keys)
            .unwrap()
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let keys = Keys::generate();
        let event = note(&keys, "hi", 100, Vec::new());
        assert!(Filter::new().is_empty());
        assert!(Filter::new().match_event(&event));
        assert_eq!(Filter::new().as_json(), "{}");
    }

    #[test]
    fn test_match_event() {
        let alice = Keys::generate();
        let bob = Keys::generate();
        let event = note(&alice, "Nostr is cool", 1_000, vec![Tag::hashtag("nostr")]);

        assert!(Filter::new().author(alice.public_key()).match_event(&event));
        assert!(!Filter::new().author(bob.public_key()).match_event(&event));
        assert!(Filter::new().id(event.id).match_event(&event));
        assert!(Filter::new().kind(Kind::TextNote).match_event(&event));
        assert!(!Filter::new().kind(Kind::Metadata).match_event(&event));
        assert!(Filter::new().hashtag("nostr").match_event(&event));
        assert!(!Filter::new().hashtag("bitcoin").match_event(&event));
        assert!(Filter::new().search("IS COOL").match_event(&event));
        assert!(!Filter::new().search("boring").match_event(&event));

        // Time bounds are inclusive
        let at = Timestamp::from_secs(1_000);
        assert!(Filter::new().since(at).until(at).match_event(&event));
        assert!(!Filter::new()
            .since(Timestamp::from_secs(1_001))
            .match_event(&event));
        assert!(!Filter::new()
            .until(Timestamp::from_secs(999))
            .match_event(&event));

        // Every present field must match
        assert!(!Filter::new()
            .author(alice.public_key())
            .kind(Kind::Metadata)
            .match_event(&event));

        // Limit never affects single-event matching
        assert!(Filter::new().limit(0).match_event(&event));
    }

    #[test]
    fn test_empty_set_imposes_no_constraint() {
        let keys = Keys::generate();
        let event = note(&keys, "x", 1, Vec::new());
        let filter = Filter::new().kinds(Vec::new()).authors(Vec::new());
        assert!(filter.match_event(&event));
    }

    #[test]
    fn test_match_any() {
        let keys = Keys::generate();
        let event = note(&keys, "x", 1, Vec::new());
        let filters = vec![Filter::new().kind(Kind::Metadata), Filter::new().author(keys.public_key())];
        assert!(match_any(&filters, &event));
        assert!(!match_any(&filters[..1], &event));
        assert!(!match_any(&[], &event));
    }

    #[test]
    fn test_filter_serialization() {
        let keys = Keys::parse("6b911fd37cdf5c81d4c0adb1ab7fa822ed253ab0ad9aa18d77257c88b29b718e").unwrap();
        let filter = Filter::new()
            .author(keys.public_key())
            .kind(Kind::TextNote)
            .hashtag("rust")
            .limit(10);
        let json = filter.as_json();
        assert_eq!(
            json,
            format!(
                r##"{{"authors":["{}"],"kinds":[1],"limit":10,"#t":["rust"]}}"##,
                keys.public_key()
            )
        );
        assert_eq!(Filter::from_json(&json).unwrap(), filter);
    }

    #[test]
    fn test_filter_deserialization_ignores_unknown_keys() {
        let filter = Filter::from_json(r##"{"#p":["abc"],"#ab":["x"],"search":"q"}"##).unwrap();
        let p = SingleLetterTag::from_char('p').unwrap();
        assert_eq!(filter.generic_tags.get(&p).map(|s| s.len()), Some(1));
        assert_eq!(filter.generic_tags.len(), 1);
        assert_eq!(filter.search.as_deref(), Some("q"));
    }
}
