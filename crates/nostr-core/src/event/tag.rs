// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Tag

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{Error, EventId};
use crate::filter::SingleLetterTag;
use crate::{PublicKey, Timestamp};

/// Tag
///
/// A non-empty list of strings: the first is the tag kind, the rest are values.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    buf: Vec<String>,
}

impl Tag {
    /// Parse tag
    ///
    /// Returns [`Error::EmptyTag`] if the list is empty.
    pub fn parse<I, S>(tag: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let buf: Vec<String> = tag.into_iter().map(|v| v.into()).collect();

        if buf.is_empty() {
            return Err(Error::EmptyTag);
        }

        Ok(Self { buf })
    }

    /// Compose a custom tag
    pub fn custom<K, I, S>(kind: K, values: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut buf: Vec<String> = vec![kind.into()];
        buf.extend(values.into_iter().map(|v| v.into()));
        Self { buf }
    }

    /// Compose `["e", "<event-id>"]` tag
    #[inline]
    pub fn event(id: EventId) -> Self {
        Self::custom("e", [id.to_hex()])
    }

    /// Compose `["p", "<public-key>"]` tag
    #[inline]
    pub fn public_key(public_key: PublicKey) -> Self {
        Self::custom("p", [public_key.to_hex()])
    }

    /// Compose `["d", "<identifier>"]` tag
    #[inline]
    pub fn identifier<S>(identifier: S) -> Self
    where
        S: Into<String>,
    {
        Self::custom("d", [identifier])
    }

    /// Compose `["t", "<hashtag>"]` tag
    #[inline]
    pub fn hashtag<S>(hashtag: S) -> Self
    where
        S: Into<String>,
    {
        Self::custom("t", [hashtag])
    }

    /// Compose `["expiration", "<timestamp>"]` tag
    ///
    /// <https://github.com/nostr-protocol/nips/blob/master/40.md>
    #[inline]
    pub fn expiration(timestamp: Timestamp) -> Self {
        Self::custom("expiration", [timestamp.to_string()])
    }

    /// Get tag kind
    #[inline]
    pub fn kind(&self) -> &str {
        &self.buf[0]
    }

    /// Get the first value, if any
    #[inline]
    pub fn content(&self) -> Option<&str> {
        self.buf.get(1).map(|s| s.as_str())
    }

    /// Get the single-letter name, if the tag kind is a single ASCII letter
    pub fn single_letter_tag(&self) -> Option<SingleLetterTag> {
        let mut chars = self.kind().chars();
        match (chars.next(), chars.next()) {
            (Some(ch), None) => SingleLetterTag::from_char(ch).ok(),
            _ => None,
        }
    }

    /// Get as slice of strings
    #[inline]
    pub fn as_slice(&self) -> &[String] {
        &self.buf
    }

    /// Consume and get the inner vector
    #[inline]
    pub fn to_vec(self) -> Vec<String> {
        self.buf
    }
}

impl Serialize for Tag {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.buf.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let buf: Vec<String> = Vec::deserialize(deserializer)?;
        Self::parse(buf).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tag() {
        let tag = Tag::parse(["t", "nostr"]).unwrap();
        assert_eq!(tag.kind(), "t");
        assert_eq!(tag.content(), Some("nostr"));
        assert_eq!(tag.single_letter_tag(), SingleLetterTag::from_char('t').ok());
        assert_eq!(Tag::parse(Vec::<String>::new()).unwrap_err(), Error::EmptyTag);
    }

    #[test]
    fn test_multi_letter_tag_is_not_indexable() {
        let tag = Tag::expiration(Timestamp::from_secs(10));
        assert_eq!(tag.kind(), "expiration");
        assert!(tag.single_letter_tag().is_none());
    }

    #[test]
    fn test_tag_json() {
        let tag = Tag::custom("r", ["wss://relay.example.com", "read"]);
        let json = serde_json::to_string(&tag).unwrap();
        assert_eq!(json, r#"["r","wss://relay.example.com","read"]"#);
        assert!(serde_json::from_str::<Tag>("[]").is_err());
    }
}
