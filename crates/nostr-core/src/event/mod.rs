// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Event

use std::fmt;

use secp256k1::schnorr::Signature;
use secp256k1::Message;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub mod builder;
pub mod id;
pub mod kind;
pub mod tag;

pub use self::builder::EventBuilder;
pub use self::id::EventId;
pub use self::kind::Kind;
pub use self::tag::Tag;
use crate::key::{self, PublicKey};
use crate::util::SECP256K1;
use crate::{JsonUtil, Timestamp};

/// [`Event`] error
#[derive(Debug, PartialEq)]
pub enum Error {
    /// Invalid signature
    InvalidSignature,
    /// Invalid event id
    InvalidId,
    /// Empty tag
    EmptyTag,
    /// Error serializing or deserializing JSON data
    Json(String),
    /// Secp256k1 error
    Secp256k1(secp256k1::Error),
    /// Hex decoding error
    Hex(hex::FromHexError),
    /// Keys error
    Key(key::Error),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSignature => write!(f, "Invalid signature"),
            Self::InvalidId => write!(f, "Invalid event id"),
            Self::EmptyTag => write!(f, "Empty tag"),
            Self::Json(e) => write!(f, "Json: {e}"),
            Self::Secp256k1(e) => write!(f, "Secp256k1: {e}"),
            Self::Hex(e) => write!(f, "Hex: {e}"),
            Self::Key(e) => write!(f, "Key: {e}"),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

impl From<secp256k1::Error> for Error {
    fn from(e: secp256k1::Error) -> Self {
        Self::Secp256k1(e)
    }
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Self::Hex(e)
    }
}

impl From<key::Error> for Error {
    fn from(e: key::Error) -> Self {
        Self::Key(e)
    }
}

/// Nostr event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    /// Event ID
    pub id: EventId,
    /// Author
    pub pubkey: PublicKey,
    /// Timestamp (seconds)
    pub created_at: Timestamp,
    /// Kind
    pub kind: Kind,
    /// Tag list
    pub tags: Vec<Tag>,
    /// Content
    pub content: String,
    /// Signature
    #[serde(serialize_with = "serialize_sig", deserialize_with = "deserialize_sig")]
    pub sig: Signature,
}

// Newest first, then by id
impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        if self.created_at != other.created_at {
            other.created_at.cmp(&self.created_at)
        } else {
            self.id.cmp(&other.id)
        }
    }
}

impl Event {
    /// Verify both [`EventId`] and [`Signature`]
    pub fn verify(&self) -> Result<(), Error> {
        if !self.verify_id() {
            return Err(Error::InvalidId);
        }

        if !self.verify_signature() {
            return Err(Error::InvalidSignature);
        }

        Ok(())
    }

    /// Check if the [`EventId`] matches the event fields
    #[inline]
    pub fn verify_id(&self) -> bool {
        let id: EventId = EventId::new(
            &self.pubkey,
            &self.created_at,
            &self.kind,
            &self.tags,
            &self.content,
        );
        id == self.id
    }

    /// Check the schnorr signature against the event ID
    pub fn verify_signature(&self) -> bool {
        let public_key = match self.pubkey.xonly() {
            Ok(pk) => pk,
            Err(..) => return false,
        };
        let message: Message = Message::from_digest(self.id.to_bytes());
        SECP256K1
            .verify_schnorr(&self.sig, &message, &public_key)
            .is_ok()
    }

    /// Get the `expiration` timestamp, if set
    ///
    /// <https://github.com/nostr-protocol/nips/blob/master/40.md>
    pub fn expiration(&self) -> Option<Timestamp> {
        self.tags
            .iter()
            .filter(|t| t.kind() == "expiration")
            .find_map(|t| t.content()?.parse().ok())
    }

    /// Returns `true` if the event has an expiration tag in the past.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(&Timestamp::now())
    }

    /// Returns `true` if the event has an expiration tag before `now`.
    pub fn is_expired_at(&self, now: &Timestamp) -> bool {
        match self.expiration() {
            Some(expiration) => &expiration < now,
            None => false,
        }
    }

    /// Returns `true` if the event was created after `timestamp`
    #[inline]
    pub fn is_created_after(&self, timestamp: Timestamp) -> bool {
        self.created_at > timestamp
    }

    /// Get the `d` tag value (addressable events)
    pub fn identifier(&self) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.kind() == "d")
            .and_then(|t| t.content())
    }

    /// Iterate the event IDs referenced with `e` tags
    pub fn event_ids(&self) -> impl Iterator<Item = EventId> + '_ {
        self.tags
            .iter()
            .filter(|t| t.kind() == "e")
            .filter_map(|t| EventId::from_hex(t.content()?).ok())
    }

    /// Iterate the `a` coordinates (`<kind>:<pubkey>:<identifier>`)
    pub fn coordinates(&self) -> impl Iterator<Item = &str> + '_ {
        self.tags
            .iter()
            .filter(|t| t.kind() == "a")
            .filter_map(|t| t.content())
    }
}

impl JsonUtil for Event {
    type Err = Error;
}

fn serialize_sig<S>(sig: &Signature, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&hex::encode(sig.serialize()))
}

fn deserialize_sig<'de, D>(deserializer: D) -> Result<Signature, D::Error>
where
    D: Deserializer<'de>,
{
    let sig: String = String::deserialize(deserializer)?;
    let bytes: Vec<u8> = hex::decode(sig).map_err(serde::de::Error::custom)?;
    Signature::from_slice(&bytes).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Keys;

    #[test]
    fn test_construct_and_verify() {
        let keys = Keys::generate();
        let event = EventBuilder::text_note("hello")
            .tag(Tag::hashtag("nostr"))
            .sign_with_keys(&keys)
            .unwrap();

        assert_eq!(event.pubkey, keys.public_key());
        assert!(event.verify_id());
        assert!(event.verify_signature());
        assert!(event.verify().is_ok());
    }

    #[test]
    fn test_tampered_content_fails() {
        let keys = Keys::generate();
        let mut event = EventBuilder::text_note("hello")
            .sign_with_keys(&keys)
            .unwrap();
        event.content = String::from("bye");
        assert_eq!(event.verify(), Err(Error::InvalidId));
    }

    #[test]
    fn test_wrong_signature_fails() {
        let keys = Keys::generate();
        let a = EventBuilder::text_note("a").sign_with_keys(&keys).unwrap();
        let mut b = EventBuilder::text_note("b").sign_with_keys(&keys).unwrap();
        b.sig = a.sig;
        assert!(b.verify_id());
        assert_eq!(b.verify(), Err(Error::InvalidSignature));
    }

    #[test]
    fn test_json_roundtrip_keeps_validity() {
        let keys = Keys::generate();
        let event = EventBuilder::new(Kind::LongFormTextNote, "article")
            .tag(Tag::identifier("my-article"))
            .sign_with_keys(&keys)
            .unwrap();

        let json: String = event.as_json();
        let parsed = Event::from_json(&json).unwrap();
        assert_eq!(parsed, event);
        assert!(parsed.verify().is_ok());
        assert_eq!(parsed.identifier(), Some("my-article"));
    }

    #[test]
    fn test_expiration() {
        let keys = Keys::generate();
        let event = EventBuilder::text_note("expiring")
            .tag(Tag::expiration(Timestamp::from_secs(1_000)))
            .sign_with_keys(&keys)
            .unwrap();
        assert_eq!(event.expiration(), Some(Timestamp::from_secs(1_000)));
        assert!(event.is_expired());
        assert!(!event.is_expired_at(&Timestamp::from_secs(999)));
    }

    #[test]
    fn test_order_newest_first() {
        let keys = Keys::generate();
        let old = EventBuilder::text_note("old")
            .custom_created_at(Timestamp::from_secs(10))
            .sign_with_keys(&keys)
            .unwrap();
        let new = EventBuilder::text_note("new")
            .custom_created_at(Timestamp::from_secs(20))
            .sign_with_keys(&keys)
            .unwrap();
        assert!(new < old);
    }
}
