// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Event Id

use std::fmt;
use std::str::FromStr;

use bitcoin_hashes::sha256::Hash as Sha256Hash;
use bitcoin_hashes::Hash;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

use super::{Error, Kind, Tag};
use crate::{PublicKey, Timestamp};

/// Event ID size
pub const EVENT_ID_SIZE: usize = 32;

/// Event ID
///
/// 32-bytes lowercase hex-encoded sha256 of the serialized event data
///
/// <https://github.com/nostr-protocol/nips/blob/master/01.md>
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId([u8; EVENT_ID_SIZE]);

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self.to_hex())
    }
}

impl EventId {
    /// Generate [`EventId`]
    ///
    /// sha256 of `[0, pubkey, created_at, kind, tags, content]`.
    pub fn new(
        public_key: &PublicKey,
        created_at: &Timestamp,
        kind: &Kind,
        tags: &[Tag],
        content: &str,
    ) -> Self {
        let json: Value = json!([0, public_key, created_at, kind, tags, content]);
        let event_str: String = json.to_string();
        let hash: Sha256Hash = Sha256Hash::hash(event_str.as_bytes());
        Self::from_byte_array(hash.to_byte_array())
    }

    /// Construct from bytes
    #[inline]
    pub const fn from_byte_array(bytes: [u8; EVENT_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// All zeros
    #[inline]
    pub const fn all_zeros() -> Self {
        Self([0u8; EVENT_ID_SIZE])
    }

    /// Parse from `bytes`
    pub fn from_slice(slice: &[u8]) -> Result<Self, Error> {
        let bytes: [u8; EVENT_ID_SIZE] = slice.try_into().map_err(|_| Error::InvalidId)?;
        Ok(Self(bytes))
    }

    /// Parse from `hex` string
    pub fn from_hex<S>(hex: S) -> Result<Self, Error>
    where
        S: AsRef<[u8]>,
    {
        let mut bytes: [u8; EVENT_ID_SIZE] = [0u8; EVENT_ID_SIZE];
        hex::decode_to_slice(hex, &mut bytes)?;
        Ok(Self(bytes))
    }

    /// Get as bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8; EVENT_ID_SIZE] {
        &self.0
    }

    /// Consume and get bytes
    #[inline]
    pub fn to_bytes(self) -> [u8; EVENT_ID_SIZE] {
        self.0
    }

    /// Get as `hex` string
    #[inline]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for EventId {
    type Err = Error;

    #[inline]
    fn from_str(hex: &str) -> Result<Self, Self::Err> {
        Self::from_hex(hex)
    }
}

impl AsRef<[u8]> for EventId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for EventId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let id: String = String::deserialize(deserializer)?;
        Self::from_hex(id).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_fields_same_id() {
        let public_key = crate::Keys::generate().public_key();
        let created_at = Timestamp::from_secs(1_700_000_000);
        let tags = vec![Tag::hashtag("rust")];

        let a = EventId::new(&public_key, &created_at, &Kind::TextNote, &tags, "hello");
        let b = EventId::new(&public_key, &created_at, &Kind::TextNote, &tags, "hello");
        assert_eq!(a, b);

        let c = EventId::new(&public_key, &created_at, &Kind::TextNote, &tags, "hello!");
        assert_ne!(a, c);

        let d = EventId::new(&public_key, &created_at, &Kind::Metadata, &tags, "hello");
        assert_ne!(a, d);
    }

    #[test]
    fn test_parse_hex() {
        let hex = "2be17aa3031bdcb006f0fce80c146dea9c1c0268b0af2398bb673365c6444d45";
        let id = EventId::from_hex(hex).unwrap();
        assert_eq!(id.to_hex(), hex);
        assert!(EventId::from_hex("2be17a").is_err());
    }
}
