// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Public key

use std::fmt;
use std::str::FromStr;

use secp256k1::XOnlyPublicKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::Error;

/// Public key size
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Public Key
///
/// Raw x-only key bytes. Curve validity is checked only when the key is used for verification.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey {
    buf: [u8; PUBLIC_KEY_SIZE],
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<XOnlyPublicKey> for PublicKey {
    fn from(pk: XOnlyPublicKey) -> Self {
        Self { buf: pk.serialize() }
    }
}

impl PublicKey {
    /// Construct from bytes without checking that they encode a curve point
    #[inline]
    pub const fn from_byte_array(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self { buf: bytes }
    }

    /// Parse from `bytes`
    pub fn from_slice(slice: &[u8]) -> Result<Self, Error> {
        let buf: [u8; PUBLIC_KEY_SIZE] = slice.try_into().map_err(|_| Error::InvalidPublicKey)?;
        Ok(Self::from_byte_array(buf))
    }

    /// Parse from `hex` string
    pub fn from_hex<S>(hex: S) -> Result<Self, Error>
    where
        S: AsRef<[u8]>,
    {
        let mut buf: [u8; PUBLIC_KEY_SIZE] = [0u8; PUBLIC_KEY_SIZE];
        hex::decode_to_slice(hex, &mut buf)?;
        Ok(Self::from_byte_array(buf))
    }

    /// Get public key as `hex` string
    #[inline]
    pub fn to_hex(&self) -> String {
        hex::encode(self.buf)
    }

    /// Get public key as bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.buf
    }

    /// Get the secp256k1 x-only public key
    #[inline]
    pub fn xonly(&self) -> Result<XOnlyPublicKey, Error> {
        Ok(XOnlyPublicKey::from_slice(&self.buf)?)
    }
}

impl FromStr for PublicKey {
    type Err = Error;

    #[inline]
    fn from_str(hex: &str) -> Result<Self, Self::Err> {
        Self::from_hex(hex)
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let public_key: String = String::deserialize(deserializer)?;
        Self::from_hex(public_key).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUBLIC_KEY_HEX: &str = "aa4fc8665f5696e33db7e1a572e3b0f5b3d615837b0f362dcb1c8068b098c7b4";

    #[test]
    fn test_hex_round_trip() {
        let public_key = PublicKey::from_hex(PUBLIC_KEY_HEX).unwrap();
        assert_eq!(public_key.to_hex(), PUBLIC_KEY_HEX);
    }

    #[test]
    fn test_xonly_from_generated_keys() {
        let keys = crate::Keys::generate();
        let xonly = keys.public_key().xonly().unwrap();
        assert_eq!(PublicKey::from(xonly), keys.public_key());
    }

    #[test]
    fn test_invalid_length() {
        assert!(PublicKey::from_hex("aa4fc8").is_err());
        assert_eq!(
            PublicKey::from_slice(&[0u8; 31]).unwrap_err(),
            Error::InvalidPublicKey
        );
    }

    #[test]
    fn test_json_string() {
        let public_key = PublicKey::from_hex(PUBLIC_KEY_HEX).unwrap();
        let json = serde_json::to_string(&public_key).unwrap();
        assert_eq!(json, format!("\"{PUBLIC_KEY_HEX}\""));
    }
}
