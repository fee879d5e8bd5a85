// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Keys

use std::fmt;
use std::str::FromStr;

use secp256k1::schnorr::Signature;
use secp256k1::{Keypair, Message, XOnlyPublicKey};

mod public_key;
mod secret_key;

pub use self::public_key::{PublicKey, PUBLIC_KEY_SIZE};
pub use self::secret_key::{SecretKey, SECRET_KEY_SIZE};
use crate::util::SECP256K1;

/// [`Keys`] error
#[derive(Debug, PartialEq)]
pub enum Error {
    /// Invalid secret key
    InvalidSecretKey,
    /// Invalid public key
    InvalidPublicKey,
    /// Hex decoding error
    Hex(hex::FromHexError),
    /// Secp256k1 error
    Secp256k1(secp256k1::Error),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSecretKey => write!(f, "Invalid secret key"),
            Self::InvalidPublicKey => write!(f, "Invalid public key"),
            Self::Hex(e) => write!(f, "{e}"),
            Self::Secp256k1(e) => write!(f, "{e}"),
        }
    }
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Self::Hex(e)
    }
}

impl From<secp256k1::Error> for Error {
    fn from(e: secp256k1::Error) -> Self {
        Self::Secp256k1(e)
    }
}

/// Nostr keys
///
/// Holds the secret key, the derived x-only public key and the keypair used for schnorr signing.
#[derive(Clone)]
pub struct Keys {
    public_key: PublicKey,
    secret_key: SecretKey,
    key_pair: Keypair,
}

impl fmt::Debug for Keys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keys")
            .field("public_key", &self.public_key)
            .finish()
    }
}

impl PartialEq for Keys {
    fn eq(&self, other: &Self) -> bool {
        self.public_key == other.public_key
    }
}

impl Eq for Keys {}

impl Keys {
    /// Initialize nostr keys from secret key.
    pub fn new(secret_key: SecretKey) -> Self {
        let key_pair: Keypair = Keypair::from_secret_key(&SECP256K1, secret_key.as_secp());
        let (public_key, _) = XOnlyPublicKey::from_keypair(&key_pair);

        Self {
            public_key: PublicKey::from(public_key),
            secret_key,
            key_pair,
        }
    }

    /// Parse secret key from `hex`
    #[inline]
    pub fn parse<S>(secret_key: S) -> Result<Self, Error>
    where
        S: AsRef<str>,
    {
        let secret_key: SecretKey = SecretKey::from_hex(secret_key.as_ref())?;
        Ok(Self::new(secret_key))
    }

    /// Generate random keys
    #[inline]
    pub fn generate() -> Self {
        Self::new(SecretKey::generate())
    }

    /// Get public key
    #[inline]
    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// Get secret key
    #[inline]
    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    /// Creates a schnorr signature of the [`Message`].
    pub fn sign_schnorr(&self, message: &Message) -> Signature {
        let aux: [u8; 32] = rand::random();
        SECP256K1.sign_schnorr_with_aux_rand(message, &self.key_pair, &aux)
    }
}

impl FromStr for Keys {
    type Err = Error;

    #[inline]
    fn from_str(secret_key: &str) -> Result<Self, Self::Err> {
        Self::parse(secret_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET_KEY_HEX: &str = "6b911fd37cdf5c81d4c0adb1ab7fa822ed253ab0ad9aa18d77257c88b29b718e";

    #[test]
    fn test_parse_keys() {
        let keys = Keys::parse(SECRET_KEY_HEX).unwrap();
        assert_eq!(keys.secret_key().to_secret_hex(), SECRET_KEY_HEX);

        let same = Keys::from_str(SECRET_KEY_HEX).unwrap();
        assert_eq!(keys, same);
    }

    #[test]
    fn test_invalid_secret_key() {
        assert!(Keys::parse("abc").is_err());
        assert_eq!(
            Keys::parse("0000000000000000000000000000000000000000000000000000000000000000")
                .unwrap_err(),
            Error::InvalidSecretKey
        );
    }

    #[test]
    fn test_generate_distinct_keys() {
        let a = Keys::generate();
        let b = Keys::generate();
        assert_ne!(a.public_key(), b.public_key());
    }
}
