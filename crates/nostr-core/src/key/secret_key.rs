// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Secret key

use std::fmt;

use rand::RngCore;

use super::Error;

/// Secret key size
pub const SECRET_KEY_SIZE: usize = 32;

/// Secret key
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey {
    inner: secp256k1::SecretKey,
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<sensitive>")
    }
}

impl SecretKey {
    /// Parse from `bytes`
    pub fn from_slice(slice: &[u8]) -> Result<Self, Error> {
        if slice.len() != SECRET_KEY_SIZE {
            return Err(Error::InvalidSecretKey);
        }

        Ok(Self {
            inner: secp256k1::SecretKey::from_slice(slice).map_err(|_| Error::InvalidSecretKey)?,
        })
    }

    /// Parse from `hex` string
    pub fn from_hex(hex: &str) -> Result<Self, Error> {
        let mut buf: [u8; SECRET_KEY_SIZE] = [0u8; SECRET_KEY_SIZE];
        hex::decode_to_slice(hex, &mut buf)?;
        Self::from_slice(&buf)
    }

    /// Generate a random secret key
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let mut buf: [u8; SECRET_KEY_SIZE] = [0u8; SECRET_KEY_SIZE];

        // The chance of hitting an invalid scalar is negligible, but still loop until valid.
        loop {
            rng.fill_bytes(&mut buf);

            if let Ok(inner) = secp256k1::SecretKey::from_slice(&buf) {
                return Self { inner };
            }
        }
    }

    /// Get secret key as `hex` string
    #[inline]
    pub fn to_secret_hex(&self) -> String {
        hex::encode(self.inner.secret_bytes())
    }

    #[inline]
    pub(crate) fn as_secp(&self) -> &secp256k1::SecretKey {
        &self.inner
    }
}
