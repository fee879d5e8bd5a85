// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Util

use std::future::Future;
use std::pin::Pin;

use once_cell::sync::Lazy;
use secp256k1::{All, Secp256k1};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Global secp256k1 context
pub static SECP256K1: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Boxed future
pub type BoxedFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// JSON util
pub trait JsonUtil: Sized + Serialize + DeserializeOwned {
    /// Error
    type Err: From<serde_json::Error>;

    /// Deserialize JSON
    #[inline]
    fn from_json<T>(json: T) -> Result<Self, Self::Err>
    where
        T: AsRef<[u8]>,
    {
        Ok(serde_json::from_slice(json.as_ref())?)
    }

    /// Serialize as JSON string
    #[inline]
    fn try_as_json(&self) -> Result<String, Self::Err> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serialize as JSON string
    ///
    /// Returns an empty string if serialization fails.
    #[inline]
    fn as_json(&self) -> String {
        self.try_as_json().unwrap_or_default()
    }
}
