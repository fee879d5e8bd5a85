// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

use std::fmt;

use nostr_core::types::url;
use nostr_storage::DatabaseError;

use crate::{pool, relay};

/// Client error
#[derive(Debug)]
pub enum Error {
    /// Relay error
    Relay(relay::Error),
    /// Relay pool error
    RelayPool(pool::Error),
    /// Database error
    Database(DatabaseError),
    /// Relay URL error
    RelayUrl(url::Error),
    /// Notification handler error
    Handler(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relay(e) => e.fmt(f),
            Self::RelayPool(e) => e.fmt(f),
            Self::Database(e) => e.fmt(f),
            Self::RelayUrl(e) => e.fmt(f),
            Self::Handler(e) => write!(f, "notification handler error: {e}"),
        }
    }
}

impl From<relay::Error> for Error {
    fn from(e: relay::Error) -> Self {
        Self::Relay(e)
    }
}

impl From<pool::Error> for Error {
    fn from(e: pool::Error) -> Self {
        Self::RelayPool(e)
    }
}

impl From<DatabaseError> for Error {
    fn from(e: DatabaseError) -> Self {
        Self::Database(e)
    }
}

impl From<url::Error> for Error {
    fn from(e: url::Error) -> Self {
        Self::RelayUrl(e)
    }
}
