// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

use std::fmt;

use nostr_core::RelayUrl;
use nostr_core::types::url;
use nostr_storage::DatabaseError;

use crate::relay;

/// Relay Pool error
#[derive(Debug)]
pub enum Error {
    /// Relay error
    Relay(relay::Error),
    /// Relay URL error
    RelayUrl(url::Error),
    /// Database error
    Database(DatabaseError),
    /// Too many relays
    TooManyRelays {
        /// Max number allowed
        limit: usize,
    },
    /// No relays
    NoRelays,
    /// No relays specified
    NoRelaysSpecified,
    /// Relay not found
    RelayNotFound(RelayUrl),
    /// Relay Pool is shutdown
    Shutdown,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relay(e) => e.fmt(f),
            Self::RelayUrl(e) => e.fmt(f),
            Self::Database(e) => e.fmt(f),
            Self::TooManyRelays { limit } => write!(f, "too many relays (limit: {limit})"),
            Self::NoRelays => f.write_str("no relays"),
            Self::NoRelaysSpecified => f.write_str("no relays specified"),
            Self::RelayNotFound(url) => write!(f, "relay '{url}' not found"),
            Self::Shutdown => f.write_str("relay pool is shutdown"),
        }
    }
}

impl From<relay::Error> for Error {
    fn from(e: relay::Error) -> Self {
        Self::Relay(e)
    }
}

impl From<url::Error> for Error {
    fn from(e: url::Error) -> Self {
        Self::RelayUrl(e)
    }
}

impl From<DatabaseError> for Error {
    fn from(e: DatabaseError) -> Self {
        Self::Database(e)
    }
}
