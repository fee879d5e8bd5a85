// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Storage error

use std::error::Error as StdError;

/// Error returned by a [`NostrDatabase`](crate::NostrDatabase) backend
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// The backend failed (I/O, corruption, lock, ...)
    #[error(transparent)]
    Backend(Box<dyn StdError + Send + Sync>),
    /// The backend doesn't implement this operation
    #[error("{0} not supported by this backend")]
    Unsupported(&'static str),
}

impl DatabaseError {
    /// Wrap a backend-specific error
    pub fn backend<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Backend(Box::new(error))
    }
}
