// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay server error

use std::io;

use nostr_core::message::MessageHandleError;
use nostr_core::types::url;
use nostr_storage::DatabaseError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Relay server error
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error
    #[error(transparent)]
    IO(#[from] io::Error),
    /// WebSocket error
    #[error(transparent)]
    WebSocket(#[from] tungstenite::Error),
    /// Database error
    #[error(transparent)]
    Database(#[from] DatabaseError),
    /// Message error
    #[error(transparent)]
    Message(#[from] MessageHandleError),
    /// Relay URL error
    #[error(transparent)]
    RelayUrl(#[from] url::Error),
    /// Reconciliation error
    #[error(transparent)]
    Reconcile(#[from] nostr_reconcile::Error),
    /// Hex decoding error
    #[error(transparent)]
    Hex(#[from] hex::FromHexError),
    /// No port available
    #[error("No port available")]
    NoPortAvailable,
    /// Outgoing channel closed
    #[error("Outgoing channel closed")]
    ChannelClosed,
}
