// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

use std::fmt;

use nostr_core::event;
use nostr_core::message::MessageHandleError;
use nostr_storage::DatabaseError;
use tokio::sync::oneshot;

use crate::transport::error::TransportError;

/// Relay error
#[derive(Debug)]
pub enum Error {
    /// Transport error
    Transport(TransportError),
    /// MessageHandle error
    MessageHandle(MessageHandleError),
    /// Event error
    Event(event::Error),
    /// Database error
    Database(DatabaseError),
    /// Reconciliation error
    Reconcile(nostr_reconcile::Error),
    /// Hex error
    Hex(hex::FromHexError),
    /// Generic timeout
    Timeout,
    /// Channel closed before a reply was received
    Recv,
    /// Can't send message to the dispatcher channel
    CantSendMessageToDispatcher,
    /// Relay is initialized but not ready (`connect` never called)
    NotReady,
    /// Relay not connected
    NotConnected,
    /// Relay banned
    Banned,
    /// Relay has been shut down
    Shutdown,
    /// Termination requested during connection
    TerminationRequest,
    /// Connection rejected by the admission policy
    ConnectionRejected {
        /// Rejection reason
        reason: Option<String>,
    },
    /// Filters are empty
    EmptyFilters,
    /// Relay message too large
    RelayMessageTooLarge {
        /// Message size
        size: usize,
        /// Max message size
        max_size: usize,
    },
    /// Event too large
    EventTooLarge {
        /// Event size
        size: usize,
        /// Max event size
        max_size: usize,
    },
    /// Too many tags
    TooManyTags {
        /// Number of tags
        size: usize,
        /// Max allowed number of tags
        max_size: usize,
    },
    /// Event expired
    EventExpired,
    /// Subscription not found
    SubscriptionNotFound,
    /// Received more events than the subscription limit
    TooManyEvents,
    /// Event doesn't match the subscription filter
    EventNotMatchFilter,
    /// Notifications channel closed before completion
    PrematureExit,
    /// Message from the relay (`OK`, `CLOSED` or `NEG-ERR`)
    RelayMessage(String),
    /// The relay doesn't support reconciliation
    ReconciliationNotSupported,
    /// Notification handler error
    Handler(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => e.fmt(f),
            Self::MessageHandle(e) => e.fmt(f),
            Self::Event(e) => e.fmt(f),
            Self::Database(e) => e.fmt(f),
            Self::Reconcile(e) => e.fmt(f),
            Self::Hex(e) => e.fmt(f),
            Self::Timeout => f.write_str("timeout"),
            Self::Recv => f.write_str("channel closed"),
            Self::CantSendMessageToDispatcher => {
                f.write_str("can't send message to the dispatcher")
            }
            Self::NotReady => f.write_str("relay is initialized but not ready"),
            Self::NotConnected => f.write_str("relay not connected"),
            Self::Banned => f.write_str("relay banned"),
            Self::Shutdown => f.write_str("relay has been shut down"),
            Self::TerminationRequest => f.write_str("received termination request"),
            Self::ConnectionRejected { reason } => match reason {
                Some(reason) => write!(f, "connection rejected: {reason}"),
                None => f.write_str("connection rejected"),
            },
            Self::EmptyFilters => f.write_str("filters empty"),
            Self::RelayMessageTooLarge { size, max_size } => write!(
                f,
                "Received message too large: size={size}, max_size={max_size}"
            ),
            Self::EventTooLarge { size, max_size } => write!(
                f,
                "Received event too large: size={size}, max_size={max_size}"
            ),
            Self::TooManyTags { size, max_size } => write!(
                f,
                "Received event with too many tags: tags={size}, max_tags={max_size}"
            ),
            Self::EventExpired => f.write_str("event expired"),
            Self::SubscriptionNotFound => f.write_str("subscription not found"),
            Self::TooManyEvents => f.write_str("received too many events"),
            Self::EventNotMatchFilter => f.write_str("event doesn't match the subscription filter"),
            Self::PrematureExit => f.write_str("premature exit"),
            Self::RelayMessage(message) => f.write_str(message),
            Self::ReconciliationNotSupported => f.write_str("reconciliation not supported"),
            Self::Handler(e) => write!(f, "notification handler error: {e}"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<MessageHandleError> for Error {
    fn from(e: MessageHandleError) -> Self {
        Self::MessageHandle(e)
    }
}

impl From<event::Error> for Error {
    fn from(e: event::Error) -> Self {
        Self::Event(e)
    }
}

impl From<DatabaseError> for Error {
    fn from(e: DatabaseError) -> Self {
        Self::Database(e)
    }
}

impl From<nostr_reconcile::Error> for Error {
    fn from(e: nostr_reconcile::Error) -> Self {
        Self::Reconcile(e)
    }
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Self::Hex(e)
    }
}

impl From<oneshot::error::RecvError> for Error {
    fn from(_: oneshot::error::RecvError) -> Self {
        Self::Recv
    }
}
