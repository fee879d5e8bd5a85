// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

use nostr_core::{Event, RelayMessage, RelayUrl, SubscriptionId};

/// Client notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientNotification {
    /// Received a new [`Event`] from a relay.
    ///
    /// Sent only the **first time** the event is seen and only if it passed
    /// the limits, the admission policy and the signature verification.
    Event {
        /// The URL of the relay from which the event was received.
        relay_url: RelayUrl,
        /// Subscription ID
        subscription_id: SubscriptionId,
        /// The received event.
        event: Box<Event>,
    },
    /// Received a [`RelayMessage`].
    ///
    /// Sent **every time** a message is received, including events already seen.
    Message {
        /// The URL of the relay from which the message was received.
        relay_url: RelayUrl,
        /// The received relay message.
        message: RelayMessage,
    },
    /// Sent after [`Client::shutdown`](super::Client::shutdown) and after the last client handle is dropped.
    Shutdown,
}
