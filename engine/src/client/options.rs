// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Client Options

use async_wsocket::ConnectionMode;

use crate::pool::{DEFAULT_NOTIFICATION_CHANNEL_SIZE, RelayPoolOptions};
use crate::relay::{RelayLimits, RelayOptions};

/// Options
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub(super) connection_mode: ConnectionMode,
    pub(super) relay_limits: RelayLimits,
    pub(super) verify_subscriptions: bool,
    pub(super) ban_relay_on_mismatch: bool,
    pub(super) max_relays: Option<usize>,
    pub(super) notification_channel_size: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connection_mode: ConnectionMode::default(),
            relay_limits: RelayLimits::default(),
            verify_subscriptions: false,
            ban_relay_on_mismatch: false,
            max_relays: None,
            notification_channel_size: DEFAULT_NOTIFICATION_CHANNEL_SIZE,
        }
    }
}

impl ClientOptions {
    /// Create new default options
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connection mode of the relays added by the client
    #[inline]
    pub fn connection_mode(mut self, mode: ConnectionMode) -> Self {
        self.connection_mode = mode;
        self
    }

    /// Set custom relay limits
    #[inline]
    pub fn relay_limits(mut self, limits: RelayLimits) -> Self {
        self.relay_limits = limits;
        self
    }

    /// Verify that received events belong to a subscription and match the filter.
    #[inline]
    pub fn verify_subscriptions(mut self, enable: bool) -> Self {
        self.verify_subscriptions = enable;
        self
    }

    /// If enabled, ban the relays that send events which don't match the subscription filter.
    #[inline]
    pub fn ban_relay_on_mismatch(mut self, ban_relay: bool) -> Self {
        self.ban_relay_on_mismatch = ban_relay;
        self
    }

    /// Max number of relays (default: unlimited)
    #[inline]
    pub fn max_relays(mut self, num: Option<usize>) -> Self {
        self.max_relays = num;
        self
    }

    /// Notification channel size (default: [`DEFAULT_NOTIFICATION_CHANNEL_SIZE`])
    #[inline]
    pub fn notification_channel_size(mut self, size: usize) -> Self {
        self.notification_channel_size = size;
        self
    }

    pub(super) fn relay_options(&self) -> RelayOptions {
        RelayOptions::default()
            .connection_mode(self.connection_mode.clone())
            .limits(self.relay_limits)
            .verify_subscriptions(self.verify_subscriptions)
            .ban_relay_on_mismatch(self.ban_relay_on_mismatch)
    }

    pub(super) fn pool_options(&self) -> RelayPoolOptions {
        RelayPoolOptions {
            max_relays: self.max_relays,
            notification_channel_size: self.notification_channel_size,
        }
    }
}
