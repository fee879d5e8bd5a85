// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay options

use std::time::Duration;

use async_wsocket::ConnectionMode;
use tokio::sync::watch;

use super::constants::{
    DEFAULT_NOTIFICATION_CHANNEL_SIZE, DEFAULT_RETRY_INTERVAL, MIN_RETRY_INTERVAL,
};
use super::limits::RelayLimits;

/// Relay options
#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub(super) connection_mode: ConnectionMode,
    pub(super) reconnect: bool,
    pub(super) retry_interval: Duration,
    pub(super) adjust_retry_interval: bool,
    pub(super) limits: RelayLimits,
    pub(super) verify_subscriptions: bool,
    pub(super) ban_relay_on_mismatch: bool,
    pub(super) notification_channel_size: usize,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            connection_mode: ConnectionMode::default(),
            reconnect: true,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            adjust_retry_interval: true,
            limits: RelayLimits::default(),
            verify_subscriptions: false,
            ban_relay_on_mismatch: false,
            notification_channel_size: DEFAULT_NOTIFICATION_CHANNEL_SIZE,
        }
    }
}

impl RelayOptions {
    /// New default options
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set connection mode
    #[inline]
    pub fn connection_mode(mut self, mode: ConnectionMode) -> Self {
        self.connection_mode = mode;
        self
    }

    /// Enable/disable auto reconnection (default: true)
    #[inline]
    pub fn reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Retry interval (default: 10 sec)
    ///
    /// Minimum allowed value is 5 secs
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        if interval >= MIN_RETRY_INTERVAL {
            self.retry_interval = interval;
        } else {
            tracing::warn!(
                min = MIN_RETRY_INTERVAL.as_secs(),
                "Retry interval too small, keeping the previous one."
            );
        }
        self
    }

    /// Automatically adjust retry interval based on success/attempts (default: true)
    #[inline]
    pub fn adjust_retry_interval(mut self, adjust: bool) -> Self {
        self.adjust_retry_interval = adjust;
        self
    }

    /// Set custom limits
    #[inline]
    pub fn limits(mut self, limits: RelayLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Verify that received events belong to a subscription and match its filter (default: false)
    #[inline]
    pub fn verify_subscriptions(mut self, enable: bool) -> Self {
        self.verify_subscriptions = enable;
        self
    }

    /// Ban a relay that sends events which don't match the subscription filter (default: false)
    ///
    /// If enabled, subscription verification is enabled as well.
    #[inline]
    pub fn ban_relay_on_mismatch(mut self, ban_relay: bool) -> Self {
        self.ban_relay_on_mismatch = ban_relay;
        self
    }

    /// Notification channel size (default: 4096)
    #[inline]
    pub fn notification_channel_size(mut self, size: usize) -> Self {
        self.notification_channel_size = size;
        self
    }
}

/// Request (REQ) exit policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ReqExitPolicy {
    /// Exit on EOSE.
    #[default]
    ExitOnEOSE,
    /// Never exit on EOSE: wait for timeout, idle timeout or cancellation.
    KeepOpen,
    /// After EOSE is received, keep listening for N more events that match the filter.
    WaitForEventsAfterEOSE(u16),
    /// After EOSE is received, keep listening for matching events for [`Duration`] more time.
    WaitDurationAfterEOSE(Duration),
    /// Wait for N events, regardless of EOSE.
    WaitForEvents(u16),
}

/// Auto-closing subscribe options
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscribeAutoCloseOptions {
    pub(super) exit_policy: ReqExitPolicy,
    pub(super) timeout: Option<Duration>,
    pub(super) idle_timeout: Option<Duration>,
}

impl SubscribeAutoCloseOptions {
    /// Close subscription when the policy is satisfied
    #[inline]
    pub fn exit_policy(mut self, policy: ReqExitPolicy) -> Self {
        self.exit_policy = policy;
        self
    }

    /// Automatically close subscription after [`Duration`].
    #[inline]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Automatically close subscription if no notifications/events are received within the [`Duration`].
    #[inline]
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

/// Sync direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SyncDirection {
    /// Send events to relay
    Up,
    /// Get events from relay
    #[default]
    Down,
    /// Both send and get events from relay (bidirectional sync)
    Both,
}

/// Reconciliation progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncProgress {
    /// Number of events to transfer
    pub total: u64,
    /// Number of events already transferred (sent or requested)
    pub current: u64,
}

impl SyncProgress {
    /// Construct a progress channel
    #[inline]
    pub fn channel() -> (watch::Sender<Self>, watch::Receiver<Self>) {
        watch::channel(Self::default())
    }

    /// Percentage of progress, from `0.0` to `1.0`
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }

        self.current as f64 / self.total as f64
    }
}

/// Reconciliation options
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub(super) initial_timeout: Duration,
    pub(super) idle_timeout: Duration,
    pub(super) direction: SyncDirection,
    pub(super) dry_run: bool,
    pub(super) progress: Option<watch::Sender<SyncProgress>>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            initial_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(30),
            direction: SyncDirection::default(),
            dry_run: false,
            progress: None,
        }
    }
}

impl SyncOptions {
    /// New default options
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Timeout to check if reconciliation is supported by the relay (default: 10 secs)
    #[inline]
    pub fn initial_timeout(mut self, timeout: Duration) -> Self {
        self.initial_timeout = timeout;
        self
    }

    /// Abort the sync if no relevant message is received within this time (default: 30 secs)
    #[inline]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sync direction (default: down)
    #[inline]
    pub fn direction(mut self, direction: SyncDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Dry run
    ///
    /// Only compute the differences: events are neither sent nor requested.
    #[inline]
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Sync progress
    ///
    /// The progress is updated every time a batch of events is sent or requested.
    #[inline]
    pub fn progress(mut self, tx: watch::Sender<SyncProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    #[inline]
    pub(super) fn do_up(&self) -> bool {
        !self.dry_run && matches!(self.direction, SyncDirection::Up | SyncDirection::Both)
    }

    #[inline]
    pub(super) fn do_down(&self) -> bool {
        !self.dry_run && matches!(self.direction, SyncDirection::Down | SyncDirection::Both)
    }
}
