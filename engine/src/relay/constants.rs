// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay constants

use std::ops::RangeInclusive;
use std::time::Duration;

pub(super) const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);
pub(super) const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(10);
pub(super) const MIN_RETRY_INTERVAL: Duration = Duration::from_secs(5);
// Keep it small: a long wait after a network outage delays the reconnection for no reason.
pub(super) const MAX_RETRY_INTERVAL: Duration = Duration::from_secs(60);
pub(super) const JITTER_RANGE: RangeInclusive<i8> = -3..=3;

pub(super) const DEFAULT_NOTIFICATION_CHANNEL_SIZE: usize = 4096;
pub(super) const DEFAULT_SEND_EVENT_TIMEOUT: Duration = Duration::from_secs(10);
pub(super) const DEFAULT_TRY_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

pub(super) const SYNC_HIGH_WATER_UP: usize = 100;
pub(super) const SYNC_LOW_WATER_UP: usize = 50;
pub(super) const SYNC_BATCH_SIZE_DOWN: usize = 100;

pub(super) const MIN_ATTEMPTS: usize = 1;
pub(super) const MIN_SUCCESS_RATE: f64 = 0.90;

pub(super) const WEBSOCKET_TX_TIMEOUT: Duration = Duration::from_secs(10);

/// Max relay message size
pub const MAX_MESSAGE_SIZE: u32 = 5_250_000;
/// Max event size
pub const MAX_EVENT_SIZE: u32 = 70_000;
/// Max number of tags per event
pub const MAX_NUM_TAGS: u16 = 2_000;
