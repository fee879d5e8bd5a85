// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay limits

use super::constants::{MAX_EVENT_SIZE, MAX_MESSAGE_SIZE, MAX_NUM_TAGS};

/// Relay limits
///
/// Applied to everything received from the relay, before any signature verification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayLimits {
    /// Message limits
    pub messages: RelayMessageLimits,
    /// Event limits
    pub events: RelayEventLimits,
}

impl RelayLimits {
    /// Disable all limits
    #[inline]
    pub fn disable() -> Self {
        Self {
            messages: RelayMessageLimits::disable(),
            events: RelayEventLimits::disable(),
        }
    }
}

/// Messages limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayMessageLimits {
    /// Maximum size of normalised JSON, in bytes (default: 5_250_000)
    pub max_size: Option<u32>,
}

impl Default for RelayMessageLimits {
    fn default() -> Self {
        Self {
            max_size: Some(MAX_MESSAGE_SIZE),
        }
    }
}

impl RelayMessageLimits {
    /// Disable all limits
    #[inline]
    pub fn disable() -> Self {
        Self { max_size: None }
    }
}

/// Events limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayEventLimits {
    /// Maximum size of normalised JSON, in bytes (default: 70_000)
    pub max_size: Option<u32>,
    /// Maximum number of tags allowed (default: 2_000)
    pub max_num_tags: Option<u16>,
}

impl Default for RelayEventLimits {
    fn default() -> Self {
        Self {
            max_size: Some(MAX_EVENT_SIZE),
            max_num_tags: Some(MAX_NUM_TAGS),
        }
    }
}

impl RelayEventLimits {
    /// Disable all limits
    #[inline]
    pub fn disable() -> Self {
        Self {
            max_size: None,
            max_num_tags: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disable_limits() {
        let limits = RelayLimits::disable();
        assert_eq!(limits.messages.max_size, None);
        assert_eq!(limits.events.max_size, None);
        assert_eq!(limits.events.max_num_tags, None);

        let limits = RelayLimits::default();
        assert_eq!(limits.events.max_num_tags, Some(2_000));
    }
}
