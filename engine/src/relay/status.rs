// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay status

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug)]
pub(super) struct AtomicRelayStatus {
    value: AtomicU8,
}

impl Default for AtomicRelayStatus {
    fn default() -> Self {
        Self {
            value: AtomicU8::new(RelayStatus::Initialized as u8),
        }
    }
}

impl AtomicRelayStatus {
    #[inline]
    pub(super) fn set(&self, status: RelayStatus) {
        self.value.store(status as u8, Ordering::SeqCst);
    }

    pub(super) fn load(&self) -> RelayStatus {
        RelayStatus::from_u8(self.value.load(Ordering::SeqCst))
    }
}

/// Relay connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RelayStatus {
    /// The relay has just been created.
    Initialized = 0,
    /// The relay will try to connect shortly.
    Pending = 1,
    /// Trying to connect.
    Connecting = 2,
    /// Connected.
    Connected = 3,
    /// The connection failed, but another attempt will occur soon.
    Disconnected = 4,
    /// The connection has been terminated and no retry will occur.
    Terminated = 5,
    /// The relay has been banned.
    Banned = 6,
    /// The relay has been shut down and can't be used anymore.
    Shutdown = 7,
}

impl fmt::Display for RelayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialized => write!(f, "Initialized"),
            Self::Pending => write!(f, "Pending"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Terminated => write!(f, "Terminated"),
            Self::Banned => write!(f, "Banned"),
            Self::Shutdown => write!(f, "Shutdown"),
        }
    }
}

impl RelayStatus {
    // The atomic value is only ever written through `AtomicRelayStatus::set`.
    fn from_u8(val: u8) -> Self {
        match val {
            0 => Self::Initialized,
            1 => Self::Pending,
            2 => Self::Connecting,
            3 => Self::Connected,
            4 => Self::Disconnected,
            5 => Self::Terminated,
            6 => Self::Banned,
            _ => Self::Shutdown,
        }
    }

    #[inline]
    pub(crate) fn is_initialized(&self) -> bool {
        matches!(self, Self::Initialized)
    }

    /// Check if is [`RelayStatus::Connected`]
    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if is `disconnected`, `terminated`, `banned` or `shutdown`.
    #[inline]
    pub fn is_disconnected(&self) -> bool {
        matches!(
            self,
            Self::Disconnected | Self::Terminated | Self::Banned | Self::Shutdown
        )
    }

    /// Check if the relay won't reconnect without an explicit request
    #[inline]
    pub fn is_permanently_disconnected(&self) -> bool {
        matches!(self, Self::Terminated | Self::Banned | Self::Shutdown)
    }

    #[inline]
    pub(crate) fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    #[inline]
    pub(crate) fn is_banned(&self) -> bool {
        matches!(self, Self::Banned)
    }

    #[inline]
    pub(crate) fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }

    /// Check if relay can start a connection (status is `initialized` or `terminated`)
    #[inline]
    pub(crate) fn can_connect(&self) -> bool {
        matches!(self, Self::Initialized | Self::Terminated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_status_round_trip() {
        let status = AtomicRelayStatus::default();
        assert_eq!(status.load(), RelayStatus::Initialized);

        for s in [
            RelayStatus::Pending,
            RelayStatus::Connecting,
            RelayStatus::Connected,
            RelayStatus::Disconnected,
            RelayStatus::Terminated,
            RelayStatus::Banned,
            RelayStatus::Shutdown,
        ] {
            status.set(s);
            assert_eq!(status.load(), s);
        }
    }

    #[test]
    fn test_status_groups() {
        assert!(RelayStatus::Initialized.can_connect());
        assert!(RelayStatus::Terminated.can_connect());
        assert!(!RelayStatus::Banned.can_connect());
        assert!(!RelayStatus::Connected.can_connect());

        assert!(RelayStatus::Disconnected.is_disconnected());
        assert!(!RelayStatus::Disconnected.is_permanently_disconnected());
        assert!(RelayStatus::Shutdown.is_permanently_disconnected());
    }
}
