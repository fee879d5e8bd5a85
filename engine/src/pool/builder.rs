// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

use std::sync::Arc;

use nostr_core::policy::AdmitPolicy;
use nostr_storage::NostrDatabase;
use tokio::runtime::Handle;

use super::RelayPool;
use crate::transport::websocket::WebSocketTransport;

/// Capacity of the pool notification channel
pub const DEFAULT_NOTIFICATION_CHANNEL_SIZE: usize = 4096;

/// Limits shared by every relay of a [`RelayPool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayPoolOptions {
    /// Reject new relays once the pool holds this many (default: unlimited)
    pub max_relays: Option<usize>,
    /// Notifications buffered for slow receivers before they start lagging
    pub notification_channel_size: usize,
}

impl Default for RelayPoolOptions {
    fn default() -> Self {
        Self {
            max_relays: None,
            notification_channel_size: DEFAULT_NOTIFICATION_CHANNEL_SIZE,
        }
    }
}

pub(crate) struct RelayPoolBuilder {
    pub(crate) websocket_transport: Arc<dyn WebSocketTransport>,
    pub(crate) admit_policy: Option<Arc<dyn AdmitPolicy>>,
    pub(crate) database: Arc<dyn NostrDatabase>,
    pub(crate) executor: Option<Handle>,
    pub(crate) opts: RelayPoolOptions,
}

impl RelayPoolBuilder {
    #[inline]
    pub(crate) fn build(self) -> RelayPool {
        RelayPool::from_builder(self)
    }
}
