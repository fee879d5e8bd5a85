// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay builder

use std::sync::Arc;

use nostr_core::RelayUrl;
use nostr_core::policy::AdmitPolicy;
use nostr_storage::{IntoNostrDatabase, NostrDatabase};
use nostr_storage_memory::MemoryDatabase;
use tokio::runtime::Handle;

use super::Relay;
use super::options::RelayOptions;
use crate::transport::websocket::{DefaultWebsocketTransport, WebSocketTransport};

/// Relay builder
#[derive(Debug, Clone)]
pub struct RelayBuilder {
    /// Relay URL
    pub url: RelayUrl,
    /// WebSocket transport
    pub websocket_transport: Arc<dyn WebSocketTransport>,
    /// Database
    pub database: Arc<dyn NostrDatabase>,
    /// Admission policy
    pub admit_policy: Option<Arc<dyn AdmitPolicy>>,
    /// Runtime used to spawn the relay tasks
    ///
    /// When not set, tasks are spawned on the runtime of the caller.
    pub executor: Option<Handle>,
    /// Relay options
    pub opts: RelayOptions,
}

impl RelayBuilder {
    /// New relay builder
    #[inline]
    pub fn new(url: RelayUrl) -> Self {
        Self {
            url,
            websocket_transport: Arc::new(DefaultWebsocketTransport),
            database: Arc::new(MemoryDatabase::default()),
            admit_policy: None,
            executor: None,
            opts: RelayOptions::default(),
        }
    }

    /// Set a WebSocket transport
    #[inline]
    pub fn websocket_transport<T>(mut self, transport: T) -> Self
    where
        T: WebSocketTransport + 'static,
    {
        self.websocket_transport = Arc::new(transport);
        self
    }

    /// Set a database
    #[inline]
    pub fn database<T>(mut self, database: T) -> Self
    where
        T: IntoNostrDatabase,
    {
        self.database = database.into_nostr_database();
        self
    }

    /// Admission policy
    #[inline]
    pub fn admit_policy<T>(mut self, policy: T) -> Self
    where
        T: AdmitPolicy + 'static,
    {
        self.admit_policy = Some(Arc::new(policy));
        self
    }

    /// Set the runtime used to spawn tasks
    #[inline]
    pub fn executor(mut self, handle: Handle) -> Self {
        self.executor = Some(handle);
        self
    }

    /// Set options
    #[inline]
    pub fn opts(mut self, opts: RelayOptions) -> Self {
        self.opts = opts;
        self
    }

    /// Build relay
    #[inline]
    pub fn build(self) -> Relay {
        Relay::from_builder(self)
    }
}
