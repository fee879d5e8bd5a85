// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Client builder

use std::sync::Arc;

use nostr_storage::{IntoNostrDatabase, NostrDatabase};
use nostr_storage_memory::MemoryDatabase;
use tokio::runtime::Handle;

use super::{Client, ClientOptions};
use crate::policy::AdmitPolicy;
use crate::transport::websocket::{
    DefaultWebsocketTransport, IntoWebSocketTransport, WebSocketTransport,
};

/// Client builder
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    /// WebSocket transport
    pub websocket_transport: Arc<dyn WebSocketTransport>,
    /// Admission policy
    pub admit_policy: Option<Arc<dyn AdmitPolicy>>,
    /// Database
    pub database: Arc<dyn NostrDatabase>,
    /// Executor used to spawn the background tasks
    ///
    /// If not set, the current runtime is used.
    pub executor: Option<Handle>,
    /// Client options
    pub opts: ClientOptions,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            websocket_transport: Arc::new(DefaultWebsocketTransport),
            admit_policy: None,
            database: Arc::new(MemoryDatabase::default()),
            executor: None,
            opts: ClientOptions::default(),
        }
    }
}

impl ClientBuilder {
    /// New default client builder
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom WebSocket transport
    ///
    /// By default [`DefaultWebsocketTransport`] is used.
    #[inline]
    pub fn websocket_transport<T>(mut self, transport: T) -> Self
    where
        T: IntoWebSocketTransport,
    {
        self.websocket_transport = transport.into_transport();
        self
    }

    /// Set an admission policy
    ///
    /// # Example
    /// ```rust,no_run
    /// use nostr_engine::prelude::*;
    ///
    /// let mute = MutePolicy::new();
    /// let client = Client::builder().admit_policy(mute.clone()).build();
    /// ```
    #[inline]
    pub fn admit_policy<T>(mut self, policy: T) -> Self
    where
        T: AdmitPolicy + 'static,
    {
        self.admit_policy = Some(Arc::new(policy));
        self
    }

    /// Set database
    #[inline]
    pub fn database<D>(mut self, database: D) -> Self
    where
        D: IntoNostrDatabase,
    {
        self.database = database.into_nostr_database();
        self
    }

    /// Set the executor used to spawn the background tasks
    #[inline]
    pub fn executor(mut self, handle: Handle) -> Self {
        self.executor = Some(handle);
        self
    }

    /// Set opts
    #[inline]
    pub fn opts(mut self, opts: ClientOptions) -> Self {
        self.opts = opts;
        self
    }

    /// Build [`Client`]
    #[inline]
    pub fn build(self) -> Client {
        Client::from_builder(self)
    }
}
