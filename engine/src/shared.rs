// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use nostr_core::policy::{AdmitPolicy, AdmitStatus};
use nostr_core::{Event, EventId, RelayUrl, SubscriptionId, event};
use nostr_storage::NostrDatabase;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::transport::websocket::WebSocketTransport;

const MAX_VERIFICATION_CACHE_SIZE: NonZeroUsize = NonZeroUsize::new(32_768).unwrap();

/// Event ID and serialized signature of an event that passed verification
type VerifiedKey = (EventId, [u8; 64]);

/// State shared by every relay of a client
#[derive(Debug, Clone)]
pub(crate) struct SharedState {
    database: Arc<dyn NostrDatabase>,
    pub(crate) transport: Arc<dyn WebSocketTransport>,
    verification_cache: Arc<Mutex<LruCache<VerifiedKey, ()>>>,
    pub(crate) admit_policy: Option<Arc<dyn AdmitPolicy>>,
    executor: Option<Handle>,
}

impl SharedState {
    pub(crate) fn new(
        database: Arc<dyn NostrDatabase>,
        transport: Arc<dyn WebSocketTransport>,
        admit_policy: Option<Arc<dyn AdmitPolicy>>,
        executor: Option<Handle>,
    ) -> Self {
        Self {
            database,
            transport,
            verification_cache: Arc::new(Mutex::new(LruCache::new(MAX_VERIFICATION_CACHE_SIZE))),
            admit_policy,
            executor,
        }
    }

    #[inline]
    pub(crate) fn database(&self) -> &Arc<dyn NostrDatabase> {
        &self.database
    }

    /// Spawn a task on the configured executor, or on the current runtime.
    pub(crate) fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        match &self.executor {
            Some(handle) => handle.spawn(future),
            None => tokio::spawn(future),
        }
    }

    /// Verify the event signature, skipping events already verified with the same signature.
    ///
    /// The id must have been checked against the body by the caller.
    pub(crate) async fn verify_signature(&self, event: &Event) -> Result<(), event::Error> {
        let key: VerifiedKey = (event.id, event.sig.serialize());

        let mut cache = self.verification_cache.lock().await;
        if cache.get(&key).is_some() {
            return Ok(());
        }

        if !event.verify_signature() {
            return Err(event::Error::InvalidSignature);
        }

        cache.put(key, ());
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn verification_cache_is_empty(&self) -> bool {
        self.verification_cache.lock().await.is_empty()
    }

    /// Run the connection admission policy
    ///
    /// A policy error counts as a rejection.
    pub(crate) async fn admit_connection(&self, url: &RelayUrl) -> AdmitStatus {
        let Some(policy) = &self.admit_policy else {
            return AdmitStatus::Success;
        };

        let res = policy.admit_connection(url).await;

        if let Err(e) = &res {
            tracing::error!(url = %url, error = %e, "Connection admission policy failed.");
        }

        AdmitStatus::from_result(res)
    }

    /// Run the event admission policy
    ///
    /// A policy error counts as a rejection.
    pub(crate) async fn admit_event(
        &self,
        url: &RelayUrl,
        subscription_id: &SubscriptionId,
        event: &Event,
    ) -> AdmitStatus {
        let Some(policy) = &self.admit_policy else {
            return AdmitStatus::Success;
        };

        let res = policy.admit_event(url, Some(subscription_id), event).await;

        if let Err(e) = &res {
            tracing::error!(url = %url, id = %event.id, error = %e, "Event admission policy failed.");
        }

        AdmitStatus::from_result(res)
    }
}
