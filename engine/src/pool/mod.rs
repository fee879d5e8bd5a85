// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay Pool

use std::collections::{HashMap, HashSet};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use atomic_destructor::AtomicDestructor;
use futures::{StreamExt, future, stream};
use nostr_core::{Event, EventId, Filter, RelayUrl, SubscriptionId, TryIntoRelayUrl};
use nostr_storage::{Events, NostrDatabase, SaveEventStatus};
use tokio::sync::{RwLockReadGuard, broadcast, mpsc};

mod builder;
mod error;
mod inner;
mod output;

pub(crate) use self::builder::RelayPoolBuilder;
pub use self::builder::{DEFAULT_NOTIFICATION_CHANNEL_SIZE, RelayPoolOptions};
pub use self::error::Error;
use self::inner::{InnerRelayPool, Relays};
pub use self::output::Output;
use crate::BoxedStream;
use crate::client::ClientNotification;
use crate::relay::{
    self, Relay, RelayOptions, ReqExitPolicy, SubscribeAutoCloseOptions, SyncOptions,
    SyncSummary, events_collection,
};

/// Relay pool
///
/// Every relay added to the pool shares its database, admission policy and executor.
#[derive(Debug, Clone)]
pub struct RelayPool {
    inner: AtomicDestructor<InnerRelayPool>,
}

impl RelayPool {
    pub(crate) fn from_builder(builder: RelayPoolBuilder) -> Self {
        Self {
            inner: AtomicDestructor::new(InnerRelayPool::from_builder(builder)),
        }
    }

    /// Check if the relay pool is shutdown.
    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown()
    }

    /// Completely shutdown pool
    ///
    /// This method disconnects and removes all relays from the [`RelayPool`] and then
    /// sends [`ClientNotification::Shutdown`] notification.
    ///
    /// After this method has been called, the [`RelayPool`] can no longer be used.
    #[inline]
    pub async fn shutdown(&self) {
        self.inner.shutdown().await
    }

    /// Get a new notification listener
    ///
    /// <div class="warning">When you call this method, you subscribe to the notifications channel from that precise moment. Anything received by relay/s before that moment is not included in the channel!</div>
    #[inline]
    pub fn notifications(&self) -> broadcast::Receiver<ClientNotification> {
        self.inner.notification_sender.subscribe()
    }

    /// Get database
    #[inline]
    pub fn database(&self) -> &Arc<dyn NostrDatabase> {
        self.inner.state.database()
    }

    /// Get relays
    pub async fn relays(&self) -> HashMap<RelayUrl, Relay> {
        let relays = self.inner.atomic.relays.read().await;
        relays.clone()
    }

    fn internal_relay<'a>(
        &self,
        relays: &'a RwLockReadGuard<'_, Relays>,
        url: &RelayUrl,
    ) -> Result<&'a Relay, Error> {
        relays
            .get(url)
            .ok_or_else(|| Error::RelayNotFound(url.clone()))
    }

    /// Get relay
    pub async fn relay<U>(&self, url: U) -> Result<Relay, Error>
    where
        U: TryIntoRelayUrl,
    {
        let url: RelayUrl = url.try_into_relay_url()?;
        let relays = self.inner.atomic.relays.read().await;
        self.internal_relay(&relays, &url).cloned()
    }

    /// Add new relay
    ///
    /// Returns `Ok(false)` if the relay was already added.
    /// Long-lived subscriptions of the pool are inherited by the new relay.
    /// The relay is not connected: call [`RelayPool::connect`] or [`Relay::connect`].
    pub async fn add_relay<U>(&self, url: U, opts: RelayOptions) -> Result<bool, Error>
    where
        U: TryIntoRelayUrl,
    {
        if self.is_shutdown() {
            return Err(Error::Shutdown);
        }

        let url: RelayUrl = url.try_into_relay_url()?;

        let mut relays = self.inner.atomic.relays.write().await;

        if relays.contains_key(&url) {
            return Ok(false);
        }

        if let Some(max) = self.inner.opts.max_relays {
            if relays.len() >= max {
                return Err(Error::TooManyRelays { limit: max });
            }
        }

        let relay: Relay = Relay::pooled(
            url.clone(),
            self.inner.state.clone(),
            opts,
            self.inner.notification_sender.clone(),
        );

        let subscriptions = self.inner.atomic.inherit_subscriptions.read().await;
        for (id, filters) in subscriptions.iter() {
            relay.inherit_subscription(id.clone(), filters.clone()).await;
        }

        tracing::debug!(url = %url, "Relay added to the pool.");

        relays.insert(url, relay);

        Ok(true)
    }

    /// Remove and disconnect a relay
    ///
    /// Returns `Ok(false)` if the relay wasn't in the pool.
    pub async fn remove_relay<U>(&self, url: U) -> Result<bool, Error>
    where
        U: TryIntoRelayUrl,
    {
        let url: RelayUrl = url.try_into_relay_url()?;
        let mut relays = self.inner.atomic.relays.write().await;
        match relays.remove(&url) {
            Some(relay) => {
                relay.disconnect();
                tracing::debug!(url = %url, "Relay removed from the pool.");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Disconnect and remove all relays
    pub async fn remove_all_relays(&self) {
        let mut relays = self.inner.atomic.relays.write().await;
        for relay in relays.values() {
            relay.disconnect();
        }
        relays.clear();
    }

    /// Connect to all added relays
    ///
    /// Spawns the connection tasks and returns immediately.
    pub async fn connect(&self) {
        let relays = self.inner.atomic.relays.read().await;
        for relay in relays.values() {
            relay.connect();
        }
    }

    /// Wait for the relays to connect, up to `timeout` for each relay
    pub async fn wait_for_connection(&self, timeout: Duration) {
        let relays = self.inner.atomic.relays.read().await;
        future::join_all(relays.values().map(|r| r.wait_for_connection(timeout))).await;
    }

    /// Try to establish a connection with every relay
    ///
    /// Relays that fail are listed in [`Output::failed`] and not retried.
    pub async fn try_connect(&self, timeout: Duration) -> Output<()> {
        let relays = self.inner.atomic.relays.read().await;

        let mut urls: Vec<RelayUrl> = Vec::with_capacity(relays.len());
        let mut futures = Vec::with_capacity(relays.len());

        for (url, relay) in relays.iter() {
            urls.push(url.clone());
            futures.push(relay.try_connect().timeout(timeout).into_future());
        }

        let awaited = future::join_all(futures).await;

        let mut output: Output<()> = Output::default();
        for (url, res) in urls.into_iter().zip(awaited.into_iter()) {
            output.record(url, res);
        }
        output
    }

    /// Disconnect from all relays
    pub async fn disconnect(&self) {
        let relays = self.inner.atomic.relays.read().await;
        for relay in relays.values() {
            relay.disconnect();
        }
    }

    /// Long-lived subscriptions of the pool
    pub async fn subscriptions(&self) -> HashMap<SubscriptionId, Vec<Filter>> {
        let subscriptions = self.inner.atomic.inherit_subscriptions.read().await;
        subscriptions.clone()
    }

    /// Get a long-lived subscription
    pub async fn subscription(&self, id: &SubscriptionId) -> Option<Vec<Filter>> {
        let subscriptions = self.inner.atomic.inherit_subscriptions.read().await;
        subscriptions.get(id).cloned()
    }

    /// Send event to all relays and wait for their `OK`
    ///
    /// The event is saved into the database first.
    /// Returns an error only if the pool has no relays.
    pub async fn send_event(&self, event: &Event) -> Result<Output<EventId>, Error> {
        let relays = self.inner.atomic.relays.read().await;

        if relays.is_empty() {
            return Err(Error::NoRelays);
        }

        if let SaveEventStatus::Rejected(reason) = self.database().save_event(event).await? {
            tracing::debug!(id = %event.id, reason = ?reason, "Sent event not saved locally.");
        }

        let mut urls: Vec<RelayUrl> = Vec::with_capacity(relays.len());
        let mut futures = Vec::with_capacity(relays.len());

        for (url, relay) in relays.iter() {
            urls.push(url.clone());
            futures.push(relay.send_event(event).into_future());
        }

        let awaited = future::join_all(futures).await;

        let mut output: Output<EventId> = Output::new(event.id);
        for (url, res) in urls.into_iter().zip(awaited.into_iter()) {
            if let Err(e) = &res {
                tracing::error!(url = %url, error = %e, "Failed to send event.");
            }
            output.record(url, res.map(|_| ()));
        }

        Ok(output)
    }

    /// Subscribe to filters on all relays
    ///
    /// Without `auto_close`, the subscription is long-lived: it is sent again after every reconnection
    /// and inherited by relays added later.
    pub async fn subscribe(
        &self,
        filters: Vec<Filter>,
        id: Option<SubscriptionId>,
        auto_close: Option<SubscribeAutoCloseOptions>,
    ) -> Result<Output<SubscriptionId>, Error> {
        let id: SubscriptionId = id.unwrap_or_else(SubscriptionId::generate);

        let relays = self.inner.atomic.relays.read().await;

        if relays.is_empty() {
            return Err(Error::NoRelays);
        }

        if auto_close.is_none() {
            let mut subscriptions = self.inner.atomic.inherit_subscriptions.write().await;
            subscriptions.insert(id.clone(), filters.clone());
        }

        let mut urls: Vec<RelayUrl> = Vec::with_capacity(relays.len());
        let mut futures = Vec::with_capacity(relays.len());

        for (url, relay) in relays.iter() {
            let mut subscribe = relay.subscribe(filters.clone()).with_id(id.clone());
            if let Some(opts) = auto_close {
                subscribe = subscribe.close_on(opts);
            }
            urls.push(url.clone());
            futures.push(subscribe.into_future());
        }

        let awaited = future::join_all(futures).await;

        let mut output: Output<SubscriptionId> = Output::new(id);
        for (url, res) in urls.into_iter().zip(awaited.into_iter()) {
            output.record(url, res.map(|_| ()));
        }

        Ok(output)
    }

    /// Close a subscription on all relays
    pub async fn unsubscribe(&self, id: &SubscriptionId) {
        {
            let mut subscriptions = self.inner.atomic.inherit_subscriptions.write().await;
            subscriptions.remove(id);
        }

        let relays = self.inner.atomic.relays.read().await;
        for (url, relay) in relays.iter() {
            if let Err(e) = relay.unsubscribe(id).await {
                tracing::error!(url = %url, error = %e, "Can't unsubscribe.");
            }
        }
    }

    /// Close all long-lived subscriptions
    pub async fn unsubscribe_all(&self) {
        {
            let mut subscriptions = self.inner.atomic.inherit_subscriptions.write().await;
            subscriptions.clear();
        }

        let relays = self.inner.atomic.relays.read().await;
        for (url, relay) in relays.iter() {
            if let Err(e) = relay.unsubscribe_all().await {
                tracing::error!(url = %url, error = %e, "Can't unsubscribe all.");
            }
        }
    }

    /// Reconcile the events matching the filter with every relay
    pub async fn sync(&self, filter: Filter, opts: SyncOptions) -> Result<Output<SyncSummary>, Error> {
        let relays = self.inner.atomic.relays.read().await;

        if relays.is_empty() {
            return Err(Error::NoRelays);
        }

        let mut urls: Vec<RelayUrl> = Vec::with_capacity(relays.len());
        let mut futures = Vec::with_capacity(relays.len());

        for (url, relay) in relays.iter() {
            urls.push(url.clone());
            futures.push(relay.sync(filter.clone()).opts(opts.clone()).into_future());
        }

        let awaited = future::join_all(futures).await;

        let mut output: Output<SyncSummary> = Output::default();
        for (url, res) in urls.into_iter().zip(awaited.into_iter()) {
            match res {
                Ok(summary) => {
                    output.merge(summary);
                    output.record::<relay::Error>(url, Ok(()));
                }
                Err(e) => {
                    tracing::error!(url = %url, error = %e, "Sync failed.");
                    output.record(url, Err(e));
                }
            }
        }

        Ok(output)
    }

    /// Stream events from all relays
    ///
    /// Events are de-duplicated across relays. Dropping the stream closes every relay subscription.
    /// Fails only if no relay could open the subscription.
    pub async fn stream_events(
        &self,
        filters: Vec<Filter>,
        timeout: Option<Duration>,
        policy: ReqExitPolicy,
    ) -> Result<BoxedStream<(RelayUrl, Result<Event, relay::Error>)>, Error> {
        let relays = self.inner.atomic.relays.read().await;

        if relays.is_empty() {
            return Err(Error::NoRelays);
        }

        let mut urls: Vec<RelayUrl> = Vec::with_capacity(relays.len());
        let mut futures = Vec::with_capacity(relays.len());

        for (url, relay) in relays.iter() {
            urls.push(url.clone());
            futures.push(
                relay
                    .stream_events(filters.clone())
                    .maybe_timeout(timeout)
                    .policy(policy)
                    .into_future(),
            );
        }

        let awaited = future::join_all(futures).await;

        let mut streams = Vec::with_capacity(awaited.len());
        let mut last_error: Option<relay::Error> = None;

        for (url, res) in urls.into_iter().zip(awaited.into_iter()) {
            match res {
                Ok(stream) => streams.push(stream.map(move |res| (url.clone(), res))),
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Can't stream events.");
                    last_error = Some(e);
                }
            }
        }

        if streams.is_empty() {
            if let Some(e) = last_error {
                return Err(Error::Relay(e));
            }
        }

        // The events are de-duplicated and the send awaits, so a huge capacity isn't necessary
        let (tx, mut rx) = mpsc::channel(1024);

        // Single driver task: polls all streams, de-duplicates, forwards
        self.inner.state.spawn(async move {
            let mut ids: HashSet<EventId> = HashSet::new();
            let mut merged = stream::select_all(streams);

            loop {
                tokio::select! {
                    item = merged.next() => match item {
                        Some((url, Ok(event))) => {
                            if ids.insert(event.id) && tx.send((url, Ok(event))).await.is_err() {
                                break;
                            }
                        }
                        Some((url, Err(e))) => {
                            if tx.send((url, Err(e))).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                    // Stream dropped: dropping the relay streams closes their subscriptions
                    _ = tx.closed() => break,
                }
            }

            tracing::trace!("Pool stream driver exited.");
        });

        Ok(Box::pin(stream::poll_fn(move |cx| rx.poll_recv(cx))))
    }

    /// Fetch events from all relays
    ///
    /// Events are de-duplicated; per-relay errors are logged and skipped.
    pub async fn fetch_events(
        &self,
        filters: Vec<Filter>,
        timeout: Option<Duration>,
        policy: ReqExitPolicy,
    ) -> Result<Events, Error> {
        let mut events: Events = events_collection(&filters, policy);

        let mut stream = self.stream_events(filters, timeout, policy).await?;

        while let Some((url, res)) = stream.next().await {
            match res {
                Ok(event) => {
                    events.insert(event);
                }
                Err(e) => tracing::error!(url = %url, error = %e, "Failed to fetch events."),
            }
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use nostr_core::{EventBuilder, Keys, Kind};
    use nostr_relay_server::MockRelay;
    use nostr_storage_memory::MemoryDatabase;

    use super::*;
    use crate::transport::websocket::DefaultWebsocketTransport;

    fn new_pool(opts: RelayPoolOptions) -> RelayPool {
        RelayPoolBuilder {
            websocket_transport: Arc::new(DefaultWebsocketTransport),
            admit_policy: None,
            database: Arc::new(MemoryDatabase::default()),
            executor: None,
            opts,
        }
        .build()
    }

    #[tokio::test]
    async fn test_add_relay() {
        let pool = new_pool(RelayPoolOptions {
            max_relays: Some(1),
            ..Default::default()
        });

        assert!(pool
            .add_relay("ws://127.0.0.1:6000", RelayOptions::default())
            .await
            .unwrap());
        assert!(!pool
            .add_relay("ws://127.0.0.1:6000", RelayOptions::default())
            .await
            .unwrap());

        assert!(matches!(
            pool.add_relay("ws://127.0.0.1:6001", RelayOptions::default())
                .await
                .unwrap_err(),
            Error::TooManyRelays { limit: 1 }
        ));

        assert!(matches!(
            pool.add_relay("http://127.0.0.1:6001", RelayOptions::default())
                .await
                .unwrap_err(),
            Error::RelayUrl(..)
        ));

        assert!(pool.remove_relay("ws://127.0.0.1:6000").await.unwrap());
        assert!(pool.relays().await.is_empty());
    }

    #[tokio::test]
    async fn test_no_relays() {
        let pool = new_pool(RelayPoolOptions::default());

        let keys = Keys::generate();
        let event = EventBuilder::text_note("test").sign_with_keys(&keys).unwrap();

        assert!(matches!(
            pool.send_event(&event).await.unwrap_err(),
            Error::NoRelays
        ));
        assert!(matches!(
            pool.fetch_events(vec![Filter::new()], None, ReqExitPolicy::ExitOnEOSE)
                .await
                .unwrap_err(),
            Error::NoRelays
        ));
    }

    #[tokio::test]
    async fn test_fetch_events_deduplicated() {
        let mock1 = MockRelay::run().await.unwrap();
        let mock2 = MockRelay::run().await.unwrap();
        let url1 = mock1.url().await;
        let url2 = mock2.url().await;

        let pool = new_pool(RelayPoolOptions::default());
        pool.add_relay(&url1, RelayOptions::default()).await.unwrap();
        pool.add_relay(&url2, RelayOptions::default()).await.unwrap();
        pool.connect().await;
        pool.wait_for_connection(Duration::from_secs(3)).await;

        let keys = Keys::generate();
        for i in 0..3 {
            let event = EventBuilder::text_note(format!("Note #{i}"))
                .sign_with_keys(&keys)
                .unwrap();
            let output = pool.send_event(&event).await.unwrap();
            assert_eq!(output.success.len(), 2);
            assert!(output.failed.is_empty());
        }

        let filter = Filter::new().author(keys.public_key()).kind(Kind::TextNote);
        let events = pool
            .fetch_events(
                vec![filter],
                Some(Duration::from_secs(5)),
                ReqExitPolicy::ExitOnEOSE,
            )
            .await
            .unwrap();

        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn test_send_event_partial_failure() {
        let mock = MockRelay::run().await.unwrap();
        let url = mock.url().await;

        let pool = new_pool(RelayPoolOptions::default());
        pool.add_relay(&url, RelayOptions::default()).await.unwrap();
        pool.add_relay(
            "ws://127.0.0.1:666",
            RelayOptions::default().reconnect(false),
        )
        .await
        .unwrap();

        let output = pool.try_connect(Duration::from_secs(2)).await;
        assert!(output.success.contains(&url));
        assert_eq!(output.failed.len(), 1);

        let keys = Keys::generate();
        let event = EventBuilder::text_note("partial").sign_with_keys(&keys).unwrap();
        let output = pool.send_event(&event).await.unwrap();

        assert_eq!(output.id(), &event.id);
        assert!(output.success.contains(&url));
        assert_eq!(output.failed.len(), 1);

        // Saved locally
        assert!(pool.database().event_by_id(&event.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_dropped_stream_closes_subscriptions() {
        let mock = MockRelay::run().await.unwrap();
        let url = mock.url().await;

        let pool = new_pool(RelayPoolOptions::default());
        pool.add_relay(&url, RelayOptions::default()).await.unwrap();
        pool.try_connect(Duration::from_secs(2)).await;

        let relay = pool.relay(&url).await.unwrap();

        let stream = pool
            .stream_events(vec![Filter::new().kind(Kind::TextNote)], None, ReqExitPolicy::KeepOpen)
            .await
            .unwrap();

        assert_eq!(relay.subscriptions_count().await, 1);

        drop(stream);
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(relay.subscriptions_count().await, 0);
    }

    #[tokio::test]
    async fn test_inherit_subscriptions() {
        let mock = MockRelay::run().await.unwrap();
        let url = mock.url().await;

        let pool = new_pool(RelayPoolOptions::default());
        pool.add_relay("ws://127.0.0.1:6000", RelayOptions::default())
            .await
            .unwrap();

        let filter = Filter::new().kind(Kind::TextNote);
        let output = pool.subscribe(vec![filter.clone()], None, None).await.unwrap();
        let id = output.id().clone();

        pool.add_relay(&url, RelayOptions::default()).await.unwrap();

        let relay = pool.relay(&url).await.unwrap();
        assert_eq!(relay.subscription(&id).await, Some(vec![filter]));

        pool.unsubscribe(&id).await;
        assert!(pool.subscriptions().await.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown() {
        let pool = new_pool(RelayPoolOptions::default());
        let mut notifications = pool.notifications();

        pool.shutdown().await;

        assert!(pool.is_shutdown());
        assert_eq!(
            notifications.recv().await.unwrap(),
            ClientNotification::Shutdown
        );
        assert!(matches!(
            pool.add_relay("ws://127.0.0.1:6000", RelayOptions::default())
                .await
                .unwrap_err(),
            Error::Shutdown
        ));
    }
}
