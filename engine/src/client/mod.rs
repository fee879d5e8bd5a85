// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Client

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use nostr_core::{Event, EventId, Filter, RelayUrl, SubscriptionId, TryIntoRelayUrl};
use nostr_storage::{Events, NostrDatabase};
use tokio::sync::broadcast;

mod builder;
mod error;
mod notification;
mod options;

pub use self::builder::*;
pub use self::error::Error;
pub use self::notification::*;
pub use self::options::*;
use crate::BoxedStream;
use crate::pool::{Output, RelayPool, RelayPoolBuilder};
use crate::relay::{
    Relay, RelayOptions, ReqExitPolicy, SubscribeAutoCloseOptions, SyncOptions, SyncSummary,
};

/// Nostr client
#[derive(Debug, Clone)]
pub struct Client {
    pool: RelayPool,
    opts: ClientOptions,
}

impl Default for Client {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Construct a new default client
    ///
    /// Use the [`Client::builder`] to configure the client (i.e., set an admission policy).
    #[inline]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Construct client
    ///
    /// # Example
    /// ```rust,no_run
    /// use nostr_engine::prelude::*;
    ///
    /// let client: Client = Client::builder()
    ///     .database(MemoryDatabase::unbounded())
    ///     .build();
    /// ```
    #[inline]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    fn from_builder(builder: ClientBuilder) -> Self {
        let pool_builder: RelayPoolBuilder = RelayPoolBuilder {
            websocket_transport: builder.websocket_transport,
            admit_policy: builder.admit_policy,
            database: builder.database,
            executor: builder.executor,
            opts: builder.opts.pool_options(),
        };

        Self {
            pool: pool_builder.build(),
            opts: builder.opts,
        }
    }

    /// Get relay pool
    #[inline]
    pub fn pool(&self) -> &RelayPool {
        &self.pool
    }

    /// Get database
    #[inline]
    pub fn database(&self) -> &Arc<dyn NostrDatabase> {
        self.pool.database()
    }

    /// Completely shutdown client
    ///
    /// Relays are disconnected and removed and [`ClientNotification::Shutdown`] is sent.
    #[inline]
    pub async fn shutdown(&self) {
        self.pool.shutdown().await
    }

    /// Get new notification listener
    ///
    /// <div class="warning">When you call this method, you subscribe to the notifications channel from that precise moment. Anything received by relay/s before that moment is not included in the channel!</div>
    #[inline]
    pub fn notifications(&self) -> broadcast::Receiver<ClientNotification> {
        self.pool.notifications()
    }

    /// Get relays
    #[inline]
    pub async fn relays(&self) -> HashMap<RelayUrl, Relay> {
        self.pool.relays().await
    }

    /// Get a previously added [`Relay`]
    #[inline]
    pub async fn relay<U>(&self, url: U) -> Result<Relay, Error>
    where
        U: TryIntoRelayUrl,
    {
        Ok(self.pool.relay(url).await?)
    }

    /// Add relay
    ///
    /// The relay options are built from the [`ClientOptions`].
    /// Returns `Ok(false)` if the relay was already added.
    ///
    /// # Example
    /// ```rust,no_run
    /// # use nostr_engine::prelude::*;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = Client::default();
    /// client.add_relay("wss://relay.damus.io").await?;
    /// client.connect().await;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn add_relay<U>(&self, url: U) -> Result<bool, Error>
    where
        U: TryIntoRelayUrl,
    {
        let opts: RelayOptions = self.opts.relay_options();
        Ok(self.pool.add_relay(url, opts).await?)
    }

    /// Add relay with custom options
    #[inline]
    pub async fn add_relay_with_opts<U>(&self, url: U, opts: RelayOptions) -> Result<bool, Error>
    where
        U: TryIntoRelayUrl,
    {
        Ok(self.pool.add_relay(url, opts).await?)
    }

    /// Remove and disconnect relay
    #[inline]
    pub async fn remove_relay<U>(&self, url: U) -> Result<bool, Error>
    where
        U: TryIntoRelayUrl,
    {
        Ok(self.pool.remove_relay(url).await?)
    }

    /// Disconnect and remove all relays
    #[inline]
    pub async fn remove_all_relays(&self) {
        self.pool.remove_all_relays().await
    }

    /// Connect to the relays
    ///
    /// The connections are established in background: use [`Client::wait_for_connection`]
    /// or [`Client::try_connect`] to wait for them.
    #[inline]
    pub async fn connect(&self) {
        self.pool.connect().await
    }

    /// Wait for the relays to connect, up to `timeout` for each relay
    #[inline]
    pub async fn wait_for_connection(&self, timeout: Duration) {
        self.pool.wait_for_connection(timeout).await
    }

    /// Try to connect to the relays, without automatic reconnection for the failed ones
    #[inline]
    pub async fn try_connect(&self, timeout: Duration) -> Output<()> {
        self.pool.try_connect(timeout).await
    }

    /// Disconnect from all relays
    #[inline]
    pub async fn disconnect(&self) {
        self.pool.disconnect().await
    }

    /// Get long-lived subscriptions
    #[inline]
    pub async fn subscriptions(&self) -> HashMap<SubscriptionId, Vec<Filter>> {
        self.pool.subscriptions().await
    }

    /// Subscribe to filters
    ///
    /// Received events are delivered through [`Client::notifications`].
    /// Without `auto_close` the subscription is long-lived and restored after every reconnection.
    #[inline]
    pub async fn subscribe<F>(
        &self,
        filters: F,
        auto_close: Option<SubscribeAutoCloseOptions>,
    ) -> Result<Output<SubscriptionId>, Error>
    where
        F: Into<Vec<Filter>>,
    {
        Ok(self.pool.subscribe(filters.into(), None, auto_close).await?)
    }

    /// Subscribe to filters with a custom [`SubscriptionId`]
    #[inline]
    pub async fn subscribe_with_id<F>(
        &self,
        id: SubscriptionId,
        filters: F,
        auto_close: Option<SubscribeAutoCloseOptions>,
    ) -> Result<Output<SubscriptionId>, Error>
    where
        F: Into<Vec<Filter>>,
    {
        Ok(self
            .pool
            .subscribe(filters.into(), Some(id), auto_close)
            .await?)
    }

    /// Unsubscribe
    #[inline]
    pub async fn unsubscribe(&self, id: &SubscriptionId) {
        self.pool.unsubscribe(id).await
    }

    /// Unsubscribe from all long-lived subscriptions
    #[inline]
    pub async fn unsubscribe_all(&self) {
        self.pool.unsubscribe_all().await
    }

    /// Fetch events from the relays
    ///
    /// Each relay subscription closes on EOSE or when `timeout` elapses.
    /// Events are de-duplicated; the ones rejected by the admission policy or failing verification are skipped.
    ///
    /// # Example
    /// ```rust,no_run
    /// # use std::time::Duration;
    /// # use nostr_engine::prelude::*;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # let client = Client::default();
    /// let filter = Filter::new().kind(Kind::TextNote).limit(10);
    /// let events: Events = client.fetch_events(filter, Duration::from_secs(10)).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn fetch_events<F>(&self, filters: F, timeout: Duration) -> Result<Events, Error>
    where
        F: Into<Vec<Filter>>,
    {
        Ok(self
            .pool
            .fetch_events(filters.into(), Some(timeout), ReqExitPolicy::ExitOnEOSE)
            .await?)
    }

    /// Stream events from the relays
    ///
    /// The stream ends when `timeout` elapses. Dropping it closes the relay subscriptions.
    pub async fn stream_events<F>(
        &self,
        filters: F,
        timeout: Duration,
    ) -> Result<BoxedStream<Event>, Error>
    where
        F: Into<Vec<Filter>>,
    {
        let stream = self
            .pool
            .stream_events(filters.into(), Some(timeout), ReqExitPolicy::KeepOpen)
            .await?;

        Ok(Box::pin(stream.filter_map(|(url, res)| async move {
            match res {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::error!(url = %url, error = %e, "Relay stream failed.");
                    None
                }
            }
        })))
    }

    /// Send event to all relays
    ///
    /// Waits for the `OK` of every relay: check [`Output::success`] and [`Output::failed`].
    #[inline]
    pub async fn send_event(&self, event: &Event) -> Result<Output<EventId>, Error> {
        Ok(self.pool.send_event(event).await?)
    }

    /// Reconcile the local events matching the filter with all relays
    #[inline]
    pub async fn sync(
        &self,
        filter: Filter,
        opts: &SyncOptions,
    ) -> Result<Output<SyncSummary>, Error> {
        Ok(self.pool.sync(filter, opts.clone()).await?)
    }

    /// Handle notifications
    ///
    /// The function must return `true` to exit.
    /// Exits also when [`ClientNotification::Shutdown`] is received.
    pub async fn handle_notifications<F, Fut>(&self, func: F) -> Result<(), Error>
    where
        F: Fn(ClientNotification) -> Fut,
        Fut: Future<Output = nostr_core::Result<bool>>,
    {
        let mut notifications = self.notifications();
        while let Ok(notification) = notifications.recv().await {
            let shutdown: bool = ClientNotification::Shutdown == notification;
            let exit: bool = func(notification)
                .await
                .map_err(|e| Error::Handler(e.to_string()))?;
            if exit || shutdown {
                break;
            }
        }
        Ok(())
    }
}
