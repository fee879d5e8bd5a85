// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_utility::time;
use async_wsocket::ConnectionMode;
use atomic_destructor::AtomicDestructor;
use nostr_core::{ClientMessage, Event, Filter, RelayUrl, SubscriptionId};
use tokio::sync::broadcast;

mod api;
mod builder;
mod constants;
mod error;
mod inner;
mod limits;
mod notification;
mod options;
mod status;

pub(crate) use self::api::events_collection;
pub use self::api::*;
pub use self::builder::*;
pub use self::constants::{MAX_EVENT_SIZE, MAX_MESSAGE_SIZE, MAX_NUM_TAGS};
pub use self::error::Error;
use self::inner::InnerRelay;
pub use self::limits::*;
pub use self::notification::*;
pub use self::options::*;
pub use self::status::*;
use crate::client::ClientNotification;
use crate::shared::SharedState;

/// Why an auto-closing subscription ended
#[derive(Debug, Clone, PartialEq, Eq)]
enum SubscriptionAutoClosedReason {
    /// Closed by the relay with an error
    Closed(String),
    /// Exit condition reached
    Completed,
}

#[derive(Debug)]
enum SubscriptionActivity {
    /// Event matching the subscription
    ReceivedEvent(Event),
    /// No more events will follow
    Closed(SubscriptionAutoClosedReason),
}

/// Relay
///
/// Cheap to clone. When the last handle is dropped the relay is shut down.
#[derive(Debug, Clone)]
pub struct Relay {
    inner: AtomicDestructor<InnerRelay>,
}

impl PartialEq for Relay {
    fn eq(&self, other: &Self) -> bool {
        self.inner.url == other.inner.url
    }
}

impl Eq for Relay {}

impl Relay {
    fn from_inner(inner: InnerRelay) -> Self {
        Self {
            inner: AtomicDestructor::new(inner),
        }
    }

    /// Relay owned by a pool: notifications are forwarded to the pool channel too
    pub(crate) fn pooled(
        url: RelayUrl,
        state: SharedState,
        opts: RelayOptions,
        notification_sender: broadcast::Sender<ClientNotification>,
    ) -> Self {
        let mut inner: InnerRelay = InnerRelay::new(url, state, opts);
        inner.set_notification_sender(notification_sender);
        Self::from_inner(inner)
    }

    /// Relay with default options, backed by an in-memory database
    ///
    /// See [`Relay::builder`] for a custom database, transport or policy.
    #[inline]
    pub fn new(url: RelayUrl) -> Self {
        Self::builder(url).build()
    }

    /// Relay builder
    #[inline]
    pub fn builder(url: RelayUrl) -> RelayBuilder {
        RelayBuilder::new(url)
    }

    fn from_builder(builder: RelayBuilder) -> Self {
        let state: SharedState = SharedState::new(
            builder.database,
            builder.websocket_transport,
            builder.admit_policy,
            builder.executor,
        );

        Self::from_inner(InnerRelay::new(builder.url, state, builder.opts))
    }

    /// Relay url
    #[inline]
    pub fn url(&self) -> &RelayUrl {
        &self.inner.url
    }

    /// How the websocket is reached
    #[inline]
    pub fn connection_mode(&self) -> &ConnectionMode {
        self.inner.connection_mode()
    }

    /// Current status
    #[inline]
    pub fn status(&self) -> RelayStatus {
        self.inner.status()
    }

    /// Long-lived subscriptions and their filters
    #[inline]
    pub async fn subscriptions(&self) -> HashMap<SubscriptionId, Vec<Filter>> {
        self.inner.subscriptions().await
    }

    /// Filters of a subscription
    #[inline]
    pub async fn subscription(&self, id: &SubscriptionId) -> Option<Vec<Filter>> {
        self.inner.subscription(id).await
    }

    /// Relay options
    #[inline]
    pub fn opts(&self) -> &RelayOptions {
        &self.inner.opts
    }

    /// Number of successful connections
    #[inline]
    pub fn sessions(&self) -> usize {
        self.inner.sessions()
    }

    /// Number of connection attempts
    #[inline]
    pub fn attempts(&self) -> usize {
        self.inner.attempts()
    }

    /// Listen to the notifications of this relay
    ///
    /// <div class="warning">Only notifications sent after this call are received.</div>
    #[inline]
    pub fn notifications(&self) -> broadcast::Receiver<RelayNotification> {
        self.inner.internal_notification_sender.subscribe()
    }

    /// Start the connection task and return
    ///
    /// No-op unless the relay is [`RelayStatus::Initialized`] or [`RelayStatus::Terminated`].
    /// The task keeps reconnecting after failures while [`RelayOptions::reconnect`] is enabled.
    pub fn connect(&self) {
        if !self.status().can_connect() {
            return;
        }

        // Pending, not initialized: messages sent from now on are queued
        self.inner.set_status(RelayStatus::Pending, false);

        self.inner.spawn_connection_task(None);
    }

    /// Wait at most `timeout` for the relay to be connected
    ///
    /// Returns immediately if the relay is connected or permanently disconnected.
    pub async fn wait_for_connection(&self, timeout: Duration) {
        let status: RelayStatus = self.status();

        if status.is_connected() || status.is_permanently_disconnected() {
            return;
        }

        let mut notifications = self.notifications();

        time::timeout(Some(timeout), async {
            while let Ok(notification) = notifications.recv().await {
                if let RelayNotification::RelayStatus { status } = notification {
                    if status.is_connected() || status.is_permanently_disconnected() {
                        break;
                    }
                }
            }
        })
        .await;
    }

    /// Connect once, reporting the outcome
    ///
    /// Unlike [`Relay::connect`], the connection task is spawned only if the first attempt succeeds,
    /// so no retry is scheduled on failure.
    ///
    /// Returns an error if the connection fails, is rejected by the admission policy or if the relay has been banned.
    #[inline]
    pub fn try_connect(&self) -> TryConnect {
        TryConnect::new(self)
    }

    /// Close the connection and stop reconnecting: the status becomes [`RelayStatus::Terminated`].
    #[inline]
    pub fn disconnect(&self) {
        self.inner.disconnect()
    }

    /// Disconnect for good: the status becomes [`RelayStatus::Banned`].
    ///
    /// Only [`Relay::shutdown`] can move it out of this status.
    #[inline]
    pub fn ban(&self) {
        self.inner.ban()
    }

    /// Release the relay: the status becomes [`RelayStatus::Shutdown`].
    #[inline]
    pub fn shutdown(&self) {
        self.inner.shutdown()
    }

    /// Queue a message for the relay
    #[inline]
    pub async fn send_msg(&self, msg: ClientMessage) -> Result<(), Error> {
        self.inner.send_msg(msg, None).await
    }

    /// Publish an event, waiting for the relay `OK`
    #[inline]
    pub fn send_event<'event>(&self, event: &'event Event) -> SendEvent<'_, 'event> {
        SendEvent::new(self, event)
    }

    #[cfg(test)]
    pub(crate) async fn subscriptions_count(&self) -> usize {
        self.inner.subscriptions_count().await
    }

    /// Register a long-lived subscription without sending it: the REQ goes out once connected
    #[inline]
    pub(crate) async fn inherit_subscription(&self, id: SubscriptionId, filters: Vec<Filter>) {
        self.inner.update_subscription(id, filters).await;
    }

    /// Send the REQ of long-lived subscriptions closed by the relay or not sent in this session
    #[inline]
    pub async fn resubscribe(&self) -> Result<(), Error> {
        self.inner.resubscribe().await
    }

    /// Open a subscription
    ///
    /// By default the subscription is long-lived and is sent again after every reconnection.
    /// Use [`Subscribe::close_on`] to automatically close it.
    #[inline]
    pub fn subscribe<F>(&self, filters: F) -> Subscribe
    where
        F: Into<Vec<Filter>>,
    {
        Subscribe::new(self, filters.into())
    }

    /// Close a long-lived subscription
    ///
    /// `Ok(false)` if no such subscription exists.
    #[inline]
    pub async fn unsubscribe(&self, id: &SubscriptionId) -> Result<bool, Error> {
        self.inner.unsubscribe(id).await
    }

    /// Unsubscribe from all long-lived subscriptions
    #[inline]
    pub async fn unsubscribe_all(&self) -> Result<(), Error> {
        self.inner.unsubscribe_all().await
    }

    /// Events of an auto-closing subscription, as they arrive
    #[inline]
    pub fn stream_events<F>(&self, filters: F) -> StreamEvents
    where
        F: Into<Vec<Filter>>,
    {
        StreamEvents::new(self, filters.into())
    }

    /// Collect the events of an auto-closing subscription
    #[inline]
    pub fn fetch_events<F>(&self, filters: F) -> FetchEvents
    where
        F: Into<Vec<Filter>>,
    {
        FetchEvents::new(self, filters.into())
    }

    /// Reconcile the events matching the filter with the relay
    #[inline]
    pub fn sync(&self, filter: Filter) -> SyncEvents {
        SyncEvents::new(self, filter)
    }

    /// Run `func` on every notification
    ///
    /// Exits when the handler returns `true` or when the relay is permanently disconnected.
    pub async fn handle_notifications<F, Fut>(&self, func: F) -> Result<(), Error>
    where
        F: Fn(RelayNotification) -> Fut,
        Fut: Future<Output = nostr_core::Result<bool>>,
    {
        let mut notifications = self.notifications();
        while let Ok(notification) = notifications.recv().await {
            let stop: bool = match &notification {
                RelayNotification::RelayStatus { status } => status.is_permanently_disconnected(),
                _ => false,
            };
            let exit: bool = func(notification)
                .await
                .map_err(|e| Error::Handler(e.to_string()))?;
            if exit || stop {
                break;
            }
        }
        Ok(())
    }
}
