// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

use std::cmp;
use std::collections::HashMap;
use std::future::{self, Future};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_utility::time;
use async_wsocket::{ConnectionMode, Message};
use atomic_destructor::AtomicDestroyer;
use futures::{SinkExt, StreamExt};
use nostr_core::{event, filter};
use nostr_storage::prelude::*;
use rand::Rng;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::{Mutex, MutexGuard, Notify, RwLock, RwLockWriteGuard, broadcast, oneshot};

use super::constants::{
    DEFAULT_CONNECTION_TIMEOUT, JITTER_RANGE, MAX_RETRY_INTERVAL, MIN_ATTEMPTS, MIN_SUCCESS_RATE,
    WEBSOCKET_TX_TIMEOUT,
};
use super::options::{RelayOptions, ReqExitPolicy, SubscribeAutoCloseOptions};
use super::status::AtomicRelayStatus;
use super::{
    Error, RelayNotification, RelayStatus, SubscriptionActivity, SubscriptionAutoClosedReason,
};
use crate::client::ClientNotification;
use crate::shared::SharedState;
use crate::transport::websocket::{WebSocketSink, WebSocketStream};

type ClientMessageJson = String;

/// How an auto-closing subscription ended
struct AutoCloseOutcome {
    /// A `CLOSE` must be sent: the relay still considers the subscription open
    send_close: bool,
    /// Reported to the consumer, if any
    reason: Option<SubscriptionAutoClosedReason>,
}

impl AutoCloseOutcome {
    /// The consumer went away
    fn abandoned() -> Self {
        Self {
            send_close: true,
            reason: None,
        }
    }

    /// Closed by the relay, or by the disconnection
    fn ended_remotely(reason: Option<SubscriptionAutoClosedReason>) -> Self {
        Self {
            send_close: false,
            reason,
        }
    }
}

struct JsonMessageItem {
    json: ClientMessageJson,
    confirmation: Option<oneshot::Sender<()>>,
}

#[derive(Debug)]
struct RelayChannels {
    nostr: (Sender<JsonMessageItem>, Mutex<Receiver<JsonMessageItem>>),
    terminate: Notify,
}

impl RelayChannels {
    fn new() -> Self {
        let (tx_nostr, rx_nostr) = mpsc::channel(1024);

        Self {
            nostr: (tx_nostr, Mutex::new(rx_nostr)),
            terminate: Notify::new(),
        }
    }

    #[inline]
    fn send_client_msg(&self, msg: JsonMessageItem) -> Result<(), Error> {
        self.nostr
            .0
            .try_send(msg)
            .map_err(|_| Error::CantSendMessageToDispatcher)
    }

    #[inline]
    async fn rx_nostr(&self) -> MutexGuard<'_, Receiver<JsonMessageItem>> {
        self.nostr.1.lock().await
    }

    /// Wake every task waiting for termination. No permit is stored.
    #[inline]
    fn terminate(&self) {
        self.terminate.notify_waiters()
    }
}

#[derive(Debug, Default)]
struct SubscriptionData {
    filters: Vec<Filter>,
    /// Connection (by success counter) in which the REQ was last sent
    subscribed_in: Option<usize>,
    is_auto_closing: bool,
    received_eose: bool,
    received_events: AtomicUsize,
    /// Closed by the relay
    closed: bool,
}

// Everything that needs an `Arc` lives here, so cloning the relay costs one atomic increment.
#[derive(Debug)]
struct AtomicPrivateData {
    status: AtomicRelayStatus,
    channels: RelayChannels,
    subscriptions: RwLock<HashMap<SubscriptionId, SubscriptionData>>,
    running: AtomicBool,
    /// Connection attempts
    attempts: AtomicUsize,
    /// Successful connections, also the id of the current websocket session
    sessions: AtomicUsize,
}

#[derive(Debug, Clone)]
pub(crate) struct InnerRelay {
    pub(super) url: RelayUrl,
    atomic: Arc<AtomicPrivateData>,
    pub(super) opts: RelayOptions,
    pub(super) state: SharedState,
    pub(super) internal_notification_sender: broadcast::Sender<RelayNotification>,
    external_notification_sender: Option<broadcast::Sender<ClientNotification>>,
}

impl AtomicDestroyer for InnerRelay {
    fn on_destroy(&self) {
        self.shutdown();
    }
}

impl InnerRelay {
    pub(super) fn new(url: RelayUrl, state: SharedState, opts: RelayOptions) -> Self {
        let (relay_notification_sender, ..) =
            broadcast::channel::<RelayNotification>(opts.notification_channel_size);

        Self {
            url,
            atomic: Arc::new(AtomicPrivateData {
                status: AtomicRelayStatus::default(),
                channels: RelayChannels::new(),
                subscriptions: RwLock::new(HashMap::new()),
                running: AtomicBool::new(false),
                attempts: AtomicUsize::new(0),
                sessions: AtomicUsize::new(0),
            }),
            opts,
            state,
            internal_notification_sender: relay_notification_sender,
            external_notification_sender: None,
        }
    }

    #[inline]
    pub(super) fn attempts(&self) -> usize {
        self.atomic.attempts.load(Ordering::SeqCst)
    }

    #[inline]
    pub(super) fn sessions(&self) -> usize {
        self.atomic.sessions.load(Ordering::SeqCst)
    }

    fn success_rate(&self) -> f64 {
        match self.attempts() {
            0 => 0.0,
            attempts => self.sessions() as f64 / attempts as f64,
        }
    }

    #[inline]
    pub(super) fn connection_mode(&self) -> &ConnectionMode {
        &self.opts.connection_mode
    }

    /// Check if the connection task is running
    #[inline]
    pub(super) fn is_running(&self) -> bool {
        self.atomic.running.load(Ordering::SeqCst)
    }

    #[inline]
    pub(super) fn status(&self) -> RelayStatus {
        self.atomic.status.load()
    }

    pub(super) fn set_status(&self, status: RelayStatus, log: bool) {
        self.atomic.status.set(status);

        if log {
            match status {
                RelayStatus::Initialized => tracing::trace!(url = %self.url, "Relay initialized."),
                RelayStatus::Pending => tracing::trace!(url = %self.url, "Relay is pending."),
                RelayStatus::Connecting => tracing::debug!(url = %self.url, "Connecting to relay."),
                RelayStatus::Connected => tracing::info!(url = %self.url, "Connected to relay."),
                RelayStatus::Disconnected => {
                    tracing::info!(url = %self.url, "Disconnected from relay.")
                }
                RelayStatus::Terminated => {
                    tracing::info!(url = %self.url, "Completely disconnected from relay.")
                }
                RelayStatus::Banned => tracing::info!(url = %self.url, "Relay banned."),
                RelayStatus::Shutdown => tracing::info!(url = %self.url, "Relay shut down."),
            }
        }

        self.send_notification(RelayNotification::RelayStatus { status }, false);
    }

    /// Perform checks to ensure that the relay is ready for use.
    pub(super) fn ensure_operational(&self) -> Result<(), Error> {
        let status: RelayStatus = self.status();

        if status.is_initialized() {
            return Err(Error::NotReady);
        }

        if status.is_banned() {
            return Err(Error::Banned);
        }

        if status.is_shutdown() {
            return Err(Error::Shutdown);
        }

        // No connection task will ever drain the queue
        if status.is_terminated() {
            return Err(Error::NotConnected);
        }

        // While connecting, messages are queued. A relay that keeps failing is treated as not connected.
        if !status.is_connected()
            && self.attempts() > MIN_ATTEMPTS
            && self.success_rate() < MIN_SUCCESS_RATE
        {
            return Err(Error::NotConnected);
        }

        Ok(())
    }

    /// Returns all long-lived (non-auto-closing) subscriptions
    pub(super) async fn subscriptions(&self) -> HashMap<SubscriptionId, Vec<Filter>> {
        let subscriptions = self.atomic.subscriptions.read().await;
        subscriptions
            .iter()
            .filter_map(|(k, v)| (!v.is_auto_closing).then(|| (k.clone(), v.filters.clone())))
            .collect()
    }

    /// Number of subscriptions, auto-closing ones included
    #[cfg(test)]
    pub(super) async fn subscriptions_count(&self) -> usize {
        let subscriptions = self.atomic.subscriptions.read().await;
        subscriptions.len()
    }

    pub(super) async fn subscription(&self, id: &SubscriptionId) -> Option<Vec<Filter>> {
        let subscriptions = self.atomic.subscriptions.read().await;
        subscriptions.get(id).map(|d| d.filters.clone())
    }

    pub(super) async fn remove_subscription(&self, id: &SubscriptionId) {
        let mut subscriptions = self.atomic.subscriptions.write().await;
        subscriptions.remove(id);
    }

    /// Register an auto-closing subscription
    pub(super) async fn add_auto_closing_subscription(
        &self,
        id: SubscriptionId,
        filters: Vec<Filter>,
    ) {
        let mut subscriptions = self.atomic.subscriptions.write().await;
        let data: &mut SubscriptionData = subscriptions.entry(id).or_default();
        data.filters = filters;
        data.is_auto_closing = true;
    }

    pub(super) async fn update_subscription(&self, id: SubscriptionId, filters: Vec<Filter>) {
        let session: usize = self.sessions();
        let mut subscriptions = self.atomic.subscriptions.write().await;
        let data: &mut SubscriptionData = subscriptions.entry(id).or_default();
        data.filters = filters;
        data.subscribed_in = Some(session);
        data.closed = false;
    }

    async fn subscription_closed(&self, id: &SubscriptionId) {
        let mut subscriptions = self.atomic.subscriptions.write().await;
        if let Some(data) = subscriptions.get_mut(id) {
            data.closed = true;
        }
    }

    async fn received_eose(&self, id: &SubscriptionId) {
        let mut subscriptions = self.atomic.subscriptions.write().await;
        if let Some(data) = subscriptions.get_mut(id) {
            data.received_eose = true;
        }
    }

    /// Check if a long-lived subscription must be sent again in the current websocket session
    async fn should_resubscribe(&self, id: &SubscriptionId) -> bool {
        let session: usize = self.sessions();
        let subscriptions = self.atomic.subscriptions.read().await;
        match subscriptions.get(id) {
            Some(SubscriptionData {
                is_auto_closing: false,
                subscribed_in,
                closed,
                ..
            }) => *closed || *subscribed_in != Some(session),
            Some(SubscriptionData {
                is_auto_closing: true,
                ..
            })
            | None => false,
        }
    }

    #[inline]
    pub(super) fn set_notification_sender(
        &mut self,
        notification_sender: broadcast::Sender<ClientNotification>,
    ) {
        self.external_notification_sender = Some(notification_sender);
    }

    fn send_notification(&self, notification: RelayNotification, external: bool) {
        match (external, &self.external_notification_sender) {
            (true, Some(external_notification_sender)) => {
                let _ = self.internal_notification_sender.send(notification.clone());

                let notification: Option<ClientNotification> = match notification {
                    RelayNotification::Event {
                        subscription_id,
                        event,
                    } => Some(ClientNotification::Event {
                        relay_url: self.url.clone(),
                        subscription_id,
                        event,
                    }),
                    RelayNotification::Message { message } => Some(ClientNotification::Message {
                        relay_url: self.url.clone(),
                        message,
                    }),
                    RelayNotification::RelayStatus { .. } => None,
                };

                if let Some(notification) = notification {
                    let _ = external_notification_sender.send(notification);
                }
            }
            _ => {
                let _ = self.internal_notification_sender.send(notification);
            }
        }
    }

    pub(super) fn spawn_connection_task(&self, stream: Option<(WebSocketSink, WebSocketStream)>) {
        // Checked again inside the task, this only avoids a useless clone
        if self.is_running() {
            tracing::warn!(url = %self.url, "Connection task is already running.");
            return;
        }

        let relay: InnerRelay = self.clone();
        self.state.spawn(relay.connection_task(stream));
    }

    /// Must be called only by [`InnerRelay::spawn_connection_task`].
    async fn connection_task(self, mut stream: Option<(WebSocketSink, WebSocketStream)>) {
        // Two tasks may be spawned at the same moment
        if self.atomic.running.swap(true, Ordering::SeqCst) {
            tracing::warn!(url = %self.url, "Connection task is already running.");
            return;
        }

        let mut rx_nostr = self.atomic.channels.rx_nostr().await;

        // Avoid logging the same connection error on every retry
        let mut last_ws_error: Option<String> = None;

        loop {
            if let AdmitStatus::Rejected { reason } = self.state.admit_connection(&self.url).await
            {
                tracing::warn!(
                    url = %self.url,
                    reason = reason.as_deref().unwrap_or_default(),
                    "Connection rejected by admission policy."
                );
                self.set_status(RelayStatus::Terminated, false);
                break;
            }

            // Termination requests are handled inside
            self.connect_and_run(stream.take(), &mut rx_nostr, &mut last_ws_error)
                .await;

            let status: RelayStatus = self.status();

            if status.is_permanently_disconnected() {
                break;
            }

            if self.opts.reconnect {
                if !status.is_disconnected() {
                    self.set_status(RelayStatus::Disconnected, true);
                }

                let interval: Duration = self.calculate_retry_interval();
                tracing::debug!(
                    url = %self.url,
                    secs = interval.as_secs(),
                    "Scheduling reconnection."
                );

                tokio::select! {
                    _ = time::sleep(interval) => {},
                    _ = self.handle_terminate() => break,
                }
            } else {
                self.set_status(RelayStatus::Terminated, true);
                tracing::debug!(url = %self.url, "Reconnection disabled, breaking loop.");
                break;
            }
        }

        self.atomic.running.store(false, Ordering::SeqCst);

        tracing::debug!(url = %self.url, "Auto connect loop terminated.");
    }

    /// Depending on attempts and success, use default or incremental retry interval
    fn calculate_retry_interval(&self) -> Duration {
        if !self.opts.adjust_retry_interval {
            return self.opts.retry_interval;
        }

        let diff: u32 = self.attempts().saturating_sub(self.sessions()) as u32;
        let multiplier: u32 = 1 + (diff / 2);
        let adaptive_interval: Duration = self.opts.retry_interval.saturating_mul(multiplier);

        // Cap before the jitter, or every relay would end up with the same interval
        let interval: Duration = cmp::min(adaptive_interval, MAX_RETRY_INTERVAL);

        // Spread reconnections of many relays that failed at the same time
        let jitter: i8 = rand::rng().random_range(JITTER_RANGE);
        let jitter_secs: Duration = Duration::from_secs(jitter.unsigned_abs() as u64);

        if jitter >= 0 {
            interval.saturating_add(jitter_secs)
        } else {
            interval.saturating_sub(jitter_secs)
        }
    }

    /// Wait for a termination request
    ///
    /// The status is always set before notifying, so checking it after registering the waiter can't miss a request.
    async fn handle_terminate(&self) {
        let notified = self.atomic.channels.terminate.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.status().is_permanently_disconnected() {
            return;
        }

        notified.await;
    }

    pub(super) async fn _try_connect(
        &self,
        timeout: Duration,
        status_on_failure: RelayStatus,
    ) -> Result<(WebSocketSink, WebSocketStream), Error> {
        self.set_status(RelayStatus::Connecting, true);

        self.atomic.attempts.fetch_add(1, Ordering::SeqCst);

        // On termination the connection attempt is dropped, there is nothing to close yet.
        tokio::select! {
            res = self.state.transport.connect(self.url.as_url(), &self.opts.connection_mode, timeout) => match res {
                Ok((ws_tx, ws_rx)) => {
                    // Count the session first: resubscription relies on it.
                    self.atomic.sessions.fetch_add(1, Ordering::SeqCst);
                    self.set_status(RelayStatus::Connected, true);
                    Ok((ws_tx, ws_rx))
                }
                Err(e) => {
                    self.set_status(status_on_failure, false);
                    Err(Error::Transport(e))
                }
            },
            _ = self.handle_terminate() => Err(Error::TerminationRequest),
        }
    }

    /// Connect and run message handlers
    ///
    /// If `stream` is passed, no connection attempt is done.
    async fn connect_and_run(
        &self,
        stream: Option<(WebSocketSink, WebSocketStream)>,
        rx_nostr: &mut MutexGuard<'_, Receiver<JsonMessageItem>>,
        last_ws_error: &mut Option<String>,
    ) {
        match stream {
            Some((ws_tx, ws_rx)) => self.post_connection(ws_tx, ws_rx, rx_nostr).await,
            None => match self
                ._try_connect(DEFAULT_CONNECTION_TIMEOUT, RelayStatus::Disconnected)
                .await
            {
                Ok((ws_tx, ws_rx)) => self.post_connection(ws_tx, ws_rx, rx_nostr).await,
                Err(e) => {
                    let e: String = e.to_string();
                    if last_ws_error.as_ref() != Some(&e) {
                        tracing::error!(url = %self.url, error = %e, "Connection failed.");
                        *last_ws_error = Some(e);
                    }
                }
            },
        }
    }

    /// Run message handlers until one of them exits
    async fn post_connection(
        &self,
        mut ws_tx: WebSocketSink,
        ws_rx: WebSocketStream,
        rx_nostr: &mut MutexGuard<'_, Receiver<JsonMessageItem>>,
    ) {
        if let Err(e) = self.resubscribe().await {
            tracing::error!(url = %self.url, error = %e, "Impossible to subscribe.")
        }

        tokio::select! {
            res = self.sender_message_handler(&mut ws_tx, rx_nostr) => match res {
                Ok(()) => tracing::trace!(url = %self.url, "Relay sender exited."),
                Err(e) => tracing::error!(url = %self.url, error = %e, "Relay sender exited with error.")
            },
            res = self.receiver_message_handler(ws_rx) => match res {
                Ok(()) => tracing::trace!(url = %self.url, "Relay receiver exited."),
                Err(e) => tracing::error!(url = %self.url, error = %e, "Relay receiver exited with error.")
            },
            _ = self.handle_terminate() => {},
        }

        match ws_write(ws_tx.close()).await {
            Ok(..) => tracing::debug!(url = %self.url, "WebSocket connection closed."),
            Err(e) => tracing::error!(url = %self.url, error = %e, "Can't close WebSocket connection."),
        }
    }

    async fn sender_message_handler(
        &self,
        ws_tx: &mut WebSocketSink,
        rx_nostr: &mut MutexGuard<'_, Receiver<JsonMessageItem>>,
    ) -> Result<(), Error> {
        while let Some(JsonMessageItem { json, confirmation }) = rx_nostr.recv().await {
            tracing::debug!(url = %self.url, size = json.len(), "Sending '{json}'");

            ws_write(ws_tx.send(Message::Text(json))).await?;

            if let Some(confirmation) = confirmation {
                if confirmation.send(()).is_err() {
                    tracing::error!(url = %self.url, "Can't send msg confirmation.");
                }
            }
        }

        Ok(())
    }

    async fn receiver_message_handler(&self, mut ws_rx: WebSocketStream) -> Result<(), Error> {
        while let Some(msg) = ws_rx.next().await {
            match msg? {
                Message::Text(json) => self.handle_relay_message(&json).await,
                Message::Binary(_) => {
                    tracing::warn!(url = %self.url, "Binary messages aren't supported.");
                }
                Message::Close(_) => {
                    tracing::info!(url = %self.url, "Connection closed by peer.");
                    break;
                }
                _ => {}
            }
        }

        Ok(())
    }

    async fn handle_relay_message(&self, msg: &str) {
        match self.handle_raw_relay_message(msg).await {
            Ok(Some(message)) => {
                match &message {
                    RelayMessage::Closed {
                        subscription_id,
                        message,
                    } => {
                        // Rate limits and missing auth may clear up before the next session
                        match MachineReadablePrefix::parse(message) {
                            Some(
                                MachineReadablePrefix::RateLimited
                                | MachineReadablePrefix::AuthRequired,
                            ) => self.subscription_closed(subscription_id).await,
                            _ => {
                                tracing::debug!(url = %self.url, id = %subscription_id, "Subscription closed by relay, dropping it.");
                                self.remove_subscription(subscription_id).await;
                            }
                        }
                    }
                    RelayMessage::EndOfStoredEvents(id) => {
                        self.received_eose(id).await;
                    }
                    RelayMessage::Notice(notice) => {
                        tracing::warn!(url = %self.url, notice = %notice, "Received notice.");
                    }
                    _ => (),
                }

                self.send_notification(RelayNotification::Message { message }, true);
            }
            Ok(None) => (),
            // Per-event problems: the event is dropped
            Err(e) => tracing::debug!(
                url = %self.url,
                error = %e,
                "Relay message dropped."
            ),
        }
    }

    async fn handle_raw_relay_message(&self, msg: &str) -> Result<Option<RelayMessage>, Error> {
        let msg: &str = msg.trim();
        let size: usize = msg.len();

        tracing::trace!(url = %self.url, size, "Received '{msg}'");

        if let Some(max_size) = self.opts.limits.messages.max_size {
            let max_size: usize = max_size as usize;
            if size > max_size {
                return Err(Error::RelayMessageTooLarge { size, max_size });
            }
        }

        match RelayMessage::from_json(msg)? {
            RelayMessage::Event {
                subscription_id,
                event,
            } => self.handle_event_msg(subscription_id, *event).await,
            m => Ok(Some(m)),
        }
    }

    /// Run the event through limits, subscription checks, admission policy, storage and verification.
    ///
    /// Returns `Ok(None)` if the event must be silently dropped.
    async fn handle_event_msg(
        &self,
        subscription_id: SubscriptionId,
        event: Event,
    ) -> Result<Option<RelayMessage>, Error> {
        let limits = &self.opts.limits.events;

        if let Some(max_size) = limits.max_size.map(|max| max as usize) {
            let size: usize = event.as_json().len();
            if size > max_size {
                return Err(Error::EventTooLarge { size, max_size });
            }
        }

        let size: usize = event.tags.len();
        match limits.max_num_tags.map(|max| max as usize) {
            Some(max_size) if size > max_size => return Err(Error::TooManyTags { size, max_size }),
            _ => {}
        }

        if self.opts.verify_subscriptions || self.opts.ban_relay_on_mismatch {
            self.verify_subscription(&subscription_id, &event).await?;
        }

        if event.is_expired() {
            return Err(Error::EventExpired);
        }

        if let AdmitStatus::Rejected { .. } = self
            .state
            .admit_event(&self.url, &subscription_id, &event)
            .await
        {
            return Ok(None);
        }

        // The id commits to the body: a known id never vouches for another body
        if !event.verify_id() {
            return Err(Error::Event(event::Error::InvalidId));
        }

        match self.state.database().check_id(&event.id).await? {
            // Already stored and notified: only the signature of this copy is unchecked
            DatabaseEventStatus::Saved => {
                self.state.verify_signature(&event).await?;
            }
            DatabaseEventStatus::Deleted => return Ok(None),
            DatabaseEventStatus::NotExistent => {
                // Ephemeral events aren't stored: the cache avoids verifying them again on every relay
                self.state.verify_signature(&event).await?;

                // Events the store refuses for their content are dropped
                if let SaveEventStatus::Rejected(
                    RejectedReason::Deleted
                    | RejectedReason::Expired
                    | RejectedReason::Replaced
                    | RejectedReason::InvalidDelete
                    | RejectedReason::Invalid,
                ) = self.state.database().save_event(&event).await?
                {
                    return Ok(None);
                }

                self.send_notification(
                    RelayNotification::Event {
                        subscription_id: subscription_id.clone(),
                        event: Box::new(event.clone()),
                    },
                    true,
                );
            }
        }

        Ok(Some(RelayMessage::Event {
            subscription_id,
            event: Box::new(event),
        }))
    }

    async fn verify_subscription(
        &self,
        subscription_id: &SubscriptionId,
        event: &Event,
    ) -> Result<(), Error> {
        let subscriptions = self.atomic.subscriptions.read().await;

        let SubscriptionData {
            filters,
            received_eose,
            received_events,
            ..
        } = subscriptions
            .get(subscription_id)
            .ok_or(Error::SubscriptionNotFound)?;

        // The limit can be enforced only for stored events of a single-filter subscription
        if let (false, [filter]) = (*received_eose, filters.as_slice()) {
            if let Some(limit) = filter.limit {
                let received: usize = received_events.fetch_add(1, Ordering::SeqCst) + 1;

                if received > limit {
                    if self.opts.ban_relay_on_mismatch {
                        self.ban();
                    }

                    return Err(Error::TooManyEvents);
                }
            }
        }

        if !filter::match_any(filters, event) {
            if self.opts.ban_relay_on_mismatch {
                self.ban();
            }

            return Err(Error::EventNotMatchFilter);
        }

        Ok(())
    }

    pub(super) fn disconnect(&self) {
        if self.status().is_permanently_disconnected() {
            return;
        }

        self.set_status(RelayStatus::Terminated, true);
        self.atomic.channels.terminate();
    }

    pub(super) fn ban(&self) {
        let status: RelayStatus = self.status();

        if status.is_banned() || status.is_shutdown() {
            return;
        }

        self.set_status(RelayStatus::Banned, true);
        self.atomic.channels.terminate();
    }

    pub(super) fn shutdown(&self) {
        if self.status().is_shutdown() {
            return;
        }

        self.set_status(RelayStatus::Shutdown, true);
        self.atomic.channels.terminate();
    }

    pub(super) async fn send_msg(
        &self,
        msg: ClientMessage,
        wait_until_sent: Option<Duration>,
    ) -> Result<(), Error> {
        self.ensure_operational()?;

        let json: ClientMessageJson = msg.as_json();

        let Some(timeout) = wait_until_sent else {
            return self.atomic.channels.send_client_msg(JsonMessageItem {
                json,
                confirmation: None,
            });
        };

        let (tx, rx) = oneshot::channel();
        self.atomic.channels.send_client_msg(JsonMessageItem {
            json,
            confirmation: Some(tx),
        })?;

        time::timeout(Some(timeout), rx)
            .await
            .ok_or(Error::Timeout)??;
        Ok(())
    }

    pub(super) async fn wait_for_ok(
        &self,
        notifications: &mut broadcast::Receiver<RelayNotification>,
        id: &EventId,
        timeout: Duration,
    ) -> Result<(bool, String), Error> {
        time::timeout(Some(timeout), async {
            loop {
                match notifications.recv().await {
                    Ok(RelayNotification::Message {
                        message:
                            RelayMessage::Ok {
                                event_id,
                                status,
                                message,
                            },
                    }) => {
                        if id == &event_id {
                            return Ok((status, message));
                        }
                    }
                    Ok(RelayNotification::RelayStatus { status }) => {
                        if status.is_disconnected() {
                            return Err(Error::NotConnected);
                        }
                    }
                    Ok(..) | Err(RecvError::Lagged(..)) => (),
                    Err(RecvError::Closed) => return Err(Error::PrematureExit),
                }
            }
        })
        .await
        .ok_or(Error::Timeout)?
    }

    /// Send REQ for every long-lived subscription not active in the current session
    pub(super) async fn resubscribe(&self) -> Result<(), Error> {
        let subscriptions = self.subscriptions().await;
        for (id, filters) in subscriptions.into_iter() {
            if !filters.is_empty() && self.should_resubscribe(&id).await {
                self.send_msg(ClientMessage::req(id.clone(), filters.clone()), None)
                    .await?;
                self.update_subscription(id, filters).await;
            } else {
                tracing::debug!(url = %self.url, id = %id, "Skip re-subscription.");
            }
        }

        Ok(())
    }

    pub(super) fn spawn_auto_closing_handler(
        &self,
        id: SubscriptionId,
        opts: SubscribeAutoCloseOptions,
        notifications: broadcast::Receiver<RelayNotification>,
        activity: Option<Sender<SubscriptionActivity>>,
    ) {
        let relay: InnerRelay = self.clone();
        self.state.spawn(async move {
            let res: Option<AutoCloseOutcome> = tokio::select! {
                res = relay.handle_auto_closing(&id, opts, notifications, &activity) => res,
                // The consumer is gone, stop as soon as possible
                _ = activity_closed(&activity) => Some(AutoCloseOutcome::abandoned()),
            };

            let send_close: bool = match res {
                Some(AutoCloseOutcome { send_close, reason }) => {
                    if let (Some(reason), Some(activity)) = (reason, &activity) {
                        let _ = activity.send(SubscriptionActivity::Closed(reason)).await;
                    }

                    send_close
                }
                None => {
                    tracing::debug!(url = %relay.url, id = %id, "Timeout reached for subscription, auto-closing.");
                    true
                }
            };

            // Terminates the consumer stream
            drop(activity);

            if send_close {
                tracing::debug!(url = %relay.url, id = %id, "Auto-closing subscription.");
                if let Err(e) = relay.send_msg(ClientMessage::close(id.clone()), None).await {
                    tracing::debug!(url = %relay.url, id = %id, error = %e, "Can't send CLOSE.");
                }
            }

            relay.remove_subscription(&id).await;
        });
    }

    /// Returns `None` on timeout
    async fn handle_auto_closing(
        &self,
        id: &SubscriptionId,
        opts: SubscribeAutoCloseOptions,
        mut notifications: broadcast::Receiver<RelayNotification>,
        activity: &Option<Sender<SubscriptionActivity>>,
    ) -> Option<AutoCloseOutcome> {
        time::timeout(opts.timeout, async move {
            let mut events_counter: u16 = 0;
            let mut events_after_eose_counter: u16 = 0;
            let mut received_eose: bool = false;

            loop {
                // `None` means that the idle timeout has been reached
                let notification = match time::timeout(opts.idle_timeout, notifications.recv())
                    .await?
                {
                    Ok(notification) => notification,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(url = %self.url, id = %id, skipped, "Subscription handler lagged.");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                match notification {
                    RelayNotification::Message {
                        message:
                            RelayMessage::Event {
                                subscription_id,
                                event,
                            },
                    } if &subscription_id == id => {
                        if let Some(activity) = activity {
                            if activity
                                .send(SubscriptionActivity::ReceivedEvent(*event))
                                .await
                                .is_err()
                            {
                                return Some(AutoCloseOutcome::abandoned());
                            }
                        }

                        match opts.exit_policy {
                            ReqExitPolicy::WaitForEvents(num) => {
                                events_counter += 1;
                                if events_counter >= num {
                                    break;
                                }
                            }
                            ReqExitPolicy::WaitForEventsAfterEOSE(num) if received_eose => {
                                events_after_eose_counter += 1;
                                if events_after_eose_counter >= num {
                                    break;
                                }
                            }
                            _ => {}
                        }
                    }
                    RelayNotification::Message {
                        message: RelayMessage::EndOfStoredEvents(subscription_id),
                    } if &subscription_id == id => {
                        received_eose = true;
                        match opts.exit_policy {
                            ReqExitPolicy::ExitOnEOSE | ReqExitPolicy::WaitDurationAfterEOSE(_) => {
                                break;
                            }
                            ReqExitPolicy::WaitForEventsAfterEOSE(0) => break,
                            _ => {}
                        }
                    }
                    RelayNotification::Message {
                        message:
                            RelayMessage::Closed {
                                subscription_id,
                                message,
                            },
                    } if &subscription_id == id => {
                        // No prefix: the relay considers the subscription complete
                        // (i.e. `{"ids":[...]}` filter after serving the events).
                        let reason = match MachineReadablePrefix::parse(&message) {
                            Some(_) => SubscriptionAutoClosedReason::Closed(message),
                            None => SubscriptionAutoClosedReason::Completed,
                        };

                        return Some(AutoCloseOutcome::ended_remotely(Some(reason)));
                    }
                    RelayNotification::RelayStatus { status } if status.is_disconnected() => {
                        return Some(AutoCloseOutcome::ended_remotely(None));
                    }
                    _ => (),
                }
            }

            if let ReqExitPolicy::WaitDurationAfterEOSE(duration) = opts.exit_policy {
                let forwarded = time::timeout(Some(duration), async {
                    loop {
                        match notifications.recv().await {
                            Ok(RelayNotification::Message {
                                message:
                                    RelayMessage::Event {
                                        subscription_id,
                                        event,
                                    },
                            }) if &subscription_id == id => {
                                if let Some(activity) = activity {
                                    if activity
                                        .send(SubscriptionActivity::ReceivedEvent(*event))
                                        .await
                                        .is_err()
                                    {
                                        return false;
                                    }
                                }
                            }
                            Ok(RelayNotification::RelayStatus { status })
                                if status.is_disconnected() =>
                            {
                                return true;
                            }
                            Ok(..) | Err(RecvError::Lagged(..)) => (),
                            Err(RecvError::Closed) => return true,
                        }
                    }
                })
                .await;

                if let Some(false) = forwarded {
                    return Some(AutoCloseOutcome::abandoned());
                }
            }

            Some(AutoCloseOutcome {
                send_close: true,
                reason: Some(SubscriptionAutoClosedReason::Completed),
            })
        })
        .await?
    }

    /// `false` if `id` is unknown or auto-closing
    async fn close_long_lived(
        &self,
        subscriptions: &mut RwLockWriteGuard<'_, HashMap<SubscriptionId, SubscriptionData>>,
        id: SubscriptionId,
    ) -> Result<bool, Error> {
        match subscriptions.remove(&id) {
            Some(sub) => {
                // Auto-closing subscriptions are handled by their own task
                if sub.is_auto_closing {
                    subscriptions.insert(id, sub);
                    return Ok(false);
                }

                self.send_msg(ClientMessage::close(id), None).await?;

                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub(super) async fn unsubscribe(&self, id: &SubscriptionId) -> Result<bool, Error> {
        let mut subscriptions = self.atomic.subscriptions.write().await;
        self.close_long_lived(&mut subscriptions, id.clone())
            .await
    }

    pub(super) async fn unsubscribe_all(&self) -> Result<(), Error> {
        let mut subscriptions = self.atomic.subscriptions.write().await;

        let ids: Vec<SubscriptionId> = subscriptions.keys().cloned().collect();

        for id in ids.into_iter() {
            self.close_long_lived(&mut subscriptions, id)
                .await?;
        }

        Ok(())
    }
}

async fn activity_closed(activity: &Option<Sender<SubscriptionActivity>>) {
    match activity {
        Some(activity) => activity.closed().await,
        None => future::pending().await,
    }
}

/// Run a websocket write, giving up after [`WEBSOCKET_TX_TIMEOUT`]
async fn ws_write<F, E>(write: F) -> Result<(), Error>
where
    F: Future<Output = Result<(), E>>,
    Error: From<E>,
{
    time::timeout(Some(WEBSOCKET_TX_TIMEOUT), write)
        .await
        .ok_or(Error::Timeout)??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use nostr_storage_memory::MemoryDatabase;

    use super::*;
    use crate::transport::websocket::DefaultWebsocketTransport;
    use crate::relay::limits::RelayLimits;

    fn relay(opts: RelayOptions) -> InnerRelay {
        let url = RelayUrl::parse("ws://localhost:8080").unwrap();
        let state = SharedState::new(
            Arc::new(MemoryDatabase::unbounded()),
            Arc::new(DefaultWebsocketTransport),
            None,
            None,
        );
        InnerRelay::new(url, state, opts)
    }

    fn event_msg(id: &str, event: &Event) -> String {
        RelayMessage::event(SubscriptionId::new(id), event.clone()).as_json()
    }

    #[tokio::test]
    async fn test_handle_valid_event() {
        let relay = relay(RelayOptions::default());
        let mut notifications = relay.internal_notification_sender.subscribe();

        let keys = Keys::generate();
        let event = EventBuilder::text_note("hello").sign_with_keys(&keys).unwrap();

        let msg = relay
            .handle_raw_relay_message(&event_msg("a", &event))
            .await
            .unwrap();
        assert!(matches!(msg, Some(RelayMessage::Event { .. })));

        // Stored and notified once
        let status = relay.state.database().check_id(&event.id).await.unwrap();
        assert_eq!(status, DatabaseEventStatus::Saved);
        match notifications.try_recv().unwrap() {
            RelayNotification::Event { event: e, .. } => assert_eq!(*e, event),
            n => panic!("unexpected notification: {n:?}"),
        }

        // Second time: forwarded, but no new event notification
        relay
            .handle_raw_relay_message(&event_msg("a", &event))
            .await
            .unwrap();
        assert!(notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_handle_invalid_signature() {
        let relay = relay(RelayOptions::default());

        let keys = Keys::generate();
        let mut event = EventBuilder::text_note("hello").sign_with_keys(&keys).unwrap();
        event.content = String::from("tampered");

        let res = relay.handle_raw_relay_message(&event_msg("a", &event)).await;
        assert!(matches!(res, Err(Error::Event(..))));

        // Never stored and never cached as verified
        let status = relay.state.database().check_id(&event.id).await.unwrap();
        assert_eq!(status, DatabaseEventStatus::NotExistent);
        assert!(relay.state.verification_cache_is_empty().await);
    }

    #[tokio::test]
    async fn test_forged_body_of_stored_event_not_forwarded() {
        let relay = relay(RelayOptions::default());
        let mut notifications = relay.internal_notification_sender.subscribe();

        let keys = Keys::generate();
        let event = EventBuilder::text_note("original").sign_with_keys(&keys).unwrap();
        relay
            .handle_raw_relay_message(&event_msg("a", &event))
            .await
            .unwrap();
        assert!(notifications.try_recv().is_ok());

        // Same id and signature, different content
        let mut forged = event.clone();
        forged.content = String::from("FORGED");
        let res = relay.handle_raw_relay_message(&event_msg("a", &forged)).await;
        assert!(matches!(res, Err(Error::Event(event::Error::InvalidId))));
        assert!(notifications.try_recv().is_err());

        // Same body, signature of another event
        let other = EventBuilder::text_note("other").sign_with_keys(&keys).unwrap();
        let mut bad_sig = event.clone();
        bad_sig.sig = other.sig;
        let res = relay.handle_raw_relay_message(&event_msg("a", &bad_sig)).await;
        assert!(matches!(res, Err(Error::Event(event::Error::InvalidSignature))));

        let stored = relay.state.database().event_by_id(&event.id).await.unwrap();
        assert_eq!(stored.map(|e| e.content), Some(String::from("original")));
    }

    #[tokio::test]
    async fn test_forged_body_of_verified_ephemeral_event_not_stored() {
        let relay = relay(RelayOptions::default());
        let mut notifications = relay.internal_notification_sender.subscribe();

        let keys = Keys::generate();
        let ephemeral = EventBuilder::new(Kind::Custom(20_001), "ping")
            .sign_with_keys(&keys)
            .unwrap();
        let msg = relay
            .handle_raw_relay_message(&event_msg("a", &ephemeral))
            .await
            .unwrap();
        assert!(matches!(msg, Some(RelayMessage::Event { .. })));
        assert!(notifications.try_recv().is_ok());

        // Not stored, but its id and signature are now cached
        let mut forged = ephemeral.clone();
        forged.kind = Kind::TextNote;
        forged.content = String::from("FORGED");
        let res = relay.handle_raw_relay_message(&event_msg("a", &forged)).await;
        assert!(matches!(res, Err(Error::Event(event::Error::InvalidId))));

        assert_eq!(relay.state.database().count(Filter::new()).await.unwrap(), 0);
        assert!(notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_handle_too_many_tags() {
        let mut limits = RelayLimits::default();
        limits.events.max_num_tags = Some(1);
        let relay = relay(RelayOptions::default().limits(limits));

        let keys = Keys::generate();
        let event = EventBuilder::text_note("tags")
            .tag(Tag::hashtag("a"))
            .tag(Tag::hashtag("b"))
            .sign_with_keys(&keys)
            .unwrap();

        let res = relay.handle_raw_relay_message(&event_msg("a", &event)).await;
        assert!(matches!(res, Err(Error::TooManyTags { size: 2, max_size: 1 })));
    }

    #[tokio::test]
    async fn test_handle_message_too_large() {
        let mut limits = RelayLimits::default();
        limits.messages.max_size = Some(10);
        let relay = relay(RelayOptions::default().limits(limits));

        let res = relay
            .handle_raw_relay_message(r#"["NOTICE","this notice is too long"]"#)
            .await;
        assert!(matches!(res, Err(Error::RelayMessageTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_verify_subscription_mismatch() {
        let relay = relay(RelayOptions::default().verify_subscriptions(true));

        let id = SubscriptionId::new("sub");
        relay
            .add_auto_closing_subscription(id.clone(), vec![Filter::new().kind(Kind::Metadata)])
            .await;

        let keys = Keys::generate();
        let event = EventBuilder::text_note("not metadata")
            .sign_with_keys(&keys)
            .unwrap();

        let res = relay.handle_raw_relay_message(&event_msg("sub", &event)).await;
        assert!(matches!(res, Err(Error::EventNotMatchFilter)));

        let res = relay
            .handle_raw_relay_message(&event_msg("unknown", &event))
            .await;
        assert!(matches!(res, Err(Error::SubscriptionNotFound)));
    }

    #[test]
    fn test_retry_interval_bounds() {
        let relay = relay(RelayOptions::default());
        for _ in 0..20 {
            relay.atomic.attempts.fetch_add(1, Ordering::SeqCst);
        }

        for _ in 0..50 {
            let interval = relay.calculate_retry_interval();
            assert!(interval <= MAX_RETRY_INTERVAL + Duration::from_secs(3));
            assert!(interval >= MAX_RETRY_INTERVAL - Duration::from_secs(3));
        }
    }
}
