// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

use std::collections::{HashMap, HashSet};
use std::future::{self, Future};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use atomic_destructor::AtomicDestroyer;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use nostr_core::filter;
use nostr_core::prelude::*;
use nostr_reconcile::{Reconciler, Storage};
use nostr_storage::{DatabaseEventStatus, Events, NostrDatabase, RejectedReason, SaveEventStatus};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch, RwLock, Semaphore};
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use super::session::{RateLimiterResponse, Session};
use super::util;
use crate::builder::{LocalRelayBuilder, LocalRelayTestOptions, QueryPolicy, RateLimit};
use crate::error::Error;

type WsTx = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsRx = SplitStream<WebSocketStream<TcpStream>>;

/// Live subscriptions of a connection
pub(super) type Subscriptions = RwLock<HashMap<SubscriptionId, Subscription>>;

#[derive(Debug)]
pub(super) struct Subscription {
    filters: Vec<Filter>,
    /// Stored events sent before `EOSE`: skipped if they show up again as new events
    sent: HashSet<EventId>,
}

impl Subscription {
    pub(super) fn new(filters: Vec<Filter>, sent: HashSet<EventId>) -> Self {
        Self { filters, sent }
    }

    fn wants(&self, event: &Event) -> bool {
        !self.sent.contains(&event.id) && filter::match_any(&self.filters, event)
    }
}

const NEW_EVENT_CHANNEL_SIZE: usize = 1024;
const OUTGOING_CHANNEL_SIZE: usize = 256;
const RANDOM_EVENTS: usize = 3;

#[derive(Debug, Clone)]
pub(super) struct InnerLocalRelay {
    addr: Option<IpAddr>,
    port: Option<u16>,
    database: Arc<dyn NostrDatabase>,
    admit_policy: Option<Arc<dyn AdmitPolicy>>,
    query_policy: Vec<Arc<dyn QueryPolicy>>,
    rate_limit: RateLimit,
    connections_limit: Arc<Semaphore>,
    max_future_drift: Option<Duration>,
    max_subid_length: usize,
    max_filter_limit: usize,
    default_filter_limit: usize,
    executor: Option<Handle>,
    test: LocalRelayTestOptions,
    running: Arc<AtomicBool>,
    /// Relay URL, once bound
    bound: Arc<watch::Sender<Option<RelayUrl>>>,
    shutdown: broadcast::Sender<()>,
    /// Channel to notify new event received
    ///
    /// Every connection will listen and check own subscriptions
    new_event: broadcast::Sender<Event>,
}

impl AtomicDestroyer for InnerLocalRelay {
    fn on_destroy(&self) {
        self.shutdown();
    }
}

impl InnerLocalRelay {
    pub fn new(builder: LocalRelayBuilder) -> Self {
        let max_connections: usize = builder.max_connections.unwrap_or(Semaphore::MAX_PERMITS);
        let (shutdown, ..) = broadcast::channel(1);
        let (new_event, ..) = broadcast::channel(NEW_EVENT_CHANNEL_SIZE);
        let (bound, ..) = watch::channel(None);

        Self {
            addr: builder.addr,
            port: builder.port,
            database: builder.database,
            admit_policy: builder.admit_policy,
            query_policy: builder.query_policy,
            rate_limit: builder.rate_limit,
            connections_limit: Arc::new(Semaphore::new(max_connections)),
            max_future_drift: builder.max_future_drift,
            max_subid_length: builder.max_subid_length,
            max_filter_limit: builder.max_filter_limit,
            default_filter_limit: builder.default_filter_limit,
            executor: builder.executor,
            test: builder.test,
            running: Arc::new(AtomicBool::new(false)),
            bound: Arc::new(bound),
            shutdown,
            new_event,
        }
    }

    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match &self.executor {
            Some(handle) => {
                handle.spawn(future);
            }
            None => {
                tokio::spawn(future);
            }
        }
    }

    pub async fn run(&self) -> Result<(), Error> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Local relay already running.");
            return Ok(());
        }

        let ip: IpAddr = self.addr.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

        let listener: TcpListener = match util::bind(ip, self.port).await {
            Ok(listener) => listener,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let addr: SocketAddr = listener.local_addr()?;
        let url: RelayUrl = RelayUrl::from_socket_addr(&addr)?;

        tracing::info!(url = %url, "Local relay listening.");

        // Subscribe before spawning, so an early shutdown isn't missed
        let mut shutdown_rx = self.shutdown.subscribe();

        let relay: Self = self.clone();
        self.spawn(async move {
            loop {
                tokio::select! {
                    output = listener.accept() => {
                        match output {
                            Ok((stream, addr)) => {
                                let r: Self = relay.clone();
                                relay.spawn(async move {
                                    if let Err(e) = r.handle_connection(stream, addr).await {
                                        tracing::warn!(addr = %addr, error = %e, "Connection terminated with error.");
                                    }
                                });
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Can't accept incoming connection.");
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            tracing::info!("Local relay listener loop terminated.");
        });

        self.bound.send_replace(Some(url));

        Ok(())
    }

    pub async fn url(&self) -> RelayUrl {
        let mut rx = self.bound.subscribe();

        loop {
            let current: Option<RelayUrl> = rx.borrow_and_update().clone();

            if let Some(url) = current {
                return url;
            }

            // The sender lives as long as the relay
            if rx.changed().await.is_err() {
                future::pending::<()>().await;
            }
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Deliver an event to the matching subscriptions without storing it
    ///
    /// Returns `false` if no connection is listening.
    pub fn notify_event(&self, event: Event) -> bool {
        self.new_event.send(event).is_ok()
    }

    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::info!("Shutting down local relay.");
        }

        let _ = self.shutdown.send(());
    }

    async fn handle_connection(&self, raw_stream: TcpStream, addr: SocketAddr) -> Result<(), Error> {
        if let Some(unresponsive_connection) = self.test.unresponsive_connection {
            time::sleep(unresponsive_connection).await;
        }

        // Try to acquire connection limit
        let Ok(permit) = self.connections_limit.try_acquire() else {
            tracing::warn!(addr = %addr, "Too many connections, dropping.");
            return Ok(());
        };

        let peer: RelayUrl = RelayUrl::from_socket_addr(&addr)?;

        if let Some(policy) = &self.admit_policy {
            let status: AdmitStatus = AdmitStatus::from_result(policy.admit_connection(&peer).await);
            if let AdmitStatus::Rejected { reason } = status {
                tracing::debug!(addr = %addr, reason = ?reason, "Connection rejected.");
                return Ok(());
            }
        }

        // Accept websocket
        let ws_stream: WebSocketStream<TcpStream> =
            tokio_tungstenite::accept_async(raw_stream).await?;

        tracing::debug!(addr = %addr, "WebSocket connection established.");

        let mut shutdown_rx = self.shutdown.subscribe();
        let new_event = self.new_event.subscribe();

        let (ws_tx, ws_rx) = ws_stream.split();

        let mut session: Session = Session::new(self.rate_limit.notes_per_minute);
        let subscriptions: Subscriptions = RwLock::new(HashMap::new());

        let (nostr_tx, nostr_rx) = mpsc::channel::<Vec<RelayMessage>>(OUTGOING_CHANNEL_SIZE);
        let (pong_tx, pong_rx) = watch::channel::<Vec<u8>>(Vec::new());

        // Wait that one of the futures terminates/completes
        tokio::select! {
            res = self.receiver_message_handler(ws_rx, &nostr_tx, pong_tx, &mut session, &subscriptions, &peer) => match res {
                Ok(()) => tracing::trace!(addr = %addr, "Relay receiver exited."),
                Err(e) => tracing::error!(addr = %addr, error = %e, "Relay receiver exited with error.")
            },
            res = sender_message_handler(ws_tx, nostr_rx, pong_rx) => match res {
                Ok(()) => tracing::trace!(addr = %addr, "Relay sender exited."),
                Err(e) => tracing::error!(addr = %addr, error = %e, "Relay sender exited with error.")
            },
            res = dispatch_new_events(new_event, &nostr_tx, &subscriptions) => match res {
                Ok(()) => tracing::trace!(addr = %addr, "New event dispatcher exited."),
                Err(e) => tracing::error!(addr = %addr, error = %e, "New event dispatcher exited with error.")
            },
            _ = shutdown_rx.recv() => {}
        }

        // Drop connection permit
        drop(permit);

        tracing::debug!(addr = %addr, "WebSocket connection terminated.");

        Ok(())
    }

    async fn receiver_message_handler(
        &self,
        mut ws_rx: WsRx,
        nostr_tx: &mpsc::Sender<Vec<RelayMessage>>,
        pong_tx: watch::Sender<Vec<u8>>,
        session: &mut Session,
        subscriptions: &Subscriptions,
        peer: &RelayUrl,
    ) -> Result<(), Error> {
        while let Some(msg) = ws_rx.next().await {
            match msg? {
                Message::Text(json) => {
                    tracing::trace!(peer = %peer, "Received {json}");

                    let msg: ClientMessage = match ClientMessage::from_json(&json) {
                        Ok(msg) => msg,
                        Err(e) => {
                            let notice: String = MachineReadablePrefix::Error.with_message(e.to_string());
                            send_msg(nostr_tx, RelayMessage::notice(notice)).await?;
                            continue;
                        }
                    };

                    match self
                        .handle_client_msg(session, subscriptions, nostr_tx, msg, peer)
                        .await
                    {
                        Ok(()) => {}
                        Err(Error::ChannelClosed) => return Err(Error::ChannelClosed),
                        Err(e) => {
                            // Storage or policy faults don't terminate the connection
                            tracing::error!(peer = %peer, error = %e, "Can't handle client message.");
                            let notice: String = MachineReadablePrefix::Error.with_message(e.to_string());
                            send_msg(nostr_tx, RelayMessage::notice(notice)).await?;
                        }
                    }
                }
                Message::Binary(..) => {
                    let msg: RelayMessage =
                        RelayMessage::notice("binary messages are not processed by this relay");
                    send_msg(nostr_tx, msg).await?;
                }
                Message::Ping(val) => {
                    pong_tx.send(val).map_err(|_| Error::ChannelClosed)?;
                }
                Message::Close(..) => break,
                Message::Pong(..) | Message::Frame(..) => {}
            }
        }

        Ok(())
    }

    async fn handle_client_msg(
        &self,
        session: &mut Session,
        subscriptions: &Subscriptions,
        tx: &mpsc::Sender<Vec<RelayMessage>>,
        msg: ClientMessage,
        peer: &RelayUrl,
    ) -> Result<(), Error> {
        match msg {
            ClientMessage::Event(event) => {
                let msg: RelayMessage = self.handle_event(session, *event, peer).await;
                send_msg(tx, msg).await
            }
            ClientMessage::Req {
                subscription_id,
                filters,
            } => {
                if subscription_id.as_str().len() > self.max_subid_length {
                    let message: String =
                        MachineReadablePrefix::Invalid.with_message("subscription id too long");
                    return send_msg(tx, RelayMessage::closed(subscription_id, message)).await;
                }

                if let Some(message) = self.check_query_policies(&filters, peer).await {
                    return send_msg(tx, RelayMessage::closed(subscription_id, message)).await;
                }

                // New events wait for the write guard, so they can't overtake the stored ones
                let mut subs = subscriptions.write().await;

                if subs.len() >= self.rate_limit.max_reqs && !subs.contains_key(&subscription_id) {
                    let message: String =
                        MachineReadablePrefix::RateLimited.with_message("too many REQs");
                    return send_msg(tx, RelayMessage::closed(subscription_id, message)).await;
                }

                let filters: Vec<Filter> = filters
                    .into_iter()
                    .map(|f| self.bounded_filter(f))
                    .collect();

                let events: Vec<Event> = self
                    .query(filters.clone())
                    .await?
                    .map(|e| e.to_vec())
                    .unwrap_or_default();

                tracing::debug!(
                    id = %subscription_id,
                    "Found {} events for subscription.",
                    events.len()
                );

                let sent: HashSet<EventId> = events.iter().map(|e| e.id).collect();
                subs.insert(subscription_id.clone(), Subscription::new(filters, sent));

                let mut msgs: Vec<RelayMessage> = Vec::with_capacity(events.len() + RANDOM_EVENTS + 1);

                if self.test.send_random_events {
                    msgs.extend(random_events(&subscription_id));
                }

                msgs.extend(
                    events
                        .into_iter()
                        .map(|e| RelayMessage::event(subscription_id.clone(), e)),
                );
                msgs.push(RelayMessage::eose(subscription_id));

                send_msgs(tx, msgs).await
            }
            ClientMessage::Count {
                subscription_id,
                filters,
            } => {
                if let Some(message) = self.check_query_policies(&filters, peer).await {
                    return send_msg(tx, RelayMessage::closed(subscription_id, message)).await;
                }

                let count: usize = self.count(filters).await?;
                send_msg(tx, RelayMessage::count(subscription_id, count)).await
            }
            ClientMessage::Close(subscription_id) => {
                subscriptions.write().await.remove(&subscription_id);
                Ok(())
            }
            ClientMessage::NegOpen {
                subscription_id,
                filter,
                initial_message,
            } => {
                if session.reconciliations.len() >= self.rate_limit.max_reqs
                    && !session.reconciliations.contains_key(&subscription_id)
                {
                    let message: String =
                        MachineReadablePrefix::RateLimited.with_message("too many reconciliations");
                    return send_msg(tx, RelayMessage::NegErr { subscription_id, message }).await;
                }

                let filters: [Filter; 1] = [*filter];
                if let Some(message) = self.check_query_policies(&filters, peer).await {
                    return send_msg(tx, RelayMessage::NegErr { subscription_id, message }).await;
                }
                let [filter] = filters;

                let msg: RelayMessage = match self.open_reconciliation(filter, &initial_message).await {
                    Ok((reconciler, reply)) => {
                        session
                            .reconciliations
                            .insert(subscription_id.clone(), reconciler);
                        RelayMessage::NegMsg {
                            subscription_id,
                            message: hex::encode(reply),
                        }
                    }
                    Err(Error::Database(e)) => return Err(Error::Database(e)),
                    Err(e) => RelayMessage::NegErr {
                        subscription_id,
                        message: MachineReadablePrefix::Invalid.with_message(e.to_string()),
                    },
                };

                send_msg(tx, msg).await
            }
            ClientMessage::NegMsg {
                subscription_id,
                message,
            } => {
                let msg: RelayMessage = match session.reconciliations.get_mut(&subscription_id) {
                    Some(reconciler) => match continue_reconciliation(reconciler, &message) {
                        Ok(reply) => RelayMessage::NegMsg {
                            subscription_id,
                            message: hex::encode(reply),
                        },
                        Err(e) => {
                            session.reconciliations.remove(&subscription_id);
                            RelayMessage::NegErr {
                                subscription_id,
                                message: MachineReadablePrefix::Invalid.with_message(e.to_string()),
                            }
                        }
                    },
                    None => RelayMessage::NegErr {
                        subscription_id,
                        message: MachineReadablePrefix::Error
                            .with_message("reconciliation not found"),
                    },
                };

                send_msg(tx, msg).await
            }
            ClientMessage::NegClose { subscription_id } => {
                session.reconciliations.remove(&subscription_id);
                Ok(())
            }
        }
    }

    /// Process a published event and build the `OK` reply
    async fn handle_event(&self, session: &mut Session, event: Event, peer: &RelayUrl) -> RelayMessage {
        // Check rate limit
        if session.check_rate_limit(self.rate_limit.notes_per_minute) == RateLimiterResponse::Limited {
            return RelayMessage::ok_rejected(event.id, MachineReadablePrefix::RateLimited, "slow down");
        }

        // Check admission policy
        if let Some(policy) = &self.admit_policy {
            let status: AdmitStatus =
                AdmitStatus::from_result(policy.admit_event(peer, None, &event).await);
            if let AdmitStatus::Rejected { reason } = status {
                tracing::debug!(id = %event.id, peer = %peer, reason = ?reason, "Event rejected by admission policy.");
                let reason: String = reason.unwrap_or_else(|| String::from("event rejected"));
                return RelayMessage::ok_rejected(event.id, MachineReadablePrefix::Blocked, reason);
            }
        }

        // Check if event already exists
        match self.database.check_id(&event.id).await {
            Ok(DatabaseEventStatus::Saved) => {
                return RelayMessage::ok(
                    event.id,
                    true,
                    MachineReadablePrefix::Duplicate.with_message("already have this event"),
                );
            }
            Ok(DatabaseEventStatus::Deleted) => {
                return RelayMessage::ok_rejected(
                    event.id,
                    MachineReadablePrefix::Blocked,
                    "this event is deleted",
                );
            }
            Ok(DatabaseEventStatus::NotExistent) => {}
            Err(e) => {
                tracing::error!(error = %e, "Can't check event status.");
                return RelayMessage::ok_rejected(event.id, MachineReadablePrefix::Error, "database error");
            }
        }

        if let Some(drift) = self.max_future_drift {
            if event.is_created_after(Timestamp::now() + drift) {
                return RelayMessage::ok_rejected(
                    event.id,
                    MachineReadablePrefix::Invalid,
                    "event creation date is too far in the future",
                );
            }
        }

        if !event.verify_id() {
            return RelayMessage::ok_rejected(event.id, MachineReadablePrefix::Invalid, "invalid event ID");
        }

        if !event.verify_signature() {
            return RelayMessage::ok_rejected(
                event.id,
                MachineReadablePrefix::Invalid,
                "invalid event signature",
            );
        }

        let event_id: EventId = event.id;

        // Ephemeral events are only broadcast
        if event.kind.is_ephemeral() {
            let _ = self.new_event.send(event);
            return RelayMessage::ok(event_id, true, "");
        }

        match self.database.save_event(&event).await {
            Ok(SaveEventStatus::Success) => {
                // Broadcast to channel
                let _ = self.new_event.send(event);
                RelayMessage::ok(event_id, true, "")
            }
            Ok(SaveEventStatus::Rejected(reason)) => {
                let prefix: MachineReadablePrefix = match reason {
                    RejectedReason::Duplicate => {
                        return RelayMessage::ok(
                            event_id,
                            true,
                            MachineReadablePrefix::Duplicate.with_message(reason.to_string()),
                        );
                    }
                    RejectedReason::Deleted | RejectedReason::Replaced => MachineReadablePrefix::Blocked,
                    RejectedReason::Ephemeral
                    | RejectedReason::Expired
                    | RejectedReason::InvalidDelete
                    | RejectedReason::Invalid => MachineReadablePrefix::Invalid,
                    RejectedReason::Other => MachineReadablePrefix::Error,
                };
                RelayMessage::ok_rejected(event_id, prefix, reason.to_string())
            }
            Err(e) => {
                tracing::error!(error = %e, "Can't save event into database.");
                RelayMessage::ok_rejected(event_id, MachineReadablePrefix::Error, "database error")
            }
        }
    }

    /// Run the query policies, returning the `CLOSED` reason on rejection
    async fn check_query_policies(&self, filters: &[Filter], peer: &RelayUrl) -> Option<String> {
        let addr: SocketAddr = peer_addr(peer)?;

        for policy in self.query_policy.iter() {
            let status: AdmitStatus = AdmitStatus::from_result(policy.admit_query(filters, &addr).await);
            if let AdmitStatus::Rejected { reason } = status {
                let reason: String = reason.unwrap_or_else(|| String::from("query rejected"));
                return Some(MachineReadablePrefix::Blocked.with_message(reason));
            }
        }

        None
    }

    /// Apply the configured `limit` bounds to a `REQ` filter
    fn bounded_filter(&self, mut filter: Filter) -> Filter {
        let limit: usize = match filter.limit {
            Some(limit) => limit.min(self.max_filter_limit),
            None => self.default_filter_limit,
        };
        filter.limit = Some(limit);
        filter
    }

    /// Query every filter and merge the results
    async fn query(&self, filters: Vec<Filter>) -> Result<Option<Events>, Error> {
        let mut merged: Option<Events> = None;

        for filter in filters.into_iter() {
            let events: Events = self.database.query(filter).await?;
            merged = Some(match merged {
                Some(merged) => merged.merge(events),
                None => events,
            });
        }

        Ok(merged)
    }

    async fn count(&self, filters: Vec<Filter>) -> Result<usize, Error> {
        if let [filter] = filters.as_slice() {
            return Ok(self.database.count(filter.clone()).await?);
        }

        // Events matching more than one filter are counted once
        let mut ids: HashSet<EventId> = HashSet::new();
        for filter in filters.into_iter() {
            ids.extend(self.database.sync_items(filter).await?);
        }
        Ok(ids.len())
    }

    async fn open_reconciliation(
        &self,
        filter: Filter,
        initial_message: &str,
    ) -> Result<(Reconciler, Vec<u8>), Error> {
        let items: Vec<EventId> = self.database.sync_items(filter).await?;

        tracing::debug!("Found {} items for reconciliation.", items.len());

        let mut storage: Storage = Storage::with_capacity(items.len());
        for id in items.into_iter() {
            storage.insert(id.to_bytes())?;
        }
        storage.seal()?;

        let mut reconciler: Reconciler = Reconciler::new(storage)?;
        let reply: Vec<u8> = continue_reconciliation(&mut reconciler, initial_message)?;
        Ok((reconciler, reply))
    }
}

fn continue_reconciliation(reconciler: &mut Reconciler, message: &str) -> Result<Vec<u8>, Error> {
    let bytes: Vec<u8> = hex::decode(message)?;
    Ok(reconciler.reconcile(&bytes)?)
}

fn peer_addr(peer: &RelayUrl) -> Option<SocketAddr> {
    let url = peer.as_url();
    let host: &str = url.host_str()?;
    let port: u16 = url.port()?;
    let ip: IpAddr = host.trim_matches(|c| c == '[' || c == ']').parse().ok()?;
    Some(SocketAddr::new(ip, port))
}

fn random_events(subscription_id: &SubscriptionId) -> Vec<RelayMessage> {
    let keys: Keys = Keys::generate();
    (0..RANDOM_EVENTS)
        .filter_map(|i| {
            EventBuilder::text_note(format!("Random event #{i}"))
                .sign_with_keys(&keys)
                .ok()
        })
        .map(|event| RelayMessage::event(subscription_id.clone(), event))
        .collect()
}

async fn sender_message_handler(
    mut ws_tx: WsTx,
    mut nostr_rx: mpsc::Receiver<Vec<RelayMessage>>,
    mut pong_rx: watch::Receiver<Vec<u8>>,
) -> Result<(), Error> {
    loop {
        tokio::select! {
            // Nostr channel receiver
            Some(msgs) = nostr_rx.recv() => {
                for msg in msgs.into_iter() {
                    ws_tx.feed(Message::Text(msg.as_json())).await?;
                }
                ws_tx.flush().await?;
            }
            // Ping channel receiver
            Ok(()) = pong_rx.changed() => {
                // Get ping data and mark as seen
                let data: Vec<u8> = pong_rx.borrow_and_update().to_vec();
                ws_tx.send(Message::Pong(data)).await?;
            }
            else => break
        }
    }

    // Close WebSocket
    ws_tx.close().await?;

    Ok(())
}

/// Forward new events to the subscriptions of a connection
///
/// A lagging connection loses the oldest events and gets a `NOTICE`; publishers never wait.
pub(super) async fn dispatch_new_events(
    mut new_event: broadcast::Receiver<Event>,
    tx: &mpsc::Sender<Vec<RelayMessage>>,
    subscriptions: &Subscriptions,
) -> Result<(), Error> {
    loop {
        match new_event.recv().await {
            Ok(event) => {
                let msgs: Vec<RelayMessage> = {
                    let subs = subscriptions.read().await;
                    subs.iter()
                        .filter(|(_, sub)| sub.wants(&event))
                        .map(|(id, _)| RelayMessage::event(id.clone(), event.clone()))
                        .collect()
                };

                if !msgs.is_empty() {
                    send_msgs(tx, msgs).await?;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Connection lagging behind, oldest events dropped.");
                let notice: String = MachineReadablePrefix::Error
                    .with_message(format!("lagging: {skipped} events dropped"));
                send_msg(tx, RelayMessage::notice(notice)).await?;
            }
            Err(RecvError::Closed) => break,
        }
    }

    Ok(())
}

#[inline]
async fn send_msg(tx: &mpsc::Sender<Vec<RelayMessage>>, msg: RelayMessage) -> Result<(), Error> {
    send_msgs(tx, vec![msg]).await
}

#[inline]
async fn send_msgs(tx: &mpsc::Sender<Vec<RelayMessage>>, msgs: Vec<RelayMessage>) -> Result<(), Error> {
    tx.send(msgs).await.map_err(|_| Error::ChannelClosed)
}
