// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! A local nostr relay

use atomic_destructor::AtomicDestructor;
use nostr_core::{Event, RelayUrl};

mod inner;
mod session;
mod util;

use self::inner::InnerLocalRelay;
use crate::builder::LocalRelayBuilder;
use crate::error::Error;

/// A local nostr relay
///
/// Shut down when the last clone is dropped.
#[derive(Debug, Clone)]
pub struct LocalRelay {
    inner: AtomicDestructor<InnerLocalRelay>,
}

impl LocalRelay {
    /// Construct from [`LocalRelayBuilder`]
    #[inline]
    pub fn new(builder: LocalRelayBuilder) -> Self {
        Self {
            inner: AtomicDestructor::new(InnerLocalRelay::new(builder)),
        }
    }

    /// Get a new builder
    #[inline]
    pub fn builder() -> LocalRelayBuilder {
        LocalRelayBuilder::default()
    }

    /// Bind the listener and start accepting connections
    ///
    /// Returns once the listener is bound; connections are served in background.
    #[inline]
    pub async fn run(&self) -> Result<(), Error> {
        self.inner.run().await
    }

    /// Get url
    ///
    /// Waits until the relay is bound.
    #[inline]
    pub async fn url(&self) -> RelayUrl {
        self.inner.url().await
    }

    /// Check if the relay is running
    #[inline]
    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    /// Send an event to the matching subscriptions of every connection
    ///
    /// The event isn't saved: use it when the database is written by someone else,
    /// like a client sharing it. Returns `false` if nobody is connected.
    #[inline]
    pub fn notify_event(&self, event: Event) -> bool {
        self.inner.notify_event(event)
    }

    /// Shutdown relay
    ///
    /// Closes every connection and releases the listener.
    #[inline]
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use futures::{SinkExt, StreamExt};
    use nostr_core::prelude::*;
    use nostr_reconcile::{Reconciler, Storage};
    use nostr_storage::NostrDatabase;
    use nostr_storage_memory::MemoryDatabase;
    use tokio::net::TcpStream;
    use tokio::sync::{broadcast, mpsc, RwLock};
    use tokio::time;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

    use super::inner::{dispatch_new_events, Subscription, Subscriptions};
    use super::*;
    use crate::builder::{QueryPolicy, RateLimit};

    type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn connect(relay: &LocalRelay) -> Ws {
        let url = relay.url().await;
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        ws
    }

    async fn send(ws: &mut Ws, msg: ClientMessage) {
        ws.send(Message::Text(msg.as_json())).await.unwrap();
    }

    async fn recv(ws: &mut Ws) -> RelayMessage {
        loop {
            let msg = time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timeout")
                .unwrap()
                .unwrap();
            if let Message::Text(json) = msg {
                return RelayMessage::from_json(json).unwrap();
            }
        }
    }

    async fn publish(ws: &mut Ws, event: &Event) -> (bool, String) {
        send(ws, ClientMessage::event(event.clone())).await;
        match recv(ws).await {
            RelayMessage::Ok {
                event_id,
                status,
                message,
            } => {
                assert_eq!(event_id, event.id);
                (status, message)
            }
            msg => panic!("Unexpected message: {msg:?}"),
        }
    }

    async fn req(ws: &mut Ws, id: &str, filter: Filter) -> Vec<Event> {
        send(ws, ClientMessage::req(SubscriptionId::new(id), vec![filter])).await;

        let mut events = Vec::new();
        loop {
            match recv(ws).await {
                RelayMessage::Event { event, .. } => events.push(*event),
                RelayMessage::EndOfStoredEvents(sub_id) => {
                    assert_eq!(sub_id, SubscriptionId::new(id));
                    return events;
                }
                msg => panic!("Unexpected message: {msg:?}"),
            }
        }
    }

    async fn count(ws: &mut Ws, author: PublicKey) -> usize {
        let filter = Filter::new().author(author);
        send(ws, ClientMessage::count(SubscriptionId::new("count"), vec![filter])).await;
        match recv(ws).await {
            RelayMessage::Count { count, .. } => count,
            msg => panic!("Unexpected message: {msg:?}"),
        }
    }

    #[derive(Debug)]
    struct BlockAuthor(PublicKey);

    impl AdmitPolicy for BlockAuthor {
        fn admit_event<'a>(
            &'a self,
            _relay_url: &'a RelayUrl,
            _subscription_id: Option<&'a SubscriptionId>,
            event: &'a Event,
        ) -> BoxedFuture<'a, Result<AdmitStatus, PolicyError>> {
            Box::pin(async move {
                if event.pubkey == self.0 {
                    return Ok(AdmitStatus::rejected("muted author"));
                }
                Ok(AdmitStatus::success())
            })
        }
    }

    #[derive(Debug)]
    struct MaxAuthors(usize);

    impl QueryPolicy for MaxAuthors {
        fn admit_query<'a>(
            &'a self,
            filters: &'a [Filter],
            _addr: &'a SocketAddr,
        ) -> BoxedFuture<'a, Result<AdmitStatus, PolicyError>> {
            Box::pin(async move {
                let authors: usize = filters
                    .iter()
                    .map(|f| f.authors.as_ref().map(|a| a.len()).unwrap_or(0))
                    .sum();
                if authors > self.0 {
                    return Ok(AdmitStatus::rejected("query too expensive"));
                }
                Ok(AdmitStatus::success())
            })
        }
    }

    #[tokio::test]
    async fn test_publish_and_query() {
        let relay = LocalRelay::builder().build();
        relay.run().await.unwrap();
        let mut ws = connect(&relay).await;

        let keys = Keys::generate();
        let event = EventBuilder::text_note("hello").sign_with_keys(&keys).unwrap();

        let (status, message) = publish(&mut ws, &event).await;
        assert!(status);
        assert!(message.is_empty());

        // Duplicate
        let (status, message) = publish(&mut ws, &event).await;
        assert!(status);
        assert_eq!(
            MachineReadablePrefix::parse(&message),
            Some(MachineReadablePrefix::Duplicate)
        );

        let events = req(&mut ws, "sub", Filter::new().author(keys.public_key())).await;
        assert_eq!(events, vec![event]);

        let events = req(&mut ws, "other", Filter::new().kind(Kind::Metadata)).await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_event_rejected() {
        let relay = LocalRelay::builder().build();
        relay.run().await.unwrap();
        let mut ws = connect(&relay).await;

        let keys = Keys::generate();
        let mut event = EventBuilder::text_note("original")
            .sign_with_keys(&keys)
            .unwrap();
        event.content = String::from("tampered");

        let (status, message) = publish(&mut ws, &event).await;
        assert!(!status);
        assert_eq!(
            MachineReadablePrefix::parse(&message),
            Some(MachineReadablePrefix::Invalid)
        );

        let events = req(&mut ws, "sub", Filter::new()).await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_admit_policy_blocks_author() {
        let muted = Keys::generate();
        let relay = LocalRelay::builder()
            .admit_policy(BlockAuthor(muted.public_key()))
            .build();
        relay.run().await.unwrap();
        let mut ws = connect(&relay).await;

        let event = EventBuilder::text_note("muted").sign_with_keys(&muted).unwrap();
        let (status, message) = publish(&mut ws, &event).await;
        assert!(!status);
        assert_eq!(message, "blocked: muted author");

        let keys = Keys::generate();
        let event = EventBuilder::text_note("fine").sign_with_keys(&keys).unwrap();
        let (status, _) = publish(&mut ws, &event).await;
        assert!(status);
    }

    #[tokio::test]
    async fn test_query_policy() {
        let relay = LocalRelay::builder().query_policy(MaxAuthors(1)).build();
        relay.run().await.unwrap();
        let mut ws = connect(&relay).await;

        let filter = Filter::new().authors([
            Keys::generate().public_key(),
            Keys::generate().public_key(),
        ]);
        send(&mut ws, ClientMessage::req(SubscriptionId::new("sub"), vec![filter])).await;

        match recv(&mut ws).await {
            RelayMessage::Closed {
                subscription_id,
                message,
            } => {
                assert_eq!(subscription_id, SubscriptionId::new("sub"));
                assert_eq!(message, "blocked: query too expensive");
            }
            msg => panic!("Unexpected message: {msg:?}"),
        }
    }

    #[tokio::test]
    async fn test_rate_limit() {
        let relay = LocalRelay::builder()
            .rate_limit(RateLimit {
                max_reqs: 1,
                notes_per_minute: 2,
            })
            .build();
        relay.run().await.unwrap();
        let mut ws = connect(&relay).await;

        let keys = Keys::generate();
        for i in 0..2 {
            let event = EventBuilder::text_note(format!("note {i}"))
                .sign_with_keys(&keys)
                .unwrap();
            let (status, _) = publish(&mut ws, &event).await;
            assert!(status);
        }

        let event = EventBuilder::text_note("one too many")
            .sign_with_keys(&keys)
            .unwrap();
        let (status, message) = publish(&mut ws, &event).await;
        assert!(!status);
        assert_eq!(
            MachineReadablePrefix::parse(&message),
            Some(MachineReadablePrefix::RateLimited)
        );

        // Max REQs
        req(&mut ws, "first", Filter::new()).await;
        send(&mut ws, ClientMessage::req(SubscriptionId::new("second"), vec![Filter::new()])).await;
        match recv(&mut ws).await {
            RelayMessage::Closed { message, .. } => {
                assert_eq!(
                    MachineReadablePrefix::parse(&message),
                    Some(MachineReadablePrefix::RateLimited)
                );
            }
            msg => panic!("Unexpected message: {msg:?}"),
        }
    }

    #[tokio::test]
    async fn test_live_events_and_close() {
        let relay = LocalRelay::builder().build();
        relay.run().await.unwrap();
        let mut subscriber = connect(&relay).await;
        let mut publisher = connect(&relay).await;

        let keys = Keys::generate();
        let events = req(&mut subscriber, "live", Filter::new().author(keys.public_key())).await;
        assert!(events.is_empty());

        let event = EventBuilder::text_note("live").sign_with_keys(&keys).unwrap();
        let (status, _) = publish(&mut publisher, &event).await;
        assert!(status);

        match recv(&mut subscriber).await {
            RelayMessage::Event {
                subscription_id,
                event: received,
            } => {
                assert_eq!(subscription_id, SubscriptionId::new("live"));
                assert_eq!(*received, event);
            }
            msg => panic!("Unexpected message: {msg:?}"),
        }

        // After CLOSE nothing is delivered: only the COUNT replies arrive
        send(&mut subscriber, ClientMessage::close(SubscriptionId::new("live"))).await;
        assert_eq!(count(&mut subscriber, keys.public_key()).await, 1);

        let event = EventBuilder::text_note("after close")
            .sign_with_keys(&keys)
            .unwrap();
        let (status, _) = publish(&mut publisher, &event).await;
        assert!(status);

        assert_eq!(count(&mut subscriber, keys.public_key()).await, 2);
    }

    #[tokio::test]
    async fn test_ephemeral_broadcast_not_stored() {
        let database = Arc::new(MemoryDatabase::unbounded());
        let relay = LocalRelay::builder().database(database.clone()).build();
        relay.run().await.unwrap();
        let mut subscriber = connect(&relay).await;
        let mut publisher = connect(&relay).await;

        let kind = Kind::Custom(20_000);
        req(&mut subscriber, "eph", Filter::new().kind(kind)).await;

        let keys = Keys::generate();
        let event = EventBuilder::new(kind, "ping").sign_with_keys(&keys).unwrap();
        let (status, _) = publish(&mut publisher, &event).await;
        assert!(status);

        match recv(&mut subscriber).await {
            RelayMessage::Event { event: received, .. } => assert_eq!(*received, event),
            msg => panic!("Unexpected message: {msg:?}"),
        }

        assert_eq!(database.count(Filter::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reconciliation() {
        let database = MemoryDatabase::unbounded();
        let keys = Keys::generate();

        let mut relay_ids = Vec::new();
        for i in 0..40 {
            let event = EventBuilder::text_note(format!("relay {i}"))
                .sign_with_keys(&keys)
                .unwrap();
            database.save_event(&event).await.unwrap();
            relay_ids.push(event.id);
        }

        let relay = LocalRelay::builder().database(database).build();
        relay.run().await.unwrap();
        let mut ws = connect(&relay).await;

        // The client holds half of the relay events plus a few of its own
        let mut storage = Storage::new();
        for id in relay_ids.iter().take(20) {
            storage.insert(id.to_bytes()).unwrap();
        }
        let own = EventBuilder::text_note("client").sign_with_keys(&keys).unwrap();
        storage.insert(own.id.to_bytes()).unwrap();
        storage.seal().unwrap();

        let mut reconciler = Reconciler::new(storage).unwrap();
        let initial = reconciler.initiate().unwrap();
        let sub_id = SubscriptionId::new("neg");

        send(
            &mut ws,
            ClientMessage::NegOpen {
                subscription_id: sub_id.clone(),
                filter: Box::new(Filter::new()),
                initial_message: hex::encode(initial),
            },
        )
        .await;

        let mut have = Vec::new();
        let mut need = Vec::new();
        loop {
            let message = match recv(&mut ws).await {
                RelayMessage::NegMsg { message, .. } => message,
                msg => panic!("Unexpected message: {msg:?}"),
            };
            let bytes = hex::decode(message).unwrap();
            match reconciler
                .reconcile_with_ids(&bytes, &mut have, &mut need)
                .unwrap()
            {
                Some(next) => {
                    send(
                        &mut ws,
                        ClientMessage::NegMsg {
                            subscription_id: sub_id.clone(),
                            message: hex::encode(next),
                        },
                    )
                    .await
                }
                None => break,
            }
        }
        send(&mut ws, ClientMessage::NegClose { subscription_id: sub_id }).await;

        assert_eq!(have, vec![own.id.to_bytes()]);

        let mut need: Vec<EventId> = need.into_iter().map(EventId::from_byte_array).collect();
        let mut expected: Vec<EventId> = relay_ids[20..].to_vec();
        need.sort();
        expected.sort();
        assert_eq!(need, expected);
    }

    #[tokio::test]
    async fn test_unknown_reconciliation() {
        let relay = LocalRelay::builder().build();
        relay.run().await.unwrap();
        let mut ws = connect(&relay).await;

        send(
            &mut ws,
            ClientMessage::NegMsg {
                subscription_id: SubscriptionId::new("missing"),
                message: String::from("01"),
            },
        )
        .await;
        assert!(matches!(recv(&mut ws).await, RelayMessage::NegErr { .. }));
    }

    #[tokio::test]
    async fn test_dispatcher_gap_notice() {
        let (tx, rx) = broadcast::channel(2);
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let subscriptions: Subscriptions = RwLock::new(HashMap::new());
        subscriptions.write().await.insert(
            SubscriptionId::new("all"),
            Subscription::new(vec![Filter::new()], HashSet::new()),
        );

        let keys = Keys::generate();
        let events: Vec<Event> = (0..5)
            .map(|i| {
                EventBuilder::text_note(i.to_string())
                    .sign_with_keys(&keys)
                    .unwrap()
            })
            .collect();

        // The publisher never blocks, even if nobody is consuming
        for event in events.iter() {
            tx.send(event.clone()).unwrap();
        }
        drop(tx);

        dispatch_new_events(rx, &out_tx, &subscriptions).await.unwrap();
        drop(out_tx);

        let mut received = Vec::new();
        while let Some(msgs) = out_rx.recv().await {
            received.extend(msgs);
        }

        // Gap flag first, then the two newest events
        match &received[0] {
            RelayMessage::Notice(notice) => assert!(notice.contains("3 events dropped")),
            msg => panic!("Unexpected message: {msg:?}"),
        }
        assert_eq!(
            received[1..].to_vec(),
            vec![
                RelayMessage::event(SubscriptionId::new("all"), events[3].clone()),
                RelayMessage::event(SubscriptionId::new("all"), events[4].clone()),
            ]
        );
    }

    #[tokio::test]
    async fn test_dispatcher_skips_events_sent_as_stored() {
        let (tx, rx) = broadcast::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(16);

        let keys = Keys::generate();
        let stored = EventBuilder::text_note("stored").sign_with_keys(&keys).unwrap();
        let fresh = EventBuilder::text_note("fresh").sign_with_keys(&keys).unwrap();

        // `stored` was saved while the REQ was running: it's part of the stored batch
        let subscriptions: Subscriptions = RwLock::new(HashMap::new());
        subscriptions.write().await.insert(
            SubscriptionId::new("sub"),
            Subscription::new(vec![Filter::new()], HashSet::from([stored.id])),
        );

        tx.send(stored).unwrap();
        tx.send(fresh.clone()).unwrap();
        drop(tx);

        dispatch_new_events(rx, &out_tx, &subscriptions).await.unwrap();
        drop(out_tx);

        let mut received = Vec::new();
        while let Some(msgs) = out_rx.recv().await {
            received.extend(msgs);
        }
        assert_eq!(received, vec![RelayMessage::event(SubscriptionId::new("sub"), fresh)]);
    }

    #[tokio::test]
    async fn test_subscription_id_too_long() {
        let relay = LocalRelay::builder().max_subid_length(8).build();
        relay.run().await.unwrap();
        let mut ws = connect(&relay).await;

        let id = SubscriptionId::new("way-too-long-id");
        send(&mut ws, ClientMessage::req(id.clone(), vec![Filter::new()])).await;
        match recv(&mut ws).await {
            RelayMessage::Closed {
                subscription_id,
                message,
            } => {
                assert_eq!(subscription_id, id);
                assert_eq!(
                    MachineReadablePrefix::parse(&message),
                    Some(MachineReadablePrefix::Invalid)
                );
            }
            msg => panic!("Unexpected message: {msg:?}"),
        }

        // Short ids still work
        assert!(req(&mut ws, "short", Filter::new()).await.is_empty());
    }

    #[tokio::test]
    async fn test_filter_limits() {
        let database = MemoryDatabase::unbounded();
        let keys = Keys::generate();
        let mut notes = Vec::new();
        for secs in 1..=10 {
            let event = EventBuilder::text_note(format!("note {secs}"))
                .custom_created_at(Timestamp::from_secs(secs))
                .sign_with_keys(&keys)
                .unwrap();
            database.save_event(&event).await.unwrap();
            notes.push(event);
        }
        notes.reverse();

        let relay = LocalRelay::builder()
            .database(database)
            .default_filter_limit(3)
            .max_filter_limit(5)
            .build();
        relay.run().await.unwrap();
        let mut ws = connect(&relay).await;

        // No limit: the newest `default_filter_limit` events
        let events = req(&mut ws, "default", Filter::new().author(keys.public_key())).await;
        assert_eq!(events, notes[..3].to_vec());

        // Too large: capped
        let events = req(&mut ws, "capped", Filter::new().limit(100)).await;
        assert_eq!(events, notes[..5].to_vec());

        // Within bounds: untouched
        let events = req(&mut ws, "small", Filter::new().limit(2)).await;
        assert_eq!(events, notes[..2].to_vec());
    }

    #[tokio::test]
    async fn test_notify_event() {
        let database = Arc::new(MemoryDatabase::unbounded());
        let relay = LocalRelay::builder().database(database.clone()).build();
        relay.run().await.unwrap();

        let keys = Keys::generate();
        let event = EventBuilder::text_note("external").sign_with_keys(&keys).unwrap();

        // Nobody connected
        assert!(!relay.notify_event(event.clone()));

        let mut ws = connect(&relay).await;
        req(&mut ws, "sub", Filter::new().author(keys.public_key())).await;
        assert!(relay.notify_event(event.clone()));

        match recv(&mut ws).await {
            RelayMessage::Event {
                subscription_id,
                event: received,
            } => {
                assert_eq!(subscription_id, SubscriptionId::new("sub"));
                assert_eq!(*received, event);
            }
            msg => panic!("Unexpected message: {msg:?}"),
        }

        // Delivered, not stored
        assert_eq!(database.count(Filter::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_releases_listener() {
        let relay = LocalRelay::builder().build();
        relay.run().await.unwrap();
        assert!(relay.is_running());
        let url = relay.url().await;
        let mut ws = connect(&relay).await;

        relay.shutdown();
        assert!(!relay.is_running());

        // Connection closed by the relay
        let closed = time::timeout(Duration::from_secs(5), async {
            loop {
                match ws.next().await {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                }
            }
        })
        .await;
        assert!(closed.is_ok());

        // Give the listener loop a moment to drop the socket
        time::sleep(Duration::from_millis(200)).await;
        assert!(tokio_tungstenite::connect_async(url.as_str()).await.is_err());
    }

    #[tokio::test]
    async fn test_url_waits_for_bind() {
        let relay = LocalRelay::builder().build();

        let r = relay.clone();
        let url = tokio::spawn(async move { r.url().await });

        time::sleep(Duration::from_millis(50)).await;
        relay.run().await.unwrap();

        let url = time::timeout(Duration::from_secs(5), url).await.unwrap().unwrap();
        assert_eq!(url, relay.url().await);
    }
}
