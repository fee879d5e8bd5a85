// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

use std::cmp;
use std::collections::{HashMap, HashSet};
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::time::Instant;

use async_utility::time;
use nostr_core::{ClientMessage, EventId, Filter, RelayMessage, SubscriptionId};
use nostr_reconcile::{Id, Reconciler, Storage};
use tokio::sync::broadcast;

use crate::relay::constants::{SYNC_BATCH_SIZE_DOWN, SYNC_HIGH_WATER_UP, SYNC_LOW_WATER_UP};
use crate::relay::{Error, Relay, RelayNotification, SyncOptions};

/// Reconciliation summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Events stored locally and missing on the relay
    pub local: HashSet<EventId>,
    /// Events stored on the relay and missing locally
    pub remote: HashSet<EventId>,
    /// Events **successfully** sent to the relay
    pub sent: HashSet<EventId>,
    /// Events **successfully** received from the relay
    pub received: HashSet<EventId>,
    /// Send failures
    pub send_failures: HashMap<EventId, String>,
}

/// Sync events with relay
#[must_use = "Does nothing unless you await!"]
pub struct SyncEvents<'relay> {
    relay: &'relay Relay,
    filter: Filter,
    items: Option<Vec<EventId>>,
    opts: SyncOptions,
}

impl<'relay> SyncEvents<'relay> {
    #[inline]
    pub(crate) fn new(relay: &'relay Relay, filter: Filter) -> Self {
        Self {
            relay,
            filter,
            items: None,
            opts: SyncOptions::new(),
        }
    }

    /// Set the local items
    ///
    /// When set, the items are NOT fetched from the database.
    #[inline]
    pub fn items<I>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = EventId>,
    {
        self.items = Some(items.into_iter().collect());
        self
    }

    /// Set sync options
    #[inline]
    pub fn opts(mut self, opts: SyncOptions) -> Self {
        self.opts = opts;
        self
    }

    async fn exec(self) -> Result<SyncSummary, Error> {
        self.relay.inner.ensure_operational()?;

        let items: Vec<EventId> = match self.items {
            Some(items) => items,
            None => {
                let database = self.relay.inner.state.database();
                database.sync_items(self.filter.clone()).await?
            }
        };

        let mut output: SyncSummary = SyncSummary::default();

        sync(self.relay, self.filter, items, &self.opts, &mut output).await?;

        Ok(output)
    }
}

impl<'relay> IntoFuture for SyncEvents<'relay> {
    type Output = Result<SyncSummary, Error>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send + 'relay>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.exec())
    }
}

/// Pending work of a reconciliation
#[derive(Default)]
struct SyncState {
    have_ids: Vec<EventId>,
    need_ids: Vec<EventId>,
    in_flight_up: HashSet<EventId>,
    in_flight_down: bool,
    done: bool,
}

impl SyncState {
    fn is_finished(&self) -> bool {
        self.done
            && self.have_ids.is_empty()
            && self.need_ids.is_empty()
            && self.in_flight_up.is_empty()
            && !self.in_flight_down
    }
}

fn build_reconciler(items: Vec<EventId>) -> Result<Reconciler, Error> {
    let mut storage: Storage = Storage::with_capacity(items.len());

    for id in items.into_iter() {
        storage.insert(id.to_bytes())?;
    }

    storage.seal()?;

    Ok(Reconciler::new(storage)?)
}

#[inline]
fn to_event_ids(ids: Vec<Id>) -> impl Iterator<Item = EventId> {
    ids.into_iter().map(EventId::from_byte_array)
}

fn update_progress(opts: &SyncOptions, total: u64, current: u64) {
    if let Some(progress) = &opts.progress {
        progress.send_modify(|state| {
            state.total += total;
            state.current += current;
        });
    }
}

async fn handle_neg_msg(
    relay: &Relay,
    reconciler: &mut Reconciler,
    sub_id: &SubscriptionId,
    message: &str,
    opts: &SyncOptions,
    output: &mut SyncSummary,
    state: &mut SyncState,
) -> Result<(), Error> {
    let query: Vec<u8> = hex::decode(message)?;

    let mut have: Vec<Id> = Vec::new();
    let mut need: Vec<Id> = Vec::new();
    let next: Option<Vec<u8>> = reconciler.reconcile_with_ids(&query, &mut have, &mut need)?;

    let mut new_items: u64 = 0;

    for id in to_event_ids(have) {
        if output.local.insert(id) && opts.do_up() {
            state.have_ids.push(id);
            new_items += 1;
        }
    }

    for id in to_event_ids(need) {
        if output.remote.insert(id) && opts.do_down() {
            state.need_ids.push(id);
            new_items += 1;
        }
    }

    update_progress(opts, new_items, 0);

    match next {
        Some(next) => {
            relay
                .send_msg(ClientMessage::NegMsg {
                    subscription_id: sub_id.clone(),
                    message: hex::encode(next),
                })
                .await
        }
        None => {
            state.done = true;
            relay
                .send_msg(ClientMessage::NegClose {
                    subscription_id: sub_id.clone(),
                })
                .await
        }
    }
}

/// Publish the local events missing on the relay, keeping the in-flight set between the watermarks
async fn upload_events(
    relay: &Relay,
    opts: &SyncOptions,
    state: &mut SyncState,
) -> Result<(), Error> {
    if !opts.do_up() || state.have_ids.is_empty() || state.in_flight_up.len() > SYNC_LOW_WATER_UP
    {
        return Ok(());
    }

    let mut num_sent: u64 = 0;

    while state.in_flight_up.len() < SYNC_HIGH_WATER_UP {
        let Some(id) = state.have_ids.pop() else {
            break;
        };

        match relay.inner.state.database().event_by_id(&id).await {
            Ok(Some(event)) => {
                state.in_flight_up.insert(id);
                relay.send_msg(ClientMessage::event(event)).await?;
                num_sent += 1;
            }
            Ok(None) => {
                tracing::debug!(url = %relay.url(), id = %id, "Event to upload not found.");
            }
            Err(e) => {
                tracing::error!(url = %relay.url(), id = %id, error = %e, "Can't upload event.");
            }
        }
    }

    update_progress(opts, 0, num_sent);

    if num_sent > 0 {
        tracing::info!(
            url = %relay.url(),
            sent = num_sent,
            remaining = state.have_ids.len(),
            "Sync: uploaded events."
        );
    }

    Ok(())
}

/// Request the next batch of events missing locally
async fn request_events(
    relay: &Relay,
    down_sub_id: &SubscriptionId,
    opts: &SyncOptions,
    state: &mut SyncState,
) -> Result<(), Error> {
    if !opts.do_down() || state.need_ids.is_empty() || state.in_flight_down {
        return Ok(());
    }

    let len: usize = cmp::min(state.need_ids.len(), SYNC_BATCH_SIZE_DOWN);
    let split_at: usize = state.need_ids.len() - len;
    let ids: Vec<EventId> = state.need_ids.split_off(split_at);

    tracing::info!(
        url = %relay.url(),
        requested = ids.len(),
        remaining = state.need_ids.len(),
        "Sync: requesting events."
    );

    update_progress(opts, 0, ids.len() as u64);

    let filter: Filter = Filter::new().ids(ids);

    relay
        .inner
        .add_auto_closing_subscription(down_sub_id.clone(), vec![filter.clone()])
        .await;

    if let Err(e) = relay
        .send_msg(ClientMessage::req(down_sub_id.clone(), vec![filter]))
        .await
    {
        relay.inner.remove_subscription(down_sub_id).await;
        return Err(e);
    }

    state.in_flight_down = true;

    Ok(())
}

/// Returns `true` if the event was uploaded by this sync
fn handle_ok(
    relay: &Relay,
    event_id: EventId,
    status: bool,
    message: String,
    output: &mut SyncSummary,
    state: &mut SyncState,
) -> bool {
    if !state.in_flight_up.remove(&event_id) {
        return false;
    }

    if status {
        output.sent.insert(event_id);
    } else {
        tracing::error!(url = %relay.url(), id = %event_id, msg = %message, "Can't upload event.");
        output.send_failures.insert(event_id, message);
    }

    true
}

async fn sync(
    relay: &Relay,
    filter: Filter,
    items: Vec<EventId>,
    opts: &SyncOptions,
    output: &mut SyncSummary,
) -> Result<(), Error> {
    let mut reconciler: Reconciler = build_reconciler(items)?;
    let initial_message: Vec<u8> = reconciler.initiate()?;

    // The support check consumes its own receiver
    let mut notifications = relay.notifications();
    let mut temp_notifications = relay.notifications();

    let sub_id: SubscriptionId = SubscriptionId::generate();
    relay
        .send_msg(ClientMessage::NegOpen {
            subscription_id: sub_id.clone(),
            filter: Box::new(filter),
            initial_message: hex::encode(initial_message),
        })
        .await?;

    check_support(&sub_id, opts, &mut temp_notifications).await?;

    let down_sub_id: SubscriptionId = SubscriptionId::generate();
    let mut state: SyncState = SyncState::default();
    let mut last_relevant_msg: Instant = Instant::now();

    while let Ok(notification) = notifications.recv().await {
        if last_relevant_msg.elapsed() > opts.idle_timeout {
            return Err(Error::Timeout);
        }

        match notification {
            RelayNotification::Message { message } => {
                let is_relevant: bool = match message {
                    RelayMessage::NegMsg {
                        subscription_id,
                        message,
                    } if subscription_id == sub_id => {
                        handle_neg_msg(
                            relay,
                            &mut reconciler,
                            &sub_id,
                            &message,
                            opts,
                            output,
                            &mut state,
                        )
                        .await?;
                        true
                    }
                    RelayMessage::NegErr {
                        subscription_id,
                        message,
                    } if subscription_id == sub_id => {
                        return Err(Error::RelayMessage(message));
                    }
                    RelayMessage::Ok {
                        event_id,
                        status,
                        message,
                    } => handle_ok(relay, event_id, status, message, output, &mut state),
                    RelayMessage::Event {
                        subscription_id,
                        event,
                    } if subscription_id == down_sub_id => {
                        output.received.insert(event.id);
                        true
                    }
                    RelayMessage::EndOfStoredEvents(subscription_id)
                        if subscription_id == down_sub_id =>
                    {
                        state.in_flight_down = false;
                        relay.inner.remove_subscription(&down_sub_id).await;
                        relay
                            .send_msg(ClientMessage::close(down_sub_id.clone()))
                            .await?;
                        true
                    }
                    // The subscription is already removed by the message handler
                    RelayMessage::Closed {
                        subscription_id, ..
                    } if subscription_id == down_sub_id => {
                        state.in_flight_down = false;
                        true
                    }
                    _ => false,
                };

                upload_events(relay, opts, &mut state).await?;
                request_events(relay, &down_sub_id, opts, &mut state).await?;

                // Updated after uploading and requesting, which may take some time
                if is_relevant {
                    last_relevant_msg = Instant::now();
                }
            }
            RelayNotification::RelayStatus { status } => {
                if status.is_disconnected() {
                    return Err(Error::NotConnected);
                }
            }
            RelayNotification::Event { .. } => {}
        }

        if state.is_finished() {
            break;
        }
    }

    tracing::info!(url = %relay.url(), "Reconciliation terminated.");

    Ok(())
}

/// Wait for the first reply to NEG-OPEN
async fn check_support(
    sub_id: &SubscriptionId,
    opts: &SyncOptions,
    notifications: &mut broadcast::Receiver<RelayNotification>,
) -> Result<(), Error> {
    time::timeout(Some(opts.initial_timeout), async {
        while let Ok(notification) = notifications.recv().await {
            if let RelayNotification::Message { message } = notification {
                match message {
                    RelayMessage::NegMsg {
                        subscription_id, ..
                    } if &subscription_id == sub_id => return Ok(()),
                    RelayMessage::NegErr {
                        subscription_id,
                        message,
                    } if &subscription_id == sub_id => return Err(Error::RelayMessage(message)),
                    RelayMessage::Notice(message)
                        if message.contains("NEG-") || message.contains("unknown cmd") =>
                    {
                        return Err(Error::ReconciliationNotSupported);
                    }
                    _ => {}
                }
            }
        }

        Err(Error::PrematureExit)
    })
    .await
    .ok_or(Error::Timeout)?
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use nostr_core::{Event, EventBuilder, Keys, Kind, RelayUrl};
    use nostr_relay_server::MockRelay;
    use nostr_storage::NostrDatabase;
    use nostr_storage_memory::MemoryDatabase;

    use super::*;
    use crate::relay::{SyncDirection, SyncProgress};

    fn text_note(content: &str) -> Event {
        EventBuilder::text_note(content)
            .sign_with_keys(&Keys::generate())
            .unwrap()
    }

    /// Returns a connected relay backed by a database holding `local_events`
    async fn setup(local_events: &[Event], url: RelayUrl) -> (Relay, Arc<MemoryDatabase>) {
        let database = Arc::new(MemoryDatabase::unbounded());
        for event in local_events.iter() {
            database.save_event(event).await.unwrap();
        }

        let relay = Relay::builder(url).database(database.clone()).build();
        relay
            .try_connect()
            .timeout(Duration::from_secs(2))
            .await
            .unwrap();

        (relay, database)
    }

    #[tokio::test]
    async fn test_sync_both() {
        let mock = MockRelay::run().await.unwrap();
        let url = mock.url().await;

        let local_events = vec![
            text_note("Local 1"),
            text_note("Local 2"),
            EventBuilder::new(Kind::Custom(123), "Local 123")
                .sign_with_keys(&Keys::generate())
                .unwrap(),
        ];
        let (relay, database) = setup(&local_events, url).await;

        let relay_events = vec![
            // In common with the local database
            local_events[0].clone(),
            text_note("Remote 2"),
            text_note("Remote 3"),
            EventBuilder::new(Kind::Custom(123), "Remote 123")
                .sign_with_keys(&Keys::generate())
                .unwrap(),
        ];

        // Published through another connection, to keep the local database untouched
        let publisher = Relay::new(relay.url().clone());
        publisher
            .try_connect()
            .timeout(Duration::from_secs(2))
            .await
            .unwrap();
        for event in relay_events.iter() {
            publisher.send_event(event).await.unwrap();
        }

        let (tx, rx) = SyncProgress::channel();
        let filter = Filter::new().kind(Kind::TextNote);
        let opts = SyncOptions::default()
            .direction(SyncDirection::Both)
            .progress(tx);
        let output = relay.sync(filter.clone()).opts(opts).await.unwrap();

        assert_eq!(
            output,
            SyncSummary {
                local: HashSet::from([local_events[1].id]),
                remote: HashSet::from([relay_events[1].id, relay_events[2].id]),
                sent: HashSet::from([local_events[1].id]),
                received: HashSet::from([relay_events[1].id, relay_events[2].id]),
                send_failures: HashMap::new(),
            }
        );

        let progress = *rx.borrow();
        assert_eq!(progress.total, 3);
        assert_eq!(progress.current, 3);

        // Both sides now hold the same text notes
        assert_eq!(database.count(filter).await.unwrap(), 4);
        let output = relay
            .sync(Filter::new().kind(Kind::TextNote))
            .opts(SyncOptions::default().direction(SyncDirection::Both))
            .await
            .unwrap();
        assert!(output.local.is_empty());
        assert!(output.remote.is_empty());
    }

    #[tokio::test]
    async fn test_sync_dry_run() {
        let mock = MockRelay::run().await.unwrap();
        let url = mock.url().await;

        let local = text_note("Local");
        let (relay, database) = setup(std::slice::from_ref(&local), url).await;

        let publisher = Relay::new(relay.url().clone());
        publisher
            .try_connect()
            .timeout(Duration::from_secs(2))
            .await
            .unwrap();
        let remote = text_note("Remote");
        publisher.send_event(&remote).await.unwrap();

        let opts = SyncOptions::default()
            .direction(SyncDirection::Both)
            .dry_run();
        let output = relay.sync(Filter::new()).opts(opts).await.unwrap();

        assert_eq!(output.local, HashSet::from([local.id]));
        assert_eq!(output.remote, HashSet::from([remote.id]));
        assert!(output.sent.is_empty());
        assert!(output.received.is_empty());

        // Nothing transferred
        assert_eq!(database.count(Filter::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sync_identical_sets() {
        let mock = MockRelay::run().await.unwrap();
        let url = mock.url().await;

        let (relay, _database) = setup(&[], url).await;

        let output = relay.sync(Filter::new()).await.unwrap();
        assert_eq!(output, SyncSummary::default());
    }
}
