// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

use std::future::IntoFuture;
use std::time::Duration;

use futures::StreamExt;
use nostr_core::util::BoxedFuture;
use nostr_core::Filter;
use nostr_storage::Events;

use crate::relay::{Error, Relay, ReqExitPolicy};

/// Collect the events of an auto-closing subscription
#[must_use = "Does nothing unless you await!"]
pub struct FetchEvents<'relay> {
    relay: &'relay Relay,
    filters: Vec<Filter>,
    timeout: Option<Duration>,
    policy: ReqExitPolicy,
}

impl<'relay> FetchEvents<'relay> {
    pub(crate) fn new(relay: &'relay Relay, filters: Vec<Filter>) -> Self {
        Self {
            relay,
            filters,
            timeout: None,
            policy: ReqExitPolicy::ExitOnEOSE,
        }
    }

    /// Give up after `timeout`, returning what was collected so far (default: none)
    #[inline]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set request exit policy (default: [`ReqExitPolicy::ExitOnEOSE`]).
    #[inline]
    pub fn policy(mut self, policy: ReqExitPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Collection for the results of `filters`
///
/// The filter limit is honoured only for a single filter fetched until EOSE:
/// events received after EOSE are kept even if they exceed it.
pub(crate) fn events_collection(filters: &[Filter], policy: ReqExitPolicy) -> Events {
    match (filters, policy) {
        ([filter], ReqExitPolicy::ExitOnEOSE) => Events::new(filter),
        _ => Events::new(&Filter::new()),
    }
}

impl<'relay> IntoFuture for FetchEvents<'relay> {
    type Output = Result<Events, Error>;
    type IntoFuture = BoxedFuture<'relay, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            let mut events: Events = events_collection(&self.filters, self.policy);

            let mut stream = self
                .relay
                .stream_events(self.filters)
                .maybe_timeout(self.timeout)
                .policy(self.policy)
                .await?;

            while let Some(event) = stream.next().await.transpose()? {
                events.insert(event);
            }

            Ok(events)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use nostr_core::{Event, EventBuilder, Keys, Kind};
    use nostr_relay_server::MockRelay;
    use nostr_relay_server::builder::LocalRelayTestOptions;

    use super::*;
    use crate::policy::MutePolicy;
    use crate::relay::{RelayOptions, RelayStatus};

    fn note(keys: &Keys, content: &str) -> Event {
        EventBuilder::text_note(content).sign_with_keys(keys).unwrap()
    }

    /// Connected relay storing `stored` text notes
    async fn relay_with_notes(stored: usize) -> (Relay, MockRelay) {
        let mock = MockRelay::run().await.unwrap();
        let relay = Relay::new(mock.url().await);
        relay.connect();

        let keys = Keys::generate();
        for i in 0..stored {
            relay.send_event(&note(&keys, &i.to_string())).await.unwrap();
        }

        (relay, mock)
    }

    /// Publish `count` notes every `interval`, starting after `interval`
    fn publish_later(relay: &Relay, count: usize, interval: Duration) {
        let relay = relay.clone();
        tokio::spawn(async move {
            let keys = Keys::generate();
            for i in 0..count {
                tokio::time::sleep(interval).await;
                let event = note(&keys, &format!("late {i}"));
                relay.send_event(&event).await.unwrap();
            }
        });
    }

    #[tokio::test]
    async fn test_empty_relay_returns_at_eose() {
        let (relay, _mock) = relay_with_notes(0).await;

        let start = Instant::now();
        let events = relay
            .fetch_events(Filter::new().kind(Kind::TextNote))
            .timeout(Duration::from_secs(10))
            .await
            .unwrap();
        assert!(events.is_empty());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_filter_limit_until_eose() {
        let (relay, _mock) = relay_with_notes(5).await;
        let notes = Filter::new().kind(Kind::TextNote);

        let all = relay.fetch_events(notes.clone()).await.unwrap();
        assert_eq!(all.len(), 5);

        let newest = relay.fetch_events(notes.limit(3)).await.unwrap();
        assert_eq!(newest.len(), 3);
        assert!(newest.iter().all(|e| all.contains(e)));
    }

    #[tokio::test]
    async fn test_exit_policies() {
        let (relay, _mock) = relay_with_notes(5).await;
        let notes = Filter::new().kind(Kind::TextNote);

        let events = relay
            .fetch_events(notes.clone())
            .timeout(Duration::from_secs(15))
            .policy(ReqExitPolicy::WaitForEvents(2))
            .await
            .unwrap();
        assert_eq!(events.len(), 2);

        // 3 stored events until EOSE, then 2 live ones
        publish_later(&relay, 2, Duration::from_secs(1));
        let events = relay
            .fetch_events(notes.clone().limit(3))
            .timeout(Duration::from_secs(15))
            .policy(ReqExitPolicy::WaitForEventsAfterEOSE(2))
            .await
            .unwrap();
        assert_eq!(events.len(), 5);

        // Only the first live event arrives before the window closes
        publish_later(&relay, 2, Duration::from_secs(2));
        let events = relay
            .fetch_events(notes)
            .timeout(Duration::from_secs(15))
            .policy(ReqExitPolicy::WaitDurationAfterEOSE(Duration::from_secs(3)))
            .await
            .unwrap();
        assert_eq!(events.len(), 8);
    }

    #[tokio::test]
    async fn test_mismatching_relay_returns_nothing() {
        let mock = MockRelay::run_with_opts(LocalRelayTestOptions {
            send_random_events: true,
            ..Default::default()
        })
        .await
        .unwrap();
        let opts = RelayOptions::default()
            .verify_subscriptions(true)
            .ban_relay_on_mismatch(true);
        let relay = Relay::builder(mock.url().await).opts(opts).build();
        relay
            .try_connect()
            .timeout(Duration::from_secs(3))
            .await
            .unwrap();

        let events = relay
            .fetch_events(Filter::new().kind(Kind::Metadata))
            .timeout(Duration::from_secs(3))
            .await
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(relay.status(), RelayStatus::Banned);
    }

    #[tokio::test]
    async fn test_muted_author_is_filtered_out() {
        let mock = MockRelay::run().await.unwrap();
        let muted = Keys::generate();
        let mute = MutePolicy::new();
        mute.mute(muted.public_key()).await;

        let relay = Relay::builder(mock.url().await)
            .admit_policy(mute.clone())
            .build();
        relay
            .try_connect()
            .timeout(Duration::from_secs(3))
            .await
            .unwrap();

        let hidden = note(&muted, "muted");
        let visible = note(&Keys::generate(), "other");
        relay.send_event(&hidden).await.unwrap();
        relay.send_event(&visible).await.unwrap();

        let notes = Filter::new().kind(Kind::TextNote);
        let events = relay.fetch_events(notes.clone()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(events.contains(&visible));

        let database = relay.inner.state.database();
        assert!(database.event_by_id(&hidden.id).await.unwrap().is_none());

        mute.unmute(&muted.public_key()).await;
        let events = relay.fetch_events(notes).await.unwrap();
        assert_eq!(events.len(), 2);
    }
}
