// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::time::Duration;

use futures::stream;
use nostr_core::{Event, Filter, SubscriptionId};
use tokio::sync::mpsc;

use super::subscribe::subscribe_auto_closing;
use crate::BoxedStream;
use crate::relay::{
    Error, Relay, ReqExitPolicy, SubscribeAutoCloseOptions, SubscriptionActivity,
    SubscriptionAutoClosedReason,
};

type EventStream = BoxedStream<Result<Event, Error>>;

/// Stream events
///
/// Dropping the stream closes the subscription.
#[must_use = "Does nothing unless you await!"]
pub struct StreamEvents<'relay> {
    relay: &'relay Relay,
    filters: Vec<Filter>,
    timeout: Option<Duration>,
    policy: ReqExitPolicy,
}

impl<'relay> StreamEvents<'relay> {
    pub(crate) fn new(relay: &'relay Relay, filters: Vec<Filter>) -> Self {
        Self {
            relay,
            filters,
            timeout: None,
            policy: ReqExitPolicy::KeepOpen,
        }
    }

    #[inline]
    pub(crate) fn maybe_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set a timeout
    ///
    /// By default, no timeout is configured.
    #[inline]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set request exit policy (default: [`ReqExitPolicy::KeepOpen`]).
    #[inline]
    pub fn policy(mut self, policy: ReqExitPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn exec(self) -> Result<EventStream, Error> {
        let (tx, rx) = mpsc::channel(512);

        let opts: SubscribeAutoCloseOptions = SubscribeAutoCloseOptions::default()
            .exit_policy(self.policy)
            .timeout(self.timeout);

        let id: SubscriptionId = SubscriptionId::generate();
        subscribe_auto_closing(self.relay, id, self.filters, opts, Some(tx)).await?;

        // Ends after the first `Closed` activity or when the subscription task exits
        let events = stream::unfold(Some(rx), |rx| async move {
            let mut rx = rx?;
            match rx.recv().await? {
                SubscriptionActivity::ReceivedEvent(event) => Some((Ok(event), Some(rx))),
                SubscriptionActivity::Closed(SubscriptionAutoClosedReason::Closed(message)) => {
                    Some((Err(Error::RelayMessage(message)), None))
                }
                SubscriptionActivity::Closed(SubscriptionAutoClosedReason::Completed) => None,
            }
        });

        Ok(Box::pin(events))
    }
}

impl<'relay> IntoFuture for StreamEvents<'relay> {
    type Output = Result<EventStream, Error>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send + 'relay>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.exec())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use async_utility::time;
    use futures::StreamExt;
    use nostr_core::{EventBuilder, Keys, Kind};
    use nostr_relay_server::MockRelay;

    use super::*;

    #[tokio::test]
    async fn test_stream_ends_at_timeout() {
        let mock = MockRelay::run().await.unwrap();
        let url = mock.url().await;

        let relay: Relay = Relay::new(url);
        relay
            .try_connect()
            .timeout(Duration::from_secs(3))
            .await
            .unwrap();

        let start = Instant::now();
        let mut stream = relay
            .stream_events(Filter::new().kind(Kind::TextNote))
            .timeout(Duration::from_secs(1))
            .await
            .unwrap();

        assert!(stream.next().await.is_none());
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_stream_receives_live_events() {
        let mock = MockRelay::run().await.unwrap();
        let url = mock.url().await;

        let relay: Relay = Relay::new(url);
        relay
            .try_connect()
            .timeout(Duration::from_secs(3))
            .await
            .unwrap();

        let mut stream = relay
            .stream_events(Filter::new().kind(Kind::TextNote))
            .timeout(Duration::from_secs(5))
            .await
            .unwrap();

        let event = EventBuilder::text_note("Live")
            .sign_with_keys(&Keys::generate())
            .unwrap();
        relay.send_event(&event).await.unwrap();

        let received = stream.next().await.unwrap().unwrap();
        assert_eq!(received.id, event.id);
    }

    #[tokio::test]
    async fn test_drop_stream_closes_subscription() {
        let mock = MockRelay::run().await.unwrap();
        let url = mock.url().await;

        let relay: Relay = Relay::new(url);
        relay
            .try_connect()
            .timeout(Duration::from_secs(3))
            .await
            .unwrap();

        let stream = relay
            .stream_events(Filter::new().kind(Kind::TextNote))
            .await
            .unwrap();

        assert_eq!(relay.inner.subscriptions_count().await, 1);

        drop(stream);

        time::sleep(Duration::from_millis(500)).await;

        assert_eq!(relay.inner.subscriptions_count().await, 0);
    }
}
