// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

use std::future::{Future, IntoFuture};
use std::pin::Pin;

use nostr_core::{ClientMessage, Filter, SubscriptionId};
use tokio::sync::mpsc;

use crate::relay::{Error, Relay, SubscribeAutoCloseOptions, SubscriptionActivity};

/// Open a subscription
///
/// Long-lived unless [`Subscribe::close_on`] is set.
#[must_use = "Does nothing unless you await!"]
pub struct Subscribe<'relay> {
    relay: &'relay Relay,
    filters: Vec<Filter>,
    id: Option<SubscriptionId>,
    auto_close: Option<SubscribeAutoCloseOptions>,
}

impl<'relay> Subscribe<'relay> {
    #[inline]
    pub(crate) fn new(relay: &'relay Relay, filters: Vec<Filter>) -> Self {
        Self {
            relay,
            filters,
            id: None,
            auto_close: None,
        }
    }

    /// Use this subscription id instead of a random one
    #[inline]
    pub fn with_id(mut self, id: SubscriptionId) -> Self {
        self.id = Some(id);
        self
    }

    /// Close the subscription when `opts` says so
    #[inline]
    pub fn close_on(mut self, opts: SubscribeAutoCloseOptions) -> Self {
        self.auto_close = Some(opts);
        self
    }

    async fn exec(self) -> Result<SubscriptionId, Error> {
        if self.filters.is_empty() {
            return Err(Error::EmptyFilters);
        }

        let id: SubscriptionId = self.id.unwrap_or_else(SubscriptionId::generate);

        match self.auto_close {
            Some(opts) => {
                subscribe_auto_closing(self.relay, id.clone(), self.filters, opts, None).await?;
            }
            None => {
                let req = ClientMessage::req(id.clone(), self.filters.clone());
                self.relay.send_msg(req).await?;
                self.relay
                    .inner
                    .update_subscription(id.clone(), self.filters)
                    .await;
            }
        }

        Ok(id)
    }
}

/// Register the subscription, send the REQ and hand it to the auto-closing task
///
/// `activity` receives the matching events and the closing reason.
pub(super) async fn subscribe_auto_closing(
    relay: &Relay,
    id: SubscriptionId,
    filters: Vec<Filter>,
    opts: SubscribeAutoCloseOptions,
    activity: Option<mpsc::Sender<SubscriptionActivity>>,
) -> Result<(), Error> {
    if filters.is_empty() {
        return Err(Error::EmptyFilters);
    }

    // Listen before sending the REQ, or the EOSE may be missed
    let notifications = relay.notifications();

    let inner = &relay.inner;
    inner
        .add_auto_closing_subscription(id.clone(), filters.clone())
        .await;

    if let Err(e) = relay.send_msg(ClientMessage::req(id.clone(), filters)).await {
        inner.remove_subscription(&id).await;
        return Err(e);
    }

    inner.spawn_auto_closing_handler(id, opts, notifications, activity);

    Ok(())
}

impl<'relay> IntoFuture for Subscribe<'relay> {
    type Output = Result<SubscriptionId, Error>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send + 'relay>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.exec())
    }
}
