// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay Pool

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use atomic_destructor::AtomicDestroyer;
use nostr_core::{Filter, RelayUrl, SubscriptionId};
use tokio::sync::{RwLock, broadcast};

use super::builder::RelayPoolBuilder;
use super::builder::RelayPoolOptions;
use crate::client::ClientNotification;
use crate::relay::Relay;
use crate::shared::SharedState;

pub(super) type Relays = HashMap<RelayUrl, Relay>;

// Fields that need an `Arc` are grouped here, to keep a single atomic counter.
#[derive(Debug)]
pub(super) struct AtomicPrivateData {
    pub(super) relays: RwLock<Relays>,
    /// Long-lived subscriptions, inherited by newly added relays
    pub(super) inherit_subscriptions: RwLock<HashMap<SubscriptionId, Vec<Filter>>>,
    pub(super) shutdown: AtomicBool,
}

#[derive(Debug, Clone)]
pub(crate) struct InnerRelayPool {
    pub(super) state: SharedState,
    pub(super) atomic: Arc<AtomicPrivateData>,
    pub(super) notification_sender: broadcast::Sender<ClientNotification>,
    pub(super) opts: RelayPoolOptions,
}

impl AtomicDestroyer for InnerRelayPool {
    fn on_destroy(&self) {
        // The last handle is gone: nobody can await anymore
        if self.atomic.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }

        match self.atomic.relays.try_read() {
            Ok(relays) => {
                for relay in relays.values() {
                    relay.shutdown();
                }
            }
            Err(..) => tracing::warn!("Relays are locked, they'll shut down once dropped."),
        }

        let _ = self.notification_sender.send(ClientNotification::Shutdown);
    }
}

impl InnerRelayPool {
    pub(super) fn from_builder(builder: RelayPoolBuilder) -> Self {
        let (notification_sender, _) = broadcast::channel(builder.opts.notification_channel_size);

        Self {
            state: SharedState::new(
                builder.database,
                builder.websocket_transport,
                builder.admit_policy,
                builder.executor,
            ),
            atomic: Arc::new(AtomicPrivateData {
                relays: RwLock::new(HashMap::new()),
                inherit_subscriptions: RwLock::new(HashMap::new()),
                shutdown: AtomicBool::new(false),
            }),
            notification_sender,
            opts: builder.opts,
        }
    }

    #[inline]
    pub(super) fn is_shutdown(&self) -> bool {
        self.atomic.shutdown.load(Ordering::SeqCst)
    }

    pub(super) async fn shutdown(&self) {
        // Already shutdown
        if self.atomic.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut relays = self.atomic.relays.write().await;
        for relay in relays.values() {
            relay.shutdown();
        }
        relays.clear();

        let _ = self.notification_sender.send(ClientNotification::Shutdown);

        tracing::info!("Relay pool shutdown.");
    }
}
