// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::ops::{Deref, DerefMut};

use nostr_core::{EventId, RelayUrl, SubscriptionId};

use crate::relay::SyncSummary;

/// Output of an operation executed on many relays
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output<T>
where
    T: Debug,
{
    /// Value
    pub val: T,
    /// Set of relays that succeeded
    pub success: HashSet<RelayUrl>,
    /// Map of relays that failed, with related errors.
    pub failed: HashMap<RelayUrl, String>,
}

impl<T> Deref for Output<T>
where
    T: Debug,
{
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.val
    }
}

impl<T> DerefMut for Output<T>
where
    T: Debug,
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.val
    }
}

impl<T> Output<T>
where
    T: Debug,
{
    /// Create a new output
    #[must_use]
    pub fn new(val: T) -> Self {
        Self {
            val,
            success: HashSet::new(),
            failed: HashMap::new(),
        }
    }

    /// Get inner value
    #[inline]
    #[must_use]
    pub fn into_inner(self) -> T {
        self.val
    }

    pub(crate) fn record<E>(&mut self, url: RelayUrl, res: Result<(), E>)
    where
        E: ToString,
    {
        match res {
            Ok(()) => {
                self.success.insert(url);
            }
            Err(e) => {
                self.failed.insert(url, e.to_string());
            }
        }
    }
}

impl Output<EventId> {
    /// Get event ID
    #[inline]
    pub fn id(&self) -> &EventId {
        self.deref()
    }
}

impl Output<SubscriptionId> {
    /// Get subscription ID
    #[inline]
    pub fn id(&self) -> &SubscriptionId {
        self.deref()
    }
}

impl Output<SyncSummary> {
    /// Merge the summary of a relay
    pub(crate) fn merge(&mut self, other: SyncSummary) {
        self.val.local.extend(other.local);
        self.val.remote.extend(other.remote);
        self.val.sent.extend(other.sent);
        self.val.received.extend(other.received);
        self.val.send_failures.extend(other.send_failures);
    }
}
