// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Local relay builder

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use nostr_core::policy::{AdmitPolicy, AdmitStatus, PolicyError};
use nostr_core::util::BoxedFuture;
use nostr_core::Filter;
use nostr_storage::{IntoNostrDatabase, NostrDatabase};
use nostr_storage_memory::MemoryDatabase;
use tokio::runtime::Handle;

use crate::local::LocalRelay;

/// Rate limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimit {
    /// Max active REQs
    pub max_reqs: usize,
    /// Max events per minutes
    pub notes_per_minute: u32,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            max_reqs: 20,
            notes_per_minute: 60,
        }
    }
}

/// Query policy
///
/// Called for every `REQ` and `COUNT` before touching the database.
pub trait QueryPolicy: fmt::Debug + Send + Sync {
    /// Admit a query
    fn admit_query<'a>(
        &'a self,
        filters: &'a [Filter],
        addr: &'a SocketAddr,
    ) -> BoxedFuture<'a, Result<AdmitStatus, PolicyError>>;
}

/// Default max subscription ID length
pub const DEFAULT_MAX_SUBID_LENGTH: usize = 250;
/// Default cap of the `limit` requested by a filter
pub const DEFAULT_MAX_FILTER_LIMIT: usize = 5000;
/// Default `limit` of filters that don't set one
pub const DEFAULT_FILTER_LIMIT: usize = 500;

/// Test options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalRelayTestOptions {
    /// Wait this long before accepting each connection
    pub unresponsive_connection: Option<Duration>,
    /// Send random events, unrelated to the filters, on every `REQ`
    pub send_random_events: bool,
}

/// Local relay builder
pub struct LocalRelayBuilder {
    /// IP address
    pub(crate) addr: Option<IpAddr>,
    /// Port
    pub(crate) port: Option<u16>,
    /// Database
    pub(crate) database: Arc<dyn NostrDatabase>,
    /// Admission policy
    pub(crate) admit_policy: Option<Arc<dyn AdmitPolicy>>,
    /// Query policies
    pub(crate) query_policy: Vec<Arc<dyn QueryPolicy>>,
    /// Rate limit
    pub(crate) rate_limit: RateLimit,
    /// Max connections allowed
    pub(crate) max_connections: Option<usize>,
    /// Reject events created too far in the future
    pub(crate) max_future_drift: Option<Duration>,
    /// Max subscription ID length
    pub(crate) max_subid_length: usize,
    /// Max stored events returned per filter
    pub(crate) max_filter_limit: usize,
    /// Stored events returned per filter without `limit`
    pub(crate) default_filter_limit: usize,
    /// Executor
    pub(crate) executor: Option<Handle>,
    /// Test options
    pub(crate) test: LocalRelayTestOptions,
}

impl fmt::Debug for LocalRelayBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalRelayBuilder")
            .field("addr", &self.addr)
            .field("port", &self.port)
            .field("rate_limit", &self.rate_limit)
            .field("max_connections", &self.max_connections)
            .field("max_future_drift", &self.max_future_drift)
            .field("max_subid_length", &self.max_subid_length)
            .field("max_filter_limit", &self.max_filter_limit)
            .field("default_filter_limit", &self.default_filter_limit)
            .field("test", &self.test)
            .finish()
    }
}

impl Default for LocalRelayBuilder {
    fn default() -> Self {
        Self {
            addr: None,
            port: None,
            database: Arc::new(MemoryDatabase::unbounded()),
            admit_policy: None,
            query_policy: Vec::new(),
            rate_limit: RateLimit::default(),
            max_connections: None,
            max_future_drift: None,
            max_subid_length: DEFAULT_MAX_SUBID_LENGTH,
            max_filter_limit: DEFAULT_MAX_FILTER_LIMIT,
            default_filter_limit: DEFAULT_FILTER_LIMIT,
            executor: None,
            test: LocalRelayTestOptions::default(),
        }
    }
}

impl LocalRelayBuilder {
    /// Set IP address
    #[inline]
    pub fn addr(mut self, ip: IpAddr) -> Self {
        self.addr = Some(ip);
        self
    }

    /// Set port
    ///
    /// By default a free port is picked.
    #[inline]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set database
    #[inline]
    pub fn database<D>(mut self, database: D) -> Self
    where
        D: IntoNostrDatabase,
    {
        self.database = database.into_nostr_database();
        self
    }

    /// Set admission policy
    #[inline]
    pub fn admit_policy<T>(mut self, policy: T) -> Self
    where
        T: AdmitPolicy + 'static,
    {
        self.admit_policy = Some(Arc::new(policy));
        self
    }

    /// Add query policy
    #[inline]
    pub fn query_policy<T>(mut self, policy: T) -> Self
    where
        T: QueryPolicy + 'static,
    {
        self.query_policy.push(Arc::new(policy));
        self
    }

    /// Set rate limit
    #[inline]
    pub fn rate_limit(mut self, limit: RateLimit) -> Self {
        self.rate_limit = limit;
        self
    }

    /// Set max number of connections
    #[inline]
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Reject events with `created_at` further than `drift` in the future
    #[inline]
    pub fn max_future_drift(mut self, drift: Duration) -> Self {
        self.max_future_drift = Some(drift);
        self
    }

    /// Close `REQ`s whose subscription ID is longer than `max` (default: [`DEFAULT_MAX_SUBID_LENGTH`])
    #[inline]
    pub fn max_subid_length(mut self, max: usize) -> Self {
        self.max_subid_length = max;
        self
    }

    /// Cap the stored events returned for each filter of a `REQ` (default: [`DEFAULT_MAX_FILTER_LIMIT`])
    ///
    /// A larger `limit` in the filter falls back to this value.
    #[inline]
    pub fn max_filter_limit(mut self, max: usize) -> Self {
        self.max_filter_limit = max;
        self
    }

    /// Stored events returned for a filter without `limit` (default: [`DEFAULT_FILTER_LIMIT`])
    #[inline]
    pub fn default_filter_limit(mut self, limit: usize) -> Self {
        self.default_filter_limit = limit;
        self
    }

    /// Set the runtime where the relay tasks are spawned
    ///
    /// By default, the runtime calling [`LocalRelay::run`] is used.
    #[inline]
    pub fn executor(mut self, handle: Handle) -> Self {
        self.executor = Some(handle);
        self
    }

    /// Set test options
    #[inline]
    pub fn test(mut self, test: LocalRelayTestOptions) -> Self {
        self.test = test;
        self
    }

    /// Build local relay
    ///
    /// Call [`LocalRelay::run`] to start listening.
    #[inline]
    pub fn build(self) -> LocalRelay {
        LocalRelay::new(self)
    }
}
