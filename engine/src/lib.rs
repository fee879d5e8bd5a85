// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]
#![warn(clippy::large_futures)]
#![allow(clippy::mutable_key_type)] // Needed to suppress false positive for `BTreeSet<Event>`
#![doc = include_str!("../README.md")]

pub mod client;
pub mod policy;
pub mod pool;
pub mod prelude;
pub mod relay;
mod shared;
pub mod transport;

pub use self::client::{Client, ClientBuilder, ClientNotification, ClientOptions};
pub use self::policy::MutePolicy;
pub use self::pool::{Output, RelayPool, RelayPoolOptions};
pub use self::relay::{Relay, RelayOptions, RelayStatus};

/// Boxed stream
pub type BoxedStream<T> = std::pin::Pin<Box<dyn futures::Stream<Item = T> + Send>>;
