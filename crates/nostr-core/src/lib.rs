// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]
#![doc = include_str!("../README.md")]

pub use bitcoin_hashes as hashes;
pub use secp256k1;
pub use url::{self, Url};

pub mod event;
pub mod filter;
pub mod key;
pub mod message;
pub mod policy;
pub mod prelude;
pub mod types;
pub mod util;

pub use self::event::{Event, EventBuilder, EventId, Kind, Tag};
pub use self::filter::{Filter, SingleLetterTag};
pub use self::key::{Keys, PublicKey, SecretKey};
pub use self::message::{ClientMessage, MachineReadablePrefix, RelayMessage, SubscriptionId};
pub use self::types::{RelayUrl, Timestamp, TryIntoRelayUrl};
pub use self::util::JsonUtil;

/// Result
pub type Result<T, E = Box<dyn std::error::Error>> = std::result::Result<T, E>;
