// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Prelude

#![allow(unknown_lints)]
#![allow(ambiguous_glob_reexports)]
#![doc(hidden)]

pub use async_wsocket::ConnectionMode;
pub use futures::StreamExt;
pub use nostr_core::prelude::*;
pub use nostr_storage::prelude::*;
pub use nostr_storage_memory::prelude::*;

pub use crate::client::{self, *};
pub use crate::policy::*;
pub use crate::pool::{self, *};
pub use crate::relay::{self, *};
pub use crate::transport::error::*;
pub use crate::transport::websocket::*;
pub use crate::*;
