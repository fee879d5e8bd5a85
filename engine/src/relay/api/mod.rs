// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

mod fetch_events;
mod send_event;
mod stream_events;
mod subscribe;
mod sync;
mod try_connect;

pub use self::fetch_events::*;
pub(crate) use self::fetch_events::events_collection;
pub use self::send_event::*;
pub use self::stream_events::*;
pub use self::subscribe::*;
pub use self::sync::*;
pub use self::try_connect::*;
