// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

use std::time::Duration;

use nostr_relay_server::{Error, LocalRelay};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let relay = LocalRelay::builder()
        .port(7777)
        .max_filter_limit(1000)
        .max_future_drift(Duration::from_secs(60))
        .build();
    relay.run().await?;

    println!("Url: {}", relay.url().await);

    // Keep up the program
    loop {
        tokio::time::sleep(Duration::from_secs(60)).await;
    }
}
