// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

use std::time::Duration;

use nostr_engine::prelude::*;
use nostr_relay_server::MockRelay;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let relay = MockRelay::run().await?;
    let url = relay.url().await;

    let client = Client::default();
    client.add_relay(url).await?;
    client.connect().await;
    client.wait_for_connection(Duration::from_secs(5)).await;

    let keys = Keys::generate();
    let event = EventBuilder::text_note("Hello from the engine").sign_with_keys(&keys)?;
    let output = client.send_event(&event).await?;
    println!("Sent {} to {} relays", output.val, output.success.len());

    let events = client
        .fetch_events(Filter::new().author(keys.public_key()), Duration::from_secs(5))
        .await?;
    for event in events.into_iter() {
        println!("{}", event.as_json());
    }

    client.shutdown().await;

    Ok(())
}
