// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

use std::net::{IpAddr, SocketAddr};

use tokio::net::TcpListener;

use crate::error::Error;

/// Bind the requested port, or the first free one from 8000 upwards
pub(super) async fn bind(ip: IpAddr, port: Option<u16>) -> Result<TcpListener, Error> {
    if let Some(port) = port {
        return Ok(TcpListener::bind(SocketAddr::new(ip, port)).await?);
    }

    for port in 8000..u16::MAX {
        if let Ok(listener) = TcpListener::bind(SocketAddr::new(ip, port)).await {
            return Ok(listener);
        }
    }

    Err(Error::NoPortAvailable)
}
