// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agora relay server binary.
//!
//! Stateless: peers, buffers, dedup, and revocations live in memory.
//! `AGORA_RELAY_JWT_SECRET` is required; `AGORA_JWT_EXPIRY_SECONDS` and
//! `AGORA_RELAY_PORT` are optional.

use anima_core::SystemClock;
use anima_relay::{router, RelayConfig, RelayState};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("anima-relay {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("anima-relay {}", env!("CARGO_PKG_VERSION"));
                println!("Agora relay - stateless envelope router between peers");
                println!();
                println!("USAGE:");
                println!("    anima-relay");
                println!();
                println!("ENVIRONMENT:");
                println!("    AGORA_RELAY_JWT_SECRET      HMAC secret for REST tokens (required)");
                println!("    AGORA_JWT_EXPIRY_SECONDS    Token lifetime (default: 3600)");
                println!("    AGORA_RELAY_PORT            Listen port (default: 9100)");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: anima-relay [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let Ok(secret) = std::env::var("AGORA_RELAY_JWT_SECRET") else {
        eprintln!("error: AGORA_RELAY_JWT_SECRET must be set");
        std::process::exit(1);
    };

    let mut config = RelayConfig::new(secret);
    if let Some(expiry) = env_u64("AGORA_JWT_EXPIRY_SECONDS") {
        config.jwt_expiry_secs = expiry;
    }
    let port = env_u64("AGORA_RELAY_PORT").unwrap_or(9_100) as u16;

    let state = Arc::new(RelayState::new(SystemClock, config));
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "relay listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
