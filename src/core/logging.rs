//! Tracing setup and per-request access logging

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber: `RUST_LOG` when set, `info` otherwise
pub fn init_tracing() {
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer());

    if registry.try_init().is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Client address: `x-real-ip`, then `x-forwarded-for`, then the peer
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    ["x-real-ip", "x-forwarded-for"]
        .iter()
        .find_map(|name| {
            headers
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        })
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "None".to_string())
}

/// Log a line when a request arrives and one with status and elapsed time
/// when it leaves
pub async fn log_requests(request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(request.headers(), peer);
    let method = request.method().clone();
    let uri = request.uri().clone();

    tracing::info!("[IP: {ip}] [URL: {uri}] [Method: {method}] [Status: Processing...]");

    let start = Instant::now();
    let response = next.run(request).await;
    let elapsed = format!("{:.3}s", start.elapsed().as_secs_f64());
    let status = response.status().as_u16();

    match status {
        0..=399 => tracing::info!(
            "[IP: {ip}] [URL: {uri}] [Method: {method}] [Status: {status} (Elapsed Time: {elapsed})]"
        ),
        400..=499 => tracing::warn!(
            "[IP: {ip}] [URL: {uri}] [Method: {method}] [Status: {status} (Elapsed Time: {elapsed})]"
        ),
        _ => tracing::error!(
            "[IP: {ip}] [URL: {uri}] [Method: {method}] [Status: {status} (Elapsed Time: {elapsed})]"
        ),
    }

    response
}
