use std::net::IpAddr;

use axum::http::HeaderMap;
use ipnet::IpNet;

/// Identifier used when neither a forwarded nor a peer address is known.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Resolves the identifier a request's quota is tracked against.
///
/// Prefers the first `x-forwarded-for` entry, then the peer address, then
/// [`UNKNOWN_CLIENT`]. With `trusted_proxies` configured, the forwarded header
/// only counts when the peer is one of those proxies.
pub fn resolve_client_identifier(
    headers: &HeaderMap,
    peer_ip: Option<IpAddr>,
    trusted_proxies: &[IpNet],
) -> String {
    let forwarded_is_trusted = trusted_proxies.is_empty()
        || peer_ip.is_some_and(|ip| trusted_proxies.iter().any(|network| network.contains(&ip)));

    if forwarded_is_trusted && let Some(forwarded) = forwarded_for(headers) {
        return forwarded;
    }

    peer_ip
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_owned())
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}
