//! Per-IP fixed-window rate limiting.

use std::net::SocketAddr;

use axum::http::HeaderMap;

use crate::error::ApiError;
use crate::store::{keys, KvStore};

/// Count this request against `ip`'s window. The window starts on the first
/// hit (the expiry is set only when the counter comes back 1) and resets when
/// the key lapses.
pub fn check(
    store: &dyn KvStore,
    ip: &str,
    limit: i64,
    window_secs: u64,
) -> Result<(), ApiError> {
    let key = keys::rate(ip);
    let count = store.incr(&key)?;
    if count == 1 {
        store.expire(&key, window_secs)?;
    }
    if count > limit {
        tracing::debug!(%ip, count, limit, "rate limited");
        return Err(ApiError::RateLimited);
    }
    Ok(())
}

/// Client address for limiting: first hop of `X-Forwarded-For` when present
/// (we sit behind a single trusted proxy), otherwise the peer address.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| peer.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    #[test]
    fn allows_up_to_limit_then_rejects() {
        let store = MemoryStore::new();
        for _ in 0..3 {
            assert!(check(&store, "10.0.0.1", 3, 60).is_ok());
        }
        assert!(matches!(
            check(&store, "10.0.0.1", 3, 60),
            Err(ApiError::RateLimited)
        ));
    }

    #[test]
    fn limits_are_per_ip() {
        let store = MemoryStore::new();
        assert!(check(&store, "10.0.0.1", 1, 60).is_ok());
        assert!(check(&store, "10.0.0.2", 1, 60).is_ok());
        assert!(check(&store, "10.0.0.1", 1, 60).is_err());
    }

    #[test]
    fn forwarded_header_wins() {
        let peer: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers, peer), "203.0.113.7");
    }

    #[test]
    fn falls_back_to_peer_address() {
        let peer: SocketAddr = "192.0.2.4:1234".parse().unwrap();
        assert_eq!(client_ip(&HeaderMap::new(), peer), "192.0.2.4");
    }
}
