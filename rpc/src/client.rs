//! Who is calling: session cookie and client address.

use std::net::SocketAddr;

use axum::http::{header, HeaderMap, HeaderValue};
use presence_types::{SessionId, SourceAddress};

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "presence_session";

#[derive(Clone, Debug)]
pub struct ClientContext {
    pub session: Option<SessionId>,
    pub source: SourceAddress,
}

impl ClientContext {
    /// Session from the cookie; source from `x-forwarded-for` (first hop),
    /// then `x-real-ip`, then the peer address.
    pub fn from_request(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        Self {
            session: session_from_cookies(headers),
            source: source_address(headers, peer),
        }
    }
}

pub fn session_from_cookies(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
        .map(SessionId::new)
}

pub fn source_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> SourceAddress {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
    };
    header_value("x-forwarded-for")
        .or_else(|| header_value("x-real-ip"))
        .or_else(|| peer.map(|p| p.ip().to_string()))
        .map(SourceAddress::new)
        .unwrap_or_else(SourceAddress::unknown)
}

pub fn session_cookie(session: &SessionId) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE}={session}; Path=/; HttpOnly; SameSite=Strict"
    ))
    .ok()
}
