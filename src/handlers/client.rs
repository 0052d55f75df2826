use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use std::convert::Infallible;
use std::net::SocketAddr;

pub const DEVICE_HEADER: &str = "x-device-id";

// Where a request came from, as far as the duplicate guard cares.
// Forwarded headers are kept apart from the socket peer because any client
// can set them; `ip` decides which one counts.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub forwarded_ip: Option<String>,
    pub peer_ip: Option<String>,
    pub device_id: Option<String>,
}

impl ClientMeta {
    /// Client address for the guard. Forwarded headers only count when the
    /// relay sits behind a proxy that overwrites them.
    pub fn ip(&self, trust_forwarded: bool) -> Option<&str> {
        if trust_forwarded {
            self.forwarded_ip.as_deref().or(self.peer_ip.as_deref())
        } else {
            self.peer_ip.as_deref()
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

impl<S> FromRequestParts<S> for ClientMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // first hop is the client as the proxy saw it
        let forwarded_ip = header(&parts.headers, "x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or_else(|| header(&parts.headers, "x-real-ip"))
            .map(str::to_string);

        let peer_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Ok(Self {
            forwarded_ip,
            peer_ip,
            device_id: header(&parts.headers, DEVICE_HEADER).map(str::to_string),
        })
    }
}
