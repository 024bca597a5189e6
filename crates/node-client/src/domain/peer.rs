//! Node addresses.

use crate::domain::error::ClientError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio_tungstenite::tungstenite::http::Uri;

/// Request path served by a node's JSON-RPC interface.
pub const RPC_PATH: &str = "/rpc";

/// Parsed `ws://` / `wss://` URL of a target node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    url: String,
    host: String,
    port: u16,
    path: String,
    secure: bool,
}

impl Endpoint {
    pub fn parse(url: &str) -> Result<Self, ClientError> {
        let uri: Uri = url
            .parse()
            .map_err(|e| ClientError::Config(format!("invalid endpoint {}: {}", url, e)))?;

        let secure = match uri.scheme_str() {
            Some("ws") => false,
            Some("wss") => true,
            Some(other) => {
                return Err(ClientError::Config(format!(
                    "unsupported endpoint scheme {} in {}",
                    other, url
                )))
            }
            None => return Err(ClientError::Config(format!("endpoint {} has no scheme", url))),
        };

        let host = uri
            .host()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ClientError::Config(format!("endpoint {} has no host", url)))?
            .to_string();
        let port = uri.port_u16().unwrap_or(if secure { 443 } else { 80 });
        let path = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .filter(|p| !p.is_empty())
            .unwrap_or("/")
            .to_string();

        Ok(Self {
            url: url.to_string(),
            host,
            port,
            path,
            secure,
        })
    }

    /// The URL as given
    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// Host as written in the URL (IPv6 literals keep their brackets)
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Host suitable for name resolution and TLS server name
    pub fn connect_host(&self) -> &str {
        self.host.trim_start_matches('[').trim_end_matches(']')
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Request target, including any query string
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Value for the `Host` header: the port is omitted when it is the
    /// scheme default.
    pub fn host_header(&self) -> String {
        let default_port = if self.secure { 443 } else { 80 };
        if self.port == default_port {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// A discovered node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    /// Hostname or IP address
    pub location: String,
    pub use_ssl: bool,
    pub port: u16,
}

impl Peer {
    pub fn new(location: impl Into<String>, use_ssl: bool, port: u16) -> Self {
        Self {
            location: location.into(),
            use_ssl,
            port,
        }
    }

    /// Build from a node-finder response, which may be a bare host or a URL.
    pub fn from_location(raw: &str, use_ssl: bool, port: u16) -> Result<Self, ClientError> {
        let raw = raw.trim();
        let without_scheme = raw.split_once("://").map_or(raw, |(_, rest)| rest);
        let location = without_scheme
            .split(['/', '?'])
            .next()
            .unwrap_or_default()
            .trim();
        // host:port; the configured port wins
        let location = match location.split_once(':') {
            Some((host, port)) if !port.contains(':') => host,
            _ => location,
        };
        if location.is_empty() {
            return Err(ClientError::protocol(format!(
                "peer location {:?} has no host",
                raw
            )));
        }
        Ok(Self::new(location, use_ssl, port))
    }

    /// `ws(s)://<location>:<port>/rpc`
    pub fn endpoint(&self) -> Result<Endpoint, ClientError> {
        let scheme = if self.use_ssl { "wss" } else { "ws" };
        let host = if self.location.contains(':') && !self.location.starts_with('[') {
            format!("[{}]", self.location)
        } else {
            self.location.clone()
        };
        Endpoint::parse(&format!("{}://{}:{}{}", scheme, host, self.port, RPC_PATH))
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.location, self.port)
    }
}
