//! Client configuration from environment variables.

use std::time::Duration;

use sightline_shared::{DEFAULT_NAMESPACE, ENGINE_IO_VERSION, SOCKET_IO_PATH};
use url::Url;

use crate::error::ClientResult;

/// Address of the vision backend's socket server.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:5001";

pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// HTTP(S) base address of the server
    pub server_url: String,
    /// Socket.IO namespace to join
    pub namespace: String,
    /// Upper bound on websocket handshake plus namespace connect
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
        }
    }
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }

    /// Parse configuration from environment variables.
    ///
    /// Environment variables:
    /// - `SIGHTLINE_SERVER_URL`: server base address (default: "http://localhost:5001")
    /// - `SIGHTLINE_NAMESPACE`: Socket.IO namespace (default: "/")
    /// - `SIGHTLINE_CONNECT_TIMEOUT_MS`: connect timeout in milliseconds (default: 5000)
    pub fn from_env() -> Self {
        let server_url = std::env::var("SIGHTLINE_SERVER_URL")
            .unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());

        let namespace = std::env::var("SIGHTLINE_NAMESPACE")
            .ok()
            .map(|ns| normalize_namespace(&ns))
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        let connect_timeout = std::env::var("SIGHTLINE_CONNECT_TIMEOUT_MS")
            .ok()
            .and_then(|ms| ms.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS));

        Self {
            server_url,
            namespace,
            connect_timeout,
        }
    }

    /// Websocket endpoint for the Engine.IO session, e.g.
    /// `ws://localhost:5001/socket.io/?EIO=4&transport=websocket`.
    pub fn websocket_url(&self) -> ClientResult<Url> {
        let mut url = Url::parse(&self.server_url)?;

        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        // http/https <-> ws/wss are all "special" schemes, so this cannot fail.
        let _ = url.set_scheme(scheme);

        url.set_path(SOCKET_IO_PATH);
        url.set_query(None);
        url.query_pairs_mut()
            .append_pair("EIO", &ENGINE_IO_VERSION.to_string())
            .append_pair("transport", "websocket");
        url.set_fragment(None);

        Ok(url)
    }
}

/// Namespaces always start with a slash and carry no trailing one.
fn normalize_namespace(namespace: &str) -> String {
    let trimmed = namespace.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        DEFAULT_NAMESPACE.to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.server_url, "http://localhost:5001");
        assert_eq!(config.namespace, "/");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_websocket_url() {
        let url = ClientConfig::default().websocket_url().unwrap();
        assert_eq!(
            url.as_str(),
            "ws://localhost:5001/socket.io/?EIO=4&transport=websocket"
        );

        let url = ClientConfig::new("https://vision.example.com/ignored?x=1")
            .websocket_url()
            .unwrap();
        assert_eq!(
            url.as_str(),
            "wss://vision.example.com/socket.io/?EIO=4&transport=websocket"
        );

        assert!(ClientConfig::new("not a url").websocket_url().is_err());
    }

    #[test]
    fn test_normalize_namespace() {
        assert_eq!(normalize_namespace(""), "/");
        assert_eq!(normalize_namespace("/"), "/");
        assert_eq!(normalize_namespace("vision"), "/vision");
        assert_eq!(normalize_namespace("/vision/"), "/vision");
    }
}
