use std::net::SocketAddr;
use std::time::Duration;

use hyper::Uri;

use crate::decoding::DecodeOptions;
use crate::error::ConfigError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub timeout: Duration,
    pub user_agent: String,
    pub decode: DecodeOptions,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> ClientConfig {
        ClientConfig {
            host: host.into(),
            port,
            path: "/".to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: concat!("xmlrpc-kit/", env!("CARGO_PKG_VERSION")).to_string(),
            decode: DecodeOptions::default(),
        }
    }

    /// Reads host, port and path from an `http://` URL.
    pub fn from_url(url: &str) -> Result<ClientConfig, ConfigError> {
        let uri: Uri = url.parse().map_err(|_| ConfigError::InvalidUrl(url.to_string()))?;
        match uri.scheme_str() {
            Some("http") => {}
            Some(other) => return Err(ConfigError::UnsupportedScheme(other.to_string())),
            None => return Err(ConfigError::InvalidUrl(url.to_string())),
        }
        let host = uri
            .host()
            .ok_or_else(|| ConfigError::InvalidUrl(url.to_string()))?;
        let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");

        Ok(ClientConfig::new(host, uri.port_u16().unwrap_or(80)).path(path))
    }

    pub fn path(mut self, path: impl Into<String>) -> ClientConfig {
        let path = path.into();
        self.path = if path.starts_with('/') { path } else { format!("/{}", path) };
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> ClientConfig {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> ClientConfig {
        self.user_agent = user_agent.into();
        self
    }

    pub fn decode_options(mut self, decode: DecodeOptions) -> ClientConfig {
        self.decode = decode;
        self
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.path)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub path: String,
    pub max_body_bytes: usize,
}

impl ServerConfig {
    pub fn new(bind: SocketAddr) -> ServerConfig {
        ServerConfig {
            bind,
            path: "/".to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> ServerConfig {
        let path = path.into();
        self.path = if path.starts_with('/') { path } else { format!("/{}", path) };
        self
    }

    pub fn max_body_bytes(mut self, limit: usize) -> ServerConfig {
        self.max_body_bytes = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_url() {
        let config = ClientConfig::from_url("http://rpc.example.net:8080/xmlrpc/").unwrap();
        assert_eq!("rpc.example.net", config.host);
        assert_eq!(8080, config.port);
        assert_eq!("/xmlrpc/", config.path);
        assert_eq!("http://rpc.example.net:8080/xmlrpc/", config.url());

        let config = ClientConfig::from_url("http://localhost").unwrap();
        assert_eq!(80, config.port);
        assert_eq!("/", config.path);
    }

    #[test]
    fn test_from_url_rejects() {
        assert_eq!(
            ConfigError::UnsupportedScheme("https".to_string()),
            ClientConfig::from_url("https://rpc.example.net/RPC2").unwrap_err()
        );
        assert!(matches!(
            ClientConfig::from_url("not a url"),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_path_normalized() {
        assert_eq!("/rpc", ClientConfig::new("h", 1).path("rpc").path);
        assert_eq!("/rpc", ServerConfig::new(([127, 0, 0, 1], 0).into()).path("rpc").path);
    }
}
