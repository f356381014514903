//! Proxy configuration: where this node listens, where it forwards to, and
//! which pins it declares.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ProxyError;
use crate::pin_table::ListenerSpec;

pub const ENV_HOST: &str = "HOST";
pub const ENV_PORT: &str = "PORT";
pub const ENV_UPSTREAM_HOST: &str = "PROXY_HTTP_HOST";
pub const ENV_UPSTREAM_PORT: &str = "PROXY_HTTP_PORT";
pub const ENV_UPSTREAM_PATH: &str = "PROXY_HTTP_PATH";
pub const ENV_UPSTREAM_TIMEOUT_MS: &str = "PROXY_HTTP_TIMEOUT_MS";
pub const ENV_LISTENERS: &str = "DIVY_LISTENERS";
pub const ENV_MAX_BODY_BYTES: &str = "DIVY_MAX_BODY_BYTES";

/// Largest `/act` body accepted by default: 16 MiB.
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

/// Configuration for one proxy node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Host the inbound HTTP listener binds to.
    pub host: String,
    /// Port the inbound HTTP listener binds to. `0` picks a free port.
    pub port: u16,
    /// Host of the single upstream endpoint.
    pub upstream_host: String,
    /// Port of the single upstream endpoint.
    pub upstream_port: u16,
    /// Request path on the upstream endpoint.
    pub upstream_path: String,
    /// Client-side timeout for one upstream round trip. None waits forever.
    #[serde(default, with = "opt_duration_ms")]
    pub upstream_timeout: Option<Duration>,
    /// Largest request body the inbound listener buffers.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Listener declarations the pin table is resolved from.
    #[serde(default)]
    pub listeners: Vec<ListenerSpec>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 40000,
            upstream_host: "localhost".into(),
            upstream_port: 10000,
            upstream_path: "/".into(),
            upstream_timeout: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            listeners: Vec::new(),
        }
    }
}

impl ProxyConfig {
    /// Read configuration from the process environment.
    ///
    /// Unset variables keep their defaults. `DIVY_LISTENERS`, when set, names
    /// a JSON file holding an array of listener declarations.
    pub fn from_env() -> Result<Self, ProxyError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading from `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ProxyError> {
        let mut config = Self::default();

        if let Some(host) = lookup(ENV_HOST) {
            config.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            config.port = parse_var(ENV_PORT, &port)?;
        }
        if let Some(host) = lookup(ENV_UPSTREAM_HOST) {
            config.upstream_host = host;
        }
        if let Some(port) = lookup(ENV_UPSTREAM_PORT) {
            config.upstream_port = parse_var(ENV_UPSTREAM_PORT, &port)?;
        }
        if let Some(path) = lookup(ENV_UPSTREAM_PATH) {
            config.upstream_path = path;
        }
        if let Some(ms) = lookup(ENV_UPSTREAM_TIMEOUT_MS) {
            config.upstream_timeout = Some(Duration::from_millis(parse_var(
                ENV_UPSTREAM_TIMEOUT_MS,
                &ms,
            )?));
        }
        if let Some(bytes) = lookup(ENV_MAX_BODY_BYTES) {
            config.max_body_bytes = parse_var(ENV_MAX_BODY_BYTES, &bytes)?;
        }
        if let Some(path) = lookup(ENV_LISTENERS) {
            config.listeners = load_listeners(Path::new(&path))?;
        }

        Ok(config)
    }

    /// Address the inbound listener binds to, when `host` is an IP literal.
    pub fn listen_addr(&self) -> Result<SocketAddr, ProxyError> {
        let ip: IpAddr = self.host.parse().map_err(|_| {
            ProxyError::Config(format!("Listen host {} is not an IP address", self.host))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Address the inbound listener binds to. Host names are resolved
    /// without blocking the runtime; the first address wins.
    pub async fn resolve_listen_addr(&self) -> Result<SocketAddr, ProxyError> {
        if let Ok(addr) = self.listen_addr() {
            return Ok(addr);
        }
        let mut addrs = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|e| {
                ProxyError::Config(format!("Cannot resolve listen host {}: {e}", self.host))
            })?;
        addrs.next().ok_or_else(|| {
            ProxyError::Config(format!("Listen host {} has no addresses", self.host))
        })
    }

    /// URL every outbound invocation is POSTed to.
    pub fn upstream_url(&self) -> String {
        let path = if self.upstream_path.starts_with('/') {
            self.upstream_path.clone()
        } else {
            format!("/{}", self.upstream_path)
        };
        format!("http://{}:{}{}", self.upstream_host, self.upstream_port, path)
    }

    /// Save the config to a JSON file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ProxyError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load config from a JSON file, or return defaults if the file is missing.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(data) => match serde_json::from_str::<ProxyConfig>(&data) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Corrupt proxy config file, using defaults: {e}");
                    }
                },
                Err(e) => {
                    tracing::warn!("Cannot read proxy config file, using defaults: {e}");
                }
            }
        }
        Self::default()
    }
}

/// Read a JSON array of listener declarations.
pub fn load_listeners(path: &Path) -> Result<Vec<ListenerSpec>, ProxyError> {
    let data = std::fs::read_to_string(path).map_err(|e| {
        ProxyError::Config(format!("Cannot read listeners file {}: {e}", path.display()))
    })?;
    serde_json::from_str(&data).map_err(|e| {
        ProxyError::Config(format!("Invalid listeners file {}: {e}", path.display()))
    })
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ProxyError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ProxyError::Config(format!("{name}={raw:?} is invalid: {e}")))
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

mod opt_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(dur: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match dur {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let ms = Option::<u64>::deserialize(d)?;
        Ok(ms.map(Duration::from_millis))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
