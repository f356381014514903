//! DivyProxy: installs the proxy layer into an action runtime.
//!
//! Installation order is fixed:
//! 1. bind the HTTP listener (`/pdt`, `/act`);
//! 2. once it is bound, claim the runtime's listen capability, so nothing
//!    else can listen;
//! 3. install [`HttpForwarder`] as the runtime's remote dispatch;
//! 4. register a close hook that drains the listener before the runtime's
//!    own shutdown continues.
//!
//! A failure at any step shuts down what was started, so a failed install
//! leaves the runtime as it found it and can be retried.

use std::net::SocketAddr;
use std::sync::Arc;

use divy_runtime::{ActionRuntime, ListenStrategy, RuntimeError};
use tracing::info;

use crate::client::HttpForwarder;
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::pin_table::{PinTableEntry, resolve};
use crate::server::{ServerState, start_server};

/// Name the proxy registers under as owner of the listen capability.
pub const OWNER: &str = "divy";

/// Rejects every direct listen request; the proxy's listener is the only one.
struct ExclusiveListen;

impl ListenStrategy for ExclusiveListen {
    fn owner(&self) -> &str {
        OWNER
    }

    fn listen(&self, addr: SocketAddr) -> Result<(), RuntimeError> {
        Err(RuntimeError::ListenClaimed {
            owner: OWNER.into(),
            reason: format!("divy does not support calling listen directly (requested {addr})"),
        })
    }
}

/// An installed proxy layer.
#[derive(Debug, Clone)]
pub struct DivyProxy {
    local_addr: SocketAddr,
    upstream_url: String,
    pin_table: Arc<[PinTableEntry]>,
}

impl DivyProxy {
    /// Install the proxy into `runtime`.
    ///
    /// Fails with a configuration error when the runtime already has a
    /// remote dispatch strategy or a listen owner.
    pub async fn install(runtime: &ActionRuntime, config: &ProxyConfig) -> Result<Self, ProxyError> {
        if runtime.has_remote_dispatch() {
            return Err(ProxyError::Config(format!(
                "runtime {} already has a remote dispatch strategy",
                runtime.name()
            )));
        }
        let addr = config.resolve_listen_addr().await?;
        let forwarder = HttpForwarder::new(config)?;
        let upstream_url = forwarder.url().to_string();
        let pin_table: Arc<[PinTableEntry]> = resolve(&config.listeners).into();

        let server = start_server(
            addr,
            ServerState {
                runtime: runtime.clone(),
                pin_table: Arc::clone(&pin_table),
                max_body_bytes: config.max_body_bytes,
            },
        )
        .await?;
        let local_addr = server.local_addr();

        if let Err(e) = runtime.claim_listen(Arc::new(ExclusiveListen)) {
            server.shutdown().await;
            return Err(e.into());
        }

        if let Err(e) = runtime.set_remote_dispatch(Arc::new(forwarder)) {
            runtime.release_listen(OWNER);
            server.shutdown().await;
            return Err(e.into());
        }

        runtime.on_close(move || async move {
            server.shutdown().await;
        });

        info!(
            "Divy installed on runtime {} (listening on {local_addr}, forwarding to {upstream_url}, {} pins)",
            runtime.name(),
            pin_table.len()
        );

        Ok(Self {
            local_addr,
            upstream_url,
            pin_table,
        })
    }

    /// The bound listener address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn upstream_url(&self) -> &str {
        &self.upstream_url
    }

    /// The pin table served on `/pdt`.
    pub fn pin_table(&self) -> &[PinTableEntry] {
        &self.pin_table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> ProxyConfig {
        ProxyConfig {
            port: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_install_twice_is_config_error() {
        let runtime = ActionRuntime::new("t");
        DivyProxy::install(&runtime, &local_config()).await.unwrap();

        let err = DivyProxy::install(&runtime, &local_config()).await.unwrap_err();
        assert!(matches!(err, ProxyError::Config(_)));
        runtime.close().await;
    }

    #[tokio::test]
    async fn test_install_claims_listen() {
        let runtime = ActionRuntime::new("t");
        let proxy = DivyProxy::install(&runtime, &local_config()).await.unwrap();
        assert!(runtime.has_remote_dispatch());
        assert_ne!(proxy.local_addr().port(), 0);

        match runtime.listen("127.0.0.1:9000".parse().unwrap()) {
            Err(RuntimeError::ListenClaimed { owner, reason }) => {
                assert_eq!(owner, OWNER);
                assert!(reason.contains("listen directly"));
            }
            other => panic!("expected ListenClaimed, got {other:?}"),
        }
        runtime.close().await;
    }

    #[tokio::test]
    async fn test_bind_failure_leaves_runtime_untouched() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ProxyConfig {
            port: taken.local_addr().unwrap().port(),
            ..Default::default()
        };

        let runtime = ActionRuntime::new("t");
        let err = DivyProxy::install(&runtime, &config).await.unwrap_err();
        assert!(matches!(err, ProxyError::Io(_)));
        assert!(!runtime.has_remote_dispatch());
        assert!(matches!(
            runtime.listen("127.0.0.1:9000".parse().unwrap()),
            Err(RuntimeError::NoListenTransport)
        ));

        let proxy = DivyProxy::install(&runtime, &local_config()).await.unwrap();
        assert!(runtime.has_remote_dispatch());
        assert_ne!(proxy.local_addr().port(), taken.local_addr().unwrap().port());
        runtime.close().await;
    }

    #[tokio::test]
    async fn test_claimed_listen_rejects_install_and_frees_the_port() {
        struct OtherLayer;
        impl ListenStrategy for OtherLayer {
            fn owner(&self) -> &str {
                "other"
            }
            fn listen(&self, _addr: SocketAddr) -> Result<(), RuntimeError> {
                Ok(())
            }
        }

        let free = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = free.local_addr().unwrap().port();
        drop(free);

        let runtime = ActionRuntime::new("t");
        runtime.claim_listen(Arc::new(OtherLayer)).unwrap();
        let config = ProxyConfig {
            port,
            ..Default::default()
        };
        let err = DivyProxy::install(&runtime, &config).await.unwrap_err();
        assert!(matches!(
            err,
            ProxyError::Runtime(RuntimeError::ListenClaimed { .. })
        ));
        assert!(!runtime.has_remote_dispatch());
        assert!(tokio::net::TcpListener::bind(("127.0.0.1", port)).await.is_ok());
    }
}
