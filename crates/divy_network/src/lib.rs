//! Divy Network: HTTP proxy layer for an action runtime.
//!
//! Installs in front of a [`divy_runtime::ActionRuntime`] and makes one HTTP
//! hop the only way out of the process.
//!
//! # Architecture
//!
//! - **Pin table**: listener declarations resolved into the ordered list of
//!   patterns this node serves.
//! - **Codec**: invocations to and from JSON envelopes with a reserved
//!   `meta$` slot.
//! - **Server**: axum listener serving discovery (`/pdt`) and inbound
//!   actions (`/act`).
//! - **Client**: reqwest forwarder installed as the runtime's remote
//!   dispatch; every non-local action is one POST upstream.
//! - **Proxy**: ordered installation and shutdown wiring.
//! - **Builtin**: liveness action served by every node.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use divy_network::{DivyProxy, ProxyConfig};
//! use divy_runtime::ActionRuntime;
//!
//! # async fn example() -> Result<(), divy_network::ProxyError> {
//! let runtime = ActionRuntime::new("my-node");
//! let config = ProxyConfig::from_env()?;
//! let proxy = DivyProxy::install(&runtime, &config).await?;
//! println!("serving /pdt and /act on {}", proxy.local_addr());
//! // ... runtime.post(..) now forwards non-local actions upstream ...
//! runtime.close().await;
//! # Ok(())
//! # }
//! ```

pub mod builtin;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod pin_table;
pub mod proxy;
pub mod server;

// ── Re-exports for convenience ──────────────────────────────────────────

pub use client::HttpForwarder;
pub use codec::{DecodeError, Envelope, META_KEY};
pub use config::ProxyConfig;
pub use error::ProxyError;
pub use pin_table::{ListenerSpec, PinModel, PinTableEntry, resolve};
pub use proxy::DivyProxy;
pub use server::ServerHandle;
