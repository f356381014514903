//! Outbound forwarding: the runtime's remote dispatch over HTTP.
//!
//! Every invocation the runtime cannot serve locally becomes exactly one POST
//! to the configured upstream. There is no retry; a failed round trip is the
//! invocation's failure.

use async_trait::async_trait;
use divy_runtime::{ActionError, Message, Meta, RemoteDispatch, Reply, ReplySlot};
use tracing::{debug, warn};

use crate::codec::{self, DecodeError, Envelope};
use crate::config::ProxyConfig;
use crate::error::ProxyError;

/// Forwards invocations to the single upstream endpoint.
pub struct HttpForwarder {
    client: reqwest::Client,
    url: String,
}

impl HttpForwarder {
    /// Create a forwarder for the upstream named in `config`. The URL is
    /// resolved here, once.
    pub fn new(config: &ProxyConfig) -> Result<Self, ProxyError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.upstream_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ProxyError::Http(format!("Cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: config.upstream_url(),
        })
    }

    /// The upstream URL invocations are POSTed to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// One round trip: externalize, POST, decode.
    ///
    /// The reply carries the metadata the upstream answered with. Failures
    /// before a reply was decoded carry the invocation's own metadata.
    pub async fn forward(&self, message: Message, meta: &Meta) -> Reply {
        match self.round_trip(message, meta).await {
            Ok(reply) => reply,
            Err(e) => Reply {
                outcome: Err(e),
                meta: meta.clone(),
            },
        }
    }

    async fn round_trip(&self, message: Message, meta: &Meta) -> Result<Reply, ActionError> {
        let envelope = codec::externalize_request(message, meta);

        let response = self
            .client
            .post(&self.url)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            return Err(ActionError::new(
                ActionError::UPSTREAM_STATUS,
                format!("upstream {} answered {status}", self.url),
            )
            .with_detail("status", status.as_u16())
            .with_detail("raw", String::from_utf8_lossy(&body).into_owned()));
        }

        let envelope = Envelope::from_slice(&body).map_err(DecodeError::into_action_error)?;
        codec::internalize_reply(envelope, &meta.id).map_err(DecodeError::into_action_error)
    }

    fn transport_error(&self, e: reqwest::Error) -> ActionError {
        ActionError::new(
            ActionError::TRANSPORT,
            format!("request to {} failed: {e}", self.url),
        )
        .with_detail("timeout", e.is_timeout())
        .with_detail("connect", e.is_connect())
    }
}

#[async_trait]
impl RemoteDispatch for HttpForwarder {
    fn name(&self) -> &str {
        "divy-http"
    }

    async fn send(&self, message: Message, meta: Meta, reply: ReplySlot) {
        debug!("Forwarding {} to {}", meta.id, self.url);
        let Reply { outcome, meta } = self.forward(message, &meta).await;
        if let Err(e) = &outcome {
            warn!("Forwarded action {} failed: {e}", meta.id);
        }
        reply.send_with_meta(outcome, meta);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::Bytes;
    use axum::http::StatusCode;
    use axum::routing::post;
    use divy_runtime::message_from;
    use serde_json::json;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::net::TcpListener;

    /// Serve `app` on a free port and return its address.
    async fn spawn_upstream(app: Router) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        addr
    }

    fn forwarder_for(addr: SocketAddr) -> HttpForwarder {
        let config = ProxyConfig {
            upstream_host: addr.ip().to_string(),
            upstream_port: addr.port(),
            ..Default::default()
        };
        HttpForwarder::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_forward_posts_envelope_and_decodes_reply() {
        let app = Router::new().route(
            "/",
            post(|body: Bytes| async move {
                // Echo the request back as a successful reply.
                body
            }),
        );
        let forwarder = forwarder_for(spawn_upstream(app).await);

        let meta = Meta::new();
        let out = forwarder
            .forward(message_from(json!({"c": "d", "n": 1})), &meta)
            .await
            .outcome
            .unwrap();
        assert_eq!(out, message_from(json!({"c": "d", "n": 1})));
    }

    #[tokio::test]
    async fn test_reply_without_meta_is_accepted() {
        let app = Router::new().route("/", post(|| async { r#"{"ok":true}"# }));
        let forwarder = forwarder_for(spawn_upstream(app).await);

        let meta = Meta::new();
        let reply = forwarder.forward(message_from(json!({"c": "d"})), &meta).await;
        assert_eq!(reply.outcome, Ok(message_from(json!({"ok": true}))));
        assert_eq!(reply.meta.id, meta.id);
        assert!(reply.meta.remote);
    }

    #[tokio::test]
    async fn test_remote_error_comes_back_as_error() {
        let app = Router::new().route(
            "/",
            post(|| async {
                r#"{"code":"bad_input","message":"nope","meta$":{"id":"x","error":true}}"#
            }),
        );
        let forwarder = forwarder_for(spawn_upstream(app).await);

        let err = forwarder
            .forward(message_from(json!({"c": "d"})), &Meta::new())
            .await
            .outcome
            .unwrap_err();
        assert_eq!(err.code, "bad_input");
        assert_eq!(err.message, "nope");
    }

    #[tokio::test]
    async fn test_malformed_reply_is_decode_error() {
        let app = Router::new().route("/", post(|| async { "<html>oops</html>" }));
        let forwarder = forwarder_for(spawn_upstream(app).await);

        let err = forwarder
            .forward(message_from(json!({"c": "d"})), &Meta::new())
            .await
            .outcome
            .unwrap_err();
        assert_eq!(err.code, ActionError::DECODE);
        assert_eq!(err.detail("raw"), Some(&json!("<html>oops</html>")));
    }

    #[tokio::test]
    async fn test_non_success_status_is_transport_failure() {
        let app = Router::new().route(
            "/",
            post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        );
        let forwarder = forwarder_for(spawn_upstream(app).await);

        let err = forwarder
            .forward(message_from(json!({"c": "d"})), &Meta::new())
            .await
            .outcome
            .unwrap_err();
        assert_eq!(err.code, ActionError::UPSTREAM_STATUS);
        assert_eq!(err.detail("status"), Some(&json!(502)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let forwarder = forwarder_for(addr);
        let meta = Meta::with_id("inv-1");
        let (slot, rx) = ReplySlot::channel(meta.clone());
        forwarder
            .send(message_from(json!({"c": "d"})), meta, slot)
            .await;

        let reply = rx.await.unwrap();
        let err = reply.outcome.unwrap_err();
        assert_eq!(err.code, ActionError::TRANSPORT);
        assert_eq!(err.detail("connect"), Some(&json!(true)));
        assert_eq!(reply.meta.id, "inv-1");
        assert!(!reply.meta.remote);
    }

    #[tokio::test]
    async fn test_timeout_is_transport_error() {
        let app = Router::new().route(
            "/",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "{}"
            }),
        );
        let addr = spawn_upstream(app).await;
        let config = ProxyConfig {
            upstream_host: addr.ip().to_string(),
            upstream_port: addr.port(),
            upstream_timeout: Some(Duration::from_millis(100)),
            ..Default::default()
        };
        let forwarder = HttpForwarder::new(&config).unwrap();

        let err = forwarder
            .forward(message_from(json!({"c": "d"})), &Meta::new())
            .await
            .outcome
            .unwrap_err();
        assert_eq!(err.code, ActionError::TRANSPORT);
        assert_eq!(err.detail("timeout"), Some(&json!(true)));
    }
}
