//! HTTP listener: discovery (`/pdt`) and inbound actions (`/act`).
//!
//! `/act` always answers 200: whether the action succeeded lives inside the
//! reply envelope, not in the HTTP status.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use divy_runtime::{ActionError, ActionRuntime, Meta};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::codec::{self, Envelope};
use crate::error::ProxyError;
use crate::pin_table::PinTableEntry;

/// Discovery route.
pub const PDT_PATH: &str = "/pdt";
/// Inbound action route.
pub const ACT_PATH: &str = "/act";

/// Shared, read-only state behind every route.
#[derive(Clone)]
pub struct ServerState {
    pub runtime: ActionRuntime,
    pub pin_table: Arc<[PinTableEntry]>,
    /// Largest request body buffered before a handler runs.
    pub max_body_bytes: usize,
}

/// Build the axum router for the listener.
pub fn router(state: ServerState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.max_body_bytes);
    Router::new()
        .route(PDT_PATH, get(discover).post(discover))
        .route(ACT_PATH, post(act))
        .layer(body_limit)
        .with_state(state)
}

async fn discover(State(state): State<ServerState>) -> Json<Vec<PinTableEntry>> {
    Json(state.pin_table.to_vec())
}

async fn act(
    State(state): State<ServerState>,
    body: Result<Bytes, BytesRejection>,
) -> Json<Envelope> {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!("Rejected {ACT_PATH} body: {}", rejection.body_text());
            let err = ActionError::new(ActionError::BODY_REJECTED, rejection.body_text())
                .with_detail("status", rejection.status().as_u16())
                .with_detail("limit", state.max_body_bytes);
            return Json(codec::externalize_reply(Err(err), &Meta::new()));
        }
    };

    let reply = match codec::decode_request(&body) {
        Ok((message, meta)) => {
            let meta = meta.unwrap_or_else(Meta::new);
            let mut inbound = meta.clone();
            inbound.remote = true;

            let outcome = state.runtime.post_with_meta(message, Some(inbound)).await;
            if let Err(e) = &outcome {
                debug!("Inbound action {} failed: {e}", meta.id);
            }
            codec::externalize_reply(outcome, &meta)
        }
        Err(e) => {
            warn!("Undecodable {ACT_PATH} body: {e}");
            codec::externalize_reply(Err(e.into_action_error()), &Meta::new())
        }
    };
    Json(reply)
}

/// A running listener.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

impl ServerHandle {
    /// The address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for in-flight requests to drain.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        match self.task.await {
            Ok(Ok(())) => info!("HTTP listener on {} closed", self.local_addr),
            Ok(Err(e)) => error!("HTTP listener on {} failed: {e}", self.local_addr),
            Err(e) => error!("HTTP listener task on {} panicked: {e}", self.local_addr),
        }
    }
}

/// Bind `addr` and serve [`router`] on it.
///
/// Returns once the socket is bound, so connections are accepted from the
/// moment this resolves.
pub async fn start_server(addr: SocketAddr, state: ServerState) -> Result<ServerHandle, ProxyError> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!("HTTP listener bound on {local_addr}");

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
    let app = router(state);
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                debug!("HTTP listener shutting down");
            })
            .await
    });

    Ok(ServerHandle {
        local_addr,
        shutdown_tx,
        task,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
