//! Pluggable strategies the runtime delegates to: remote dispatch and listen.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{ActionError, RuntimeError};
use crate::message::{Message, Meta};

/// Outcome of one action invocation.
pub type ActionResult = Result<Message, ActionError>;

/// An invocation's outcome together with the metadata it came back with.
///
/// For a local action `meta` is the invocation's own metadata. For a
/// remote one it is whatever the remote side answered with, or the
/// invocation's metadata when the strategy had none to report.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub outcome: ActionResult,
    pub meta: Meta,
}

/// The pending reply of an invocation handed to a [`RemoteDispatch`].
///
/// Consumed by [`ReplySlot::send`], so a reply can be delivered at most once.
/// Dropping the slot without replying fails the waiting caller with
/// [`ActionError::REPLY_DROPPED`] instead of leaving it hanging.
#[derive(Debug)]
pub struct ReplySlot {
    meta: Meta,
    tx: oneshot::Sender<Reply>,
}

impl ReplySlot {
    /// Create a slot answering the invocation described by `meta`, and the
    /// receiver the caller awaits.
    pub fn channel(meta: Meta) -> (Self, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        (Self { meta, tx }, rx)
    }

    /// Id of the invocation this slot answers.
    pub fn id(&self) -> &str {
        &self.meta.id
    }

    /// Metadata of the invocation this slot answers.
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// Reply with the invocation's own metadata.
    pub fn send(self, outcome: ActionResult) {
        let meta = self.meta.clone();
        self.send_with_meta(outcome, meta);
    }

    /// Reply with metadata reported by the remote side.
    pub fn send_with_meta(self, outcome: ActionResult, meta: Meta) {
        if self.tx.send(Reply { outcome, meta }).is_err() {
            debug!("Caller of {} went away before the reply arrived", self.meta.id);
        }
    }

    pub fn ok(self, out: Message) {
        self.send(Ok(out));
    }

    pub fn fail(self, err: ActionError) {
        self.send(Err(err));
    }
}

/// Strategy for invocations the runtime cannot satisfy in-process.
///
/// The runtime performs the local/remote classification; an implementation
/// only ever sees invocations that have no local handler.
#[async_trait]
pub trait RemoteDispatch: Send + Sync {
    /// Human-readable name, for logs.
    fn name(&self) -> &str;

    /// Deliver `message` and answer through `reply`.
    async fn send(&self, message: Message, meta: Meta, reply: ReplySlot);
}

/// Strategy behind [`ActionRuntime::listen`](crate::ActionRuntime::listen).
pub trait ListenStrategy: Send + Sync {
    /// Name of the layer that owns listening.
    fn owner(&self) -> &str;

    fn listen(&self, addr: SocketAddr) -> Result<(), RuntimeError>;
}
