//! ActionRuntime: pattern-matched action dispatch.
//!
//! Handlers are registered against [`Pattern`]s. Posting a message runs the
//! most specific local handler; a message with no local handler is handed to
//! the installed [`RemoteDispatch`] strategy. That split is the only place
//! locality is decided.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::dispatch::{ActionResult, ListenStrategy, RemoteDispatch, Reply, ReplySlot};
use crate::error::{ActionError, RuntimeError};
use crate::message::{Message, Meta};
use crate::pattern::{Pattern, PatternRegistry};

/// A registered action handler.
pub type ActionHandler =
    Arc<dyn Fn(ActionContext, Message) -> BoxFuture<'static, ActionResult> + Send + Sync>;

type CloseHook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Wrap an async closure as an [`ActionHandler`].
pub fn handler<F, Fut>(f: F) -> ActionHandler
where
    F: Fn(ActionContext, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ActionResult> + Send + 'static,
{
    Arc::new(move |ctx, msg| f(ctx, msg).boxed())
}

/// Where an action will be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locality {
    /// A handler registered in this process serves the message.
    Local(Pattern),
    /// No local handler; the message must leave the process.
    RemoteRequired,
}

/// Handed to a handler for the duration of one invocation.
#[derive(Clone)]
pub struct ActionContext {
    runtime: ActionRuntime,
    meta: Meta,
}

impl ActionContext {
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn runtime(&self) -> &ActionRuntime {
        &self.runtime
    }

    /// Post a nested action. It joins this invocation's correlation tree.
    pub async fn post(&self, message: Message) -> ActionResult {
        self.runtime.dispatch(message, self.meta.child()).await.outcome
    }
}

struct Inner {
    name: String,
    actions: RwLock<PatternRegistry<ActionHandler>>,
    remote: OnceCell<Arc<dyn RemoteDispatch>>,
    listen: RwLock<Option<Arc<dyn ListenStrategy>>>,
    close_hooks: Mutex<Vec<CloseHook>>,
    closing: AtomicBool,
    closed: AtomicBool,
}

/// Cheaply cloneable handle to one action runtime.
#[derive(Clone)]
pub struct ActionRuntime {
    inner: Arc<Inner>,
}

impl ActionRuntime {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                actions: RwLock::new(PatternRegistry::new()),
                remote: OnceCell::new(),
                listen: RwLock::new(None),
                close_hooks: Mutex::new(Vec::new()),
                closing: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Register `handler` for messages matching `pattern`.
    pub fn add(&self, pattern: &str, handler: ActionHandler) -> Result<(), RuntimeError> {
        let pattern = Pattern::parse(pattern)?;
        debug!("Registering action {pattern}");
        if self.inner.actions.write().insert(pattern.clone(), handler).is_some() {
            debug!("Action {pattern} replaced an earlier handler");
        }
        Ok(())
    }

    /// Classify `message` without running anything.
    pub fn locate(&self, message: &Message) -> Locality {
        match self.inner.actions.read().find(message) {
            Some((pattern, _)) => Locality::Local(pattern.clone()),
            None => Locality::RemoteRequired,
        }
    }

    /// Post a new root invocation.
    pub async fn post(&self, message: Message) -> ActionResult {
        self.post_with_meta(message, None).await
    }

    /// Post with caller-supplied metadata, e.g. metadata that arrived over
    /// the network. `None` starts a fresh correlation tree.
    pub async fn post_with_meta(&self, message: Message, meta: Option<Meta>) -> ActionResult {
        self.post_with_reply_meta(message, meta).await.outcome
    }

    /// Like [`post_with_meta`](Self::post_with_meta), but also returns the
    /// metadata the reply came back with.
    pub async fn post_with_reply_meta(&self, message: Message, meta: Option<Meta>) -> Reply {
        let meta = match meta {
            Some(mut meta) => {
                if meta.id.is_empty() {
                    meta.id = uuid::Uuid::new_v4().to_string();
                }
                meta
            }
            None => Meta::new(),
        };
        self.dispatch(message, meta).await
    }

    async fn dispatch(&self, message: Message, mut meta: Meta) -> Reply {
        if self.is_closed() {
            let outcome = Err(ActionError::new(
                ActionError::CLOSED,
                format!("runtime {} is closed", self.inner.name),
            ));
            return Reply { outcome, meta };
        }

        let local = {
            let actions = self.inner.actions.read();
            actions
                .find(&message)
                .map(|(pattern, handler)| (pattern.to_string(), Arc::clone(handler)))
        };

        if let Some((pattern, handler)) = local {
            debug!("Local action {pattern} ({})", meta.id);
            meta.pattern = Some(pattern);
            let ctx = ActionContext {
                runtime: self.clone(),
                meta: meta.clone(),
            };
            let outcome = handler(ctx, message).await;
            return Reply { outcome, meta };
        }

        let Some(remote) = self.inner.remote.get() else {
            let outcome = Err(ActionError::new(
                ActionError::NOT_FOUND,
                "no local handler and no remote dispatch installed",
            )
            .with_detail("message", message));
            return Reply { outcome, meta };
        };

        debug!("Remote action via {} ({})", remote.name(), meta.id);
        let (slot, rx) = ReplySlot::channel(meta.clone());
        remote.send(message, meta.clone(), slot).await;
        rx.await.unwrap_or_else(|_| Reply {
            outcome: Err(ActionError::new(
                ActionError::REPLY_DROPPED,
                "remote dispatch dropped the reply",
            )),
            meta,
        })
    }

    /// Install the strategy used for non-local invocations. Exactly once.
    pub fn set_remote_dispatch(&self, remote: Arc<dyn RemoteDispatch>) -> Result<(), RuntimeError> {
        let name = remote.name().to_string();
        self.inner
            .remote
            .set(remote)
            .map_err(|_| RuntimeError::RemoteDispatchInstalled)?;
        info!("Remote dispatch for runtime {} is {name}", self.inner.name);
        Ok(())
    }

    pub fn has_remote_dispatch(&self) -> bool {
        self.inner.remote.get().is_some()
    }

    /// Take ownership of the listen capability. Fails while another layer
    /// holds it.
    pub fn claim_listen(&self, strategy: Arc<dyn ListenStrategy>) -> Result<(), RuntimeError> {
        let mut slot = self.inner.listen.write();
        if let Some(existing) = slot.as_ref() {
            return Err(RuntimeError::ListenClaimed {
                owner: existing.owner().to_string(),
                reason: "listen capability already claimed".into(),
            });
        }
        debug!("Listen capability of {} claimed by {}", self.inner.name, strategy.owner());
        *slot = Some(strategy);
        Ok(())
    }

    /// Give the listen capability back. Only its current owner can release
    /// it; returns whether anything was released.
    pub fn release_listen(&self, owner: &str) -> bool {
        let mut slot = self.inner.listen.write();
        if slot.as_ref().is_some_and(|s| s.owner() == owner) {
            *slot = None;
            debug!("Listen capability of {} released by {owner}", self.inner.name);
            true
        } else {
            false
        }
    }

    /// Start an independent network listener through the installed strategy.
    pub fn listen(&self, addr: SocketAddr) -> Result<(), RuntimeError> {
        match self.inner.listen.read().as_ref() {
            Some(strategy) => strategy.listen(addr),
            None => Err(RuntimeError::NoListenTransport),
        }
    }

    /// Register a shutdown step. Steps run most-recent-first on [`close`].
    ///
    /// [`close`]: ActionRuntime::close
    pub fn on_close<F, Fut>(&self, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner
            .close_hooks
            .lock()
            .push(Box::new(move || hook().boxed()));
    }

    /// Run shutdown steps, then stop accepting posts. Later calls are no-ops.
    pub async fn close(&self) {
        if self.inner.closing.swap(true, Ordering::SeqCst) {
            return;
        }

        let hooks = std::mem::take(&mut *self.inner.close_hooks.lock());
        for hook in hooks.into_iter().rev() {
            hook().await;
        }

        self.inner.closed.store(true, Ordering::SeqCst);
        info!("Runtime {} closed", self.inner.name);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
