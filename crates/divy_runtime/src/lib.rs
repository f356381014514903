//! Divy Runtime: pattern-matched action dispatch.
//!
//! Callers post JSON messages; handlers are registered against `key:value`
//! patterns. The runtime decides whether a message is served in-process or
//! must leave it, and delegates the latter to a pluggable
//! [`RemoteDispatch`] strategy.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use divy_runtime::{ActionRuntime, handler, message_from};
//! use serde_json::{Value, json};
//!
//! # async fn example() {
//! let runtime = ActionRuntime::new("my-node");
//! runtime
//!     .add("role:math,cmd:sum", handler(|_ctx, msg| async move {
//!         let left = msg.get("left").and_then(Value::as_i64).unwrap_or(0);
//!         let right = msg.get("right").and_then(Value::as_i64).unwrap_or(0);
//!         Ok(message_from(json!({"answer": left + right})))
//!     }))
//!     .unwrap();
//!
//! let out = runtime
//!     .post(message_from(json!({"role": "math", "cmd": "sum", "left": 1, "right": 2})))
//!     .await
//!     .unwrap();
//! assert_eq!(out["answer"], 3);
//! # }
//! ```

pub mod dispatch;
pub mod error;
pub mod message;
pub mod pattern;
pub mod runtime;

pub use dispatch::{ActionResult, ListenStrategy, RemoteDispatch, Reply, ReplySlot};
pub use error::{ActionError, RuntimeError};
pub use message::{Message, Meta, message_from};
pub use pattern::{Pattern, PatternRegistry};
pub use runtime::{ActionContext, ActionHandler, ActionRuntime, Locality, handler};
