//! Built-in actions every proxy node can serve.

use divy_runtime::{ActionHandler, ActionRuntime, RuntimeError, handler, message_from};
use serde_json::json;

/// Pattern of the liveness action.
pub const PING_PATTERN: &str = "role:divy,cmd:ping";

/// Create a handler that answers pings with this node's name.
pub fn ping_handler(node: impl Into<String>) -> ActionHandler {
    let node = node.into();
    handler(move |ctx, _msg| {
        let node = node.clone();
        async move {
            Ok(message_from(json!({
                "pong": true,
                "node": node,
                "remote": ctx.meta().remote,
            })))
        }
    })
}

/// Register the built-in actions on `runtime`.
pub fn register_builtins(runtime: &ActionRuntime) -> Result<(), RuntimeError> {
    runtime.add(PING_PATTERN, ping_handler(runtime.name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ping_answers_with_node_name() {
        let runtime = ActionRuntime::new("node-7");
        register_builtins(&runtime).unwrap();

        let out = runtime
            .post(message_from(json!({"role": "divy", "cmd": "ping"})))
            .await
            .unwrap();
        assert_eq!(out["pong"], json!(true));
        assert_eq!(out["node"], json!("node-7"));
        assert_eq!(out["remote"], json!(false));
    }
}
