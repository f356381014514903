mod logging;

use anyhow::Result;
use tracing::{error, info};

use divy_network::builtin::register_builtins;
use divy_network::{DivyProxy, ProxyConfig};
use divy_runtime::ActionRuntime;

/// Environment variable naming this node in logs and ping replies.
const ENV_NODE_NAME: &str = "DIVY_NODE_NAME";

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = logging::init_logging()?;

    let config = ProxyConfig::from_env().inspect_err(|e| error!("Bad configuration: {e}"))?;
    let name = std::env::var(ENV_NODE_NAME).unwrap_or_else(|_| "divy".to_string());

    let runtime = ActionRuntime::new(name);
    register_builtins(&runtime)?;

    let proxy = DivyProxy::install(&runtime, &config).await?;
    info!(
        "Node {} ready: /pdt and /act on {}, forwarding to {}",
        runtime.name(),
        proxy.local_addr(),
        proxy.upstream_url()
    );

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received, shutting down");
    runtime.close().await;
    Ok(())
}
