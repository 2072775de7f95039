//! SecretHub control-plane node binary.

use anyhow::Context;
use secrethub_core::CoreConfig;
use secrethub_server::{Node, router};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = CoreConfig::from_env();
    let bind = config.server.bind.clone();

    let node = Node::build(config).await.context("failed to build node")?;
    let tasks = node.start().await.context("failed to start node")?;

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(%bind, "listening");

    let app = router(node.app_state());
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("server error")?;

    node.shutdown().await;
    for task in tasks {
        task.abort();
    }
    Ok(())
}
