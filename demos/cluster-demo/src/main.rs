//! Runs a few election nodes on one in-memory broadcast medium, kills the
//! primary and shows the survivors fail over.
//!
//! `SYNCER_LIVE_INTERVAL_MS` and `SYNCER_DEBUG` tune the nodes; `RUST_LOG`
//! tunes the output.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::future::join_all;
use syncer_core::{ElectionNode, NodeOptions};
use syncer_transport::{MockTransport, TransportRegistry};
use tracing_subscriber::EnvFilter;

const GROUP: &str = "demo";
const NODES: u64 = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let options = NodeOptions::from_env();
    let registry = Arc::new(TransportRegistry::new());

    let mut nodes = Vec::new();
    for endpoint in 1..=NODES {
        let transport = MockTransport::create(endpoint, registry.clone())
            .with_context(|| format!("failed to register endpoint {endpoint}"))?;
        let mut node = ElectionNode::create(GROUP, Some(options.clone()), transport);
        let id = node
            .init(
                move |id| tracing::info!(endpoint, %id, "I am the primary now"),
                move |primary| tracing::info!(endpoint, %primary, "Stepped down to replica"),
            )
            .await?;
        tracing::info!(endpoint, %id, "Node started");
        nodes.push(node);
    }

    let settle = nodes[0].config().dead_interval() * 3;
    tokio::time::sleep(settle).await;

    let primary = nodes[0].primary().context("no primary elected")?;
    tracing::info!(%primary, "Cluster settled");

    let position = nodes
        .iter()
        .position(|n| n.id() == Some(primary))
        .context("primary is not one of the local nodes")?;
    let victim = nodes.remove(position);
    tracing::warn!(%primary, "Destroying the primary");
    victim.destroy().await?;

    let mut watcher = nodes[0].watch_primary()?;
    let successor = {
        let changed = tokio::time::timeout(
            settle + Duration::from_secs(1),
            watcher.wait_for(|p| p.is_some_and(|p| p != primary)),
        )
        .await
        .context("no failover before the deadline")??;
        (*changed).context("primary vanished")?
    };
    tracing::info!(%successor, "Failover complete");

    for result in join_all(nodes.into_iter().map(ElectionNode::destroy)).await {
        result?;
    }
    Ok(())
}
