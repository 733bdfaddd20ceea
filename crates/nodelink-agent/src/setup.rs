use std::pin::pin;

use nodelink::node::Node;

use tracing::{debug, info, warn};

use crate::cloud::Cloud;
use crate::config::ProvisioningConfig;

/// How node setup ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupOutcome {
    /// The node metadata was fetched and the node reported connected.
    Complete,
    /// The setup ceiling elapsed before both conditions were met.
    Degraded,
}

/// Waits until the node metadata has been fetched and the node reports
/// connected, or until the setup ceiling elapses.
///
/// Metadata counts as fetched on any cloud reply. Connectivity is queried
/// again at every node status interval until the node is connected.
pub(crate) async fn setup_node<C: Cloud>(
    cloud: &C,
    node_id: &str,
    config: &ProvisioningConfig,
) -> (SetupOutcome, Option<Node>) {
    let mut metadata = pin!(async {
        match cloud.fetch_node(node_id).await {
            Ok(node) => Some(node),
            Err(e) => {
                warn!("Node `{node_id}` metadata not available: {e}");
                None
            }
        }
    });

    let mut connectivity = pin!(async {
        loop {
            match cloud.fetch_node_status(node_id).await {
                Ok(true) => break,
                Ok(false) => debug!("Node `{node_id}` not connected yet"),
                Err(e) => debug!("Node `{node_id}` status not available: {e}"),
            }
            tokio::time::sleep(config.node_status_interval).await;
        }
    });

    let mut ceiling = pin!(tokio::time::sleep(config.setup_ceiling));

    let mut node = None;
    let mut fetched = false;
    let mut connected = false;

    while !(fetched && connected) {
        tokio::select! {
            result = &mut metadata, if !fetched => {
                fetched = true;
                node = result;
            }
            () = &mut connectivity, if !connected => {
                connected = true;
                info!("Node `{node_id}` is connected");
            }
            () = &mut ceiling => {
                warn!(
                    "Node `{node_id}` setup incomplete after {:?}: \
                     metadata fetched: {fetched}, connected: {connected}",
                    config.setup_ceiling
                );
                return (SetupOutcome::Degraded, node);
            }
        }
    }

    (SetupOutcome::Complete, node)
}
