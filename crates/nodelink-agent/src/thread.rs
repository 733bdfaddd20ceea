use std::future::Future;

use nodelink::dataset::OperationalDataset;
use nodelink::node::{
    ACTIVE_DATASET_PARAM, BORDER_AGENT_ID_PARAM, Node, PENDING_DATASET_PARAM, ParamValue,
    ParamsUpdate, THREAD_BORDER_ROUTER_SERVICE, THREAD_COMMAND_PARAM,
};
use nodelink::reconcile::reconcile;

use tracing::{debug, error, info, warn};

use crate::cloud::Cloud;
use crate::error::{Error, ErrorKind, Result};

// Border router command creating a new Thread network.
const CREATE_DATASET_COMMAND: i64 = 1;

/// A host-side source of Thread credentials.
pub trait ThreadCredentialSource: Send + Sync {
    /// Returns the active operational dataset known to the host, if any.
    fn fetch_active_operational_dataset(
        &self,
    ) -> impl Future<Output = Option<OperationalDataset>> + Send;
}

/// A host-side store of Thread credentials.
pub trait ThreadCredentialStore: Send + Sync {
    /// Saves the active dataset of a border router together with its border
    /// agent identifier.
    fn save_operational_credentials(
        &self,
        dataset: &OperationalDataset,
        border_agent_id: &[u8],
    ) -> impl Future<Output = Result<()>> + Send;
}

fn apply_error(description: impl Into<std::borrow::Cow<'static, str>>) -> Error {
    Error::new(ErrorKind::ApplyError, description)
}

async fn write_dataset<C: Cloud>(
    cloud: &C,
    node: &Node,
    param_kind: &str,
    dataset: &OperationalDataset,
) -> Result<bool> {
    let (service, param) = node
        .service_param(THREAD_BORDER_ROUTER_SERVICE, param_kind)
        .ok_or_else(|| {
            apply_error(format!(
                "Node `{}` has no border router parameter `{param_kind}`",
                node.id()
            ))
        })?;

    let update = ParamsUpdate::new().set(service.name(), param.name(), dataset.to_hex());
    let accepted = cloud
        .update_params(node.id(), &update)
        .await
        .map_err(|e| apply_error(format!("Dataset not written: {}", e.description())))?;

    debug!(
        "Dataset write to `{}` of node `{}` accepted: {accepted}",
        param.name(),
        node.id()
    );
    Ok(accepted)
}

/// Writes `dataset` as the pending dataset of a border router.
///
/// Returns whether the cloud accepted the write, not whether the border
/// router committed the dataset.
///
/// # Errors
///
/// [`ErrorKind::ApplyError`] if the node has no border router service or if
/// the write cannot be submitted.
pub async fn apply_to_device<C: Cloud>(
    cloud: &C,
    node: &Node,
    dataset: &OperationalDataset,
) -> Result<bool> {
    write_dataset(cloud, node, PENDING_DATASET_PARAM, dataset).await
}

/// Writes `dataset` as the active dataset of a border router.
///
/// # Errors
///
/// See [`apply_to_device`].
pub async fn set_active_dataset<C: Cloud>(
    cloud: &C,
    node: &Node,
    dataset: &OperationalDataset,
) -> Result<bool> {
    write_dataset(cloud, node, ACTIVE_DATASET_PARAM, dataset).await
}

/// Asks a border router without an active dataset to create a new Thread
/// network.
///
/// Returns `false` without writing anything when the node has no border
/// router service, no command parameter, no active dataset parameter, or
/// already has an active dataset.
///
/// # Errors
///
/// [`ErrorKind::ApplyError`] if the command cannot be submitted.
pub async fn create_fresh_dataset<C: Cloud>(cloud: &C, node: &Node) -> Result<bool> {
    let Some(service) = node.service_by_type(THREAD_BORDER_ROUTER_SERVICE) else {
        error!("Node `{}` has no border router service", node.id());
        return Ok(false);
    };

    let Some(command) = service.param_by_type(THREAD_COMMAND_PARAM) else {
        error!("Node `{}` has no border router command", node.id());
        return Ok(false);
    };

    match service.param_by_type(ACTIVE_DATASET_PARAM) {
        None => {
            error!("Node `{}` has no active dataset parameter", node.id());
            return Ok(false);
        }
        Some(param) if !param.is_empty() => {
            error!("Node `{}` already has an active dataset", node.id());
            return Ok(false);
        }
        Some(_) => {}
    }

    let update = ParamsUpdate::new().set(
        service.name(),
        command.name(),
        ParamValue::Integer(CREATE_DATASET_COMMAND),
    );
    cloud
        .update_params(node.id(), &update)
        .await
        .map_err(|e| apply_error(format!("Command not written: {}", e.description())))
}

/// A node acting as a Thread border router.
#[derive(Debug)]
pub struct BorderRouter<'cloud, C: Cloud> {
    cloud: &'cloud C,
    node: Node,
}

impl<'cloud, C: Cloud> BorderRouter<'cloud, C> {
    /// Creates a [`BorderRouter`].
    ///
    /// # Errors
    ///
    /// [`ErrorKind::ServiceNotSupported`] if the node has no border router
    /// service.
    pub fn new(cloud: &'cloud C, node: Node) -> Result<Self> {
        if node.service_by_type(THREAD_BORDER_ROUTER_SERVICE).is_none() {
            return Err(Error::new(
                ErrorKind::ServiceNotSupported,
                format!("Node `{}` is not a Thread border router", node.id()),
            ));
        }
        Ok(Self { cloud, node })
    }

    /// Returns the node, as fetched after the last successful write.
    #[must_use]
    pub const fn node(&self) -> &Node {
        &self.node
    }

    /// Returns the active dataset of the border router, if set.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::DecodeError`] if the reported dataset is invalid.
    pub fn active_dataset(&self) -> Result<Option<OperationalDataset>> {
        let Some((_, param)) = self
            .node
            .service_param(THREAD_BORDER_ROUTER_SERVICE, ACTIVE_DATASET_PARAM)
        else {
            return Ok(None);
        };

        match param.as_str() {
            None | Some("") => Ok(None),
            Some(hex) => OperationalDataset::from_hex(hex).map(Some).map_err(|e| {
                Error::new(
                    ErrorKind::DecodeError,
                    format!("Invalid active dataset: {e}"),
                )
            }),
        }
    }

    /// Gives the border router its first active dataset.
    ///
    /// The active dataset of `source` is used when available. When there is
    /// none, or when writing it fails, the border router is asked to create a
    /// new network.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::AlreadyConfigured`] if the border router already has an
    ///   active dataset
    /// - [`ErrorKind::ApplyError`] if neither the dataset nor the command is
    ///   accepted
    pub async fn configure(&mut self, source: &impl ThreadCredentialSource) -> Result<()> {
        if self.active_dataset()?.is_some() {
            return Err(Error::new(
                ErrorKind::AlreadyConfigured,
                "The border router already has an active dataset",
            ));
        }

        let mut accepted = false;
        if let Some(external) = source.fetch_active_operational_dataset().await {
            info!("Using the host active dataset for node `{}`", self.node.id());
            match set_active_dataset(self.cloud, &self.node, &external).await {
                Ok(true) => accepted = true,
                Ok(false) => warn!("Node `{}` refused the host active dataset", self.node.id()),
                Err(e) => warn!("Host active dataset not written: {e}"),
            }
        }

        if !accepted {
            info!("Creating a new Thread network on node `{}`", self.node.id());
            if !create_fresh_dataset(self.cloud, &self.node).await? {
                return Err(apply_error("The border router refused the active dataset"));
            }
        }
        self.refresh().await;
        Ok(())
    }

    /// Merges the active dataset of `source` into the border router.
    ///
    /// The two datasets are reconciled and the result is written as the
    /// pending dataset of the border router.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::NotConfigured`] if the border router has no active
    ///   dataset
    /// - [`ErrorKind::ExternalDatasetUnavailable`] if `source` has no active
    ///   dataset
    /// - [`ErrorKind::ApplyError`] if the pending dataset is not accepted
    pub async fn merge(&mut self, source: &impl ThreadCredentialSource) -> Result<()> {
        let Some(local) = self.active_dataset()? else {
            return Err(Error::new(
                ErrorKind::NotConfigured,
                "The border router has no active dataset",
            ));
        };

        let Some(external) = source.fetch_active_operational_dataset().await else {
            return Err(Error::new(
                ErrorKind::ExternalDatasetUnavailable,
                "No active dataset available on the host",
            ));
        };

        let decision = reconcile(&local, &external);
        info!("Merging datasets of node `{}`: {decision:?}", self.node.id());
        let pending = decision.resolve(&external);

        if !apply_to_device(self.cloud, &self.node, &pending).await? {
            return Err(apply_error("The border router refused the pending dataset"));
        }
        self.refresh().await;
        Ok(())
    }

    /// Hands the active dataset and the border agent identifier of the
    /// border router to `store`.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::NotConfigured`] if the border router has no active
    ///   dataset
    /// - [`ErrorKind::DecodeError`] if the border agent identifier is not a
    ///   hex string
    /// - any error returned by `store`
    pub async fn export(&self, store: &impl ThreadCredentialStore) -> Result<()> {
        let Some(dataset) = self.active_dataset()? else {
            return Err(Error::new(
                ErrorKind::NotConfigured,
                "The border router has no active dataset",
            ));
        };

        let border_agent_id = match self
            .node
            .service_param(THREAD_BORDER_ROUTER_SERVICE, BORDER_AGENT_ID_PARAM)
            .and_then(|(_, param)| param.as_str())
        {
            Some(id) => hex::decode(id).map_err(|e| {
                Error::new(
                    ErrorKind::DecodeError,
                    format!("Invalid border agent identifier: {e}"),
                )
            })?,
            None => Vec::new(),
        };

        store
            .save_operational_credentials(&dataset, &border_agent_id)
            .await
    }

    async fn refresh(&mut self) {
        match self.cloud.fetch_node(self.node.id()).await {
            Ok(node) => self.node = node,
            Err(e) => warn!("Node `{}` not refreshed: {e}", self.node.id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use nodelink::dataset::{OperationalDataset, Timestamp, TlvType};
    use nodelink::node::{
        ACTIVE_DATASET_PARAM, BORDER_AGENT_ID_PARAM, Node, PENDING_DATASET_PARAM, Param,
        ParamValue, Service, THREAD_BORDER_ROUTER_SERVICE, THREAD_COMMAND_PARAM,
    };
    use nodelink::reconcile::COMMIT_DELAY;

    use crate::error::{ErrorKind, Result};
    use crate::tests::FakeCloud;

    use super::{
        BorderRouter, ThreadCredentialSource, ThreadCredentialStore, apply_to_device,
        create_fresh_dataset,
    };

    struct Host(Option<OperationalDataset>);

    impl ThreadCredentialSource for Host {
        async fn fetch_active_operational_dataset(&self) -> Option<OperationalDataset> {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct Keychain(Mutex<Vec<(OperationalDataset, Vec<u8>)>>);

    impl ThreadCredentialStore for Keychain {
        async fn save_operational_credentials(
            &self,
            dataset: &OperationalDataset,
            border_agent_id: &[u8],
        ) -> Result<()> {
            self.0
                .lock()
                .unwrap()
                .push((dataset.clone(), border_agent_id.to_vec()));
            Ok(())
        }
    }

    fn dataset(seconds: u64) -> OperationalDataset {
        let mut dataset = OperationalDataset::new()
            .with(TlvType::NetworkName, b"home-mesh")
            .unwrap()
            .with(TlvType::NetworkKey, &[0x22; 16])
            .unwrap();
        dataset.set_active_timestamp(Timestamp::new(seconds, 0, false));
        dataset
    }

    fn border_router(active: Option<&OperationalDataset>) -> Node {
        let mut active_param = Param::new("ActiveDataset", ACTIVE_DATASET_PARAM);
        if let Some(active) = active {
            active_param = active_param.value(active.to_hex());
        }
        Node::new("tbr-1").service(
            Service::new("TBRService", THREAD_BORDER_ROUTER_SERVICE)
                .param(active_param)
                .param(Param::new("PendingDataset", PENDING_DATASET_PARAM))
                .param(Param::new("ThreadCmd", THREAD_COMMAND_PARAM).value(0_i64))
                .param(Param::new("BorderAgentId", BORDER_AGENT_ID_PARAM).value("a1b2")),
        )
    }

    fn written(cloud: &FakeCloud, param: &str) -> Option<ParamValue> {
        cloud.updates().iter().find_map(|(_, update)| {
            update
                .iter()
                .find(|(service, name, _)| *service == "TBRService" && *name == param)
                .map(|(_, _, value)| value.clone())
        })
    }

    #[tokio::test]
    async fn pending_dataset_is_written_as_hex() {
        let cloud = FakeCloud::new();
        let node = border_router(Some(&dataset(1)));

        assert!(apply_to_device(&cloud, &node, &dataset(2)).await.unwrap());
        assert_eq!(
            written(&cloud, "PendingDataset"),
            Some(ParamValue::Text(dataset(2).to_hex()))
        );

        let refusing = FakeCloud::new().reject_updates();
        assert!(!apply_to_device(&refusing, &node, &dataset(2)).await.unwrap());

        let error = apply_to_device(&cloud, &Node::new("plain"), &dataset(2))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ApplyError);
    }

    #[tokio::test]
    async fn fresh_dataset_preconditions() {
        let cloud = FakeCloud::new();

        assert!(create_fresh_dataset(&cloud, &border_router(None)).await.unwrap());
        assert_eq!(written(&cloud, "ThreadCmd"), Some(ParamValue::Integer(1)));

        let cloud = FakeCloud::new();
        assert!(
            !create_fresh_dataset(&cloud, &border_router(Some(&dataset(1))))
                .await
                .unwrap()
        );
        assert!(!create_fresh_dataset(&cloud, &Node::new("plain")).await.unwrap());

        let without_active_param = Node::new("tbr-2").service(
            Service::new("TBRService", THREAD_BORDER_ROUTER_SERVICE)
                .param(Param::new("ThreadCmd", THREAD_COMMAND_PARAM).value(0_i64)),
        );
        assert!(!create_fresh_dataset(&cloud, &without_active_param).await.unwrap());
        assert!(cloud.updates().is_empty());
    }

    #[tokio::test]
    async fn configure_with_host_dataset() {
        let cloud = FakeCloud::new().node(border_router(Some(&dataset(3))), Duration::ZERO);
        let mut router = BorderRouter::new(&cloud, border_router(None)).unwrap();

        router.configure(&Host(Some(dataset(3)))).await.unwrap();
        assert_eq!(
            written(&cloud, "ActiveDataset"),
            Some(ParamValue::Text(dataset(3).to_hex()))
        );
        // The node is fetched again after the write.
        assert_eq!(router.active_dataset().unwrap(), Some(dataset(3)));

        let error = router.configure(&Host(None)).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::AlreadyConfigured);
    }

    #[tokio::test]
    async fn configure_falls_back_to_fresh_dataset() {
        let cloud = FakeCloud::new().refuse_param("ActiveDataset");
        let mut router = BorderRouter::new(&cloud, border_router(None)).unwrap();

        router.configure(&Host(Some(dataset(3)))).await.unwrap();
        assert_eq!(written(&cloud, "ActiveDataset"), None);
        assert_eq!(written(&cloud, "ThreadCmd"), Some(ParamValue::Integer(1)));

        let cloud = FakeCloud::new().reject_updates();
        let mut router = BorderRouter::new(&cloud, border_router(None)).unwrap();
        let error = router.configure(&Host(Some(dataset(3)))).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ApplyError);
    }

    #[tokio::test]
    async fn configure_without_host_dataset() {
        let cloud = FakeCloud::new();
        let mut router = BorderRouter::new(&cloud, border_router(None)).unwrap();

        router.configure(&Host(None)).await.unwrap();
        assert_eq!(written(&cloud, "ThreadCmd"), Some(ParamValue::Integer(1)));
    }

    #[tokio::test]
    async fn merge_bumps_older_host_dataset() {
        let cloud = FakeCloud::new();
        let mut router = BorderRouter::new(&cloud, border_router(Some(&dataset(10)))).unwrap();

        router.merge(&Host(Some(dataset(4)))).await.unwrap();

        let Some(ParamValue::Text(pending)) = written(&cloud, "PendingDataset") else {
            panic!("no pending dataset written");
        };
        let pending = OperationalDataset::from_hex(&pending).unwrap();
        assert_eq!(
            pending.active_timestamp(),
            Some(Timestamp::new(10, 0, false))
        );
        assert_eq!(pending.delay_timer(), Some(COMMIT_DELAY));
        assert_eq!(pending.network_key(), Some([0x22; 16].as_slice()));
    }

    #[tokio::test]
    async fn merge_preconditions() {
        let cloud = FakeCloud::new();

        let mut unconfigured = BorderRouter::new(&cloud, border_router(None)).unwrap();
        let error = unconfigured
            .merge(&Host(Some(dataset(4))))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotConfigured);

        let mut configured = BorderRouter::new(&cloud, border_router(Some(&dataset(1)))).unwrap();
        let error = configured.merge(&Host(None)).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ExternalDatasetUnavailable);
        assert!(cloud.updates().is_empty());

        let error = BorderRouter::new(&cloud, Node::new("plain")).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ServiceNotSupported);
    }

    #[tokio::test]
    async fn export_to_store() {
        let cloud = FakeCloud::new();
        let router = BorderRouter::new(&cloud, border_router(Some(&dataset(5)))).unwrap();
        let keychain = Keychain::default();

        router.export(&keychain).await.unwrap();
        assert_eq!(
            keychain.0.lock().unwrap().as_slice(),
            [(dataset(5), vec![0xa1, 0xb2])]
        );
    }
}
