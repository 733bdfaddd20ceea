use nodelink::node::{
    BASE_URL_PARAM, GROUP_ID_PARAM, MATTER_COMMAND_PARAM, MATTER_CONTROLLER_SERVICE,
    MATTER_NODE_ID_PARAM, Node, ParamValue, ParamsUpdate, Service, USER_TOKEN_PARAM,
};

use tracing::{debug, info};

use crate::cloud::Cloud;
use crate::error::{Error, ErrorKind, Result};

// Controller command refreshing the list of Matter devices.
const UPDATE_DEVICE_LIST_COMMAND: i64 = 2;

/// A node acting as a Matter controller on behalf of the user.
///
/// The controller reaches the cloud with the credentials written to its
/// parameters, to keep its list of Matter devices in sync with the user
/// group.
#[derive(Debug)]
pub struct ControllerDelegation<'cloud, C: Cloud> {
    cloud: &'cloud C,
    node: Node,
}

impl<'cloud, C: Cloud> ControllerDelegation<'cloud, C> {
    /// Creates a [`ControllerDelegation`].
    ///
    /// # Errors
    ///
    /// [`ErrorKind::ServiceNotSupported`] if the node has no Matter
    /// controller service.
    pub fn new(cloud: &'cloud C, node: Node) -> Result<Self> {
        if !Self::is_supported(&node) {
            return Err(Error::new(
                ErrorKind::ServiceNotSupported,
                format!("Node `{}` is not a Matter controller", node.id()),
            ));
        }
        Ok(Self { cloud, node })
    }

    /// Whether the node has a Matter controller service.
    #[must_use]
    pub fn is_supported(node: &Node) -> bool {
        node.service_by_type(MATTER_CONTROLLER_SERVICE).is_some()
    }

    /// Whether the node can receive the cloud credentials.
    #[must_use]
    pub fn is_flow_supported(node: &Node) -> bool {
        node.service_by_type(MATTER_CONTROLLER_SERVICE)
            .is_some_and(|service| {
                [BASE_URL_PARAM, GROUP_ID_PARAM, USER_TOKEN_PARAM]
                    .iter()
                    .all(|kind| service.param_by_type(kind).is_some())
            })
    }

    /// Returns the node.
    #[must_use]
    pub const fn node(&self) -> &Node {
        &self.node
    }

    /// Returns the Matter node identifier of the controller, once it has
    /// joined a fabric.
    #[must_use]
    pub fn matter_node_id(&self) -> Option<&str> {
        self.node
            .service_param(MATTER_CONTROLLER_SERVICE, MATTER_NODE_ID_PARAM)
            .and_then(|(_, param)| param.as_str())
            .filter(|id| !id.is_empty())
    }

    /// Writes the cloud credentials to the controller, then asks it to
    /// update its device list.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::ServiceNotSupported`] if the node cannot receive the
    ///   credentials
    /// - [`ErrorKind::Cloud`] if a write is not accepted
    pub async fn delegate(
        &mut self,
        base_url: &str,
        refresh_token: &str,
        group_id: &str,
    ) -> Result<()> {
        if !Self::is_flow_supported(&self.node) {
            return Err(Error::new(
                ErrorKind::ServiceNotSupported,
                "The controller does not accept cloud credentials",
            ));
        }

        let service = self.service()?;
        let mut update = ParamsUpdate::new();
        for (kind, value) in [
            (BASE_URL_PARAM, base_url),
            (USER_TOKEN_PARAM, refresh_token),
            (GROUP_ID_PARAM, group_id),
        ] {
            if let Some(param) = service.param_by_type(kind) {
                update = update.set(service.name(), param.name(), value);
            }
        }

        self.write(update).await?;
        info!("Cloud credentials written to node `{}`", self.node.id());

        self.update_device_list().await
    }

    /// Asks the controller to update its device list with the credentials
    /// it already holds.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::CredentialsRequired`] if a credential parameter is
    ///   missing or empty
    /// - [`ErrorKind::Cloud`] if the command is not accepted
    pub async fn launch(&mut self) -> Result<()> {
        let service = self.service()?;
        let configured = [BASE_URL_PARAM, GROUP_ID_PARAM, USER_TOKEN_PARAM]
            .iter()
            .all(|kind| {
                service
                    .param_by_type(kind)
                    .is_some_and(|param| param.as_str().is_some_and(|value| !value.is_empty()))
            });

        if !configured {
            return Err(Error::new(
                ErrorKind::CredentialsRequired,
                "The controller holds no cloud credentials",
            ));
        }

        self.update_device_list().await
    }

    async fn update_device_list(&mut self) -> Result<()> {
        let service = self.service()?;
        let command = service.param_by_type(MATTER_COMMAND_PARAM).ok_or_else(|| {
            Error::new(
                ErrorKind::ServiceNotSupported,
                "The controller has no command parameter",
            )
        })?;

        let update = ParamsUpdate::new().set(
            service.name(),
            command.name(),
            ParamValue::Integer(UPDATE_DEVICE_LIST_COMMAND),
        );
        self.write(update).await?;
        debug!("Device list update requested on node `{}`", self.node.id());
        Ok(())
    }

    fn service(&self) -> Result<&Service> {
        self.node
            .service_by_type(MATTER_CONTROLLER_SERVICE)
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::ServiceNotSupported,
                    "The node has no Matter controller service",
                )
            })
    }

    async fn write(&mut self, update: ParamsUpdate) -> Result<()> {
        if self.cloud.update_params(self.node.id(), &update).await? {
            self.node.apply_update(&update);
            Ok(())
        } else {
            Err(Error::new(
                ErrorKind::Cloud,
                "The controller parameters were not accepted",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use nodelink::node::{
        BASE_URL_PARAM, GROUP_ID_PARAM, MATTER_COMMAND_PARAM, MATTER_CONTROLLER_SERVICE,
        MATTER_NODE_ID_PARAM, MATTER_STATUS_PARAM, Node, Param, ParamValue, Service,
        USER_TOKEN_PARAM,
    };

    use crate::error::ErrorKind;
    use crate::tests::FakeCloud;

    use super::ControllerDelegation;

    fn controller(with_credentials: bool) -> Node {
        let mut service = Service::new("MatterCTL", MATTER_CONTROLLER_SERVICE)
            .param(Param::new("MTCtlCMD", MATTER_COMMAND_PARAM))
            .param(Param::new("MTCtlStatus", MATTER_STATUS_PARAM));
        if with_credentials {
            service = service
                .param(Param::new("BaseURL", BASE_URL_PARAM))
                .param(Param::new("UserToken", USER_TOKEN_PARAM))
                .param(Param::new("RMakerGroupID", GROUP_ID_PARAM));
        }
        Node::new("ctl-1").service(service)
    }

    #[test]
    fn support_checks() {
        assert!(ControllerDelegation::<FakeCloud>::is_supported(&controller(false)));
        assert!(!ControllerDelegation::<FakeCloud>::is_flow_supported(&controller(false)));
        assert!(ControllerDelegation::<FakeCloud>::is_flow_supported(&controller(true)));

        let error = ControllerDelegation::new(&FakeCloud::new(), Node::new("plain")).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ServiceNotSupported);
    }

    #[tokio::test]
    async fn delegate_then_launch() {
        let cloud = FakeCloud::new();
        let mut delegation = ControllerDelegation::new(&cloud, controller(true)).unwrap();

        // Nothing to launch before delegating.
        let error = delegation.launch().await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::CredentialsRequired);

        delegation
            .delegate("https://api.example.com", "refresh-token", "group-1")
            .await
            .unwrap();

        let updates = cloud.updates();
        assert_eq!(updates.len(), 2);
        assert_eq!(
            updates[0].1.iter().collect::<Vec<_>>(),
            [
                ("MatterCTL", "BaseURL", &ParamValue::from("https://api.example.com")),
                ("MatterCTL", "UserToken", &ParamValue::from("refresh-token")),
                ("MatterCTL", "RMakerGroupID", &ParamValue::from("group-1")),
            ]
        );
        assert_eq!(
            updates[1].1.iter().collect::<Vec<_>>(),
            [("MatterCTL", "MTCtlCMD", &ParamValue::Integer(2))]
        );

        delegation.launch().await.unwrap();
        assert_eq!(cloud.updates().len(), 3);
    }

    #[test]
    fn matter_node_id() {
        let cloud = FakeCloud::new();

        let delegation = ControllerDelegation::new(&cloud, controller(true)).unwrap();
        assert_eq!(delegation.matter_node_id(), None);

        let node = Node::new("ctl-2").service(
            Service::new("MatterCTL", MATTER_CONTROLLER_SERVICE)
                .param(Param::new("MTCtlCMD", MATTER_COMMAND_PARAM))
                .param(Param::new("MatterNodeId", MATTER_NODE_ID_PARAM).value("5f3a01")),
        );
        let delegation = ControllerDelegation::new(&cloud, node).unwrap();
        assert_eq!(delegation.matter_node_id(), Some("5f3a01"));
    }

    #[tokio::test]
    async fn delegation_needs_credential_params() {
        let cloud = FakeCloud::new();
        let mut delegation = ControllerDelegation::new(&cloud, controller(false)).unwrap();

        let error = delegation
            .delegate("https://api.example.com", "refresh-token", "group-1")
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ServiceNotSupported);
        assert!(cloud.updates().is_empty());
    }

    #[tokio::test]
    async fn refused_write() {
        let cloud = FakeCloud::new().reject_updates();
        let mut delegation = ControllerDelegation::new(&cloud, controller(true)).unwrap();

        let error = delegation
            .delegate("https://api.example.com", "refresh-token", "group-1")
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Cloud);
    }
}
