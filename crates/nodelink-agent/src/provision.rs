use std::future::Future;

use bytes::Bytes;

use nodelink::codec::{USER_MAPPING_ENDPOINT, decode_user_mapping, encode_user_mapping};
use nodelink::network::Credentials;
use nodelink::node::Node;

use tokio::sync::mpsc::Sender;

use tokio_util::sync::CancellationToken;

use tracing::{debug, error, info, warn};

use uuid::Uuid;

use crate::auth::Authenticator;
use crate::cloud::{AssociationRequest, AssociationStatus, Cloud};
use crate::config::ProvisioningConfig;
use crate::credentials::{CredentialFailure, apply_credentials, send_credentials};
use crate::device::Device;
use crate::error::{Error, ErrorKind, Result};
use crate::setup::{SetupOutcome, setup_node};
use crate::transport::Transport;

/// Steps of a provisioning session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Device identity verification.
    Authenticate,
    /// Exchange of the user identifier and the secret key with the device.
    UserMapping,
    /// Delivery of the network credentials.
    TransferCredentials,
    /// Connection of the device to the network.
    ApplyCredentials,
    /// Submission of the association request.
    SubmitAssociation,
    /// Wait for the association confirmation.
    ConfirmAssociation,
    /// Wait for the node to be reachable from the cloud.
    SetupNode,
}

/// Status of a [`Step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    /// The step started.
    Started,
    /// The step completed.
    Completed,
    /// The step failed and the session ends.
    Failed(String),
    /// The step ended with a problem that does not stop the session.
    Warning(String),
}

/// A progress event of a provisioning session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepEvent {
    /// Step.
    pub step: Step,
    /// Step status.
    pub status: StepStatus,
}

/// The outcome of a successful provisioning session.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisioningReport {
    /// Identifier of the provisioned node.
    pub node_id: String,
    /// How node setup ended.
    pub setup: SetupOutcome,
    /// The node, when its metadata could be fetched.
    pub node: Option<Node>,
}

/// A handle abandoning a provisioning session from another task.
#[derive(Debug, Clone)]
pub struct AbandonHandle(CancellationToken);

impl AbandonHandle {
    /// Abandons the session.
    ///
    /// The session stops at its next suspension point, emits no further
    /// events, and disconnects the device.
    pub fn abandon(&self) {
        self.0.cancel();
    }

    /// Whether the session has been abandoned.
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// The state of a single provisioning session.
#[derive(Debug)]
pub struct Session<T: Transport> {
    device: Device<T>,
    credentials: Credentials,
    user_id: String,
    observer: Option<Sender<StepEvent>>,
    token: CancellationToken,
}

impl<T: Transport> Session<T> {
    /// Creates a [`Session`] provisioning `device` with `credentials` on
    /// behalf of the user `user_id`.
    #[must_use]
    #[inline]
    pub fn new(device: Device<T>, credentials: Credentials, user_id: impl Into<String>) -> Self {
        Self {
            device,
            credentials,
            user_id: user_id.into(),
            observer: None,
            token: CancellationToken::new(),
        }
    }

    /// Sets the channel receiving the [`StepEvent`]s of the session.
    ///
    /// When the channel is full, the session waits until an event is
    /// consumed.
    #[must_use]
    #[inline]
    pub fn observer(mut self, observer: Sender<StepEvent>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Returns an [`AbandonHandle`] for this session.
    #[must_use]
    pub fn abandon_handle(&self) -> AbandonHandle {
        AbandonHandle(self.token.clone())
    }

    async fn emit(&self, step: Step, status: StepStatus) {
        if self.token.is_cancelled() {
            return;
        }
        debug!("{step:?}: {status:?}");
        if let Some(observer) = &self.observer {
            // A dropped receiver does not stop the session.
            let _ = observer.send(StepEvent { step, status }).await;
        }
    }

    async fn step<R>(&self, step: Step, operation: impl Future<Output = Result<R>>) -> Result<R> {
        self.emit(step, StepStatus::Started).await;
        match operation.await {
            Ok(value) => {
                self.emit(step, StepStatus::Completed).await;
                Ok(value)
            }
            Err(e) => {
                self.emit(step, StepStatus::Failed(e.description().to_owned()))
                    .await;
                Err(e)
            }
        }
    }
}

/// Sequences the provisioning steps of a device.
///
/// A device supporting the challenge-response handshake is authenticated,
/// receives its credentials and is then set up. Any other device goes
/// through the user-mapping exchange, receives its credentials, and is
/// associated with the user before setup.
#[derive(Debug)]
pub struct Provisioner<'cloud, C: Cloud> {
    cloud: &'cloud C,
    config: ProvisioningConfig,
}

impl<'cloud, C: Cloud> Provisioner<'cloud, C> {
    /// Creates a [`Provisioner`].
    #[must_use]
    #[inline]
    pub const fn new(cloud: &'cloud C, config: ProvisioningConfig) -> Self {
        Self { cloud, config }
    }

    /// Runs a provisioning session to its end.
    ///
    /// The device is disconnected when the session ends.
    ///
    /// # Errors
    ///
    /// Fails with the error of the first failing step, or with
    /// [`ErrorKind::SessionAbandoned`] if the session has been abandoned.
    pub async fn run<T: Transport>(&self, session: Session<T>) -> Result<ProvisioningReport> {
        let result = tokio::select! {
            biased;
            () = session.token.cancelled() => Err(Error::abandoned()),
            result = self.drive(&session) => result,
        };

        match &result {
            Ok(report) => info!("Node `{}` provisioned, setup {:?}", report.node_id, report.setup),
            Err(e) => error!("Provisioning failed: {e}"),
        }

        session.device.disconnect().await;
        result
    }

    async fn drive<T: Transport>(&self, session: &Session<T>) -> Result<ProvisioningReport> {
        let transport = session.device.transport();

        if session.device.capabilities().supports_challenge_response() {
            let mut authenticator = Authenticator::new(self.cloud);
            let node_id = session
                .step(Step::Authenticate, authenticator.authenticate(transport))
                .await?;

            self.transfer(session, true).await?;
            return self.setup(session, node_id).await;
        }

        let secret_key = Uuid::new_v4().to_string();
        let node_id = session
            .step(
                Step::UserMapping,
                user_mapping(transport, &session.user_id, &secret_key),
            )
            .await?;

        self.transfer(session, false).await?;

        let request =
            AssociationRequest::new(session.user_id.as_str(), node_id.as_str(), secret_key);
        let request_id = session
            .step(Step::SubmitAssociation, self.submit(&request))
            .await?;

        session
            .step(
                Step::ConfirmAssociation,
                self.confirm(&node_id, &request_id),
            )
            .await?;

        self.setup(session, node_id).await
    }

    async fn transfer<T: Transport>(
        &self,
        session: &Session<T>,
        challenge_response: bool,
    ) -> Result<()> {
        let transport = session.device.transport();

        session
            .step(Step::TransferCredentials, async {
                if matches!(session.credentials, Credentials::Thread(_))
                    && !session.device.capabilities().supports_thread()
                {
                    return Err(Error::new(
                        ErrorKind::CredentialTransfer,
                        "The device does not accept Thread credentials",
                    ));
                }
                send_credentials(transport, &session.credentials)
                    .await
                    .map_err(Error::from)
            })
            .await?;

        session.emit(Step::ApplyCredentials, StepStatus::Started).await;
        match apply_credentials(transport, &self.config).await {
            Ok(()) => {
                session
                    .emit(Step::ApplyCredentials, StepStatus::Completed)
                    .await;
                Ok(())
            }
            Err(failure @ CredentialFailure::StatusUnavailable) => {
                self.proceed(session, failure).await;
                Ok(())
            }
            Err(failure @ CredentialFailure::Disconnected) if !challenge_response => {
                self.proceed(session, failure).await;
                Ok(())
            }
            Err(failure) => {
                session
                    .emit(
                        Step::ApplyCredentials,
                        StepStatus::Failed(failure.message().to_owned()),
                    )
                    .await;
                Err(failure.into())
            }
        }
    }

    async fn proceed<T: Transport>(&self, session: &Session<T>, failure: CredentialFailure) {
        warn!("Proceeding despite credential failure: {failure}");
        session
            .emit(
                Step::ApplyCredentials,
                StepStatus::Warning(failure.message().to_owned()),
            )
            .await;
    }

    async fn submit(&self, request: &AssociationRequest) -> Result<String> {
        let attempts = self.config.submission_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.cloud.submit_association(request).await {
                Ok(request_id) => {
                    debug!("Association request `{request_id}` submitted at attempt {attempt}");
                    return Ok(request_id);
                }
                Err(e) if attempt < attempts => {
                    warn!("Association attempt {attempt} of {attempts} failed: {e}");
                    attempt += 1;
                    tokio::time::sleep(self.config.submission_retry_delay).await;
                }
                Err(e) => {
                    return Err(Error::new(
                        ErrorKind::AssociationFailed,
                        format!(
                            "Association not submitted after {attempts} attempts: {}",
                            e.description()
                        ),
                    ));
                }
            }
        }
    }

    async fn confirm(&self, node_id: &str, request_id: &str) -> Result<()> {
        for poll in 1..=self.config.poll_ceiling {
            tokio::time::sleep(self.config.poll_interval).await;

            match self.cloud.poll_association(node_id, request_id).await {
                Ok(AssociationStatus::Confirmed) => {
                    info!("Association of node `{node_id}` confirmed at poll {poll}");
                    return Ok(());
                }
                Ok(AssociationStatus::TimedOut) => {
                    return Err(Error::new(
                        ErrorKind::AssociationTimeout,
                        "The device did not confirm the association",
                    ));
                }
                Ok(AssociationStatus::Pending) => debug!("Association pending at poll {poll}"),
                Err(e) => debug!("Association poll {poll} failed: {e}"),
            }
        }

        Err(Error::new(
            ErrorKind::AssociationTimeout,
            format!(
                "Association not confirmed after {} polls",
                self.config.poll_ceiling
            ),
        ))
    }

    async fn setup<T: Transport>(
        &self,
        session: &Session<T>,
        node_id: String,
    ) -> Result<ProvisioningReport> {
        session.emit(Step::SetupNode, StepStatus::Started).await;
        let (setup, mut node) = setup_node(self.cloud, &node_id, &self.config).await;

        if let (Some(node), Some(timezone)) = (node.as_mut(), self.config.timezone.as_deref()) {
            self.fill_timezone(node, timezone).await;
        }

        let status = match setup {
            SetupOutcome::Complete => StepStatus::Completed,
            SetupOutcome::Degraded => {
                StepStatus::Warning("Node setup did not complete in time".to_owned())
            }
        };
        session.emit(Step::SetupNode, status).await;

        Ok(ProvisioningReport {
            node_id,
            setup,
            node,
        })
    }

    async fn fill_timezone(&self, node: &mut Node, timezone: &str) {
        let Some(update) = node.timezone_update(timezone) else {
            return;
        };

        match self.cloud.update_params(node.id(), &update).await {
            Ok(true) => {
                debug!("Timezone of node `{}` set to `{timezone}`", node.id());
                node.apply_update(&update);
            }
            Ok(false) => warn!("Timezone of node `{}` refused", node.id()),
            Err(e) => warn!("Timezone of node `{}` not set: {e}", node.id()),
        }
    }
}

async fn user_mapping<T: Transport>(
    transport: &T,
    user_id: &str,
    secret_key: &str,
) -> Result<String> {
    let answer = transport
        .send(
            USER_MAPPING_ENDPOINT,
            Bytes::from(encode_user_mapping(user_id, secret_key)),
        )
        .await
        .map_err(|e| Error::new(ErrorKind::DeviceUnreachable, e.description().to_owned()))?;

    if answer.is_empty() {
        return Err(Error::new(
            ErrorKind::NoResponse,
            "The device answered with an empty payload",
        ));
    }

    let node_id = decode_user_mapping(&answer)?;
    if node_id.is_empty() {
        return Err(Error::new(
            ErrorKind::InvalidResponse,
            "The device returned no node identifier",
        ));
    }
    Ok(node_id)
}
