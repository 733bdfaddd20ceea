use bytes::Bytes;

use nodelink::network::{
    CONFIG_ENDPOINT, ConnectionState, Credentials, FailReason, decode_apply_config,
    decode_get_status, decode_set_config, encode_apply_config, encode_get_status,
    encode_set_config,
};

use tracing::{debug, warn};

use crate::config::ProvisioningConfig;
use crate::error::{Error, ErrorKind};
use crate::transport::Transport;

/// Reasons why network credentials could not be delivered to a device or
/// used by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialFailure {
    /// The first message could not reach the device.
    SessionNotEstablished,
    /// The device refused to store or apply the credentials.
    ConfigurationRejected,
    /// The device reports it is not connected to the network.
    Disconnected,
    /// The device connection state could not be read.
    StatusUnavailable,
    /// The network refused the credentials.
    AuthenticationError,
    /// The network could not be found.
    NetworkNotFound,
}

impl CredentialFailure {
    /// Returns the message describing the failure.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::SessionNotEstablished => "Session is not established",
            Self::ConfigurationRejected => "Failed to apply network configuration to device",
            Self::Disconnected => "Device is disconnected from the network",
            Self::StatusUnavailable => "Unable to fetch Wi-Fi state.",
            Self::AuthenticationError => "Network credentials were refused",
            Self::NetworkNotFound => "Network not found",
        }
    }
}

impl std::fmt::Display for CredentialFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.message().fmt(f)
    }
}

impl From<CredentialFailure> for Error {
    fn from(failure: CredentialFailure) -> Self {
        Self::new(ErrorKind::CredentialTransfer, failure.message())
    }
}

/// Stores `credentials` on the device.
///
/// # Errors
///
/// [`CredentialFailure::SessionNotEstablished`] if the device cannot be
/// reached, [`CredentialFailure::ConfigurationRejected`] if it refuses the
/// credentials.
pub async fn send_credentials<T: Transport>(
    transport: &T,
    credentials: &Credentials,
) -> Result<(), CredentialFailure> {
    let answer = transport
        .send(CONFIG_ENDPOINT, Bytes::from(encode_set_config(credentials)))
        .await
        .map_err(|e| {
            warn!("Credentials not delivered: {e}");
            CredentialFailure::SessionNotEstablished
        })?;

    decode_set_config(&answer).map_err(|e| {
        warn!("Credentials refused: {e}");
        CredentialFailure::ConfigurationRejected
    })
}

/// Asks the device to apply the stored credentials, then waits until it
/// reports a final connection state.
///
/// # Errors
///
/// Fails with the [`CredentialFailure`] matching the device answer.
pub async fn apply_credentials<T: Transport>(
    transport: &T,
    config: &ProvisioningConfig,
) -> Result<(), CredentialFailure> {
    let answer = transport
        .send(CONFIG_ENDPOINT, Bytes::from(encode_apply_config()))
        .await
        .map_err(|e| {
            warn!("Apply command not delivered: {e}");
            CredentialFailure::ConfigurationRejected
        })?;
    decode_apply_config(&answer).map_err(|e| {
        warn!("Apply command refused: {e}");
        CredentialFailure::ConfigurationRejected
    })?;

    for attempt in 1..=config.status_attempts.max(1) {
        tokio::time::sleep(config.status_interval).await;

        let state = match transport
            .send(CONFIG_ENDPOINT, Bytes::from(encode_get_status()))
            .await
        {
            Ok(answer) => decode_get_status(&answer).map_err(|e| {
                warn!("Invalid connection state: {e}");
                CredentialFailure::StatusUnavailable
            })?,
            Err(e) => {
                warn!("Connection state not available: {e}");
                return Err(CredentialFailure::StatusUnavailable);
            }
        };

        debug!("Connection state at attempt {attempt}: {state:?}");
        match state {
            ConnectionState::Connected { .. } => return Ok(()),
            ConnectionState::Connecting => {}
            ConnectionState::Disconnected => return Err(CredentialFailure::Disconnected),
            ConnectionState::Failed(FailReason::AuthError) => {
                return Err(CredentialFailure::AuthenticationError);
            }
            ConnectionState::Failed(FailReason::NetworkNotFound) => {
                return Err(CredentialFailure::NetworkNotFound);
            }
        }
    }

    Err(CredentialFailure::StatusUnavailable)
}
