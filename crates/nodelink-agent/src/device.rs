use bytes::Bytes;

use nodelink::device::{Capabilities, VERSION_ENDPOINT};

use tracing::{debug, info};

use crate::error::{Error, ErrorKind, Result};
use crate::transport::Transport;

// Payload expected by the version endpoint.
const VERSION_REQUEST: &[u8] = b"ESP";

/// A device under configuration.
///
/// A device owns its [`Transport`] for the whole provisioning session.
#[derive(Debug)]
pub struct Device<T: Transport> {
    transport: T,
    capabilities: Capabilities,
}

impl<T: Transport> Device<T> {
    /// Creates a [`Device`] with known [`Capabilities`].
    #[must_use]
    #[inline]
    pub const fn new(transport: T, capabilities: Capabilities) -> Self {
        Self {
            transport,
            capabilities,
        }
    }

    /// Creates a [`Device`] by querying its version information.
    ///
    /// # Errors
    ///
    /// Fails if the device cannot be reached or if its version information
    /// is invalid. The transport is disconnected in both cases.
    pub async fn connect(transport: T) -> Result<Self> {
        let data = match transport
            .send(VERSION_ENDPOINT, Bytes::from_static(VERSION_REQUEST))
            .await
        {
            Ok(data) => data,
            Err(e) => {
                transport.disconnect().await;
                return Err(Error::new(
                    ErrorKind::DeviceUnreachable,
                    format!("Unable to read the device version: {}", e.description()),
                ));
            }
        };

        let capabilities = match Capabilities::from_version_info(&data) {
            Ok(capabilities) => capabilities,
            Err(e) => {
                transport.disconnect().await;
                return Err(Error::new(
                    ErrorKind::InvalidResponse,
                    format!("Invalid version information: {e}"),
                ));
            }
        };

        info!(
            "Connected to device with version {:?}, challenge-response: {}, thread: {}",
            capabilities.version(),
            capabilities.supports_challenge_response(),
            capabilities.supports_thread()
        );

        Ok(Self::new(transport, capabilities))
    }

    /// Returns the device [`Capabilities`].
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Returns the device [`Transport`].
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Closes the device [`Transport`].
    pub async fn disconnect(&self) {
        debug!("Disconnecting device");
        self.transport.disconnect().await;
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::tests::FakeTransport;

    use super::Device;

    #[tokio::test]
    async fn connect_reads_capabilities() {
        let transport = FakeTransport::new().reply(
            "proto-ver",
            br#"{"prov":{"ver":"v1.1","cap":["thread_prov"]},"rmaker":{"cap":["ch_resp"]}}"#,
        );

        let device = Device::connect(transport).await.unwrap();
        assert!(device.capabilities().supports_challenge_response());
        assert!(device.capabilities().supports_thread());
        assert_eq!(device.transport().sent("proto-ver"), [b"ESP".to_vec()]);
    }

    #[tokio::test]
    async fn unreadable_version() {
        let transport = FakeTransport::new().reply("proto-ver", b"<html>");
        let error = Device::connect(transport.clone()).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidResponse);
        assert!(transport.is_disconnected());

        let error = Device::connect(FakeTransport::new()).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::DeviceUnreachable);
    }
}
