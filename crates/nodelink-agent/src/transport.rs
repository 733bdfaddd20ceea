use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;

use reqwest::header::{ACCEPT, CONTENT_TYPE};

use tracing::debug;

use crate::error::{Error, ErrorKind, Result};

/// A channel to a device under configuration.
///
/// Each message is sent to a named endpoint of the device and answered with
/// a single payload.
pub trait Transport: Send + Sync {
    /// Sends `payload` to the device endpoint at `path` and returns the
    /// device answer.
    fn send(&self, path: &str, payload: Bytes) -> impl Future<Output = Result<Bytes>> + Send;

    /// Closes the channel. Any later [`Transport::send`] fails.
    fn disconnect(&self) -> impl Future<Output = ()> + Send;
}

/// A [`Transport`] reaching a device over HTTP, as exposed by a device in
/// soft access point mode.
///
/// Messages are sent without session encryption.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    address: String,
    connected: AtomicBool,
}

impl HttpTransport {
    /// Creates an [`HttpTransport`] for a device listening at `address`,
    /// given as `host:port`.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(address: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::new(ErrorKind::Transport, format!("Http client error: {e}")))?;

        Ok(Self {
            client,
            address: address.into(),
            connected: AtomicBool::new(true),
        })
    }

    /// Whether the transport has not been disconnected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

impl Transport for HttpTransport {
    async fn send(&self, path: &str, payload: Bytes) -> Result<Bytes> {
        if !self.is_connected() {
            return Err(Error::new(
                ErrorKind::Transport,
                "The transport has been disconnected",
            ));
        }

        debug!("Sending {} bytes to endpoint `{path}`", payload.len());

        let response = self
            .client
            .post(format!("http://{}/{path}", self.address))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ACCEPT, "text/plain")
            .body(payload)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| {
                Error::new(
                    ErrorKind::Transport,
                    format!("Endpoint `{path}` unreachable: {e}"),
                )
            })?;

        response.bytes().await.map_err(|e| {
            Error::new(
                ErrorKind::Transport,
                format!("Failed to read the answer of endpoint `{path}`: {e}"),
            )
        })
    }

    async fn disconnect(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            debug!("Disconnected from device at {}", self.address);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::Router;
    use axum::body::Bytes;
    use axum::routing::post;

    use serial_test::serial;

    use crate::error::ErrorKind;

    use super::{HttpTransport, Transport};

    #[tokio::test]
    #[serial]
    async fn send_to_endpoint() {
        let app = Router::new().route(
            "/proto-ver",
            post(|body: Bytes| async move {
                assert_eq!(&body[..], b"ESP");
                r#"{"prov":{"ver":"v1.1","cap":[]}}"#
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move { axum::serve(listener, app).await });

        let transport = HttpTransport::new(address.to_string(), Duration::from_secs(5)).unwrap();
        let answer = transport
            .send("proto-ver", bytes::Bytes::from_static(b"ESP"))
            .await
            .unwrap();
        assert_eq!(&answer[..], br#"{"prov":{"ver":"v1.1","cap":[]}}"#);

        let missing = transport
            .send("prov-config", bytes::Bytes::new())
            .await
            .unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::Transport);

        transport.disconnect().await;
        assert!(!transport.is_connected());
        assert!(
            transport
                .send("proto-ver", bytes::Bytes::from_static(b"ESP"))
                .await
                .is_err()
        );
    }
}
