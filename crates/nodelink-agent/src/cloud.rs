use std::future::Future;

use nodelink::node::{Node, ParamsUpdate};

use reqwest::{Client, Method, RequestBuilder, Url};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use tracing::{debug, warn};

use crate::config::CloudConfig;
use crate::error::{Error, ErrorKind, Result};

/// A challenge issued by the cloud to verify a device identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Challenge {
    /// Identifier of the verification request.
    #[serde(default)]
    pub request_id: String,
    /// Opaque challenge to be signed by the device.
    #[serde(default)]
    pub challenge: String,
}

/// A request to associate a node with a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssociationRequest {
    /// User claiming the node.
    pub user_id: String,
    /// Node being claimed.
    pub node_id: String,
    /// Secret shared with the device during the user-mapping exchange.
    pub secret_key: String,
    operation: &'static str,
}

impl AssociationRequest {
    /// Creates an [`AssociationRequest`] adding a node to a user.
    #[must_use]
    #[inline]
    pub fn new(
        user_id: impl Into<String>,
        node_id: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            node_id: node_id.into(),
            secret_key: secret_key.into(),
            operation: "add",
        }
    }
}

/// Status of a submitted association request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationStatus {
    /// The request is still being processed.
    Pending,
    /// The node has been associated.
    Confirmed,
    /// The device did not confirm the association in time.
    TimedOut,
}

impl AssociationStatus {
    /// Parses the status reported by the cloud.
    ///
    /// Any unknown status is pending.
    #[must_use]
    pub fn from_status(status: &str) -> Self {
        match status {
            "confirmed" => Self::Confirmed,
            "timedout" => Self::TimedOut,
            _ => Self::Pending,
        }
    }
}

/// The cloud service operations used by the agent.
pub trait Cloud: Send + Sync {
    /// Asks for a challenge to verify a device identity.
    fn request_challenge(&self) -> impl Future<Output = Result<Challenge>> + Send;

    /// Submits the device answer to a challenge.
    ///
    /// Returns whether the verification succeeded.
    fn verify_mapping(
        &self,
        request_id: &str,
        node_id: &str,
        challenge_response: &str,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Submits an association request and returns its identifier.
    fn submit_association(
        &self,
        request: &AssociationRequest,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Returns the status of an association request.
    fn poll_association(
        &self,
        node_id: &str,
        request_id: &str,
    ) -> impl Future<Output = Result<AssociationStatus>> + Send;

    /// Fetches the node configuration and its parameter values.
    fn fetch_node(&self, node_id: &str) -> impl Future<Output = Result<Node>> + Send;

    /// Returns whether the node is connected to the cloud.
    fn fetch_node_status(&self, node_id: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Writes node parameters.
    ///
    /// Returns whether the cloud accepted the update.
    fn update_params(
        &self,
        node_id: &str,
        update: &ParamsUpdate,
    ) -> impl Future<Output = Result<bool>> + Send;
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    request_id: &'a str,
    node_id: &'a str,
    challenge_response: &'a str,
}

#[derive(Deserialize)]
struct StatusBody {
    #[serde(default)]
    status: String,
    #[serde(default)]
    description: Option<String>,
}

impl StatusBody {
    fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }
}

#[derive(Deserialize)]
struct SubmitBody {
    #[serde(default)]
    request_id: String,
}

#[derive(Deserialize)]
struct PollBody {
    #[serde(default)]
    request_status: String,
}

#[derive(Deserialize)]
struct NodesBody {
    #[serde(default)]
    node_details: Vec<Node>,
}

#[derive(Deserialize)]
struct Connectivity {
    #[serde(default)]
    connected: bool,
}

#[derive(Deserialize)]
struct NodeStatusBody {
    connectivity: Connectivity,
}

fn cloud_error(description: impl Into<std::borrow::Cow<'static, str>>) -> Error {
    Error::new(ErrorKind::Cloud, description)
}

/// A [`Cloud`] implementation over the REST API of the cloud service.
///
/// Every request carries the bearer token of the user. The client holds no
/// per-session state and can be shared by concurrent sessions.
#[derive(Debug, Clone)]
pub struct CloudClient {
    client: Client,
    base_url: Url,
    token: String,
}

impl CloudClient {
    /// Creates a [`CloudClient`] from a [`CloudConfig`].
    ///
    /// # Errors
    ///
    /// Fails if the base URL is invalid or if the HTTP client cannot be
    /// built.
    pub fn new(config: &CloudConfig) -> Result<Self> {
        let mut base_url = config.base_url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let base_url = Url::parse(&base_url)
            .map_err(|e| cloud_error(format!("Invalid base URL `{base_url}`: {e}")))?;

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| cloud_error(format!("Http client error: {e}")))?;

        Ok(Self {
            client,
            base_url,
            token: config.token.clone(),
        })
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<RequestBuilder> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| cloud_error(format!("Invalid path `{path}`: {e}")))?;
        if !query.is_empty() {
            let _ = url.query_pairs_mut().extend_pairs(query);
        }

        debug!("{method} {url}");
        Ok(self.client.request(method, url).bearer_auth(&self.token))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| cloud_error(format!("Request failed: {e}")))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(cloud_error(format!("Server error: {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| cloud_error(format!("Json error caused by {e}")))
    }

    async fn send_checked<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| cloud_error(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let description = response
                .json::<StatusBody>()
                .await
                .ok()
                .and_then(|body| body.description)
                .unwrap_or_else(|| status.to_string());
            return Err(cloud_error(description));
        }

        response
            .json()
            .await
            .map_err(|e| cloud_error(format!("Json error caused by {e}")))
    }
}

impl Cloud for CloudClient {
    async fn request_challenge(&self) -> Result<Challenge> {
        let request = self.request(Method::POST, "user/nodes/mapping/initiate", &[])?;
        self.send_checked(request).await
    }

    async fn verify_mapping(
        &self,
        request_id: &str,
        node_id: &str,
        challenge_response: &str,
    ) -> Result<bool> {
        let request = self
            .request(Method::POST, "user/nodes/mapping/verify", &[])?
            .json(&VerifyRequest {
                request_id,
                node_id,
                challenge_response,
            });

        let body: StatusBody = self.send(request).await?;
        if !body.is_success() {
            warn!(
                "Verification of node `{node_id}` refused: {}",
                body.description.as_deref().unwrap_or(&body.status)
            );
        }
        Ok(body.is_success())
    }

    async fn submit_association(&self, request: &AssociationRequest) -> Result<String> {
        let builder = self
            .request(Method::PUT, "user/nodes/mapping", &[])?
            .json(request);

        let body: SubmitBody = self.send_checked(builder).await?;
        if body.request_id.is_empty() {
            return Err(Error::new(
                ErrorKind::AssociationFailed,
                "No request identifier returned",
            ));
        }
        Ok(body.request_id)
    }

    async fn poll_association(&self, node_id: &str, request_id: &str) -> Result<AssociationStatus> {
        let request = self.request(
            Method::GET,
            "user/nodes/mapping",
            &[("node_id", node_id), ("request_id", request_id)],
        )?;

        let body: PollBody = self.send_checked(request).await?;
        Ok(AssociationStatus::from_status(&body.request_status))
    }

    async fn fetch_node(&self, node_id: &str) -> Result<Node> {
        let request = self.request(
            Method::GET,
            "user/nodes",
            &[("node_id", node_id), ("node_details", "true")],
        )?;

        let body: NodesBody = self.send_checked(request).await?;
        body.node_details
            .into_iter()
            .find(|node| node.id() == node_id)
            .ok_or_else(|| cloud_error(format!("Node `{node_id}` not found")))
    }

    async fn fetch_node_status(&self, node_id: &str) -> Result<bool> {
        let request = self.request(Method::GET, "user/nodes/status", &[("node_id", node_id)])?;

        let body: NodeStatusBody = self.send_checked(request).await?;
        Ok(body.connectivity.connected)
    }

    async fn update_params(&self, node_id: &str, update: &ParamsUpdate) -> Result<bool> {
        let request = self
            .request(Method::PUT, "user/nodes/params", &[("node_id", node_id)])?
            .json(update);

        let body: StatusBody = self.send(request).await?;
        Ok(body.is_success())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::extract::{Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post, put};
    use axum::{Json, Router};

    use nodelink::node::ParamsUpdate;

    use serde_json::{Value, json};

    use serial_test::serial;

    use crate::config::CloudConfig;
    use crate::error::ErrorKind;

    use super::{AssociationRequest, AssociationStatus, Cloud, CloudClient};

    type Recorded = Arc<Mutex<Vec<Value>>>;

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            == Some("Bearer secret-token")
    }

    async fn mock_cloud() -> (CloudClient, Recorded) {
        let recorded = Recorded::default();

        let app = Router::new()
            .route(
                "/v1/user/nodes/mapping/initiate",
                post(|headers: HeaderMap| async move {
                    if !authorized(&headers) {
                        return (StatusCode::UNAUTHORIZED, Json(json!({"status": "failure"})));
                    }
                    (
                        StatusCode::OK,
                        Json(json!({"request_id": "req-1", "challenge": "c0ffee"})),
                    )
                }),
            )
            .route(
                "/v1/user/nodes/mapping/verify",
                post(
                    |State(recorded): State<Recorded>, Json(body): Json<Value>| async move {
                        let accepted = body["challenge_response"] == "ok";
                        recorded.lock().unwrap().push(body);
                        if accepted {
                            (StatusCode::OK, Json(json!({"status": "success"})))
                        } else {
                            (
                                StatusCode::BAD_REQUEST,
                                Json(json!({"status": "failure", "description": "bad proof"})),
                            )
                        }
                    },
                ),
            )
            .route(
                "/v1/user/nodes/mapping",
                put(
                    |State(recorded): State<Recorded>, Json(body): Json<Value>| async move {
                        recorded.lock().unwrap().push(body);
                        Json(json!({"request_id": "assoc-1", "status": "success"}))
                    },
                )
                .get(|Query(query): Query<HashMap<String, String>>| async move {
                    let status = if query.get("request_id").map(String::as_str) == Some("assoc-1") {
                        "confirmed"
                    } else {
                        "requested"
                    };
                    Json(json!({"request_status": status}))
                }),
            )
            .route(
                "/v1/user/nodes",
                get(|Query(query): Query<HashMap<String, String>>| async move {
                    let node_id = query.get("node_id").cloned().unwrap_or_default();
                    Json(json!({"node_details": [{
                        "id": node_id,
                        "config": {"services": [{
                            "name": "Time",
                            "type": "esp.service.time",
                            "params": [{"name": "TZ", "type": "esp.param.tz"}]
                        }]},
                        "params": {"Time": {"TZ": "Europe/Rome"}}
                    }]}))
                }),
            )
            .route(
                "/v1/user/nodes/status",
                get(|| async { Json(json!({"connectivity": {"connected": true}})) }),
            )
            .route(
                "/v1/user/nodes/params",
                put(
                    |State(recorded): State<Recorded>, Json(body): Json<Value>| async move {
                        recorded.lock().unwrap().push(body);
                        Json(json!({"status": "success"}))
                    },
                ),
            )
            .with_state(recorded.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move { axum::serve(listener, app).await });

        let config = CloudConfig::new(format!("http://{address}/v1"), "secret-token")
            .timeout(Duration::from_secs(5));
        (CloudClient::new(&config).unwrap(), recorded)
    }

    #[tokio::test]
    #[serial]
    async fn challenge_and_verification() {
        let (cloud, recorded) = mock_cloud().await;

        let challenge = cloud.request_challenge().await.unwrap();
        assert_eq!(challenge.request_id, "req-1");
        assert_eq!(challenge.challenge, "c0ffee");

        assert!(cloud.verify_mapping("req-1", "node-1", "ok").await.unwrap());
        assert!(!cloud.verify_mapping("req-1", "node-1", "ko").await.unwrap());

        assert_eq!(
            recorded.lock().unwrap()[0],
            json!({"request_id": "req-1", "node_id": "node-1", "challenge_response": "ok"})
        );
    }

    #[tokio::test]
    #[serial]
    async fn association() {
        let (cloud, recorded) = mock_cloud().await;

        let request_id = cloud
            .submit_association(&AssociationRequest::new("user-1", "node-1", "secret"))
            .await
            .unwrap();
        assert_eq!(request_id, "assoc-1");
        assert_eq!(
            recorded.lock().unwrap()[0],
            json!({
                "user_id": "user-1",
                "node_id": "node-1",
                "secret_key": "secret",
                "operation": "add",
            })
        );

        assert_eq!(
            cloud.poll_association("node-1", "assoc-1").await.unwrap(),
            AssociationStatus::Confirmed
        );
        assert_eq!(
            cloud.poll_association("node-1", "other").await.unwrap(),
            AssociationStatus::Pending
        );
    }

    #[tokio::test]
    #[serial]
    async fn node_queries() {
        let (cloud, recorded) = mock_cloud().await;

        let node = cloud.fetch_node("node-7").await.unwrap();
        assert_eq!(node.id(), "node-7");
        assert_eq!(node.timezone_update("Asia/Tokyo"), None);

        assert!(cloud.fetch_node_status("node-7").await.unwrap());

        let update = ParamsUpdate::new().set("Time", "TZ", "Asia/Tokyo");
        assert!(cloud.update_params("node-7", &update).await.unwrap());
        assert_eq!(
            recorded.lock().unwrap()[0],
            json!({"Time": {"TZ": "Asia/Tokyo"}})
        );
    }

    #[tokio::test]
    #[serial]
    async fn requests_are_authenticated() {
        let (cloud, _) = mock_cloud().await;
        let config = CloudConfig::new(cloud.base_url.as_str(), "wrong-token");
        let unauthorized = CloudClient::new(&config).unwrap();

        let error = unauthorized.request_challenge().await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Cloud);
    }

    #[test]
    fn unknown_association_status_is_pending() {
        assert_eq!(
            AssociationStatus::from_status("requested"),
            AssociationStatus::Pending
        );
        assert_eq!(
            AssociationStatus::from_status("timedout"),
            AssociationStatus::TimedOut
        );
    }
}
