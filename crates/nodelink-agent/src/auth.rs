use bytes::Bytes;

use nodelink::codec::{
    CHALLENGE_RESPONSE_ENDPOINT, PROOF_LENGTH, decode_challenge_response, encode_challenge_request,
};

use tracing::{debug, error};

use crate::cloud::Cloud;
use crate::error::{Error, ErrorKind, Result};
use crate::transport::Transport;

/// States of a challenge-response authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Nothing has been done yet.
    Idle,
    /// A challenge has been obtained from the cloud.
    ChallengeRequested,
    /// The challenge has been delivered to the device.
    ChallengeSent,
    /// The device proof has been received and decoded.
    ResponseReceived,
    /// The cloud verified the proof.
    Verified,
    /// The authentication failed.
    Failed,
}

/// Proves the identity of a device to the cloud.
///
/// The cloud issues a challenge, the device signs it and the cloud verifies
/// the signature against the node identifier claimed by the device. No step
/// is retried.
#[derive(Debug)]
pub struct Authenticator<'cloud, C: Cloud> {
    cloud: &'cloud C,
    state: AuthState,
}

impl<'cloud, C: Cloud> Authenticator<'cloud, C> {
    /// Creates an [`Authenticator`] in the [`AuthState::Idle`] state.
    #[must_use]
    #[inline]
    pub const fn new(cloud: &'cloud C) -> Self {
        Self {
            cloud,
            state: AuthState::Idle,
        }
    }

    /// Returns the current [`AuthState`].
    #[must_use]
    pub const fn state(&self) -> AuthState {
        self.state
    }

    /// Runs the authentication against the device reachable through
    /// `transport` and returns the verified node identifier.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::ChallengeUnavailable`] if the cloud does not issue a
    ///   challenge
    /// - [`ErrorKind::DeviceUnreachable`] if the challenge cannot be delivered
    /// - [`ErrorKind::NoResponse`] if the device answers with nothing
    /// - [`ErrorKind::InvalidResponse`], [`ErrorKind::DeviceRejected`] or
    ///   [`ErrorKind::MalformedProof`] if the device answer is not a valid
    ///   proof
    /// - [`ErrorKind::VerificationServiceError`] if the verification cannot
    ///   be submitted
    /// - [`ErrorKind::VerificationRejected`] if the cloud refuses the proof
    pub async fn authenticate<T: Transport>(&mut self, transport: &T) -> Result<String> {
        match self.run(transport).await {
            Ok(node_id) => {
                self.transition(AuthState::Verified);
                Ok(node_id)
            }
            Err(e) => {
                error!("Device authentication failed: {e}");
                self.transition(AuthState::Failed);
                Err(e)
            }
        }
    }

    async fn run<T: Transport>(&mut self, transport: &T) -> Result<String> {
        let challenge = self.cloud.request_challenge().await.map_err(|e| {
            Error::new(
                ErrorKind::ChallengeUnavailable,
                format!("Challenge request failed: {}", e.description()),
            )
        })?;
        if challenge.challenge.is_empty() || challenge.request_id.is_empty() {
            return Err(Error::new(
                ErrorKind::ChallengeUnavailable,
                "The cloud returned no challenge",
            ));
        }
        self.transition(AuthState::ChallengeRequested);

        let answer = transport
            .send(
                CHALLENGE_RESPONSE_ENDPOINT,
                Bytes::from(encode_challenge_request(&challenge.challenge)),
            )
            .await
            .map_err(|e| Error::new(ErrorKind::DeviceUnreachable, e.description().to_owned()))?;
        self.transition(AuthState::ChallengeSent);

        if answer.is_empty() {
            return Err(Error::new(
                ErrorKind::NoResponse,
                "The device answered with an empty payload",
            ));
        }

        let response = decode_challenge_response(&answer)?;
        self.transition(AuthState::ResponseReceived);

        let proof = response.proof_hex();
        if proof.len() != 2 * PROOF_LENGTH {
            return Err(Error::new(
                ErrorKind::MalformedProof,
                format!("Hex proof of {} characters", proof.len()),
            ));
        }

        let verified = self
            .cloud
            .verify_mapping(&challenge.request_id, response.node_id(), &proof)
            .await
            .map_err(|e| {
                Error::new(
                    ErrorKind::VerificationServiceError,
                    e.description().to_owned(),
                )
            })?;
        if !verified {
            return Err(Error::new(
                ErrorKind::VerificationRejected,
                format!("The proof of node `{}` was refused", response.node_id()),
            ));
        }

        Ok(response.node_id().to_owned())
    }

    fn transition(&mut self, state: AuthState) {
        debug!("Authentication state: {:?} -> {state:?}", self.state);
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use nodelink::codec::{DeviceStatus, encode_challenge_failure, encode_challenge_response};

    use crate::cloud::Challenge;
    use crate::error::ErrorKind;
    use crate::tests::{FakeCloud, FakeTransport};

    use super::{AuthState, Authenticator};

    fn device_with_proof(len: usize) -> FakeTransport {
        FakeTransport::new().reply("ch_resp", &encode_challenge_response(&vec![7; len], "node-1"))
    }

    #[tokio::test]
    async fn verified_node_id() {
        let cloud = FakeCloud::new();
        let transport = device_with_proof(256);

        let mut authenticator = Authenticator::new(&cloud);
        assert_eq!(authenticator.state(), AuthState::Idle);
        assert_eq!(
            authenticator.authenticate(&transport).await.unwrap(),
            "node-1"
        );
        assert_eq!(authenticator.state(), AuthState::Verified);

        let verification = cloud.verifications();
        assert_eq!(verification.len(), 1);
        assert_eq!(verification[0].0, "req-1");
        assert_eq!(verification[0].1, "node-1");
        assert_eq!(verification[0].2, "07".repeat(256));

        // The challenge is delivered as the request payload.
        assert_eq!(
            nodelink::codec::decode_challenge_request(&transport.sent("ch_resp")[0]).unwrap(),
            "c0ffee"
        );
    }

    #[tokio::test]
    async fn short_proof_is_not_verified() {
        let cloud = FakeCloud::new();
        let mut authenticator = Authenticator::new(&cloud);

        let error = authenticator
            .authenticate(&device_with_proof(200))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::MalformedProof);
        assert_eq!(authenticator.state(), AuthState::Failed);
        assert!(cloud.verifications().is_empty());
    }

    #[tokio::test]
    async fn missing_challenge() {
        let cloud = FakeCloud::new().challenge(Challenge {
            request_id: "req-1".into(),
            challenge: String::new(),
        });
        let transport = device_with_proof(256);

        let error = Authenticator::new(&cloud)
            .authenticate(&transport)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ChallengeUnavailable);
        assert!(transport.sent("ch_resp").is_empty());
    }

    #[tokio::test]
    async fn device_failures() {
        let cloud = FakeCloud::new();

        let error = Authenticator::new(&cloud)
            .authenticate(&FakeTransport::new())
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::DeviceUnreachable);

        let silent = FakeTransport::new().reply("ch_resp", b"");
        let error = Authenticator::new(&cloud)
            .authenticate(&silent)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NoResponse);

        let rejecting =
            FakeTransport::new().reply("ch_resp", &encode_challenge_failure(DeviceStatus::Fail));
        let error = Authenticator::new(&cloud)
            .authenticate(&rejecting)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::DeviceRejected);

        let garbage = FakeTransport::new().reply("ch_resp", &[0xff, 0xff, 0xff]);
        let error = Authenticator::new(&cloud)
            .authenticate(&garbage)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidResponse);
    }

    #[tokio::test]
    async fn verification_outcomes() {
        let refusing = FakeCloud::new().refuse_verification();
        let error = Authenticator::new(&refusing)
            .authenticate(&device_with_proof(256))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::VerificationRejected);

        let unreachable = FakeCloud::new().fail_verification();
        let error = Authenticator::new(&unreachable)
            .authenticate(&device_with_proof(256))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::VerificationServiceError);
    }
}
