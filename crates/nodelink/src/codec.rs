use alloc::string::String;
use alloc::vec::Vec;

use prost::Message;

/// Device endpoint receiving challenge-response messages.
pub const CHALLENGE_RESPONSE_ENDPOINT: &str = "ch_resp";

/// Device endpoint receiving user-mapping messages.
pub const USER_MAPPING_ENDPOINT: &str = "cloud_user_assoc";

/// Length in bytes of the proof computed by a device over a challenge.
pub const PROOF_LENGTH: usize = 256;

// Protobuf messages as exchanged on the wire. They are kept private so that
// callers only deal with validated values.
mod proto {
    use alloc::string::String;
    use alloc::vec::Vec;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub(crate) enum MiscMsgType {
        CmdChallengeResponse = 0,
        RespChallengeResponse = 1,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub(crate) enum MiscStatus {
        Success = 0,
        Fail = 1,
        InvalidParam = 2,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub(crate) struct CmdCrPayload {
        #[prost(bytes = "vec", tag = "1")]
        pub(crate) payload: Vec<u8>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub(crate) struct RespCrPayload {
        #[prost(bytes = "vec", tag = "1")]
        pub(crate) payload: Vec<u8>,
        #[prost(string, tag = "2")]
        pub(crate) node_id: String,
    }

    #[derive(Clone, PartialEq, prost::Oneof)]
    pub(crate) enum MiscBody {
        #[prost(message, tag = "10")]
        CmdChallengeResponse(CmdCrPayload),
        #[prost(message, tag = "11")]
        RespChallengeResponse(RespCrPayload),
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub(crate) struct MiscPayload {
        #[prost(enumeration = "MiscMsgType", tag = "1")]
        pub(crate) msg: i32,
        #[prost(enumeration = "MiscStatus", tag = "2")]
        pub(crate) status: i32,
        #[prost(oneof = "MiscBody", tags = "10, 11")]
        pub(crate) payload: Option<MiscBody>,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub(crate) enum ConfigMsgType {
        CmdSetUserMapping = 0,
        RespSetUserMapping = 1,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub(crate) enum ConfigStatus {
        Success = 0,
        InvalidParam = 1,
        InvalidState = 2,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub(crate) struct CmdSetUserMapping {
        #[prost(string, tag = "1")]
        pub(crate) user_id: String,
        #[prost(string, tag = "2")]
        pub(crate) secret_key: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub(crate) struct RespSetUserMapping {
        #[prost(enumeration = "ConfigStatus", tag = "1")]
        pub(crate) status: i32,
        #[prost(string, tag = "2")]
        pub(crate) node_id: String,
    }

    #[derive(Clone, PartialEq, prost::Oneof)]
    pub(crate) enum ConfigBody {
        #[prost(message, tag = "10")]
        CmdSetUserMapping(CmdSetUserMapping),
        #[prost(message, tag = "11")]
        RespSetUserMapping(RespSetUserMapping),
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub(crate) struct ConfigPayload {
        #[prost(enumeration = "ConfigMsgType", tag = "1")]
        pub(crate) msg: i32,
        #[prost(oneof = "ConfigBody", tags = "10, 11")]
        pub(crate) payload: Option<ConfigBody>,
    }
}

use proto::{
    CmdCrPayload, CmdSetUserMapping, ConfigBody, ConfigMsgType, ConfigPayload, ConfigStatus,
    MiscBody, MiscMsgType, MiscPayload, MiscStatus, RespCrPayload, RespSetUserMapping,
};

/// A non-success status reported by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// The device failed to process the request.
    Fail,
    /// The request carried an invalid parameter.
    InvalidParam,
    /// The device is not in a state where it can process the request.
    InvalidState,
    /// A status code unknown to this crate.
    Unknown(i32),
}

impl core::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Fail => "fail".fmt(f),
            Self::InvalidParam => "invalid parameter".fmt(f),
            Self::InvalidState => "invalid state".fmt(f),
            Self::Unknown(code) => write!(f, "unknown status {code}"),
        }
    }
}

/// Errors produced while decoding a device message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The envelope is not a valid protobuf message.
    InvalidEnvelope,
    /// The device answered with a non-success status.
    DeviceRejected(DeviceStatus),
    /// The envelope does not carry the expected payload variant.
    UnexpectedPayload,
    /// The proof does not have the expected length. The actual length is
    /// reported.
    MalformedProof(usize),
}

impl core::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidEnvelope => "invalid message envelope".fmt(f),
            Self::DeviceRejected(status) => write!(f, "device returned error status: {status}"),
            Self::UnexpectedPayload => "unexpected payload variant".fmt(f),
            Self::MalformedProof(len) => {
                write!(f, "invalid proof length: {len}, expected: {PROOF_LENGTH}")
            }
        }
    }
}

impl core::error::Error for DecodeError {}

/// The answer of a device to a challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeResponse {
    proof: [u8; PROOF_LENGTH],
    node_id: String,
}

impl ChallengeResponse {
    /// Returns the proof computed by the device.
    #[must_use]
    pub const fn proof(&self) -> &[u8; PROOF_LENGTH] {
        &self.proof
    }

    /// Returns the node identifier claimed by the device.
    ///
    /// The identifier is **not** trusted until the cloud verifies the proof.
    #[must_use]
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Returns the proof as a lowercase hex string.
    #[must_use]
    #[inline]
    pub fn proof_hex(&self) -> String {
        bytes_to_hex(&self.proof)
    }
}

/// Renders each byte as exactly two lowercase hex characters.
///
/// # Panics
///
/// Panics if the produced string is not twice as long as the input, which
/// would be an internal consistency fault.
#[must_use]
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    let hex = hex::encode(bytes);
    assert_eq!(
        hex.len(),
        2 * bytes.len(),
        "hex rendering must produce two characters per byte"
    );
    hex
}

/// Encodes the message transmitting a cloud challenge to a device.
#[must_use]
pub fn encode_challenge_request(challenge: &str) -> Vec<u8> {
    MiscPayload {
        msg: MiscMsgType::CmdChallengeResponse.into(),
        status: MiscStatus::Success.into(),
        payload: Some(MiscBody::CmdChallengeResponse(CmdCrPayload {
            payload: challenge.as_bytes().to_vec(),
        })),
    }
    .encode_to_vec()
}

/// Decodes the answer of a device to a challenge.
///
/// # Errors
///
/// - [`DecodeError::InvalidEnvelope`] if the bytes are not a valid message
/// - [`DecodeError::DeviceRejected`] if the device reports a failure
/// - [`DecodeError::UnexpectedPayload`] if the message does not carry a
///   challenge response
/// - [`DecodeError::MalformedProof`] if the proof is not exactly
///   [`PROOF_LENGTH`] bytes long
pub fn decode_challenge_response(bytes: &[u8]) -> Result<ChallengeResponse, DecodeError> {
    let envelope = MiscPayload::decode(bytes).map_err(|_| DecodeError::InvalidEnvelope)?;

    match MiscStatus::try_from(envelope.status) {
        Ok(MiscStatus::Success) => {}
        Ok(MiscStatus::Fail) => return Err(DecodeError::DeviceRejected(DeviceStatus::Fail)),
        Ok(MiscStatus::InvalidParam) => {
            return Err(DecodeError::DeviceRejected(DeviceStatus::InvalidParam));
        }
        Err(_) => {
            return Err(DecodeError::DeviceRejected(DeviceStatus::Unknown(
                envelope.status,
            )));
        }
    }

    let Some(MiscBody::RespChallengeResponse(RespCrPayload { payload, node_id })) =
        envelope.payload
    else {
        return Err(DecodeError::UnexpectedPayload);
    };

    let proof: [u8; PROOF_LENGTH] = payload
        .as_slice()
        .try_into()
        .map_err(|_| DecodeError::MalformedProof(payload.len()))?;

    Ok(ChallengeResponse { proof, node_id })
}

/// Decodes a challenge received by a device.
///
/// # Errors
///
/// Fails when the bytes are not a valid envelope or do not carry a
/// challenge.
pub fn decode_challenge_request(bytes: &[u8]) -> Result<String, DecodeError> {
    let envelope = MiscPayload::decode(bytes).map_err(|_| DecodeError::InvalidEnvelope)?;
    let Some(MiscBody::CmdChallengeResponse(CmdCrPayload { payload })) = envelope.payload else {
        return Err(DecodeError::UnexpectedPayload);
    };
    String::from_utf8(payload).map_err(|_| DecodeError::InvalidEnvelope)
}

/// Encodes the answer of a device to a challenge.
///
/// The proof is written as is, so a firmware under test can produce
/// malformed answers.
#[must_use]
pub fn encode_challenge_response(proof: &[u8], node_id: &str) -> Vec<u8> {
    MiscPayload {
        msg: MiscMsgType::RespChallengeResponse.into(),
        status: MiscStatus::Success.into(),
        payload: Some(MiscBody::RespChallengeResponse(RespCrPayload {
            payload: proof.to_vec(),
            node_id: node_id.into(),
        })),
    }
    .encode_to_vec()
}

/// Encodes a challenge-response failure reported by a device.
#[must_use]
pub fn encode_challenge_failure(status: DeviceStatus) -> Vec<u8> {
    let status = match status {
        DeviceStatus::Fail | DeviceStatus::InvalidState => MiscStatus::Fail.into(),
        DeviceStatus::InvalidParam => MiscStatus::InvalidParam.into(),
        DeviceStatus::Unknown(code) => code,
    };
    MiscPayload {
        msg: MiscMsgType::RespChallengeResponse.into(),
        status,
        payload: None,
    }
    .encode_to_vec()
}

/// Encodes the message asking a device to map itself to a user.
#[must_use]
pub fn encode_user_mapping(user_id: &str, secret_key: &str) -> Vec<u8> {
    ConfigPayload {
        msg: ConfigMsgType::CmdSetUserMapping.into(),
        payload: Some(ConfigBody::CmdSetUserMapping(CmdSetUserMapping {
            user_id: user_id.into(),
            secret_key: secret_key.into(),
        })),
    }
    .encode_to_vec()
}

/// Decodes the answer of a device to a user-mapping request and returns the
/// node identifier of the device.
///
/// # Errors
///
/// - [`DecodeError::InvalidEnvelope`] if the bytes are not a valid message
/// - [`DecodeError::UnexpectedPayload`] if the message is not a user-mapping
///   response
/// - [`DecodeError::DeviceRejected`] if the device reports a failure
pub fn decode_user_mapping(bytes: &[u8]) -> Result<String, DecodeError> {
    let envelope = ConfigPayload::decode(bytes).map_err(|_| DecodeError::InvalidEnvelope)?;

    let Some(ConfigBody::RespSetUserMapping(RespSetUserMapping { status, node_id })) =
        envelope.payload
    else {
        return Err(DecodeError::UnexpectedPayload);
    };

    match ConfigStatus::try_from(status) {
        Ok(ConfigStatus::Success) => Ok(node_id),
        Ok(ConfigStatus::InvalidParam) => Err(DecodeError::DeviceRejected(
            DeviceStatus::InvalidParam,
        )),
        Ok(ConfigStatus::InvalidState) => Err(DecodeError::DeviceRejected(
            DeviceStatus::InvalidState,
        )),
        Err(_) => Err(DecodeError::DeviceRejected(DeviceStatus::Unknown(status))),
    }
}

/// Decodes a user-mapping request received by a device, returning the user
/// identifier and the secret key.
///
/// # Errors
///
/// Fails when the bytes are not a valid envelope or do not carry a
/// user-mapping request.
pub fn decode_user_mapping_request(bytes: &[u8]) -> Result<(String, String), DecodeError> {
    let envelope = ConfigPayload::decode(bytes).map_err(|_| DecodeError::InvalidEnvelope)?;
    let Some(ConfigBody::CmdSetUserMapping(CmdSetUserMapping {
        user_id,
        secret_key,
    })) = envelope.payload
    else {
        return Err(DecodeError::UnexpectedPayload);
    };
    Ok((user_id, secret_key))
}

/// Encodes the answer of a device to a user-mapping request.
#[must_use]
pub fn encode_user_mapping_response(node_id: &str) -> Vec<u8> {
    ConfigPayload {
        msg: ConfigMsgType::RespSetUserMapping.into(),
        payload: Some(ConfigBody::RespSetUserMapping(RespSetUserMapping {
            status: ConfigStatus::Success.into(),
            node_id: node_id.into(),
        })),
    }
    .encode_to_vec()
}
