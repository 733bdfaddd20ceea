use alloc::string::String;
use alloc::vec::Vec;

use prost::Message;

use crate::codec::{DecodeError, DeviceStatus};
use crate::dataset::OperationalDataset;

/// Device endpoint receiving network configuration messages.
pub const CONFIG_ENDPOINT: &str = "prov-config";

mod proto {
    use alloc::string::String;
    use alloc::vec::Vec;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub(crate) enum NetMsgType {
        CmdGetStatus = 0,
        RespGetStatus = 1,
        CmdSetConfig = 2,
        RespSetConfig = 3,
        CmdApplyConfig = 4,
        RespApplyConfig = 5,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub(crate) enum NetStatus {
        Success = 0,
        InvalidSecScheme = 1,
        InvalidProto = 2,
        TooManySessions = 3,
        InvalidArgument = 4,
        InternalError = 5,
        CryptoError = 6,
        InvalidSession = 7,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub(crate) enum StationState {
        Connected = 0,
        Connecting = 1,
        Disconnected = 2,
        ConnectionFailed = 3,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub(crate) enum ConnectFailedReason {
        AuthError = 0,
        NetworkNotFound = 1,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub(crate) struct CmdGetStatus {}

    #[derive(Clone, PartialEq, prost::Message)]
    pub(crate) struct ConnectedState {
        #[prost(string, tag = "1")]
        pub(crate) address: String,
    }

    #[derive(Clone, PartialEq, prost::Oneof)]
    pub(crate) enum StateDetail {
        #[prost(enumeration = "ConnectFailedReason", tag = "10")]
        FailReason(i32),
        #[prost(message, tag = "11")]
        Connected(ConnectedState),
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub(crate) struct RespGetStatus {
        #[prost(enumeration = "NetStatus", tag = "1")]
        pub(crate) status: i32,
        #[prost(enumeration = "StationState", tag = "2")]
        pub(crate) state: i32,
        #[prost(oneof = "StateDetail", tags = "10, 11")]
        pub(crate) detail: Option<StateDetail>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub(crate) struct CmdSetConfig {
        #[prost(bytes = "vec", tag = "1")]
        pub(crate) ssid: Vec<u8>,
        #[prost(bytes = "vec", tag = "2")]
        pub(crate) passphrase: Vec<u8>,
        #[prost(bytes = "vec", tag = "5")]
        pub(crate) dataset: Vec<u8>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub(crate) struct RespStatus {
        #[prost(enumeration = "NetStatus", tag = "1")]
        pub(crate) status: i32,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub(crate) struct CmdApplyConfig {}

    #[derive(Clone, PartialEq, prost::Oneof)]
    pub(crate) enum NetBody {
        #[prost(message, tag = "10")]
        CmdGetStatus(CmdGetStatus),
        #[prost(message, tag = "11")]
        RespGetStatus(RespGetStatus),
        #[prost(message, tag = "12")]
        CmdSetConfig(CmdSetConfig),
        #[prost(message, tag = "13")]
        RespSetConfig(RespStatus),
        #[prost(message, tag = "14")]
        CmdApplyConfig(CmdApplyConfig),
        #[prost(message, tag = "15")]
        RespApplyConfig(RespStatus),
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub(crate) struct NetworkConfigPayload {
        #[prost(enumeration = "NetMsgType", tag = "1")]
        pub(crate) msg: i32,
        #[prost(oneof = "NetBody", tags = "10, 11, 12, 13, 14, 15")]
        pub(crate) payload: Option<NetBody>,
    }
}

use proto::{
    CmdApplyConfig, CmdGetStatus, CmdSetConfig, ConnectFailedReason, ConnectedState, NetBody,
    NetMsgType, NetStatus, NetworkConfigPayload, RespGetStatus, RespStatus, StateDetail,
    StationState,
};

/// Network credentials transferred to a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Wi-Fi station credentials.
    Wifi {
        /// Network name.
        ssid: String,
        /// Network passphrase. Empty for open networks.
        passphrase: String,
    },
    /// Thread operational dataset.
    Thread(OperationalDataset),
}

impl Credentials {
    /// Creates Wi-Fi [`Credentials`].
    #[must_use]
    #[inline]
    pub fn wifi(ssid: impl Into<String>, passphrase: impl Into<String>) -> Self {
        Self::Wifi {
            ssid: ssid.into(),
            passphrase: passphrase.into(),
        }
    }

    /// Creates Thread [`Credentials`].
    #[must_use]
    #[inline]
    pub const fn thread(dataset: OperationalDataset) -> Self {
        Self::Thread(dataset)
    }
}

/// Reason of a failed connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    /// The credentials were refused by the network.
    AuthError,
    /// The network could not be found.
    NetworkNotFound,
}

/// Connection state reported by a device after applying credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// The device joined the network.
    Connected {
        /// Address obtained by the device.
        address: String,
    },
    /// The device is still joining the network.
    Connecting,
    /// The device is not connected.
    Disconnected,
    /// The device could not join the network.
    Failed(FailReason),
}

/// A network configuration command, as seen by a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Report the connection state.
    GetStatus,
    /// Store the given credentials.
    SetConfig(Credentials),
    /// Apply the stored credentials.
    ApplyConfig,
}

/// A network configuration response, as produced by a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Answer to [`Command::GetStatus`].
    Status(ConnectionState),
    /// Answer to [`Command::SetConfig`].
    SetConfig(Result<(), DeviceStatus>),
    /// Answer to [`Command::ApplyConfig`].
    ApplyConfig(Result<(), DeviceStatus>),
}

fn envelope(msg: NetMsgType, payload: NetBody) -> Vec<u8> {
    NetworkConfigPayload {
        msg: msg.into(),
        payload: Some(payload),
    }
    .encode_to_vec()
}

fn decode_envelope(bytes: &[u8]) -> Result<NetBody, DecodeError> {
    NetworkConfigPayload::decode(bytes)
        .map_err(|_| DecodeError::InvalidEnvelope)?
        .payload
        .ok_or(DecodeError::UnexpectedPayload)
}

fn check_status(status: i32) -> Result<(), DecodeError> {
    let status = match NetStatus::try_from(status) {
        Ok(NetStatus::Success) => return Ok(()),
        Ok(NetStatus::InvalidArgument) => DeviceStatus::InvalidParam,
        Ok(NetStatus::InvalidSession | NetStatus::InvalidSecScheme) => DeviceStatus::InvalidState,
        Ok(_) => DeviceStatus::Fail,
        Err(_) => DeviceStatus::Unknown(status),
    };
    Err(DecodeError::DeviceRejected(status))
}

fn status_code(result: Result<(), DeviceStatus>) -> i32 {
    match result {
        Ok(()) => NetStatus::Success.into(),
        Err(DeviceStatus::Fail) => NetStatus::InternalError.into(),
        Err(DeviceStatus::InvalidParam) => NetStatus::InvalidArgument.into(),
        Err(DeviceStatus::InvalidState) => NetStatus::InvalidSession.into(),
        Err(DeviceStatus::Unknown(code)) => code,
    }
}

/// Encodes the command storing `credentials` on a device.
#[must_use]
pub fn encode_set_config(credentials: &Credentials) -> Vec<u8> {
    let command = match credentials {
        Credentials::Wifi { ssid, passphrase } => CmdSetConfig {
            ssid: ssid.as_bytes().to_vec(),
            passphrase: passphrase.as_bytes().to_vec(),
            dataset: Vec::new(),
        },
        Credentials::Thread(dataset) => CmdSetConfig {
            ssid: Vec::new(),
            passphrase: Vec::new(),
            dataset: dataset.to_bytes(),
        },
    };
    envelope(NetMsgType::CmdSetConfig, NetBody::CmdSetConfig(command))
}

/// Encodes the command applying the stored credentials on a device.
#[must_use]
pub fn encode_apply_config() -> Vec<u8> {
    envelope(
        NetMsgType::CmdApplyConfig,
        NetBody::CmdApplyConfig(CmdApplyConfig {}),
    )
}

/// Encodes the command asking a device for its connection state.
#[must_use]
pub fn encode_get_status() -> Vec<u8> {
    envelope(
        NetMsgType::CmdGetStatus,
        NetBody::CmdGetStatus(CmdGetStatus {}),
    )
}

/// Decodes the answer to [`encode_set_config`].
///
/// # Errors
///
/// Fails if the message is invalid, is not the expected answer, or reports
/// a failure.
pub fn decode_set_config(bytes: &[u8]) -> Result<(), DecodeError> {
    match decode_envelope(bytes)? {
        NetBody::RespSetConfig(RespStatus { status }) => check_status(status),
        _ => Err(DecodeError::UnexpectedPayload),
    }
}

/// Decodes the answer to [`encode_apply_config`].
///
/// # Errors
///
/// Fails if the message is invalid, is not the expected answer, or reports
/// a failure.
pub fn decode_apply_config(bytes: &[u8]) -> Result<(), DecodeError> {
    match decode_envelope(bytes)? {
        NetBody::RespApplyConfig(RespStatus { status }) => check_status(status),
        _ => Err(DecodeError::UnexpectedPayload),
    }
}

/// Decodes the answer to [`encode_get_status`].
///
/// # Errors
///
/// Fails if the message is invalid, is not the expected answer, or reports
/// a failure.
pub fn decode_get_status(bytes: &[u8]) -> Result<ConnectionState, DecodeError> {
    let NetBody::RespGetStatus(RespGetStatus {
        status,
        state,
        detail,
    }) = decode_envelope(bytes)?
    else {
        return Err(DecodeError::UnexpectedPayload);
    };
    check_status(status)?;

    let state = match StationState::try_from(state) {
        Ok(StationState::Connected) => ConnectionState::Connected {
            address: match detail {
                Some(StateDetail::Connected(ConnectedState { address })) => address,
                _ => String::new(),
            },
        },
        Ok(StationState::Connecting) => ConnectionState::Connecting,
        Ok(StationState::Disconnected) => ConnectionState::Disconnected,
        Ok(StationState::ConnectionFailed) => {
            let reason = match detail {
                Some(StateDetail::FailReason(reason)) => ConnectFailedReason::try_from(reason)
                    .map_err(|_| DecodeError::UnexpectedPayload)?,
                _ => return Err(DecodeError::UnexpectedPayload),
            };
            ConnectionState::Failed(match reason {
                ConnectFailedReason::AuthError => FailReason::AuthError,
                ConnectFailedReason::NetworkNotFound => FailReason::NetworkNotFound,
            })
        }
        Err(_) => return Err(DecodeError::UnexpectedPayload),
    };
    Ok(state)
}

/// Decodes a command received by a device.
///
/// # Errors
///
/// Fails if the message is invalid or does not carry a command.
pub fn decode_command(bytes: &[u8]) -> Result<Command, DecodeError> {
    match decode_envelope(bytes)? {
        NetBody::CmdGetStatus(_) => Ok(Command::GetStatus),
        NetBody::CmdApplyConfig(_) => Ok(Command::ApplyConfig),
        NetBody::CmdSetConfig(CmdSetConfig {
            ssid,
            passphrase,
            dataset,
        }) => {
            if dataset.is_empty() {
                let ssid = String::from_utf8(ssid).map_err(|_| DecodeError::InvalidEnvelope)?;
                let passphrase =
                    String::from_utf8(passphrase).map_err(|_| DecodeError::InvalidEnvelope)?;
                Ok(Command::SetConfig(Credentials::Wifi { ssid, passphrase }))
            } else {
                let dataset = OperationalDataset::from_bytes(&dataset)
                    .map_err(|_| DecodeError::InvalidEnvelope)?;
                Ok(Command::SetConfig(Credentials::Thread(dataset)))
            }
        }
        _ => Err(DecodeError::UnexpectedPayload),
    }
}

/// Encodes the answer of a device to a command.
#[must_use]
pub fn encode_response(response: &Response) -> Vec<u8> {
    match response {
        Response::SetConfig(result) => envelope(
            NetMsgType::RespSetConfig,
            NetBody::RespSetConfig(RespStatus {
                status: status_code(*result),
            }),
        ),
        Response::ApplyConfig(result) => envelope(
            NetMsgType::RespApplyConfig,
            NetBody::RespApplyConfig(RespStatus {
                status: status_code(*result),
            }),
        ),
        Response::Status(state) => {
            let (state, detail) = match state {
                ConnectionState::Connected { address } => (
                    StationState::Connected,
                    Some(StateDetail::Connected(ConnectedState {
                        address: address.clone(),
                    })),
                ),
                ConnectionState::Connecting => (StationState::Connecting, None),
                ConnectionState::Disconnected => (StationState::Disconnected, None),
                ConnectionState::Failed(reason) => (
                    StationState::ConnectionFailed,
                    Some(StateDetail::FailReason(match reason {
                        FailReason::AuthError => ConnectFailedReason::AuthError.into(),
                        FailReason::NetworkNotFound => {
                            ConnectFailedReason::NetworkNotFound.into()
                        }
                    })),
                ),
            };
            envelope(
                NetMsgType::RespGetStatus,
                NetBody::RespGetStatus(RespGetStatus {
                    status: NetStatus::Success.into(),
                    state: state.into(),
                    detail,
                }),
            )
        }
    }
}
