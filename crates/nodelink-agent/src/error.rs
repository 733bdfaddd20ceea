use std::borrow::Cow;

use nodelink::codec::DecodeError;

/// All possible error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The cloud could not provide a challenge.
    ChallengeUnavailable,
    /// The device could not be reached.
    DeviceUnreachable,
    /// The device answered with an empty payload.
    NoResponse,
    /// The device answer is not the expected message.
    InvalidResponse,
    /// The device reported a failure.
    DeviceRejected,
    /// The device proof does not have the expected length.
    MalformedProof,
    /// The verification service could not be reached.
    VerificationServiceError,
    /// The verification service rejected the proof.
    VerificationRejected,
    /// The association was not confirmed in time.
    AssociationTimeout,
    /// A dataset could not be written to a border router.
    ApplyError,
    /// Data could not be decoded.
    DecodeError,
    /// Network credentials could not be transferred to the device.
    CredentialTransfer,
    /// The association request could not be submitted.
    AssociationFailed,
    /// The session was abandoned.
    SessionAbandoned,
    /// A cloud request failed.
    Cloud,
    /// A device transport operation failed.
    Transport,
    /// The border router has no active dataset.
    NotConfigured,
    /// The border router already has an active dataset.
    AlreadyConfigured,
    /// No external dataset is available.
    ExternalDatasetUnavailable,
    /// The node does not expose the required service.
    ServiceNotSupported,
    /// The node lacks the credentials to perform the operation.
    CredentialsRequired,
}

impl ErrorKind {
    pub(crate) const fn description(self) -> &'static str {
        match self {
            Self::ChallengeUnavailable => "Challenge Unavailable",
            Self::DeviceUnreachable => "Device Unreachable",
            Self::NoResponse => "No Response",
            Self::InvalidResponse => "Invalid Response",
            Self::DeviceRejected => "Device Rejected",
            Self::MalformedProof => "Malformed Proof",
            Self::VerificationServiceError => "Verification Service",
            Self::VerificationRejected => "Verification Rejected",
            Self::AssociationTimeout => "Association Timeout",
            Self::ApplyError => "Apply",
            Self::DecodeError => "Decode",
            Self::CredentialTransfer => "Credential Transfer",
            Self::AssociationFailed => "Association",
            Self::SessionAbandoned => "Session Abandoned",
            Self::Cloud => "Cloud",
            Self::Transport => "Transport",
            Self::NotConfigured => "Not Configured",
            Self::AlreadyConfigured => "Already Configured",
            Self::ExternalDatasetUnavailable => "External Dataset Unavailable",
            Self::ServiceNotSupported => "Service Not Supported",
            Self::CredentialsRequired => "Credentials Required",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.description().fmt(f)
    }
}

/// A library error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    description: Cow<'static, str>,
}

impl Error {
    /// Creates an [`Error`] from an [`ErrorKind`] and a description.
    #[must_use]
    #[inline]
    pub fn new(kind: ErrorKind, description: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }

    /// Returns the [`ErrorKind`].
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    pub(crate) fn abandoned() -> Self {
        Self::new(ErrorKind::SessionAbandoned, "The session has been abandoned")
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.description)
    }
}

impl std::error::Error for Error {}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        let kind = match e {
            DecodeError::InvalidEnvelope | DecodeError::UnexpectedPayload => {
                ErrorKind::InvalidResponse
            }
            DecodeError::DeviceRejected(_) => ErrorKind::DeviceRejected,
            DecodeError::MalformedProof(_) => ErrorKind::MalformedProof,
        };
        Self::new(kind, e.to_string())
    }
}

/// A specialized [`Result`] type for [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
