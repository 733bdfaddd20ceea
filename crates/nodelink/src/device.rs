use alloc::string::String;
use alloc::vec::Vec;

use serde::Deserialize;

/// Device endpoint reporting the version information.
pub const VERSION_ENDPOINT: &str = "proto-ver";

/// Capability announced by a device supporting the challenge-response
/// handshake.
pub const CHALLENGE_RESPONSE_CAPABILITY: &str = "ch_resp";

/// Capability announced by a device accepting Thread credentials.
pub const THREAD_CAPABILITY: &str = "thread_prov";

#[derive(Debug, Default, Deserialize)]
struct Section {
    #[serde(default)]
    ver: Option<String>,
    #[serde(default)]
    cap: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct VersionInfo {
    #[serde(default)]
    prov: Section,
    #[serde(default)]
    rmaker: Section,
}

/// Capabilities of a device under configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    version: Option<String>,
    challenge_response: bool,
    thread: bool,
}

impl Capabilities {
    /// Creates [`Capabilities`] from explicit flags.
    #[must_use]
    pub const fn new(challenge_response: bool, thread: bool) -> Self {
        Self {
            version: None,
            challenge_response,
            thread,
        }
    }

    /// Parses the version information returned by a device on the
    /// [`VERSION_ENDPOINT`].
    ///
    /// Missing sections are treated as empty.
    ///
    /// # Errors
    ///
    /// Fails if the data is not a valid JSON object.
    pub fn from_version_info(data: &[u8]) -> Result<Self, serde_json::Error> {
        let info: VersionInfo = serde_json::from_slice(data)?;
        let has = |section: &Section, capability: &str| {
            section.cap.iter().any(|cap| cap == capability)
        };

        Ok(Self {
            challenge_response: has(&info.rmaker, CHALLENGE_RESPONSE_CAPABILITY),
            thread: has(&info.prov, THREAD_CAPABILITY),
            version: info.prov.ver,
        })
    }

    /// Whether the device supports the challenge-response handshake.
    #[must_use]
    pub const fn supports_challenge_response(&self) -> bool {
        self.challenge_response
    }

    /// Whether the device accepts Thread credentials.
    #[must_use]
    pub const fn supports_thread(&self) -> bool {
        self.thread
    }

    /// Returns the provisioning protocol version, if announced.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}
