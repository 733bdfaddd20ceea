use std::time::Duration;

/// Connection settings of the cloud service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudConfig {
    pub(crate) base_url: String,
    pub(crate) token: String,
    pub(crate) timeout: Duration,
}

impl CloudConfig {
    /// Creates a [`CloudConfig`] from the base URL of the cloud API and the
    /// bearer token of the user.
    ///
    /// Requests time out after 30 seconds.
    #[must_use]
    #[inline]
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the request timeout.
    #[must_use]
    #[inline]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the base URL of the cloud API.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Timings and limits of a provisioning session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningConfig {
    pub(crate) poll_interval: Duration,
    pub(crate) poll_ceiling: u32,
    pub(crate) submission_attempts: u32,
    pub(crate) submission_retry_delay: Duration,
    pub(crate) setup_ceiling: Duration,
    pub(crate) node_status_interval: Duration,
    pub(crate) status_attempts: u32,
    pub(crate) status_interval: Duration,
    pub(crate) timezone: Option<String>,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            poll_ceiling: 120,
            submission_attempts: 5,
            submission_retry_delay: Duration::from_secs(5),
            setup_ceiling: Duration::from_secs(35),
            node_status_interval: Duration::from_secs(3),
            status_attempts: 15,
            status_interval: Duration::from_secs(2),
            timezone: None,
        }
    }
}

impl ProvisioningConfig {
    /// Creates a [`ProvisioningConfig`] with the default timings.
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the delay between two association polls.
    #[must_use]
    #[inline]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the largest number of association polls.
    #[must_use]
    #[inline]
    pub fn poll_ceiling(mut self, polls: u32) -> Self {
        self.poll_ceiling = polls;
        self
    }

    /// Sets how many times an association request is submitted before
    /// giving up. A value of zero is treated as one.
    #[must_use]
    #[inline]
    pub fn submission_attempts(mut self, attempts: u32) -> Self {
        self.submission_attempts = attempts;
        self
    }

    /// Sets the delay between two association submissions.
    #[must_use]
    #[inline]
    pub fn submission_retry_delay(mut self, delay: Duration) -> Self {
        self.submission_retry_delay = delay;
        self
    }

    /// Sets how long node setup may last before being reported as degraded.
    #[must_use]
    #[inline]
    pub fn setup_ceiling(mut self, ceiling: Duration) -> Self {
        self.setup_ceiling = ceiling;
        self
    }

    /// Sets the delay between two node connectivity queries.
    #[must_use]
    #[inline]
    pub fn node_status_interval(mut self, interval: Duration) -> Self {
        self.node_status_interval = interval;
        self
    }

    /// Sets how many times the device connection state is queried after
    /// applying credentials, and the delay between two queries.
    #[must_use]
    #[inline]
    pub fn connection_status(mut self, attempts: u32, interval: Duration) -> Self {
        self.status_attempts = attempts;
        self.status_interval = interval;
        self
    }

    /// Sets the timezone written to nodes whose timezone is not set.
    #[must_use]
    #[inline]
    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }
}
