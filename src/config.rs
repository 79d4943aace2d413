use crate::error::{ProbeError, ProbeResult};
use crate::logging::log_debug;
use crate::poll::PollPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const ENV_API_URL: &str = "API_URL";
pub const ENV_API_KEY_ID: &str = "API_KEY_ID";
pub const ENV_API_KEY_SECRET: &str = "API_KEY_SECRET";
pub const ENV_CUSTOMER_ID: &str = "CUSTOMER_ID";
pub const ENV_POLL_TIMEOUT_SECS: &str = "SURVEY_POLL_TIMEOUT_SECS";
pub const ENV_POLL_INTERVAL_SECS: &str = "SURVEY_POLL_INTERVAL_SECS";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "SURVEY_REQUEST_TIMEOUT_SECS";
pub const ENV_STATUS_POLICY: &str = "SURVEY_STATUS_POLICY";

/// How non-2xx responses from the tracking API and survey page are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusPolicy {
    /// Non-2xx raises [`ProbeError::UnexpectedStatus`]
    #[default]
    Enforce,
    /// Non-2xx is ignored and the body is parsed on a best-effort basis
    Ignore,
}

impl StatusPolicy {
    pub fn parse(value: &str) -> ProbeResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "enforce" => Ok(Self::Enforce),
            "ignore" => Ok(Self::Ignore),
            other => Err(ProbeError::configuration_error(format!(
                "Unsupported status policy: {other}. Supported policies: enforce, ignore"
            ))),
        }
    }
}

impl fmt::Display for StatusPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusPolicy::Enforce => write!(f, "enforce"),
            StatusPolicy::Ignore => write!(f, "ignore"),
        }
    }
}

/// Everything a probe run needs to reach the API, resolved once per run
#[derive(Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Full URL of the customer export-one endpoint
    pub api_url: String,
    pub api_key_id: String,
    #[serde(skip_serializing)]
    pub api_key_secret: String,
    /// Registered customer id whose survey link and event log are used
    pub customer_id: String,
    pub poll_policy: PollPolicy,
    /// Per-request timeout applied to every HTTP call
    pub request_timeout: Duration,
    pub status_policy: StatusPolicy,
}

impl fmt::Debug for ProbeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeConfig")
            .field("api_url", &self.api_url)
            .field("api_key_id", &self.api_key_id)
            .field("api_key_secret", &"<redacted>")
            .field("customer_id", &self.customer_id)
            .field("poll_policy", &self.poll_policy)
            .field("request_timeout", &self.request_timeout)
            .field("status_policy", &self.status_policy)
            .finish()
    }
}

impl ProbeConfig {
    /// Build a configuration with default polling, timeout and status policy
    pub fn new(
        api_url: impl Into<String>,
        api_key_id: impl Into<String>,
        api_key_secret: impl Into<String>,
        customer_id: impl Into<String>,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            api_key_id: api_key_id.into(),
            api_key_secret: api_key_secret.into(),
            customer_id: customer_id.into(),
            poll_policy: PollPolicy::default(),
            request_timeout: Duration::from_secs(30),
            status_policy: StatusPolicy::default(),
        }
    }

    pub fn with_poll_policy(mut self, poll_policy: PollPolicy) -> Self {
        self.poll_policy = poll_policy;
        self
    }

    pub fn with_status_policy(mut self, status_policy: StatusPolicy) -> Self {
        self.status_policy = status_policy;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Validate the configuration is complete
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::ConfigurationError`] if:
    /// - Any credential or the customer id is empty
    /// - `api_url` is not an absolute http(s) URL
    /// - The poll interval is zero
    pub fn validate(&self) -> ProbeResult<()> {
        let empty: Vec<&str> = [
            (ENV_API_URL, &self.api_url),
            (ENV_API_KEY_ID, &self.api_key_id),
            (ENV_API_KEY_SECRET, &self.api_key_secret),
            (ENV_CUSTOMER_ID, &self.customer_id),
        ]
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();

        if !empty.is_empty() {
            return Err(ProbeError::configuration_error(format!(
                "Missing required settings: {}",
                empty.join(", ")
            )));
        }

        let parsed = url::Url::parse(&self.api_url).map_err(|e| {
            ProbeError::configuration_error(format!("Invalid API URL '{}': {e}", self.api_url))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ProbeError::configuration_error(format!(
                "API URL must use http or https, got '{}'",
                parsed.scheme()
            )));
        }

        if self.poll_policy.interval.is_zero() {
            return Err(ProbeError::configuration_error(
                "Poll interval must be greater than zero",
            ));
        }

        Ok(())
    }

    /// Load configuration from environment variables
    /// This is the ONLY method that should access environment variables
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::ConfigurationError`] if:
    /// - `API_URL`, `API_KEY_ID`, `API_KEY_SECRET` or `CUSTOMER_ID` is unset
    /// - An optional tuning variable holds an unparseable value
    /// - The assembled configuration fails [`validate`](Self::validate)
    pub fn from_env() -> ProbeResult<Self> {
        log_debug!("Loading probe configuration from environment");

        let mut missing = Vec::new();
        let mut required = |name: &'static str| match std::env::var(name) {
            Ok(value) if !value.trim().is_empty() => value,
            _ => {
                missing.push(name);
                String::new()
            }
        };

        let api_url = required(ENV_API_URL);
        let api_key_id = required(ENV_API_KEY_ID);
        let api_key_secret = required(ENV_API_KEY_SECRET);
        let customer_id = required(ENV_CUSTOMER_ID);

        if !missing.is_empty() {
            return Err(ProbeError::configuration_error(format!(
                "Missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let mut config = Self::new(api_url, api_key_id, api_key_secret, customer_id);

        if let Some(secs) = Self::env_secs(ENV_POLL_TIMEOUT_SECS)? {
            config.poll_policy.timeout = secs;
        }
        if let Some(secs) = Self::env_secs(ENV_POLL_INTERVAL_SECS)? {
            config.poll_policy.interval = secs;
        }
        if let Some(secs) = Self::env_secs(ENV_REQUEST_TIMEOUT_SECS)? {
            config.request_timeout = secs;
        }
        if let Ok(policy) = std::env::var(ENV_STATUS_POLICY) {
            config.status_policy = StatusPolicy::parse(&policy)?;
        }

        config.validate()?;

        log_debug!(
            api_url = %config.api_url,
            customer_id = %config.customer_id,
            poll_timeout_secs = config.poll_policy.timeout.as_secs_f64(),
            poll_interval_secs = config.poll_policy.interval.as_secs_f64(),
            status_policy = %config.status_policy,
            "Probe configuration loaded and validated"
        );

        Ok(config)
    }

    /// Parse an optional whole-or-fractional seconds variable
    ///
    /// Negative, non-finite and out-of-range values are configuration errors.
    fn env_secs(name: &str) -> ProbeResult<Option<Duration>> {
        let Ok(raw) = std::env::var(name) else {
            return Ok(None);
        };

        raw.trim()
            .parse::<f64>()
            .ok()
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .map(Some)
            .ok_or_else(|| {
                ProbeError::configuration_error(format!(
                    "{name} must be a non-negative number of seconds, got '{raw}'"
                ))
            })
    }
}
