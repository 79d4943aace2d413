//! Error types for survey probe operations.
//!
//! The main error type is [`ProbeError`], which covers every way a probe run
//! can fail before it gets to compare outcomes:
//! - Configuration errors (missing credentials, malformed URLs)
//! - Transport failures (connection refused, TLS, timeouts)
//! - Non-2xx responses from the tracking API or the survey page
//! - Malformed JSON or HTML (missing CSRF input)
//! - Scenario expectations that did not hold
//!
//! Two outcomes are deliberately *not* errors: a rejected survey submission
//! (see [`SubmissionResult`](crate::survey::SubmissionResult)) and a poll that
//! ran out of time (see [`PollOutcome`](crate::poll::PollOutcome)). Callers
//! inspect those values themselves.
//!
//! # Example
//!
//! ```rust
//! use survey_probe::{ProbeError, ProbeResult};
//! use survey_probe::error::ErrorCategory;
//!
//! fn classify(err: &ProbeError) -> &'static str {
//!     match err.category() {
//!         ErrorCategory::Client => "fix the configuration",
//!         ErrorCategory::External => "the API misbehaved",
//!         ErrorCategory::Expectation => "the API answered, but not as expected",
//!     }
//! }
//!
//! let err = ProbeError::configuration_error("API_URL is required");
//! assert_eq!(classify(&err), "fix the configuration");
//! ```

use crate::logging::{log_error, log_warn};
use thiserror::Error;

// ============================================================================
// Error categorization types
// ============================================================================

/// High-level categorization of errors for routing and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The caller can fix this (bad or missing configuration).
    Client,

    /// The external API or the network misbehaved.
    External,

    /// The API responded normally but the observed outcome was wrong.
    Expectation,
}

/// Severity level for logging decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Run cannot continue.
    Error,

    /// Unexpected but the run may still produce a useful report.
    Warning,
}

// ============================================================================
// Probe error types
// ============================================================================

/// Convenient result type for probe operations.
pub type ProbeResult<T> = std::result::Result<T, ProbeError>;

/// Errors that can occur while probing the survey API.
///
/// Use the constructor methods, which log at the appropriate level:
///
/// ```rust
/// use survey_probe::ProbeError;
///
/// let err = ProbeError::unexpected_status(503, "https://survey.example/s/abc");
/// assert!(err.is_transient());
/// ```
///
/// | Variant | Category | Transient |
/// |---------|----------|-----------|
/// | `ConfigurationError` | Client | No |
/// | `RequestFailed` | External | Yes |
/// | `UnexpectedStatus` | External | 5xx / 429 only |
/// | `ResponseParsingError` | External | No |
/// | `MissingElement` | External | No |
/// | `MissingSurveyLink` | External | No |
/// | `ExpectationFailed` | Expectation | No |
#[derive(Error, Debug)]
pub enum ProbeError {
    /// Probe configuration is invalid or incomplete.
    #[error("Probe configuration error: {message}")]
    ConfigurationError {
        /// Description of the configuration problem.
        message: String,
    },

    /// The HTTP request could not be completed.
    #[error("Request failed: {message}")]
    RequestFailed {
        /// Description of the failure.
        message: String,
        /// The underlying error, if available.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The server answered with a non-2xx status.
    #[error("Unexpected HTTP status {status} from {url}")]
    UnexpectedStatus {
        /// The HTTP status code received.
        status: u16,
        /// The URL that was requested.
        url: String,
    },

    /// A response body could not be read or decoded.
    #[error("Response parsing failed: {message}")]
    ResponseParsingError {
        /// Details about the parsing failure.
        message: String,
    },

    /// A required element was absent from the survey page.
    #[error("Element not found in survey page: {selector}")]
    MissingElement {
        /// The CSS selector that matched nothing usable.
        selector: String,
    },

    /// The tracking API returned no survey link for the customer.
    #[error("No survey link returned for customer {customer_id}")]
    MissingSurveyLink {
        /// The registered customer id that was queried.
        customer_id: String,
    },

    /// A scenario's expected outcome did not hold.
    #[error("Scenario '{scenario}' failed: {message}")]
    ExpectationFailed {
        /// Name of the scenario.
        scenario: String,
        /// What was expected versus what was observed.
        message: String,
    },
}

impl ProbeError {
    /// Get the error category for routing and reporting.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigurationError { .. } => ErrorCategory::Client,
            Self::RequestFailed { .. } => ErrorCategory::External,
            Self::UnexpectedStatus { .. } => ErrorCategory::External,
            Self::ResponseParsingError { .. } => ErrorCategory::External,
            Self::MissingElement { .. } => ErrorCategory::External,
            Self::MissingSurveyLink { .. } => ErrorCategory::External,
            Self::ExpectationFailed { .. } => ErrorCategory::Expectation,
        }
    }

    /// Get the error severity for logging.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::ConfigurationError { .. } => ErrorSeverity::Error,
            Self::RequestFailed { .. } => ErrorSeverity::Error,
            Self::UnexpectedStatus { .. } => ErrorSeverity::Error,
            Self::ResponseParsingError { .. } => ErrorSeverity::Warning,
            Self::MissingElement { .. } => ErrorSeverity::Warning,
            Self::MissingSurveyLink { .. } => ErrorSeverity::Error,
            Self::ExpectationFailed { .. } => ErrorSeverity::Error,
        }
    }

    /// Whether re-running the probe later might succeed.
    ///
    /// Nothing in this crate retries on its own; this only informs reports.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestFailed { .. } => true,
            Self::UnexpectedStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    // =========================================================================
    // Constructor methods with automatic logging
    // =========================================================================

    pub fn configuration_error(message: impl Into<String>) -> Self {
        let message = message.into();
        log_error!(
            error_type = "configuration_error",
            message = %message,
            "Probe configuration validation failed"
        );
        Self::ConfigurationError { message }
    }

    pub fn request_failed(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        let message = message.into();
        log_error!(
            error_type = "request_failed",
            message = %message,
            has_source = source.is_some(),
            "HTTP request execution failed"
        );
        Self::RequestFailed { message, source }
    }

    pub fn unexpected_status(status: u16, url: impl Into<String>) -> Self {
        let url = url.into();
        log_error!(
            error_type = "unexpected_status",
            status = status,
            url = %url,
            "Server returned non-success status"
        );
        Self::UnexpectedStatus { status, url }
    }

    pub fn response_parsing_error(message: impl Into<String>) -> Self {
        let message = message.into();
        log_warn!(
            error_type = "response_parsing_error",
            message = %message,
            "Response body invalid"
        );
        Self::ResponseParsingError { message }
    }

    pub fn missing_element(selector: impl Into<String>) -> Self {
        let selector = selector.into();
        log_warn!(
            error_type = "missing_element",
            selector = %selector,
            "Survey page is missing a required element"
        );
        Self::MissingElement { selector }
    }

    pub fn missing_survey_link(customer_id: impl Into<String>) -> Self {
        let customer_id = customer_id.into();
        log_error!(
            error_type = "missing_survey_link",
            customer_id = %customer_id,
            "Tracking API returned no survey link"
        );
        Self::MissingSurveyLink { customer_id }
    }

    pub fn expectation_failed(scenario: impl Into<String>, message: impl Into<String>) -> Self {
        let scenario = scenario.into();
        let message = message.into();
        log_error!(
            error_type = "expectation_failed",
            scenario = %scenario,
            message = %message,
            "Scenario expectation did not hold"
        );
        Self::ExpectationFailed { scenario, message }
    }
}
