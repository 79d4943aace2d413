//! # survey-probe
//!
//! End-to-end probe for a survey-and-analytics API.
//!
//! For one registered customer the probe fetches a personalized survey link,
//! scrapes the CSRF token and session cookie from the survey page, submits
//! answers, and polls the customer's tracked-event log until the submission's
//! events appear.
//!
//! ## Key Features
//!
//! - **Explicit configuration**: credentials and customer id resolved once via
//!   [`ProbeConfig::from_env`], never hardcoded
//! - **Strict or lenient transport**: [`StatusPolicy`] decides whether non-2xx
//!   responses raise
//! - **Tagged polling**: [`poll_until`] returns [`PollOutcome::Converged`] or
//!   [`PollOutcome::TimedOut`] instead of overloading its return value
//! - **Built-in scenarios**: full, minimal, missing-required, forged-CSRF,
//!   music-genre multi-select and free-text variations
//!
//! ## Example
//!
//! ```rust,no_run
//! use survey_probe::{Scenario, SurveyProbe};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let probe = SurveyProbe::from_env()?;
//! let report = probe.run_and_verify(&Scenario::full_response()).await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

// Allow missing errors documentation - errors are self-documenting via type signatures
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod error;
pub mod logging;
pub mod poll;
pub mod scenario;
pub mod survey;
pub mod tracking;

#[cfg(test)]
pub mod tests;

// Re-export main types
pub use config::{ProbeConfig, StatusPolicy};
pub use error::{ErrorCategory, ErrorSeverity, ProbeError, ProbeResult};
pub use poll::{poll_until, PollOutcome, PollPolicy};
pub use scenario::{
    CsrfSource, Expectation, Scenario, ScenarioReport, SurveyFixture, SurveyProbe,
    GENRE_QUESTION, MUSIC_GENRES,
};
pub use survey::{
    extract_csrf_token, AnswerSet, SubmissionResult, SubmissionStatus, SurveyClient, SurveyPage,
    SUCCESS_PHRASE,
};
pub use tracking::{wait_for_events, CustomerExport, EventLog, TrackedEvent, TrackingClient};
