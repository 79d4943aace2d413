//! Survey page scraping and form submission
//!
//! A submission needs two short-lived credentials taken from one rendering of
//! the survey page: the hidden `csrf_token` input and the `session` cookie.
//! Both are used once and never refreshed.

use crate::config::{ProbeConfig, StatusPolicy};
use crate::error::{ProbeError, ProbeResult};
use crate::logging::{log_debug, log_error, log_info};

use reqwest::header::{HeaderMap, HeaderValue, COOKIE, REFERER};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

/// Form field (and page input name) carrying the anti-forgery token
pub const CSRF_FIELD: &str = "csrf_token";

/// Cookie that binds a submission to the page rendering
pub const SESSION_COOKIE: &str = "session";

/// Phrase the survey endpoint returns when it accepts a submission
pub const SUCCESS_PHRASE: &str = "Survey successfully submitted";

const CSRF_SELECTOR: &str = r#"input[name="csrf_token"]"#;

/// Credentials scraped from one rendering of the survey page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyPage {
    pub csrf_token: String,
    pub session_cookie: Option<String>,
}

impl SurveyPage {
    /// Same session, different token
    pub fn with_csrf_token(&self, csrf_token: impl Into<String>) -> Self {
        Self {
            csrf_token: csrf_token.into(),
            session_cookie: self.session_cookie.clone(),
        }
    }
}

/// Ordered form answers keyed by question id (`question-0`, `question-1`, ...)
///
/// [`set`](Self::set) replaces an answer; [`append`](Self::append) adds a
/// repeated key for multi-select questions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerSet {
    entries: Vec<(String, String)>,
}

impl AnswerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, question: impl Into<String>, answer: impl Into<String>) -> &mut Self {
        let question = question.into();
        self.entries.retain(|(key, _)| *key != question);
        self.entries.push((question, answer.into()));
        self
    }

    pub fn append(&mut self, question: impl Into<String>, answer: impl Into<String>) -> &mut Self {
        self.entries.push((question.into(), answer.into()));
        self
    }

    pub fn remove(&mut self, question: &str) -> &mut Self {
        self.entries.retain(|(key, _)| key != question);
        self
    }

    pub fn get(&self, question: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == question)
            .map(|(_, answer)| answer.as_str())
    }

    /// Every answer given for `question`, in submission order
    pub fn get_all(&self, question: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(key, _)| key == question)
            .map(|(_, answer)| answer.as_str())
            .collect()
    }

    pub fn contains(&self, question: &str) -> bool {
        self.get(question).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, answer)| (key.as_str(), answer.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct questions answered, ignoring the CSRF field
    ///
    /// A multi-select question counts once however many values it carries.
    pub fn answered_questions(&self) -> usize {
        let mut seen: Vec<&str> = Vec::new();
        for (key, _) in &self.entries {
            if key != CSRF_FIELD && !seen.contains(&key.as_str()) {
                seen.push(key.as_str());
            }
        }
        seen.len()
    }

    /// Copy of these answers with the CSRF token injected
    pub fn with_csrf_token(&self, csrf_token: &str) -> Self {
        let mut form = self.clone();
        form.set(CSRF_FIELD, csrf_token);
        form
    }

    fn as_form(&self) -> &[(String, String)] {
        &self.entries
    }
}

impl<K, V> FromIterator<(K, V)> for AnswerSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut answers = Self::new();
        for (question, answer) in iter {
            answers.set(question, answer);
        }
        answers
    }
}

/// Transport-level classification of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    /// HTTP status was exactly 200
    Success,
    Failed,
}

/// What the survey endpoint returned for one submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub status: SubmissionStatus,
    pub http_status: u16,
    pub body: String,
}

impl SubmissionResult {
    pub fn from_response(http_status: u16, body: String) -> Self {
        let status = if http_status == 200 {
            SubmissionStatus::Success
        } else {
            SubmissionStatus::Failed
        };
        Self {
            status,
            http_status,
            body,
        }
    }

    /// Whether the endpoint confirmed the submission in its response body
    pub fn is_accepted(&self) -> bool {
        self.body.contains(SUCCESS_PHRASE)
    }
}

/// Read the `value` of the first `<input name="csrf_token">` in `html`
///
/// # Errors
///
/// Returns [`ProbeError::MissingElement`] if there is no such input or it has
/// no `value` attribute.
pub fn extract_csrf_token(html: &str) -> ProbeResult<String> {
    let selector = Selector::parse(CSRF_SELECTOR).map_err(|e| {
        ProbeError::response_parsing_error(format!("Invalid selector {CSRF_SELECTOR}: {e}"))
    })?;

    let document = Html::parse_document(html);
    document
        .select(&selector)
        .next()
        .and_then(|input| input.value().attr("value"))
        .map(str::to_owned)
        .ok_or_else(|| ProbeError::missing_element(CSRF_SELECTOR))
}

/// HTTP client for the survey page and its submission endpoint
#[derive(Debug, Clone)]
pub struct SurveyClient {
    client: reqwest::Client,
    status_policy: StatusPolicy,
}

impl SurveyClient {
    /// Create a survey client using the configured timeout and status policy
    pub fn new(config: &ProbeConfig) -> ProbeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                ProbeError::configuration_error(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            status_policy: config.status_policy,
        })
    }

    /// GET the survey page and scrape its CSRF token and session cookie
    ///
    /// # Errors
    ///
    /// - [`ProbeError::RequestFailed`] if the page cannot be fetched
    /// - [`ProbeError::UnexpectedStatus`] on non-2xx under [`StatusPolicy::Enforce`]
    /// - [`ProbeError::MissingElement`] if the page has no CSRF input
    pub async fn fetch_csrf_token_and_cookies(&self, survey_link: &str) -> ProbeResult<SurveyPage> {
        let response = self.client.get(survey_link).send().await.map_err(|e| {
            log_error!(
                url = %survey_link,
                error = %e,
                "Survey page request failed"
            );
            ProbeError::request_failed(
                format!("Survey page request failed: {e}"),
                Some(Box::new(e)),
            )
        })?;

        let status = response.status();
        if !status.is_success() && self.status_policy == StatusPolicy::Enforce {
            return Err(ProbeError::unexpected_status(status.as_u16(), survey_link));
        }

        let session_cookie = response
            .cookies()
            .find(|cookie| cookie.name() == SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string());

        let html = response.text().await.map_err(|e| {
            ProbeError::response_parsing_error(format!("Failed to read survey page: {e}"))
        })?;

        let csrf_token = extract_csrf_token(&html)?;

        log_debug!(
            url = %survey_link,
            status = %status,
            has_session_cookie = session_cookie.is_some(),
            "Scraped survey page credentials"
        );

        Ok(SurveyPage {
            csrf_token,
            session_cookie,
        })
    }

    /// POST `answers` plus the page's CSRF token as a form, once
    ///
    /// The caller's answer set is left untouched. A non-200 reply is reported
    /// as [`SubmissionStatus::Failed`], not as an error.
    pub async fn submit_survey(
        &self,
        survey_link: &str,
        answers: &AnswerSet,
        page: &SurveyPage,
    ) -> ProbeResult<SubmissionResult> {
        let form = answers.with_csrf_token(&page.csrf_token);
        let headers = Self::build_submission_headers(survey_link, page)?;

        let response = self
            .client
            .post(survey_link)
            .headers(headers)
            .form(form.as_form())
            .send()
            .await
            .map_err(|e| {
                log_error!(
                    url = %survey_link,
                    error = %e,
                    "Survey submission request failed"
                );
                ProbeError::request_failed(
                    format!("Survey submission failed: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        let http_status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            ProbeError::response_parsing_error(format!("Failed to read submission response: {e}"))
        })?;

        let result = SubmissionResult::from_response(http_status, body);

        log_info!(
            url = %survey_link,
            http_status = http_status,
            status = ?result.status,
            accepted = result.is_accepted(),
            answered_questions = answers.answered_questions(),
            "Survey submitted"
        );

        Ok(result)
    }

    fn build_submission_headers(survey_link: &str, page: &SurveyPage) -> ProbeResult<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert(
            REFERER,
            HeaderValue::from_str(survey_link).map_err(|e| {
                ProbeError::configuration_error(format!("Survey link is not a valid header: {e}"))
            })?,
        );

        if let Some(session) = &page.session_cookie {
            let mut cookie = HeaderValue::from_str(&format!("{SESSION_COOKIE}={session}"))
                .map_err(|e| {
                    ProbeError::response_parsing_error(format!("Invalid session cookie: {e}"))
                })?;
            cookie.set_sensitive(true);
            headers.insert(COOKIE, cookie);
        }

        Ok(headers)
    }
}
