//! Tracking API client: survey link lookup and tracked-event log reads
//!
//! Both calls go to the same customer export endpoint. The survey link is
//! requested as a customer property; the event log is the `events` array of
//! a plain export.

use crate::config::{ProbeConfig, StatusPolicy};
use crate::error::{ProbeError, ProbeResult};
use crate::logging::{log_debug, log_error, log_warn};
use crate::poll::{poll_until, PollOutcome, PollPolicy};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Customer property holding the personalized survey URL
pub const SURVEY_LINK_PROPERTY: &str = "survey link";

/// Event type emitted for each processed survey answer
pub const SURVEY_EVENT_TYPE: &str = "survey";

/// Properties every survey event must carry
pub const REQUIRED_EVENT_PROPERTIES: [&str; 6] = [
    "answer",
    "question",
    "question_id",
    "question_index",
    "survey_id",
    "survey_name",
];

/// One record from the customer's tracked-event log
///
/// Fields are kept as raw JSON so that any entry in the log decodes, however
/// malformed. Only the newest events of a run are held to the survey shape;
/// see [`survey_shape_violations`](Self::survey_shape_violations).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackedEvent {
    #[serde(rename = "type", default, skip_serializing_if = "Value::is_null")]
    pub event_type: Value,
    /// Seconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub timestamp: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub properties: Value,
}

impl TrackedEvent {
    pub fn event_type(&self) -> Option<&str> {
        self.event_type.as_str()
    }

    pub fn timestamp(&self) -> Option<f64> {
        self.timestamp.as_f64()
    }

    pub fn properties(&self) -> Option<&Map<String, Value>> {
        self.properties.as_object()
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties().and_then(|props| props.get(name))
    }

    /// The `answer` property as a list; multi-select answers are arrays
    pub fn answer_values(&self) -> Vec<String> {
        match self.property("answer") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::String(answer)) => vec![answer.clone()],
            Some(Value::Array(answers)) => answers
                .iter()
                .map(|answer| match answer {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect(),
            Some(other) => vec![other.to_string()],
        }
    }

    /// `None` if the timestamp is absent, not a number, or outside chrono's range
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        let ts = self.timestamp().filter(|ts| ts.is_finite())?;
        let secs = ts.floor();
        if secs < i64::MIN as f64 || secs >= i64::MAX as f64 {
            return None;
        }
        let nanos = ((ts - secs) * 1_000_000_000.0).min(999_999_999.0) as u32;
        DateTime::from_timestamp(secs as i64, nanos)
    }

    /// Describe every way this event differs from a well-formed survey event.
    ///
    /// An empty result means the type is `survey`, the timestamp is a number
    /// and all of [`REQUIRED_EVENT_PROPERTIES`] exist.
    pub fn survey_shape_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();

        if self.event_type() != Some(SURVEY_EVENT_TYPE) {
            let shown = self
                .event_type()
                .map_or_else(|| self.event_type.to_string(), |t| format!("'{t}'"));
            violations.push(format!("Event type is {shown}, not '{SURVEY_EVENT_TYPE}'"));
        }

        match &self.timestamp {
            Value::Null => violations.push("Timestamp is missing".to_string()),
            Value::Number(_) => {}
            other => violations.push(format!("Timestamp is not a number: {other}")),
        }

        match &self.properties {
            Value::Null => violations.push("Properties are missing".to_string()),
            Value::Object(props) => violations.extend(
                REQUIRED_EVENT_PROPERTIES
                    .iter()
                    .filter(|name| !props.contains_key(**name))
                    .map(|name| format!("{name} is missing in properties")),
            ),
            other => violations.push(format!("Properties are not an object: {other}")),
        }

        violations
    }
}

impl From<Value> for TrackedEvent {
    /// Non-object entries become an event with every field absent
    fn from(raw: Value) -> Self {
        serde_json::from_value(raw).unwrap_or_default()
    }
}

/// Body of an export-one response; absent sections stay `None`
///
/// Events stay raw until [`into_events`](Self::into_events) so the log length
/// always matches the API's array, whatever its entries hold.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerExport {
    #[serde(default)]
    pub properties: Option<Value>,
    #[serde(default)]
    pub events: Option<Vec<Value>>,
}

impl CustomerExport {
    pub fn survey_link(&self) -> Option<String> {
        self.properties
            .as_ref()
            .and_then(|props| props.get(SURVEY_LINK_PROPERTY))
            .and_then(Value::as_str)
            .map(str::to_owned)
    }

    pub fn into_events(self) -> Vec<TrackedEvent> {
        self.events
            .unwrap_or_default()
            .into_iter()
            .map(TrackedEvent::from)
            .collect()
    }
}

#[derive(Debug, Serialize)]
struct CustomerIds<'a> {
    registered: &'a str,
}

#[derive(Debug, Serialize)]
struct ExportRequest<'a> {
    customer_ids: CustomerIds<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    properties: Option<&'a [&'a str]>,
}

/// Read access to a customer's tracked-event log
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Fetch the complete event list as it currently stands
    async fn fetch_tracked_events(&self) -> ProbeResult<Vec<TrackedEvent>>;
}

/// Poll `log` until it holds at least `baseline + expected` events.
///
/// Extra unrelated events satisfy the wait too; duplicates cannot be told
/// apart from correct events here.
pub async fn wait_for_events<L>(
    log: &L,
    baseline: usize,
    expected: usize,
    policy: &PollPolicy,
) -> ProbeResult<PollOutcome<Vec<TrackedEvent>>>
where
    L: EventLog + ?Sized,
{
    let target = baseline + expected;
    log_debug!(
        baseline = baseline,
        expected = expected,
        target = target,
        "Waiting for tracked events"
    );

    let outcome = poll_until(
        policy,
        || log.fetch_tracked_events(),
        |events| events.len() >= target,
    )
    .await?;

    if !outcome.is_converged() {
        log_warn!(
            target = target,
            observed = outcome.value().len(),
            "Tracked events did not reach target before timeout"
        );
    }

    Ok(outcome)
}

/// Client for the customer export endpoint
#[derive(Debug, Clone)]
pub struct TrackingClient {
    client: reqwest::Client,
    headers: HeaderMap,
    config: ProbeConfig,
}

impl TrackingClient {
    /// Create a tracking client for the configured customer
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::ConfigurationError`] if:
    /// - The configuration fails validation
    /// - The credentials cannot be encoded into a header
    /// - The HTTP client cannot be built
    pub fn new(config: ProbeConfig) -> ProbeResult<Self> {
        config.validate()?;

        let headers = Self::build_auth_headers(&config.api_key_id, &config.api_key_secret)?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                ProbeError::configuration_error(format!("Failed to build HTTP client: {e}"))
            })?;

        log_debug!(
            api_url = %config.api_url,
            customer_id = %config.customer_id,
            status_policy = %config.status_policy,
            "Tracking client initialized"
        );

        Ok(Self {
            client,
            headers,
            config,
        })
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Build JSON headers with HTTP Basic authentication
    pub fn build_auth_headers(key_id: &str, key_secret: &str) -> ProbeResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let credentials = BASE64.encode(format!("{key_id}:{key_secret}"));

        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth_value =
            HeaderValue::from_str(&format!("Basic {credentials}")).map_err(|e| {
                ProbeError::configuration_error(format!("Invalid API key format: {e}"))
            })?;
        auth_value.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_value);

        Ok(headers)
    }

    /// Export the customer, optionally restricted to named properties
    pub async fn export_customer(
        &self,
        properties: Option<&[&str]>,
    ) -> ProbeResult<CustomerExport> {
        let request = ExportRequest {
            customer_ids: CustomerIds {
                registered: &self.config.customer_id,
            },
            properties,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .headers(self.headers.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                log_error!(
                    url = %self.config.api_url,
                    error = %e,
                    "Tracking API request failed"
                );
                ProbeError::request_failed(
                    format!("Tracking API request failed: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        let status = response.status();
        if !status.is_success() && self.config.status_policy == StatusPolicy::Enforce {
            return Err(ProbeError::unexpected_status(
                status.as_u16(),
                self.config.api_url.clone(),
            ));
        }

        let raw_body = response.text().await.map_err(|e| {
            ProbeError::response_parsing_error(format!("Failed to read tracking response: {e}"))
        })?;

        match serde_json::from_str::<CustomerExport>(&raw_body) {
            Ok(export) => Ok(export),
            Err(e) if self.config.status_policy == StatusPolicy::Ignore => {
                log_warn!(
                    status = %status,
                    error = %e,
                    "Ignoring undecodable tracking response"
                );
                Ok(CustomerExport::default())
            }
            Err(e) => {
                log_error!(
                    error = %e,
                    raw_body = %raw_body,
                    "Failed to parse tracking response"
                );
                Err(ProbeError::response_parsing_error(format!(
                    "Invalid tracking response: {e}"
                )))
            }
        }
    }

    /// Look up the personalized survey URL; `None` if the customer has none
    pub async fn get_survey_link(&self) -> ProbeResult<Option<String>> {
        let link = self
            .export_customer(Some(&[SURVEY_LINK_PROPERTY][..]))
            .await?
            .survey_link();

        log_debug!(
            customer_id = %self.config.customer_id,
            found = link.is_some(),
            "Resolved survey link"
        );

        Ok(link)
    }

    /// Like [`get_survey_link`](Self::get_survey_link) but absence is an error
    pub async fn require_survey_link(&self) -> ProbeResult<String> {
        self.get_survey_link()
            .await?
            .ok_or_else(|| ProbeError::missing_survey_link(self.config.customer_id.clone()))
    }

    /// Wait for new events using the configured poll policy
    pub async fn wait_for_events(
        &self,
        baseline: usize,
        expected: usize,
    ) -> ProbeResult<PollOutcome<Vec<TrackedEvent>>> {
        wait_for_events(self, baseline, expected, &self.config.poll_policy).await
    }
}

#[async_trait]
impl EventLog for TrackingClient {
    async fn fetch_tracked_events(&self) -> ProbeResult<Vec<TrackedEvent>> {
        let events = self.export_customer(None).await?.into_events();
        log_debug!(
            customer_id = %self.config.customer_id,
            event_count = events.len(),
            "Fetched tracked events"
        );
        Ok(events)
    }
}
