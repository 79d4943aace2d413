//! Shared fixtures for the wiremock-backed integration tests
//!
//! [`SurveyApiMock`] stands in for both external systems at once: the
//! tracking API (survey link + event log) and the survey site (page +
//! submission). Accepted submissions append one survey event per answered
//! question to an in-memory log, optionally only after a number of log reads
//! so the poller has something to wait for.

// Allow dead code in test utilities - functions are used across different test files
#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use survey_probe::{PollPolicy, ProbeConfig};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const EXPORT_PATH: &str = "/data/v2/projects/test-project/customers/export-one";
pub const SURVEY_PATH: &str = "/survey/65f1c0ffee";
pub const KEY_ID: &str = "test-key-id";
pub const KEY_SECRET: &str = "test-key-secret";
pub const CUSTOMER_ID: &str = "customer-test";
pub const CSRF_TOKEN: &str = "IjA4ZDE2.csrf-fixture";
pub const SESSION: &str = "sess-fixture";

/// base64("test-key-id:test-key-secret")
pub const BASIC_AUTH: &str = "Basic dGVzdC1rZXktaWQ6dGVzdC1rZXktc2VjcmV0";

pub fn survey_page_html(csrf_token: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
  <head><title>Favourites survey</title></head>
  <body>
    <form method="post">
      <input type="hidden" name="csrf_token" value="{csrf_token}">
      <label>What is your favourite colour?</label>
      <input type="radio" name="question-0" value="Blue">
      <input type="radio" name="question-0" value="Green">
      <label>Which music genres do you like?</label>
      <input type="checkbox" name="question-1" value="Pop">
      <input type="checkbox" name="question-1" value="Jazz">
      <input type="checkbox" name="question-1" value="Rock">
      <input type="checkbox" name="question-1" value="Classical">
      <label>How many concerts per year?</label>
      <input type="number" name="question-2">
      <label>Favourite movie?</label>
      <input type="text" name="question-3">
      <button type="submit">Submit</button>
    </form>
  </body>
</html>"#
    )
}

pub fn survey_event(question_index: usize, answer: &str) -> Value {
    survey_event_with_answer(question_index, json!(answer))
}

/// Survey event whose `answer` is arbitrary JSON (an array for multi-select)
pub fn survey_event_with_answer(question_index: usize, answer: Value) -> Value {
    json!({
        "type": "survey",
        "timestamp": 1_714_000_000.0 + question_index as f64,
        "properties": {
            "answer": answer,
            "question": format!("Question {question_index}"),
            "question_id": format!("question-{question_index}"),
            "question_index": question_index,
            "survey_id": "65f1c0ffee",
            "survey_name": "Favourites"
        }
    })
}

pub fn page_visit_event() -> Value {
    json!({ "type": "page_visit", "timestamp": 1_600_000_000.0, "properties": { "path": "/" } })
}

#[derive(Debug, Default)]
struct EventLogState {
    committed: Vec<Value>,
    pending: Vec<Value>,
    reads_until_visible: usize,
}

/// In-memory customer event log shared between responders
#[derive(Debug, Clone, Default)]
pub struct SharedEventLog {
    state: Arc<Mutex<EventLogState>>,
    lag_reads: usize,
}

impl SharedEventLog {
    pub fn with_events(events: Vec<Value>, lag_reads: usize) -> Self {
        let log = Self {
            state: Arc::default(),
            lag_reads,
        };
        log.state.lock().unwrap().committed = events;
        log
    }

    fn append(&self, events: Vec<Value>) {
        let mut state = self.state.lock().unwrap();
        state.pending.extend(events);
        state.reads_until_visible = self.lag_reads;
    }

    fn read(&self) -> Vec<Value> {
        let mut state = self.state.lock().unwrap();
        if state.reads_until_visible == 0 {
            let pending = std::mem::take(&mut state.pending);
            state.committed.extend(pending);
        } else {
            state.reads_until_visible -= 1;
        }
        state.committed.clone()
    }

    pub fn committed_len(&self) -> usize {
        self.state.lock().unwrap().committed.len()
    }

    /// Simulate another run writing to the same customer
    pub fn inject(&self, events: Vec<Value>) {
        self.state.lock().unwrap().committed.extend(events);
    }
}

struct EventsResponder {
    log: SharedEventLog,
}

impl Respond for EventsResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "events": self.log.read()
        }))
    }
}

/// Accepts a submission only with the fixture session and CSRF token, and only
/// if the required `question-0` is answered. Records one event per question;
/// a question submitted with several values gets an array `answer`.
struct SubmissionResponder {
    log: SharedEventLog,
}

impl Respond for SubmissionResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let form: Vec<(String, String)> = url::form_urlencoded::parse(&request.body)
            .into_owned()
            .collect();

        let session_ok = request
            .headers
            .get("cookie")
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value == format!("session={SESSION}"));
        let token_ok = form
            .iter()
            .any(|(key, value)| key == "csrf_token" && value == CSRF_TOKEN);

        if !session_ok || !token_ok {
            return ResponseTemplate::new(400)
                .set_body_string("<p>The CSRF token is invalid.</p>");
        }

        if !form.iter().any(|(key, _)| key == "question-0") {
            return ResponseTemplate::new(200)
                .set_body_string("<p>question-0: This field is required.</p>");
        }

        let mut answered: Vec<(usize, Vec<String>)> = Vec::new();
        for (key, value) in &form {
            let Some(index) = key
                .strip_prefix("question-")
                .and_then(|i| i.parse::<usize>().ok())
            else {
                continue;
            };
            match answered.iter_mut().find(|(seen, _)| *seen == index) {
                Some((_, values)) => values.push(value.clone()),
                None => answered.push((index, vec![value.clone()])),
            }
        }
        answered.sort_by_key(|(index, _)| *index);

        self.log.append(
            answered
                .into_iter()
                .map(|(index, mut values)| {
                    let answer = if values.len() == 1 {
                        json!(values.remove(0))
                    } else {
                        json!(values)
                    };
                    survey_event_with_answer(index, answer)
                })
                .collect(),
        );

        ResponseTemplate::new(200).set_body_string("<h1>Survey successfully submitted</h1>")
    }
}

/// Mock server playing both the tracking API and the survey site
pub struct SurveyApiMock {
    pub server: MockServer,
    pub log: SharedEventLog,
}

impl SurveyApiMock {
    /// Start a mock with `baseline` unrelated events already logged and new
    /// events becoming visible `lag_reads` log reads after submission
    pub async fn start(baseline: usize, lag_reads: usize) -> Self {
        let server = MockServer::start().await;
        let log = SharedEventLog::with_events(
            (0..baseline).map(|_| page_visit_event()).collect(),
            lag_reads,
        );

        Mock::given(method("POST"))
            .and(path(EXPORT_PATH))
            .and(header("authorization", BASIC_AUTH))
            .and(body_partial_json(json!({ "properties": ["survey link"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "properties": { "survey link": format!("{}{SURVEY_PATH}", server.uri()) }
            })))
            .with_priority(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(EXPORT_PATH))
            .and(header("authorization", BASIC_AUTH))
            .respond_with(EventsResponder { log: log.clone() })
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(SURVEY_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .insert_header("set-cookie", format!("session={SESSION}; Path=/; HttpOnly"))
                    .set_body_string(survey_page_html(CSRF_TOKEN)),
            )
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(SURVEY_PATH))
            .respond_with(SubmissionResponder { log: log.clone() })
            .mount(&server)
            .await;

        Self { server, log }
    }

    pub fn export_url(&self) -> String {
        format!("{}{EXPORT_PATH}", self.server.uri())
    }

    pub fn survey_url(&self) -> String {
        format!("{}{SURVEY_PATH}", self.server.uri())
    }

    pub fn config(&self) -> ProbeConfig {
        create_test_config(self.export_url())
    }
}

pub fn create_fast_poll_policy() -> PollPolicy {
    PollPolicy::new(Duration::from_millis(300), Duration::from_millis(10))
}

pub fn create_test_config(api_url: String) -> ProbeConfig {
    ProbeConfig::new(api_url, KEY_ID, KEY_SECRET, CUSTOMER_ID)
        .with_poll_policy(create_fast_poll_policy())
        .with_request_timeout(Duration::from_secs(5))
}
