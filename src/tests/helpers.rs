//! Test helper utilities for survey-probe unit tests
//!
//! IMPORTANT: These helpers are test-only and should NEVER be used in production code.

// Allow dead code in test utilities - functions are used across different test files
#![allow(dead_code)]

use crate::config::ProbeConfig;
use crate::poll::{PollOutcome, PollPolicy};
use crate::survey::{SubmissionResult, SUCCESS_PHRASE};
use crate::tracking::TrackedEvent;
use serde_json::json;
use std::time::Duration;

/// Valid configuration pointing at a placeholder host
pub fn create_test_config() -> ProbeConfig {
    ProbeConfig::new(
        "https://api.example.test/data/v2/projects/test-project/customers/export-one",
        "test-key-id",
        "test-key-secret",
        "customer-test",
    )
    .with_poll_policy(create_fast_poll_policy())
}

/// Poll policy with millisecond timings to keep tests fast
pub fn create_fast_poll_policy() -> PollPolicy {
    PollPolicy::new(Duration::from_millis(200), Duration::from_millis(10))
}

/// A well-formed survey event for question `index`
pub fn survey_event(index: usize, answer: &str) -> TrackedEvent {
    let properties = json!({
        "answer": answer,
        "question": format!("Question {index}"),
        "question_id": format!("question-{index}"),
        "question_index": index,
        "survey_id": "survey-1",
        "survey_name": "Favourites",
    });

    TrackedEvent {
        event_type: json!("survey"),
        timestamp: json!(1_700_000_000.0 + index as f64),
        properties,
    }
}

/// An event unrelated to surveys, as other tracking would produce
pub fn page_visit_event() -> TrackedEvent {
    TrackedEvent {
        event_type: json!("page_visit"),
        timestamp: json!(1_600_000_000.0),
        properties: json!({ "path": "/home" }),
    }
}

pub fn accepted_submission() -> SubmissionResult {
    SubmissionResult::from_response(200, format!("<p>{SUCCESS_PHRASE}!</p>"))
}

pub fn rejected_submission() -> SubmissionResult {
    SubmissionResult::from_response(
        200,
        "<p>Please answer all required questions</p>".to_string(),
    )
}

/// `baseline` unrelated events followed by `new` survey events
pub fn event_log(baseline: usize, new: usize) -> Vec<TrackedEvent> {
    let mut events: Vec<TrackedEvent> = (0..baseline).map(|_| page_visit_event()).collect();
    events.extend((0..new).map(|i| survey_event(i, "Blue")));
    events
}

pub fn converged(events: Vec<TrackedEvent>) -> PollOutcome<Vec<TrackedEvent>> {
    PollOutcome::Converged(events)
}
