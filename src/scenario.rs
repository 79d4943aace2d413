//! End-to-end survey scenarios and the probe that runs them
//!
//! A run follows one fixed path: resolve the survey link, scrape the page,
//! record the event baseline, submit, wait for events, then compare against
//! the scenario's [`Expectation`].
//!
//! Every scenario shares the configured customer's event log. Baselines are
//! captured per run, but nothing stops another process from writing to the
//! same log in the meantime; reports record surplus events as
//! [`ScenarioReport::extra_events`] instead of assuming isolation.

use crate::config::ProbeConfig;
use crate::error::{ProbeError, ProbeResult};
use crate::logging::{log_debug, log_info, log_warn};
use crate::poll::PollOutcome;
use crate::survey::{AnswerSet, SubmissionResult, SurveyClient, SurveyPage};
use crate::tracking::{EventLog, TrackedEvent, TrackingClient};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Token submitted by [`Scenario::invalid_csrf_token`]
pub const FORGED_CSRF_TOKEN: &str = "invalid-csrf-token";

/// Multi-select question listing music genres
pub const GENRE_QUESTION: &str = "question-1";

/// Genre checkboxes offered by the survey form
pub const MUSIC_GENRES: [&str; 4] = ["Pop", "Jazz", "Rock", "Classical"];

/// What the API should do with a scenario's submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    /// Success phrase present; one new event per answered question
    Accepted,
    /// Success phrase absent; no new events
    Rejected,
}

/// Where the submitted CSRF token comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsrfSource {
    /// The token scraped from the survey page
    Page,
    /// A fixed token, replacing the scraped one
    Forged(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub name: String,
    pub answers: AnswerSet,
    pub expectation: Expectation,
    pub csrf: CsrfSource,
}

impl Scenario {
    pub fn new(name: impl Into<String>, answers: AnswerSet, expectation: Expectation) -> Self {
        Self {
            name: name.into(),
            answers,
            expectation,
            csrf: CsrfSource::Page,
        }
    }

    pub fn with_csrf(mut self, csrf: CsrfSource) -> Self {
        self.csrf = csrf;
        self
    }

    /// Events this scenario should add to the customer's log
    ///
    /// One per distinct answered question. A multi-select question yields a
    /// single event whose `answer` lists every selected value.
    pub fn expected_new_events(&self) -> usize {
        match self.expectation {
            Expectation::Accepted => self.answers.answered_questions(),
            Expectation::Rejected => 0,
        }
    }

    /// Every question answered
    pub fn full_response() -> Self {
        Self::new(
            "happy_path_full_response",
            full_answers("titanic"),
            Expectation::Accepted,
        )
    }

    /// Only the required questions answered
    pub fn minimum_response() -> Self {
        let answers = AnswerSet::from_iter([
            ("question-0", "Green"),
            ("question-1", "Jazz"),
            ("question-2", "4"),
        ]);
        Self::new("happy_path_minimum_response", answers, Expectation::Accepted)
    }

    /// Required `question-0` left out
    pub fn missing_required_field() -> Self {
        let answers = AnswerSet::from_iter([
            ("question-1", "Pop"),
            ("question-2", "3"),
            ("question-3", "titanic"),
        ]);
        Self::new("missing_required_field", answers, Expectation::Rejected)
    }

    /// Complete answers, but a token the server never issued
    pub fn invalid_csrf_token() -> Self {
        Self::new(
            "invalid_csrf_token",
            full_answers("titanic"),
            Expectation::Rejected,
        )
        .with_csrf(CsrfSource::Forged(FORGED_CSRF_TOKEN.to_string()))
    }

    /// Free-text movie answer with a long title, special characters and markup
    pub fn text_input_variations() -> Vec<Self> {
        let long_title = "The Lord of the Rings: The Return of the King ".repeat(20);
        [
            ("text_input_long_title", long_title.trim_end().to_string()),
            (
                "text_input_special_characters",
                "Amélie & Léon: \"Director's Cut\" (1994) #1 100% ünïcødé 🎬".to_string(),
            ),
            (
                "text_input_script_injection",
                "<script>alert('xss')</script>".to_string(),
            ),
        ]
        .into_iter()
        .map(|(name, title)| Self::new(name, full_answers(&title), Expectation::Accepted))
        .collect()
    }

    /// Music genre question answered with one, several, all and none of
    /// [`MUSIC_GENRES`]
    pub fn music_genre_selections() -> Vec<Self> {
        let selections: [(&str, &[&str]); 4] = [
            ("music_genres_one", &MUSIC_GENRES[..1]),
            ("music_genres_several", &MUSIC_GENRES[..2]),
            ("music_genres_all", &MUSIC_GENRES[..]),
            ("music_genres_none", &[]),
        ];

        selections
            .into_iter()
            .map(|(name, genres)| {
                let mut answers = AnswerSet::from_iter([
                    ("question-0", "Blue"),
                    ("question-2", "3"),
                    ("question-3", "titanic"),
                ]);
                for genre in genres {
                    answers.append(GENRE_QUESTION, *genre);
                }
                Self::new(name, answers, Expectation::Accepted)
            })
            .collect()
    }

    /// All built-in scenarios, in suite order
    pub fn builtin() -> Vec<Self> {
        let mut scenarios = vec![
            Self::full_response(),
            Self::minimum_response(),
            Self::missing_required_field(),
            Self::invalid_csrf_token(),
        ];
        scenarios.extend(Self::music_genre_selections());
        scenarios.extend(Self::text_input_variations());
        scenarios
    }
}

fn full_answers(movie: &str) -> AnswerSet {
    AnswerSet::from_iter([
        ("question-0", "Blue"),
        ("question-1", "Pop"),
        ("question-2", "3"),
        ("question-3", movie),
    ])
}

/// Per-run state captured before submitting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyFixture {
    pub survey_link: String,
    pub page: SurveyPage,
    pub baseline: usize,
}

/// Everything observed during one scenario run
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub run_id: Uuid,
    pub scenario: String,
    pub expectation: Expectation,
    pub expected_new_events: usize,
    pub baseline: usize,
    pub submission: SubmissionResult,
    pub events: PollOutcome<Vec<TrackedEvent>>,
}

impl ScenarioReport {
    pub fn final_count(&self) -> usize {
        self.events.value().len()
    }

    /// Events observed beyond the baseline
    pub fn new_events(&self) -> usize {
        self.final_count().saturating_sub(self.baseline)
    }

    /// Events observed beyond baseline plus expectation
    pub fn extra_events(&self) -> usize {
        self.new_events().saturating_sub(self.expected_new_events)
    }

    /// The newest `expected_new_events` events, oldest first
    pub fn newest_events(&self) -> &[TrackedEvent] {
        let events = self.events.value();
        let take = self.expected_new_events.min(events.len());
        &events[events.len() - take..]
    }

    pub fn latest_event_time(&self) -> Option<DateTime<Utc>> {
        self.events
            .value()
            .iter()
            .filter_map(TrackedEvent::timestamp_utc)
            .max()
    }

    /// Answers recorded for `question_id` among this run's new events
    ///
    /// `None` if no new event is about that question.
    pub fn tracked_answer(&self, question_id: &str) -> Option<Vec<String>> {
        self.newest_events()
            .iter()
            .rev()
            .find(|event| {
                event.property("question_id").and_then(|id| id.as_str()) == Some(question_id)
            })
            .map(TrackedEvent::answer_values)
    }

    /// Check the observed outcome against the expectation
    ///
    /// The event count must reach `baseline + expected_new_events`; more is
    /// tolerated and only logged, since the customer log may be shared.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::ExpectationFailed`] describing the first
    /// mismatch found.
    pub fn verify(&self) -> ProbeResult<()> {
        if let Some(message) = self.first_mismatch() {
            return Err(ProbeError::expectation_failed(&self.scenario, message));
        }

        if self.extra_events() > 0 {
            log_warn!(
                scenario = %self.scenario,
                run_id = %self.run_id,
                extra_events = self.extra_events(),
                "More events than expected; the customer log may be shared with another run"
            );
        }

        Ok(())
    }

    fn first_mismatch(&self) -> Option<String> {
        match self.expectation {
            Expectation::Accepted => {
                if !self.submission.is_accepted() {
                    return Some(format!(
                        "Survey submission failed (HTTP {})",
                        self.submission.http_status
                    ));
                }

                let target = self.baseline + self.expected_new_events;
                if self.final_count() < target {
                    return Some(format!(
                        "Not all events were tracked: expected at least {target}, observed {}",
                        self.final_count()
                    ));
                }

                self.newest_events()
                    .iter()
                    .enumerate()
                    .find_map(|(index, event)| {
                        let violations = event.survey_shape_violations();
                        (!violations.is_empty()).then(|| {
                            format!("New event {index} is malformed: {}", violations.join("; "))
                        })
                    })
            }
            Expectation::Rejected => {
                if self.submission.is_accepted() {
                    return Some("Survey was incorrectly accepted".to_string());
                }
                (self.final_count() != self.baseline).then(|| {
                    format!(
                        "Unexpected events were tracked: baseline {}, observed {}",
                        self.baseline,
                        self.final_count()
                    )
                })
            }
        }
    }

    /// One-line human summary
    pub fn summary(&self) -> String {
        let verdict = match self.first_mismatch() {
            None => "PASS",
            Some(_) => "FAIL",
        };
        let convergence = if self.events.is_converged() {
            "converged"
        } else {
            "timed out"
        };
        format!(
            "[{verdict}] {} ({:?}): HTTP {}, accepted={}, events {} -> {} ({convergence})",
            self.scenario,
            self.expectation,
            self.submission.http_status,
            self.submission.is_accepted(),
            self.baseline,
            self.final_count(),
        )
    }
}

/// Runs [`Scenario`]s against one configured customer
#[derive(Debug, Clone)]
pub struct SurveyProbe {
    tracking: TrackingClient,
    survey: SurveyClient,
}

impl SurveyProbe {
    pub fn from_config(config: ProbeConfig) -> ProbeResult<Self> {
        let survey = SurveyClient::new(&config)?;
        let tracking = TrackingClient::new(config)?;
        Ok(Self { tracking, survey })
    }

    /// Resolve configuration from the environment and build a probe
    pub fn from_env() -> ProbeResult<Self> {
        Self::from_config(ProbeConfig::from_env()?)
    }

    pub fn tracking(&self) -> &TrackingClient {
        &self.tracking
    }

    pub fn survey(&self) -> &SurveyClient {
        &self.survey
    }

    /// Fresh survey link, page credentials and event baseline
    pub async fn prepare(&self) -> ProbeResult<SurveyFixture> {
        let survey_link = self.tracking.require_survey_link().await?;
        let page = self
            .survey
            .fetch_csrf_token_and_cookies(&survey_link)
            .await?;
        let baseline = self.tracking.fetch_tracked_events().await?.len();

        log_debug!(
            survey_link = %survey_link,
            baseline = baseline,
            "Survey fixture prepared"
        );

        Ok(SurveyFixture {
            survey_link,
            page,
            baseline,
        })
    }

    /// Run one scenario and collect its report without judging it
    pub async fn run(&self, scenario: &Scenario) -> ProbeResult<ScenarioReport> {
        let run_id = Uuid::new_v4();
        let fixture = self.prepare().await?;

        log_info!(
            run_id = %run_id,
            scenario = %scenario.name,
            baseline = fixture.baseline,
            "Initial event count before scenario"
        );

        let page = match &scenario.csrf {
            CsrfSource::Page => fixture.page.clone(),
            CsrfSource::Forged(token) => fixture.page.with_csrf_token(token.as_str()),
        };

        let submission = self
            .survey
            .submit_survey(&fixture.survey_link, &scenario.answers, &page)
            .await?;

        let expected_new_events = scenario.expected_new_events();
        let events = self
            .tracking
            .wait_for_events(fixture.baseline, expected_new_events)
            .await?;

        log_info!(
            run_id = %run_id,
            scenario = %scenario.name,
            final_count = events.value().len(),
            converged = events.is_converged(),
            "Final event count after scenario"
        );

        Ok(ScenarioReport {
            run_id,
            scenario: scenario.name.clone(),
            expectation: scenario.expectation,
            expected_new_events,
            baseline: fixture.baseline,
            submission,
            events,
        })
    }

    /// Run one scenario and fail if its expectation does not hold
    pub async fn run_and_verify(&self, scenario: &Scenario) -> ProbeResult<ScenarioReport> {
        let report = self.run(scenario).await?;
        report.verify()?;
        Ok(report)
    }

    /// Read the event log twice; a pure read must not change the count
    pub async fn verify_read_idempotence(&self) -> ProbeResult<usize> {
        let first = self.tracking.fetch_tracked_events().await?.len();
        let second = self.tracking.fetch_tracked_events().await?.len();

        if first != second {
            return Err(ProbeError::expectation_failed(
                "read_idempotence",
                format!("Event count changed between reads: {first} -> {second}"),
            ));
        }

        Ok(first)
    }
}
